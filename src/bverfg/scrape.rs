//! Scraper for the court's list of announced senate decisions.
//!
//! The page is a single Word-exported HTML table with one row per
//! announcement: case reference, description, German long-form date.
//! Rows that don't fit are skipped with a warning; a bad row never fails
//! the whole scrape.

use super::case_ref::CaseReference;
use crate::feed::fetcher::{read_limited_bytes, FetchError};
use chrono::NaiveDate;
use scraper::{Html, Selector};
use std::time::Duration;
use thiserror::Error;

pub const SENATE_DECISIONS_URL: &str = "https://www.bundesverfassungsgericht.de/DE/Presse/Senatsbeschl%C3%BCsse/Senatsbeschl%C3%BCsse_node.html";

const SCRAPE_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_PAGE_SIZE: usize = 2 * 1024 * 1024; // 2MB

const GERMAN_MONTHS: [&str; 12] = [
    "januar",
    "februar",
    "märz",
    "april",
    "mai",
    "juni",
    "juli",
    "august",
    "september",
    "oktober",
    "november",
    "dezember",
];

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("request timed out")]
    Timeout,
    #[error("failed to read page: {0}")]
    Body(#[from] FetchError),
}

/// A decision whose publication date has been announced ahead of time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncedDecision {
    pub reference: CaseReference,
    pub description: String,
    pub publish_date: NaiveDate,
}

impl AnnouncedDecision {
    pub fn is_due_on(&self, day: NaiveDate) -> bool {
        self.publish_date == day
    }
}

/// Fetches the announcements page and parses it.
pub async fn fetch_upcoming_decisions(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<AnnouncedDecision>, ScrapeError> {
    tracing::info!(url = %url, "Scraping announced decisions");

    let response = tokio::time::timeout(SCRAPE_TIMEOUT, client.get(url).send())
        .await
        .map_err(|_| ScrapeError::Timeout)??;

    if !response.status().is_success() {
        return Err(ScrapeError::HttpStatus(response.status().as_u16()));
    }

    let body = tokio::time::timeout(SCRAPE_TIMEOUT, read_limited_bytes(response, MAX_PAGE_SIZE))
        .await
        .map_err(|_| ScrapeError::Timeout)??;

    Ok(parse_upcoming_decisions(&String::from_utf8_lossy(&body)))
}

/// Extracts all well-formed announcement rows from the page.
pub fn parse_upcoming_decisions(html: &str) -> Vec<AnnouncedDecision> {
    let (Ok(rows), Ok(cells)) = (
        Selector::parse("table.MsoNormalTable tr"),
        Selector::parse("td"),
    ) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let mut decisions = Vec::new();

    for row in document.select(&rows) {
        let texts: Vec<String> = row
            .select(&cells)
            .map(|cell| normalize_whitespace(&cell.text().collect::<String>()))
            .collect();

        // Header rows only have th cells
        if texts.is_empty() {
            continue;
        }

        let [reference, description, date, ..] = texts.as_slice() else {
            tracing::debug!(cells = texts.len(), "Skipping short announcement row");
            continue;
        };
        if reference.is_empty() || description.is_empty() || date.is_empty() {
            continue;
        }

        // Only the first of several joined references is used
        let first_reference = reference.split(',').next().unwrap_or(reference.as_str());
        let reference = match CaseReference::parse(first_reference) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(reference = %first_reference, error = %e, "Skipping row with bad case reference");
                continue;
            }
        };

        let Some(publish_date) = parse_german_date(date) else {
            tracing::warn!(date = %date, reference = %reference, "Skipping row with bad date");
            continue;
        };

        decisions.push(AnnouncedDecision {
            reference,
            description: description.clone(),
            publish_date,
        });
    }

    decisions
}

/// Parses long-form German dates such as `14. März 2024`.
pub fn parse_german_date(text: &str) -> Option<NaiveDate> {
    let mut parts = text.split_whitespace();
    let day = parts.next()?.trim_end_matches('.').parse::<u32>().ok()?;
    let month_name = parts.next()?.to_lowercase();
    let year = parts.next()?.parse::<i32>().ok()?;
    if parts.next().is_some() {
        return None;
    }

    let month_name = if month_name == "maerz" {
        "märz".to_owned()
    } else {
        month_name
    };
    let month = GERMAN_MONTHS.iter().position(|m| *m == month_name)? as u32 + 1;

    NaiveDate::from_ymd_opt(year, month, day)
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
