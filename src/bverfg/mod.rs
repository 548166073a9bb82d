//! Pieces specific to the Federal Constitutional Court's website.
//!
//! - [`case_ref`] - parsing and formatting of file numbers (`1 BvR 205/58`)
//! - [`translator`] - fixes for the court's RSS dialect
//! - [`scrape`] - the announced senate decisions page

pub mod case_ref;
pub mod scrape;
pub mod translator;

pub use case_ref::{CaseRefError, CaseReference, ProcedureType};
pub use scrape::{
    fetch_upcoming_decisions, parse_german_date, parse_upcoming_decisions, AnnouncedDecision,
    ScrapeError, SENATE_DECISIONS_URL,
};
pub use translator::DecisionFeedTranslator;

pub const DECISION_FEED_URL: &str = "https://www.bundesverfassungsgericht.de/SiteGlobals/Functions/RSSFeed/DE/Entscheidungen/RSSEntscheidungen.xml";
