use crate::bverfg::AnnouncedDecision;
use feed_rs::model::Entry;

/// Notification texts, rendered as Telegram-style HTML.
///
/// Built once at startup and handed to whichever task renders messages.
#[derive(Debug, Clone)]
pub struct Messages {
    pub decision_heading: String,
    pub decision_link_label: String,
    pub first_senate_intro: String,
    pub second_senate_intro: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            decision_heading: "🦅 <b>Im Namen des Volkes</b> 🦅\nEs wurde nachstehende Entscheidung verkündet:".to_owned(),
            decision_link_label: "Zur Entscheidung".to_owned(),
            first_senate_intro: "Geheimdienste zittern, Pressekammern schlottern!\n\nDer <b>1. Senat</b>🐻✝️🥦🐺\ngibt heute eine Entscheidung in nachstehender Sache bekannt:".to_owned(),
            second_senate_intro: "🧑‍⚖️ Es Müllert wieder!\nHeute gibt der <b>2. Senat</b> eine Entscheidung in nachstehender Sache bekannt:".to_owned(),
        }
    }
}

impl Messages {
    /// Message for a newly published decision from the feed.
    pub fn decision(&self, entry: &Entry) -> String {
        let title = entry
            .title
            .as_ref()
            .map(|t| t.content.as_str())
            .unwrap_or("Untitled");
        let description = entry
            .summary
            .as_ref()
            .map(|s| s.content.trim())
            .unwrap_or_default();

        let mut message = format!(
            "{}\n\n<i>{}</i>\n",
            self.decision_heading,
            escape_html(title.trim())
        );
        if !description.is_empty() {
            message.push_str(&format!("<pre>{}</pre>\n", escape_html(description)));
        }
        if let Some(link) = entry.links.first() {
            message.push_str(&format!(
                "\n<a href=\"{}\">{}</a>\n",
                escape_html(&link.href),
                self.decision_link_label
            ));
        }
        message
    }

    /// Message for a decision announced for today.
    pub fn upcoming(&self, decision: &AnnouncedDecision) -> String {
        let intro = if decision.reference.senate == 1 {
            &self.first_senate_intro
        } else {
            &self.second_senate_intro
        };
        format!(
            "{}\n<pre>\n{}\n</pre>\nAktenzeichen: {}\n",
            intro,
            escape_html(&decision.description),
            decision.reference
        )
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
