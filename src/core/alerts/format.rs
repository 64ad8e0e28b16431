//! Screen-reader friendly notification text.
//!
//! Output is one plain string in a fixed order:
//! `Severity: … - Event: … - Urgency: … - {headline} - Instructions: …`.
//! Nothing depends on visual emphasis. Provider markup is stripped,
//! and a missing field is replaced by a spoken fallback instead of being
//! left out.
//!
//! The formatter only reports which fallbacks it used. Logging them is up
//! to the caller.

use lazy_static::lazy_static;
use regex::Regex;

use super::model::{AlertRecord, AlertSeverity, AlertUrgency, ChangeKind};

pub const FALLBACK_HEADLINE: &str = "A weather alert has been issued.";
pub const FALLBACK_EVENT: &str = "Unspecified weather event";
pub const FALLBACK_SEVERITY: &str = "Unknown severity";
pub const FALLBACK_URGENCY: &str = "Unknown urgency";
const ELLIPSIS: &str = "...";
const SEPARATOR: &str = " - ";

lazy_static! {
    static ref MARKUP_TAG: Regex = Regex::new(r"</?[A-Za-z][^<>]*>").expect("Invalid markup regex");
    static ref EMPHASIS: Regex = Regex::new(r"[*_]{2,}|(^|\s)[*_]+|[*_]+(\s|$)").expect("Invalid emphasis regex");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("Invalid whitespace regex");
}

/// A field that had to be replaced by a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatFallback {
    Severity,
    Event,
    Urgency,
    Headline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedMessage {
    /// Short notification title
    pub title: String,
    /// Full accessible body
    pub text: String,
    pub fallbacks: Vec<FormatFallback>,
}

/// Optional long-form fields for notifiers that can show more than the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertDetails {
    pub description: String,
    pub area: String,
}

#[derive(Debug, Clone)]
pub struct NotificationFormatter {
    max_text_length: usize,
}

impl NotificationFormatter {
    pub fn new(max_text_length: usize) -> Self {
        Self {
            max_text_length: max_text_length.max(ELLIPSIS.len() + 1),
        }
    }

    pub fn format(&self, alert: &AlertRecord, kind: ChangeKind) -> FormattedMessage {
        let mut fallbacks = Vec::new();

        let severity = match alert.severity {
            AlertSeverity::Unknown => {
                fallbacks.push(FormatFallback::Severity);
                FALLBACK_SEVERITY.to_string()
            }
            known => known.label().to_string(),
        };

        let event = clean_text(&alert.event);
        let event = if event.is_empty() {
            fallbacks.push(FormatFallback::Event);
            FALLBACK_EVENT.to_string()
        } else {
            event
        };

        let urgency = match alert.urgency {
            AlertUrgency::Unknown => {
                fallbacks.push(FormatFallback::Urgency);
                FALLBACK_URGENCY.to_string()
            }
            known => known.label().to_string(),
        };

        let headline = clean_text(&alert.headline);
        let headline = if headline.is_empty() {
            fallbacks.push(FormatFallback::Headline);
            FALLBACK_HEADLINE.to_string()
        } else {
            truncate_words(&headline, self.max_text_length)
        };

        let mut segments = vec![
            format!("Severity: {}", severity),
            format!("Event: {}", event),
            format!("Urgency: {}", urgency),
            headline,
        ];

        let instruction = alert
            .instruction
            .as_deref()
            .map(clean_text)
            .filter(|text| !text.is_empty());
        if let Some(instruction) = instruction {
            segments.push(format!(
                "Instructions: {}",
                truncate_words(&instruction, self.max_text_length)
            ));
        }

        FormattedMessage {
            title: format!("{}: {}", title_prefix(kind), event),
            text: segments.join(SEPARATOR),
            fallbacks,
        }
    }

    pub fn details(&self, alert: &AlertRecord) -> AlertDetails {
        AlertDetails {
            description: truncate_words(&clean_text(&alert.description), self.max_text_length),
            area: truncate_words(&clean_text(&alert.area_description), self.max_text_length),
        }
    }
}

impl Default for NotificationFormatter {
    fn default() -> Self {
        Self::new(280)
    }
}

fn title_prefix(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::New => "New alert",
        ChangeKind::Escalated => "Alert escalated",
        ChangeKind::ContentUpdated => "Alert updated",
        ChangeKind::Deescalated => "Alert downgraded",
        ChangeKind::Unchanged => "Alert",
        ChangeKind::Expired => "Alert expired",
    }
}

/// Strip tags and emphasis marks, collapse whitespace.
fn clean_text(raw: &str) -> String {
    let text = MARKUP_TAG.replace_all(raw, " ");
    let text = EMPHASIS.replace_all(&text, "$1 $2");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Shorten to at most `max_chars` characters (ellipsis included), cutting
/// only at a word boundary. A single word longer than the limit is kept
/// whole rather than split.
fn truncate_words(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let budget = max_chars.saturating_sub(ELLIPSIS.len());
    let mut kept = String::new();
    for word in text.split_whitespace() {
        let needed = if kept.is_empty() {
            word.chars().count()
        } else {
            kept.chars().count() + 1 + word.chars().count()
        };
        if needed > budget {
            if kept.is_empty() {
                kept.push_str(word);
            }
            break;
        }
        if !kept.is_empty() {
            kept.push(' ');
        }
        kept.push_str(word);
    }

    let kept = kept.trim_end_matches(|c: char| c == ',' || c == ';' || c == ':' || c == '-');
    format!("{}{}", kept, ELLIPSIS)
}
