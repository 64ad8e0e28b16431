// Severity threshold and ignored-category filtering.

use super::model::{AlertRecord, AlertSettings};

/// Whether the user's policy allows this alert to notify at all.
/// No state, no timing.
pub fn admit(alert: &AlertRecord, settings: &AlertSettings) -> bool {
    if alert.severity_priority() < settings.min_severity_priority {
        return false;
    }
    !is_ignored_category(&alert.event, settings)
}

fn is_ignored_category(event: &str, settings: &AlertSettings) -> bool {
    let event = event.trim();
    settings
        .ignored_event_categories
        .iter()
        .any(|ignored| ignored.trim().eq_ignore_ascii_case(event))
}
