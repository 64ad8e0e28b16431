//! Hand-off from engine decisions to whatever actually shows a notification.
//!
//! Dispatch is fire-once: failures are counted and reported, never retried,
//! and never undo the cooldown or rate-limit budget the engine already spent.

use thiserror::Error;

use super::alerts::model::{AlertSeverity, DispatchDecision};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationUrgency {
    Low,
    Normal,
    Critical,
}

impl NotificationUrgency {
    pub fn for_severity(severity: AlertSeverity) -> Self {
        match severity {
            AlertSeverity::Extreme | AlertSeverity::Severe => Self::Critical,
            AlertSeverity::Moderate => Self::Normal,
            AlertSeverity::Minor | AlertSeverity::Unknown => Self::Low,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification backend unavailable: {0}")]
    Unavailable(String),
    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// OS-level notification capability.
///
/// `Ok(false)` means the backend accepted the call but chose not to show it
/// (do-not-disturb and the like).
pub trait Notifier {
    fn send(
        &self,
        title: &str,
        body: &str,
        urgency: NotificationUrgency,
        sound_enabled: bool,
    ) -> Result<bool, NotifyError>;
}

/// Writes notifications to the log. Used when no desktop backend is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(
        &self,
        title: &str,
        body: &str,
        urgency: NotificationUrgency,
        _sound_enabled: bool,
    ) -> Result<bool, NotifyError> {
        match urgency {
            NotificationUrgency::Critical => log::warn!("{}: {}", title, body),
            NotificationUrgency::Normal | NotificationUrgency::Low => log::info!("{}: {}", title, body),
        }
        Ok(true)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    /// Backend declined to show it
    pub declined: usize,
    pub failed: usize,
    /// Decisions with should_notify=false
    pub suppressed: usize,
    pub errors: Vec<String>,
}

/// Send every `should_notify` decision once.
pub fn dispatch<N: Notifier + ?Sized>(
    decisions: &[DispatchDecision],
    notifier: &N,
    sound_enabled: bool,
) -> DispatchReport {
    let mut report = DispatchReport::default();

    for decision in decisions {
        if !decision.should_notify {
            report.suppressed += 1;
            continue;
        }
        let urgency = NotificationUrgency::for_severity(decision.alert.severity);
        match notifier.send(&decision.title, &decision.accessible_message, urgency, sound_enabled) {
            Ok(true) => report.delivered += 1,
            Ok(false) => report.declined += 1,
            Err(e) => {
                log::warn!("Failed to deliver notification for {}: {}", decision.identity, e);
                report.failed += 1;
                report.errors.push(format!("{}: {}", decision.identity, e));
            }
        }
    }

    report
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::alerts::model::{AlertRecord, AlertUrgency, ChangeKind};
    use chrono::{TimeZone, Utc};
    use std::cell::RefCell;

    /// Records every send; fails for titles containing `fail_on`.
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub sent: RefCell<Vec<(String, NotificationUrgency, bool)>>,
        pub fail_on: Option<String>,
    }

    impl Notifier for RecordingNotifier {
        fn send(
            &self,
            title: &str,
            _body: &str,
            urgency: NotificationUrgency,
            sound_enabled: bool,
        ) -> Result<bool, NotifyError> {
            if let Some(pattern) = &self.fail_on {
                if title.contains(pattern.as_str()) {
                    return Err(NotifyError::Unavailable("toast service down".to_string()));
                }
            }
            self.sent
                .borrow_mut()
                .push((title.to_string(), urgency, sound_enabled));
            Ok(true)
        }
    }

    fn decision(event: &str, severity: AlertSeverity, should_notify: bool) -> DispatchDecision {
        let alert = AlertRecord {
            id: event.to_lowercase(),
            event: event.to_string(),
            headline: String::new(),
            description: String::new(),
            instruction: None,
            severity,
            urgency: AlertUrgency::Immediate,
            effective: Utc.with_ymd_and_hms(2026, 9, 1, 12, 0, 0).unwrap(),
            expires: None,
            area_description: String::new(),
        };
        DispatchDecision {
            identity: alert.identity(),
            title: format!("New alert: {}", event),
            accessible_message: format!("Severity: {} - Event: {}", severity, event),
            change_kind: ChangeKind::New,
            reason: "new alert".to_string(),
            should_notify,
            alert,
        }
    }

    #[test]
    fn test_urgency_mapping() {
        assert_eq!(NotificationUrgency::for_severity(AlertSeverity::Extreme), NotificationUrgency::Critical);
        assert_eq!(NotificationUrgency::for_severity(AlertSeverity::Severe), NotificationUrgency::Critical);
        assert_eq!(NotificationUrgency::for_severity(AlertSeverity::Moderate), NotificationUrgency::Normal);
        assert_eq!(NotificationUrgency::for_severity(AlertSeverity::Unknown), NotificationUrgency::Low);
    }

    #[test]
    fn test_dispatch_sends_only_approved() {
        let notifier = RecordingNotifier::default();
        let decisions = vec![
            decision("Tornado Warning", AlertSeverity::Extreme, true),
            decision("Wind Advisory", AlertSeverity::Minor, false),
            decision("Flood Watch", AlertSeverity::Moderate, true),
        ];
        let report = dispatch(&decisions, &notifier, false);

        assert_eq!(report.delivered, 2);
        assert_eq!(report.suppressed, 1);
        let sent = notifier.sent.borrow();
        assert_eq!(sent[0].0, "New alert: Tornado Warning");
        assert_eq!(sent[0].1, NotificationUrgency::Critical);
        assert!(!sent[0].2);
        assert_eq!(sent[1].1, NotificationUrgency::Normal);
    }

    #[test]
    fn test_dispatch_failure_is_reported_not_retried() {
        let notifier = RecordingNotifier {
            fail_on: Some("Tornado".to_string()),
            ..RecordingNotifier::default()
        };
        let decisions = vec![
            decision("Tornado Warning", AlertSeverity::Extreme, true),
            decision("Flood Watch", AlertSeverity::Moderate, true),
        ];
        let report = dispatch(&decisions, &notifier, true);

        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(notifier.sent.borrow().len(), 1);
        assert!(report.errors[0].contains("toast service down"));
    }

    #[test]
    fn test_log_notifier_always_delivers() {
        let sent = LogNotifier.send("New alert: Heat Advisory", "body", NotificationUrgency::Low, true);
        assert!(matches!(sent, Ok(true)));
    }
}
