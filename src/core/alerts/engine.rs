// Alert engine - classifies each poll cycle's alerts and decides which ones notify.
//
// Never touches the network, never sleeps, never reads the wall clock. `now`
// is passed in by the caller, so replaying the same inputs gives the same
// decisions.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::classifier::classify_at;
use super::cooldown::CooldownManager;
use super::format::{FormatFallback, NotificationFormatter};
use super::model::{AlertRecord, AlertSettings, ChangeKind, DispatchDecision};
use super::policy;
use super::rate_limit::RateLimiter;
use super::state::{AlertState, AlertStateStore, StoreConfig};

pub const REASON_DISABLED: &str = "notifications disabled";
pub const REASON_FILTERED: &str = "filtered: below severity/ignored category";
pub const REASON_RATE_LIMITED: &str = "rate limit exceeded";
pub const REASON_UNCHANGED: &str = "unchanged since last seen";
pub const REASON_EXPIRED: &str = "alert expired";
pub const REASON_DEESCALATED: &str = "severity decreased, not notifying";

/// Persistable engine state, see `snapshot::SnapshotStore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub states: Vec<AlertState>,
    pub cooldowns: CooldownManager,
    pub rate_limiter: Option<RateLimiter>,
}

struct Verdict {
    notify: bool,
    reason: String,
}

impl Verdict {
    fn suppress(reason: impl Into<String>) -> Self {
        Self {
            notify: false,
            reason: reason.into(),
        }
    }
}

pub struct AlertEngine {
    store: AlertStateStore,
    cooldowns: CooldownManager,
    /// Created on the first cycle from that cycle's hourly cap
    rate_limiter: Option<RateLimiter>,
}

impl AlertEngine {
    pub fn new(store_config: StoreConfig) -> Self {
        Self {
            store: AlertStateStore::new(store_config),
            cooldowns: CooldownManager::new(),
            rate_limiter: None,
        }
    }

    pub fn from_snapshot(snapshot: EngineSnapshot, store_config: StoreConfig) -> Self {
        Self {
            store: AlertStateStore::from_states(store_config, snapshot.states),
            cooldowns: snapshot.cooldowns,
            rate_limiter: snapshot.rate_limiter,
        }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let mut states: Vec<AlertState> = self.store.iter().cloned().collect();
        states.sort_by(|a, b| a.identity.cmp(&b.identity));
        EngineSnapshot {
            states,
            cooldowns: self.cooldowns.clone(),
            rate_limiter: self.rate_limiter.clone(),
        }
    }

    /// Apply store settings changed since startup. Histories are resized
    /// to the new capacity.
    pub fn set_store_config(&mut self, config: StoreConfig) {
        self.store.set_config(config);
    }

    /// Read-only view of an alert's tracked state.
    pub fn state(&self, identity: &str) -> Option<&AlertState> {
        self.store.get(identity)
    }

    pub fn store(&self) -> &AlertStateStore {
        &self.store
    }

    /// Process one poll cycle's full alert list.
    ///
    /// Returns one decision per input alert, in input order. State is
    /// recorded for every alert whether or not it notifies.
    pub fn process_cycle(
        &mut self,
        alerts: &[AlertRecord],
        settings: &AlertSettings,
        now: DateTime<Utc>,
    ) -> Vec<DispatchDecision> {
        let formatter = NotificationFormatter::new(settings.max_text_length);
        let capacity = settings.max_notifications_per_hour;
        self.rate_limiter
            .get_or_insert_with(|| RateLimiter::new(capacity))
            .set_capacity(capacity);

        let mut seen = HashSet::with_capacity(alerts.len());
        let mut decisions = Vec::with_capacity(alerts.len());

        for alert in alerts {
            let identity = alert.identity();
            seen.insert(identity.clone());

            let kind = classify_at(
                self.store.get(&identity),
                alert,
                now,
                settings.suppress_reverted_content,
            );

            let message = formatter.format(alert, kind);
            if let Some(warning) = fallback_warning(&identity, kind, &message.fallbacks) {
                log::warn!("{}", warning);
            }

            let verdict = self.evaluate(alert, &identity, kind, settings, now);

            self.store.record(&identity, alert, now);
            if verdict.notify {
                self.store.mark_notified(&identity, now);
                self.cooldowns.record(kind, &identity, now);
            }

            log::debug!(
                "Alert {} classified {}: notify={} ({})",
                identity,
                kind,
                verdict.notify,
                verdict.reason
            );

            decisions.push(DispatchDecision {
                alert: alert.clone(),
                identity,
                change_kind: kind,
                reason: verdict.reason,
                title: message.title,
                accessible_message: message.text,
                should_notify: verdict.notify,
            });
        }

        for identity in self.store.prune(&seen, now) {
            log::debug!("Alert {} left the feed, dropping its state", identity);
            self.cooldowns.forget(&identity);
        }

        decisions
    }

    /// Policy, then cooldown gates, then the rate limiter. The token is taken
    /// last since nothing refunds it.
    fn evaluate(
        &mut self,
        alert: &AlertRecord,
        identity: &str,
        kind: ChangeKind,
        settings: &AlertSettings,
        now: DateTime<Utc>,
    ) -> Verdict {
        if !settings.notifications_enabled {
            return Verdict::suppress(REASON_DISABLED);
        }
        if !policy::admit(alert, settings) {
            return Verdict::suppress(REASON_FILTERED);
        }

        let reason = match kind {
            ChangeKind::Unchanged => return Verdict::suppress(REASON_UNCHANGED),
            ChangeKind::Expired => return Verdict::suppress(REASON_EXPIRED),
            ChangeKind::Deescalated if !settings.notify_on_deescalation => {
                return Verdict::suppress(REASON_DEESCALATED)
            }
            ChangeKind::New => "new alert".to_string(),
            ChangeKind::Escalated => format!(
                "escalated to {}, escalation cooldown elapsed",
                alert.severity
            ),
            ChangeKind::ContentUpdated => "content updated, per-alert cooldown elapsed".to_string(),
            ChangeKind::Deescalated => format!(
                "downgraded to {}, per-alert cooldown elapsed",
                alert.severity
            ),
        };

        if let Err(gate) = self.cooldowns.check(kind, identity, settings, now) {
            return Verdict::suppress(format!("{} cooldown active", gate));
        }

        let acquired = self
            .rate_limiter
            .as_mut()
            .map(|limiter| limiter.try_acquire(now))
            .unwrap_or(false);
        if !acquired {
            return Verdict::suppress(REASON_RATE_LIMITED);
        }

        Verdict {
            notify: true,
            reason,
        }
    }
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

/// Warn once per version of an alert, not on every re-poll of it.
fn fallback_warning(identity: &str, kind: ChangeKind, fallbacks: &[FormatFallback]) -> Option<String> {
    if fallbacks.is_empty() || kind == ChangeKind::Unchanged {
        return None;
    }
    Some(format!(
        "Alert {} is missing fields, using fallbacks for {:?}",
        identity, fallbacks
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::model::{AlertSeverity, AlertUrgency};
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 20, 21, 0, 0).unwrap()
    }

    fn make_alert(id: &str, severity: AlertSeverity) -> AlertRecord {
        AlertRecord {
            id: id.to_string(),
            event: "Severe Thunderstorm Warning".to_string(),
            headline: format!("{} thunderstorm for Dallas County", severity),
            description: "60 mph wind gusts and quarter size hail.".to_string(),
            instruction: Some("Move to an interior room.".to_string()),
            severity,
            urgency: AlertUrgency::Immediate,
            effective: t0(),
            expires: Some(t0() + Duration::hours(6)),
            area_description: "Dallas, IA".to_string(),
        }
    }

    /// Cooldowns small enough not to interfere unless a test wants them to.
    fn quiet_settings() -> AlertSettings {
        AlertSettings {
            global_cooldown_seconds: 0,
            per_alert_cooldown_seconds: 3600,
            escalation_cooldown_seconds: 60,
            max_notifications_per_hour: 100,
            ..AlertSettings::default()
        }
    }

    #[test]
    fn test_engine_new_then_unchanged() {
        // Severe alert under default settings, re-polled a minute later
        let mut engine = AlertEngine::default();
        let settings = AlertSettings::default();
        let alerts = vec![make_alert("a", AlertSeverity::Severe)];

        let first = engine.process_cycle(&alerts, &settings, t0());
        assert_eq!(first[0].change_kind, ChangeKind::New);
        assert!(first[0].should_notify);
        assert_eq!(first[0].reason, "new alert");

        let second = engine.process_cycle(&alerts, &settings, t0() + Duration::minutes(1));
        assert_eq!(second[0].change_kind, ChangeKind::Unchanged);
        assert!(!second[0].should_notify);

        let state = engine.state("a").unwrap();
        assert_eq!(state.notification_count, 1);
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.last_notified, Some(t0()));
    }

    #[test]
    fn test_engine_escalation_bypasses_per_alert_cooldown() {
        let mut engine = AlertEngine::default();
        let settings = AlertSettings {
            global_cooldown_seconds: 30,
            per_alert_cooldown_seconds: 3600,
            escalation_cooldown_seconds: 60,
            ..AlertSettings::default()
        };

        let first = engine.process_cycle(&[make_alert("a", AlertSeverity::Moderate)], &settings, t0());
        assert!(first[0].should_notify);

        let later = t0() + Duration::minutes(2);
        let escalated = engine.process_cycle(&[make_alert("a", AlertSeverity::Extreme)], &settings, later);
        assert_eq!(escalated[0].change_kind, ChangeKind::Escalated);
        assert!(escalated[0].should_notify);
        assert!(escalated[0].reason.contains("escalat"));
        assert!(!escalated[0].reason.contains("per-alert"));
        assert_eq!(engine.state("a").unwrap().notification_count, 2);
    }

    #[test]
    fn test_engine_content_update_waits_for_per_alert_cooldown() {
        let mut engine = AlertEngine::default();
        let settings = quiet_settings();
        engine.process_cycle(&[make_alert("a", AlertSeverity::Severe)], &settings, t0());

        let mut updated = make_alert("a", AlertSeverity::Severe);
        updated.headline = "Warning extended until 10 PM".to_string();

        let blocked = engine.process_cycle(&[updated.clone()], &settings, t0() + Duration::minutes(10));
        assert_eq!(blocked[0].change_kind, ChangeKind::ContentUpdated);
        assert!(!blocked[0].should_notify);
        assert_eq!(blocked[0].reason, "per-alert cooldown active");

        updated.headline = "Warning extended until 11 PM".to_string();
        let allowed = engine.process_cycle(&[updated], &settings, t0() + Duration::minutes(61));
        assert!(allowed[0].should_notify);
    }

    #[test]
    fn test_engine_global_cooldown_spaces_new_alerts() {
        let mut engine = AlertEngine::default();
        let settings = AlertSettings::default();
        let alerts = vec![
            make_alert("a", AlertSeverity::Severe),
            make_alert("b", AlertSeverity::Severe),
        ];
        let decisions = engine.process_cycle(&alerts, &settings, t0());
        assert!(decisions[0].should_notify);
        assert!(!decisions[1].should_notify);
        assert_eq!(decisions[1].reason, "global cooldown active");
        // Suppressed alerts are still tracked
        assert!(engine.state("b").is_some());
    }

    #[test]
    fn test_engine_rate_limit_burst() {
        let mut engine = AlertEngine::default();
        let settings = AlertSettings {
            max_notifications_per_hour: 10,
            ..quiet_settings()
        };
        let alerts: Vec<_> = (0..15)
            .map(|i| make_alert(&format!("burst-{}", i), AlertSeverity::Severe))
            .collect();

        let decisions = engine.process_cycle(&alerts, &settings, t0());
        let notified = decisions.iter().filter(|d| d.should_notify).count();
        assert_eq!(notified, 10);
        for decision in decisions.iter().filter(|d| !d.should_notify) {
            assert_eq!(decision.reason, REASON_RATE_LIMITED);
        }
        // Stable input order
        let ids: Vec<_> = decisions.iter().map(|d| d.identity.as_str()).collect();
        assert_eq!(ids[0], "burst-0");
        assert_eq!(ids[14], "burst-14");
    }

    #[test]
    fn test_engine_disabled_records_state() {
        let mut engine = AlertEngine::default();
        let settings = AlertSettings {
            notifications_enabled: false,
            ..AlertSettings::default()
        };
        let decisions = engine.process_cycle(&[make_alert("a", AlertSeverity::Extreme)], &settings, t0());
        assert!(!decisions[0].should_notify);
        assert_eq!(decisions[0].reason, REASON_DISABLED);
        assert_eq!(decisions[0].change_kind, ChangeKind::New);
        assert!(!decisions[0].accessible_message.is_empty());

        // Re-enabling later sees the alert as already known
        let enabled = AlertSettings::default();
        let next = engine.process_cycle(&[make_alert("a", AlertSeverity::Extreme)], &enabled, t0() + Duration::minutes(5));
        assert_eq!(next[0].change_kind, ChangeKind::Unchanged);
    }

    #[test]
    fn test_engine_filtered_reason() {
        let mut engine = AlertEngine::default();
        let mut settings = AlertSettings {
            min_severity_priority: AlertSeverity::Severe.priority(),
            ..quiet_settings()
        };
        settings
            .ignored_event_categories
            .insert("Frost Advisory".to_string());

        let mut frost = make_alert("frost", AlertSeverity::Extreme);
        frost.event = "Frost Advisory".to_string();
        let alerts = vec![make_alert("minor", AlertSeverity::Minor), frost];

        let decisions = engine.process_cycle(&alerts, &settings, t0());
        assert!(decisions.iter().all(|d| !d.should_notify));
        assert!(decisions.iter().all(|d| d.reason == REASON_FILTERED));
        assert_eq!(engine.store().len(), 2);
    }

    #[test]
    fn test_engine_deescalation_silent_by_default() {
        let mut engine = AlertEngine::default();
        let mut settings = quiet_settings();
        settings.per_alert_cooldown_seconds = 60;
        engine.process_cycle(&[make_alert("a", AlertSeverity::Extreme)], &settings, t0());

        let later = t0() + Duration::minutes(5);
        let decisions = engine.process_cycle(&[make_alert("a", AlertSeverity::Moderate)], &settings, later);
        assert_eq!(decisions[0].change_kind, ChangeKind::Deescalated);
        assert!(!decisions[0].should_notify);
        assert_eq!(decisions[0].reason, REASON_DEESCALATED);

        settings.notify_on_deescalation = true;
        let decisions = engine.process_cycle(&[make_alert("a", AlertSeverity::Minor)], &settings, later + Duration::minutes(5));
        assert_eq!(decisions[0].change_kind, ChangeKind::Deescalated);
        assert!(decisions[0].should_notify);
    }

    #[test]
    fn test_engine_expired_never_notifies() {
        let mut engine = AlertEngine::default();
        let settings = quiet_settings();
        let decisions = engine.process_cycle(
            &[make_alert("a", AlertSeverity::Extreme)],
            &settings,
            t0() + Duration::hours(7),
        );
        assert_eq!(decisions[0].change_kind, ChangeKind::Expired);
        assert!(!decisions[0].should_notify);
        assert_eq!(decisions[0].reason, REASON_EXPIRED);
    }

    #[test]
    fn test_engine_prunes_and_renotifies() {
        let mut engine = AlertEngine::default();
        let settings = quiet_settings();
        let alert = vec![make_alert("a", AlertSeverity::Severe)];

        engine.process_cycle(&alert, &settings, t0());
        engine.process_cycle(&[], &settings, t0() + Duration::minutes(5));
        assert!(engine.state("a").is_some());
        engine.process_cycle(&[], &settings, t0() + Duration::minutes(10));
        assert!(engine.state("a").is_none());

        let back = engine.process_cycle(&alert, &settings, t0() + Duration::minutes(15));
        assert_eq!(back[0].change_kind, ChangeKind::New);
        assert!(back[0].should_notify);
    }

    #[test]
    fn test_engine_clock_reset_fails_closed() {
        let mut engine = AlertEngine::default();
        let settings = AlertSettings::default();
        engine.process_cycle(&[make_alert("a", AlertSeverity::Severe)], &settings, t0());

        let skewed = t0() - Duration::hours(3);
        let decisions = engine.process_cycle(&[make_alert("b", AlertSeverity::Severe)], &settings, skewed);
        assert_eq!(decisions[0].change_kind, ChangeKind::New);
        assert!(!decisions[0].should_notify);
        assert_eq!(decisions[0].reason, "global cooldown active");
    }

    #[test]
    fn test_engine_huge_cooldown_suppresses_without_panic() {
        let mut engine = AlertEngine::default();
        let settings = AlertSettings {
            per_alert_cooldown_seconds: 100_000_000_000_000_000,
            ..quiet_settings()
        };
        assert!(settings.validate().is_ok());
        engine.process_cycle(&[make_alert("a", AlertSeverity::Severe)], &settings, t0());

        let mut updated = make_alert("a", AlertSeverity::Severe);
        updated.headline = "Warning extended until 11 PM".to_string();
        let decisions = engine.process_cycle(&[updated], &settings, t0() + Duration::hours(2));
        assert_eq!(decisions[0].change_kind, ChangeKind::ContentUpdated);
        assert!(!decisions[0].should_notify);
        assert_eq!(decisions[0].reason, "per-alert cooldown active");
    }

    #[test]
    fn test_engine_store_config_applies_to_existing_history() {
        let mut engine = AlertEngine::default();
        let settings = quiet_settings();
        for minute in 0..5 {
            let mut alert = make_alert("a", AlertSeverity::Severe);
            alert.headline = format!("update {}", minute);
            engine.process_cycle(&[alert], &settings, t0() + Duration::minutes(minute));
        }
        assert_eq!(engine.state("a").unwrap().history.len(), 5);

        engine.set_store_config(StoreConfig {
            history_capacity: 2,
            ..StoreConfig::default()
        });
        let mut latest = make_alert("a", AlertSeverity::Severe);
        latest.headline = "update 4".to_string();
        let history = &engine.state("a").unwrap().history;
        assert_eq!(history.capacity(), 2);
        assert_eq!(history.len(), 2);
        assert_eq!(history.last().unwrap().content_hash, latest.content_hash());
    }

    #[test]
    fn test_fallback_warning_skips_unchanged() {
        let missing = [FormatFallback::Severity, FormatFallback::Event];
        let warning = fallback_warning("derived:abc", ChangeKind::New, &missing).unwrap();
        assert!(warning.contains("derived:abc"));
        assert!(fallback_warning("derived:abc", ChangeKind::ContentUpdated, &missing).is_some());
        assert!(fallback_warning("derived:abc", ChangeKind::Unchanged, &missing).is_none());
        assert!(fallback_warning("derived:abc", ChangeKind::New, &[]).is_none());
    }

    #[test]
    fn test_engine_snapshot_restores_state() {
        let mut engine = AlertEngine::default();
        let settings = AlertSettings::default();
        let alerts = vec![make_alert("a", AlertSeverity::Severe)];
        engine.process_cycle(&alerts, &settings, t0());

        let mut restored = AlertEngine::from_snapshot(engine.snapshot(), StoreConfig::default());
        let decisions = restored.process_cycle(&alerts, &settings, t0() + Duration::minutes(1));
        assert_eq!(decisions[0].change_kind, ChangeKind::Unchanged);
        assert_eq!(restored.state("a").unwrap().notification_count, 1);
    }

    proptest! {
        #[test]
        fn prop_below_threshold_never_notifies(
            min in 2u8..=5,
            severities in prop::collection::vec(0usize..5, 1..20),
            cycles in 1usize..4,
        ) {
            let table = [
                AlertSeverity::Unknown,
                AlertSeverity::Minor,
                AlertSeverity::Moderate,
                AlertSeverity::Severe,
                AlertSeverity::Extreme,
            ];
            let settings = AlertSettings { min_severity_priority: min, ..quiet_settings() };
            let mut engine = AlertEngine::default();
            for cycle in 0..cycles {
                let alerts: Vec<_> = severities
                    .iter()
                    .enumerate()
                    .map(|(i, s)| make_alert(&format!("p-{}", i % 4), table[(*s + cycle) % 5]))
                    .collect();
                let now = t0() + Duration::minutes(cycle as i64 * 90);
                for decision in engine.process_cycle(&alerts, &settings, now) {
                    if decision.alert.severity_priority() < min {
                        prop_assert!(!decision.should_notify);
                    }
                }
            }
        }

        #[test]
        fn prop_replayed_cycle_notifies_once(count in 1usize..12, replays in 2usize..6) {
            let settings = AlertSettings { global_cooldown_seconds: 1, ..quiet_settings() };
            let alerts: Vec<_> = (0..count)
                .map(|i| make_alert(&format!("r-{}", i), AlertSeverity::Extreme))
                .collect();
            let mut engine = AlertEngine::default();

            let first = engine.process_cycle(&alerts, &settings, t0());
            prop_assert!(first.iter().any(|d| d.should_notify));
            for _ in 1..replays {
                for decision in engine.process_cycle(&alerts, &settings, t0()) {
                    prop_assert_eq!(decision.change_kind, ChangeKind::Unchanged);
                    prop_assert!(!decision.should_notify);
                }
            }
        }
    }
}
