// Cooldown gates: global, per-alert and escalation.
//
// Each gate is a last-fired timestamp plus a configured duration. The engine
// asks which gates apply to a change kind, checks them, and records them
// only when a notification actually goes out.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::model::{AlertSettings, ChangeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CooldownGate {
    /// Process-wide spacing between any two notifications
    Global,
    /// Spacing between notifications about the same alert
    PerAlert,
    /// Spacing between escalation notifications about the same alert
    Escalation,
}

impl CooldownGate {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::PerAlert => "per-alert",
            Self::Escalation => "escalation",
        }
    }

    fn cooldown(&self, settings: &AlertSettings) -> Duration {
        match self {
            Self::Global => settings.global_cooldown(),
            Self::PerAlert => settings.per_alert_cooldown(),
            Self::Escalation => settings.escalation_cooldown(),
        }
    }
}

impl fmt::Display for CooldownGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Gates that must pass before notifying about a change of this kind.
/// Empty for kinds that never notify.
pub fn gates_for(kind: ChangeKind, settings: &AlertSettings) -> &'static [CooldownGate] {
    match kind {
        ChangeKind::New => &[CooldownGate::Global],
        ChangeKind::Escalated => &[CooldownGate::Global, CooldownGate::Escalation],
        ChangeKind::ContentUpdated => &[CooldownGate::Global, CooldownGate::PerAlert],
        ChangeKind::Deescalated if settings.notify_on_deescalation => {
            &[CooldownGate::Global, CooldownGate::PerAlert]
        }
        ChangeKind::Deescalated | ChangeKind::Unchanged | ChangeKind::Expired => &[],
    }
}

/// Gates whose timestamps move when a notification of this kind is sent.
///
/// The per-alert timer is always touched so a routine update cannot follow
/// right behind a new-alert or escalation notification.
fn gates_recorded_for(kind: ChangeKind) -> &'static [CooldownGate] {
    match kind {
        ChangeKind::Escalated => &[
            CooldownGate::Global,
            CooldownGate::Escalation,
            CooldownGate::PerAlert,
        ],
        _ => &[CooldownGate::Global, CooldownGate::PerAlert],
    }
}

/// `true` once `cooldown` has fully elapsed since `last`.
///
/// A `now` earlier than `last` (clock reset) counts as not elapsed.
pub fn gate_allows(last: Option<DateTime<Utc>>, cooldown: Duration, now: DateTime<Utc>) -> bool {
    match last {
        None => true,
        Some(last) if now < last => false,
        Some(last) => now - last >= cooldown,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CooldownManager {
    global_last: Option<DateTime<Utc>>,
    per_alert_last: HashMap<String, DateTime<Utc>>,
    escalation_last: HashMap<String, DateTime<Utc>>,
}

impl CooldownManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn last_fired(&self, gate: CooldownGate, identity: &str) -> Option<DateTime<Utc>> {
        match gate {
            CooldownGate::Global => self.global_last,
            CooldownGate::PerAlert => self.per_alert_last.get(identity).copied(),
            CooldownGate::Escalation => self.escalation_last.get(identity).copied(),
        }
    }

    /// Check every gate for `kind` in order, returning the first that blocks.
    pub fn check(
        &self,
        kind: ChangeKind,
        identity: &str,
        settings: &AlertSettings,
        now: DateTime<Utc>,
    ) -> Result<(), CooldownGate> {
        for gate in gates_for(kind, settings) {
            let last = self.last_fired(*gate, identity);
            if !gate_allows(last, gate.cooldown(settings), now) {
                return Err(*gate);
            }
        }
        Ok(())
    }

    /// Start the cooldowns for a notification that was sent.
    pub fn record(&mut self, kind: ChangeKind, identity: &str, now: DateTime<Utc>) {
        for gate in gates_recorded_for(kind) {
            match gate {
                CooldownGate::Global => self.global_last = Some(now),
                CooldownGate::PerAlert => {
                    self.per_alert_last.insert(identity.to_string(), now);
                }
                CooldownGate::Escalation => {
                    self.escalation_last.insert(identity.to_string(), now);
                }
            }
        }
    }

    /// Drop per-identity timers for an alert that left the store.
    pub fn forget(&mut self, identity: &str) {
        self.per_alert_last.remove(identity);
        self.escalation_last.remove(identity);
    }

    pub fn last_global(&self) -> Option<DateTime<Utc>> {
        self.global_last
    }
}
