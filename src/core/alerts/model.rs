// Alert model types: normalized provider alerts, settings and dispatch decisions.
//
// NOTE: severity_priority() is the only severity ranking in the crate.
// Every component that compares severities goes through it.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Provider severity, already normalized by the feed adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AlertSeverity {
    Extreme,
    Severe,
    Moderate,
    Minor,
    #[default]
    #[serde(other)]
    Unknown,
}

impl AlertSeverity {
    /// Numeric priority, higher is more severe.
    pub const fn priority(&self) -> u8 {
        match self {
            Self::Unknown => 1,
            Self::Minor => 2,
            Self::Moderate => 3,
            Self::Severe => 4,
            Self::Extreme => 5,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Extreme => "Extreme",
            Self::Severe => "Severe",
            Self::Moderate => "Moderate",
            Self::Minor => "Minor",
            Self::Unknown => "Unknown",
        }
    }

    /// Map free-form provider text onto the enum. Unrecognized text is `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "extreme" => Self::Extreme,
            "severe" => Self::Severe,
            "moderate" => Self::Moderate,
            "minor" => Self::Minor,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Provider urgency, already normalized by the feed adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AlertUrgency {
    Immediate,
    Expected,
    Future,
    Past,
    #[default]
    #[serde(other)]
    Unknown,
}

impl AlertUrgency {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Immediate => "Immediate",
            Self::Expected => "Expected",
            Self::Future => "Future",
            Self::Past => "Past",
            Self::Unknown => "Unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Self::Immediate,
            "expected" => Self::Expected,
            "future" => Self::Future,
            "past" => Self::Past,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for AlertUrgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One provider alert as received in a poll cycle. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Provider-assigned identifier, may be blank
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub event: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headline: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub severity: AlertSeverity,
    #[serde(default, deserialize_with = "null_as_default")]
    pub urgency: AlertUrgency,
    pub effective: DateTime<Utc>,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub area_description: String,
}

/// Providers send `null` for a field they have no value for.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl AlertRecord {
    /// Stable key across poll cycles: the provider id, or a digest of
    /// (event, area, effective) when the provider sent none.
    pub fn identity(&self) -> String {
        let id = self.id.trim();
        if !id.is_empty() {
            return id.to_string();
        }
        let effective = self.effective.to_rfc3339();
        let digest = digest_fields(&[&self.event, &self.area_description, &effective]);
        format!("derived:{}", &digest[..16])
    }

    /// Digest of the meaningful text fields. Timestamps are excluded so a
    /// re-fetched, unchanged alert hashes identically.
    pub fn content_hash(&self) -> String {
        let instruction = match &self.instruction {
            Some(text) => format!("1{}", text),
            None => "0".to_string(),
        };
        digest_fields(&[
            &self.event,
            &self.headline,
            &self.description,
            &instruction,
            self.severity.label(),
        ])
    }

    pub fn severity_priority(&self) -> u8 {
        self.severity.priority()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.map(|expires| expires <= now).unwrap_or(false)
    }
}

fn digest_fields(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update(field.as_bytes());
        // unit separator keeps ("ab", "c") apart from ("a", "bc")
        hasher.update([0x1f]);
    }
    hex::encode(hasher.finalize())
}

/// How an incoming alert relates to what was last seen for its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    New,
    Unchanged,
    ContentUpdated,
    Escalated,
    Deescalated,
    Expired,
}

impl ChangeKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Unchanged => "Unchanged",
            Self::ContentUpdated => "Updated",
            Self::Escalated => "Escalated",
            Self::Deescalated => "Deescalated",
            Self::Expired => "Expired",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One observation appended to an alert's history. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertHistoryEntry {
    pub content_hash: String,
    pub severity_priority: u8,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("min_severity_priority must be between 1 and 5, got {0}")]
    SeverityOutOfRange(u8),
    #[error("escalation cooldown ({escalation}s) must not exceed per-alert cooldown ({per_alert}s)")]
    EscalationCooldownTooLong { escalation: u64, per_alert: u64 },
}

/// Notification policy. Read each cycle, never mutated by the engine.
/// NOTE: persisted inside settings.json, keep serde defaults in sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSettings {
    #[serde(default = "default_min_severity")]
    pub min_severity_priority: u8,
    /// Event names that never notify, compared case-insensitively
    #[serde(default)]
    pub ignored_event_categories: HashSet<String>,
    #[serde(default = "default_global_cooldown")]
    pub global_cooldown_seconds: u64,
    #[serde(default = "default_per_alert_cooldown")]
    pub per_alert_cooldown_seconds: u64,
    #[serde(default = "default_escalation_cooldown")]
    pub escalation_cooldown_seconds: u64,
    #[serde(default = "default_max_per_hour")]
    pub max_notifications_per_hour: u32,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default = "default_true")]
    pub sound_enabled: bool,
    /// Let a severity drop through the per-alert gate instead of staying silent
    #[serde(default)]
    pub notify_on_deescalation: bool,
    /// Treat content that reverts to a recently seen version as unchanged
    #[serde(default)]
    pub suppress_reverted_content: bool,
    /// Free-text fields are cut to this many characters
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
}

fn default_min_severity() -> u8 {
    AlertSeverity::Minor.priority()
}

fn default_global_cooldown() -> u64 {
    5 * 60
}

fn default_per_alert_cooldown() -> u64 {
    60 * 60
}

fn default_escalation_cooldown() -> u64 {
    10 * 60
}

fn default_max_per_hour() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_max_text_length() -> usize {
    280
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            min_severity_priority: default_min_severity(),
            ignored_event_categories: HashSet::new(),
            global_cooldown_seconds: default_global_cooldown(),
            per_alert_cooldown_seconds: default_per_alert_cooldown(),
            escalation_cooldown_seconds: default_escalation_cooldown(),
            max_notifications_per_hour: default_max_per_hour(),
            notifications_enabled: true,
            sound_enabled: true,
            notify_on_deescalation: false,
            suppress_reverted_content: false,
            max_text_length: default_max_text_length(),
        }
    }
}

impl AlertSettings {
    pub fn global_cooldown(&self) -> Duration {
        seconds(self.global_cooldown_seconds)
    }

    pub fn per_alert_cooldown(&self) -> Duration {
        seconds(self.per_alert_cooldown_seconds)
    }

    pub fn escalation_cooldown(&self) -> Duration {
        seconds(self.escalation_cooldown_seconds)
    }

    /// Tokens per second, spread evenly over the hour.
    pub fn bucket_refill_rate(&self) -> f64 {
        f64::from(self.max_notifications_per_hour) / 3600.0
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(1..=5).contains(&self.min_severity_priority) {
            return Err(SettingsError::SeverityOutOfRange(self.min_severity_priority));
        }
        if self.escalation_cooldown_seconds > self.per_alert_cooldown_seconds {
            return Err(SettingsError::EscalationCooldownTooLong {
                escalation: self.escalation_cooldown_seconds,
                per_alert: self.per_alert_cooldown_seconds,
            });
        }
        Ok(())
    }
}

/// Largest cooldown chrono can represent. Longer settings are clamped to it.
const MAX_COOLDOWN_SECONDS: i64 = i64::MAX / 1000;

fn seconds(secs: u64) -> Duration {
    let secs = i64::try_from(secs).unwrap_or(MAX_COOLDOWN_SECONDS);
    Duration::seconds(secs.min(MAX_COOLDOWN_SECONDS))
}

/// Outcome for one incoming alert. Produced even when nothing is sent so
/// suppressed notifications can be audited.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchDecision {
    pub alert: AlertRecord,
    pub identity: String,
    pub change_kind: ChangeKind,
    pub reason: String,
    pub title: String,
    pub accessible_message: String,
    pub should_notify: bool,
}
