//! Per-identity alert state with bounded history.
//!
//! The store never calls into other components. It is written once per
//! cycle by the engine and may be read freely for diagnostics.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::model::{AlertHistoryEntry, AlertRecord};

/// Store tuning, persisted alongside the app settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Observations kept per alert (default: 5)
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Consecutive absent cycles before state is dropped (default: 2)
    #[serde(default = "default_absence_cycles")]
    pub absence_cycles: u32,
    /// Absence longer than this drops state regardless of cycle count (default: 7 days)
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u32,
}

fn default_history_capacity() -> usize {
    5
}

fn default_absence_cycles() -> u32 {
    2
}

fn default_retention_hours() -> u32 {
    7 * 24
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            absence_cycles: default_absence_cycles(),
            retention_hours: default_retention_hours(),
        }
    }
}

impl StoreConfig {
    pub fn retention(&self) -> Duration {
        Duration::hours(i64::from(self.retention_hours))
    }
}

/// Fixed-capacity FIFO of observations. The oldest entry is evicted on overflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertHistory {
    capacity: usize,
    entries: VecDeque<AlertHistoryEntry>,
}

impl AlertHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, entry: AlertHistoryEntry) {
        self.entries.push_back(entry);
        self.trim();
    }

    /// Change the capacity, keeping the most recent entries.
    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.trim();
    }

    fn trim(&mut self) {
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Most recent observation.
    pub fn last(&self) -> Option<&AlertHistoryEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &AlertHistoryEntry> {
        self.entries.iter()
    }

    pub fn contains_hash(&self, content_hash: &str) -> bool {
        self.entries.iter().any(|e| e.content_hash == content_hash)
    }
}

/// Everything remembered about one alert identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertState {
    pub identity: String,
    pub history: AlertHistory,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_notified: Option<DateTime<Utc>>,
    pub notification_count: u32,
    /// Consecutive cycles this identity has been missing from the feed
    pub absent_cycles: u32,
}

impl AlertState {
    fn new(identity: String, capacity: usize, now: DateTime<Utc>) -> Self {
        Self {
            identity,
            history: AlertHistory::with_capacity(capacity),
            first_seen: now,
            last_seen: now,
            last_notified: None,
            notification_count: 0,
            absent_cycles: 0,
        }
    }
}

pub struct AlertStateStore {
    config: StoreConfig,
    states: HashMap<String, AlertState>,
}

impl AlertStateStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    /// Rebuild from persisted states. Histories take the configured
    /// capacity, not whatever was saved.
    pub(crate) fn from_states(config: StoreConfig, states: Vec<AlertState>) -> Self {
        let states = states
            .into_iter()
            .filter(|s| !s.history.is_empty())
            .map(|mut s| {
                s.history.resize(config.history_capacity);
                (s.identity.clone(), s)
            })
            .collect();
        Self { config, states }
    }

    pub fn set_config(&mut self, config: StoreConfig) {
        if config == self.config {
            return;
        }
        for state in self.states.values_mut() {
            state.history.resize(config.history_capacity);
        }
        self.config = config;
    }

    pub fn get(&self, identity: &str) -> Option<&AlertState> {
        self.states.get(identity)
    }

    /// Append an observation, creating the state on first sight.
    pub fn record(&mut self, identity: &str, alert: &AlertRecord, now: DateTime<Utc>) -> &AlertState {
        let capacity = self.config.history_capacity;
        let state = self
            .states
            .entry(identity.to_string())
            .or_insert_with(|| AlertState::new(identity.to_string(), capacity, now));

        state.history.push(AlertHistoryEntry {
            content_hash: alert.content_hash(),
            severity_priority: alert.severity_priority(),
            observed_at: now,
        });
        if now > state.last_seen {
            state.last_seen = now;
        }
        state.absent_cycles = 0;
        state
    }

    /// Bookkeeping after a notification went out. Returns false for an unknown identity.
    pub fn mark_notified(&mut self, identity: &str, now: DateTime<Utc>) -> bool {
        match self.states.get_mut(identity) {
            Some(state) => {
                state.last_notified = Some(now);
                state.notification_count += 1;
                true
            }
            None => false,
        }
    }

    /// Age out identities missing from this cycle's feed.
    ///
    /// Returns the identities that were deleted.
    pub fn prune(&mut self, seen: &HashSet<String>, now: DateTime<Utc>) -> Vec<String> {
        let absence_limit = self.config.absence_cycles.max(1);
        let retention = self.config.retention();
        let mut removed = Vec::new();

        self.states.retain(|identity, state| {
            if seen.contains(identity) {
                return true;
            }
            state.absent_cycles += 1;
            // A clock that went backwards never ages anything out.
            let expired = now > state.last_seen && now - state.last_seen > retention;
            if state.absent_cycles >= absence_limit || expired {
                removed.push(identity.clone());
                false
            } else {
                true
            }
        });

        removed.sort();
        removed
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlertState> {
        self.states.values()
    }
}
