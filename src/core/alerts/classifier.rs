// Change classification: compares an incoming alert with its stored history.

use chrono::{DateTime, Utc};

use super::model::{AlertRecord, ChangeKind};
use super::state::AlertState;

/// Compare `incoming` against the most recent observation in `prior`.
///
/// A missing state (never seen, pruned, or lost) is always `New`.
pub fn classify(prior: Option<&AlertState>, incoming: &AlertRecord) -> ChangeKind {
    let last = match prior.and_then(|state| state.history.last()) {
        Some(entry) => entry,
        None => return ChangeKind::New,
    };

    if last.content_hash == incoming.content_hash() {
        return ChangeKind::Unchanged;
    }

    let priority = incoming.severity_priority();
    if priority > last.severity_priority {
        ChangeKind::Escalated
    } else if priority < last.severity_priority {
        ChangeKind::Deescalated
    } else {
        ChangeKind::ContentUpdated
    }
}

/// Classification used by the engine each cycle.
///
/// Expiry wins over every other outcome. With `suppress_reverted` set, an
/// update back to content still held in the retained history counts as
/// `Unchanged`, which absorbs A -> B -> A flapping from the provider.
pub fn classify_at(
    prior: Option<&AlertState>,
    incoming: &AlertRecord,
    now: DateTime<Utc>,
    suppress_reverted: bool,
) -> ChangeKind {
    if incoming.is_expired(now) {
        return ChangeKind::Expired;
    }

    let kind = classify(prior, incoming);
    if kind == ChangeKind::ContentUpdated && suppress_reverted {
        let reverted = prior
            .map(|state| state.history.contains_hash(&incoming.content_hash()))
            .unwrap_or(false);
        if reverted {
            return ChangeKind::Unchanged;
        }
    }
    kind
}
