// Alert lifecycle and notification engine.
//
// Architecture:
// - model.rs: Alert records, settings and dispatch decisions
// - state.rs: Per-alert bounded history and notification bookkeeping
// - classifier.rs: New / unchanged / updated / escalated / expired detection
// - policy.rs: Severity threshold and ignored categories
// - cooldown.rs: Global, per-alert and escalation gates
// - rate_limit.rs: Token bucket throughput cap
// - format.rs: Accessible notification text
// - engine.rs: Orchestrates one poll cycle

pub mod classifier;
pub mod cooldown;
pub mod engine;
pub mod format;
pub mod model;
pub mod policy;
pub mod rate_limit;
pub mod state;
