use std::sync::Arc;

use super::alerts::engine::AlertEngine;
use super::alerts::format::NotificationFormatter;
use super::alerts::model::{AlertRecord, AlertSettings, DispatchDecision};
use super::alerts::state::StoreConfig;
use super::clock::Clock;
use super::notify::{dispatch, DispatchReport, Notifier};

pub struct CoordinatorOutput {
    pub decisions: Vec<DispatchDecision>,
    pub report: DispatchReport,
    pub logs: Vec<String>,
}

/// Drives one engine per poll cycle. Whoever owns the coordinator is the
/// engine's only writer.
pub struct Coordinator<N: Notifier> {
    engine: AlertEngine,
    notifier: N,
    clock: Arc<dyn Clock>,
}

impl<N: Notifier> Coordinator<N> {
    pub fn new(engine: AlertEngine, notifier: N, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine,
            notifier,
            clock,
        }
    }

    pub fn tick(&mut self, alerts: &[AlertRecord], settings: &AlertSettings) -> CoordinatorOutput {
        let mut logs = Vec::new();
        let now = self.clock.now();

        // 1. Classify and decide
        let decisions = self.engine.process_cycle(alerts, settings, now);

        // 2. Dispatch; a failed send keeps its spent cooldown and token
        let report = dispatch(&decisions, &self.notifier, settings.sound_enabled);

        let formatter = NotificationFormatter::new(settings.max_text_length);
        for decision in decisions.iter().filter(|d| d.should_notify) {
            let details = formatter.details(&decision.alert);
            logs.push(format!(
                "Notified [{}] {} ({})",
                decision.change_kind, decision.title, details.area
            ));
        }
        for error in &report.errors {
            logs.push(format!("Delivery failed: {}", error));
        }
        if report.suppressed > 0 {
            logs.push(format!(
                "Processed {} alerts, {} suppressed",
                decisions.len(),
                report.suppressed
            ));
        }

        CoordinatorOutput {
            decisions,
            report,
            logs,
        }
    }

    pub fn set_store_config(&mut self, config: StoreConfig) {
        self.engine.set_store_config(config);
    }

    /// Read-only access for diagnostics.
    pub fn engine(&self) -> &AlertEngine {
        &self.engine
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }
}
