//! Sequential transition runner
//!
//! Offers a record to each registered transition in order. A transition that
//! fails is logged and recorded in the outcome; the remaining transitions still
//! run (per-transition error isolation).

use crate::records::RecordLine;
use crate::types::Transition;
use chw_common::documents::DataRecord;
use chw_common::StoreError;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of running every transition over one record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutcome {
    /// Names of transitions that changed the record
    pub applied: Vec<String>,
    /// Transitions that failed, with the failure they reported
    pub failures: Vec<TransitionFailure>,
}

impl RunOutcome {
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionFailure {
    pub transition: String,
    pub error: StoreError,
}

/// Totals over a batch of records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub changed: usize,
    pub failed: usize,
    /// Input lines that were not data records and were passed through
    pub rejected: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &RunOutcome) {
        self.processed += 1;
        if outcome.changed() {
            self.changed += 1;
        }
        if !outcome.failures.is_empty() {
            self.failed += 1;
        }
    }
}

pub struct TransitionRunner {
    transitions: Vec<Arc<dyn Transition>>,
}

impl TransitionRunner {
    pub fn new(transitions: Vec<Arc<dyn Transition>>) -> Self {
        Self { transitions }
    }

    /// Run all transitions over `record`, mutating it in place
    pub async fn run(&self, record: &mut DataRecord) -> RunOutcome {
        let mut outcome = RunOutcome::default();

        for transition in &self.transitions {
            let name = transition.name();
            if !transition.filter(record) {
                debug!(transition = name, record_id = record.id.as_deref().unwrap_or("-"), "Filtered out");
                continue;
            }

            match transition.on_match(record).await {
                Ok(true) => outcome.applied.push(name.to_string()),
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        transition = name,
                        record_id = record.id.as_deref().unwrap_or("-"),
                        error = %e,
                        "Transition failed"
                    );
                    outcome.failures.push(TransitionFailure {
                        transition: name.to_string(),
                        error: e,
                    });
                }
            }
        }

        outcome
    }

    /// Run every record of a batch in order
    pub async fn run_batch(&self, records: &mut [DataRecord]) -> RunSummary {
        let mut summary = RunSummary::default();
        for record in records.iter_mut() {
            let outcome = self.run(record).await;
            summary.record(&outcome);
        }
        summary
    }

    /// Run every parsed line of a batch, counting rejected lines
    pub async fn run_lines(&self, lines: &mut [RecordLine]) -> RunSummary {
        let mut summary = RunSummary::default();
        for line in lines.iter_mut() {
            match line.record_mut() {
                Some(record) => {
                    let outcome = self.run(record).await;
                    summary.record(&outcome);
                }
                None => summary.rejected += 1,
            }
        }
        summary
    }

    pub fn count(&self) -> usize {
        self.transitions.len()
    }
}
