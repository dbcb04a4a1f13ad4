//! Immutable result records produced by the batch engine.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::inventory::Host;

/// Outcome of one operation: a payload or an error description, never both.
#[derive(Debug, Clone)]
pub enum Outcome {
    Success(Value),
    Failure(String),
}

/// Outcome of running one operation against one host.
///
/// Constructed once by the engine and read-only afterwards.
#[derive(Debug, Clone)]
pub struct OperationResult {
    host: Arc<Host>,
    outcome: Outcome,
    elapsed: Duration,
}

impl OperationResult {
    pub fn success(host: Arc<Host>, payload: Value, elapsed: Duration) -> Self {
        Self {
            host,
            outcome: Outcome::Success(payload),
            elapsed,
        }
    }

    pub fn failure(host: Arc<Host>, error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            host,
            outcome: Outcome::Failure(error.into()),
            elapsed,
        }
    }

    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    /// Result payload; present exactly when the operation succeeded.
    pub fn payload(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Success(value) => Some(value),
            Outcome::Failure(_) => None,
        }
    }

    /// Error description; present exactly when the operation failed.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success(_) => None,
            Outcome::Failure(message) => Some(message),
        }
    }

    /// Wall-clock time from pre-resolve to post-operation.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Outcome of running one operation against a set of hosts.
///
/// Materialized once, after every task in the batch has completed; the
/// collections are in completion order, not submission order.
#[derive(Debug)]
pub struct BatchResult {
    successful: Vec<OperationResult>,
    failed: Vec<OperationResult>,
    total_hosts: usize,
    execution_time: Duration,
}

impl BatchResult {
    pub(crate) fn new(
        successful: Vec<OperationResult>,
        failed: Vec<OperationResult>,
        total_hosts: usize,
        execution_time: Duration,
    ) -> Self {
        debug_assert_eq!(total_hosts, successful.len() + failed.len());
        Self {
            successful,
            failed,
            total_hosts,
            execution_time,
        }
    }

    pub fn successful(&self) -> &[OperationResult] {
        &self.successful
    }

    pub fn failed(&self) -> &[OperationResult] {
        &self.failed
    }

    pub fn total_hosts(&self) -> usize {
        self.total_hosts
    }

    pub fn total_successful(&self) -> usize {
        self.successful.len()
    }

    pub fn total_failed(&self) -> usize {
        self.failed.len()
    }

    /// Batch wall-clock time.
    pub fn execution_time(&self) -> Duration {
        self.execution_time
    }

    /// Success percentage, `0.0` for an empty batch.
    pub fn success_rate(&self) -> f64 {
        if self.total_hosts == 0 {
            0.0
        } else {
            self.successful.len() as f64 / self.total_hosts as f64 * 100.0
        }
    }

    /// Hosts that succeeded, for chaining follow-up batches.
    pub fn successful_hosts(&self) -> Vec<Arc<Host>> {
        self.successful.iter().map(|r| r.host().clone()).collect()
    }

    /// Hosts that failed, for chaining remedial batches.
    pub fn failed_hosts(&self) -> Vec<Arc<Host>> {
        self.failed.iter().map(|r| r.host().clone()).collect()
    }

    /// Whether every host succeeded. True for an empty batch.
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}
