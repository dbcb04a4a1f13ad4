//! Concurrent batch execution engine.
//!
//! [`BatchRunner::run`] executes one operation against a set of hosts: one
//! task per host, concurrency capped by a semaphore sized `max_workers`,
//! results gathered in completion order. Each task resolves its host
//! through the route resolver, runs the operation body, and always attempts
//! to close the connector, converting every per-host failure into data. The
//! engine applies no batch-level deadline; a hung transport occupies one
//! worker slot until it returns.
//!
//! Retry is caller-composed: [`BatchResult::failed_hosts`] feeds the host
//! set of a follow-up batch.

pub mod progress;
pub mod result;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::inventory::Host;
use crate::ops::{CommandOp, CommandSeriesOp, CustomOp, DownloadOp, Operation, UploadOp};
use crate::resolver::RouteResolver;

use progress::BatchProgress;
pub use result::{BatchResult, OperationResult, Outcome};

/// Default worker-pool size.
pub const DEFAULT_MAX_WORKERS: usize = 10;

/// Engine construction errors. Per-host failures never surface here; they
/// are contained in [`OperationResult`]s.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("max_workers must be at least 1")]
    InvalidWorkers,
}

/// Runs operations across host sets with bounded parallelism.
#[derive(Clone)]
pub struct BatchRunner {
    max_workers: usize,
    resolver: RouteResolver,
    show_progress: bool,
}

impl Default for BatchRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchRunner {
    /// Runner with the default worker count and transport factory.
    pub fn new() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            resolver: RouteResolver::new(),
            show_progress: false,
        }
    }

    /// Set the worker-pool bound.
    pub fn with_max_workers(mut self, max_workers: usize) -> Result<Self, EngineError> {
        if max_workers == 0 {
            return Err(EngineError::InvalidWorkers);
        }
        self.max_workers = max_workers;
        Ok(self)
    }

    /// Substitute the route resolver (tests inject scripted factories here).
    pub fn with_resolver(mut self, resolver: RouteResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Enable the observational progress bar.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Run `operation` against every host, one task per host.
    ///
    /// Blocks until all tasks have completed; the returned [`BatchResult`]
    /// is complete and immutable. A panic inside an operation body is
    /// contained and recorded as that host's failure.
    #[instrument(skip(self, hosts, operation), fields(description = %description, hosts = hosts.len()))]
    pub async fn run(
        &self,
        hosts: Vec<Arc<Host>>,
        operation: Arc<dyn Operation>,
        description: &str,
    ) -> BatchResult {
        let started = Instant::now();
        let total = hosts.len();
        info!(workers = self.max_workers, "Batch started");

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let progress = BatchProgress::new(total, description, self.show_progress);

        let mut tasks: JoinSet<OperationResult> = JoinSet::new();
        let mut pending: HashMap<tokio::task::Id, Arc<Host>> = HashMap::new();

        for host in hosts {
            let semaphore = semaphore.clone();
            let resolver = self.resolver.clone();
            let operation = operation.clone();
            let task_host = host.clone();

            let handle = tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");
                run_one(&resolver, task_host, operation.as_ref()).await
            });
            pending.insert(handle.id(), host);
        }

        let mut successful = Vec::new();
        let mut failed = Vec::new();

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, result)) => {
                    pending.remove(&id);
                    if result.is_success() {
                        successful.push(result);
                    } else {
                        failed.push(result);
                    }
                }
                Err(join_error) => {
                    // A panicking operation body must not take the batch
                    // down; record it as that host's failure.
                    let id = join_error.id();
                    if let Some(host) = pending.remove(&id) {
                        warn!(host = %host.hostname, error = %join_error, "Task aborted");
                        failed.push(OperationResult::failure(
                            host,
                            format!("task aborted: {}", join_error),
                            started.elapsed(),
                        ));
                    } else {
                        warn!(error = %join_error, "Aborted task had no pending host entry");
                    }
                }
            }
            progress.record(successful.len(), failed.len());
        }
        progress.finish();

        let execution_time = started.elapsed();
        info!(
            total = total,
            succeeded = successful.len(),
            failed = failed.len(),
            elapsed_ms = execution_time.as_millis() as u64,
            "Batch completed"
        );

        BatchResult::new(successful, failed, total, execution_time)
    }

    /// Run one command on every host.
    pub async fn run_command(&self, hosts: Vec<Arc<Host>>, op: CommandOp) -> BatchResult {
        self.run(hosts, Arc::new(op), "Running command").await
    }

    /// Run a command series on every host.
    pub async fn run_commands(&self, hosts: Vec<Arc<Host>>, op: CommandSeriesOp) -> BatchResult {
        self.run(hosts, Arc::new(op), "Running commands").await
    }

    /// Upload a file to every host.
    pub async fn upload_file(&self, hosts: Vec<Arc<Host>>, op: UploadOp) -> BatchResult {
        self.run(hosts, Arc::new(op), "Uploading files").await
    }

    /// Download a file from every host.
    pub async fn download_file(&self, hosts: Vec<Arc<Host>>, op: DownloadOp) -> BatchResult {
        self.run(hosts, Arc::new(op), "Downloading files").await
    }

    /// Run a custom operation on every host.
    pub async fn run_custom(&self, hosts: Vec<Arc<Host>>, op: CustomOp) -> BatchResult {
        let description = format!("Running {}", op.name());
        self.run(hosts, Arc::new(op), &description).await
    }
}

/// One host's task: resolve, operate, always close.
async fn run_one(
    resolver: &RouteResolver,
    host: Arc<Host>,
    operation: &dyn Operation,
) -> OperationResult {
    let started = Instant::now();

    let conn = match resolver.resolve(&host).await {
        Ok(conn) => conn,
        Err(e) => {
            debug!(host = %host.hostname, error = %e, "Resolution failed");
            return OperationResult::failure(host, e.to_string(), started.elapsed());
        }
    };

    let outcome = operation.apply(conn.as_ref()).await;

    // Cleanup happens no matter how the body fared, and its failures never
    // reclassify the task.
    if let Err(e) = conn.close().await {
        warn!(host = %host.hostname, error = %e, "Disconnect failed");
    }

    let elapsed = started.elapsed();
    match outcome {
        Ok(payload) => OperationResult::success(host, payload, elapsed),
        Err(e) => OperationResult::failure(host, e.to_string(), elapsed),
    }
}
