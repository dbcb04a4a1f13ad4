//! Operations: units of work executed against a live connector.
//!
//! An [`Operation`] receives a connector the resolver already proved live
//! and returns a JSON payload, or fails. Built-ins cover the common cases
//! (single command, command series, upload, download) and [`CustomOp`] wraps
//! an arbitrary caller-supplied closure. Operations that need a capability
//! the transport lacks fail with a typed error instead of probing the
//! concrete connector type.
//!
//! Timeouts live here, not in the engine: an operation bounds its own
//! transport calls when configured with a deadline.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;

use crate::connection::{Capability, CommandOutput, Connector, ConnectorError};
use crate::transfer;

/// Default per-operation deadline, in seconds.
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

/// Errors raised by operation bodies.
#[derive(Error, Debug)]
pub enum OperationError {
    /// Transport-level failure.
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// The operation exceeded its own deadline.
    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    /// Local filesystem failure while staging a transfer.
    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reported by a custom operation body.
    #[error("{0}")]
    Custom(String),
}

/// Result type for operation bodies.
pub type OpResult = Result<Value, OperationError>;

/// A unit of work against one live connector.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Short name used in logs and batch descriptions.
    fn name(&self) -> &str;

    /// Run the operation against a live connector.
    async fn apply(&self, conn: &dyn Connector) -> OpResult;
}

fn require(conn: &dyn Connector, capability: Capability) -> Result<(), OperationError> {
    if conn.supports(capability) {
        Ok(())
    } else {
        Err(ConnectorError::Unsupported {
            transport: conn.transport(),
            capability,
        }
        .into())
    }
}

async fn with_deadline<T>(
    timeout: Option<Duration>,
    fut: impl std::future::Future<Output = Result<T, OperationError>>,
) -> Result<T, OperationError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| OperationError::Timeout(limit.as_secs()))?,
        None => fut.await,
    }
}

fn command_payload(command: &str, output: &CommandOutput) -> Value {
    json!({
        "command": command,
        "output": output.stdout,
        "error": output.stderr,
        "exit_code": output.exit_code,
    })
}

/// Run one command.
///
/// The payload reports stdout, stderr, and the exit code; a non-zero exit
/// is data, not an operation failure; only transport errors fail the
/// operation.
pub struct CommandOp {
    command: String,
    timeout: Option<Duration>,
}

impl CommandOp {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: Some(Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS)),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Operation for CommandOp {
    fn name(&self) -> &str {
        "run command"
    }

    async fn apply(&self, conn: &dyn Connector) -> OpResult {
        require(conn, Capability::Execute)?;
        let output = with_deadline(self.timeout, async {
            Ok(conn.execute(&self.command).await?)
        })
        .await?;
        Ok(command_payload(&self.command, &output))
    }
}

/// Run a series of commands in order on one connection.
///
/// The series stops at the first transport error; results for completed
/// commands are reported per command.
pub struct CommandSeriesOp {
    commands: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandSeriesOp {
    pub fn new(commands: Vec<String>) -> Self {
        Self {
            commands,
            timeout: Some(Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS)),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Operation for CommandSeriesOp {
    fn name(&self) -> &str {
        "run commands"
    }

    async fn apply(&self, conn: &dyn Connector) -> OpResult {
        require(conn, Capability::Execute)?;

        let mut results = Vec::with_capacity(self.commands.len());
        for command in &self.commands {
            let output = with_deadline(self.timeout, async {
                Ok(conn.execute(command).await?)
            })
            .await?;
            results.push(command_payload(command, &output));
        }
        Ok(json!({ "results": results }))
    }
}

/// Upload one local file, optionally staged through a gzipped tar archive.
pub struct UploadOp {
    local: PathBuf,
    remote: PathBuf,
    compress: bool,
    timeout: Option<Duration>,
}

impl UploadOp {
    pub fn new(local: impl AsRef<std::path::Path>, remote: impl AsRef<std::path::Path>) -> Self {
        Self {
            local: local.as_ref().to_path_buf(),
            remote: remote.as_ref().to_path_buf(),
            compress: false,
            timeout: None,
        }
    }

    pub fn compressed(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Operation for UploadOp {
    fn name(&self) -> &str {
        "upload file"
    }

    async fn apply(&self, conn: &dyn Connector) -> OpResult {
        require(conn, Capability::Upload)?;

        // Staging happens on the blocking pool; archives can be large.
        let (staging, staged) = if self.compress {
            let source = self.local.clone();
            let (guard, archive) =
                tokio::task::spawn_blocking(move || transfer::compress_file(&source))
                    .await
                    .map_err(|e| OperationError::Custom(format!("task join error: {}", e)))??;
            (Some(guard), archive)
        } else {
            (None, self.local.clone())
        };

        let digest = transfer::md5_hex(&staged)?;
        let bytes = std::fs::metadata(&staged)?.len();
        info!(
            local = %staged.display(),
            remote = %self.remote.display(),
            md5 = %digest,
            "Uploading file"
        );

        with_deadline(self.timeout, async {
            Ok(conn.upload(&staged, &self.remote).await?)
        })
        .await?;
        drop(staging);

        Ok(json!({
            "uploaded": true,
            "remote": self.remote.display().to_string(),
            "compressed": self.compress,
            "bytes": bytes,
            "md5": digest,
        }))
    }
}

/// Download one remote file, optionally unpacking a gzipped tar archive
/// next to it afterwards.
pub struct DownloadOp {
    remote: PathBuf,
    local: PathBuf,
    decompress: bool,
    timeout: Option<Duration>,
}

impl DownloadOp {
    pub fn new(remote: impl AsRef<std::path::Path>, local: impl AsRef<std::path::Path>) -> Self {
        Self {
            remote: remote.as_ref().to_path_buf(),
            local: local.as_ref().to_path_buf(),
            decompress: false,
            timeout: None,
        }
    }

    pub fn decompressed(mut self, decompress: bool) -> Self {
        self.decompress = decompress;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Operation for DownloadOp {
    fn name(&self) -> &str {
        "download file"
    }

    async fn apply(&self, conn: &dyn Connector) -> OpResult {
        require(conn, Capability::Download)?;

        with_deadline(self.timeout, async {
            Ok(conn.download(&self.remote, &self.local).await?)
        })
        .await?;

        let digest = transfer::md5_hex(&self.local)?;
        let bytes = std::fs::metadata(&self.local)?.len();
        info!(
            remote = %self.remote.display(),
            local = %self.local.display(),
            md5 = %digest,
            "Downloaded file"
        );

        if self.decompress {
            let archive = self.local.clone();
            let dest = self
                .local
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            tokio::task::spawn_blocking(move || transfer::decompress_archive(&archive, &dest))
                .await
                .map_err(|e| OperationError::Custom(format!("task join error: {}", e)))??;
        }

        Ok(json!({
            "downloaded": true,
            "local": self.local.display().to_string(),
            "decompressed": self.decompress,
            "bytes": bytes,
            "md5": digest,
        }))
    }
}

/// Type of the closure wrapped by [`CustomOp`].
pub type CustomFn =
    Box<dyn for<'a> Fn(&'a dyn Connector) -> BoxFuture<'a, OpResult> + Send + Sync>;

/// Arbitrary caller-supplied operation body.
///
/// ```rust,ignore
/// let op = CustomOp::new("gather uname", |conn| {
///     Box::pin(async move {
///         let out = conn.execute("uname -a").await?;
///         Ok(serde_json::json!({ "uname": out.stdout.trim() }))
///     })
/// });
/// ```
pub struct CustomOp {
    name: String,
    body: CustomFn,
}

impl CustomOp {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: for<'a> Fn(&'a dyn Connector) -> BoxFuture<'a, OpResult> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: Box::new(body),
        }
    }
}

#[async_trait]
impl Operation for CustomOp {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, conn: &dyn Connector) -> OpResult {
        (self.body)(conn).await
    }
}
