//! Connection layer for remote host communication.
//!
//! Every transport implements the [`Connector`] trait: a live session that
//! can prove its own liveness, execute commands, and move files. Transports
//! differ in which capabilities they support, and they say so explicitly
//! through [`Connector::capabilities`]; callers branch on capability, never
//! on the concrete implementation.
//!
//! # Supported transports
//!
//! - [`SshConnector`](ssh::SshConnector): SSH via the `ssh2` crate, SFTP
//!   transfers. Exec, upload, download.
//! - [`SmbConnector`](smb::SmbConnector): SMB shares through the external
//!   `smbclient` tool. Upload, download.
//! - [`WinExecConnector`](winexec::WinExecConnector): Windows remote exec
//!   through an external tool. Exec only.
//! - [`FtpConnector`](ftp::FtpConnector): FTP via the `suppaftp` crate.
//!   Upload, download.

pub mod ftp;
pub mod smb;
pub mod ssh;
pub mod winexec;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::inventory::{Host, Route};

/// Errors that can occur during connector operations.
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Failed to establish the initial connection.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// Authentication was rejected by the remote end.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Command execution failed at the transport level.
    #[error("command execution failed: {0}")]
    ExecFailed(String),

    /// File upload or download failed.
    #[error("file transfer failed: {0}")]
    TransferFailed(String),

    /// A transport call exceeded its deadline.
    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    /// The session is no longer connected.
    #[error("not connected")]
    NotConnected,

    /// The transport does not implement the requested capability.
    #[error("transport '{transport}' does not support {capability}")]
    Unsupported {
        transport: &'static str,
        capability: Capability,
    },

    /// I/O error during connector operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// A capability a transport may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Remote command execution.
    Execute,
    /// File upload.
    Upload,
    /// File download.
    Download,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Execute => write!(f, "command execution"),
            Capability::Upload => write!(f, "file upload"),
            Capability::Download => write!(f, "file download"),
        }
    }
}

/// Output of one remote command: the stdout/stderr channel pair plus the
/// exit status where the transport reports one.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn new(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
        }
    }

    /// Whether the command exited zero.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Combined stdout and stderr.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
            (false, true) => self.stdout.clone(),
            (true, _) => self.stderr.clone(),
        }
    }
}

/// A live transport session.
///
/// Sessions are created connected (each implementation exposes its own
/// `connect` constructor) and are exclusively owned by the batch task that
/// resolved them. `close` is idempotent and best-effort; callers log its
/// failures but never let them change an operation's outcome.
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// Session identifier, e.g. `user@addr:port`.
    fn identifier(&self) -> &str;

    /// Short transport name for diagnostics.
    fn transport(&self) -> &'static str;

    /// Capabilities this transport supports.
    fn capabilities(&self) -> &'static [Capability];

    /// Whether a given capability is supported.
    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Side-effect-free probe that the session can actually serve requests.
    async fn is_alive(&self) -> bool;

    /// Execute a command on the remote end.
    async fn execute(&self, command: &str) -> ConnectorResult<CommandOutput> {
        let _ = command;
        Err(ConnectorError::Unsupported {
            transport: self.transport(),
            capability: Capability::Execute,
        })
    }

    /// Upload a local file to the remote end.
    async fn upload(&self, local: &Path, remote: &Path) -> ConnectorResult<()> {
        let _ = (local, remote);
        Err(ConnectorError::Unsupported {
            transport: self.transport(),
            capability: Capability::Upload,
        })
    }

    /// Download a remote file to a local path.
    async fn download(&self, remote: &Path, local: &Path) -> ConnectorResult<()> {
        let _ = (remote, local);
        Err(ConnectorError::Unsupported {
            transport: self.transport(),
            capability: Capability::Download,
        })
    }

    /// Close the session. Idempotent, best-effort.
    async fn close(&self) -> ConnectorResult<()>;
}

/// Connection endpoint derived from a host and one of its routes.
///
/// The terminal hop of the route supplies address, port, user, and tool
/// where present; the host fills in the rest, including credentials and the
/// connect timeout.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub addr: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub ssh_key: Option<std::path::PathBuf>,
    pub timeout: Duration,
    pub client_tag: Option<String>,
    pub tool: Option<String>,
}

impl Endpoint {
    /// Derive the endpoint for connecting to `host` through `route`.
    ///
    /// Only the terminal hop is dialed; intermediate hops are carried as
    /// data and left to transport-level configuration.
    pub fn derive(host: &Host, route: &Route) -> Self {
        let hop = route.last_hop();
        Self {
            addr: hop.map_or_else(|| host.addr.clone(), |h| h.addr.clone()),
            port: hop.and_then(|h| h.port).unwrap_or(host.port),
            user: hop
                .and_then(|h| h.user.clone())
                .unwrap_or_else(|| host.user.clone()),
            password: host.password.clone(),
            ssh_key: host.ssh_key.clone(),
            timeout: host.connect_timeout(),
            client_tag: host.options.client_tag.clone(),
            tool: hop
                .and_then(|h| h.tool.clone())
                .or_else(|| host.tool.clone()),
        }
    }

    /// `user@addr:port` identifier for logging.
    pub fn identifier(&self) -> String {
        format!("{}@{}:{}", self.user, self.addr, self.port)
    }
}
