//! SSH connector.
//!
//! Built on the `ssh2` crate. All libssh2 calls are synchronous, so every
//! session interaction runs inside `tokio::task::spawn_blocking` with the
//! session behind a `parking_lot::Mutex`. File transfer uses SFTP.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use ssh2::Session;
use tokio::task;
use tracing::{debug, trace, warn};

use super::{Capability, CommandOutput, Connector, ConnectorError, ConnectorResult, Endpoint};

const CAPABILITIES: &[Capability] = &[Capability::Execute, Capability::Upload, Capability::Download];

/// A live SSH session.
pub struct SshConnector {
    identifier: String,
    session: Arc<Mutex<Session>>,
    connected: Arc<Mutex<bool>>,
}

impl SshConnector {
    /// Connect and authenticate against `endpoint`.
    ///
    /// Key authentication is tried when the endpoint carries a key path,
    /// then password authentication when it carries a password.
    pub async fn connect(endpoint: &Endpoint) -> ConnectorResult<Self> {
        let identifier = endpoint.identifier();
        debug!(
            endpoint = %identifier,
            client_tag = endpoint.client_tag.as_deref().unwrap_or("-"),
            "Connecting via SSH"
        );

        let ep = endpoint.clone();
        let session = task::spawn_blocking(move || Self::connect_sync(&ep))
            .await
            .map_err(|e| ConnectorError::ConnectFailed(format!("task join error: {}", e)))??;

        Ok(Self {
            identifier,
            session: Arc::new(Mutex::new(session)),
            connected: Arc::new(Mutex::new(true)),
        })
    }

    fn connect_sync(endpoint: &Endpoint) -> ConnectorResult<Session> {
        let addr = format!("{}:{}", endpoint.addr, endpoint.port);
        let socket_addr = addr
            .parse()
            .map_err(|e| ConnectorError::ConnectFailed(format!("invalid address {}: {}", addr, e)))?;

        let tcp = TcpStream::connect_timeout(&socket_addr, endpoint.timeout)
            .map_err(|e| ConnectorError::ConnectFailed(format!("{}: {}", addr, e)))?;
        tcp.set_read_timeout(Some(endpoint.timeout)).ok();
        tcp.set_write_timeout(Some(endpoint.timeout)).ok();
        tcp.set_nodelay(true).ok();

        let mut session = Session::new()
            .map_err(|e| ConnectorError::ConnectFailed(format!("session init: {}", e)))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(endpoint.timeout.as_millis() as u32);
        session
            .handshake()
            .map_err(|e| ConnectorError::ConnectFailed(format!("handshake: {}", e)))?;

        Self::authenticate(&session, endpoint)?;
        Ok(session)
    }

    fn authenticate(session: &Session, endpoint: &Endpoint) -> ConnectorResult<()> {
        if let Some(key) = &endpoint.ssh_key {
            match session.userauth_pubkey_file(&endpoint.user, None, key, None) {
                Ok(()) => {
                    trace!(key = %key.display(), "Authenticated using key");
                    return Ok(());
                }
                Err(e) => warn!(key = %key.display(), error = %e, "Key authentication failed"),
            }
        }

        if let Some(password) = &endpoint.password {
            session
                .userauth_password(&endpoint.user, password)
                .map_err(|e| ConnectorError::AuthFailed(e.to_string()))?;
            return Ok(());
        }

        if session.authenticated() {
            return Ok(());
        }

        Err(ConnectorError::AuthFailed(format!(
            "no usable credentials for {}",
            endpoint.user
        )))
    }

    fn exec_sync(session: &Session, command: &str) -> ConnectorResult<CommandOutput> {
        let mut channel = session
            .channel_session()
            .map_err(|e| ConnectorError::ExecFailed(format!("open channel: {}", e)))?;

        channel
            .exec(command)
            .map_err(|e| ConnectorError::ExecFailed(e.to_string()))?;

        let mut stdout = String::new();
        channel
            .read_to_string(&mut stdout)
            .map_err(|e| ConnectorError::ExecFailed(format!("read stdout: {}", e)))?;

        let mut stderr = String::new();
        channel
            .stderr()
            .read_to_string(&mut stderr)
            .map_err(|e| ConnectorError::ExecFailed(format!("read stderr: {}", e)))?;

        channel.wait_close().ok();
        let exit_code = channel.exit_status().unwrap_or(-1);

        Ok(CommandOutput::new(stdout, stderr, exit_code))
    }
}

impl std::fmt::Debug for SshConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshConnector")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for SshConnector {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn transport(&self) -> &'static str {
        "ssh"
    }

    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }

    async fn is_alive(&self) -> bool {
        let session = self.session.clone();
        let connected = self.connected.clone();

        task::spawn_blocking(move || {
            if !*connected.lock() {
                return false;
            }
            let session = session.lock();
            // A trivial exec proves the transport serves requests, not
            // merely that the TCP session is up.
            matches!(Self::exec_sync(&session, "true"), Ok(out) if out.is_success())
        })
        .await
        .unwrap_or(false)
    }

    async fn execute(&self, command: &str) -> ConnectorResult<CommandOutput> {
        if !*self.connected.lock() {
            return Err(ConnectorError::NotConnected);
        }

        let session = self.session.clone();
        let command = command.to_string();
        trace!(endpoint = %self.identifier, command = %command, "Executing remote command");

        task::spawn_blocking(move || {
            let session = session.lock();
            Self::exec_sync(&session, &command)
        })
        .await
        .map_err(|e| ConnectorError::ExecFailed(format!("task join error: {}", e)))?
    }

    async fn upload(&self, local: &Path, remote: &Path) -> ConnectorResult<()> {
        if !*self.connected.lock() {
            return Err(ConnectorError::NotConnected);
        }

        let session = self.session.clone();
        let local = local.to_path_buf();
        let remote = remote.to_path_buf();
        debug!(local = %local.display(), remote = %remote.display(), "Uploading via SFTP");

        task::spawn_blocking(move || {
            let session = session.lock();
            let sftp = session
                .sftp()
                .map_err(|e| ConnectorError::TransferFailed(format!("sftp subsystem: {}", e)))?;

            let content = std::fs::read(&local).map_err(|e| {
                ConnectorError::TransferFailed(format!("read {}: {}", local.display(), e))
            })?;

            let mut remote_file = sftp.create(&remote).map_err(|e| {
                ConnectorError::TransferFailed(format!("create {}: {}", remote.display(), e))
            })?;
            remote_file
                .write_all(&content)
                .map_err(|e| ConnectorError::TransferFailed(format!("write remote: {}", e)))?;

            Ok(())
        })
        .await
        .map_err(|e| ConnectorError::TransferFailed(format!("task join error: {}", e)))?
    }

    async fn download(&self, remote: &Path, local: &Path) -> ConnectorResult<()> {
        if !*self.connected.lock() {
            return Err(ConnectorError::NotConnected);
        }

        let session = self.session.clone();
        let remote = remote.to_path_buf();
        let local = local.to_path_buf();
        debug!(remote = %remote.display(), local = %local.display(), "Downloading via SFTP");

        task::spawn_blocking(move || {
            let session = session.lock();
            let sftp = session
                .sftp()
                .map_err(|e| ConnectorError::TransferFailed(format!("sftp subsystem: {}", e)))?;

            let mut remote_file = sftp.open(&remote).map_err(|e| {
                ConnectorError::TransferFailed(format!("open {}: {}", remote.display(), e))
            })?;
            let mut content = Vec::new();
            remote_file
                .read_to_end(&mut content)
                .map_err(|e| ConnectorError::TransferFailed(format!("read remote: {}", e)))?;

            if let Some(parent) = local.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ConnectorError::TransferFailed(format!("mkdir {}: {}", parent.display(), e))
                })?;
            }
            std::fs::write(&local, &content).map_err(|e| {
                ConnectorError::TransferFailed(format!("write {}: {}", local.display(), e))
            })?;

            Ok(())
        })
        .await
        .map_err(|e| ConnectorError::TransferFailed(format!("task join error: {}", e)))?
    }

    async fn close(&self) -> ConnectorResult<()> {
        {
            let mut connected = self.connected.lock();
            if !*connected {
                return Ok(());
            }
            *connected = false;
        }

        let session = self.session.clone();
        let identifier = self.identifier.clone();
        task::spawn_blocking(move || {
            let session = session.lock();
            if let Err(e) = session.disconnect(None, "closing", None) {
                debug!(endpoint = %identifier, error = %e, "SSH disconnect reported an error");
            }
        })
        .await
        .ok();

        Ok(())
    }
}
