//! FTP connector.
//!
//! Built on the `suppaftp` crate. The blocking FTP stream lives behind a
//! `parking_lot::Mutex` and every call runs in `spawn_blocking`, mirroring
//! the SSH connector. Liveness is a `PWD` round-trip. Anonymous login is
//! used when the endpoint carries no password.

use std::io::Cursor;
use std::net::ToSocketAddrs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use suppaftp::FtpStream;
use tokio::task;
use tracing::{debug, trace};

use super::{Capability, Connector, ConnectorError, ConnectorResult, Endpoint};

const CAPABILITIES: &[Capability] = &[Capability::Upload, Capability::Download];

/// A live FTP session.
pub struct FtpConnector {
    identifier: String,
    stream: Arc<Mutex<Option<FtpStream>>>,
}

impl FtpConnector {
    /// Connect and log in to `endpoint`.
    pub async fn connect(endpoint: &Endpoint) -> ConnectorResult<Self> {
        let identifier = endpoint.identifier();
        debug!(endpoint = %identifier, "Connecting via FTP");

        let ep = endpoint.clone();
        let stream = task::spawn_blocking(move || Self::connect_sync(&ep))
            .await
            .map_err(|e| ConnectorError::ConnectFailed(format!("task join error: {}", e)))??;

        Ok(Self {
            identifier,
            stream: Arc::new(Mutex::new(Some(stream))),
        })
    }

    fn connect_sync(endpoint: &Endpoint) -> ConnectorResult<FtpStream> {
        let addr = format!("{}:{}", endpoint.addr, endpoint.port);
        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| ConnectorError::ConnectFailed(format!("resolve {}: {}", addr, e)))?
            .next()
            .ok_or_else(|| {
                ConnectorError::ConnectFailed(format!("no address for {}", addr))
            })?;

        let mut stream = FtpStream::connect_timeout(socket_addr, endpoint.timeout)
            .map_err(|e| ConnectorError::ConnectFailed(format!("{}: {}", addr, e)))?;

        let (user, password) = match &endpoint.password {
            Some(password) => (endpoint.user.as_str(), password.as_str()),
            None => ("anonymous", ""),
        };
        stream
            .login(user, password)
            .map_err(|e| ConnectorError::AuthFailed(e.to_string()))?;

        Ok(stream)
    }

    /// List entries in a remote directory.
    pub async fn list(&self, directory: Option<&str>) -> ConnectorResult<Vec<String>> {
        let stream = self.stream.clone();
        let directory = directory.map(str::to_string);

        task::spawn_blocking(move || {
            let mut guard = stream.lock();
            let ftp = guard.as_mut().ok_or(ConnectorError::NotConnected)?;
            ftp.list(directory.as_deref())
                .map_err(|e| ConnectorError::ExecFailed(format!("LIST: {}", e)))
        })
        .await
        .map_err(|e| ConnectorError::ExecFailed(format!("task join error: {}", e)))?
    }
}

impl std::fmt::Debug for FtpConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtpConnector")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for FtpConnector {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn transport(&self) -> &'static str {
        "ftp"
    }

    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }

    async fn is_alive(&self) -> bool {
        let stream = self.stream.clone();
        task::spawn_blocking(move || {
            let mut guard = stream.lock();
            match guard.as_mut() {
                Some(ftp) => ftp.pwd().is_ok(),
                None => false,
            }
        })
        .await
        .unwrap_or(false)
    }

    async fn upload(&self, local: &Path, remote: &Path) -> ConnectorResult<()> {
        let stream = self.stream.clone();
        let local = local.to_path_buf();
        let remote = remote.to_string_lossy().into_owned();
        debug!(endpoint = %self.identifier, local = %local.display(), remote = %remote, "Uploading via FTP");

        task::spawn_blocking(move || {
            let content = std::fs::read(&local).map_err(|e| {
                ConnectorError::TransferFailed(format!("read {}: {}", local.display(), e))
            })?;

            let mut guard = stream.lock();
            let ftp = guard.as_mut().ok_or(ConnectorError::NotConnected)?;
            ftp.put_file(&remote, &mut Cursor::new(content))
                .map_err(|e| ConnectorError::TransferFailed(format!("STOR {}: {}", remote, e)))?;
            Ok(())
        })
        .await
        .map_err(|e| ConnectorError::TransferFailed(format!("task join error: {}", e)))?
    }

    async fn download(&self, remote: &Path, local: &Path) -> ConnectorResult<()> {
        let stream = self.stream.clone();
        let remote = remote.to_string_lossy().into_owned();
        let local = local.to_path_buf();
        debug!(endpoint = %self.identifier, remote = %remote, local = %local.display(), "Downloading via FTP");

        task::spawn_blocking(move || {
            let content = {
                let mut guard = stream.lock();
                let ftp = guard.as_mut().ok_or(ConnectorError::NotConnected)?;
                ftp.retr_as_buffer(&remote)
                    .map_err(|e| ConnectorError::TransferFailed(format!("RETR {}: {}", remote, e)))?
                    .into_inner()
            };

            if let Some(parent) = local.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ConnectorError::TransferFailed(format!("mkdir {}: {}", parent.display(), e))
                })?;
            }
            std::fs::write(&local, content).map_err(|e| {
                ConnectorError::TransferFailed(format!("write {}: {}", local.display(), e))
            })?;
            Ok(())
        })
        .await
        .map_err(|e| ConnectorError::TransferFailed(format!("task join error: {}", e)))?
    }

    async fn close(&self) -> ConnectorResult<()> {
        let stream = self.stream.clone();
        let identifier = self.identifier.clone();

        task::spawn_blocking(move || {
            // take() makes close idempotent; a second call finds nothing.
            if let Some(mut ftp) = stream.lock().take() {
                if let Err(e) = ftp.quit() {
                    trace!(endpoint = %identifier, error = %e, "FTP QUIT reported an error");
                }
            }
        })
        .await
        .ok();

        Ok(())
    }
}
