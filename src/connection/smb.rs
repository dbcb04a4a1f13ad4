//! SMB connector.
//!
//! Drives the external `smbclient` tool through `tokio::process`, the same
//! way the Docker transport of similar tools shells out to `docker`. Remote
//! paths name the share in their first component: `C$/temp/agent.bin` maps
//! to share `C$`, path `temp\agent.bin`.
//!
//! Command execution is not an SMB capability; this transport offers file
//! transfer and liveness only.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, trace};

use super::{Capability, Connector, ConnectorError, ConnectorResult, Endpoint};

const CAPABILITIES: &[Capability] = &[Capability::Upload, Capability::Download];

/// SMB session backed by the `smbclient` tool.
#[derive(Debug)]
pub struct SmbConnector {
    identifier: String,
    addr: String,
    user: String,
    password: String,
    timeout: Duration,
    smbclient_path: String,
}

impl SmbConnector {
    /// Build a session for `endpoint`.
    ///
    /// Construction is cheap; reachability and credentials are proven by
    /// the resolver's liveness check, which lists shares on the target.
    pub async fn connect(endpoint: &Endpoint) -> ConnectorResult<Self> {
        let identifier = endpoint.identifier();
        debug!(endpoint = %identifier, "Preparing SMB session");

        Ok(Self {
            identifier,
            addr: endpoint.addr.clone(),
            user: endpoint.user.clone(),
            password: endpoint.password.clone().unwrap_or_default(),
            timeout: endpoint.timeout,
            smbclient_path: "smbclient".to_string(),
        })
    }

    /// Split `share/path/inside` into `(share, backslashed path)`.
    fn split_remote(remote: &Path) -> ConnectorResult<(String, String)> {
        let text = remote.to_string_lossy().replace('\\', "/");
        let trimmed = text.trim_start_matches('/');
        let (share, rest) = trimmed.split_once('/').ok_or_else(|| {
            ConnectorError::TransferFailed(format!(
                "remote path '{}' must start with a share name",
                remote.display()
            ))
        })?;
        Ok((share.to_string(), rest.replace('/', "\\")))
    }

    fn base_command(&self, share: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.smbclient_path);
        match share {
            Some(share) => cmd.arg(format!("//{}/{}", self.addr, share)),
            None => cmd.arg("-L").arg(format!("//{}", self.addr)),
        };
        cmd.arg("-U")
            .arg(format!("{}%{}", self.user, self.password))
            .arg("-d")
            .arg("0");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    async fn run(&self, mut cmd: Command) -> ConnectorResult<std::process::Output> {
        let child = cmd
            .spawn()
            .map_err(|e| ConnectorError::TransferFailed(format!("spawn smbclient: {}", e)))?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(ConnectorError::TransferFailed(format!("smbclient: {}", e))),
            Err(_) => Err(ConnectorError::Timeout(self.timeout.as_secs())),
        }
    }
}

#[async_trait]
impl Connector for SmbConnector {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn transport(&self) -> &'static str {
        "smb"
    }

    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }

    async fn is_alive(&self) -> bool {
        // Listing shares exercises authentication and the full request
        // path without touching any file.
        let cmd = self.base_command(None);
        match self.run(cmd).await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    async fn upload(&self, local: &Path, remote: &Path) -> ConnectorResult<()> {
        let (share, remote_path) = Self::split_remote(remote)?;
        debug!(
            endpoint = %self.identifier,
            share = %share,
            remote = %remote_path,
            "Uploading via smbclient"
        );

        let mut cmd = self.base_command(Some(&share));
        cmd.arg("-c")
            .arg(format!("put \"{}\" \"{}\"", local.display(), remote_path));

        let output = self.run(cmd).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ConnectorError::TransferFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    async fn download(&self, remote: &Path, local: &Path) -> ConnectorResult<()> {
        let (share, remote_path) = Self::split_remote(remote)?;
        debug!(
            endpoint = %self.identifier,
            share = %share,
            remote = %remote_path,
            "Downloading via smbclient"
        );

        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut cmd = self.base_command(Some(&share));
        cmd.arg("-c")
            .arg(format!("get \"{}\" \"{}\"", remote_path, local.display()));

        let output = self.run(cmd).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ConnectorError::TransferFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    async fn close(&self) -> ConnectorResult<()> {
        // Each smbclient invocation is its own process; nothing persists.
        trace!(endpoint = %self.identifier, "SMB session closed");
        Ok(())
    }
}
