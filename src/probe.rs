//! Reachability probing with RDP fallback for Windows hosts.
//!
//! Diagnostics only: probing never goes through the route resolver and
//! never mutates route state. Windows hosts are classified by trying SMB
//! first (TCP 445 plus an `smbclient` share enumeration) and falling back
//! to RDP (TCP 3389); other hosts get a plain TCP check against their
//! declared port.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, info};

use crate::inventory::{Host, OsKind};

const SMB_PORT: u16 = 445;
const RDP_PORT: u16 = 3389;

/// Protocol a probe ended up confirming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeProtocol {
    Smb,
    Rdp,
    Tcp,
}

/// Outcome of probing one host.
#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub hostname: String,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<ProbeProtocol>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Share names seen during SMB enumeration.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shares: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeReport {
    fn unreachable(hostname: &str, error: impl Into<String>) -> Self {
        Self {
            hostname: hostname.to_string(),
            reachable: false,
            protocol: None,
            port: None,
            shares: Vec::new(),
            error: Some(error.into()),
        }
    }

    fn reached(hostname: &str, protocol: ProbeProtocol, port: u16, shares: Vec<String>) -> Self {
        Self {
            hostname: hostname.to_string(),
            reachable: true,
            protocol: Some(protocol),
            port: Some(port),
            shares,
            error: None,
        }
    }
}

/// Whether a TCP connect to `addr:port` completes within `timeout`.
pub async fn check_port(addr: &str, port: u16, timeout: Duration) -> bool {
    let target = format!("{}:{}", addr, port);
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(&target)).await,
        Ok(Ok(_))
    )
}

/// Enumerate shares on `addr` with `smbclient`, anonymously or with the
/// given credentials. Returns the share-looking lines of the listing.
async fn enumerate_shares(
    addr: &str,
    user: &str,
    password: Option<&str>,
    timeout: Duration,
) -> Option<Vec<String>> {
    let mut cmd = Command::new("smbclient");
    cmd.arg("-L").arg(format!("//{}", addr));
    match password {
        Some(password) => {
            cmd.arg("-U").arg(format!("{}%{}", user, password));
        }
        None => {
            cmd.arg("-U").arg("").arg("-N");
        }
    }
    cmd.arg("-d")
        .arg("0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let child = cmd.spawn().ok()?;
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .ok()?
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let listing = String::from_utf8_lossy(&output.stdout);
    let shares: Vec<String> = listing
        .lines()
        .filter(|line| {
            let line = line.trim();
            line.ends_with('$') || line.contains("Disk") || line.contains("IPC")
        })
        .map(|line| line.trim().to_string())
        .collect();
    if shares.is_empty() {
        None
    } else {
        Some(shares)
    }
}

/// Probe one host.
pub async fn probe_host(host: &Host, timeout: Duration) -> ProbeReport {
    debug!(host = %host.hostname, addr = %host.addr, "Probing host");

    if host.os != OsKind::Windows {
        return if check_port(&host.addr, host.port, timeout).await {
            ProbeReport::reached(&host.hostname, ProbeProtocol::Tcp, host.port, Vec::new())
        } else {
            ProbeReport::unreachable(
                &host.hostname,
                format!("port {} not reachable", host.port),
            )
        };
    }

    // Windows: SMB first.
    if check_port(&host.addr, SMB_PORT, timeout).await {
        let anonymous = enumerate_shares(&host.addr, "", None, timeout).await;
        let shares = match anonymous {
            Some(shares) => Some(shares),
            None => {
                enumerate_shares(&host.addr, &host.user, host.password.as_deref(), timeout).await
            }
        };

        if let Some(shares) = shares {
            info!(host = %host.hostname, "SMB enumeration succeeded");
            return ProbeReport::reached(&host.hostname, ProbeProtocol::Smb, SMB_PORT, shares);
        }
        debug!(host = %host.hostname, "Port 445 open but SMB enumeration failed, trying RDP");
    }

    // RDP fallback.
    if check_port(&host.addr, RDP_PORT, timeout).await {
        info!(host = %host.hostname, "Reachable via RDP fallback");
        return ProbeReport::reached(&host.hostname, ProbeProtocol::Rdp, RDP_PORT, Vec::new());
    }

    ProbeReport::unreachable(&host.hostname, "neither SMB nor RDP reachable")
}

/// Probe many hosts concurrently, bounded by `workers`.
pub async fn probe_hosts(
    hosts: &[Arc<Host>],
    timeout: Duration,
    workers: usize,
) -> Vec<ProbeReport> {
    stream::iter(hosts.iter().cloned())
        .map(|host| async move { probe_host(&host, timeout).await })
        .buffer_unordered(workers.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_constructors_classify() {
        let down = ProbeReport::unreachable("w1", "nope");
        assert!(!down.reachable);
        assert!(down.protocol.is_none());
        assert_eq!(down.error.as_deref(), Some("nope"));

        let up = ProbeReport::reached("w1", ProbeProtocol::Rdp, RDP_PORT, Vec::new());
        assert!(up.reachable);
        assert_eq!(up.protocol, Some(ProbeProtocol::Rdp));
        assert_eq!(up.port, Some(RDP_PORT));
        assert!(up.error.is_none());
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        // Reserved documentation range; nothing listens there.
        assert!(!check_port("192.0.2.1", 9, Duration::from_millis(100)).await);
    }

    #[tokio::test]
    async fn open_port_is_reachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let port = listener.local_addr().expect("addr").port();
        assert!(check_port("127.0.0.1", port, Duration::from_secs(1)).await);
    }
}
