//! Host, route, and hop definitions.
//!
//! A [`Host`] is one remote target: identity, credentials, a declared
//! [`ConnectionMethod`], and an ordered list of fallback [`Route`]s. Hosts
//! circulate as `Arc<Host>` so that route-activation state set during one
//! batch is still visible to a chained batch over the same hosts.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default connect timeout when a host carries no override, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Transport used to reach a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMethod {
    /// SSH session (default)
    #[default]
    Ssh,
    /// SMB share access via smbclient
    Smb,
    /// Generic Windows remote execution through an external tool
    #[serde(alias = "custom")]
    Winexec,
    /// FTP session
    Ftp,
}

impl std::fmt::Display for ConnectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionMethod::Ssh => write!(f, "ssh"),
            ConnectionMethod::Smb => write!(f, "smb"),
            ConnectionMethod::Winexec => write!(f, "winexec"),
            ConnectionMethod::Ftp => write!(f, "ftp"),
        }
    }
}

/// Protocol preference for file transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransferProtocol {
    /// SFTP over the SSH session (default)
    #[default]
    Sftp,
    /// SCP over the SSH session
    Scp,
    /// SMB share copy
    Smb,
    /// Plain FTP
    Ftp,
}

/// Operating system family of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OsKind {
    Linux,
    Windows,
    #[default]
    Unknown,
}

/// One network/credential step within a route.
///
/// A hop may omit `user` and `port`; the resolver falls back to the host's
/// own fields when building the connection endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hop {
    /// Network address of this hop.
    #[serde(alias = "ip")]
    pub addr: String,
    /// Login user for this hop, defaulting to the host user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Transport for this hop; advisory, the host's declared method governs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<ConnectionMethod>,
    /// Port override for this hop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// External tool override for this hop (winexec transport).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

fn active_default() -> AtomicBool {
    AtomicBool::new(true)
}

/// One named path to a host.
///
/// Routes are tried in declared order. The activation flag is interior
/// state mutated only through [`Route::activate`] and [`Route::deactivate`];
/// within one batch a single task owns resolution for a given host, and the
/// atomic keeps cross-batch reuse of a shared `Arc<Host>` from being a data
/// race.
#[derive(Debug, Serialize, Deserialize)]
pub struct Route {
    /// Route name, unique within a host.
    pub name: String,
    /// Ordered hops describing the path. Must be non-empty.
    pub hops: Vec<Hop>,
    #[serde(default = "active_default")]
    active: AtomicBool,
}

impl Route {
    /// Create an active route.
    pub fn new(name: impl Into<String>, hops: Vec<Hop>) -> Self {
        Self {
            name: name.into(),
            hops,
            active: AtomicBool::new(true),
        }
    }

    /// Whether the resolver should consider this route.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Mark the route usable again.
    pub fn activate(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    /// Take the route out of the fallback chain.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Terminal hop of the route, if any.
    pub fn last_hop(&self) -> Option<&Hop> {
        self.hops.last()
    }
}

/// Free-form per-host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostOptions {
    /// Connect timeout override in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Client/session tag passed through to the transport for accounting.
    #[serde(default, alias = "client_id", skip_serializing_if = "Option::is_none")]
    pub client_tag: Option<String>,
}

fn default_port() -> u16 {
    22
}

fn default_true() -> bool {
    true
}

/// Identity and connectivity descriptor for one remote target.
#[derive(Debug, Serialize, Deserialize)]
pub struct Host {
    /// Stable identifier.
    pub hostname: String,
    /// Network address.
    #[serde(alias = "ip")]
    pub addr: String,
    /// DNS name, informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<String>,
    /// Physical or logical location, informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Login user.
    pub user: String,
    /// Password credential, opaque to the core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Path to an SSH private key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<PathBuf>,
    /// Declared connection method.
    #[serde(rename = "connection_method")]
    pub method: ConnectionMethod,
    /// Default port for the declared method.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Whether the host participates in `all` selections.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Operator-assigned priority grade, informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    /// External tool used by the winexec transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Operating system family.
    #[serde(default)]
    pub os: OsKind,
    /// Ordered fallback routes.
    #[serde(default, alias = "tunnel_routes")]
    pub routes: Vec<Route>,
    /// Preferred file-transfer protocol.
    #[serde(default, alias = "file_transfer_protocol")]
    pub transfer_protocol: TransferProtocol,
    /// Per-host overrides (timeout, client tag).
    #[serde(default, alias = "config")]
    pub options: HostOptions,
}

impl Host {
    /// Connect timeout for this host.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(
            self.options
                .timeout
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    /// Look up a route by name.
    pub fn route(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.name == name)
    }

    /// Whether any route is currently active.
    pub fn has_active_route(&self) -> bool {
        self.routes.iter().any(Route::is_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hop(addr: &str) -> Hop {
        Hop {
            addr: addr.to_string(),
            user: None,
            method: None,
            port: None,
            tool: None,
        }
    }

    #[test]
    fn route_activation_toggles() {
        let route = Route::new("direct", vec![hop("10.0.0.1")]);
        assert!(route.is_active());

        route.deactivate();
        assert!(!route.is_active());

        route.activate();
        assert!(route.is_active());
    }

    #[test]
    fn route_deserializes_active_by_default() {
        let route: Route =
            serde_json::from_str(r#"{"name": "direct", "hops": [{"ip": "10.0.0.1"}]}"#)
                .expect("route should parse");
        assert!(route.is_active());
        assert_eq!(route.hops[0].addr, "10.0.0.1");
    }

    #[test]
    fn host_accepts_original_field_aliases() {
        let host: Host = serde_json::from_str(
            r#"{
                "hostname": "web01",
                "ip": "192.0.2.10",
                "user": "admin",
                "connection_method": "custom",
                "tunnel_routes": [{"name": "direct", "hops": [{"ip": "192.0.2.10"}]}],
                "config": {"timeout": 5, "client_id": "ops-a"}
            }"#,
        )
        .expect("host should parse");

        assert_eq!(host.addr, "192.0.2.10");
        assert_eq!(host.method, ConnectionMethod::Winexec);
        assert_eq!(host.connect_timeout(), Duration::from_secs(5));
        assert_eq!(host.options.client_tag.as_deref(), Some("ops-a"));
        assert_eq!(host.routes.len(), 1);
    }

    #[test]
    fn connect_timeout_defaults_when_unset() {
        let host: Host = serde_json::from_str(
            r#"{"hostname": "db01", "ip": "192.0.2.11", "user": "admin", "connection_method": "ssh"}"#,
        )
        .expect("host should parse");
        assert_eq!(
            host.connect_timeout(),
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
        );
        assert!(!host.has_active_route());
    }
}
