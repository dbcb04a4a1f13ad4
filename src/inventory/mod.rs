//! Host inventory loading and selection.
//!
//! The inventory is the external loader boundary: host records are parsed
//! from a JSON or YAML file into [`Host`] values and handed to the engine as
//! `Arc<Host>`. The core only requires the fields on [`Host`]; everything
//! else in the file is rejected by serde.

pub mod host;

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

pub use host::{
    ConnectionMethod, Hop, Host, HostOptions, OsKind, Route, TransferProtocol,
    DEFAULT_CONNECT_TIMEOUT_SECS,
};

/// Errors raised while loading or selecting hosts.
#[derive(Error, Debug)]
pub enum InventoryError {
    /// The inventory file could not be read.
    #[error("failed to read inventory '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The inventory file could not be parsed.
    #[error("failed to parse inventory '{path}': {message}")]
    Parse { path: String, message: String },

    /// A selection matched no hosts.
    #[error("no hosts matched selection '{0}'")]
    EmptySelection(String),
}

/// Result of selecting hosts by name.
#[derive(Debug, Default)]
pub struct Selection {
    /// Hosts that matched, in inventory order.
    pub hosts: Vec<Arc<Host>>,
    /// Requested names with no inventory entry.
    pub missing: Vec<String>,
}

/// A loaded set of hosts.
#[derive(Debug, Default)]
pub struct Inventory {
    hosts: Vec<Arc<Host>>,
}

impl Inventory {
    /// Build an inventory from already-constructed hosts.
    pub fn from_hosts(hosts: Vec<Host>) -> Self {
        Self {
            hosts: hosts.into_iter().map(Arc::new).collect(),
        }
    }

    /// Load host records from a JSON or YAML file.
    ///
    /// The format is chosen by extension; anything that is not `.yaml`/`.yml`
    /// is treated as JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, InventoryError> {
        let path = path.as_ref();
        let path_display = path.display().to_string();

        let raw = std::fs::read_to_string(path).map_err(|source| InventoryError::Read {
            path: path_display.clone(),
            source,
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );

        let hosts: Vec<Host> = if is_yaml {
            serde_yaml::from_str(&raw).map_err(|e| InventoryError::Parse {
                path: path_display.clone(),
                message: e.to_string(),
            })?
        } else {
            serde_json::from_str(&raw).map_err(|e| InventoryError::Parse {
                path: path_display.clone(),
                message: e.to_string(),
            })?
        };

        debug!(path = %path_display, hosts = hosts.len(), "Loaded inventory");
        Ok(Self::from_hosts(hosts))
    }

    /// All hosts in declaration order.
    pub fn hosts(&self) -> &[Arc<Host>] {
        &self.hosts
    }

    /// Number of hosts.
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether the inventory holds no hosts.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Look up one host by name.
    pub fn get(&self, hostname: &str) -> Option<Arc<Host>> {
        self.hosts
            .iter()
            .find(|h| h.hostname == hostname)
            .cloned()
    }

    /// Select hosts by a comma-separated name list, or every active host
    /// for `all`.
    ///
    /// Names that match nothing are reported in [`Selection::missing`]
    /// rather than failing the whole selection; the caller decides whether
    /// to warn or abort.
    pub fn select(&self, pattern: &str) -> Selection {
        if pattern.trim().eq_ignore_ascii_case("all") {
            return Selection {
                hosts: self
                    .hosts
                    .iter()
                    .filter(|h| h.active)
                    .cloned()
                    .collect(),
                missing: Vec::new(),
            };
        }

        let names: Vec<&str> = pattern
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .collect();

        let mut selection = Selection::default();
        for name in names {
            match self.get(name) {
                Some(host) => selection.hosts.push(host),
                None => selection.missing.push(name.to_string()),
            }
        }
        selection
    }
}
