//! Shared test doubles: a scripted connector factory and an instrumented
//! mock connector.

// Each test binary uses a different slice of these helpers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use fanout::connection::{
    Capability, CommandOutput, Connector, ConnectorError, ConnectorResult,
};
use fanout::inventory::{
    ConnectionMethod, Hop, Host, HostOptions, OsKind, Route, TransferProtocol,
};
use fanout::resolver::ConnectorFactory;

/// Tracks how many mock sessions are live at once.
#[derive(Default)]
pub struct SessionCounter {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl SessionCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

const FULL_CAPS: &[Capability] = &[Capability::Execute, Capability::Upload, Capability::Download];
const TRANSFER_ONLY_CAPS: &[Capability] = &[Capability::Upload, Capability::Download];

pub struct MockConnector {
    identifier: String,
    alive: bool,
    exec_only_transfers: bool,
    exec_delay: Duration,
    closed: Arc<AtomicBool>,
    counter: Option<Arc<SessionCounter>>,
}

impl std::fmt::Debug for MockConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnector")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

impl Drop for MockConnector {
    fn drop(&mut self) {
        // A session dropped without close still releases its slot.
        if !self.closed.swap(true, Ordering::SeqCst) {
            if let Some(counter) = &self.counter {
                counter.leave();
            }
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn transport(&self) -> &'static str {
        "mock"
    }

    fn capabilities(&self) -> &'static [Capability] {
        if self.exec_only_transfers {
            TRANSFER_ONLY_CAPS
        } else {
            FULL_CAPS
        }
    }

    async fn is_alive(&self) -> bool {
        self.alive
    }

    async fn execute(&self, command: &str) -> ConnectorResult<CommandOutput> {
        if !self.supports(Capability::Execute) {
            return Err(ConnectorError::Unsupported {
                transport: self.transport(),
                capability: Capability::Execute,
            });
        }
        if !self.exec_delay.is_zero() {
            tokio::time::sleep(self.exec_delay).await;
        }
        Ok(CommandOutput::new(
            format!("mock output for: {}", command),
            String::new(),
            0,
        ))
    }

    async fn upload(&self, local: &Path, _remote: &Path) -> ConnectorResult<()> {
        // Reading the staged file mirrors a real transport.
        std::fs::read(local).map_err(|e| ConnectorError::TransferFailed(e.to_string()))?;
        Ok(())
    }

    async fn download(&self, remote: &Path, local: &Path) -> ConnectorResult<()> {
        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConnectorError::TransferFailed(e.to_string()))?;
        }
        std::fs::write(local, format!("mock contents of {}", remote.display()))
            .map_err(|e| ConnectorError::TransferFailed(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> ConnectorResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            if let Some(counter) = &self.counter {
                counter.leave();
            }
        }
        Ok(())
    }
}

/// How the factory behaves for one (host, route) pair.
#[derive(Clone, Copy)]
pub enum Behavior {
    /// Connect succeeds and the session is live.
    Ok,
    /// Connect fails outright.
    ConnectFail,
    /// Connect succeeds but the liveness check fails.
    DeadOnArrival,
    /// Live session that only supports file transfer.
    TransferOnly,
}

/// Scripted connector factory keyed by (hostname, route name).
///
/// Unscripted pairs behave like [`Behavior::Ok`]. Every build attempt is
/// recorded in order, and every created session's closed flag is retained
/// for later assertions.
#[derive(Default)]
pub struct ScriptedFactory {
    script: Mutex<HashMap<(String, String), Behavior>>,
    attempts: Mutex<Vec<(String, String)>>,
    closed_flags: Mutex<Vec<Arc<AtomicBool>>>,
    counter: Mutex<Option<Arc<SessionCounter>>>,
    exec_delay: Mutex<Duration>,
}

impl ScriptedFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(self: Arc<Self>, host: &str, route: &str, behavior: Behavior) -> Arc<Self> {
        self.script
            .lock()
            .insert((host.to_string(), route.to_string()), behavior);
        self
    }

    pub fn with_counter(self: Arc<Self>, counter: Arc<SessionCounter>) -> Arc<Self> {
        *self.counter.lock() = Some(counter);
        self
    }

    pub fn with_exec_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.exec_delay.lock() = delay;
        self
    }

    /// Build attempts so far, as (hostname, route) pairs in order.
    pub fn attempts(&self) -> Vec<(String, String)> {
        self.attempts.lock().clone()
    }

    /// Attempts made against one host, route names only.
    pub fn attempts_for(&self, host: &str) -> Vec<String> {
        self.attempts
            .lock()
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Whether the nth session handed out has been closed.
    pub fn session_closed(&self, index: usize) -> bool {
        self.closed_flags
            .lock()
            .get(index)
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Whether every session handed out has been closed.
    pub fn all_closed(&self) -> bool {
        self.closed_flags
            .lock()
            .iter()
            .all(|flag| flag.load(Ordering::SeqCst))
    }

    /// Number of sessions handed out.
    pub fn sessions_created(&self) -> usize {
        self.closed_flags.lock().len()
    }
}

#[async_trait]
impl ConnectorFactory for ScriptedFactory {
    async fn build(&self, host: &Host, route: &Route) -> ConnectorResult<Box<dyn Connector>> {
        let key = (host.hostname.clone(), route.name.clone());
        self.attempts.lock().push(key.clone());

        let behavior = self.script.lock().get(&key).copied().unwrap_or(Behavior::Ok);
        let (alive, exec_only_transfers) = match behavior {
            Behavior::ConnectFail => {
                return Err(ConnectorError::ConnectFailed("scripted failure".to_string()))
            }
            Behavior::Ok => (true, false),
            Behavior::DeadOnArrival => (false, false),
            Behavior::TransferOnly => (true, true),
        };

        let closed = Arc::new(AtomicBool::new(false));
        self.closed_flags.lock().push(closed.clone());

        let counter = self.counter.lock().clone();
        if let Some(counter) = &counter {
            counter.enter();
        }

        Ok(Box::new(MockConnector {
            identifier: format!("{}@{}", host.user, host.addr),
            alive,
            exec_only_transfers,
            exec_delay: *self.exec_delay.lock(),
            closed,
            counter,
        }))
    }
}

fn hop(addr: &str) -> Hop {
    Hop {
        addr: addr.to_string(),
        user: None,
        method: None,
        port: None,
        tool: None,
    }
}

/// Host with one hop per named route.
pub fn make_host(name: &str, route_names: &[&str]) -> Arc<Host> {
    let routes = route_names
        .iter()
        .map(|r| Route::new(*r, vec![hop("192.0.2.20")]))
        .collect();
    make_host_with_routes(name, routes)
}

pub fn make_host_with_routes(name: &str, routes: Vec<Route>) -> Arc<Host> {
    Arc::new(Host {
        hostname: name.to_string(),
        addr: "192.0.2.20".to_string(),
        dns: None,
        location: None,
        user: "admin".to_string(),
        password: Some("secret".to_string()),
        ssh_key: None,
        method: ConnectionMethod::Ssh,
        port: 22,
        active: true,
        grade: None,
        tool: None,
        os: OsKind::Linux,
        routes,
        transfer_protocol: TransferProtocol::Sftp,
        options: HostOptions::default(),
    })
}

/// Route with no hops, for configuration-error tests.
pub fn empty_route(name: &str) -> Route {
    Route::new(name, Vec::new())
}
