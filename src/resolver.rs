//! Route resolution: ordered fallback from a host's routes to a live
//! connector.
//!
//! The resolver walks a host's routes in declared order, skipping inactive
//! ones. For the first active route it builds a connector matching the
//! host's declared method and then demands a liveness proof; a connect that
//! cannot serve requests counts as a failure. Any failure deactivates the
//! route and moves on; the first live connector wins and no further routes
//! are attempted. There is no scoring and no retry inside a single resolve:
//! callers that want another attempt call resolve again, and previously
//! deactivated routes stay inactive until an operator reactivates them.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::connection::ftp::FtpConnector;
use crate::connection::smb::SmbConnector;
use crate::connection::ssh::SshConnector;
use crate::connection::winexec::WinExecConnector;
use crate::connection::{Connector, ConnectorError, ConnectorResult, Endpoint};
use crate::inventory::{ConnectionMethod, Host, Route};

/// Errors raised during route resolution.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The host declares no routes at all.
    #[error("host '{host}' has no routes configured")]
    NoRoutes { host: String },

    /// Malformed route data, e.g. a route with zero hops.
    #[error("invalid route '{route}' for host '{host}': {reason}")]
    Configuration {
        host: String,
        route: String,
        reason: String,
    },

    /// Every route was inactive or failed.
    #[error("all routes exhausted for host '{host}' ({attempted} attempted, {skipped} skipped)")]
    RouteExhausted {
        host: String,
        attempted: usize,
        skipped: usize,
    },
}

/// Builds a connector for one host through one route.
///
/// The default [`TransportFactory`] dispatches on the host's declared
/// connection method; tests substitute scripted factories.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    async fn build(&self, host: &Host, route: &Route) -> ConnectorResult<Box<dyn Connector>>;
}

/// Default factory: one connector type per [`ConnectionMethod`].
pub struct TransportFactory;

#[async_trait]
impl ConnectorFactory for TransportFactory {
    async fn build(&self, host: &Host, route: &Route) -> ConnectorResult<Box<dyn Connector>> {
        let endpoint = Endpoint::derive(host, route);
        match host.method {
            ConnectionMethod::Ssh => Ok(Box::new(SshConnector::connect(&endpoint).await?)),
            ConnectionMethod::Smb => Ok(Box::new(SmbConnector::connect(&endpoint).await?)),
            ConnectionMethod::Winexec => Ok(Box::new(WinExecConnector::connect(&endpoint).await?)),
            ConnectionMethod::Ftp => Ok(Box::new(FtpConnector::connect(&endpoint).await?)),
        }
    }
}

/// Outcome of probing one inactive route during a refresh.
#[derive(Debug)]
pub struct RouteProbe {
    pub route: String,
    pub reactivated: bool,
    pub error: Option<String>,
}

/// Resolves hosts to live connectors through their fallback routes.
#[derive(Clone)]
pub struct RouteResolver {
    factory: Arc<dyn ConnectorFactory>,
}

impl Default for RouteResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteResolver {
    /// Resolver using the real transport factory.
    pub fn new() -> Self {
        Self {
            factory: Arc::new(TransportFactory),
        }
    }

    /// Resolver with a custom connector factory.
    pub fn with_factory(factory: Arc<dyn ConnectorFactory>) -> Self {
        Self { factory }
    }

    /// Resolve `host` to a live connector, trying routes in declared order.
    pub async fn resolve(&self, host: &Host) -> Result<Box<dyn Connector>, ResolveError> {
        if host.routes.is_empty() {
            return Err(ResolveError::NoRoutes {
                host: host.hostname.clone(),
            });
        }

        let mut attempted = 0;
        let mut skipped = 0;

        for route in &host.routes {
            if route.hops.is_empty() {
                return Err(ResolveError::Configuration {
                    host: host.hostname.clone(),
                    route: route.name.clone(),
                    reason: "route has no hops".to_string(),
                });
            }

            if !route.is_active() {
                debug!(host = %host.hostname, route = %route.name, "Skipping inactive route");
                skipped += 1;
                continue;
            }

            attempted += 1;
            debug!(host = %host.hostname, route = %route.name, "Trying route");

            match self.try_route(host, route).await {
                Ok(conn) => {
                    info!(host = %host.hostname, route = %route.name, "Connected");
                    return Ok(conn);
                }
                Err(e) => {
                    warn!(
                        host = %host.hostname,
                        route = %route.name,
                        error = %e,
                        "Route failed, deactivating"
                    );
                    route.deactivate();
                }
            }
        }

        Err(ResolveError::RouteExhausted {
            host: host.hostname.clone(),
            attempted,
            skipped,
        })
    }

    /// Build and liveness-check a connector through one route.
    async fn try_route(&self, host: &Host, route: &Route) -> ConnectorResult<Box<dyn Connector>> {
        let conn = self.factory.build(host, route).await?;

        if conn.is_alive().await {
            Ok(conn)
        } else {
            // Connect succeeded but the transport cannot serve requests;
            // tear it down and report the route as failed.
            if let Err(e) = conn.close().await {
                debug!(host = %host.hostname, route = %route.name, error = %e, "Close after failed liveness check");
            }
            Err(ConnectorError::ConnectFailed(
                "liveness check failed".to_string(),
            ))
        }
    }

    /// Probe every inactive route of `host` and reactivate the ones that
    /// answer. Out-of-band operator action; the resolver itself never
    /// reactivates routes during resolution.
    pub async fn refresh_routes(&self, host: &Host) -> Vec<RouteProbe> {
        let mut probes = Vec::new();

        for route in &host.routes {
            if route.is_active() || route.hops.is_empty() {
                continue;
            }

            match self.try_route(host, route).await {
                Ok(conn) => {
                    route.activate();
                    info!(host = %host.hostname, route = %route.name, "Route reactivated");
                    if let Err(e) = conn.close().await {
                        debug!(host = %host.hostname, error = %e, "Close after probe");
                    }
                    probes.push(RouteProbe {
                        route: route.name.clone(),
                        reactivated: true,
                        error: None,
                    });
                }
                Err(e) => {
                    debug!(host = %host.hostname, route = %route.name, error = %e, "Route still unreachable");
                    probes.push(RouteProbe {
                        route: route.name.clone(),
                        reactivated: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        probes
    }
}
