//! # Fanout - Fleet Operation Dispatch
//!
//! Fanout runs one operation (a command, a file transfer, or an arbitrary
//! callable) against many remote hosts at once, and answers two questions
//! well: *how do I reach a host that has several unreliable paths to it*,
//! and *what exactly happened on every host afterwards*.
//!
//! ## Core Concepts
//!
//! - **Hosts**: remote targets with credentials, a declared transport, and
//!   an ordered list of fallback routes
//! - **Routes**: named paths to a host, independently activatable; a failed
//!   route is taken out of the chain until an operator brings it back
//! - **Connectors**: live transport sessions (SSH, SMB, Windows exec, FTP)
//!   behind one capability trait
//! - **Operations**: units of work applied to a live connector
//! - **Batches**: one operation fanned out across a host set under a
//!   bounded worker pool, aggregated into a single immutable result
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      CLI Interface                        │
//! └───────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │                 Batch Execution Engine                    │
//! │      (one task per host, semaphore-bounded workers)       │
//! └───────────────────────────────────────────────────────────┘
//!            │                                  │
//!            ▼                                  ▼
//! ┌─────────────────────┐            ┌─────────────────────┐
//! │   Route Resolver    │            │     Operations      │
//! │ (ordered fallback,  │            │ (command, transfer, │
//! │  liveness checks)   │            │   custom bodies)    │
//! └─────────────────────┘            └─────────────────────┘
//!            │
//!            ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │     Connectors: SSH · SMB · Windows exec · FTP            │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use fanout::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let inventory = Inventory::from_file("servers.json")?;
//!     let runner = BatchRunner::new().with_max_workers(20)?;
//!
//!     let batch = runner
//!         .run_command(inventory.select("all").hosts, CommandOp::new("uname -a"))
//!         .await;
//!
//!     // Chain a remedial batch against just the failures.
//!     if !batch.all_succeeded() {
//!         let retry = runner
//!             .run_command(batch.failed_hosts(), CommandOp::new("uname -a"))
//!             .await;
//!         println!("retry success rate: {:.1}%", retry.success_rate());
//!     }
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of the most commonly needed types.

    pub use crate::connection::{
        Capability, CommandOutput, Connector, ConnectorError, ConnectorResult, Endpoint,
    };
    pub use crate::engine::{BatchResult, BatchRunner, EngineError, OperationResult};
    pub use crate::error::{Error, Result};
    pub use crate::inventory::{
        ConnectionMethod, Hop, Host, Inventory, OsKind, Route, Selection,
    };
    pub use crate::ops::{
        CommandOp, CommandSeriesOp, CustomOp, DownloadOp, Operation, OperationError, UploadOp,
    };
    pub use crate::resolver::{ConnectorFactory, ResolveError, RouteResolver};
    pub use crate::state::{BatchRecord, StateStore};
}

/// Error types and result aliases.
pub mod error;

/// Host inventory: loading, the host/route/hop data model, and selection.
pub mod inventory;

/// Transport connectors behind the capability trait.
pub mod connection;

/// Route resolution: ordered fallback to a live connector.
pub mod resolver;

/// Operations executed against live connectors.
pub mod ops;

/// Local file-transfer helpers: compression staging and checksums.
pub mod transfer;

/// The concurrent batch execution engine and its result model.
pub mod engine;

/// Reachability probing with RDP fallback for Windows hosts.
pub mod probe;

/// Batch record persistence.
pub mod state;

/// Returns the current version of fanout.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
