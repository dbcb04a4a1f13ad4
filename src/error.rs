//! Error types for fanout.
//!
//! Each layer of the crate defines its own error enum close to the code that
//! produces it ([`ConnectorError`](crate::connection::ConnectorError),
//! [`ResolveError`](crate::resolver::ResolveError),
//! [`OperationError`](crate::ops::OperationError),
//! [`EngineError`](crate::engine::EngineError)). This module aggregates them
//! into a single crate-level [`Error`] for callers that want one type, such
//! as the CLI.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for fanout operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The top-level error type for fanout.
#[derive(Error, Debug)]
pub enum Error {
    /// Failure while loading or selecting inventory hosts.
    #[error(transparent)]
    Inventory(#[from] crate::inventory::InventoryError),

    /// Transport-level connector failure.
    #[error(transparent)]
    Connector(#[from] crate::connection::ConnectorError),

    /// Route resolution failure for a host.
    #[error(transparent)]
    Resolve(#[from] crate::resolver::ResolveError),

    /// Failure inside an operation body.
    #[error(transparent)]
    Operation(#[from] crate::ops::OperationError),

    /// Engine construction failure.
    #[error(transparent)]
    Engine(#[from] crate::engine::EngineError),

    /// Failure while persisting or reading batch records.
    #[error(transparent)]
    State(#[from] crate::state::StateError),

    /// A referenced file does not exist.
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    /// I/O error outside any more specific layer.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
