//! Error types for the table engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type returned by host callbacks (`on_reorder`, `fetch_all_ids`, `load_more`).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// All errors the engine returns directly.
///
/// Mutation failures are not in here: they never propagate out of an action
/// and are captured as [`MutationError`] in feature state instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Configuration errors
    #[error("cross-page selection requires a row id accessor")]
    CrossPageRequiresRowId,

    #[error("drag-sort requires a row id accessor")]
    DragSortRequiresRowId,

    #[error("missing callback: {0}")]
    MissingCallback(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    // State errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("invalid search string: {0}")]
    InvalidSearch(String),

    // Data errors
    #[error("data source error: {0}")]
    DataSource(#[from] DataError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A failure reported by the data source while resolving a query.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct DataError {
    pub message: String,
}

impl DataError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Which mutation produced a [`MutationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationSource {
    Reorder,
    FetchAllIds,
    LoadMore,
}

/// A captured failure of an async host callback.
///
/// Stays in feature state until the consumer dismisses it.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{origin:?} failed: {message}")]
pub struct MutationError {
    pub origin: MutationSource,
    pub message: String,
}

impl MutationError {
    pub fn new(origin: MutationSource, error: &BoxError) -> Self {
        Self {
            origin,
            message: error.to_string(),
        }
    }
}
