//! Error types for the Tether engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Debug, Error)]
pub enum Error {
    /// A matrix contained NaN or was singular. Recoverable: callers
    /// substitute identity and continue.
    #[error("degenerate matrix: {0}")]
    DegenerateMatrix(String),

    /// The render surface has no allocation for a live entity. Recoverable:
    /// the entity is forced invisible.
    #[error("render surface has no resource for {0}")]
    MissingResource(String),

    /// Reparent precondition violated (e.g. the attachment is not global).
    /// No state change occurs.
    #[error("invalid reparent: {0}")]
    InvalidReparent(String),

    /// An edit operation arrived with no entity under edit. The scene is
    /// unchanged.
    #[error("no active edit session for {0}")]
    StaleEditSession(String),

    /// The externally-persisted side of a reparent failed after the
    /// optimistic local update. The reparent is reverted locally.
    #[error("deferred sync failed: {0}")]
    DeferredSyncFailure(String),

    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
