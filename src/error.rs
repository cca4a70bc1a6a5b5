use std::fmt;

/// Error kinds produced anywhere in the indexing pipeline.
///
/// Per-unit-of-work errors (one block, one tx, one receipt) never propagate
/// above the pipeline boundary — the tailer and backfill driver are the
/// top-level owners and absorb every variant except `Initialization`, which
/// is fatal at startup.
#[derive(Debug, Clone)]
pub enum IndexError {
    /// Network, timeout, 5xx from the RPC source. Skip, retry next tick.
    TransientUpstream(String),
    /// Malformed block/receipt, signature recovery failure. Skip this unit.
    PermanentUpstream(String),
    /// Store conflict or connection loss. Skip, idempotent re-run converges.
    Storage(String),
    /// Old row present but its delete failed during reconcile. Treated as Skip.
    ReconcileRefusal(String),
    /// Work dropped cleanly because cancellation was requested.
    Cancelled,
    /// Bad dialect, unreachable store at startup. Fatal.
    Initialization(String),
}

impl IndexError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientUpstream(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::PermanentUpstream(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Whether this error means "give up on this unit of work, but the
    /// process stays up" as opposed to `Initialization`, the only fatal kind.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IndexError::Initialization(_))
    }
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexError::TransientUpstream(msg) => write!(f, "transient upstream error: {msg}"),
            IndexError::PermanentUpstream(msg) => write!(f, "permanent upstream error: {msg}"),
            IndexError::Storage(msg) => write!(f, "storage failure: {msg}"),
            IndexError::ReconcileRefusal(msg) => write!(f, "reconcile refused: {msg}"),
            IndexError::Cancelled => write!(f, "cancelled"),
            IndexError::Initialization(msg) => write!(f, "initialization failure: {msg}"),
        }
    }
}

impl std::error::Error for IndexError {}

impl From<sqlx::Error> for IndexError {
    fn from(e: sqlx::Error) -> Self {
        IndexError::Storage(e.to_string())
    }
}
