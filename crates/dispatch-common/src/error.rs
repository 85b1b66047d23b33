//! Error taxonomy shared by every crate that touches a live collection.

use tokio::sync::mpsc::error::TrySendError;

/// Errors produced by the event stream, housekeeper, and document-store glue.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A collection was read or fetched before `Load` ran.
    #[error("not a loaded collection")]
    NotLoaded,

    /// `ensure_loaded_for` saw a different tenant than the one the process is stuck to.
    #[error("service already stuck to [{stuck}], not serving [{requested}]")]
    TenantMismatch {
        /// Tenant the process has committed to.
        stuck: String,
        /// Tenant the caller asked for.
        requested: String,
    },

    /// `MoveX`/`StopTruck` referenced a `seq` that is not present in the collection.
    #[error("no member with seq {0}")]
    NoSuchSeq(u64),

    /// The id passed alongside a `seq` does not match the member stored at that `seq`.
    #[error("id mismatch for seq {0}")]
    IdMismatch(u64),

    /// The underlying document store failed.
    #[error("document store error: {0}")]
    Store(#[from] Box<dyn std::error::Error + Send + Sync>),

    /// A channel used to hand events to a subscriber task was full.
    #[error("channel is full")]
    ChannelFull,

    /// A channel used to hand events to a subscriber task was closed.
    #[error("channel is closed")]
    ChannelClosed,

    /// A JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl<T> From<TrySendError<T>> for Error {
    fn from(value: TrySendError<T>) -> Self {
        match value {
            TrySendError::Closed(_) => Error::ChannelClosed,
            TrySendError::Full(_) => Error::ChannelFull,
        }
    }
}

/// Convenience alias used throughout `dispatch-common` and its dependents.
pub type Result<T> = std::result::Result<T, Error>;
