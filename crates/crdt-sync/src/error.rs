use crdt_graph::CrdtError;
use thiserror::Error;

/// A transport could not hand a payload to its peers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

impl TransportError {
    /// Create a transport error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors returned by the sync layer.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No CRDT is registered under this name.
    #[error("unknown crdt `{0}`")]
    UnknownCrdt(String),

    /// A CRDT is already registered under this name.
    #[error("crdt `{0}` is already registered")]
    AlreadyRegistered(String),

    /// Decoding or merging a CRDT failed. The local instance is unchanged.
    #[error(transparent)]
    Crdt(#[from] CrdtError),

    /// The payload could not be handed to the transport.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The configuration file could not be parsed.
    #[error("invalid sync config: {0}")]
    Config(#[from] toml::de::Error),

    /// The configuration parsed but holds an unusable value.
    #[error("invalid sync config: {0}")]
    InvalidConfig(String),

    /// The sync loop is no longer running.
    #[error("sync manager has stopped")]
    Stopped,
}
