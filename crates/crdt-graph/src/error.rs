use thiserror::Error;

/// Errors returned by CRDT operations.
///
/// Every failing operation leaves the CRDT exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrdtError {
    /// An argument violates the operation's contract (e.g. a negative
    /// increment on a grow-only counter, or an empty id).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The node, relationship or key is not present on this replica.
    #[error("not found: {0}")]
    NotFound(String),

    /// Two CRDTs of different concrete types were combined, or a wire payload
    /// carries a `type` tag that does not match the requested type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The type that was expected.
        expected: String,
        /// The type that was actually encountered.
        found: String,
    },

    /// A wire payload is missing required fields or is not valid JSON.
    #[error("malformed wire data: {0}")]
    MalformedWireData(String),
}

impl CrdtError {
    pub(crate) fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

impl From<serde_json::Error> for CrdtError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedWireData(err.to_string())
    }
}
