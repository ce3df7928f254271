//! Engine error taxonomy.
//!
//! Every failure is returned to the caller as a value; nothing panics
//! across the API boundary. A remote operation whose position falls
//! outside the document *after* transformation is not an error at all —
//! it degrades to a no-op inside [`crate::document`] so that reordered
//! delivery still converges.

use thiserror::Error;

/// Errors surfaced by the synchronization engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A locally generated operation does not fit the document it is
    /// being applied to. The originator is expected to hold a valid
    /// view, so this is a hard error rather than a clamp.
    #[error("position {position} (length {length}) outside document of {doc_len} characters")]
    InvalidPosition {
        position: usize,
        length: usize,
        doc_len: usize,
    },

    /// Operation kind the engine does not produce or accept.
    /// `retain` exists in the wire vocabulary but is rejected here.
    #[error("unsupported operation kind `{0}`")]
    UnknownKind(String),

    /// The operation id has already been applied. Soft error: state is
    /// untouched and at-least-once transports should treat this as a
    /// successful delivery.
    #[error("operation `{0}` was already applied")]
    DuplicateOp(String),

    /// Encode/decode failure at the wire boundary.
    #[error("operation serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
