//! # tandem-core — operational transformation for shared text
//!
//! A single-document OT engine for peer-symmetric collaborative editing.
//! Local edits apply optimistically; remote edits are transformed against
//! any unacknowledged local edits so every participant converges to the
//! same character sequence regardless of delivery order.
//!
//! ## Architecture
//!
//! ```text
//! editor thread                      transport thread
//!      │ make_insert / make_delete        │ remote_op bytes
//!      ▼                                  ▼
//! ┌──────────────────────────────────────────────────┐
//! │                   SyncManager                     │
//! │                                                  │
//! │  VectorClock ── causal stamps                    │
//! │  DocumentState ── content + version + log        │
//! │  OperationBuffer ── pending / staged             │
//! │  HistoryLog ── bounded retention window          │
//! └───────────────┬──────────────────────────────────┘
//!                 │ document_changed / op_applied / conflict_resolved
//!                 ▼
//!            host callbacks
//! ```
//!
//! ## Modules
//!
//! - [`clock`] — vector clocks (happens-before, concurrency detection)
//! - [`op`] — the edit operation record and its JSON wire shape
//! - [`transform`] — pairwise inclusion transforms and precedence order
//! - [`buffer`] — pending/staging buffers and the bounded history log
//! - [`document`] — replicated document state and the apply fold
//! - [`sync`] — the coordinator that ties everything together
//!
//! Reference: Ellis & Gibbs — Concurrency Control in Groupware Systems

pub mod buffer;
pub mod clock;
pub mod document;
pub mod error;
pub mod op;
pub mod sync;
pub mod transform;

// Re-exports for convenience
pub use buffer::{HistoryLog, OperationBuffer};
pub use clock::VectorClock;
pub use document::{DocumentSnapshot, DocumentState};
pub use error::SyncError;
pub use op::{OpKind, Operation};
pub use sync::SyncManager;
pub use transform::{priority, takes_precedence, transform};
