//! # tandem-collab — collaboration plumbing around the sync engine
//!
//! Everything between the OT engine and the outside world:
//!
//! - [`protocol`] — the line-delimited JSON frame vocabulary spoken
//!   with the editor host (`{"type": …, "data": …}`)
//! - [`session`] — session lifecycle, peer roster and the advisory
//!   edit-control token
//! - [`transport`] — an in-process delivery hub standing in for the
//!   peer-to-peer channel: best-effort, unordered, at-least-once
//!
//! The engine itself lives in `tandem-core`; nothing in this crate
//! touches document content beyond carrying it.

pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use protocol::{Message, Peer, ProtocolError};
pub use session::{ControlStatus, Session, SessionError, SessionManager};
pub use transport::{Delivery, DeliveryHub, HubStats};
