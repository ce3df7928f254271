//! The edit operation record and its JSON wire shape.
//!
//! An [`Operation`] is an immutable description of one atomic edit,
//! stamped with its origin, a vector-clock snapshot, a wall-clock
//! timestamp (tie-break input only) and a globally unique id.
//!
//! Wire shape (line-delimited JSON between peers):
//!
//! ```text
//! { "type": "insert" | "delete",
//!   "position": 4,
//!   "content": "hi",
//!   "length": 2,
//!   "user_id": "a91f…",
//!   "timestamp": 1733659042123456789,
//!   "id": "a91f…-1733659042123456789-9f8a6c23d1e04b57",
//!   "vector_clock": { "a91f…": 3 } }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::clock::VectorClock;
use crate::error::SyncError;

/// Edit primitive variant.
///
/// `Retain` is part of the shared wire vocabulary but the engine never
/// produces it and rejects it on intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Insert,
    Delete,
    Retain,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Insert => write!(f, "insert"),
            OpKind::Delete => write!(f, "delete"),
            OpKind::Retain => write!(f, "retain"),
        }
    }
}

/// One atomic edit, in the coordinates of the document at the moment it
/// was generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub kind: OpKind,

    /// 0-based character offset at generation time.
    pub position: usize,

    /// Inserted text for `Insert`; for `Delete`, the text that was
    /// present at generation (diagnostic only, never read by the
    /// transforms).
    #[serde(default)]
    pub content: String,

    /// Characters removed for `Delete`; character count of `content`
    /// for `Insert`.
    #[serde(default)]
    pub length: usize,

    /// Originating participant.
    #[serde(rename = "user_id")]
    pub origin: String,

    /// Generation time in nanoseconds. Tie-break input only.
    #[serde(rename = "timestamp")]
    pub wall_time: i64,

    /// Globally unique id: origin, wall time and a random suffix.
    #[serde(rename = "id")]
    pub op_id: String,

    /// Vector-clock snapshot at generation time.
    #[serde(rename = "vector_clock")]
    pub clock: VectorClock,
}

impl Operation {
    /// Build an insert stamped with the current wall clock and a fresh id.
    pub fn insert(
        position: usize,
        content: impl Into<String>,
        origin: impl Into<String>,
        clock: VectorClock,
    ) -> Self {
        let content = content.into();
        let origin = origin.into();
        let wall_time = wall_clock_nanos();
        Self {
            kind: OpKind::Insert,
            position,
            length: content.chars().count(),
            content,
            op_id: generate_op_id(&origin, wall_time),
            origin,
            wall_time,
            clock,
        }
    }

    /// Build a delete stamped with the current wall clock and a fresh id.
    ///
    /// `removed` is the text the originator saw at `position`, captured
    /// for conflict diagnostics.
    pub fn delete(
        position: usize,
        length: usize,
        removed: impl Into<String>,
        origin: impl Into<String>,
        clock: VectorClock,
    ) -> Self {
        let origin = origin.into();
        let wall_time = wall_clock_nanos();
        Self {
            kind: OpKind::Delete,
            position,
            length,
            content: removed.into(),
            op_id: generate_op_id(&origin, wall_time),
            origin,
            wall_time,
            clock,
        }
    }

    /// A delete whose range was consumed by concurrent edits.
    pub fn is_noop(&self) -> bool {
        matches!(self.kind, OpKind::Delete) && self.length == 0
    }

    /// Serialize to the JSON wire shape.
    pub fn encode(&self) -> Result<String, SyncError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from the JSON wire shape.
    pub fn decode(raw: &str) -> Result<Self, SyncError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Globally unique operation id: `origin-walltime-randomhex`.
pub fn generate_op_id(origin: &str, wall_time: i64) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{origin}-{wall_time}-{}", &suffix[..16])
}

/// Nanoseconds since the Unix epoch. Monotonic-ish: good enough as a
/// tie-break input, never used for ordering guarantees.
pub fn wall_clock_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}
