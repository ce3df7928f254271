//! Frame vocabulary for the editor ↔ engine bridge.
//!
//! Frames are line-delimited JSON with an adjacent tag:
//!
//! ```text
//! {"type":"local_insert","data":{"position":4,"text":"hi"}}
//! {"type":"document_changed","data":{"content":"…","version":7}}
//! {"type":"health_check"}
//! ```
//!
//! One enum covers both directions — the host and the bridge share a
//! single vocabulary, exactly like the transport shares one operation
//! wire shape.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tandem_core::{Operation, VectorClock};

/// A participant as seen by the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub user_id: String,
    #[serde(default)]
    pub name: String,
}

impl Peer {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
        }
    }
}

/// One protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Message {
    // ── host → bridge ──────────────────────────────────────────────
    CreateSession {
        file_path: String,
        content: String,
    },
    JoinSession {
        session_id: String,
    },
    LeaveSession {
        session_id: String,
    },
    /// The local editor inserted `text` at `position`.
    LocalInsert {
        position: usize,
        text: String,
    },
    /// The local editor removed `length` characters at `position`.
    LocalDelete {
        position: usize,
        length: usize,
    },
    /// An operation delivered from a peer.
    RemoteOp {
        op: Operation,
    },
    /// Every peer has confirmed receipt of a local operation.
    Ack {
        op_id: String,
    },
    /// Opaque to the engine; the host relays these between editors.
    CursorMove {
        user_id: String,
        line: u64,
        column: u64,
    },
    RequestControl {
        requested_by: String,
    },
    ReleaseControl,
    ClockQuery,
    SnapshotQuery,
    HealthCheck,

    // ── bridge → host ──────────────────────────────────────────────
    SessionCreated {
        session_id: String,
        user_id: String,
    },
    SessionJoined {
        user_id: String,
        content: String,
        peers: Vec<Peer>,
    },
    PeerJoined {
        peer: Peer,
    },
    PeerLeft {
        user_id: String,
    },
    /// A freshly stamped local operation for the host to broadcast.
    OpCreated {
        op: Operation,
    },
    /// A remote operation in its applied (transformed) form.
    OpApplied {
        op: Operation,
    },
    DocumentChanged {
        content: String,
        version: u64,
    },
    ConflictResolved {
        local: Operation,
        remote: Operation,
        resolved: Operation,
    },
    ControlStatus {
        current_controller: Option<String>,
        has_control: bool,
    },
    ClockState {
        vector_clock: VectorClock,
    },
    Snapshot {
        content: String,
        version: u64,
        vector_clock: VectorClock,
    },
    Status {
        status: String,
        #[serde(default)]
        info: String,
    },
    Error {
        code: String,
        message: String,
    },
}

impl Message {
    /// Shorthand for an error frame.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Message::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a status frame.
    pub fn status(status: impl Into<String>, info: impl Into<String>) -> Self {
        Message::Status {
            status: status.into(),
            info: info.into(),
        }
    }

    /// Serialize to one JSON line (no trailing newline).
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse one JSON line.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(line)?)
    }
}

/// Frame-level failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::OpKind;

    #[test]
    fn test_frame_shape_is_type_plus_data() {
        let msg = Message::LocalInsert {
            position: 4,
            text: "hi".into(),
        };
        let line = msg.encode().unwrap();
        assert_eq!(
            line,
            r#"{"type":"local_insert","data":{"position":4,"text":"hi"}}"#
        );
    }

    #[test]
    fn test_unit_frames_have_no_data() {
        let line = Message::HealthCheck.encode().unwrap();
        assert_eq!(line, r#"{"type":"health_check"}"#);
        assert_eq!(Message::decode(&line).unwrap(), Message::HealthCheck);
    }

    #[test]
    fn test_roundtrip_remote_op() {
        let op = Operation::insert(3, "abc", "u1", VectorClock::from([("u1", 2u64)]));
        let msg = Message::RemoteOp { op: op.clone() };
        let decoded = Message::decode(&msg.encode().unwrap()).unwrap();
        match decoded {
            Message::RemoteOp { op: back } => {
                assert_eq!(back, op);
                assert_eq!(back.kind, OpKind::Insert);
            }
            other => panic!("expected remote_op, got {other:?}"),
        }
    }

    #[test]
    fn test_roundtrip_session_frames() {
        let msg = Message::SessionJoined {
            user_id: "u2".into(),
            content: "shared".into(),
            peers: vec![Peer::new("u1", "Creator"), Peer::new("u2", "")],
        };
        let decoded = Message::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_error_and_status_helpers() {
        let err = Message::error("invalid_position", "position 9 outside document");
        match &err {
            Message::Error { code, .. } => assert_eq!(code, "invalid_position"),
            other => panic!("expected error frame, got {other:?}"),
        }

        let line = Message::status("healthy", "bridge running").encode().unwrap();
        assert!(line.contains(r#""status":"healthy""#));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Message::decode("{oops").is_err());
        assert!(Message::decode(r#"{"type":"no_such_frame"}"#).is_err());
    }

    #[test]
    fn test_snapshot_frame_carries_clock() {
        let msg = Message::Snapshot {
            content: "abc".into(),
            version: 3,
            vector_clock: VectorClock::from([("u1", 3u64)]),
        };
        let line = msg.encode().unwrap();
        assert!(line.contains(r#""vector_clock":{"u1":3}"#));
    }
}
