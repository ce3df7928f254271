//! tandem-bridge — line-delimited JSON bridge for editor hosts.
//!
//! Reads one frame per line from stdin, dispatches to the session
//! manager and the sync engine, and writes response frames plus engine
//! events to stdout. stdout is reserved for protocol frames; logging
//! goes to stderr.
//!
//! ```text
//! editor host ── stdin ──▶ frame loop ──▶ SessionManager
//!                              │               │
//!                              ▼               ▼
//!                         SyncManager ──▶ event channel ── stdout ──▶ host
//! ```

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use tandem_collab::protocol::Message;
use tandem_collab::session::SessionManager;
use tandem_core::{SyncError, SyncManager};

/// Dispatches frames to the session layer and the engine.
struct CollabBridge {
    sessions: SessionManager,
    sync: Arc<SyncManager>,
}

impl CollabBridge {
    /// Wire up the engine so its events flow out as frames.
    fn new(events: mpsc::UnboundedSender<Message>) -> Self {
        let sessions = SessionManager::new();
        let sync = Arc::new(SyncManager::new(sessions.user_id().to_string()));

        let tx = events.clone();
        sync.on_document_changed(move |content, version| {
            let _ = tx.send(Message::DocumentChanged {
                content: content.to_string(),
                version,
            });
        });
        let tx = events.clone();
        sync.on_op_applied(move |op| {
            let _ = tx.send(Message::OpApplied { op: op.clone() });
        });
        let tx = events;
        sync.on_conflict_resolved(move |local, remote, resolved| {
            let _ = tx.send(Message::ConflictResolved {
                local: local.clone(),
                remote: remote.clone(),
                resolved: resolved.clone(),
            });
        });

        Self { sessions, sync }
    }

    /// Handle one inbound frame; `None` means no direct response.
    fn handle(&self, msg: Message) -> Option<Message> {
        match msg {
            Message::CreateSession { file_path, content } => {
                let session = self.sessions.create_session(file_path, content.clone());
                self.sync.set_document(content);
                info!("created session {}", session.id);
                Some(Message::SessionCreated {
                    session_id: session.id,
                    user_id: self.sessions.user_id().to_string(),
                })
            }

            Message::JoinSession { session_id } => match self.sessions.join_session(&session_id) {
                Ok(session) => {
                    self.sync.set_document(session.content.clone());
                    info!("joined session {session_id}");
                    Some(Message::SessionJoined {
                        user_id: self.sessions.user_id().to_string(),
                        content: session.content,
                        peers: session.peers.into_values().collect(),
                    })
                }
                Err(e) => Some(Message::error("join_session_failed", e.to_string())),
            },

            Message::LeaveSession { .. } => match self.sessions.leave_session() {
                Ok(()) => Some(Message::status("left", "left session")),
                Err(e) => Some(Message::error("leave_session_failed", e.to_string())),
            },

            Message::LocalInsert { position, text } => {
                let op = self.sync.make_insert(position, text);
                match self.sync.apply_local(op.clone()) {
                    Ok(()) => Some(Message::OpCreated { op }),
                    Err(e) => Some(Message::error(error_code(&e), e.to_string())),
                }
            }

            Message::LocalDelete { position, length } => {
                let op = self.sync.make_delete(position, length);
                match self.sync.apply_local(op.clone()) {
                    Ok(()) => Some(Message::OpCreated { op }),
                    Err(e) => Some(Message::error(error_code(&e), e.to_string())),
                }
            }

            Message::RemoteOp { op } => match self.sync.apply_remote(op) {
                Ok(applied) => {
                    debug!("applied remote op {}", applied.op_id);
                    Some(Message::status("applied", applied.op_id))
                }
                // At-least-once transport: a duplicate is a successful
                // delivery, not a fault worth an error frame.
                Err(SyncError::DuplicateOp(op_id)) => {
                    debug!("duplicate remote op {op_id}");
                    Some(Message::status("duplicate", op_id))
                }
                Err(e) => Some(Message::error(error_code(&e), e.to_string())),
            },

            Message::Ack { op_id } => {
                self.sync.acknowledge(op_id);
                self.sync.cleanup();
                None
            }

            // Opaque to the engine; the host relays cursor traffic.
            Message::CursorMove { .. } => None,

            Message::RequestControl { requested_by } => {
                if requested_by != self.sessions.user_id() {
                    return Some(Message::error(
                        "invalid_control_request",
                        "can only request control for yourself",
                    ));
                }
                match self.sessions.request_control() {
                    Ok(status) => Some(Message::ControlStatus {
                        current_controller: status.current_controller,
                        has_control: status.has_control,
                    }),
                    Err(e) => Some(Message::error("control_request_failed", e.to_string())),
                }
            }

            Message::ReleaseControl => match self.sessions.release_control() {
                Ok(status) => Some(Message::ControlStatus {
                    current_controller: status.current_controller,
                    has_control: status.has_control,
                }),
                Err(e) => Some(Message::error("control_release_failed", e.to_string())),
            },

            Message::ClockQuery => Some(Message::ClockState {
                vector_clock: self.sync.local_clock(),
            }),

            Message::SnapshotQuery => {
                let snap = self.sync.get_document();
                Some(Message::Snapshot {
                    content: snap.content,
                    version: snap.version,
                    vector_clock: snap.clock,
                })
            }

            Message::HealthCheck => Some(Message::status("healthy", "bridge running")),

            other => Some(Message::error(
                "unexpected_message_type",
                format!("frame is outbound-only: {other:?}"),
            )),
        }
    }
}

fn error_code(e: &SyncError) -> &'static str {
    match e {
        SyncError::InvalidPosition { .. } => "invalid_position",
        SyncError::UnknownKind(_) => "unknown_kind",
        SyncError::DuplicateOp(_) => "duplicate_op",
        SyncError::Serialization(_) => "serialization",
    }
}

#[tokio::main]
async fn main() -> io::Result<()> {
    // stdout carries frames; logs go to stderr.
    env_logger::init();
    info!("starting tandem bridge");

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        let mut stdout = io::stdout();
        while let Some(msg) = rx.recv().await {
            match msg.encode() {
                Ok(line) => {
                    if stdout.write_all(line.as_bytes()).await.is_err()
                        || stdout.write_all(b"\n").await.is_err()
                        || stdout.flush().await.is_err()
                    {
                        break;
                    }
                }
                Err(e) => error!("failed to encode outbound frame: {e}"),
            }
        }
    });

    let bridge = CollabBridge::new(tx.clone());
    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let response = match Message::decode(line) {
                        Ok(msg) => bridge.handle(msg),
                        Err(e) => {
                            warn!("unparseable frame: {e}");
                            Some(Message::error("parse_error", e.to_string()))
                        }
                    };
                    if let Some(msg) = response {
                        let _ = tx.send(msg);
                    }
                }
                None => {
                    info!("stdin closed, shutting down");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
        }
    }

    // Dropping the bridge releases the engine's handler-held senders so
    // the writer drains and exits.
    drop(bridge);
    drop(tx);
    let _ = writer.await;
    info!("tandem bridge stopped");
    Ok(())
}
