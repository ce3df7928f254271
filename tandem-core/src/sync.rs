//! The synchronization coordinator.
//!
//! One `SyncManager` owns the document, the vector clock and every
//! buffer. Local edits apply optimistically and sit in the pending
//! buffer until acknowledged; remote edits are merged through the
//! inclusion transforms.
//!
//! ## Remote integration
//!
//! ```text
//! remote op r arrives
//!   │ dedup by op id, merge clocks
//!   ▼
//! undo pending locals         (restore the settled shadow: the
//!   │                          document with no pending ops in it)
//!   ▼
//! serialize r into the chain  (after locals that happen-before it,
//!   │                          otherwise by deterministic precedence)
//!   ▼
//! re-apply: prefix · r · transformed suffix
//!   │
//!   ▼
//! pending := locals in their new forms; log gains r at its slot
//! ```
//!
//! Both sides of a concurrent pair compute the same serialization —
//! the op that takes precedence applies in its original coordinates and
//! the other is transformed against it — so the replicas converge
//! regardless of delivery order.
//!
//! Locking: one writer lock spans the document and buffers for the
//! whole of any apply call. Callbacks fire after the lock is released;
//! do not re-enter the manager from inside a callback.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use log::debug;

use crate::buffer::{HistoryLog, OperationBuffer, DEFAULT_HISTORY_CAPACITY};
use crate::clock::VectorClock;
use crate::document::{splice_clamped, DocumentSnapshot, DocumentState};
use crate::error::SyncError;
use crate::op::{OpKind, Operation};
use crate::transform::{takes_precedence, transform};

/// Callback for content changes: `(content, version)`.
pub type DocumentChangedHandler = Box<dyn Fn(&str, u64) + Send + Sync>;
/// Callback for an integrated remote operation, in its applied form.
pub type OpAppliedHandler = Box<dyn Fn(&Operation) + Send + Sync>;
/// Callback for a resolved concurrent pair: `(local, remote, resolved)`.
pub type ConflictResolvedHandler = Box<dyn Fn(&Operation, &Operation, &Operation) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    document_changed: Option<DocumentChangedHandler>,
    op_applied: Option<OpAppliedHandler>,
    conflict_resolved: Option<ConflictResolvedHandler>,
}

/// Everything the writer lock protects.
struct EngineState {
    document: DocumentState,
    /// Shadow of the document with no pending local ops in it: the
    /// state remote operations are expressed against. Restoring this is
    /// the O(1) undo of the optimistic locals.
    settled: String,
    clock: VectorClock,
    acknowledged: HashSet<String>,
    applied_ids: HashSet<String>,
}

/// Notifications collected under the lock, dispatched after release.
enum Notification {
    DocumentChanged { content: String, version: u64 },
    OpApplied(Operation),
    ConflictResolved {
        local: Operation,
        remote: Operation,
        resolved: Operation,
    },
}

/// Coordinator for one shared document.
pub struct SyncManager {
    participant: String,
    state: RwLock<EngineState>,
    local_pending: OperationBuffer,
    remote_staging: OperationBuffer,
    history: HistoryLog,
    handlers: RwLock<Handlers>,
}

impl SyncManager {
    /// Create a manager for `participant` with the default history
    /// window.
    pub fn new(participant: impl Into<String>) -> Self {
        Self::with_history_capacity(participant, DEFAULT_HISTORY_CAPACITY)
    }

    /// Create a manager with an explicit history window.
    pub fn with_history_capacity(participant: impl Into<String>, capacity: usize) -> Self {
        let participant = participant.into();
        let mut clock = VectorClock::new();
        clock.set(participant.clone(), 0);
        Self {
            participant,
            state: RwLock::new(EngineState {
                document: DocumentState::new(""),
                settled: String::new(),
                clock,
                acknowledged: HashSet::new(),
                applied_ids: HashSet::new(),
            }),
            local_pending: OperationBuffer::new(),
            remote_staging: OperationBuffer::new(),
            history: HistoryLog::new(capacity),
            handlers: RwLock::new(Handlers::default()),
        }
    }

    pub fn participant(&self) -> &str {
        &self.participant
    }

    // ── event handlers ─────────────────────────────────────────────

    pub fn on_document_changed(&self, handler: impl Fn(&str, u64) + Send + Sync + 'static) {
        self.handlers.write().unwrap().document_changed = Some(Box::new(handler));
    }

    pub fn on_op_applied(&self, handler: impl Fn(&Operation) + Send + Sync + 'static) {
        self.handlers.write().unwrap().op_applied = Some(Box::new(handler));
    }

    pub fn on_conflict_resolved(
        &self,
        handler: impl Fn(&Operation, &Operation, &Operation) + Send + Sync + 'static,
    ) {
        self.handlers.write().unwrap().conflict_resolved = Some(Box::new(handler));
    }

    // ── document lifecycle ─────────────────────────────────────────

    /// Replace the document wholesale: fresh epoch, empty buffers,
    /// version zero. A rejoining peer calls this and then streams the
    /// operations newer than its clock through [`Self::apply_remote`].
    pub fn set_document(&self, content: impl Into<String>) {
        let mut state = self.state.write().unwrap();
        let content = content.into();
        state.settled = content.clone();
        state.document.reset(content);
        state.clock = VectorClock::new();
        state.clock.set(self.participant.clone(), 0);
        state.acknowledged.clear();
        state.applied_ids.clear();
        self.local_pending.clear();
        self.remote_staging.clear();
        self.history.clear();
    }

    /// Value snapshot of the document.
    pub fn get_document(&self) -> DocumentSnapshot {
        self.state.read().unwrap().document.snapshot()
    }

    /// Copy of the manager's causal view (includes increments for
    /// operations created but not yet applied).
    pub fn local_clock(&self) -> VectorClock {
        self.state.read().unwrap().clock.clone()
    }

    /// Pending (unacknowledged) local operations, oldest first.
    pub fn pending_ops(&self) -> Vec<Operation> {
        self.local_pending.snapshot()
    }

    // ── operation creation ─────────────────────────────────────────

    /// Stamp a new insert with an incremented local clock. Does not
    /// apply it; callers follow up with [`Self::apply_local`].
    pub fn make_insert(&self, position: usize, content: impl Into<String>) -> Operation {
        let mut state = self.state.write().unwrap();
        state.clock.increment(&self.participant);
        Operation::insert(position, content, &self.participant, state.clock.clone())
    }

    /// Stamp a new delete, capturing the text currently under the range
    /// for conflict diagnostics.
    pub fn make_delete(&self, position: usize, length: usize) -> Operation {
        let mut state = self.state.write().unwrap();
        state.clock.increment(&self.participant);
        let removed: String = state
            .document
            .content()
            .chars()
            .skip(position)
            .take(length)
            .collect();
        Operation::delete(position, length, removed, &self.participant, state.clock.clone())
    }

    // ── application ────────────────────────────────────────────────

    /// Optimistically apply a locally generated operation.
    ///
    /// Strict bounds: a local edit that does not fit the current
    /// document is `InvalidPosition`, and nothing is recorded.
    pub fn apply_local(&self, op: Operation) -> Result<(), SyncError> {
        if op.kind == OpKind::Retain {
            return Err(SyncError::UnknownKind(op.kind.to_string()));
        }
        let note;
        {
            let mut state = self.state.write().unwrap();
            state.document.apply_strict(&op)?;
            state.clock.merge(&op.clock);
            state.applied_ids.insert(op.op_id.clone());
            self.local_pending.push(op.clone());
            self.history.record(op);
            note = Notification::DocumentChanged {
                content: state.document.content().to_string(),
                version: state.document.version(),
            };
        }
        self.dispatch(vec![note]);
        Ok(())
    }

    /// Integrate an operation delivered from a peer.
    ///
    /// Returns the operation in its applied (transformed) form.
    /// Duplicate deliveries come back as `DuplicateOp` with all state
    /// untouched; transports treating delivery as at-least-once should
    /// swallow that variant.
    pub fn apply_remote(&self, op: Operation) -> Result<Operation, SyncError> {
        if op.kind == OpKind::Retain {
            return Err(SyncError::UnknownKind(op.kind.to_string()));
        }
        let mut notes = Vec::new();
        let applied_form;
        {
            let mut state = self.state.write().unwrap();
            if state.applied_ids.contains(&op.op_id) {
                debug!("duplicate delivery of {}", op.op_id);
                return Err(SyncError::DuplicateOp(op.op_id));
            }

            self.remote_staging.push(op.clone());
            state.clock.merge(&op.clock);

            let pending = self.local_pending.snapshot();

            // Locals the sender had already seen stay ahead of the
            // remote op untouched. One participant's pending ops form a
            // causal chain, so these are always a prefix.
            let seen = pending
                .iter()
                .take_while(|l| l.clock.happens_before(&op.clock))
                .count();

            // The incoming op may only slot in ahead of pending ops
            // that sit at the tail of the log: jumping over a pending
            // op with settled entries logged behind it would reorder
            // the op against edits it causally follows.
            let log_len = state.document.log().len();
            let tail_slot: Vec<bool> = {
                let log_index: HashMap<&str, usize> = state
                    .document
                    .log()
                    .iter()
                    .enumerate()
                    .map(|(index, entry)| (entry.op_id.as_str(), index))
                    .collect();
                (0..pending.len())
                    .map(|k| {
                        log_index
                            .get(pending[k].op_id.as_str())
                            .map_or(false, |&i| log_len - i == pending.len() - k)
                    })
                    .collect()
            };

            let mut incoming = op.clone();
            let mut replay: Vec<Operation> = pending[..seen].to_vec();
            let mut placement: Option<usize> = None;
            // The remote op's image in the coordinate frame of the
            // locals it has already passed; used to transform the
            // locals serialized behind it.
            let mut image = op.clone();

            for (index, local) in pending.iter().enumerate().skip(seen) {
                if placement.is_none()
                    && tail_slot[index]
                    && takes_precedence(&incoming, local)
                {
                    placement = Some(index);
                    image = incoming.clone();
                }
                if placement.is_some() {
                    let resolved = transform(local, &image, false);
                    notes.push(Notification::ConflictResolved {
                        local: local.clone(),
                        remote: op.clone(),
                        resolved: resolved.clone(),
                    });
                    image = transform(&image, local, true);
                    replay.push(resolved);
                } else {
                    incoming = transform(&incoming, local, false);
                    notes.push(Notification::ConflictResolved {
                        local: local.clone(),
                        remote: op.clone(),
                        resolved: incoming.clone(),
                    });
                    replay.push(local.clone());
                }
            }

            // Rebuild the content from the settled shadow: locals ahead
            // of the remote op, the op at its slot, transformed locals
            // behind it. Clamped splicing: a transformed edit falling
            // outside the document is a no-op, not an error.
            let ahead = placement.unwrap_or(pending.len());
            let mut content = state.settled.clone();
            for local in &replay[..ahead] {
                splice_clamped(&mut content, local);
            }
            splice_clamped(&mut content, &incoming);
            for local in &replay[ahead..] {
                splice_clamped(&mut content, local);
            }

            // The shadow itself absorbs the remote op in its original
            // coordinates: settled state has no pending locals, which is
            // exactly what the sender's stamp was expressed against.
            splice_clamped(&mut state.settled, &op);

            // New serialization log: settled entries keep their slots,
            // pending entries take their new forms, the incoming op
            // lands just ahead of the first pending op it out-ranked.
            let pending_index: HashMap<&str, usize> = pending
                .iter()
                .enumerate()
                .map(|(index, l)| (l.op_id.as_str(), index))
                .collect();
            let mut new_log = Vec::with_capacity(state.document.log().len() + 1);
            for entry in state.document.log() {
                match pending_index.get(entry.op_id.as_str()) {
                    Some(&index) => {
                        if placement == Some(index) {
                            new_log.push(incoming.clone());
                        }
                        new_log.push(replay[index].clone());
                    }
                    None => new_log.push(entry.clone()),
                }
            }
            if placement.is_none() {
                new_log.push(incoming.clone());
            }

            state.document.adopt(content, new_log, &incoming);

            self.local_pending.replace(replay);
            state.applied_ids.insert(op.op_id.clone());
            self.history.record(incoming.clone());

            debug!(
                "integrated {} from {} at position {} (version {})",
                incoming.op_id,
                incoming.origin,
                incoming.position,
                state.document.version()
            );

            applied_form = incoming;
            notes.push(Notification::OpApplied(applied_form.clone()));
            notes.push(Notification::DocumentChanged {
                content: state.document.content().to_string(),
                version: state.document.version(),
            });
        }
        self.dispatch(notes);
        Ok(applied_form)
    }

    // ── acknowledgment and catch-up ────────────────────────────────

    /// Mark a local operation as acknowledged by every peer. The entry
    /// leaves the pending buffer on the next [`Self::cleanup`].
    pub fn acknowledge(&self, op_id: impl Into<String>) {
        let mut state = self.state.write().unwrap();
        state.acknowledged.insert(op_id.into());
    }

    /// Drop acknowledged operations from the pending buffer (folding
    /// them into the settled shadow), prune the acknowledgment set of
    /// ids no longer pending, and bound the dedup/staging bookkeeping
    /// to the history window.
    pub fn cleanup(&self) {
        let mut state = self.state.write().unwrap();
        let state = &mut *state;
        let pending_before = self.local_pending.snapshot();

        // Acknowledged locals are settled everywhere: absorb them into
        // the shadow in buffer order before dropping them.
        for op in pending_before
            .iter()
            .filter(|op| state.acknowledged.contains(&op.op_id))
        {
            splice_clamped(&mut state.settled, op);
        }
        self.local_pending.retain_not_in(&state.acknowledged);

        let pending_ids: HashSet<String> = pending_before
            .iter()
            .map(|op| op.op_id.clone())
            .collect();
        state.acknowledged.retain(|id| pending_ids.contains(id));

        let applied = state.applied_ids.clone();
        self.remote_staging.retain_not_in(&applied);

        // Duplicate protection follows the retention window: ops older
        // than the history cutoff are unrecoverable anyway.
        let retained = self.history.ids();
        let still_pending = self.local_pending.ids();
        state
            .applied_ids
            .retain(|id| retained.contains(id) || still_pending.contains(id));
    }

    /// Every applied operation not causally covered by `peer_clock`,
    /// in applied order. A joining peer replays these through
    /// [`Self::apply_remote`] after a [`Self::set_document`].
    pub fn get_operations_since(&self, peer_clock: &VectorClock) -> Vec<Operation> {
        let state = self.state.read().unwrap();
        state
            .document
            .log()
            .iter()
            .filter(|op| !op.clock.happens_before(peer_clock) && op.clock != *peer_clock)
            .cloned()
            .collect()
    }

    fn dispatch(&self, notes: Vec<Notification>) {
        if notes.is_empty() {
            return;
        }
        let handlers = self.handlers.read().unwrap();
        for note in notes {
            match note {
                Notification::DocumentChanged { content, version } => {
                    if let Some(handler) = &handlers.document_changed {
                        handler(&content, version);
                    }
                }
                Notification::OpApplied(op) => {
                    if let Some(handler) = &handlers.op_applied {
                        handler(&op);
                    }
                }
                Notification::ConflictResolved {
                    local,
                    remote,
                    resolved,
                } => {
                    if let Some(handler) = &handlers.conflict_resolved {
                        handler(&local, &remote, &resolved);
                    }
                }
            }
        }
    }
}
