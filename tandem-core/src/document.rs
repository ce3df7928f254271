//! Replicated document state: the character sequence, its version, the
//! merged causal view, and the ordered log of applied operations.
//!
//! Two application modes:
//!
//! - **strict** (local edits): out-of-bounds positions are the caller's
//!   bug and come back as `InvalidPosition`.
//! - **clamped** (remote edits and transform replay): out-of-bounds
//!   positions degrade silently to a no-op. Under reordered delivery a
//!   transformed delete can legitimately point past the end of the
//!   document; erroring there would wedge convergence.
//!
//! Positions are character offsets. All splicing goes through the char
//! boundary helpers so multi-byte text cannot tear.

use crate::clock::VectorClock;
use crate::error::SyncError;
use crate::op::{OpKind, Operation};

/// Value snapshot handed to readers.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub content: String,
    pub version: u64,
    pub clock: VectorClock,
}

/// The replicated sequence plus its causal view.
///
/// Invariants, maintained by every mutator:
/// - `version == log.len()`
/// - `clock` is the componentwise max over the clocks in `log`
/// - `content` equals the fold of `log` over the base content
#[derive(Debug, Clone, Default)]
pub struct DocumentState {
    /// Content the current epoch started from (what `set_document` saw).
    base: String,
    content: String,
    version: u64,
    clock: VectorClock,
    log: Vec<Operation>,
}

impl DocumentState {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            content: base.clone(),
            base,
            version: 0,
            clock: VectorClock::new(),
            log: Vec::new(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    /// Applied operations, oldest first, in their applied (transformed)
    /// form.
    pub fn log(&self) -> &[Operation] {
        &self.log
    }

    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            content: self.content.clone(),
            version: self.version,
            clock: self.clock.clone(),
        }
    }

    /// Start a fresh epoch from `base`: log, version and clock all reset.
    pub fn reset(&mut self, base: impl Into<String>) {
        self.base = base.into();
        self.content = self.base.clone();
        self.version = 0;
        self.clock = VectorClock::new();
        self.log.clear();
    }

    /// Strict application for locally generated operations.
    pub fn apply_strict(&mut self, op: &Operation) -> Result<(), SyncError> {
        let doc_len = self.char_len();
        match op.kind {
            OpKind::Insert => {
                if op.position > doc_len {
                    return Err(SyncError::InvalidPosition {
                        position: op.position,
                        length: op.length,
                        doc_len,
                    });
                }
                insert_chars(&mut self.content, op.position, &op.content);
            }
            OpKind::Delete => {
                if op.position + op.length > doc_len {
                    return Err(SyncError::InvalidPosition {
                        position: op.position,
                        length: op.length,
                        doc_len,
                    });
                }
                remove_chars(&mut self.content, op.position, op.position + op.length);
            }
            OpKind::Retain => return Err(SyncError::UnknownKind(op.kind.to_string())),
        }
        self.commit(op);
        Ok(())
    }

    /// Clamped application for remote operations and transform replay.
    ///
    /// Out-of-range edits become no-ops but are still committed to the
    /// log, so version accounting and catch-up streams see them.
    pub fn apply_clamped(&mut self, op: &Operation) {
        if op.kind == OpKind::Retain {
            return;
        }
        splice_clamped(&mut self.content, op);
        self.commit(op);
    }

    /// Rebuild the document as the fold of `ops` over the base content.
    /// Used to undo optimistic local operations before a remote merge.
    pub fn rebuild(&mut self, ops: Vec<Operation>) {
        self.content = self.base.clone();
        self.version = 0;
        self.clock = VectorClock::new();
        self.log.clear();
        for op in ops {
            self.apply_clamped(&op);
        }
    }

    /// Swap in a whole new serialization after a remote merge.
    ///
    /// `log` must fold to `content`; `newly_applied` is the one
    /// operation not yet covered by the document clock.
    pub(crate) fn adopt(
        &mut self,
        content: String,
        log: Vec<Operation>,
        newly_applied: &Operation,
    ) {
        self.content = content;
        self.version = log.len() as u64;
        self.log = log;
        self.clock.merge(&newly_applied.clock);
    }

    fn commit(&mut self, op: &Operation) {
        self.version += 1;
        self.clock.merge(&op.clock);
        self.log.push(op.clone());
    }
}

/// Apply one operation to bare content, clamping out-of-range edits to
/// no-ops. The text-level half of [`DocumentState::apply_clamped`],
/// shared with the sync manager's shadow bookkeeping.
pub(crate) fn splice_clamped(content: &mut String, op: &Operation) {
    let doc_len = content.chars().count();
    match op.kind {
        OpKind::Insert => {
            if op.position <= doc_len {
                insert_chars(content, op.position, &op.content);
            }
        }
        OpKind::Delete => {
            if op.position < doc_len && op.length > 0 {
                let end = (op.position + op.length).min(doc_len);
                remove_chars(content, op.position, end);
            }
        }
        OpKind::Retain => {}
    }
}

/// Byte index of character `char_pos`, or the end of the string.
fn byte_offset(s: &str, char_pos: usize) -> usize {
    s.char_indices()
        .nth(char_pos)
        .map(|(idx, _)| idx)
        .unwrap_or(s.len())
}

fn insert_chars(content: &mut String, char_pos: usize, text: &str) {
    let at = byte_offset(content, char_pos);
    content.insert_str(at, text);
}

fn remove_chars(content: &mut String, start_char: usize, end_char: usize) {
    let start = byte_offset(content, start_char);
    let end = byte_offset(content, end_char);
    content.replace_range(start..end, "");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ins(position: usize, content: &str, clock: VectorClock) -> Operation {
        Operation {
            kind: OpKind::Insert,
            position,
            content: content.into(),
            length: content.chars().count(),
            origin: "u1".into(),
            wall_time: 0,
            op_id: format!("u1-0-{position}-{content}"),
            clock,
        }
    }

    fn del(position: usize, length: usize) -> Operation {
        Operation {
            kind: OpKind::Delete,
            position,
            content: String::new(),
            length,
            origin: "u1".into(),
            wall_time: 0,
            op_id: format!("u1-0-del{position}x{length}"),
            clock: VectorClock::new(),
        }
    }

    #[test]
    fn test_strict_insert_and_delete() {
        let mut doc = DocumentState::new("abcdef");
        doc.apply_strict(&ins(2, "X", VectorClock::new())).unwrap();
        assert_eq!(doc.content(), "abXcdef");

        doc.apply_strict(&del(3, 2)).unwrap();
        assert_eq!(doc.content(), "abXef");
        assert_eq!(doc.version(), 2);
        assert_eq!(doc.log().len(), 2);
    }

    #[test]
    fn test_strict_insert_at_end() {
        let mut doc = DocumentState::new("ab");
        doc.apply_strict(&ins(2, "c", VectorClock::new())).unwrap();
        assert_eq!(doc.content(), "abc");
    }

    #[test]
    fn test_strict_rejects_out_of_bounds() {
        let mut doc = DocumentState::new("abc");

        let err = doc.apply_strict(&ins(4, "x", VectorClock::new())).unwrap_err();
        assert!(matches!(err, SyncError::InvalidPosition { position: 4, .. }));

        let err = doc.apply_strict(&del(2, 5)).unwrap_err();
        assert!(matches!(err, SyncError::InvalidPosition { .. }));

        // Nothing committed on failure.
        assert_eq!(doc.version(), 0);
        assert_eq!(doc.content(), "abc");
    }

    #[test]
    fn test_strict_rejects_retain() {
        let mut doc = DocumentState::new("abc");
        let mut op = del(0, 1);
        op.kind = OpKind::Retain;
        assert!(matches!(
            doc.apply_strict(&op),
            Err(SyncError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_clamped_out_of_bounds_is_noop_but_committed() {
        let mut doc = DocumentState::new("abc");
        doc.apply_clamped(&del(10, 2));
        assert_eq!(doc.content(), "abc");
        // Still counted: version tracks the log, not the mutations.
        assert_eq!(doc.version(), 1);
        assert_eq!(doc.log().len(), 1);
    }

    #[test]
    fn test_clamped_delete_truncates_at_end() {
        let mut doc = DocumentState::new("abcdef");
        doc.apply_clamped(&del(4, 10));
        assert_eq!(doc.content(), "abcd");
    }

    #[test]
    fn test_clamped_zero_length_delete() {
        let mut doc = DocumentState::new("abc");
        doc.apply_clamped(&del(1, 0));
        assert_eq!(doc.content(), "abc");
        assert_eq!(doc.version(), 1);
    }

    #[test]
    fn test_multibyte_positions_are_characters() {
        let mut doc = DocumentState::new("héllo");
        doc.apply_strict(&ins(2, "→", VectorClock::new())).unwrap();
        assert_eq!(doc.content(), "hé→llo");
        doc.apply_strict(&del(0, 3)).unwrap();
        assert_eq!(doc.content(), "llo");
    }

    #[test]
    fn test_clock_merges_from_applied_ops() {
        let mut doc = DocumentState::new("");
        doc.apply_strict(&ins(0, "a", VectorClock::from([("u1", 1)])))
            .unwrap();
        doc.apply_strict(&ins(1, "b", VectorClock::from([("u2", 4)])))
            .unwrap();
        assert_eq!(doc.clock().get("u1"), 1);
        assert_eq!(doc.clock().get("u2"), 4);
    }

    #[test]
    fn test_rebuild_folds_over_base() {
        let mut doc = DocumentState::new("base");
        let a = ins(4, "!", VectorClock::from([("u1", 1)]));
        let b = ins(0, ">", VectorClock::from([("u2", 1)]));
        doc.apply_clamped(&a);
        doc.apply_clamped(&b);
        assert_eq!(doc.content(), ">base!");

        // Drop `b` from the log and rebuild.
        doc.rebuild(vec![a.clone()]);
        assert_eq!(doc.content(), "base!");
        assert_eq!(doc.version(), 1);
        assert_eq!(doc.clock().get("u2"), 0);
    }

    #[test]
    fn test_reset_starts_fresh_epoch() {
        let mut doc = DocumentState::new("old");
        doc.apply_clamped(&ins(0, "x", VectorClock::from([("u1", 1)])));
        doc.reset("new");
        assert_eq!(doc.content(), "new");
        assert_eq!(doc.version(), 0);
        assert!(doc.log().is_empty());
        assert_eq!(doc.clock(), &VectorClock::new());
    }
}
