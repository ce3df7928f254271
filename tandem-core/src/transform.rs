//! Pairwise inclusion transforms and the deterministic precedence order.
//!
//! `transform(op, against, op_wins)` adjusts `op` so that it has the same
//! effect on a document that has already received `against` as it would
//! have had on the original document. The four kind pairings each follow
//! a fixed rule table; `op_wins` only matters for inserts landing at the
//! same position.
//!
//! Precedence between concurrent operations is a pure function of the
//! operations themselves — every participant computes the same winner,
//! which is what makes conflict resolution symmetric.
//!
//! Reference: Ellis & Gibbs — Concurrency Control in Groupware Systems

use std::cmp::Ordering;

use crate::op::{OpKind, Operation};

/// Inclusion-transform `op` against `against`.
///
/// Never fails; identity fields (`op_id`, `origin`, `wall_time`,
/// `clock`) pass through untouched, only `position`/`length` move.
pub fn transform(op: &Operation, against: &Operation, op_wins: bool) -> Operation {
    match (op.kind, against.kind) {
        (OpKind::Insert, OpKind::Insert) => insert_insert(op, against, op_wins),
        (OpKind::Insert, OpKind::Delete) => insert_delete(op, against),
        (OpKind::Delete, OpKind::Insert) => delete_insert(op, against),
        (OpKind::Delete, OpKind::Delete) => delete_delete(op, against),
        // Retain never reaches the transforms; intake rejects it.
        _ => op.clone(),
    }
}

fn insert_insert(op: &Operation, against: &Operation, op_wins: bool) -> Operation {
    let mut out = op.clone();
    if against.position < op.position || (against.position == op.position && !op_wins) {
        out.position += against.length;
    }
    out
}

fn insert_delete(op: &Operation, against: &Operation) -> Operation {
    let mut out = op.clone();
    let start = against.position;
    let end = against.position + against.length;
    if end <= op.position {
        // Deletion entirely to the left: slide the insert back.
        out.position -= against.length;
    } else if start <= op.position {
        // Insertion point was deleted: collapse to the deletion's left edge.
        out.position = start;
    }
    out
}

fn delete_insert(op: &Operation, against: &Operation) -> Operation {
    let mut out = op.clone();
    if against.position <= op.position {
        out.position += against.length;
    } else if against.position < op.position + op.length {
        // Insertion landed inside the range being deleted: swallow it.
        out.length += against.length;
    }
    out
}

fn delete_delete(op: &Operation, against: &Operation) -> Operation {
    let mut out = op.clone();
    let (a_start, a_end) = (against.position, against.position + against.length);
    let (o_start, o_end) = (op.position, op.position + op.length);

    if a_end <= o_start {
        // Entirely to the left.
        out.position -= against.length;
    } else if o_end <= a_start {
        // Entirely to the right: nothing moves.
    } else if a_start <= o_start && a_end >= o_end {
        // Fully covered: nothing left to delete.
        out.position = a_start;
        out.length = 0;
        out.content.clear();
    } else if o_start <= a_start && o_end >= a_end {
        // `op` covers `against`: the middle is already gone.
        out.length -= against.length;
    } else if a_start < o_start {
        // Partial overlap on the left.
        let overlap = a_end - o_start;
        out.position = a_start;
        out.length = op.length.saturating_sub(overlap);
    } else {
        // Partial overlap on the right.
        let overlap = o_end - a_start;
        out.length = op.length.saturating_sub(overlap);
    }
    out
}

/// 32-bit djb2 over the raw bytes of `input`.
pub fn djb2(input: &str) -> u32 {
    input
        .bytes()
        .fold(5381u32, |hash, byte| hash.wrapping_mul(33).wrapping_add(u32::from(byte)))
}

/// Deterministic priority of an operation.
///
/// `djb2(origin ‖ op_id)` widened to signed 64-bit, plus the generation
/// timestamp. Must be byte-for-byte identical on every participant.
pub fn priority(op: &Operation) -> i64 {
    let mut key = String::with_capacity(op.origin.len() + op.op_id.len());
    key.push_str(&op.origin);
    key.push_str(&op.op_id);
    i64::from(djb2(&key)).wrapping_add(op.wall_time)
}

/// Total order on concurrent operations: lower priority integrates
/// first, ties broken by lexicographic op id.
pub fn takes_precedence(a: &Operation, b: &Operation) -> bool {
    match priority(a).cmp(&priority(b)) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => a.op_id < b.op_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VectorClock;

    fn ins(position: usize, content: &str) -> Operation {
        Operation {
            kind: OpKind::Insert,
            position,
            content: content.into(),
            length: content.chars().count(),
            origin: "u1".into(),
            wall_time: 0,
            op_id: format!("u1-0-i{position}"),
            clock: VectorClock::new(),
        }
    }

    fn del(position: usize, length: usize) -> Operation {
        Operation {
            kind: OpKind::Delete,
            position,
            content: String::new(),
            length,
            origin: "u2".into(),
            wall_time: 0,
            op_id: format!("u2-0-d{position}x{length}"),
            clock: VectorClock::new(),
        }
    }

    // ── insert ∘ insert ────────────────────────────────────────────

    #[test]
    fn test_insert_insert_earlier_shifts() {
        let out = transform(&ins(5, "ab"), &ins(2, "xyz"), true);
        assert_eq!(out.position, 8);
    }

    #[test]
    fn test_insert_insert_same_position_tiebreak() {
        let winner = transform(&ins(3, "a"), &ins(3, "b"), true);
        assert_eq!(winner.position, 3);
        let loser = transform(&ins(3, "a"), &ins(3, "b"), false);
        assert_eq!(loser.position, 4);
    }

    #[test]
    fn test_insert_insert_later_unchanged() {
        let out = transform(&ins(1, "a"), &ins(4, "bc"), false);
        assert_eq!(out.position, 1);
    }

    // ── insert ∘ delete ────────────────────────────────────────────

    #[test]
    fn test_insert_after_delete_shifts_left() {
        let out = transform(&ins(6, "a"), &del(1, 3), true);
        assert_eq!(out.position, 3);
    }

    #[test]
    fn test_insert_inside_delete_collapses_to_edge() {
        let out = transform(&ins(3, "a"), &del(2, 4), true);
        assert_eq!(out.position, 2);
    }

    #[test]
    fn test_insert_at_delete_end_shifts() {
        // Deletion [2,5) ends exactly at the insert: plain shift.
        let out = transform(&ins(5, "a"), &del(2, 3), true);
        assert_eq!(out.position, 2);
    }

    #[test]
    fn test_insert_before_delete_unchanged() {
        let out = transform(&ins(1, "a"), &del(4, 2), true);
        assert_eq!(out.position, 1);
    }

    // ── delete ∘ insert ────────────────────────────────────────────

    #[test]
    fn test_delete_after_insert_shifts_right() {
        let out = transform(&del(3, 2), &ins(1, "xy"), true);
        assert_eq!(out.position, 5);
        assert_eq!(out.length, 2);
    }

    #[test]
    fn test_delete_swallows_interior_insert() {
        let out = transform(&del(1, 4), &ins(3, "X"), true);
        assert_eq!(out.position, 1);
        assert_eq!(out.length, 5);
    }

    #[test]
    fn test_delete_before_insert_unchanged() {
        // Insert exactly at the delete's end is not interior.
        let out = transform(&del(1, 4), &ins(5, "X"), true);
        assert_eq!(out.position, 1);
        assert_eq!(out.length, 4);
    }

    // ── delete ∘ delete ────────────────────────────────────────────

    #[test]
    fn test_delete_delete_disjoint_left() {
        let out = transform(&del(6, 2), &del(1, 3), true);
        assert_eq!(out.position, 3);
        assert_eq!(out.length, 2);
    }

    #[test]
    fn test_delete_delete_disjoint_right() {
        let out = transform(&del(1, 2), &del(5, 3), true);
        assert_eq!(out.position, 1);
        assert_eq!(out.length, 2);
    }

    #[test]
    fn test_delete_delete_fully_covered_becomes_noop() {
        let out = transform(&del(3, 2), &del(1, 6), true);
        assert_eq!(out.length, 0);
        assert_eq!(out.position, 1);
        assert!(out.is_noop());
    }

    #[test]
    fn test_delete_delete_identical_ranges_become_noop() {
        let out = transform(&del(2, 3), &del(2, 3), true);
        assert!(out.is_noop());
    }

    #[test]
    fn test_delete_delete_covering_shrinks() {
        let out = transform(&del(1, 6), &del(3, 2), true);
        assert_eq!(out.position, 1);
        assert_eq!(out.length, 4);
    }

    #[test]
    fn test_delete_delete_partial_overlap_left() {
        // against [3,7) overlaps op [2,6) on the right.
        let out = transform(&del(2, 4), &del(3, 4), true);
        assert_eq!(out.position, 2);
        assert_eq!(out.length, 1);
    }

    #[test]
    fn test_delete_delete_partial_overlap_right() {
        // against [2,6) starts before op [3,7).
        let out = transform(&del(3, 4), &del(2, 4), true);
        assert_eq!(out.position, 2);
        assert_eq!(out.length, 1);
    }

    #[test]
    fn test_transform_preserves_identity_fields() {
        let op = ins(5, "ab");
        let out = transform(&op, &del(0, 2), true);
        assert_eq!(out.op_id, op.op_id);
        assert_eq!(out.origin, op.origin);
        assert_eq!(out.wall_time, op.wall_time);
        assert_eq!(out.clock, op.clock);
    }

    // ── precedence ─────────────────────────────────────────────────

    #[test]
    fn test_djb2_pinned_values() {
        assert_eq!(djb2(""), 5381);
        // 5381*33+117 = 177_690; *33+49 = 5_863_819
        assert_eq!(djb2("u1"), 5_863_819);
    }

    #[test]
    fn test_priority_pinned_value() {
        let mut op = ins(0, "a");
        op.origin = "u".into();
        op.op_id = "1".into();
        op.wall_time = 7;
        assert_eq!(priority(&op), 5_863_819 + 7);
    }

    #[test]
    fn test_priority_is_pure() {
        let op = ins(2, "zz");
        assert_eq!(priority(&op), priority(&op));
        assert_eq!(priority(&op.clone()), priority(&op));
    }

    #[test]
    fn test_precedence_lower_priority_first() {
        let mut early = ins(0, "a");
        early.wall_time = 0;
        let mut late = ins(0, "b");
        // Larger than any 32-bit hash contribution: wall time dominates.
        late.wall_time = 10_000_000_000;
        assert!(takes_precedence(&early, &late));
        assert!(!takes_precedence(&late, &early));
    }

    #[test]
    fn test_precedence_ties_break_on_op_id() {
        let mut a = ins(0, "x");
        let mut b = ins(0, "x");
        a.origin = "s".into();
        b.origin = "s".into();
        a.op_id = "aa".into();
        b.op_id = "ab".into();
        a.wall_time = 0;
        b.wall_time = 0;
        if priority(&a) == priority(&b) {
            assert!(takes_precedence(&a, &b));
        } else {
            // Hashes differ; the order is still total and antisymmetric.
            assert_ne!(takes_precedence(&a, &b), takes_precedence(&b, &a));
        }
    }
}
