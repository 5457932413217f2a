//! Post-parse call-graph stitching and cost ranking.
//!
//! Parsing leaves each outbound call holding only the interned *position*
//! of its callee. Stitching resolves those positions to canonical entries
//! and installs the reverse caller edges, turning the flat entry list into
//! a navigable graph: calls out, callers in, both as `EntryId` indices.
//!
//! Ranking runs first so that the ids handed out by stitching index the
//! final hot-list order and never need remapping.

use std::collections::HashMap;

use crate::model::{EntryId, PositionId, Profile};

/// Stable-sort entries by first-event total cost, descending. Ties keep
/// parse order, so output is deterministic for equal-cost entries.
pub fn rank(profile: &mut Profile) {
    let n_events = profile.events.len();
    profile
        .entries
        .sort_by_cached_key(|entry| std::cmp::Reverse(entry.total_cost(n_events).first().copied().unwrap_or(0)));
}

/// Resolve call targets to canonical entries and install caller back-edges.
///
/// A position observed by several top-level entries resolves to the
/// hottest one (first in rank order). Calls whose target was never
/// observed as a top-level entry keep `target: None`; their
/// `target_position` still identifies the callee.
pub fn stitch(profile: &mut Profile) {
    let mut by_position: HashMap<PositionId, EntryId> = HashMap::new();
    for (index, entry) in profile.entries.iter().enumerate() {
        by_position.entry(entry.position).or_insert(EntryId(index));
    }

    let mut caller_edges: Vec<(EntryId, EntryId)> = Vec::new();
    for (index, entry) in profile.entries.iter_mut().enumerate() {
        for call in &mut entry.calls {
            if let Some(&target) = by_position.get(&call.target_position) {
                call.target = Some(target);
                caller_edges.push((target, EntryId(index)));
            }
        }
    }

    for (target, caller) in caller_edges {
        let callers = &mut profile.entries[target.0].callers;
        // Get-or-insert semantics: each caller appears exactly once.
        if !callers.contains(&caller) {
            callers.push(caller);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Call, CostRow, Entry, Position};
    use std::sync::Arc;

    fn intern(profile: &mut Profile, symbol: &str) -> PositionId {
        let position = Position {
            object: Arc::from(""),
            source: Arc::from("a.c"),
            symbol: Arc::from(symbol),
        };
        profile.intern_position(&position)
    }

    fn entry_with_cost(position: PositionId, cost: u64) -> Entry {
        Entry {
            position,
            rows: vec![CostRow {
                sub_positions: vec![1],
                costs: vec![cost],
            }],
            calls: Vec::new(),
            callers: Vec::new(),
        }
    }

    fn call_to(target_position: PositionId, cost: u64) -> Call {
        Call {
            ncalls: 1,
            sub_positions: vec![1],
            rows: vec![CostRow {
                sub_positions: vec![1],
                costs: vec![cost],
            }],
            target_position,
            target: None,
        }
    }

    fn fixture() -> Profile {
        let mut profile = Profile::default();
        profile.events = vec!["Ir".to_string()];
        profile.position_axes = vec![crate::model::PositionAxis::Line];
        profile
    }

    #[test]
    fn test_rank_descending_stable() {
        let mut profile = fixture();
        let a = intern(&mut profile, "a");
        let b = intern(&mut profile, "b");
        let c = intern(&mut profile, "c");
        profile.entries.push(entry_with_cost(a, 10));
        profile.entries.push(entry_with_cost(b, 99));
        profile.entries.push(entry_with_cost(c, 10));

        rank(&mut profile);

        let order: Vec<PositionId> = profile.entries.iter().map(|e| e.position).collect();
        // b first, then a and c in parse order despite the tie.
        assert_eq!(order, vec![b, a, c]);
    }

    #[test]
    fn test_rank_key_includes_call_rows() {
        let mut profile = fixture();
        let a = intern(&mut profile, "a");
        let b = intern(&mut profile, "b");
        let other = intern(&mut profile, "other");

        let mut light = entry_with_cost(a, 10);
        light.calls.push(call_to(other, 50));
        profile.entries.push(light);
        profile.entries.push(entry_with_cost(b, 40));

        rank(&mut profile);
        // a totals 60 (10 own + 50 call), beating b's 40.
        assert_eq!(profile.entries[0].position, a);
    }

    #[test]
    fn test_stitch_binds_targets_and_callers() {
        let mut profile = fixture();
        let a = intern(&mut profile, "a");
        let b = intern(&mut profile, "b");

        let mut caller = entry_with_cost(a, 10);
        caller.calls.push(call_to(b, 5));
        profile.entries.push(caller);
        profile.entries.push(entry_with_cost(b, 20));

        rank(&mut profile);
        stitch(&mut profile);

        // After ranking, b (20) is entry 0 and a (15) is entry 1.
        let a_entry = &profile.entries[1];
        assert_eq!(a_entry.calls[0].target, Some(EntryId(0)));
        assert_eq!(profile.entries[0].callers, vec![EntryId(1)]);
    }

    #[test]
    fn test_stitch_leaves_unknown_targets_unresolved() {
        let mut profile = fixture();
        let a = intern(&mut profile, "a");
        let ghost = intern(&mut profile, "ghost");

        let mut caller = entry_with_cost(a, 10);
        caller.calls.push(call_to(ghost, 5));
        profile.entries.push(caller);

        rank(&mut profile);
        stitch(&mut profile);

        let call = &profile.entries[0].calls[0];
        assert_eq!(call.target, None);
        assert_eq!(call.target_position, ghost);
    }

    #[test]
    fn test_stitch_deduplicates_callers() {
        let mut profile = fixture();
        let a = intern(&mut profile, "a");
        let b = intern(&mut profile, "b");

        let mut caller = entry_with_cost(a, 50);
        // Two call sites into the same callee.
        caller.calls.push(call_to(b, 5));
        caller.calls.push(call_to(b, 6));
        profile.entries.push(caller);
        profile.entries.push(entry_with_cost(b, 1));

        rank(&mut profile);
        stitch(&mut profile);

        assert_eq!(profile.entries[1].callers, vec![EntryId(0)]);
    }

    #[test]
    fn test_stitch_handles_self_recursion() {
        let mut profile = fixture();
        let a = intern(&mut profile, "a");

        let mut entry = entry_with_cost(a, 10);
        entry.calls.push(call_to(a, 5));
        profile.entries.push(entry);

        rank(&mut profile);
        stitch(&mut profile);

        let entry = &profile.entries[0];
        assert_eq!(entry.calls[0].target, Some(EntryId(0)));
        assert_eq!(entry.callers, vec![EntryId(0)]);
    }
}
