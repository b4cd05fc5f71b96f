use std::collections::BTreeSet;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;
use crate::test_helpers::{empty, init_tracing, push, stack};

fn return_states(ctx: &PredictionContext) -> Vec<i32> {
    ctx.entries().into_iter().map(|(_, return_state)| return_state).collect()
}

/// Every stack `ctx` stands for, innermost return state first.
fn stacks(ctx: &PredictionContext) -> BTreeSet<Vec<i32>> {
    let mut out = BTreeSet::new();
    for (parent, return_state) in ctx.entries() {
        if return_state == EMPTY_RETURN_STATE {
            out.insert(Vec::new());
            continue;
        }
        let tails = parent.map_or_else(|| BTreeSet::from([Vec::new()]), |p| stacks(&p));
        for tail in tails {
            let mut frames = vec![return_state];
            frames.extend(tail);
            out.insert(frames);
        }
    }
    out
}

// ── Singletons ──────────────────────────────────────────────────────

#[test]
fn same_parent_same_return_state_is_absorbed() {
    init_tracing();
    let p = stack(&[9]);
    let a = push(&p, 5);
    let b = push(&p, 5);
    let mut cache = MergeCache::new();

    let merged = merge(&a, &b, false, Some(&mut cache));
    assert!(Arc::ptr_eq(&merged, &a));
}

#[test]
fn same_parent_different_return_states_share_it() {
    let p = stack(&[9]);
    let a = push(&p, 7);
    let b = push(&p, 3);
    let mut cache = MergeCache::new();

    let merged = merge(&a, &b, false, Some(&mut cache));
    assert_eq!(return_states(&merged), vec![3, 7]);
    assert!(Arc::ptr_eq(merged.parent(0).unwrap(), &p));
    assert!(Arc::ptr_eq(merged.parent(1).unwrap(), &p));

    // cached under both operand orders
    assert_eq!(cache.len(), 1);
    let again = merge(&b, &a, false, Some(&mut cache));
    assert!(Arc::ptr_eq(&again, &merged));
}

#[test]
fn different_parents_are_permuted_with_return_states() {
    let a = push(&stack(&[1]), 8);
    let b = push(&stack(&[2]), 4);

    let merged = merge(&a, &b, false, None);
    assert_eq!(merged.to_string(), "[4 2 $, 8 1 $]");
}

#[test]
fn same_return_state_merges_parents() {
    let a = stack(&[5, 1]);
    let b = stack(&[5, 2]);

    let merged = merge(&a, &b, false, None);
    assert_eq!(merged.to_string(), "5 [1 $, 2 $]");
}

#[test]
fn merged_parent_equal_to_left_returns_left() {
    // (1 $) + ($) under wildcard is $, which is a's parent.
    let a = stack(&[5]);
    let b = stack(&[5, 1]);

    let merged = merge(&a, &b, true, None);
    assert!(Arc::ptr_eq(&merged, &a));
    let merged = merge(&b, &a, true, None);
    assert!(Arc::ptr_eq(&merged, &a));
}

// ── Roots ───────────────────────────────────────────────────────────

#[test]
fn empty_plus_empty_is_empty() {
    for wildcard in [false, true] {
        assert!(merge(&empty(), &empty(), wildcard, None).is_empty());
    }
}

#[test]
fn wildcard_empty_absorbs() {
    let x = stack(&[4, 2]);
    assert!(merge(&empty(), &x, true, None).is_empty());
    assert!(merge(&x, &empty(), true, None).is_empty());

    let array = merge(&stack(&[3]), &stack(&[6]), true, None);
    assert!(merge(&array, &empty(), true, None).is_empty());
}

#[test]
fn exact_empty_becomes_dollar_entry() {
    let x = stack(&[4]);
    let merged = merge(&x, &empty(), false, None);
    assert_eq!(merged.to_string(), "[$, 4 $]");
    assert!(merged.has_empty_path());
    assert_eq!(merge(&empty(), &x, false, None), merged);
}

// ── Arrays ──────────────────────────────────────────────────────────

#[test]
fn arrays_interleave_by_return_state() {
    let left = merge(&stack(&[2]), &stack(&[6]), false, None);
    let right = merge(&stack(&[4]), &stack(&[8]), false, None);

    let merged = merge(&left, &right, false, None);
    assert_eq!(return_states(&merged), vec![2, 4, 6, 8]);
}

#[test]
fn array_absorbing_its_subset_returns_itself() {
    let p = stack(&[1]);
    let array = merge(&push(&p, 3), &push(&p, 7), false, None);
    let subset = push(&p, 7);

    let merged = merge(&array, &subset, false, None);
    assert!(Arc::ptr_eq(&merged, &array));
    let merged = merge(&subset, &array, false, None);
    assert!(Arc::ptr_eq(&merged, &array));
}

#[test]
fn dollar_entries_merge_without_recursion() {
    let a = merge(&stack(&[4]), &empty(), false, None);
    let b = merge(&stack(&[6]), &empty(), false, None);

    let merged = merge(&a, &b, false, None);
    assert_eq!(merged.to_string(), "[$, 4 $, 6 $]");
}

#[test]
fn equal_parents_are_combined() {
    // Both 3-entries merge to a fresh `[1 $, 2 $]` parent, and so do both
    // 7-entries; the results are equal but distinct until combined.
    let a = merge(&stack(&[3, 1]), &stack(&[7, 1]), false, None);
    let b = merge(&stack(&[3, 2]), &stack(&[7, 2]), false, None);

    let merged = merge(&a, &b, false, None);
    assert_eq!(merged.to_string(), "[3 [1 $, 2 $], 7 [1 $, 2 $]]");
    assert!(Arc::ptr_eq(merged.parent(0).unwrap(), merged.parent(1).unwrap()));
}

#[test]
fn cache_returns_the_first_result() {
    let a = merge(&stack(&[3]), &stack(&[5]), false, None);
    let b = merge(&stack(&[4]), &stack(&[6]), false, None);
    let mut cache = MergeCache::new();

    let first = merge(&a, &b, false, Some(&mut cache));
    let second = merge(&a, &b, false, Some(&mut cache));
    let reversed = merge(&b, &a, false, Some(&mut cache));
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &reversed));

    cache.clear();
    assert!(cache.is_empty());
    assert!(!Arc::ptr_eq(&merge(&a, &b, false, Some(&mut cache)), &first));
}

// ── Properties ──────────────────────────────────────────────────────

fn context() -> impl Strategy<Value = Arc<PredictionContext>> {
    let leaf = prop_oneof![
        Just(PredictionContext::empty()),
        (0..6i32).prop_map(|return_state| stack(&[return_state])),
    ];
    leaf.prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            (inner.clone(), 0..6i32).prop_map(|(parent, return_state)| push(&parent, return_state)),
            prop::collection::btree_map(0..6i32, inner, 2..4).prop_map(|entries| {
                let (return_states, parents): (Vec<_>, Vec<_>) = entries
                    .into_iter()
                    .map(|(return_state, parent)| (return_state, Some(parent)))
                    .unzip();
                PredictionContext::array(parents, return_states)
            }),
        ]
    })
}

proptest! {
    #[test]
    fn merge_with_itself_is_identity(a in context(), wildcard in any::<bool>()) {
        let merged = merge(&a, &a, wildcard, Some(&mut MergeCache::new()));
        prop_assert!(Arc::ptr_eq(&merged, &a));
    }

    #[test]
    fn merge_is_commutative(a in context(), b in context(), wildcard in any::<bool>()) {
        let ab = merge(&a, &b, wildcard, None);
        let ba = merge(&b, &a, wildcard, None);
        prop_assert_eq!(ab, ba);
    }

    #[test]
    fn merged_return_states_strictly_ascend(a in context(), b in context(), wildcard in any::<bool>()) {
        let merged = merge(&a, &b, wildcard, Some(&mut MergeCache::new()));
        let states = return_states(&merged);
        prop_assert!(states.windows(2).all(|w| w[0] < w[1]), "{:?}", states);
    }

    #[test]
    fn exact_merge_is_union_of_stacks(a in context(), b in context()) {
        let merged = merge(&a, &b, false, Some(&mut MergeCache::new()));
        let expected: BTreeSet<_> = stacks(&a).union(&stacks(&b)).cloned().collect();
        prop_assert_eq!(stacks(&merged), expected);
    }
}
