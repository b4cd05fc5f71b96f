//! Merging prediction contexts.
//!
//! `merge(a, b)` builds the context representing every stack of `a` and
//! every stack of `b`, sharing as much of both graphs as possible. With
//! `root_is_wildcard` (local lookahead), the empty context means "any
//! stack" and absorbs whatever it is merged with; otherwise (full context)
//! it is a concrete empty stack and survives as a `$` entry.

use std::cmp::Ordering;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::context::{ContextKind, PredictionContext, EMPTY_RETURN_STATE};
use crate::merge_cache::MergeCache;
use crate::stack::ensure_sufficient_stack;

type Entry = (Option<Arc<PredictionContext>>, i32);

/// Merge two contexts.
///
/// Equal operands return `a` itself. When `cache` is given, results are
/// looked up under both operand orders before computing and recorded
/// after, so merging the same pair again returns the same node.
pub fn merge(
    a: &Arc<PredictionContext>,
    b: &Arc<PredictionContext>,
    root_is_wildcard: bool,
    cache: Option<&mut MergeCache>,
) -> Arc<PredictionContext> {
    if a == b {
        return Arc::clone(a);
    }
    ensure_sufficient_stack(|| {
        let is_array = |c: &PredictionContext| matches!(c.kind(), ContextKind::Array { .. });
        if !is_array(a) && !is_array(b) {
            return merge_singletons(a, b, root_is_wildcard, cache);
        }

        if root_is_wildcard {
            if a.is_empty() {
                return Arc::clone(a);
            }
            if b.is_empty() {
                return Arc::clone(b);
            }
        }
        merge_arrays(a, b, root_is_wildcard, cache)
    })
}

fn cached(cache: Option<&MergeCache>, a: &Arc<PredictionContext>, b: &Arc<PredictionContext>) -> Option<Arc<PredictionContext>> {
    let hit = cache?.get(a, b)?;
    trace!(a = a.hash_code(), b = b.hash_code(), "merge cache hit");
    Some(hit)
}

fn remember(
    cache: Option<&mut MergeCache>,
    a: &Arc<PredictionContext>,
    b: &Arc<PredictionContext>,
    result: Arc<PredictionContext>,
) -> Arc<PredictionContext> {
    if let Some(cache) = cache {
        cache.insert(a, b, &result);
    }
    result
}

// ── Singletons ──────────────────────────────────────────────────────

/// Parent and return state of an empty or singleton context.
fn single(ctx: &PredictionContext) -> (Option<&Arc<PredictionContext>>, i32) {
    (ctx.parent(0), ctx.return_state(0))
}

fn merge_singletons(
    a: &Arc<PredictionContext>,
    b: &Arc<PredictionContext>,
    root_is_wildcard: bool,
    mut cache: Option<&mut MergeCache>,
) -> Arc<PredictionContext> {
    if let Some(previous) = cached(cache.as_deref(), a, b) {
        return previous;
    }

    if let Some(root) = merge_root(a, b, root_is_wildcard) {
        return remember(cache, a, b, root);
    }

    let (a_parent, a_return) = single(a);
    let (b_parent, b_return) = single(b);

    if a_return == b_return {
        // a's stack tops equal b's: merge the parents below them.
        let parent = merge_parents(a_parent, b_parent, root_is_wildcard, cache.as_deref_mut());
        if same_node(parent.as_ref(), a_parent) {
            return Arc::clone(a);
        }
        if same_node(parent.as_ref(), b_parent) {
            return Arc::clone(b);
        }
        let merged = PredictionContext::singleton(parent, a_return);
        return remember(cache, a, b, merged);
    }

    // Different tops: two entries, ordered by return state.
    let shared_parent = Arc::ptr_eq(a, b) || (a_parent.is_some() && a_parent == b_parent);
    let (mut first, mut second) = if shared_parent {
        ((a_parent.cloned(), a_return), (a_parent.cloned(), b_return))
    } else {
        ((a_parent.cloned(), a_return), (b_parent.cloned(), b_return))
    };
    if first.1 > second.1 {
        std::mem::swap(&mut first, &mut second);
    }
    let merged = PredictionContext::array(vec![first.0, second.0], vec![first.1, second.1]);
    remember(cache, a, b, merged)
}

/// Resolve merges where at least one side is the empty context.
fn merge_root(
    a: &Arc<PredictionContext>,
    b: &Arc<PredictionContext>,
    root_is_wildcard: bool,
) -> Option<Arc<PredictionContext>> {
    if root_is_wildcard {
        // * + b = *, a + * = *
        return (a.is_empty() || b.is_empty()).then(PredictionContext::empty);
    }
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Some(PredictionContext::empty()),
        (true, false) => Some(with_empty_entry(b)),
        (false, true) => Some(with_empty_entry(a)),
        (false, false) => None,
    }
}

/// `x + $ = [$, x]`
fn with_empty_entry(ctx: &PredictionContext) -> Arc<PredictionContext> {
    let (parent, return_state) = single(ctx);
    PredictionContext::array(
        vec![None, parent.cloned()],
        vec![EMPTY_RETURN_STATE, return_state],
    )
}

/// Merge two parent slots. A missing parent on one side only is treated
/// as the empty context.
fn merge_parents(
    a: Option<&Arc<PredictionContext>>,
    b: Option<&Arc<PredictionContext>>,
    root_is_wildcard: bool,
    cache: Option<&mut MergeCache>,
) -> Option<Arc<PredictionContext>> {
    match (a, b) {
        (None, None) => None,
        (Some(a), Some(b)) => Some(merge(a, b, root_is_wildcard, cache)),
        (Some(a), None) => Some(merge(a, &PredictionContext::empty(), root_is_wildcard, cache)),
        (None, Some(b)) => Some(merge(&PredictionContext::empty(), b, root_is_wildcard, cache)),
    }
}

fn same_node(a: Option<&Arc<PredictionContext>>, b: Option<&Arc<PredictionContext>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

// ── Arrays ──────────────────────────────────────────────────────────

fn merge_arrays(
    a: &Arc<PredictionContext>,
    b: &Arc<PredictionContext>,
    root_is_wildcard: bool,
    mut cache: Option<&mut MergeCache>,
) -> Arc<PredictionContext> {
    if let Some(previous) = cached(cache.as_deref(), a, b) {
        return previous;
    }

    let left = a.entries();
    let right = b.entries();
    let mut merged: Vec<Entry> = Vec::with_capacity(left.len() + right.len());

    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        let (a_parent, a_return) = &left[i];
        let (b_parent, b_return) = &right[j];
        match a_return.cmp(b_return) {
            Ordering::Equal => {
                // $ + $ = $, ax + ax = ax
                let both_dollars =
                    *a_return == EMPTY_RETURN_STATE && a_parent.is_none() && b_parent.is_none();
                let parent = if both_dollars || same_node(a_parent.as_ref(), b_parent.as_ref()) {
                    a_parent.clone()
                } else {
                    merge_parents(a_parent.as_ref(), b_parent.as_ref(), root_is_wildcard, cache.as_deref_mut())
                };
                merged.push((parent, *a_return));
                i += 1;
                j += 1;
            }
            Ordering::Less => {
                merged.push(left[i].clone());
                i += 1;
            }
            Ordering::Greater => {
                merged.push(right[j].clone());
                j += 1;
            }
        }
    }
    merged.extend_from_slice(&left[i..]);
    merged.extend_from_slice(&right[j..]);

    if merged.len() == 1 {
        let (parent, return_state) = merged.swap_remove(0);
        return remember(cache, a, b, PredictionContext::singleton(parent, return_state));
    }

    let (mut parents, return_states): (Vec<_>, Vec<_>) = merged.into_iter().unzip();

    // No net change: hand back the operand instead of a copy.
    if has_entries(a, &parents, &return_states) {
        return remember(cache, a, b, Arc::clone(a));
    }
    if has_entries(b, &parents, &return_states) {
        return remember(cache, a, b, Arc::clone(b));
    }

    combine_common_parents(&mut parents);
    remember(cache, a, b, PredictionContext::array(parents, return_states))
}

fn has_entries(ctx: &PredictionContext, parents: &[Option<Arc<PredictionContext>>], return_states: &[i32]) -> bool {
    match ctx.kind() {
        ContextKind::Array {
            parents: p,
            return_states: r,
        } => r.as_slice() == return_states && p.as_slice() == parents,
        _ => false,
    }
}

/// Re-point structurally equal parents at one shared node.
fn combine_common_parents(parents: &mut [Option<Arc<PredictionContext>>]) {
    let mut unique: FxHashMap<Arc<PredictionContext>, Arc<PredictionContext>> = FxHashMap::default();
    for parent in parents.iter_mut().flatten() {
        let canonical = unique
            .entry(Arc::clone(parent))
            .or_insert_with(|| Arc::clone(parent));
        if !Arc::ptr_eq(canonical, parent) {
            *parent = Arc::clone(canonical);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "tests panic on unexpected state")]
mod tests;
