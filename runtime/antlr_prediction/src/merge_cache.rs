//! Memo of merge results keyed by operand identity.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::context::PredictionContext;

/// An `Arc` compared and hashed by address.
///
/// Holding the `Arc` keeps the node alive, so an address is never reused
/// while it is a key.
#[derive(Clone, Debug)]
pub(crate) struct ContextPtr(pub(crate) Arc<PredictionContext>);

impl PartialEq for ContextPtr {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ContextPtr {}

impl Hash for ContextPtr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

/// Results of earlier merges, keyed by the `(a, b)` operand pair.
///
/// Lookups try both orders. The first result stored for a pair wins.
/// Entries are never evicted; scope one cache to one parse (or call
/// [`clear`](Self::clear)) to bound memory.
#[derive(Debug, Default)]
pub struct MergeCache {
    map: FxHashMap<(ContextPtr, ContextPtr), Arc<PredictionContext>>,
}

impl MergeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored result for `(a, b)` or `(b, a)`.
    pub fn get(&self, a: &Arc<PredictionContext>, b: &Arc<PredictionContext>) -> Option<Arc<PredictionContext>> {
        let key = (ContextPtr(Arc::clone(a)), ContextPtr(Arc::clone(b)));
        if let Some(hit) = self.map.get(&key) {
            return Some(Arc::clone(hit));
        }
        let (a, b) = key;
        self.map.get(&(b, a)).cloned()
    }

    /// Record `result` for `(a, b)` unless the pair already has one.
    pub fn insert(&mut self, a: &Arc<PredictionContext>, b: &Arc<PredictionContext>, result: &Arc<PredictionContext>) {
        self.map
            .entry((ContextPtr(Arc::clone(a)), ContextPtr(Arc::clone(b))))
            .or_insert_with(|| Arc::clone(result));
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}
