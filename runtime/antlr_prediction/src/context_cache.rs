//! Canonical prediction contexts shared across predictions.
//!
//! Contexts built by separate predictions are often structurally equal
//! without being the same node. [`PredictionContextCache`] interns them so
//! later comparisons can short-circuit on pointer identity and graphs stop
//! holding duplicate subtrees.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::context::PredictionContext;
use crate::merge_cache::ContextPtr;
use crate::stack::ensure_sufficient_stack;

/// Thread-safe set of canonical contexts, keyed structurally.
#[derive(Default)]
pub struct PredictionContextCache {
    map: Mutex<FxHashMap<Arc<PredictionContext>, Arc<PredictionContext>>>,
}

/// Nodes already canonicalized during one [`cached_context`] walk, keyed
/// by identity.
///
/// [`cached_context`]: PredictionContextCache::cached_context
#[derive(Debug, Default)]
pub struct VisitedContexts {
    map: FxHashMap<ContextPtr, Arc<PredictionContext>>,
}

impl VisitedContexts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn get(&self, ctx: &Arc<PredictionContext>) -> Option<Arc<PredictionContext>> {
        self.map.get(&ContextPtr(Arc::clone(ctx))).cloned()
    }

    fn record(&mut self, ctx: &Arc<PredictionContext>, canonical: &Arc<PredictionContext>) {
        self.map.insert(ContextPtr(Arc::clone(ctx)), Arc::clone(canonical));
    }
}

impl PredictionContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `ctx`: return the cached equal context if there is one,
    /// otherwise store `ctx` and return it. The empty context is never
    /// stored.
    pub fn add(&self, ctx: &Arc<PredictionContext>) -> Arc<PredictionContext> {
        if ctx.is_empty() {
            return PredictionContext::empty();
        }
        let mut map = self.map.lock();
        Arc::clone(
            map.entry(Arc::clone(ctx))
                .or_insert_with(|| Arc::clone(ctx)),
        )
    }

    /// The cached context equal to `ctx`, if any.
    pub fn get(&self, ctx: &PredictionContext) -> Option<Arc<PredictionContext>> {
        self.map.lock().get(ctx).cloned()
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }

    /// Canonicalize a whole context graph.
    ///
    /// Every node reachable from `ctx` is replaced by its cached equal,
    /// parents first; nodes without one are rebuilt over canonical parents
    /// and added. The result is structurally equal to `ctx`. `visited`
    /// carries work between calls, so one map can serve a batch of
    /// contexts that share subgraphs.
    pub fn cached_context(
        &self,
        ctx: &Arc<PredictionContext>,
        visited: &mut VisitedContexts,
    ) -> Arc<PredictionContext> {
        if ctx.is_empty() {
            return Arc::clone(ctx);
        }
        if let Some(seen) = visited.get(ctx) {
            return seen;
        }
        if let Some(existing) = self.get(ctx) {
            visited.record(ctx, &existing);
            return existing;
        }

        let entries = ctx.entries();
        let mut changed = false;
        let mut parents = Vec::with_capacity(entries.len());
        let mut return_states = Vec::with_capacity(entries.len());
        for (parent, return_state) in entries {
            let canonical = parent.map(|parent| {
                let canonical = ensure_sufficient_stack(|| self.cached_context(&parent, visited));
                changed |= !Arc::ptr_eq(&canonical, &parent);
                canonical
            });
            parents.push(canonical);
            return_states.push(return_state);
        }

        if !changed {
            let canonical = self.add(ctx);
            visited.record(ctx, &canonical);
            return canonical;
        }

        let updated = self.add(&PredictionContext::array(parents, return_states));
        visited.record(&updated, &updated);
        visited.record(ctx, &updated);
        updated
    }
}

impl fmt::Debug for PredictionContextCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredictionContextCache")
            .field("len", &self.len())
            .finish()
    }
}

impl fmt::Display for PredictionContextCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map = self.map.lock();
        let mut contexts: Vec<String> = map.keys().map(ToString::to_string).collect();
        contexts.sort_unstable();
        write!(f, "{{{}}}", contexts.join(", "))
    }
}

/// Every distinct node reachable from `ctx`, `ctx` first, in depth-first
/// order. Nodes are deduplicated by identity, not structure.
pub fn all_context_nodes(ctx: &Arc<PredictionContext>) -> Vec<Arc<PredictionContext>> {
    let mut nodes = Vec::new();
    let mut seen: FxHashSet<ContextPtr> = FxHashSet::default();
    let mut work = vec![Arc::clone(ctx)];

    while let Some(node) = work.pop() {
        if !seen.insert(ContextPtr(Arc::clone(&node))) {
            continue;
        }
        let len = node.len();
        for i in (0..len).rev() {
            if let Some(parent) = node.parent(i) {
                work.push(Arc::clone(parent));
            }
        }
        nodes.push(node);
    }
    nodes
}
