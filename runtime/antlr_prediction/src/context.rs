//! Prediction contexts: graph-structured call stacks.
//!
//! A [`PredictionContext`] stands for one or more possible rule invocation
//! stacks at once. Each node holds the state(s) to return to when the
//! current rule finishes, and a parent per return state describing the
//! rest of the stack. Nodes are immutable and shared through `Arc`, so
//! stacks with a common tail share that tail.
//!
//! Three shapes exist:
//!
//! - **Empty** (`$`): no caller. A process-wide shared instance.
//! - **Singleton**: one return state and its parent.
//! - **Array**: two or more return states, strictly ascending, each with
//!   its own parent. An entry whose return state is
//!   [`EMPTY_RETURN_STATE`] (and whose parent is `None`) stands for the
//!   empty stack; it always sorts first.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use rustc_hash::FxHasher;

use antlr_atn::{Atn, StateId};

use crate::error::PredictionError;
use crate::rule_context::RuleContext;
use crate::stack::ensure_sufficient_stack;

/// Return state marking "stack exhausted". Lower than every state number,
/// so an array's empty entry is always its first.
pub const EMPTY_RETURN_STATE: i32 = -1;

/// Node payload.
#[derive(Clone, Debug)]
pub enum ContextKind {
    Empty,
    Singleton {
        /// `None` when the rest of the stack is unknown (lookahead computed
        /// without an outer context).
        parent: Option<Arc<PredictionContext>>,
        return_state: i32,
    },
    Array {
        parents: Vec<Option<Arc<PredictionContext>>>,
        return_states: Vec<i32>,
    },
}

/// An immutable node of the context graph with a cached structural hash.
#[derive(Clone)]
pub struct PredictionContext {
    kind: ContextKind,
    hash: u64,
}

static EMPTY: OnceLock<Arc<PredictionContext>> = OnceLock::new();

impl PredictionContext {
    // ── Construction ────────────────────────────────────────

    /// The shared empty context.
    pub fn empty() -> Arc<Self> {
        Arc::clone(EMPTY.get_or_init(|| {
            Arc::new(PredictionContext {
                kind: ContextKind::Empty,
                hash: hash_of(0, std::iter::empty()),
            })
        }))
    }

    /// A single return state over `parent`. `(None, EMPTY_RETURN_STATE)`
    /// is the empty context itself.
    pub fn singleton(parent: Option<Arc<Self>>, return_state: i32) -> Arc<Self> {
        if parent.is_none() && return_state == EMPTY_RETURN_STATE {
            return Self::empty();
        }
        let hash = hash_of(1, std::iter::once((parent.as_ref(), return_state)));
        Arc::new(PredictionContext {
            kind: ContextKind::Singleton {
                parent,
                return_state,
            },
            hash,
        })
    }

    /// A multi-entry context. `return_states` must be strictly ascending
    /// and as long as `parents`. Zero entries give the empty context and
    /// one entry gives a singleton.
    pub fn array(mut parents: Vec<Option<Arc<Self>>>, mut return_states: Vec<i32>) -> Arc<Self> {
        debug_assert_eq!(parents.len(), return_states.len());
        debug_assert!(return_states.windows(2).all(|w| w[0] < w[1]));
        match (parents.pop(), return_states.pop()) {
            (None, _) | (_, None) => return Self::empty(),
            (Some(parent), Some(return_state)) if parents.is_empty() => {
                return Self::singleton(parent, return_state);
            }
            (Some(parent), Some(return_state)) => {
                parents.push(parent);
                return_states.push(return_state);
            }
        }
        let hash = hash_of(
            2,
            parents
                .iter()
                .map(Option::as_ref)
                .zip(return_states.iter().copied()),
        );
        Arc::new(PredictionContext {
            kind: ContextKind::Array {
                parents,
                return_states,
            },
            hash,
        })
    }

    /// Convert a live invocation chain: the outermost frame maps to the
    /// empty context, and every other frame pushes the follow state of the
    /// rule transition that created it.
    pub fn from_rule_context(atn: &Atn, ctx: &dyn RuleContext) -> Result<Arc<Self>, PredictionError> {
        let mut follow_states = Vec::new();
        let mut frame = ctx;
        while let (Some(parent), Some(invoking)) = (frame.parent(), frame.invoking_state()) {
            follow_states.push(follow_state_of(atn, invoking)?);
            frame = parent;
        }

        let mut context = Self::empty();
        for follow in follow_states.into_iter().rev() {
            let return_state = i32::try_from(follow.index()).unwrap_or(i32::MAX);
            context = Self::singleton(Some(context), return_state);
        }
        Ok(context)
    }

    // ── Queries ─────────────────────────────────────────────

    #[inline]
    pub fn kind(&self) -> &ContextKind {
        &self.kind
    }

    /// Cached structural hash.
    #[inline]
    pub fn hash_code(&self) -> u64 {
        self.hash
    }

    /// Number of return states. The empty context counts its single
    /// [`EMPTY_RETURN_STATE`] entry.
    pub fn len(&self) -> usize {
        match &self.kind {
            ContextKind::Empty | ContextKind::Singleton { .. } => 1,
            ContextKind::Array { return_states, .. } => return_states.len(),
        }
    }

    /// True only for the empty context `$`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self.kind, ContextKind::Empty)
    }

    /// True if one of the represented stacks is empty.
    pub fn has_empty_path(&self) -> bool {
        self.return_state(0) == EMPTY_RETURN_STATE
    }

    pub fn parent(&self, i: usize) -> Option<&Arc<Self>> {
        match &self.kind {
            ContextKind::Empty => None,
            ContextKind::Singleton { parent, .. } => parent.as_ref().filter(|_| i == 0),
            ContextKind::Array { parents, .. } => parents.get(i).and_then(Option::as_ref),
        }
    }

    /// Return state `i`, or [`EMPTY_RETURN_STATE`] past the end.
    pub fn return_state(&self, i: usize) -> i32 {
        match &self.kind {
            ContextKind::Empty => EMPTY_RETURN_STATE,
            ContextKind::Singleton { return_state, .. } => {
                if i == 0 {
                    *return_state
                } else {
                    EMPTY_RETURN_STATE
                }
            }
            ContextKind::Array { return_states, .. } => {
                return_states.get(i).copied().unwrap_or(EMPTY_RETURN_STATE)
            }
        }
    }

    /// `(parent, return state)` pairs in ascending return-state order.
    pub fn entries(&self) -> Vec<(Option<Arc<Self>>, i32)> {
        match &self.kind {
            ContextKind::Empty => vec![(None, EMPTY_RETURN_STATE)],
            ContextKind::Singleton {
                parent,
                return_state,
            } => vec![(parent.clone(), *return_state)],
            ContextKind::Array {
                parents,
                return_states,
            } => parents.iter().cloned().zip(return_states.iter().copied()).collect(),
        }
    }
}

fn follow_state_of(atn: &Atn, invoking: StateId) -> Result<StateId, PredictionError> {
    let state = atn
        .state(invoking)
        .ok_or(PredictionError::InvalidStateNumber {
            number: invoking.raw(),
        })?;
    state
        .transition(0)
        .and_then(antlr_atn::Transition::follow_state)
        .ok_or(PredictionError::NotRuleInvocation { state: invoking })
}

fn hash_of<'a>(
    tag: u8,
    entries: impl Iterator<Item = (Option<&'a Arc<PredictionContext>>, i32)>,
) -> u64 {
    let mut hasher = FxHasher::default();
    tag.hash(&mut hasher);
    for (parent, return_state) in entries {
        parent.map(|p| p.hash).hash(&mut hasher);
        return_state.hash(&mut hasher);
    }
    hasher.finish()
}

// ── Equality and hashing ────────────────────────────────────────────

impl PartialEq for PredictionContext {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if self.hash != other.hash {
            return false;
        }
        ensure_sufficient_stack(|| match (&self.kind, &other.kind) {
            (ContextKind::Empty, ContextKind::Empty) => true,
            (
                ContextKind::Singleton {
                    parent: p1,
                    return_state: r1,
                },
                ContextKind::Singleton {
                    parent: p2,
                    return_state: r2,
                },
            ) => r1 == r2 && p1 == p2,
            (
                ContextKind::Array {
                    parents: p1,
                    return_states: r1,
                },
                ContextKind::Array {
                    parents: p2,
                    return_states: r2,
                },
            ) => r1 == r2 && p1 == p2,
            _ => false,
        })
    }
}

impl Eq for PredictionContext {}

impl Hash for PredictionContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

// ── Release ─────────────────────────────────────────────────────────

/// Parent chains can be as deep as the parse. Dropping a node releases
/// every parent it owns alone from a loop instead of one nested drop per
/// frame.
impl Drop for PredictionContext {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        take_parents(&mut self.kind, &mut pending);
        while let Some(parent) = pending.pop() {
            if let Some(mut node) = Arc::into_inner(parent) {
                take_parents(&mut node.kind, &mut pending);
            }
        }
    }
}

fn take_parents(kind: &mut ContextKind, pending: &mut Vec<Arc<PredictionContext>>) {
    match std::mem::replace(kind, ContextKind::Empty) {
        ContextKind::Empty => {}
        ContextKind::Singleton { parent, .. } => pending.extend(parent),
        ContextKind::Array { parents, .. } => pending.extend(parents.into_iter().flatten()),
    }
}

// ── Formatting ──────────────────────────────────────────────────────

impl fmt::Display for PredictionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Singleton chains are walked in place; only array entries recurse.
        let mut node = self;
        loop {
            match &node.kind {
                ContextKind::Empty => return write!(f, "$"),
                ContextKind::Singleton {
                    parent,
                    return_state,
                } => {
                    write!(f, "{return_state}")?;
                    match parent {
                        Some(parent) => {
                            write!(f, " ")?;
                            node = &**parent;
                        }
                        None => return Ok(()),
                    }
                }
                ContextKind::Array {
                    parents,
                    return_states,
                } => return write_array(f, parents, return_states),
            }
        }
    }
}

fn write_array(
    f: &mut fmt::Formatter<'_>,
    parents: &[Option<Arc<PredictionContext>>],
    return_states: &[i32],
) -> fmt::Result {
    write!(f, "[")?;
    for (i, (parent, return_state)) in parents.iter().zip(return_states).enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        if *return_state == EMPTY_RETURN_STATE {
            write!(f, "$")?;
            continue;
        }
        write!(f, "{return_state}")?;
        match parent {
            Some(parent) => {
                write!(f, " ")?;
                ensure_sufficient_stack(|| fmt::Display::fmt(&**parent, f))?;
            }
            None => write!(f, " null")?,
        }
    }
    write!(f, "]")
}

impl fmt::Debug for PredictionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PredictionContext({self})")
    }
}
