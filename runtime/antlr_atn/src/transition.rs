//! ATN edges.
//!
//! A [`Transition`] is owned by its source state; only the target is stored.
//! Rule transitions point at the callee's rule start state and carry the
//! follow state the call returns to.

use std::sync::Arc;

use crate::interval_set::IntervalSet;
use crate::state::StateId;
use crate::token::EOF;

/// Serialized transition type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransitionType {
    Epsilon = 1,
    Range = 2,
    Rule = 3,
    Predicate = 4,
    Atom = 5,
    Action = 6,
    Set = 7,
    NotSet = 8,
    Wildcard = 9,
    Precedence = 10,
}

impl TransitionType {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => TransitionType::Epsilon,
            2 => TransitionType::Range,
            3 => TransitionType::Rule,
            4 => TransitionType::Predicate,
            5 => TransitionType::Atom,
            6 => TransitionType::Action,
            7 => TransitionType::Set,
            8 => TransitionType::NotSet,
            9 => TransitionType::Wildcard,
            10 => TransitionType::Precedence,
            _ => return None,
        })
    }

    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// Variant-specific payload of a transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransitionKind {
    Epsilon {
        /// Rule index when this edge returns from the outermost call of a
        /// precedence rule (call site precedence 0).
        outermost_precedence_return: Option<usize>,
    },
    /// Inclusive range; `start` may be [`EOF`].
    Range { start: i32, stop: i32 },
    Rule {
        rule_index: usize,
        precedence: i32,
        follow_state: StateId,
    },
    Predicate {
        rule_index: usize,
        pred_index: usize,
        is_ctx_dependent: bool,
    },
    Precedence { precedence: i32 },
    /// Single token type; may be [`EOF`].
    Atom { label: i32 },
    Action {
        rule_index: usize,
        action_index: Option<usize>,
        is_ctx_dependent: bool,
    },
    Set { set: Arc<IntervalSet> },
    NotSet { set: Arc<IntervalSet> },
    Wildcard,
}

/// An edge to `target`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    target: StateId,
    kind: TransitionKind,
}

impl Transition {
    pub fn new(target: StateId, kind: TransitionKind) -> Self {
        Transition { target, kind }
    }

    /// Plain epsilon edge.
    pub fn epsilon(target: StateId) -> Self {
        Transition::new(
            target,
            TransitionKind::Epsilon {
                outermost_precedence_return: None,
            },
        )
    }

    pub fn atom(target: StateId, label: i32) -> Self {
        Transition::new(target, TransitionKind::Atom { label })
    }

    #[inline]
    pub fn target(&self) -> StateId {
        self.target
    }

    #[inline]
    pub(crate) fn set_target(&mut self, target: StateId) {
        self.target = target;
    }

    #[inline]
    pub fn kind(&self) -> &TransitionKind {
        &self.kind
    }

    pub fn transition_type(&self) -> TransitionType {
        match self.kind {
            TransitionKind::Epsilon { .. } => TransitionType::Epsilon,
            TransitionKind::Range { .. } => TransitionType::Range,
            TransitionKind::Rule { .. } => TransitionType::Rule,
            TransitionKind::Predicate { .. } => TransitionType::Predicate,
            TransitionKind::Precedence { .. } => TransitionType::Precedence,
            TransitionKind::Atom { .. } => TransitionType::Atom,
            TransitionKind::Action { .. } => TransitionType::Action,
            TransitionKind::Set { .. } => TransitionType::Set,
            TransitionKind::NotSet { .. } => TransitionType::NotSet,
            TransitionKind::Wildcard => TransitionType::Wildcard,
        }
    }

    /// True iff following this edge consumes no input symbol.
    pub fn is_epsilon(&self) -> bool {
        matches!(
            self.kind,
            TransitionKind::Epsilon { .. }
                | TransitionKind::Rule { .. }
                | TransitionKind::Predicate { .. }
                | TransitionKind::Precedence { .. }
                | TransitionKind::Action { .. }
        )
    }

    /// Follow state of a rule transition.
    pub fn follow_state(&self) -> Option<StateId> {
        match self.kind {
            TransitionKind::Rule { follow_state, .. } => Some(follow_state),
            _ => None,
        }
    }

    /// Symbols this edge can consume, for the labelled variants.
    ///
    /// `NotSet` returns the excluded set; callers complement it against
    /// the vocabulary.
    pub fn label(&self) -> Option<IntervalSet> {
        match &self.kind {
            TransitionKind::Atom { label } => Some(IntervalSet::of(*label)),
            TransitionKind::Range { start, stop } => Some(IntervalSet::of_range(*start, *stop)),
            TransitionKind::Set { set } | TransitionKind::NotSet { set } => {
                Some(IntervalSet::clone(set))
            }
            _ => None,
        }
    }

    /// Whether `symbol` can be consumed along this edge, given the
    /// vocabulary bounds `min_vocab..=max_vocab`.
    pub fn matches(&self, symbol: i32, min_vocab: i32, max_vocab: i32) -> bool {
        match &self.kind {
            TransitionKind::Atom { label } => *label == symbol,
            TransitionKind::Range { start, stop } => *start <= symbol && symbol <= *stop,
            TransitionKind::Set { set } => set.contains(symbol),
            TransitionKind::NotSet { set } => {
                symbol >= min_vocab && symbol <= max_vocab && !set.contains(symbol)
            }
            TransitionKind::Wildcard => symbol >= min_vocab && symbol <= max_vocab,
            _ => false,
        }
    }

    /// True for an atom or range edge that can match end of input.
    pub fn matches_eof(&self) -> bool {
        match self.kind {
            TransitionKind::Atom { label } => label == EOF,
            TransitionKind::Range { start, .. } => start == EOF,
            _ => false,
        }
    }
}
