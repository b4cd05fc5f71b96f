//! ATN states.
//!
//! States live in the [`Atn`](crate::Atn) arena and refer to each other by
//! [`StateId`]. The variant payloads in [`StateKind`] hold the cross-links
//! (block start ↔ block end, loop entry → loop back, rule start → rule stop)
//! that the deserializer resolves in a second pass once every state exists.

use std::fmt;
use std::sync::OnceLock;

use smallvec::SmallVec;

use crate::interval_set::IntervalSet;
use crate::transition::Transition;

// ── StateId ─────────────────────────────────────────────────────────

/// Index of a state in the ATN's dense state array.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct StateId(u32);

impl StateId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        StateId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into the state array).
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── State type codes ────────────────────────────────────────────────

/// Serialized state type. Code `0` is a hole and has no variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateType {
    Basic = 1,
    RuleStart = 2,
    BlockStart = 3,
    PlusBlockStart = 4,
    StarBlockStart = 5,
    TokenStart = 6,
    RuleStop = 7,
    BlockEnd = 8,
    StarLoopBack = 9,
    StarLoopEntry = 10,
    PlusLoopBack = 11,
    LoopEnd = 12,
}

impl StateType {
    /// Serialized code of an explicitly removed state.
    pub const INVALID_CODE: i32 = 0;

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => StateType::Basic,
            2 => StateType::RuleStart,
            3 => StateType::BlockStart,
            4 => StateType::PlusBlockStart,
            5 => StateType::StarBlockStart,
            6 => StateType::TokenStart,
            7 => StateType::RuleStop,
            8 => StateType::BlockEnd,
            9 => StateType::StarLoopBack,
            10 => StateType::StarLoopEntry,
            11 => StateType::PlusLoopBack,
            12 => StateType::LoopEnd,
            _ => return None,
        })
    }

    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }
}

// ── StateKind ───────────────────────────────────────────────────────

/// Which flavor of block a block-start state opens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockStartKind {
    /// `( ... | ... )`
    Basic,
    /// `( ... )*`
    Star,
    /// `( ... )+`, linked to the loop-back state that closes it.
    Plus { loop_back_state: Option<StateId> },
}

/// Variant-specific payload of a state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateKind {
    Basic,
    RuleStart {
        stop_state: Option<StateId>,
        is_precedence_rule: bool,
    },
    RuleStop,
    BlockStart {
        block: BlockStartKind,
        end_state: Option<StateId>,
    },
    BlockEnd {
        start_state: Option<StateId>,
    },
    StarLoopEntry {
        loop_back_state: Option<StateId>,
        /// Set when this loop decides whether a left-recursive rule
        /// continues or completes.
        is_precedence_decision: bool,
    },
    StarLoopBack,
    PlusLoopBack,
    LoopEnd {
        loop_back_state: Option<StateId>,
    },
    TokensStart,
}

impl StateKind {
    /// Fresh, unlinked payload for a serialized state type.
    pub fn from_type(state_type: StateType) -> Self {
        match state_type {
            StateType::Basic => StateKind::Basic,
            StateType::RuleStart => StateKind::RuleStart {
                stop_state: None,
                is_precedence_rule: false,
            },
            StateType::BlockStart => StateKind::BlockStart {
                block: BlockStartKind::Basic,
                end_state: None,
            },
            StateType::PlusBlockStart => StateKind::BlockStart {
                block: BlockStartKind::Plus {
                    loop_back_state: None,
                },
                end_state: None,
            },
            StateType::StarBlockStart => StateKind::BlockStart {
                block: BlockStartKind::Star,
                end_state: None,
            },
            StateType::TokenStart => StateKind::TokensStart,
            StateType::RuleStop => StateKind::RuleStop,
            StateType::BlockEnd => StateKind::BlockEnd { start_state: None },
            StateType::StarLoopBack => StateKind::StarLoopBack,
            StateType::StarLoopEntry => StateKind::StarLoopEntry {
                loop_back_state: None,
                is_precedence_decision: false,
            },
            StateType::PlusLoopBack => StateKind::PlusLoopBack,
            StateType::LoopEnd => StateKind::LoopEnd {
                loop_back_state: None,
            },
        }
    }

    pub fn state_type(&self) -> StateType {
        match self {
            StateKind::Basic => StateType::Basic,
            StateKind::RuleStart { .. } => StateType::RuleStart,
            StateKind::RuleStop => StateType::RuleStop,
            StateKind::BlockStart { block, .. } => match block {
                BlockStartKind::Basic => StateType::BlockStart,
                BlockStartKind::Star => StateType::StarBlockStart,
                BlockStartKind::Plus { .. } => StateType::PlusBlockStart,
            },
            StateKind::BlockEnd { .. } => StateType::BlockEnd,
            StateKind::StarLoopEntry { .. } => StateType::StarLoopEntry,
            StateKind::StarLoopBack => StateType::StarLoopBack,
            StateKind::PlusLoopBack => StateType::PlusLoopBack,
            StateKind::LoopEnd { .. } => StateType::LoopEnd,
            StateKind::TokensStart => StateType::TokenStart,
        }
    }

    /// Decision states may fan out and get a decision number.
    pub fn is_decision(&self) -> bool {
        matches!(
            self,
            StateKind::BlockStart { .. }
                | StateKind::StarLoopEntry { .. }
                | StateKind::PlusLoopBack
                | StateKind::TokensStart
        )
    }

    pub fn is_block_boundary(&self) -> bool {
        matches!(self, StateKind::BlockStart { .. } | StateKind::BlockEnd { .. })
    }

    pub fn is_loop(&self) -> bool {
        matches!(
            self,
            StateKind::StarLoopEntry { .. }
                | StateKind::StarLoopBack
                | StateKind::PlusLoopBack
                | StateKind::LoopEnd { .. }
                | StateKind::BlockStart {
                    block: BlockStartKind::Plus { .. },
                    ..
                }
        )
    }
}

// ── AtnState ────────────────────────────────────────────────────────

/// A node of the ATN.
#[derive(Clone, Debug)]
pub struct AtnState {
    number: StateId,
    rule_index: Option<usize>,
    kind: StateKind,
    transitions: SmallVec<[Transition; 1]>,
    epsilon_only: bool,
    decision: Option<usize>,
    non_greedy: bool,
    /// Lookahead computed without an outer context, published once.
    next_tokens_within_rule: OnceLock<IntervalSet>,
}

impl AtnState {
    /// Create an unattached state. Its number is assigned when the loader
    /// adds it to an [`Atn`](crate::Atn).
    pub fn new(kind: StateKind, rule_index: Option<usize>) -> Self {
        AtnState {
            number: StateId::new(0),
            rule_index,
            kind,
            transitions: SmallVec::new(),
            epsilon_only: false,
            decision: None,
            non_greedy: false,
            next_tokens_within_rule: OnceLock::new(),
        }
    }

    #[inline]
    pub fn number(&self) -> StateId {
        self.number
    }

    #[inline]
    pub(crate) fn set_number(&mut self, number: StateId) {
        self.number = number;
    }

    #[inline]
    pub fn rule_index(&self) -> Option<usize> {
        self.rule_index
    }

    #[inline]
    pub fn kind(&self) -> &StateKind {
        &self.kind
    }

    #[inline]
    pub(crate) fn kind_mut(&mut self) -> &mut StateKind {
        &mut self.kind
    }

    #[inline]
    pub fn state_type(&self) -> StateType {
        self.kind.state_type()
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn transition(&self, i: usize) -> Option<&Transition> {
        self.transitions.get(i)
    }

    /// True iff every outgoing transition consumes no input.
    #[inline]
    pub fn only_epsilon_transitions(&self) -> bool {
        self.epsilon_only
    }

    /// Append a transition, keeping the epsilon-only flag current.
    pub(crate) fn add_transition(&mut self, transition: Transition) {
        if self.transitions.is_empty() {
            self.epsilon_only = transition.is_epsilon();
        } else if self.epsilon_only != transition.is_epsilon() {
            tracing::warn!(
                state = self.number.raw(),
                "ATN state has both epsilon and non-epsilon transitions"
            );
            self.epsilon_only = false;
        }
        self.transitions.push(transition);
    }

    pub(crate) fn transitions_mut(&mut self) -> &mut [Transition] {
        &mut self.transitions
    }

    /// Detach every outgoing transition.
    pub(crate) fn take_transitions(&mut self) -> SmallVec<[Transition; 1]> {
        self.epsilon_only = false;
        std::mem::take(&mut self.transitions)
    }

    /// Replace transition `i`, returning the old one.
    pub(crate) fn replace_transition(&mut self, i: usize, transition: Transition) -> Option<Transition> {
        let slot = self.transitions.get_mut(i)?;
        Some(std::mem::replace(slot, transition))
    }

    #[inline]
    pub fn decision(&self) -> Option<usize> {
        self.decision
    }

    #[inline]
    pub(crate) fn set_decision(&mut self, decision: usize) {
        self.decision = Some(decision);
    }

    #[inline]
    pub fn is_non_greedy(&self) -> bool {
        self.non_greedy
    }

    #[inline]
    pub(crate) fn set_non_greedy(&mut self) {
        self.non_greedy = true;
    }

    // ── Cross-links ─────────────────────────────────────────

    /// Matching block end of a block start.
    pub fn end_state(&self) -> Option<StateId> {
        match self.kind {
            StateKind::BlockStart { end_state, .. } => end_state,
            _ => None,
        }
    }

    /// Matching block start of a block end.
    pub fn start_state(&self) -> Option<StateId> {
        match self.kind {
            StateKind::BlockEnd { start_state } => start_state,
            _ => None,
        }
    }

    /// Rule stop state of a rule start.
    pub fn stop_state(&self) -> Option<StateId> {
        match self.kind {
            StateKind::RuleStart { stop_state, .. } => stop_state,
            _ => None,
        }
    }

    /// Loop-back state of a plus block start, star loop entry or loop end.
    pub fn loop_back_state(&self) -> Option<StateId> {
        match self.kind {
            StateKind::BlockStart {
                block: BlockStartKind::Plus { loop_back_state },
                ..
            }
            | StateKind::StarLoopEntry {
                loop_back_state, ..
            }
            | StateKind::LoopEnd { loop_back_state } => loop_back_state,
            _ => None,
        }
    }

    pub fn is_precedence_rule(&self) -> bool {
        matches!(
            self.kind,
            StateKind::RuleStart {
                is_precedence_rule: true,
                ..
            }
        )
    }

    pub fn is_precedence_decision(&self) -> bool {
        matches!(
            self.kind,
            StateKind::StarLoopEntry {
                is_precedence_decision: true,
                ..
            }
        )
    }

    // ── Memoized lookahead ──────────────────────────────────

    /// The context-free lookahead of this state, if already computed.
    pub fn next_tokens_within_rule(&self) -> Option<&IntervalSet> {
        self.next_tokens_within_rule.get()
    }

    /// Return the memoized context-free lookahead, computing it on first use.
    ///
    /// Concurrent first callers block until the single computation is
    /// published.
    pub fn next_tokens_within_rule_or_init(
        &self,
        compute: impl FnOnce() -> IntervalSet,
    ) -> &IntervalSet {
        self.next_tokens_within_rule.get_or_init(compute)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "tests panic on unexpected state")]
mod tests;
