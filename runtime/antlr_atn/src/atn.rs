//! The ATN container.
//!
//! An [`Atn`] is an arena of states indexed by [`StateId`] plus the lookup
//! tables drivers query (decisions, rule start/stop states, lexer modes,
//! lexer actions). It is populated once by the deserializer and read-only
//! afterwards, so a loaded `Atn` can be shared across threads.

use crate::interval_set::IntervalSet;
use crate::lexer_action::LexerAction;
use crate::state::{AtnState, StateId};
use crate::token::MIN_USER_TOKEN_TYPE;

/// Kind of grammar the ATN was generated from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GrammarType {
    Lexer = 0,
    Parser = 1,
}

impl GrammarType {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(GrammarType::Lexer),
            1 => Some(GrammarType::Parser),
            _ => None,
        }
    }

    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// Augmented transition network.
#[derive(Clone, Debug)]
pub struct Atn {
    grammar_type: GrammarType,
    max_token_type: i32,
    /// Dense state array; `None` marks a state removed from the serialized
    /// stream. Indices never shift.
    pub(crate) states: Vec<Option<AtnState>>,
    /// Decision number → decision state.
    pub(crate) decision_to_state: Vec<StateId>,
    pub(crate) rule_to_start_state: Vec<StateId>,
    pub(crate) rule_to_stop_state: Vec<Option<StateId>>,
    /// Lexer only.
    pub(crate) mode_to_start_state: Vec<StateId>,
    /// Lexer: rule → token type. Parser: rule → bypass token type, when
    /// bypass transitions were generated.
    pub(crate) rule_to_token_type: Vec<i32>,
    /// Lexer only.
    pub(crate) lexer_actions: Vec<LexerAction>,
}

impl Atn {
    /// Create an empty ATN for the loader to fill.
    pub(crate) fn new(grammar_type: GrammarType, max_token_type: i32) -> Self {
        Atn {
            grammar_type,
            max_token_type,
            states: Vec::new(),
            decision_to_state: Vec::new(),
            rule_to_start_state: Vec::new(),
            rule_to_stop_state: Vec::new(),
            mode_to_start_state: Vec::new(),
            rule_to_token_type: Vec::new(),
            lexer_actions: Vec::new(),
        }
    }

    #[inline]
    pub fn grammar_type(&self) -> GrammarType {
        self.grammar_type
    }

    /// Largest token type any transition recognizes.
    #[inline]
    pub fn max_token_type(&self) -> i32 {
        self.max_token_type
    }

    /// `MIN_USER_TOKEN_TYPE..=max_token_type`.
    pub fn vocabulary(&self) -> IntervalSet {
        IntervalSet::of_range(MIN_USER_TOKEN_TYPE, self.max_token_type)
    }

    // ── States ──────────────────────────────────────────────

    /// Append a state, assigning it the next state number.
    pub(crate) fn add_state(&mut self, mut state: AtnState) -> StateId {
        let id = self.next_state_id();
        state.set_number(id);
        self.states.push(Some(state));
        id
    }

    /// Append an explicit hole.
    pub(crate) fn add_hole(&mut self) {
        self.states.push(None);
    }

    fn next_state_id(&self) -> StateId {
        // State counts come from 16-bit streams plus a few synthesized
        // states per rule, far below u32::MAX.
        StateId::new(u32::try_from(self.states.len()).unwrap_or(u32::MAX))
    }

    /// Look up a live state.
    #[inline]
    pub fn state(&self, id: StateId) -> Option<&AtnState> {
        self.states.get(id.index()).and_then(Option::as_ref)
    }

    #[inline]
    pub(crate) fn state_mut(&mut self, id: StateId) -> Option<&mut AtnState> {
        self.states.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Size of the state array, holes included.
    #[inline]
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Iterate over live states in number order.
    pub fn states(&self) -> impl Iterator<Item = &AtnState> + '_ {
        self.states.iter().flatten()
    }

    /// Raw slots, holes included.
    pub fn state_slots(&self) -> &[Option<AtnState>] {
        &self.states
    }

    // ── Decisions ───────────────────────────────────────────

    /// Register `id` as the next decision and return its decision number.
    pub(crate) fn define_decision_state(&mut self, id: StateId) -> usize {
        let decision = self.decision_to_state.len();
        self.decision_to_state.push(id);
        if let Some(state) = self.state_mut(id) {
            state.set_decision(decision);
        }
        decision
    }

    pub fn decision_state(&self, decision: usize) -> Option<&AtnState> {
        self.decision_to_state
            .get(decision)
            .and_then(|&id| self.state(id))
    }

    pub fn decision_to_state(&self) -> &[StateId] {
        &self.decision_to_state
    }

    #[inline]
    pub fn number_of_decisions(&self) -> usize {
        self.decision_to_state.len()
    }

    // ── Rules and modes ─────────────────────────────────────

    #[inline]
    pub fn rule_count(&self) -> usize {
        self.rule_to_start_state.len()
    }

    pub fn rule_start_state(&self, rule: usize) -> Option<StateId> {
        self.rule_to_start_state.get(rule).copied()
    }

    pub fn rule_stop_state(&self, rule: usize) -> Option<StateId> {
        self.rule_to_stop_state.get(rule).copied().flatten()
    }

    pub fn rule_to_start_state(&self) -> &[StateId] {
        &self.rule_to_start_state
    }

    /// Token type produced by lexer rule `rule`, or the bypass token type of
    /// parser rule `rule`.
    pub fn rule_token_type(&self, rule: usize) -> Option<i32> {
        self.rule_to_token_type.get(rule).copied()
    }

    pub fn rule_to_token_type(&self) -> &[i32] {
        &self.rule_to_token_type
    }

    pub fn mode_start_state(&self, mode: usize) -> Option<StateId> {
        self.mode_to_start_state.get(mode).copied()
    }

    pub fn mode_to_start_state(&self) -> &[StateId] {
        &self.mode_to_start_state
    }

    pub fn lexer_actions(&self) -> &[LexerAction] {
        &self.lexer_actions
    }
}
