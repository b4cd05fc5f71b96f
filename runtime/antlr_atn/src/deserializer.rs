//! Binary ATN deserializer.
//!
//! Decodes the integer stream produced by the grammar compiler into an
//! [`Atn`]. The stream is read strictly in order:
//!
//! 1. format version and identifier
//! 2. grammar type and max token type
//! 3. states (with deferred loop-back / block-end numbers), non-greedy
//!    states, precedence rule start states
//! 4. rules, modes, interval sets
//! 5. edges, followed by the derived rule-return edges and back-links
//! 6. decisions, lexer actions
//!
//! After decoding, precedence decisions are marked, the graph is verified,
//! and (for parsers, when configured) rule bypass transitions are
//! synthesized and the graph verified again. Any failure aborts the whole
//! load.

mod bypass;
mod reader;
mod verify;

use std::sync::Arc;

use tracing::debug;

use crate::atn::{Atn, GrammarType};
use crate::error::DeserializeError;
use crate::interval_set::IntervalSet;
use crate::lexer_action::{LexerAction, LexerActionType};
use crate::options::DeserializationOptions;
use crate::state::{AtnState, BlockStartKind, StateId, StateKind, StateType};
use crate::token::EOF;
use crate::transition::{Transition, TransitionKind, TransitionType};

pub(crate) use reader::parse_identifier;
use reader::UnitReader;
pub use verify::verify_atn;

/// Format version this runtime reads and writes.
pub const SERIALIZED_VERSION: i32 = 3;

/// Earliest supported identifier.
pub const BASE_SERIALIZED_IDENTIFIER: &str = "33761B2D-78BB-4A43-8B0B-4F5BEE8AACF3";

/// First identifier whose streams carry precedence predicates and the
/// precedence rule state list.
pub const ADDED_PRECEDENCE_TRANSITIONS: &str = "1DA0C57D-6C06-438A-9B27-10BCB3CE0F61";

/// First identifier whose lexer streams carry a lexer action table.
pub const ADDED_LEXER_ACTIONS: &str = "AADB8D7E-AEEF-4415-AD2B-8204D6CF042E";

/// Supported identifiers, oldest first.
pub const SUPPORTED_IDENTIFIERS: [&str; 3] = [
    BASE_SERIALIZED_IDENTIFIER,
    ADDED_PRECEDENCE_TRANSITIONS,
    ADDED_LEXER_ACTIONS,
];

/// Identifier written by the serializer.
pub const SERIALIZED_IDENTIFIER: &str = ADDED_LEXER_ACTIONS;

/// Whether a stream tagged `actual` includes the feature introduced by
/// the identifier `feature`.
pub fn is_feature_supported(feature: &str, actual: &str) -> bool {
    let position = |id: &str| SUPPORTED_IDENTIFIERS.iter().position(|known| *known == id);
    match (position(feature), position(actual)) {
        (Some(introduced), Some(actual)) => actual >= introduced,
        _ => false,
    }
}

/// Deserialize with the default options (verification on, no bypass).
pub fn deserialize(data: &[u16]) -> Result<Atn, DeserializeError> {
    AtnDeserializer::default().deserialize(data)
}

/// Reusable deserializer configured by [`DeserializationOptions`].
#[derive(Clone, Copy, Debug, Default)]
pub struct AtnDeserializer {
    options: DeserializationOptions,
}

impl AtnDeserializer {
    pub fn new(options: DeserializationOptions) -> Self {
        AtnDeserializer { options }
    }

    pub fn options(&self) -> &DeserializationOptions {
        &self.options
    }

    /// Decode `data` into a fully linked, verified ATN.
    #[tracing::instrument(level = "debug", skip_all, fields(units = data.len()))]
    pub fn deserialize(&self, data: &[u16]) -> Result<Atn, DeserializeError> {
        let mut decoder = Decoder::new(data);
        decoder.check_version()?;
        decoder.check_identifier()?;

        let mut atn = decoder.read_atn()?;
        decoder.read_states(&mut atn)?;
        decoder.read_rules(&mut atn)?;
        decoder.read_modes(&mut atn)?;
        let sets = decoder.read_sets()?;
        decoder.read_edges(&mut atn, &sets)?;
        decoder.read_decisions(&mut atn)?;
        decoder.read_lexer_actions(&mut atn)?;
        debug!(
            grammar = ?atn.grammar_type(),
            states = atn.state_count(),
            rules = atn.rule_count(),
            decisions = atn.number_of_decisions(),
            consumed = decoder.reader.position(),
            "decoded serialized ATN"
        );

        mark_precedence_decisions(&mut atn);

        if self.options.verify_atn {
            verify_atn(&atn)?;
        }

        if self.options.generate_rule_bypass_transitions && atn.grammar_type() == GrammarType::Parser {
            bypass::generate_rule_bypass_transitions(&mut atn)?;
            if self.options.verify_atn {
                // re-verify after modification
                verify_atn(&atn)?;
            }
        }

        Ok(atn)
    }
}

// ── Decoder ─────────────────────────────────────────────────────────

struct Decoder<'a> {
    reader: UnitReader<'a>,
    /// Identifier of the stream, set by `check_identifier`.
    identifier: String,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u16]) -> Self {
        Decoder {
            reader: UnitReader::new(data),
            identifier: String::new(),
        }
    }

    fn supports(&self, feature: &str) -> bool {
        is_feature_supported(feature, &self.identifier)
    }

    fn check_version(&mut self) -> Result<(), DeserializeError> {
        let version = self.reader.read_int()?;
        if version != SERIALIZED_VERSION {
            return Err(DeserializeError::UnsupportedVersion {
                found: version,
                expected: SERIALIZED_VERSION,
            });
        }
        Ok(())
    }

    fn check_identifier(&mut self) -> Result<(), DeserializeError> {
        let identifier = self.reader.read_identifier()?;
        if !SUPPORTED_IDENTIFIERS.contains(&identifier.as_str()) {
            return Err(DeserializeError::UnsupportedIdentifier {
                found: identifier,
                expected: SERIALIZED_IDENTIFIER,
            });
        }
        self.identifier = identifier;
        Ok(())
    }

    fn read_atn(&mut self) -> Result<Atn, DeserializeError> {
        let code = self.reader.read_int()?;
        let grammar_type =
            GrammarType::from_code(code).ok_or(DeserializeError::InvalidGrammarType { code })?;
        let max_token_type = self.reader.read_int()?;
        Ok(Atn::new(grammar_type, max_token_type))
    }

    fn read_states(&mut self, atn: &mut Atn) -> Result<(), DeserializeError> {
        let mut loop_back_numbers: Vec<(StateId, i32)> = Vec::new();
        let mut end_state_numbers: Vec<(StateId, i32)> = Vec::new();

        let nstates = self.reader.read_count()?;
        for index in 0..nstates {
            let code = self.reader.read_int()?;
            if code == StateType::INVALID_CODE {
                atn.add_hole();
                continue;
            }
            let state_type = StateType::from_code(code)
                .ok_or(DeserializeError::InvalidStateType { code, index })?;
            let rule_index = optional_index(self.reader.read_int()?);
            let id = atn.add_state(AtnState::new(StateKind::from_type(state_type), rule_index));

            match state_type {
                StateType::LoopEnd => loop_back_numbers.push((id, self.reader.read_int()?)),
                StateType::BlockStart | StateType::PlusBlockStart | StateType::StarBlockStart => {
                    end_state_numbers.push((id, self.reader.read_int()?));
                }
                _ => {}
            }
        }

        // Deferred links: every state instance exists now.
        for (id, number) in loop_back_numbers {
            let loop_back = resolve_state(atn, number)?;
            if let Some(StateKind::LoopEnd { loop_back_state }) = atn.state_mut(id).map(AtnState::kind_mut) {
                *loop_back_state = Some(loop_back);
            }
        }
        for (id, number) in end_state_numbers {
            let end = resolve_state(atn, number)?;
            if let Some(StateKind::BlockStart { end_state, .. }) = atn.state_mut(id).map(AtnState::kind_mut) {
                *end_state = Some(end);
            }
        }

        let non_greedy = self.reader.read_count()?;
        for _ in 0..non_greedy {
            let id = resolve_state(atn, self.reader.read_int()?)?;
            let state = live_state_mut(atn, id)?;
            if !state.kind().is_decision() {
                return Err(DeserializeError::UnexpectedStateKind {
                    state: id,
                    expected: "decision state",
                });
            }
            state.set_non_greedy();
        }

        if self.supports(ADDED_PRECEDENCE_TRANSITIONS) {
            let precedence = self.reader.read_count()?;
            for _ in 0..precedence {
                let id = resolve_state(atn, self.reader.read_int()?)?;
                match live_state_mut(atn, id)?.kind_mut() {
                    StateKind::RuleStart {
                        is_precedence_rule, ..
                    } => *is_precedence_rule = true,
                    _ => {
                        return Err(DeserializeError::UnexpectedStateKind {
                            state: id,
                            expected: "rule start state",
                        })
                    }
                }
            }
        }

        debug!(states = nstates, "read states");
        Ok(())
    }

    fn read_rules(&mut self, atn: &mut Atn) -> Result<(), DeserializeError> {
        let nrules = self.reader.read_count()?;
        let is_lexer = atn.grammar_type() == GrammarType::Lexer;

        atn.rule_to_start_state = Vec::with_capacity(nrules);
        if is_lexer {
            atn.rule_to_token_type = Vec::with_capacity(nrules);
        }
        for _ in 0..nrules {
            let start = resolve_state(atn, self.reader.read_int()?)?;
            if !matches!(live_state(atn, start)?.kind(), StateKind::RuleStart { .. }) {
                return Err(DeserializeError::UnexpectedStateKind {
                    state: start,
                    expected: "rule start state",
                });
            }
            atn.rule_to_start_state.push(start);

            if is_lexer {
                // "none" arrives as -1, which is also EOF.
                atn.rule_to_token_type.push(self.reader.read_int()?);
            }
        }

        atn.rule_to_stop_state = vec![None; nrules];
        let stops: Vec<(StateId, Option<usize>)> = atn
            .states()
            .filter(|s| matches!(s.kind(), StateKind::RuleStop))
            .map(|s| (s.number(), s.rule_index()))
            .collect();
        for (stop, rule) in stops {
            let rule = rule
                .filter(|&r| r < nrules)
                .ok_or(DeserializeError::InvalidReference {
                    what: "rule",
                    number: rule.map_or(-1, index_as_i32),
                })?;
            atn.rule_to_stop_state[rule] = Some(stop);
            let start = atn.rule_to_start_state[rule];
            if let Some(StateKind::RuleStart { stop_state, .. }) = atn.state_mut(start).map(AtnState::kind_mut) {
                *stop_state = Some(stop);
            }
        }

        debug!(rules = nrules, "read rules");
        Ok(())
    }

    fn read_modes(&mut self, atn: &mut Atn) -> Result<(), DeserializeError> {
        let nmodes = self.reader.read_count()?;
        for _ in 0..nmodes {
            let start = resolve_state(atn, self.reader.read_int()?)?;
            atn.mode_to_start_state.push(start);
        }
        Ok(())
    }

    fn read_sets(&mut self) -> Result<Vec<Arc<IntervalSet>>, DeserializeError> {
        let nsets = self.reader.read_count()?;
        let mut sets = Vec::with_capacity(nsets);
        for _ in 0..nsets {
            let nintervals = self.reader.read_count()?;
            let contains_eof = self.reader.read_int()? != 0;
            let mut set = IntervalSet::new();
            if contains_eof {
                set.add_one(EOF);
            }
            for _ in 0..nintervals {
                let start = self.reader.read_int()?;
                let stop = self.reader.read_int()?;
                set.add_range(start, stop);
            }
            sets.push(Arc::new(set));
        }
        Ok(sets)
    }

    fn read_edges(&mut self, atn: &mut Atn, sets: &[Arc<IntervalSet>]) -> Result<(), DeserializeError> {
        let nedges = self.reader.read_count()?;
        for _ in 0..nedges {
            let src = self.reader.read_int()?;
            let trg = self.reader.read_int()?;
            let code = self.reader.read_int()?;
            let arg1 = self.reader.read_int()?;
            let arg2 = self.reader.read_int()?;
            let arg3 = self.reader.read_int()?;
            let transition = edge_factory(atn, code, trg, arg1, arg2, arg3, sets)?;
            let src = resolve_state(atn, src)?;
            live_state_mut(atn, src)?.add_transition(transition);
        }
        debug!(edges = nedges, "read edges");

        add_rule_return_edges(atn)?;
        link_block_and_loop_states(atn)
    }

    fn read_decisions(&mut self, atn: &mut Atn) -> Result<(), DeserializeError> {
        let ndecisions = self.reader.read_count()?;
        for _ in 0..ndecisions {
            let id = resolve_state(atn, self.reader.read_int()?)?;
            if !live_state(atn, id)?.kind().is_decision() {
                return Err(DeserializeError::UnexpectedStateKind {
                    state: id,
                    expected: "decision state",
                });
            }
            atn.define_decision_state(id);
        }
        Ok(())
    }

    fn read_lexer_actions(&mut self, atn: &mut Atn) -> Result<(), DeserializeError> {
        if atn.grammar_type() != GrammarType::Lexer {
            return Ok(());
        }
        if !self.supports(ADDED_LEXER_ACTIONS) {
            convert_legacy_lexer_actions(atn);
            return Ok(());
        }

        let count = self.reader.read_count()?;
        atn.lexer_actions = Vec::with_capacity(count);
        for _ in 0..count {
            let code = self.reader.read_int()?;
            let action_type = LexerActionType::from_code(code)
                .ok_or(DeserializeError::InvalidLexerActionType { code })?;
            let data1 = self.reader.read_int()?;
            let data2 = self.reader.read_int()?;
            atn.lexer_actions
                .push(LexerAction::from_parts(action_type, data1, data2));
        }
        Ok(())
    }
}

// ── Edge construction ───────────────────────────────────────────────

fn edge_factory(
    atn: &Atn,
    code: i32,
    trg: i32,
    arg1: i32,
    arg2: i32,
    arg3: i32,
    sets: &[Arc<IntervalSet>],
) -> Result<Transition, DeserializeError> {
    let transition_type =
        TransitionType::from_code(code).ok_or(DeserializeError::InvalidTransitionType { code })?;
    let target = resolve_state(atn, trg)?;
    let set = |index: i32| {
        usize::try_from(index)
            .ok()
            .and_then(|i| sets.get(i))
            .cloned()
            .ok_or(DeserializeError::InvalidReference {
                what: "set",
                number: index,
            })
    };

    let kind = match transition_type {
        TransitionType::Epsilon => TransitionKind::Epsilon {
            outermost_precedence_return: None,
        },
        TransitionType::Range => TransitionKind::Range {
            start: if arg3 != 0 { EOF } else { arg1 },
            stop: arg2,
        },
        TransitionType::Rule => {
            // `trg` is the follow state; the edge itself enters the callee.
            let rule_start = resolve_state(atn, arg1)?;
            if !matches!(live_state(atn, rule_start)?.kind(), StateKind::RuleStart { .. }) {
                return Err(DeserializeError::UnexpectedStateKind {
                    state: rule_start,
                    expected: "rule start state",
                });
            }
            return Ok(Transition::new(
                rule_start,
                TransitionKind::Rule {
                    rule_index: rule_number(arg2)?,
                    precedence: arg3,
                    follow_state: target,
                },
            ));
        }
        TransitionType::Predicate => TransitionKind::Predicate {
            rule_index: rule_number(arg1)?,
            pred_index: usize::try_from(arg2).map_err(|_| DeserializeError::InvalidReference {
                what: "predicate",
                number: arg2,
            })?,
            is_ctx_dependent: arg3 != 0,
        },
        TransitionType::Precedence => TransitionKind::Precedence { precedence: arg1 },
        TransitionType::Atom => TransitionKind::Atom {
            label: if arg3 != 0 { EOF } else { arg1 },
        },
        TransitionType::Action => TransitionKind::Action {
            rule_index: rule_number(arg1)?,
            action_index: optional_index(arg2),
            is_ctx_dependent: arg3 != 0,
        },
        TransitionType::Set => TransitionKind::Set { set: set(arg1)? },
        TransitionType::NotSet => TransitionKind::NotSet { set: set(arg1)? },
        TransitionType::Wildcard => TransitionKind::Wildcard,
    };
    Ok(Transition::new(target, kind))
}

/// Rule stop states have no serialized edges: each call site contributes
/// an epsilon edge from the callee's stop state back to its follow state.
fn add_rule_return_edges(atn: &mut Atn) -> Result<(), DeserializeError> {
    let mut returns: Vec<(StateId, Transition)> = Vec::new();
    for state in atn.states() {
        for transition in state.transitions() {
            let TransitionKind::Rule {
                precedence,
                follow_state,
                ..
            } = *transition.kind()
            else {
                continue;
            };
            let callee = live_state(atn, transition.target())?;
            let rule = callee.rule_index().ok_or(DeserializeError::StructuralInvariantViolation {
                state: callee.number(),
                reason: "rule start state has no rule index",
            })?;
            let is_precedence_rule = atn
                .rule_start_state(rule)
                .and_then(|id| atn.state(id))
                .is_some_and(AtnState::is_precedence_rule);
            let outermost_precedence_return = (is_precedence_rule && precedence == 0).then_some(rule);
            let stop = atn.rule_stop_state(rule).ok_or(DeserializeError::StructuralInvariantViolation {
                state: callee.number(),
                reason: "rule has no stop state",
            })?;
            returns.push((
                stop,
                Transition::new(
                    follow_state,
                    TransitionKind::Epsilon {
                        outermost_precedence_return,
                    },
                ),
            ));
        }
    }
    for (stop, transition) in returns {
        live_state_mut(atn, stop)?.add_transition(transition);
    }
    Ok(())
}

/// Set block-end → block-start and loop-entry → loop-back links.
fn link_block_and_loop_states(atn: &mut Atn) -> Result<(), DeserializeError> {
    let mut block_pairs: Vec<(StateId, StateId)> = Vec::new();
    let mut loop_backs: Vec<(StateId, StateId)> = Vec::new();

    for state in atn.states() {
        match state.kind() {
            StateKind::BlockStart { end_state, .. } => {
                let end = end_state.ok_or(DeserializeError::StructuralInvariantViolation {
                    state: state.number(),
                    reason: "block start state has no end state",
                })?;
                block_pairs.push((state.number(), end));
            }
            StateKind::PlusLoopBack | StateKind::StarLoopBack => {
                let wants_plus = matches!(state.kind(), StateKind::PlusLoopBack);
                for transition in state.transitions() {
                    let target = live_state(atn, transition.target())?;
                    let is_match = if wants_plus {
                        matches!(
                            target.kind(),
                            StateKind::BlockStart {
                                block: BlockStartKind::Plus { .. },
                                ..
                            }
                        )
                    } else {
                        matches!(target.kind(), StateKind::StarLoopEntry { .. })
                    };
                    if is_match {
                        loop_backs.push((target.number(), state.number()));
                    }
                }
            }
            _ => {}
        }
    }

    for (start, end) in block_pairs {
        match live_state_mut(atn, end)?.kind_mut() {
            StateKind::BlockEnd { start_state } => {
                // block end states can only be associated to a single block start
                if start_state.is_some() {
                    return Err(DeserializeError::StructuralInvariantViolation {
                        state: end,
                        reason: "block end state is claimed by more than one block start",
                    });
                }
                *start_state = Some(start);
            }
            _ => {
                return Err(DeserializeError::UnexpectedStateKind {
                    state: end,
                    expected: "block end state",
                })
            }
        }
    }

    for (entry, loop_back) in loop_backs {
        match live_state_mut(atn, entry)?.kind_mut() {
            StateKind::BlockStart {
                block: BlockStartKind::Plus { loop_back_state },
                ..
            }
            | StateKind::StarLoopEntry {
                loop_back_state, ..
            } => *loop_back_state = Some(loop_back),
            _ => {}
        }
    }
    Ok(())
}

/// Older lexer streams carry no action table: every action transition
/// becomes a custom action indexed by its position in the new table.
fn convert_legacy_lexer_actions(atn: &mut Atn) {
    let mut actions = Vec::new();
    for slot in &mut atn.states {
        let Some(state) = slot.as_mut() else { continue };
        for i in 0..state.transitions().len() {
            let (target, rule_index, action_index) = match state.transitions().get(i) {
                Some(t) => match *t.kind() {
                    TransitionKind::Action {
                        rule_index,
                        action_index,
                        ..
                    } => (t.target(), rule_index, action_index),
                    _ => continue,
                },
                None => continue,
            };
            let new_index = actions.len();
            actions.push(LexerAction::Custom {
                rule_index: index_as_i32(rule_index),
                action_index: action_index.map_or(-1, index_as_i32),
            });
            state.replace_transition(
                i,
                Transition::new(
                    target,
                    TransitionKind::Action {
                        rule_index,
                        action_index: Some(new_index),
                        is_ctx_dependent: false,
                    },
                ),
            );
        }
    }
    atn.lexer_actions = actions;
}

// ── Precedence decisions ────────────────────────────────────────────

/// True when `state` is a star loop entry whose exit branch is a single
/// epsilon hop to a loop end that itself hops straight to a rule stop.
fn is_precedence_loop_entry(atn: &Atn, state: &AtnState) -> bool {
    if !matches!(state.kind(), StateKind::StarLoopEntry { .. }) {
        return false;
    }
    let Some(loop_end) = state
        .transitions()
        .last()
        .and_then(|t| atn.state(t.target()))
    else {
        return false;
    };
    if !matches!(loop_end.kind(), StateKind::LoopEnd { .. }) || !loop_end.only_epsilon_transitions() {
        return false;
    }
    loop_end
        .transition(0)
        .and_then(|t| atn.state(t.target()))
        .is_some_and(|s| matches!(s.kind(), StateKind::RuleStop))
}

/// Flag the loop of each precedence rule that decides whether the rule
/// continues or completes.
fn mark_precedence_decisions(atn: &mut Atn) {
    let marked: Vec<StateId> = atn
        .states()
        .filter(|state| {
            state
                .rule_index()
                .and_then(|rule| atn.rule_start_state(rule))
                .and_then(|id| atn.state(id))
                .is_some_and(AtnState::is_precedence_rule)
        })
        .filter(|state| is_precedence_loop_entry(atn, state))
        .map(AtnState::number)
        .collect();

    for id in marked {
        if let Some(StateKind::StarLoopEntry {
            is_precedence_decision,
            ..
        }) = atn.state_mut(id).map(AtnState::kind_mut)
        {
            *is_precedence_decision = true;
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Resolve a serialized state number to a live state.
fn resolve_state(atn: &Atn, number: i32) -> Result<StateId, DeserializeError> {
    let invalid = DeserializeError::InvalidReference {
        what: "state",
        number,
    };
    let raw = u32::try_from(number).map_err(|_| invalid.clone())?;
    let id = StateId::new(raw);
    atn.state(id).map(|_| id).ok_or(invalid)
}

fn live_state(atn: &Atn, id: StateId) -> Result<&AtnState, DeserializeError> {
    atn.state(id).ok_or(DeserializeError::InvalidReference {
        what: "state",
        number: index_as_i32(id.index()),
    })
}

fn live_state_mut(atn: &mut Atn, id: StateId) -> Result<&mut AtnState, DeserializeError> {
    atn.state_mut(id).ok_or(DeserializeError::InvalidReference {
        what: "state",
        number: index_as_i32(id.index()),
    })
}

fn rule_number(value: i32) -> Result<usize, DeserializeError> {
    usize::try_from(value).map_err(|_| DeserializeError::InvalidReference {
        what: "rule",
        number: value,
    })
}

/// Map the decoded "none" value `-1` to `None`.
fn optional_index(value: i32) -> Option<usize> {
    usize::try_from(value).ok()
}

fn index_as_i32(index: usize) -> i32 {
    i32::try_from(index).unwrap_or(i32::MAX)
}
