//! Binary ATN serializer.
//!
//! The inverse of [`deserialize`](crate::deserialize): writes an [`Atn`] in
//! the current format so it can be embedded in generated code or fed back
//! through the deserializer. Derived edges (rule stop → follow state) are
//! not written; the deserializer recreates them.

use rustc_hash::FxHashMap;

use crate::atn::{Atn, GrammarType};
use crate::deserializer::{
    is_feature_supported, parse_identifier, ADDED_LEXER_ACTIONS, ADDED_PRECEDENCE_TRANSITIONS,
    SERIALIZED_IDENTIFIER, SERIALIZED_VERSION,
};
use crate::interval_set::IntervalSet;
use crate::lexer_action::LexerAction;
use crate::state::{AtnState, StateKind, StateType};
use crate::token::EOF;
use crate::transition::TransitionKind;

/// Serialized "none" for 16-bit fields.
const NONE_16: i32 = 0xFFFF;

/// Serialize `atn` in the current format.
pub fn serialize(atn: &Atn) -> Vec<u16> {
    serialize_with_identifier(atn, SERIALIZED_IDENTIFIER)
}

/// Serialize `atn` tagged with `identifier`, omitting the sections that
/// identifier predates.
pub(crate) fn serialize_with_identifier(atn: &Atn, identifier: &str) -> Vec<u16> {
    let mut out = Vec::new();
    out.push(SERIALIZED_VERSION);
    write_identifier(&mut out, parse_identifier(identifier).unwrap_or(0));
    out.push(atn.grammar_type().code());
    out.push(atn.max_token_type());

    // ── States ──────────────────────────────────────────────
    let mut non_greedy = Vec::new();
    let mut precedence_rules = Vec::new();
    let mut set_indices: FxHashMap<IntervalSet, usize> = FxHashMap::default();
    let mut sets: Vec<&IntervalSet> = Vec::new();
    let mut nedges = 0usize;

    out.push(len_i32(atn.state_count()));
    for slot in atn.state_slots() {
        let Some(state) = slot else {
            out.push(StateType::INVALID_CODE);
            continue;
        };
        let number = state_number(state);
        if state.kind().is_decision() && state.is_non_greedy() {
            non_greedy.push(number);
        }
        if state.is_precedence_rule() {
            precedence_rules.push(number);
        }

        out.push(state.state_type().code());
        out.push(state.rule_index().map_or(NONE_16, len_i32));
        match state.kind() {
            StateKind::LoopEnd { loop_back_state } => out.push(optional_number(*loop_back_state)),
            StateKind::BlockStart { end_state, .. } => out.push(optional_number(*end_state)),
            _ => {}
        }

        if !matches!(state.kind(), StateKind::RuleStop) {
            nedges += state.transitions().len();
        }
        for transition in state.transitions() {
            if let TransitionKind::Set { set } | TransitionKind::NotSet { set } = transition.kind() {
                if !set_indices.contains_key(set.as_ref()) {
                    set_indices.insert(IntervalSet::clone(set), sets.len());
                    sets.push(set);
                }
            }
        }
    }

    write_list(&mut out, &non_greedy);
    if is_feature_supported(ADDED_PRECEDENCE_TRANSITIONS, identifier) {
        write_list(&mut out, &precedence_rules);
    }

    // ── Rules and modes ─────────────────────────────────────
    out.push(len_i32(atn.rule_count()));
    for (rule, start) in atn.rule_to_start_state().iter().enumerate() {
        out.push(len_i32(start.index()));
        if atn.grammar_type() == GrammarType::Lexer {
            let token_type = atn.rule_token_type(rule).unwrap_or(EOF);
            out.push(if token_type == EOF { NONE_16 } else { token_type });
        }
    }

    let modes: Vec<i32> = atn
        .mode_to_start_state()
        .iter()
        .map(|s| len_i32(s.index()))
        .collect();
    write_list(&mut out, &modes);

    // ── Sets ────────────────────────────────────────────────
    out.push(len_i32(sets.len()));
    for set in &sets {
        write_set(&mut out, set);
    }

    // ── Edges ───────────────────────────────────────────────
    out.push(len_i32(nedges));
    for state in atn.states() {
        if matches!(state.kind(), StateKind::RuleStop) {
            continue;
        }
        for transition in state.transitions() {
            let src = state_number(state);
            let mut trg = len_i32(transition.target().index());
            let (mut arg1, mut arg2, mut arg3) = (0, 0, 0);
            match transition.kind() {
                TransitionKind::Epsilon { .. } | TransitionKind::Wildcard => {}
                TransitionKind::Range { start, stop } => {
                    (arg1, arg2) = (*start, *stop);
                    if *start == EOF {
                        (arg1, arg3) = (0, 1);
                    }
                }
                TransitionKind::Rule {
                    rule_index,
                    precedence,
                    follow_state,
                } => {
                    trg = len_i32(follow_state.index());
                    arg1 = len_i32(transition.target().index());
                    arg2 = len_i32(*rule_index);
                    arg3 = *precedence;
                }
                TransitionKind::Predicate {
                    rule_index,
                    pred_index,
                    is_ctx_dependent,
                } => {
                    arg1 = len_i32(*rule_index);
                    arg2 = len_i32(*pred_index);
                    arg3 = i32::from(*is_ctx_dependent);
                }
                TransitionKind::Precedence { precedence } => arg1 = *precedence,
                TransitionKind::Atom { label } => {
                    arg1 = *label;
                    if *label == EOF {
                        (arg1, arg3) = (0, 1);
                    }
                }
                TransitionKind::Action {
                    rule_index,
                    action_index,
                    is_ctx_dependent,
                } => {
                    arg1 = len_i32(*rule_index);
                    arg2 = action_index.map_or(NONE_16, len_i32);
                    arg3 = i32::from(*is_ctx_dependent);
                }
                TransitionKind::Set { set } | TransitionKind::NotSet { set } => {
                    arg1 = set_indices.get(set.as_ref()).copied().map_or(0, len_i32);
                }
            }
            out.extend([src, trg, transition.transition_type().code(), arg1, arg2, arg3]);
        }
    }

    // ── Decisions and lexer actions ─────────────────────────
    let decisions: Vec<i32> = atn
        .decision_to_state()
        .iter()
        .map(|s| len_i32(s.index()))
        .collect();
    write_list(&mut out, &decisions);

    if atn.grammar_type() == GrammarType::Lexer && is_feature_supported(ADDED_LEXER_ACTIONS, identifier) {
        out.push(len_i32(atn.lexer_actions().len()));
        for action in atn.lexer_actions() {
            out.push(action.action_type().code());
            let (data1, data2) = match *action {
                LexerAction::Custom {
                    rule_index,
                    action_index,
                } => (rule_index, action_index),
                LexerAction::Channel(n)
                | LexerAction::Mode(n)
                | LexerAction::PushMode(n)
                | LexerAction::Type(n) => (n, 0),
                LexerAction::More | LexerAction::PopMode | LexerAction::Skip => (0, 0),
            };
            out.extend([data1, data2]);
        }
    }

    encode(&out)
}

/// Apply the stream encoding to a list of values: the first value is
/// written verbatim, every later one offset by two and truncated to 16 bits.
pub fn encode(values: &[i32]) -> Vec<u16> {
    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let unit = if i == 0 { value } else { value.wrapping_add(2) };
            u16::try_from(unit & 0xFFFF).unwrap_or(u16::MAX)
        })
        .collect()
}

fn write_identifier(out: &mut Vec<i32>, identifier: u128) {
    // least significant 16 bits first
    for shift in (0..128).step_by(16) {
        let unit = (identifier >> shift) & 0xFFFF;
        out.push(i32::try_from(unit).unwrap_or(0));
    }
}

fn write_list(out: &mut Vec<i32>, values: &[i32]) {
    out.push(len_i32(values.len()));
    out.extend_from_slice(values);
}

fn write_set(out: &mut Vec<i32>, set: &IntervalSet) {
    let intervals = set.intervals();
    let contains_eof = set.contains(EOF);
    let skip_first = contains_eof && intervals.first().is_some_and(|i| i.stop == EOF);
    out.push(len_i32(intervals.len() - usize::from(skip_first)));
    out.push(i32::from(contains_eof));
    for interval in intervals {
        if interval.start == EOF {
            if interval.stop == EOF {
                continue;
            }
            out.push(0);
        } else {
            out.push(interval.start);
        }
        out.push(interval.stop);
    }
}

fn state_number(state: &AtnState) -> i32 {
    len_i32(state.number().index())
}

fn optional_number(state: Option<crate::state::StateId>) -> i32 {
    state.map_or(NONE_16, |s| len_i32(s.index()))
}

fn len_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}
