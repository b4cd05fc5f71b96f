//! Rule bypass transitions.
//!
//! For every parser rule, a bypass block is spliced between the rule start
//! state and the rule body. One alternative of the block runs the original
//! body; the other matches a single synthetic token standing for the whole
//! rule. Parse-tree pattern matching uses these tokens as rule placeholders.

use tracing::debug;

use crate::atn::Atn;
use crate::error::DeserializeError;
use crate::state::{AtnState, BlockStartKind, StateId, StateKind};
use crate::transition::Transition;

use super::is_precedence_loop_entry;

pub(super) fn generate_rule_bypass_transitions(atn: &mut Atn) -> Result<(), DeserializeError> {
    let rule_count = atn.rule_count();
    atn.rule_to_token_type = (0..rule_count)
        .map(|rule| atn.max_token_type() + i32::try_from(rule).unwrap_or(i32::MAX) + 1)
        .collect();

    for rule in 0..rule_count {
        generate_rule_bypass_transition(atn, rule)?;
    }
    debug!(rules = rule_count, "generated rule bypass transitions");
    Ok(())
}

fn generate_rule_bypass_transition(atn: &mut Atn, rule: usize) -> Result<(), DeserializeError> {
    let invalid_rule = || DeserializeError::InvalidReference {
        what: "rule",
        number: i32::try_from(rule).unwrap_or(i32::MAX),
    };
    let rule_start = atn.rule_start_state(rule).ok_or_else(invalid_rule)?;
    let token_type = atn.rule_token_type(rule).ok_or_else(invalid_rule)?;

    let bypass_start = atn.add_state(AtnState::new(
        StateKind::BlockStart {
            block: BlockStartKind::Basic,
            end_state: None,
        },
        Some(rule),
    ));
    let bypass_stop = atn.add_state(AtnState::new(
        StateKind::BlockEnd {
            start_state: Some(bypass_start),
        },
        Some(rule),
    ));
    if let Some(StateKind::BlockStart { end_state, .. }) = atn.state_mut(bypass_start).map(AtnState::kind_mut) {
        *end_state = Some(bypass_stop);
    }
    atn.define_decision_state(bypass_start);

    // Where the rule body ends, plus one edge that must keep its target.
    let (end_state, excluded) = if atn.state(rule_start).is_some_and(AtnState::is_precedence_rule) {
        let entry = atn
            .states()
            .filter(|s| s.rule_index() == Some(rule))
            .find(|s| is_precedence_loop_entry(atn, s))
            .ok_or(DeserializeError::BypassSynthesis { rule })?;
        // The loop-back edge of a left-recursive rule re-enters the loop,
        // not the rule body.
        (entry.number(), entry.loop_back_state().map(|lb| (lb, 0)))
    } else {
        (atn.rule_stop_state(rule).ok_or_else(invalid_rule)?, None)
    };

    retarget(atn, end_state, bypass_stop, excluded);

    // Move the rule body under the bypass block, preserving order.
    let body = atn
        .state_mut(rule_start)
        .map(AtnState::take_transitions)
        .unwrap_or_default();
    if let Some(start) = atn.state_mut(bypass_start) {
        for transition in body {
            start.add_transition(transition);
        }
    }

    if let Some(start) = atn.state_mut(rule_start) {
        start.add_transition(Transition::epsilon(bypass_start));
    }
    if let Some(stop) = atn.state_mut(bypass_stop) {
        stop.add_transition(Transition::epsilon(end_state));
    }

    let mut match_state = AtnState::new(StateKind::Basic, Some(rule));
    match_state.add_transition(Transition::atom(bypass_stop, token_type));
    let match_state = atn.add_state(match_state);
    if let Some(start) = atn.state_mut(bypass_start) {
        start.add_transition(Transition::epsilon(match_state));
    }
    Ok(())
}

/// Point every edge into `from` at `to`, except the `excluded`
/// (state, transition index) edge.
fn retarget(atn: &mut Atn, from: StateId, to: StateId, excluded: Option<(StateId, usize)>) {
    for slot in &mut atn.states {
        let Some(state) = slot.as_mut() else { continue };
        let source = state.number();
        for (i, transition) in state.transitions_mut().iter_mut().enumerate() {
            if excluded == Some((source, i)) {
                continue;
            }
            if transition.target() == from {
                transition.set_target(to);
            }
        }
    }
}
