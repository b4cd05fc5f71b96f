//! Structural verification of a linked ATN.

use crate::atn::Atn;
use crate::error::DeserializeError;
use crate::state::{AtnState, BlockStartKind, StateId, StateKind};

/// Check the structural invariants every well-formed ATN satisfies.
///
/// Fails on the first violation, naming the offending state.
pub fn verify_atn(atn: &Atn) -> Result<(), DeserializeError> {
    for state in atn.states() {
        verify_state(atn, state)?;
    }

    for (rule, &start) in atn.rule_to_start_state().iter().enumerate() {
        let start_state = atn.state(start).ok_or(DeserializeError::InvalidReference {
            what: "state",
            number: i32::try_from(start.index()).unwrap_or(i32::MAX),
        })?;
        check(
            start_state.stop_state() == atn.rule_stop_state(rule),
            start,
            "rule start and stop states are not paired",
        )?;
    }
    Ok(())
}

fn verify_state(atn: &Atn, state: &AtnState) -> Result<(), DeserializeError> {
    let id = state.number();
    let transitions = state.transitions();

    check(
        state.only_epsilon_transitions() || transitions.len() <= 1,
        id,
        "state mixes epsilon and non-epsilon transitions",
    )?;

    match *state.kind() {
        StateKind::BlockStart { block, end_state } => {
            if let BlockStartKind::Plus { loop_back_state } = block {
                check(loop_back_state.is_some(), id, "plus block start has no loop back state")?;
            }
            check(end_state.is_some(), id, "block start state has no end state")?;
        }
        StateKind::StarLoopEntry {
            loop_back_state, ..
        } => {
            check(loop_back_state.is_some(), id, "star loop entry has no loop back state")?;
            check(transitions.len() == 2, id, "star loop entry must have exactly two transitions")?;
            let first = target_kind(atn, state, 0);
            let second = target_kind(atn, state, 1);
            match (first, second) {
                (
                    Some(StateKind::BlockStart {
                        block: BlockStartKind::Star,
                        ..
                    }),
                    Some(StateKind::LoopEnd { .. }),
                ) => check(!state.is_non_greedy(), id, "greedy star loop entry is marked non-greedy")?,
                (
                    Some(StateKind::LoopEnd { .. }),
                    Some(StateKind::BlockStart {
                        block: BlockStartKind::Star,
                        ..
                    }),
                ) => check(state.is_non_greedy(), id, "non-greedy star loop entry is not marked non-greedy")?,
                _ => {
                    return Err(DeserializeError::StructuralInvariantViolation {
                        state: id,
                        reason: "star loop entry must branch to a star block start and a loop end",
                    })
                }
            }
        }
        StateKind::StarLoopBack => {
            check(transitions.len() == 1, id, "star loop back must have exactly one transition")?;
            check(
                matches!(target_kind(atn, state, 0), Some(StateKind::StarLoopEntry { .. })),
                id,
                "star loop back must target a star loop entry",
            )?;
        }
        StateKind::LoopEnd { loop_back_state } => {
            check(loop_back_state.is_some(), id, "loop end state has no loop back state")?;
        }
        StateKind::RuleStart { stop_state, .. } => {
            check(stop_state.is_some(), id, "rule start state has no stop state")?;
        }
        StateKind::BlockEnd { start_state } => {
            check(start_state.is_some(), id, "block end state has no start state")?;
        }
        _ => {}
    }

    if state.kind().is_decision() {
        check(
            transitions.len() <= 1 || state.decision().is_some(),
            id,
            "decision state with several transitions has no decision number",
        )?;
    } else {
        check(
            transitions.len() <= 1 || matches!(state.kind(), StateKind::RuleStop),
            id,
            "non-decision state has several transitions",
        )?;
    }
    Ok(())
}

fn target_kind<'a>(atn: &'a Atn, state: &AtnState, i: usize) -> Option<&'a StateKind> {
    state
        .transition(i)
        .and_then(|t| atn.state(t.target()))
        .map(AtnState::kind)
}

#[inline]
fn check(condition: bool, state: StateId, reason: &'static str) -> Result<(), DeserializeError> {
    if condition {
        Ok(())
    } else {
        Err(DeserializeError::StructuralInvariantViolation { state, reason })
    }
}
