use pretty_assertions::assert_eq;

use super::*;
use crate::test_helpers::s;

#[test]
fn state_type_codes_round_trip() {
    for code in 1..=12 {
        let state_type = StateType::from_code(code).unwrap();
        assert_eq!(state_type.code(), code);
        assert_eq!(StateKind::from_type(state_type).state_type(), state_type);
    }
    assert_eq!(StateType::from_code(StateType::INVALID_CODE), None);
    assert_eq!(StateType::from_code(13), None);
}

#[test]
fn decision_kinds() {
    let decisions: Vec<StateType> = (1..=12)
        .filter_map(StateType::from_code)
        .filter(|t| StateKind::from_type(*t).is_decision())
        .collect();
    assert_eq!(
        decisions,
        vec![
            StateType::BlockStart,
            StateType::PlusBlockStart,
            StateType::StarBlockStart,
            StateType::TokenStart,
            StateType::StarLoopEntry,
            StateType::PlusLoopBack,
        ]
    );
}

#[test]
fn epsilon_only_tracks_transitions() {
    let mut state = AtnState::new(StateKind::Basic, Some(0));
    assert!(!state.only_epsilon_transitions());

    state.add_transition(Transition::epsilon(s(1)));
    assert!(state.only_epsilon_transitions());
    state.add_transition(Transition::epsilon(s(2)));
    assert!(state.only_epsilon_transitions());

    // mixing clears the flag
    state.add_transition(Transition::atom(s(3), 4));
    assert!(!state.only_epsilon_transitions());
    assert_eq!(state.transitions().len(), 3);
}

#[test]
fn take_transitions_preserves_order() {
    let mut state = AtnState::new(StateKind::Basic, None);
    state.add_transition(Transition::epsilon(s(1)));
    state.add_transition(Transition::epsilon(s(2)));

    let taken: Vec<StateId> = state.take_transitions().iter().map(Transition::target).collect();
    assert_eq!(taken, vec![s(1), s(2)]);
    assert!(state.transitions().is_empty());
}

#[test]
fn cross_link_accessors_follow_the_kind() {
    let plus = AtnState::new(
        StateKind::BlockStart {
            block: BlockStartKind::Plus {
                loop_back_state: Some(s(9)),
            },
            end_state: Some(s(4)),
        },
        Some(0),
    );
    assert_eq!(plus.loop_back_state(), Some(s(9)));
    assert_eq!(plus.end_state(), Some(s(4)));
    assert_eq!(plus.start_state(), None);
    assert_eq!(plus.state_type(), StateType::PlusBlockStart);

    let basic = AtnState::new(StateKind::Basic, Some(0));
    assert_eq!(basic.loop_back_state(), None);
    assert_eq!(basic.stop_state(), None);
}

#[test]
fn lookahead_memo_is_computed_once() {
    let state = AtnState::new(StateKind::Basic, None);
    assert!(state.next_tokens_within_rule().is_none());

    let first = state.next_tokens_within_rule_or_init(|| IntervalSet::of(3)).clone();
    let second = state.next_tokens_within_rule_or_init(|| IntervalSet::of(99)).clone();
    assert_eq!(first, IntervalSet::of(3));
    assert_eq!(second, first);
}

#[test]
fn state_id_formats() {
    assert_eq!(format!("{:?}", s(12)), "s12");
    assert_eq!(s(12).to_string(), "12");
    assert_eq!(s(12).index(), 12);
}
