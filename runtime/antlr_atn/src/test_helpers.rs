//! Shared test utilities: tracing setup and serialized-stream fixtures.
//!
//! [`StreamBuilder`] writes the value list (before the unit offset is
//! applied) so tests can describe a graph section by section, corrupt a
//! single value, and then [`encode`](crate::encode) it.

use std::sync::Once;

use crate::deserializer::{is_feature_supported, parse_identifier};
use crate::state::StateId;
use crate::{
    encode, GrammarType, LexerActionType, StateType, TransitionType, ADDED_LEXER_ACTIONS,
    ADDED_PRECEDENCE_TRANSITIONS, SERIALIZED_IDENTIFIER, SERIALIZED_VERSION,
};

static TRACING_INIT: Once = Once::new();

/// Install a subscriber when `RUST_LOG` is set. Safe to call repeatedly.
pub(crate) fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(fmt::layer().with_test_writer().with_target(true))
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}

/// Shorthand for `StateId::new(n)`.
pub(crate) fn s(n: u32) -> StateId {
    StateId::new(n)
}

/// The eight 16-bit units of `identifier`, least significant first.
pub(crate) fn identifier_units(identifier: &str) -> Vec<i32> {
    let bits = parse_identifier(identifier).unwrap();
    (0..8)
        .map(|i| i32::try_from((bits >> (16 * i)) & 0xFFFF).unwrap())
        .collect()
}

// ── StreamBuilder ───────────────────────────────────────────────────

/// Section-by-section writer for serialized ATN streams.
pub(crate) struct StreamBuilder {
    grammar: GrammarType,
    identifier: &'static str,
    max_token_type: i32,
    nstates: i32,
    states: Vec<i32>,
    non_greedy: Vec<i32>,
    precedence: Vec<i32>,
    nrules: i32,
    rules: Vec<i32>,
    modes: Vec<i32>,
    sets: Vec<Vec<i32>>,
    edges: Vec<[i32; 6]>,
    decisions: Vec<i32>,
    lexer_actions: Vec<[i32; 3]>,
}

impl StreamBuilder {
    fn new(grammar: GrammarType, max_token_type: i32) -> Self {
        StreamBuilder {
            grammar,
            identifier: SERIALIZED_IDENTIFIER,
            max_token_type,
            nstates: 0,
            states: Vec::new(),
            non_greedy: Vec::new(),
            precedence: Vec::new(),
            nrules: 0,
            rules: Vec::new(),
            modes: Vec::new(),
            sets: Vec::new(),
            edges: Vec::new(),
            decisions: Vec::new(),
            lexer_actions: Vec::new(),
        }
    }

    pub(crate) fn parser(max_token_type: i32) -> Self {
        Self::new(GrammarType::Parser, max_token_type)
    }

    pub(crate) fn lexer(max_token_type: i32) -> Self {
        Self::new(GrammarType::Lexer, max_token_type)
    }

    pub(crate) fn identifier(mut self, identifier: &'static str) -> Self {
        self.identifier = identifier;
        self
    }

    /// A state without a linked partner.
    pub(crate) fn state(mut self, state_type: StateType, rule: i32) -> Self {
        self.nstates += 1;
        self.states.extend([state_type.code(), rule]);
        self
    }

    /// A loop end (`linked` = loop back) or block start (`linked` = end).
    pub(crate) fn linked_state(mut self, state_type: StateType, rule: i32, linked: i32) -> Self {
        self.nstates += 1;
        self.states.extend([state_type.code(), rule, linked]);
        self
    }

    pub(crate) fn hole(mut self) -> Self {
        self.nstates += 1;
        self.states.push(StateType::INVALID_CODE);
        self
    }

    pub(crate) fn non_greedy(mut self, state: i32) -> Self {
        self.non_greedy.push(state);
        self
    }

    pub(crate) fn precedence_rule(mut self, start_state: i32) -> Self {
        self.precedence.push(start_state);
        self
    }

    pub(crate) fn rule(mut self, start_state: i32) -> Self {
        self.nrules += 1;
        self.rules.push(start_state);
        self
    }

    pub(crate) fn lexer_rule(mut self, start_state: i32, token_type: i32) -> Self {
        self.nrules += 1;
        self.rules.extend([start_state, token_type]);
        self
    }

    pub(crate) fn mode(mut self, start_state: i32) -> Self {
        self.modes.push(start_state);
        self
    }

    /// A set of inclusive ranges, optionally containing EOF.
    pub(crate) fn set(mut self, contains_eof: bool, ranges: &[(i32, i32)]) -> Self {
        let mut values = vec![i32::try_from(ranges.len()).unwrap(), i32::from(contains_eof)];
        for &(start, stop) in ranges {
            values.extend([start, stop]);
        }
        self.sets.push(values);
        self
    }

    pub(crate) fn edge(
        mut self,
        src: i32,
        trg: i32,
        transition_type: TransitionType,
        args: [i32; 3],
    ) -> Self {
        self.edges
            .push([src, trg, transition_type.code(), args[0], args[1], args[2]]);
        self
    }

    pub(crate) fn eps(self, src: i32, trg: i32) -> Self {
        self.edge(src, trg, TransitionType::Epsilon, [0, 0, 0])
    }

    pub(crate) fn atom(self, src: i32, trg: i32, label: i32) -> Self {
        self.edge(src, trg, TransitionType::Atom, [label, 0, 0])
    }

    pub(crate) fn decision(mut self, state: i32) -> Self {
        self.decisions.push(state);
        self
    }

    pub(crate) fn lexer_action(mut self, action_type: LexerActionType, data1: i32, data2: i32) -> Self {
        self.lexer_actions.push([action_type.code(), data1, data2]);
        self
    }

    /// The value list, before the unit offset is applied.
    pub(crate) fn values(&self) -> Vec<i32> {
        let len = |n: usize| i32::try_from(n).unwrap();
        let mut v = vec![SERIALIZED_VERSION];
        v.extend(identifier_units(self.identifier));
        v.extend([self.grammar.code(), self.max_token_type]);

        v.push(self.nstates);
        v.extend(&self.states);
        v.push(len(self.non_greedy.len()));
        v.extend(&self.non_greedy);
        if is_feature_supported(ADDED_PRECEDENCE_TRANSITIONS, self.identifier) {
            v.push(len(self.precedence.len()));
            v.extend(&self.precedence);
        }

        v.push(self.nrules);
        v.extend(&self.rules);
        v.push(len(self.modes.len()));
        v.extend(&self.modes);

        v.push(len(self.sets.len()));
        for set in &self.sets {
            v.extend(set);
        }

        v.push(len(self.edges.len()));
        for edge in &self.edges {
            v.extend(edge);
        }

        v.push(len(self.decisions.len()));
        v.extend(&self.decisions);

        if self.grammar == GrammarType::Lexer && is_feature_supported(ADDED_LEXER_ACTIONS, self.identifier) {
            v.push(len(self.lexer_actions.len()));
            for action in &self.lexer_actions {
                v.extend(action);
            }
        }
        v
    }

    pub(crate) fn build(&self) -> Vec<u16> {
        encode(&self.values())
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

/// `a : ID ;` with `ID = 1`.
///
/// States: 0 rule start, 1 rule stop, 2 and 3 basic.
/// Edges: 0 -ε-> 2 -ID-> 3 -ε-> 1.
pub(crate) fn single_rule_parser() -> StreamBuilder {
    StreamBuilder::parser(1)
        .state(StateType::RuleStart, 0)
        .state(StateType::RuleStop, 0)
        .state(StateType::Basic, 0)
        .state(StateType::Basic, 0)
        .rule(0)
        .eps(0, 2)
        .atom(2, 3, 1)
        .eps(3, 1)
}

/// `a : b ; b : ID ;`
///
/// Rule `a`: 0 -ε-> 4 -call b-> (follow 7) -ε-> 1.
/// Rule `b`: 2 -ε-> 5 -ID-> 6 -ε-> 3.
pub(crate) fn calling_parser() -> StreamBuilder {
    StreamBuilder::parser(1)
        .state(StateType::RuleStart, 0)
        .state(StateType::RuleStop, 0)
        .state(StateType::RuleStart, 1)
        .state(StateType::RuleStop, 1)
        .state(StateType::Basic, 0)
        .state(StateType::Basic, 1)
        .state(StateType::Basic, 1)
        .state(StateType::Basic, 0)
        .rule(0)
        .rule(2)
        .eps(0, 4)
        .edge(4, 7, TransitionType::Rule, [2, 1, 0])
        .eps(7, 1)
        .eps(2, 5)
        .atom(5, 6, 1)
        .eps(6, 3)
}

/// `e : ID ( OP )* ;` laid out like a left-recursive rule.
///
/// ```text
/// 0 -ε-> 2 -ID-> 3 -ε-> 4 (star loop entry)
/// 4 -ε-> 5 (star block start) -ε-> 6 -OP-> 7 (block end) -ε-> 9 (loop back) -ε-> 4
/// 4 -ε-> 8 (loop end) -ε-> 1 (rule stop)
/// ```
///
/// `greedy = false` swaps the loop entry's branches and marks it non-greedy.
pub(crate) fn star_loop_parser(greedy: bool) -> StreamBuilder {
    let builder = StreamBuilder::parser(2)
        .state(StateType::RuleStart, 0)
        .state(StateType::RuleStop, 0)
        .state(StateType::Basic, 0)
        .state(StateType::Basic, 0)
        .state(StateType::StarLoopEntry, 0)
        .linked_state(StateType::StarBlockStart, 0, 7)
        .state(StateType::Basic, 0)
        .state(StateType::BlockEnd, 0)
        .linked_state(StateType::LoopEnd, 0, 9)
        .state(StateType::StarLoopBack, 0)
        .rule(0)
        .eps(0, 2)
        .atom(2, 3, 1)
        .eps(3, 4);
    let builder = if greedy {
        builder.eps(4, 5).eps(4, 8)
    } else {
        builder.eps(4, 8).eps(4, 5).non_greedy(4)
    };
    builder
        .eps(5, 6)
        .atom(6, 7, 2)
        .eps(7, 9)
        .eps(9, 4)
        .eps(8, 1)
        .decision(4)
        .decision(5)
}

/// Lexer with one rule matching `'a'` as token type 1: 0 -'a'-> 1.
pub(crate) fn single_char_lexer() -> StreamBuilder {
    StreamBuilder::lexer(1)
        .state(StateType::RuleStart, 0)
        .state(StateType::RuleStop, 0)
        .lexer_rule(0, 1)
        .atom(0, 1, i32::from(b'a'))
}
