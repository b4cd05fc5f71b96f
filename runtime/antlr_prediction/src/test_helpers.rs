//! Shared test utilities: tracing setup, context shorthands and small
//! ATNs loaded from hand-written serialized streams.

use std::sync::{Arc, Once};

use antlr_atn::{
    deserialize, encode, Atn, GrammarType, StateId, StateType, TransitionType,
    SERIALIZED_IDENTIFIER, SERIALIZED_VERSION,
};

use crate::context::PredictionContext;

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

pub(crate) fn s(n: u32) -> StateId {
    StateId::new(n)
}

pub(crate) fn empty() -> Arc<PredictionContext> {
    PredictionContext::empty()
}

/// `return_state` pushed on `parent`.
pub(crate) fn push(parent: &Arc<PredictionContext>, return_state: i32) -> Arc<PredictionContext> {
    PredictionContext::singleton(Some(Arc::clone(parent)), return_state)
}

/// A single stack, innermost return state first, over `$`.
pub(crate) fn stack(return_states: &[i32]) -> Arc<PredictionContext> {
    return_states
        .iter()
        .rev()
        .fold(empty(), |parent, &return_state| push(&parent, return_state))
}

// ── ATN fixtures ────────────────────────────────────────────────────

/// Writes a serialized ATN section by section and loads it. States are
/// numbered in the order they are added; edges may name later states.
///
/// Rule stop states get their return edges from the loader, so fixtures
/// list only the forward edges.
pub(crate) struct AtnBuilder {
    grammar: GrammarType,
    max_token_type: i32,
    states: Vec<Vec<i32>>,
    rules: Vec<Vec<i32>>,
    edges: Vec<[i32; 6]>,
    decisions: Vec<i32>,
}

impl AtnBuilder {
    pub(crate) fn parser(max_token_type: i32) -> Self {
        AtnBuilder {
            grammar: GrammarType::Parser,
            max_token_type,
            states: Vec::new(),
            rules: Vec::new(),
            edges: Vec::new(),
            decisions: Vec::new(),
        }
    }

    pub(crate) fn lexer(max_token_type: i32) -> Self {
        AtnBuilder {
            grammar: GrammarType::Lexer,
            ..Self::parser(max_token_type)
        }
    }

    pub(crate) fn state(mut self, state_type: StateType, rule: i32) -> Self {
        self.states.push(vec![state_type.code(), rule]);
        self
    }

    pub(crate) fn basic(self, rule: i32) -> Self {
        self.state(StateType::Basic, rule)
    }

    /// A block start whose matching block end is state `end`.
    pub(crate) fn block_start(mut self, rule: i32, end: i32) -> Self {
        self.states.push(vec![StateType::BlockStart.code(), rule, end]);
        self
    }

    /// Rule start and stop states for the next rule, added in that order.
    /// Lexer rules match `token_type`.
    pub(crate) fn rule(mut self, token_type: Option<i32>) -> Self {
        let rule = i32::try_from(self.rules.len()).unwrap();
        let start = i32::try_from(self.states.len()).unwrap();
        self.rules.push(std::iter::once(start).chain(token_type).collect());
        self.state(StateType::RuleStart, rule)
            .state(StateType::RuleStop, rule)
    }

    pub(crate) fn edge(mut self, src: i32, trg: i32, transition_type: TransitionType, args: [i32; 3]) -> Self {
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

    /// `src` calls `rule`, whose start state is `start`, continuing at
    /// `follow`.
    pub(crate) fn call(self, src: i32, start: i32, rule: i32, follow: i32) -> Self {
        self.edge(src, follow, TransitionType::Rule, [start, rule, 0])
    }

    pub(crate) fn predicate(self, src: i32, trg: i32, rule: i32) -> Self {
        self.edge(src, trg, TransitionType::Predicate, [rule, 0, 0])
    }

    pub(crate) fn decision(mut self, state: i32) -> Self {
        self.decisions.push(state);
        self
    }

    fn values(&self) -> Vec<i32> {
        let len = |n: usize| i32::try_from(n).unwrap();
        let mut v = vec![SERIALIZED_VERSION];
        v.extend(identifier_units(SERIALIZED_IDENTIFIER));
        v.extend([self.grammar.code(), self.max_token_type]);

        v.push(len(self.states.len()));
        v.extend(self.states.iter().flatten());
        v.extend([0, 0]); // non-greedy, precedence
        v.push(len(self.rules.len()));
        v.extend(self.rules.iter().flatten());
        v.push(0); // modes
        v.push(0); // sets
        v.push(len(self.edges.len()));
        v.extend(self.edges.iter().flatten());
        v.push(len(self.decisions.len()));
        v.extend(&self.decisions);
        if self.grammar == GrammarType::Lexer {
            v.push(0); // lexer actions
        }
        v
    }

    pub(crate) fn build(&self) -> Atn {
        deserialize(&encode(&self.values())).expect("fixture stream loads")
    }
}

/// The eight 16-bit units of a serialized identifier, least significant
/// first.
fn identifier_units(identifier: &str) -> Vec<i32> {
    let hex: String = identifier.chars().filter(|c| *c != '-').collect();
    let bits = u128::from_str_radix(&hex, 16).unwrap();
    (0..8)
        .map(|i| i32::try_from((bits >> (16 * i)) & 0xFFFF).unwrap())
        .collect()
}

/// `a : b ; b : ID ;` with `ID = 1`.
///
/// ```text
/// a: 0 -ε-> 4 -call b-> 2 ... 3 -ε-> 7 -ε-> 1
/// b: 2 -ε-> 5 -ID-> 6 -ε-> 3
/// ```
pub(crate) fn calling_parser() -> Atn {
    AtnBuilder::parser(1)
        .rule(None)
        .rule(None)
        .basic(0)
        .basic(1)
        .basic(1)
        .basic(0)
        .eps(0, 4)
        .call(4, 2, 1, 7)
        .eps(7, 1)
        .eps(2, 5)
        .atom(5, 6, 1)
        .eps(6, 3)
        .build()
}

/// `a : ID | {p}? OP | ;` with `ID = 1`, `OP = 2`.
///
/// ```text
/// 0 -ε-> 2 (block start, decision 0)
/// 2 -ε-> 3 -ID-> 6
/// 2 -ε-> 4 -{p}?-> 5 -OP-> 6
/// 2 -ε-> 7 -ε-> 6
/// 6 (block end) -ε-> 1
/// ```
pub(crate) fn alternatives_parser() -> Atn {
    AtnBuilder::parser(2)
        .rule(None)
        .block_start(0, 6)
        .basic(0)
        .basic(0)
        .basic(0)
        .state(StateType::BlockEnd, 0)
        .basic(0)
        .eps(0, 2)
        .eps(2, 3)
        .eps(2, 4)
        .eps(2, 7)
        .atom(3, 6, 1)
        .predicate(4, 5, 0)
        .atom(5, 6, 2)
        .eps(7, 6)
        .eps(6, 1)
        .decision(2)
        .build()
}

/// `e : ( e OP )? ID ;` where the recursive call is the first option.
///
/// ```text
/// 0 -ε-> 6 (block start, decision 0)
/// 6 -ε-> 2 -call e-> 0 ... 1 -ε-> 3 -OP-> 4
/// 6 -ε-> 4 -ID-> 5 -ε-> 7 (block end) -ε-> 1
/// ```
pub(crate) fn left_recursive_parser() -> Atn {
    AtnBuilder::parser(2)
        .rule(None)
        .basic(0)
        .basic(0)
        .basic(0)
        .basic(0)
        .block_start(0, 7)
        .state(StateType::BlockEnd, 0)
        .eps(0, 6)
        .eps(6, 2)
        .eps(6, 4)
        .call(2, 0, 0, 3)
        .atom(3, 4, 2)
        .atom(4, 5, 1)
        .eps(5, 7)
        .eps(7, 1)
        .decision(6)
        .build()
}

/// Lexer rule `A : 'a' ;` with token type 1: 0 -'a'-> 1.
pub(crate) fn single_char_lexer() -> Atn {
    AtnBuilder::lexer(1)
        .rule(Some(1))
        .atom(0, 1, i32::from(b'a'))
        .build()
}
