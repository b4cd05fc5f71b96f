//! Errors raised by context conversion and lookahead queries.

use thiserror::Error;

use antlr_atn::StateId;

/// Failure to interpret a rule invocation chain against an ATN.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[must_use = "errors must not be silently ignored"]
pub enum PredictionError {
    /// The state number is out of range or names a removed state.
    #[error("invalid state number {number}")]
    InvalidStateNumber { number: u32 },

    /// An invoking state does not start with a rule transition.
    #[error("state {state:?} does not invoke a rule")]
    NotRuleInvocation { state: StateId },
}
