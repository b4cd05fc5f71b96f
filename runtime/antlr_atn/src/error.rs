//! Errors raised while loading a serialized ATN.
//!
//! Every variant is fatal for the load in progress: the deserializer never
//! hands out a partially linked graph.

use thiserror::Error;

use crate::state::StateId;

/// Failure to decode or validate a serialized ATN.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[must_use = "errors must not be silently ignored"]
pub enum DeserializeError {
    /// The stream was written by an unsupported format version.
    #[error("could not deserialize ATN with version {found} (expected {expected})")]
    UnsupportedVersion { found: i32, expected: i32 },

    /// The format identifier is not one this runtime understands.
    #[error("could not deserialize ATN with identifier {found} (expected {expected} or a legacy identifier)")]
    UnsupportedIdentifier { found: String, expected: &'static str },

    #[error("the specified state type {code} is not valid (state {index})")]
    InvalidStateType { code: i32, index: usize },

    #[error("the specified transition type {code} is not valid")]
    InvalidTransitionType { code: i32 },

    #[error("the specified lexer action type {code} is not valid")]
    InvalidLexerActionType { code: i32 },

    #[error("the specified grammar type {code} is not valid")]
    InvalidGrammarType { code: i32 },

    /// The stream ended before the declared content was read.
    #[error("serialized ATN ended unexpectedly at position {position}")]
    UnexpectedEnd { position: usize },

    /// A state, rule, or set number is out of range or names a removed state.
    #[error("serialized ATN references missing {what} {number}")]
    InvalidReference { what: &'static str, number: i32 },

    /// A state reference resolved to a state of the wrong kind.
    #[error("state {state:?} is not a {expected}")]
    UnexpectedStateKind {
        state: StateId,
        expected: &'static str,
    },

    /// Structural verification failed.
    #[error("ATN structural invariant violated at state {state:?}: {reason}")]
    StructuralInvariantViolation {
        state: StateId,
        reason: &'static str,
    },

    /// The end of a precedence rule's prefix could not be located.
    #[error("couldn't identify final state of the precedence rule prefix section for rule {rule}")]
    BypassSynthesis { rule: usize },
}
