//! ATN model and binary loader for the ANTLR runtime.
//!
//! This crate provides:
//!
//! - **Graph model** ([`Atn`], [`AtnState`], [`Transition`]): an arena of
//!   states addressed by [`StateId`], with typed payloads for every state
//!   and transition variant the grammar compiler emits.
//!
//! - **Deserialization** ([`deserialize`], [`AtnDeserializer`]): decodes
//!   the 16-bit integer stream embedded in generated recognizers, links
//!   the graph, verifies its structure and optionally synthesizes rule
//!   bypass transitions.
//!
//! - **Serialization** ([`serialize`]): the inverse encoding, used to
//!   round-trip graphs and to build test fixtures.
//!
//! - **Interval sets** ([`IntervalSet`]): the token-type sets labelling
//!   set transitions and produced by lookahead analysis.
//!
//! # Sharing
//!
//! A loaded [`Atn`] is never mutated again. The one lazily computed field
//! (per-state lookahead) is published through a `OnceLock`, so an `Atn`
//! can be shared across threads behind an `Arc`.
//!
//! Enable `RUST_LOG=antlr_atn=debug` to trace loading.

mod atn;
mod deserializer;
mod error;
mod interval_set;
mod lexer_action;
mod options;
mod serializer;
mod state;
pub mod token;
mod transition;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "tests panic on unexpected state")]
mod test_helpers;

pub use atn::{Atn, GrammarType};
pub use deserializer::{
    deserialize, is_feature_supported, verify_atn, AtnDeserializer, ADDED_LEXER_ACTIONS,
    ADDED_PRECEDENCE_TRANSITIONS, BASE_SERIALIZED_IDENTIFIER, SERIALIZED_IDENTIFIER,
    SERIALIZED_VERSION, SUPPORTED_IDENTIFIERS,
};
pub use error::DeserializeError;
pub use interval_set::{Interval, IntervalSet};
pub use lexer_action::{LexerAction, LexerActionType};
pub use options::DeserializationOptions;
pub use serializer::{encode, serialize};
pub use state::{AtnState, BlockStartKind, StateId, StateKind, StateType};
pub use transition::{Transition, TransitionKind, TransitionType};
