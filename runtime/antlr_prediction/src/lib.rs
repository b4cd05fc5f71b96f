//! Prediction-time data structures for the ANTLR runtime.
//!
//! - **Contexts** ([`PredictionContext`]): immutable, `Arc`-shared graphs
//!   standing for sets of rule invocation stacks.
//!
//! - **Merge** ([`merge`], [`MergeCache`]): union of two context graphs,
//!   either exact (full-context prediction) or with the empty context as a
//!   wildcard (local prediction).
//!
//! - **Interning** ([`PredictionContextCache`]): a lock-protected set of
//!   canonical contexts that several parses may share.
//!
//! - **Lookahead** ([`Ll1Analyzer`], [`AtnLookahead`]): FIRST/FOLLOW sets
//!   over a loaded [`antlr_atn::Atn`].
//!
//! A merge cache belongs to one parse; the context cache and the ATN may be
//! shared across threads.

mod context;
mod context_cache;
mod error;
mod ll1;
mod merge;
mod merge_cache;
mod rule_context;
mod stack;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "tests panic on unexpected state")]
mod test_helpers;

pub use context::{ContextKind, PredictionContext, EMPTY_RETURN_STATE};
pub use context_cache::{all_context_nodes, PredictionContextCache, VisitedContexts};
pub use error::PredictionError;
pub use ll1::{AtnLookahead, Ll1Analyzer, HIT_PRED};
pub use merge::merge;
pub use merge_cache::MergeCache;
pub use rule_context::{InvocationFrame, RuleContext};
