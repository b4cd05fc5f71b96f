//! LL(1) lookahead over the ATN.
//!
//! [`Ll1Analyzer`] computes the set of tokens that can follow a state by
//! walking epsilon edges, entering invoked rules and, when a context is
//! supplied, returning through it. [`AtnLookahead`] layers the parser-facing
//! queries (`next_tokens`, `expected_tokens`) on top.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::trace;

use antlr_atn::token::{EOF, EPSILON, INVALID_TYPE};
use antlr_atn::{Atn, AtnState, IntervalSet, StateId, StateKind, TransitionKind};

use crate::context::{PredictionContext, EMPTY_RETURN_STATE};
use crate::error::PredictionError;
use crate::rule_context::RuleContext;
use crate::stack::ensure_sufficient_stack;

/// Marker added to a lookahead set when the walk stopped at a semantic
/// predicate it was told not to see through.
pub const HIT_PRED: i32 = INVALID_TYPE;

/// Lookahead queries against one ATN.
#[derive(Clone, Copy, Debug)]
pub struct Ll1Analyzer<'a> {
    atn: &'a Atn,
}

impl<'a> Ll1Analyzer<'a> {
    pub fn new(atn: &'a Atn) -> Self {
        Ll1Analyzer { atn }
    }

    /// Tokens that can follow `state`.
    ///
    /// Reaching `stop_state` (or the end of the outermost rule) with no
    /// context adds [`EPSILON`]; with the empty context it adds [`EOF`].
    /// Predicates are passed through as if they held.
    pub fn look(
        &self,
        state: StateId,
        stop_state: Option<StateId>,
        ctx: Option<&Arc<PredictionContext>>,
    ) -> IntervalSet {
        let mut walk = Walk::new(self.atn, stop_state, true, true);
        walk.visit(state, ctx);
        walk.look
    }

    /// Per-alternative lookahead of a decision state.
    ///
    /// An alternative gets `None` when nothing can follow it or when its
    /// lookahead depends on a predicate.
    pub fn decision_lookahead(&self, state: StateId) -> Vec<Option<IntervalSet>> {
        let Some(decision) = self.atn.state(state) else {
            return Vec::new();
        };
        let empty = PredictionContext::empty();
        decision
            .transitions()
            .iter()
            .map(|transition| {
                let mut walk = Walk::new(self.atn, None, false, false);
                walk.visit(transition.target(), Some(&empty));
                let look = walk.look;
                (!look.is_empty() && !look.contains(HIT_PRED)).then_some(look)
            })
            .collect()
    }
}

/// State of one lookahead computation.
struct Walk<'a> {
    atn: &'a Atn,
    stop_state: Option<StateId>,
    see_thru_preds: bool,
    add_eof: bool,
    look: IntervalSet,
    /// `(state, context)` pairs already entered.
    busy: FxHashSet<(StateId, Option<Arc<PredictionContext>>)>,
    /// Rules entered through a rule transition and not yet left.
    called_rules: FxHashSet<usize>,
}

impl<'a> Walk<'a> {
    fn new(atn: &'a Atn, stop_state: Option<StateId>, see_thru_preds: bool, add_eof: bool) -> Self {
        Walk {
            atn,
            stop_state,
            see_thru_preds,
            add_eof,
            look: IntervalSet::new(),
            busy: FxHashSet::default(),
            called_rules: FxHashSet::default(),
        }
    }

    fn visit(&mut self, id: StateId, ctx: Option<&Arc<PredictionContext>>) {
        if !self.busy.insert((id, ctx.cloned())) {
            return;
        }
        let atn = self.atn;
        let Some(state) = atn.state(id) else {
            return;
        };

        let at_rule_stop = matches!(state.kind(), StateKind::RuleStop);
        if Some(id) == self.stop_state || at_rule_stop {
            match ctx {
                None => {
                    self.look.add_one(EPSILON);
                    return;
                }
                Some(ctx) if ctx.is_empty() && self.add_eof => {
                    self.look.add_one(EOF);
                    return;
                }
                _ => {}
            }
        }

        if at_rule_stop {
            if let Some(ctx) = ctx.filter(|ctx| !ctx.is_empty()) {
                self.return_through(state, ctx);
                return;
            }
        }

        for transition in state.transitions() {
            let target = transition.target();
            match transition.kind() {
                TransitionKind::Rule {
                    rule_index,
                    follow_state,
                    ..
                } => {
                    if self.called_rules.contains(rule_index) {
                        continue;
                    }
                    let return_state = i32::try_from(follow_state.index()).unwrap_or(i32::MAX);
                    let callee_ctx = PredictionContext::singleton(ctx.cloned(), return_state);
                    self.called_rules.insert(*rule_index);
                    ensure_sufficient_stack(|| self.visit(target, Some(&callee_ctx)));
                    self.called_rules.remove(rule_index);
                }
                TransitionKind::Predicate { .. } | TransitionKind::Precedence { .. } => {
                    if self.see_thru_preds {
                        ensure_sufficient_stack(|| self.visit(target, ctx));
                    } else {
                        self.look.add_one(HIT_PRED);
                    }
                }
                _ if transition.is_epsilon() => {
                    ensure_sufficient_stack(|| self.visit(target, ctx));
                }
                TransitionKind::Wildcard => {
                    self.look.add_set(&atn.vocabulary());
                }
                TransitionKind::NotSet { set } => {
                    self.look.add_set(&set.complement(&atn.vocabulary()));
                }
                _ => {
                    if let Some(label) = transition.label() {
                        self.look.add_set(&label);
                    }
                }
            }
        }
    }

    /// Leave the current rule through every entry of `ctx`.
    fn return_through(&mut self, stop: &AtnState, ctx: &Arc<PredictionContext>) {
        // The rule being left may be re-entered from its caller.
        let rule = stop.rule_index();
        let was_called = rule.is_some_and(|rule| self.called_rules.remove(&rule));

        for (parent, return_state) in ctx.entries() {
            if return_state == EMPTY_RETURN_STATE {
                if self.add_eof {
                    self.look.add_one(EOF);
                }
                continue;
            }
            let Ok(number) = u32::try_from(return_state) else {
                continue;
            };
            trace!(from = stop.number().raw(), to = number, "returning through context");
            ensure_sufficient_stack(|| self.visit(StateId::new(number), parent.as_ref()));
        }

        if let (true, Some(rule)) = (was_called, rule) {
            self.called_rules.insert(rule);
        }
    }
}

/// Lookahead queries on a loaded [`Atn`].
pub trait AtnLookahead {
    /// Tokens that can follow `state` within its rule, with [`EPSILON`]
    /// standing for "the rule can end here". Computed once per state.
    fn next_tokens_within_rule<'s>(&self, state: &'s AtnState) -> &'s IntervalSet;

    /// Tokens that can follow `state`. Without `ctx` this is
    /// [`next_tokens_within_rule`](Self::next_tokens_within_rule); with one,
    /// rule ends return through the invocation chain and the end of the
    /// outermost rule yields [`EOF`].
    fn next_tokens(
        &self,
        state: &AtnState,
        ctx: Option<&dyn RuleContext>,
    ) -> Result<IntervalSet, PredictionError>;

    /// Tokens a parser at `state` would accept, following rule ends up
    /// through `ctx` while the current position can complete its rule.
    fn expected_tokens(
        &self,
        state: StateId,
        ctx: Option<&dyn RuleContext>,
    ) -> Result<IntervalSet, PredictionError>;
}

impl AtnLookahead for Atn {
    fn next_tokens_within_rule<'s>(&self, state: &'s AtnState) -> &'s IntervalSet {
        state.next_tokens_within_rule_or_init(|| Ll1Analyzer::new(self).look(state.number(), None, None))
    }

    fn next_tokens(
        &self,
        state: &AtnState,
        ctx: Option<&dyn RuleContext>,
    ) -> Result<IntervalSet, PredictionError> {
        match ctx {
            None => Ok(self.next_tokens_within_rule(state).clone()),
            Some(ctx) => {
                let ctx = PredictionContext::from_rule_context(self, ctx)?;
                Ok(Ll1Analyzer::new(self).look(state.number(), None, Some(&ctx)))
            }
        }
    }

    fn expected_tokens(
        &self,
        state: StateId,
        ctx: Option<&dyn RuleContext>,
    ) -> Result<IntervalSet, PredictionError> {
        let state = live_state(self, state)?;
        let mut following = self.next_tokens_within_rule(state);
        if !following.contains(EPSILON) {
            return Ok(following.clone());
        }

        let mut expected = following.clone();
        expected.remove_one(EPSILON);

        let mut frame = ctx;
        while let Some(current) = frame {
            let Some(invoking) = current.invoking_state() else {
                break;
            };
            if !following.contains(EPSILON) {
                break;
            }
            let follow = live_state(self, invoking)?
                .transition(0)
                .and_then(antlr_atn::Transition::follow_state)
                .ok_or(PredictionError::NotRuleInvocation { state: invoking })?;
            following = self.next_tokens_within_rule(live_state(self, follow)?);
            expected.add_set(following);
            expected.remove_one(EPSILON);
            frame = current.parent();
        }

        if following.contains(EPSILON) {
            expected.add_one(EOF);
        }
        Ok(expected)
    }
}

fn live_state(atn: &Atn, id: StateId) -> Result<&AtnState, PredictionError> {
    atn.state(id)
        .ok_or(PredictionError::InvalidStateNumber { number: id.raw() })
}
