//! Rule invocation chains.
//!
//! A parser keeps one context object per active rule invocation, each
//! pointing at its caller. Prediction only needs two facts per frame: the
//! caller, and the ATN state that made the call.

use std::sync::Arc;

use antlr_atn::StateId;

/// One frame of a live rule invocation chain.
pub trait RuleContext {
    /// The invoking frame, `None` for the outermost rule.
    fn parent(&self) -> Option<&dyn RuleContext>;

    /// State holding the rule transition that created this frame, `None`
    /// for the outermost rule.
    fn invoking_state(&self) -> Option<StateId>;
}

/// Minimal [`RuleContext`]: an immutable, `Arc`-linked call chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvocationFrame {
    parent: Option<Arc<InvocationFrame>>,
    invoking_state: Option<StateId>,
}

impl InvocationFrame {
    /// The outermost frame.
    pub fn root() -> Arc<Self> {
        Arc::new(InvocationFrame {
            parent: None,
            invoking_state: None,
        })
    }

    /// A frame for a rule invoked from `invoking_state` while `parent` was
    /// the active frame.
    pub fn push(parent: &Arc<Self>, invoking_state: StateId) -> Arc<Self> {
        Arc::new(InvocationFrame {
            parent: Some(Arc::clone(parent)),
            invoking_state: Some(invoking_state),
        })
    }

    /// Number of frames up to and including the root.
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut frame = self;
        while let Some(parent) = &frame.parent {
            depth += 1;
            frame = parent;
        }
        depth
    }
}

impl RuleContext for InvocationFrame {
    fn parent(&self) -> Option<&dyn RuleContext> {
        self.parent.as_deref().map(|p| p as &dyn RuleContext)
    }

    fn invoking_state(&self) -> Option<StateId> {
        self.invoking_state
    }
}
