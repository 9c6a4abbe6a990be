//! Transition resolution - Guard evaluation and next-state selection
//!
//! First-match-wins over the candidate list in declaration order; there is
//! no highest-confidence search. Each candidate is evaluated independently
//! of the others.

use thiserror::Error;

use convo_core::TurnContext;

use super::condition::Condition;
use super::graph::{State, StateGraph, Transition};

/// Error type for a turn no guard matched. Recoverable: the conversation
/// keeps its current state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no transition matched from state {state}")]
    NoTransition { state: String },

    #[error("unknown state: {0}")]
    UnknownState(String),
}

/// Selects the next state for a turn.
#[derive(Debug, Clone)]
pub struct TransitionResolver {
    threshold: f64,
}

impl Default for TransitionResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TransitionResolver {
    /// Resolver with the default threshold: any confidence above zero holds.
    pub fn new() -> Self {
        Self { threshold: 0.0 }
    }

    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Pick the destination state for the current turn.
    ///
    /// Guards only ever see `&TurnContext`; resolution never mutates the
    /// context or the caller's stored state.
    pub async fn resolve<'g>(
        &self,
        graph: &'g StateGraph,
        current: &str,
        ctx: &TurnContext,
    ) -> Result<&'g State, ResolveError> {
        if graph.state(current).is_none() {
            return Err(ResolveError::UnknownState(current.to_string()));
        }

        for transition in graph.transitions_from(current) {
            if self.matches(transition, ctx).await {
                tracing::debug!(from = current, to = transition.dest(), "transition matched");
                return graph
                    .state(transition.dest())
                    .ok_or_else(|| ResolveError::UnknownState(transition.dest().to_string()));
            }
        }

        tracing::debug!(state = current, "no transition matched");
        Err(ResolveError::NoTransition {
            state: current.to_string(),
        })
    }

    async fn matches(&self, transition: &Transition, ctx: &TurnContext) -> bool {
        for condition in transition.conditions() {
            if !self.holds(condition.as_ref(), ctx).await {
                return false;
            }
        }
        for condition in transition.unless_conditions() {
            if self.holds(condition.as_ref(), ctx).await {
                return false;
            }
        }
        true
    }

    async fn holds(&self, condition: &dyn Condition, ctx: &TurnContext) -> bool {
        condition.evaluate(ctx).await.holds(self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use convo_core::ConversationMessage;

    use super::*;
    use crate::machine::condition::{Confidence, FnCondition, LastPayloadEquals};
    use crate::machine::graph::{State, Transition};

    fn saying_goodbye() -> Arc<dyn Condition> {
        Arc::new(LastPayloadEquals::new("goodbye"))
    }

    /// Greeting (initial) / Answering / Goodbye, with a wildcard transition
    /// to Goodbye guarded by the farewell check.
    fn reference_graph() -> StateGraph {
        let goodbye = saying_goodbye();
        StateGraph::build(
            vec![
                State::initial("Greeting", vec![]),
                State::new("Answering", vec![]),
                State::new("Goodbye", vec![]),
            ],
            vec![
                Transition::new("Greeting", "Answering").unless(Arc::clone(&goodbye)),
                Transition::wildcard("Goodbye").when(Arc::clone(&goodbye)),
                Transition::new("Answering", "Answering").unless(goodbye),
            ],
        )
        .unwrap()
    }

    fn ctx_with_payload(payload: &str) -> TurnContext {
        let mut ctx = TurnContext::new("conv-1", "chan-1");
        ctx.push_message(ConversationMessage::user(payload));
        ctx
    }

    #[tokio::test]
    async fn wildcard_goodbye_matches_from_answering() {
        let graph = reference_graph();
        let resolver = TransitionResolver::new();
        let ctx = ctx_with_payload("goodbye");

        let dest = resolver.resolve(&graph, "Answering", &ctx).await.unwrap();
        assert_eq!(dest.name(), "Goodbye");
    }

    #[tokio::test]
    async fn unless_vetoes_greeting_to_answering() {
        let graph = reference_graph();
        let resolver = TransitionResolver::new();

        // "hi" does not trip the farewell guard, so the unless-guarded
        // transition wins over the wildcard.
        let dest = resolver
            .resolve(&graph, "Greeting", &ctx_with_payload("hi"))
            .await
            .unwrap();
        assert_eq!(dest.name(), "Answering");

        let dest = resolver
            .resolve(&graph, "Greeting", &ctx_with_payload("goodbye"))
            .await
            .unwrap();
        assert_eq!(dest.name(), "Goodbye");
    }

    #[tokio::test]
    async fn declaration_order_beats_wildcard() {
        let always: Arc<dyn Condition> =
            Arc::new(FnCondition::new("always", |_: &TurnContext| Confidence::CERTAIN));
        let graph = StateGraph::build(
            vec![
                State::initial("A", vec![]),
                State::new("B", vec![]),
                State::new("C", vec![]),
            ],
            vec![
                Transition::new("A", "B").when(Arc::clone(&always)),
                Transition::wildcard("C").when(always),
            ],
        )
        .unwrap();

        // Both candidates hold; the one declared first is selected.
        let resolver = TransitionResolver::new();
        let ctx = TurnContext::new("conv-1", "chan-1");
        let dest = resolver.resolve(&graph, "A", &ctx).await.unwrap();
        assert_eq!(dest.name(), "B");
    }

    #[tokio::test]
    async fn no_match_reports_no_transition() {
        let graph = reference_graph();
        // From Goodbye only the wildcard is a candidate, and it needs the
        // farewell guard to hold.
        let resolver = TransitionResolver::new();
        let ctx = ctx_with_payload("hello again");

        for _ in 0..3 {
            let err = resolver.resolve(&graph, "Goodbye", &ctx).await.unwrap_err();
            assert_eq!(
                err,
                ResolveError::NoTransition {
                    state: "Goodbye".to_string()
                }
            );
        }
    }

    #[tokio::test]
    async fn unknown_current_state_is_an_error() {
        let graph = reference_graph();
        let resolver = TransitionResolver::new();
        let ctx = ctx_with_payload("hi");

        let err = resolver.resolve(&graph, "Nowhere", &ctx).await.unwrap_err();
        assert_eq!(err, ResolveError::UnknownState("Nowhere".to_string()));
    }

    #[tokio::test]
    async fn threshold_filters_weak_confidence() {
        let weak: Arc<dyn Condition> =
            Arc::new(FnCondition::new("weak", |_: &TurnContext| Confidence::new(0.4)));
        let graph = StateGraph::build(
            vec![State::initial("A", vec![]), State::new("B", vec![])],
            vec![Transition::new("A", "B").when(weak)],
        )
        .unwrap();
        let ctx = TurnContext::new("conv-1", "chan-1");

        let dest = TransitionResolver::new()
            .resolve(&graph, "A", &ctx)
            .await
            .unwrap();
        assert_eq!(dest.name(), "B");

        let err = TransitionResolver::with_threshold(0.5)
            .resolve(&graph, "A", &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NoTransition { .. }));
    }

    #[tokio::test]
    async fn resolution_is_deterministic() {
        let graph = reference_graph();
        let resolver = TransitionResolver::new();
        let ctx = ctx_with_payload("hi");

        let first = resolver
            .resolve(&graph, "Greeting", &ctx)
            .await
            .unwrap()
            .name()
            .to_string();
        for _ in 0..5 {
            let again = resolver.resolve(&graph, "Greeting", &ctx).await.unwrap();
            assert_eq!(again.name(), first);
        }
    }
}
