//! convo_fsm - State machine definitions for conversational flows
//!
//! This crate provides the immutable FSM definition layer: states with bound
//! actions, guarded transitions with declaration-order priority, and the
//! resolver that picks the next state for a turn.

pub mod machine;

// Re-export commonly used types
pub use machine::{
    Condition, Confidence, FnCondition, GraphError, LastPayloadEquals, LastPayloadMatches,
    ResolveError, State, StateGraph, Transition, TransitionResolver,
};
