//! FSM machine module
//!
//! Split into graph definition, guard conditions and transition resolution.

pub mod condition;
pub mod graph;
pub mod resolver;

pub use condition::{Condition, Confidence, FnCondition, LastPayloadEquals, LastPayloadMatches};
pub use graph::{GraphError, State, StateGraph, Transition};
pub use resolver::{ResolveError, TransitionResolver};
