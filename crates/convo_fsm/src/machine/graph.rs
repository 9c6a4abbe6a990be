//! State graph - Immutable FSM definition
//!
//! States own their bound actions; transitions reference states by name and
//! keep their declaration order as priority. The graph is validated once at
//! build time and never mutated afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use convo_core::Action;

use super::condition::Condition;

/// Error type for malformed graph definitions. Fatal at load time.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("graph declares no initial state")]
    NoInitialState,

    #[error("multiple initial states: {first} and {second}")]
    MultipleInitialStates { first: String, second: String },

    #[error("duplicate state name: {0}")]
    DuplicateState(String),

    #[error("transition references unknown state: {0}")]
    UnknownState(String),
}

/// A named conversational state with its ordered response actions.
pub struct State {
    name: String,
    actions: Vec<Arc<dyn Action>>,
    initial: bool,
}

impl State {
    pub fn new(name: impl Into<String>, actions: Vec<Arc<dyn Action>>) -> Self {
        Self {
            name: name.into(),
            actions,
            initial: false,
        }
    }

    /// Marks this state as the graph's entry point. Exactly one state per
    /// graph may be initial.
    pub fn initial(name: impl Into<String>, actions: Vec<Arc<dyn Action>>) -> Self {
        Self {
            name: name.into(),
            actions,
            initial: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn actions(&self) -> &[Arc<dyn Action>] {
        &self.actions
    }

    pub fn is_initial(&self) -> bool {
        self.initial
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("name", &self.name)
            .field("actions", &self.actions.len())
            .field("initial", &self.initial)
            .finish()
    }
}

/// A guarded edge between states.
///
/// `source` of `None` is a wildcard: the transition is a candidate from any
/// current state. All `conditions` must hold and no `unless` guard may hold
/// for the transition to match.
pub struct Transition {
    source: Option<String>,
    dest: String,
    conditions: Vec<Arc<dyn Condition>>,
    unless: Vec<Arc<dyn Condition>>,
}

impl Transition {
    pub fn new(source: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            dest: dest.into(),
            conditions: Vec::new(),
            unless: Vec::new(),
        }
    }

    /// Transition that matches from any current state.
    pub fn wildcard(dest: impl Into<String>) -> Self {
        Self {
            source: None,
            dest: dest.into(),
            conditions: Vec::new(),
            unless: Vec::new(),
        }
    }

    pub fn when(mut self, condition: Arc<dyn Condition>) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn unless(mut self, condition: Arc<dyn Condition>) -> Self {
        self.unless.push(condition);
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn dest(&self) -> &str {
        &self.dest
    }

    pub fn conditions(&self) -> &[Arc<dyn Condition>] {
        &self.conditions
    }

    pub fn unless_conditions(&self) -> &[Arc<dyn Condition>] {
        &self.unless
    }
}

impl std::fmt::Debug for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transition")
            .field("source", &self.source)
            .field("dest", &self.dest)
            .field("conditions", &self.conditions.len())
            .field("unless", &self.unless.len())
            .finish()
    }
}

/// Validated, immutable FSM definition.
#[derive(Debug)]
pub struct StateGraph {
    states: Vec<State>,
    by_name: HashMap<String, usize>,
    transitions: Vec<Transition>,
    initial: usize,
}

impl StateGraph {
    /// Validate and freeze a graph definition.
    pub fn build(states: Vec<State>, transitions: Vec<Transition>) -> Result<Self, GraphError> {
        let mut by_name = HashMap::with_capacity(states.len());
        for (index, state) in states.iter().enumerate() {
            if by_name.insert(state.name().to_string(), index).is_some() {
                return Err(GraphError::DuplicateState(state.name().to_string()));
            }
        }

        let mut initial = None;
        for state in &states {
            if !state.is_initial() {
                continue;
            }
            match initial {
                None => initial = Some(by_name[state.name()]),
                Some(first) => {
                    return Err(GraphError::MultipleInitialStates {
                        first: states[first].name().to_string(),
                        second: state.name().to_string(),
                    })
                }
            }
        }
        let initial = initial.ok_or(GraphError::NoInitialState)?;

        for transition in &transitions {
            if let Some(source) = transition.source() {
                if !by_name.contains_key(source) {
                    return Err(GraphError::UnknownState(source.to_string()));
                }
            }
            if !by_name.contains_key(transition.dest()) {
                return Err(GraphError::UnknownState(transition.dest().to_string()));
            }
        }

        tracing::debug!(
            states = states.len(),
            transitions = transitions.len(),
            initial = %states[initial].name(),
            "state graph built"
        );

        Ok(Self {
            states,
            by_name,
            transitions,
            initial,
        })
    }

    pub fn initial_state(&self) -> &State {
        &self.states[self.initial]
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.by_name.get(name).map(|&index| &self.states[index])
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    /// Candidate transitions from `state`, in declaration order.
    ///
    /// Wildcard transitions interleave with state-specific ones exactly as
    /// authored; no reordering happens here.
    pub fn transitions_from<'a>(&'a self, state: &'a str) -> impl Iterator<Item = &'a Transition> {
        self.transitions
            .iter()
            .filter(move |transition| match transition.source() {
                Some(source) => source == state,
                None => true,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(name: &str) -> State {
        State::new(name, vec![])
    }

    #[test]
    fn build_requires_exactly_one_initial() {
        let err = StateGraph::build(vec![state("A"), state("B")], vec![]).unwrap_err();
        assert!(matches!(err, GraphError::NoInitialState));

        let err = StateGraph::build(
            vec![State::initial("A", vec![]), State::initial("B", vec![])],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::MultipleInitialStates { .. }));

        let graph =
            StateGraph::build(vec![State::initial("A", vec![]), state("B")], vec![]).unwrap();
        assert_eq!(graph.initial_state().name(), "A");
    }

    #[test]
    fn build_rejects_duplicate_names() {
        let err = StateGraph::build(vec![State::initial("A", vec![]), state("A")], vec![])
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateState(name) if name == "A"));
    }

    #[test]
    fn build_rejects_unknown_endpoints() {
        let err = StateGraph::build(
            vec![State::initial("A", vec![])],
            vec![Transition::new("A", "Missing")],
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::UnknownState(name) if name == "Missing"));

        let err = StateGraph::build(
            vec![State::initial("A", vec![])],
            vec![Transition::new("Ghost", "A")],
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::UnknownState(name) if name == "Ghost"));

        // Wildcard source is always known.
        StateGraph::build(
            vec![State::initial("A", vec![])],
            vec![Transition::wildcard("A")],
        )
        .unwrap();
    }

    #[test]
    fn transitions_from_preserves_declaration_order() {
        let graph = StateGraph::build(
            vec![State::initial("A", vec![]), state("B"), state("C")],
            vec![
                Transition::new("A", "B"),
                Transition::wildcard("C"),
                Transition::new("A", "C"),
                Transition::new("B", "C"),
            ],
        )
        .unwrap();

        let from_a: Vec<_> = graph.transitions_from("A").map(Transition::dest).collect();
        assert_eq!(from_a, vec!["B", "C", "C"]);

        let from_b: Vec<_> = graph.transitions_from("B").map(Transition::dest).collect();
        assert_eq!(from_b, vec!["C", "C"]);
    }
}
