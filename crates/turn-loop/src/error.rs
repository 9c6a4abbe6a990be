use std::time::Duration;

use thiserror::Error;

use convo_core::{ActionError, InferenceError};
use convo_fsm::ResolveError;

use crate::multiplexer::CorrelationError;

/// Turn-level error. Partial output already forwarded to the transport is
/// never retracted; the turn simply ends failed.
#[derive(Error, Debug)]
pub enum TurnError {
    /// No guard matched; the conversation keeps its current state.
    #[error("unhandled turn: {0}")]
    Unhandled(#[from] ResolveError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    #[error("inference dispatch failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("collaborator timed out after {timeout:?} on channel {channel}")]
    CollaboratorTimeout { channel: String, timeout: Duration },

    #[error("transport closed")]
    TransportClosed,

    #[error("cancelled")]
    Cancelled,
}

impl TurnError {
    /// Whether the turn was merely unhandled rather than broken.
    pub fn is_unhandled(&self) -> bool {
        matches!(self, TurnError::Unhandled(ResolveError::NoTransition { .. }))
    }
}

pub type Result<T> = std::result::Result<T, TurnError>;
