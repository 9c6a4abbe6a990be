//! Action module - Response-producing actions bound to FSM states
//!
//! An action is a cooperative producer: it emits zero or more layers through
//! a bounded channel and suspends when the consumer lags. Generator-style
//! suspension is modeled with the channel, not language generators.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::context::TurnContext;
use crate::layer::Layer;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("action {action} failed: {message}")]
    Failed { action: String, message: String },

    #[error("layer emitter closed")]
    EmitterClosed,
}

impl ActionError {
    pub fn failed(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            action: action.into(),
            message: message.into(),
        }
    }
}

/// Sending half handed to an action while it runs.
pub struct LayerEmitter {
    tx: mpsc::Sender<Layer>,
}

impl LayerEmitter {
    pub fn new(tx: mpsc::Sender<Layer>) -> Self {
        Self { tx }
    }

    /// Emit one layer; suspends while the executor's collection loop is busy.
    pub async fn layer(&self, layer: Layer) -> Result<(), ActionError> {
        self.tx
            .send(layer)
            .await
            .map_err(|_| ActionError::EmitterClosed)
    }
}

/// A response-producing action bound to a state.
///
/// Actions of one state run sequentially, in declaration order; a single
/// action never runs in parallel with another of the same turn.
#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &mut TurnContext, out: &LayerEmitter) -> Result<(), ActionError>;
}
