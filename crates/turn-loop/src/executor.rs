//! Event executor - Runs a state's bound actions
//!
//! Actions run sequentially in declaration order. Each action emits layers
//! through a bounded channel while the executor's collection loop consumes
//! them in the same task, so production stays cooperative and ordered.

use tokio::sync::mpsc;

use convo_core::{ActionError, Layer, LayerEmitter, TurnContext};
use convo_fsm::State;

/// Layers emitted by a state's actions, plus the first action failure if any.
///
/// Layers emitted before a failure are kept: they are still drained and
/// delivered before the error is surfaced.
pub struct ExecutionOutput {
    pub layers: Vec<Layer>,
    pub error: Option<ActionError>,
}

pub struct EventExecutor {
    emitter_capacity: usize,
}

impl EventExecutor {
    pub fn new(emitter_capacity: usize) -> Self {
        // mpsc::channel panics on a zero capacity
        Self {
            emitter_capacity: emitter_capacity.max(1),
        }
    }

    /// Invoke every action bound to `state`, collecting emitted layers.
    ///
    /// A failing action stops its own emission and skips the remaining
    /// actions of the state; the error travels in the output rather than
    /// short-circuiting, so the caller can deliver partial output first.
    pub async fn execute(&self, state: &State, ctx: &mut TurnContext) -> ExecutionOutput {
        let mut layers = Vec::new();
        let mut error = None;

        for action in state.actions() {
            let (tx, mut rx) = mpsc::channel(self.emitter_capacity);

            let produced = async {
                let emitter = LayerEmitter::new(tx);
                action.run(&mut *ctx, &emitter).await
                // emitter drops here, closing the channel
            };
            let collected = async {
                let mut emitted = Vec::new();
                while let Some(layer) = rx.recv().await {
                    emitted.push(layer);
                }
                emitted
            };

            let (result, emitted) = tokio::join!(produced, collected);
            let emitted_count = emitted.len();
            layers.extend(emitted);

            match result {
                Ok(()) => {
                    log::debug!(
                        "[{}] action {} emitted {} layer(s)",
                        ctx.channel_id,
                        action.name(),
                        emitted_count
                    );
                }
                Err(action_error) => {
                    log::warn!(
                        "[{}] action {} failed after {} layer(s): {}",
                        ctx.channel_id,
                        action.name(),
                        emitted_count,
                        action_error
                    );
                    error = Some(action_error);
                    break;
                }
            }
        }

        ExecutionOutput { layers, error }
    }
}
