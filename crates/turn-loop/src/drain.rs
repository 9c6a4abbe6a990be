//! Layer drain protocol - Turns one layer into a lazy stream of frames
//!
//! Immediate layers resolve to a single final frame. Deferred layers claim
//! the turn's channel slot, dispatch their request to the inference
//! collaborator and then stream frames out of published result batches until
//! the first record marked final; later batches on the channel belong to a
//! subsequent request and are never consumed here.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use futures::Stream;
use serde_json::{json, Value};

use convo_core::{
    GeneratedLayer, InferenceClient, InferenceRequest, Layer, LayerFrame, ResultRecord,
    TurnContext,
};

use crate::error::TurnError;
use crate::multiplexer::{CorrelationError, ResponseMultiplexer};

pub type FrameStream<'a> = Pin<Box<dyn Stream<Item = Result<LayerFrame, TurnError>> + Send + 'a>>;

/// Ids identifying the turn a drained layer belongs to.
#[derive(Debug, Clone)]
pub struct TurnData {
    pub conversation_id: String,
    pub channel_id: String,
}

impl TurnData {
    pub fn from_context(ctx: &TurnContext) -> Self {
        Self {
            conversation_id: ctx.conversation_id.clone(),
            channel_id: ctx.channel_id.clone(),
        }
    }
}

/// Drains layers against the multiplexer and the inference collaborator.
pub struct LayerDrainer {
    multiplexer: Arc<ResponseMultiplexer>,
    inference: Arc<dyn InferenceClient>,
    response_timeout: Duration,
}

impl LayerDrainer {
    pub fn new(
        multiplexer: Arc<ResponseMultiplexer>,
        inference: Arc<dyn InferenceClient>,
        response_timeout: Duration,
    ) -> Self {
        Self {
            multiplexer,
            inference,
            response_timeout,
        }
    }

    /// Lazy `(payload, is_final)` sequence for one layer, already wrapped
    /// with the layer's type tag and feedback metadata.
    pub fn drain<'a>(&'a self, layer: Layer, turn: &'a TurnData) -> FrameStream<'a> {
        let tag = layer.type_tag();
        let allow_feedback = layer.allow_feedback();

        match layer {
            Layer::Text(text) => {
                let frame = LayerFrame::new(tag, allow_feedback, text.payload, true);
                Box::pin(try_stream! {
                    yield frame;
                })
            }
            Layer::Generated(generated) => {
                self.drain_generated(generated, tag, allow_feedback, turn)
            }
        }
    }

    fn drain_generated<'a>(
        &'a self,
        generated: GeneratedLayer,
        tag: &'static str,
        allow_feedback: bool,
        turn: &'a TurnData,
    ) -> FrameStream<'a> {
        Box::pin(try_stream! {
            // Claim the channel before dispatching so a batch can never
            // arrive with no registered waiter.
            let mut waiter = self.multiplexer.register(&turn.channel_id)?;

            let request =
                InferenceRequest::for_layer(&generated, &turn.conversation_id, &turn.channel_id);
            self.inference.dispatch(request).await?;
            log::debug!("[{}] waiting for generation results", turn.channel_id);

            let mut final_seen = false;
            while !final_seen {
                let next = tokio::time::timeout(self.response_timeout, waiter.next_batch()).await;
                let batch = match next {
                    Ok(Some(batch)) => Ok(batch),
                    Ok(None) => Err(TurnError::Correlation(CorrelationError::WaiterGone(
                        turn.channel_id.clone(),
                    ))),
                    Err(_) => Err(TurnError::CollaboratorTimeout {
                        channel: turn.channel_id.clone(),
                        timeout: self.response_timeout,
                    }),
                }?;

                for record in batch {
                    final_seen = record.is_final;
                    yield generated_frame(&generated, tag, allow_feedback, record);
                    if final_seen {
                        break;
                    }
                }
            }

            log::debug!("[{}] generation finished", turn.channel_id);
        })
    }
}

fn generated_frame(
    generated: &GeneratedLayer,
    tag: &'static str,
    allow_feedback: bool,
    record: ResultRecord,
) -> LayerFrame {
    let ResultRecord {
        message_id,
        mut payload,
        is_final,
    } = record;

    if let Value::Object(map) = &mut payload {
        map.insert("config_name".to_string(), json!(generated.config_name));
        map.insert("message_id".to_string(), json!(message_id));
    }

    LayerFrame::new(tag, allow_feedback, payload, is_final)
}
