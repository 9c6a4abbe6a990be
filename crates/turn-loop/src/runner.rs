//! FSM runner - Orchestrates one conversational turn
//!
//! Resolve the transition, run the destination state's actions, drain every
//! emitted layer and forward the frames to the transport. The conversation's
//! FSM state moves at resolution time and persists across turns; a later
//! failure of the same turn never rolls it back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use convo_core::{ConversationMessage, InferenceClient, LayerFrame, TurnContext};
use convo_fsm::{StateGraph, TransitionResolver};

use crate::config::TurnLoopConfig;
use crate::drain::{LayerDrainer, TurnData};
use crate::error::TurnError;
use crate::executor::EventExecutor;
use crate::multiplexer::ResponseMultiplexer;

/// Phases of one turn. `Completed` and `Failed` are terminal for the turn
/// only; the conversation's FSM state persists independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Idle,
    Resolving,
    Executing,
    Draining,
    Completed,
    Failed,
}

impl TurnPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, TurnPhase::Completed | TurnPhase::Failed)
    }

    fn may_advance(self, next: TurnPhase) -> bool {
        use TurnPhase::*;
        matches!(
            (self, next),
            (Idle, Resolving)
                | (Resolving, Executing)
                | (Resolving, Failed)
                | (Executing, Draining)
                | (Draining, Completed)
                | (Draining, Failed)
        )
    }
}

/// Ordered phase history of one turn.
struct PhaseTrace {
    phases: Vec<TurnPhase>,
}

impl PhaseTrace {
    fn start() -> Self {
        Self {
            phases: vec![TurnPhase::Idle],
        }
    }

    fn current(&self) -> TurnPhase {
        *self.phases.last().unwrap_or(&TurnPhase::Idle)
    }

    fn advance(&mut self, next: TurnPhase) {
        debug_assert!(
            self.current().may_advance(next),
            "invalid turn phase transition {:?} -> {:?}",
            self.current(),
            next
        );
        self.phases.push(next);
    }
}

/// Inbound turn event from the conversation/transport collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnEvent {
    pub conversation_id: String,
    pub channel_id: String,
    /// Payload of the user message that triggered the turn.
    pub payload: Value,
}

impl TurnEvent {
    pub fn new(
        conversation_id: impl Into<String>,
        channel_id: impl Into<String>,
        payload: impl Into<Value>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            channel_id: channel_id.into(),
            payload: payload.into(),
        }
    }
}

/// Outcome of one turn.
#[derive(Debug)]
pub struct TurnReport {
    pub conversation_id: String,
    pub channel_id: String,
    /// FSM state the conversation occupies after the turn.
    pub state: String,
    /// Terminal phase of the turn.
    pub phase: TurnPhase,
    /// Full phase history, `Idle` first.
    pub phases: Vec<TurnPhase>,
    pub frames_sent: usize,
    pub error: Option<TurnError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TurnReport {
    pub fn is_completed(&self) -> bool {
        self.phase == TurnPhase::Completed
    }

    /// Turn ended without a matching transition; nothing else went wrong.
    pub fn is_unhandled(&self) -> bool {
        self.error
            .as_ref()
            .map(TurnError::is_unhandled)
            .unwrap_or(false)
    }
}

/// Drives turns against one state graph.
///
/// `handle_turn` takes `&self`: turns of distinct conversations may run
/// concurrently, each with its own context and channel.
pub struct FsmRunner {
    graph: Arc<StateGraph>,
    resolver: TransitionResolver,
    executor: EventExecutor,
    drainer: LayerDrainer,
    conversation_states: DashMap<String, String>,
}

impl FsmRunner {
    pub fn new(
        graph: Arc<StateGraph>,
        inference: Arc<dyn InferenceClient>,
        multiplexer: Arc<ResponseMultiplexer>,
        config: TurnLoopConfig,
    ) -> Self {
        Self {
            graph,
            resolver: TransitionResolver::with_threshold(config.condition_threshold),
            executor: EventExecutor::new(config.emitter_capacity),
            drainer: LayerDrainer::new(multiplexer, inference, config.response_timeout),
            conversation_states: DashMap::new(),
        }
    }

    /// FSM state the conversation currently occupies; the graph's initial
    /// state before its first resolved turn.
    pub fn current_state(&self, conversation_id: &str) -> String {
        self.conversation_states
            .get(conversation_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| self.graph.initial_state().name().to_string())
    }

    /// Run one turn to its terminal phase.
    ///
    /// The event's payload is appended to the context history before
    /// resolution. Frames go to `frame_tx` in emission order.
    pub async fn handle_turn(
        &self,
        event: TurnEvent,
        ctx: &mut TurnContext,
        frame_tx: &mpsc::Sender<LayerFrame>,
        cancel: &CancellationToken,
    ) -> TurnReport {
        let started_at = Utc::now();
        let mut trace = PhaseTrace::start();

        debug_assert_eq!(
            event.conversation_id, ctx.conversation_id,
            "turn event and context disagree on conversation id"
        );
        debug_assert_eq!(
            event.channel_id, ctx.channel_id,
            "turn event and context disagree on channel id"
        );

        ctx.push_message(ConversationMessage::user(event.payload));

        let current = self.current_state(&ctx.conversation_id);
        log::debug!("[{}] turn started in state {}", ctx.channel_id, current);

        trace.advance(TurnPhase::Resolving);
        let dest = match self.resolver.resolve(&self.graph, &current, ctx).await {
            Ok(state) => state,
            Err(err) => {
                trace.advance(TurnPhase::Failed);
                log::info!("[{}] unhandled turn: {}", ctx.channel_id, err);
                return self.report(ctx, current, trace, 0, Some(err.into()), started_at);
            }
        };
        let dest_name = dest.name().to_string();
        self.conversation_states
            .insert(ctx.conversation_id.clone(), dest_name.clone());
        log::debug!("[{}] resolved {} -> {}", ctx.channel_id, current, dest_name);

        if cancel.is_cancelled() {
            trace.advance(TurnPhase::Failed);
            return self.report(
                ctx,
                dest_name,
                trace,
                0,
                Some(TurnError::Cancelled),
                started_at,
            );
        }

        trace.advance(TurnPhase::Executing);
        let output = self.executor.execute(dest, ctx).await;

        trace.advance(TurnPhase::Draining);
        let turn = TurnData::from_context(ctx);
        let mut frames_sent = 0usize;
        let mut error: Option<TurnError> = None;

        'layers: for layer in output.layers {
            let mut frames = self.drainer.drain(layer, &turn);
            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => {
                        error = Some(TurnError::Cancelled);
                        break 'layers;
                    }
                    next = frames.next() => next,
                };
                match next {
                    Some(Ok(frame)) => {
                        if frame_tx.send(frame).await.is_err() {
                            error = Some(TurnError::TransportClosed);
                            break 'layers;
                        }
                        frames_sent += 1;
                    }
                    Some(Err(drain_error)) => {
                        error = Some(drain_error);
                        break 'layers;
                    }
                    None => break,
                }
            }
        }

        // An action failure surfaces only after the output it already
        // emitted has been delivered.
        if error.is_none() {
            error = output.error.map(TurnError::from);
        }

        match &error {
            None => trace.advance(TurnPhase::Completed),
            Some(turn_error) => {
                trace.advance(TurnPhase::Failed);
                log::warn!("[{}] turn failed: {}", ctx.channel_id, turn_error);
            }
        }
        self.report(ctx, dest_name, trace, frames_sent, error, started_at)
    }

    fn report(
        &self,
        ctx: &TurnContext,
        state: String,
        trace: PhaseTrace,
        frames_sent: usize,
        error: Option<TurnError>,
        started_at: DateTime<Utc>,
    ) -> TurnReport {
        TurnReport {
            conversation_id: ctx.conversation_id.clone(),
            channel_id: ctx.channel_id.clone(),
            state,
            phase: trace.current(),
            phases: trace.phases,
            frames_sent,
            error,
            started_at,
            finished_at: Utc::now(),
        }
    }
}
