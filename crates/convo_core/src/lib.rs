//! convo_core - Core types and traits for the conversational FSM engine
//!
//! This crate provides the foundational types used across all engine crates:
//! - `context` - per-conversation mutable context and message history
//! - `layer` - response units (immediate text, deferred generated text)
//! - `frame` - the outbound wire representation of a drained layer
//! - `inference` - the inference-collaborator boundary
//! - `action` - response-producing actions bound to FSM states

pub mod action;
pub mod context;
pub mod frame;
pub mod inference;
pub mod layer;

// Re-export commonly used types
pub use action::{Action, ActionError, LayerEmitter};
pub use context::{ConversationMessage, Sender, TurnContext};
pub use frame::{FrameMeta, LayerFrame};
pub use inference::{
    InferenceClient, InferenceError, InferenceRequest, RequestKind, ResultBatch, ResultRecord,
};
pub use layer::{GeneratedLayer, GenerationInput, GenerationParams, Layer, PromptMessage, TextLayer};
