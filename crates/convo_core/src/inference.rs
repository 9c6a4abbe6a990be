//! Inference module - Boundary to the model-serving collaborator
//!
//! Dispatch is fire-and-forget: results arrive asynchronously through the
//! runtime's publish path, correlated by channel id, never as a direct
//! return value.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::layer::{GeneratedLayer, GenerationInput, GenerationParams};

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, InferenceError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Completion,
    ContextualCompletion,
}

/// Outbound generation request, tagged with the ids the collaborator must
/// echo back on the publish path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InferenceRequest {
    pub kind: RequestKind,
    pub config_name: String,
    pub input: GenerationInput,
    pub params: GenerationParams,
    pub conversation_id: String,
    pub channel_id: String,
}

impl InferenceRequest {
    pub fn for_layer(
        layer: &GeneratedLayer,
        conversation_id: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        let kind = match layer.input {
            GenerationInput::Messages { .. } => RequestKind::Completion,
            GenerationInput::Contextual { .. } => RequestKind::ContextualCompletion,
        };
        Self {
            kind,
            config_name: layer.config_name.clone(),
            input: layer.input.clone(),
            params: layer.params.clone(),
            conversation_id: conversation_id.into(),
            channel_id: channel_id.into(),
        }
    }
}

/// One generated fragment as published by the collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultRecord {
    /// Id the backend assigned to the generated message.
    #[serde(default)]
    pub message_id: String,
    pub payload: Value,
    #[serde(rename = "final", default)]
    pub is_final: bool,
}

impl ResultRecord {
    pub fn partial(payload: impl Into<Value>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            payload: payload.into(),
            is_final: false,
        }
    }

    pub fn closing(payload: impl Into<Value>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            payload: payload.into(),
            is_final: true,
        }
    }
}

/// A publish delivers one or more queued fragments at once.
pub type ResultBatch = Vec<ResultRecord>;

/// Handle to the inference collaborator, owned by the runner's execution
/// context rather than shared process-wide.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn dispatch(&self, request: InferenceRequest) -> Result<()>;
}
