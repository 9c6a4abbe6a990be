//! Frame module - Outbound wire representation of a drained layer
//!
//! One frame per drained fragment; the transport collaborator handles
//! physical framing and serialization beyond this shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameMeta {
    pub allow_feedback: bool,
}

/// `{ type, meta, payload, is_final }` as delivered to the transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayerFrame {
    #[serde(rename = "type")]
    pub layer_type: String,
    pub meta: FrameMeta,
    pub payload: Value,
    pub is_final: bool,
}

impl LayerFrame {
    /// Wrap a drained payload with the originating layer's tag and metadata.
    pub fn new(
        layer_type: impl Into<String>,
        allow_feedback: bool,
        payload: impl Into<Value>,
        is_final: bool,
    ) -> Self {
        Self {
            layer_type: layer_type.into(),
            meta: FrameMeta { allow_feedback },
            payload: payload.into(),
            is_final,
        }
    }
}
