//! Layer module - Response units emitted by actions
//!
//! A layer is pure data here; the drain protocol that turns a layer into
//! outbound frames lives in the runtime crate. New response kinds are added
//! as enum variants so the drain loop stays a single closed match.

use serde::{Deserialize, Serialize};

/// A single response unit produced by an action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Layer {
    /// Immediate text; drained as exactly one final frame.
    Text(TextLayer),
    /// Deferred model-generated text; drained from asynchronously published
    /// inference results.
    Generated(GeneratedLayer),
}

impl Layer {
    /// Shorthand for a plain text layer with feedback enabled.
    pub fn text(payload: impl Into<String>) -> Self {
        Layer::Text(TextLayer::new(payload))
    }

    /// Stable type tag carried on every frame drained from this layer.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Layer::Text(_) => "text",
            Layer::Generated(_) => "generated_text",
        }
    }

    pub fn allow_feedback(&self) -> bool {
        match self {
            Layer::Text(layer) => layer.allow_feedback,
            Layer::Generated(layer) => layer.allow_feedback,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextLayer {
    pub payload: String,
    pub allow_feedback: bool,
}

impl TextLayer {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            allow_feedback: true,
        }
    }

    pub fn without_feedback(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            allow_feedback: false,
        }
    }
}

/// Sampling parameters forwarded to the inference collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub seed: u64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// What the collaborator should generate from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationInput {
    /// Chat-style prompt assembled by the action.
    Messages { messages: Vec<PromptMessage> },
    /// Free text the collaborator resolves against retrieved context.
    Contextual {
        text: Option<String>,
        use_conversation_context: bool,
        only_context: bool,
    },
}

/// Request descriptor for a deferred, model-generated response unit.
///
/// Dispatch happens on first drain, not at construction, so building a
/// state's layer list stays cheap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedLayer {
    /// Name of the generation config the collaborator should use.
    pub config_name: String,
    pub input: GenerationInput,
    pub params: GenerationParams,
    pub allow_feedback: bool,
}

impl GeneratedLayer {
    /// Chat-completion request against the named generation config.
    pub fn completion(config_name: impl Into<String>, messages: Vec<PromptMessage>) -> Self {
        Self {
            config_name: config_name.into(),
            input: GenerationInput::Messages { messages },
            params: GenerationParams::default(),
            allow_feedback: true,
        }
    }

    /// Retrieval-augmented request; `text` of `None` means the collaborator
    /// derives the query from the conversation.
    pub fn contextual(config_name: impl Into<String>, text: Option<String>) -> Self {
        Self {
            config_name: config_name.into(),
            input: GenerationInput::Contextual {
                text,
                use_conversation_context: true,
                only_context: false,
            },
            params: GenerationParams::default(),
            allow_feedback: true,
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_allow_feedback(mut self, allow_feedback: bool) -> Self {
        self.allow_feedback = allow_feedback;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tags_are_stable() {
        assert_eq!(Layer::text("hi").type_tag(), "text");

        let generated = Layer::Generated(GeneratedLayer::contextual("default", None));
        assert_eq!(generated.type_tag(), "generated_text");
    }

    #[test]
    fn default_generation_params() {
        let params = GenerationParams::default();
        assert_eq!(params.temperature, 0.7);
        assert_eq!(params.max_tokens, 1024);
        assert_eq!(params.seed, 42);
    }

    #[test]
    fn feedback_flag_propagates() {
        let layer = Layer::Text(TextLayer::without_feedback("Byeeeeeeee!"));
        assert!(!layer.allow_feedback());

        let layer = Layer::Generated(
            GeneratedLayer::completion("gpt", vec![]).with_allow_feedback(false),
        );
        assert!(!layer.allow_feedback());
    }

    #[test]
    fn layer_serde_roundtrip() {
        let layer = Layer::Generated(GeneratedLayer::completion(
            "default",
            vec![PromptMessage::new("user", "hello")],
        ));

        let json = serde_json::to_string(&layer).unwrap();
        assert!(json.contains("\"kind\":\"generated\""));

        let back: Layer = serde_json::from_str(&json).unwrap();
        assert_eq!(layer, back);
    }
}
