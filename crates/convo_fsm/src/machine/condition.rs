//! Guard conditions - Confidence-valued predicates over conversation context
//!
//! A condition evaluates the context to a confidence in [0,1] and never
//! mutates it. A guard "holds" when its confidence is strictly above the
//! resolver's threshold; the default threshold of 0.0 means any positive
//! confidence holds. Evaluation is deterministic: a probabilistic guard must
//! seed its own source inside the implementation so repeated resolution of
//! the same context stays reproducible.

use async_trait::async_trait;
use regex::Regex;

use convo_core::TurnContext;

/// Confidence value clamped to [0,1].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Confidence(f64);

impl Confidence {
    pub const NONE: Confidence = Confidence(0.0);
    pub const CERTAIN: Confidence = Confidence(1.0);

    pub fn new(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Whether this confidence clears the given threshold.
    pub fn holds(self, threshold: f64) -> bool {
        self.0 > threshold
    }
}

impl From<bool> for Confidence {
    fn from(value: bool) -> Self {
        if value {
            Confidence::CERTAIN
        } else {
            Confidence::NONE
        }
    }
}

/// A pure guard over the turn context.
///
/// Conditions are shared across transitions via `Arc` and must be
/// side-effect free; they only ever see `&TurnContext`.
#[async_trait]
pub trait Condition: Send + Sync {
    fn name(&self) -> &str {
        "condition"
    }

    async fn evaluate(&self, ctx: &TurnContext) -> Confidence;
}

/// Holds when the last user payload equals the expected text.
pub struct LastPayloadEquals {
    expected: String,
}

impl LastPayloadEquals {
    pub fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
        }
    }
}

#[async_trait]
impl Condition for LastPayloadEquals {
    fn name(&self) -> &str {
        "last_payload_equals"
    }

    async fn evaluate(&self, ctx: &TurnContext) -> Confidence {
        Confidence::from(ctx.last_user_payload() == Some(self.expected.as_str()))
    }
}

/// Holds when the last user payload matches a regex pattern.
pub struct LastPayloadMatches {
    pattern: Regex,
}

impl LastPayloadMatches {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }
}

#[async_trait]
impl Condition for LastPayloadMatches {
    fn name(&self) -> &str {
        "last_payload_matches"
    }

    async fn evaluate(&self, ctx: &TurnContext) -> Confidence {
        Confidence::from(
            ctx.last_user_payload()
                .map(|payload| self.pattern.is_match(payload))
                .unwrap_or(false),
        )
    }
}

/// Adapter for closure-based guards.
pub struct FnCondition<F> {
    name: String,
    f: F,
}

impl<F> FnCondition<F>
where
    F: Fn(&TurnContext) -> Confidence + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> Condition for FnCondition<F>
where
    F: Fn(&TurnContext) -> Confidence + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, ctx: &TurnContext) -> Confidence {
        (self.f)(ctx)
    }
}
