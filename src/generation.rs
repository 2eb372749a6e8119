//! Text-generation capability seam
//!
//! The simulation never talks to a model directly; every distillation,
//! question, answer, judgement and synthesis goes through [`TextGenerator`].

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Call site a generation request originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    /// Problem statement to hypotheses
    Distill,
    /// Next interviewer question
    Question,
    /// Simulated stakeholder answer
    Answer,
    /// Has enough evidence been gathered
    Evaluate,
    /// Final verdict and root cause for a hypothesis
    Conclude,
    /// Final diagnostic answer
    Synthesize,
}

impl GenerationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Distill => "distill",
            Self::Question => "question",
            Self::Answer => "answer",
            Self::Evaluate => "evaluate",
            Self::Conclude => "conclude",
            Self::Synthesize => "synthesize",
        }
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `generate(prompt, context)` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub kind: GenerationKind,
    /// Role instructions
    pub instructions: String,
    /// Run material the instructions apply to
    pub context: String,
}

impl GenerationRequest {
    pub fn new(
        kind: GenerationKind,
        instructions: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            instructions: instructions.into(),
            context: context.into(),
        }
    }
}

/// Errors from the generation capability
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// Transport-level failure
    #[error("request failed: {0}")]
    Request(String),

    /// Non-success HTTP status
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Nothing usable came back
    #[error("empty {0} output")]
    Empty(GenerationKind),

    /// Output could not be interpreted
    #[error("unparseable {kind} output: {reason}")]
    Unparseable { kind: GenerationKind, reason: String },
}

/// Opaque, fallible, latent text generation
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Generate and reject blank output
pub async fn generate_text(
    generator: &dyn TextGenerator,
    request: &GenerationRequest,
) -> Result<String, GenerationError> {
    let text = generator.generate(request).await?;
    let text = text.trim();
    if text.is_empty() {
        return Err(GenerationError::Empty(request.kind));
    }
    Ok(text.to_string())
}

/// Generate and decode a JSON object reply
pub async fn generate_json<T: DeserializeOwned>(
    generator: &dyn TextGenerator,
    request: &GenerationRequest,
) -> Result<T, GenerationError> {
    let text = generate_text(generator, request).await?;
    parse_json_reply(request.kind, &text)
}

/// Decode the first JSON object of a reply.
///
/// Models like to wrap JSON in prose or Markdown fences; text before the
/// first `{` and after the object it opens is ignored.
pub fn parse_json_reply<T: DeserializeOwned>(
    kind: GenerationKind,
    text: &str,
) -> Result<T, GenerationError> {
    let unparseable = |reason: String| GenerationError::Unparseable { kind, reason };

    let start = text
        .find('{')
        .ok_or_else(|| unparseable("no JSON object in reply".into()))?;

    serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<T>()
        .next()
        .ok_or_else(|| unparseable("no JSON object in reply".into()))?
        .map_err(|e| unparseable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Reply {
        sufficient: bool,
    }

    #[test]
    fn test_parse_plain_json() {
        let reply: Reply =
            parse_json_reply(GenerationKind::Evaluate, r#"{"sufficient": true}"#).unwrap();
        assert!(reply.sufficient);
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "Here you go:\n```json\n{\"sufficient\": false}\n```\n";
        let reply: Reply = parse_json_reply(GenerationKind::Evaluate, text).unwrap();
        assert!(!reply.sufficient);
    }

    #[test]
    fn test_parse_rejects_prose() {
        let err = parse_json_reply::<Reply>(GenerationKind::Evaluate, "yes, enough").unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Unparseable { kind: GenerationKind::Evaluate, .. }
        ));
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        let err =
            parse_json_reply::<Reply>(GenerationKind::Evaluate, r#"{"other": 1}"#).unwrap_err();
        assert!(matches!(err, GenerationError::Unparseable { .. }));
    }

    #[test]
    fn test_parse_ignores_trailing_braces() {
        let text = r#"{"sufficient": true} (see {notes} above)"#;
        let reply: Reply = parse_json_reply(GenerationKind::Evaluate, text).unwrap();
        assert!(reply.sufficient);
    }

    #[test]
    fn test_parse_rejects_unterminated_object() {
        let reply = r#"{"sufficient": tr"#;
        let err = parse_json_reply::<Reply>(GenerationKind::Conclude, reply).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Unparseable { kind: GenerationKind::Conclude, .. }
        ));
    }
}
