//! Early-stop decision for an interview
//!
//! Whether enough evidence has been gathered is a judgement call, so it sits
//! behind [`EvidenceJudge`] and the registry decides which one a run uses.

use async_trait::async_trait;
use serde::Deserialize;

use crate::generation::{generate_json, GenerationError, GenerationKind, TextGenerator};
use crate::model::Hypothesis;
use crate::prompts;

/// Outcome of one evidence check
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Judgement {
    pub sufficient: bool,
    #[serde(default)]
    pub rationale: String,
}

impl Judgement {
    pub fn keep_going() -> Self {
        Self {
            sufficient: false,
            rationale: String::new(),
        }
    }
}

/// Decides, after each answer, whether an interview can stop early
#[async_trait]
pub trait EvidenceJudge: Send + Sync {
    async fn is_sufficient(
        &self,
        generator: &dyn TextGenerator,
        hypothesis: &Hypothesis,
    ) -> Result<Judgement, GenerationError>;
}

/// Asks the generator for a `{"sufficient", "rationale"}` verdict
#[derive(Debug, Clone, Copy, Default)]
pub struct GeneratedJudge;

#[async_trait]
impl EvidenceJudge for GeneratedJudge {
    async fn is_sufficient(
        &self,
        generator: &dyn TextGenerator,
        hypothesis: &Hypothesis,
    ) -> Result<Judgement, GenerationError> {
        let request = prompts::request(GenerationKind::Evaluate, prompts::evaluate(hypothesis));
        generate_json(generator, &request).await
    }
}

/// Never stops early; interviews always run to the message ceiling
#[derive(Debug, Clone, Copy, Default)]
pub struct CeilingOnly;

#[async_trait]
impl EvidenceJudge for CeilingOnly {
    async fn is_sufficient(
        &self,
        _generator: &dyn TextGenerator,
        _hypothesis: &Hypothesis,
    ) -> Result<Judgement, GenerationError> {
        Ok(Judgement::keep_going())
    }
}
