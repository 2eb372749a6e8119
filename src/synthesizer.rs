//! Final diagnostic answer from the concluded hypotheses

use tracing::instrument;

use crate::error::SimulationError;
use crate::generation::{generate_text, GenerationKind, TextGenerator};
use crate::model::{Hypothesis, SimulationInput};
use crate::prompts;

/// Write the final answer. Every hypothesis must already be concluded.
#[instrument(skip_all, fields(hypotheses = hypotheses.len()))]
pub async fn synthesize(
    generator: &dyn TextGenerator,
    input: &SimulationInput,
    hypotheses: &[Hypothesis],
) -> Result<String, SimulationError> {
    if let Some(open) = hypotheses.iter().find(|h| !h.status.is_concluded()) {
        return Err(SimulationError::InvariantViolation(format!(
            "cannot synthesize while hypothesis {} is {}",
            open.id, open.status
        )));
    }

    let context = prompts::synthesize(input, hypotheses);
    let request = prompts::request(GenerationKind::Synthesize, context);
    Ok(generate_text(generator, &request).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HypothesisStatus;
    use crate::testing::ScriptedGenerator;

    fn input() -> SimulationInput {
        SimulationInput {
            user_input: "X".into(),
            stakeholder_profile: "p".into(),
            stakeholder_id: None,
            max_interview_messages: 2,
            seeded_hypotheses: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_synthesize_concluded() {
        let mut h = Hypothesis::new(1, "T", "D");
        h.status = HypothesisStatus::Refuted;
        h.root_cause = "No pain".into();
        let generator = ScriptedGenerator::new();

        let answer = synthesize(&generator, &input(), &[h]).await.unwrap();
        assert!(!answer.is_empty());

        let requests = generator.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].context.contains("Root cause: No pain"));
    }

    #[tokio::test]
    async fn test_refuses_open_hypothesis() {
        let generator = ScriptedGenerator::new();
        let err = synthesize(&generator, &input(), &[Hypothesis::new(1, "T", "D")])
            .await
            .unwrap_err();
        assert!(matches!(err, SimulationError::InvariantViolation(_)));
        assert_eq!(generator.call_count(), 0);
    }
}
