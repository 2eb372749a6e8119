//! Problem statement to hypothesis batch

use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::generation::{generate_json, GenerationError, GenerationKind, TextGenerator};
use crate::model::{Hypothesis, SimulationInput};
use crate::prompts;

#[derive(Debug, Deserialize)]
struct DistillReply {
    #[serde(default)]
    hypotheses: Vec<DraftHypothesis>,
}

#[derive(Debug, Deserialize)]
struct DraftHypothesis {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    opening_question: Option<String>,
}

/// Where a run's hypotheses came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HypothesisSource {
    Distilled,
    Seeded,
}

impl HypothesisSource {
    /// `action` reported on the analysis agent update
    pub fn action(self) -> &'static str {
        match self {
            Self::Distilled => "completed",
            Self::Seeded => "loaded",
        }
    }
}

/// Produce the run's hypotheses, from the seeded list when one was given
#[instrument(skip_all, fields(seeded = !input.seeded_hypotheses.is_empty()))]
pub async fn distill(
    generator: &dyn TextGenerator,
    input: &SimulationInput,
) -> Result<(Vec<Hypothesis>, HypothesisSource), GenerationError> {
    if !input.seeded_hypotheses.is_empty() {
        return Ok((from_seeds(&input.seeded_hypotheses), HypothesisSource::Seeded));
    }

    let request = prompts::request(GenerationKind::Distill, prompts::distill(input));
    let reply: DistillReply = generate_json(generator, &request).await?;
    let hypotheses = from_drafts(reply.hypotheses)?;

    debug!(count = hypotheses.len(), "Distilled hypotheses");
    Ok((hypotheses, HypothesisSource::Distilled))
}

fn from_seeds(seeds: &[String]) -> Vec<Hypothesis> {
    seeds
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .enumerate()
        .map(|(i, text)| Hypothesis::new(i + 1, text, text))
        .collect()
}

fn from_drafts(drafts: Vec<DraftHypothesis>) -> Result<Vec<Hypothesis>, GenerationError> {
    let total = drafts.len();
    let hypotheses: Vec<Hypothesis> = drafts
        .into_iter()
        .filter(|d| !d.description.trim().is_empty())
        .enumerate()
        .map(|(i, draft)| {
            let ordinal = i + 1;
            let title = match draft.title.trim() {
                "" => format!("Hypothesis {ordinal}"),
                title => title.to_string(),
            };
            let hypothesis = Hypothesis::new(ordinal, title, draft.description.trim());
            match draft.opening_question.as_deref().map(str::trim) {
                Some(q) if !q.is_empty() => hypothesis.with_opening_question(q),
                _ => hypothesis,
            }
        })
        .collect();

    if hypotheses.len() < total {
        warn!(dropped = total - hypotheses.len(), "Dropped hypotheses without a description");
    }
    if hypotheses.is_empty() {
        return Err(GenerationError::Unparseable {
            kind: GenerationKind::Distill,
            reason: "no hypotheses with a description".into(),
        });
    }
    Ok(hypotheses)
}
