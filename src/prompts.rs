//! Role instructions and context rendering for each generation call

use crate::generation::{GenerationKind, GenerationRequest};
use crate::model::{Hypothesis, SimulationInput};

pub const DISTILLER: &str = "\
You are a customer-discovery analyst. Turn the problem statement into a small set \
of falsifiable hypotheses about what the stakeholder actually does today: past \
behaviour, workarounds, spend and incidents, never wishes or product features. \
Keep hypotheses non-overlapping. For each, propose one opening interview question \
about a concrete past event.

Reply with JSON only:
{\"hypotheses\": [{\"title\": \"...\", \"description\": \"...\", \"opening_question\": \"...\"}]}";

pub const INTERVIEWER: &str = "\
You are a skeptical customer interviewer validating ONE hypothesis. Trust \
behaviour, tradeoffs and sacrifice over explanations. Ask the single most useful \
next question about a specific past incident. Never pitch, never ask about the \
future, never ask leading questions. Reply with the question text only.";

pub const STAKEHOLDER: &str = "\
You are role-playing the stakeholder described below in a customer interview. \
Answer the latest question the way this person would: short, concrete, grounded \
in your own past experience. Do not invent enthusiasm. Reply with the answer text only.";

pub const EVALUATOR: &str = "\
You judge whether an interview has produced enough past-behaviour evidence to \
confirm or refute the hypothesis. Complaints without workarounds and intent \
without action are not evidence.

Reply with JSON only: {\"sufficient\": true|false, \"rationale\": \"...\"}";

pub const CONCLUDER: &str = "\
You close the interview on one hypothesis. Decide from the evidence whether it is \
confirmed or refuted and name the underlying root cause in one or two sentences.

Reply with JSON only: {\"verdict\": \"confirmed\"|\"refuted\", \"root_cause\": \"...\"}";

pub const SYNTHESIZER: &str = "\
You are a business expert. Using the interview outcomes below, write the final \
diagnosis of the stakeholder's problem: which hypotheses held, the root causes \
behind them and what that means for the original idea. Be direct.";

const NO_MESSAGES: &str = "(no interview messages yet)";
const NO_CONCLUDED: &str = "(no concluded hypotheses yet)";

/// Role instructions for a call site
pub fn instructions(kind: GenerationKind) -> &'static str {
    match kind {
        GenerationKind::Distill => DISTILLER,
        GenerationKind::Question => INTERVIEWER,
        GenerationKind::Answer => STAKEHOLDER,
        GenerationKind::Evaluate => EVALUATOR,
        GenerationKind::Conclude => CONCLUDER,
        GenerationKind::Synthesize => SYNTHESIZER,
    }
}

/// Pair a context with the instructions for its call site
pub fn request(kind: GenerationKind, context: String) -> GenerationRequest {
    GenerationRequest::new(kind, instructions(kind), context)
}

fn transcript_or_placeholder(hypothesis: &Hypothesis) -> String {
    if hypothesis.messages.is_empty() {
        NO_MESSAGES.to_string()
    } else {
        hypothesis.transcript_text()
    }
}

fn hypothesis_block(hypothesis: &Hypothesis) -> String {
    format!(
        "Hypothesis {}:\nTitle: {}\nDescription: {}",
        hypothesis.id, hypothesis.title, hypothesis.description
    )
}

pub fn distill(input: &SimulationInput) -> String {
    format!(
        "Problem statement:\n{}\n\nStakeholder profile:\n{}",
        input.user_input, input.stakeholder_profile
    )
}

/// Interviewer context, including what earlier hypotheses concluded
pub fn question<'a>(
    input: &SimulationInput,
    hypothesis: &Hypothesis,
    concluded: impl Iterator<Item = &'a Hypothesis>,
) -> String {
    let digest: Vec<String> = concluded
        .map(|h| {
            format!(
                "ID: {}\nTitle: {}\nStatus: {}\nRoot cause: {}",
                h.id,
                h.title,
                h.status,
                h.root_cause.trim()
            )
        })
        .collect();
    let digest = if digest.is_empty() {
        NO_CONCLUDED.to_string()
    } else {
        digest.join("\n\n")
    };

    format!(
        "Stakeholder profile:\n{}\n\n{}\n\nConcluded hypotheses:\n{}\n\nInterview history:\n{}",
        input.stakeholder_profile,
        hypothesis_block(hypothesis),
        digest,
        transcript_or_placeholder(hypothesis)
    )
}

/// Stakeholder context; the hypothesis itself is withheld
pub fn answer(input: &SimulationInput, hypothesis: &Hypothesis, question: &str) -> String {
    format!(
        "Who you are:\n{}\n\nConversation so far:\n{}\n\nLatest question:\n{}",
        input.stakeholder_profile,
        transcript_or_placeholder(hypothesis),
        question
    )
}

pub fn evaluate(hypothesis: &Hypothesis) -> String {
    format!(
        "{}\n\nInterview history:\n{}",
        hypothesis_block(hypothesis),
        transcript_or_placeholder(hypothesis)
    )
}

pub fn conclude(input: &SimulationInput, hypothesis: &Hypothesis) -> String {
    format!(
        "Stakeholder profile:\n{}\n\n{}\n\nInterview history:\n{}",
        input.stakeholder_profile,
        hypothesis_block(hypothesis),
        transcript_or_placeholder(hypothesis)
    )
}

pub fn synthesize(input: &SimulationInput, hypotheses: &[Hypothesis]) -> String {
    let outcomes: Vec<String> = hypotheses
        .iter()
        .map(|h| {
            format!(
                "{}\nStatus: {}\nRoot cause: {}\nEvidence answers: {}\nTranscript:\n{}",
                hypothesis_block(h),
                h.status,
                h.root_cause,
                h.evidence_count,
                transcript_or_placeholder(h)
            )
        })
        .collect();

    format!(
        "Problem statement:\n{}\n\nStakeholder profile:\n{}\n\nInterview outcomes:\n\n{}",
        input.user_input,
        input.stakeholder_profile,
        outcomes.join("\n\n")
    )
}
