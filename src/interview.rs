//! Interview loop - the question/answer cycle for one hypothesis

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::error::SimulationError;
use crate::event::{AgentUpdate, EventPayload, InterviewMessageEvent, Stage, TranscriptUpdated};
use crate::generation::{
    generate_json, generate_text, GenerationError, GenerationKind, TextGenerator,
};
use crate::judge::EvidenceJudge;
use crate::model::{Hypothesis, InterviewMessage, Role, SimulationInput, Verdict};
use crate::prompts;
use crate::run::RunWriter;

#[derive(Debug, Deserialize)]
struct ConcludeReply {
    verdict: String,
    #[serde(default)]
    root_cause: String,
}

impl ConcludeReply {
    fn verdict(&self) -> Result<Verdict, GenerationError> {
        match self.verdict.trim().to_ascii_lowercase().as_str() {
            "confirmed" => Ok(Verdict::Confirmed),
            "refuted" => Ok(Verdict::Refuted),
            other => Err(GenerationError::Unparseable {
                kind: GenerationKind::Conclude,
                reason: format!("unknown verdict '{other}'"),
            }),
        }
    }
}

/// Why an interview stopped asking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No room left for another question and answer
    Ceiling,
    /// The judge found the evidence sufficient
    Sufficient,
}

impl StopReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Ceiling => "ceiling",
            Self::Sufficient => "sufficient_evidence",
        }
    }
}

/// Drives one hypothesis from pending to confirmed or refuted
pub struct InterviewLoop<'a> {
    generator: &'a dyn TextGenerator,
    judge: &'a dyn EvidenceJudge,
    input: &'a SimulationInput,
}

impl<'a> InterviewLoop<'a> {
    pub fn new(
        generator: &'a dyn TextGenerator,
        judge: &'a dyn EvidenceJudge,
        input: &'a SimulationInput,
    ) -> Self {
        Self {
            generator,
            judge,
            input,
        }
    }

    fn ceiling(&self) -> usize {
        self.input.max_interview_messages as usize
    }

    /// A question is only asked when its answer fits under the ceiling too
    fn has_room(&self, hypothesis: &Hypothesis) -> bool {
        hypothesis.messages.len() + 2 <= self.ceiling()
    }

    /// Interview the hypothesis at the current offset and conclude it
    #[instrument(skip_all, fields(run_id = %writer.run_id()))]
    pub async fn run(&self, writer: &mut RunWriter) -> Result<Hypothesis, SimulationError> {
        let hypothesis = writer.commit(
            |state| state.begin_current().cloned(),
            |step, _, h| {
                let summary = format!("Interviewing on \"{}\"", h.title);
                vec![EventPayload::AgentUpdate(
                    AgentUpdate::new(step, Stage::Interview, "started", summary)
                        .for_hypothesis(h)
                        .with_details(json!({ "description": h.description })),
                )]
            },
        )?;
        info!(hypothesis_id = %hypothesis.id, "Interview started");

        let mut opening = hypothesis.opening_question.clone();
        let stop = loop {
            let hypothesis = writer.current_hypothesis()?;
            if !self.has_room(&hypothesis) {
                break StopReason::Ceiling;
            }

            let question = match opening.take() {
                Some(question) => question,
                None => self.next_question(writer, &hypothesis).await?,
            };
            let asked = self.record(writer, Role::Assistant, question.clone())?;

            let hypothesis = writer.current_hypothesis()?;
            let answer = self.answer(&hypothesis, &question).await?;
            self.record(writer, Role::User, answer)?;
            debug!(hypothesis_id = %hypothesis.id, index = asked.index, "Captured answer");

            let hypothesis = writer.current_hypothesis()?;
            if !self.has_room(&hypothesis) {
                break StopReason::Ceiling;
            }
            let judgement = self.judge.is_sufficient(self.generator, &hypothesis).await?;
            if judgement.sufficient {
                writer.emit(EventPayload::AgentUpdate(
                    AgentUpdate::new(
                        writer.step(),
                        Stage::Validation,
                        "evidence_sufficient",
                        judgement.rationale.clone(),
                    )
                    .for_hypothesis(&hypothesis),
                ))?;
                break StopReason::Sufficient;
            }
        };

        self.conclude(writer, stop).await
    }

    async fn next_question(
        &self,
        writer: &RunWriter,
        hypothesis: &Hypothesis,
    ) -> Result<String, GenerationError> {
        let context = writer
            .read(|state| prompts::question(self.input, hypothesis, state.concluded_others()));
        generate_text(self.generator, &prompts::request(GenerationKind::Question, context)).await
    }

    /// Stakeholder answers may be blank; they just don't count as evidence
    async fn answer(
        &self,
        hypothesis: &Hypothesis,
        question: &str,
    ) -> Result<String, GenerationError> {
        let context = prompts::answer(self.input, hypothesis, question);
        let request = prompts::request(GenerationKind::Answer, context);
        let text = self.generator.generate(&request).await?;
        Ok(text.trim().to_string())
    }

    fn record(
        &self,
        writer: &mut RunWriter,
        role: Role,
        content: String,
    ) -> Result<InterviewMessage, SimulationError> {
        writer.commit(
            |state| state.record_message(role, content),
            |step, state, message| {
                let Some(hypothesis) = state.current() else {
                    return Vec::new();
                };
                let (action, summary) = match role {
                    Role::Assistant => ("question_asked", format!("Asked: {}", message.content)),
                    Role::User => (
                        "response_captured",
                        format!("Stakeholder answered question {}", message.index / 2 + 1),
                    ),
                };
                vec![
                    EventPayload::InterviewMessage(InterviewMessageEvent::new(step, message)),
                    EventPayload::TranscriptUpdated(TranscriptUpdated::new(
                        step, hypothesis, message,
                    )),
                    EventPayload::AgentUpdate(
                        AgentUpdate::new(step, Stage::Interview, action, summary)
                            .for_hypothesis(hypothesis),
                    ),
                ]
            },
        )
    }

    async fn conclude(
        &self,
        writer: &mut RunWriter,
        stop: StopReason,
    ) -> Result<Hypothesis, SimulationError> {
        let hypothesis = writer.current_hypothesis()?;
        let context = prompts::conclude(self.input, &hypothesis);
        let request = prompts::request(GenerationKind::Conclude, context);
        let reply: ConcludeReply = generate_json(self.generator, &request).await?;
        let verdict = reply.verdict()?;
        let root_cause = reply.root_cause.trim().to_string();

        let concluded = writer.commit(
            |state| state.conclude_current(verdict, root_cause).cloned(),
            |step, _, h| {
                let summary = format!("{} {}", h.id, h.status);
                vec![EventPayload::AgentUpdate(
                    AgentUpdate::new(step, Stage::Validation, "concluded", summary)
                        .for_hypothesis(h)
                        .with_details(json!({
                            "verdict": h.status,
                            "root_cause": h.root_cause,
                            "evidence_count": h.evidence_count,
                            "interview_message_count": h.interview_message_count,
                            "stop_reason": stop.as_str(),
                        })),
                )]
            },
        )?;

        info!(
            hypothesis_id = %concluded.id,
            status = %concluded.status,
            messages = concluded.interview_message_count,
            stop_reason = stop.as_str(),
            "Hypothesis concluded"
        );
        Ok(concluded)
    }
}
