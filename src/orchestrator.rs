//! Run orchestrator - the state machine driving one run end to end
//!
//! ```text
//! created ──▶ distilling ──▶ interviewing ──▶ synthesizing ──▶ completed
//!    │            │               │                 │
//!    └────────────┴───────────────┴─────────────────┴──────▶ failed
//! ```

use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, instrument};

use crate::distiller;
use crate::error::SimulationError;
use crate::event::{AgentUpdate, EventPayload, HypothesisBatch, SimulationStarted, Stage};
use crate::generation::TextGenerator;
use crate::interview::InterviewLoop;
use crate::judge::EvidenceJudge;
use crate::model::{HypothesisStatus, Phase, RunStatus, SimulationInput, SimulationState};
use crate::run::{RunHandle, RunWriter};
use crate::synthesizer;

/// Owns the background execution of a single run
pub struct Orchestrator {
    run: RunHandle,
    generator: Arc<dyn TextGenerator>,
    judge: Arc<dyn EvidenceJudge>,
}

impl Orchestrator {
    pub fn new(
        run: RunHandle,
        generator: Arc<dyn TextGenerator>,
        judge: Arc<dyn EvidenceJudge>,
    ) -> Self {
        Self { run, generator, judge }
    }

    /// Drive the run to a terminal state and report which one
    #[instrument(skip(self), fields(run_id = %self.run.id()))]
    pub async fn run(self) -> RunStatus {
        info!("Starting run");

        let input = self.run.input();
        let mut writer = RunWriter::new(self.run.clone());

        match self.drive(&mut writer, &input).await {
            Ok(()) => RunStatus::Completed,
            Err(e) => {
                error!(error = %e, phase = ?self.run.phase(), "Run aborted");
                writer.fail(&e);
                RunStatus::Failed
            }
        }
    }

    async fn drive(
        &self,
        writer: &mut RunWriter,
        input: &SimulationInput,
    ) -> Result<(), SimulationError> {
        // created -> distilling
        writer.enter(
            Phase::Distilling,
            Some(EventPayload::SimulationStarted(SimulationStarted {
                max_interview_messages: input.max_interview_messages,
                user_input: input.user_input.clone(),
            })),
        )?;

        let (hypotheses, source) = distiller::distill(self.generator.as_ref(), input).await?;
        writer.commit(
            |state| state.load_hypotheses(hypotheses),
            |step, state, _| {
                vec![
                    EventPayload::HypothesisBatchCreated(HypothesisBatch::from_hypotheses(
                        &state.hypotheses,
                    )),
                    EventPayload::AgentUpdate(
                        AgentUpdate::new(
                            step,
                            Stage::Analysis,
                            source.action(),
                            format!("{} hypotheses ready for validation", state.hypotheses.len()),
                        )
                        .with_details(json!({ "count": state.hypotheses.len() })),
                    ),
                ]
            },
        )?;
        info!(
            count = writer.read(|s| s.hypotheses.len()),
            action = source.action(),
            "Hypotheses loaded"
        );

        // distilling -> interviewing. No event of its own: the phase is not part
        // of the step summary, and the batch above is the subscriber's marker.
        writer.enter(Phase::Interviewing, None)?;
        let interview = InterviewLoop::new(self.generator.as_ref(), self.judge.as_ref(), input);
        while !writer.read(SimulationState::is_exhausted) {
            interview.run(writer).await?;
            writer.commit(|state| state.advance(), |_, _, _| Vec::new())?;
        }
        writer.read(SimulationState::check_invariants)?;

        // interviewing -> synthesizing
        let (count, confirmed) = writer.read(|s| {
            let confirmed = s
                .hypotheses
                .iter()
                .filter(|h| h.status == HypothesisStatus::Confirmed)
                .count();
            (s.hypotheses.len(), confirmed)
        });
        writer.enter(
            Phase::Synthesizing,
            Some(EventPayload::AgentUpdate(
                AgentUpdate::new(
                    writer.step(),
                    Stage::Synthesis,
                    "started",
                    format!("Synthesizing {count} hypotheses ({confirmed} confirmed)"),
                )
                .with_details(json!({ "count": count, "confirmed": confirmed })),
            )),
        )?;

        let hypotheses = writer.read(|s| s.hypotheses.clone());
        let answer = synthesizer::synthesize(self.generator.as_ref(), input, &hypotheses).await?;

        // synthesizing -> completed
        writer.complete(answer)
    }
}
