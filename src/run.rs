//! Run records and their single writer

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::channel::{EventChannel, Subscription};
use crate::error::SimulationError;
use crate::event::{
    AgentUpdate, EventPayload, SimulationCompleted, SimulationErrorEvent, SimulationEvent,
    SimulationStep, Stage, StateSummary,
};
use crate::model::{
    epoch_seconds, Hypothesis, Phase, RunId, RunStatus, SimulationInput, SimulationRun,
    SimulationState,
};

/// A simulation run: its record plus its event log
pub struct Run {
    /// Run ID
    pub id: RunId,
    /// Current record, replaced piecewise by the writer
    record: RwLock<SimulationRun>,
    /// Event log
    channel: EventChannel,
}

impl Run {
    /// Create a run in the `created` phase with an empty log
    pub fn new(id: RunId, input: SimulationInput) -> Self {
        info!(run_id = %id, max_messages = input.max_interview_messages, "Creating new run");

        Self {
            id,
            record: RwLock::new(SimulationRun::new(id, input)),
            channel: EventChannel::new(id),
        }
    }

    /// Read-only copy of the run
    pub fn snapshot(&self) -> SimulationRun {
        self.record.read().clone()
    }

    pub fn status(&self) -> RunStatus {
        self.record.read().status
    }

    pub fn phase(&self) -> Phase {
        self.record.read().phase
    }

    pub fn input(&self) -> SimulationInput {
        self.record.read().input.clone()
    }

    /// Reader positioned at the first event
    pub fn subscribe(&self) -> Subscription {
        self.channel.subscribe()
    }

    /// Everything logged so far
    pub fn events(&self) -> Vec<SimulationEvent> {
        self.channel.snapshot()
    }
}

/// Handle to a run for shared access
#[derive(Clone)]
pub struct RunHandle {
    inner: Arc<Run>,
}

impl RunHandle {
    pub fn new(run: Run) -> Self {
        Self {
            inner: Arc::new(run),
        }
    }

    pub fn id(&self) -> RunId {
        self.inner.id
    }
}

impl std::ops::Deref for RunHandle {
    type Target = Run;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Exclusive writer for one run.
///
/// Every mutation happens under the record lock together with the append of
/// the events describing it, so a snapshot never shows a change whose event
/// has not been logged.
pub struct RunWriter {
    run: RunHandle,
    step: u64,
}

impl RunWriter {
    pub fn new(run: RunHandle) -> Self {
        Self { run, step: 0 }
    }

    pub fn run_id(&self) -> RunId {
        self.run.id
    }

    /// Number of state mutations so far
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Look at the working state without mutating it
    pub fn read<R>(&self, f: impl FnOnce(&SimulationState) -> R) -> R {
        f(&self.run.record.read().state)
    }

    /// Copy of the hypothesis at the current offset
    pub fn current_hypothesis(&self) -> Result<Hypothesis, SimulationError> {
        self.read(|state| state.current().cloned()).ok_or_else(|| {
            SimulationError::InvariantViolation("no hypothesis at the current offset".into())
        })
    }

    /// Log an event that does not change state
    pub fn emit(&self, payload: EventPayload) -> Result<u64, SimulationError> {
        Ok(self.run.channel.append(payload)?)
    }

    /// Move to a new phase, logging `payload` with it
    pub fn enter(
        &self,
        phase: Phase,
        payload: Option<EventPayload>,
    ) -> Result<(), SimulationError> {
        let mut record = self.run.record.write();
        debug!(run_id = %self.run.id, from = ?record.phase, to = ?phase, "Phase transition");
        record.phase = phase;
        if let Some(payload) = payload {
            self.run.channel.append(payload)?;
        }
        Ok(())
    }

    /// Apply one state mutation and log it.
    ///
    /// `describe` builds the events for the mutation from the new step value
    /// and state; a `simulation.step` snapshot is always appended after them.
    pub fn commit<T>(
        &mut self,
        mutate: impl FnOnce(&mut SimulationState) -> Result<T, SimulationError>,
        describe: impl FnOnce(u64, &SimulationState, &T) -> Vec<EventPayload>,
    ) -> Result<T, SimulationError> {
        let mut record = self.run.record.write();
        let value = mutate(&mut record.state)?;
        self.step += 1;

        let mut events = describe(self.step, &record.state, &value);
        events.push(EventPayload::SimulationStep(SimulationStep {
            step: self.step,
            state: StateSummary::from(&record.state),
        }));
        for payload in events {
            self.run.channel.append(payload)?;
        }
        Ok(value)
    }

    /// Record the final answer and close the log with `simulation.completed`
    pub fn complete(&mut self, final_answer: String) -> Result<(), SimulationError> {
        let mut record = self.run.record.write();
        self.step += 1;

        record.state.final_answer = final_answer.clone();
        record.final_answer = final_answer.clone();
        record.status = RunStatus::Completed;
        record.phase = Phase::Completed;
        record.completed_at = Some(epoch_seconds());

        self.run.channel.append(EventPayload::AgentUpdate(
            AgentUpdate::new(self.step, Stage::Synthesis, "completed", "Final answer ready")
                .with_details(serde_json::json!({ "length": final_answer.chars().count() })),
        ))?;
        self.run.channel.append(EventPayload::SimulationCompleted(SimulationCompleted {
            step: self.step,
            state: StateSummary::from(&record.state),
            final_answer,
        }))?;

        info!(run_id = %self.run.id, steps = self.step, "Run completed");
        Ok(())
    }

    /// Mark the run failed and close the log with `simulation.error`
    pub fn fail(&mut self, error: &SimulationError) {
        let message = error.to_string();
        let mut record = self.run.record.write();

        let mut events = Vec::with_capacity(2);
        if let Some(id) = record.state.abandon_active() {
            debug!(
                run_id = %self.run.id,
                hypothesis_id = %id,
                "Returned interrupted hypothesis to pending"
            );
            self.step += 1;
            events.push(EventPayload::SimulationStep(SimulationStep {
                step: self.step,
                state: StateSummary::from(&record.state),
            }));
        }
        record.status = RunStatus::Failed;
        record.phase = Phase::Failed;
        record.error = Some(message.clone());
        record.completed_at = Some(epoch_seconds());

        events.push(EventPayload::SimulationError(SimulationErrorEvent {
            message: message.clone(),
        }));
        for payload in events {
            if let Err(e) = self.run.channel.append(payload) {
                warn!(run_id = %self.run.id, error = %e, "Could not log run failure");
                break;
            }
        }

        warn!(run_id = %self.run.id, error = %message, "Run failed");
    }
}
