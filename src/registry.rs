//! Process-wide run registry

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, instrument};

use crate::channel::Subscription;
use crate::error::SimulationError;
use crate::generation::TextGenerator;
use crate::judge::{EvidenceJudge, GeneratedJudge};
use crate::model::{RunId, SimulationRequest, SimulationRun};
use crate::orchestrator::Orchestrator;
use crate::run::{Run, RunHandle};
use crate::stakeholder::StakeholderCatalog;

const DEFAULT_MAX_INTERVIEW_MESSAGES: u32 = 8;

/// Maps run ids to runs and launches their orchestrators
#[derive(Clone)]
pub struct RunRegistry {
    runs: Arc<RwLock<HashMap<RunId, RunHandle>>>,
    generator: Arc<dyn TextGenerator>,
    judge: Arc<dyn EvidenceJudge>,
    catalog: Arc<StakeholderCatalog>,
    default_max_interview_messages: u32,
}

impl RunRegistry {
    pub fn new(generator: Arc<dyn TextGenerator>, catalog: StakeholderCatalog) -> Self {
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
            generator,
            judge: Arc::new(GeneratedJudge),
            catalog: Arc::new(catalog),
            default_max_interview_messages: DEFAULT_MAX_INTERVIEW_MESSAGES,
        }
    }

    /// Replace the early-stop predicate used by new runs
    pub fn with_judge(mut self, judge: Arc<dyn EvidenceJudge>) -> Self {
        self.judge = judge;
        self
    }

    /// Ceiling for submissions that do not set one
    pub fn with_default_max_interview_messages(mut self, max: u32) -> Self {
        self.default_max_interview_messages = max;
        self
    }

    pub fn catalog(&self) -> &StakeholderCatalog {
        &self.catalog
    }

    pub fn default_max_interview_messages(&self) -> u32 {
        self.default_max_interview_messages
    }

    /// Validate a submission, register the run and start it in the background.
    ///
    /// Returns as soon as the run is registered. Must be called from within a
    /// Tokio runtime.
    #[instrument(skip_all)]
    pub fn create(&self, request: &SimulationRequest) -> Result<RunId, SimulationError> {
        let input = request.validate(&self.catalog, self.default_max_interview_messages)?;

        let id = RunId::new();
        let handle = RunHandle::new(Run::new(id, input));
        self.runs.write().insert(id, handle.clone());

        let orchestrator =
            Orchestrator::new(handle, Arc::clone(&self.generator), Arc::clone(&self.judge));
        tokio::spawn(orchestrator.run());

        info!(run_id = %id, "Run registered");
        Ok(id)
    }

    /// Shared handle to a run
    pub fn handle(&self, id: RunId) -> Result<RunHandle, SimulationError> {
        self.runs
            .read()
            .get(&id)
            .cloned()
            .ok_or(SimulationError::NotFound(id))
    }

    /// Read-only copy of a run
    pub fn get(&self, id: RunId) -> Result<SimulationRun, SimulationError> {
        Ok(self.handle(id)?.snapshot())
    }

    /// Ordered event stream for a run, replayed from the first event
    pub fn subscribe(&self, id: RunId) -> Result<Subscription, SimulationError> {
        Ok(self.handle(id)?.subscribe())
    }

    pub fn len(&self) -> usize {
        self.runs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.read().is_empty()
    }
}
