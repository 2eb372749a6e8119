//! Run, hypothesis and transcript data model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SimulationError;
use crate::stakeholder::StakeholderCatalog;

/// Smallest accepted interview message ceiling
pub const MIN_INTERVIEW_MESSAGES: u32 = 2;
/// Largest accepted interview message ceiling
pub const MAX_INTERVIEW_MESSAGES: u32 = 40;

/// Globally unique run identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle of a single hypothesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisStatus {
    Pending,
    InProgress,
    Confirmed,
    Refuted,
}

impl HypothesisStatus {
    /// Confirmed or refuted
    pub fn is_concluded(self) -> bool {
        matches!(self, Self::Confirmed | Self::Refuted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Confirmed => "confirmed",
            Self::Refuted => "refuted",
        }
    }
}

impl fmt::Display for HypothesisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final judgement on a hypothesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Confirmed,
    Refuted,
}

impl From<Verdict> for HypothesisStatus {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Confirmed => HypothesisStatus::Confirmed,
            Verdict::Refuted => HypothesisStatus::Refuted,
        }
    }
}

/// Speaker of an interview message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Interviewer question
    Assistant,
    /// Simulated stakeholder answer
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assistant => "assistant",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a hypothesis transcript. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewMessage {
    pub hypothesis_id: String,
    /// 0-based, strictly increasing per hypothesis
    pub index: usize,
    pub role: Role,
    pub content: String,
    /// Status of the owning hypothesis when the message was appended
    pub status: HypothesisStatus,
}

/// A falsifiable claim about stakeholder behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Sequential `h-N`, unique within a run
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: HypothesisStatus,
    /// Empty until concluded
    pub root_cause: String,
    /// Substantive stakeholder answers collected
    pub evidence_count: u32,
    pub interview_message_count: usize,
    /// First question proposed at distillation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_question: Option<String>,
    #[serde(default)]
    pub messages: Vec<InterviewMessage>,
}

impl Hypothesis {
    /// Create a pending hypothesis with the `h-{ordinal}` id
    pub fn new(ordinal: usize, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: format!("h-{ordinal}"),
            title: title.into(),
            description: description.into(),
            status: HypothesisStatus::Pending,
            root_cause: String::new(),
            evidence_count: 0,
            interview_message_count: 0,
            opening_question: None,
            messages: Vec::new(),
        }
    }

    pub fn with_opening_question(mut self, question: impl Into<String>) -> Self {
        self.opening_question = Some(question.into());
        self
    }

    /// Transcript rendered as `role: content` lines
    pub fn transcript_text(&self) -> String {
        render_transcript(&self.messages)
    }
}

/// Render messages as `role: content` lines
pub fn render_transcript(messages: &[InterviewMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Current snapshot of a run's working state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationState {
    /// Hypothesis under interview; `hypotheses.len()` once all concluded
    pub hypothesis_offset: usize,
    pub current_question: String,
    pub final_answer: String,
    /// Creation order, fixed for the run
    pub hypotheses: Vec<Hypothesis>,
}

/// Externally visible run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Orchestrator state machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Created,
    Distilling,
    Interviewing,
    Synthesizing,
    Completed,
    Failed,
}

/// Validated, immutable run input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationInput {
    pub user_input: String,
    /// Resolved profile text handed to the generator
    pub stakeholder_profile: String,
    /// Catalog id the profile came from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stakeholder_id: Option<String>,
    pub max_interview_messages: u32,
    /// When non-empty the distiller is bypassed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seeded_hypotheses: Vec<String>,
}

/// Raw run submission as received from a caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "RequestBody")]
pub struct SimulationRequest {
    pub user_input: Option<String>,
    pub stakeholder_id: Option<String>,
    pub stakeholder_profile: Option<String>,
    pub max_interview_messages: Option<u32>,
    pub hypotheses: Option<Vec<String>>,
}

/// Wire shape of a submission, accepting both field spellings.
///
/// `idea`, `customer_persona` and `todo_list` win over `user_input`,
/// `stakeholder_profile` and `hypotheses` when both are sent.
#[derive(Deserialize)]
struct RequestBody {
    #[serde(default)]
    idea: Option<String>,
    #[serde(default)]
    user_input: Option<String>,
    #[serde(default)]
    stakeholder_id: Option<String>,
    #[serde(default)]
    customer_persona: Option<String>,
    #[serde(default)]
    stakeholder_profile: Option<String>,
    #[serde(default)]
    max_interview_messages: Option<u32>,
    #[serde(default)]
    todo_list: Option<Vec<String>>,
    #[serde(default)]
    hypotheses: Option<Vec<String>>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl From<RequestBody> for SimulationRequest {
    fn from(body: RequestBody) -> Self {
        Self {
            user_input: non_blank(body.idea).or(body.user_input),
            stakeholder_id: body.stakeholder_id,
            stakeholder_profile: non_blank(body.customer_persona).or(body.stakeholder_profile),
            max_interview_messages: body.max_interview_messages,
            hypotheses: body.todo_list.or(body.hypotheses),
        }
    }
}

impl SimulationRequest {
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            user_input: Some(user_input.into()),
            ..Default::default()
        }
    }

    pub fn stakeholder_id(mut self, id: impl Into<String>) -> Self {
        self.stakeholder_id = Some(id.into());
        self
    }

    pub fn stakeholder_profile(mut self, profile: impl Into<String>) -> Self {
        self.stakeholder_profile = Some(profile.into());
        self
    }

    pub fn max_interview_messages(mut self, max: u32) -> Self {
        self.max_interview_messages = Some(max);
        self
    }

    pub fn hypotheses<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hypotheses = Some(items.into_iter().map(Into::into).collect());
        self
    }

    /// Validate the submission and resolve the stakeholder profile.
    ///
    /// A free-text profile wins over a catalog id.
    pub fn validate(
        &self,
        catalog: &StakeholderCatalog,
        default_max_messages: u32,
    ) -> Result<SimulationInput, SimulationError> {
        let user_input = self
            .user_input
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SimulationError::InvalidInput("user_input must not be empty".into()))?;

        let max = self.max_interview_messages.unwrap_or(default_max_messages);
        if !(MIN_INTERVIEW_MESSAGES..=MAX_INTERVIEW_MESSAGES).contains(&max) {
            return Err(SimulationError::InvalidInput(format!(
                "max_interview_messages must be between {MIN_INTERVIEW_MESSAGES} \
                 and {MAX_INTERVIEW_MESSAGES}, got {max}"
            )));
        }

        let explicit_profile = self
            .stakeholder_profile
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let (stakeholder_profile, stakeholder_id) = match (explicit_profile, &self.stakeholder_id) {
            (Some(profile), _) => (profile.to_string(), None),
            (None, Some(id)) => {
                let stakeholder = catalog.get(id).ok_or_else(|| {
                    SimulationError::InvalidInput(format!("stakeholder '{id}' was not found"))
                })?;
                (stakeholder.profile.trim().to_string(), Some(id.clone()))
            }
            (None, None) => {
                return Err(SimulationError::InvalidInput(
                    "provide either stakeholder_profile or stakeholder_id".into(),
                ))
            }
        };

        let seeded_hypotheses = match &self.hypotheses {
            None => Vec::new(),
            Some(items) => {
                let kept: Vec<String> = items
                    .iter()
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if kept.is_empty() {
                    return Err(SimulationError::InvalidInput(
                        "hypotheses was provided but contains no non-empty entries".into(),
                    ));
                }
                kept
            }
        };

        Ok(SimulationInput {
            user_input: user_input.to_string(),
            stakeholder_profile,
            stakeholder_id,
            max_interview_messages: max,
            seeded_hypotheses,
        })
    }
}

/// A single simulation run as seen by observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRun {
    pub id: RunId,
    pub status: RunStatus,
    pub phase: Phase,
    /// Epoch seconds
    pub started_at: f64,
    /// Unset while running
    pub completed_at: Option<f64>,
    /// Unset unless failed
    pub error: Option<String>,
    /// Empty until completed
    pub final_answer: String,
    pub state: SimulationState,
    pub input: SimulationInput,
}

impl SimulationRun {
    pub fn new(id: RunId, input: SimulationInput) -> Self {
        Self {
            id,
            status: RunStatus::Running,
            phase: Phase::Created,
            started_at: epoch_seconds(),
            completed_at: None,
            error: None,
            final_answer: String::new(),
            state: SimulationState::default(),
            input,
        }
    }
}

/// Current wall-clock time as fractional epoch seconds
pub fn epoch_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
