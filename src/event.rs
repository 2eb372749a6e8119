//! Typed run events
//!
//! Every event carries its per-run `sequence_id`, a `type` tag, a timestamp,
//! the run id and a kind-specific `payload`. The JSON shape is the wire
//! format of the event stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{
    render_transcript, Hypothesis, HypothesisStatus, InterviewMessage, Role, RunId, RunStatus,
    SimulationState,
};

/// One entry in a run's event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationEvent {
    /// Starts at 0, gap-free per run
    pub sequence_id: u64,
    #[serde(flatten)]
    pub payload: EventPayload,
    /// Epoch seconds
    pub timestamp: f64,
    pub run_id: RunId,
}

impl SimulationEvent {
    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }

    pub fn is_terminal(&self) -> bool {
        self.payload.is_terminal()
    }
}

/// Event kinds and their payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EventPayload {
    #[serde(rename = "simulation.started")]
    SimulationStarted(SimulationStarted),

    #[serde(rename = "hypothesis.batch_created")]
    HypothesisBatchCreated(HypothesisBatch),

    #[serde(rename = "agent.update")]
    AgentUpdate(AgentUpdate),

    #[serde(rename = "interview.message")]
    InterviewMessage(InterviewMessageEvent),

    #[serde(rename = "interview.transcript.updated")]
    TranscriptUpdated(TranscriptUpdated),

    #[serde(rename = "simulation.step")]
    SimulationStep(SimulationStep),

    #[serde(rename = "simulation.completed")]
    SimulationCompleted(SimulationCompleted),

    #[serde(rename = "simulation.error")]
    SimulationError(SimulationErrorEvent),
}

impl EventPayload {
    /// Wire name of the event kind
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SimulationStarted(_) => "simulation.started",
            Self::HypothesisBatchCreated(_) => "hypothesis.batch_created",
            Self::AgentUpdate(_) => "agent.update",
            Self::InterviewMessage(_) => "interview.message",
            Self::TranscriptUpdated(_) => "interview.transcript.updated",
            Self::SimulationStep(_) => "simulation.step",
            Self::SimulationCompleted(_) => "simulation.completed",
            Self::SimulationError(_) => "simulation.error",
        }
    }

    /// `simulation.completed` or `simulation.error`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SimulationCompleted(_) | Self::SimulationError(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationStarted {
    pub max_interview_messages: u32,
    pub user_input: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HypothesisBatch {
    pub count: usize,
    pub hypotheses: Vec<HypothesisBrief>,
}

impl HypothesisBatch {
    pub fn from_hypotheses(hypotheses: &[Hypothesis]) -> Self {
        Self {
            count: hypotheses.len(),
            hypotheses: hypotheses.iter().map(HypothesisBrief::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HypothesisBrief {
    pub id: String,
    pub title: String,
    pub description: String,
}

impl From<&Hypothesis> for HypothesisBrief {
    fn from(h: &Hypothesis) -> Self {
        Self {
            id: h.id.clone(),
            title: h.title.clone(),
            description: h.description.clone(),
        }
    }
}

/// Coarse area of work an agent update belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Analysis,
    Validation,
    Interview,
    Synthesis,
}

/// Human-readable progress note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentUpdate {
    pub step: u64,
    pub stage: Stage,
    pub action: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hypothesis_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hypothesis_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl AgentUpdate {
    pub fn new(
        step: u64,
        stage: Stage,
        action: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            step,
            stage,
            action: action.into(),
            summary: summary.into(),
            hypothesis_id: None,
            hypothesis_title: None,
            details: None,
        }
    }

    pub fn for_hypothesis(mut self, hypothesis: &Hypothesis) -> Self {
        self.hypothesis_id = Some(hypothesis.id.clone());
        self.hypothesis_title = Some(hypothesis.title.clone());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewMessageEvent {
    pub step: u64,
    pub hypothesis_id: String,
    pub message_index: usize,
    pub role: Role,
    pub content: String,
    pub status: HypothesisStatus,
}

impl InterviewMessageEvent {
    pub fn new(step: u64, message: &InterviewMessage) -> Self {
        Self {
            step,
            hypothesis_id: message.hypothesis_id.clone(),
            message_index: message.index,
            role: message.role,
            content: message.content.clone(),
            status: message.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptUpdated {
    pub step: u64,
    pub hypothesis_id: String,
    pub hypothesis_title: String,
    pub status: HypothesisStatus,
    pub latest_message_index: usize,
    pub latest_message_role: Role,
    pub latest_message_content: String,
    pub transcript: TranscriptView,
}

impl TranscriptUpdated {
    /// Build from the hypothesis right after `latest` was appended to it
    pub fn new(step: u64, hypothesis: &Hypothesis, latest: &InterviewMessage) -> Self {
        Self {
            step,
            hypothesis_id: hypothesis.id.clone(),
            hypothesis_title: hypothesis.title.clone(),
            status: hypothesis.status,
            latest_message_index: latest.index,
            latest_message_role: latest.role,
            latest_message_content: latest.content.clone(),
            transcript: TranscriptView::from_messages(&hypothesis.messages[..=latest.index]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptView {
    pub message_count: usize,
    pub text: String,
    pub messages: Vec<TranscriptEntry>,
}

impl TranscriptView {
    pub fn from_messages(messages: &[InterviewMessage]) -> Self {
        Self {
            message_count: messages.len(),
            text: render_transcript(messages),
            messages: messages
                .iter()
                .map(|m| TranscriptEntry {
                    role: m.role,
                    content: m.content.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationStep {
    pub step: u64,
    pub state: StateSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationCompleted {
    pub step: u64,
    pub state: StateSummary,
    pub final_answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationErrorEvent {
    pub message: String,
}

/// Compact state snapshot carried by step and completion events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSummary {
    pub hypothesis_offset: usize,
    pub current_question: String,
    pub final_answer: String,
    pub hypotheses: Vec<HypothesisSummary>,
}

impl From<&SimulationState> for StateSummary {
    fn from(state: &SimulationState) -> Self {
        Self {
            hypothesis_offset: state.hypothesis_offset,
            current_question: state.current_question.clone(),
            final_answer: state.final_answer.clone(),
            hypotheses: state.hypotheses.iter().map(HypothesisSummary::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HypothesisSummary {
    pub id: String,
    pub title: String,
    pub status: HypothesisStatus,
    pub root_cause: String,
    pub evidence_count: u32,
    pub interview_message_count: usize,
}

impl From<&Hypothesis> for HypothesisSummary {
    fn from(h: &Hypothesis) -> Self {
        Self {
            id: h.id.clone(),
            title: h.title.clone(),
            status: h.status,
            root_cause: h.root_cause.clone(),
            evidence_count: h.evidence_count,
            interview_message_count: h.interview_message_count,
        }
    }
}

/// Per-connection greeting sent ahead of a run's log.
///
/// Not part of the log and carries no sequence id.
#[derive(Debug, Clone, Serialize)]
pub struct StreamConnected {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub timestamp: f64,
    pub run_id: RunId,
    pub payload: StreamConnectedPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamConnectedPayload {
    pub status: RunStatus,
}

impl StreamConnected {
    pub const TYPE: &'static str = "stream.connected";

    pub fn new(run_id: RunId, status: RunStatus) -> Self {
        Self {
            kind: Self::TYPE,
            timestamp: crate::model::epoch_seconds(),
            run_id,
            payload: StreamConnectedPayload { status },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let event = SimulationEvent {
            sequence_id: 3,
            payload: EventPayload::SimulationError(SimulationErrorEvent {
                message: "boom".into(),
            }),
            timestamp: 1.5,
            run_id: RunId::new(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["sequence_id"], 3);
        assert_eq!(json["type"], "simulation.error");
        assert_eq!(json["payload"]["message"], "boom");
        assert!(event.is_terminal());
    }

    #[test]
    fn test_agent_update_omits_empty_optionals() {
        let update = AgentUpdate::new(2, Stage::Synthesis, "started", "Drafting");
        let json = serde_json::to_value(EventPayload::AgentUpdate(update)).unwrap();
        let payload = json["payload"].as_object().unwrap();
        assert_eq!(payload["stage"], "synthesis");
        assert!(!payload.contains_key("hypothesis_id"));
        assert!(!payload.contains_key("details"));
    }

    #[test]
    fn test_transcript_updated_prefix() {
        let mut h = Hypothesis::new(1, "T", "D");
        h.status = HypothesisStatus::InProgress;
        let turns = [(Role::Assistant, "Q?"), (Role::User, "A.")];
        for (i, (role, text)) in turns.into_iter().enumerate() {
            h.messages.push(InterviewMessage {
                hypothesis_id: h.id.clone(),
                index: i,
                role,
                content: text.into(),
                status: h.status,
            });
        }

        let first = h.messages[0].clone();
        let update = TranscriptUpdated::new(4, &h, &first);
        assert_eq!(update.transcript.message_count, 1);
        assert_eq!(update.transcript.text, "assistant: Q?");
        assert_eq!(update.latest_message_role, Role::Assistant);

        let last = h.messages[1].clone();
        let update = TranscriptUpdated::new(5, &h, &last);
        assert_eq!(update.transcript.text, "assistant: Q?\nuser: A.");
    }

    #[test]
    fn test_stream_connected_shape() {
        let greeting = StreamConnected::new(RunId::new(), RunStatus::Running);
        let json = serde_json::to_value(greeting).unwrap();
        assert_eq!(json["type"], "stream.connected");
        assert_eq!(json["payload"]["status"], "running");
        assert!(json.get("sequence_id").is_none());
    }
}
