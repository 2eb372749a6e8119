//! # Interrogator
//!
//! Simulated customer-interview runs - the persistent questioner.
//!
//! A run takes a problem statement and a stakeholder persona, distills the
//! problem into falsifiable hypotheses, interviews a simulated stakeholder
//! about each one, labels it confirmed or refuted, and synthesizes a final
//! answer. Progress is published as an ordered, replayable event stream.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          RUN REGISTRY                            │
//! │        run id ──▶ RunHandle { record, event channel }            │
//! └───────────────┬─────────────────────────────────┬────────────────┘
//!                 │ spawn (one task per run)        │ subscribe (N readers)
//!                 ▼                                 ▼
//!   ┌──────────────────────────┐         ┌──────────────────────┐
//!   │       ORCHESTRATOR       │ append  │    EVENT CHANNEL     │
//!   │  ┌────────────────────┐  │────────▶│  seq 0, 1, 2, ...    │
//!   │  │ Distiller          │  │         └──────────────────────┘
//!   │  │ Interview Loop (xN)│  │
//!   │  │ Synthesizer        │  │
//!   │  └────────────────────┘  │
//!   └────────────┬─────────────┘
//!                ▼
//!        TextGenerator (external)
//! ```
//!
//! ## Key Concepts
//!
//! - **Run**: One end-to-end simulation with its own state and event log
//! - **Hypothesis**: A falsifiable claim, interviewed once and then concluded
//! - **Event**: A typed, sequence-numbered record of one state change
//! - **Generator**: The opaque text-generation capability every step calls

pub mod channel;
pub mod config;
pub mod console;
pub mod distiller;
pub mod error;
pub mod evaluation;
pub mod event;
pub mod generation;
pub mod interview;
pub mod judge;
pub mod model;
pub mod openai;
pub mod orchestrator;
pub mod prompts;
pub mod registry;
pub mod run;
pub mod server;
pub mod stakeholder;
pub mod state;
pub mod synthesizer;
pub mod testing;

pub use channel::{ChannelError, EventChannel, Subscription};
pub use error::SimulationError;
pub use evaluation::{CaseResult, EvaluationReport, Evaluator};
pub use event::{EventPayload, SimulationEvent, StreamConnected};
pub use generation::{GenerationError, GenerationKind, GenerationRequest, TextGenerator};
pub use judge::{CeilingOnly, EvidenceJudge, GeneratedJudge, Judgement};
pub use model::{
    Hypothesis, HypothesisStatus, InterviewMessage, Phase, Role, RunId, RunStatus,
    SimulationInput, SimulationRequest, SimulationRun, SimulationState,
};
pub use orchestrator::Orchestrator;
pub use registry::RunRegistry;
pub use run::{Run, RunHandle};
pub use stakeholder::{Stakeholder, StakeholderCatalog};
