//! Deterministic generator for tests
//!
//! [`ScriptedGenerator`] answers every request from a per-kind script,
//! records what it was asked, and can be told to fail.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::generation::{GenerationError, GenerationKind, GenerationRequest, TextGenerator};

#[derive(Debug, Clone, Copy)]
enum FailurePoint {
    Kind(GenerationKind),
    Call(usize),
}

/// Scripted stand-in for a model backend
pub struct ScriptedGenerator {
    defaults: Mutex<HashMap<GenerationKind, String>>,
    queued: Mutex<HashMap<GenerationKind, VecDeque<String>>>,
    failure: Mutex<Option<FailurePoint>>,
    delay: Option<Duration>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGenerator {
    /// One hypothesis, never-sufficient judgements, confirmed conclusions
    pub fn new() -> Self {
        let defaults = HashMap::from([
            (GenerationKind::Distill, distill_reply(1)),
            (
                GenerationKind::Question,
                "When did you last rebuild the weekly report by hand?".to_string(),
            ),
            (
                GenerationKind::Answer,
                "Last Friday. It took me most of the afternoon.".to_string(),
            ),
            (
                GenerationKind::Evaluate,
                r#"{"sufficient": false, "rationale": "Only one incident so far"}"#.to_string(),
            ),
            (
                GenerationKind::Conclude,
                concat!(
                    r#"{"verdict": "confirmed", "#,
                    r#""root_cause": "Reporting data lives in disconnected spreadsheets"}"#
                )
                .to_string(),
            ),
            (
                GenerationKind::Synthesize,
                "Weekly reporting is manual and costly; automate the spreadsheet consolidation."
                    .to_string(),
            ),
        ]);

        Self {
            defaults: Mutex::new(defaults),
            queued: Mutex::new(HashMap::new()),
            failure: Mutex::new(None),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Distill into `count` hypotheses
    pub fn with_hypotheses(self, count: usize) -> Self {
        self.reply(GenerationKind::Distill, distill_reply(count))
    }

    /// Replace the standing reply for a kind
    pub fn reply(self, kind: GenerationKind, text: impl Into<String>) -> Self {
        self.defaults.lock().insert(kind, text.into());
        self
    }

    /// Queue a one-shot reply, used before the standing one
    pub fn then(self, kind: GenerationKind, text: impl Into<String>) -> Self {
        self.queued.lock().entry(kind).or_default().push_back(text.into());
        self
    }

    /// Fail every request of this kind
    pub fn fail_on(self, kind: GenerationKind) -> Self {
        *self.failure.lock() = Some(FailurePoint::Kind(kind));
        self
    }

    /// Fail the n-th request (0-based) and every one after it
    pub fn fail_from_call(self, index: usize) -> Self {
        *self.failure.lock() = Some(FailurePoint::Call(index));
        self
    }

    /// Sleep before every reply
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests of one kind
    pub fn calls(&self, kind: GenerationKind) -> usize {
        self.requests.lock().iter().filter(|r| r.kind == kind).count()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn respond(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let index = {
            let mut requests = self.requests.lock();
            requests.push(request.clone());
            requests.len() - 1
        };

        let fail = match *self.failure.lock() {
            Some(FailurePoint::Kind(kind)) => kind == request.kind,
            Some(FailurePoint::Call(n)) => index >= n,
            None => false,
        };
        if fail {
            return Err(GenerationError::Request(format!(
                "scripted failure on {} call #{index}",
                request.kind
            )));
        }

        if let Some(text) = self
            .queued
            .lock()
            .get_mut(&request.kind)
            .and_then(VecDeque::pop_front)
        {
            return Ok(text);
        }
        Ok(self
            .defaults
            .lock()
            .get(&request.kind)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.respond(request)
    }
}

fn distill_reply(count: usize) -> String {
    let hypotheses: Vec<serde_json::Value> = (1..=count)
        .map(|i| {
            serde_json::json!({
                "title": format!("Manual reporting {i}"),
                "description": format!("Team {i} rebuilds the weekly report by hand"),
            })
        })
        .collect();
    serde_json::json!({ "hypotheses": hypotheses }).to_string()
}
