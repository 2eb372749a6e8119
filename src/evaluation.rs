//! Batch evaluation over a dataset of submissions
//!
//! Each case in a `.json` array or `.jsonl` file is submitted through the
//! registry, followed to its terminal event, and summarised into a
//! [`CaseResult`]. Cases run one after another.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::event::EventPayload;
use crate::model::{Hypothesis, InterviewMessage, RunId, RunStatus, SimulationRequest};
use crate::registry::RunRegistry;

/// Dataset and result file errors
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid JSONL at line {line}: {reason}")]
    Line { line: usize, reason: String },

    #[error("dataset must be an array of objects: {0}")]
    Shape(String),
}

fn is_jsonl(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jsonl"))
}

/// Read a dataset of case objects from `.json` (array) or `.jsonl`
pub fn load_dataset(path: &Path) -> Result<Vec<Map<String, Value>>, EvaluationError> {
    let text = fs::read_to_string(path).map_err(|source| EvaluationError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if is_jsonl(path) {
        let mut cases = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(Value::Object(case)) => cases.push(case),
                Ok(_) => {
                    return Err(EvaluationError::Line {
                        line: index + 1,
                        reason: "expected a JSON object".into(),
                    })
                }
                Err(e) => {
                    return Err(EvaluationError::Line {
                        line: index + 1,
                        reason: e.to_string(),
                    })
                }
            }
        }
        return Ok(cases);
    }

    let payload: Value = serde_json::from_str(&text).map_err(|source| EvaluationError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let Value::Array(items) = payload else {
        return Err(EvaluationError::Shape("top-level value is not an array".into()));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(case) => Ok(case),
            _ => Err(EvaluationError::Shape(format!("item {index} is not an object"))),
        })
        .collect()
}

/// Write results as pretty JSON, or one object per line for `.jsonl`
pub fn write_results(path: &Path, results: &[CaseResult]) -> Result<(), EvaluationError> {
    let io_error = |source| EvaluationError::Io {
        path: path.to_path_buf(),
        source,
    };
    let json_error = |source| EvaluationError::Json {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let body = if is_jsonl(path) {
        let mut body = String::new();
        for result in results {
            body.push_str(&serde_json::to_string(result).map_err(json_error)?);
            body.push('\n');
        }
        body
    } else {
        let mut body = serde_json::to_string_pretty(results).map_err(json_error)?;
        body.push('\n');
        body
    };
    fs::write(path, body).map_err(io_error)
}

/// One dataset row
#[derive(Debug, Deserialize)]
struct EvaluationCase {
    #[serde(default)]
    case_id: Option<String>,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(flatten)]
    request: SimulationRequest,
}

#[derive(Debug, Clone, Serialize)]
pub struct Timestamps {
    pub started_at: String,
    pub ended_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    pub hypothesis_id: String,
    pub hypothesis_title: String,
    pub status: String,
    pub messages: Vec<InterviewMessage>,
    pub text: String,
}

impl From<&Hypothesis> for TranscriptEntry {
    fn from(h: &Hypothesis) -> Self {
        Self {
            hypothesis_id: h.id.clone(),
            hypothesis_title: h.title.clone(),
            status: h.status.to_string(),
            messages: h.messages.clone(),
            text: h.transcript_text(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseOutput {
    pub hypotheses: Vec<Hypothesis>,
    pub interview_transcript: Vec<TranscriptEntry>,
    pub final_response: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CaseMetrics {
    /// `simulation.step` events in the run's log
    pub steps: u64,
    pub duration_seconds: f64,
    pub hypothesis_count: usize,
    pub status_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseError {
    /// `invalid_case`, `rejected` or `run_failed`
    pub kind: String,
    pub message: String,
}

/// Outcome of one case
#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub run_id: Option<RunId>,
    pub case_id: String,
    pub timestamps: Timestamps,
    pub input: Value,
    pub output: Option<CaseOutput>,
    pub metrics: CaseMetrics,
    pub error: Option<CaseError>,
}

impl CaseResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Totals over a batch
#[derive(Debug, Clone, Default)]
pub struct EvaluationReport {
    pub results: Vec<CaseResult>,
    pub succeeded: usize,
    pub failed: usize,
}

/// Runs dataset cases through a registry
pub struct Evaluator {
    registry: RunRegistry,
    limit: Option<usize>,
    fail_fast: bool,
}

impl Evaluator {
    pub fn new(registry: RunRegistry) -> Self {
        Self {
            registry,
            limit: None,
            fail_fast: false,
        }
    }

    /// Only run the first `limit` cases; 0 means all
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = (limit > 0).then_some(limit);
        self
    }

    /// Stop after the first failed case
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub async fn run(&self, cases: Vec<Map<String, Value>>) -> EvaluationReport {
        let take = self.limit.unwrap_or(cases.len());
        let mut report = EvaluationReport::default();

        for (index, case) in cases.into_iter().take(take).enumerate() {
            let result = self.run_case(index + 1, case).await;
            if result.succeeded() {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
            if self.fail_fast && !result.succeeded() {
                warn!(case_id = %result.case_id, "Stopping on first failure");
                report.results.push(result);
                break;
            }
            report.results.push(result);
        }

        info!(
            total = report.results.len(),
            succeeded = report.succeeded,
            failed = report.failed,
            "Evaluation finished"
        );
        report
    }

    #[instrument(skip(self, raw))]
    async fn run_case(&self, index: usize, raw: Map<String, Value>) -> CaseResult {
        let started_at = Utc::now().to_rfc3339();
        let clock = Instant::now();
        let input = Value::Object(raw.clone());

        let fallback_id = raw
            .get("case_id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("case-{index}"));

        let mut result = CaseResult {
            run_id: None,
            case_id: fallback_id,
            timestamps: Timestamps {
                started_at,
                ended_at: String::new(),
            },
            input,
            output: None,
            metrics: CaseMetrics::default(),
            error: None,
        };

        match self.execute(raw, &mut result).await {
            Ok(()) => info!(case_id = %result.case_id, "Case completed"),
            Err(error) => {
                warn!(
                    case_id = %result.case_id,
                    kind = %error.kind,
                    error = %error.message,
                    "Case failed"
                );
                result.error = Some(error);
            }
        }

        result.timestamps.ended_at = Utc::now().to_rfc3339();
        result.metrics.duration_seconds =
            (clock.elapsed().as_secs_f64() * 1000.0).round() / 1000.0;
        result
    }

    async fn execute(
        &self,
        raw: Map<String, Value>,
        result: &mut CaseResult,
    ) -> Result<(), CaseError> {
        let case: EvaluationCase =
            serde_json::from_value(Value::Object(raw)).map_err(|e| CaseError {
                kind: "invalid_case".into(),
                message: e.to_string(),
            })?;
        if let Some(case_id) = case.case_id.filter(|id| !id.trim().is_empty()) {
            result.case_id = case_id.trim().to_string();
        }
        if !case.metadata.is_empty() {
            info!(case_id = %result.case_id, keys = case.metadata.len(), "Case carries metadata");
        }

        let id = self.registry.create(&case.request).map_err(|e| CaseError {
            kind: "rejected".into(),
            message: e.to_string(),
        })?;
        result.run_id = Some(id);

        let mut events = self.registry.subscribe(id).map_err(|e| CaseError {
            kind: "rejected".into(),
            message: e.to_string(),
        })?;
        while let Some(event) = events.next().await {
            if matches!(event.payload, EventPayload::SimulationStep(_)) {
                result.metrics.steps += 1;
            }
        }

        let run = self.registry.get(id).map_err(|e| CaseError {
            kind: "rejected".into(),
            message: e.to_string(),
        })?;

        let hypotheses = run.state.hypotheses;
        result.metrics.hypothesis_count = hypotheses.len();
        for h in &hypotheses {
            *result
                .metrics
                .status_counts
                .entry(h.status.to_string())
                .or_default() += 1;
        }
        result.output = Some(CaseOutput {
            interview_transcript: hypotheses.iter().map(TranscriptEntry::from).collect(),
            hypotheses,
            final_response: run.final_answer,
        });

        match run.status {
            RunStatus::Completed => Ok(()),
            status => Err(CaseError {
                kind: "run_failed".into(),
                message: run
                    .error
                    .unwrap_or_else(|| format!("run ended as {}", status.as_str())),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationKind;
    use crate::judge::CeilingOnly;
    use crate::stakeholder::StakeholderCatalog;
    use crate::testing::ScriptedGenerator;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn create_test_evaluator(generator: ScriptedGenerator) -> Evaluator {
        let registry = RunRegistry::new(Arc::new(generator), StakeholderCatalog::default())
            .with_judge(Arc::new(CeilingOnly))
            .with_default_max_interview_messages(2);
        Evaluator::new(registry)
    }

    fn case(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    // === Dataset Files ===

    #[test]
    fn test_load_json_array() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cases.json");
        fs::write(&path, r#"[{"idea": "A"}, {"idea": "B"}]"#).unwrap();

        let cases = load_dataset(&path).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[1]["idea"], "B");
    }

    #[test]
    fn test_load_jsonl_skips_blank_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cases.jsonl");
        fs::write(&path, "{\"idea\": \"A\"}\n\n{\"idea\": \"B\"}\n").unwrap();

        assert_eq!(load_dataset(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_load_rejects_bad_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cases.jsonl");
        fs::write(&path, "{\"idea\": \"A\"}\n[1, 2]\n").unwrap();
        assert!(matches!(
            load_dataset(&path),
            Err(EvaluationError::Line { line: 2, .. })
        ));

        let path = dir.path().join("cases.json");
        fs::write(&path, r#"{"idea": "A"}"#).unwrap();
        assert!(matches!(load_dataset(&path), Err(EvaluationError::Shape(_))));

        assert!(matches!(
            load_dataset(&dir.path().join("missing.json")),
            Err(EvaluationError::Io { .. })
        ));
    }

    #[test]
    fn test_write_results_formats() {
        let dir = tempdir().unwrap();
        let result = CaseResult {
            run_id: None,
            case_id: "case-1".into(),
            timestamps: Timestamps {
                started_at: "t0".into(),
                ended_at: "t1".into(),
            },
            input: Value::Null,
            output: None,
            metrics: CaseMetrics::default(),
            error: None,
        };

        let jsonl = dir.path().join("out/results.jsonl");
        write_results(&jsonl, &[result.clone(), result.clone()]).unwrap();
        let text = fs::read_to_string(&jsonl).unwrap();
        assert_eq!(text.lines().count(), 2);

        let json = dir.path().join("results.json");
        write_results(&json, &[result]).unwrap();
        let parsed: Value = serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(parsed[0]["case_id"], "case-1");
    }

    // === Batch Runs ===

    #[tokio::test]
    async fn test_completed_case_summary() {
        let evaluator = create_test_evaluator(ScriptedGenerator::new().with_hypotheses(2));
        let report = evaluator
            .run(vec![case(serde_json::json!({
                "case_id": "onboarding",
                "idea": "Trial conversion dropped",
                "customer_persona": "VP Product",
                "metadata": {"source": "fixture"}
            }))])
            .await;

        assert_eq!((report.succeeded, report.failed), (1, 0));
        let result = &report.results[0];
        assert_eq!(result.case_id, "onboarding");
        assert!(result.run_id.is_some());
        assert_eq!(result.metrics.hypothesis_count, 2);
        assert_eq!(result.metrics.status_counts.get("confirmed"), Some(&2));
        assert!(result.metrics.steps > 0);

        let output = result.output.as_ref().unwrap();
        assert!(!output.final_response.is_empty());
        assert_eq!(output.interview_transcript[0].messages.len(), 2);
        assert!(output.interview_transcript[0].text.starts_with("assistant: "));
    }

    #[tokio::test]
    async fn test_invalid_and_failed_cases_are_counted() {
        let evaluator =
            create_test_evaluator(ScriptedGenerator::new().fail_on(GenerationKind::Synthesize));
        let report = evaluator
            .run(vec![
                case(serde_json::json!({ "idea": "No persona" })),
                case(serde_json::json!({ "idea": "X", "customer_persona": "p" })),
                case(serde_json::json!({ "idea": 5 })),
            ])
            .await;

        assert_eq!((report.succeeded, report.failed), (0, 3));
        let kinds: Vec<_> = report
            .results
            .iter()
            .map(|r| r.error.as_ref().unwrap().kind.as_str())
            .collect();
        assert_eq!(kinds, vec!["rejected", "run_failed", "invalid_case"]);
        assert_eq!(report.results[0].case_id, "case-1");
        assert!(report.results[1].output.is_some());
    }

    #[tokio::test]
    async fn test_limit_and_fail_fast() {
        let cases = || {
            vec![
                case(serde_json::json!({ "idea": "A", "customer_persona": "p" })),
                case(serde_json::json!({ "idea": "" })),
                case(serde_json::json!({ "idea": "C", "customer_persona": "p" })),
            ]
        };

        let report = create_test_evaluator(ScriptedGenerator::new())
            .with_limit(1)
            .run(cases())
            .await;
        assert_eq!(report.results.len(), 1);

        let report = create_test_evaluator(ScriptedGenerator::new())
            .with_fail_fast(true)
            .run(cases())
            .await;
        assert_eq!(report.results.len(), 2);
        assert_eq!((report.succeeded, report.failed), (1, 1));
    }
}
