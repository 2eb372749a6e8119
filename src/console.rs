//! Plain-text rendering of a run for terminal output

use std::fmt::Write;

use crate::event::{EventPayload, SimulationEvent, StateSummary};
use crate::model::SimulationRun;

fn render_step(step: u64, state: &StateSummary) -> String {
    let mut out = format!("\n[step {step}]\n");
    let _ = writeln!(out, "  hypothesis_offset={}", state.hypothesis_offset);
    let question = if state.current_question.is_empty() {
        "(none)"
    } else {
        state.current_question.as_str()
    };
    let _ = writeln!(out, "  current_question={question}");
    if !state.hypotheses.is_empty() {
        let statuses: Vec<String> = state
            .hypotheses
            .iter()
            .map(|h| format!("{}:{}", h.id, h.status))
            .collect();
        let _ = writeln!(out, "  hypothesis_statuses={}", statuses.join(", "));
    }
    if !state.final_answer.is_empty() {
        out.push_str("  final_answer generated\n");
    }
    out
}

/// Progress block for the events worth showing on a terminal
pub fn render_event(event: &SimulationEvent) -> Option<String> {
    match &event.payload {
        EventPayload::SimulationStep(s) => Some(render_step(s.step, &s.state)),
        EventPayload::SimulationCompleted(s) => Some(render_step(s.step, &s.state)),
        EventPayload::SimulationError(e) => Some(format!("\n[error] {}\n", e.message)),
        _ => None,
    }
}

/// Final answer and hypothesis table
pub fn render_summary(run: &SimulationRun) -> String {
    let mut out = String::from("\n=== Final Result ===\n");
    if run.final_answer.is_empty() {
        out.push_str("(empty final answer)\n");
    } else {
        let _ = writeln!(out, "{}", run.final_answer);
    }
    out.push_str("\nHypotheses:\n");
    for h in &run.state.hypotheses {
        let _ = writeln!(out, "- {} | {} | {}", h.id, h.status, h.title);
    }
    out
}
