//! Hypothesis progression over a run's working state
//!
//! All mutations of [`SimulationState`] go through these methods so the
//! single-active-hypothesis and forward-only-offset rules are checked in one
//! place.

use crate::error::SimulationError;
use crate::model::{
    Hypothesis, HypothesisStatus, InterviewMessage, Role, SimulationState, Verdict,
};

type StateResult<T> = Result<T, SimulationError>;

fn violation(message: impl Into<String>) -> SimulationError {
    SimulationError::InvariantViolation(message.into())
}

impl SimulationState {
    /// Install the initial hypothesis batch and point at the first one
    pub fn load_hypotheses(&mut self, hypotheses: Vec<Hypothesis>) -> StateResult<()> {
        if !self.hypotheses.is_empty() {
            return Err(violation("hypotheses were already loaded for this run"));
        }
        if hypotheses.is_empty() {
            return Err(violation("hypothesis batch is empty"));
        }
        if let Some(h) = hypotheses.iter().find(|h| h.status != HypothesisStatus::Pending) {
            return Err(violation(format!("hypothesis {} did not start pending", h.id)));
        }

        self.hypotheses = hypotheses;
        self.hypothesis_offset = 0;
        self.current_question.clear();
        Ok(())
    }

    /// True once every hypothesis has been concluded and passed
    pub fn is_exhausted(&self) -> bool {
        self.hypothesis_offset >= self.hypotheses.len()
    }

    /// Hypothesis at the current offset
    pub fn current(&self) -> Option<&Hypothesis> {
        self.hypotheses.get(self.hypothesis_offset)
    }

    /// Number of hypotheses currently in progress
    pub fn in_progress_count(&self) -> usize {
        self.hypotheses
            .iter()
            .filter(|h| h.status == HypothesisStatus::InProgress)
            .count()
    }

    /// Move the hypothesis at the offset from pending to in progress
    pub fn begin_current(&mut self) -> StateResult<&Hypothesis> {
        if self.in_progress_count() != 0 {
            return Err(violation("another hypothesis is already in progress"));
        }
        let offset = self.hypothesis_offset;
        let hypothesis = self
            .hypotheses
            .get_mut(offset)
            .ok_or_else(|| violation(format!("no hypothesis at offset {offset}")))?;
        if hypothesis.status != HypothesisStatus::Pending {
            return Err(violation(format!(
                "hypothesis {} cannot start from status {}",
                hypothesis.id, hypothesis.status
            )));
        }

        hypothesis.status = HypothesisStatus::InProgress;
        self.current_question.clear();
        Ok(&*hypothesis)
    }

    fn active_mut(&mut self) -> StateResult<&mut Hypothesis> {
        let offset = self.hypothesis_offset;
        match self.hypotheses.get_mut(offset) {
            Some(h) if h.status == HypothesisStatus::InProgress => Ok(h),
            Some(h) => Err(violation(format!(
                "hypothesis {} is {}, not in progress",
                h.id, h.status
            ))),
            None => Err(violation(format!("no hypothesis at offset {offset}"))),
        }
    }

    /// Append a transcript message to the active hypothesis.
    ///
    /// Questions become the current question; non-blank answers count as
    /// evidence.
    pub fn record_message(&mut self, role: Role, content: String) -> StateResult<InterviewMessage> {
        let hypothesis = self.active_mut()?;

        let message = InterviewMessage {
            hypothesis_id: hypothesis.id.clone(),
            index: hypothesis.messages.len(),
            role,
            content,
            status: hypothesis.status,
        };
        if role == Role::User && !message.content.trim().is_empty() {
            hypothesis.evidence_count += 1;
        }
        hypothesis.messages.push(message.clone());
        hypothesis.interview_message_count = hypothesis.messages.len();

        if role == Role::Assistant {
            self.current_question = message.content.clone();
        }
        Ok(message)
    }

    /// Settle the active hypothesis
    pub fn conclude_current(
        &mut self,
        verdict: Verdict,
        root_cause: String,
    ) -> StateResult<&Hypothesis> {
        let hypothesis = self.active_mut()?;
        hypothesis.status = verdict.into();
        hypothesis.root_cause = root_cause;
        self.current_question.clear();
        Ok(&self.hypotheses[self.hypothesis_offset])
    }

    /// Step past the concluded hypothesis at the offset
    pub fn advance(&mut self) -> StateResult<usize> {
        let current = self
            .current()
            .ok_or_else(|| violation("offset already past the last hypothesis"))?;
        if !current.status.is_concluded() {
            return Err(violation(format!(
                "cannot advance past hypothesis {} with status {}",
                current.id, current.status
            )));
        }
        self.hypothesis_offset += 1;
        Ok(self.hypothesis_offset)
    }

    /// Return an interrupted hypothesis to pending so a failed run keeps
    /// nothing in progress. Its transcript is kept.
    pub fn abandon_active(&mut self) -> Option<String> {
        self.current_question.clear();
        let hypothesis = self
            .hypotheses
            .iter_mut()
            .find(|h| h.status == HypothesisStatus::InProgress)?;
        hypothesis.status = HypothesisStatus::Pending;
        Some(hypothesis.id.clone())
    }

    /// Full consistency check, run before synthesis
    pub fn check_invariants(&self) -> StateResult<()> {
        if self.in_progress_count() > 1 {
            return Err(violation("more than one hypothesis in progress"));
        }
        for h in &self.hypotheses {
            if h.interview_message_count != h.messages.len() {
                return Err(violation(format!(
                    "hypothesis {} reports {} messages but holds {}",
                    h.id,
                    h.interview_message_count,
                    h.messages.len()
                )));
            }
            if h.messages.iter().enumerate().any(|(i, m)| m.index != i) {
                return Err(violation(format!(
                    "hypothesis {} transcript indices are not sequential",
                    h.id
                )));
            }
        }
        Ok(())
    }

    /// Concluded hypotheses other than the one at the offset
    pub fn concluded_others(&self) -> impl Iterator<Item = &Hypothesis> {
        let offset = self.hypothesis_offset;
        self.hypotheses
            .iter()
            .enumerate()
            .filter(move |(i, h)| *i != offset && h.status.is_concluded())
            .map(|(_, h)| h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(n: usize) -> SimulationState {
        let mut state = SimulationState::default();
        let batch = (1..=n)
            .map(|i| Hypothesis::new(i, format!("T{i}"), format!("D{i}")))
            .collect();
        state.load_hypotheses(batch).unwrap();
        state
    }

    // === Loading Tests ===

    #[test]
    fn test_load_sets_offset() {
        let state = loaded(2);
        assert_eq!(state.hypothesis_offset, 0);
        assert_eq!(state.current().unwrap().id, "h-1");
        assert!(!state.is_exhausted());
    }

    #[test]
    fn test_load_twice_rejected() {
        let mut state = loaded(1);
        let err = state
            .load_hypotheses(vec![Hypothesis::new(1, "a", "b")])
            .unwrap_err();
        assert!(matches!(err, SimulationError::InvariantViolation(_)));
    }

    #[test]
    fn test_load_empty_rejected() {
        let mut state = SimulationState::default();
        assert!(state.load_hypotheses(Vec::new()).is_err());
    }

    // === Interview Progression Tests ===

    #[test]
    fn test_full_progression() {
        let mut state = loaded(2);

        state.begin_current().unwrap();
        assert_eq!(state.in_progress_count(), 1);

        let q = state.record_message(Role::Assistant, "When did it last happen?".into()).unwrap();
        assert_eq!(q.index, 0);
        assert_eq!(q.status, HypothesisStatus::InProgress);
        assert_eq!(state.current_question, "When did it last happen?");

        let a = state.record_message(Role::User, "Last Tuesday.".into()).unwrap();
        assert_eq!(a.index, 1);

        let h = state.conclude_current(Verdict::Confirmed, "Manual exports".into()).unwrap();
        assert_eq!(h.status, HypothesisStatus::Confirmed);
        assert_eq!(h.evidence_count, 1);
        assert_eq!(h.interview_message_count, 2);
        assert!(state.current_question.is_empty());

        assert_eq!(state.advance().unwrap(), 1);
        assert_eq!(state.in_progress_count(), 0);
        state.begin_current().unwrap();
        state.conclude_current(Verdict::Refuted, String::new()).unwrap();
        state.advance().unwrap();

        assert!(state.is_exhausted());
        state.check_invariants().unwrap();
    }

    #[test]
    fn test_blank_answer_is_not_evidence() {
        let mut state = loaded(1);
        state.begin_current().unwrap();
        state.record_message(Role::Assistant, "Q".into()).unwrap();
        state.record_message(Role::User, "   ".into()).unwrap();
        assert_eq!(state.hypotheses[0].evidence_count, 0);
        assert_eq!(state.hypotheses[0].interview_message_count, 2);
    }

    #[test]
    fn test_cannot_advance_unconcluded() {
        let mut state = loaded(1);
        assert!(state.advance().is_err());
        state.begin_current().unwrap();
        assert!(state.advance().is_err());
    }

    #[test]
    fn test_cannot_record_without_active() {
        let mut state = loaded(1);
        assert!(state.record_message(Role::Assistant, "Q".into()).is_err());
    }

    #[test]
    fn test_second_in_progress_detected() {
        let mut state = loaded(2);
        state.hypotheses[1].status = HypothesisStatus::InProgress;
        let err = state.begin_current().unwrap_err();
        assert!(matches!(err, SimulationError::InvariantViolation(_)));
    }

    #[test]
    fn test_concluded_is_immutable() {
        let mut state = loaded(1);
        state.begin_current().unwrap();
        state.conclude_current(Verdict::Refuted, "none".into()).unwrap();
        assert!(state.record_message(Role::User, "late".into()).is_err());
        assert!(state.conclude_current(Verdict::Confirmed, "x".into()).is_err());
    }

    #[test]
    fn test_abandon_active() {
        let mut state = loaded(2);
        assert!(state.abandon_active().is_none());

        state.begin_current().unwrap();
        state.record_message(Role::Assistant, "Q".into()).unwrap();
        assert_eq!(state.abandon_active().as_deref(), Some("h-1"));
        assert_eq!(state.in_progress_count(), 0);
        assert_eq!(state.hypotheses[0].status, HypothesisStatus::Pending);
        assert_eq!(state.hypotheses[0].interview_message_count, 1);
        assert!(state.current_question.is_empty());
    }

    #[test]
    fn test_concluded_others_skips_current() {
        let mut state = loaded(2);
        state.begin_current().unwrap();
        state.conclude_current(Verdict::Confirmed, "rc".into()).unwrap();
        assert_eq!(state.concluded_others().count(), 0);
        state.advance().unwrap();
        let ids: Vec<_> = state.concluded_others().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["h-1"]);
    }
}
