use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::adjudicator::Verdict;
use super::certification::CertificationResult;
use super::domain::{EvidenceId, MilestoneId, ScenarioDefinition, ScenarioId, SessionId, UserId};
use super::scoring::{ScoreDelta, ScoreSheet};

/// Lifecycle of a simulation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    InProgress,
    AwaitingAdjudication,
    Completed,
    Aborted,
    Failed,
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::NotStarted => "not_started",
            SessionState::InProgress => "in_progress",
            SessionState::AwaitingAdjudication => "awaiting_adjudication",
            SessionState::Completed => "completed",
            SessionState::Aborted => "aborted",
            SessionState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Aborted | SessionState::Failed
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    FinalMilestone,
    TurnLimitReached,
}

/// Counsel's submission for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnInput {
    pub text: String,
    /// Evidence relied on, in submission order; repeats are kept for the transcript.
    #[serde(default)]
    pub evidence_refs: Vec<EvidenceId>,
}

impl TurnInput {
    pub fn new(text: impl Into<String>, evidence_refs: Vec<EvidenceId>) -> Self {
        Self {
            text: text.into(),
            evidence_refs,
        }
    }
}

/// A committed, adjudicated turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub sequence: u32,
    pub input: TurnInput,
    pub raw_response: String,
    pub verdict: Verdict,
    pub score_delta: ScoreDelta,
    pub submitted_at: DateTime<Utc>,
    pub committed_at: DateTime<Utc>,
}

/// Adjudicated outcome waiting to be committed as the next turn.
#[derive(Debug, Clone)]
pub(crate) struct PendingTurn {
    pub input: TurnInput,
    pub raw_response: String,
    pub verdict: Verdict,
    pub score_delta: ScoreDelta,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot {action} a session that is {state}")]
    InvalidState {
        state: SessionState,
        action: &'static str,
    },
    #[error("a turn is already awaiting adjudication")]
    Busy,
}

/// Mutable per-user, per-scenario simulation state.
///
/// Every mutation goes through the transition methods below so that the running score
/// always equals the sum of committed turn deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSession {
    pub id: SessionId,
    pub user_id: UserId,
    pub scenario_id: ScenarioId,
    pub state: SessionState,
    pub turns: Vec<Turn>,
    /// Distinct evidence relied on, in first-reference order.
    pub referenced_evidence: Vec<EvidenceId>,
    pub score: ScoreSheet,
    /// Furthest milestone reached so far.
    pub milestone: Option<MilestoneId>,
    /// Turns rejected because adjudication could not produce a verdict.
    pub failed_adjudications: u32,
    pub completion: Option<CompletionReason>,
    pub certification: Option<CertificationResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SimulationSession {
    pub fn new(user_id: UserId, scenario_id: ScenarioId) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(format!("sim-{}", uuid::Uuid::new_v4().simple())),
            user_id,
            scenario_id,
            state: SessionState::NotStarted,
            turns: Vec::new(),
            referenced_evidence: Vec::new(),
            score: ScoreSheet::default(),
            milestone: None,
            failed_adjudications: 0,
            completion: None,
            certification: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn turn_count(&self) -> u32 {
        self.turns.len() as u32
    }

    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.expect_state(SessionState::NotStarted, "start")?;
        self.transition(SessionState::InProgress);
        Ok(())
    }

    /// Reserve the session for a single in-flight turn.
    pub fn begin_adjudication(&mut self) -> Result<(), TransitionError> {
        match self.state {
            SessionState::InProgress => {
                self.transition(SessionState::AwaitingAdjudication);
                Ok(())
            }
            SessionState::AwaitingAdjudication => Err(TransitionError::Busy),
            state => Err(TransitionError::InvalidState {
                state,
                action: "submit a turn to",
            }),
        }
    }

    /// Return an in-flight session to `InProgress` without committing anything.
    pub fn release_adjudication(&mut self) -> Result<(), TransitionError> {
        self.expect_state(SessionState::AwaitingAdjudication, "release")?;
        self.transition(SessionState::InProgress);
        Ok(())
    }

    /// Count a failed adjudication; the session fails once `limit` failures accumulate.
    ///
    /// Returns the resulting state.
    pub fn record_adjudication_failure(
        &mut self,
        limit: u32,
    ) -> Result<SessionState, TransitionError> {
        self.expect_state(SessionState::AwaitingAdjudication, "record a failure on")?;
        self.failed_adjudications += 1;
        let next = if self.failed_adjudications >= limit.max(1) {
            SessionState::Failed
        } else {
            SessionState::InProgress
        };
        self.transition(next);
        Ok(next)
    }

    /// Append an adjudicated turn and apply its score delta and milestone.
    ///
    /// Evidence references are recorded beforehand through the evidence registry.
    pub(crate) fn commit_turn(
        &mut self,
        scenario: &ScenarioDefinition,
        pending: PendingTurn,
    ) -> Result<&Turn, TransitionError> {
        self.expect_state(SessionState::AwaitingAdjudication, "commit a turn to")?;

        self.score.commit(&pending.score_delta);
        self.advance_milestone(scenario, pending.verdict.milestone.as_ref());

        let reached_final = match (&self.milestone, scenario.final_milestone()) {
            (Some(current), Some(last)) => current == &last.id,
            _ => false,
        };

        let sequence = self.turn_count() + 1;
        self.turns.push(Turn {
            sequence,
            input: pending.input,
            raw_response: pending.raw_response,
            verdict: pending.verdict,
            score_delta: pending.score_delta,
            submitted_at: pending.submitted_at,
            committed_at: Utc::now(),
        });

        if reached_final {
            self.finish(CompletionReason::FinalMilestone);
        } else if self.turn_count() >= scenario.max_turns {
            self.finish(CompletionReason::TurnLimitReached);
        } else {
            self.transition(SessionState::InProgress);
        }

        self.turns
            .last()
            .ok_or(TransitionError::InvalidState {
                state: self.state,
                action: "commit a turn to",
            })
    }

    /// Close an in-progress session that has used up its turn allowance.
    pub fn complete_at_turn_limit(&mut self) -> Result<(), TransitionError> {
        self.expect_state(SessionState::InProgress, "complete")?;
        self.finish(CompletionReason::TurnLimitReached);
        Ok(())
    }

    pub fn abort(&mut self) -> Result<(), TransitionError> {
        if self.state.is_terminal() {
            return Err(TransitionError::InvalidState {
                state: self.state,
                action: "abort",
            });
        }
        self.transition(SessionState::Aborted);
        Ok(())
    }

    pub(crate) fn seal(&mut self, certificate: CertificationResult) {
        self.certification = Some(certificate);
        self.updated_at = Utc::now();
    }

    /// Add to the referenced set. Returns `true` if the item was not referenced before.
    pub fn note_evidence(&mut self, evidence_id: &EvidenceId) -> bool {
        if self.referenced_evidence.contains(evidence_id) {
            return false;
        }
        self.referenced_evidence.push(evidence_id.clone());
        self.updated_at = Utc::now();
        true
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            scenario_id: self.scenario_id.clone(),
            state: self.state,
            turn_count: self.turn_count(),
            score: self.score.total(),
            milestone: self.milestone.clone(),
            completion: self.completion,
            failed_adjudications: self.failed_adjudications,
            referenced_evidence: self.referenced_evidence.clone(),
            turns: self.turns.clone(),
            certificate_id: self
                .certification
                .as_ref()
                .map(|certificate| certificate.certificate_id.clone()),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn advance_milestone(&mut self, scenario: &ScenarioDefinition, reached: Option<&MilestoneId>) {
        let Some(reached) = reached else {
            return;
        };
        let Some(reached_index) = scenario.milestone_index(reached) else {
            return;
        };
        let current_index = self
            .milestone
            .as_ref()
            .and_then(|current| scenario.milestone_index(current));
        if current_index.map_or(true, |current| reached_index > current) {
            self.milestone = Some(reached.clone());
        }
    }

    fn finish(&mut self, reason: CompletionReason) {
        self.completion = Some(reason);
        self.transition(SessionState::Completed);
    }

    fn expect_state(
        &self,
        expected: SessionState,
        action: &'static str,
    ) -> Result<(), TransitionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(TransitionError::InvalidState {
                state: self.state,
                action,
            })
        }
    }

    fn transition(&mut self, next: SessionState) {
        self.state = next;
        self.updated_at = Utc::now();
    }
}

/// Read-only view returned to API callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub user_id: UserId,
    pub scenario_id: ScenarioId,
    pub state: SessionState,
    pub turn_count: u32,
    pub score: f64,
    pub milestone: Option<MilestoneId>,
    pub completion: Option<CompletionReason>,
    pub failed_adjudications: u32,
    pub referenced_evidence: Vec<EvidenceId>,
    pub turns: Vec<Turn>,
    pub certificate_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
