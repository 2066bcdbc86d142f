use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use super::adjudicator::{Adjudication, AdjudicationError, Adjudicator};
use super::catalog::{CatalogError, ScenarioCatalog};
use super::certification::{CertificationError, CertificationIssuer, CertificationResult};
use super::domain::{
    EvidenceCategory, EvidenceId, EvidenceItem, ScenarioDefinition, ScenarioId, ScenarioSummary,
    SessionId, UserId,
};
use super::evidence::{EvidenceError, EvidenceRegistry};
use super::repository::{RepositoryError, SessionStore};
use super::scoring::{ScoreBreakdown, ScoringEngine, ScoringError};
use super::session::{
    CompletionReason, PendingTurn, SessionSnapshot, SessionState, SimulationSession,
    TransitionError, TurnInput,
};

/// Engine-level policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationConfig {
    /// Failed adjudications a session tolerates before it is marked `Failed`.
    pub max_adjudication_failures: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_adjudication_failures: 2,
        }
    }
}

/// Facade composing the catalog, evidence registry, adjudicator, scoring, and certification.
///
/// Session state only changes inside short synchronous sections guarded by one
/// transition lock; the adjudication call runs outside it.
pub struct SimulationEngine<S> {
    sessions: Arc<S>,
    catalog: Arc<ScenarioCatalog>,
    evidence: EvidenceRegistry,
    adjudicator: Arc<Adjudicator>,
    scoring: ScoringEngine,
    issuer: CertificationIssuer,
    config: SimulationConfig,
    transitions: Mutex<()>,
}

impl<S> SimulationEngine<S>
where
    S: SessionStore + 'static,
{
    pub fn new(
        sessions: Arc<S>,
        catalog: Arc<ScenarioCatalog>,
        adjudicator: Adjudicator,
        config: SimulationConfig,
    ) -> Self {
        let scoring = ScoringEngine::new();
        Self {
            sessions,
            evidence: EvidenceRegistry::new(catalog.clone()),
            catalog,
            adjudicator: Arc::new(adjudicator),
            scoring,
            issuer: CertificationIssuer::new(scoring),
            config,
            transitions: Mutex::new(()),
        }
    }

    pub fn catalog(&self) -> &Arc<ScenarioCatalog> {
        &self.catalog
    }

    pub fn adjudicator(&self) -> &Adjudicator {
        &self.adjudicator
    }

    /// Create a session for `user_id` and move it straight to `InProgress`.
    pub fn start(
        &self,
        user_id: UserId,
        scenario_id: ScenarioId,
    ) -> Result<SessionSnapshot, SimulationError> {
        let scenario = self.catalog.load(&scenario_id)?;

        let mut session = SimulationSession::new(user_id, scenario.id.clone());
        session
            .start()
            .map_err(|err| SimulationError::from_transition(&session.id, err))?;
        let stored = self.sessions.insert(session)?;

        info!(
            session = %stored.id,
            user = %stored.user_id,
            scenario = %stored.scenario_id,
            "simulation session started"
        );
        Ok(stored.snapshot())
    }

    /// Submit one turn and wait for it to be adjudicated, scored, and committed.
    ///
    /// Adjudication runs on a spawned task so a dropped caller cannot leave the
    /// session stuck in `AwaitingAdjudication`.
    pub async fn submit_turn(
        self: &Arc<Self>,
        session_id: &SessionId,
        input: TurnInput,
    ) -> Result<SessionSnapshot, SimulationError> {
        let (session, scenario) = self.reserve_turn(session_id, &input)?;
        let submitted_at = Utc::now();

        let engine = Arc::clone(self);
        let task = tokio::spawn(async move {
            let outcome = engine
                .adjudicator
                .adjudicate(&scenario, &session, &input)
                .await;
            engine.settle_turn(&session.id, &scenario, input, submitted_at, outcome)
        });

        match task.await {
            Ok(result) => result,
            Err(join_error) => {
                error!(session = %session_id, error = %join_error, "adjudication task aborted");
                Err(SimulationError::AiUnavailable {
                    reason: join_error.to_string(),
                    session_failed: false,
                })
            }
        }
    }

    pub fn get_state(&self, session_id: &SessionId) -> Result<SessionSnapshot, SimulationError> {
        Ok(self.fetch(session_id)?.snapshot())
    }

    pub fn abort(&self, session_id: &SessionId) -> Result<SessionSnapshot, SimulationError> {
        let _guard = self.lock();
        let mut session = self.fetch(session_id)?;
        let previous = session.state;
        session
            .abort()
            .map_err(|err| SimulationError::from_transition(session_id, err))?;
        self.sessions.update(session.clone())?;

        info!(session = %session_id, from = %previous, "simulation session aborted");
        Ok(session.snapshot())
    }

    /// Issue the certificate for a completed session; repeated calls return the same result.
    pub fn certify(&self, session_id: &SessionId) -> Result<CertificationResult, SimulationError> {
        let _guard = self.lock();
        let mut session = self.fetch(session_id)?;
        let scenario = self.catalog.load(&session.scenario_id)?;

        let (result, created) = self
            .issuer
            .certify(&scenario, &mut session)
            .map_err(|CertificationError::NotComplete(state)| {
                SimulationError::SessionNotComplete(state)
            })?;

        if created {
            self.sessions.update(session)?;
            info!(
                session = %session_id,
                certificate = %result.certificate_id,
                score = result.final_score,
                passed = result.passed,
                "certification issued"
            );
        }
        Ok(result)
    }

    pub fn current_score(&self, session_id: &SessionId) -> Result<ScoreBreakdown, SimulationError> {
        let session = self.fetch(session_id)?;
        let scenario = self.catalog.load(&session.scenario_id)?;
        Ok(self.scoring.current_score(&scenario, &session))
    }

    /// A user's sessions, most recently updated first.
    pub fn sessions_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<SessionSnapshot>, SimulationError> {
        let mut sessions = self.sessions.for_user(user_id)?;
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions.iter().map(SimulationSession::snapshot).collect())
    }

    pub fn list_scenarios(&self) -> Result<Vec<ScenarioSummary>, SimulationError> {
        Ok(self.catalog.list()?)
    }

    pub fn search_evidence(
        &self,
        scenario_id: &ScenarioId,
        query: &str,
        category: Option<EvidenceCategory>,
    ) -> Result<Vec<EvidenceItem>, SimulationError> {
        Ok(self.evidence.search(scenario_id, query, category)?)
    }

    pub fn evidence_item(
        &self,
        scenario_id: &ScenarioId,
        evidence_id: &EvidenceId,
    ) -> Result<EvidenceItem, SimulationError> {
        Ok(self.evidence.get(scenario_id, evidence_id)?)
    }

    /// Validate a submission and reserve the session for it.
    fn reserve_turn(
        &self,
        session_id: &SessionId,
        input: &TurnInput,
    ) -> Result<(SimulationSession, Arc<ScenarioDefinition>), SimulationError> {
        let _guard = self.lock();
        let mut session = self.fetch(session_id)?;

        match session.state {
            SessionState::InProgress => {}
            SessionState::AwaitingAdjudication => {
                return Err(SimulationError::SessionBusy(session_id.clone()))
            }
            SessionState::Completed
                if session.completion == Some(CompletionReason::TurnLimitReached) =>
            {
                let scenario = self.catalog.load(&session.scenario_id)?;
                return Err(SimulationError::TurnLimitExceeded {
                    limit: scenario.max_turns,
                });
            }
            state => {
                return Err(SimulationError::InvalidState {
                    state,
                    action: "submit a turn to",
                })
            }
        }

        if input.text.trim().is_empty() {
            return Err(SimulationError::EmptyInput);
        }

        let scenario = self.catalog.load(&session.scenario_id)?;
        for evidence_id in &input.evidence_refs {
            self.evidence.get(&scenario.id, evidence_id)?;
        }

        if session.turn_count() >= scenario.max_turns {
            session
                .complete_at_turn_limit()
                .map_err(|err| SimulationError::from_transition(session_id, err))?;
            self.sessions.update(session)?;
            info!(
                session = %session_id,
                limit = scenario.max_turns,
                "turn limit reached; session completed"
            );
            return Err(SimulationError::TurnLimitExceeded {
                limit: scenario.max_turns,
            });
        }

        session
            .begin_adjudication()
            .map_err(|err| SimulationError::from_transition(session_id, err))?;
        self.sessions.update(session.clone())?;

        info!(
            session = %session_id,
            turn = session.turn_count() + 1,
            evidence = input.evidence_refs.len(),
            "turn accepted for adjudication"
        );
        Ok((session, scenario))
    }

    /// Apply the adjudication outcome to the session as one transaction.
    fn settle_turn(
        &self,
        session_id: &SessionId,
        scenario: &ScenarioDefinition,
        input: TurnInput,
        submitted_at: DateTime<Utc>,
        outcome: Result<Adjudication, AdjudicationError>,
    ) -> Result<SessionSnapshot, SimulationError> {
        let _guard = self.lock();
        let mut session = self.fetch(session_id)?;

        if session.state != SessionState::AwaitingAdjudication {
            info!(
                session = %session_id,
                state = %session.state,
                "discarding adjudication for session no longer awaiting it"
            );
            return Err(SimulationError::SessionAborted(session_id.clone()));
        }

        let adjudication = match outcome {
            Ok(adjudication) => adjudication,
            Err(err) => {
                let state = session
                    .record_adjudication_failure(self.config.max_adjudication_failures)
                    .map_err(|err| SimulationError::from_transition(session_id, err))?;
                self.sessions.update(session)?;
                let session_failed = state == SessionState::Failed;
                warn!(
                    session = %session_id,
                    error = %err,
                    session_failed,
                    "adjudication failed; turn not committed"
                );
                return Err(SimulationError::AiUnavailable {
                    reason: err.to_string(),
                    session_failed,
                });
            }
        };

        let delta = match self
            .scoring
            .apply(scenario, &session, &adjudication.verdict)
        {
            Ok(delta) => delta,
            Err(err) => {
                error!(
                    session = %session_id,
                    scenario = %scenario.id,
                    error = %err,
                    "verdict inconsistent with scenario rubric"
                );
                session
                    .release_adjudication()
                    .map_err(|err| SimulationError::from_transition(session_id, err))?;
                self.sessions.update(session)?;
                return Err(SimulationError::RubricMismatch(err));
            }
        };

        let pending = PendingTurn {
            input,
            raw_response: adjudication.raw_response,
            verdict: adjudication.verdict,
            score_delta: delta,
            submitted_at,
        };
        match self.commit_pending(session, scenario, pending, adjudication.attempts) {
            Ok(snapshot) => Ok(snapshot),
            Err(err) => {
                self.release_reserved(session_id);
                Err(err)
            }
        }
    }

    fn commit_pending(
        &self,
        mut session: SimulationSession,
        scenario: &ScenarioDefinition,
        pending: PendingTurn,
        attempts: u32,
    ) -> Result<SessionSnapshot, SimulationError> {
        let session_id = session.id.clone();
        for evidence_id in &pending.input.evidence_refs {
            self.evidence.mark_referenced(&mut session, evidence_id)?;
        }

        let committed = session
            .commit_turn(scenario, pending)
            .map_err(|err| SimulationError::from_transition(&session_id, err))?;
        info!(
            session = %session_id,
            turn = committed.sequence,
            delta = committed.score_delta.total,
            classification = committed.verdict.classification.label(),
            attempts,
            "turn committed"
        );

        if session.state == SessionState::Completed {
            info!(
                session = %session_id,
                reason = ?session.completion,
                score = session.score.total(),
                "simulation session completed"
            );
        }

        self.sessions.update(session.clone())?;
        Ok(session.snapshot())
    }

    /// Return a session stuck in `AwaitingAdjudication` to `InProgress` after a failed commit.
    fn release_reserved(&self, session_id: &SessionId) {
        let released = self.fetch(session_id).and_then(|mut session| {
            if session.state != SessionState::AwaitingAdjudication {
                return Ok(());
            }
            session
                .release_adjudication()
                .map_err(|err| SimulationError::from_transition(session_id, err))?;
            self.sessions.update(session)?;
            Ok(())
        });

        match released {
            Ok(()) => warn!(session = %session_id, "turn not committed; session released"),
            Err(err) => error!(
                session = %session_id,
                error = %err,
                "could not release session after failed commit"
            ),
        }
    }

    fn fetch(&self, session_id: &SessionId) -> Result<SimulationSession, SimulationError> {
        self.sessions
            .fetch(session_id)?
            .ok_or_else(|| SimulationError::SessionNotFound(session_id.clone()))
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        match self.transitions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Error raised by the simulation engine; each variant has a stable reason code.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("scenario '{0}' not found")]
    ScenarioNotFound(ScenarioId),
    #[error("scenario '{id}' is invalid: {reason}")]
    ScenarioInvalid { id: ScenarioId, reason: String },
    #[error("session '{0}' not found")]
    SessionNotFound(SessionId),
    #[error("session '{0}' already has a turn awaiting adjudication")]
    SessionBusy(SessionId),
    #[error("evidence '{evidence}' is not part of scenario '{scenario}'")]
    EvidenceNotFound {
        scenario: ScenarioId,
        evidence: EvidenceId,
    },
    #[error("turn limit of {limit} reached; session completed")]
    TurnLimitExceeded { limit: u32 },
    #[error("turn input must not be empty")]
    EmptyInput,
    #[error("cannot {action} a session that is {state}")]
    InvalidState {
        state: SessionState,
        action: &'static str,
    },
    #[error("adjudication unavailable: {reason}")]
    AiUnavailable { reason: String, session_failed: bool },
    #[error("verdict inconsistent with scenario: {0}")]
    RubricMismatch(ScoringError),
    #[error("session is {0}; certification requires a completed session")]
    SessionNotComplete(SessionState),
    #[error("session '{0}' was aborted while its turn was being adjudicated")]
    SessionAborted(SessionId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl SimulationError {
    pub fn code(&self) -> &'static str {
        match self {
            SimulationError::ScenarioNotFound(_) => "ScenarioNotFound",
            SimulationError::ScenarioInvalid { .. } => "ScenarioInvalid",
            SimulationError::SessionNotFound(_) => "SessionNotFound",
            SimulationError::SessionBusy(_) => "SessionBusy",
            SimulationError::EvidenceNotFound { .. } => "EvidenceNotFound",
            SimulationError::TurnLimitExceeded { .. } => "TurnLimitExceeded",
            SimulationError::EmptyInput => "EmptyInput",
            SimulationError::InvalidState { .. } => "InvalidState",
            SimulationError::AiUnavailable { .. } => "AIUnavailable",
            SimulationError::RubricMismatch(_) => "RubricMismatch",
            SimulationError::SessionNotComplete(_) => "SessionNotComplete",
            SimulationError::SessionAborted(_) => "SessionAborted",
            SimulationError::Repository(_) => "Repository",
        }
    }

    fn from_transition(session_id: &SessionId, err: TransitionError) -> Self {
        match err {
            TransitionError::Busy => SimulationError::SessionBusy(session_id.clone()),
            TransitionError::InvalidState { state, action } => {
                SimulationError::InvalidState { state, action }
            }
        }
    }
}

impl From<CatalogError> for SimulationError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(id) => SimulationError::ScenarioNotFound(id),
            CatalogError::Invalid { id, source } => SimulationError::ScenarioInvalid {
                id,
                reason: source.to_string(),
            },
            CatalogError::Repository(err) => SimulationError::Repository(err),
        }
    }
}

impl From<EvidenceError> for SimulationError {
    fn from(err: EvidenceError) -> Self {
        match err {
            EvidenceError::Catalog(err) => err.into(),
            EvidenceError::NotFound { scenario, evidence } => {
                SimulationError::EvidenceNotFound { scenario, evidence }
            }
        }
    }
}
