use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::response::Response;
use serde_json::Value;

use crate::simulation::catalog::{seed, InMemoryScenarioStore, ScenarioCatalog};
use crate::simulation::domain::{
    CriterionId, EvidenceCategory, EvidenceId, EvidenceItem, Milestone, MilestoneId,
    RubricCriterion, ScenarioDefinition, ScenarioId, SessionId, UserId,
};
use crate::simulation::repository::{RepositoryError, SessionStore};
use crate::simulation::session::{SessionSnapshot, SimulationSession};
use crate::simulation::{
    simulation_router, Adjudicator, AdjudicatorConfig, ScriptedGenerator, ScriptedReply,
    SimulationConfig, SimulationEngine,
};

pub(super) const MOOT_ID: &str = "moot-001";

/// One criterion worth 100 points, pass mark 70, two milestones.
pub(super) fn moot_scenario() -> ScenarioDefinition {
    ScenarioDefinition {
        id: ScenarioId::new(MOOT_ID),
        title: "Moot Bail Hearing".to_string(),
        practice_area: "Criminal Law".to_string(),
        facts: "The accused seeks bail pending trial.".to_string(),
        provisions: vec!["Section 480 BNSS".to_string()],
        milestones: vec![
            Milestone {
                id: MilestoneId::new("submissions"),
                title: "Submissions".to_string(),
                description: "Present the grounds for bail.".to_string(),
            },
            Milestone {
                id: MilestoneId::new("order"),
                title: "Order".to_string(),
                description: "Obtain the bail order.".to_string(),
            },
        ],
        evidence: vec![EvidenceItem {
            id: EvidenceId::new("ev-surety"),
            name: "Surety Bond".to_string(),
            category: EvidenceCategory::Document,
            tags: vec!["surety".to_string(), "bond".to_string()],
            description: "Bond offered by the accused's employer.".to_string(),
            media: None,
        }],
        rubric: vec![RubricCriterion {
            id: CriterionId::new("grounds"),
            description: "Establishes grounds for bail".to_string(),
            weight: 100.0,
            satisfied_when: "The argument addresses flight risk and tampering.".to_string(),
        }],
        pass_threshold: 70.0,
        max_turns: 5,
        verdict_tags: Vec::new(),
    }
}

pub(super) fn catalog_with(scenarios: Vec<ScenarioDefinition>) -> Arc<ScenarioCatalog> {
    let store = InMemoryScenarioStore::seeded();
    for scenario in scenarios {
        store.put(scenario);
    }
    Arc::new(ScenarioCatalog::new(Box::new(store)))
}

pub(super) fn fast_adjudicator_config() -> AdjudicatorConfig {
    AdjudicatorConfig {
        call_timeout: Duration::from_millis(50),
        max_retries: 1,
        backoff_base: Duration::from_millis(1),
        ..AdjudicatorConfig::default()
    }
}

pub(super) struct Harness {
    pub(super) engine: Arc<SimulationEngine<MemorySessionStore>>,
    pub(super) store: Arc<MemorySessionStore>,
    pub(super) generator: Arc<ScriptedGenerator>,
}

pub(super) fn harness_with(
    scenarios: Vec<ScenarioDefinition>,
    replies: Vec<ScriptedReply>,
    config: SimulationConfig,
) -> Harness {
    harness_with_adjudicator(scenarios, replies, config, fast_adjudicator_config())
}

pub(super) fn harness_with_adjudicator(
    scenarios: Vec<ScenarioDefinition>,
    replies: Vec<ScriptedReply>,
    config: SimulationConfig,
    adjudicator_config: AdjudicatorConfig,
) -> Harness {
    let store = Arc::new(MemorySessionStore::default());
    let generator = Arc::new(ScriptedGenerator::new(replies));
    let adjudicator = Adjudicator::new(generator.clone(), adjudicator_config);
    let engine = Arc::new(SimulationEngine::new(
        store.clone(),
        catalog_with(scenarios),
        adjudicator,
        config,
    ));
    Harness {
        engine,
        store,
        generator,
    }
}

pub(super) fn harness(replies: Vec<ScriptedReply>) -> Harness {
    harness_with(vec![moot_scenario()], replies, SimulationConfig::default())
}

pub(super) fn reply(text: &str) -> ScriptedReply {
    ScriptedReply::Text(text.to_string())
}

pub(super) fn verdict_reply(criteria: &str, confidence: f64, milestone: Option<&str>) -> ScriptedReply {
    reply(&format!(
        "CLASSIFICATION: Sustained\nCRITERIA: {criteria}\nCONFIDENCE: {confidence}\nMILESTONE: {}\nRATIONALE: Noted.",
        milestone.unwrap_or("NONE")
    ))
}

pub(super) fn start_moot(harness: &Harness) -> SessionSnapshot {
    harness
        .engine
        .start(UserId::new("user-1"), ScenarioId::new(MOOT_ID))
        .expect("session starts")
}

pub(super) fn start_inventory(harness: &Harness) -> SessionSnapshot {
    harness
        .engine
        .start(UserId::new("user-1"), ScenarioId::new(seed::INVENTORY_CASE_ID))
        .expect("session starts")
}

pub(super) fn stored(harness: &Harness, id: &SessionId) -> SimulationSession {
    harness
        .store
        .fetch(id)
        .expect("store available")
        .expect("session stored")
}

#[derive(Default, Clone)]
pub(super) struct MemorySessionStore {
    sessions: Arc<Mutex<HashMap<SessionId, SimulationSession>>>,
    /// Successful updates left before the next one fails.
    failing_update: Arc<Mutex<Option<usize>>>,
}

impl MemorySessionStore {
    /// Let `successes` updates through, fail the next one, then recover.
    pub(super) fn fail_update_after(&self, successes: usize) {
        *self.failing_update.lock().expect("fault mutex poisoned") = Some(successes);
    }
}

impl SessionStore for MemorySessionStore {
    fn insert(&self, session: SimulationSession) -> Result<SimulationSession, RepositoryError> {
        let mut guard = self.sessions.lock().expect("session mutex poisoned");
        if guard.contains_key(&session.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    fn update(&self, session: SimulationSession) -> Result<(), RepositoryError> {
        {
            let mut fault = self.failing_update.lock().expect("fault mutex poisoned");
            match *fault {
                Some(0) => {
                    *fault = None;
                    return Err(RepositoryError::Unavailable("write rejected".to_string()));
                }
                Some(remaining) => *fault = Some(remaining - 1),
                None => {}
            }
        }
        let mut guard = self.sessions.lock().expect("session mutex poisoned");
        guard.insert(session.id.clone(), session);
        Ok(())
    }

    fn fetch(&self, id: &SessionId) -> Result<Option<SimulationSession>, RepositoryError> {
        let guard = self.sessions.lock().expect("session mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn for_user(&self, user_id: &UserId) -> Result<Vec<SimulationSession>, RepositoryError> {
        let guard = self.sessions.lock().expect("session mutex poisoned");
        Ok(guard
            .values()
            .filter(|session| &session.user_id == user_id)
            .cloned()
            .collect())
    }
}

pub(super) struct UnavailableStore;

impl SessionStore for UnavailableStore {
    fn insert(&self, _session: SimulationSession) -> Result<SimulationSession, RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }

    fn update(&self, _session: SimulationSession) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }

    fn fetch(&self, _id: &SessionId) -> Result<Option<SimulationSession>, RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }

    fn for_user(&self, _user_id: &UserId) -> Result<Vec<SimulationSession>, RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }
}

pub(super) fn router_for(harness: &Harness) -> axum::Router {
    simulation_router(harness.engine.clone())
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
