use courtcraft::config::{AdjudicationSettings, SimulationSettings};
use courtcraft::simulation::{
    DirectoryScenarioStore, GeminiClient, RepositoryError, ScenarioCatalog, SessionId,
    SessionStore, SimulationSession, TextGenerator, UnconfiguredGenerator, UserId,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemorySessionStore {
    sessions: Arc<Mutex<HashMap<SessionId, SimulationSession>>>,
}

impl SessionStore for InMemorySessionStore {
    fn insert(&self, session: SimulationSession) -> Result<SimulationSession, RepositoryError> {
        let mut guard = self.sessions.lock().expect("session mutex poisoned");
        if guard.contains_key(&session.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    fn update(&self, session: SimulationSession) -> Result<(), RepositoryError> {
        let mut guard = self.sessions.lock().expect("session mutex poisoned");
        if guard.contains_key(&session.id) {
            guard.insert(session.id.clone(), session);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
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

/// Directory-backed catalog when configured, otherwise the built-in scenarios.
pub(crate) fn build_catalog(settings: &SimulationSettings) -> ScenarioCatalog {
    match &settings.scenario_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "loading scenarios from directory");
            ScenarioCatalog::new(Box::new(DirectoryScenarioStore::new(dir.clone())))
        }
        None => ScenarioCatalog::seeded(),
    }
}

pub(crate) fn build_generator(settings: &AdjudicationSettings) -> Arc<dyn TextGenerator> {
    match &settings.api_key {
        Some(key) => Arc::new(GeminiClient::new(key.clone(), settings.model.clone())),
        None => {
            warn!("GEMINI_API_KEY not set; turns will be rejected as AIUnavailable");
            Arc::new(UnconfiguredGenerator)
        }
    }
}
