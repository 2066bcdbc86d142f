use super::domain::{ScenarioDefinition, ScenarioId, SessionId, UserId};
use super::session::SimulationSession;

/// Storage abstraction for session state so the engine can be exercised in isolation.
pub trait SessionStore: Send + Sync {
    fn insert(&self, session: SimulationSession) -> Result<SimulationSession, RepositoryError>;
    fn update(&self, session: SimulationSession) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &SessionId) -> Result<Option<SimulationSession>, RepositoryError>;
    fn for_user(&self, user_id: &UserId) -> Result<Vec<SimulationSession>, RepositoryError>;
}

/// Source of raw, not yet validated scenario definitions.
pub trait ScenarioStore: Send + Sync {
    fn fetch(&self, id: &ScenarioId) -> Result<Option<ScenarioDefinition>, RepositoryError>;
    fn ids(&self) -> Result<Vec<ScenarioId>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("stored record is malformed: {0}")]
    Malformed(String),
}
