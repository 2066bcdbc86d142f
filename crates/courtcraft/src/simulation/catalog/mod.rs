//! Validated, process-lifetime cache of scenario definitions.

mod manifest;
pub mod seed;
mod store;
mod validation;

pub use manifest::ManifestError;
pub use store::{DirectoryScenarioStore, InMemoryScenarioStore};
pub use validation::ScenarioValidationError;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use super::domain::{ScenarioDefinition, ScenarioId, ScenarioSummary};
use super::repository::{RepositoryError, ScenarioStore};

/// Read-mostly catalog; definitions are validated once and shared immutably afterwards.
pub struct ScenarioCatalog {
    store: Box<dyn ScenarioStore>,
    cache: RwLock<HashMap<ScenarioId, Arc<ScenarioDefinition>>>,
}

impl std::fmt::Debug for ScenarioCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioCatalog").finish_non_exhaustive()
    }
}

impl ScenarioCatalog {
    pub fn new(store: Box<dyn ScenarioStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Catalog over the built-in scenarios only.
    pub fn seeded() -> Self {
        Self::new(Box::new(InMemoryScenarioStore::seeded()))
    }

    pub fn load(&self, id: &ScenarioId) -> Result<Arc<ScenarioDefinition>, CatalogError> {
        if let Some(cached) = self.cached(id) {
            return Ok(cached);
        }

        let scenario = match self.store.fetch(id) {
            Ok(Some(scenario)) => scenario,
            Ok(None) => return Err(CatalogError::NotFound(id.clone())),
            Err(RepositoryError::Malformed(reason)) => {
                return Err(CatalogError::Invalid {
                    id: id.clone(),
                    source: ScenarioValidationError::Malformed(reason),
                })
            }
            Err(err) => return Err(CatalogError::Repository(err)),
        };

        if &scenario.id != id {
            return Err(CatalogError::Invalid {
                id: id.clone(),
                source: ScenarioValidationError::Malformed(format!(
                    "definition declares id '{}'",
                    scenario.id
                )),
            });
        }

        validation::validate(&scenario).map_err(|source| CatalogError::Invalid {
            id: id.clone(),
            source,
        })?;

        let scenario = Arc::new(scenario);
        let mut cache = match self.cache.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // A concurrent loader may have won the race; keep the first validated copy.
        let entry = cache.entry(id.clone()).or_insert_with(|| scenario.clone());
        debug!(scenario = %id, "scenario validated and cached");
        Ok(entry.clone())
    }

    /// Summaries of every scenario that passes validation.
    pub fn list(&self) -> Result<Vec<ScenarioSummary>, CatalogError> {
        let ids = self.store.ids().map_err(CatalogError::Repository)?;
        let mut summaries = Vec::with_capacity(ids.len());

        for id in ids {
            match self.load(&id) {
                Ok(scenario) => summaries.push(scenario.summary()),
                Err(CatalogError::Invalid { id, source }) => {
                    warn!(scenario = %id, error = %source, "skipping invalid scenario");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(summaries)
    }

    fn cached(&self, id: &ScenarioId) -> Option<Arc<ScenarioDefinition>> {
        let cache = match self.cache.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache.get(id).cloned()
    }
}

/// Check a standalone definition without registering it.
pub fn validate_definition(scenario: &ScenarioDefinition) -> Result<(), ScenarioValidationError> {
    validation::validate(scenario)
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("scenario '{0}' not found")]
    NotFound(ScenarioId),
    #[error("scenario '{id}' is invalid: {source}")]
    Invalid {
        id: ScenarioId,
        source: ScenarioValidationError,
    },
    #[error(transparent)]
    Repository(RepositoryError),
}
