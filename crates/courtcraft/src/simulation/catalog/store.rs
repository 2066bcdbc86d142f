use std::collections::BTreeMap;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::super::domain::{ScenarioDefinition, ScenarioId};
use super::super::repository::{RepositoryError, ScenarioStore};
use super::manifest::parse_manifest;
use super::seed;

/// Scenario source held entirely in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryScenarioStore {
    scenarios: Arc<RwLock<BTreeMap<ScenarioId, ScenarioDefinition>>>,
}

impl InMemoryScenarioStore {
    /// Store pre-populated with the built-in scenarios.
    pub fn seeded() -> Self {
        let store = Self::default();
        store.put(seed::inventory_theft_case());
        store
    }

    pub fn put(&self, scenario: ScenarioDefinition) {
        let mut guard = match self.scenarios.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(scenario.id.clone(), scenario);
    }
}

impl ScenarioStore for InMemoryScenarioStore {
    fn fetch(&self, id: &ScenarioId) -> Result<Option<ScenarioDefinition>, RepositoryError> {
        let guard = self
            .scenarios
            .read()
            .map_err(|_| RepositoryError::Unavailable("scenario store poisoned".to_string()))?;
        Ok(guard.get(id).cloned())
    }

    fn ids(&self) -> Result<Vec<ScenarioId>, RepositoryError> {
        let guard = self
            .scenarios
            .read()
            .map_err(|_| RepositoryError::Unavailable("scenario store poisoned".to_string()))?;
        Ok(guard.keys().cloned().collect())
    }
}

/// Reads `<dir>/<id>.json` definitions, merging an optional `<id>.evidence.csv` manifest.
#[derive(Debug, Clone)]
pub struct DirectoryScenarioStore {
    root: PathBuf,
}

impl DirectoryScenarioStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn definition_path(&self, id: &ScenarioId) -> PathBuf {
        self.root.join(format!("{}.json", id.as_str()))
    }

    fn manifest_path(&self, id: &ScenarioId) -> PathBuf {
        self.root.join(format!("{}.evidence.csv", id.as_str()))
    }
}

impl ScenarioStore for DirectoryScenarioStore {
    fn fetch(&self, id: &ScenarioId) -> Result<Option<ScenarioDefinition>, RepositoryError> {
        if !is_safe_id(id) {
            return Ok(None);
        }

        let file = match File::open(self.definition_path(id)) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(RepositoryError::Unavailable(err.to_string())),
        };

        let mut scenario: ScenarioDefinition = serde_json::from_reader(file)
            .map_err(|err| RepositoryError::Malformed(err.to_string()))?;

        match File::open(self.manifest_path(id)) {
            Ok(manifest) => {
                let items = parse_manifest(manifest)
                    .map_err(|err| RepositoryError::Malformed(err.to_string()))?;
                scenario.evidence.extend(items);
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(RepositoryError::Unavailable(err.to_string())),
        }

        Ok(Some(scenario))
    }

    fn ids(&self) -> Result<Vec<ScenarioId>, RepositoryError> {
        let entries = std::fs::read_dir(&self.root)
            .map_err(|err| RepositoryError::Unavailable(err.to_string()))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| RepositoryError::Unavailable(err.to_string()))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(stem) = name.strip_suffix(".json") {
                ids.push(ScenarioId::new(stem));
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn is_safe_id(id: &ScenarioId) -> bool {
    !id.as_str().is_empty()
        && id
            .as_str()
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "courtcraft-{name}-{}",
            uuid::Uuid::new_v4().simple()
        ));
        fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[test]
    fn directory_store_merges_evidence_manifest() {
        let dir = scratch_dir("manifest");
        let scenario = seed::inventory_theft_case();
        fs::write(
            dir.join(format!("{}.json", seed::INVENTORY_CASE_ID)),
            serde_json::to_vec(&scenario).expect("serialize"),
        )
        .expect("write definition");
        fs::write(
            dir.join(format!("{}.evidence.csv", seed::INVENTORY_CASE_ID)),
            "id,category,name,description,tags,media\nev-extra,document,Dispatch note,Signed dispatch note,paper,\n",
        )
        .expect("write manifest");

        let store = DirectoryScenarioStore::new(&dir);
        let loaded = store
            .fetch(&ScenarioId::new(seed::INVENTORY_CASE_ID))
            .expect("fetch succeeds")
            .expect("scenario present");

        assert_eq!(loaded.evidence.len(), scenario.evidence.len() + 1);
        assert_eq!(
            store.ids().expect("ids"),
            vec![ScenarioId::new(seed::INVENTORY_CASE_ID)]
        );

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn directory_store_reports_missing_and_malformed_definitions() {
        let dir = scratch_dir("malformed");
        fs::write(dir.join("broken.json"), "{ not json").expect("write");
        let store = DirectoryScenarioStore::new(&dir);

        assert!(store
            .fetch(&ScenarioId::new("absent"))
            .expect("missing is not an error")
            .is_none());
        assert!(store.fetch(&ScenarioId::new("../etc")).unwrap().is_none());
        assert!(matches!(
            store.fetch(&ScenarioId::new("broken")),
            Err(RepositoryError::Malformed(_))
        ));

        fs::remove_dir_all(dir).ok();
    }
}
