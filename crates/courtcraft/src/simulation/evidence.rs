use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::catalog::{CatalogError, ScenarioCatalog};
use super::domain::{EvidenceCategory, EvidenceId, EvidenceItem, ScenarioDefinition, ScenarioId};
use super::session::SimulationSession;

/// Search index over each scenario's evidence, built lazily from the catalog.
#[derive(Debug)]
pub struct EvidenceRegistry {
    catalog: Arc<ScenarioCatalog>,
    indexes: RwLock<HashMap<ScenarioId, Arc<EvidenceIndex>>>,
}

impl EvidenceRegistry {
    pub fn new(catalog: Arc<ScenarioCatalog>) -> Self {
        Self {
            catalog,
            indexes: RwLock::new(HashMap::new()),
        }
    }

    /// Rank a scenario's evidence against a free-text query.
    ///
    /// Relevance is the number of query-term hits across tags, name, and description;
    /// ties keep catalog order. An empty query lists every item that passes the filter.
    pub fn search(
        &self,
        scenario_id: &ScenarioId,
        query: &str,
        category: Option<EvidenceCategory>,
    ) -> Result<Vec<EvidenceItem>, EvidenceError> {
        let index = self.index(scenario_id)?;
        Ok(index.search(query, category))
    }

    pub fn get(
        &self,
        scenario_id: &ScenarioId,
        evidence_id: &EvidenceId,
    ) -> Result<EvidenceItem, EvidenceError> {
        let index = self.index(scenario_id)?;
        index
            .get(evidence_id)
            .cloned()
            .ok_or_else(|| EvidenceError::NotFound {
                scenario: scenario_id.clone(),
                evidence: evidence_id.clone(),
            })
    }

    /// Record that the session relied on an item. Returns `true` the first time it is seen.
    pub fn mark_referenced(
        &self,
        session: &mut SimulationSession,
        evidence_id: &EvidenceId,
    ) -> Result<bool, EvidenceError> {
        let index = self.index(&session.scenario_id)?;
        if index.get(evidence_id).is_none() {
            return Err(EvidenceError::NotFound {
                scenario: session.scenario_id.clone(),
                evidence: evidence_id.clone(),
            });
        }

        Ok(session.note_evidence(evidence_id))
    }

    fn index(&self, scenario_id: &ScenarioId) -> Result<Arc<EvidenceIndex>, EvidenceError> {
        {
            let indexes = match self.indexes.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(index) = indexes.get(scenario_id) {
                return Ok(index.clone());
            }
        }

        let scenario = self.catalog.load(scenario_id)?;
        let index = Arc::new(EvidenceIndex::build(&scenario));
        let mut indexes = match self.indexes.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(indexes
            .entry(scenario_id.clone())
            .or_insert(index)
            .clone())
    }
}

#[derive(Debug)]
pub(crate) struct EvidenceIndex {
    items: Vec<EvidenceItem>,
    by_id: HashMap<EvidenceId, usize>,
    by_category: HashMap<EvidenceCategory, Vec<usize>>,
    by_tag: HashMap<String, Vec<usize>>,
    /// Lower-cased words of each item's name and description, aligned with `items`.
    words: Vec<Vec<String>>,
}

impl EvidenceIndex {
    pub(crate) fn build(scenario: &ScenarioDefinition) -> Self {
        let mut by_id = HashMap::new();
        let mut by_category: HashMap<EvidenceCategory, Vec<usize>> = HashMap::new();
        let mut by_tag: HashMap<String, Vec<usize>> = HashMap::new();
        let mut words = Vec::with_capacity(scenario.evidence.len());

        for (position, item) in scenario.evidence.iter().enumerate() {
            by_id.insert(item.id.clone(), position);
            by_category.entry(item.category).or_default().push(position);
            for tag in &item.tags {
                by_tag
                    .entry(tag.to_lowercase())
                    .or_default()
                    .push(position);
            }
            let mut item_words = tokenize(&item.name);
            item_words.extend(tokenize(&item.description));
            words.push(item_words);
        }

        Self {
            items: scenario.evidence.clone(),
            by_id,
            by_category,
            by_tag,
            words,
        }
    }

    pub(crate) fn get(&self, id: &EvidenceId) -> Option<&EvidenceItem> {
        self.by_id.get(id).map(|position| &self.items[*position])
    }

    pub(crate) fn search(&self, query: &str, category: Option<EvidenceCategory>) -> Vec<EvidenceItem> {
        let candidates: Vec<usize> = match category {
            Some(category) => self.by_category.get(&category).cloned().unwrap_or_default(),
            None => (0..self.items.len()).collect(),
        };

        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();

        if terms.is_empty() {
            return candidates
                .into_iter()
                .map(|position| self.items[position].clone())
                .collect();
        }

        let mut scored: Vec<(usize, usize)> = candidates
            .into_iter()
            .map(|position| (position, self.relevance(position, &terms)))
            .filter(|(_, score)| *score > 0)
            .collect();

        // Stable sort keeps insertion order for equal scores.
        scored.sort_by(|left, right| right.1.cmp(&left.1));

        scored
            .into_iter()
            .map(|(position, _)| self.items[position].clone())
            .collect()
    }

    fn relevance(&self, position: usize, terms: &[String]) -> usize {
        terms
            .iter()
            .map(|term| {
                let tag_hits = self
                    .by_tag
                    .get(term)
                    .map(|positions| positions.iter().filter(|p| **p == position).count())
                    .unwrap_or(0);
                let word_hits = self.words[position]
                    .iter()
                    .filter(|word| *word == term)
                    .count();
                tag_hits + word_hits
            })
            .sum()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum EvidenceError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("evidence '{evidence}' is not part of scenario '{scenario}'")]
    NotFound {
        scenario: ScenarioId,
        evidence: EvidenceId,
    },
}
