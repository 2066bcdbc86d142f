use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::adjudicator::Verdict;
use super::domain::{CriterionId, MilestoneId, ScenarioDefinition};
use super::session::SimulationSession;

/// Running per-criterion totals for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreSheet {
    criteria: BTreeMap<CriterionId, f64>,
}

impl ScoreSheet {
    pub fn earned(&self, id: &CriterionId) -> f64 {
        self.criteria.get(id).copied().unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.criteria.values().sum()
    }

    pub(crate) fn commit(&mut self, delta: &ScoreDelta) {
        for (id, credit) in &delta.criteria {
            *self.criteria.entry(id.clone()).or_insert(0.0) += credit;
        }
    }
}

/// Credit earned by a single committed turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreDelta {
    pub criteria: BTreeMap<CriterionId, f64>,
    pub total: f64,
}

/// Current score with one line per rubric criterion, in rubric order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub total: f64,
    pub max_score: f64,
    pub criteria: Vec<CriterionScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub criterion_id: CriterionId,
    pub description: String,
    pub weight: f64,
    pub earned: f64,
}

/// Stateless evaluator applying a scenario rubric to adjudicated verdicts.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScoringEngine;

impl ScoringEngine {
    pub fn new() -> Self {
        Self
    }

    /// Compute the credit a verdict earns against the session's running totals.
    ///
    /// Each matched criterion earns `weight * confidence`, capped so its running total
    /// never exceeds its weight. Nothing is mutated; the delta is committed together
    /// with its turn by [`SimulationSession::commit_turn`].
    pub fn apply(
        &self,
        scenario: &ScenarioDefinition,
        session: &SimulationSession,
        verdict: &Verdict,
    ) -> Result<ScoreDelta, ScoringError> {
        self.check_consistency(scenario, verdict)?;

        let matched: BTreeSet<&CriterionId> = verdict.matched_criteria.iter().collect();
        let mut delta = ScoreDelta::default();

        for id in matched {
            let Some(criterion) = scenario.criterion(id) else {
                return Err(ScoringError::RubricMismatch(id.clone()));
            };
            let remaining = (criterion.weight - session.score.earned(id)).max(0.0);
            let credit = (criterion.weight * verdict.confidence).min(remaining);
            if credit > 0.0 {
                delta.criteria.insert(id.clone(), credit);
                delta.total += credit;
            }
        }

        Ok(delta)
    }

    pub fn current_score(
        &self,
        scenario: &ScenarioDefinition,
        session: &SimulationSession,
    ) -> ScoreBreakdown {
        let criteria = scenario
            .rubric
            .iter()
            .map(|criterion| CriterionScore {
                criterion_id: criterion.id.clone(),
                description: criterion.description.clone(),
                weight: criterion.weight,
                earned: session.score.earned(&criterion.id),
            })
            .collect();

        ScoreBreakdown {
            total: session.score.total(),
            max_score: scenario.max_score(),
            criteria,
        }
    }

    fn check_consistency(
        &self,
        scenario: &ScenarioDefinition,
        verdict: &Verdict,
    ) -> Result<(), ScoringError> {
        if let Some(unknown) = verdict
            .matched_criteria
            .iter()
            .find(|id| scenario.criterion(id).is_none())
        {
            return Err(ScoringError::RubricMismatch(unknown.clone()));
        }

        if let Some(milestone) = &verdict.milestone {
            if scenario.milestone_index(milestone).is_none() {
                return Err(ScoringError::UnknownMilestone(milestone.clone()));
            }
        }

        Ok(())
    }
}

/// Verdict and catalog disagree; indicates adjudicator/catalog version skew.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringError {
    #[error("verdict references criterion '{0}' absent from the scenario rubric")]
    RubricMismatch(CriterionId),
    #[error("verdict references milestone '{0}' absent from the scenario")]
    UnknownMilestone(MilestoneId),
}
