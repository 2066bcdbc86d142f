use std::collections::HashSet;

use super::super::domain::{CriterionId, EvidenceId, MilestoneId, ScenarioDefinition};

/// Structural defect found while loading a scenario definition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScenarioValidationError {
    #[error("definition could not be decoded: {0}")]
    Malformed(String),
    #[error("scenario declares no evidence items")]
    EmptyEvidence,
    #[error("scenario declares no rubric criteria")]
    EmptyRubric,
    #[error("scenario declares no milestones")]
    NoMilestones,
    #[error("criterion '{0}' must carry a positive weight")]
    NonPositiveWeight(CriterionId),
    #[error("criterion id '{0}' is declared more than once")]
    DuplicateCriterion(CriterionId),
    #[error("evidence id '{0}' is declared more than once")]
    DuplicateEvidence(EvidenceId),
    #[error("milestone id '{0}' is declared more than once")]
    DuplicateMilestone(MilestoneId),
    #[error("max turn limit must be at least one")]
    ZeroTurnLimit,
    #[error("pass threshold {0} must be a non-negative number")]
    InvalidThreshold(f64),
}

pub(crate) fn validate(scenario: &ScenarioDefinition) -> Result<(), ScenarioValidationError> {
    if scenario.evidence.is_empty() {
        return Err(ScenarioValidationError::EmptyEvidence);
    }
    if scenario.rubric.is_empty() {
        return Err(ScenarioValidationError::EmptyRubric);
    }
    if scenario.milestones.is_empty() {
        return Err(ScenarioValidationError::NoMilestones);
    }
    if scenario.max_turns == 0 {
        return Err(ScenarioValidationError::ZeroTurnLimit);
    }
    if !scenario.pass_threshold.is_finite() || scenario.pass_threshold < 0.0 {
        return Err(ScenarioValidationError::InvalidThreshold(
            scenario.pass_threshold,
        ));
    }

    let mut criteria = HashSet::new();
    for criterion in &scenario.rubric {
        if !criterion.weight.is_finite() || criterion.weight <= 0.0 {
            return Err(ScenarioValidationError::NonPositiveWeight(
                criterion.id.clone(),
            ));
        }
        if !criteria.insert(&criterion.id) {
            return Err(ScenarioValidationError::DuplicateCriterion(
                criterion.id.clone(),
            ));
        }
    }

    let mut evidence = HashSet::new();
    for item in &scenario.evidence {
        if !evidence.insert(&item.id) {
            return Err(ScenarioValidationError::DuplicateEvidence(item.id.clone()));
        }
    }

    let mut milestones = HashSet::new();
    for milestone in &scenario.milestones {
        if !milestones.insert(&milestone.id) {
            return Err(ScenarioValidationError::DuplicateMilestone(
                milestone.id.clone(),
            ));
        }
    }

    Ok(())
}
