//! Multi-turn, adjudicated courtroom simulation.
//!
//! A participant works through a fixed scenario turn by turn. Each turn is judged by an
//! external text generator, scored against the scenario rubric, and committed to the
//! session; completed sessions are sealed with a certificate.

pub mod adjudicator;
pub mod catalog;
pub mod certification;
pub mod domain;
pub mod evidence;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;
pub mod session;

#[cfg(test)]
mod tests;

pub use adjudicator::{
    AdjudicationError, Adjudicator, AdjudicatorConfig, Classification, GeminiClient,
    GenerationError, GenerationOptions, ScriptedGenerator, ScriptedReply, TextGenerator,
    UnconfiguredGenerator, Verdict,
};
pub use catalog::{
    CatalogError, DirectoryScenarioStore, InMemoryScenarioStore, ScenarioCatalog,
    ScenarioValidationError,
};
pub use certification::{CertificationIssuer, CertificationResult};
pub use domain::{
    CriterionId, EvidenceCategory, EvidenceId, EvidenceItem, Milestone, MilestoneId,
    RubricCriterion, ScenarioDefinition, ScenarioId, ScenarioSummary, SessionId, UserId,
};
pub use evidence::{EvidenceError, EvidenceRegistry};
pub use repository::{RepositoryError, ScenarioStore, SessionStore};
pub use router::simulation_router;
pub use scoring::{ScoreBreakdown, ScoreDelta, ScoringEngine, ScoringError};
pub use service::{SimulationConfig, SimulationEngine, SimulationError};
pub use session::{
    CompletionReason, SessionSnapshot, SessionState, SimulationSession, Turn, TurnInput,
};
