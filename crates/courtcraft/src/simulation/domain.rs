use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of a scenario definition in the catalog.
    ScenarioId
);
string_id!(
    /// Identifier of an evidence item, unique within its scenario.
    EvidenceId
);
string_id!(
    /// Identifier of a rubric criterion, unique within its scenario.
    CriterionId
);
string_id!(
    /// Identifier of a scenario milestone.
    MilestoneId
);
string_id!(
    /// Identifier of a simulation session.
    SessionId
);
string_id!(
    /// Opaque identity supplied by the surrounding user system.
    UserId
);

/// Immutable case definition simulated for certification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub id: ScenarioId,
    pub title: String,
    #[serde(default)]
    pub practice_area: String,
    /// Case facts presented to the participant and to the adjudicator.
    #[serde(default)]
    pub facts: String,
    /// Statutory provisions the case turns on.
    #[serde(default)]
    pub provisions: Vec<String>,
    pub milestones: Vec<Milestone>,
    pub evidence: Vec<EvidenceItem>,
    pub rubric: Vec<RubricCriterion>,
    pub pass_threshold: f64,
    pub max_turns: u32,
    /// Scenario-specific verdict tags accepted in addition to the standard classifications.
    #[serde(default)]
    pub verdict_tags: Vec<String>,
}

impl ScenarioDefinition {
    pub fn evidence_item(&self, id: &EvidenceId) -> Option<&EvidenceItem> {
        self.evidence.iter().find(|item| &item.id == id)
    }

    pub fn criterion(&self, id: &CriterionId) -> Option<&RubricCriterion> {
        self.rubric.iter().find(|criterion| &criterion.id == id)
    }

    pub fn milestone_index(&self, id: &MilestoneId) -> Option<usize> {
        self.milestones
            .iter()
            .position(|milestone| &milestone.id == id)
    }

    pub fn final_milestone(&self) -> Option<&Milestone> {
        self.milestones.last()
    }

    /// Highest score attainable when every criterion is fully credited.
    pub fn max_score(&self) -> f64 {
        self.rubric.iter().map(|criterion| criterion.weight).sum()
    }

    pub fn summary(&self) -> ScenarioSummary {
        ScenarioSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            practice_area: self.practice_area.clone(),
            evidence_count: self.evidence.len(),
            milestone_count: self.milestones.len(),
            pass_threshold: self.pass_threshold,
            max_score: self.max_score(),
            max_turns: self.max_turns,
        }
    }
}

/// Catalog listing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub id: ScenarioId,
    pub title: String,
    pub practice_area: String,
    pub evidence_count: usize,
    pub milestone_count: usize,
    pub pass_threshold: f64,
    pub max_score: f64,
    pub max_turns: u32,
}

/// Ordered checkpoint within a scenario; reaching the last one completes the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: MilestoneId,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: EvidenceId,
    pub name: String,
    pub category: EvidenceCategory,
    #[serde(default)]
    pub tags: Vec<String>,
    pub description: String,
    /// Opaque media locator; never resolved by the engine.
    #[serde(default)]
    pub media: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceCategory {
    Cctv,
    CrimeScene,
    PhysicalEvidence,
    Analysis,
    Document,
    Testimony,
    DigitalRecord,
}

impl EvidenceCategory {
    pub const fn label(self) -> &'static str {
        match self {
            EvidenceCategory::Cctv => "cctv",
            EvidenceCategory::CrimeScene => "crime_scene",
            EvidenceCategory::PhysicalEvidence => "physical_evidence",
            EvidenceCategory::Analysis => "analysis",
            EvidenceCategory::Document => "document",
            EvidenceCategory::Testimony => "testimony",
            EvidenceCategory::DigitalRecord => "digital_record",
        }
    }

    /// Lenient parse used for query strings and CSV manifests.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric())
            .map(|ch| ch.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "cctv" | "video" | "footage" => Some(Self::Cctv),
            "crimescene" | "scene" => Some(Self::CrimeScene),
            "physicalevidence" | "physical" => Some(Self::PhysicalEvidence),
            "analysis" | "forensic" | "forensics" => Some(Self::Analysis),
            "document" | "documents" => Some(Self::Document),
            "testimony" | "witness" | "statement" => Some(Self::Testimony),
            "digitalrecord" | "digital" | "log" | "logs" => Some(Self::DigitalRecord),
            _ => None,
        }
    }
}

/// Weighted scoring rule a verdict may satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricCriterion {
    pub id: CriterionId,
    pub description: String,
    pub weight: f64,
    /// Natural-language predicate handed to the adjudicator.
    pub satisfied_when: String,
}
