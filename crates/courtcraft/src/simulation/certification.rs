use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::domain::{ScenarioDefinition, ScenarioId, SessionId, UserId};
use super::scoring::{ScoreBreakdown, ScoringEngine};
use super::session::{SessionState, SimulationSession};

/// Final pass/fail determination for a completed session. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificationResult {
    pub certificate_id: String,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub scenario_id: ScenarioId,
    pub scenario_title: String,
    pub final_score: f64,
    pub pass_threshold: f64,
    pub passed: bool,
    pub breakdown: ScoreBreakdown,
    pub turn_count: u32,
    pub issued_at: DateTime<Utc>,
    /// Hex SHA-256 over the canonical fields.
    pub digest: String,
}

impl CertificationResult {
    /// Recompute the digest and compare it with the recorded one.
    pub fn verify(&self) -> bool {
        canonical_digest(self) == self.digest
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CertificationError {
    #[error("session is {0}; only completed sessions can be certified")]
    NotComplete(SessionState),
}

/// Seals completed sessions with a certificate.
#[derive(Debug, Default, Clone, Copy)]
pub struct CertificationIssuer {
    scoring: ScoringEngine,
}

impl CertificationIssuer {
    pub fn new(scoring: ScoringEngine) -> Self {
        Self { scoring }
    }

    /// Issue the session's certificate, or return the one already issued.
    ///
    /// The returned flag is `true` when a new certificate was created and the
    /// session must be persisted.
    pub fn certify(
        &self,
        scenario: &ScenarioDefinition,
        session: &mut SimulationSession,
    ) -> Result<(CertificationResult, bool), CertificationError> {
        if let Some(existing) = &session.certification {
            return Ok((existing.clone(), false));
        }
        if session.state != SessionState::Completed {
            return Err(CertificationError::NotComplete(session.state));
        }

        let breakdown = self.scoring.current_score(scenario, session);
        let final_score = breakdown.total;
        let mut result = CertificationResult {
            certificate_id: next_certificate_id(),
            session_id: session.id.clone(),
            user_id: session.user_id.clone(),
            scenario_id: scenario.id.clone(),
            scenario_title: scenario.title.clone(),
            final_score,
            pass_threshold: scenario.pass_threshold,
            passed: final_score >= scenario.pass_threshold,
            breakdown,
            turn_count: session.turn_count(),
            issued_at: Utc::now(),
            digest: String::new(),
        };
        result.digest = canonical_digest(&result);

        session.seal(result.clone());
        Ok((result, true))
    }
}

fn next_certificate_id() -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("CERT-{}", raw[..8].to_uppercase())
}

fn canonical_digest(result: &CertificationResult) -> String {
    let mut canonical = String::new();
    let _ = write!(
        canonical,
        "{}|{}|{}|{}|{:.4}|{:.4}|{}|{}|{}",
        result.certificate_id,
        result.session_id,
        result.user_id,
        result.scenario_id,
        result.final_score,
        result.pass_threshold,
        result.passed,
        result.turn_count,
        result.issued_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
    );
    for line in &result.breakdown.criteria {
        let _ = write!(canonical, "|{}={:.4}", line.criterion_id, line.earned);
    }

    let digest = Sha256::digest(canonical.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}
