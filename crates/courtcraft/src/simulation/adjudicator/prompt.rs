use std::fmt::Write as _;

use super::super::domain::{EvidenceItem, ScenarioDefinition};
use super::super::session::{SimulationSession, TurnInput};

/// Builds adjudication prompts; identical inputs always yield identical prompts.
#[derive(Debug, Clone)]
pub(crate) struct PromptBuilder {
    transcript_window: usize,
}

impl PromptBuilder {
    pub(crate) fn new(transcript_window: usize) -> Self {
        Self { transcript_window }
    }

    pub(crate) fn build(
        &self,
        scenario: &ScenarioDefinition,
        session: &SimulationSession,
        input: &TurnInput,
    ) -> String {
        let mut prompt = String::new();

        prompt.push_str(
            "You are the presiding judge in a courtroom training simulation. \
             Rule on counsel's latest submission strictly against the rubric below.\n\n",
        );

        let _ = writeln!(prompt, "CASE: {}", scenario.title);
        if !scenario.practice_area.is_empty() {
            let _ = writeln!(prompt, "PRACTICE AREA: {}", scenario.practice_area);
        }
        if !scenario.facts.is_empty() {
            let _ = writeln!(prompt, "FACTS: {}", scenario.facts);
        }

        if !scenario.provisions.is_empty() {
            prompt.push_str("\nPROVISIONS:\n");
            for provision in &scenario.provisions {
                let _ = writeln!(prompt, "- {provision}");
            }
        }

        prompt.push_str("\nMILESTONES (in order):\n");
        for milestone in &scenario.milestones {
            let _ = writeln!(
                prompt,
                "- {}: {}. {}",
                milestone.id, milestone.title, milestone.description
            );
        }
        let _ = writeln!(
            prompt,
            "MILESTONE REACHED SO FAR: {}",
            session
                .milestone
                .as_ref()
                .map(|id| id.as_str())
                .unwrap_or("NONE")
        );

        prompt.push_str("\nRUBRIC:\n");
        for criterion in &scenario.rubric {
            let _ = writeln!(
                prompt,
                "- {} (weight {}): {}. Satisfied when: {}",
                criterion.id, criterion.weight, criterion.description, criterion.satisfied_when
            );
        }

        let evidence = referenced_evidence(scenario, session, input);
        if !evidence.is_empty() {
            prompt.push_str("\nEVIDENCE ON RECORD:\n");
            for item in evidence {
                let _ = writeln!(
                    prompt,
                    "- {} [{}] {}: {}",
                    item.id,
                    item.category.label(),
                    item.name,
                    item.description
                );
            }
        }

        let total = session.turns.len();
        if total > 0 {
            let shown = total.min(self.transcript_window);
            let _ = writeln!(
                prompt,
                "\nPRIOR TURNS (most recent {shown} of {total}):"
            );
            for turn in session.turns.iter().skip(total - shown) {
                let _ = writeln!(prompt, "Turn {}", turn.sequence);
                let _ = writeln!(prompt, "Counsel: {}", turn.input.text);
                let _ = writeln!(
                    prompt,
                    "Court: {}. {}",
                    turn.verdict.classification.label(),
                    turn.verdict.rationale
                );
            }
        }

        let _ = writeln!(
            prompt,
            "\nNEW SUBMISSION (turn {}):\n{}",
            total + 1,
            input.text.trim()
        );

        prompt.push_str(&response_format(scenario));
        prompt
    }

    /// Ask the model to restate an unparseable reply in the required format.
    pub(crate) fn reformat(
        &self,
        scenario: &ScenarioDefinition,
        original_prompt: &str,
        previous_reply: &str,
    ) -> String {
        let mut prompt = String::from(original_prompt);
        prompt.push_str(
            "\n\nYOUR PREVIOUS REPLY COULD NOT BE READ. Restate the same ruling using exactly \
             the marker lines requested, with no other text.\n",
        );
        let _ = writeln!(prompt, "PREVIOUS REPLY:\n{}", previous_reply.trim());
        prompt.push_str(&response_format(scenario));
        prompt
    }
}

fn response_format(scenario: &ScenarioDefinition) -> String {
    let mut classifications = vec!["Sustained", "Overruled", "Inconclusive"];
    classifications.extend(scenario.verdict_tags.iter().map(String::as_str));

    let mut format = String::from("\nRESPOND WITH EXACTLY THESE LINES:\n");
    let _ = writeln!(
        format,
        "CLASSIFICATION: one of {}",
        classifications.join(", ")
    );
    format.push_str(
        "CRITERIA: comma-separated rubric ids satisfied by this submission, or NONE\n",
    );
    format.push_str("CONFIDENCE: a number between 0 and 1\n");
    format.push_str("MILESTONE: id of the furthest milestone now reached, or NONE\n");
    format.push_str("RATIONALE: one short paragraph\n");
    format
}

/// Previously referenced items first (first-reference order), then new ones from this turn.
fn referenced_evidence<'a>(
    scenario: &'a ScenarioDefinition,
    session: &SimulationSession,
    input: &TurnInput,
) -> Vec<&'a EvidenceItem> {
    let mut ids = session.referenced_evidence.clone();
    for id in &input.evidence_refs {
        if !ids.contains(id) {
            ids.push(id.clone());
        }
    }

    ids.iter()
        .filter_map(|id| scenario.evidence_item(id))
        .collect()
}
