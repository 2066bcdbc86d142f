use crate::infra::InMemorySessionStore;
use clap::Args;
use courtcraft::error::AppError;
use courtcraft::simulation::catalog::seed;
use courtcraft::simulation::{
    Adjudicator, AdjudicatorConfig, DirectoryScenarioStore, EvidenceId, ScenarioCatalog,
    ScenarioId, ScriptedGenerator, ScriptedReply, SimulationConfig, SimulationEngine, TurnInput,
    UserId,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Participant identifier recorded on the session and certificate
    #[arg(long, default_value = "demo-user")]
    pub(crate) user: String,
    /// Print the court's raw response for every turn
    #[arg(long)]
    pub(crate) show_responses: bool,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            user: "demo-user".to_string(),
            show_responses: false,
        }
    }
}

struct ScriptedTurn {
    argument: &'static str,
    evidence: &'static [&'static str],
    ruling: &'static str,
}

const SCRIPT: &[ScriptedTurn] = &[
    ScriptedTurn {
        argument: "My Lord, the accused is charged under the theft provisions and seeks bail \
                   under the applicable bail provisions of the criminal procedure code.",
        evidence: &[],
        ruling: "CLASSIFICATION: Sustained\nCRITERIA: cite-provisions\nCONFIDENCE: 1.0\n\
                 MILESTONE: opening\nRATIONALE: The provisions are correctly identified.",
    },
    ScriptedTurn {
        argument: "The CCTV frames show only a dark rectangular object; nothing in them \
                   distinguishes a laptop from a charger case.",
        evidence: &["ev-cctv"],
        ruling: "CLASSIFICATION: Sustained\nCRITERIA: cctv-ambiguity\nCONFIDENCE: 0.9\n\
                 MILESTONE: evidence-challenge\nRATIONALE: The identification is doubtful.",
    },
    ScriptedTurn {
        argument: "The inventory log records the laptop as dispatched at 9:47 AM, before my \
                   client entered at 11:03 AM, and Mr. Mehta saw him carrying a charger cable.",
        evidence: &["ev-inventory-log", "ev-witness-mehta"],
        ruling: "CLASSIFICATION: Sustained\nCRITERIA: timeline-discrepancy, witness-credibility\n\
                 CONFIDENCE: 0.9\nMILESTONE: timeline\nRATIONALE: The timeline is persuasive.",
    },
    ScriptedTurn {
        argument: "The accused has deep roots in the community and no record. We pray for bail \
                   on a personal bond with a surety and a condition to attend every hearing.",
        evidence: &[],
        ruling: "CLASSIFICATION: BailGranted\nCRITERIA: procedural-relief\nCONFIDENCE: 0.8\n\
                 MILESTONE: bail-order\nRATIONALE: Bail is granted on conditions.",
    },
];

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let generator = Arc::new(ScriptedGenerator::new(
        SCRIPT
            .iter()
            .map(|turn| ScriptedReply::Text(turn.ruling.to_string())),
    ));
    let engine = Arc::new(SimulationEngine::new(
        Arc::new(InMemorySessionStore::default()),
        Arc::new(ScenarioCatalog::seeded()),
        Adjudicator::new(generator, AdjudicatorConfig::default()),
        SimulationConfig::default(),
    ));

    let snapshot = match engine.start(
        UserId::new(args.user),
        ScenarioId::new(seed::INVENTORY_CASE_ID),
    ) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            println!("Session could not start: {err}");
            return Ok(());
        }
    };

    println!("Courtroom simulation demo");
    println!("  Session: {}", snapshot.id);
    println!("  Scenario: {}", snapshot.scenario_id);

    for turn in SCRIPT {
        let input = TurnInput::new(
            turn.argument,
            turn.evidence.iter().map(|id| EvidenceId::new(*id)).collect(),
        );
        let snapshot = match engine.submit_turn(&snapshot.id, input).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                println!("  Turn rejected [{}]: {err}", err.code());
                return Ok(());
            }
        };

        if let Some(last) = snapshot.turns.last() {
            println!(
                "\nTurn {} ruling: {} (+{:.1} points, running total {:.1})",
                last.sequence,
                last.verdict.classification.label(),
                last.score_delta.total,
                snapshot.score
            );
            if let Some(milestone) = &last.verdict.milestone {
                println!("  Milestone reached: {milestone}");
            }
            if args.show_responses {
                println!("  Court said:\n{}", indent(&last.raw_response));
            }
        }
        if snapshot.state.is_terminal() {
            println!("\nSession {}", snapshot.state);
            break;
        }
    }

    match engine.current_score(&snapshot.id) {
        Ok(breakdown) => {
            println!("Score breakdown ({:.1} / {:.1}):", breakdown.total, breakdown.max_score);
            for line in &breakdown.criteria {
                println!(
                    "  - {:<22} {:>5.1} / {:>5.1}",
                    line.criterion_id.as_str(),
                    line.earned,
                    line.weight
                );
            }
        }
        Err(err) => println!("Score unavailable: {err}"),
    }

    match engine.certify(&snapshot.id) {
        Ok(certificate) => {
            println!(
                "\nCertificate {}: {} ({:.1} against a threshold of {:.1})",
                certificate.certificate_id,
                if certificate.passed { "PASSED" } else { "NOT PASSED" },
                certificate.final_score,
                certificate.pass_threshold
            );
            println!("  Digest: {}", certificate.digest);
        }
        Err(err) => println!("\nCertification refused [{}]: {err}", err.code()),
    }

    Ok(())
}

pub(crate) fn run_scenario_list(scenario_dir: Option<PathBuf>) -> Result<(), AppError> {
    let catalog = match scenario_dir {
        Some(dir) => ScenarioCatalog::new(Box::new(DirectoryScenarioStore::new(dir))),
        None => ScenarioCatalog::seeded(),
    };

    let scenarios = catalog.list()?;
    if scenarios.is_empty() {
        println!("No scenarios found.");
        return Ok(());
    }

    println!("{} scenario(s):", scenarios.len());
    for summary in scenarios {
        println!(
            "  {:<24} {} [{}] evidence={} milestones={} pass>={:.0}/{:.0} turns<={}",
            summary.id.as_str(),
            summary.title,
            summary.practice_area,
            summary.evidence_count,
            summary.milestone_count,
            summary.pass_threshold,
            summary.max_score,
            summary.max_turns
        );
    }
    Ok(())
}

pub(crate) fn run_scenario_validate(path: &Path) -> Result<(), AppError> {
    let id = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(ScenarioId::new)
        .ok_or_else(|| {
            AppError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("'{}' is not a scenario definition file", path.display()),
            ))
        })?;
    let root = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let catalog = ScenarioCatalog::new(Box::new(DirectoryScenarioStore::new(root)));
    let scenario = catalog.load(&id)?;
    println!(
        "Scenario '{}' is valid: {} criteria, {} milestones, {} evidence items.",
        scenario.id,
        scenario.rubric.len(),
        scenario.milestones.len(),
        scenario.evidence.len()
    );
    Ok(())
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_runs_to_certification() {
        run_demo(DemoArgs::default()).await.expect("demo succeeds");
    }

    #[test]
    fn built_in_scenarios_list() {
        run_scenario_list(None).expect("lists");
    }

    #[test]
    fn validate_reports_missing_definition() {
        let err = run_scenario_validate(Path::new("/nonexistent/missing-case.json"))
            .expect_err("missing");
        assert!(err.to_string().contains("missing-case"));
    }
}
