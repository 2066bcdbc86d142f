use std::time::Duration;

use super::common::*;
use crate::simulation::domain::{EvidenceId, ScenarioId, SessionId, UserId};
use crate::simulation::session::{CompletionReason, SessionState, TurnInput};
use crate::simulation::{ScriptedReply, SimulationConfig, SimulationError};

fn turn(text: &str) -> TurnInput {
    TurnInput::new(text, Vec::new())
}

#[test]
fn start_unknown_scenario_is_not_found() {
    let harness = harness(Vec::new());
    let err = harness
        .engine
        .start(UserId::new("user-1"), ScenarioId::new("missing"))
        .expect_err("unknown scenario");
    assert!(matches!(err, SimulationError::ScenarioNotFound(_)));
    assert_eq!(err.code(), "ScenarioNotFound");
}

#[test]
fn start_invalid_scenario_is_rejected() {
    let mut broken = moot_scenario();
    broken.id = ScenarioId::new("broken");
    broken.evidence.clear();
    let harness = harness_with(vec![broken], Vec::new(), SimulationConfig::default());

    let err = harness
        .engine
        .start(UserId::new("user-1"), ScenarioId::new("broken"))
        .expect_err("invalid scenario");
    assert_eq!(err.code(), "ScenarioInvalid");
}

#[tokio::test]
async fn committed_turns_are_numbered_without_gaps() {
    let harness = harness(vec![
        verdict_reply("grounds", 0.1, None),
        verdict_reply("NONE", 1.0, Some("submissions")),
        verdict_reply("grounds", 0.2, None),
    ]);
    let snapshot = start_moot(&harness);

    for text in ["first", "second", "third"] {
        harness
            .engine
            .submit_turn(&snapshot.id, turn(text))
            .await
            .expect("turn commits");
    }

    let session = stored(&harness, &snapshot.id);
    let sequences: Vec<u32> = session.turns.iter().map(|turn| turn.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    assert_eq!(session.state, SessionState::InProgress);
}

#[tokio::test]
async fn running_score_equals_sum_of_committed_deltas() {
    let harness = harness(vec![
        ScriptedReply::Fail(crate::simulation::GenerationError::Unavailable(
            "503".to_string(),
        )),
        verdict_reply("grounds", 0.3, None),
        verdict_reply("grounds", 0.5, None),
        verdict_reply("grounds", 0.5, None),
    ]);
    let snapshot = start_moot(&harness);

    for text in ["one", "two", "three"] {
        harness
            .engine
            .submit_turn(&snapshot.id, turn(text))
            .await
            .expect("turn commits");
    }

    let session = stored(&harness, &snapshot.id);
    let delta_sum: f64 = session.turns.iter().map(|turn| turn.score_delta.total).sum();
    assert!((session.score.total() - delta_sum).abs() < 1e-9);
    // Capped at the criterion weight: 30 + 50 + 20.
    assert!((session.score.total() - 100.0).abs() < 1e-9);

    let breakdown = harness
        .engine
        .current_score(&snapshot.id)
        .expect("score readable");
    assert!((breakdown.total - delta_sum).abs() < 1e-9);
    assert_eq!(breakdown.criteria.len(), 1);
}

#[tokio::test]
async fn concurrent_submissions_are_rejected_as_busy() {
    let harness = harness(vec![ScriptedReply::Delayed(
        Duration::from_millis(20),
        "CLASSIFICATION: Sustained\nCRITERIA: grounds\nCONFIDENCE: 0.5".to_string(),
    )]);
    let snapshot = start_moot(&harness);

    let (first, second) = tokio::join!(
        harness.engine.submit_turn(&snapshot.id, turn("first")),
        harness.engine.submit_turn(&snapshot.id, turn("second")),
    );

    let outcomes = [first, second];
    let committed = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    let busy = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, Err(SimulationError::SessionBusy(_))))
        .count();
    assert_eq!(committed, 1);
    assert_eq!(busy, 1);

    let session = stored(&harness, &snapshot.id);
    assert_eq!(session.turn_count(), 1);
    assert_eq!(harness.generator.calls(), 1);
}

#[tokio::test]
async fn foreign_evidence_is_rejected_without_advancing() {
    let harness = harness(vec![verdict_reply("grounds", 0.5, None)]);
    let snapshot = start_moot(&harness);

    let err = harness
        .engine
        .submit_turn(
            &snapshot.id,
            TurnInput::new("Look at the CCTV.", vec![EvidenceId::new("ev-cctv")]),
        )
        .await
        .expect_err("evidence belongs to another scenario");

    assert_eq!(err.code(), "EvidenceNotFound");
    let session = stored(&harness, &snapshot.id);
    assert_eq!(session.turn_count(), 0);
    assert_eq!(session.state, SessionState::InProgress);
    assert!(session.referenced_evidence.is_empty());
    assert_eq!(harness.generator.calls(), 0);
}

#[tokio::test]
async fn repeated_evidence_is_deduplicated_but_kept_in_transcript() {
    let harness = harness(vec![
        verdict_reply("grounds", 0.2, None),
        verdict_reply("grounds", 0.2, None),
    ]);
    let snapshot = start_moot(&harness);
    let surety = EvidenceId::new("ev-surety");

    harness
        .engine
        .submit_turn(
            &snapshot.id,
            TurnInput::new("The bond.", vec![surety.clone(), surety.clone()]),
        )
        .await
        .expect("commits");
    harness
        .engine
        .submit_turn(&snapshot.id, TurnInput::new("Again.", vec![surety.clone()]))
        .await
        .expect("commits");

    let session = stored(&harness, &snapshot.id);
    assert_eq!(session.referenced_evidence, vec![surety]);
    assert_eq!(session.turns[0].input.evidence_refs.len(), 2);
    assert_eq!(session.turns[1].input.evidence_refs.len(), 1);
}

#[tokio::test]
async fn blank_input_is_rejected() {
    let harness = harness(Vec::new());
    let snapshot = start_moot(&harness);

    let err = harness
        .engine
        .submit_turn(&snapshot.id, turn("   \n"))
        .await
        .expect_err("empty input");
    assert!(matches!(err, SimulationError::EmptyInput));
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let harness = harness(Vec::new());
    let err = harness
        .engine
        .submit_turn(&SessionId::new("sim-missing"), turn("hello"))
        .await
        .expect_err("no such session");
    assert_eq!(err.code(), "SessionNotFound");
}

#[tokio::test]
async fn final_milestone_completes_session() {
    let harness = harness(vec![verdict_reply("grounds", 0.8, Some("order"))]);
    let snapshot = start_moot(&harness);

    let updated = harness
        .engine
        .submit_turn(&snapshot.id, turn("Bail should be granted."))
        .await
        .expect("commits");

    assert_eq!(updated.state, SessionState::Completed);
    assert_eq!(updated.completion, Some(CompletionReason::FinalMilestone));
    assert!((updated.score - 80.0).abs() < 1e-9);
}

#[tokio::test]
async fn single_turn_limit_forces_completion() {
    let mut scenario = moot_scenario();
    scenario.max_turns = 1;
    let harness = harness_with(
        vec![scenario],
        vec![verdict_reply("grounds", 0.4, None)],
        SimulationConfig::default(),
    );
    let snapshot = start_moot(&harness);

    let updated = harness
        .engine
        .submit_turn(&snapshot.id, turn("Only chance."))
        .await
        .expect("commits");
    assert_eq!(updated.state, SessionState::Completed);
    assert_eq!(updated.completion, Some(CompletionReason::TurnLimitReached));

    let err = harness
        .engine
        .submit_turn(&snapshot.id, turn("One more."))
        .await
        .expect_err("limit reached");
    assert!(matches!(err, SimulationError::TurnLimitExceeded { limit: 1 }));
    assert_eq!(err.code(), "TurnLimitExceeded");
    assert_eq!(harness.generator.calls(), 1);
}

#[tokio::test]
async fn submission_beyond_limit_is_turn_limit_exceeded() {
    let mut scenario = moot_scenario();
    scenario.max_turns = 2;
    let harness = harness_with(
        vec![scenario],
        vec![
            verdict_reply("grounds", 0.2, Some("submissions")),
            verdict_reply("grounds", 0.2, None),
            verdict_reply("grounds", 0.9, Some("order")),
        ],
        SimulationConfig::default(),
    );
    let snapshot = start_moot(&harness);

    for text in ["First point.", "Second point."] {
        harness
            .engine
            .submit_turn(&snapshot.id, turn(text))
            .await
            .expect("commits");
    }

    let err = harness
        .engine
        .submit_turn(&snapshot.id, turn("Too late."))
        .await
        .expect_err("over the limit");
    assert!(matches!(err, SimulationError::TurnLimitExceeded { limit: 2 }));

    let session = stored(&harness, &snapshot.id);
    assert_eq!(session.state, SessionState::Completed);
    assert_eq!(session.completion, Some(CompletionReason::TurnLimitReached));
    assert_eq!(session.turn_count(), 2);
    assert!((session.score.total() - 40.0).abs() < 1e-9);
    assert_eq!(harness.generator.calls(), 2);
}

#[tokio::test]
async fn milestone_completed_session_rejects_turns_as_invalid_state() {
    let harness = harness(vec![verdict_reply("grounds", 0.8, Some("order"))]);
    let snapshot = start_moot(&harness);
    harness
        .engine
        .submit_turn(&snapshot.id, turn("Bail should be granted."))
        .await
        .expect("commits");

    let err = harness
        .engine
        .submit_turn(&snapshot.id, turn("And costs."))
        .await
        .expect_err("already decided");
    assert!(matches!(
        err,
        SimulationError::InvalidState {
            state: SessionState::Completed,
            ..
        }
    ));
}

#[tokio::test]
async fn exhausted_adjudication_fails_session_at_cap() {
    let harness = harness_with(
        vec![moot_scenario()],
        vec![
            ScriptedReply::Delayed(Duration::from_secs(5), String::new()),
            ScriptedReply::Delayed(Duration::from_secs(5), String::new()),
        ],
        SimulationConfig {
            max_adjudication_failures: 1,
        },
    );
    let snapshot = start_moot(&harness);

    let err = harness
        .engine
        .submit_turn(&snapshot.id, turn("Hello, court."))
        .await
        .expect_err("timeouts");
    assert!(matches!(
        err,
        SimulationError::AiUnavailable {
            session_failed: true,
            ..
        }
    ));

    let session = stored(&harness, &snapshot.id);
    assert_eq!(session.state, SessionState::Failed);
    assert_eq!(session.turn_count(), 0);

    let err = harness
        .engine
        .submit_turn(&snapshot.id, turn("Retry."))
        .await
        .expect_err("failed session");
    assert!(matches!(err, SimulationError::InvalidState { .. }));

    let err = harness.engine.certify(&snapshot.id).expect_err("not complete");
    assert!(matches!(
        err,
        SimulationError::SessionNotComplete(SessionState::Failed)
    ));
}

#[tokio::test]
async fn adjudication_failure_below_cap_allows_resubmission() {
    let unavailable =
        || ScriptedReply::Fail(crate::simulation::GenerationError::Unavailable("503".to_string()));
    let harness = harness(vec![
        unavailable(),
        unavailable(),
        verdict_reply("grounds", 0.5, None),
    ]);
    let snapshot = start_moot(&harness);

    let err = harness
        .engine
        .submit_turn(&snapshot.id, turn("First try."))
        .await
        .expect_err("upstream down");
    assert!(matches!(
        err,
        SimulationError::AiUnavailable {
            session_failed: false,
            ..
        }
    ));
    let session = stored(&harness, &snapshot.id);
    assert_eq!(session.state, SessionState::InProgress);
    assert_eq!(session.failed_adjudications, 1);
    assert_eq!(session.turn_count(), 0);
    assert!(session.score.total().abs() < 1e-9);

    let updated = harness
        .engine
        .submit_turn(&snapshot.id, turn("First try."))
        .await
        .expect("resubmission commits");
    assert_eq!(updated.turn_count, 1);
    assert_eq!(updated.turns[0].sequence, 1);
}

#[tokio::test]
async fn rubric_mismatch_leaves_session_unchanged() {
    let harness = harness(vec![verdict_reply("grounds, invented-criterion", 1.0, None)]);
    let snapshot = start_moot(&harness);
    let before = stored(&harness, &snapshot.id);

    let err = harness
        .engine
        .submit_turn(&snapshot.id, turn("Argument."))
        .await
        .expect_err("unknown criterion");
    assert_eq!(err.code(), "RubricMismatch");

    let after = stored(&harness, &snapshot.id);
    assert_eq!(after.state, SessionState::InProgress);
    assert_eq!(after.turns, before.turns);
    assert_eq!(after.score, before.score);
    assert_eq!(after.failed_adjudications, 0);
}

#[tokio::test]
async fn abort_during_adjudication_discards_result() {
    let harness = harness(vec![ScriptedReply::Delayed(
        Duration::from_millis(30),
        "CLASSIFICATION: Sustained\nCRITERIA: grounds".to_string(),
    )]);
    let snapshot = start_moot(&harness);

    let engine = harness.engine.clone();
    let id = snapshot.id.clone();
    let pending = tokio::spawn(async move { engine.submit_turn(&id, turn("Argument.")).await });

    tokio::time::sleep(Duration::from_millis(5)).await;
    let aborted = harness.engine.abort(&snapshot.id).expect("abort in flight");
    assert_eq!(aborted.state, SessionState::Aborted);

    let outcome = pending.await.expect("task joins");
    assert!(matches!(outcome, Err(SimulationError::SessionAborted(_))));

    let session = stored(&harness, &snapshot.id);
    assert_eq!(session.state, SessionState::Aborted);
    assert_eq!(session.turn_count(), 0);
    assert!(session.score.total().abs() < 1e-9);
}

#[test]
fn abort_terminal_session_conflicts() {
    let harness = harness(Vec::new());
    let snapshot = start_moot(&harness);
    harness.engine.abort(&snapshot.id).expect("aborts");

    let err = harness.engine.abort(&snapshot.id).expect_err("already aborted");
    assert!(matches!(
        err,
        SimulationError::InvalidState {
            state: SessionState::Aborted,
            ..
        }
    ));
}

#[tokio::test]
async fn user_sessions_are_listed_most_recent_first() {
    let harness = harness(vec![verdict_reply("grounds", 0.1, None)]);
    let older = start_moot(&harness);
    let newer = start_inventory(&harness);
    tokio::time::sleep(Duration::from_millis(2)).await;
    harness
        .engine
        .submit_turn(&older.id, turn("Update me."))
        .await
        .expect("commits");

    let listed = harness
        .engine
        .sessions_for_user(&UserId::new("user-1"))
        .expect("lists");
    let ids: Vec<_> = listed.iter().map(|snapshot| snapshot.id.clone()).collect();
    assert_eq!(ids, vec![older.id, newer.id]);

    let none = harness
        .engine
        .sessions_for_user(&UserId::new("someone-else"))
        .expect("lists");
    assert!(none.is_empty());
}

#[test]
fn repository_outage_surfaces_as_repository_error() {
    let engine = crate::simulation::SimulationEngine::new(
        std::sync::Arc::new(UnavailableStore),
        catalog_with(vec![moot_scenario()]),
        crate::simulation::Adjudicator::new(
            std::sync::Arc::new(crate::simulation::UnconfiguredGenerator),
            fast_adjudicator_config(),
        ),
        SimulationConfig::default(),
    );
    let err = engine
        .start(UserId::new("user-1"), ScenarioId::new(MOOT_ID))
        .expect_err("store offline");
    assert_eq!(err.code(), "Repository");
}

#[tokio::test]
async fn failed_commit_write_releases_the_session() {
    let harness = harness(vec![
        verdict_reply("grounds", 0.5, None),
        verdict_reply("grounds", 0.5, None),
    ]);
    let snapshot = start_moot(&harness);
    let surety = vec![EvidenceId::new("ev-surety")];

    // The reservation write succeeds; the commit write is rejected.
    harness.store.fail_update_after(1);
    let err = harness
        .engine
        .submit_turn(&snapshot.id, TurnInput::new("Surety offered.", surety.clone()))
        .await
        .expect_err("commit write rejected");
    assert_eq!(err.code(), "Repository");

    let session = stored(&harness, &snapshot.id);
    assert_eq!(session.state, SessionState::InProgress);
    assert_eq!(session.turn_count(), 0);
    assert!(session.referenced_evidence.is_empty());
    assert!(session.score.total().abs() < 1e-9);

    let updated = harness
        .engine
        .submit_turn(&snapshot.id, TurnInput::new("Surety offered.", surety))
        .await
        .expect("resubmission commits");
    assert_eq!(updated.turn_count, 1);
    assert_eq!(updated.referenced_evidence, vec![EvidenceId::new("ev-surety")]);
}
