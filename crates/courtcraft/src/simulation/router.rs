use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::certification::CertificationResult;
use super::domain::{EvidenceCategory, EvidenceId, ScenarioId, SessionId, UserId};
use super::repository::SessionStore;
use super::service::{SimulationEngine, SimulationError};
use super::session::TurnInput;

/// Router exposing the simulation lifecycle, evidence search, and certification endpoints.
pub fn simulation_router<S>(engine: Arc<SimulationEngine<S>>) -> Router
where
    S: SessionStore + 'static,
{
    Router::new()
        .route("/simulations", post(start_handler::<S>))
        .route("/simulations/:session_id", get(state_handler::<S>))
        .route("/simulations/:session_id/turns", post(turn_handler::<S>))
        .route("/simulations/:session_id/abort", post(abort_handler::<S>))
        .route("/simulations/:session_id/certify", post(certify_handler::<S>))
        .route("/simulations/:session_id/score", get(score_handler::<S>))
        .route("/users/:user_id/simulations", get(user_sessions_handler::<S>))
        .route("/scenarios", get(scenarios_handler::<S>))
        .route(
            "/scenarios/:scenario_id/evidence",
            get(evidence_search_handler::<S>),
        )
        .route(
            "/scenarios/:scenario_id/evidence/:evidence_id",
            get(evidence_detail_handler::<S>),
        )
        .route("/certifications/verify", post(verify_handler))
        .with_state(engine)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StartRequest {
    #[serde(alias = "user_id")]
    pub user_id: String,
    #[serde(alias = "scenario_id")]
    pub scenario_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TurnRequest {
    pub input: String,
    #[serde(default, alias = "evidence_refs")]
    pub evidence_refs: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EvidenceQuery {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

pub(crate) async fn start_handler<S>(
    State(engine): State<Arc<SimulationEngine<S>>>,
    axum::Json(request): axum::Json<StartRequest>,
) -> Response
where
    S: SessionStore + 'static,
{
    match engine.start(UserId(request.user_id), ScenarioId(request.scenario_id)) {
        Ok(snapshot) => (StatusCode::CREATED, axum::Json(snapshot)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn turn_handler<S>(
    State(engine): State<Arc<SimulationEngine<S>>>,
    Path(session_id): Path<String>,
    axum::Json(request): axum::Json<TurnRequest>,
) -> Response
where
    S: SessionStore + 'static,
{
    let input = TurnInput::new(
        request.input,
        request.evidence_refs.into_iter().map(EvidenceId).collect(),
    );
    match engine.submit_turn(&SessionId(session_id), input).await {
        Ok(snapshot) => (StatusCode::OK, axum::Json(snapshot)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn state_handler<S>(
    State(engine): State<Arc<SimulationEngine<S>>>,
    Path(session_id): Path<String>,
) -> Response
where
    S: SessionStore + 'static,
{
    match engine.get_state(&SessionId(session_id)) {
        Ok(snapshot) => (StatusCode::OK, axum::Json(snapshot)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn abort_handler<S>(
    State(engine): State<Arc<SimulationEngine<S>>>,
    Path(session_id): Path<String>,
) -> Response
where
    S: SessionStore + 'static,
{
    match engine.abort(&SessionId(session_id)) {
        Ok(snapshot) => (StatusCode::OK, axum::Json(snapshot)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn certify_handler<S>(
    State(engine): State<Arc<SimulationEngine<S>>>,
    Path(session_id): Path<String>,
) -> Response
where
    S: SessionStore + 'static,
{
    match engine.certify(&SessionId(session_id)) {
        Ok(result) => (StatusCode::OK, axum::Json(result)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn score_handler<S>(
    State(engine): State<Arc<SimulationEngine<S>>>,
    Path(session_id): Path<String>,
) -> Response
where
    S: SessionStore + 'static,
{
    match engine.current_score(&SessionId(session_id)) {
        Ok(breakdown) => (StatusCode::OK, axum::Json(breakdown)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn user_sessions_handler<S>(
    State(engine): State<Arc<SimulationEngine<S>>>,
    Path(user_id): Path<String>,
) -> Response
where
    S: SessionStore + 'static,
{
    match engine.sessions_for_user(&UserId(user_id)) {
        Ok(sessions) => (StatusCode::OK, axum::Json(sessions)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn scenarios_handler<S>(State(engine): State<Arc<SimulationEngine<S>>>) -> Response
where
    S: SessionStore + 'static,
{
    match engine.list_scenarios() {
        Ok(scenarios) => (StatusCode::OK, axum::Json(scenarios)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn evidence_search_handler<S>(
    State(engine): State<Arc<SimulationEngine<S>>>,
    Path(scenario_id): Path<String>,
    Query(params): Query<EvidenceQuery>,
) -> Response
where
    S: SessionStore + 'static,
{
    let category = match params.category.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match EvidenceCategory::parse(raw) {
            Some(category) => Some(category),
            None => {
                let payload = json!({
                    "error": "InvalidCategory",
                    "message": format!("unknown evidence category '{raw}'"),
                });
                return (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response();
            }
        },
    };

    let query = params.query.unwrap_or_default();
    match engine.search_evidence(&ScenarioId(scenario_id), &query, category) {
        Ok(items) => (StatusCode::OK, axum::Json(items)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn evidence_detail_handler<S>(
    State(engine): State<Arc<SimulationEngine<S>>>,
    Path((scenario_id, evidence_id)): Path<(String, String)>,
) -> Response
where
    S: SessionStore + 'static,
{
    match engine.evidence_item(&ScenarioId(scenario_id), &EvidenceId(evidence_id)) {
        Ok(item) => (StatusCode::OK, axum::Json(item)).into_response(),
        Err(err @ SimulationError::EvidenceNotFound { .. }) => {
            error_body(StatusCode::NOT_FOUND, &err)
        }
        Err(err) => error_response(err),
    }
}

async fn verify_handler(axum::Json(certificate): axum::Json<CertificationResult>) -> Response {
    let payload = json!({
        "certificate_id": certificate.certificate_id,
        "valid": certificate.verify(),
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

pub(crate) fn status_for(err: &SimulationError) -> StatusCode {
    match err {
        SimulationError::ScenarioNotFound(_) | SimulationError::SessionNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        SimulationError::ScenarioInvalid { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        SimulationError::SessionBusy(_)
        | SimulationError::InvalidState { .. }
        | SimulationError::SessionNotComplete(_)
        | SimulationError::SessionAborted(_) => StatusCode::CONFLICT,
        SimulationError::EvidenceNotFound { .. }
        | SimulationError::TurnLimitExceeded { .. }
        | SimulationError::EmptyInput => StatusCode::BAD_REQUEST,
        SimulationError::AiUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        SimulationError::RubricMismatch(_) | SimulationError::Repository(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: SimulationError) -> Response {
    error_body(status_for(&err), &err)
}

fn error_body(status: StatusCode, err: &SimulationError) -> Response {
    let payload = json!({
        "error": err.code(),
        "message": err.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
