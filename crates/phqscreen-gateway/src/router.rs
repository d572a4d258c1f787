use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use phqscreen_core::{ScreenError, ScreenResult, SessionId, SessionSummary};
use phqscreen_scoring::render_markdown;
use phqscreen_session::{CloseOutcome, TurnReply};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Session id older clients send when they have none yet.
pub const DEFAULT_SESSION_SENTINEL: &str = "default_session";

/// Maps the optional `session_id` query parameter to a session, treating a
/// missing, blank or sentinel value as "start a new session".
pub fn resolve_session_param(raw: Option<&str>) -> ScreenResult<Option<SessionId>> {
    match raw.map(str::trim) {
        None | Some("") | Some(DEFAULT_SESSION_SENTINEL) => Ok(None),
        Some(id) => SessionId::parse(id).map(Some),
    }
}

/// Error response wrapper mapping [`ScreenError`] to HTTP statuses.
pub struct ApiError(pub ScreenError);

impl From<ScreenError> for ApiError {
    fn from(e: ScreenError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            ScreenError::SessionUnknownOnRead(_) => (StatusCode::NOT_FOUND, "session_not_found"),
            ScreenError::SessionClosed(_) => (StatusCode::CONFLICT, "session_closed"),
            ScreenError::SummaryExists(_) => (StatusCode::CONFLICT, "summary_exists"),
            ScreenError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            ScreenError::Classification(_) => {
                (StatusCode::BAD_GATEWAY, "classification_failure")
            }
            ScreenError::Persistence { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "persistence_failure")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        let mut body = json!({ "error": self.0.to_string(), "kind": kind });
        if let ScreenError::Persistence { summary, .. } = &self.0 {
            // The computed result is still returned so nothing is lost.
            body["summary"] = json!(summary);
        }
        if status.is_server_error() {
            warn!(status = %status, error = %self.0, "Request failed");
        }
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_path_id(raw: &str) -> ApiResult<SessionId> {
    Ok(SessionId::parse(raw)?)
}

/// Body of `POST /predict`.
#[derive(Debug, Deserialize)]
pub struct PredictInput {
    /// The user's message.
    pub text: String,
}

/// Query string of `POST /predict`.
#[derive(Debug, Deserialize, Default)]
pub struct SessionQuery {
    /// Target session; missing, blank or the sentinel starts a new one.
    pub session_id: Option<String>,
}

/// `POST /sessions`
pub async fn open_session(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let session_id = state.service.open_session().await;
    info!(session_id = %session_id, "Session opened via API");
    Json(json!({ "session_id": session_id }))
}

/// `POST /predict?session_id=`: one user turn.
pub async fn predict(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
    Json(input): Json<PredictInput>,
) -> ApiResult<Json<TurnReply>> {
    let session_id = resolve_session_param(query.session_id.as_deref())?;
    let reply = state.service.turn(session_id, &input.text).await?;
    Ok(Json(reply))
}

fn outcome_body(outcome: &CloseOutcome) -> serde_json::Value {
    let mut body = json!({
        "message": outcome.message(),
        "session_id": outcome.session_id(),
    });
    let (status, summary) = match outcome {
        CloseOutcome::Closed(summary) => ("closed", Some(summary)),
        CloseOutcome::AlreadyClosed { summary, .. } => ("already_closed", summary.as_ref()),
        CloseOutcome::EmptySession { .. } => ("empty_session", None),
    };
    body["status"] = json!(status);
    if let Some(summary) = summary {
        body["severity_tally"] = json!(summary.severity_tally);
        body["total_score"] = json!(summary.total_score);
        body["severity_band"] = json!(summary.severity_band);
        body["mapped_results"] = json!(summary.mapped_results);
    }
    body
}

/// `POST /stop-session/{session_id}`
pub async fn stop_session(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let session_id = parse_path_id(&raw_id)?;
    let outcome = state.service.close(&session_id).await?;
    Ok(Json(outcome_body(&outcome)))
}

/// `POST /sessions/{session_id}/reaggregate`: finishes a close that failed,
/// storing an unsaved summary if there is one and aggregating otherwise.
pub async fn reaggregate(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let session_id = parse_path_id(&raw_id)?;
    let outcome = state.service.retry_aggregation(&session_id).await?;
    info!(session_id = %session_id, "Session reaggregated");
    Ok(Json(outcome_body(&outcome)))
}

/// `POST /sessions/{session_id}/persist`: stores the summary a failed
/// close computed, without reclassifying.
pub async fn persist_unsaved(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let session_id = parse_path_id(&raw_id)?;
    let outcome = state.service.persist_unsaved(&session_id).await?;
    Ok(Json(outcome_body(&outcome)))
}

/// `GET /get-session/{session_id}`
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<SessionSummary>> {
    let session_id = parse_path_id(&raw_id)?;
    Ok(Json(state.service.summary(&session_id).await?))
}

/// `GET /sessions`
pub async fn list_summaries(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<serde_json::Value>> {
    let listings = state.service.list_summaries().await?;
    Ok(Json(json!({ "sessions": listings })))
}

/// `GET /sessions/{session_id}/report`: the summary as Markdown.
pub async fn report(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> ApiResult<Response> {
    let session_id = parse_path_id(&raw_id)?;
    let summary = state.service.summary(&session_id).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        render_markdown(&summary),
    )
        .into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_and_missing_start_new_session() {
        assert!(resolve_session_param(None).unwrap().is_none());
        assert!(resolve_session_param(Some("")).unwrap().is_none());
        assert!(resolve_session_param(Some("default_session"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_explicit_session_is_parsed() {
        let id = resolve_session_param(Some("abc-123")).unwrap().unwrap();
        assert_eq!(id.as_str(), "abc-123");
        assert!(resolve_session_param(Some("../x")).is_err());
    }

    #[test]
    fn test_error_statuses() {
        let id = SessionId::parse("s").unwrap();
        let cases = [
            (ScreenError::SessionUnknownOnRead(id.clone()), StatusCode::NOT_FOUND),
            (ScreenError::SessionClosed(id.clone()), StatusCode::CONFLICT),
            (ScreenError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (ScreenError::Classification("x".into()), StatusCode::BAD_GATEWAY),
            (ScreenError::Storage("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).into_response().status(), status);
        }
    }
}
