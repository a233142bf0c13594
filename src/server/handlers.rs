use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use crate::dialogue::GenerationConfig;
use crate::orchestrator::{JobOrchestrator, OrchestratorError, error_details};

use super::dto::{ErrorResponse, GenerateQuery, StatusResponse, SyncResponse};

#[derive(Clone)]
pub struct AppState {
    orchestrator: JobOrchestrator,
}

impl AppState {
    pub fn new(orchestrator: JobOrchestrator) -> Self {
        Self { orchestrator }
    }
}

fn reject(status: StatusCode, body: ErrorResponse) -> Response {
    (status, Json(body)).into_response()
}

/// Parses the request body; malformed JSON is an input error.
fn parse_config(body: &Bytes) -> Result<GenerationConfig, Response> {
    serde_json::from_slice(body).map_err(|e| {
        reject(
            StatusCode::BAD_REQUEST,
            ErrorResponse::new(format!("invalid request body: {e}")),
        )
    })
}

/// POST /generate[?mode=async]
pub async fn post_generate(
    State(state): State<AppState>,
    Query(query): Query<GenerateQuery>,
    body: Bytes,
) -> Response {
    let config = match parse_config(&body) {
        Ok(config) => config,
        Err(response) => return response,
    };

    match query.mode.as_deref() {
        Some("async") => submit(&state, config).await,
        None | Some("") | Some("sync") => generate_now(&state, config).await,
        Some(other) => reject(
            StatusCode::BAD_REQUEST,
            ErrorResponse::new(format!("unsupported mode '{other}' for POST")),
        ),
    }
}

async fn submit(state: &AppState, config: GenerationConfig) -> Response {
    match state.orchestrator.submit(config).await {
        Ok(submission) => (StatusCode::ACCEPTED, Json(submission)).into_response(),
        Err(OrchestratorError::InvalidConfig(msg)) => {
            reject(StatusCode::BAD_REQUEST, ErrorResponse::new(msg))
        }
        Err(e) => {
            error!(error = %e, "failed to create job");
            reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(format!("failed to create job: {e}")),
            )
        }
    }
}

async fn generate_now(state: &AppState, config: GenerationConfig) -> Response {
    if let Err(msg) = config.validate() {
        return reject(StatusCode::BAD_REQUEST, ErrorResponse::new(msg));
    }
    // No job to record a failure on, so missing model or key is an input error.
    if let Err(e) = state.orchestrator.check_preconditions(&config) {
        return reject(StatusCode::BAD_REQUEST, ErrorResponse::new(e.to_string()));
    }
    match state.orchestrator.generate_sync(&config).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(SyncResponse {
                conversation: outcome.conversation,
                metadata: outcome.metadata,
            }),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "synchronous generation failed");
            reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(e.to_string()).with_details(error_details(&e)),
            )
        }
    }
}

/// GET /generate?mode=status&jobId=<id>
pub async fn get_generate(
    State(state): State<AppState>,
    Query(query): Query<GenerateQuery>,
) -> Response {
    if query.mode.as_deref() != Some("status") {
        return reject(
            StatusCode::BAD_REQUEST,
            ErrorResponse::new("GET requires mode=status"),
        );
    }
    let Some(job_id) = query.job_id.filter(|id| !id.is_empty()) else {
        return reject(
            StatusCode::BAD_REQUEST,
            ErrorResponse::new("jobId is required"),
        );
    };

    match state.orchestrator.get_status(&job_id).await {
        Ok(view) => (StatusCode::OK, Json(StatusResponse::from(view))).into_response(),
        Err(OrchestratorError::NotFound(id)) => reject(
            StatusCode::NOT_FOUND,
            ErrorResponse::new(format!("job not found: {id}")),
        ),
        Err(e) => {
            error!(job_id = %job_id, error = %e, "failed to read job status");
            reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(format!("failed to read job status: {e}")),
            )
        }
    }
}

/// OPTIONS /generate without CORS request headers.
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}
