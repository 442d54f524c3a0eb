use axum::{
    Json, Router,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use std::sync::Arc;
use tracing::Instrument;

use crate::error::TradeError;
use crate::logger::{TraceId, annotate_span, root_span};
use crate::trade::model::{TradeRecord, TradeSubmission};
use crate::trade::store::TradeStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TradeStore>,
}

/// Create the API router
pub fn router(store: Arc<TradeStore>) -> Router {
    let state = AppState { store };

    Router::new()
        .route("/trade", get(welcome).post(save_trade))
        .route("/trade/:identifier/:version", get(get_trade))
        .with_state(state)
}

// ===== Route Handlers =====

async fn welcome() -> &'static str {
    "trade-store service is up"
}

/// Accepts one trade revision; 201 with the summary message on success.
async fn save_trade(
    State(state): State<AppState>,
    payload: Result<Json<TradeSubmission>, JsonRejection>,
) -> Result<(StatusCode, String), ApiError> {
    let trace_id = TraceId::random();

    async move {
        let Json(submission) = payload?;
        if let Some(identifier) = submission.identifier {
            annotate_span(identifier, submission.version);
        }
        tracing::info!("processing trade submission");

        let record = submission.into_record(state.store.clock().now())?;
        let summary = state.store.upsert(record).await?;
        Ok::<_, ApiError>((StatusCode::CREATED, summary.to_string()))
    }
    .instrument(root_span("save_trade", &trace_id))
    .await
}

/// Fetches one stored revision.
async fn get_trade(
    State(state): State<AppState>,
    key: Result<Path<(i64, i64)>, PathRejection>,
) -> Result<Json<TradeRecord>, ApiError> {
    let trace_id = TraceId::random();

    async move {
        let Path((identifier, version)) = key?;
        annotate_span(identifier, Some(version));
        let record = state.store.fetch(identifier, version).await?;
        Ok::<_, ApiError>(Json(record))
    }
    .instrument(root_span("get_trade", &trace_id))
    .await
}

// ===== Error Handling =====

#[derive(Debug)]
pub enum ApiError {
    Trade(TradeError),
    /// The request could not be decoded into a submission or trade key.
    Malformed(String),
}

impl From<TradeError> for ApiError {
    fn from(err: TradeError) -> Self {
        ApiError::Trade(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Malformed(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Malformed(rejection.body_text())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Malformed(_) => StatusCode::BAD_REQUEST,
            ApiError::Trade(err) => match err {
                TradeError::PastMaturityDate { .. } | TradeError::MissingField(_) => {
                    StatusCode::BAD_REQUEST
                }
                TradeError::StaleVersion { .. } => StatusCode::CONFLICT,
                TradeError::NotFound { .. } => StatusCode::NOT_FOUND,
                TradeError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Trade(TradeError::Repository(err)) => {
                tracing::error!(error = ?err, "repository failure");
                "Internal server error".to_string()
            }
            ApiError::Trade(rejection) => {
                tracing::info!(%rejection, "request rejected");
                rejection.to_string()
            }
            ApiError::Malformed(reason) => {
                tracing::info!(%reason, "malformed request");
                reason
            }
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
