use crate::config::{
    mask_credential, validate_api_key, validate_job_status, Config, GlobalSettings,
    PipelineConfig,
};
use crate::errors::AppError;
use crate::models::{Submission, SubmissionValue};
use crate::pipeline::SubmissionPipeline;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state injected into handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Global settings; replaced at runtime through the settings endpoint.
    pub settings: RwLock<GlobalSettings>,
    /// Form id -> pipeline configuration.
    pub pipelines: HashMap<String, PipelineConfig>,
    /// Shared pipeline (HTTP pool, badge cache, file store).
    pub pipeline: SubmissionPipeline,
}

impl AppState {
    pub fn pipeline_config(&self, form_id: &str) -> PipelineConfig {
        self.pipelines.get(form_id).cloned().unwrap_or_else(|| {
            tracing::debug!("No pipeline config for form '{}', using defaults", form_id);
            PipelineConfig::default()
        })
    }
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-sm8-sync",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Body of a submission request.
#[derive(Debug, Deserialize)]
pub struct SubmissionRequest {
    /// Caller's submission id; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub data: BTreeMap<String, SubmissionValue>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

/// POST /api/v1/forms/:form_id/submissions
///
/// Runs the synchronization pipeline for one submission and answers once it
/// has finished. Only the user-facing message is returned; technical detail
/// stays in the logs. A body that cannot be read is answered like any other
/// validation failure.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Path(form_id): Path<String>,
    request: Result<Json<SubmissionRequest>, JsonRejection>,
) -> (StatusCode, Json<SubmissionResponse>) {
    let pipeline = state.pipeline_config(&form_id);
    let request = match request {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!(
                "Rejected submission body for form '{}': {}",
                form_id,
                rejection.body_text()
            );
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(SubmissionResponse {
                    success: false,
                    message: pipeline.error_message,
                    submission_id: None,
                    job_id: None,
                }),
            );
        }
    };

    let submission_id = request
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    tracing::info!(
        "📨 Received submission {} for form '{}' ({} fields)",
        submission_id,
        form_id,
        request.data.len()
    );

    let submission = Submission::new(submission_id.clone(), request.data);
    let settings = state.settings.read().await.clone();

    let outcome = state
        .pipeline
        .process(&submission, &pipeline, &settings)
        .await;

    let status = match &outcome.error {
        None => StatusCode::OK,
        Some(e) => e.status_code(),
    };

    (
        status,
        Json(SubmissionResponse {
            success: outcome.is_success(),
            message: outcome.user_message,
            submission_id: Some(submission_id),
            job_id: outcome.job_id,
        }),
    )
}

#[derive(Debug, Default, Deserialize)]
pub struct ConnectionTestRequest {
    #[serde(default)]
    pub api_key: Option<String>,
}

/// POST /api/v1/connection/test
///
/// Verifies a credential by listing one company. Uses the body's `api_key`
/// when given, the global credential otherwise.
pub async fn test_connection(
    State(state): State<Arc<AppState>>,
    body: Option<Json<ConnectionTestRequest>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let requested = body
        .and_then(|Json(b)| b.api_key)
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty());
    let api_key = match requested {
        Some(key) => key,
        None => state.settings.read().await.api_key.clone(),
    };

    if api_key.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "message": "Please enter an API key to test the connection."
            })),
        );
    }

    tracing::info!("Testing connection with key {}", mask_credential(&api_key));
    let client = state.pipeline.client_for(&api_key);

    match client.list_companies(1, 0).await {
        Ok(companies) => {
            let first = companies.first();
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": "Connection successful!",
                    "company_name": first.and_then(|c| c.name.clone()).unwrap_or_else(|| "Unknown".to_string()),
                    "company_email": first.and_then(|c| c.email.clone()),
                })),
            )
        }
        Err(e) => {
            tracing::warn!("Connection test failed: {}", e);
            (
                StatusCode::OK,
                Json(json!({
                    "success": false,
                    "message": connection_error_message(&e),
                })),
            )
        }
    }
}

/// Human-readable explanation of a failed connection test.
pub fn connection_error_message(error: &AppError) -> String {
    match error.root() {
        AppError::Client { status: 401, .. } => {
            "Authentication failed. Please check your API key.".to_string()
        }
        AppError::Client { status: 403, .. } => {
            "Access denied. The API key may not have the correct permissions.".to_string()
        }
        AppError::Client { status: 404, .. } => {
            "API endpoint not found. Please check ServiceM8 service status.".to_string()
        }
        AppError::RateLimited(_) => {
            "Rate limit exceeded. Please try again in a few minutes.".to_string()
        }
        AppError::Timeout(_) => {
            "Connection timed out. Could not reach ServiceM8 servers.".to_string()
        }
        AppError::Network(_) => {
            "Could not reach the ServiceM8 API host. Check your internet connection.".to_string()
        }
        AppError::Client { status, .. } | AppError::Server { status, .. } => {
            format!("Failed to connect. HTTP Status Code: {}", status)
        }
        _ => "An unknown error occurred.".to_string(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SettingsUpdate {
    pub api_key: String,
    #[serde(default)]
    pub default_job_status: Option<String>,
    #[serde(default)]
    pub debug: Option<bool>,
}

/// PUT /api/v1/settings
///
/// Replaces the global credential (and optionally status/debug). A changed
/// credential drops the previous credential's badge cache entry.
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<serde_json::Value>, AppError> {
    validate_admin_token(&state, &headers)?;

    let api_key = update.api_key.trim().to_string();
    validate_api_key(&api_key).map_err(AppError::BadRequest)?;
    if let Some(status) = &update.default_job_status {
        validate_job_status(status).map_err(AppError::BadRequest)?;
    }

    let mut settings = state.settings.write().await;
    let previous_key = std::mem::replace(&mut settings.api_key, api_key);
    if let Some(status) = update.default_job_status {
        settings.default_job_status = status;
    }
    if let Some(debug) = update.debug {
        settings.debug = debug;
    }

    let credential_changed = previous_key != settings.api_key;
    if credential_changed && !previous_key.is_empty() {
        state.pipeline.badge_cache().invalidate(&previous_key).await;
    }
    tracing::info!(
        "Settings updated (credential {})",
        if credential_changed { "changed" } else { "unchanged" }
    );

    Ok(Json(json!({
        "status": "updated",
        "api_key": mask_credential(&settings.api_key),
        "default_job_status": settings.default_job_status,
        "debug": settings.debug,
        "badge_cache_cleared": credential_changed,
    })))
}

/// Validate admin token from X-Admin-Token header
fn validate_admin_token(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(ref expected) = state.config.admin_token else {
        return Err(AppError::Unauthorized(
            "Settings endpoint disabled (ADMIN_TOKEN not set)".to_string(),
        ));
    };

    let token = headers
        .get("X-Admin-Token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing X-Admin-Token header".to_string()))?;

    if !constant_time_compare(token, expected) {
        tracing::warn!("Invalid admin token received");
        return Err(AppError::Unauthorized("Invalid admin token".to_string()));
    }

    Ok(())
}

/// Constant-time string comparison
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
