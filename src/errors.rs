use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application-specific error types.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Missing or invalid credential / settings. Nothing is attempted.
    Configuration(String),
    /// Required submission field missing. Raised before any network call.
    Validation(String),
    /// Company name already taken on the remote side.
    Conflict(String),
    /// Remote API answered 429.
    RateLimited(String),
    /// Any other 4xx from the remote API.
    Client {
        /// HTTP status code.
        status: u16,
        /// Response body or message.
        message: String,
    },
    /// 5xx from the remote API.
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body or message.
        message: String,
    },
    /// Connection-level failure (DNS, refused, reset).
    Network(String),
    /// The call exceeded its timeout.
    Timeout(String),
    /// Remote answered 2xx but the response is unusable (e.g. no record id).
    InvalidResponse(String),
    /// Bad request error (invalid input on our own HTTP surface).
    BadRequest(String),
    /// Resource not found error.
    NotFound(String),
    /// Unauthorized access error.
    Unauthorized(String),
    /// Internal error.
    Internal(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// Strips any context wrappers and returns the innermost error.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Short, stable name of the error kind for structured logs.
    pub fn kind(&self) -> &'static str {
        match self.root() {
            AppError::Configuration(_) => "configuration",
            AppError::Validation(_) => "validation",
            AppError::Conflict(_) => "conflict",
            AppError::RateLimited(_) => "rate_limited",
            AppError::Client { .. } => "client",
            AppError::Server { .. } => "server",
            AppError::Network(_) => "network",
            AppError::Timeout(_) => "timeout",
            AppError::InvalidResponse(_) => "invalid_response",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Internal(_) => "internal",
            AppError::WithContext { .. } => "context",
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self.root(), AppError::RateLimited(_))
    }

    /// HTTP status a failed submission is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self.root() {
            AppError::Configuration(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::RateLimited(msg) => write!(f, "Rate limited: {}", msg),
            AppError::Client { status, message } => {
                write!(f, "Client error {}: {}", status, message)
            }
            AppError::Server { status, message } => {
                write!(f, "Server error {}: {}", status, message)
            }
            AppError::Network(msg) => write!(f, "Network error: {}", msg),
            AppError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            AppError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Remote API details never leave the service; they are logged and the
    /// caller gets a generic message.
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized access: {}", msg);
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            AppError::Configuration(msg) | AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::RateLimited(msg) => {
                tracing::warn!("Remote rate limit: {}", msg);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "Remote service is busy".to_string(),
                )
            }
            AppError::WithContext { source, context } => {
                tracing::error!("Error with context: {} -> {}", context, source);
                return source.as_ref().clone().into_response();
            }
            other => {
                tracing::error!("External API error: {}", other);
                (
                    StatusCode::BAD_GATEWAY,
                    "External service error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    /// Classifies transport failures. HTTP status errors are classified from
    /// the response itself by the client, not here.
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            let code = status.as_u16();
            match code {
                429 => AppError::RateLimited(err.to_string()),
                400..=499 => AppError::Client {
                    status: code,
                    message: err.to_string(),
                },
                _ => AppError::Server {
                    status: code,
                    message: err.to_string(),
                },
            }
        } else if err.is_decode() {
            AppError::InvalidResponse(err.to_string())
        } else {
            AppError::Network(err.to_string())
        }
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }
}
