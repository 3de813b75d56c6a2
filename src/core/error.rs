use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::{json, Value};

/// Application-wide Result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Main application error type
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Validation errors, raised before any write
    #[error("Validation error: {0}")]
    Validation(String),

    /// Lookup failed after every resolver step was tried
    #[error("{resource} not found (attempted: {attempted})")]
    NotFound { resource: String, attempted: String },

    /// The requested transition is not allowed from the current status
    #[error("Invalid state: {message} (current status: {current_status})")]
    InvalidState {
        message: String,
        current_status: String,
    },

    /// Payment gateway unreachable or returned an error
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Webhook signature did not verify
    #[error("Webhook signature verification failed: {0}")]
    SignatureVerification(String),

    /// Ledger failed its invariant check; the write was aborted
    #[error("Ledger consistency error: {0}")]
    Consistency(String),

    /// Database operation errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// HTTP client errors
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Short machine-readable error family used in response payloads
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) | AppError::Json(_) => "validation",
            AppError::NotFound { .. } => "not_found",
            AppError::InvalidState { .. } => "invalid_state",
            AppError::Gateway(_) | AppError::SignatureVerification(_) | AppError::HttpClient(_) => {
                "gateway"
            }
            AppError::Consistency(_) => "consistency",
            AppError::Database(_) | AppError::Configuration(_) | AppError::Internal(_) => {
                "internal"
            }
        }
    }

    /// Whether the message is safe to show to a caller
    fn is_exposable(&self) -> bool {
        !matches!(
            self,
            AppError::Database(_)
                | AppError::Configuration(_)
                | AppError::HttpClient(_)
                | AppError::Internal(_)
                | AppError::Consistency(_)
        )
    }

    fn context(&self) -> Value {
        match self {
            AppError::NotFound {
                resource,
                attempted,
            } => json!({ "resource": resource, "attempted": attempted }),
            AppError::InvalidState { current_status, .. } => {
                json!({ "current_status": current_status })
            }
            _ => Value::Null,
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let message = if self.is_exposable() {
            self.to_string()
        } else {
            tracing::error!(error = %self, kind = self.kind(), "Request failed with internal error");
            "Internal server error".to_string()
        };

        let mut body = json!({
            "error": {
                "code": status_code.as_u16(),
                "kind": self.kind(),
                "message": message,
            }
        });
        let context = self.context();
        if !context.is_null() {
            body["error"]["context"] = context;
        }

        HttpResponse::build(status_code).json(body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::InvalidState { .. } => StatusCode::BAD_REQUEST,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::SignatureVerification(_) => StatusCode::BAD_REQUEST,
            AppError::Consistency(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
            AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Helper functions for common error scenarios
impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(resource: impl Into<String>, attempted: impl Into<String>) -> Self {
        AppError::NotFound {
            resource: resource.into(),
            attempted: attempted.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>, current_status: impl ToString) -> Self {
        AppError::InvalidState {
            message: message.into(),
            current_status: current_status.to_string(),
        }
    }

    pub fn gateway(msg: impl Into<String>) -> Self {
        AppError::Gateway(msg.into())
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        AppError::Consistency(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}
