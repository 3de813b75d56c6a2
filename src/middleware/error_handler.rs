use actix_web::{
    error::{JsonPayloadError, PathError},
    HttpRequest,
};

use crate::core::AppError;

/// Render malformed JSON bodies through the application error payload
pub fn json_error_handler(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    tracing::warn!(path = %req.path(), error = %err, "Rejected malformed JSON body");
    AppError::validation(format!("Invalid request body: {}", err)).into()
}

/// Render malformed path segments through the application error payload
pub fn path_error_handler(err: PathError, req: &HttpRequest) -> actix_web::Error {
    tracing::warn!(path = %req.path(), error = %err, "Rejected malformed path");
    AppError::validation(format!("Invalid path parameter: {}", err)).into()
}
