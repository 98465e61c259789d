//! Domain errors rendered as HTTP responses.
//!
//! Every failure leaves the API as the `{code, message, traceId?, details?}`
//! envelope. Internal errors are logged in full and redacted on the wire.
//! Body and query extractor failures are routed through the same envelope
//! by registering [`json_config`] and [`query_config`] on the app.

use actix_web::error::{JsonPayloadError, QueryPayloadError};
use actix_web::http::header::RETRY_AFTER;
use actix_web::{HttpRequest, HttpResponse, ResponseError, http::StatusCode, web};
use serde_json::json;
use tracing::{error, warn};

use crate::domain::{Error, ErrorCode};
use crate::middleware::trace::TRACE_ID_HEADER;

/// Convenient result alias for HTTP handlers.
pub type ApiResult<T> = Result<T, Error>;

/// Seconds clients are asked to wait after a `service_unavailable` reply.
pub const RETRY_AFTER_SECS: u32 = 5;

/// Largest accepted JSON body; group uploads are the biggest payloads.
pub const JSON_BODY_LIMIT: usize = 1024 * 1024;

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn redact_if_internal(error: &Error) -> Error {
    if error.code() != ErrorCode::InternalError {
        return error.clone();
    }
    let redacted = Error::internal("Internal server error");
    match error.trace_id() {
        Some(id) => redacted.with_trace_id(id.to_owned()),
        None => redacted,
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        status_for(self.code())
    }

    fn error_response(&self) -> HttpResponse {
        match self.code() {
            ErrorCode::InternalError => {
                error!(trace_id = ?self.trace_id(), message = %self.message(), "request failed");
            }
            ErrorCode::ServiceUnavailable => {
                warn!(trace_id = ?self.trace_id(), message = %self.message(), "dependency unavailable");
            }
            _ => {}
        }

        let mut builder = HttpResponse::build(self.status_code());
        if let Some(id) = self.trace_id() {
            builder.insert_header((TRACE_ID_HEADER, id.to_owned()));
        }
        if self.code() == ErrorCode::ServiceUnavailable {
            builder.insert_header((RETRY_AFTER, RETRY_AFTER_SECS.to_string()));
        }
        builder.json(redact_if_internal(self))
    }
}

impl From<actix_web::Error> for Error {
    fn from(err: actix_web::Error) -> Self {
        error!(error = %err, "actix error promoted to domain error");
        Self::internal("Internal server error")
    }
}

fn json_payload_error(err: &JsonPayloadError) -> Error {
    let (code, message) = match err {
        JsonPayloadError::OverflowKnownLength { .. } | JsonPayloadError::Overflow { .. } => {
            ("too_large", format!("request body exceeds {JSON_BODY_LIMIT} bytes"))
        }
        JsonPayloadError::ContentType => (
            "unsupported_media_type",
            "request body must be application/json".to_owned(),
        ),
        JsonPayloadError::Deserialize(inner) => ("invalid_body", inner.to_string()),
        other => ("invalid_body", other.to_string()),
    };
    Error::invalid_request(message).with_details(json!({ "field": "body", "code": code }))
}

fn query_payload_error(err: &QueryPayloadError) -> Error {
    Error::invalid_request(err.to_string())
        .with_details(json!({ "field": "query", "code": "invalid_query" }))
}

/// JSON extractor settings that answer malformed bodies with the envelope.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(JSON_BODY_LIMIT)
        .error_handler(|err, _req: &HttpRequest| json_payload_error(&err).into())
}

/// Query extractor settings that answer malformed query strings with the envelope.
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req: &HttpRequest| query_payload_error(&err).into())
}
