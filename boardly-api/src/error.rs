/// Error handling for the API server
///
/// This module provides a unified error type that maps to HTTP responses.
/// All handlers return `Result<T, ApiError>`; library errors from
/// `boardly-shared` convert into it with `?`.
///
/// # Example
///
/// ```
/// use boardly_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::json;
///
/// async fn handler() -> ApiResult<Json<serde_json::Value>> {
///     Err(ApiError::NotFound("board not found".to_string()))
/// }
/// ```

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use boardly_shared::{
    auth::middleware::AuthError,
    boards::BoardError,
    caps::{CapError, CapReason, CapType},
    export::ExportError,
    over_limit::OverLimitError,
    store::StoreError,
    subscription::SubscriptionError,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Forbidden (403)
    Forbidden(String),

    /// Plan cap reached or account locked (403, `cap_exceeded`)
    CapExceeded {
        cap_type: CapType,
        current: u32,
        limit: u32,
        reason: CapReason,
    },

    /// Not found (404)
    NotFound(String),

    /// Conflict (409)
    Conflict(String),

    /// Gone (410) - spent or expired export links
    Gone(String),

    /// Unprocessable entity (422) - validation errors
    ValidationError(Vec<ValidationErrorDetail>),

    /// Too many requests (429)
    RateLimitExceeded {
        retry_after: u64,
        message: String,
    },

    /// Internal server error (500)
    InternalError(String),

    /// Persistence failure (500); the message is passed through
    StoreFailure(String),

    /// Service unavailable (503)
    ServiceUnavailable(String),
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "bad_request", "unauthorized")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Optional validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

fn cap_message(cap_type: CapType, current: u32, limit: u32, reason: CapReason) -> String {
    match reason {
        CapReason::LimitReached => format!(
            "{} limit reached ({}/{}). Upgrade to Pro for more.",
            cap_type.as_str(),
            current,
            limit
        ),
        CapReason::ReadOnly => {
            "Your account is read-only until you resolve your plan limits".to_string()
        }
        CapReason::LookupFailed => "Could not verify your plan limits, try again".to_string(),
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::CapExceeded {
                cap_type,
                current,
                limit,
                reason,
            } => write!(
                f,
                "Cap exceeded: {} {}/{} ({})",
                cap_type.as_str(),
                current,
                limit,
                reason.as_str()
            ),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::Gone(msg) => write!(f, "Gone: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::RateLimitExceeded { message, .. } => write!(f, "Rate limit exceeded: {}", message),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::StoreFailure(msg) => write!(f, "Store error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Rate limits carry a Retry-After header
        if let ApiError::RateLimitExceeded { retry_after, message } = &self {
            let body = Json(ErrorResponse {
                error: "rate_limit_exceeded".to_string(),
                message: message.clone(),
                details: None,
            });

            let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(*retry_after));
            return response;
        }

        // Cap violations have their own body shape so clients can show an upsell
        if let ApiError::CapExceeded {
            cap_type,
            current,
            limit,
            reason,
        } = self
        {
            let body = Json(json!({
                "error": "cap_exceeded",
                "message": cap_message(cap_type, current, limit, reason),
                "cap_type": cap_type,
                "current": current,
                "limit": limit,
                "reason": reason,
                "upgrade": true,
            }));
            return (StatusCode::FORBIDDEN, body).into_response();
        }

        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::Gone(msg) => (StatusCode::GONE, "gone", msg, None),
            ApiError::ValidationError(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            ApiError::StoreFailure(msg) => {
                tracing::error!(error = %msg, "Store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg, None)
            }
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg,
                None,
            ),
            ApiError::RateLimitExceeded { .. } | ApiError::CapExceeded { .. } => {
                unreachable!("handled above")
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();
        ApiError::ValidationError(details)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, .. } => ApiError::NotFound(format!("{} not found", entity)),
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::Unavailable(msg) => ApiError::ServiceUnavailable(msg),
            other => ApiError::StoreFailure(other.to_string()),
        }
    }
}

impl From<CapError> for ApiError {
    fn from(err: CapError) -> Self {
        match err {
            CapError::Exceeded {
                cap_type,
                current,
                limit,
                reason,
            } => ApiError::CapExceeded {
                cap_type,
                current,
                limit,
                reason,
            },
        }
    }
}

impl From<BoardError> for ApiError {
    fn from(err: BoardError) -> Self {
        match err {
            BoardError::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
            BoardError::Validation(msg) => ApiError::BadRequest(msg),
            BoardError::Cap(e) => e.into(),
            BoardError::Ordering(e) => ApiError::BadRequest(e.to_string()),
            BoardError::Store(e) => e.into(),
        }
    }
}

impl From<SubscriptionError> for ApiError {
    fn from(err: SubscriptionError) -> Self {
        match err {
            SubscriptionError::UserNotFound(_) => ApiError::NotFound(err.to_string()),
            SubscriptionError::TooManyBoards(_) => ApiError::Conflict(err.to_string()),
            SubscriptionError::Store(e) => e.into(),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<OverLimitError> for ApiError {
    fn from(err: OverLimitError) -> Self {
        match err {
            OverLimitError::BoardNotFound => ApiError::NotFound(err.to_string()),
            OverLimitError::NotFreePlan => ApiError::BadRequest(err.to_string()),
            OverLimitError::Store(e) => e.into(),
        }
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::BoardNotFound | ExportError::TokenNotFound => {
                ApiError::NotFound(err.to_string())
            }
            ExportError::Gone => ApiError::Gone(err.to_string()),
            ExportError::NotReady => ApiError::Conflict(err.to_string()),
            ExportError::Store(e) => e.into(),
            ExportError::Render(e) => ApiError::InternalError(e.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => ApiError::Unauthorized("Missing credentials".to_string()),
            AuthError::InvalidFormat(msg) => ApiError::BadRequest(msg),
            AuthError::InvalidToken(msg) => ApiError::Unauthorized(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::BadRequest("Invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: Invalid input");

        let err = ApiError::NotFound("board not found".to_string());
        assert_eq!(err.to_string(), "Not found: board not found");
    }

    #[tokio::test]
    async fn test_cap_exceeded_body() {
        let err: ApiError = CapError::Exceeded {
            cap_type: CapType::Boards,
            current: 1,
            limit: 1,
            reason: CapReason::LimitReached,
        }
        .into();

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = body_json(response).await;
        assert_eq!(body["error"], "cap_exceeded");
        assert_eq!(body["current"], 1);
        assert_eq!(body["limit"], 1);
        assert_eq!(body["reason"], "limit_reached");
        assert_eq!(body["upgrade"], true);
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = ApiError::RateLimitExceeded {
            retry_after: 17,
            message: "slow down".to_string(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "17");
    }

    #[test]
    fn test_library_error_status_mapping() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (SubscriptionError::TooManyBoards(3).into(), StatusCode::CONFLICT),
            (SubscriptionError::NotPro.into(), StatusCode::BAD_REQUEST),
            (SubscriptionError::UserNotFound("x".into()).into(), StatusCode::NOT_FOUND),
            (ExportError::Gone.into(), StatusCode::GONE),
            (OverLimitError::BoardNotFound.into(), StatusCode::NOT_FOUND),
            (BoardError::Validation("bad".into()).into(), StatusCode::BAD_REQUEST),
            (BoardError::NotFound("task").into(), StatusCode::NOT_FOUND),
            (
                StoreError::Unavailable("down".into()).into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_store_failure_passes_message_through() {
        let err: ApiError = StoreError::Corrupt("unknown plan tier: platinum".into()).into();

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"], "store_error");
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("unknown plan tier: platinum"));
    }

    #[tokio::test]
    async fn test_export_render_failure_is_opaque() {
        let render = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let response = ApiError::from(ExportError::Render(render)).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["message"], "An internal error occurred");
    }

    #[test]
    fn test_validation_error() {
        let errors = vec![
            ValidationErrorDetail {
                field: "title".to_string(),
                message: "Title is required".to_string(),
            },
            ValidationErrorDetail {
                field: "columnId".to_string(),
                message: "Unknown column".to_string(),
            },
        ];

        let err = ApiError::ValidationError(errors);
        assert_eq!(err.to_string(), "Validation failed: 2 errors");
    }
}
