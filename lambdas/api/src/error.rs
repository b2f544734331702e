use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rx_domain::Error;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

/// Domain error on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Validation { .. }
        | Error::IncompleteFulfillment { .. }
        | Error::InvalidStateTransition { .. } => StatusCode::BAD_REQUEST,
        Error::Forbidden => StatusCode::FORBIDDEN,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::OrderFrozen | Error::Conflict { .. } | Error::Uniqueness { .. } => StatusCode::CONFLICT,
        Error::Upstream { .. } | Error::Persistence { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError(err) = self;
        let status = status_for(&err);
        let kind = err.kind();

        let (message, details) = match err {
            // same body for every lookup miss
            Error::NotFound { .. } => ("order not found".to_string(), Vec::new()),
            Error::Validation { errors } => ("invalid request".to_string(), errors),
            Error::IncompleteFulfillment { missing } => {
                ("required fulfillment fields are missing".to_string(), missing)
            }
            err @ (Error::Upstream { .. } | Error::Persistence { .. }) => {
                tracing::error!(kind, error = %err, "request failed");
                ("internal error".to_string(), Vec::new())
            }
            other => (other.to_string(), Vec::new()),
        };

        (
            status,
            Json(ErrorBody {
                error: kind,
                message,
                details,
            }),
        )
            .into_response()
    }
}
