use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use database::DbError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database not connected")]
    NotReady,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{context}: {source}")]
    Storage {
        context: &'static str,
        #[source]
        source: DbError,
    },
}

impl AppError {
    /// Wraps a failed query, keeping the driver's message for the response body.
    ///
    /// A session that vanished between the readiness check and the query
    /// reports `NotConnected`; that is still a 503, not a storage failure.
    pub fn storage(context: &'static str) -> impl FnOnce(DbError) -> AppError {
        move |source| match source {
            DbError::NotConnected => AppError::NotReady,
            source => AppError::Storage { context, source },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Converts our custom `AppError` into an HTTP response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Storage { context, source } = &self {
            tracing::error!(error = %source, "{}.", context);
        }

        let body = Json(json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}
