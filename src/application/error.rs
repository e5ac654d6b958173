use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    cache::CacheError,
    config::LoadError,
    drive::DriveError,
    infra::error::InfraError,
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Handler error: a public message for the client plus a report for the logs.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<CacheError> for HttpError {
    fn from(error: CacheError) -> Self {
        const SOURCE: &str = "infra::http::cache_error_to_http_error";
        match error {
            CacheError::InvalidArgument(_) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Invalid cache key",
                &error,
            ),
            CacheError::Store(_) => HttpError::from_error(
                SOURCE,
                StatusCode::SERVICE_UNAVAILABLE,
                "Cache temporarily unavailable",
                &error,
            ),
            CacheError::Codec(_) => HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                &error,
            ),
        }
    }
}

impl From<DriveError> for HttpError {
    fn from(error: DriveError) -> Self {
        const SOURCE: &str = "infra::http::drive_error_to_http_error";
        let (status, message) = match &error {
            DriveError::Disabled => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Drive integration is disabled",
            ),
            DriveError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "Invalid request"),
            DriveError::Identity { .. } => {
                (StatusCode::BAD_GATEWAY, "Identity provider rejected the request")
            }
            DriveError::Http(_) => (StatusCode::BAD_GATEWAY, "Identity provider unreachable"),
            DriveError::NoCachedToken | DriveError::AccountMismatch { .. } => {
                (StatusCode::CONFLICT, "Drive account is not bound")
            }
            DriveError::Url(_)
            | DriveError::CacheFile { .. }
            | DriveError::Codec(_)
            | DriveError::Configuration { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };
        HttpError::from_error(SOURCE, status, message, &error)
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::StoreError;

    #[test]
    fn report_collects_source_chain() {
        let error = AppError::from(InfraError::from(CacheError::from(StoreError::wrong_type(
            "EFCache:dep:Table:Post",
            "get",
        ))));
        let report = ErrorReport::from_error("test", StatusCode::SERVICE_UNAVAILABLE, &error);

        assert!(report.messages.len() >= 2);
        assert!(report.messages.iter().any(|m| m.contains("EFCache:dep:Table:Post")));
    }

    #[test]
    fn store_failures_map_to_service_unavailable() {
        let response =
            HttpError::from(CacheError::from(StoreError::configuration("down"))).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let report = response.extensions().get::<ErrorReport>().expect("report");
        assert!(report.messages.iter().any(|m| m.contains("down")));
    }

    #[test]
    fn disabled_drive_is_service_unavailable() {
        let error = HttpError::from(DriveError::Disabled);
        assert_eq!(error.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn blank_cache_key_is_a_bad_request() {
        let error = HttpError::from(CacheError::InvalidArgument("cache_key"));
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
    }
}
