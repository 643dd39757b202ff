//! HTTP-facing error type.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use gitway_git::{GitError, Service};

/// Errors detected before an engine process produces output.
///
/// Once a process is streaming, failures are reported in-band by git and
/// never become an HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Repository not specified")]
    RepoNotSpecified,
    #[error("Repository not found")]
    RepoNotFound(String),
    #[error("Service parameter required")]
    MissingService,
    #[error("Service not enabled: {0}")]
    ServiceDisabled(Service),
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Bad Request")]
    BadRequest,
    #[error("Request body too large")]
    PayloadTooLarge,
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
    #[error("git error: {0}")]
    Git(#[from] GitError),
}

impl ApiError {
    /// Status code reported to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RepoNotSpecified | ApiError::RepoNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MissingService | ApiError::BadRequest | ApiError::InvalidBody(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Git(GitError::UnknownService(_)) => StatusCode::BAD_REQUEST,
            ApiError::ServiceDisabled(_) => StatusCode::FORBIDDEN,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Git(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        // Internal details stay in the log.
        let message = match &self {
            ApiError::Git(GitError::UnknownService(_)) => self.to_string(),
            ApiError::Git(_) => "Internal Server Error".to_string(),
            _ => self.to_string(),
        };

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            message,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::RepoNotSpecified.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::RepoNotFound("x.git".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::MissingService.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::BadRequest.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Git(GitError::UnknownService("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::ServiceDisabled(Service::ReceivePack).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::Git(GitError::Io(std::io::Error::other("boom"))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_hides_path() {
        let err = ApiError::RepoNotFound("/srv/git/secret.git".into());
        assert_eq!(err.to_string(), "Repository not found");
    }
}
