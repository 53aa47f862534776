use serde::Deserialize;
use thiserror::Error;

use crate::credential::CredentialError;
use crate::http_client::HttpClientError;

/// Single entry of the dashboard's `error_list` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

/// Failures surfaced by the dashboard API client.
///
/// Expected conditions (expired credential, unsigned agreement, missing
/// username) are dedicated variants so callers must handle each one
/// explicitly instead of matching on strings.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("dashboard transport error: `{0}`")]
    Transport(String),
    #[error("unknown error from api: status code `{0}`")]
    Response(u16),
    #[error("the api returned a list of errors: status code `{0}`")]
    ResponseList(u16, Vec<ApiErrorDetail>),
    #[error("JSON decoding failed: `{0}`")]
    ResponseDecode(String),
    #[error("dashboard circuit breaker is open")]
    CircuitBreaker,
    #[error("macaroon has expired and must be refreshed")]
    MacaroonRefreshRequired,
    #[error("user has not signed the developer agreement")]
    AgreementNotSigned,
    #[error("user has no store username")]
    MissingUsername,
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

impl From<HttpClientError> for ApiError {
    fn from(err: HttpClientError) -> Self {
        match err {
            HttpClientError::CircuitOpen => ApiError::CircuitBreaker,
            other => ApiError::Transport(other.to_string()),
        }
    }
}

impl ApiError {
    /// Status code carried by the error, when there is one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Response(status) | ApiError::ResponseList(status, _) => Some(*status),
            _ => None,
        }
    }
}
