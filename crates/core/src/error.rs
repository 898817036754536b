//! The gateway's error kind and its HTTP-surface mapping.

use salvo::http::StatusCode;
use salvo::oapi::ToSchema;
use serde::Serialize;
use thiserror::Error;

/// Errors the Session Lifecycle Engine can raise, one variant per row of the
/// error-handling table: trigger -> surface mapping is fixed by the variant,
/// not decided by callers.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid secret key")]
    AuthRejected,

    #[error("API key not registered")]
    KeyNotRegistered,

    #[error("Whatsapp session not found")]
    SessionNotFound,

    #[error("Session is logged out")]
    SessionLoggedOut,

    #[error("This session is currently handled by another instance ({owner})")]
    SessionLocked { owner: String },

    #[error("Session not connected")]
    NotConnected,

    #[error("{0}")]
    Validation(String),

    #[error("Unable to generate API key, please retry")]
    KeyExhaustion,

    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

impl GatewayError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        GatewayError::Internal(err.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        GatewayError::Validation(message.into())
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::AuthRejected => StatusCode::FORBIDDEN,
            GatewayError::KeyNotRegistered => StatusCode::FORBIDDEN,
            GatewayError::SessionNotFound => StatusCode::NOT_FOUND,
            GatewayError::SessionLoggedOut => StatusCode::CONFLICT,
            GatewayError::SessionLocked { .. } => StatusCode::LOCKED,
            GatewayError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::KeyExhaustion => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message placed in the error envelope's `message` field.
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::SessionLocked { owner } => {
                format!("This session is currently handled by another instance ({owner})")
            }
            GatewayError::Internal(_) => "Internal server error".to_owned(),
            other => other.to_string(),
        }
    }
}

impl From<diesel::result::Error> for GatewayError {
    fn from(err: diesel::result::Error) -> Self {
        GatewayError::internal(err)
    }
}

impl From<diesel::r2d2::PoolError> for GatewayError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        GatewayError::internal(err)
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::internal(err)
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// The common response envelope used by every route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Envelope<T> {
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<T>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Error {
        message: String,
    },
}

impl<T> Envelope<T> {
    pub fn data(value: T) -> Self {
        Envelope::Success {
            data: Some(value),
            message: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Envelope::Success {
            data: None,
            message: Some(message.into()),
        }
    }
}

impl Envelope<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Envelope::Error {
            message: message.into(),
        }
    }
}

#[async_trait::async_trait]
impl salvo::Writer for GatewayError {
    async fn write(mut self, _req: &mut salvo::Request, _depot: &mut salvo::Depot, res: &mut salvo::Response) {
        if matches!(self, GatewayError::Internal(_)) {
            tracing::error!(error = %self, "internal error surfaced to caller");
        }
        res.status_code(self.status_code());
        res.render(salvo::writing::Json(Envelope::<()>::error(self.public_message())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_opacity_status_codes_are_stable() {
        assert_eq!(GatewayError::KeyNotRegistered.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            GatewayError::SessionLocked { owner: "host-1".into() }.status_code(),
            StatusCode::LOCKED
        );
    }

    #[test]
    fn internal_error_never_leaks_cause_to_the_public_message() {
        let err = GatewayError::internal(anyhow::anyhow!("duplicate key value violates constraint"));
        assert_eq!(err.public_message(), "Internal server error");
    }
}
