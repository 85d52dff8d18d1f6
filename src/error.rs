// Pesa Wallet - Error Types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    // Input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    // Lookup errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // Auth errors
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // Money-movement errors
    #[error("Wallet is not active: {0}")]
    WalletInactive(String),

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Insufficient balance")]
    InsufficientBalance,

    // Downstream errors
    #[error("Identity provider error: {0}")]
    IdentityProvider(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Event publish failed: {0}")]
    EventPublish(String),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

// Sanitize database errors so table/constraint details never reach clients
impl From<sqlx::Error> for WalletError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        WalletError::DatabaseError("Database operation failed".to_string())
    }
}

impl WalletError {
    pub fn from_db_error<E: std::fmt::Display + std::fmt::Debug>(err: E) -> Self {
        tracing::error!("Database error: {:?}", err);
        WalletError::DatabaseError("Database operation failed".to_string())
    }

    /// Whether the event bus should redeliver after a handler returned this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WalletError::DatabaseError(_)
                | WalletError::IdentityProvider(_)
                | WalletError::CacheError(_)
                | WalletError::EventPublish(_)
        )
    }
}

// Axum response conversion
impl IntoResponse for WalletError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            WalletError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),

            WalletError::InvalidCredentials => (StatusCode::UNAUTHORIZED, self.to_string()),
            WalletError::InvalidToken => (StatusCode::UNAUTHORIZED, self.to_string()),

            WalletError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),

            WalletError::AlreadyExists(_) => (StatusCode::CONFLICT, self.to_string()),

            WalletError::InvalidInput(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            WalletError::ValidationError(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            WalletError::Conflict(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            WalletError::WalletInactive(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            WalletError::LimitExceeded(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            WalletError::InsufficientBalance => (StatusCode::BAD_REQUEST, self.to_string()),

            WalletError::IdentityProvider(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),

            WalletError::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            WalletError::CacheError(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            WalletError::EventPublish(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            WalletError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WalletError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(WalletError::DatabaseError("down".into()).is_transient());
        assert!(WalletError::IdentityProvider("timeout".into()).is_transient());
        assert!(!WalletError::InsufficientBalance.is_transient());
        assert!(!WalletError::NotFound("wallet".into()).is_transient());
    }

    #[test]
    fn test_db_errors_are_sanitized() {
        let err = WalletError::from_db_error("relation \"wallets\" violates constraint xyz");
        match err {
            WalletError::DatabaseError(msg) => assert_eq!(msg, "Database operation failed"),
            other => panic!("unexpected error kind: {:?}", other),
        }
    }
}
