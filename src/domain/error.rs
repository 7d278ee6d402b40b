use thiserror::Error;

#[derive(Debug, Error)]
pub enum EscrowError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("escrow already exists for payment {0}")]
    DuplicateEscrow(String),

    #[error("webhook signature: {0}")]
    Signature(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal: {0}")]
    Internal(String),
}

impl EscrowError {
    /// Infrastructure failures the caller may retry. Domain failures are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Serialization(_) | Self::Internal(_)
        )
    }

    /// Stable machine-readable kind for API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Unauthorized(_) => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::DuplicateEscrow(_) => "duplicate_escrow",
            Self::Signature(_) => "signature_error",
            Self::Database(_) | Self::Serialization(_) | Self::Internal(_) => "internal_error",
        }
    }
}
