use {
    crate::domain::error::EscrowError,
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
};

/// Escrow API error: status code plus `{"error_code", "message"}`.
pub struct ApiError(pub EscrowError);

impl From<EscrowError> for ApiError {
    fn from(err: EscrowError) -> Self {
        Self(err)
    }
}

fn status_for(err: &EscrowError) -> StatusCode {
    match err {
        EscrowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EscrowError::Signature(_) => StatusCode::BAD_REQUEST,
        EscrowError::Unauthorized(_) => StatusCode::FORBIDDEN,
        EscrowError::NotFound(_) => StatusCode::NOT_FOUND,
        EscrowError::InvalidState(_)
        | EscrowError::InvalidTransition(_)
        | EscrowError::DuplicateEscrow(_) => StatusCode::CONFLICT,
        EscrowError::Database(_) | EscrowError::Serialization(_) | EscrowError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let message = if self.0.is_retryable() {
            tracing::error!(error = %self.0, "escrow api request failed");
            "internal error".to_string()
        } else {
            self.0.to_string()
        };

        let body = serde_json::json!({
            "error_code": self.0.kind(),
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}

/// Missing caller identity on an escrow API request.
pub struct Unauthenticated(pub &'static str);

impl IntoResponse for Unauthenticated {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error_code": "unauthenticated",
            "message": self.0,
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Webhook error: the provider only ever sees a status code.
pub struct WebhookError(pub EscrowError);

impl From<EscrowError> for WebhookError {
    fn from(err: EscrowError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EscrowError::Validation(_) | EscrowError::Signature(_) => StatusCode::BAD_REQUEST,
            EscrowError::NotFound(_) => StatusCode::NOT_FOUND,
            // 5xx makes the provider retry, and redelivery is idempotent.
            err if err.is_retryable() => {
                tracing::error!(error = %err, "webhook processing failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            err => {
                tracing::warn!(error = %err, "webhook rejected");
                status_for(err)
            }
        };
        status.into_response()
    }
}
