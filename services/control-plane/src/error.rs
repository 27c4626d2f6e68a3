use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Control-plane service error variants.
#[derive(Debug, thiserror::Error)]
pub enum ControlPlaneError {
    #[error("tenant not found")]
    TenantNotFound,
    #[error("invalid tenant")]
    InvalidTenant,
    #[error("missing data")]
    MissingData,
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ControlPlaneError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TenantNotFound => "TENANT_NOT_FOUND",
            Self::InvalidTenant => "INVALID_TENANT",
            Self::MissingData => "MISSING_DATA",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for ControlPlaneError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::TenantNotFound => StatusCode::NOT_FOUND,
            Self::InvalidTenant | Self::MissingData => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Only 500s carry a cause worth a log line; the anyhow chain names the failing step.
        if let Self::Internal(ref e) = self {
            tracing::error!(error = %format!("{e:#}"), kind = "INTERNAL", "internal error");
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
