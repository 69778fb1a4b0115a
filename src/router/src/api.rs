//! Error body shared by every route: `{ "error": <category>, "message": <text> }`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use common::auth::AuthError;
use common::tenancy::TenancyError;
use integrity::IntegrityError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

/// An [`ApiError`] paired with the status it is served with.
#[derive(Debug)]
pub struct ApiFailure {
    pub status: StatusCode,
    pub body: ApiError,
}

impl ApiFailure {
    pub fn new(status: StatusCode, error: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiError::new(error, message),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation", message)
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<IntegrityError> for ApiFailure {
    fn from(err: IntegrityError) -> Self {
        let status = match &err {
            IntegrityError::Validation(_) => StatusCode::BAD_REQUEST,
            IntegrityError::NotFound(_) => StatusCode::NOT_FOUND,
            IntegrityError::Precondition(integrity::PreconditionFailure::MissingConfirmation) => {
                StatusCode::PRECONDITION_REQUIRED
            }
            IntegrityError::Precondition(_) => StatusCode::CONFLICT,
            IntegrityError::Transaction { .. }
            | IntegrityError::Store(_)
            | IntegrityError::Schema(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "Request failed");
        }
        Self::new(status, err.category(), err.to_string())
    }
}

impl From<AuthError> for ApiFailure {
    fn from(err: AuthError) -> Self {
        let status = StatusCode::from_u16(err.status_code).unwrap_or(StatusCode::UNAUTHORIZED);
        let category = if status == StatusCode::BAD_REQUEST {
            "malformed_credentials"
        } else {
            "unauthenticated"
        };
        Self::new(status, category, err.message)
    }
}

impl From<TenancyError> for ApiFailure {
    fn from(err: TenancyError) -> Self {
        match err {
            TenancyError::Unresolved { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "tenant_unresolved", err.to_string())
            }
            TenancyError::Lookup(e) => {
                tracing::error!(error = %e, "Tenant lookup failed");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    format!("tenant lookup failed: {e}"),
                )
            }
        }
    }
}

impl From<sqlx::Error> for ApiFailure {
    fn from(err: sqlx::Error) -> Self {
        IntegrityError::from(err).into()
    }
}

pub type ApiResult<T> = Result<T, ApiFailure>;

#[cfg(test)]
mod tests {
    use super::*;
    use integrity::PreconditionFailure;

    fn status_of(err: IntegrityError) -> StatusCode {
        ApiFailure::from(err).status
    }

    #[test]
    fn test_integrity_errors_map_to_statuses() {
        assert_eq!(
            status_of(IntegrityError::validation("bad table")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(IntegrityError::NotFound("tenant X".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(PreconditionFailure::TenantActive("T1".into()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(PreconditionFailure::MissingConfirmation.into()),
            StatusCode::PRECONDITION_REQUIRED
        );
        assert_eq!(
            status_of(IntegrityError::Store(sqlx::Error::RowNotFound)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_body_carries_category() {
        let failure = ApiFailure::from(IntegrityError::from(
            PreconditionFailure::QuarantineTenantProtected,
        ));
        assert_eq!(failure.body.error, "precondition_failed");
        assert!(!failure.body.message.is_empty());
    }

    #[test]
    fn test_auth_errors_keep_their_status() {
        let failure = ApiFailure::from(AuthError::bad_request("nope"));
        assert_eq!(failure.status, StatusCode::BAD_REQUEST);
        assert_eq!(failure.body.error, "malformed_credentials");

        let failure = ApiFailure::from(AuthError::unauthorized("nope"));
        assert_eq!(failure.status, StatusCode::UNAUTHORIZED);
        assert_eq!(failure.body.error, "unauthenticated");
    }

    #[test]
    fn test_unresolved_tenant_is_bad_request() {
        let failure = ApiFailure::from(TenancyError::Unresolved {
            requested: Some("nobody".into()),
        });
        assert_eq!(failure.status, StatusCode::BAD_REQUEST);
        assert_eq!(failure.body.error, "tenant_unresolved");
    }
}
