//! Mapping of domain failures onto HTTP responses.

use api_shared::{AuthError, ErrorRes};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use emr_core::encounter_transaction::EtError;
use emr_core::EmrError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Emr(#[from] EmrError),
    #[error(transparent)]
    Wire(#[from] EtError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Wire(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Emr(EmrError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Emr(EmrError::InvalidState(_)) => StatusCode::CONFLICT,
            ApiError::Emr(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Emr(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::error!("{} {:?}", status, self);
        let error = if status.is_server_error() {
            "Internal error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorRes { error })).into_response()
    }
}
