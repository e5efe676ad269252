use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use commerce::CommerceError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{message}")]
    Upstream { status: u16, message: String },

    #[error(transparent)]
    Commerce(#[from] CommerceError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::Commerce(err) => match err {
                CommerceError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
                CommerceError::CartNotFound | CommerceError::NotFound(_) => StatusCode::NOT_FOUND,
                CommerceError::Api(api) => {
                    StatusCode::from_u16(api.status).unwrap_or(StatusCode::BAD_GATEWAY)
                }
                CommerceError::Transport(_) if err.is_unreachable() => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                CommerceError::Transport(_) | CommerceError::Decode(_) => StatusCode::BAD_GATEWAY,
                CommerceError::Snapshot(_) | CommerceError::Misconfigured(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!("{self}");
        }

        let body = match &self {
            AppError::Commerce(CommerceError::Unsupported(feature)) => {
                json!({ "error": self.to_string(), "feature": feature })
            }
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use commerce::{ApiError, Feature};

    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::from(CommerceError::Unsupported(Feature::Cart)).status(),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            AppError::from(CommerceError::CartNotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(CommerceError::Api(ApiError {
                status: 422,
                message: "Email taken".to_string(),
                errors: None,
            }))
            .status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::Upstream {
                status: 42,
                message: "odd".to_string()
            }
            .status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
