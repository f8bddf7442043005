use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use std::fmt;

use crate::core::resolver::{ParseSourceHintError, ResolveError, SourceHint};
use crate::models::ErrorResponse;
use crate::providers::ProviderError;
use crate::service::ServiceError;

/// Application error types
#[derive(Debug)]
pub enum AppError {
    /// Invalid request data
    ValidationError(String),
    /// Race or date not known to the selected source
    NotFound(String),
    /// Requested data source cannot serve
    Unavailable(String),
    /// Internal server error
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Unavailable(msg) => write!(f, "Unavailable: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error_code, message) = match self {
            AppError::ValidationError(msg) => ("validation_error", msg.clone()),
            AppError::NotFound(msg) => ("not_found", msg.clone()),
            AppError::Unavailable(msg) => ("source_unavailable", msg.clone()),
            AppError::InternalError(msg) => ("internal_error", msg.clone()),
        };

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: error_code.to_string(),
            message,
        })
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        let message = e.to_string();
        match e {
            ServiceError::InvalidRaceId(_) | ServiceError::InvalidDate(_) => {
                AppError::ValidationError(message)
            }
            ServiceError::Resolve(ResolveError::ProviderUnavailable(_))
            | ServiceError::Resolve(ResolveError::NoProviderAvailable) => {
                AppError::Unavailable(message)
            }
            ServiceError::Provider(ProviderError::RaceNotFound(_)) => AppError::NotFound(message),
            ServiceError::Provider(ProviderError::Feed(_)) | ServiceError::Feed(_) => {
                AppError::Unavailable(message)
            }
            ServiceError::Provider(_) | ServiceError::Cache(_) => AppError::InternalError(message),
        }
    }
}

/// Parse an optional `data_source` query value
pub fn validate_source(value: Option<&str>) -> Result<SourceHint, AppError> {
    value
        .unwrap_or("auto")
        .parse()
        .map_err(|e: ParseSourceHintError| AppError::ValidationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resolver::SourceKind;
    use crate::feed::FeedError;
    use crate::models::RaceIdError;

    #[test]
    fn test_error_display() {
        let err = AppError::ValidationError("test error".to_string());
        assert!(err.to_string().contains("Validation error"));
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::ValidationError("".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound("".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Unavailable("".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::InternalError("".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_service_error_mapping() {
        let status = |e: ServiceError| AppError::from(e).status_code();
        assert_eq!(
            status(ServiceError::InvalidRaceId(RaceIdError::InvalidLength(3))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(ServiceError::InvalidDate("2025".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(ServiceError::Resolve(ResolveError::ProviderUnavailable(
                SourceKind::Historical
            ))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(ServiceError::Provider(ProviderError::RaceNotFound(
                "2025110205041101".to_string()
            ))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(ServiceError::Provider(ProviderError::Feed(FeedError::Closed))),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_validate_source() {
        assert_eq!(validate_source(None).unwrap(), SourceHint::Auto);
        assert_eq!(validate_source(Some("mock")).unwrap(), SourceHint::Mock);
        assert!(validate_source(Some("jvlink")).is_err());
    }
}
