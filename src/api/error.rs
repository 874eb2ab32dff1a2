use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::domain::order::OrderError;

// ============================================================================
// API Errors - OrderError taxonomy mapped onto HTTP
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing or malformed caller identity: {0}")]
    Unauthenticated(String),

    #[error(transparent)]
    Order(#[from] OrderError),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated(_) => "unauthenticated",
            ApiError::Order(e) => e.kind(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Order(OrderError::Validation(message.into()))
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Order(e) => match e {
                OrderError::NotFound { .. } => StatusCode::NOT_FOUND,
                OrderError::Unauthorized(_) => StatusCode::FORBIDDEN,
                OrderError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                OrderError::InvalidTransition { .. } => StatusCode::CONFLICT,
                OrderError::ExternalService { .. } => StatusCode::BAD_GATEWAY,
                OrderError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        HttpResponse::build(status).json(ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderStatus;
    use crate::store::StoreError;

    #[test]
    fn test_status_codes_follow_the_taxonomy() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (ApiError::Unauthenticated("no x-user-id".to_string()), StatusCode::UNAUTHORIZED),
            (OrderError::order_not_found("42").into(), StatusCode::NOT_FOUND),
            (OrderError::Unauthorized("not yours".to_string()).into(), StatusCode::FORBIDDEN),
            (OrderError::Validation("empty cart".to_string()).into(), StatusCode::UNPROCESSABLE_ENTITY),
            (
                OrderError::InvalidTransition {
                    from: OrderStatus::Delivered,
                    to: OrderStatus::Pending,
                }
                .into(),
                StatusCode::CONFLICT,
            ),
            (
                OrderError::ExternalService {
                    service: "payment_gateway",
                    message: "timeout".to_string(),
                }
                .into(),
                StatusCode::BAD_GATEWAY,
            ),
            (
                OrderError::Storage(StoreError::Backend("down".to_string())).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status_code(), expected, "{}", error);
        }
    }
}
