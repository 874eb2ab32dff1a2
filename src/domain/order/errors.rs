use super::value_objects::OrderStatus;
use crate::store::StoreError;

// ============================================================================
// Order Engine Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("External service {service} failed: {message}")]
    ExternalService { service: &'static str, message: String },

    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl OrderError {
    pub fn order_not_found(id: impl ToString) -> Self {
        OrderError::NotFound { entity: "order", id: id.to_string() }
    }

    /// Short machine-readable kind used in API error bodies and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            OrderError::NotFound { .. } => "not_found",
            OrderError::Unauthorized(_) => "unauthorized",
            OrderError::Validation(_) => "validation_error",
            OrderError::InvalidTransition { .. } => "invalid_transition",
            OrderError::ExternalService { .. } => "external_service_error",
            OrderError::Storage(_) => "storage_error",
        }
    }
}
