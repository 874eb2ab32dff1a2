use actix_web::error::InternalError;
use actix_web::{web, ResponseError};
use std::sync::Arc;

use crate::clock::Clock;
use crate::domain::checkout::CheckoutService;
use crate::domain::order::{OrderSweeper, TransitionEngine};

mod auth;
mod error;
mod routes;

pub use auth::{
    gateway_from_headers, principal_from_headers, GatewayCaller, GATEWAY_SECRET_HEADER, USER_ID_HEADER,
    USER_ROLE_HEADER,
};
pub use error::ApiError;
pub use routes::{BulkStatusBody, StatusUpdateBody};

// ============================================================================
// HTTP API - actix-web surface over the fulfillment engine
// ============================================================================

/// Shared handler state
pub struct AppState {
    pub engine: Arc<TransitionEngine>,
    pub checkout: Arc<CheckoutService>,
    pub sweeper: Arc<OrderSweeper>,
    pub clock: Arc<dyn Clock>,
    /// Expected value of the gateway secret header on payment callbacks
    pub gateway_secret: Option<String>,
}

/// Register the API routes and JSON/query error handling.
/// The caller provides `web::Data<AppState>`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| malformed(err)))
        .app_data(web::QueryConfig::default().error_handler(|err, _req| malformed(err)))
        .configure(routes::configure);
}

/// Unparseable bodies and queries are validation errors
fn malformed<E>(err: E) -> actix_web::Error
where
    E: std::fmt::Debug + std::fmt::Display + 'static,
{
    let response = ApiError::validation(err.to_string()).error_response();
    InternalError::from_response(err, response).into()
}
