use actix_web::dev::Payload;
use actix_web::http::header::HeaderMap;
use actix_web::{web, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use uuid::Uuid;

use super::error::ApiError;
use super::AppState;
use crate::domain::order::{OrderError, Principal, Role};

// ============================================================================
// Caller Identity
// ============================================================================
//
// Authentication happens upstream. The gateway in front of this service
// forwards the authenticated identity as headers:
//   x-user-id:   UUID of the caller (required)
//   x-user-role: customer | staff | admin (defaults to customer)
//
// Payment gateway callbacks carry no user identity. They must present the
// configured shared secret in x-gateway-secret instead.
//
// ============================================================================

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const GATEWAY_SECRET_HEADER: &str = "x-gateway-secret";

pub fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, ApiError> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .ok_or_else(|| ApiError::Unauthenticated(format!("missing {} header", USER_ID_HEADER)))?
        .to_str()
        .ok()
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        .ok_or_else(|| ApiError::Unauthenticated(format!("{} is not a UUID", USER_ID_HEADER)))?;

    let role = match headers.get(USER_ROLE_HEADER) {
        None => Role::Customer,
        Some(raw) => raw
            .to_str()
            .map_err(|e| ApiError::Unauthenticated(e.to_string()))?
            .parse::<Role>()
            .map_err(ApiError::Unauthenticated)?,
    };

    Ok(Principal::new(user_id, role))
}

impl FromRequest for Principal {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(principal_from_headers(req.headers()))
    }
}

/// A request authenticated as the payment gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayCaller;

pub fn gateway_from_headers(headers: &HeaderMap, expected: Option<&str>) -> Result<GatewayCaller, ApiError> {
    let expected = expected
        .ok_or_else(|| ApiError::Unauthenticated("payment callbacks are not configured".to_string()))?;
    let presented = headers
        .get(GATEWAY_SECRET_HEADER)
        .ok_or_else(|| ApiError::Unauthenticated(format!("missing {} header", GATEWAY_SECRET_HEADER)))?
        .as_bytes();

    if secrets_match(presented, expected.as_bytes()) {
        Ok(GatewayCaller)
    } else {
        Err(ApiError::Unauthenticated(format!("{} does not match", GATEWAY_SECRET_HEADER)))
    }
}

/// Compares every byte regardless of where the first mismatch is
fn secrets_match(presented: &[u8], expected: &[u8]) -> bool {
    presented.len() == expected.len()
        && presented
            .iter()
            .zip(expected)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}

impl FromRequest for GatewayCaller {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let expected = req
            .app_data::<web::Data<AppState>>()
            .and_then(|state| state.gateway_secret.clone());
        ready(gateway_from_headers(req.headers(), expected.as_deref()))
    }
}

pub fn require_staff(principal: &Principal) -> Result<(), ApiError> {
    if principal.is_staff() {
        Ok(())
    } else {
        Err(OrderError::Unauthorized(format!("{} is not staff", principal.label())).into())
    }
}

pub fn require_admin(principal: &Principal) -> Result<(), ApiError> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(OrderError::Unauthorized(format!("{} is not an admin", principal.label())).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::header::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(HeaderName::from_static(name), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_role_defaults_to_customer() {
        let id = Uuid::new_v4();
        let principal = principal_from_headers(&headers(&[(USER_ID_HEADER, &id.to_string())])).unwrap();
        assert_eq!(principal, Principal::new(id, Role::Customer));
    }

    #[test]
    fn test_missing_or_bad_identity_is_unauthenticated() {
        assert!(matches!(
            principal_from_headers(&headers(&[])),
            Err(ApiError::Unauthenticated(_))
        ));
        assert!(matches!(
            principal_from_headers(&headers(&[(USER_ID_HEADER, "nope")])),
            Err(ApiError::Unauthenticated(_))
        ));
        assert!(matches!(
            principal_from_headers(&headers(&[
                (USER_ID_HEADER, &Uuid::new_v4().to_string()),
                (USER_ROLE_HEADER, "superuser"),
            ])),
            Err(ApiError::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_gateway_secret_must_match() {
        let secret = Some("whsec_test");

        assert!(gateway_from_headers(&headers(&[(GATEWAY_SECRET_HEADER, "whsec_test")]), secret).is_ok());
        assert!(matches!(
            gateway_from_headers(&headers(&[]), secret),
            Err(ApiError::Unauthenticated(_))
        ));
        assert!(matches!(
            gateway_from_headers(&headers(&[(GATEWAY_SECRET_HEADER, "whsec_tesu")]), secret),
            Err(ApiError::Unauthenticated(_))
        ));
        assert!(matches!(
            gateway_from_headers(&headers(&[(GATEWAY_SECRET_HEADER, "whsec_test")]), None),
            Err(ApiError::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_role_gates() {
        let staff = Principal::new(Uuid::new_v4(), Role::Staff);
        assert!(require_staff(&staff).is_ok());
        assert!(require_admin(&staff).is_err());
        assert!(require_admin(&Principal::new(Uuid::new_v4(), Role::Admin)).is_ok());
    }
}
