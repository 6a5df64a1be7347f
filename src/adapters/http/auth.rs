//! Caller identity from the headers set by the platform's auth layer.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use super::errors::ApiError;
use crate::domain::models::{Identity, Role};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const USER_ACTIVE_HEADER: &str = "x-user-active";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Resolve the caller. Missing identity is 401; an unknown role or an
/// inactive account is 403.
pub fn identity_from_headers(headers: &HeaderMap) -> Result<Identity, ApiError> {
    let not_authenticated = || ApiError::Unauthorized("Authentication credentials were not provided.".to_string());
    let user_id = header(headers, USER_ID_HEADER).ok_or_else(not_authenticated)?;
    let role = header(headers, USER_ROLE_HEADER).ok_or_else(not_authenticated)?;

    let active = header(headers, USER_ACTIVE_HEADER)
        .map_or(true, |v| !matches!(v.to_ascii_lowercase().as_str(), "false" | "0" | "no"));
    if !active {
        return Err(ApiError::Forbidden("User account is disabled.".to_string()));
    }

    let role = Role::from_str(role)
        .ok_or_else(|| ApiError::Forbidden(format!("Unknown role '{role}'.")))?;
    Ok(Identity::new(user_id, role))
}

/// Any authenticated, active user.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity_from_headers(&parts.headers).map(Self)
    }
}

/// A user allowed to change schedules (admin, supervisor, analyst).
#[derive(Debug, Clone)]
pub struct ScheduleManager(pub Identity);

impl<S: Send + Sync> FromRequestParts<S> for ScheduleManager {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = identity_from_headers(&parts.headers)?;
        if !identity.can_manage_schedules() {
            return Err(ApiError::Forbidden(
                "You do not have permission to perform this action.".to_string(),
            ));
        }
        Ok(Self(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_identity_resolution() {
        let id = identity_from_headers(&headers(&[(USER_ID_HEADER, "u1"), (USER_ROLE_HEADER, "Analyst")])).unwrap();
        assert_eq!(id.role, Role::Analyst);

        assert!(matches!(identity_from_headers(&headers(&[])), Err(ApiError::Unauthorized(_))));
        assert!(matches!(
            identity_from_headers(&headers(&[(USER_ID_HEADER, "u1"), (USER_ROLE_HEADER, "janitor")])),
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            identity_from_headers(&headers(&[
                (USER_ID_HEADER, "u1"),
                (USER_ROLE_HEADER, "admin"),
                (USER_ACTIVE_HEADER, "false"),
            ])),
            Err(ApiError::Forbidden(_))
        ));
    }
}
