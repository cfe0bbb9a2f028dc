//! Caller identity supplied by the upstream auth gateway.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use grc_common::{OrganizationId, UserId};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ORGANIZATION_ID_HEADER: &str = "x-organization-id";

/// Authenticated user acting within one organization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: UserId,
    pub organization_id: OrganizationId,
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self {
            user_id: UserId(uuid_header(&parts.headers, USER_ID_HEADER)?),
            organization_id: OrganizationId(uuid_header(&parts.headers, ORGANIZATION_ID_HEADER)?),
        })
    }
}

fn uuid_header(headers: &HeaderMap, name: &str) -> Result<Uuid, ApiError> {
    let raw = headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized(format!("missing {} header", name)))?;
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::unauthorized(format!("invalid {} header", name)))
}

/// Check `Authorization: Bearer <secret>` for internal endpoints.
///
/// An unset secret closes the endpoint entirely.
pub fn require_bearer(headers: &HeaderMap, secret: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = secret.filter(|s| !s.is_empty()) else {
        return Err(ApiError::unauthorized("endpoint is not configured"));
    };

    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("expected Bearer token"))?;

    if !bool::from(token.trim().as_bytes().ct_eq(expected.as_bytes())) {
        return Err(ApiError::unauthorized("invalid bearer token"));
    }
    Ok(())
}
