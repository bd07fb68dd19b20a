//! Caller identity and ownership guard
//!
//! Authentication itself is an upstream collaborator: by the time a request
//! reaches this service, the gateway has verified the token and attached the
//! caller id as a header. This module consumes that identity and enforces
//! the two access rules the order core needs: customers touch only their own
//! orders, and status advances come only from trusted internal systems.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::common::AppError;
use crate::server::ServerState;

/// Header carrying the upstream-verified caller id
pub const CALLER_ID_HEADER: &str = "x-caller-id";

/// Header carrying the shared token for trusted internal callers
pub const INTERNAL_TOKEN_HEADER: &str = "x-internal-token";

/// Verified caller identity, attached upstream
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub caller_id: String,
}

impl<S: Send + Sync> FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let caller_id = parts
            .headers
            .get(CALLER_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match caller_id {
            Some(id) => Ok(Self {
                caller_id: id.to_string(),
            }),
            None => {
                tracing::warn!(uri = %parts.uri, "request without caller identity");
                Err(AppError::Unauthorized)
            }
        }
    }
}

/// Marker for requests from trusted internal systems (kitchen, delivery).
///
/// End customers never hold the internal token; routes extracting this are
/// unreachable for them.
#[derive(Debug, Clone)]
pub struct InternalCaller;

impl FromRequestParts<ServerState> for InternalCaller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(INTERNAL_TOKEN_HEADER)
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default();

        let expected = state.config.internal_token.as_str();
        if expected.is_empty() || token != expected {
            tracing::warn!(uri = %parts.uri, "internal route called without valid token");
            return Err(AppError::Forbidden);
        }
        Ok(InternalCaller)
    }
}

/// The authorization guard capability: verified caller vs resource owner.
///
/// Must run before any resource data is returned; the error is identical for
/// every denied caller so that probing ids reveals nothing.
pub fn ensure_owner(caller_id: &str, owner_id: &str) -> Result<(), AppError> {
    if caller_id == owner_id {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_passes_everyone_else_is_denied() {
        assert!(ensure_owner("c-1", "c-1").is_ok());
        assert!(matches!(
            ensure_owner("c-2", "c-1").unwrap_err(),
            AppError::Forbidden
        ));
        // Identity comparison is exact, no prefix tricks.
        assert!(ensure_owner("c-1", "c-10").is_err());
        assert!(ensure_owner("", "").is_ok());
    }
}
