//! Authentication middleware for the synchronous API surface

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;

use super::{Credentials, IdentityResolver};

/// Shared state for auth middleware
#[derive(Clone)]
pub struct AuthState {
    pub resolver: Arc<IdentityResolver>,
}

/// Display name claim of the authenticated caller, for message attribution.
#[derive(Debug, Clone)]
pub struct DisplayName(pub String);

/// Require authentication. Inserts the resolved [`super::Identity`] and
/// [`DisplayName`] as request extensions; authorization (role/tenant
/// checks) happens per handler.
pub async fn require_auth(
    State(auth): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let creds = Credentials::from_headers(req.headers(), None);
    let (identity, name) = auth.resolver.resolve_named(&creds)?;

    let name = name.unwrap_or_else(|| identity.kind().as_str().to_string());
    req.extensions_mut().insert(identity);
    req.extensions_mut().insert(DisplayName(name));
    Ok(next.run(req).await)
}
