//! Identity Resolver
//!
//! Pure classification of transport credentials into an [`Identity`].
//! The caller-declared panel flag only selects which verification strategy
//! (and cookie) to use; it never grants identity. A panel flag without a
//! valid session degrades to an authentication failure, not to admin.

use axum::http::HeaderMap;

use super::{AuthError, Claims, Identity, JwtManager};
use fleetdesk_shared::ActorKind;

/// Which web panel a browser caller claims to originate from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Admin,
    Business,
}

impl Panel {
    fn cookie_name(&self) -> &'static str {
        match self {
            Panel::Admin => "fd_admin_session",
            Panel::Business => "fd_business_session",
        }
    }

    fn parse(value: &str) -> Option<Panel> {
        match value {
            "admin" | "adminPanel" => Some(Panel::Admin),
            "business" | "businessPanel" => Some(Panel::Business),
            _ => None,
        }
    }
}

/// Transport-level credentials extracted from a request or WS handshake.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub bearer: Option<String>,
    pub session_cookie: Option<String>,
    pub panel: Option<Panel>,
}

impl Credentials {
    /// Extract credentials from HTTP headers.
    ///
    /// `panel_hint` carries a query-string panel flag (WS handshakes cannot
    /// always set headers); the `x-fleetdesk-panel` header takes precedence.
    pub fn from_headers(headers: &HeaderMap, panel_hint: Option<&str>) -> Self {
        let bearer = headers
            .get("authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string());

        let panel = headers
            .get("x-fleetdesk-panel")
            .and_then(|h| h.to_str().ok())
            .and_then(Panel::parse)
            .or_else(|| panel_hint.and_then(Panel::parse));

        let session_cookie = panel.and_then(|p| {
            headers
                .get("cookie")
                .and_then(|h| h.to_str().ok())
                .and_then(|raw| cookie_value(raw, p.cookie_name()))
        });

        Self {
            bearer,
            session_cookie,
            panel,
        }
    }

    /// Credentials carrying only a bearer token (WS `?token=` handshakes).
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            bearer: Some(token.into()),
            session_cookie: None,
            panel: None,
        }
    }
}

fn cookie_value(raw: &str, name: &str) -> Option<String> {
    raw.split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

/// Resolves credentials to a typed identity. Stateless.
#[derive(Clone)]
pub struct IdentityResolver {
    jwt: JwtManager,
}

impl IdentityResolver {
    pub fn new(jwt: JwtManager) -> Self {
        Self { jwt }
    }

    pub fn resolve(&self, creds: &Credentials) -> Result<Identity, AuthError> {
        self.resolve_named(creds).map(|(identity, _)| identity)
    }

    /// Like [`Self::resolve`] but also yields the display name claim, which
    /// the gateway uses for typing and message attribution.
    pub fn resolve_named(
        &self,
        creds: &Credentials,
    ) -> Result<(Identity, Option<String>), AuthError> {
        if let Some(token) = &creds.bearer {
            let claims = self.jwt.verify_bearer(token)?;
            return Ok((identity_from_claims(&claims), claims.name));
        }

        // Panel flag selects the session strategy; identity still comes
        // from the verified claims.
        if let Some(cookie) = &creds.session_cookie {
            let claims = self.jwt.verify_session(cookie)?;
            return Ok((identity_from_claims(&claims), claims.name));
        }

        Err(AuthError::NoCredential)
    }
}

fn identity_from_claims(claims: &Claims) -> Identity {
    match claims.act {
        ActorKind::Business => Identity::Business(claims.sub),
        ActorKind::Admin => Identity::Admin(claims.sub),
        ActorKind::Courier => Identity::Courier(claims.sub),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;
    use uuid::Uuid;

    fn resolver() -> IdentityResolver {
        IdentityResolver::new(JwtManager::new(
            "test-jwt-secret-at-least-32-characters!!",
            "test-session-secret-at-least-32-chars!!!",
            60,
        ))
    }

    fn jwt() -> JwtManager {
        JwtManager::new(
            "test-jwt-secret-at-least-32-characters!!",
            "test-session-secret-at-least-32-chars!!!",
            60,
        )
    }

    #[test]
    fn test_bearer_resolves_kind_from_claims() {
        let r = resolver();
        let id = Uuid::new_v4();
        let token = jwt()
            .sign_bearer(id, ActorKind::Business, None, Duration::hours(1))
            .unwrap();

        let identity = r.resolve(&Credentials::bearer(token)).unwrap();
        assert_eq!(identity, Identity::Business(id));
    }

    #[test]
    fn test_no_credential() {
        let r = resolver();
        assert_eq!(
            r.resolve(&Credentials::default()),
            Err(AuthError::NoCredential)
        );
    }

    #[test]
    fn test_panel_flag_alone_grants_nothing() {
        // adminPanel without a valid session cookie is anonymous, not admin.
        let r = resolver();
        let creds = Credentials {
            bearer: None,
            session_cookie: None,
            panel: Some(Panel::Admin),
        };
        assert_eq!(r.resolve(&creds), Err(AuthError::NoCredential));
    }

    #[test]
    fn test_panel_flag_does_not_override_claims() {
        // A business session presented with an admin panel flag resolves to
        // whatever the verified claims say.
        let r = resolver();
        let id = Uuid::new_v4();
        let cookie = jwt()
            .sign_session(id, ActorKind::Business, None, Duration::hours(1))
            .unwrap();
        let creds = Credentials {
            bearer: None,
            session_cookie: Some(cookie),
            panel: Some(Panel::Admin),
        };

        assert_eq!(r.resolve(&creds).unwrap(), Identity::Business(id));
    }

    #[test]
    fn test_cookie_extraction_by_panel() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            "other=1; fd_admin_session=tok-a; fd_business_session=tok-b"
                .parse()
                .unwrap(),
        );
        headers.insert("x-fleetdesk-panel", "admin".parse().unwrap());

        let creds = Credentials::from_headers(&headers, None);
        assert_eq!(creds.session_cookie.as_deref(), Some("tok-a"));
        assert_eq!(creds.panel, Some(Panel::Admin));
    }

    #[test]
    fn test_expired_session_cookie() {
        let r = resolver();
        let cookie = jwt()
            .sign_session(Uuid::new_v4(), ActorKind::Admin, None, Duration::hours(-48))
            .unwrap();
        let creds = Credentials {
            bearer: None,
            session_cookie: Some(cookie),
            panel: Some(Panel::Admin),
        };
        assert_eq!(r.resolve(&creds), Err(AuthError::ExpiredToken));
    }
}
