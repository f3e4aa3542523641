//! Credential injection.
//!
//! Requests never carry ambient credentials. Each operation asks the client
//! for an [`AuthorizedAgent`] via `with_auth()` exactly once, and builds every
//! request of that operation from it.

use std::sync::Arc;

use crate::error::RemoteError;

/// Source of bearer tokens. Refresh flows live behind this trait.
pub trait TokenProvider: Send + Sync {
    fn access_token(&self) -> Result<String, RemoteError>;
}

/// A fixed token, e.g. from `CANVAS_ACCESS_TOKEN`.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(..)")
    }
}

impl TokenProvider for StaticToken {
    fn access_token(&self) -> Result<String, RemoteError> {
        if self.0.is_empty() {
            return Err(RemoteError::Unauthorized("no access token configured".to_string()));
        }
        Ok(self.0.clone())
    }
}

/// An HTTP agent bound to the credentials of one operation.
pub struct AuthorizedAgent<'a> {
    agent: &'a ureq::Agent,
    authorization: String,
}

impl<'a> AuthorizedAgent<'a> {
    pub(crate) fn new(agent: &'a ureq::Agent, tokens: &Arc<dyn TokenProvider>) -> Result<Self, RemoteError> {
        let token = tokens.access_token()?;
        Ok(Self {
            agent,
            authorization: format!("Bearer {}", token),
        })
    }

    /// Start a request carrying the operation's `Authorization` header.
    pub fn request(&self, method: &str, url: &str) -> ureq::Request {
        self.agent
            .request(method, url)
            .set("Authorization", &self.authorization)
    }

    pub fn authorization(&self) -> &str {
        &self.authorization
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorized_agent_formats_bearer() {
        let agent = ureq::Agent::new();
        let tokens: Arc<dyn TokenProvider> = Arc::new(StaticToken::new("tok-123"));
        let authed = AuthorizedAgent::new(&agent, &tokens).unwrap();
        assert_eq!(authed.authorization(), "Bearer tok-123");
    }

    #[test]
    fn test_empty_static_token_is_unauthorized() {
        let agent = ureq::Agent::new();
        let tokens: Arc<dyn TokenProvider> = Arc::new(StaticToken::new(""));
        assert!(matches!(
            AuthorizedAgent::new(&agent, &tokens),
            Err(RemoteError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_static_token_debug_hides_secret() {
        assert_eq!(format!("{:?}", StaticToken::new("secret")), "StaticToken(..)");
    }
}
