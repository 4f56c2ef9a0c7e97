//! Token issuing and login seams.

use async_trait::async_trait;

use super::source::ServiceAccountKey;
use super::store::Credential;
use drivegate_common::{Result, SessionUser};

/// Obtains fresh access tokens from the identity provider.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Exchange a refresh token for a new credential.
    ///
    /// The returned credential may omit the refresh token.
    ///
    /// # Errors
    /// - Refresh token revoked or invalid
    /// - Network errors
    async fn refresh(&self, refresh_token: &str) -> Result<Credential>;

    /// Mint a token for a service account, optionally impersonating `subject`.
    async fn service_token(
        &self,
        key: &ServiceAccountKey,
        subject: Option<&str>,
    ) -> Result<Credential>;
}

/// Interactive OAuth login handshake.
#[async_trait]
pub trait LoginFlow: Send + Sync {
    /// Consent URL and the CSRF state embedded in it.
    fn authorization_url(&self) -> Result<(String, String)>;

    /// Exchange an authorization code for a credential.
    async fn exchange_code(&self, code: &str) -> Result<Credential>;

    /// Identity of the account behind `credential`.
    async fn fetch_user(&self, credential: &Credential) -> Result<SessionUser>;
}
