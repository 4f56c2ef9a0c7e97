//! OAuth2 login and token issuing for Google Drive.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};

use crate::credential::{Credential, LoginFlow, OAuthClientConfig, ServiceAccountKey, TokenIssuer};
use drivegate_common::{AuthError, Error, Result, SessionUser};

/// OAuth2 authorization endpoint.
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// OAuth2 token endpoint.
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Profile of the signed-in account.
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Full Drive access.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Scopes requested by the interactive login.
const LOGIN_SCOPES: &[&str] = &[
    DRIVE_SCOPE,
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
    "openid",
];

/// Grant type of a signed service-account assertion.
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Lifetime of a service-account assertion.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// OAuth client with auth and token endpoints set.
type ConfiguredClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

#[derive(Debug)]
struct TransportError(String);

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for TransportError {}

/// Runs oauth2 token requests over the shared reqwest client.
struct OAuthHttp<'a>(&'a reqwest::Client);

impl<'c> oauth2::AsyncHttpClient<'c> for OAuthHttp<'_> {
    type Error = oauth2::HttpClientError<TransportError>;
    type Future = std::pin::Pin<
        Box<
            dyn std::future::Future<Output = std::result::Result<oauth2::HttpResponse, Self::Error>>
                + Send
                + Sync
                + 'c,
        >,
    >;

    fn call(&'c self, request: oauth2::HttpRequest) -> Self::Future {
        let client = self.0.clone();
        Box::pin(async move {
            let method = reqwest::Method::from_bytes(request.method().as_str().as_bytes())
                .unwrap_or(reqwest::Method::POST);
            let url = request.uri().to_string();

            let mut builder = client.request(method, &url);
            for (name, value) in request.headers() {
                builder = builder.header(name.as_str(), value.as_bytes());
            }

            let response = builder
                .body(request.into_body())
                .send()
                .await
                .map_err(|e| oauth2::HttpClientError::Other(e.to_string()))?;

            let status = http::StatusCode::from_u16(response.status().as_u16())
                .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| oauth2::HttpClientError::Other(e.to_string()))?;

            let mut http_response = http::Response::builder().status(status);
            for (name, value) in headers.iter() {
                http_response = http_response.header(name.as_str(), value.as_bytes());
            }
            http_response
                .body(body.to_vec())
                .map_err(|e| oauth2::HttpClientError::Other(e.to_string()))
        })
    }
}

/// Claims of a service-account assertion.
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<&'a str>,
}

#[derive(Deserialize)]
struct AssertionResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Deserialize)]
struct UserInfo {
    email: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

impl From<UserInfo> for SessionUser {
    fn from(info: UserInfo) -> Self {
        let name = info
            .name
            .filter(|n| !n.trim().is_empty())
            .or(info.given_name.filter(|n| !n.trim().is_empty()))
            .unwrap_or_else(|| info.email.clone());

        SessionUser {
            email: info.email,
            name,
            picture: info.picture,
        }
    }
}

/// Google identity endpoints: interactive login, refresh and
/// service-account minting.
pub struct GoogleAuth {
    oauth: Option<ConfiguredClient>,
    http: reqwest::Client,
}

impl GoogleAuth {
    /// Create the issuer. Interactive login is available only when `config`
    /// is given.
    ///
    /// # Errors
    /// - Malformed redirect URL
    pub fn new(config: Option<&OAuthClientConfig>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("drivegate/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        let oauth = config.map(Self::client).transpose()?;
        Ok(Self { oauth, http })
    }

    fn client(config: &OAuthClientConfig) -> Result<ConfiguredClient> {
        Ok(BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(GOOGLE_AUTH_URL.to_string())
                    .map_err(|e| Error::Config(format!("Invalid auth URL: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new(GOOGLE_TOKEN_URL.to_string())
                    .map_err(|e| Error::Config(format!("Invalid token URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_url.clone())
                    .map_err(|e| Error::Config(format!("Invalid redirect URL: {}", e)))?,
            ))
    }

    fn oauth(&self) -> Result<&ConfiguredClient> {
        self.oauth
            .as_ref()
            .ok_or(Error::Auth(AuthError::NotConfigured))
    }

    fn credential_from<T: TokenResponse>(token: &T) -> Credential {
        let scope = token.scopes().map(|scopes| {
            scopes
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        });

        Credential::from_token(
            token.access_token().secret().clone(),
            token.refresh_token().map(|t| t.secret().clone()),
            token.expires_in(),
            scope,
        )
    }

    fn sign_assertion(key: &ServiceAccountKey, subject: Option<&str>) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &key.client_email,
            scope: DRIVE_SCOPE,
            aud: &key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
            sub: subject,
        };

        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| Error::Config(format!("Invalid service account private key: {}", e)))?;

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
            .map_err(|e| Error::Config(format!("Failed to sign assertion: {}", e)))
    }
}

#[async_trait]
impl TokenIssuer for GoogleAuth {
    async fn refresh(&self, refresh_token: &str) -> Result<Credential> {
        let token = self
            .oauth()?
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&OAuthHttp(&self.http))
            .await
            .map_err(|e| AuthError::Rejected(format!("Token refresh failed: {}", e)))?;

        Ok(Self::credential_from(&token))
    }

    async fn service_token(
        &self,
        key: &ServiceAccountKey,
        subject: Option<&str>,
    ) -> Result<Credential> {
        let assertion = Self::sign_assertion(key, subject)?;

        let response = self
            .http
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected(format!(
                "Service account token rejected ({}): {}",
                status, body
            ))
            .into());
        }

        let token: AssertionResponse = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("Failed to parse token response: {}", e)))?;

        Ok(Credential::from_token(
            token.access_token,
            None,
            token.expires_in.map(std::time::Duration::from_secs),
            token.scope,
        ))
    }
}

#[async_trait]
impl LoginFlow for GoogleAuth {
    fn authorization_url(&self) -> Result<(String, String)> {
        let mut request = self.oauth()?.authorize_url(CsrfToken::new_random);
        for scope in LOGIN_SCOPES {
            request = request.add_scope(Scope::new(scope.to_string()));
        }

        let (url, state) = request
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .add_extra_param("include_granted_scopes", "true")
            .url();

        Ok((url.to_string(), state.secret().clone()))
    }

    async fn exchange_code(&self, code: &str) -> Result<Credential> {
        let token = self
            .oauth()?
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&OAuthHttp(&self.http))
            .await
            .map_err(|e| AuthError::Rejected(format!("Token exchange failed: {}", e)))?;

        tracing::info!("Authorization code exchanged");
        Ok(Self::credential_from(&token))
    }

    async fn fetch_user(&self, credential: &Credential) -> Result<SessionUser> {
        let response = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&credential.access_token)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to fetch user info: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthError::Rejected(format!(
                "User info request failed: {}",
                response.status()
            ))
            .into());
        }

        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("Failed to parse user info: {}", e)))?;

        Ok(info.into())
    }
}
