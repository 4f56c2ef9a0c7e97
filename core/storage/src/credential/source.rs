//! Credential source selection.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use drivegate_common::{AuthError, Error, Result};

/// Default token endpoint for service-account assertions.
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// OAuth 2.0 web client registration.
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

/// Everything the credential manager needs to pick a source.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Interactive login client, if configured.
    pub oauth: Option<OAuthClientConfig>,
    /// Account the service account acts on behalf of.
    pub delegated_user: Option<String>,
    /// Service-account key file.
    pub service_account_key: Option<PathBuf>,
    /// Where the interactive credential is stored.
    pub credential_path: PathBuf,
}

impl AuthSettings {
    /// Settings with only a credential path and no sources configured.
    pub fn new(credential_path: impl Into<PathBuf>) -> Self {
        Self {
            oauth: None,
            delegated_user: None,
            service_account_key: None,
            credential_path: credential_path.into(),
        }
    }
}

/// Where the storage credential comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Stored token from an interactive OAuth login.
    Interactive,
    /// Service account impersonating `subject`.
    Delegated { subject: String, key_file: PathBuf },
    /// Service account acting as itself.
    Service { key_file: PathBuf },
}

impl CredentialSource {
    /// Pick the first satisfied source.
    ///
    /// Priority: interactive (client configured and a stored credential
    /// exists), then delegated, then bare service account.
    ///
    /// # Errors
    /// - `AuthError::NotConfigured` when no source is satisfied
    pub fn select(settings: &AuthSettings, stored_exists: bool) -> Result<Self> {
        if settings.oauth.is_some() && stored_exists {
            return Ok(CredentialSource::Interactive);
        }

        match (&settings.delegated_user, &settings.service_account_key) {
            (Some(subject), Some(key_file)) if !subject.trim().is_empty() => {
                Ok(CredentialSource::Delegated {
                    subject: subject.trim().to_string(),
                    key_file: key_file.clone(),
                })
            }
            (_, Some(key_file)) => {
                tracing::warn!(
                    "Using a service account without delegation; it has no storage quota of its own, uploads need a folder shared with it"
                );
                Ok(CredentialSource::Service {
                    key_file: key_file.clone(),
                })
            }
            _ => Err(AuthError::NotConfigured.into()),
        }
    }

    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            CredentialSource::Interactive => "interactive",
            CredentialSource::Delegated { .. } => "delegated",
            CredentialSource::Service { .. } => "service",
        }
    }

    /// Whether the credential of this source is persisted.
    pub fn is_persisted(&self) -> bool {
        matches!(self, CredentialSource::Interactive)
    }
}

/// The fields of a service-account key file that are used.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    /// Read and parse a key file.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Config(format!(
                "Cannot read service account key {}: {}",
                path.display(),
                e
            ))
        })?;

        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid service account key: {}", e)))
    }
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oauth() -> OAuthClientConfig {
        OAuthClientConfig {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            redirect_url: "http://localhost:3000/oauth2callback".to_string(),
        }
    }

    fn full_settings() -> AuthSettings {
        AuthSettings {
            oauth: Some(oauth()),
            delegated_user: Some("owner@example.com".to_string()),
            service_account_key: Some(PathBuf::from("key.json")),
            credential_path: PathBuf::from("token.json"),
        }
    }

    #[test]
    fn test_interactive_wins_when_stored() {
        let source = CredentialSource::select(&full_settings(), true).unwrap();
        assert_eq!(source, CredentialSource::Interactive);
        assert!(source.is_persisted());
    }

    #[test]
    fn test_delegated_beats_service() {
        let source = CredentialSource::select(&full_settings(), false).unwrap();
        assert_eq!(
            source,
            CredentialSource::Delegated {
                subject: "owner@example.com".to_string(),
                key_file: PathBuf::from("key.json"),
            }
        );
    }

    #[test]
    fn test_service_without_subject() {
        let mut settings = full_settings();
        settings.delegated_user = Some("  ".to_string());

        let source = CredentialSource::select(&settings, false).unwrap();
        assert_eq!(source.kind(), "service");
    }

    #[test]
    fn test_stored_token_needs_oauth_client() {
        let mut settings = AuthSettings::new("token.json");
        settings.service_account_key = Some(PathBuf::from("key.json"));

        let source = CredentialSource::select(&settings, true).unwrap();
        assert_eq!(source.kind(), "service");
    }

    #[test]
    fn test_nothing_configured() {
        let mut settings = AuthSettings::new("token.json");
        settings.oauth = Some(oauth());

        let err = CredentialSource::select(&settings, false).unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_service_account_key_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("key.json");
        tokio::fs::write(
            &path,
            br#"{"type": "service_account", "client_email": "svc@proj.iam.gserviceaccount.com", "private_key": "pem"}"#,
        )
        .await
        .unwrap();

        let key = ServiceAccountKey::load(&path).await.unwrap();
        assert_eq!(key.client_email, "svc@proj.iam.gserviceaccount.com");
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);

        let missing = ServiceAccountKey::load(&dir.path().join("nope.json")).await;
        assert!(matches!(missing, Err(Error::Config(_))));
    }
}
