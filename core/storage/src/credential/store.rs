//! Durable credential record.
//!
//! The on-disk shape matches the `token.json` written by Google's client
//! libraries, so an existing token file can be reused as-is.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, ZeroizeOnDrop};

use drivegate_common::Result;

/// Seconds before the recorded expiry at which a token counts as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// An access token with its optional refresh token.
#[derive(Clone, PartialEq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry instant, stored as epoch milliseconds.
    #[serde(
        default,
        rename = "expiry_date",
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    #[zeroize(skip)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Credential {
    /// Build a credential from a token endpoint response.
    pub fn from_token(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in: Option<std::time::Duration>,
        scope: Option<String>,
    ) -> Self {
        let expiry = expires_in
            .and_then(|d| Duration::from_std(d).ok())
            .map(|d| Utc::now() + d);

        Self {
            access_token: access_token.into(),
            refresh_token,
            expiry,
            token_type: default_token_type(),
            scope,
        }
    }

    /// Whether the access token is expired or about to expire.
    ///
    /// A credential without a recorded expiry never expires.
    pub fn is_expired(&self) -> bool {
        self.expiry
            .map(|at| at <= Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expiry", &self.expiry)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// File-backed storage for the interactive credential.
///
/// Every save replaces the file in full.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Create a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the credential file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a credential file is present.
    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Load the stored credential, if any.
    ///
    /// # Errors
    /// - File unreadable
    /// - File content is not a credential
    pub async fn load(&self) -> Result<Option<Credential>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let credential: Credential = serde_json::from_str(&content)?;
        Ok(Some(credential))
    }

    /// Persist `credential`, overwriting any previous record.
    ///
    /// # Postconditions
    /// - The file holds exactly `credential`
    pub async fn save(&self, credential: &Credential) -> Result<()> {
        let json = serde_json::to_string_pretty(credential)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json.as_bytes()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!("Credential saved to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn credential(expiry: Option<DateTime<Utc>>) -> Credential {
        Credential {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expiry,
            token_type: "Bearer".to_string(),
            scope: None,
        }
    }

    #[test]
    fn test_expiration() {
        assert!(credential(Some(Utc::now() - Duration::hours(1))).is_expired());
        assert!(!credential(Some(Utc::now() + Duration::hours(1))).is_expired());
        // Inside the skew window
        assert!(credential(Some(Utc::now() + Duration::seconds(30))).is_expired());
        assert!(!credential(None).is_expired());
    }

    #[test]
    fn test_token_json_shape() {
        let json = r#"{
            "access_token": "ya29.a0",
            "refresh_token": "1//0g",
            "scope": "https://www.googleapis.com/auth/drive",
            "token_type": "Bearer",
            "expiry_date": 1700000000000
        }"#;

        let credential: Credential = serde_json::from_str(json).unwrap();
        assert_eq!(credential.access_token, "ya29.a0");
        assert_eq!(credential.expiry.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(credential.refresh_token.as_deref(), Some("1//0g"));

        let value = serde_json::to_value(&credential).unwrap();
        assert_eq!(value["expiry_date"], 1_700_000_000_000i64);
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let output = format!("{:?}", credential(None));
        assert!(!output.contains("access\""));
        assert!(output.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("token.json"));

        assert!(!store.exists().await);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("nested").join("token.json"));

        store.save(&credential(None)).await.unwrap();
        let mut next = credential(Some(Utc::now()));
        next.access_token = "second".to_string();
        next.refresh_token = None;
        store.save(&next).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "second");
        assert!(loaded.refresh_token.is_none());
        assert!(store.exists().await);
    }

    #[tokio::test]
    async fn test_load_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let store = CredentialStore::new(path);
        assert!(store.load().await.is_err());
    }
}
