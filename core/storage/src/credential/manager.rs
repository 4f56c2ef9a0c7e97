//! Lazily established, self-refreshing storage client.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::issuer::TokenIssuer;
use super::source::{AuthSettings, CredentialSource, ServiceAccountKey};
use super::store::{Credential, CredentialStore};
use crate::provider::RemoteDrive;
use drivegate_common::{AuthError, Error, Result};

/// Builds an authorized drive client from a credential.
pub type DriveFactory = Box<dyn Fn(&Credential) -> Result<Arc<dyn RemoteDrive>> + Send + Sync>;

/// The client handle together with what it was built from.
struct CachedClient {
    source: CredentialSource,
    credential: Credential,
    drive: Arc<dyn RemoteDrive>,
}

/// Owns the storage credential and the client built from it.
///
/// The first call selects a credential source and builds a client; later
/// calls reuse it until the credential expires. Renewal runs under the
/// write lock, so concurrent callers wait for one refresh instead of
/// racing their own.
pub struct CredentialManager {
    settings: AuthSettings,
    store: CredentialStore,
    issuer: Arc<dyn TokenIssuer>,
    factory: DriveFactory,
    cached: RwLock<Option<CachedClient>>,
}

impl CredentialManager {
    /// Create a manager. No I/O happens until the first client request.
    pub fn new(settings: AuthSettings, issuer: Arc<dyn TokenIssuer>, factory: DriveFactory) -> Self {
        let store = CredentialStore::new(settings.credential_path.clone());
        Self {
            settings,
            store,
            issuer,
            factory,
            cached: RwLock::new(None),
        }
    }

    /// The settings this manager selects from.
    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// The interactive credential store.
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Get an authorized client, establishing or renewing it as needed.
    ///
    /// # Postconditions
    /// - The returned client holds a non-expired credential
    /// - A refreshed interactive credential has been persisted
    ///
    /// # Errors
    /// - `AuthError::NotConfigured` if no source is available
    /// - `AuthError::ReauthenticationRequired` if the stored token expired
    ///   and cannot be refreshed
    /// - Refresh or minting failures
    pub async fn authorized_client(&self) -> Result<Arc<dyn RemoteDrive>> {
        {
            let cached = self.cached.read().await;
            if let Some(client) = cached.as_ref() {
                if !client.credential.is_expired() {
                    return Ok(client.drive.clone());
                }
            }
        }

        let mut cached = self.cached.write().await;

        // Another caller may have renewed while we waited for the lock
        if let Some(client) = cached.as_ref() {
            if !client.credential.is_expired() {
                return Ok(client.drive.clone());
            }
        }

        let next = match cached.as_ref() {
            Some(client) => self.renew(client).await?,
            None => self.establish().await?,
        };

        let drive = next.drive.clone();
        *cached = Some(next);
        Ok(drive)
    }

    /// Drop the cached client so the next request selects a source again.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    /// Persist a credential from an interactive login and invalidate the
    /// cached client.
    pub async fn store_interactive(&self, credential: &Credential) -> Result<()> {
        self.store.save(credential).await?;
        self.invalidate().await;
        info!("Stored interactive credential, storage client will be rebuilt");
        Ok(())
    }

    /// Email of the configured service account.
    ///
    /// # Errors
    /// - No key file configured
    /// - Key file unreadable
    pub async fn service_account_email(&self) -> Result<String> {
        let path = self
            .settings
            .service_account_key
            .as_ref()
            .ok_or_else(|| Error::Config("No service account key configured".to_string()))?;

        Ok(ServiceAccountKey::load(path).await?.client_email)
    }

    async fn establish(&self) -> Result<CachedClient> {
        let stored_exists = self.store.exists().await;
        let source = CredentialSource::select(&self.settings, stored_exists)?;
        info!("Using {} storage credentials", source.kind());

        let credential = if source.is_persisted() {
            let stored = self
                .store
                .load()
                .await?
                .ok_or(Error::Auth(AuthError::NotConfigured))?;

            if stored.is_expired() {
                self.refresh_interactive(&stored).await?
            } else {
                stored
            }
        } else {
            self.mint(&source).await?
        };

        self.build(source, credential)
    }

    async fn renew(&self, client: &CachedClient) -> Result<CachedClient> {
        let credential = if client.source.is_persisted() {
            self.refresh_interactive(&client.credential).await?
        } else {
            self.mint(&client.source).await?
        };

        self.build(client.source.clone(), credential)
    }

    /// Refresh an expired interactive credential and persist the result.
    async fn refresh_interactive(&self, expired: &Credential) -> Result<Credential> {
        let refresh_token = match expired.refresh_token.as_deref() {
            Some(token) => token,
            None => {
                warn!("Stored access token expired and has no refresh token");
                return Err(AuthError::ReauthenticationRequired.into());
            }
        };

        info!("Refreshing expired access token");
        let mut fresh = self.issuer.refresh(refresh_token).await?;
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = Some(refresh_token.to_string());
        }

        self.store.save(&fresh).await?;
        Ok(fresh)
    }

    async fn mint(&self, source: &CredentialSource) -> Result<Credential> {
        let (key_file, subject) = match source {
            CredentialSource::Delegated { subject, key_file } => (key_file, Some(subject.as_str())),
            CredentialSource::Service { key_file } => (key_file, None),
            CredentialSource::Interactive => {
                return Err(Error::Config("Interactive credentials are not minted".to_string()))
            }
        };

        let key = ServiceAccountKey::load(key_file).await?;
        info!("Minting {} token for {}", source.kind(), key.client_email);
        self.issuer.service_token(&key, subject).await
    }

    fn build(&self, source: CredentialSource, credential: Credential) -> Result<CachedClient> {
        let drive = (self.factory)(&credential)?;
        Ok(CachedClient {
            source,
            credential,
            drive,
        })
    }
}
