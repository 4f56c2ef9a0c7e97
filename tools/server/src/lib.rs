//! drivegate HTTP proxy.
//!
//! Serves one Google Drive folder tree behind cookie sessions. Sign-in goes
//! through Google; every drive call reaches the provider through the
//! credential manager, which keeps a single authorized client alive.

pub mod config;
pub mod error;
pub mod routes;
pub mod session;

use std::sync::Arc;

use drivegate_common::{Error, Result};
use drivegate_storage::{CredentialManager, LoginFlow, RemoteDrive};

pub use config::{AllowList, Config};
pub use error::{ApiError, ApiResult};
pub use routes::router;
pub use session::SessionStore;

/// Shared state of all handlers.
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialManager>,
    pub login: Arc<dyn LoginFlow>,
    pub sessions: Arc<SessionStore>,
    pub root_folder_id: Option<String>,
    pub allowed_users: Arc<AllowList>,
}

impl AppState {
    pub fn new(
        credentials: Arc<CredentialManager>,
        login: Arc<dyn LoginFlow>,
        root_folder_id: Option<String>,
        allowed_users: AllowList,
    ) -> Self {
        Self {
            credentials,
            login,
            sessions: Arc::new(SessionStore::new()),
            root_folder_id,
            allowed_users: Arc::new(allowed_users),
        }
    }

    /// Authorized drive client.
    pub async fn drive(&self) -> Result<Arc<dyn RemoteDrive>> {
        self.credentials.authorized_client().await
    }

    /// `requested`, else the configured root.
    ///
    /// # Errors
    /// - `Error::Config` when neither is available
    pub fn folder_or_root(&self, requested: Option<&str>) -> Result<String> {
        requested
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| self.root_folder_id.clone())
            .ok_or_else(|| Error::Config("GOOGLE_DRIVE_FOLDER_ID is not configured".to_string()))
    }

    /// The configured root.
    pub fn root(&self) -> Result<String> {
        self.folder_or_root(None)
    }
}
