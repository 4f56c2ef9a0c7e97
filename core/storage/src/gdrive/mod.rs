//! Google Drive backend.
//!
//! - OAuth2 login, refresh and service-account token minting
//! - Drive v3 client covering the calls the proxy needs

pub mod auth;
pub mod client;

use std::sync::Arc;

pub use auth::{GoogleAuth, DRIVE_SCOPE};
pub use client::DriveClient;

use crate::credential::{Credential, DriveFactory};
use crate::provider::RemoteDrive;

/// Factory building a `DriveClient` per credential over one shared pool.
pub fn drive_factory() -> drivegate_common::Result<DriveFactory> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("drivegate/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            drivegate_common::Error::Config(format!("Failed to create HTTP client: {}", e))
        })?;

    Ok(Box::new(move |credential: &Credential| {
        Ok(Arc::new(DriveClient::with_http(http.clone(), &credential.access_token))
            as Arc<dyn RemoteDrive>)
    }))
}
