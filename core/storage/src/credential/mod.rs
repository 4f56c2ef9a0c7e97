//! Storage credential lifecycle.
//!
//! - `store`: the durable interactive credential
//! - `source`: which credential the process uses
//! - `issuer`: seams to the identity provider
//! - `manager`: the cached, self-refreshing client handle

pub mod issuer;
pub mod manager;
pub mod source;
pub mod store;

pub use issuer::{LoginFlow, TokenIssuer};
pub use manager::{CredentialManager, DriveFactory};
pub use source::{AuthSettings, CredentialSource, OAuthClientConfig, ServiceAccountKey};
pub use store::{Credential, CredentialStore};
