//! Remote drive access for drivegate.
//!
//! This crate provides the capability trait the proxy calls into, its
//! Google Drive and in-memory implementations, and the credential
//! lifecycle that keeps an authorized client available.
//!
//! # Design Principles
//! - Provider isolation: handlers see only `RemoteDrive`
//! - Lazy authorization: nothing touches the network until first use
//! - Streaming support: uploads and downloads are byte streams

pub mod credential;
pub mod gdrive;
pub mod memory;
pub mod provider;

pub use credential::{
    AuthSettings, Credential, CredentialManager, CredentialSource, CredentialStore, DriveFactory,
    LoginFlow, OAuthClientConfig, ServiceAccountKey, TokenIssuer,
};
pub use gdrive::{drive_factory, DriveClient, GoogleAuth};
pub use memory::MemoryDrive;
pub use provider::{ByteStream, DownloadStream, RemoteDrive};
