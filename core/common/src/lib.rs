//! Common utilities and types shared across drivegate crates.
//!
//! This module provides the error taxonomy and the data model that travels
//! between the storage backend, the HTTP proxy and the client engine.

pub mod error;
pub mod types;

pub use error::{AuthError, Error, Result};
pub use types::{
    owner_label, FileEntry, FolderListing, FolderNode, Person, SessionUser, FOLDER_MIME_TYPE,
    SESSION_COOKIE,
};
