//! Data model shared by the proxy and its clients.
//!
//! Field names follow the Drive v3 JSON shape so that provider responses
//! deserialize directly and the proxy can forward them unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// MIME type the provider uses to mark folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Name of the cookie carrying the proxy session id.
pub const SESSION_COOKIE: &str = "drivegate_session";

const UNKNOWN_USER: &str = "Unknown user";

/// An account that owns or last modified an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
}

impl Person {
    /// Display name, else email, else a placeholder.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email_address.as_deref())
            .unwrap_or(UNKNOWN_USER)
    }
}

/// Label of the first owner in `owners`.
pub fn owner_label(owners: &[Person]) -> &str {
    owners.first().map(Person::label).unwrap_or(UNKNOWN_USER)
}

/// A folder in the remote drive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderNode {
    pub id: String,
    /// Folders created without a name come back as an empty string.
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "parents")]
    pub parent_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub owners: Vec<Person>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modifying_user: Option<Person>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,
}

impl FolderNode {
    /// Create a bare folder node with only an id and a name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_ids: Vec::new(),
            created_time: None,
            modified_time: None,
            owners: Vec::new(),
            last_modifying_user: None,
            web_view_link: None,
        }
    }

    /// Label of the owner.
    pub fn owner(&self) -> &str {
        owner_label(&self.owners)
    }

    /// Label of the last modifier, falling back to the owner.
    pub fn last_modifier(&self) -> &str {
        self.last_modifying_user
            .as_ref()
            .map(Person::label)
            .unwrap_or_else(|| self.owner())
    }

    /// Most recent known timestamp.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.modified_time.or(self.created_time)
    }
}

/// A non-folder item in the remote drive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub id: String,
    pub name: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    /// Drive reports sizes as decimal strings; numbers are accepted too.
    #[serde(
        default,
        deserialize_with = "deserialize_size",
        skip_serializing_if = "Option::is_none"
    )]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub owners: Vec<Person>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modifying_user: Option<Person>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,
}

impl FileEntry {
    /// Label of the uploader.
    pub fn owner(&self) -> &str {
        owner_label(&self.owners)
    }

    /// Label of the last modifier, falling back to the owner.
    pub fn last_modifier(&self) -> &str {
        self.last_modifying_user
            .as_ref()
            .map(Person::label)
            .unwrap_or_else(|| self.owner())
    }

    /// Most recent known timestamp.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.modified_time.or(self.created_time)
    }
}

fn default_mime_type() -> String {
    "application/octet-stream".to_string()
}

fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<Size>::deserialize(deserializer)? {
        Some(Size::Number(n)) => Some(n),
        Some(Size::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

/// The authenticated user of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
}

impl SessionUser {
    /// `name (email)` as shown in the user area.
    pub fn display(&self) -> String {
        format!("{} ({})", self.name, self.email)
    }
}

/// A folder together with its direct subfolders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderListing {
    pub current_folder: FolderNode,
    pub folders: Vec<FolderNode>,
    pub root_folder_id: String,
}
