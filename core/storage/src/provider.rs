//! Remote drive trait definition.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

use drivegate_common::{FileEntry, FolderNode, Result};

/// Byte stream type for upload/download operations.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A download in progress.
pub struct DownloadStream {
    /// Authoritative length reported by the provider, if any.
    pub content_length: Option<u64>,
    /// The file content.
    pub stream: ByteStream,
}

impl std::fmt::Debug for DownloadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadStream")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Capabilities the proxy needs from the external storage account.
///
/// Items are addressed by provider id. Implementations are already
/// authorized; credential handling lives in the credential manager.
#[async_trait]
pub trait RemoteDrive: Send + Sync {
    /// Get the provider name (e.g., "gdrive", "memory").
    fn name(&self) -> &str;

    /// Direct subfolders of a folder, in natural name order.
    ///
    /// # Errors
    /// - Folder not found
    /// - Network/authentication errors
    async fn list_children(&self, folder_id: &str) -> Result<Vec<FolderNode>>;

    /// Non-folder items of a folder, in natural name order.
    async fn list_files(&self, folder_id: &str) -> Result<Vec<FileEntry>>;

    /// Metadata of a folder.
    ///
    /// # Errors
    /// - Id not found
    async fn get_metadata(&self, id: &str) -> Result<FolderNode>;

    /// Create a folder under `parent_id`.
    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<FolderNode>;

    /// Rename an item, returning its updated metadata.
    async fn rename(&self, id: &str, new_name: &str) -> Result<FolderNode>;

    /// Delete a file permanently.
    async fn delete_file(&self, id: &str) -> Result<()>;

    /// Upload a new file into `parent_id`.
    ///
    /// # Postconditions
    /// - A new file exists under the parent
    /// - Returns its metadata
    async fn upload_file(
        &self,
        parent_id: &str,
        name: &str,
        mime_type: &str,
        data: ByteStream,
    ) -> Result<FileEntry>;

    /// Stream the content of a file.
    async fn download_file(&self, id: &str) -> Result<DownloadStream>;
}
