//! The proxy API as seen by the client engine.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

use drivegate_common::{FileEntry, FolderListing, FolderNode, Result, SessionUser};

/// Byte stream type for upload/download bodies.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Called with `(bytes_sent, total)` as an upload body is consumed.
pub type UploadProgress = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Message used when the proxy rejects an upload without saying why.
pub const UPLOAD_FAILED: &str = "Error uploading file.";

/// A file to upload.
pub struct UploadBody {
    pub name: String,
    pub mime_type: String,
    /// Total length, when known.
    pub size: Option<u64>,
    pub stream: ByteStream,
}

impl UploadBody {
    /// Upload an in-memory buffer.
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, data: Bytes) -> Self {
        let size = Some(data.len() as u64);
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size,
            stream: Box::pin(futures::stream::once(async move { Ok(data) })),
        }
    }
}

impl std::fmt::Debug for UploadBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadBody")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Result of asking the proxy for a file's content.
pub enum DownloadResponse {
    /// A streamable body.
    Stream {
        /// Value of the `Content-Length` header.
        content_length: Option<u64>,
        stream: ByteStream,
    },
    /// The response cannot be streamed; fetch the URL directly instead.
    Unavailable,
}

/// Operations of the drivegate HTTP API.
///
/// Every method reports an expired or missing session as
/// `Error::Auth(AuthError::Unauthorized)`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// The signed-in user, or `None` when the session is not authenticated.
    async fn current_user(&self) -> Result<Option<SessionUser>>;

    /// End the server session.
    async fn logout(&self) -> Result<()>;

    /// URL that starts the interactive login.
    async fn login_url(&self) -> Result<String>;

    /// A folder and its subfolders; `None` asks for the configured root.
    async fn list_folder(&self, parent_id: Option<&str>) -> Result<FolderListing>;

    /// Non-folder items of a folder.
    async fn list_files(&self, folder_id: &str) -> Result<Vec<FileEntry>>;

    /// Create a folder; `None` creates it under the root.
    async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<FolderNode>;

    /// Rename a folder.
    async fn rename_folder(&self, id: &str, name: &str) -> Result<FolderNode>;

    /// Delete a file.
    async fn delete_file(&self, id: &str) -> Result<()>;

    /// Upload a file into `folder_id`, reporting body progress.
    ///
    /// # Errors
    /// - `Error::Network` when the connection fails
    /// - `Error::Auth` on an expired session
    /// - Any other variant carries the proxy's message
    async fn upload(
        &self,
        folder_id: Option<&str>,
        body: UploadBody,
        progress: UploadProgress,
    ) -> Result<FileEntry>;

    /// Request a file's content.
    async fn download(&self, file_id: &str) -> Result<DownloadResponse>;

    /// Direct URL of a file's content.
    fn download_url(&self, file_id: &str) -> String;
}
