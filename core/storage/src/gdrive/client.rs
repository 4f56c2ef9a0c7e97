//! Google Drive API client.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::provider::{ByteStream, DownloadStream, RemoteDrive};
use drivegate_common::{AuthError, Error, FileEntry, FolderNode, Result, FOLDER_MIME_TYPE};

/// Google Drive API base URL.
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Google Drive upload API base URL.
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Uploads up to this size go in a single multipart request.
const SIMPLE_UPLOAD_LIMIT: usize = 5 * 1024 * 1024;
/// Resumable chunk size (must be a multiple of 256KB).
const CHUNK_SIZE: usize = 8 * 256 * 1024;

const FOLDER_FIELDS: &str = "id,name,parents,createdTime,modifiedTime,webViewLink,owners(displayName,emailAddress),lastModifyingUser(displayName,emailAddress)";
const FILE_FIELDS: &str = "id,name,mimeType,size,createdTime,modifiedTime,webViewLink,owners(displayName,emailAddress),lastModifyingUser(displayName,emailAddress)";

/// Response from listing files.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse<T> {
    files: Vec<T>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

/// Escape a value for use inside a quoted Drive query literal.
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Children query, restricted to folders or to everything else.
fn children_query(folder_id: &str, folders: bool) -> String {
    format!(
        "'{}' in parents and trashed = false and mimeType {} '{}'",
        escape_query(folder_id),
        if folders { "=" } else { "!=" },
        FOLDER_MIME_TYPE
    )
}

/// Guidance returned when a quota-less service account tries to write.
fn storage_quota_message(detail: &str) -> String {
    format!(
        "The service account has no storage quota. Share a folder from a personal Drive with the service account email (see /service-account-email) as Editor, or sign in with OAuth. Details: {}",
        detail
    )
}

/// Google Drive API client bound to one access token.
pub struct DriveClient {
    http: Client,
    token: Zeroizing<String>,
}

impl DriveClient {
    /// Create a client with its own HTTP connection pool.
    pub fn new(access_token: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("drivegate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_http(http, access_token))
    }

    /// Create a client sharing an existing HTTP connection pool.
    pub fn with_http(http: Client, access_token: &str) -> Self {
        Self {
            http,
            token: Zeroizing::new(access_token.to_string()),
        }
    }

    async fn list<T: serde::de::DeserializeOwned>(
        &self,
        folder_id: &str,
        folders: bool,
        fields: &str,
    ) -> Result<Vec<T>> {
        let url = format!("{}/files", DRIVE_API_BASE);
        let query = children_query(folder_id, folders);
        let fields = format!("files({}),nextPageToken", fields);

        let mut all = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(&url)
                .bearer_auth(self.token.as_str())
                .query(&[
                    ("q", query.as_str()),
                    ("fields", fields.as_str()),
                    ("orderBy", "name_natural"),
                    ("pageSize", "1000"),
                ]);

            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::Network(format!("Failed to list folder: {}", e)))?;

            let page: FileListResponse<T> = self.handle_response(response).await?;
            all.extend(page.files);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(all)
    }

    /// Upload a small file in one multipart/related request.
    async fn upload_simple(
        &self,
        parent_id: &str,
        name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> Result<FileEntry> {
        let url = format!("{}/files", DRIVE_UPLOAD_BASE);
        let metadata = serde_json::json!({
            "name": name,
            "parents": [parent_id],
            "mimeType": mime_type,
        });
        let metadata_json = serde_json::to_string(&metadata)?;

        let boundary = format!("drivegate-{}", uuid::Uuid::new_v4().simple());
        let mut body = Vec::with_capacity(data.len() + metadata_json.len() + 256);

        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.extend_from_slice(metadata_json.as_bytes());
        body.extend_from_slice(b"\r\n");

        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
        body.extend_from_slice(&data);
        body.extend_from_slice(b"\r\n");

        body.extend_from_slice(format!("--{}--", boundary).as_bytes());

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.token.as_str())
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Transfer(format!("Failed to upload file: {}", e)))?;

        self.handle_response(response).await
    }

    /// Start a resumable upload session of unknown total size.
    async fn start_resumable_upload(
        &self,
        parent_id: &str,
        name: &str,
        mime_type: &str,
    ) -> Result<String> {
        let url = format!("{}/files", DRIVE_UPLOAD_BASE);
        let metadata = serde_json::json!({
            "name": name,
            "parents": [parent_id],
            "mimeType": mime_type,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.token.as_str())
            .header("X-Upload-Content-Type", mime_type)
            .query(&[("uploadType", "resumable"), ("fields", FILE_FIELDS)])
            .json(&metadata)
            .send()
            .await
            .map_err(|e| Error::Transfer(format!("Failed to start resumable upload: {}", e)))?;

        if !response.status().is_success() {
            return Err(self.error_for(response).await);
        }

        let upload_uri = response
            .headers()
            .get(header::LOCATION)
            .ok_or_else(|| Error::Transfer("No upload URI in response".to_string()))?
            .to_str()
            .map_err(|e| Error::Transfer(format!("Invalid upload URI: {}", e)))?
            .to_string();

        Ok(upload_uri)
    }

    /// Send one chunk. `total` is known only for the last chunk.
    async fn upload_chunk(
        &self,
        upload_uri: &str,
        data: Bytes,
        start_byte: u64,
        total: Option<u64>,
    ) -> Result<Option<FileEntry>> {
        let end_byte = start_byte + data.len() as u64 - 1;
        let total = total.map(|t| t.to_string()).unwrap_or_else(|| "*".to_string());
        let content_range = format!("bytes {}-{}/{}", start_byte, end_byte, total);

        let response = self
            .http
            .put(upload_uri)
            .header(header::CONTENT_LENGTH, data.len().to_string())
            .header(header::CONTENT_RANGE, content_range)
            .body(data)
            .send()
            .await
            .map_err(|e| Error::Transfer(format!("Failed to upload chunk: {}", e)))?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(Some(self.handle_response(response).await?)),
            // 308 Resume Incomplete
            StatusCode::PERMANENT_REDIRECT => Ok(None),
            _ => Err(self.error_for(response).await),
        }
    }

    /// Upload a stream of unknown length in resumable chunks.
    async fn upload_resumable(
        &self,
        parent_id: &str,
        name: &str,
        mime_type: &str,
        mut buffer: BytesMut,
        mut data: ByteStream,
    ) -> Result<FileEntry> {
        let upload_uri = self
            .start_resumable_upload(parent_id, name, mime_type)
            .await?;
        let mut uploaded = 0u64;

        loop {
            // Keep at least one byte back so the final chunk carries the total
            while buffer.len() > CHUNK_SIZE {
                let part = buffer.split_to(CHUNK_SIZE).freeze();
                let len = part.len() as u64;
                if let Some(file) = self.upload_chunk(&upload_uri, part, uploaded, None).await? {
                    return Ok(file);
                }
                uploaded += len;
            }

            match data.next().await {
                Some(chunk) => buffer.extend_from_slice(&chunk?),
                None => break,
            }
        }

        let total = uploaded + buffer.len() as u64;
        match self
            .upload_chunk(&upload_uri, buffer.freeze(), uploaded, Some(total))
            .await?
        {
            Some(file) => Ok(file),
            None => Err(Error::Transfer("Upload did not complete".to_string())),
        }
    }

    /// Handle API response with error checking.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| Error::Network(format!("Failed to parse response: {}", e)))
        } else {
            Err(self.error_for(response).await)
        }
    }

    /// Map a failed response to an error, keeping Drive's message.
    async fn error_for(&self, response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.error.message)
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("Drive API error: {}", status));

        tracing::debug!("Drive API returned {}: {}", status, message);

        if message.to_lowercase().contains("storage quota") {
            return Error::Validation(storage_quota_message(&message));
        }

        match status {
            StatusCode::UNAUTHORIZED => AuthError::Rejected(message).into(),
            StatusCode::FORBIDDEN => Error::PermissionDenied(message),
            StatusCode::NOT_FOUND => Error::NotFound(message),
            StatusCode::BAD_REQUEST => Error::Validation(message),
            _ => Error::Network(message),
        }
    }
}

#[async_trait]
impl RemoteDrive for DriveClient {
    fn name(&self) -> &str {
        "gdrive"
    }

    async fn list_children(&self, folder_id: &str) -> Result<Vec<FolderNode>> {
        self.list(folder_id, true, FOLDER_FIELDS).await
    }

    async fn list_files(&self, folder_id: &str) -> Result<Vec<FileEntry>> {
        self.list(folder_id, false, FILE_FIELDS).await
    }

    async fn get_metadata(&self, id: &str) -> Result<FolderNode> {
        let url = format!("{}/files/{}", DRIVE_API_BASE, id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(self.token.as_str())
            .query(&[("fields", FOLDER_FIELDS)])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to get metadata: {}", e)))?;

        self.handle_response(response).await
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<FolderNode> {
        let url = format!("{}/files", DRIVE_API_BASE);
        let metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [parent_id],
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.token.as_str())
            .query(&[("fields", FOLDER_FIELDS)])
            .json(&metadata)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to create folder: {}", e)))?;

        self.handle_response(response).await
    }

    async fn rename(&self, id: &str, new_name: &str) -> Result<FolderNode> {
        let url = format!("{}/files/{}", DRIVE_API_BASE, id);

        let response = self
            .http
            .patch(&url)
            .bearer_auth(self.token.as_str())
            .query(&[("fields", FOLDER_FIELDS)])
            .json(&serde_json::json!({ "name": new_name }))
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to rename: {}", e)))?;

        self.handle_response(response).await
    }

    async fn delete_file(&self, id: &str) -> Result<()> {
        let url = format!("{}/files/{}", DRIVE_API_BASE, id);

        let response = self
            .http
            .delete(&url)
            .bearer_auth(self.token.as_str())
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to delete file: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.error_for(response).await)
        }
    }

    async fn upload_file(
        &self,
        parent_id: &str,
        name: &str,
        mime_type: &str,
        mut data: ByteStream,
    ) -> Result<FileEntry> {
        let mut buffer = BytesMut::new();

        while let Some(chunk) = data.next().await {
            buffer.extend_from_slice(&chunk?);
            if buffer.len() > SIMPLE_UPLOAD_LIMIT {
                tracing::debug!("Large upload of {}, switching to resumable", name);
                return self
                    .upload_resumable(parent_id, name, mime_type, buffer, data)
                    .await;
            }
        }

        self.upload_simple(parent_id, name, mime_type, buffer.freeze())
            .await
    }

    async fn download_file(&self, id: &str) -> Result<DownloadStream> {
        let url = format!("{}/files/{}", DRIVE_API_BASE, id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(self.token.as_str())
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to start download: {}", e)))?;

        if !response.status().is_success() {
            return Err(self.error_for(response).await);
        }

        let content_length = response.content_length();
        let stream = response
            .bytes_stream()
            .map(|result| result.map_err(|e| Error::Transfer(format!("Stream read error: {}", e))));

        Ok(DownloadStream {
            content_length,
            stream: Box::pin(stream),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_query() {
        assert_eq!(escape_query("abc"), "abc");
        assert_eq!(escape_query("it's"), "it\\'s");
        assert_eq!(escape_query("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_children_query() {
        assert_eq!(
            children_query("root1", true),
            "'root1' in parents and trashed = false and mimeType = 'application/vnd.google-apps.folder'"
        );
        assert!(children_query("root1", false).contains("mimeType != "));
    }

    #[test]
    fn test_list_response_parsing() {
        let json = r#"{
            "files": [
                {"id": "1", "name": "Docs", "parents": ["root"]},
                {"id": "2", "name": "Photos"}
            ],
            "nextPageToken": "next"
        }"#;

        let page: FileListResponse<FolderNode> = serde_json::from_str(json).unwrap();
        assert_eq!(page.files.len(), 2);
        assert_eq!(page.files[0].parent_ids, vec!["root".to_string()]);
        assert_eq!(page.next_page_token.as_deref(), Some("next"));
    }

    #[test]
    fn test_error_body_parsing() {
        let body = r#"{"error": {"code": 404, "message": "File not found: abc."}}"#;
        let parsed: ApiErrorBody = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.error.message, "File not found: abc.");
    }

    #[test]
    fn test_storage_quota_message() {
        let message = storage_quota_message("Service Accounts do not have storage quota.");
        assert!(message.contains("/service-account-email"));
        assert!(message.ends_with("Service Accounts do not have storage quota."));
    }

    #[test]
    fn test_chunk_size_alignment() {
        assert_eq!(CHUNK_SIZE % (256 * 1024), 0);
        assert!(SIMPLE_UPLOAD_LIMIT > CHUNK_SIZE);
    }
}
