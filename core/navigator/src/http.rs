//! `Backend` over HTTP against a running drivegate server.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::cookie::Jar;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

use crate::backend::{Backend, DownloadResponse, UploadBody, UploadProgress, UPLOAD_FAILED};
use drivegate_common::{
    AuthError, Error, FileEntry, FolderListing, FolderNode, Result, SessionUser, SESSION_COOKIE,
};

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct UserResponse {
    user: SessionUser,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthUrlResponse {
    auth_url: String,
}

#[derive(Deserialize)]
struct FilesResponse {
    files: Vec<FileEntry>,
}

#[derive(Deserialize)]
struct FolderResponse {
    folder: FolderNode,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: FileEntry,
}

/// Map a failed status and the server's message to an error.
fn status_error(status: StatusCode, message: String) -> Error {
    match status {
        StatusCode::UNAUTHORIZED => AuthError::Unauthorized.into(),
        StatusCode::BAD_REQUEST => Error::Validation(message),
        StatusCode::FORBIDDEN => Error::PermissionDenied(message),
        StatusCode::NOT_FOUND => Error::NotFound(message),
        _ => Error::Transfer(message),
    }
}

/// HTTP client for the drivegate API.
///
/// The session cookie is kept in a cookie jar scoped to the server URL.
pub struct HttpBackend {
    client: Client,
    base: Url,
    cookies: Arc<Jar>,
}

impl HttpBackend {
    /// Create a client for the server at `base_url`.
    ///
    /// # Errors
    /// - Malformed URL
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid server URL {}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!("Invalid server URL: {}", base_url)));
        }

        let cookies = Arc::new(Jar::default());
        let client = Client::builder()
            .user_agent(concat!("drivegate/", env!("CARGO_PKG_VERSION")))
            .cookie_provider(cookies.clone())
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base,
            cookies,
        })
    }

    /// Use an existing session id, e.g. one obtained through a browser login.
    pub fn set_session(&self, session_id: &str) {
        self.cookies.add_cookie_str(
            &format!("{}={}; Path=/", SESSION_COOKIE, session_id.trim()),
            &self.base,
        );
    }

    /// Server base URL.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send a request, turning transport failures into `Error::Network`
    /// and 401 into `AuthError::Unauthorized`.
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(format!("Request failed: {}", e)))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(AuthError::Unauthorized.into());
        }
        Ok(response)
    }

    /// Error for a non-success response, with `fallback` when the body has
    /// no message.
    async fn failure(response: Response, fallback: &str) -> Error {
        let status = response.status();
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| fallback.to_string());

        status_error(status, message)
    }

    async fn json<T: serde::de::DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        if !response.status().is_success() {
            let fallback = format!("Request failed with status {}", response.status());
            return Err(Self::failure(response, &fallback).await);
        }

        response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Unexpected server response: {}", e)))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn current_user(&self) -> Result<Option<SessionUser>> {
        match self
            .json::<UserResponse>(self.client.get(self.url(&["me"])))
            .await
        {
            Ok(body) => Ok(Some(body.user)),
            Err(Error::Auth(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn logout(&self) -> Result<()> {
        let response = self.send(self.client.post(self.url(&["logout"]))).await?;
        if !response.status().is_success() {
            return Err(Self::failure(response, "Logout failed").await);
        }
        Ok(())
    }

    async fn login_url(&self) -> Result<String> {
        let body: AuthUrlResponse = self.json(self.client.get(self.url(&["auth"]))).await?;
        Ok(body.auth_url)
    }

    async fn list_folder(&self, parent_id: Option<&str>) -> Result<FolderListing> {
        let mut request = self.client.get(self.url(&["folders"]));
        if let Some(id) = parent_id {
            request = request.query(&[("parentId", id)]);
        }
        self.json(request).await
    }

    async fn list_files(&self, folder_id: &str) -> Result<Vec<FileEntry>> {
        let request = self
            .client
            .get(self.url(&["files"]))
            .query(&[("folderId", folder_id)]);
        let body: FilesResponse = self.json(request).await?;
        Ok(body.files)
    }

    async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<FolderNode> {
        let request = self
            .client
            .post(self.url(&["folders"]))
            .json(&serde_json::json!({ "name": name, "parentId": parent_id }));
        let body: FolderResponse = self.json(request).await?;
        Ok(body.folder)
    }

    async fn rename_folder(&self, id: &str, name: &str) -> Result<FolderNode> {
        let request = self
            .client
            .patch(self.url(&["folders", id]))
            .json(&serde_json::json!({ "name": name }));
        let body: FolderResponse = self.json(request).await?;
        Ok(body.folder)
    }

    async fn delete_file(&self, id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .json(self.client.delete(self.url(&["files", id])))
            .await?;
        Ok(())
    }

    async fn upload(
        &self,
        folder_id: Option<&str>,
        body: UploadBody,
        progress: UploadProgress,
    ) -> Result<FileEntry> {
        let total = body.size;
        let mut sent = 0u64;
        let counted = body.stream.map(move |chunk| {
            if let Ok(bytes) = &chunk {
                sent += bytes.len() as u64;
                progress(sent, total);
            }
            chunk
        });

        let stream_body = reqwest::Body::wrap_stream(counted);
        let part = match total {
            Some(len) => Part::stream_with_length(stream_body, len),
            None => Part::stream(stream_body),
        }
        .file_name(body.name.clone())
        .mime_str(&body.mime_type)
        .map_err(|e| Error::Validation(format!("Invalid MIME type {}: {}", body.mime_type, e)))?;

        // The folder id goes first so the server knows the target before
        // the file content arrives
        let mut form = Form::new();
        if let Some(id) = folder_id {
            form = form.text("folderId", id.to_string());
        }
        let form = form.part("file", part);

        let response = self
            .send(self.client.post(self.url(&["upload"])).multipart(form))
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response, UPLOAD_FAILED).await);
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Unexpected upload response: {}", e)))?;
        Ok(body.file)
    }

    async fn download(&self, file_id: &str) -> Result<DownloadResponse> {
        let response = self
            .send(self.client.get(self.url(&["download", file_id])))
            .await?;

        if !response.status().is_success() {
            tracing::debug!("Download of {} returned {}", file_id, response.status());
            return Ok(DownloadResponse::Unavailable);
        }

        let content_length = response.content_length();
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| Error::Transfer(format!("Download interrupted: {}", e))));

        Ok(DownloadResponse::Stream {
            content_length,
            stream: Box::pin(stream),
        })
    }

    fn download_url(&self, file_id: &str) -> String {
        self.url(&["download", file_id]).to_string()
    }
}
