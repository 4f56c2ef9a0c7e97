//! Folder, file and transfer handlers.

use axum::body::Body;
use axum::extract::multipart::Field;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::SinkExt;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use drivegate_common::{Error, FileEntry, FolderListing, Result};
use drivegate_storage::RemoteDrive;

/// Characters kept as-is in an RFC 5987 file name.
const FILENAME: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Upload chunks buffered between the request body and the provider.
const UPLOAD_BUFFER_CHUNKS: usize = 8;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderQuery {
    parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesQuery {
    folder_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    name: Option<String>,
    parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    name: Option<String>,
}

/// Trimmed folder name, rejecting blanks.
fn folder_name(name: Option<String>) -> ApiResult<String> {
    name.map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::bad_request("Folder name is required."))
}

pub async fn list_folder(
    State(state): State<AppState>,
    Query(query): Query<FolderQuery>,
) -> ApiResult<Json<FolderListing>> {
    let root_folder_id = state.root()?;
    let id = state.folder_or_root(query.parent_id.as_deref())?;
    let drive = state.drive().await?;

    let (current_folder, folders) =
        tokio::try_join!(drive.get_metadata(&id), drive.list_children(&id))?;

    debug!("Listed folder {} ({} subfolders)", id, folders.len());
    Ok(Json(FolderListing {
        current_folder,
        folders,
        root_folder_id,
    }))
}

pub async fn create_folder(
    State(state): State<AppState>,
    Json(request): Json<CreateFolderRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let name = folder_name(request.name)?;
    let parent = state.folder_or_root(request.parent_id.as_deref())?;

    let folder = state.drive().await?.create_folder(&name, &parent).await?;

    info!("Created folder {} in {}", folder.id, parent);
    Ok((StatusCode::CREATED, Json(json!({ "folder": folder }))))
}

pub async fn rename_folder(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RenameRequest>,
) -> ApiResult<Json<Value>> {
    let name = folder_name(request.name)?;
    let folder = state.drive().await?.rename(&id, &name).await?;

    info!("Renamed folder {}", id);
    Ok(Json(json!({ "folder": folder })))
}

pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.drive().await?.delete_file(&id).await?;

    info!("Deleted file {}", id);
    Ok(Json(json!({ "success": true })))
}

pub async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<FilesQuery>,
) -> ApiResult<Json<Value>> {
    let folder_id = state.folder_or_root(query.folder_id.as_deref())?;
    let files = state.drive().await?.list_files(&folder_id).await?;

    Ok(Json(json!({ "folderId": folder_id, "files": files })))
}

/// Stream the first file part to the provider.
///
/// A `folderId` field must come before the file to be honored; without it
/// the file goes to the root. Fields after the file are not read.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let mut folder_id: Option<String> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(malformed)? {
        let field_name = field.name().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);

        match (field_name.as_deref(), file_name) {
            (_, Some(file_name)) => {
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let parent = state.folder_or_root(folder_id.as_deref())?;
                let drive = state.drive().await?;

                let file =
                    stream_upload(drive.as_ref(), &parent, &file_name, &mime_type, &mut field).await?;

                info!("Uploaded {} ({}) to {}", file.id, file_name, parent);
                return Ok(Json(json!({ "success": true, "file": file })));
            }
            (Some("folderId"), None) => {
                folder_id = Some(field.text().await.map_err(malformed)?);
            }
            _ => debug!("Ignoring upload field {:?}", field_name),
        }
    }

    Err(ApiError::bad_request("No file uploaded."))
}

fn malformed(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::bad_request(format!("Malformed upload: {}", e))
}

/// Feed a multipart field into `upload_file` through a bounded channel.
async fn stream_upload(
    drive: &dyn RemoteDrive,
    parent: &str,
    name: &str,
    mime_type: &str,
    field: &mut Field<'_>,
) -> Result<FileEntry> {
    let (mut sender, receiver) = futures::channel::mpsc::channel::<Result<Bytes>>(UPLOAD_BUFFER_CHUNKS);

    let pump = async move {
        loop {
            let next = match field.chunk().await {
                Ok(Some(chunk)) => Ok(chunk),
                Ok(None) => break,
                Err(e) => Err(Error::Transfer(format!("Upload interrupted: {}", e))),
            };

            let failed = next.is_err();
            // A closed receiver means the provider gave up first
            if sender.send(next).await.is_err() || failed {
                break;
            }
        }
    };

    let (uploaded, ()) = tokio::join!(
        drive.upload_file(parent, name, mime_type, Box::pin(receiver)),
        pump
    );
    uploaded
}

pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let drive = state.drive().await?;
    let (metadata, content) = tokio::try_join!(drive.get_metadata(&id), drive.download_file(&id))?;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    headers.insert(CONTENT_DISPOSITION, content_disposition(&metadata.name));
    if let Some(length) = content.content_length {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    }

    debug!("Streaming download of {}", id);
    Ok((headers, Body::from_stream(content.stream)).into_response())
}

/// `attachment` disposition with an ASCII fallback and the UTF-8 name.
fn content_disposition(name: &str) -> HeaderValue {
    let fallback: String = name
        .chars()
        .map(|c| match c {
            ' ' => ' ',
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect();

    let value = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        utf8_percent_encode(name, FILENAME)
    );

    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
