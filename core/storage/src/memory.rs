//! In-memory drive for testing.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{stream, StreamExt};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::provider::{ByteStream, DownloadStream, RemoteDrive};
use drivegate_common::{Error, FileEntry, FolderNode, Person, Result};

/// Size of the chunks yielded by `download_file`.
const DOWNLOAD_CHUNK: usize = 64 * 1024;

/// In-memory drive entry.
#[derive(Debug, Clone)]
enum Entry {
    Folder(FolderNode),
    File {
        parent_id: String,
        entry: FileEntry,
        data: Bytes,
    },
}

impl Entry {
    fn parent_id(&self) -> Option<&str> {
        match self {
            Entry::Folder(folder) => folder.parent_ids.first().map(String::as_str),
            Entry::File { parent_id, .. } => Some(parent_id),
        }
    }
}

/// In-memory remote drive.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop.
pub struct MemoryDrive {
    root_id: String,
    owner: Person,
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryDrive {
    /// Create a drive containing only a root folder with the given id.
    pub fn new(root_id: impl Into<String>) -> Self {
        let root_id = root_id.into();
        let owner = Person {
            display_name: Some("Drive Owner".to_string()),
            email_address: Some("owner@example.com".to_string()),
        };

        let mut root = FolderNode::new(root_id.clone(), "");
        root.created_time = Some(Utc::now());
        root.owners = vec![owner.clone()];

        let mut entries = HashMap::new();
        entries.insert(root_id.clone(), Entry::Folder(root));

        Self {
            root_id,
            owner,
            entries: RwLock::new(entries),
        }
    }

    /// Id of the root folder.
    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// Store a file directly, bypassing the stream interface.
    pub async fn put_file(&self, parent_id: &str, name: &str, data: impl Into<Bytes>) -> Result<FileEntry> {
        self.insert_file(parent_id, name, "application/octet-stream", data.into())
            .await
    }

    /// Number of stored items, root included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn insert_file(
        &self,
        parent_id: &str,
        name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> Result<FileEntry> {
        let mut entries = self.entries.write().await;
        Self::require_folder(&entries, parent_id)?;

        let now = Utc::now();
        let entry = FileEntry {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            size: Some(data.len() as u64),
            created_time: Some(now),
            modified_time: Some(now),
            owners: vec![self.owner.clone()],
            last_modifying_user: Some(self.owner.clone()),
            web_view_link: None,
        };

        entries.insert(
            entry.id.clone(),
            Entry::File {
                parent_id: parent_id.to_string(),
                entry: entry.clone(),
                data,
            },
        );

        Ok(entry)
    }

    fn require_folder<'a>(entries: &'a HashMap<String, Entry>, id: &str) -> Result<&'a FolderNode> {
        match entries.get(id) {
            Some(Entry::Folder(folder)) => Ok(folder),
            Some(Entry::File { .. }) => Err(Error::Validation(format!("Not a folder: {}", id))),
            None => Err(Error::NotFound(format!("Folder not found: {}", id))),
        }
    }

    fn sort_key(name: &str) -> String {
        name.to_lowercase()
    }
}

#[async_trait]
impl RemoteDrive for MemoryDrive {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_children(&self, folder_id: &str) -> Result<Vec<FolderNode>> {
        let entries = self.entries.read().await;
        Self::require_folder(&entries, folder_id)?;

        let mut folders: Vec<FolderNode> = entries
            .values()
            .filter(|e| e.parent_id() == Some(folder_id))
            .filter_map(|e| match e {
                Entry::Folder(folder) => Some(folder.clone()),
                Entry::File { .. } => None,
            })
            .collect();
        folders.sort_by_key(|f| Self::sort_key(&f.name));

        Ok(folders)
    }

    async fn list_files(&self, folder_id: &str) -> Result<Vec<FileEntry>> {
        let entries = self.entries.read().await;
        Self::require_folder(&entries, folder_id)?;

        let mut files: Vec<FileEntry> = entries
            .values()
            .filter_map(|e| match e {
                Entry::File {
                    parent_id, entry, ..
                } if parent_id == folder_id => Some(entry.clone()),
                _ => None,
            })
            .collect();
        files.sort_by_key(|f| Self::sort_key(&f.name));

        Ok(files)
    }

    async fn get_metadata(&self, id: &str) -> Result<FolderNode> {
        let entries = self.entries.read().await;
        match entries.get(id) {
            Some(Entry::Folder(folder)) => Ok(folder.clone()),
            Some(Entry::File { entry, parent_id, .. }) => {
                let mut node = FolderNode::new(entry.id.clone(), entry.name.clone());
                node.parent_ids = vec![parent_id.clone()];
                node.modified_time = entry.modified_time;
                Ok(node)
            }
            None => Err(Error::NotFound(format!("Item not found: {}", id))),
        }
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<FolderNode> {
        let mut entries = self.entries.write().await;
        Self::require_folder(&entries, parent_id)?;

        let now = Utc::now();
        let mut folder = FolderNode::new(Uuid::new_v4().to_string(), name);
        folder.parent_ids = vec![parent_id.to_string()];
        folder.created_time = Some(now);
        folder.modified_time = Some(now);
        folder.owners = vec![self.owner.clone()];
        folder.last_modifying_user = Some(self.owner.clone());

        entries.insert(folder.id.clone(), Entry::Folder(folder.clone()));

        Ok(folder)
    }

    async fn rename(&self, id: &str, new_name: &str) -> Result<FolderNode> {
        let mut entries = self.entries.write().await;
        let now = Utc::now();

        match entries.get_mut(id) {
            Some(Entry::Folder(folder)) => {
                folder.name = new_name.to_string();
                folder.modified_time = Some(now);
                Ok(folder.clone())
            }
            Some(Entry::File {
                entry, parent_id, ..
            }) => {
                entry.name = new_name.to_string();
                entry.modified_time = Some(now);
                let mut node = FolderNode::new(entry.id.clone(), entry.name.clone());
                node.parent_ids = vec![parent_id.clone()];
                node.modified_time = Some(now);
                Ok(node)
            }
            None => Err(Error::NotFound(format!("Item not found: {}", id))),
        }
    }

    async fn delete_file(&self, id: &str) -> Result<()> {
        let mut entries = self.entries.write().await;

        match entries.get(id) {
            Some(Entry::File { .. }) => {
                entries.remove(id);
                Ok(())
            }
            Some(Entry::Folder(_)) => Err(Error::Validation(format!("Not a file: {}", id))),
            None => Err(Error::NotFound(format!("File not found: {}", id))),
        }
    }

    async fn upload_file(
        &self,
        parent_id: &str,
        name: &str,
        mime_type: &str,
        mut data: ByteStream,
    ) -> Result<FileEntry> {
        let mut buffer = Vec::new();
        while let Some(chunk) = data.next().await {
            buffer.extend_from_slice(&chunk?);
        }

        self.insert_file(parent_id, name, mime_type, Bytes::from(buffer))
            .await
    }

    async fn download_file(&self, id: &str) -> Result<DownloadStream> {
        let data = {
            let entries = self.entries.read().await;
            match entries.get(id) {
                Some(Entry::File { data, .. }) => data.clone(),
                Some(Entry::Folder(_)) => {
                    return Err(Error::Validation("Cannot download a folder".to_string()))
                }
                None => return Err(Error::NotFound(format!("File not found: {}", id))),
            }
        };

        let content_length = Some(data.len() as u64);
        let chunks: Vec<Result<Bytes>> = (0..data.len())
            .step_by(DOWNLOAD_CHUNK)
            .map(|start| Ok(data.slice(start..(start + DOWNLOAD_CHUNK).min(data.len()))))
            .collect();

        Ok(DownloadStream {
            content_length,
            stream: Box::pin(stream::iter(chunks)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_stream(data: &'static [u8]) -> ByteStream {
        Box::pin(stream::once(async move { Ok(Bytes::from_static(data)) }))
    }

    #[tokio::test]
    async fn test_create_and_list_folders() {
        let drive = MemoryDrive::new("root");
        drive.create_folder("beta", "root").await.unwrap();
        drive.create_folder("Alpha", "root").await.unwrap();

        let folders = drive.list_children("root").await.unwrap();
        let names: Vec<_> = folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "beta"]);
        assert!(folders.iter().all(|f| f.parent_ids == vec!["root".to_string()]));
    }

    #[tokio::test]
    async fn test_files_and_folders_are_separate() {
        let drive = MemoryDrive::new("root");
        drive.create_folder("docs", "root").await.unwrap();
        drive
            .upload_file("root", "a.txt", "text/plain", bytes_stream(b"hello"))
            .await
            .unwrap();

        assert_eq!(drive.list_children("root").await.unwrap().len(), 1);
        let files = drive.list_files("root").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size, Some(5));
        assert_eq!(files[0].mime_type, "text/plain");
    }

    #[tokio::test]
    async fn test_missing_folder_is_not_found() {
        let drive = MemoryDrive::new("root");
        assert!(matches!(
            drive.list_children("nope").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            drive.get_metadata("nope").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rename_folder() {
        let drive = MemoryDrive::new("root");
        let folder = drive.create_folder("old", "root").await.unwrap();

        let renamed = drive.rename(&folder.id, "new").await.unwrap();
        assert_eq!(renamed.name, "new");
        assert_eq!(drive.get_metadata(&folder.id).await.unwrap().name, "new");
    }

    #[tokio::test]
    async fn test_delete_file_only() {
        let drive = MemoryDrive::new("root");
        let folder = drive.create_folder("keep", "root").await.unwrap();
        let file = drive.put_file("root", "x.bin", vec![1u8, 2, 3]).await.unwrap();

        assert!(drive.delete_file(&folder.id).await.is_err());
        drive.delete_file(&file.id).await.unwrap();
        assert!(drive.list_files("root").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_download_is_chunked() {
        let drive = MemoryDrive::new("root");
        let data = vec![7u8; DOWNLOAD_CHUNK * 2 + 10];
        let file = drive.put_file("root", "big.bin", data.clone()).await.unwrap();

        let download = drive.download_file(&file.id).await.unwrap();
        assert_eq!(download.content_length, Some(data.len() as u64));

        let chunks: Vec<Bytes> = download
            .stream
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), data);
    }
}
