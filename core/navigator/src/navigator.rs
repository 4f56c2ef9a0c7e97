//! Navigation controller and transfer orchestration.

use futures::future::BoxFuture;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::backend::{Backend, ByteStream, DownloadResponse, UploadBody, UploadProgress};
use crate::gate::SessionGate;
use crate::refresh::{AutoRefresh, RefreshTick, DEFAULT_REFRESH_INTERVAL};
use crate::state::{Breadcrumb, ViewState};
use crate::transfer::{
    upload_percent, DownloadProgress, Transfer, TransferId, TransferKind, TransferTracker,
    TransferUpdate,
};
use drivegate_common::{AuthError, Error, FileEntry, FolderListing, FolderNode, Result, SessionUser};

/// Shown when the server reports the session gone.
pub const SESSION_EXPIRED: &str = "Session expired. Please sign in again.";
/// Transfer message for a transfer rejected by an expired session.
pub const TRANSFER_SESSION_EXPIRED: &str = "Session expired.";
/// Transfer message for an upload that lost its connection.
pub const UPLOAD_CONNECTION_ERROR: &str = "Connection error during upload.";
/// Shown after an explicit logout.
pub const SESSION_ENDED: &str = "Session ended.";

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A user-visible message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// How a folder load behaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Log failures instead of reporting them.
    pub silent: bool,
    /// Do not re-arm the auto-refresh timer afterwards.
    pub skip_auto_refresh: bool,
}

impl LoadOptions {
    /// Background reload.
    pub fn silent() -> Self {
        Self {
            silent: true,
            skip_auto_refresh: false,
        }
    }
}

/// Where a finished download ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Content written to this path.
    Saved(PathBuf),
    /// The body could not be streamed; fetch this URL directly.
    Fallback { url: String },
}

/// Navigator settings.
#[derive(Debug, Clone)]
pub struct NavigatorConfig {
    pub refresh_interval: Duration,
    pub downloads_dir: PathBuf,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            downloads_dir: PathBuf::from("."),
        }
    }
}

/// Clears the in-flight flag when a folder load ends, however it ends.
struct LoadGuard<'a>(&'a AtomicBool);

impl<'a> LoadGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Inner {
    backend: Arc<dyn Backend>,
    gate: Arc<SessionGate>,
    view: Mutex<ViewState>,
    transfers: TransferTracker,
    refresh: AutoRefresh,
    loading: AtomicBool,
    notices: mpsc::UnboundedSender<Notice>,
    downloads_dir: PathBuf,
}

/// Client engine for one session.
///
/// Cheap to clone; clones share state. Long operations such as transfers
/// can run on spawned tasks while navigation continues.
#[derive(Clone)]
pub struct Navigator {
    inner: Arc<Inner>,
}

impl Navigator {
    /// Create a navigator and the channel its notices are delivered on.
    pub fn new(
        backend: Arc<dyn Backend>,
        config: NavigatorConfig,
    ) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (notices, receiver) = mpsc::unbounded_channel();
        let gate = Arc::new(SessionGate::new());

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = weak.clone();
            let tick: RefreshTick = Arc::new(move || -> BoxFuture<'static, ()> {
                let weak = weak.clone();
                Box::pin(async move {
                    if let Some(inner) = weak.upgrade() {
                        debug!("Auto-refresh firing");
                        Navigator { inner }
                            .load_folder(None, LoadOptions::silent())
                            .await;
                    }
                })
            });

            Inner {
                backend,
                gate: gate.clone(),
                view: Mutex::new(ViewState::default()),
                transfers: TransferTracker::new(),
                refresh: AutoRefresh::new(config.refresh_interval, gate, tick),
                loading: AtomicBool::new(false),
                notices,
                downloads_dir: config.downloads_dir,
            }
        });

        (Self { inner }, receiver)
    }

    // --- Session gate ---

    /// The signed-in user, if known.
    pub fn user(&self) -> Option<SessionUser> {
        self.inner.gate.user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.gate.is_authenticated()
    }

    /// Whether a session is live, asking the server when no user is known.
    pub async fn ensure_authenticated(&self) -> bool {
        if self.inner.gate.is_authenticated() {
            return true;
        }

        match self.inner.backend.current_user().await {
            Ok(Some(user)) => {
                info!("Signed in as {}", user.email);
                self.inner.gate.set_user(user);
                true
            }
            Ok(None) => false,
            Err(e) => {
                debug!("Session check failed: {}", e);
                false
            }
        }
    }

    /// Reset everything after the server rejected the session.
    ///
    /// Cancels auto-refresh, forgets the user, empties the view and the
    /// transfer list, and reports `message`.
    pub fn handle_unauthorized(&self, message: &str) {
        self.reset_session();
        self.notify(NoticeLevel::Error, message);
    }

    /// End the session on the server and locally.
    pub async fn logout(&self) {
        if let Err(e) = self.inner.backend.logout().await {
            debug!("Logout request failed: {}", e);
        }
        self.reset_session();
        info!("Logged out");
        self.notify(NoticeLevel::Success, SESSION_ENDED);
    }

    /// URL that starts an interactive login.
    pub async fn login_url(&self) -> Result<String> {
        self.inner.backend.login_url().await
    }

    fn reset_session(&self) {
        self.inner.refresh.cancel();
        self.inner.gate.clear();
        self.view().reset();
        self.inner.transfers.reset();
    }

    // --- Navigation ---

    /// Load a folder and make it current.
    ///
    /// Resolves `target`, then the current folder, then the server root.
    /// A call made while another load is in flight does nothing. State is
    /// replaced only when both the folder and its files were fetched.
    pub async fn load_folder(&self, target: Option<&str>, options: LoadOptions) {
        if !self.ensure_authenticated().await {
            debug!("Not authenticated, skipping folder load");
            return;
        }

        let guard = match LoadGuard::acquire(&self.inner.loading) {
            Some(guard) => guard,
            None => {
                debug!("Folder load already in flight, dropping request");
                return;
            }
        };

        let target = target
            .map(str::to_string)
            .or_else(|| self.current_folder_id());

        match self.fetch_folder(target.as_deref()).await {
            Ok((listing, files)) => {
                // A session reset while fetching wins over the late result
                if self.inner.gate.is_authenticated() {
                    debug!("Loaded folder {}", listing.current_folder.id);
                    self.view().commit(listing, files);
                }
            }
            Err(e) => self.report(e, options.silent),
        }

        drop(guard);

        if !options.skip_auto_refresh {
            self.inner.refresh.schedule();
        }
    }

    async fn fetch_folder(&self, target: Option<&str>) -> Result<(FolderListing, Vec<FileEntry>)> {
        let listing = self.inner.backend.list_folder(target).await?;
        let files = self
            .inner
            .backend
            .list_files(&listing.current_folder.id)
            .await?;
        Ok((listing, files))
    }

    /// Open a folder by id.
    pub async fn open_folder(&self, id: &str) {
        self.load_folder(Some(id), LoadOptions::default()).await;
    }

    /// Reload the current folder in the foreground.
    pub async fn refresh(&self) {
        self.load_folder(None, LoadOptions::default()).await;
    }

    /// Jump back to a breadcrumb.
    ///
    /// # Errors
    /// - `Error::Validation` if there is no breadcrumb at `index`
    pub async fn open_breadcrumb(&self, index: usize) -> Result<()> {
        let id = self
            .view()
            .breadcrumbs
            .get(index)
            .map(|crumb| crumb.id.clone())
            .ok_or_else(|| Error::Validation(format!("No breadcrumb at position {}", index)))?;

        self.load_folder(Some(&id), LoadOptions::default()).await;
        Ok(())
    }

    /// Open the breadcrumb before the current folder.
    ///
    /// Returns `false` when the trail has nothing before it.
    pub async fn go_up(&self) -> bool {
        let previous = {
            let view = self.view();
            view.breadcrumbs
                .len()
                .checked_sub(2)
                .and_then(|index| view.breadcrumbs.get(index))
                .map(|crumb| crumb.id.clone())
        };

        match previous {
            Some(id) => {
                self.load_folder(Some(&id), LoadOptions::default()).await;
                true
            }
            None => false,
        }
    }

    /// Create a folder inside the current one.
    ///
    /// # Errors
    /// - `Error::Validation` for a blank name
    /// - Server errors, also reported as a notice
    pub async fn create_folder(&self, name: &str) -> Result<FolderNode> {
        self.require_session().await?;

        let name = name.trim();
        if name.is_empty() {
            return Err(self.fail(Error::Validation("Folder name is required.".to_string())));
        }

        let parent = self.current_folder_id();
        let folder = self
            .inner
            .backend
            .create_folder(name, parent.as_deref())
            .await
            .map_err(|e| self.fail(e))?;

        info!("Created folder {}", folder.id);
        self.notify(NoticeLevel::Success, "Folder created.");
        self.refresh().await;
        Ok(folder)
    }

    /// Rename a folder.
    ///
    /// Returns `None` without contacting the server when the new name is
    /// blank or unchanged.
    pub async fn rename_folder(&self, folder: &FolderNode, new_name: &str) -> Result<Option<FolderNode>> {
        self.require_session().await?;

        let new_name = new_name.trim();
        if new_name.is_empty() || new_name == folder.name {
            return Ok(None);
        }

        let renamed = self
            .inner
            .backend
            .rename_folder(&folder.id, new_name)
            .await
            .map_err(|e| self.fail(e))?;

        self.notify(NoticeLevel::Success, "Folder renamed.");
        self.refresh().await;
        Ok(Some(renamed))
    }

    /// Delete a file.
    pub async fn delete_file(&self, file: &FileEntry) -> Result<()> {
        self.require_session().await?;

        self.inner
            .backend
            .delete_file(&file.id)
            .await
            .map_err(|e| self.fail(e))?;

        info!("Deleted file {}", file.id);
        self.notify(NoticeLevel::Success, "File removed.");
        self.refresh().await;
        Ok(())
    }

    // --- Transfers ---

    /// Upload a file into the current folder.
    ///
    /// The transfer is tracked from start to finish. On success the file
    /// is added to the listing if its folder is still on display.
    pub async fn upload(&self, body: UploadBody) -> Result<FileEntry> {
        self.require_session().await?;

        let folder_id = self.current_folder_id();
        let id = self
            .inner
            .transfers
            .begin(TransferKind::Upload, &body.name, body.size);

        let inner = self.inner.clone();
        let progress: UploadProgress = Arc::new(move |sent: u64, total: Option<u64>| {
            if let Some(percent) = upload_percent(sent, total) {
                inner.transfers.update(id, TransferUpdate::progress(percent));
            }
        });

        match self
            .inner
            .backend
            .upload(folder_id.as_deref(), body, progress)
            .await
        {
            Ok(file) => {
                self.inner.transfers.update(id, TransferUpdate::completed());
                self.view().splice_upload(folder_id.as_deref(), file.clone());
                info!("Uploaded {} as {}", file.name, file.id);
                self.notify(NoticeLevel::Success, "File uploaded.");
                self.refresh().await;
                Ok(file)
            }
            Err(e) if e.is_auth() => {
                self.inner
                    .transfers
                    .update(id, TransferUpdate::failed(TRANSFER_SESSION_EXPIRED));
                self.handle_unauthorized(SESSION_EXPIRED);
                Err(e)
            }
            Err(e) => {
                let message = match &e {
                    Error::Network(_) => UPLOAD_CONNECTION_ERROR.to_string(),
                    other => other.detail(),
                };
                warn!("Upload failed: {}", e);
                self.inner.transfers.update(id, TransferUpdate::failed(&message));
                self.notify(NoticeLevel::Error, &message);
                Err(e)
            }
        }
    }

    /// Download a file into the downloads directory.
    ///
    /// Progress follows the `Content-Length` header, else the file's
    /// declared size without ever reaching 100 early. The transfer
    /// completes only after the content is on disk.
    pub async fn download(&self, file: &FileEntry) -> Result<DownloadOutcome> {
        self.require_session().await?;

        let id = self
            .inner
            .transfers
            .begin(TransferKind::Download, &file.name, file.size);

        let response = match self.inner.backend.download(&file.id).await {
            Ok(response) => response,
            Err(e) => return Err(self.fail_transfer(id, e)),
        };

        match response {
            DownloadResponse::Unavailable => {
                self.inner.transfers.update(id, TransferUpdate::completed());
                Ok(DownloadOutcome::Fallback {
                    url: self.inner.backend.download_url(&file.id),
                })
            }
            DownloadResponse::Stream {
                content_length,
                stream,
            } => {
                let path = self
                    .save_stream(id, file, content_length, stream)
                    .await
                    .map_err(|e| self.fail_transfer(id, e))?;

                self.inner.transfers.update(id, TransferUpdate::completed());
                info!("Downloaded {} to {}", file.id, path.display());
                self.notify(NoticeLevel::Success, &format!("Saved {}.", path.display()));
                Ok(DownloadOutcome::Saved(path))
            }
        }
    }

    /// Drain `stream` into a partial file, then move it into place.
    async fn save_stream(
        &self,
        id: TransferId,
        file: &FileEntry,
        content_length: Option<u64>,
        mut stream: ByteStream,
    ) -> Result<PathBuf> {
        let path = self.inner.downloads_dir.join(local_file_name(&file.name, &file.id));
        let mut partial = path.clone().into_os_string();
        partial.push(".part");
        let partial = PathBuf::from(partial);

        tokio::fs::create_dir_all(&self.inner.downloads_dir).await?;
        let mut out = tokio::fs::File::create(&partial).await?;
        let mut progress = DownloadProgress::new(content_length, file.size);

        let drained = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                out.write_all(&chunk).await?;
                if let Some(percent) = progress.advance(chunk.len() as u64) {
                    self.inner.transfers.update(id, TransferUpdate::progress(percent));
                }
            }
            out.flush().await?;
            Ok::<(), Error>(())
        }
        .await;

        if let Err(e) = drained {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        drop(out);
        tokio::fs::rename(&partial, &path).await?;
        Ok(path)
    }

    /// Remove finished transfers.
    pub fn clear_transfers(&self) {
        self.inner.transfers.clear();
    }

    /// Transfers, newest first.
    pub fn transfers(&self) -> Vec<Transfer> {
        self.inner.transfers.snapshot()
    }

    // --- Views ---

    /// Copy of the current view.
    pub fn snapshot(&self) -> ViewState {
        self.view().clone()
    }

    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.view().breadcrumbs.entries().to_vec()
    }

    pub fn current_folder_id(&self) -> Option<String> {
        self.view().current_id().map(str::to_string)
    }

    /// Subfolder of the current folder by id or name.
    pub fn find_folder(&self, key: &str) -> Option<FolderNode> {
        self.view().find_folder(key).cloned()
    }

    /// File of the current folder by id or name.
    pub fn find_file(&self, key: &str) -> Option<FileEntry> {
        self.view().find_file(key).cloned()
    }

    /// Whether the auto-refresh timer is pending.
    pub fn auto_refresh_armed(&self) -> bool {
        self.inner.refresh.is_armed()
    }

    /// Whether a folder load is in flight.
    pub fn is_loading(&self) -> bool {
        self.inner.loading.load(Ordering::Acquire)
    }

    // --- Helpers ---

    fn view(&self) -> MutexGuard<'_, ViewState> {
        self.inner
            .view
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn notify(&self, level: NoticeLevel, message: &str) {
        // Nobody listening is fine
        let _ = self.inner.notices.send(Notice {
            level,
            message: message.to_string(),
        });
    }

    async fn require_session(&self) -> Result<()> {
        if self.ensure_authenticated().await {
            Ok(())
        } else {
            Err(AuthError::Unauthorized.into())
        }
    }

    /// Route a failed folder load.
    fn report(&self, error: Error, silent: bool) {
        if error.is_auth() {
            self.handle_unauthorized(SESSION_EXPIRED);
        } else if silent {
            warn!("Background refresh failed: {}", error);
        } else {
            warn!("Folder load failed: {}", error);
            self.notify(NoticeLevel::Error, &error.detail());
        }
    }

    /// Report a failed foreground operation and hand the error back.
    fn fail(&self, error: Error) -> Error {
        if error.is_auth() {
            self.handle_unauthorized(SESSION_EXPIRED);
        } else {
            self.notify(NoticeLevel::Error, &error.detail());
        }
        error
    }

    fn fail_transfer(&self, id: TransferId, error: Error) -> Error {
        if error.is_auth() {
            self.inner
                .transfers
                .update(id, TransferUpdate::failed(TRANSFER_SESSION_EXPIRED));
        } else {
            warn!("Download failed: {}", error);
            self.inner
                .transfers
                .update(id, TransferUpdate::failed(error.detail()));
        }
        self.fail(error)
    }
}

/// File name to save a download under.
fn local_file_name(name: &str, fallback: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .unwrap_or(fallback)
        .to_string()
}
