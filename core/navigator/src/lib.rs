//! Client engine for a drivegate server.
//!
//! Tracks the folder on display and the path that led to it, reloads it in
//! the background while a session is live, and runs uploads and downloads
//! with progress. The server is reached through the [`Backend`] trait;
//! [`HttpBackend`] talks to a running proxy.

pub mod backend;
pub mod gate;
pub mod http;
pub mod navigator;
pub mod refresh;
pub mod state;
pub mod transfer;

pub use backend::{Backend, ByteStream, DownloadResponse, UploadBody, UploadProgress, UPLOAD_FAILED};
pub use gate::SessionGate;
pub use http::HttpBackend;
pub use navigator::{
    DownloadOutcome, LoadOptions, Navigator, NavigatorConfig, Notice, NoticeLevel, SESSION_ENDED,
    SESSION_EXPIRED,
};
pub use refresh::{AutoRefresh, DEFAULT_REFRESH_INTERVAL};
pub use state::{Breadcrumb, BreadcrumbTrail, ViewState, ROOT_LABEL, UNTITLED_LABEL};
pub use transfer::{Transfer, TransferId, TransferKind, TransferStatus, TransferTracker};
