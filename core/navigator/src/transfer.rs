//! Upload and download tracking.

use std::sync::Mutex;
use uuid::Uuid;

/// Identifier of a transfer.
pub type TransferId = Uuid;

/// Direction of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Upload,
    Download,
}

/// Lifecycle of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Running,
    Completed,
    Error,
}

/// One upload or download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub id: TransferId,
    pub kind: TransferKind,
    pub name: String,
    pub size: Option<u64>,
    /// Percentage, unset while unknown.
    pub progress: Option<u8>,
    pub status: TransferStatus,
    pub message: Option<String>,
}

impl Transfer {
    pub fn is_running(&self) -> bool {
        self.status == TransferStatus::Running
    }
}

/// Partial update applied to a transfer. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferUpdate {
    pub progress: Option<u8>,
    pub status: Option<TransferStatus>,
    pub message: Option<String>,
}

impl TransferUpdate {
    pub fn progress(percent: u8) -> Self {
        Self {
            progress: Some(percent.min(100)),
            ..Default::default()
        }
    }

    /// Finished, at 100%.
    pub fn completed() -> Self {
        Self {
            progress: Some(100),
            status: Some(TransferStatus::Completed),
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            progress: None,
            status: Some(TransferStatus::Error),
            message: Some(message.into()),
        }
    }
}

/// All transfers of a client, newest first.
#[derive(Debug, Default)]
pub struct TransferTracker {
    transfers: Mutex<Vec<Transfer>>,
}

impl TransferTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running transfer.
    pub fn begin(&self, kind: TransferKind, name: &str, size: Option<u64>) -> TransferId {
        let transfer = Transfer {
            id: Uuid::new_v4(),
            kind,
            name: name.to_string(),
            size,
            progress: None,
            status: TransferStatus::Running,
            message: None,
        };
        let id = transfer.id;

        self.lock().insert(0, transfer);
        id
    }

    /// Apply `update` to a transfer. Unknown ids are ignored; the last
    /// write wins.
    pub fn update(&self, id: TransferId, update: TransferUpdate) {
        let mut transfers = self.lock();
        if let Some(transfer) = transfers.iter_mut().find(|t| t.id == id) {
            if let Some(progress) = update.progress {
                transfer.progress = Some(progress);
            }
            if let Some(status) = update.status {
                transfer.status = status;
            }
            if let Some(message) = update.message {
                transfer.message = Some(message);
            }
        }
    }

    /// Remove every finished transfer.
    pub fn clear(&self) {
        self.lock().retain(Transfer::is_running);
    }

    /// Drop everything, running transfers included.
    pub fn reset(&self) {
        self.lock().clear();
    }

    pub fn get(&self, id: TransferId) -> Option<Transfer> {
        self.lock().iter().find(|t| t.id == id).cloned()
    }

    pub fn snapshot(&self) -> Vec<Transfer> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Transfer>> {
        // A panic while holding the lock leaves the list intact
        self.transfers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// `round(done / total * 100)`, clamped to 100.
pub fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let value = (done as f64 / total as f64 * 100.0).round();
    value.min(100.0) as u8
}

/// Upload percentage; unset when the total is unknown.
pub fn upload_percent(sent: u64, total: Option<u64>) -> Option<u8> {
    total.filter(|t| *t > 0).map(|t| percent(sent, t))
}

/// Progress of a download body being drained.
///
/// A `Content-Length` header is authoritative. The file's declared size is
/// only an estimate, so it never reports 100 before the stream ends.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    expected: Option<u64>,
    authoritative: bool,
    received: u64,
}

/// Ceiling while only the declared size is known.
const ESTIMATE_CEILING: u8 = 99;

impl DownloadProgress {
    pub fn new(content_length: Option<u64>, declared_size: Option<u64>) -> Self {
        match (
            content_length.filter(|n| *n > 0),
            declared_size.filter(|n| *n > 0),
        ) {
            (Some(len), _) => Self {
                expected: Some(len),
                authoritative: true,
                received: 0,
            },
            (None, declared) => Self {
                expected: declared,
                authoritative: false,
                received: 0,
            },
        }
    }

    /// Account for `bytes` more and return the percentage to report.
    pub fn advance(&mut self, bytes: u64) -> Option<u8> {
        self.received += bytes;
        let expected = self.expected?;
        let value = percent(self.received, expected);

        Some(if self.authoritative {
            value
        } else {
            value.min(ESTIMATE_CEILING)
        })
    }

    pub fn received(&self) -> u64 {
        self.received
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_newest_first() {
        let tracker = TransferTracker::new();
        let first = tracker.begin(TransferKind::Upload, "a", Some(1));
        let second = tracker.begin(TransferKind::Download, "b", None);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot[0].id, second);
        assert_eq!(snapshot[1].id, first);
        assert!(snapshot.iter().all(|t| t.progress.is_none() && t.is_running()));
    }

    #[test]
    fn test_update_last_write_wins() {
        let tracker = TransferTracker::new();
        let id = tracker.begin(TransferKind::Upload, "a", Some(10));

        tracker.update(id, TransferUpdate::progress(80));
        tracker.update(id, TransferUpdate::progress(40));
        assert_eq!(tracker.get(id).unwrap().progress, Some(40));

        tracker.update(id, TransferUpdate::failed("boom"));
        let transfer = tracker.get(id).unwrap();
        assert_eq!(transfer.status, TransferStatus::Error);
        assert_eq!(transfer.message.as_deref(), Some("boom"));
        assert_eq!(transfer.progress, Some(40));

        // Unknown id is ignored
        tracker.update(Uuid::new_v4(), TransferUpdate::completed());
        assert_eq!(tracker.snapshot().len(), 1);
    }

    #[test]
    fn test_clear_keeps_running() {
        let tracker = TransferTracker::new();
        let done = tracker.begin(TransferKind::Upload, "done", None);
        let failed = tracker.begin(TransferKind::Download, "failed", None);
        let running = tracker.begin(TransferKind::Upload, "running", None);

        tracker.update(done, TransferUpdate::completed());
        tracker.update(failed, TransferUpdate::failed("x"));
        tracker.clear();

        let ids: Vec<_> = tracker.snapshot().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![running]);

        tracker.reset();
        assert!(tracker.snapshot().is_empty());
    }

    #[test]
    fn test_upload_percent() {
        assert_eq!(upload_percent(5, None), None);
        assert_eq!(upload_percent(0, Some(0)), None);
        assert_eq!(upload_percent(1, Some(3)), Some(33));
        assert_eq!(upload_percent(2, Some(3)), Some(67));
        assert_eq!(upload_percent(3, Some(3)), Some(100));
    }

    #[test]
    fn test_ten_megabyte_upload_reaches_100() {
        let total = 10 * 1024 * 1024u64;
        let chunk = 64 * 1024u64;
        let mut last = 0u8;
        let mut sent = 0u64;

        while sent < total {
            sent += chunk;
            let p = upload_percent(sent.min(total), Some(total)).unwrap();
            assert!(p >= last);
            last = p;
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn test_download_declared_size_caps_at_99() {
        let mut progress = DownloadProgress::new(None, Some(1000));
        assert_eq!(progress.advance(999), Some(99));
        assert_eq!(progress.advance(1), Some(99));
        // Longer than declared still stays below completion
        assert_eq!(progress.advance(500), Some(99));
    }

    #[test]
    fn test_download_header_is_authoritative() {
        let mut progress = DownloadProgress::new(Some(1000), Some(10));
        assert_eq!(progress.advance(500), Some(50));
        assert_eq!(progress.advance(500), Some(100));
        // Overlong bodies are clamped
        assert_eq!(progress.advance(500), Some(100));
    }

    #[test]
    fn test_download_without_size() {
        let mut progress = DownloadProgress::new(None, None);
        assert_eq!(progress.advance(42), None);
        assert_eq!(progress.received(), 42);
    }

    proptest! {
        #[test]
        fn test_estimate_never_completes(declared in 1u64..100_000, chunks in proptest::collection::vec(1u64..10_000, 1..50)) {
            let mut progress = DownloadProgress::new(None, Some(declared));
            for chunk in chunks {
                let p = progress.advance(chunk).unwrap();
                prop_assert!(p <= 99);
            }
        }

        #[test]
        fn test_clear_retains_exactly_running(outcomes in proptest::collection::vec(0u8..3, 0..20)) {
            let tracker = TransferTracker::new();
            let mut running = Vec::new();
            for (i, outcome) in outcomes.iter().enumerate() {
                let id = tracker.begin(TransferKind::Upload, &i.to_string(), None);
                match outcome {
                    0 => running.push(id),
                    1 => tracker.update(id, TransferUpdate::completed()),
                    _ => tracker.update(id, TransferUpdate::failed("x")),
                }
            }

            tracker.clear();
            let mut left: Vec<_> = tracker.snapshot().iter().map(|t| t.id).collect();
            left.sort();
            running.sort();
            prop_assert_eq!(left, running);
        }
    }
}
