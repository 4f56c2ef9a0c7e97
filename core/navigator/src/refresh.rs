//! Auto-refresh timer.

use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::gate::SessionGate;

/// Default delay between background reloads.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Work run when the timer fires.
pub type RefreshTick = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// A single pending timer that reloads the current folder.
///
/// Arming replaces any pending timer. The tick runs detached from the
/// timer, so re-arming from inside the tick never cancels it.
pub struct AutoRefresh {
    interval: Duration,
    gate: Arc<SessionGate>,
    tick: RefreshTick,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl AutoRefresh {
    pub fn new(interval: Duration, gate: Arc<SessionGate>, tick: RefreshTick) -> Self {
        Self {
            interval,
            gate,
            tick,
            pending: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Cancel any pending timer and arm a new one.
    ///
    /// No-op while unauthenticated.
    pub fn schedule(&self) {
        if !self.gate.is_authenticated() {
            debug!("Not authenticated, auto-refresh stays off");
            self.cancel();
            return;
        }

        let interval = self.interval;
        let tick = self.tick.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            tokio::spawn(tick());
        });

        if let Some(previous) = self.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Cancel the pending timer, if any.
    pub fn cancel(&self) {
        if let Some(handle) = self.lock().take() {
            handle.abort();
        }
    }

    /// Whether a timer is waiting to fire.
    pub fn is_armed(&self) -> bool {
        self.lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Drop for AutoRefresh {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivegate_common::SessionUser;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn signed_in() -> Arc<SessionGate> {
        let gate = Arc::new(SessionGate::new());
        gate.set_user(SessionUser {
            email: "ana@example.com".to_string(),
            name: "Ana".to_string(),
            picture: None,
        });
        gate
    }

    fn counting(count: Arc<AtomicUsize>) -> RefreshTick {
        Arc::new(move || {
            let count = count.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_interval() {
        let count = Arc::new(AtomicUsize::new(0));
        let refresh = AutoRefresh::new(DEFAULT_REFRESH_INTERVAL, signed_in(), counting(count.clone()));

        refresh.schedule();
        assert!(refresh.is_armed());

        tokio::time::sleep(Duration::from_secs(9)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!refresh.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_keeps_single_timer() {
        let count = Arc::new(AtomicUsize::new(0));
        let refresh = AutoRefresh::new(DEFAULT_REFRESH_INTERVAL, signed_in(), counting(count.clone()));

        for _ in 0..5 {
            refresh.schedule();
            tokio::time::sleep(Duration::from_secs(3)).await;
        }
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let count = Arc::new(AtomicUsize::new(0));
        let refresh = AutoRefresh::new(DEFAULT_REFRESH_INTERVAL, signed_in(), counting(count.clone()));

        refresh.schedule();
        refresh.cancel();
        assert!(!refresh.is_armed());

        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthenticated_never_arms() {
        let count = Arc::new(AtomicUsize::new(0));
        let refresh = AutoRefresh::new(
            DEFAULT_REFRESH_INTERVAL,
            Arc::new(SessionGate::new()),
            counting(count.clone()),
        );

        refresh.schedule();
        assert!(!refresh.is_armed());

        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
