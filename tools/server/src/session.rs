//! Server-side sessions keyed by cookie.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

use drivegate_common::SessionUser;

/// How long a handed-out login state stays valid.
pub const LOGIN_STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Most login states kept at once; the oldest is dropped beyond this.
pub const MAX_PENDING_LOGINS: usize = 256;

/// Live sessions and outstanding login attempts.
///
/// Sessions last until logout, a rejected credential or a restart.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionUser>>,
    pending_logins: RwLock<HashMap<String, Instant>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session and return its id.
    pub async fn create(&self, user: SessionUser) -> String {
        let id = Uuid::new_v4().to_string();
        self.sessions.write().await.insert(id.clone(), user);
        id
    }

    pub async fn get(&self, id: &str) -> Option<SessionUser> {
        self.sessions.read().await.get(id).cloned()
    }

    /// End a session. Returns whether it existed.
    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Remember the CSRF state of a login that was handed out.
    pub async fn begin_login(&self, state: String) {
        let now = Instant::now();
        let mut pending = self.pending_logins.write().await;
        evict_stale(&mut pending, now);

        while pending.len() >= MAX_PENDING_LOGINS {
            let oldest = pending
                .iter()
                .min_by_key(|(_, issued)| **issued)
                .map(|(state, _)| state.clone());
            match oldest {
                Some(state) => pending.remove(&state),
                None => break,
            };
        }
        pending.insert(state, now);
    }

    /// Consume a login state. Each state is accepted once, within its TTL.
    pub async fn finish_login(&self, state: &str) -> bool {
        let now = Instant::now();
        let mut pending = self.pending_logins.write().await;
        evict_stale(&mut pending, now);
        pending.remove(state).is_some()
    }

    pub async fn pending_logins(&self) -> usize {
        self.pending_logins.read().await.len()
    }
}

fn evict_stale(pending: &mut HashMap<String, Instant>, now: Instant) {
    pending.retain(|_, issued| now.duration_since(*issued) < LOGIN_STATE_TTL);
}
