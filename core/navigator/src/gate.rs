//! Authentication state of the client.

use std::sync::Mutex;

use drivegate_common::SessionUser;

/// Holds the last known session user. Authenticated means a user is known.
#[derive(Debug, Default)]
pub struct SessionGate {
    user: Mutex<Option<SessionUser>>,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().is_some()
    }

    pub fn user(&self) -> Option<SessionUser> {
        self.lock().clone()
    }

    pub fn set_user(&self, user: SessionUser) {
        *self.lock() = Some(user);
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<SessionUser>> {
        self.user
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
