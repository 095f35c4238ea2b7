//! The current-user context.
//!
//! A context object with an explicit lifecycle -- `init` at sign-in,
//! `teardown` at sign-out -- injected into the monitor and the job
//! dispatch path rather than read as ambient global state.

use std::sync::RwLock;

use quantdesk_core::types::DbId;

/// The signed-in user on this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub user_id: DbId,
}

/// Shared, explicitly-lifecycled auth state.
#[derive(Debug, Default)]
pub struct AuthContext {
    current: RwLock<Option<CurrentUser>>,
}

impl AuthContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the signed-in user.
    pub fn init(&self, user: CurrentUser) {
        *self.write() = Some(user);
        tracing::info!(user_id = user.user_id, "Auth context initialized");
    }

    /// Clear the signed-in user.
    pub fn teardown(&self) {
        if self.write().take().is_some() {
            tracing::info!("Auth context torn down");
        }
    }

    /// The currently signed-in user, if any.
    pub fn current(&self) -> Option<CurrentUser> {
        *self
            .current
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<CurrentUser>> {
        self.current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_round_trip() {
        let auth = AuthContext::new();
        assert_eq!(auth.current(), None);

        auth.init(CurrentUser { user_id: 5 });
        assert_eq!(auth.current(), Some(CurrentUser { user_id: 5 }));

        auth.teardown();
        assert_eq!(auth.current(), None);
    }

    #[test]
    fn teardown_without_init_is_noop() {
        let auth = AuthContext::new();
        auth.teardown();
        assert_eq!(auth.current(), None);
    }
}
