//! Session-consistency layer.
//!
//! Enforces one logically active session per user across devices: the
//! [`monitor::SessionMonitor`] validates the local session against the
//! store on a fixed cadence, reacts to realtime invalidation events, and
//! always consults the in-flight job counter before signing anyone out.
//! Raw auth signals pass through the [`debounce::AuthDebouncer`] state
//! machine so transient nulls from the auth provider never clear local
//! state on their own.

pub mod auth;
pub mod cleanup;
pub mod debounce;
pub mod device;
pub mod monitor;
pub mod store;

pub use auth::{AuthContext, CurrentUser};
pub use debounce::{AuthDebouncer, AuthSignal};
pub use device::DeviceState;
pub use monitor::{SessionDeactivated, SessionMonitor, SignOutDecision};
pub use store::{PgSessionStore, SessionStore, SessionStoreError};
