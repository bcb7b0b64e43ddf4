//! Client-side state for Rollcall: the attendance store, the session guard,
//! and a file-backed session storage.

pub mod error;
pub mod file_storage;
pub mod guard;
pub mod store;

#[cfg(test)]
mod fake;

pub use error::{Error, Result};
pub use file_storage::FileStorage;
pub use guard::{DenyReason, GuardHandle, GuardState, RoutePolicy, SessionGuard};
pub use store::{AttendanceStore, StoreState, UserOverview};
