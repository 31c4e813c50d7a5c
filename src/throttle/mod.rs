//! Throttling logic and state management.

mod entry;
mod policy;
mod store;
mod sweeper;

pub use entry::ThrottleEntry;
pub use policy::{ThrottlePolicy, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_MS};
pub use store::{Decision, ThrottleStore};
pub use sweeper::Sweeper;
