//! End-to-end scenarios.
//!
//! - `records` - publish, read, delete, conflicts and rejected uploads
//! - `encryption` - encrypted entries shared by URL
//! - `offline` - local-only use and replay of pending writes
//! - `subscriptions` - live updates over server-sent events

pub mod encryption;
pub mod offline;
pub mod records;
pub mod subscriptions;
