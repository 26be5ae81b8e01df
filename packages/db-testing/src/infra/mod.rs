//! Database infrastructure - base connection cache and administrative statements.

pub mod admin;
pub mod cache;
pub mod diagnostics;
pub mod shared_lock;

pub use cache::ConnectionCache;
pub use diagnostics::CacheSnapshot;
