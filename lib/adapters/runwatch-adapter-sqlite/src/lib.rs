//! SQLite-backed run store and polling change feed.

pub mod feed;
mod rows;
pub mod schema;
pub mod store;

pub use feed::PollingChangeFeed;
pub use store::{SqlitePool, SqliteRunStore};
