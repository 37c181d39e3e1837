// chansync Infrastructure - SQLite Adapter
// Implements: JobRegistry (durable single-instance slots)

mod connection;
mod error;
mod job_registry;
mod migration;

pub use connection::{create_pool, probe_capability, MIN_SQLITE_VERSION};
pub use job_registry::SqliteJobRegistry;
pub use migration::run_migrations;
