// SQLite Connection Pool Setup

use crate::error::map_sqlx_error;
use chansync_core::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Oldest SQLite able to run the registry (`UPDATE ... RETURNING`)
pub const MIN_SQLITE_VERSION: (u32, u32) = (3, 35);

/// Create SQLite connection pool with WAL mode.
///
/// Accepts a plain file path, a `sqlite:` URL or `sqlite::memory:`.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(map_sqlx_error)?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await
        .map_err(map_sqlx_error)
}

/// Whether this SQLite build can host the registry.
///
/// The daemon passes the answer to `Scheduler::schedule` as its capability
/// flag, so an old library disables scheduling instead of failing mid-run.
pub async fn probe_capability(pool: &SqlitePool) -> Result<bool> {
    let version: String = sqlx::query_scalar("SELECT sqlite_version()")
        .fetch_one(pool)
        .await
        .map_err(map_sqlx_error)?;

    let supported = parse_version(&version).is_some_and(|v| v >= MIN_SQLITE_VERSION);
    if supported {
        info!(sqlite_version = %version, "SQLite capability check passed");
    } else {
        warn!(
            sqlite_version = %version,
            required = %format!("{}.{}", MIN_SQLITE_VERSION.0, MIN_SQLITE_VERSION.1),
            "SQLite too old, scheduling disabled"
        );
    }
    Ok(supported)
}

fn parse_version(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}
