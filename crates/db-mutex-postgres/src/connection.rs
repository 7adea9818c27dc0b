//! Dedicated PostgreSQL session for advisory locks.

use std::fmt;

use db_mutex_core::error::{MutexError, MutexResult};
use sqlx::{Connection, PgConnection, PgPool};

const POSTGRES_SCHEMES: &[&str] = &["postgres", "postgresql"];

/// PostgreSQL connection source.
///
/// Session-level advisory locks belong to the backend process that took
/// them, so the mutex backend always owns its connection outright.
pub enum PostgresConnectionSource {
    /// Connection string of the primary.
    ConnectionString(String),
    /// External pool; one connection is detached from it.
    Pool(PgPool),
    /// Already-open connection.
    Connection(PgConnection),
}

impl PostgresConnectionSource {
    /// Opens (or takes) the dedicated connection.
    pub async fn open(self) -> MutexResult<PgConnection> {
        match self {
            Self::ConnectionString(url) => {
                ensure_postgres_url(&url)?;
                PgConnection::connect(&url)
                    .await
                    .map_err(MutexError::backend)
            }
            Self::Pool(pool) => pool
                .acquire()
                .await
                .map(|connection| connection.detach())
                .map_err(MutexError::backend),
            Self::Connection(connection) => Ok(connection),
        }
    }
}

/// Checks that `url` names a PostgreSQL driver.
pub fn ensure_postgres_url(url: &str) -> MutexResult<()> {
    let scheme = url
        .split_once(':')
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .unwrap_or_default();

    if POSTGRES_SCHEMES.contains(&scheme.as_str()) {
        Ok(())
    } else {
        Err(MutexError::Configuration(format!(
            "the PostgreSQL backend needs a PostgreSQL connection, got a '{scheme}' connection string"
        )))
    }
}

impl fmt::Debug for PostgresConnectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionString(_) => {
                write!(f, "PostgresConnectionSource::ConnectionString([REDACTED])")
            }
            Self::Pool(_) => write!(f, "PostgresConnectionSource::Pool([POOL])"),
            Self::Connection(_) => {
                write!(f, "PostgresConnectionSource::Connection([CONNECTION])")
            }
        }
    }
}
