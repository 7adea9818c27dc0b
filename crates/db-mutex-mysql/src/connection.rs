//! Dedicated MySQL session for lock operations.

use std::fmt;

use db_mutex_core::error::{MutexError, MutexResult};
use sqlx::{Connection, MySqlConnection, MySqlPool};

/// URL schemes accepted by the MySQL backend.
const MYSQL_SCHEMES: &[&str] = &["mysql", "mariadb"];

/// Where the backend's dedicated session comes from.
///
/// Whatever the source, the backend ends up owning one connection outright.
/// `GET_LOCK` ownership is tied to the session, so the connection must never
/// go back to a pool that serves unrelated queries.
pub enum MySqlConnectionSource {
    /// Connect to the primary using a connection string.
    ConnectionString(String),
    /// Check a connection out of an existing pool and detach it.
    Pool(MySqlPool),
    /// Use an already-open connection.
    Connection(MySqlConnection),
}

impl MySqlConnectionSource {
    /// Opens (or takes) the dedicated connection.
    ///
    /// Fails with [`MutexError::Configuration`] before connecting if the
    /// connection string does not point at MySQL.
    pub async fn open(self) -> MutexResult<MySqlConnection> {
        match self {
            Self::ConnectionString(url) => {
                ensure_mysql_url(&url)?;
                MySqlConnection::connect(&url)
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

/// Checks that `url` names a MySQL-compatible driver.
pub fn ensure_mysql_url(url: &str) -> MutexResult<()> {
    let scheme = url
        .split_once(':')
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .unwrap_or_default();

    if MYSQL_SCHEMES.contains(&scheme.as_str()) {
        Ok(())
    } else {
        Err(MutexError::Configuration(format!(
            "the MySQL backend needs a MySQL connection, got a '{scheme}' connection string"
        )))
    }
}

impl fmt::Debug for MySqlConnectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionString(_) => {
                write!(f, "MySqlConnectionSource::ConnectionString([REDACTED])")
            }
            Self::Pool(_) => write!(f, "MySqlConnectionSource::Pool([POOL])"),
            Self::Connection(_) => write!(f, "MySqlConnectionSource::Connection([CONNECTION])"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mysql_schemes_accepted() {
        assert!(ensure_mysql_url("mysql://root@localhost/app").is_ok());
        assert!(ensure_mysql_url("MySQL://root@localhost/app").is_ok());
        assert!(ensure_mysql_url("mariadb://root@localhost/app").is_ok());
    }

    #[test]
    fn test_other_drivers_rejected() {
        for url in [
            "postgres://localhost/app",
            "sqlite::memory:",
            "redis://localhost",
            "localhost:3306",
        ] {
            let err = ensure_mysql_url(url).unwrap_err();
            assert!(matches!(err, MutexError::Configuration(_)), "{url}");
        }
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let source = MySqlConnectionSource::ConnectionString("mysql://root:secret@db/app".into());
        assert!(!format!("{source:?}").contains("secret"));
    }
}
