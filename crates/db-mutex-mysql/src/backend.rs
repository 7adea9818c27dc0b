//! MySQL mutex backend using GET_LOCK/RELEASE_LOCK.

use std::borrow::Cow;

use db_mutex_core::error::{MutexError, MutexResult};
use db_mutex_core::mutex::DbMutex;
use db_mutex_core::timeout::TimeoutValue;
use db_mutex_core::traits::{Acquisition, MutexBackend};
use sqlx::{MySqlConnection, MySqlPool};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::connection::MySqlConnectionSource;
use crate::name::{MAX_NAME_LENGTH, encode_lock_name};

/// A mutex backed by MySQL user-level locks.
pub type MySqlMutex = DbMutex<MySqlMutexBackend>;

/// Builder for MySQL backend configuration.
pub struct MySqlMutexBackendBuilder {
    connection: Option<MySqlConnectionSource>,
    hash_long_names: bool,
}

impl MySqlMutexBackendBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            connection: None,
            hash_long_names: false,
        }
    }

    /// Sets the connection string of the primary server.
    pub fn connection_string(mut self, conn_str: impl Into<String>) -> Self {
        self.connection = Some(MySqlConnectionSource::ConnectionString(conn_str.into()));
        self
    }

    /// Detaches a dedicated connection from an existing pool.
    ///
    /// The pool must point at the primary.
    pub fn pool(mut self, pool: MySqlPool) -> Self {
        self.connection = Some(MySqlConnectionSource::Pool(pool));
        self
    }

    /// Uses an already-open connection to the primary.
    pub fn connection(mut self, connection: MySqlConnection) -> Self {
        self.connection = Some(MySqlConnectionSource::Connection(connection));
        self
    }

    /// Shortens names over 64 characters instead of rejecting them.
    pub fn hash_long_names(mut self, enabled: bool) -> Self {
        self.hash_long_names = enabled;
        self
    }

    /// Builds the backend, opening its dedicated session.
    pub async fn build(self) -> MutexResult<MySqlMutexBackend> {
        let source = self.connection.ok_or_else(|| {
            MutexError::Configuration("MySQL connection not specified".to_string())
        })?;

        let connection = source.open().await?;

        Ok(MySqlMutexBackend {
            connection: Mutex::new(connection),
            hash_long_names: self.hash_long_names,
        })
    }
}

impl Default for MySqlMutexBackendBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// MySQL implementation of [`MutexBackend`].
///
/// Holds one dedicated session for its whole lifetime. Every `GET_LOCK` and
/// `RELEASE_LOCK` runs on that session; closing it releases all locks taken
/// through it.
///
/// Requires MySQL 5.7+ (or MariaDB 10.0.2+), where a session may hold several
/// named locks at once.
pub struct MySqlMutexBackend {
    connection: Mutex<MySqlConnection>,
    hash_long_names: bool,
}

impl MySqlMutexBackend {
    /// Returns a new builder for configuring the backend.
    pub fn builder() -> MySqlMutexBackendBuilder {
        MySqlMutexBackendBuilder::new()
    }

    /// Creates a backend connected to the specified primary.
    pub async fn new(connection_string: impl Into<String>) -> MutexResult<Self> {
        Self::builder()
            .connection_string(connection_string)
            .build()
            .await
    }

    fn lock_name<'a>(&self, name: &'a str) -> Cow<'a, str> {
        if self.hash_long_names {
            encode_lock_name(name)
        } else {
            Cow::Borrowed(name)
        }
    }
}

impl MutexBackend for MySqlMutexBackend {
    fn backend_name(&self) -> &'static str {
        "mysql"
    }

    fn max_name_length(&self) -> Option<usize> {
        if self.hash_long_names {
            None
        } else {
            Some(MAX_NAME_LENGTH)
        }
    }

    #[instrument(skip(self), fields(lock.name = %name, backend = "mysql"))]
    async fn acquire_lock(&self, name: &str, timeout: TimeoutValue) -> MutexResult<Acquisition> {
        let lock_name = self.lock_name(name);
        // GET_LOCK takes whole seconds; 0 is a single non-blocking attempt.
        let timeout_seconds = i64::try_from(timeout.as_whole_seconds()).unwrap_or(i64::MAX);

        let mut connection = self.connection.lock().await;
        let result: Option<i64> = sqlx::query_scalar("SELECT GET_LOCK(?, ?)")
            .bind(lock_name.as_ref())
            .bind(timeout_seconds)
            .fetch_one(&mut *connection)
            .await
            .map_err(MutexError::backend)?;

        debug!(result = ?result, "GET_LOCK returned");
        Ok(get_lock_outcome(result))
    }

    #[instrument(skip(self), fields(lock.name = %name, backend = "mysql"))]
    async fn release_lock(&self, name: &str) -> MutexResult<bool> {
        let lock_name = self.lock_name(name);

        let mut connection = self.connection.lock().await;
        let result: Option<i64> = sqlx::query_scalar("SELECT RELEASE_LOCK(?)")
            .bind(lock_name.as_ref())
            .fetch_one(&mut *connection)
            .await
            .map_err(MutexError::backend)?;

        debug!(result = ?result, "RELEASE_LOCK returned");
        Ok(release_lock_outcome(result))
    }
}

/// GET_LOCK: 1 = granted, 0 = timed out, NULL = error such as a killed thread.
fn get_lock_outcome(result: Option<i64>) -> Acquisition {
    Acquisition::from_flag(result.map(|value| value == 1))
}

/// RELEASE_LOCK: 1 = released, 0 = held by another session, NULL = no such lock.
fn release_lock_outcome(result: Option<i64>) -> bool {
    result == Some(1)
}
