//! PostgreSQL mutex backend using session-level advisory locks.

use db_mutex_core::error::{MutexError, MutexResult};
use db_mutex_core::mutex::DbMutex;
use db_mutex_core::timeout::TimeoutValue;
use db_mutex_core::traits::{Acquisition, MutexBackend};
use sqlx::{Connection, PgConnection, PgPool};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::connection::PostgresConnectionSource;
use crate::key::PostgresAdvisoryLockKey;

/// SQLSTATE raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// A mutex backed by PostgreSQL advisory locks.
pub type PostgresMutex = DbMutex<PostgresMutexBackend>;

/// Builder for PostgreSQL backend configuration.
pub struct PostgresMutexBackendBuilder {
    connection: Option<PostgresConnectionSource>,
    allow_hashing: bool,
}

impl PostgresMutexBackendBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            connection: None,
            allow_hashing: true,
        }
    }

    /// Sets the connection string of the primary server.
    pub fn connection_string(mut self, conn_str: impl Into<String>) -> Self {
        self.connection = Some(PostgresConnectionSource::ConnectionString(conn_str.into()));
        self
    }

    /// Detaches a dedicated connection from an existing pool.
    pub fn pool(mut self, pool: PgPool) -> Self {
        self.connection = Some(PostgresConnectionSource::Pool(pool));
        self
    }

    /// Uses an already-open connection to the primary.
    pub fn connection(mut self, connection: PgConnection) -> Self {
        self.connection = Some(PostgresConnectionSource::Connection(connection));
        self
    }

    /// Sets whether names that have no direct key encoding are hashed.
    ///
    /// Enabled by default. When disabled such names fail validation.
    pub fn allow_hashing(mut self, allow_hashing: bool) -> Self {
        self.allow_hashing = allow_hashing;
        self
    }

    /// Builds the backend, opening its dedicated session.
    pub async fn build(self) -> MutexResult<PostgresMutexBackend> {
        let source = self.connection.ok_or_else(|| {
            MutexError::Configuration("PostgreSQL connection not specified".to_string())
        })?;

        let connection = source.open().await?;

        Ok(PostgresMutexBackend {
            connection: Mutex::new(connection),
            allow_hashing: self.allow_hashing,
        })
    }
}

impl Default for PostgresMutexBackendBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// PostgreSQL implementation of [`MutexBackend`].
///
/// Zero timeouts use `pg_try_advisory_lock`. Positive timeouts run
/// `pg_advisory_lock` inside a short transaction with a local
/// `lock_timeout`, so the wait happens on the server. The advisory lock is
/// session-scoped and outlives that transaction.
pub struct PostgresMutexBackend {
    connection: Mutex<PgConnection>,
    allow_hashing: bool,
}

impl PostgresMutexBackend {
    /// Returns a new builder for configuring the backend.
    pub fn builder() -> PostgresMutexBackendBuilder {
        PostgresMutexBackendBuilder::new()
    }

    /// Creates a backend connected to the specified primary.
    pub async fn new(connection_string: impl Into<String>) -> MutexResult<Self> {
        Self::builder()
            .connection_string(connection_string)
            .build()
            .await
    }

    async fn try_acquire(
        connection: &mut PgConnection,
        key: PostgresAdvisoryLockKey,
    ) -> MutexResult<Acquisition> {
        let acquired: Option<bool> = match key {
            PostgresAdvisoryLockKey::Single(k) => {
                sqlx::query_scalar::<_, Option<bool>>("SELECT pg_try_advisory_lock($1)")
                    .bind(k)
                    .fetch_one(&mut *connection)
                    .await
            }
            PostgresAdvisoryLockKey::Pair(k1, k2) => {
                sqlx::query_scalar::<_, Option<bool>>("SELECT pg_try_advisory_lock($1, $2)")
                    .bind(k1)
                    .bind(k2)
                    .fetch_one(&mut *connection)
                    .await
            }
        }
        .map_err(MutexError::backend)?;

        Ok(try_lock_outcome(acquired))
    }

    async fn acquire_with_wait(
        connection: &mut PgConnection,
        key: PostgresAdvisoryLockKey,
        timeout: TimeoutValue,
    ) -> MutexResult<Acquisition> {
        // lock_timeout is an int4 of milliseconds.
        let millis = timeout.as_whole_millis().min(i32::MAX as u64);

        let mut transaction = connection.begin().await.map_err(MutexError::backend)?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{millis}ms"))
            .execute(&mut *transaction)
            .await
            .map_err(MutexError::backend)?;

        let result = match key {
            PostgresAdvisoryLockKey::Single(k) => {
                sqlx::query("SELECT pg_advisory_lock($1)")
                    .bind(k)
                    .execute(&mut *transaction)
                    .await
            }
            PostgresAdvisoryLockKey::Pair(k1, k2) => {
                sqlx::query("SELECT pg_advisory_lock($1, $2)")
                    .bind(k1)
                    .bind(k2)
                    .execute(&mut *transaction)
                    .await
            }
        };

        match result {
            Ok(_) => {
                transaction.commit().await.map_err(MutexError::backend)?;
                Ok(Acquisition::Acquired)
            }
            Err(e) if is_lock_timeout(&e) => {
                transaction.rollback().await.map_err(MutexError::backend)?;
                Ok(Acquisition::TimedOut)
            }
            Err(e) => Err(MutexError::backend(e)),
        }
    }
}

/// pg_try_advisory_lock: true = granted, false or NULL = not granted.
fn try_lock_outcome(result: Option<bool>) -> Acquisition {
    Acquisition::from_flag(result)
}

/// pg_advisory_unlock: false (with a server warning) when the lock was not held.
fn unlock_outcome(result: Option<bool>) -> bool {
    result == Some(true)
}

fn is_lock_timeout(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Database(db) if db.code().as_deref() == Some(LOCK_NOT_AVAILABLE)
    )
}

impl MutexBackend for PostgresMutexBackend {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    #[instrument(skip(self), fields(lock.name = %name, backend = "postgres"))]
    async fn acquire_lock(&self, name: &str, timeout: TimeoutValue) -> MutexResult<Acquisition> {
        let key = PostgresAdvisoryLockKey::from_name(name, self.allow_hashing)?;

        let mut connection = self.connection.lock().await;
        let acquisition = if timeout.is_zero() {
            Self::try_acquire(&mut connection, key).await?
        } else {
            Self::acquire_with_wait(&mut connection, key, timeout).await?
        };

        debug!(key = ?key, acquisition = ?acquisition, "advisory lock attempt finished");
        Ok(acquisition)
    }

    #[instrument(skip(self), fields(lock.name = %name, backend = "postgres"))]
    async fn release_lock(&self, name: &str) -> MutexResult<bool> {
        let key = PostgresAdvisoryLockKey::from_name(name, self.allow_hashing)?;

        let mut connection = self.connection.lock().await;
        let released: Option<bool> = match key {
            PostgresAdvisoryLockKey::Single(k) => {
                sqlx::query_scalar::<_, Option<bool>>("SELECT pg_advisory_unlock($1)")
                    .bind(k)
                    .fetch_one(&mut *connection)
                    .await
            }
            PostgresAdvisoryLockKey::Pair(k1, k2) => {
                sqlx::query_scalar::<_, Option<bool>>("SELECT pg_advisory_unlock($1, $2)")
                    .bind(k1)
                    .bind(k2)
                    .fetch_one(&mut *connection)
                    .await
            }
        }
        .map_err(MutexError::backend)?;

        debug!(key = ?key, released = ?released, "pg_advisory_unlock returned");
        Ok(unlock_outcome(released))
    }
}
