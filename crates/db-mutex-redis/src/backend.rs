//! Redis mutex backend.

use std::time::Duration;

use db_mutex_core::error::{MutexError, MutexResult};
use db_mutex_core::mutex::DbMutex;
use db_mutex_core::timeout::TimeoutValue;
use db_mutex_core::traits::{Acquisition, MutexBackend};
use fred::prelude::*;
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::token::create_owner_token;

/// A mutex backed by Redis keys.
pub type RedisMutex = DbMutex<RedisMutexBackend>;

const DEFAULT_KEY_PREFIX: &str = "db-mutex:";
const DEFAULT_EXPIRY: Duration = Duration::from_secs(30);

/// First and maximum pause between attempts while emulating a wait.
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(10);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Deletes the key only while it still carries our token.
const RELEASE_SCRIPT_LUA: &str = r#"
    if redis.call('get', KEYS[1]) == ARGV[1] then
        return redis.call('del', KEYS[1])
    end
    return 0
"#;

/// URL schemes fred understands.
const REDIS_SCHEMES: &[&str] = &[
    "redis",
    "rediss",
    "redis-cluster",
    "rediss-cluster",
    "redis-sentinel",
    "rediss-sentinel",
];

/// Checks that `url` names a Redis deployment.
pub fn ensure_redis_url(url: &str) -> MutexResult<()> {
    let scheme = url
        .split_once(':')
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .unwrap_or_default();

    if REDIS_SCHEMES.contains(&scheme.as_str()) {
        Ok(())
    } else {
        Err(MutexError::Configuration(format!(
            "the Redis backend needs a Redis connection, got a '{scheme}' connection string"
        )))
    }
}

fn redis_error(context: &str, e: RedisError) -> MutexError {
    MutexError::backend(std::io::Error::other(format!("{context}: {e}")))
}

/// Builder for Redis backend configuration.
pub struct RedisMutexBackendBuilder {
    url: Option<String>,
    client: Option<RedisClient>,
    key_prefix: String,
    expiry: Duration,
}

impl RedisMutexBackendBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            url: None,
            client: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            expiry: DEFAULT_EXPIRY,
        }
    }

    /// Sets the URL of the primary Redis server.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Uses an existing, connected client. Takes precedence over `url`.
    pub fn client(mut self, client: RedisClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Sets the prefix prepended to lock names to form keys.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Sets how long a lock key lives if it is never released.
    ///
    /// Redis has no sessions, so this bounds how long a crashed holder can
    /// keep a lock. Locks are not renewed.
    pub fn expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    /// Builds the backend.
    pub async fn build(self) -> MutexResult<RedisMutexBackend> {
        if self.expiry.is_zero() {
            return Err(MutexError::Configuration(
                "Redis lock expiry must be positive".to_string(),
            ));
        }

        let client = match (self.client, self.url) {
            (Some(client), _) => client,
            (None, Some(url)) => {
                ensure_redis_url(&url)?;
                let config = RedisConfig::from_url(&url).map_err(|e| {
                    MutexError::Configuration(format!("invalid Redis URL: {e}"))
                })?;

                let client = RedisClient::new(config, None, None, None);
                client.connect();
                client
                    .wait_for_connect()
                    .await
                    .map_err(|e| redis_error("failed to connect to Redis", e))?;
                client
            }
            (None, None) => {
                return Err(MutexError::Configuration(
                    "no Redis client or URL provided".to_string(),
                ));
            }
        };

        Ok(RedisMutexBackend {
            client,
            key_prefix: self.key_prefix,
            expiry: self.expiry,
            token: create_owner_token(),
        })
    }
}

impl Default for RedisMutexBackendBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Redis implementation of [`MutexBackend`].
///
/// `SET key token NX PX expiry` takes the lock. Redis cannot wait for a key
/// to disappear, so a positive timeout is emulated by retrying with capped
/// exponential backoff until the deadline; a zero timeout is one attempt.
///
/// Release only deletes keys that still carry this backend's token. A lock
/// that expired (or was taken over) before release reports `false`.
pub struct RedisMutexBackend {
    client: RedisClient,
    key_prefix: String,
    expiry: Duration,
    token: String,
}

impl RedisMutexBackend {
    /// Returns a new builder for configuring the backend.
    pub fn builder() -> RedisMutexBackendBuilder {
        RedisMutexBackendBuilder::new()
    }

    /// Creates a backend connected to the specified primary.
    pub async fn new(url: impl Into<String>) -> MutexResult<Self> {
        Self::builder().url(url).build().await
    }

    /// The value this backend stores in the keys it owns.
    pub fn token(&self) -> &str {
        &self.token
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.key_prefix, name)
    }

    async fn try_set(&self, key: &str) -> MutexResult<bool> {
        let expiry_millis = i64::try_from(self.expiry.as_millis()).unwrap_or(i64::MAX);

        // SET NX answers OK when the key was written and nil otherwise.
        let result: Option<String> = self
            .client
            .set(
                key,
                self.token.as_str(),
                Some(Expiration::PX(expiry_millis)),
                Some(SetOptions::NX),
                false,
            )
            .await
            .map_err(|e| redis_error("Redis SET NX failed", e))?;

        Ok(result.is_some())
    }
}

/// When an emulated wait gives up. `None` means the timeout is too large to
/// be represented as an instant, so the wait never gives up.
fn wait_deadline(now: Instant, timeout: TimeoutValue) -> Option<Instant> {
    now.checked_add(timeout.as_duration())
}

/// How long to sleep before the next attempt, or `None` once the deadline
/// has passed.
fn retry_pause(deadline: Option<Instant>, now: Instant, delay: Duration) -> Option<Duration> {
    match deadline {
        Some(deadline) if now >= deadline => None,
        Some(deadline) => Some(delay.min(deadline - now)),
        None => Some(delay),
    }
}

impl MutexBackend for RedisMutexBackend {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    #[instrument(skip(self), fields(lock.name = %name, backend = "redis"))]
    async fn acquire_lock(&self, name: &str, timeout: TimeoutValue) -> MutexResult<Acquisition> {
        let key = self.key(name);
        let deadline = wait_deadline(Instant::now(), timeout);
        let mut delay = INITIAL_RETRY_DELAY;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            if self.try_set(&key).await? {
                debug!(attempts, "lock key written");
                return Ok(Acquisition::Acquired);
            }

            let Some(pause) = retry_pause(deadline, Instant::now(), delay) else {
                debug!(attempts, "lock key still held at deadline");
                return Ok(Acquisition::TimedOut);
            };

            tokio::time::sleep(pause).await;
            delay = (delay * 2).min(MAX_RETRY_DELAY);
        }
    }

    #[instrument(skip(self), fields(lock.name = %name, backend = "redis"))]
    async fn release_lock(&self, name: &str) -> MutexResult<bool> {
        let key = self.key(name);

        let deleted: i64 = self
            .client
            .eval(RELEASE_SCRIPT_LUA, vec![key], vec![self.token.clone()])
            .await
            .map_err(|e| redis_error("Redis release script failed", e))?;

        debug!(deleted, "release script returned");
        Ok(deleted == 1)
    }
}
