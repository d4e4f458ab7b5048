use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::SqlBridgeError;

/// Where and how to open physical connections.
///
/// The URL scheme (`sqlite:`, ...) picks the driver from the [`DriverRegistry`](crate::driver::DriverRegistry);
/// the remainder is handed to that driver untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectOptions {
    pub url: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Driver-specific settings (e.g. `busy_timeout_ms` for SQLite).
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl ConnectOptions {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user: None,
            password: None,
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Scheme part of the URL, lowercased (`"sqlite"` for `sqlite:file:db?mode=memory`).
    #[must_use]
    pub fn scheme(&self) -> Option<String> {
        let (scheme, _) = self.url.split_once(':')?;
        if scheme.is_empty() {
            None
        } else {
            Some(scheme.to_ascii_lowercase())
        }
    }

    /// URL with the scheme prefix removed.
    #[must_use]
    pub fn target(&self) -> &str {
        self.url
            .split_once(':')
            .map_or(self.url.as_str(), |(_, rest)| rest)
    }

    pub(crate) fn validate(&self) -> Result<(), SqlBridgeError> {
        if self.url.trim().is_empty() {
            return Err(SqlBridgeError::ConfigError("connection url is empty".into()));
        }
        if self.scheme().is_none() {
            return Err(SqlBridgeError::ConfigError(format!(
                "connection url `{}` has no scheme",
                self.url
            )));
        }
        Ok(())
    }
}

/// Sizing and waiting policy for a [`Pool`](crate::client::Pool).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    /// Upper bound on physical connections.
    pub max_size: usize,
    /// How long `acquire` may wait in the queue; `None` waits indefinitely.
    #[serde(rename = "connection_timeout_ms", with = "opt_millis")]
    pub connection_timeout: Option<Duration>,
    /// Reject new waiters once this many are queued; `None` is unbounded.
    pub max_wait_queue_size: Option<usize>,
    /// Blocking worker slots; defaults to `max_size`.
    pub worker_pool_size: Option<usize>,
    /// Idle connections unused for longer than this are discarded on the next acquire.
    #[serde(rename = "idle_timeout_ms", with = "opt_millis")]
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_size: 4,
            connection_timeout: None,
            max_wait_queue_size: None,
            worker_pool_size: None,
            idle_timeout: None,
        }
    }
}

impl PoolOptions {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn builder() -> PoolOptionsBuilder {
        PoolOptionsBuilder::default()
    }

    #[must_use]
    pub fn effective_worker_pool_size(&self) -> usize {
        self.worker_pool_size.unwrap_or(self.max_size)
    }

    pub(crate) fn validate(&self) -> Result<(), SqlBridgeError> {
        if self.max_size == 0 {
            return Err(SqlBridgeError::ConfigError(
                "max_size must be greater than zero".into(),
            ));
        }
        if self.worker_pool_size == Some(0) {
            return Err(SqlBridgeError::ConfigError(
                "worker_pool_size must be greater than zero".into(),
            ));
        }
        if self.connection_timeout == Some(Duration::ZERO) {
            return Err(SqlBridgeError::ConfigError(
                "connection_timeout must be greater than zero".into(),
            ));
        }
        let workers = self.effective_worker_pool_size();
        if workers < self.max_size {
            tracing::warn!(
                workers,
                max_size = self.max_size,
                "worker pool smaller than max_size; leased connections may wait for a worker"
            );
        }
        Ok(())
    }
}

/// Fluent builder for [`PoolOptions`].
#[derive(Debug, Clone, Default)]
pub struct PoolOptionsBuilder {
    opts: PoolOptions,
}

impl PoolOptionsBuilder {
    #[must_use]
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.opts.max_size = max_size;
        self
    }

    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.opts.connection_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn max_wait_queue_size(mut self, size: usize) -> Self {
        self.opts.max_wait_queue_size = Some(size);
        self
    }

    #[must_use]
    pub fn worker_pool_size(mut self, size: usize) -> Self {
        self.opts.worker_pool_size = Some(size);
        self
    }

    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.opts.idle_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn finish(self) -> PoolOptions {
        self.opts
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
