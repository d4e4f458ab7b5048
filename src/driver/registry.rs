use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ConnectOptions;
use crate::error::SqlBridgeError;

use super::Driver;

/// Explicit set of available drivers, keyed by URL scheme.
///
/// Pools resolve their driver from the registry once, at construction, and keep their own
/// `Arc` to it; dropping or changing the registry afterwards does not affect running pools.
#[derive(Debug, Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the drivers compiled into this build.
    #[must_use]
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "sqlite")]
        registry.register(super::sqlite::SqliteDriver::new());
        registry
    }

    /// Register `driver` under its scheme, replacing any previous entry.
    pub fn register<D: Driver + 'static>(&mut self, driver: D) -> &mut Self {
        self.register_arc(Arc::new(driver))
    }

    pub fn register_arc(&mut self, driver: Arc<dyn Driver>) -> &mut Self {
        let scheme = driver.scheme().to_ascii_lowercase();
        if self.drivers.insert(scheme.clone(), driver).is_some() {
            tracing::debug!(%scheme, "replaced registered driver");
        }
        self
    }

    #[must_use]
    pub fn get(&self, scheme: &str) -> Option<Arc<dyn Driver>> {
        self.drivers.get(&scheme.to_ascii_lowercase()).cloned()
    }

    /// Find the driver for `options.url`.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::ConfigError`] when the URL has no scheme or no driver is
    /// registered for it.
    pub fn resolve(&self, options: &ConnectOptions) -> Result<Arc<dyn Driver>, SqlBridgeError> {
        let scheme = options.scheme().ok_or_else(|| {
            SqlBridgeError::ConfigError(format!("connection url `{}` has no scheme", options.url))
        })?;
        self.get(&scheme).ok_or_else(|| {
            SqlBridgeError::ConfigError(format!("no driver registered for scheme `{scheme}`"))
        })
    }

    #[must_use]
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::BlockingConnection;
    use crate::error::DriverError;

    #[derive(Debug)]
    struct NullDriver;

    impl Driver for NullDriver {
        fn scheme(&self) -> &str {
            "Null"
        }

        fn connect(
            &self,
            _options: &ConnectOptions,
        ) -> Result<Box<dyn BlockingConnection>, DriverError> {
            Err(DriverError::Connect("null driver never connects".into()))
        }
    }

    #[test]
    fn resolves_by_case_insensitive_scheme() {
        let mut registry = DriverRegistry::new();
        registry.register(NullDriver);
        assert_eq!(registry.schemes(), vec!["null"]);
        assert!(registry.resolve(&ConnectOptions::new("NULL:whatever")).is_ok());

        let err = registry
            .resolve(&ConnectOptions::new("postgres://localhost"))
            .unwrap_err();
        assert!(matches!(err, SqlBridgeError::ConfigError(msg) if msg.contains("postgres")));
    }
}
