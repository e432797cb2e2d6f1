//! Warehouse configuration and builder pattern.
//!
//! Credentials come from the process environment (optionally seeded from a
//! `.env` file). They are never part of a session and never logged.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tablecheck_core::{Result, TableCheckError};

/// Which warehouse backend to connect to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Snowflake,
    Sqlite,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Snowflake => write!(f, "snowflake"),
            BackendKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = TableCheckError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snowflake" => Ok(BackendKind::Snowflake),
            "sqlite" => Ok(BackendKind::Sqlite),
            other => Err(TableCheckError::Config(format!(
                "Unknown backend '{}' (expected snowflake or sqlite)",
                other
            ))),
        }
    }
}

/// Configuration for warehouse connections.
///
/// # Security
///
/// The `Debug` implementation masks the password. It is shown as
/// `"***REDACTED***"` in debug output.
#[derive(Clone)]
pub struct WarehouseConfig {
    pub backend: BackendKind,
    /// Warehouse login name
    pub user: Option<String>,
    /// Warehouse password
    pub password: Option<String>,
    /// Snowflake account identifier (e.g. "xy12345.eu-west-1")
    pub account: Option<String>,
    /// Base URL override; defaults to `https://{account}.snowflakecomputing.com`
    pub endpoint: Option<String>,
    /// Per-request timeout, including result polling (default: 120 seconds)
    pub query_timeout: Duration,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Snowflake,
            user: None,
            password: None,
            account: None,
            endpoint: None,
            query_timeout: Duration::from_secs(120),
        }
    }
}

impl fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("backend", &self.backend)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***REDACTED***"))
            .field("account", &self.account)
            .field("endpoint", &self.endpoint)
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}

impl WarehouseConfig {
    /// Minimum allowed timeout value.
    pub const MIN_TIMEOUT: Duration = Duration::from_secs(1);

    /// Create a new configuration builder.
    pub fn builder(backend: BackendKind) -> WarehouseConfigBuilder {
        WarehouseConfigBuilder::new(backend)
    }

    /// Load from the process environment after reading an optional `.env`.
    ///
    /// Variables:
    /// - `TABLECHECK_BACKEND`: `snowflake` (default) or `sqlite`
    /// - `SNOWFLAKE_USER` or `USER`
    /// - `SNOWFLAKE_PASSWORD` or `PASSWORD`
    /// - `SNOWFLAKE_ACCOUNT` or `ACCOUNT`
    /// - `SNOWFLAKE_URL`: optional base URL override
    /// - `TABLECHECK_QUERY_TIMEOUT_SECS`: default 120
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter()
                .find_map(|&k| lookup(k).filter(|v| !v.trim().is_empty()))
        };

        let backend = match get(&["TABLECHECK_BACKEND"]) {
            Some(b) => b.parse()?,
            None => BackendKind::default(),
        };

        let query_timeout = match get(&["TABLECHECK_QUERY_TIMEOUT_SECS"]) {
            Some(secs) => Duration::from_secs(secs.trim().parse().map_err(|_| {
                TableCheckError::Config(format!(
                    "TABLECHECK_QUERY_TIMEOUT_SECS must be a whole number of seconds, got '{}'",
                    secs
                ))
            })?),
            None => WarehouseConfig::default().query_timeout,
        };

        let config = Self {
            backend,
            user: get(&["SNOWFLAKE_USER", "USER"]),
            password: get(&["SNOWFLAKE_PASSWORD", "PASSWORD"]),
            account: get(&["SNOWFLAKE_ACCOUNT", "ACCOUNT"]),
            endpoint: get(&["SNOWFLAKE_URL"]),
            query_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Base URL of the Snowflake service.
    pub fn base_url(&self) -> Result<String> {
        if let Some(endpoint) = &self.endpoint {
            return Ok(endpoint.trim_end_matches('/').to_string());
        }
        let account = self
            .account
            .as_deref()
            .ok_or_else(|| TableCheckError::Config("account is required".to_string()))?;
        Ok(format!("https://{}.snowflakecomputing.com", account))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.query_timeout < Self::MIN_TIMEOUT {
            return Err(TableCheckError::Config(format!(
                "query_timeout ({:?}) must be >= {:?}",
                self.query_timeout,
                Self::MIN_TIMEOUT
            )));
        }

        if self.backend == BackendKind::Sqlite {
            return Ok(());
        }

        for (value, var) in [
            (&self.user, "SNOWFLAKE_USER"),
            (&self.password, "SNOWFLAKE_PASSWORD"),
            (&self.account, "SNOWFLAKE_ACCOUNT"),
        ] {
            if value.as_deref().map_or(true, str::is_empty) {
                return Err(TableCheckError::Config(format!(
                    "{} is required for the snowflake backend",
                    var
                )));
            }
        }

        let base = self.base_url()?;
        url::Url::parse(&base)
            .map_err(|e| TableCheckError::Config(format!("Invalid warehouse URL: {}", e)))?;

        Ok(())
    }
}

/// Builder for warehouse configuration.
#[derive(Debug)]
pub struct WarehouseConfigBuilder {
    config: WarehouseConfig,
}

impl WarehouseConfigBuilder {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            config: WarehouseConfig {
                backend,
                ..Default::default()
            },
        }
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.config.user = Some(user.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.config.account = Some(account.into());
        self
    }

    /// Override the service URL (proxies, private links, test servers).
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = Some(endpoint.into());
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.config.query_timeout = timeout;
        self
    }

    /// Build the configuration, validating all settings.
    pub fn build(self) -> Result<WarehouseConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
