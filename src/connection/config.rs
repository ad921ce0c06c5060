use crate::config::Properties;
use crate::core::{DbError, Result};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// The only storage driver built into this crate.
pub const DRIVER_NAME: &str = "vera";

const URL_PREFIX: &str = "vera:";

/// Location of a database.
///
/// Format: `vera:mem:<name>` or `vera:file:<directory>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageUrl {
    Memory(String),
    File(PathBuf),
}

impl StorageUrl {
    pub fn parse(url: &str) -> std::result::Result<Self, String> {
        let rest = url
            .strip_prefix(URL_PREFIX)
            .ok_or_else(|| format!("URL must start with '{}'", URL_PREFIX))?;

        if let Some(name) = rest.strip_prefix("mem:") {
            if name.is_empty() {
                return Err("In-memory URL needs a database name".to_string());
            }
            return Ok(Self::Memory(name.to_string()));
        }
        if let Some(path) = rest.strip_prefix("file:") {
            if path.is_empty() {
                return Err("File URL needs a directory".to_string());
            }
            return Ok(Self::File(PathBuf::from(path)));
        }
        Err(format!("Unknown storage kind in '{}'", url))
    }
}

impl fmt::Display for StorageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory(name) => write!(f, "{}mem:{}", URL_PREFIX, name),
            Self::File(path) => write!(f, "{}file:{}", URL_PREFIX, path.display()),
        }
    }
}

/// Database pool configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Where the data lives
    pub url: StorageUrl,

    /// User id recorded on connections
    pub username: String,

    /// Password (may be empty)
    pub password: String,

    /// How long `get_connection` waits for a free connection
    pub connect_timeout: Duration,

    /// Maximum number of connections in pool
    pub max_connections: usize,

    /// Minimum number of connections in pool
    pub min_connections: usize,

    /// Connection idle timeout
    pub idle_timeout: Option<Duration>,

    /// Maximum connection lifetime
    pub max_lifetime: Option<Duration>,
}

impl ConnectionConfig {
    pub fn new(url: StorageUrl) -> Self {
        Self {
            url,
            username: "sa".to_string(),
            password: String::new(),
            connect_timeout: Duration::from_secs(30),
            max_connections: 10,
            min_connections: 1,
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
        }
    }

    pub fn memory(name: &str) -> Self {
        Self::new(StorageUrl::Memory(name.to_string()))
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(StorageUrl::File(path.into()))
    }

    pub fn from_url(url: &str) -> std::result::Result<Self, String> {
        StorageUrl::parse(url).map(Self::new)
    }

    /// Read the pool `<pool>.*` keys: `driver`, `url`, `userid`, `password`,
    /// `minconn`, `maxconn`.
    pub fn from_properties(properties: &Properties, pool: &str) -> Result<Self> {
        let driver = properties.section(pool, "driver").ok_or_else(|| {
            DbError::ConfigError(format!("Pool '{}' has no '{}.driver'", pool, pool))
        })?;
        if driver != DRIVER_NAME {
            return Err(DbError::StorageUnavailable(format!(
                "No storage driver named '{}' (pool '{}')",
                driver, pool
            )));
        }

        let url = properties.section(pool, "url").ok_or_else(|| {
            DbError::ConfigError(format!("Pool '{}' has no '{}.url'", pool, pool))
        })?;
        let mut config = Self::from_url(url)
            .map_err(|e| DbError::ConfigError(format!("Pool '{}': {}", pool, e)))?;

        if let Some(user) = properties.section(pool, "userid") {
            config.username = user.to_string();
        }
        if let Some(password) = properties.section(pool, "password") {
            config.password = password.to_string();
        }
        if let Some(raw) = properties.section(pool, "minconn") {
            config.min_connections = parse_count(pool, "minconn", raw)?;
        }
        if let Some(raw) = properties.section(pool, "maxconn") {
            config.max_connections = parse_count(pool, "maxconn", raw)?;
        }

        config
            .validate()
            .map_err(|e| DbError::ConfigError(format!("Pool '{}': {}", pool, e)))?;
        Ok(config)
    }

    pub fn username(mut self, username: &str) -> Self {
        self.username = username.to_string();
        self
    }

    pub fn password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: usize) -> Self {
        self.min_connections = min;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    pub fn to_url(&self) -> String {
        self.url.to_string()
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.username.is_empty() {
            return Err("Username cannot be empty".to_string());
        }

        if self.max_connections == 0 {
            return Err("max_connections must be > 0".to_string());
        }

        if self.min_connections > self.max_connections {
            return Err("min_connections cannot exceed max_connections".to_string());
        }

        Ok(())
    }
}

impl fmt::Display for ConnectionConfig {
    /// Never shows the password.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (user '{}', password ***)", self.url, self.username)
    }
}

fn parse_count(pool: &str, key: &str, raw: &str) -> Result<usize> {
    raw.trim().parse().map_err(|_| {
        DbError::ConfigError(format!("Pool '{}': '{}.{}' must be a number, got '{}'", pool, pool, key, raw))
    })
}
