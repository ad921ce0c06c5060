//! Application configuration: locating and reading the properties file.
//!
//! The properties file is a `key=value` file (`#` starts a comment) read
//! once at startup. Keys used:
//!
//! * `application.url`: public URL of the application (optional).
//! * `vera.driver`, `vera.url`, `vera.userid`, `vera.password`,
//!   `vera.minconn`, `vera.maxconn`: the database pool. Without
//!   `vera.driver` a temporary database is used.

use crate::connection::config::ConnectionConfig;
use crate::core::{DbError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_NAME: &str = "vera.properties";
pub const POOL_NAME: &str = "vera";
const APP_DIR: &str = "conf";

/// Flat key/value view of a properties file.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    values: HashMap<String, String>,
}

impl Properties {
    pub fn load(path: &Path) -> Result<Self> {
        let iter = dotenvy::from_path_iter(path).map_err(|e| {
            DbError::ConfigError(format!("Cannot read config file {}: {}", path.display(), e))
        })?;

        let mut values = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| {
                DbError::ConfigError(format!("Malformed config file {}: {}", path.display(), e))
            })?;
            values.insert(key, value);
        }
        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// `<section>.<name>`, the layout used for pool definitions.
    pub fn section(&self, section: &str, name: &str) -> Option<&str> {
        self.get(&format!("{}.{}", section, name))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Search order for the properties file.
///
/// With an explicit name: an absolute path must exist as given; a relative
/// name is tried in the home directory, then in `<app root>/conf/`.
/// Without one: `<home>/.vera/vera.properties`, then
/// `<app root>/conf/vera.properties`.
#[derive(Debug, Clone)]
pub struct ConfigLocator {
    explicit: Option<String>,
    home: Option<PathBuf>,
    app_root: PathBuf,
}

impl ConfigLocator {
    pub fn new(app_root: impl Into<PathBuf>) -> Self {
        Self {
            explicit: None,
            home: std::env::var_os("HOME").map(PathBuf::from),
            app_root: app_root.into(),
        }
    }

    pub fn explicit(mut self, name: Option<String>) -> Self {
        self.explicit = name;
        self
    }

    pub fn home(mut self, home: Option<PathBuf>) -> Self {
        self.home = home;
        self
    }

    pub fn locate(&self) -> Result<PathBuf> {
        match &self.explicit {
            Some(name) => self.locate_named(name),
            None => self.locate_default(),
        }
    }

    fn locate_named(&self, name: &str) -> Result<PathBuf> {
        let given = Path::new(name);
        if given.is_absolute() {
            if given.exists() {
                return Ok(given.to_path_buf());
            }
            return Err(missing(given));
        }

        if let Some(home) = &self.home {
            let in_home = home.join(name);
            if in_home.exists() {
                return Ok(in_home);
            }
        }
        let in_app = self.app_root.join(APP_DIR).join(name);
        if in_app.exists() {
            return Ok(in_app);
        }
        Err(missing(&in_app))
    }

    fn locate_default(&self) -> Result<PathBuf> {
        if let Some(home) = &self.home {
            let in_home = home.join(".vera").join(DEFAULT_CONFIG_NAME);
            if in_home.exists() {
                return Ok(in_home);
            }
        }
        let in_app = self.app_root.join(APP_DIR).join(DEFAULT_CONFIG_NAME);
        if in_app.exists() {
            return Ok(in_app);
        }
        Err(missing(&in_app))
    }
}

fn missing(path: &Path) -> DbError {
    DbError::ConfigError(format!("The config file {} does not exist", path.display()))
}

/// Where the application's data lives.
#[derive(Debug, Clone)]
pub enum DatabaseSource {
    /// Pool defined in the properties file.
    Pool(ConnectionConfig),
    /// Temporary file-backed database, created on demand.
    Temporary(PathBuf),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub property_file: Option<PathBuf>,
    pub application_url: Option<String>,
    pub database: DatabaseSource,
}

impl AppConfig {
    pub fn load(locator: &ConfigLocator) -> Result<Self> {
        let path = locator.locate()?;
        let properties = Properties::load(&path)?;
        let mut config = Self::from_properties(&properties)?;
        config.property_file = Some(path);
        Ok(config)
    }

    pub fn from_properties(properties: &Properties) -> Result<Self> {
        let database = if properties.section(POOL_NAME, "driver").is_some() {
            DatabaseSource::Pool(ConnectionConfig::from_properties(properties, POOL_NAME)?)
        } else {
            DatabaseSource::Temporary(default_temp_path())
        };

        Ok(Self {
            property_file: None,
            application_url: properties.get("application.url").map(str::to_string),
            database,
        })
    }

    /// Point a temporary database somewhere else, e.g. a per-test directory.
    pub fn with_temp_path(mut self, path: impl Into<PathBuf>) -> Self {
        if let DatabaseSource::Temporary(_) = self.database {
            self.database = DatabaseSource::Temporary(path.into());
        }
        self
    }
}

pub fn default_temp_path() -> PathBuf {
    std::env::temp_dir().join("veraDB").join("data")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_properties_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vera.properties");
        fs::write(
            &path,
            "# comment\napplication.url=http://localhost:8080/vera/\nvera.driver=vera\n",
        )
        .unwrap();

        let props = Properties::load(&path).unwrap();
        assert_eq!(props.get("application.url"), Some("http://localhost:8080/vera/"));
        assert_eq!(props.section("vera", "driver"), Some("vera"));
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn test_missing_properties_file() {
        let err = Properties::load(Path::new("/nonexistent/vera.properties")).unwrap_err();
        assert!(matches!(err, DbError::ConfigError(_)));
    }

    #[test]
    fn test_without_driver_uses_temporary_database() {
        let props: Properties = [("application.url", "http://x/")].into_iter().collect();
        let config = AppConfig::from_properties(&props).unwrap();
        assert!(matches!(config.database, DatabaseSource::Temporary(_)));
        assert_eq!(config.application_url.as_deref(), Some("http://x/"));
    }

    #[test]
    fn test_with_temp_path_only_moves_temporary() {
        let props = Properties::default();
        let config = AppConfig::from_properties(&props).unwrap().with_temp_path("/tmp/elsewhere");
        match config.database {
            DatabaseSource::Temporary(path) => assert_eq!(path, PathBuf::from("/tmp/elsewhere")),
            other => panic!("expected temporary database, got {:?}", other),
        }
    }
}
