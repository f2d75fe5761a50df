// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
enum Source {
    Process,
    Map(HashMap<String, String>),
}

/// Environment variable loader
///
/// Reads from the process environment, or from a fixed map so callers can
/// exercise configuration code without mutating global state.
#[derive(Debug, Clone)]
pub struct EnvLoader {
    prefix: Option<String>,
    source: Source,
}

impl EnvLoader {
    /// Create a loader over the process environment
    pub fn new(prefix: Option<String>) -> Self {
        Self {
            prefix,
            source: Source::Process,
        }
    }

    /// Create a loader over a fixed set of variables
    pub fn from_map<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix: None,
            source: Source::Map(
                vars.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Set the variable prefix (`PREFIX_KEY`)
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Load variables from a `.env` file into the process environment
    ///
    /// A missing default `.env` is not an error; an explicit path that
    /// cannot be read is.
    pub fn load_dotenv(path: Option<&str>) -> Result<()> {
        match path {
            Some(path) => dotenvy::from_path(path)
                .map(|_| ())
                .map_err(|e| ConfigError::LoadError(e.to_string())),
            None => {
                dotenvy::dotenv().ok();
                Ok(())
            }
        }
    }

    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, key.to_uppercase()),
            None => key.to_uppercase(),
        }
    }

    fn raw(&self, full_key: &str) -> Option<String> {
        match &self.source {
            Source::Process => env::var(full_key).ok(),
            Source::Map(vars) => vars.get(full_key).cloned(),
        }
    }

    /// Load every variable under the prefix, keyed by lowercase name
    /// without the prefix
    pub fn load(&self) -> HashMap<String, String> {
        let vars: Vec<(String, String)> = match &self.source {
            Source::Process => env::vars().collect(),
            Source::Map(vars) => vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };

        vars.into_iter()
            .filter_map(|(key, value)| match &self.prefix {
                Some(prefix) => key
                    .strip_prefix(prefix.as_str())
                    .map(|rest| (rest.trim_start_matches('_').to_lowercase(), value)),
                None => Some((key.to_lowercase(), value)),
            })
            .collect()
    }

    /// Get a variable; blank values count as unset
    pub fn var(&self, key: &str) -> Option<String> {
        self.raw(&self.full_key(key))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Get a required variable
    pub fn require(&self, key: &str) -> Result<String> {
        self.var(key)
            .ok_or_else(|| ConfigError::KeyNotFound(self.full_key(key)))
    }

    /// Get a variable with a default value
    pub fn var_or(&self, key: &str, default: &str) -> String {
        self.var(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a variable into `T`, if set
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.var(key)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| ConfigError::ParseError {
                    key: self.full_key(key),
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    /// Parse a boolean flag (`1/0`, `true/false`, `yes/no`, `on/off`), if set
    pub fn flag(&self, key: &str) -> Result<Option<bool>> {
        self.var(key)
            .map(|raw| match raw.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::ParseError {
                    key: self.full_key(key),
                    message: format!("'{}' is not a boolean", raw),
                }),
            })
            .transpose()
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_or_default() {
        let loader = EnvLoader::from_map([("PRESENT", "value")]);
        assert_eq!(loader.var_or("missing", "default"), "default");
        assert_eq!(loader.var_or("present", "default"), "value");
    }

    #[test]
    fn test_blank_is_unset() {
        let loader = EnvLoader::from_map([("DB_HOST", "   ")]);
        assert_eq!(loader.var("DB_HOST"), None);
        assert!(matches!(
            loader.require("DB_HOST"),
            Err(ConfigError::KeyNotFound(key)) if key == "DB_HOST"
        ));
    }

    #[test]
    fn test_prefix() {
        let loader =
            EnvLoader::from_map([("APP_DB_PORT", "6543"), ("OTHER", "x")]).with_prefix("APP");
        assert_eq!(loader.parse::<u16>("db_port").unwrap(), Some(6543));

        let all = loader.load();
        assert_eq!(all.get("db_port"), Some(&"6543".to_string()));
        assert!(!all.contains_key("other"));
    }

    #[test]
    fn test_parse_error_names_key() {
        let loader = EnvLoader::from_map([("DB_POOL_MAX", "lots")]);
        let err = loader.parse::<u32>("DB_POOL_MAX").unwrap_err();
        assert!(err.to_string().contains("DB_POOL_MAX"));
    }

    #[test]
    fn test_flags() {
        let loader = EnvLoader::from_map([("A", "TRUE"), ("B", "0"), ("C", "maybe")]);
        assert_eq!(loader.flag("A").unwrap(), Some(true));
        assert_eq!(loader.flag("B").unwrap(), Some(false));
        assert_eq!(loader.flag("D").unwrap(), None);
        assert!(loader.flag("C").is_err());
    }

    #[test]
    fn test_process_env_path() {
        // PATH is set on practically every system
        let loader = EnvLoader::new(None);
        if std::env::var("PATH").is_ok() {
            assert!(loader.var("PATH").is_some());
        }
    }
}
