//! Configuration file discovery
//!
//! Values are resolved in priority order:
//! 1. CLI arguments
//! 2. Environment variables
//! 3. Config file (explicit path or one of the standard locations)
//! 4. Built-in defaults

use std::env;
use std::fs;
use std::path::PathBuf;

use log::debug;
use serde::de::DeserializeOwned;

use crate::APP_NAME;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Where a configuration file was found
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Path given on the command line or through the config env var
    Explicit(PathBuf),
    /// Found in the working directory
    CurrentDir(PathBuf),
    /// Found under $XDG_CONFIG_HOME/pondcast/
    XdgConfig(PathBuf),
    /// Found under /etc/pondcast/
    System(PathBuf),
    /// Nothing found
    Defaults,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ConfigSource::Explicit(p)
            | ConfigSource::CurrentDir(p)
            | ConfigSource::XdgConfig(p)
            | ConfigSource::System(p) => Some(p),
            ConfigSource::Defaults => None,
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.path() {
            Some(p) => write!(f, "{}", p.display()),
            None => write!(f, "(defaults)"),
        }
    }
}

/// Locate `filename`, checking `env_var`, the working directory, the XDG
/// config home and finally `/etc/pondcast/`.
pub fn find_config_file(env_var: &str, filename: &str) -> ConfigSource {
    if let Ok(path) = env::var(env_var) {
        let p = PathBuf::from(path);
        if p.exists() {
            return ConfigSource::Explicit(p);
        }
        debug!("{} points at a missing file, ignoring", env_var);
    }

    let local = PathBuf::from(filename);
    if local.exists() {
        return ConfigSource::CurrentDir(local);
    }

    let xdg_path = xdg_dir("XDG_CONFIG_HOME", ".config").join(filename);
    if xdg_path.exists() {
        return ConfigSource::XdgConfig(xdg_path);
    }

    let system = PathBuf::from("/etc").join(APP_NAME).join(filename);
    if system.exists() {
        return ConfigSource::System(system);
    }

    ConfigSource::Defaults
}

fn xdg_dir(var: &str, home_fallback: &str) -> PathBuf {
    if let Ok(dir) = env::var(var) {
        PathBuf::from(dir).join(APP_NAME)
    } else if let Ok(home) = env::var("HOME") {
        PathBuf::from(home).join(home_fallback).join(APP_NAME)
    } else {
        PathBuf::from(home_fallback).join(APP_NAME)
    }
}

/// XDG data directory, used as the default archive location
pub fn get_xdg_data_dir() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", ".local/share")
}

/// XDG cache directory, used as the default download location
pub fn get_xdg_cache_dir() -> PathBuf {
    xdg_dir("XDG_CACHE_HOME", ".cache")
}

/// Parse the TOML file behind `source`, or return `T::default()` when no
/// file was found.
pub fn load_config<T: DeserializeOwned + Default>(source: &ConfigSource) -> Result<T, ConfigError> {
    let Some(path) = source.path() else {
        return Ok(T::default());
    };
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Deserialize, Default, Debug, PartialEq)]
    struct Sample {
        timezone: Option<String>,
        lead_offsets: Option<Vec<i64>>,
    }

    #[test]
    fn test_config_source_display() {
        let source = ConfigSource::CurrentDir(PathBuf::from("pondcast.toml"));
        assert_eq!(format!("{}", source), "pondcast.toml");
        assert_eq!(format!("{}", ConfigSource::Defaults), "(defaults)");
    }

    #[test]
    fn test_load_defaults_without_file() {
        let loaded: Sample = load_config(&ConfigSource::Defaults).unwrap();
        assert_eq!(loaded, Sample::default());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pondcast.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "timezone = \"UTC\"\nlead_offsets = [8, -9]").unwrap();

        let loaded: Sample = load_config(&ConfigSource::Explicit(path)).unwrap();
        assert_eq!(loaded.timezone.as_deref(), Some("UTC"));
        assert_eq!(loaded.lead_offsets, Some(vec![8, -9]));
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "timezone = ").unwrap();

        let err = load_config::<Sample>(&ConfigSource::Explicit(path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
