use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::library::DEFAULT_SEARCH_LIMIT;
use crate::store::Backend;

/// Application configuration loaded from TOML config file.
/// All fields have defaults; the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Which storage backend to use.
    pub backend: Backend,
    /// Song directory for the filesystem backend (overrides XDG default).
    pub data_dir: Option<PathBuf>,
    /// Database file for the SQLite backend (overrides XDG default).
    pub sqlite_path: Option<PathBuf>,
    /// Related-artist pairs. Defaults to `see-also.json` in the data dir.
    pub see_also_path: Option<PathBuf>,
    /// HTTP API settings.
    pub server: ServerConfig,
    /// Remote server used by `sync`, `count` and `update-chords`.
    pub remote: RemoteConfig,
}

/// HTTP API configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on.
    pub listen: String,
    /// Shared secret expected in the `Authorization` header for writes.
    pub auth_key: Option<String>,
    /// File holding the shared secret, read when `auth_key` is unset.
    pub auth_key_file: Option<PathBuf>,
    /// Maximum number of search results returned.
    pub search_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            auth_key: None,
            auth_key_file: None,
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

/// Remote server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub url: String,
    pub auth_key: Option<String>,
    pub auth_key_file: Option<PathBuf>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            auth_key: None,
            auth_key_file: None,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/chordies/config.toml`, or from `path` if given.
    /// Returns default config if the file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load(path: Option<&Path>) -> Self {
        let config_path = path.map(Path::to_path_buf).or_else(Self::config_path);
        match config_path {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match Self::parse(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn resolve_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn resolve_sqlite_path(&self) -> PathBuf {
        self.sqlite_path.clone().unwrap_or_else(default_sqlite_path)
    }

    /// See-also file: explicit path, else next to the songs in the data dir.
    pub fn resolve_see_also_path(&self, data_dir: &Path) -> PathBuf {
        self.see_also_path
            .clone()
            .unwrap_or_else(|| data_dir.join(crate::SEE_ALSO_FILE))
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// An auth key given inline, else read (trimmed) from a file.
pub fn resolve_auth_key(inline: Option<&str>, file: Option<&Path>) -> Option<String> {
    if let Some(key) = inline.filter(|k| !k.is_empty()) {
        return Some(key.to_string());
    }
    let path = file?;
    match std::fs::read_to_string(path) {
        Ok(key) => {
            log::info!("Using auth key from {}", path.display());
            Some(key.trim().to_string()).filter(|k| !k.is_empty())
        }
        Err(e) => {
            log::warn!("Couldn't read auth key from {}: {}", path.display(), e);
            None
        }
    }
}

/// Resolve the default song directory using XDG data directory.
pub fn default_data_dir() -> PathBuf {
    data_dir().join("songs")
}

/// Resolve the default database path using XDG data directory.
pub fn default_sqlite_path() -> PathBuf {
    data_dir().join("chordies.db")
}

fn data_dir() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        dirs.data_dir().to_path_buf()
    } else {
        // Fallback: current directory
        PathBuf::from("data")
    }
}
