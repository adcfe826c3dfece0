pub mod localfs;
pub mod memory;
pub mod sqlite;

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::song::{SongFilter, SongMeta};

pub use localfs::LocalFs;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no song found for id {0:?}")]
    NotFound(String),
    #[error("id {0:?} already in use")]
    AlreadyExists(String),
    #[error("invalid song id {0:?}")]
    InvalidId(String),
    #[error("{op} failed for {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed metadata in {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("encoding metadata failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("search index: {0}")]
    Search(#[from] crate::search::SearchError),
}

impl StoreError {
    pub(crate) fn io(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Durable CRUD over songs and their chord sheets.
///
/// Implementations do not assign ids; `create_song` receives a record whose
/// id has already been chosen and validated by the caller.
pub trait SongStore: Send + Sync {
    /// Distinct non-empty artist names, in no particular order.
    fn artists(&self) -> Result<Vec<String>>;

    /// Songs matching every filter that is set, ordered by id.
    fn find_songs(&self, filter: &SongFilter) -> Result<Vec<SongMeta>>;

    fn exists(&self, id: &str) -> Result<bool>;

    /// Persist a new song with empty chords.
    fn create_song(&self, meta: &SongMeta) -> Result<SongMeta>;

    /// Overwrite the metadata of an existing song. The path id wins over `meta.id`.
    fn update_song(&self, id: &str, meta: SongMeta) -> Result<SongMeta>;

    /// Remove a song and its chords. Deleting an unknown id is not an error.
    fn delete_song(&self, id: &str) -> Result<()>;

    fn get_chords(&self, id: &str) -> Result<Vec<u8>>;

    /// Replace the chords of an existing song, returning what was stored.
    fn set_chords(&self, id: &str, chords: &[u8]) -> Result<Vec<u8>>;
}

/// Storage backend selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Non-persistent, filled with sample data
    Memory,
    /// One directory per song under the data dir
    #[default]
    #[value(name = "localfs", alias = "fs")]
    #[serde(alias = "fs")]
    LocalFs,
    /// A single SQLite database file
    Sqlite,
}

/// Open the configured backend.
pub fn open_store(backend: Backend, data_dir: &Path, sqlite_path: &Path) -> Result<Box<dyn SongStore>> {
    match backend {
        Backend::Memory => {
            log::info!("Using temporary in-memory store");
            Ok(Box::new(MemoryStore::new()))
        }
        Backend::LocalFs => {
            log::info!("Using local filesystem store at {}", data_dir.display());
            Ok(Box::new(LocalFs::open(data_dir)?))
        }
        Backend::Sqlite => {
            log::info!("Using SQLite store at {}", sqlite_path.display());
            Ok(Box::new(SqliteStore::open(sqlite_path)?))
        }
    }
}

/// Case-insensitive match against song names.
///
/// The query is tried as a regex first; anything that fails to compile is
/// matched as a literal substring instead.
pub(crate) enum NameMatcher {
    Pattern(Regex),
    Literal(String),
}

impl NameMatcher {
    pub(crate) fn new(query: &str) -> Self {
        match Regex::new(&format!("(?i){query}")) {
            Ok(re) => Self::Pattern(re),
            Err(e) => {
                log::warn!("Query {query:?} is not a valid pattern ({e}), matching it literally");
                Self::Literal(query.to_lowercase())
            }
        }
    }

    pub(crate) fn from_filter(filter: &SongFilter) -> Option<Self> {
        filter.query().map(Self::new)
    }

    pub(crate) fn matches(&self, name: &str) -> bool {
        match self {
            Self::Pattern(re) => re.is_match(name),
            Self::Literal(lit) => name.to_lowercase().contains(lit.as_str()),
        }
    }
}

/// Apply a filter to an in-memory record, including the name query.
pub(crate) fn filter_matches(filter: &SongFilter, matcher: Option<&NameMatcher>, meta: &SongMeta) -> bool {
    filter.matches_fields(meta) && matcher.is_none_or(|m| m.matches(&meta.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matcher_case_insensitive_substring() {
        let m = NameMatcher::new("pancake");
        assert!(m.matches("Banana Pancakes"));
        assert!(!m.matches("Flake"));
    }

    #[test]
    fn test_matcher_regex() {
        let m = NameMatcher::new("^ban.*s$");
        assert!(m.matches("Banana Pancakes"));
        assert!(!m.matches("Big Banana"));
    }

    #[test]
    fn test_matcher_invalid_regex_is_literal() {
        let m = NameMatcher::new("(what");
        assert!(m.matches("So (What"));
        assert!(!m.matches("So What"));
    }

    #[test]
    fn test_backend_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            backend: Backend,
        }
        let w: Wrapper = toml::from_str(r#"backend = "sqlite""#).unwrap();
        assert_eq!(w.backend, Backend::Sqlite);
        let w: Wrapper = toml::from_str(r#"backend = "fs""#).unwrap();
        assert_eq!(w.backend, Backend::LocalFs);
    }
}
