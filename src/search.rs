//! In-memory prefix search over song and artist names.
//!
//! The index holds no durable state; it is rebuilt from the store at startup
//! and kept roughly in sync by the library on every mutation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::ops::Bound;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

use crate::song::SongMeta;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("cannot index a song without an id")]
    MissingId,
    #[error("search index lock poisoned")]
    Poisoned,
}

/// One indexed document: a song (by id) or an artist (by name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocKey {
    Artist(String),
    Song(String),
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocKey::Artist(name) => write!(f, "artist/{name}"),
            DocKey::Song(id) => write!(f, "song/{id}"),
        }
    }
}

#[derive(Default)]
struct Inner {
    /// token -> documents containing it, sorted so prefixes are a range scan
    terms: BTreeMap<String, BTreeSet<DocKey>>,
    /// document -> its tokens, for removal
    docs: HashMap<DocKey, Vec<String>>,
}

impl Inner {
    fn insert(&mut self, key: DocKey, text: &str) {
        self.remove(&key);
        let tokens: Vec<String> = tokenize(text).collect::<BTreeSet<_>>().into_iter().collect();
        for token in &tokens {
            self.terms.entry(token.clone()).or_default().insert(key.clone());
        }
        self.docs.insert(key, tokens);
    }

    fn remove(&mut self, key: &DocKey) -> bool {
        let Some(tokens) = self.docs.remove(key) else {
            return false;
        };
        for token in tokens {
            if let Some(keys) = self.terms.get_mut(&token) {
                keys.remove(key);
                if keys.is_empty() {
                    self.terms.remove(&token);
                }
            }
        }
        true
    }

    /// Documents with a token starting with `prefix`, and whether the match was exact.
    fn prefix_matches(&self, prefix: &str) -> HashMap<&DocKey, bool> {
        let mut found: HashMap<&DocKey, bool> = HashMap::new();
        for (token, keys) in self.terms.range::<str, _>((Bound::Included(prefix), Bound::Unbounded)) {
            if !token.starts_with(prefix) {
                break;
            }
            let exact = token == prefix;
            for key in keys {
                let e = found.entry(key).or_insert(false);
                *e |= exact;
            }
        }
        found
    }
}

/// Lower-cased alphanumeric runs.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[derive(Default)]
pub struct SearchIndex {
    inner: RwLock<Inner>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, SearchError> {
        self.inner.read().map_err(|_| SearchError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, SearchError> {
        self.inner.write().map_err(|_| SearchError::Poisoned)
    }

    /// Add or replace the document for a song, plus one for its artist if new.
    pub fn index_song(&self, meta: &SongMeta) -> Result<(), SearchError> {
        if meta.id.is_empty() {
            return Err(SearchError::MissingId);
        }
        let text = format!("{} {} {}", meta.name, meta.artist, meta.album);

        let mut inner = self.write()?;
        inner.insert(DocKey::Song(meta.id.clone()), &text);
        if !meta.artist.is_empty() {
            let artist = DocKey::Artist(meta.artist.clone());
            if !inner.docs.contains_key(&artist) {
                inner.insert(artist, &meta.artist);
            }
        }
        Ok(())
    }

    /// Drop a song's document. Its artist document stays until the next rebuild.
    pub fn remove_song(&self, id: &str) -> Result<(), SearchError> {
        self.write()?.remove(&DocKey::Song(id.to_string()));
        Ok(())
    }

    /// Poison the lock by panicking while holding it.
    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let _ = std::thread::scope(|s| {
            s.spawn(|| {
                let _guard = self.inner.write();
                panic!("search index poisoned on purpose");
            })
            .join()
        });
    }

    pub fn clear(&self) -> Result<(), SearchError> {
        *self.write()? = Inner::default();
        Ok(())
    }

    pub fn len(&self) -> Result<usize, SearchError> {
        Ok(self.read()?.docs.len())
    }

    pub fn is_empty(&self) -> Result<bool, SearchError> {
        Ok(self.len()? == 0)
    }

    /// Documents matching every query term as a prefix of one of their tokens.
    ///
    /// Ordered by the number of terms that matched a whole token, then artists
    /// before songs, then by key.
    pub fn search(&self, query: &str) -> Result<Vec<DocKey>, SearchError> {
        let terms: BTreeSet<String> = query
            .split_whitespace()
            .flat_map(tokenize)
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let inner = self.read()?;
        let mut scores: Option<HashMap<&DocKey, usize>> = None;
        for term in &terms {
            let matches = inner.prefix_matches(term);
            scores = Some(match scores {
                None => matches
                    .into_iter()
                    .map(|(key, exact)| (key, usize::from(exact)))
                    .collect(),
                Some(prev) => prev
                    .into_iter()
                    .filter_map(|(key, score)| {
                        matches.get(key).map(|exact| (key, score + usize::from(*exact)))
                    })
                    .collect(),
            });
        }

        let mut hits: Vec<(&DocKey, usize)> = scores.unwrap_or_default().into_iter().collect();
        hits.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        Ok(hits.into_iter().map(|(key, _)| key.clone()).collect())
    }
}
