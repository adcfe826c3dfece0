use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata for one chord sheet, as stored in `meta.json` and sent over the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SongMeta {
    pub id: String,
    pub name: String,
    pub artist: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub album: String,
    /// 0 means "not part of an album".
    #[serde(skip_serializing_if = "is_zero")]
    pub track_num: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl SongMeta {
    pub fn new(id: &str, name: &str, artist: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            artist: artist.to_string(),
            ..Default::default()
        }
    }

    pub fn with_album(mut self, album: &str, track_num: u32) -> Self {
        self.album = album.to_string();
        self.track_num = track_num;
        self
    }
}

/// Filters for listing songs. Empty or missing fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SongFilter {
    pub artist: Option<String>,
    pub id: Option<String>,
    pub query: Option<String>,
}

impl SongFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Default::default()
        }
    }

    pub fn by_artist(artist: &str) -> Self {
        Self {
            artist: Some(artist.to_string()),
            ..Default::default()
        }
    }

    pub fn artist(&self) -> Option<&str> {
        non_empty(&self.artist)
    }

    pub fn id(&self) -> Option<&str> {
        non_empty(&self.id)
    }

    pub fn query(&self) -> Option<&str> {
        non_empty(&self.query)
    }

    /// Checks the artist and id filters. The text query is matched by the store.
    pub fn matches_fields(&self, meta: &SongMeta) -> bool {
        if let Some(artist) = self.artist() {
            if meta.artist != artist {
                return false;
            }
        }
        if let Some(id) = self.id() {
            if meta.id != id {
                return false;
            }
        }
        true
    }
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.is_empty())
}

/// An id doubles as a directory name, so it must be a single safe path segment
/// that cannot shadow the see-also sidecar.
pub fn valid_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id != crate::SEE_ALSO_FILE
        && !id.contains(['/', '\\', '\0'])
}

/// Build a CamelCase id from a song name: "Banana Pancakes" -> "BananaPancakes".
pub fn id_from_name(name: &str) -> String {
    let mut id = String::new();
    for word in name.split_whitespace() {
        let mut first = true;
        for c in word.chars().filter(char::is_ascii_alphanumeric) {
            if first {
                id.push(c.to_ascii_uppercase());
                first = false;
            } else {
                id.push(c.to_ascii_lowercase());
            }
        }
    }
    id
}

/// Compare two titles alphabetically, ignoring a leading article.
pub fn title_cmp(a: &str, b: &str) -> Ordering {
    strip_article(a).cmp(strip_article(b))
}

fn strip_article(title: &str) -> &str {
    for article in ["A ", "An ", "The "] {
        if let Some(rest) = title.strip_prefix(article) {
            return rest;
        }
    }
    title
}

/// Songs per artist. With `artists` given, only those are counted (and
/// reported even when zero).
pub fn count_by_artist(songs: &[SongMeta], artists: &[String]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> =
        artists.iter().map(|a| (a.clone(), 0)).collect();
    for song in songs {
        if artists.is_empty() {
            *counts.entry(song.artist.clone()).or_default() += 1;
        } else if let Some(n) = counts.get_mut(&song.artist) {
            *n += 1;
        }
    }
    counts
}
