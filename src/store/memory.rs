use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use super::{filter_matches, NameMatcher, Result, SongStore, StoreError};
use crate::song::{SongFilter, SongMeta};

struct StoredSong {
    meta: SongMeta,
    chords: Vec<u8>,
}

/// A non-persistent store, good for demos and tests.
#[derive(Default)]
pub struct MemoryStore {
    songs: Mutex<BTreeMap<String, StoredSong>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, StoredSong>>> {
        self.songs.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl SongStore for MemoryStore {
    fn artists(&self) -> Result<Vec<String>> {
        let songs = self.lock()?;
        let artists: BTreeSet<&str> = songs
            .values()
            .map(|s| s.meta.artist.as_str())
            .filter(|a| !a.is_empty())
            .collect();
        Ok(artists.into_iter().map(String::from).collect())
    }

    fn find_songs(&self, filter: &SongFilter) -> Result<Vec<SongMeta>> {
        let matcher = NameMatcher::from_filter(filter);
        let songs = self.lock()?;
        Ok(songs
            .values()
            .filter(|s| filter_matches(filter, matcher.as_ref(), &s.meta))
            .map(|s| s.meta.clone())
            .collect())
    }

    fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.lock()?.contains_key(id))
    }

    fn create_song(&self, meta: &SongMeta) -> Result<SongMeta> {
        let mut songs = self.lock()?;
        if songs.contains_key(&meta.id) {
            return Err(StoreError::AlreadyExists(meta.id.clone()));
        }
        songs.insert(
            meta.id.clone(),
            StoredSong {
                meta: meta.clone(),
                chords: Vec::new(),
            },
        );
        Ok(meta.clone())
    }

    fn update_song(&self, id: &str, mut meta: SongMeta) -> Result<SongMeta> {
        let mut songs = self.lock()?;
        let song = songs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        meta.id = id.to_string();
        song.meta = meta.clone();
        Ok(meta)
    }

    fn delete_song(&self, id: &str) -> Result<()> {
        self.lock()?.remove(id);
        Ok(())
    }

    fn get_chords(&self, id: &str) -> Result<Vec<u8>> {
        self.lock()?
            .get(id)
            .map(|s| s.chords.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn set_chords(&self, id: &str, chords: &[u8]) -> Result<Vec<u8>> {
        let mut songs = self.lock()?;
        let song = songs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        song.chords = chords.to_vec();
        Ok(song.chords.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artists_are_distinct_and_non_empty() {
        let store = MemoryStore::new();
        for (id, artist) in [("a", "Elton John"), ("b", "Rod Stewart"), ("c", "Elton John"), ("d", "")] {
            store.create_song(&SongMeta::new(id, id, artist)).unwrap();
        }
        let artists = store.artists().unwrap();
        assert_eq!(artists, vec!["Elton John".to_string(), "Rod Stewart".to_string()]);
    }

    #[test]
    fn test_crud_cycle() {
        let store = MemoryStore::new();
        let meta = SongMeta::new("Hurt", "Hurt", "Johnny Cash");
        store.create_song(&meta).unwrap();
        assert!(matches!(store.create_song(&meta), Err(StoreError::AlreadyExists(_))));

        assert_eq!(store.get_chords("Hurt").unwrap(), b"");
        store.set_chords("Hurt", b"Am C D").unwrap();
        assert_eq!(store.get_chords("Hurt").unwrap(), b"Am C D");

        let updated = store
            .update_song("Hurt", SongMeta::new("other", "Hurt (Live)", "Johnny Cash"))
            .unwrap();
        assert_eq!(updated.id, "Hurt");

        store.delete_song("Hurt").unwrap();
        store.delete_song("Hurt").unwrap();
        assert!(matches!(store.get_chords("Hurt"), Err(StoreError::NotFound(_))));
        assert!(store.find_songs(&SongFilter::all()).unwrap().is_empty());
    }

    #[test]
    fn test_query_matches_name_only() {
        let store = MemoryStore::new();
        store
            .create_song(&SongMeta::new("Flake", "Flake", "Jack Johnson"))
            .unwrap();
        let filter = SongFilter {
            query: Some("jack".into()),
            ..Default::default()
        };
        assert!(store.find_songs(&filter).unwrap().is_empty());
    }
}
