use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::search::{DocKey, SearchIndex};
use crate::see_also::{SeeAlso, SeeAlsoError};
use crate::song::{title_cmp, valid_id, SongFilter, SongMeta};
use crate::store::{Result, SongStore, StoreError};

/// Default cap on search results.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// One search hit, resolved back to catalog data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SearchResult {
    Song(SongMeta),
    Artist { name: String },
}

/// The catalog: a song store plus the indices derived from it.
///
/// The store is the source of truth. Index updates after a successful store
/// write are best-effort: failures are logged and the index may drift until
/// the next [`Library::reindex`].
pub struct Library {
    store: Box<dyn SongStore>,
    index: SearchIndex,
    see_also: SeeAlso,
    rng: Mutex<StdRng>,
}

impl Library {
    pub fn new(store: Box<dyn SongStore>, see_also: SeeAlso) -> Self {
        Self::with_rng(store, see_also, StdRng::from_os_rng())
    }

    /// Build a library with a given random source (seeded in tests).
    pub fn with_rng(store: Box<dyn SongStore>, see_also: SeeAlso, rng: StdRng) -> Self {
        let library = Self {
            store,
            index: SearchIndex::new(),
            see_also,
            rng: Mutex::new(rng),
        };
        match library.reindex() {
            Ok(count) => log::info!("Search index built: {count} songs"),
            Err(e) => log::warn!("Could not build search index: {e}"),
        }
        library
    }

    pub fn store(&self) -> &dyn SongStore {
        self.store.as_ref()
    }

    /// Distinct artist names, sorted ignoring leading articles.
    pub fn list_artists(&self) -> Result<Vec<String>> {
        let mut artists = self.store.artists()?;
        artists.sort_by(|a, b| title_cmp(a, b));
        Ok(artists)
    }

    pub fn find_songs(&self, filter: &SongFilter) -> Result<Vec<SongMeta>> {
        self.store.find_songs(filter)
    }

    pub fn get_song(&self, id: &str) -> Result<SongMeta> {
        self.store
            .find_songs(&SongFilter::by_id(id))?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Create a song. An empty id gets a freshly generated one; a given id
    /// must be valid and unused.
    pub fn create_song(&self, mut meta: SongMeta) -> Result<SongMeta> {
        if meta.id.is_empty() {
            meta.id = self.generate_id()?;
        } else if !valid_id(&meta.id) {
            return Err(StoreError::InvalidId(meta.id));
        }

        let created = self.store.create_song(&meta)?;
        if let Err(e) = self.index.index_song(&created) {
            log::warn!("Error updating search index for {:?}: {e}", created.id);
        }
        Ok(created)
    }

    pub fn update_song(&self, id: &str, meta: SongMeta) -> Result<SongMeta> {
        let updated = self.store.update_song(id, meta)?;
        if let Err(e) = self
            .index
            .remove_song(id)
            .and_then(|()| self.index.index_song(&updated))
        {
            log::warn!("Error updating search index for {id:?}: {e}");
        }
        Ok(updated)
    }

    pub fn delete_song(&self, id: &str) -> Result<()> {
        self.store.delete_song(id)?;
        if let Err(e) = self.index.remove_song(id) {
            log::warn!("Error updating search index for {id:?}: {e}");
        }
        Ok(())
    }

    pub fn get_chords(&self, id: &str) -> Result<Vec<u8>> {
        self.store.get_chords(id)
    }

    pub fn set_chords(&self, id: &str, chords: &[u8]) -> Result<Vec<u8>> {
        self.store.set_chords(id, chords)
    }

    pub fn related_artists(&self, artist: &str) -> std::result::Result<Vec<String>, SeeAlsoError> {
        self.see_also.related(artist)
    }

    /// Free-text prefix search, resolved to full records and capped at `limit`.
    /// Song hits that no longer resolve in the store are skipped.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let hits = self.index.search(query)?;

        let mut results = Vec::new();
        for hit in hits {
            if results.len() >= limit {
                break;
            }
            match hit {
                DocKey::Artist(name) => results.push(SearchResult::Artist { name }),
                DocKey::Song(id) => match self.get_song(&id) {
                    Ok(meta) => results.push(SearchResult::Song(meta)),
                    Err(e) => log::warn!("Search hit {id:?} did not resolve: {e}"),
                },
            }
        }
        Ok(results)
    }

    /// A uniformly random song, or `None` if the catalog is empty.
    pub fn random_song(&self) -> Result<Option<SongMeta>> {
        let songs = self.store.find_songs(&SongFilter::all())?;
        let mut rng = self.rng.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(songs.choose(&mut *rng).cloned())
    }

    /// Rebuild the search index from the store. Returns the number of songs indexed.
    pub fn reindex(&self) -> Result<usize> {
        let songs = self.store.find_songs(&SongFilter::all())?;
        if let Err(e) = self.index.clear() {
            log::warn!("Could not clear search index: {e}");
        }

        let mut indexed = 0;
        for meta in &songs {
            match self.index.index_song(meta) {
                Ok(()) => indexed += 1,
                Err(e) => log::warn!("Could not index song {:?}: {e}", meta.id),
            }
        }
        log::debug!("Reindexed {indexed} of {} songs", songs.len());
        Ok(indexed)
    }

    /// `suggestion` if it is a valid, unused id, otherwise a generated one.
    pub fn free_id(&self, suggestion: &str) -> Result<String> {
        if valid_id(suggestion) && !self.store.exists(suggestion)? {
            return Ok(suggestion.to_string());
        }
        self.generate_id()
    }

    /// A fresh id from random bytes. Loops until unused, which at catalog
    /// sizes means once.
    fn generate_id(&self) -> Result<String> {
        loop {
            let bytes: [u8; 4] = self.rng.lock().map_err(|_| StoreError::Poisoned)?.random();
            let id: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
            if !self.store.exists(&id)? {
                return Ok(id);
            }
            log::debug!("Generated id {id} already taken, retrying");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LocalFs, MemoryStore};
    use std::collections::HashSet;

    fn seeded(store: Box<dyn SongStore>) -> Library {
        Library::with_rng(store, SeeAlso::none(), StdRng::seed_from_u64(7))
    }

    fn banana() -> SongMeta {
        SongMeta::new("BananaPancakes", "Banana Pancakes", "Jack Johnson")
            .with_album("In Between Dreams", 3)
    }

    #[test]
    fn test_end_to_end_on_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let library = seeded(Box::new(LocalFs::open(dir.path()).unwrap()));

        let created = library.create_song(banana()).unwrap();
        assert_eq!(created, banana());

        let sheet = b"[Intro]\nG  D  Em  C\n\n[Verse]\nG\nWell, can't you see that it's just raining\n";
        library.set_chords("BananaPancakes", sheet).unwrap();
        assert_eq!(library.get_chords("BananaPancakes").unwrap(), sheet);

        let by_artist = library.find_songs(&SongFilter::by_artist("Jack Johnson")).unwrap();
        assert_eq!(by_artist, vec![banana()]);

        library.delete_song("BananaPancakes").unwrap();
        assert!(matches!(
            library.get_chords("BananaPancakes"),
            Err(StoreError::NotFound(_))
        ));
        assert!(library.search("banana", DEFAULT_SEARCH_LIMIT).unwrap().iter().all(|r| {
            !matches!(r, SearchResult::Song(_))
        }));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let library = seeded(Box::new(MemoryStore::new()));
        let mut ids = HashSet::new();
        for i in 0..50 {
            let meta = library
                .create_song(SongMeta::new("", &format!("song{i}"), "Someone"))
                .unwrap();
            assert_eq!(meta.id.len(), 8);
            assert!(ids.insert(meta.id));
        }
    }

    #[test]
    fn test_create_rejects_invalid_and_taken_ids() {
        let library = seeded(Box::new(MemoryStore::new()));
        library.create_song(banana()).unwrap();
        assert!(matches!(library.create_song(banana()), Err(StoreError::AlreadyExists(_))));
        assert!(matches!(
            library.create_song(SongMeta::new("a/b", "Slash", "")),
            Err(StoreError::InvalidId(_))
        ));
    }

    #[test]
    fn test_free_id_falls_back_on_collision() {
        let library = seeded(Box::new(MemoryStore::new()));
        assert_eq!(library.free_id("BananaPancakes").unwrap(), "BananaPancakes");
        library.create_song(banana()).unwrap();
        let other = library.free_id("BananaPancakes").unwrap();
        assert_ne!(other, "BananaPancakes");
        assert!(valid_id(&other));
        assert_ne!(library.free_id("..").unwrap(), "..");
    }

    #[test]
    fn test_update_keeps_path_id_and_reindexes() {
        let library = seeded(Box::new(MemoryStore::new()));
        library.create_song(banana()).unwrap();

        let mut meta = banana();
        meta.id = "Elsewhere".into();
        meta.name = "Better Together".into();
        let updated = library.update_song("BananaPancakes", meta).unwrap();
        assert_eq!(updated.id, "BananaPancakes");

        let results = library.search("better", DEFAULT_SEARCH_LIMIT).unwrap();
        assert_eq!(results, vec![SearchResult::Song(updated)]);
        assert!(library.search("pancakes", DEFAULT_SEARCH_LIMIT).unwrap().is_empty());
    }

    #[test]
    fn test_search_resolves_and_limits() {
        let library = seeded(Box::new(MemoryStore::new()));
        for i in 0..15 {
            library
                .create_song(SongMeta::new(&format!("s{i:02}"), &format!("Blues {i}"), "Muddy Waters"))
                .unwrap();
        }
        let results = library.search("blues", DEFAULT_SEARCH_LIMIT).unwrap();
        assert_eq!(results.len(), DEFAULT_SEARCH_LIMIT);
        assert!(results.iter().all(|r| matches!(r, SearchResult::Song(_))));

        let results = library.search("muddy", 3).unwrap();
        assert_eq!(results[0], SearchResult::Artist { name: "Muddy Waters".into() });
    }

    #[test]
    fn test_search_skips_songs_deleted_behind_its_back() {
        let library = seeded(Box::new(MemoryStore::new()));
        library.create_song(banana()).unwrap();
        // Bypass the library so the index goes stale.
        library.store().delete_song("BananaPancakes").unwrap();

        let results = library.search("pancakes", DEFAULT_SEARCH_LIMIT).unwrap();
        assert!(results.is_empty());

        assert_eq!(library.reindex().unwrap(), 0);
    }

    #[test]
    fn test_reindex_picks_up_existing_songs() {
        let store = MemoryStore::new();
        store.create_song(&banana()).unwrap();
        let library = seeded(Box::new(store));
        let results = library.search("banana jack", DEFAULT_SEARCH_LIMIT).unwrap();
        assert_eq!(results, vec![SearchResult::Song(banana())]);
        assert!(library.search("banana smith", DEFAULT_SEARCH_LIMIT).unwrap().is_empty());
    }

    #[test]
    fn test_random_song() {
        let library = seeded(Box::new(MemoryStore::new()));
        assert!(library.random_song().unwrap().is_none());
        library.create_song(banana()).unwrap();
        assert_eq!(library.random_song().unwrap(), Some(banana()));
    }

    #[test]
    fn test_artists_sorted_ignoring_articles() {
        let library = seeded(Box::new(MemoryStore::new()));
        for (id, artist) in [("1", "The Whitlams"), ("2", "Spacehog"), ("3", "Elton John")] {
            library.create_song(SongMeta::new(id, id, artist)).unwrap();
        }
        assert_eq!(
            library.list_artists().unwrap(),
            vec!["Elton John", "Spacehog", "The Whitlams"]
        );
    }

    #[test]
    fn test_search_result_json_shape() {
        let json = serde_json::to_value(SearchResult::Song(banana())).unwrap();
        assert_eq!(json["kind"], "song");
        assert_eq!(json["id"], "BananaPancakes");
        let json = serde_json::to_value(SearchResult::Artist { name: "Jack Johnson".into() }).unwrap();
        assert_eq!(json["kind"], "artist");
        assert_eq!(json["name"], "Jack Johnson");
    }

    #[test]
    fn test_writes_succeed_when_index_update_fails() {
        let library = seeded(Box::new(MemoryStore::new()));
        library.index.poison();

        let created = library.create_song(banana()).unwrap();
        assert_eq!(library.get_song("BananaPancakes").unwrap(), created);

        let mut meta = banana();
        meta.name = "Better Together".into();
        let updated = library.update_song("BananaPancakes", meta).unwrap();
        assert_eq!(library.get_song("BananaPancakes").unwrap(), updated);

        library.delete_song("BananaPancakes").unwrap();
        assert!(!library.store().exists("BananaPancakes").unwrap());
    }

    #[test]
    fn test_search_surfaces_index_errors() {
        let library = seeded(Box::new(MemoryStore::new()));
        library.create_song(banana()).unwrap();
        library.index.poison();
        assert!(matches!(
            library.search("banana", DEFAULT_SEARCH_LIMIT),
            Err(StoreError::Search(_))
        ));
    }

    #[test]
    fn test_sidecar_name_is_not_a_song_id() {
        let dir = tempfile::tempdir().unwrap();
        let pairs = dir.path().join(crate::SEE_ALSO_FILE);
        let library = Library::with_rng(
            Box::new(LocalFs::open(dir.path()).unwrap()),
            SeeAlso::new(pairs.clone()),
            StdRng::seed_from_u64(7),
        );

        assert!(matches!(
            library.create_song(SongMeta::new(crate::SEE_ALSO_FILE, "Sidecar", "X")),
            Err(StoreError::InvalidId(_))
        ));
        assert!(!pairs.exists());
        assert!(library.related_artists("X").unwrap().is_empty());
        assert_ne!(library.free_id(crate::SEE_ALSO_FILE).unwrap(), crate::SEE_ALSO_FILE);
    }

    #[test]
    fn test_delete_invalid_id_is_a_no_op_on_every_backend() {
        let dir = tempfile::tempdir().unwrap();
        let stores: Vec<Box<dyn SongStore>> = vec![
            Box::new(MemoryStore::new()),
            Box::new(LocalFs::open(dir.path()).unwrap()),
            Box::new(crate::store::SqliteStore::open_in_memory().unwrap()),
        ];
        for store in stores {
            let library = seeded(store);
            library.create_song(banana()).unwrap();
            for id in ["", "..", "a/b"] {
                library.delete_song(id).unwrap();
            }
            assert!(library.store().exists("BananaPancakes").unwrap());
        }
    }
}
