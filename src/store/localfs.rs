//! Songs stored as plain files, one directory per song:
//!
//! ```text
//! basedir/
//! ├─ <id1>/
//! │  ├─ meta.json
//! │  └─ chords.txt
//! ├─ <id2>/
//! │  ...
//! └─ see-also.json
//! ```
//!
//! Chords stay editable with any text editor. There is no locking: concurrent
//! writers to the same id race, and a reader can see a half-written song.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{filter_matches, NameMatcher, Result, SongStore, StoreError};
use crate::song::{valid_id, SongFilter, SongMeta};
use crate::{CHORDS_FILE, META_FILE};

pub struct LocalFs {
    basedir: PathBuf,
}

impl LocalFs {
    /// Open a data directory, creating it if it does not exist yet.
    pub fn open(basedir: &Path) -> Result<Self> {
        fs::create_dir_all(basedir).map_err(|e| StoreError::io("create data dir", basedir, e))?;
        Ok(Self {
            basedir: basedir.to_path_buf(),
        })
    }

    fn song_dir(&self, id: &str) -> Result<PathBuf> {
        if !valid_id(id) {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.basedir.join(id))
    }

    /// Ids of every song directory, sorted.
    fn song_ids(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.basedir)
            .map_err(|e| StoreError::io("read data dir", &self.basedir, e))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io("read data dir", &self.basedir, e))?;
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if valid_id(&name) {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn read_meta(&self, id: &str) -> Result<SongMeta> {
        let path = self.song_dir(id)?.join(META_FILE);
        let data = fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound(id.to_string()),
            _ => StoreError::io("read metadata", &path, e),
        })?;
        serde_json::from_slice(&data).map_err(|source| StoreError::Malformed { path, source })
    }

    fn write_meta(&self, dir: &Path, meta: &SongMeta) -> Result<()> {
        let path = dir.join(META_FILE);
        let data = serde_json::to_vec_pretty(meta)?;
        fs::write(&path, data).map_err(|e| StoreError::io("write metadata", &path, e))
    }

    /// Every readable song; broken entries are logged and skipped.
    fn scan(&self, ids: &[String]) -> Vec<SongMeta> {
        let mut songs = Vec::with_capacity(ids.len());
        for id in ids {
            match self.read_meta(id) {
                Ok(meta) => songs.push(meta),
                Err(e) => log::warn!("Skipping song {id:?}: {e}"),
            }
        }
        songs
    }

    fn require_song_dir(&self, id: &str) -> Result<PathBuf> {
        let dir = self.song_dir(id)?;
        match fs::metadata(&dir) {
            Ok(m) if m.is_dir() => Ok(dir),
            Ok(_) => Err(StoreError::NotFound(id.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(id.to_string())),
            Err(e) => Err(StoreError::io("stat song dir", &dir, e)),
        }
    }
}

impl SongStore for LocalFs {
    fn artists(&self) -> Result<Vec<String>> {
        let ids = self.song_ids()?;
        let artists: HashSet<String> = self
            .scan(&ids)
            .into_iter()
            .map(|meta| meta.artist)
            .filter(|artist| !artist.is_empty())
            .collect();
        Ok(artists.into_iter().collect())
    }

    fn find_songs(&self, filter: &SongFilter) -> Result<Vec<SongMeta>> {
        let ids = match filter.id() {
            // An id can only ever name one directory.
            Some(id) if !valid_id(id) => return Ok(Vec::new()),
            Some(id) if self.basedir.join(id).is_dir() => vec![id.to_string()],
            Some(_) => return Ok(Vec::new()),
            None => self.song_ids()?,
        };

        let matcher = NameMatcher::from_filter(filter);
        Ok(self
            .scan(&ids)
            .into_iter()
            .filter(|meta| filter_matches(filter, matcher.as_ref(), meta))
            .collect())
    }

    fn exists(&self, id: &str) -> Result<bool> {
        let dir = self.song_dir(id)?;
        match fs::symlink_metadata(&dir) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io("stat song dir", &dir, e)),
        }
    }

    fn create_song(&self, meta: &SongMeta) -> Result<SongMeta> {
        let dir = self.song_dir(&meta.id)?;
        if self.exists(&meta.id)? {
            return Err(StoreError::AlreadyExists(meta.id.clone()));
        }

        fs::create_dir(&dir).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => StoreError::AlreadyExists(meta.id.clone()),
            _ => StoreError::io("create song dir", &dir, e),
        })?;

        // A failure past this point leaves a partial directory behind;
        // `chordies validate` reports it.
        self.write_meta(&dir, meta)?;
        let chords_path = dir.join(CHORDS_FILE);
        fs::write(&chords_path, b"").map_err(|e| StoreError::io("write chords", &chords_path, e))?;

        log::debug!("Created song {:?} in {}", meta.id, dir.display());
        Ok(meta.clone())
    }

    fn update_song(&self, id: &str, mut meta: SongMeta) -> Result<SongMeta> {
        let dir = self.require_song_dir(id)?;
        meta.id = id.to_string();
        self.write_meta(&dir, &meta)?;
        Ok(meta)
    }

    fn delete_song(&self, id: &str) -> Result<()> {
        // An invalid id can never name a song, so there is nothing to delete.
        let Ok(dir) = self.song_dir(id) else {
            return Ok(());
        };
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io("delete song", &dir, e)),
        }
    }

    fn get_chords(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.song_dir(id)?.join(CHORDS_FILE);
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound(id.to_string()),
            _ => StoreError::io("read chords", &path, e),
        })
    }

    fn set_chords(&self, id: &str, chords: &[u8]) -> Result<Vec<u8>> {
        let path = self.require_song_dir(id)?.join(CHORDS_FILE);
        fs::write(&path, chords).map_err(|e| StoreError::io("write chords", &path, e))?;
        // Read back what is actually on disk rather than echoing the input.
        fs::read(&path).map_err(|e| StoreError::io("read chords", &path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn banana() -> SongMeta {
        SongMeta::new("BananaPancakes", "Banana Pancakes", "Jack Johnson")
            .with_album("In Between Dreams", 3)
    }

    fn open_temp() -> (tempfile::TempDir, LocalFs) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFs::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_create_writes_layout() {
        let (dir, store) = open_temp();
        store.create_song(&banana()).unwrap();

        let song_dir = dir.path().join("BananaPancakes");
        assert!(song_dir.join(META_FILE).is_file());
        assert_eq!(fs::read(song_dir.join(CHORDS_FILE)).unwrap(), b"");

        let on_disk: SongMeta =
            serde_json::from_slice(&fs::read(song_dir.join(META_FILE)).unwrap()).unwrap();
        assert_eq!(on_disk, banana());
    }

    #[test]
    fn test_create_duplicate_id() {
        let (_dir, store) = open_temp();
        store.create_song(&banana()).unwrap();
        let err = store.create_song(&banana()).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(id) if id == "BananaPancakes"));
    }

    #[test]
    fn test_create_rejects_path_ids() {
        let (_dir, store) = open_temp();
        let meta = SongMeta::new("../escape", "Escape", "Nobody");
        assert!(matches!(store.create_song(&meta), Err(StoreError::InvalidId(_))));
    }

    #[test]
    fn test_find_by_id_round_trip() {
        let (_dir, store) = open_temp();
        store.create_song(&banana()).unwrap();
        let songs = store.find_songs(&SongFilter::by_id("BananaPancakes")).unwrap();
        assert_eq!(songs, vec![banana()]);
        assert!(store.find_songs(&SongFilter::by_id("Nope")).unwrap().is_empty());
    }

    #[test]
    fn test_find_filters_and_query() {
        let (_dir, store) = open_temp();
        store.create_song(&banana()).unwrap();
        store
            .create_song(&SongMeta::new("Flake", "Flake", "Jack Johnson"))
            .unwrap();
        store
            .create_song(&SongMeta::new("Hurt", "Hurt", "Johnny Cash"))
            .unwrap();

        let jack = store.find_songs(&SongFilter::by_artist("Jack Johnson")).unwrap();
        let ids: Vec<_> = jack.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["BananaPancakes", "Flake"]);

        let filter = SongFilter {
            query: Some("PANCAKE".into()),
            ..Default::default()
        };
        assert_eq!(store.find_songs(&filter).unwrap().len(), 1);

        let filter = SongFilter {
            artist: Some("Johnny Cash".into()),
            id: Some("Flake".into()),
            query: None,
        };
        assert!(store.find_songs(&filter).unwrap().is_empty());
    }

    #[test]
    fn test_listing_skips_malformed_entries() {
        let (dir, store) = open_temp();
        store.create_song(&banana()).unwrap();

        let broken = dir.path().join("Broken");
        fs::create_dir(&broken).unwrap();
        fs::write(broken.join(META_FILE), b"{not json").unwrap();
        fs::write(dir.path().join("see-also.json"), b"[]").unwrap();

        let songs = store.find_songs(&SongFilter::all()).unwrap();
        assert_eq!(songs.len(), 1);
        assert_eq!(store.artists().unwrap(), vec!["Jack Johnson".to_string()]);
    }

    #[test]
    fn test_update_overrides_id_and_requires_existing() {
        let (_dir, store) = open_temp();
        store.create_song(&banana()).unwrap();

        let mut changed = banana();
        changed.id = "SomethingElse".into();
        changed.track_num = 4;
        let updated = store.update_song("BananaPancakes", changed).unwrap();
        assert_eq!(updated.id, "BananaPancakes");
        assert_eq!(updated.track_num, 4);

        let stored = store.find_songs(&SongFilter::by_id("BananaPancakes")).unwrap();
        assert_eq!(stored[0].track_num, 4);
        assert!(!store.exists("SomethingElse").unwrap());

        let err = store.update_song("Missing", banana()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_chords_round_trip_and_delete() {
        let (dir, store) = open_temp();
        store.create_song(&banana()).unwrap();

        let sheet = b"[Verse]\nC        G\nCan't you see\n";
        assert_eq!(store.set_chords("BananaPancakes", sheet).unwrap(), sheet);
        assert_eq!(store.get_chords("BananaPancakes").unwrap(), sheet);

        store.delete_song("BananaPancakes").unwrap();
        assert!(!dir.path().join("BananaPancakes").exists());
        assert!(matches!(store.get_chords("BananaPancakes"), Err(StoreError::NotFound(_))));
        assert!(store.find_songs(&SongFilter::by_id("BananaPancakes")).unwrap().is_empty());

        // Idempotent
        store.delete_song("BananaPancakes").unwrap();
    }

    #[test]
    fn test_set_chords_unknown_song() {
        let (dir, store) = open_temp();
        assert!(matches!(store.set_chords("Ghost", b"Am"), Err(StoreError::NotFound(_))));
        assert!(!dir.path().join("Ghost").exists());
    }
}
