use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use super::{filter_matches, NameMatcher, Result, SongStore, StoreError};
use crate::song::{SongFilter, SongMeta};

const SCHEMA_VERSION: i32 = 1;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io("create dir", parent, e))?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap_or(0);

    if version > SCHEMA_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{version} is newer than this build (v{SCHEMA_VERSION})"
        )));
    }
    if version < 1 {
        migrate_v1(conn)?;
    }

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

/// V1: songs with inline chords
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS songs (
            id          TEXT PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL DEFAULT '',
            artist      TEXT NOT NULL DEFAULT '',
            album       TEXT NOT NULL DEFAULT '',
            track_num   INTEGER NOT NULL DEFAULT 0,
            chords      BLOB NOT NULL DEFAULT x'',

            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_songs_artist ON songs(artist);
        ",
    )?;
    Ok(())
}

fn row_to_meta(row: &rusqlite::Row<'_>) -> rusqlite::Result<SongMeta> {
    Ok(SongMeta {
        id: row.get(0)?,
        name: row.get(1)?,
        artist: row.get(2)?,
        album: row.get(3)?,
        track_num: row.get(4)?,
    })
}

impl SongStore for SqliteStore {
    fn artists(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT DISTINCT artist FROM songs WHERE artist != ''")?;
        let artists = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(artists)
    }

    fn find_songs(&self, filter: &SongFilter) -> Result<Vec<SongMeta>> {
        let conn = self.lock()?;
        // Empty filter values match everything, so they bind as NULL.
        let mut stmt = conn.prepare(
            "SELECT id, name, artist, album, track_num FROM songs
             WHERE (?1 IS NULL OR artist = ?1)
               AND (?2 IS NULL OR id = ?2)
             ORDER BY id",
        )?;
        let songs = stmt
            .query_map(params![filter.artist(), filter.id()], row_to_meta)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        let matcher = NameMatcher::from_filter(filter);
        Ok(songs
            .into_iter()
            .filter(|meta| filter_matches(filter, matcher.as_ref(), meta))
            .collect())
    }

    fn exists(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let found = conn
            .query_row("SELECT 1 FROM songs WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn create_song(&self, meta: &SongMeta) -> Result<SongMeta> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT INTO songs (id, name, artist, album, track_num)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO NOTHING",
            params![meta.id, meta.name, meta.artist, meta.album, meta.track_num],
        )?;
        if inserted == 0 {
            return Err(StoreError::AlreadyExists(meta.id.clone()));
        }
        Ok(meta.clone())
    }

    fn update_song(&self, id: &str, mut meta: SongMeta) -> Result<SongMeta> {
        meta.id = id.to_string();
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE songs SET
                name = ?2, artist = ?3, album = ?4, track_num = ?5,
                updated_at = datetime('now')
             WHERE id = ?1",
            params![meta.id, meta.name, meta.artist, meta.album, meta.track_num],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(meta)
    }

    fn delete_song(&self, id: &str) -> Result<()> {
        self.lock()?
            .execute("DELETE FROM songs WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn get_chords(&self, id: &str) -> Result<Vec<u8>> {
        let conn = self.lock()?;
        conn.query_row("SELECT chords FROM songs WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn set_chords(&self, id: &str, chords: &[u8]) -> Result<Vec<u8>> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE songs SET chords = ?2, updated_at = datetime('now') WHERE id = ?1",
            params![id, chords],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let stored = conn.query_row("SELECT chords FROM songs WHERE id = ?1", params![id], |row| row.get(0))?;
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn banana() -> SongMeta {
        SongMeta::new("BananaPancakes", "Banana Pancakes", "Jack Johnson")
            .with_album("In Between Dreams", 3)
    }

    #[test]
    fn test_migrate_sets_user_version() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock().unwrap();
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_reopen_file_keeps_songs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chords.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.create_song(&banana()).unwrap();
            store.set_chords("BananaPancakes", b"G D Em C").unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.find_songs(&SongFilter::all()).unwrap(), vec![banana()]);
        assert_eq!(store.get_chords("BananaPancakes").unwrap(), b"G D Em C");
    }

    #[test]
    fn test_create_duplicate_and_update_missing() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_song(&banana()).unwrap();
        assert!(matches!(store.create_song(&banana()), Err(StoreError::AlreadyExists(_))));
        assert!(matches!(store.update_song("Nope", banana()), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_filters() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_song(&banana()).unwrap();
        store
            .create_song(&SongMeta::new("Hurt", "Hurt", "Johnny Cash"))
            .unwrap();
        store
            .create_song(&SongMeta::new("Unknown", "Unknown", ""))
            .unwrap();

        let mut artists = store.artists().unwrap();
        artists.sort();
        assert_eq!(artists, vec!["Jack Johnson", "Johnny Cash"]);

        let filter = SongFilter {
            artist: Some("Johnny Cash".into()),
            id: Some("BananaPancakes".into()),
            query: None,
        };
        assert!(store.find_songs(&filter).unwrap().is_empty());

        let filter = SongFilter {
            artist: Some(String::new()),
            id: None,
            query: Some("hur".into()),
        };
        let found = store.find_songs(&filter).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "Hurt");
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_song(&banana()).unwrap();
        store.delete_song("BananaPancakes").unwrap();
        store.delete_song("BananaPancakes").unwrap();
        assert!(matches!(store.get_chords("BananaPancakes"), Err(StoreError::NotFound(_))));
    }
}
