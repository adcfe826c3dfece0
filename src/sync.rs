//! Push local songs and chord sheets to a remote server.

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use crate::client::{Client, ClientError};
use crate::song::{SongFilter, SongMeta};
use crate::store::{SongStore, StoreError};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("local store: {0}")]
    Store(#[from] StoreError),
    #[error("remote: {0}")]
    Client(#[from] ClientError),
}

/// What a sync run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncResult {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub chords_pushed: usize,
    /// Requested ids with no local song
    pub missing: usize,
}

/// The remote side of a sync. Implemented by [`Client`].
pub trait Remote {
    fn find(&self, id: &str) -> Result<Option<SongMeta>, ClientError>;
    fn create(&self, meta: &SongMeta) -> Result<(), ClientError>;
    fn update(&self, meta: &SongMeta) -> Result<(), ClientError>;
    fn push_chords(&self, id: &str, chords: &[u8]) -> Result<(), ClientError>;
}

impl Remote for Client {
    fn find(&self, id: &str) -> Result<Option<SongMeta>, ClientError> {
        Ok(self.songs(&SongFilter::by_id(id))?.into_iter().next())
    }

    fn create(&self, meta: &SongMeta) -> Result<(), ClientError> {
        self.new_song(meta).map(drop)
    }

    fn update(&self, meta: &SongMeta) -> Result<(), ClientError> {
        self.update_song(&meta.id, meta).map(drop)
    }

    fn push_chords(&self, id: &str, chords: &[u8]) -> Result<(), ClientError> {
        self.update_chords(id, chords).map(drop)
    }
}

/// Songs to sync: everything, or just `ids` (unknown ids are counted as missing).
fn select_songs(
    local: &dyn SongStore,
    ids: &[String],
    result: &mut SyncResult,
) -> Result<Vec<SongMeta>, StoreError> {
    if ids.is_empty() {
        return local.find_songs(&SongFilter::all());
    }
    let mut songs = Vec::with_capacity(ids.len());
    for id in ids {
        match local.find_songs(&SongFilter::by_id(id))?.into_iter().next() {
            Some(song) => songs.push(song),
            None => {
                log::warn!("Song {id:?} not found locally, skipping");
                result.missing += 1;
            }
        }
    }
    Ok(songs)
}

/// Create each local song remotely if absent, update it if its metadata
/// differs, then push its chords. Stops at the first error.
pub fn sync(local: &dyn SongStore, remote: &impl Remote, ids: &[String]) -> Result<SyncResult, SyncError> {
    let mut result = SyncResult::default();
    let songs = select_songs(local, ids, &mut result)?;
    if songs.is_empty() {
        log::info!("No songs to sync");
        return Ok(result);
    }

    let pb = ProgressBar::new(songs.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} songs ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    for song in &songs {
        pb.set_message(song.name.clone());
        match remote.find(&song.id)? {
            None => {
                remote.create(song)?;
                log::debug!("Created {:?} remotely", song.id);
                result.created += 1;
            }
            Some(existing) if existing != *song => {
                remote.update(song)?;
                log::debug!("Updated {:?} remotely", song.id);
                result.updated += 1;
            }
            Some(_) => result.unchanged += 1,
        }

        let chords = local.get_chords(&song.id)?;
        remote.push_chords(&song.id, &chords)?;
        result.chords_pushed += 1;
        pb.inc(1);
    }

    pb.finish_with_message("done");
    Ok(result)
}
