//! Offline consistency checks for a filesystem data directory.
//!
//! Nothing here modifies the data; every problem is reported as an [`Issue`].

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::see_also::SeeAlso;
use crate::song::SongMeta;
use crate::{CHORDS_FILE, META_FILE, SEE_ALSO_FILE};

/// Track numbers above this are suspicious.
const MAX_TRACK_NUM: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

#[derive(Default)]
struct Report {
    issues: Vec<Issue>,
}

impl Report {
    fn warn(&mut self, path: &Path, message: impl Into<String>) {
        self.issues.push(Issue {
            path: path.to_path_buf(),
            message: message.into(),
        });
    }
}

/// Check every song directory and the see-also file under `datadir`.
pub fn validate_dir(datadir: &Path) -> std::io::Result<Vec<Issue>> {
    let mut report = Report::default();
    let mut artists = HashSet::new();

    let mut song_dirs = Vec::new();
    for entry in WalkDir::new(datadir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.file_type().is_dir() {
            song_dirs.push((entry.into_path(), name));
        } else if name != SEE_ALSO_FILE {
            report.warn(entry.path(), "not a directory");
        }
    }

    for (dir, id) in &song_dirs {
        if let Some(meta) = check_song_dir(&mut report, dir, id) {
            if !meta.artist.is_empty() {
                artists.insert(meta.artist);
            }
        }
    }

    check_see_also(&mut report, &datadir.join(SEE_ALSO_FILE), &artists);
    Ok(report.issues)
}

fn check_song_dir(report: &mut Report, dir: &Path, id: &str) -> Option<SongMeta> {
    let mut meta = None;
    let mut meta_found = false;
    let mut chords_found = false;

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                report.warn(dir, format!("couldn't read dir: {e}"));
                return None;
            }
        };
        let path = entry.path();
        if entry.file_type().is_dir() {
            report.warn(path, "is a directory");
            continue;
        }

        match entry.file_name().to_str() {
            Some(META_FILE) => {
                meta_found = true;
                meta = check_meta(report, path, id);
            }
            Some(CHORDS_FILE) => {
                chords_found = true;
                check_chords(report, path);
            }
            _ => report.warn(path, "unexpected file"),
        }
    }

    if !meta_found {
        report.warn(dir, format!("no {META_FILE} found"));
    }
    if !chords_found {
        report.warn(dir, format!("no {CHORDS_FILE} found"));
    }
    meta
}

fn check_meta(report: &mut Report, path: &Path, dir_name: &str) -> Option<SongMeta> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            report.warn(path, format!("couldn't read: {e}"));
            return None;
        }
    };
    let song: SongMeta = match serde_json::from_slice(&data) {
        Ok(song) => song,
        Err(e) => {
            report.warn(path, format!("couldn't parse: {e}"));
            return None;
        }
    };

    if song.id != dir_name {
        report.warn(path, format!("id {:?} doesn't match dir name {dir_name:?}", song.id));
    }
    if song.name.is_empty() {
        report.warn(path, "song name is empty");
    }
    if song.artist.is_empty() {
        report.warn(path, "artist is empty");
    }
    match (song.album.is_empty(), song.track_num) {
        (true, n) if n > 0 => report.warn(path, "trackNum set but album is empty"),
        (false, 0) => report.warn(path, "album set but trackNum is missing"),
        _ => {}
    }
    if song.track_num > MAX_TRACK_NUM {
        report.warn(path, format!("trackNum {} might be too large", song.track_num));
    }
    Some(song)
}

fn check_chords(report: &mut Report, path: &Path) {
    match std::fs::read(path) {
        Ok(data) if data.trim_ascii().is_empty() => report.warn(path, "chords are empty"),
        Ok(_) => {}
        Err(e) => report.warn(path, format!("couldn't read: {e}")),
    }
}

/// Pairs must have two names, and names should exist in the catalog.
/// Stale names are reported, never pruned.
fn check_see_also(report: &mut Report, path: &Path, artists: &HashSet<String>) {
    let pairs = match SeeAlso::new(path.to_path_buf()).pairs() {
        Ok(pairs) => pairs,
        Err(e) => {
            report.warn(path, e.to_string());
            return;
        }
    };

    for pair in &pairs {
        if pair.len() != 2 {
            report.warn(path, format!("entry {pair:?} should have exactly two names"));
            continue;
        }
        for name in pair {
            if !artists.contains(name) {
                report.warn(path, format!("artist {name:?} has no songs"));
            }
        }
    }
}
