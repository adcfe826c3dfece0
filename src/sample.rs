use rand::Rng;

use crate::library::Library;
use crate::song::SongMeta;
use crate::store::Result;

const SAMPLE_CHORDS: &[u8] = b"[Verse]\nC        Am\nsample chords go here\nF        G\n";

/// Fill a library with generated artists, albums and songs for demos.
///
/// One to four artists per letter, one to four albums each, one to ten songs
/// per album. Returns the number of songs created.
pub fn fill(library: &Library, rng: &mut impl Rng) -> Result<usize> {
    let mut created = 0;
    for letter in 'A'..='Z' {
        for artist in 0..=rng.random_range(0..4) {
            for album in 0..=rng.random_range(0..4) {
                for track in 0..=rng.random_range(0..10u32) {
                    let meta = library.create_song(SongMeta {
                        id: String::new(),
                        name: format!("song{track}"),
                        artist: format!("{letter}artist{artist}"),
                        album: format!("album{album}"),
                        track_num: track + 1,
                    })?;
                    library.set_chords(&meta.id, SAMPLE_CHORDS)?;
                    created += 1;
                }
            }
        }
    }
    log::info!("Filled store with {created} sample songs");
    Ok(created)
}
