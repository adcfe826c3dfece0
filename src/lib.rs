pub mod client;
pub mod config;
pub mod library;
pub mod sample;
pub mod search;
pub mod see_also;
pub mod server;
pub mod song;
pub mod store;
pub mod sync;
pub mod validate;

/// Application name for XDG paths
pub const APP_NAME: &str = "chordies";

/// Per-song metadata file in the filesystem layout
pub const META_FILE: &str = "meta.json";

/// Per-song chord sheet in the filesystem layout
pub const CHORDS_FILE: &str = "chords.txt";

/// Related-artist pairs, at the top of the data directory
pub const SEE_ALSO_FILE: &str = "see-also.json";
