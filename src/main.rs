use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chordies::client::Client;
use chordies::config::{self, AppConfig};
use chordies::library::{Library, SearchResult};
use chordies::see_also::SeeAlso;
use chordies::server::AppState;
use chordies::song::{self, SongFilter, SongMeta};
use chordies::store::{self, Backend};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chordies", version, about = "Chord sheet catalog and server")]
struct Cli {
    /// Path to the config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Storage backend
    #[arg(long, global = true, env = "CHORDIES_BACKEND")]
    backend: Option<Backend>,

    /// Song directory for the filesystem backend
    #[arg(long, global = true, env = "CHORDIES_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct RemoteArgs {
    /// Remote server URL (defaults to config remote.url)
    #[arg(long)]
    remote: Option<String>,

    /// Key sent in the Authorization header
    #[arg(long, env = "CHORDIES_AUTH_KEY", hide_env_values = true)]
    auth_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Address to listen on (defaults to config server.listen)
        #[arg(long)]
        listen: Option<String>,

        /// Key required in the Authorization header for writes
        #[arg(long, env = "CHORDIES_AUTH_KEY", hide_env_values = true)]
        auth_key: Option<String>,
    },

    /// List artists
    Artists,

    /// List songs, optionally filtered
    Songs {
        #[arg(long)]
        artist: Option<String>,
        #[arg(long)]
        id: Option<String>,
        /// Case-insensitive pattern matched against song names
        #[arg(long)]
        query: Option<String>,
    },

    /// Search song names, artists and albums by word prefix
    Search {
        #[arg(required = true)]
        terms: Vec<String>,

        /// Maximum number of results
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Artists related to an artist
    SeeAlso { artist: String },

    /// Add a song
    New {
        #[arg(long)]
        name: String,
        /// Song id (derived from the name if omitted)
        #[arg(long)]
        id: Option<String>,
        #[arg(long, default_value = "")]
        artist: String,
        #[arg(long, default_value = "")]
        album: String,
        #[arg(long, default_value_t = 0)]
        track: u32,
        /// File to read the chord sheet from
        #[arg(long)]
        chords: Option<PathBuf>,
    },

    /// Check the data directory for problems
    Validate,

    /// Rebuild the search index and report its size
    Reindex,

    /// Push local songs and chords to a remote server
    Sync {
        /// Song ids to sync (all songs if omitted)
        ids: Vec<String>,

        #[command(flatten)]
        remote: RemoteArgs,
    },

    /// Upload a chord sheet to a remote server
    UpdateChords {
        id: String,
        /// Chord file (defaults to the song's chords.txt in the data dir)
        file: Option<PathBuf>,

        #[command(flatten)]
        remote: RemoteArgs,
    },

    /// Count songs per artist
    Count {
        /// Artists to count (all if omitted)
        artists: Vec<String>,

        /// Count on a remote server instead (`--remote` or `--remote=URL`)
        #[arg(long, num_args = 0..=1, require_equals = true)]
        remote: Option<Option<String>>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = AppConfig::load(cli.config.as_deref());

    // Resolve storage: CLI/env > config > XDG default
    let backend = cli.backend.unwrap_or(config.backend);
    let data_dir = cli.data_dir.unwrap_or_else(|| config.resolve_data_dir());
    log::info!("Backend: {backend:?}, data dir: {}", data_dir.display());

    match cli.command {
        Commands::Serve { listen, auth_key } => {
            let library = open_library(&config, backend, &data_dir)?;
            let listen = listen.unwrap_or_else(|| config.server.listen.clone());
            let auth_key = config::resolve_auth_key(
                auth_key.as_deref().or(config.server.auth_key.as_deref()),
                config.server.auth_key_file.as_deref(),
            );
            let state = AppState::new(Arc::new(library), auth_key, config.server.search_limit);

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime
                .block_on(chordies::server::serve(&listen, state))
                .with_context(|| format!("Server on {listen} failed"))?;
        }

        Commands::Artists => {
            let library = open_library(&config, backend, &data_dir)?;
            for artist in library.list_artists().context("Failed to list artists")? {
                println!("{artist}");
            }
        }

        Commands::Songs { artist, id, query } => {
            let library = open_library(&config, backend, &data_dir)?;
            let filter = SongFilter { artist, id, query };
            let songs = library.find_songs(&filter).context("Failed to list songs")?;
            print_songs(&songs);
            println!("{} songs", songs.len());
        }

        Commands::Search { terms, limit } => {
            let library = open_library(&config, backend, &data_dir)?;
            let limit = limit.unwrap_or(config.server.search_limit);
            let results = library
                .search(&terms.join(" "), limit)
                .context("Search failed")?;
            if results.is_empty() {
                println!("No matches.");
            }
            for result in results {
                match result {
                    SearchResult::Artist { name } => println!("artist  {name}"),
                    SearchResult::Song(song) => {
                        println!("song    {:<20} {} - {}", song.id, song.artist, song.name)
                    }
                }
            }
        }

        Commands::SeeAlso { artist } => {
            let see_also = SeeAlso::new(config.resolve_see_also_path(&data_dir));
            let related = see_also.related(&artist).context("Failed to read see-also file")?;
            if related.is_empty() {
                println!("No related artists for {artist:?}.");
            }
            for name in related {
                println!("{name}");
            }
        }

        Commands::New { name, id, artist, album, track, chords } => {
            let library = open_library(&config, backend, &data_dir)?;
            // An explicit id must be free; a derived one is swapped for a random id on collision
            let id = match id {
                Some(id) => id,
                None => library
                    .free_id(&song::id_from_name(&name))
                    .context("Failed to pick a song id")?,
            };
            let meta = SongMeta::new(&id, &name, &artist).with_album(&album, track);
            let created = library
                .create_song(meta)
                .with_context(|| format!("Failed to create song {id:?}"))?;
            if let Some(path) = chords {
                let sheet = std::fs::read(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                library
                    .set_chords(&created.id, &sheet)
                    .context("Failed to store chords")?;
            }
            println!("Created song {}", created.id);
        }

        Commands::Validate => {
            let issues = chordies::validate::validate_dir(&data_dir)
                .with_context(|| format!("Failed to read {}", data_dir.display()))?;
            for issue in &issues {
                println!("{issue}");
            }
            if issues.is_empty() {
                println!("No problems found in {}", data_dir.display());
            } else {
                anyhow::bail!("{} problems found", issues.len());
            }
        }

        Commands::Reindex => {
            let library = open_library(&config, backend, &data_dir)?;
            let indexed = library.reindex().context("Reindex failed")?;
            println!("Indexed {indexed} songs");
        }

        Commands::Sync { ids, remote } => {
            let store = store::open_store(backend, &data_dir, &config.resolve_sqlite_path())
                .context("Failed to open local store")?;
            let client = remote_client(&config, remote);
            println!("Syncing to {}", client.base_url());
            let result = chordies::sync::sync(store.as_ref(), &client, &ids)
                .context("Sync failed")?;
            println!(
                "Sync complete: {} created, {} updated, {} unchanged, {} chord sheets pushed, {} missing",
                result.created, result.updated, result.unchanged, result.chords_pushed, result.missing
            );
        }

        Commands::UpdateChords { id, file, remote } => {
            let path = file.unwrap_or_else(|| data_dir.join(&id).join(chordies::CHORDS_FILE));
            let sheet = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let client = remote_client(&config, remote);
            client
                .update_chords(&id, &sheet)
                .with_context(|| format!("Failed to update chords for {id:?}"))?;
            println!("Updated chords for {id} ({} bytes)", sheet.len());
        }

        Commands::Count { artists, remote } => {
            let songs = match remote {
                Some(url) => {
                    let client = remote_client(
                        &config,
                        RemoteArgs { remote: url, auth_key: None },
                    );
                    client
                        .songs(&SongFilter::all())
                        .with_context(|| format!("Failed to list songs on {}", client.base_url()))?
                }
                None => open_library(&config, backend, &data_dir)?
                    .find_songs(&SongFilter::all())
                    .context("Failed to list songs")?,
            };
            let counts = song::count_by_artist(&songs, &artists);
            for (artist, n) in &counts {
                println!("{n:>5}  {artist}");
            }
            println!("{:>5}  total", counts.values().sum::<usize>());
        }
    }

    Ok(())
}

/// Open the configured store and wrap it in a library.
/// The memory backend starts out filled with sample songs.
fn open_library(config: &AppConfig, backend: Backend, data_dir: &Path) -> Result<Library> {
    let sqlite_path = config.resolve_sqlite_path();
    let store = store::open_store(backend, data_dir, &sqlite_path)
        .with_context(|| format!("Failed to open {backend:?} store"))?;
    let library = Library::new(store, SeeAlso::new(config.resolve_see_also_path(data_dir)));

    if backend == Backend::Memory {
        chordies::sample::fill(&library, &mut rand::rng())
            .context("Failed to fill memory store with sample data")?;
    }
    Ok(library)
}

/// A client for the remote given on the command line, else the configured one.
fn remote_client(config: &AppConfig, args: RemoteArgs) -> Client {
    let url = args.remote.unwrap_or_else(|| config.remote.url.clone());
    let auth_key = config::resolve_auth_key(
        args.auth_key.as_deref().or(config.remote.auth_key.as_deref()),
        config.remote.auth_key_file.as_deref(),
    );
    if auth_key.is_none() {
        log::info!("No auth key for {url}; writes will be refused");
    }
    Client::new(&url, auth_key)
}

fn print_songs(songs: &[SongMeta]) {
    for song in songs {
        let album = if song.album.is_empty() {
            String::new()
        } else {
            format!(" [{} #{}]", song.album, song.track_num)
        };
        println!("{:<20} {} - {}{album}", song.id, song.artist, song.name);
    }
}
