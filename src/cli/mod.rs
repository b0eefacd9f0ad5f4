use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config;
use crate::http::server::HttpServer;
use crate::storage::{blobs::DirBlobs, catalog::Catalog, status::library_status};

#[derive(Parser)]
#[command(name = "muzikk-server")]
#[command(version = "0.1")]
#[command(about = "Music library backend: song catalog, uploads and streaming")]
pub struct Cli {
    /// Path to the config TOML file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run http server hosting the library
    Serve,
    /// List songs in the catalog
    List,
    /// Compare the catalog with the files in the songs directory
    Status,
    /// Add a user to a song's listeners
    AddUser {
        /// Song id
        id: String,
        /// User id
        user: String,
    },
}

/// Entrypoint for CLI
pub fn run() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = config::Config::load(&cli.config)?;

    let catalog = Catalog::open(&cfg.storage.catalog_path).with_context(|| {
        format!(
            "Failed to open catalog {}",
            cfg.storage.catalog_path.to_string_lossy()
        )
    })?;

    match &cli.command {
        Commands::Serve => {
            let http_server = HttpServer::new(cfg, catalog);

            println!(
                "HTTP server running at http://{}:{}",
                http_server.config.bind_addr, http_server.config.port
            );
            http_server.run();
        }

        Commands::List => {
            let songs = catalog.list_all();
            println!("Catalog contains {} songs", songs.len());

            for song in songs {
                println!("Song: {}", song.id);
                println!("  {} - {} ({}s)", song.artist, song.title, song.duration);
                println!("  file: {}", song.file);
                if !song.users.is_empty() {
                    println!("  users: {}", song.users.join(", "));
                }
            }
        }

        Commands::Status => {
            let songs = DirBlobs::new(&cfg.storage.songs_dir);
            let status = library_status(&catalog, &songs)?;

            println!(
                "Songs directory {} contains {} files",
                songs.root().to_string_lossy(),
                status.blobs
            );
            println!("Catalog contains {} songs", status.songs);

            if status.is_consistent() {
                println!("Catalog and songs directory match");
            }
            for (id, file) in &status.missing_blobs {
                println!("  [MISSING]  {id}, expected at {file}");
            }
            for file in &status.orphan_blobs {
                println!("  [ORPHAN]  {file}");
            }
        }

        Commands::AddUser { id, user } => {
            let already = catalog
                .find_by_id(id)
                .is_some_and(|song| song.has_user(user));
            if already {
                println!("{user} is already a listener of song {id}");
                return Ok(());
            }

            let mut catalog = catalog;
            catalog.append_user_to_song(id, user)?;
            catalog.close()?;
            println!("Added {user} to song {id}");
        }
    }

    Ok(())
}
