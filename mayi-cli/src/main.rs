use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mayi_library::{Config, LibraryManager};

#[derive(Parser)]
#[command(name = "mayi", version, about = "Personal music library manager and unlocker")]
struct Cli {
    /// Service root holding Library/, New/, Duplicate/, Trash/, Unlocked/
    #[arg(short, long, value_name = "PATH", default_value = ".")]
    base: PathBuf,

    /// Skip cover art lookup and embedding (fully offline)
    #[arg(long)]
    no_artwork: bool,

    /// Unlock worker count (auto-detected when omitted)
    #[arg(short = 'w', long, value_name = "N")]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decrypt everything in Unlocked/ into New/
    Unlock,
    /// Ingest every supported file in New/ into the library
    Ingest,
    /// Rescan Library/ for unindexed files
    Scan,
    /// Sweep Library/ for same-name duplicates
    Dedupe,
    /// Search the catalog by title, artist, or album
    Search { query: String },
    /// Show library statistics
    Stats,
    /// Export a timestamped catalog backup
    Backup,
    /// Decrypt individual files in place (no library involvement)
    Decrypt {
        files: Vec<PathBuf>,
        /// Output directory (defaults to each file's own directory)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Command::Decrypt { files, output } = &cli.command {
        return decrypt_files(files, output.as_deref());
    }

    let mut config = Config::new(&cli.base);
    config.fetch_artwork = !cli.no_artwork;
    config.unlock_workers = cli.workers;
    let mut manager = LibraryManager::new(config).context("failed to open library")?;

    match cli.command {
        Command::Unlock => {
            let report = manager.unlock_music_files()?;
            println!(
                "{} processed: {} unlocked, {} failed ({:.2} files/s, {} workers)",
                report.processed,
                report.succeeded,
                report.failed,
                report.files_per_second,
                report.workers,
            );
            for failure in &report.failures {
                eprintln!("  failed: {}: {}", failure.file, failure.error);
            }
        }
        Command::Ingest => {
            let report = manager.ingest_new()?;
            println!(
                "added {} to library, {} duplicates, {} trashed, {} failed",
                report.added,
                report.duplicates.len(),
                report.trashed.len(),
                report.failed.len(),
            );
            for name in report.duplicates.iter().chain(&report.trashed).chain(&report.failed) {
                println!("  routed away: {name}");
            }
        }
        Command::Scan => {
            let report = manager.scan_library()?;
            println!(
                "{} new songs, {} thumbnails refreshed, {} total, {} moved to trash",
                report.new_songs,
                report.updated_thumbnails,
                report.total_songs,
                report.moved_to_trash.len(),
            );
        }
        Command::Dedupe => {
            let report = manager.check_duplicates_in_library()?;
            println!(
                "{} duplicate groups, {} files moved, {} failed, {} checked",
                report.duplicate_groups,
                report.moved_files.len(),
                report.failed_moves.len(),
                report.total_files_checked,
            );
        }
        Command::Search { query } => {
            let hits = manager.search(&query);
            for song in &hits {
                println!(
                    "{} - {} ({})",
                    song.artist.as_deref().unwrap_or("Unknown Artist"),
                    song.title,
                    song.file_path,
                );
            }
            println!("{} match(es)", hits.len());
        }
        Command::Stats => {
            let stats = manager.statistics();
            println!("songs: {}", stats.total_songs);
            println!("total size: {} bytes", stats.total_size);
            for (ext, count) in &stats.formats {
                println!("  .{ext}: {count}");
            }
            for (artist, count) in &stats.artists {
                println!("  {artist}: {count}");
            }
            if let Some(updated) = &stats.last_updated {
                println!("last updated: {updated}");
            }
        }
        Command::Backup => {
            let path = manager.export_backup()?;
            println!("backup written to {}", path.display());
        }
        Command::Decrypt { .. } => unreachable!("handled above"),
    }

    Ok(())
}

fn decrypt_files(files: &[PathBuf], output: Option<&std::path::Path>) -> Result<()> {
    if files.is_empty() {
        eprintln!("No files specified. Use --help for usage.");
        std::process::exit(1);
    }

    for file in files {
        match mayi_unlock::unlock_to(file, output) {
            Ok((out, _)) => println!("{} -> {}", file.display(), out.display()),
            Err(e) => eprintln!("error: {}: {e}", file.display()),
        }
    }

    Ok(())
}
