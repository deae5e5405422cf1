//! Directory roles and tunables for a library service root.
//!
//! Every file owned by the service lives in exactly one of the role
//! directories at any moment: encrypted originals in `Unlocked/`,
//! decrypted-but-unindexed audio in `New/`, canonical files in
//! `Library/`, collisions in `Duplicate/`, rejects in `Trash/`.

use std::io;
use std::path::{Path, PathBuf};

/// Plain audio extensions the library accepts.
pub const SUPPORTED_EXTS: [&str; 7] = ["mp3", "m4a", "flac", "wav", "aac", "ogg", "wma"];

/// Whether a lowercased extension is in the supported plain-audio set.
pub fn is_supported_ext(ext: &str) -> bool {
    SUPPORTED_EXTS.contains(&ext)
}

/// Paths and tunables, all derived from one base directory.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_dir: PathBuf,
    pub library_dir: PathBuf,
    pub new_dir: PathBuf,
    pub duplicate_dir: PathBuf,
    pub trash_dir: PathBuf,
    pub unlocked_dir: PathBuf,
    pub thumbnails_dir: PathBuf,
    /// The persistent catalog file.
    pub catalog_path: PathBuf,
    /// Fixed unlock worker count; auto-detected when `None`.
    pub unlock_workers: Option<usize>,
    /// Whether unlock looks up and embeds cover art. Off means fully
    /// offline operation.
    pub fetch_artwork: bool,
}

impl Config {
    /// Standard layout under `base`.
    pub fn new(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref().to_path_buf();
        Self {
            library_dir: base.join("Library"),
            new_dir: base.join("New"),
            duplicate_dir: base.join("Duplicate"),
            trash_dir: base.join("Trash"),
            unlocked_dir: base.join("Unlocked"),
            thumbnails_dir: base.join("thumbnails"),
            catalog_path: base.join("mayi-music-list.json"),
            unlock_workers: None,
            fetch_artwork: true,
            base_dir: base,
        }
    }

    /// Create every role directory that does not exist yet.
    pub fn ensure_directories(&self) -> io::Result<()> {
        for dir in [
            &self.library_dir,
            &self.new_dir,
            &self.duplicate_dir,
            &self.trash_dir,
            &self.unlocked_dir,
            &self.thumbnails_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
