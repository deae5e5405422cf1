//! The persistent song catalog.
//!
//! A single pretty-printed JSON document is the only persistent state of
//! the service. Records describe files inside `Library/`; anything routed
//! to `Duplicate/` or `Trash/` has no record.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;

/// Where a record's backing file currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SongStatus {
    Library,
    Duplicate,
}

fn default_status() -> SongStatus {
    SongStatus::Library
}

/// One indexed song.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongRecord {
    pub file_path: String,
    pub file_size: u64,
    /// MD5 of the file bytes; identifies byte-identical files.
    pub file_hash: String,
    /// Duration in whole seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    /// Bitrate in kbps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(rename = "tracknumber", skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default)]
    pub has_thumbnail: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_base64: Option<String>,
    /// ISO-8601, stamped when the file enters the library.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_added: Option<String>,
    #[serde(default = "default_status")]
    pub status: SongStatus,
}

/// Aggregate numbers over the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub total_songs: usize,
    /// Sum of file sizes in bytes.
    pub total_size: u64,
    /// Song count per lowercased file extension.
    pub formats: BTreeMap<String, usize>,
    /// Song count per artist; songs without one land in `Unknown Artist`.
    pub artists: BTreeMap<String, usize>,
    pub last_updated: Option<String>,
}

/// The on-disk catalog document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub songs: Vec<SongRecord>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl Catalog {
    /// Read the catalog from disk. A missing or unparseable file yields an
    /// empty catalog.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(catalog) => catalog,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "catalog unreadable, starting empty");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Persist the catalog: reconcile transient duplicate hashes, bump
    /// `last_updated`, and write pretty-printed UTF-8 JSON.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.reconcile_hashes();
        self.last_updated = Some(Local::now().to_rfc3339());
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(songs = self.songs.len(), path = %path.display(), "catalog saved");
        Ok(())
    }

    /// A scan can briefly index the same bytes under two names; keep the
    /// first record per hash.
    fn reconcile_hashes(&mut self) {
        let mut seen = HashSet::new();
        self.songs
            .retain(|s| s.file_hash.is_empty() || seen.insert(s.file_hash.clone()));
    }

    /// Write a timestamped copy into `dir` and return its path.
    pub fn export_backup(&self, dir: &Path) -> Result<PathBuf> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("mayi-music-list-backup-{stamp}.json"));
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), "catalog backup exported");
        Ok(path)
    }

    /// Case-insensitive substring search over title, artist, and album,
    /// returned in catalog order.
    pub fn search(&self, query: &str) -> Vec<SongRecord> {
        let query = query.to_lowercase();
        self.songs
            .iter()
            .filter(|s| {
                s.title.to_lowercase().contains(&query)
                    || s.artist
                        .as_deref()
                        .is_some_and(|a| a.to_lowercase().contains(&query))
                    || s.album
                        .as_deref()
                        .is_some_and(|a| a.to_lowercase().contains(&query))
            })
            .cloned()
            .collect()
    }

    /// Totals and histograms over the current records.
    pub fn statistics(&self) -> CatalogStats {
        let mut formats: BTreeMap<String, usize> = BTreeMap::new();
        let mut artists: BTreeMap<String, usize> = BTreeMap::new();

        for song in &self.songs {
            let ext = Path::new(&song.file_path)
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            *formats.entry(ext).or_default() += 1;

            let artist = song.artist.clone().unwrap_or_else(|| "Unknown Artist".to_owned());
            *artists.entry(artist).or_default() += 1;
        }

        CatalogStats {
            total_songs: self.songs.len(),
            total_size: self.songs.iter().map(|s| s.file_size).sum(),
            formats,
            artists,
            last_updated: self.last_updated.clone(),
        }
    }
}
