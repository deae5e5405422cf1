//! Ingestion routing and the library manager.
//!
//! `LibraryManager` is the exclusive owner of the catalog: every mutating
//! operation takes `&mut self`, so catalog writes are single-writer by
//! construction. `add_music_file` is the sole mutator of `Library/`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::catalog::{Catalog, CatalogStats, SongRecord, SongStatus};
use crate::config::{Config, is_supported_ext};
use crate::error::{LibraryError, Result};
use crate::extract::{extract_metadata, refresh_thumbnail};
use crate::unlock::{self, UnlockReport};

/// Where a file ended up after ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    Library,
    Duplicate,
    Trash,
    /// Processing failed and the trash move failed too; the file is left
    /// in place.
    Failed,
}

/// Per-file result of `add_music_file`.
#[derive(Debug)]
pub struct IngestOutcome {
    pub status: IngestStatus,
    /// Destination after routing; `None` when even the trash move failed.
    pub final_path: Option<PathBuf>,
    pub error: Option<String>,
}

/// Tallies for a whole `ingest_new` run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub added: usize,
    pub duplicates: Vec<String>,
    pub trashed: Vec<String>,
    pub failed: Vec<String>,
}

/// Tallies for a `scan_library` run.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub new_songs: usize,
    pub updated_thumbnails: usize,
    pub total_songs: usize,
    pub moved_to_trash: Vec<String>,
    pub failed_files: Vec<String>,
}

/// Tallies for a `check_duplicates_in_library` sweep.
#[derive(Debug, Default)]
pub struct DedupeReport {
    pub duplicate_groups: usize,
    pub moved_files: Vec<String>,
    pub failed_moves: Vec<String>,
    pub total_files_checked: usize,
}

/// Owner of the catalog and the role directories.
pub struct LibraryManager {
    config: Config,
    catalog: Catalog,
}

impl LibraryManager {
    /// Create the role directories and load the catalog.
    pub fn new(config: Config) -> Result<Self> {
        config.ensure_directories()?;
        let catalog = Catalog::load(&config.catalog_path);
        Ok(Self { config, catalog })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Snapshot of the current records.
    pub fn songs(&self) -> Vec<SongRecord> {
        self.catalog.songs.clone()
    }

    pub fn search(&self, query: &str) -> Vec<SongRecord> {
        self.catalog.search(query)
    }

    pub fn statistics(&self) -> CatalogStats {
        self.catalog.statistics()
    }

    /// Timestamped catalog copy in the base directory.
    pub fn export_backup(&self) -> Result<PathBuf> {
        self.catalog.export_backup(&self.config.base_dir)
    }

    /// Route one file from `New/` into `Library/`, `Duplicate/`, or
    /// `Trash/`, updating the catalog for library entries.
    pub fn add_music_file(&mut self, path: &Path) -> IngestOutcome {
        match self.try_ingest(path) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ingest failed, moving to trash");
                match move_with_suffix(path, &self.config.trash_dir) {
                    Ok(dest) => IngestOutcome {
                        status: IngestStatus::Trash,
                        final_path: Some(dest),
                        error: Some(err.to_string()),
                    },
                    Err(move_err) => IngestOutcome {
                        status: IngestStatus::Failed,
                        final_path: None,
                        error: Some(format!("{err}; trash move failed: {move_err}")),
                    },
                }
            }
        }
    }

    fn try_ingest(&mut self, path: &Path) -> Result<IngestOutcome> {
        let mut record = extract_metadata(path, &self.config.thumbnails_dir)?;
        if record.title.trim().is_empty() {
            return Err(LibraryError::Metadata("no title".into()));
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        // Duplicates: byte-identical (hash) or same stem ignoring case,
        // as long as the existing record still has a live backing file.
        let is_duplicate = self.catalog.songs.iter().any(|song| {
            let same_hash = !record.file_hash.is_empty() && song.file_hash == record.file_hash;
            let existing = Path::new(&song.file_path);
            let same_stem = existing
                .file_stem()
                .is_some_and(|s| s.to_string_lossy().to_lowercase() == stem)
                && existing.exists();
            same_hash || same_stem
        });

        if is_duplicate {
            let dest = move_with_suffix(path, &self.config.duplicate_dir)?;
            info!(from = %path.display(), to = %dest.display(), "duplicate routed");
            return Ok(IngestOutcome {
                status: IngestStatus::Duplicate,
                final_path: Some(dest),
                error: None,
            });
        }

        let dest = move_with_suffix(path, &self.config.library_dir)?;
        record.file_path = dest.display().to_string();
        record.status = SongStatus::Library;
        record.date_added = Some(Local::now().to_rfc3339());
        self.catalog.songs.push(record);
        self.catalog.save(&self.config.catalog_path)?;
        info!(path = %dest.display(), "added to library");

        Ok(IngestOutcome {
            status: IngestStatus::Library,
            final_path: Some(dest),
            error: None,
        })
    }

    /// Ingest every supported file sitting in `New/`.
    pub fn ingest_new(&mut self) -> Result<IngestReport> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.config.new_dir)?
            .filter_map(std::result::Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .is_some_and(|e| is_supported_ext(&e.to_string_lossy().to_lowercase()))
            })
            .collect();
        files.sort();

        let mut report = IngestReport::default();
        for file in &files {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let outcome = self.add_music_file(file);
            match outcome.status {
                IngestStatus::Library => report.added += 1,
                IngestStatus::Duplicate => report.duplicates.push(name),
                IngestStatus::Trash => report.trashed.push(name),
                IngestStatus::Failed => report.failed.push(name),
            }
        }
        Ok(report)
    }

    /// Walk `Library/`, indexing new files and refreshing thumbnail state
    /// of known ones. Files whose metadata cannot be read go to `Trash/`.
    pub fn scan_library(&mut self) -> Result<ScanReport> {
        let mut report = ScanReport::default();
        let mut new_songs: Vec<SongRecord> = Vec::new();

        for entry in WalkDir::new(&self.config.library_dir)
            .into_iter()
            .filter_map(std::result::Result::ok)
        {
            let path = entry.path();
            if !entry.file_type().is_file()
                || !path
                    .extension()
                    .is_some_and(|e| is_supported_ext(&e.to_string_lossy().to_lowercase()))
            {
                continue;
            }

            let path_str = path.display().to_string();
            if let Some(song) = self
                .catalog
                .songs
                .iter_mut()
                .find(|s| s.file_path == path_str)
            {
                if !song.has_thumbnail {
                    let (has, base64) = refresh_thumbnail(path, &self.config.thumbnails_dir);
                    if has {
                        song.has_thumbnail = true;
                        song.thumbnail_base64 = base64;
                        report.updated_thumbnails += 1;
                    }
                }
                continue;
            }

            match extract_metadata(path, &self.config.thumbnails_dir) {
                Ok(mut record) => {
                    record.date_added = Some(Local::now().to_rfc3339());
                    record.status = SongStatus::Library;
                    new_songs.push(record);
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "scan reject, moving to trash");
                    report.failed_files.push(path_str.clone());
                    match move_with_suffix(path, &self.config.trash_dir) {
                        Ok(dest) => report.moved_to_trash.push(dest.display().to_string()),
                        Err(move_err) => {
                            warn!(path = %path.display(), error = %move_err, "trash move failed");
                        }
                    }
                }
            }
        }

        report.new_songs = new_songs.len();
        self.catalog.songs.extend(new_songs);
        self.catalog.save(&self.config.catalog_path)?;
        report.total_songs = self.catalog.songs.len();
        info!(
            new_songs = report.new_songs,
            updated_thumbnails = report.updated_thumbnails,
            total = report.total_songs,
            "library scan complete"
        );
        Ok(report)
    }

    /// Sweep `Library/` for same-stem groups (case-insensitive). A group
    /// is duplicate when it spans several extensions or several original
    /// casings; all of its members move to `Duplicate/`.
    pub fn check_duplicates_in_library(&mut self) -> Result<DedupeReport> {
        let mut report = DedupeReport::default();
        let mut groups: HashMap<String, Vec<PathBuf>> = HashMap::new();

        for entry in WalkDir::new(&self.config.library_dir)
            .into_iter()
            .filter_map(std::result::Result::ok)
        {
            let path = entry.path();
            if !entry.file_type().is_file()
                || !path
                    .extension()
                    .is_some_and(|e| is_supported_ext(&e.to_string_lossy().to_lowercase()))
            {
                continue;
            }
            report.total_files_checked += 1;
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            groups.entry(stem).or_default().push(path.to_path_buf());
        }

        for (stem, files) in groups {
            if files.len() < 2 {
                continue;
            }
            let extensions: HashSet<String> = files
                .iter()
                .filter_map(|f| f.extension().map(|e| e.to_string_lossy().to_lowercase()))
                .collect();
            let stems: HashSet<String> = files
                .iter()
                .filter_map(|f| f.file_stem().map(|s| s.to_string_lossy().into_owned()))
                .collect();
            if extensions.len() < 2 && stems.len() < 2 {
                continue;
            }

            report.duplicate_groups += 1;
            info!(%stem, files = files.len(), "duplicate group found");
            for file in files {
                match move_with_suffix(&file, &self.config.duplicate_dir) {
                    Ok(dest) => {
                        let original = file.display().to_string();
                        self.catalog.songs.retain(|s| s.file_path != original);
                        report.moved_files.push(dest.display().to_string());
                    }
                    Err(err) => {
                        warn!(path = %file.display(), error = %err, "duplicate move failed");
                        report.failed_moves.push(file.display().to_string());
                    }
                }
            }
        }

        if !report.moved_files.is_empty() {
            self.catalog.save(&self.config.catalog_path)?;
        }
        Ok(report)
    }

    /// Decrypt everything in `Unlocked/` into `New/` with the worker pool.
    /// Originals are retained.
    pub fn unlock_music_files(&self) -> Result<UnlockReport> {
        unlock::run_batch(&self.config)
    }
}

/// Move `src` into `dir`, appending `(N)` before the extension until the
/// destination name is free.
pub(crate) fn move_with_suffix(src: &Path, dir: &Path) -> std::io::Result<PathBuf> {
    let name = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_owned());
    let dest = unique_path(dir, &name);
    std::fs::rename(src, &dest)?;
    Ok(dest)
}

/// First free path for `file_name` inside `dir`.
pub(crate) fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let as_path = Path::new(file_name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_owned());
    let ext = as_path.extension().map(|e| e.to_string_lossy().into_owned());

    for n in 1.. {
        let name = match &ext {
            Some(ext) => format!("{stem}({n}).{ext}"),
            None => format!("{stem}({n})"),
        };
        let candidate = dir.join(name);
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!("suffix counter exhausted");
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::extract::tiny_wav;

    fn manager(dir: &Path) -> LibraryManager {
        LibraryManager::new(Config::new(dir)).unwrap()
    }

    #[test]
    fn unique_path_suffix_chain() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Song (1).mp3"), b"x").unwrap();
        let next = unique_path(dir.path(), "Song (1).mp3");
        assert_eq!(next.file_name().unwrap().to_string_lossy(), "Song (1)(1).mp3");

        std::fs::write(dir.path().join("Song (1)(1).mp3"), b"x").unwrap();
        let next = unique_path(dir.path(), "Song (1).mp3");
        assert_eq!(next.file_name().unwrap().to_string_lossy(), "Song (1)(2).mp3");
    }

    #[test]
    fn ingest_happy_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());

        let src = mgr.config().new_dir.join("song.wav");
        std::fs::write(&src, tiny_wav()).unwrap();

        let outcome = mgr.add_music_file(&src);
        assert_eq!(outcome.status, IngestStatus::Library);
        assert!(!src.exists());
        assert!(mgr.config().library_dir.join("song.wav").exists());

        let songs = mgr.songs();
        assert_eq!(songs.len(), 1);
        assert_eq!(songs[0].title, "song");
        assert_eq!(songs[0].status, SongStatus::Library);
        assert!(songs[0].date_added.is_some());

        // persisted
        let reloaded = Catalog::load(&mgr.config().catalog_path);
        assert_eq!(reloaded.songs.len(), 1);
    }

    #[test]
    fn ingest_duplicate_by_hash() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());

        let first = mgr.config().new_dir.join("song.wav");
        std::fs::write(&first, tiny_wav()).unwrap();
        assert_eq!(mgr.add_music_file(&first).status, IngestStatus::Library);

        // identical bytes under a different name
        let second = mgr.config().new_dir.join("renamed.wav");
        std::fs::write(&second, tiny_wav()).unwrap();
        let outcome = mgr.add_music_file(&second);
        assert_eq!(outcome.status, IngestStatus::Duplicate);
        assert!(mgr.config().duplicate_dir.join("renamed.wav").exists());
        assert_eq!(mgr.songs().len(), 1);
    }

    #[test]
    fn ingest_duplicate_by_name_ignores_case() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());

        let first = mgr.config().new_dir.join("song.wav");
        std::fs::write(&first, tiny_wav()).unwrap();
        assert_eq!(mgr.add_music_file(&first).status, IngestStatus::Library);

        // different bytes, same stem in a different case
        let mut other = tiny_wav();
        other.extend_from_slice(&[1, 2, 3, 4]);
        let second = mgr.config().new_dir.join("Song.wav");
        std::fs::write(&second, &other).unwrap();

        let outcome = mgr.add_music_file(&second);
        assert_eq!(outcome.status, IngestStatus::Duplicate);
        assert!(mgr.config().duplicate_dir.join("Song.wav").exists());
        assert_eq!(mgr.songs().len(), 1);
    }

    #[test]
    fn ingest_reject_goes_to_trash() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());

        let src = mgr.config().new_dir.join("broken.mp3");
        std::fs::write(&src, b"definitely not an mp3").unwrap();

        let outcome = mgr.add_music_file(&src);
        assert_eq!(outcome.status, IngestStatus::Trash);
        assert!(!src.exists());
        assert!(mgr.config().trash_dir.join("broken.mp3").exists());
        assert!(outcome.error.is_some());
        assert!(mgr.songs().is_empty());
    }

    #[test]
    fn ingest_twice_is_idempotent_at_catalog_level() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());

        for _ in 0..2 {
            let src = mgr.config().new_dir.join("song.wav");
            std::fs::write(&src, tiny_wav()).unwrap();
            mgr.add_music_file(&src);
        }

        assert_eq!(mgr.songs().len(), 1);
        assert!(mgr.config().library_dir.join("song.wav").exists());
        assert!(mgr.config().duplicate_dir.join("song.wav").exists());
    }

    #[test]
    fn ingest_new_tallies_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());

        std::fs::write(mgr.config().new_dir.join("one.wav"), tiny_wav()).unwrap();
        std::fs::write(mgr.config().new_dir.join("bad.mp3"), b"junk").unwrap();
        std::fs::write(mgr.config().new_dir.join("notes.txt"), b"skip me").unwrap();

        let report = mgr.ingest_new().unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(report.trashed, vec!["bad.mp3".to_owned()]);
        assert!(report.duplicates.is_empty());
        // unsupported extension untouched
        assert!(mgr.config().new_dir.join("notes.txt").exists());
    }

    #[test]
    fn dedupe_moves_whole_group() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());

        // same stem, two extensions; plus a case-variant pair
        std::fs::write(mgr.config().library_dir.join("track.mp3"), b"a").unwrap();
        std::fs::write(mgr.config().library_dir.join("track.flac"), b"b").unwrap();
        std::fs::write(mgr.config().library_dir.join("ballad.mp3"), b"c").unwrap();
        std::fs::write(mgr.config().library_dir.join("Ballad.mp3"), b"d").unwrap();
        std::fs::write(mgr.config().library_dir.join("solo.mp3"), b"e").unwrap();

        let report = mgr.check_duplicates_in_library().unwrap();
        assert_eq!(report.duplicate_groups, 2);
        assert_eq!(report.moved_files.len(), 4);
        assert!(mgr.config().library_dir.join("solo.mp3").exists());
        assert!(!mgr.config().library_dir.join("track.mp3").exists());
        assert!(!mgr.config().library_dir.join("track.flac").exists());

        // postcondition: every remaining stem group has size 1
        let mut stems = HashSet::new();
        for entry in std::fs::read_dir(&mgr.config().library_dir).unwrap() {
            let path = entry.unwrap().path();
            let stem = path.file_stem().unwrap().to_string_lossy().to_lowercase();
            assert!(stems.insert(stem));
        }
    }

    #[test]
    fn dedupe_removes_catalog_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());

        let src = mgr.config().new_dir.join("twin.wav");
        std::fs::write(&src, tiny_wav()).unwrap();
        assert_eq!(mgr.add_music_file(&src).status, IngestStatus::Library);

        // a case-variant shows up in the library behind the catalog's back
        std::fs::write(mgr.config().library_dir.join("Twin.wav"), b"other").unwrap();

        let report = mgr.check_duplicates_in_library().unwrap();
        assert_eq!(report.duplicate_groups, 1);
        assert!(mgr.songs().is_empty());
    }

    #[test]
    fn scan_indexes_new_and_trashes_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = manager(dir.path());

        std::fs::write(mgr.config().library_dir.join("found.wav"), tiny_wav()).unwrap();
        std::fs::write(mgr.config().library_dir.join("junk.flac"), b"not flac").unwrap();

        let report = mgr.scan_library().unwrap();
        assert_eq!(report.new_songs, 1);
        assert_eq!(report.total_songs, 1);
        assert_eq!(report.moved_to_trash.len(), 1);
        assert!(mgr.config().trash_dir.join("junk.flac").exists());
        assert!(!mgr.config().library_dir.join("junk.flac").exists());
    }
}
