//! Batch decryption of `Unlocked/` into `New/` over a bounded worker pool.
//!
//! Each task is CPU-bound (crypto plus image re-encode) with short I/O
//! bursts, so the pool is sized from the CPU count and the batch size.
//! Originals are retained in `Unlocked/`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use cover_api::CoverClient;
use mayi_unlock::DecryptResult;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::{Config, is_supported_ext};
use crate::error::Result;
use crate::router::unique_path;

/// One file that could not be unlocked.
#[derive(Debug, Clone)]
pub struct UnlockFailure {
    pub file: String,
    pub error: String,
}

/// Aggregate outcome of an unlock batch.
#[derive(Debug, Default)]
pub struct UnlockReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<UnlockFailure>,
    pub elapsed_secs: f64,
    pub files_per_second: f64,
    pub avg_secs_per_file: f64,
    pub workers: usize,
    pub cpu_count: usize,
}

/// Decrypt every encrypted file under the `Unlocked/` root.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn run_batch(config: &Config) -> Result<UnlockReport> {
    let cpu_count = std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get);

    // Everything except plain audio is an unlock candidate; unknown
    // extensions run through the dispatcher so they show up as
    // per-file "unsupported format" failures rather than being skipped.
    let mut files: Vec<PathBuf> = WalkDir::new(&config.unlocked_dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|p| {
            let ext = p
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            !is_supported_ext(&ext)
        })
        .collect();
    files.sort();

    if files.is_empty() {
        info!(dir = %config.unlocked_dir.display(), "no encrypted files to unlock");
        return Ok(UnlockReport {
            cpu_count,
            ..UnlockReport::default()
        });
    }

    let workers = config
        .unlock_workers
        .unwrap_or_else(|| 2.max(cpu_count.min(files.len()).min(8)));
    info!(
        files = files.len(),
        workers, cpu_count, "starting unlock batch"
    );

    let cover = if config.fetch_artwork {
        match CoverClient::new() {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "cover client unavailable, skipping artwork");
                None
            }
        }
    } else {
        None
    };

    let pool = rusty_pool::Builder::default().max_size(workers).build();
    let start = Instant::now();

    let handles: Vec<_> = files
        .iter()
        .map(|file| {
            let file = file.clone();
            let new_dir = config.new_dir.clone();
            let cover = cover.clone();
            pool.evaluate(move || unlock_single(&file, &new_dir, cover.as_ref()))
        })
        .collect();

    let total = handles.len();
    let interval = 1.max((total / 10).min(5));
    let mut report = UnlockReport {
        processed: total,
        workers,
        cpu_count,
        ..UnlockReport::default()
    };

    for (i, handle) in handles.into_iter().enumerate() {
        match handle.await_complete() {
            Ok(_) => report.succeeded += 1,
            Err(failure) => {
                report.failed += 1;
                report.failures.push(failure);
            }
        }
        let done = i + 1;
        if done % interval == 0 || done == total {
            let pct = done as f64 * 100.0 / total as f64;
            info!(
                "progress: {done}/{total} files ({pct:.1}%) - success: {}, failed: {}",
                report.succeeded, report.failed
            );
        }
    }

    report.elapsed_secs = start.elapsed().as_secs_f64();
    if report.elapsed_secs > 0.0 {
        report.files_per_second = total as f64 / report.elapsed_secs;
        report.avg_secs_per_file = report.elapsed_secs / total as f64;
    }
    info!(
        "unlock batch complete in {:.2}s: {} successful, {} failed \
         ({:.2} files/s, {:.2}s/file avg, {} workers, {} cpus)",
        report.elapsed_secs,
        report.succeeded,
        report.failed,
        report.files_per_second,
        report.avg_secs_per_file,
        report.workers,
        report.cpu_count,
    );

    Ok(report)
}

fn unlock_single(
    path: &Path,
    new_dir: &Path,
    cover: Option<&CoverClient>,
) -> std::result::Result<PathBuf, UnlockFailure> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let run = || -> crate::Result<PathBuf> {
        let result = mayi_unlock::decrypt_file(path)?;
        let dest = unique_path(new_dir, &result.file_name);
        std::fs::write(&dest, &result.data)?;

        let art = resolve_cover(&result, cover);
        if let Err(e) = mayi_unlock::write_tags(&dest, &result, art.as_deref()) {
            warn!(path = %dest.display(), error = %e, "tag embed failed");
        }

        info!(from = %path.display(), to = %dest.display(), "unlocked");
        Ok(dest)
    };

    run().map_err(|e| UnlockFailure {
        file: file_name,
        error: e.to_string(),
    })
}

/// Pick cover bytes for a decrypted file. Order: metadata URL, embedded
/// image, then (for QMC, which carries no metadata) the qq-cover lookup.
/// Every failure is a warning; artwork is optional.
fn resolve_cover(result: &DecryptResult, client: Option<&CoverClient>) -> Option<Vec<u8>> {
    if let (Some(url), Some(client)) = (&result.cover_url, client) {
        match client.fetch(url) {
            Ok(img) => return Some(img.data),
            Err(e) => warn!(%url, error = %e, "artwork download failed"),
        }
    }

    if let Some(bytes) = &result.cover {
        return Some(bytes.clone());
    }

    let client = client?;
    let is_qmc = result.raw_ext != "ncm" && mayi_unlock::is_encrypted_ext(&result.raw_ext);
    if !is_qmc || result.title.is_empty() {
        return None;
    }
    match client.query_qq_cover(&result.title, result.artist.as_deref(), result.album.as_deref()) {
        Ok(Some(url)) => match client.fetch(&url) {
            Ok(img) => Some(img.data),
            Err(e) => {
                warn!(%url, error = %e, "artwork download failed");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(title = %result.title, error = %e, "cover lookup failed");
            None
        }
    }
}
