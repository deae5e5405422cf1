//! Audio metadata and thumbnail extraction.
//!
//! Reads container headers through lofty, hashes the file, and pulls the
//! first embedded cover into a 300x300 JPEG thumbnail. Thumbnail work is
//! idempotent: an existing file short-circuits.

use std::io::Read;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use lofty::file::{AudioFile, FileType, TaggedFile, TaggedFileExt};
use lofty::tag::Accessor;
use md5::{Digest, Md5};
use tracing::{debug, warn};

use crate::catalog::{SongRecord, SongStatus};
use crate::error::{LibraryError, Result};
use crate::sanitize::sanitize_filename;

/// Which tag family supplied the embedded cover, decided by container
/// type rather than by probing tag shapes at runtime.
#[derive(Debug, Clone, Copy)]
enum CoverSource {
    Id3Apic,
    FlacPicture,
    VorbisPicture,
    Mp4Covr,
}

fn cover_source(file_type: FileType) -> CoverSource {
    match file_type {
        FileType::Flac => CoverSource::FlacPicture,
        FileType::Vorbis | FileType::Opus | FileType::Speex => CoverSource::VorbisPicture,
        FileType::Mp4 => CoverSource::Mp4Covr,
        _ => CoverSource::Id3Apic,
    }
}

/// Read headers, tags, hash, and thumbnail state for a file.
///
/// `file_path`/`status`/`date_added` are filled with provisional values;
/// the ingestion router overwrites them when it decides where the file
/// lands.
pub fn extract_metadata(path: &Path, thumbnails_dir: &Path) -> Result<SongRecord> {
    let file_size = std::fs::metadata(path)?.len();
    let file_hash = file_md5(path)?;

    let tagged = lofty::read_from_path(path)
        .map_err(|e| LibraryError::Metadata(format!("{}: {e}", path.display())))?;

    let props = tagged.properties();
    let duration = Some(props.duration().as_secs());
    let bitrate = props.audio_bitrate();
    let sample_rate = props.sample_rate();

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let tag = tagged.primary_tag().or_else(|| tagged.first_tag());
    let title = tag
        .and_then(|t| t.title())
        .map(|t| t.into_owned())
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| stem.clone());
    let artist = tag.and_then(|t| t.artist()).map(|a| a.into_owned());
    let album = tag.and_then(|t| t.album()).map(|a| a.into_owned());
    let track_number = tag.and_then(|t| t.track());
    let date = tag.and_then(|t| t.year()).map(|y| y.to_string());
    let genre = tag.and_then(|t| t.genre()).map(|g| g.into_owned());

    let (has_thumbnail, thumbnail_base64) = extract_thumbnail(&tagged, &stem, thumbnails_dir);

    Ok(SongRecord {
        file_path: path.display().to_string(),
        file_size,
        file_hash,
        duration,
        bitrate,
        sample_rate,
        title,
        artist,
        album,
        track_number,
        date,
        genre,
        has_thumbnail,
        thumbnail_base64,
        date_added: None,
        status: SongStatus::Library,
    })
}

/// Re-derive thumbnail state for an already-indexed file. Never fails;
/// a file that cannot be read simply has no thumbnail.
pub fn refresh_thumbnail(path: &Path, thumbnails_dir: &Path) -> (bool, Option<String>) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match lofty::read_from_path(path) {
        Ok(tagged) => extract_thumbnail(&tagged, &stem, thumbnails_dir),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "thumbnail refresh failed");
            (false, None)
        }
    }
}

/// MD5 of the file, read in 4 KiB chunks.
pub fn file_md5(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Pull the first embedded picture into `thumbnails/<stem>.jpg` and
/// return the `(has_thumbnail, base64)` pair for the record.
fn extract_thumbnail(
    tagged: &TaggedFile,
    stem: &str,
    thumbnails_dir: &Path,
) -> (bool, Option<String>) {
    let dest = thumbnails_dir.join(format!("{}.jpg", sanitize_filename(stem)));

    if !dest.exists() {
        let Some(picture) = tagged.tags().iter().find_map(|t| t.pictures().first()) else {
            debug!(%stem, "no embedded artwork");
            return (false, None);
        };
        debug!(%stem, source = ?cover_source(tagged.file_type()), "found embedded artwork");

        if let Err(e) = write_thumbnail(picture.data(), &dest) {
            warn!(%stem, error = %e, "thumbnail generation failed");
            return (false, None);
        }
    }

    let base64 = std::fs::read(&dest).ok().map(|b| BASE64.encode(b));
    (true, base64)
}

/// Decode, force RGB, fit into 300x300, and write as JPEG quality 85.
fn write_thumbnail(data: &[u8], dest: &Path) -> Result<()> {
    let img = image::load_from_memory(data)?;
    let img = if img.width() > 300 || img.height() > 300 {
        img.resize(300, 300, FilterType::Lanczos3)
    } else {
        img
    };
    let rgb = img.into_rgb8();

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = std::io::BufWriter::new(std::fs::File::create(dest)?);
    let encoder = JpegEncoder::new_with_quality(&mut out, 85);
    rgb.write_with_encoder(encoder)?;
    Ok(())
}

/// Minimal 1-second mono 16-bit PCM WAV, shared by filesystem tests.
#[cfg(test)]
pub(crate) fn tiny_wav() -> Vec<u8> {
    let sample_rate: u32 = 8000;
    let data = vec![0u8; (sample_rate * 2) as usize];
    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    out.extend_from_slice(&2u16.to_le_bytes()); // block align
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&data);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    #[test]
    fn wav_extraction_falls_back_to_stem_title() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nice song.wav");
        std::fs::write(&path, tiny_wav()).unwrap();

        let record = extract_metadata(&path, &dir.path().join("thumbnails")).unwrap();
        assert_eq!(record.title, "nice song");
        assert_eq!(record.file_hash.len(), 32);
        assert_eq!(record.sample_rate, Some(8000));
        assert_eq!(record.duration, Some(1));
        assert!(!record.has_thumbnail);
        assert!(record.date_added.is_none());
    }

    #[test]
    fn unparseable_file_is_a_metadata_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.mp3");
        std::fs::write(&path, b"this is not audio at all").unwrap();

        assert!(matches!(
            extract_metadata(&path, dir.path()),
            Err(LibraryError::Metadata(_))
        ));
    }

    #[test]
    fn md5_matches_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.bin");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(file_md5(&path).unwrap(), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn thumbnail_is_downscaled_and_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("thumbs").join("x.jpg");

        let big = image::DynamicImage::new_rgba8(600, 400);
        let mut buf = Cursor::new(Vec::new());
        big.write_to(&mut buf, image::ImageFormat::Png).unwrap();

        write_thumbnail(buf.get_ref(), &dest).unwrap();
        let thumb = image::open(&dest).unwrap();
        assert!(thumb.width() <= 300 && thumb.height() <= 300);
        // aspect ratio kept: 600x400 fits as 300x200
        assert_eq!((thumb.width(), thumb.height()), (300, 200));
    }
}
