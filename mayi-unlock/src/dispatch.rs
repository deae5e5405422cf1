//! Extension-based format dispatch.
//!
//! `decrypt_file` is the single entry point: it picks a handler from the
//! lowercased extension, runs it, and returns a [`DecryptResult`] holding
//! the plain audio plus everything the ingestion side needs (sniffed
//! container, display metadata, optional cover material).

use std::fs::File;
use std::path::Path;

use tracing::debug;

use crate::error::{Result, UnlockError};
use crate::metadata::NcmMetadata;
use crate::ncm::NcmFile;
use crate::qmc;
use crate::sniff::{mime_for_ext, sniff_audio_ext};

/// Outcome of decrypting a single file.
#[derive(Debug, Clone)]
pub struct DecryptResult {
    /// Song title (embedded metadata, else derived from the filename).
    pub title: String,
    pub album: Option<String>,
    pub artist: Option<String>,
    /// MIME of the detected container.
    pub mime: String,
    /// Detected container extension (`mp3`, `flac`, ...).
    pub ext: String,
    /// Output filename: original stem + detected extension.
    pub file_name: String,
    /// Decrypted audio bytes.
    pub data: Vec<u8>,
    /// Cover image embedded in the container, when present.
    pub cover: Option<Vec<u8>>,
    /// Cover URL from embedded metadata; preferred over `cover` when set.
    pub cover_url: Option<String>,
    /// Extension of the encrypted input.
    pub raw_ext: String,
    /// Stem of the encrypted input.
    pub raw_stem: String,
}

enum Handler {
    Ncm,
    NcmCache,
    Qmc,
    Kgm,
    Kwm,
    Xm,
    Raw,
}

fn handler_for(ext: &str) -> Option<Handler> {
    match ext {
        "ncm" => Some(Handler::Ncm),
        "uc" => Some(Handler::NcmCache),
        // the hex-named extensions are aliases some clients produce
        "qmc0" | "qmc3" | "qmc2" | "qmcogg" | "qmcflac" | "bkcmp3" | "bkcflac" | "mgg"
        | "mflac" | "tkm" | "6d7033" | "6f6767" | "666c6163" | "6d3461" | "776176" => {
            Some(Handler::Qmc)
        }
        "kgm" | "kgma" | "vpr" => Some(Handler::Kgm),
        "kwm" => Some(Handler::Kwm),
        "xm" => Some(Handler::Xm),
        "wav" | "mp3" | "flac" | "m4a" | "ogg" => Some(Handler::Raw),
        _ => None,
    }
}

/// Whether the extension belongs to the encrypted-format set (anything in
/// the dispatch table that is not raw passthrough).
pub fn is_encrypted_ext(ext: &str) -> bool {
    !matches!(handler_for(ext), None | Some(Handler::Raw))
}

/// Decrypt a single file, dispatching on its extension.
pub fn decrypt_file(path: &Path) -> Result<DecryptResult> {
    if !path.exists() {
        return Err(UnlockError::FileNotFound(path.display().to_string()));
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    match handler_for(&ext) {
        Some(Handler::Ncm) => decrypt_ncm(path, &ext, &stem),
        Some(Handler::Qmc) => decrypt_qmc(path, &ext, &stem),
        Some(Handler::Raw) => decrypt_raw(path, &ext, &stem),
        Some(Handler::NcmCache | Handler::Kgm | Handler::Kwm | Handler::Xm) => {
            debug!(%ext, "format family declared but not decryptable");
            Err(UnlockError::UnsupportedFormat(ext))
        }
        None => Err(UnlockError::UnsupportedFormat(ext)),
    }
}

/// Title/artist guessed from an `Artist - Title` style stem.
struct FilenameMeta {
    title: String,
    artist: Option<String>,
}

fn meta_from_stem(stem: &str, existing_title: Option<&str>) -> FilenameMeta {
    // an empty embedded title counts as unset
    let existing = existing_title.filter(|t| !t.is_empty());

    let mut parts = stem.split('-');
    let first = parts.next().unwrap_or("");
    match parts.next() {
        // only the first two segments are read; the rest is dropped
        Some(second) => FilenameMeta {
            title: existing.unwrap_or_else(|| second.trim()).to_owned(),
            artist: Some(first.trim().to_owned()).filter(|a| !a.is_empty()),
        },
        None => FilenameMeta {
            title: existing.unwrap_or_else(|| first.trim()).to_owned(),
            artist: None,
        },
    }
}

fn decrypt_ncm(path: &Path, raw_ext: &str, stem: &str) -> Result<DecryptResult> {
    let mut file = File::open(path)?;
    let ncm = NcmFile::parse(&mut file)?;
    let data = ncm.read_audio(&mut file)?;

    let ext = sniff_audio_ext(&data, "mp3");
    let meta = ncm.metadata.as_ref();

    let info = meta_from_stem(stem, meta.and_then(|m| m.music_name.as_deref()));
    let artist = meta.and_then(NcmMetadata::artist_names).or(info.artist);

    Ok(DecryptResult {
        title: info.title,
        album: meta.and_then(|m| m.album.clone()),
        artist,
        mime: mime_for_ext(&ext).to_owned(),
        file_name: format!("{stem}.{ext}"),
        ext,
        data,
        cover: ncm.cover_image.clone(),
        cover_url: meta.and_then(|m| m.album_pic.clone()),
        raw_ext: raw_ext.to_owned(),
        raw_stem: stem.to_owned(),
    })
}

fn decrypt_qmc(path: &Path, raw_ext: &str, stem: &str) -> Result<DecryptResult> {
    let cipher = std::fs::read(path)?;
    let data = qmc::decrypt(&cipher, raw_ext)?;

    let ext = sniff_audio_ext(&data, qmc::expected_container(raw_ext));
    let info = meta_from_stem(stem, None);

    Ok(DecryptResult {
        title: info.title,
        album: None,
        artist: info.artist,
        mime: mime_for_ext(&ext).to_owned(),
        file_name: format!("{stem}.{ext}"),
        ext,
        data,
        cover: None,
        cover_url: None,
        raw_ext: raw_ext.to_owned(),
        raw_stem: stem.to_owned(),
    })
}

fn decrypt_raw(path: &Path, raw_ext: &str, stem: &str) -> Result<DecryptResult> {
    let data = std::fs::read(path)?;

    let ext = sniff_audio_ext(&data, raw_ext);
    let info = meta_from_stem(stem, None);

    Ok(DecryptResult {
        title: info.title,
        album: None,
        artist: info.artist,
        mime: mime_for_ext(&ext).to_owned(),
        file_name: format!("{stem}.{ext}"),
        ext,
        data,
        cover: None,
        cover_url: None,
        raw_ext: raw_ext.to_owned(),
        raw_stem: stem.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_with_separator_yields_artist_and_title() {
        let meta = meta_from_stem("Some Artist - Some Title", None);
        assert_eq!(meta.title, "Some Title");
        assert_eq!(meta.artist.as_deref(), Some("Some Artist"));
    }

    #[test]
    fn embedded_title_wins_over_stem() {
        let meta = meta_from_stem("Artist - Title", Some("Real Title"));
        assert_eq!(meta.title, "Real Title");
        assert_eq!(meta.artist.as_deref(), Some("Artist"));
    }

    #[test]
    fn empty_embedded_title_falls_back_to_stem() {
        let meta = meta_from_stem("Artist - Title", Some(""));
        assert_eq!(meta.title, "Title");
        assert_eq!(meta.artist.as_deref(), Some("Artist"));

        let meta = meta_from_stem("Solo", Some(""));
        assert_eq!(meta.title, "Solo");
    }

    #[test]
    fn segments_past_the_second_are_dropped() {
        let meta = meta_from_stem("A-B-C", None);
        assert_eq!(meta.title, "B");
        assert_eq!(meta.artist.as_deref(), Some("A"));
    }

    #[test]
    fn encrypted_ext_set() {
        for ext in ["ncm", "qmc0", "qmcflac", "mflac", "mgg", "kgm", "kwm", "xm", "uc", "tkm"] {
            assert!(is_encrypted_ext(ext), "{ext} should be encrypted");
        }
        for ext in ["mp3", "flac", "wav", "ogg", "m4a", "txt", ""] {
            assert!(!is_encrypted_ext(ext), "{ext} should not be encrypted");
        }
    }

    #[test]
    fn missing_file_is_reported() {
        let err = decrypt_file(Path::new("/nonexistent/song.ncm")).unwrap_err();
        assert!(matches!(err, UnlockError::FileNotFound(_)));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        // existing file with an unknown extension
        let dir = std::env::temp_dir();
        let path = dir.join(format!("dispatch-test-unknown-{}.xyz", std::process::id()));
        std::fs::write(&path, b"data").unwrap();
        let err = decrypt_file(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, UnlockError::UnsupportedFormat(ext) if ext == "xyz"));
    }
}
