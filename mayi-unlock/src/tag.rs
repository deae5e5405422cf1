//! Tag rewriting for decrypted files.
//!
//! Only metadata frames are touched: FLAC gets a PICTURE block, MP3 an
//! ID3v2 APIC frame. Other containers are left untouched. The audio
//! stream itself is never rewritten.

use std::path::Path;

use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::tag::{Accessor, Tag, TagExt};
use tracing::debug;

use crate::dispatch::DecryptResult;
use crate::error::{Result, UnlockError};

/// Write title/artist/album and an optional front cover into the
/// decrypted file at `path`.
///
/// Containers other than MP3 and FLAC are skipped silently.
pub fn write_tags(path: &Path, result: &DecryptResult, cover: Option<&[u8]>) -> Result<()> {
    if result.ext != "mp3" && result.ext != "flac" {
        debug!(ext = %result.ext, "skipping tag embed for container");
        return Ok(());
    }

    let mut tagged_file = lofty::read_from_path(path).map_err(|e| UnlockError::Tag(e.to_string()))?;

    // a freshly decrypted stream may carry no tag container at all
    if tagged_file.primary_tag().is_none() {
        let tag_type = tagged_file.primary_tag_type();
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged_file
        .primary_tag_mut()
        .ok_or_else(|| UnlockError::Tag("failed to create tag".into()))?;

    if !result.title.is_empty() {
        tag.set_title(result.title.clone());
    }
    if let Some(artist) = &result.artist {
        tag.set_artist(artist.clone());
    }
    if let Some(album) = &result.album {
        tag.set_album(album.clone());
    }

    if let Some(img) = cover {
        let picture = Picture::new_unchecked(
            PictureType::CoverFront,
            Some(MimeType::Jpeg),
            Some(String::from("Cover")),
            img.to_vec(),
        );
        tag.push_picture(picture);
    }

    tag.save_to_path(path, WriteOptions::default())
        .map_err(|e| UnlockError::Tag(e.to_string()))?;

    Ok(())
}
