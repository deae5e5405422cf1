mod cipher;
mod dispatch;
pub mod error;
mod metadata;
mod ncm;
mod qmc;
mod sniff;
mod tag;

pub use cipher::QmcMask;
pub use dispatch::{DecryptResult, decrypt_file, is_encrypted_ext};
pub use error::{Result, UnlockError};
pub use metadata::NcmMetadata;
pub use ncm::NcmFile;
pub use sniff::{mime_for_ext, sniff_audio_ext};
pub use tag::write_tags;

use std::path::{Path, PathBuf};

/// Decrypt a single file and write the plain audio next to it (or into
/// `output_dir`). Returns the output path and the decrypt result.
///
/// Cover handling is left to the caller; this writes the audio only.
pub fn unlock_to(input: &Path, output_dir: Option<&Path>) -> Result<(PathBuf, DecryptResult)> {
    let result = decrypt_file(input)?;

    let out_dir = output_dir.unwrap_or_else(|| input.parent().unwrap_or(Path::new(".")));
    let output_path = out_dir.join(&result.file_name);
    std::fs::write(&output_path, &result.data)?;

    Ok((output_path, result))
}
