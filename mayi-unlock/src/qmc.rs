//! QMC family container handling.
//!
//! Most QMC extensions are the whole file XORed with the default mask.
//! `mgg`/`mflac` instead carry a per-file key in a trailer: the last 4
//! bytes are a little-endian key length `L`, the key is the `L` bytes
//! before them, and the audio is everything up to the key.

use crate::cipher::QmcMask;
use crate::error::{Result, UnlockError};

/// Expected container per QMC extension, used as the sniffer fallback.
pub(crate) fn expected_container(ext: &str) -> &'static str {
    match ext {
        "qmc2" | "qmcogg" | "mgg" | "6f6767" => "ogg",
        "qmcflac" | "bkcflac" | "mflac" | "666c6163" => "flac",
        "tkm" | "6d3461" => "m4a",
        "776176" => "wav",
        // qmc0 / qmc3 / bkcmp3 / 6d7033 and anything unrecognised
        _ => "mp3",
    }
}

/// Extensions whose mask must be derived from an embedded key.
pub(crate) fn is_keyed(ext: &str) -> bool {
    matches!(ext, "mgg" | "mflac")
}

/// Audio/key split of a keyed QMC file.
pub(crate) struct KeyedFrame<'a> {
    pub audio: &'a [u8],
    pub key: &'a [u8],
}

/// Locate the embedded key trailer of an `mgg`/`mflac` file.
pub(crate) fn split_keyed(data: &[u8]) -> Result<KeyedFrame<'_>> {
    if data.len() < 4 {
        return Err(UnlockError::Crypto("keyed QMC file truncated".into()));
    }
    let (body, trailer) = data.split_at(data.len() - 4);
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(trailer);
    let key_len = u32::from_le_bytes(len_bytes) as usize;
    if key_len == 0 || key_len > body.len() {
        return Err(UnlockError::Crypto(format!(
            "inconsistent embedded key length {key_len}"
        )));
    }
    let (audio, key) = body.split_at(body.len() - key_len);
    Ok(KeyedFrame { audio, key })
}

/// Decrypt a QMC payload for the given (lowercased) extension.
pub(crate) fn decrypt(data: &[u8], ext: &str) -> Result<Vec<u8>> {
    if is_keyed(ext) {
        // Validate the framing so truncated files fail loudly, then reject:
        // the per-file mask derivation for these variants is not available.
        let frame = split_keyed(data)?;
        tracing::debug!(
            audio_len = frame.audio.len(),
            key_len = frame.key.len(),
            "keyed QMC framing parsed, derivation unsupported"
        );
        return Err(UnlockError::UnsupportedKeyedMask(ext.to_owned()));
    }

    let mut out = data.to_vec();
    QmcMask::new().decrypt(&mut out);
    Ok(out)
}
