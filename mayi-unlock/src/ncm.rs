//! NCM container parsing and audio decryption.
//!
//! Layout: 8-byte magic `CTENFDAM`, 2-byte gap, AES-wrapped RC4 key
//! (each byte XOR 0x64), AES-wrapped metadata JSON (each byte XOR 0x63),
//! 4-byte CRC, image section, then the RC4-variant-encrypted audio stream.

use std::io::{Read, Seek, SeekFrom, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::cipher::{aes128_ecb_decrypt, rc4_keystream, rc4_ksa};
use crate::error::{Result, UnlockError};
use crate::metadata::NcmMetadata;

/// NCM file magic: "CTENFDAM"
const NCM_MAGIC: [u8; 8] = [0x43, 0x54, 0x45, 0x4E, 0x46, 0x44, 0x41, 0x4D];

/// AES key wrapping the RC4 key data.
const CORE_KEY: [u8; 16] = [
    0x68, 0x7A, 0x48, 0x52, 0x41, 0x6D, 0x73, 0x6F, 0x35, 0x6B, 0x49, 0x6E, 0x62, 0x61, 0x78, 0x57,
];

/// AES key wrapping the metadata blob.
const META_KEY: [u8; 16] = [
    0x23, 0x31, 0x34, 0x6C, 0x6A, 0x6B, 0x5F, 0x21, 0x5C, 0x5D, 0x26, 0x30, 0x55, 0x3C, 0x27, 0x28,
];

/// Parsed NCM file, ready for audio extraction.
pub struct NcmFile {
    pub metadata: Option<NcmMetadata>,
    pub cover_image: Option<Vec<u8>>,
    keystream: [u8; 256],
    audio_offset: u64,
}

impl NcmFile {
    /// Parse the container framing from a reader and derive the keystream.
    ///
    /// The reader is left positioned past the image section; call
    /// [`read_audio`](Self::read_audio) or [`dump_audio`](Self::dump_audio)
    /// to extract the stream.
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let mut magic = [0u8; 8];
        r.read_exact(&mut magic)?;
        if magic != NCM_MAGIC {
            return Err(UnlockError::InvalidMagic);
        }

        // 2-byte gap after the magic
        r.seek(SeekFrom::Current(2))?;

        // RC4 key: length-prefixed, XOR 0x64, then AES-unwrapped. The
        // plaintext starts with a 17-byte "neteasecloudmusic" preamble.
        let key_len = read_u32_le(r)? as usize;
        let mut key_data = vec![0u8; key_len];
        r.read_exact(&mut key_data)?;
        for b in &mut key_data {
            *b ^= 0x64;
        }
        let key_plain = aes128_ecb_decrypt(&CORE_KEY, &key_data)?;
        if key_plain.len() <= 17 {
            return Err(UnlockError::Crypto("RC4 key too short".into()));
        }
        let keystream = rc4_keystream(&rc4_ksa(&key_plain[17..]));

        // Metadata: length-prefixed, XOR 0x63. The first 22 bytes are the
        // "163 key(Don't modify):" marker, the rest is base64 of an AES
        // blob whose plaintext is `music:<json>` or `dj:<json>`.
        let meta_len = read_u32_le(r)? as usize;
        let metadata = if meta_len > 0 {
            let mut meta_data = vec![0u8; meta_len];
            r.read_exact(&mut meta_data)?;
            for b in &mut meta_data {
                *b ^= 0x63;
            }
            if meta_data.len() < 22 {
                return Err(UnlockError::Crypto("metadata blob too short".into()));
            }
            let decoded = BASE64.decode(&meta_data[22..])?;
            let plain = aes128_ecb_decrypt(&META_KEY, &decoded)?;
            Some(NcmMetadata::from_decrypted(&plain)?)
        } else {
            None
        };

        // CRC (4 bytes) + image version (1 byte)
        r.seek(SeekFrom::Current(5))?;

        // Image section: frame length, then image length, then the image
        // itself plus padding up to the frame length. Consumes exactly
        // 13 + frame bytes counted from the CRC.
        let frame_len = read_u32_le(r)?;
        let image_len = read_u32_le(r)?;
        let cover_image = if image_len > 0 {
            let mut img = vec![0u8; image_len as usize];
            r.read_exact(&mut img)?;
            let padding = i64::from(frame_len) - i64::from(image_len);
            if padding > 0 {
                r.seek(SeekFrom::Current(padding))?;
            }
            Some(img)
        } else {
            if frame_len > 0 {
                r.seek(SeekFrom::Current(i64::from(frame_len)))?;
            }
            None
        };

        let audio_offset = r.stream_position()?;

        Ok(Self {
            metadata,
            cover_image,
            keystream,
            audio_offset,
        })
    }

    /// Decrypt the audio stream into memory.
    pub fn read_audio<R: Read + Seek>(&self, r: &mut R) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.dump_audio(r, &mut out)?;
        Ok(out)
    }

    /// Decrypt the audio stream and write it out in 32 KiB chunks.
    pub fn dump_audio<R: Read + Seek, W: Write>(&self, r: &mut R, w: &mut W) -> Result<()> {
        r.seek(SeekFrom::Start(self.audio_offset))?;

        let mut buf = vec![0u8; 0x8000];
        let mut offset = 0usize;

        loop {
            let n = r.read(&mut buf)?;
            if n == 0 {
                break;
            }
            for (i, byte) in buf[..n].iter_mut().enumerate() {
                *byte ^= self.keystream[(offset + i) & 0xff];
            }
            w.write_all(&buf[..n])?;
            offset += n;
        }

        Ok(())
    }

}

fn read_u32_le<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn rejects_bad_magic() {
        let mut cur = Cursor::new(b"NOTANNCM________".to_vec());
        assert!(matches!(
            NcmFile::parse(&mut cur),
            Err(UnlockError::InvalidMagic)
        ));
    }

    #[test]
    fn zero_key_length_is_a_crypto_error() {
        let mut data = NCM_MAGIC.to_vec();
        data.extend_from_slice(&[0u8; 2]); // gap
        data.extend_from_slice(&0u32.to_le_bytes()); // keyLen = 0
        let mut cur = Cursor::new(data);
        assert!(matches!(
            NcmFile::parse(&mut cur),
            Err(UnlockError::Crypto(_))
        ));
    }
}
