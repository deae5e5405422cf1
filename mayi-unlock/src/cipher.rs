//! Keystream primitives for the NCM and QMC decryptors.
//!
//! NCM wraps its audio in a non-standard RC4 variant: a normal key schedule
//! followed by a precomputed 256-byte keystream table that repeats for the
//! whole stream. QMC is a stateless repeating XOR mask with a 128-byte
//! period expanded from a fixed 44-byte seed.

use aes::Aes128;
use ecb::cipher::{BlockDecryptMut, KeyInit, block_padding::Pkcs7};

use crate::error::{Result, UnlockError};

type Aes128EcbDec = ecb::Decryptor<Aes128>;

/// AES-128-ECB decrypt with PKCS#7 unpadding.
pub(crate) fn aes128_ecb_decrypt(key: &[u8; 16], data: &[u8]) -> Result<Vec<u8>> {
    let mut buf = data.to_vec();
    Aes128EcbDec::new(key.into())
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map(<[u8]>::to_vec)
        .map_err(|e| UnlockError::Crypto(e.to_string()))
}

/// RC4 Key Scheduling Algorithm. Returns the permuted S-box.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn rc4_ksa(key: &[u8]) -> [u8; 256] {
    let mut sbox = [0u8; 256];
    for (i, slot) in sbox.iter_mut().enumerate() {
        *slot = i as u8;
    }

    let key_len = key.len();
    let mut j: u8 = 0;

    for i in 0..256 {
        let swap = sbox[i];
        j = swap.wrapping_add(j).wrapping_add(key[i % key_len]);
        sbox[i] = sbox[j as usize];
        sbox[j as usize] = swap;
    }

    sbox
}

/// Expand the scheduled S-box into the 256-byte keystream table.
///
/// Byte `n` of the audio stream is XORed with `stream[n % 256]`; the table
/// is regenerated per file from the embedded key.
pub(crate) fn rc4_keystream(sbox: &[u8; 256]) -> [u8; 256] {
    let mut stream = [0u8; 256];
    for (i, out) in stream.iter_mut().enumerate() {
        let k = (i + 1) & 0xff;
        let a = sbox[k] as usize;
        let b = sbox[(k + a) & 0xff] as usize;
        *out = sbox[(a + b) & 0xff];
    }
    stream
}

/// 44-byte seed for the repeating QMC XOR mask.
const QMC_DEFAULT_MASK_MATRIX: [u8; 44] = [
    0xde, 0x51, 0xfa, 0xc3, 0x4a, 0xd6, 0xca, 0x90, 0x7e, 0x67, 0x5e, 0xf7, 0xd5, 0x52, 0x84, 0xd8,
    0x47, 0x95, 0xbb, 0xa1, 0xaa, 0xc6, 0x66, 0x23, 0x92, 0x62, 0xf3, 0x74, 0xa1, 0x9f, 0xf4, 0xa0,
    0x1d, 0x3f, 0x5b, 0xf0, 0x13, 0x0e, 0x09, 0x3d, 0xf9, 0xbc, 0x00, 0x11,
];

/// Repeating XOR mask used by the QMC format family.
///
/// The mask is position-independent modulo 128: byte `n` of the stream only
/// depends on `n % 128`, so the same call both encrypts and decrypts.
#[derive(Debug, Clone)]
pub struct QmcMask {
    matrix: [u8; 128],
}

impl QmcMask {
    /// Build a mask from the fixed 44-byte seed, expanded by
    /// `matrix[i] = seed[i % 44]`.
    pub fn new() -> Self {
        let mut matrix = [0u8; 128];
        for (i, slot) in matrix.iter_mut().enumerate() {
            *slot = QMC_DEFAULT_MASK_MATRIX[i % 44];
        }
        Self { matrix }
    }

    /// XOR the buffer in place with the repeating mask.
    pub fn decrypt(&self, data: &mut [u8]) {
        for (n, byte) in data.iter_mut().enumerate() {
            *byte ^= self.matrix[n & 0x7f];
        }
    }
}

impl Default for QmcMask {
    fn default() -> Self {
        Self::new()
    }
}
