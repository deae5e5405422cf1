//! Audio container detection from the first bytes of a decrypted stream.

/// Detect the audio container, falling back to `fallback` when no
/// signature matches. First match wins.
pub fn sniff_audio_ext(data: &[u8], fallback: &str) -> String {
    if data.starts_with(b"ID3") || data.starts_with(&[0xff, 0xfb]) || data.starts_with(&[0xff, 0xf3])
    {
        return "mp3".to_owned();
    }
    if data.starts_with(b"fLaC") {
        return "flac".to_owned();
    }
    if data.starts_with(b"OggS") {
        return "ogg".to_owned();
    }
    if data.starts_with(b"RIFF") && data.len() >= 12 && &data[8..12] == b"WAVE" {
        return "wav".to_owned();
    }
    if data.len() >= 8 && &data[4..8] == b"ftyp" {
        return "m4a".to_owned();
    }
    if data.starts_with(&[0xff, 0xf1]) || data.starts_with(&[0xff, 0xf9]) {
        return "aac".to_owned();
    }
    fallback.to_owned()
}

/// MIME type for a detected container extension.
pub fn mime_for_ext(ext: &str) -> &'static str {
    match ext {
        "flac" => "audio/flac",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "wav" => "audio/x-wav",
        _ => "audio/mpeg",
    }
}
