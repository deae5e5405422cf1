use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;

/// Metadata embedded in an NCM container, decrypted from the AES blob.
///
/// The plaintext is `music:<json>` or `dj:<json>`; the `dj` form wraps the
/// actual song object under `mainMusic`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NcmMetadata {
    #[serde(rename = "musicName", default)]
    pub music_name: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    /// `[name, id]` pairs.
    #[serde(default)]
    pub artist: Vec<Vec<Value>>,
    /// Album cover URL, rewritten to https with `?param=500y500` appended.
    #[serde(rename = "albumPic", default)]
    pub album_pic: Option<String>,
}

impl NcmMetadata {
    /// Parse the decrypted `prefix:<json>` plaintext.
    pub fn from_decrypted(data: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(data).into_owned();
        let (prefix, json) = text.split_once(':').unwrap_or(("music", text.as_str()));

        let mut meta: Self = if prefix == "dj" {
            let outer: Value = serde_json::from_str(json)?;
            serde_json::from_value(outer.get("mainMusic").cloned().unwrap_or(Value::Null))?
        } else {
            serde_json::from_str(json)?
        };

        meta.album_pic = meta.album_pic.take().map(|url| rewrite_pic_url(&url));
        Ok(meta)
    }

    /// Join artist names with `, `.
    pub fn artist_names(&self) -> Option<String> {
        let names: Vec<&str> = self
            .artist
            .iter()
            .filter_map(|pair| pair.first().and_then(Value::as_str))
            .collect();
        if names.is_empty() {
            None
        } else {
            Some(names.join(", "))
        }
    }
}

/// Upgrade the scheme to https and request the 500x500 rendition.
fn rewrite_pic_url(url: &str) -> String {
    let mut url = url.replacen("http://", "https://", 1);
    if !url.contains('?') {
        url.push_str("?param=500y500");
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_music_prefix() {
        let data = br#"music:{"musicName":"Test","album":"Album","artist":[["Artist1",100],["Artist2",101]],"albumPic":"http://p1.music.126.net/x.jpg"}"#;
        let meta = NcmMetadata::from_decrypted(data).unwrap();
        assert_eq!(meta.music_name.as_deref(), Some("Test"));
        assert_eq!(meta.artist_names().as_deref(), Some("Artist1, Artist2"));
        assert_eq!(
            meta.album_pic.as_deref(),
            Some("https://p1.music.126.net/x.jpg?param=500y500")
        );
    }

    #[test]
    fn parse_dj_prefix_unwraps_main_music() {
        let data = br#"dj:{"mainMusic":{"musicName":"Radio","album":"A","artist":[]}}"#;
        let meta = NcmMetadata::from_decrypted(data).unwrap();
        assert_eq!(meta.music_name.as_deref(), Some("Radio"));
        assert!(meta.artist_names().is_none());
    }

    #[test]
    fn pic_url_with_query_untouched() {
        assert_eq!(
            rewrite_pic_url("https://p1.music.126.net/x.jpg?param=200y200"),
            "https://p1.music.126.net/x.jpg?param=200y200"
        );
    }
}
