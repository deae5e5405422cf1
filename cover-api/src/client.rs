//! HTTP client for album cover lookup and download.
//!
//! Two upstreams, both optional:
//!
//! - `um-api.ixarea.com/music/qq-cover` resolves title/artist/album to a
//!   QQ Music cover id (`{ "Id": ..., "Type": ... }`)
//! - `stats.ixarea.com/apis/music/qq-cover/{Type}/{Id}` serves the image
//!
//! Every request uses a 10-second timeout; failures are surfaced as
//! [`CoverError`](crate::CoverError) and the caller is expected to log
//! and move on.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CoverError, Result};

const QQ_COVER_QUERY: &str = "https://um-api.ixarea.com/music/qq-cover";
const QQ_COVER_IMAGE: &str = "https://stats.ixarea.com/apis/music/qq-cover";

/// Images at or above this size are re-encoded at half height.
const RESIZE_THRESHOLD: usize = 1 << 24; // 16 MiB

/// A downloaded, normalised cover image.
#[derive(Debug, Clone)]
pub struct CoverImage {
    /// Image bytes (JPEG after oversized re-encode, else as served).
    pub data: Vec<u8>,
    /// Content-Type reported by the server.
    pub mime: String,
    /// Final URL the image was fetched from.
    pub url: String,
}

/// Blocking HTTP client for cover lookups.
#[derive(Debug, Clone)]
pub struct CoverClient {
    http: reqwest::blocking::Client,
}

impl CoverClient {
    /// Create a client with the 10-second request timeout.
    pub fn new() -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self { http })
    }

    /// Resolve a QQ Music cover URL for the given song.
    ///
    /// Returns `Ok(None)` when the lookup succeeds but has no hit.
    pub fn query_qq_cover(
        &self,
        title: &str,
        artist: Option<&str>,
        album: Option<&str>,
    ) -> Result<Option<String>> {
        let url = format!(
            "{QQ_COVER_QUERY}?Title={}&Artist={}&Album={}",
            urlencoding::encode(title),
            urlencoding::encode(artist.unwrap_or("")),
            urlencoding::encode(album.unwrap_or("")),
        );
        debug!(%title, "querying qq cover");

        let resp = self.http.get(&url).send()?.error_for_status()?;
        let body: Value = resp.json()?;

        let id = body.get("Id").and_then(value_to_id);
        let kind = body.get("Type").and_then(value_to_id);
        match (id, kind) {
            (Some(id), Some(kind)) if id != "0" => {
                Ok(Some(format!("{QQ_COVER_IMAGE}/{kind}/{id}")))
            }
            _ => Ok(None),
        }
    }

    /// Download a cover image and normalise it.
    ///
    /// The URL is upgraded to https and given a `?param=500y500` size hint
    /// when it has no query string. Bodies that are not `image/*` are
    /// rejected; bodies at or above 16 MiB are resized to half height and
    /// re-encoded as JPEG quality 85.
    pub fn fetch(&self, url: &str) -> Result<CoverImage> {
        let url = normalize_url(url);
        debug!(%url, "downloading artwork");

        let resp = self.http.get(&url).send()?.error_for_status()?;
        let mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        if !mime.starts_with("image/") {
            return Err(CoverError::NotImage(mime));
        }

        let mut data = resp.bytes()?.to_vec();
        if data.len() >= RESIZE_THRESHOLD {
            warn!(bytes = data.len(), "oversized artwork, resizing");
            data = shrink_half_height(&data)?;
        }

        Ok(CoverImage { data, mime, url })
    }
}

/// `Id`/`Type` fields arrive as either numbers or strings.
fn value_to_id(v: &Value) -> Option<String> {
    match v {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Upgrade the scheme and append the size hint when no query is present.
fn normalize_url(url: &str) -> String {
    let mut url = url.replacen("http://", "https://", 1);
    if !url.contains('?') {
        url.push_str("?param=500y500");
    }
    url
}

/// Resize to half height (width scaled proportionally) and re-encode as
/// JPEG quality 85.
fn shrink_half_height(data: &[u8]) -> Result<Vec<u8>> {
    let img = image::load_from_memory(data)?;
    let new_h = (img.height() / 2).max(1);
    let new_w = ((u64::from(img.width()) * u64::from(new_h)) / u64::from(img.height().max(1)))
        .max(1) as u32;

    let resized = img.resize_exact(new_w, new_h, FilterType::Lanczos3).into_rgb8();

    let mut out = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut out, 85);
    resized.write_with_encoder(encoder)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_scheme_upgrade_and_size_hint() {
        assert_eq!(
            normalize_url("http://p1.music.126.net/a.jpg"),
            "https://p1.music.126.net/a.jpg?param=500y500"
        );
        assert_eq!(
            normalize_url("https://host/a.jpg?param=200y200"),
            "https://host/a.jpg?param=200y200"
        );
    }

    #[test]
    fn id_field_accepts_number_and_string() {
        assert_eq!(value_to_id(&serde_json::json!(123)).as_deref(), Some("123"));
        assert_eq!(value_to_id(&serde_json::json!("abc")).as_deref(), Some("abc"));
        assert_eq!(value_to_id(&serde_json::json!("")), None);
        assert_eq!(value_to_id(&serde_json::json!(null)), None);
    }

    #[test]
    fn shrink_halves_the_height() {
        let img = image::DynamicImage::new_rgb8(64, 64);
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();

        let out = shrink_half_height(buf.get_ref()).unwrap();
        let reloaded = image::load_from_memory(&out).unwrap();
        assert_eq!(reloaded.height(), 32);
        assert_eq!(reloaded.width(), 32);
    }
}
