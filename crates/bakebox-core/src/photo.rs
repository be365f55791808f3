//! Photos are kept inline as `data:<mime>;base64,<payload>` URLs.

use std::fs;
use std::path::Path;

use base64::Engine;

use crate::{Error, Result};

/// Split a data URL into its MIME type and base64 payload.
pub fn split_data_url(url: &str) -> Result<(&str, &str)> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| Error::InvalidDataUrl("missing data: prefix".to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::InvalidDataUrl("missing payload".to_string()))?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or_else(|| Error::InvalidDataUrl("payload is not base64".to_string()))?;
    if mime.is_empty() {
        return Err(Error::InvalidDataUrl("missing MIME type".to_string()));
    }
    Ok((mime, payload))
}

pub fn encode_data_url(mime_type: &str, bytes: &[u8]) -> String {
    let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{mime_type};base64,{payload}")
}

pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>)> {
    let (mime, payload) = split_data_url(url)?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::InvalidDataUrl(e.to_string()))?;
    Ok((mime.to_string(), bytes))
}

pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/png",
    }
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "png",
    }
}

/// Read an image file into a data URL.
pub fn read_photo(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(Error::io(path))?;
    Ok(encode_data_url(mime_for_path(path), &bytes))
}

/// Decode a data URL and write the image bytes to `path`.
pub fn write_photo(url: &str, path: &Path) -> Result<()> {
    let (_, bytes) = decode_data_url(url)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(Error::io(dir))?;
    }
    fs::write(path, bytes).map_err(Error::io(path))
}
