//! Asset class policies
//!
//! A policy decides whether a freshly fetched payload may be cached and
//! served, and which content type and cache headers go out with it. The
//! proxy handler is generic over this trait; each asset class plugs in its
//! own rules.

use crate::origin::FetchedResource;
use crate::types::{RelayError, Result};

/// Content types the logo proxy will cache and serve
pub const ACCEPTED_IMAGE_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/jpg",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "image/bmp",
    "image/x-icon",
    "image/vnd.microsoft.icon",
    "image/avif",
];

/// Default logo size limit (5 MiB)
pub const DEFAULT_LOGO_MAX_BYTES: usize = 5 * 1024 * 1024;

/// Per-class validation and response shaping
pub trait AssetPolicy: Send + Sync {
    /// Class name used in logs and stats
    fn name(&self) -> &'static str;

    /// Validate a 200 payload; returns the content type to store and serve
    fn accept(&self, fetched: &FetchedResource) -> Result<String>;

    /// Body size limit passed to the fetcher
    fn max_bytes(&self) -> Option<usize> {
        None
    }

    /// `Cache-Control` header for successful responses
    fn cache_control(&self) -> &'static str;

    /// Whether a `source` unknown to the registry fails the request
    fn strict_source(&self) -> bool {
        false
    }
}

// ============================================================================
// Key policy
// ============================================================================

/// Decryption keys: any non-empty body, served as octet-stream
#[derive(Debug, Clone, Default)]
pub struct KeyPolicy;

impl AssetPolicy for KeyPolicy {
    fn name(&self) -> &'static str {
        "key"
    }

    fn accept(&self, fetched: &FetchedResource) -> Result<String> {
        if fetched.body.is_empty() {
            return Err(RelayError::ValidationFailed("origin returned an empty key".into()));
        }
        Ok("application/octet-stream".to_string())
    }

    fn cache_control(&self) -> &'static str {
        "public, max-age=300"
    }

    // Keys require a registered source
    fn strict_source(&self) -> bool {
        true
    }
}

// ============================================================================
// Logo policy
// ============================================================================

/// Channel logos: image content types only, bounded size
#[derive(Debug, Clone)]
pub struct LogoPolicy {
    max_bytes: usize,
}

impl LogoPolicy {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl Default for LogoPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_LOGO_MAX_BYTES)
    }
}

impl AssetPolicy for LogoPolicy {
    fn name(&self) -> &'static str {
        "logo"
    }

    fn accept(&self, fetched: &FetchedResource) -> Result<String> {
        if fetched.body.is_empty() {
            return Err(RelayError::ValidationFailed("origin returned an empty image".into()));
        }
        if fetched.body.len() > self.max_bytes {
            return Err(RelayError::ValidationFailed(format!(
                "image of {} bytes exceeds limit of {} bytes",
                fetched.body.len(),
                self.max_bytes
            )));
        }

        let declared = fetched.content_type.as_deref().map(normalize_content_type);
        match declared.as_deref() {
            Some(ct) if ACCEPTED_IMAGE_TYPES.contains(&ct) => Ok(ct.to_string()),
            // Generic or missing type: trust the bytes, not the header
            None | Some("application/octet-stream") | Some("binary/octet-stream") => {
                sniff_image_type(&fetched.body)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        RelayError::ValidationFailed(
                            "payload is not a recognized image format".into(),
                        )
                    })
            }
            Some(other) => Err(RelayError::ValidationFailed(format!(
                "content type '{other}' is not an accepted image type"
            ))),
        }
    }

    fn max_bytes(&self) -> Option<usize> {
        Some(self.max_bytes)
    }

    fn cache_control(&self) -> &'static str {
        "public, max-age=604800, immutable"
    }
}

/// Lowercase media type without parameters (`image/PNG; q=1` → `image/png`)
pub fn normalize_content_type(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Detect an image type from magic bytes
pub fn sniff_image_type(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some("image/png");
    }
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if data.starts_with(b"BM") && data.len() > 14 {
        return Some("image/bmp");
    }
    if data.starts_with(&[0x00, 0x00, 0x01, 0x00]) {
        return Some("image/x-icon");
    }

    let head = &data[..data.len().min(512)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    if text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg")) {
        return Some("image/svg+xml");
    }

    None
}
