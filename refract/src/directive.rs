//! Transform directive parsing.
//!
//! A directive is the compact filter block preceding the source reference in
//! a request path: `w_400,c_limit,h_600,f_auto/https://example.com/cat.jpg`.
//! Parsing happens exactly once per request and produces an immutable
//! [`TransformRequest`] carrying the resolved filters and both cache hashes.
//! Unknown filter keys are ignored; recognized keys with malformed values
//! fail the whole parse with a per-field error.

use percent_encoding::percent_decode_str;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Per-field parse failures. All of them map to a single "bad request"
/// class at the HTTP surface but stay distinct for reporting.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("target height is not an integer")]
    InvalidHeight,
    #[error("target width is not an integer")]
    InvalidWidth,
    #[error("quality is not an integer")]
    InvalidQuality,
    #[error("format not allowed: {0}")]
    FormatNotAllowed(String),
    #[error("crop mode not allowed: {0}")]
    CropNotAllowed(String),
}

/// Where the source bytes come from: a remote origin URL or a previously
/// uploaded file. The two contexts parse slightly differently and read from
/// different cache namespaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    Fetch,
    Upload,
}

/// Encoded output format, resolved at parse time. The `auto` token is not a
/// variant: it resolves to `Webp` when the caller advertises support and to
/// the `Jpeg` default otherwise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl OutputFormat {
    /// Canonical lowercase name, also used as the derived-hash suffix.
    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Gif => "gif",
            OutputFormat::Webp => "webp",
        }
    }

    /// MIME type for response headers.
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Gif => "image/gif",
            OutputFormat::Webp => "image/webp",
        }
    }
}

/// Policy governing how requested width/height interact with the source's
/// aspect ratio. See [`crate::geometry::resolve`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CropMode {
    #[default]
    Scale,
    Fit,
    Limit,
}

/// Resolved filter set. Zero width/height means "not requested"; zero
/// quality means "codec default".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Filters {
    pub width: u32,
    pub height: u32,
    pub quality: u32,
    pub format: OutputFormat,
    pub crop: CropMode,
}

/// One parsed request: filters plus source identity and both cache keys.
/// Fully constructed by [`TransformRequest::parse`] and never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransformRequest {
    pub kind: RequestKind,
    /// Origin URL (fetch) or uploaded-file name (upload), percent-decoded.
    pub source_ref: String,
    /// SHA-256 of `source_ref`: the same origin URL always shares one
    /// cached source regardless of requested transform.
    pub source_hash: String,
    /// SHA-256 of the raw fragment plus the resolved format name, so
    /// identical directive strings address the same derived-cache slot
    /// before any geometry runs.
    pub derived_hash: String,
    pub filters: Filters,
}

/// SHA-256 of `input`, as lowercase hex.
pub fn content_hash(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

impl TransformRequest {
    /// Parses a path fragment (`[filters/]source`) into a request.
    ///
    /// In fetch context the first `/`-segment is the filter block unless it
    /// is the `http:`/`https:` scheme token of a bare URL. In upload context
    /// it is the filter block only when it contains at least one `key_value`
    /// token, and any folder segments before the final component of the
    /// remainder are discarded (folders are not part of cache identity).
    pub fn parse(
        fragment: &str,
        kind: RequestKind,
        accepts_webp: bool,
    ) -> Result<Self, ParseError> {
        let mut filters = Filters::default();

        let remainder = match fragment.split_once('/') {
            Some((first, rest)) if has_filter_block(first, kind) => {
                parse_filter_block(first, accepts_webp, &mut filters)?;
                rest
            }
            _ => fragment,
        };

        let source_ref = match kind {
            RequestKind::Fetch => decode(remainder),
            // Folders are display-only for uploads; keep the final component.
            RequestKind::Upload => decode(remainder.rsplit('/').next().unwrap_or(remainder)),
        };

        let derived_hash = content_hash(&format!("{}:{}", fragment, filters.format.name()));
        let source_hash = content_hash(&source_ref);

        Ok(TransformRequest {
            kind,
            source_ref,
            source_hash,
            derived_hash,
            filters,
        })
    }
}

fn has_filter_block(first: &str, kind: RequestKind) -> bool {
    match kind {
        RequestKind::Fetch => first != "http:" && first != "https:",
        RequestKind::Upload => first.split(',').any(|token| token.contains('_')),
    }
}

fn parse_filter_block(
    block: &str,
    accepts_webp: bool,
    filters: &mut Filters,
) -> Result<(), ParseError> {
    for token in block.split(',') {
        let Some((key, value)) = token.split_once('_') else {
            continue;
        };
        match key {
            "h" => {
                filters.height = value.parse().map_err(|_| ParseError::InvalidHeight)?;
            }
            "w" => {
                filters.width = value.parse().map_err(|_| ParseError::InvalidWidth)?;
            }
            "q" => {
                filters.quality = value.parse().map_err(|_| ParseError::InvalidQuality)?;
            }
            "f" => {
                filters.format = match value {
                    "jpg" | "jpeg" => OutputFormat::Jpeg,
                    "png" => OutputFormat::Png,
                    "gif" => OutputFormat::Gif,
                    "webp" => OutputFormat::Webp,
                    "auto" => {
                        if accepts_webp {
                            OutputFormat::Webp
                        } else {
                            OutputFormat::Jpeg
                        }
                    }
                    other => return Err(ParseError::FormatNotAllowed(other.to_string())),
                };
            }
            "c" => {
                filters.crop = match value {
                    "scale" => CropMode::Scale,
                    "fit" => CropMode::Fit,
                    "limit" => CropMode::Limit,
                    other => return Err(ParseError::CropNotAllowed(other.to_string())),
                };
            }
            // Unknown keys pass through silently.
            _ => {}
        }
    }
    Ok(())
}

fn decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}
