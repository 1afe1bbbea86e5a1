//! # Refract
//!
//! Core library for an on-demand image transformation proxy: clients ask for
//! an image by URL (or uploaded-file name) plus a compact transform directive
//! (`w_400,c_limit,h_600,f_auto/https://...`); refract fetches or loads the
//! source, applies the transform, and returns the bytes. A content-addressable
//! cache gates every expensive step, and a two-level throttle bounds
//! concurrent origin downloads.
//!
//! ## Main modules
//!
//! - [`directive`]: parse a path fragment into an immutable [`TransformRequest`]
//!   (filters, crop mode, format, source/derived cache hashes).
//! - [`geometry`]: resolve final target dimensions from crop mode + source
//!   aspect ratio ([`geometry::resolve`]).
//! - [`throttle`]: global + per-origin admission control for outbound fetches
//!   ([`ThrottleRegistry`], RAII [`ThrottlePermit`]).
//! - [`storage`]: content-addressable blob store contract ([`StorageDriver`],
//!   [`Namespace`], fire-and-forget [`storage::submit_write`]) with filesystem
//!   and in-memory backends.
//! - [`codec`]: pixel seam ([`Codec`] trait, [`RasterCodec`] on the `image`
//!   crate).
//! - [`fetch`]: origin download seam ([`Fetcher`] trait, [`HttpFetcher`],
//!   [`StaticFetcher`] for tests).
//! - [`pipeline`]: the request orchestrator ([`Pipeline`]) composing all of
//!   the above, with per-stage timing ([`StageTimings`]).
//!
//! Key types are re-exported at the crate root.

pub mod codec;
pub mod directive;
pub mod error;
pub mod fetch;
pub mod geometry;
pub mod pipeline;
pub mod storage;
pub mod throttle;

pub use codec::{Codec, CodecError, EncodeSpec, RasterCodec};
pub use directive::{
    content_hash, CropMode, Filters, OutputFormat, ParseError, RequestKind, TransformRequest,
};
pub use error::PipelineError;
pub use fetch::{FetchError, Fetcher, HttpFetcher, StaticFetcher};
pub use pipeline::{Pipeline, Rendered, StageTimings};
pub use storage::{FileDriver, MemoryDriver, Namespace, StorageDriver, StorageError};
pub use throttle::{ThrottlePermit, ThrottleRegistry};
