//! Request orchestration.
//!
//! One [`Pipeline`] is built at startup and shared across request tasks. A
//! request walks parse → derived-cache check → source-or-upload cache check
//! → (throttled fetch) → probe → geometry → process → respond, with
//! fire-and-forget cache writes after the two expensive steps. Each stage's
//! elapsed time lands in [`StageTimings`] and in the completion log line, so
//! the "new vs cached" latency breakdown stays observable.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::codec::{Codec, CodecError, EncodeSpec};
use crate::directive::{OutputFormat, RequestKind, TransformRequest};
use crate::error::PipelineError;
use crate::fetch::{FetchError, Fetcher};
use crate::geometry;
use crate::storage::{submit_write, Namespace, StorageDriver, StorageError};
use crate::throttle::{origin_of, ThrottleRegistry};

/// Per-stage elapsed times for one request. Stages that never ran stay at
/// zero (a derived-cache hit only populates `cache_check`).
#[derive(Clone, Copy, Debug, Default)]
pub struct StageTimings {
    pub cache_check: Duration,
    pub throttle_wait: Duration,
    pub download: Duration,
    pub process: Duration,
}

/// A finished transform: response bytes plus how they were produced.
#[derive(Debug)]
pub struct Rendered {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    /// True when the derived cache short-circuited the whole pipeline.
    pub cached: bool,
    pub timings: StageTimings,
}

pub struct Pipeline {
    storage: Arc<dyn StorageDriver>,
    codec: Arc<dyn Codec>,
    fetcher: Arc<dyn Fetcher>,
    throttle: ThrottleRegistry,
}

impl Pipeline {
    /// Wires the collaborators together and establishes storage
    /// connectivity once, up front.
    pub async fn new(
        storage: Arc<dyn StorageDriver>,
        codec: Arc<dyn Codec>,
        fetcher: Arc<dyn Fetcher>,
        throttle: ThrottleRegistry,
    ) -> Result<Self, StorageError> {
        storage.init().await?;
        Ok(Pipeline {
            storage,
            codec,
            fetcher,
            throttle,
        })
    }

    /// Runs one request end to end.
    ///
    /// `fragment` is the raw path remainder after the route prefix;
    /// `accepts_webp` is the caller's capability signal consumed by the
    /// `f_auto` directive.
    pub async fn handle(
        &self,
        fragment: &str,
        kind: RequestKind,
        accepts_webp: bool,
    ) -> Result<Rendered, PipelineError> {
        let started = Instant::now();
        let mut timings = StageTimings::default();

        let request = TransformRequest::parse(fragment, kind, accepts_webp)?;

        // The origin key must be derivable before any expensive work on the
        // fetch path, even if the caches end up hitting.
        let origin = match kind {
            RequestKind::Fetch => Some(
                origin_of(&request.source_ref)
                    .ok_or_else(|| PipelineError::DomainParse(request.source_ref.clone()))?,
            ),
            RequestKind::Upload => None,
        };

        // Derived hit: respond without touching throttle or codec.
        let cache_start = Instant::now();
        if let Ok(bytes) = self.storage.read(&request.derived_hash, Namespace::Derived).await {
            timings.cache_check = cache_start.elapsed();
            info!(
                source = %request.source_ref,
                total_ms = started.elapsed().as_millis() as u64,
                "cached"
            );
            return Ok(Rendered {
                bytes,
                format: request.filters.format,
                cached: true,
                timings,
            });
        }

        let source_bytes = self
            .load_source(&request, origin.as_deref(), &mut timings)
            .await?;
        timings.cache_check = cache_start
            .elapsed()
            .saturating_sub(timings.throttle_wait)
            .saturating_sub(timings.download);

        let (source_w, source_h) = self
            .codec
            .probe(&source_bytes)
            .map_err(PipelineError::ExtractInfo)?;
        let (width, height) = geometry::resolve(
            source_w,
            source_h,
            request.filters.crop,
            request.filters.width,
            request.filters.height,
        );
        debug!(
            source = %request.source_ref,
            from = format_args!("{}x{}", source_w, source_h),
            to = format_args!("{}x{}", width, height),
            "resolved geometry"
        );

        let spec = EncodeSpec {
            width,
            height,
            format: request.filters.format,
            quality: request.filters.quality,
        };
        let process_start = Instant::now();
        let codec = Arc::clone(&self.codec);
        let bytes = tokio::task::spawn_blocking(move || codec.process(&source_bytes, &spec))
            .await
            .map_err(|e| PipelineError::Processing(CodecError::Encode(e.to_string())))?
            .map_err(PipelineError::Processing)?;
        timings.process = process_start.elapsed();

        submit_write(
            Arc::clone(&self.storage),
            bytes.clone(),
            request.derived_hash.clone(),
            Namespace::Derived,
        );

        info!(
            source = %request.source_ref,
            total_ms = started.elapsed().as_millis() as u64,
            sem_ms = timings.throttle_wait.as_millis() as u64,
            down_ms = timings.download.as_millis() as u64,
            proc_ms = timings.process.as_millis() as u64,
            "new"
        );
        Ok(Rendered {
            bytes,
            format: request.filters.format,
            cached: false,
            timings,
        })
    }

    /// Loads original bytes: from the source/upload cache when present,
    /// otherwise (fetch context only) through the throttled downloader.
    async fn load_source(
        &self,
        request: &TransformRequest,
        origin: Option<&str>,
        timings: &mut StageTimings,
    ) -> Result<Vec<u8>, PipelineError> {
        let namespace = match request.kind {
            RequestKind::Fetch => Namespace::Source,
            RequestKind::Upload => Namespace::Upload,
        };
        // Any read error counts as a miss, transport failures included.
        if let Ok(bytes) = self.storage.read(&request.source_hash, namespace).await {
            return Ok(bytes);
        }

        let Some(origin) = origin else {
            // Upload context: nothing to download.
            return Err(PipelineError::NotFound(request.source_ref.clone()));
        };

        debug!(
            origin,
            global_available = self.throttle.global_available(),
            origin_available = ?self.throttle.origin_available(origin),
            "waiting for fetch slot"
        );
        let wait_start = Instant::now();
        let permit = self.throttle.acquire(origin).await;
        timings.throttle_wait = wait_start.elapsed();

        let download_start = Instant::now();
        let result = self.fetcher.fetch(&request.source_ref).await;
        timings.download = download_start.elapsed();
        drop(permit);

        let bytes = result.map_err(|e| match e {
            FetchError::NotFound { url } => PipelineError::NotFound(url),
            other => PipelineError::Upstream(other),
        })?;

        submit_write(
            Arc::clone(&self.storage),
            bytes.clone(),
            request.source_hash.clone(),
            Namespace::Source,
        );
        Ok(bytes)
    }
}
