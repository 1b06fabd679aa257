//! Ordered frame-extraction strategies.
//!
//! A [`DecodeChain`] runs its steps strictly in order, each on the decode pool
//! under its own deadline, and stops at the first one that yields an image.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{MediaBackend, SeekPolicy};
use crate::frame::RawImage;
use crate::lifecycle::ScratchSpace;
use crate::pool::{Attempt, CancelToken, DecodePool};
use crate::source::{ContentResolver, MaterializedSource, MediaReference, materialize_local_copy};
use crate::time::{sanitize_frame_time_micros, sanitize_target_size};

/// One way of producing a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// The content resolver's own thumbnail; remote handles only.
    PlatformThumbnail,
    /// Backend thumbnail utility over a local file.
    ThumbnailUtility,
    /// Exact-time decode, retried with keyframe seeking.
    FrameAtTime,
    /// Short transcode window whose first frame is returned.
    DecodePipeline,
}

impl StrategyKind {
    /// Default chain order.
    pub const ALL: [Self; 4] = [
        Self::PlatformThumbnail,
        Self::ThumbnailUtility,
        Self::FrameAtTime,
        Self::DecodePipeline,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlatformThumbnail => "platform_thumbnail",
            Self::ThumbnailUtility => "thumbnail_utility",
            Self::FrameAtTime => "frame_at_time",
            Self::DecodePipeline => "decode_pipeline",
        }
    }

    fn applies_to(self, source: &MediaReference) -> bool {
        match self {
            Self::PlatformThumbnail => source.is_remote(),
            _ => true,
        }
    }

    /// Runs this strategy once. Any failure is reported as `None`.
    pub fn attempt<M>(
        self,
        backend: &M,
        resolver: &dyn ContentResolver,
        input: &StrategyInput,
        cancel: &CancelToken,
    ) -> Option<RawImage>
    where
        M: MediaBackend + ?Sized,
    {
        let result = match (self, &input.source) {
            (Self::PlatformThumbnail, StrategySource::Remote(handle)) => resolver
                .load_thumbnail(handle, input.target_size_px)
                .map_err(|err| err.to_string()),
            (Self::PlatformThumbnail, StrategySource::Local(_)) => {
                Err("platform thumbnails need a remote handle".to_string())
            }
            (_, StrategySource::Remote(_)) => Err("strategy needs a local file".to_string()),
            (Self::ThumbnailUtility, StrategySource::Local(path)) => backend
                .thumbnail(path, input.time_micros, input.target_size_px, cancel)
                .map_err(|err| err.to_string()),
            (Self::FrameAtTime, StrategySource::Local(path)) => backend
                .frame_at_time(path, input.time_micros, SeekPolicy::Closest, cancel)
                .or_else(|err| {
                    if cancel.is_cancelled() {
                        return Err(err);
                    }
                    debug!(error = %err, "exact seek failed; retrying at nearest keyframe");
                    backend.frame_at_time(path, input.time_micros, SeekPolicy::ClosestSync, cancel)
                })
                .map_err(|err| err.to_string()),
            (Self::DecodePipeline, StrategySource::Local(path)) => backend
                .decode_pipeline_frame(path, input.time_micros, cancel)
                .map_err(|err| err.to_string()),
        };

        match result {
            Ok(image) => Some(image),
            Err(reason) => {
                debug!(strategy = self.as_str(), %reason, "strategy produced no image");
                None
            }
        }
    }
}

/// Where a strategy reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategySource {
    Remote(String),
    Local(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyInput {
    pub source: StrategySource,
    pub time_micros: i64,
    pub target_size_px: u32,
}

/// A strategy and its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyStep {
    pub kind: StrategyKind,
    pub timeout: Duration,
}

/// Returns the first `Some` produced by `attempt`, invoking it lazily in order.
///
/// # Example
/// ```
/// use video_engine::strategy::first_success;
///
/// let mut tried = Vec::new();
/// let found = first_success([1, 2, 3, 4], |n| {
///     tried.push(n);
///     (n % 2 == 0).then_some(n * 10)
/// });
/// assert_eq!(found, Some(20));
/// assert_eq!(tried, [1, 2]);
/// ```
pub fn first_success<I, T, F>(items: I, mut attempt: F) -> Option<T>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Option<T>,
{
    for item in items {
        if let Some(value) = attempt(item) {
            return Some(value);
        }
    }
    None
}

/// A single frame request. Zero or negative fields are replaced by defaults.
#[derive(Debug)]
pub struct FrameRequest {
    pub source: MediaReference,
    pub requested_time_micros: i64,
    pub target_size_px: u32,
}

impl FrameRequest {
    pub fn new(source: MediaReference, requested_time_micros: i64, target_size_px: u32) -> Self {
        Self {
            source,
            requested_time_micros,
            target_size_px,
        }
    }

    pub(crate) fn sanitized(self, default_time_micros: i64, default_size_px: u32) -> Self {
        Self {
            requested_time_micros: sanitize_frame_time_micros(
                self.requested_time_micros,
                default_time_micros,
            ),
            target_size_px: sanitize_target_size(self.target_size_px, default_size_px),
            source: self.source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Success(RawImage),
    Exhausted,
}

/// Runs strategies in order on a bounded pool.
pub struct DecodeChain {
    steps: Vec<StrategyStep>,
    pool: DecodePool,
}

impl DecodeChain {
    pub fn new(steps: Vec<StrategyStep>, workers: usize) -> Self {
        Self {
            steps,
            pool: DecodePool::new(workers),
        }
    }

    pub fn steps(&self) -> &[StrategyStep] {
        &self.steps
    }

    /// Extracts a frame for an already-sanitized request.
    ///
    /// Strategies are started one at a time; a step that times out is
    /// cancelled before the next one starts. A step is skipped when the pool
    /// has no idle worker. The local copy, if one is needed, is made once on
    /// the pool, counts against the deadline of the first step that needs it,
    /// and is deleted before this returns.
    pub fn extract<M>(
        &self,
        backend: &Arc<M>,
        resolver: &Arc<dyn ContentResolver>,
        scratch: &ScratchSpace,
        request: &FrameRequest,
    ) -> ExtractionOutcome
    where
        M: MediaBackend + 'static,
    {
        let started = Instant::now();
        let mut local: Option<Option<MaterializedSource>> = None;

        let found = first_success(self.steps.iter().copied(), |step| {
            if !step.kind.applies_to(&request.source) {
                debug!(strategy = step.kind.as_str(), "strategy does not apply to source");
                return None;
            }
            if step.kind == StrategyKind::ThumbnailUtility && !backend.supports_thumbnail_utility()
            {
                debug!("thumbnail utility unavailable on this host");
                return None;
            }

            let mut timeout = step.timeout;
            let source = match (step.kind, &request.source) {
                (StrategyKind::PlatformThumbnail, MediaReference::RemoteHandle(handle)) => {
                    StrategySource::Remote(handle.clone())
                }
                _ => {
                    let copy_started = Instant::now();
                    let materialized = local.get_or_insert_with(|| {
                        self.materialize(&request.source, resolver, scratch, step.timeout)
                    });
                    timeout = timeout.saturating_sub(copy_started.elapsed());
                    StrategySource::Local(materialized.as_ref()?.path().to_path_buf())
                }
            };
            if timeout.is_zero() {
                warn!(strategy = step.kind.as_str(), "local copy used up the strategy deadline");
                return None;
            }

            self.run_step(
                StrategyStep {
                    kind: step.kind,
                    timeout,
                },
                backend,
                resolver,
                StrategyInput {
                    source,
                    time_micros: request.requested_time_micros,
                    target_size_px: request.target_size_px,
                },
            )
        });

        let Some((kind, image)) = found else {
            warn!(
                source = %request.source.describe(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "every extraction strategy failed"
            );
            return ExtractionOutcome::Exhausted;
        };

        match image.scaled_to_fit(request.target_size_px) {
            Ok(scaled) => {
                info!(
                    strategy = kind.as_str(),
                    width = scaled.width,
                    height = scaled.height,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "frame extracted"
                );
                ExtractionOutcome::Success(scaled)
            }
            Err(err) => {
                warn!(error = %err, "failed to scale extracted frame");
                ExtractionOutcome::Exhausted
            }
        }
    }

    /// Produces a readable local file, copying on the pool under `timeout`.
    ///
    /// A copy that finishes after its deadline is dropped, which deletes it.
    fn materialize(
        &self,
        reference: &MediaReference,
        resolver: &Arc<dyn ContentResolver>,
        scratch: &ScratchSpace,
        timeout: Duration,
    ) -> Option<MaterializedSource> {
        let label = reference.describe();
        if let MediaReference::LocalPath(_) = reference {
            let cancel = CancelToken::new();
            return materialize_local_copy(reference, resolver.as_ref(), scratch, &cancel).ok();
        }
        let reference = match reference.try_clone() {
            Ok(reference) => reference,
            Err(err) => {
                warn!(source = %label, error = %err, "failed to duplicate media reference");
                return None;
            }
        };

        let resolver = Arc::clone(resolver);
        let scratch = scratch.clone();
        let attempt = self.pool.run_with_timeout(timeout, move |cancel| {
            materialize_local_copy(&reference, resolver.as_ref(), &scratch, cancel)
        });
        match attempt {
            Attempt::Completed(Ok(source)) => Some(source),
            Attempt::Completed(Err(err)) => {
                warn!(source = %label, error = %err, "failed to materialize local copy");
                None
            }
            Attempt::TimedOut => {
                warn!(
                    source = %label,
                    timeout_ms = timeout.as_millis() as u64,
                    "local copy timed out"
                );
                None
            }
            Attempt::Rejected => {
                warn!(source = %label, "decode pool saturated; no local copy");
                None
            }
            Attempt::Crashed => {
                warn!(source = %label, "local copy crashed");
                None
            }
        }
    }

    fn run_step<M>(
        &self,
        step: StrategyStep,
        backend: &Arc<M>,
        resolver: &Arc<dyn ContentResolver>,
        input: StrategyInput,
    ) -> Option<(StrategyKind, RawImage)>
    where
        M: MediaBackend + 'static,
    {
        let kind = step.kind;
        let backend = Arc::clone(backend);
        let resolver = Arc::clone(resolver);
        let attempt = self.pool.run_with_timeout(step.timeout, move |cancel| {
            kind.attempt(backend.as_ref(), resolver.as_ref(), &input, cancel)
        });

        match attempt {
            Attempt::Completed(Some(image)) => Some((kind, image)),
            Attempt::Completed(None) => None,
            Attempt::TimedOut => {
                warn!(
                    strategy = kind.as_str(),
                    timeout_ms = step.timeout.as_millis() as u64,
                    "strategy timed out"
                );
                None
            }
            Attempt::Rejected => {
                warn!(strategy = kind.as_str(), "decode pool saturated; skipping strategy");
                None
            }
            Attempt::Crashed => {
                warn!(strategy = kind.as_str(), "strategy crashed");
                None
            }
        }
    }

    /// Stops the pool, waiting up to `grace` for running attempts.
    pub fn shutdown(&self, grace: Duration) -> bool {
        self.pool.shutdown(grace)
    }
}
