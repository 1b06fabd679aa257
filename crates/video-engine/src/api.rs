//! Public engine handle and its serial request queue.
//!
//! Every request is executed in arrival order on one queue thread. Exports
//! run on their own thread once started, so a long export never blocks cover
//! generation.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::{FfmpegMediaBackend, MediaBackend};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::export::{
    ExportCompletion, ExportController, ExportOutcome, ExportRequest, JobHandle, JobId,
    OutputTarget,
};
use crate::frame::RawImage;
use crate::lifecycle::ScratchSpace;
use crate::source::{ContentResolver, LocalOnlyResolver, MediaReference};
use crate::strategy::{DecodeChain, ExtractionOutcome, FrameRequest};
use crate::time::seconds_to_micros;
use crate::timeline::{Diagnostic, EditTimeline};

const COVER_PREFIX: &str = "cover_";
const COVER_SUFFIX: &str = ".png";

enum Request {
    Cover {
        source: MediaReference,
        time_micros: i64,
        reply: Sender<Result<PathBuf>>,
    },
    Frame {
        request: FrameRequest,
        reply: Sender<Result<RawImage>>,
    },
    StartExport {
        request: ExportRequest,
        notify: Sender<ExportCompletion>,
        reply: Sender<Result<JobHandle>>,
    },
    CancelExport {
        reply: Sender<Option<JobId>>,
    },
    PersistPermission {
        uri: String,
        flags: i32,
        reply: Sender<Result<()>>,
    },
    Shutdown,
}

/// A started export and the channel its outcome arrives on.
#[derive(Debug)]
pub struct ExportTicket {
    handle: JobHandle,
    completion: Receiver<ExportCompletion>,
    diagnostics: Vec<Diagnostic>,
}

impl ExportTicket {
    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }

    /// Timeline sections dropped while parsing the request.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Blocks until the job settles and returns its outcome.
    pub fn wait_outcome(&self) -> ExportOutcome {
        match self.completion.recv() {
            Ok(completion) => completion.outcome,
            Err(_) => ExportOutcome::Failed(EngineError::ExportFailed {
                reason: "export outcome was already delivered".to_string(),
            }),
        }
    }

    /// Blocks until the job settles; a cancelled job is reported as [`EngineError::Cancelled`].
    pub fn wait(&self) -> Result<PathBuf> {
        outcome_to_result(self.wait_outcome())
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Result<PathBuf> {
        match self.completion.recv_timeout(timeout) {
            Ok(completion) => outcome_to_result(completion.outcome),
            Err(RecvTimeoutError::Timeout) => Err(EngineError::Timeout {
                context: "waiting for export",
            }),
            Err(RecvTimeoutError::Disconnected) => Err(EngineError::ExportFailed {
                reason: "export outcome was already delivered".to_string(),
            }),
        }
    }
}

fn outcome_to_result(outcome: ExportOutcome) -> Result<PathBuf> {
    match outcome {
        ExportOutcome::Completed(path) => Ok(path),
        ExportOutcome::Failed(err) => Err(err),
        ExportOutcome::Cancelled => Err(EngineError::Cancelled),
    }
}

/// Thread-safe engine handle.
///
/// Argument errors and [`EngineError::Disposed`] are reported before any
/// I/O. After [`Engine::dispose`] every call fails with `Disposed`.
pub struct Engine {
    queue: Mutex<Option<SyncSender<Request>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl Engine {
    /// Starts an engine over the FFmpeg CLI backend with no content resolver.
    ///
    /// # Example
    /// ```no_run
    /// use video_engine::{Engine, EngineConfig};
    ///
    /// let engine = Engine::with_ffmpeg(EngineConfig::default()).expect("engine");
    /// let cover = engine.generate_cover_image("clip.mp4", 1.0).expect("cover");
    /// println!("{}", cover.display());
    /// engine.dispose();
    /// ```
    pub fn with_ffmpeg(config: EngineConfig) -> Result<Self> {
        Self::new(FfmpegMediaBackend, Arc::new(LocalOnlyResolver), config)
    }

    pub fn new<M>(backend: M, resolver: Arc<dyn ContentResolver>, config: EngineConfig) -> Result<Self>
    where
        M: MediaBackend + 'static,
    {
        config.validate()?;
        let scratch = ScratchSpace::new(config.scratch_dir());
        let backend = Arc::new(backend);
        let (tx, rx) = mpsc::sync_channel::<Request>(config.request_queue_capacity);

        let worker = thread::Builder::new()
            .name("video-engine".to_string())
            .spawn(move || {
                let core = EngineCore {
                    chain: DecodeChain::new(config.strategy_steps(), config.decode_workers),
                    exports: ExportController::new(
                        Arc::clone(&backend),
                        Arc::clone(&resolver),
                        scratch.clone(),
                    ),
                    backend,
                    resolver,
                    scratch,
                    config,
                };
                run_queue(core, rx);
            })
            .map_err(|source| EngineError::io("failed to spawn engine thread", "engine", source))?;
        info!("video engine started");

        Ok(Self {
            queue: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Extracts a cover frame and writes it as a PNG the caller then owns.
    ///
    /// A non-positive or non-finite `seconds` selects the configured default
    /// frame time.
    pub fn generate_cover_image(&self, file_path: &str, seconds: f64) -> Result<PathBuf> {
        self.ensure_live()?;
        let source = parse_source(file_path)?;
        let time_micros = seconds_to_micros(seconds).unwrap_or(0);
        self.call(|reply| Request::Cover {
            source,
            time_micros,
            reply,
        })?
    }

    /// Extracts a frame in memory. Zero fields take the configured defaults.
    pub fn extract_frame(&self, request: FrameRequest) -> Result<RawImage> {
        self.ensure_live()?;
        self.call(|reply| Request::Frame { request, reply })?
    }

    /// Renders `timeline_json` over `file_path` and blocks until the export settles.
    pub fn export_edits(
        &self,
        file_path: &str,
        timeline_json: &Value,
        target_bitrate_bps: i64,
    ) -> Result<PathBuf> {
        self.start_export(file_path, timeline_json, target_bitrate_bps)?
            .wait()
    }

    /// Starts an export into the scratch directory and returns without waiting.
    pub fn start_export(
        &self,
        file_path: &str,
        timeline_json: &Value,
        target_bitrate_bps: i64,
    ) -> Result<ExportTicket> {
        self.ensure_live()?;
        let source = parse_source(file_path)?;
        let target_bitrate_bps = u32::try_from(target_bitrate_bps)
            .ok()
            .filter(|bps| *bps > 0)
            .ok_or_else(|| EngineError::invalid("targetBitrateBps", "must be a positive 32-bit value"))?;
        let parsed = EditTimeline::from_json(timeline_json);

        let mut ticket = self.submit_export(ExportRequest {
            source,
            timeline: parsed.timeline,
            target_bitrate_bps,
            output: OutputTarget::Scratch,
        })?;
        ticket.diagnostics = parsed.diagnostics;
        Ok(ticket)
    }

    /// Starts a fully specified export, superseding any running one.
    pub fn submit_export(&self, request: ExportRequest) -> Result<ExportTicket> {
        self.ensure_live()?;
        let (notify, completion) = mpsc::channel();
        let handle = self.call(|reply| Request::StartExport {
            request,
            notify,
            reply,
        })??;
        Ok(ExportTicket {
            handle,
            completion,
            diagnostics: Vec::new(),
        })
    }

    /// Cancels the running export, if any. Idempotent.
    pub fn cancel_export(&self) -> Result<()> {
        self.ensure_live()?;
        let cancelled = self.call(|reply| Request::CancelExport { reply })?;
        debug!(job_id = ?cancelled, "cancel export handled");
        Ok(())
    }

    /// Persists read access to a remote handle through the content resolver.
    ///
    /// Anything other than a remote handle needs no grant and succeeds as is.
    pub fn persist_resource_permission(&self, uri: &str, flags: i32) -> Result<()> {
        self.ensure_live()?;
        if uri.trim().is_empty() {
            return Err(EngineError::invalid("uri", "must not be empty"));
        }
        if !MediaReference::parse(uri).is_remote() {
            debug!(uri, "not a remote handle; no permission to persist");
            return Ok(());
        }
        let uri = uri.to_string();
        self.call(|reply| Request::PersistPermission { uri, flags, reply })?
    }

    /// Drains queued requests, cancels the active export and stops every worker.
    ///
    /// Safe to call more than once; later calls return immediately.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let sender = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(Request::Shutdown);
        }
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!("engine thread panicked during shutdown");
            }
        }
        info!("video engine disposed");
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            Err(EngineError::Disposed)
        } else {
            Ok(())
        }
    }

    fn call<T>(&self, build: impl FnOnce(Sender<T>) -> Request) -> Result<T> {
        let sender = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(EngineError::Disposed)?;
        let (reply_tx, reply_rx) = mpsc::channel();
        sender
            .send(build(reply_tx))
            .map_err(|_| EngineError::Disposed)?;
        reply_rx.recv().map_err(|_| EngineError::Disposed)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn parse_source(file_path: &str) -> Result<MediaReference> {
    if file_path.trim().is_empty() {
        return Err(EngineError::invalid("filePath", "must not be empty"));
    }
    Ok(MediaReference::parse(file_path))
}

struct EngineCore<M> {
    config: EngineConfig,
    backend: Arc<M>,
    resolver: Arc<dyn ContentResolver>,
    scratch: ScratchSpace,
    chain: DecodeChain,
    exports: ExportController<M>,
}

fn run_queue<M>(core: EngineCore<M>, requests: Receiver<Request>)
where
    M: MediaBackend + 'static,
{
    while let Ok(request) = requests.recv() {
        if matches!(request, Request::Shutdown) {
            break;
        }
        core.handle(request);
    }
    core.shutdown();
}

impl<M> EngineCore<M>
where
    M: MediaBackend + 'static,
{
    fn handle(&self, request: Request) {
        match request {
            Request::Cover {
                source,
                time_micros,
                reply,
            } => {
                let _ = reply.send(self.generate_cover(source, time_micros));
            }
            Request::Frame { request, reply } => {
                let _ = reply.send(self.extract_frame(request));
            }
            Request::StartExport {
                request,
                notify,
                reply,
            } => {
                let _ = reply.send(self.exports.start(request, notify));
            }
            Request::CancelExport { reply } => {
                let _ = reply.send(self.exports.cancel_active());
            }
            Request::PersistPermission { uri, flags, reply } => {
                let result = self
                    .resolver
                    .persist_permission(&uri, flags)
                    .map_err(|source| EngineError::io("failed to persist permission", &uri, source));
                let _ = reply.send(result);
            }
            Request::Shutdown => {}
        }
    }

    fn extract_frame(&self, request: FrameRequest) -> Result<RawImage> {
        let request = request.sanitized(
            self.config.default_frame_time_micros,
            self.config.default_target_size_px,
        );
        debug!(
            source = %request.source.describe(),
            time_micros = request.requested_time_micros,
            target_size_px = request.target_size_px,
            "frame requested"
        );
        match self
            .chain
            .extract(&self.backend, &self.resolver, &self.scratch, &request)
        {
            ExtractionOutcome::Success(image) => Ok(image),
            ExtractionOutcome::Exhausted => Err(EngineError::DecodeExhausted {
                source: request.source.describe(),
            }),
        }
    }

    fn generate_cover(&self, source: MediaReference, time_micros: i64) -> Result<PathBuf> {
        let image = self.extract_frame(FrameRequest::new(source, time_micros, 0))?;
        let cover = self.scratch.create(COVER_PREFIX, COVER_SUFFIX)?;
        image.write_png(cover.path())?;
        let path = cover.keep()?;
        info!(path = %path.display(), "cover image written");
        Ok(path)
    }

    fn shutdown(&self) {
        self.exports.shutdown();
        if !self.chain.shutdown(self.config.shutdown_grace()) {
            warn!("decode attempts still running after shutdown grace period");
        }
        if self.config.purge_scratch_on_dispose {
            if let Err(err) = self.scratch.purge() {
                warn!(error = %err, "failed to purge scratch directory");
            }
        }
    }
}
