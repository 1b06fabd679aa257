//! Single-flight export job controller.
//!
//! At most one export runs at a time. Starting a new one cancels the running
//! job and waits for its teardown, including deletion of its partial output,
//! before the new output file is created.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::backend::{MediaBackend, TranscodeJob};
use crate::composition::{Composition, compose};
use crate::error::{EngineError, Result};
use crate::lifecycle::{ScratchSpace, TempResource};
use crate::pool::CancelToken;
use crate::source::{ContentResolver, MediaReference, materialize_local_copy};
use crate::timeline::{EditTimeline, Effect};

const EXPORT_PREFIX: &str = "export_";
const EXPORT_SUFFIX: &str = ".mp4";

pub type JobId = u64;

/// Export job lifecycle. Terminal states are never left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Created,
    Running,
    Completed,
    Failed(String),
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_) | Self::Cancelled)
    }
}

/// Where the rendered file goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// A fresh `export_*.mp4` in the scratch directory.
    Scratch,
    /// A caller-chosen path that must not exist yet. The job renders into
    /// scratch and moves the file here only once it completes.
    Path(PathBuf),
}

#[derive(Debug)]
pub struct ExportRequest {
    pub source: MediaReference,
    pub timeline: EditTimeline,
    pub target_bitrate_bps: u32,
    pub output: OutputTarget,
}

/// Final result of one job, delivered exactly once.
#[derive(Debug)]
pub enum ExportOutcome {
    Completed(PathBuf),
    Failed(EngineError),
    Cancelled,
}

#[derive(Debug)]
pub struct ExportCompletion {
    pub job_id: JobId,
    pub outcome: ExportOutcome,
}

#[derive(Debug)]
struct JobShared {
    id: JobId,
    output_path: PathBuf,
    target_bitrate_bps: u32,
    cancel: CancelToken,
    state: Mutex<JobState>,
    settled: Condvar,
}

impl JobShared {
    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, next: JobState) {
        let mut state = self.lock();
        if !state.is_terminal() {
            *state = next;
        }
        self.settled.notify_all();
    }
}

/// Caller-side view of an export job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    shared: Arc<JobShared>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.shared.id
    }

    pub fn output_path(&self) -> &Path {
        &self.shared.output_path
    }

    pub fn target_bitrate_bps(&self) -> u32 {
        self.shared.target_bitrate_bps
    }

    pub fn state(&self) -> JobState {
        self.shared.lock().clone()
    }

    /// Blocks until the job reaches a terminal state, or `timeout` elapses.
    pub fn wait_settled(&self, timeout: Duration) -> Option<JobState> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        while !state.is_terminal() {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            state = self
                .shared
                .settled
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        Some(state.clone())
    }
}

struct ActiveExport {
    handle: JobHandle,
    worker: JoinHandle<()>,
}

/// Owns the single export slot.
pub struct ExportController<M> {
    backend: Arc<M>,
    resolver: Arc<dyn ContentResolver>,
    scratch: ScratchSpace,
    active: Mutex<Option<ActiveExport>>,
    next_id: AtomicU64,
}

impl<M> ExportController<M>
where
    M: MediaBackend + 'static,
{
    pub fn new(backend: Arc<M>, resolver: Arc<dyn ContentResolver>, scratch: ScratchSpace) -> Self {
        Self {
            backend,
            resolver,
            scratch,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Starts a job, superseding any job still running.
    ///
    /// Argument errors are returned before anything is cancelled or created.
    /// The job's [`ExportCompletion`] is sent on `notify` exactly once.
    pub fn start(
        &self,
        request: ExportRequest,
        notify: Sender<ExportCompletion>,
    ) -> Result<JobHandle> {
        if request.target_bitrate_bps == 0 {
            return Err(EngineError::invalid("targetBitrateBps", "must be positive"));
        }
        if let OutputTarget::Path(path) = &request.output {
            validate_output_path(path, &request.source)?;
        }

        let mut active = self.lock_active();
        if let Some(previous) = active.take() {
            supersede(previous);
        }

        let output = self.scratch.create(EXPORT_PREFIX, EXPORT_SUFFIX)?;
        let output_path = match &request.output {
            OutputTarget::Scratch => output.path().to_path_buf(),
            OutputTarget::Path(path) => path.clone(),
        };
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::new(JobShared {
            id,
            output_path,
            target_bitrate_bps: request.target_bitrate_bps,
            cancel: CancelToken::new(),
            state: Mutex::new(JobState::Created),
            settled: Condvar::new(),
        });

        let runner = JobRunner {
            backend: Arc::clone(&self.backend),
            resolver: Arc::clone(&self.resolver),
            scratch: self.scratch.clone(),
            shared: Arc::clone(&shared),
        };
        *shared.lock() = JobState::Running;
        let worker = thread::Builder::new()
            .name(format!("export-{id}"))
            .spawn(move || runner.run(request, output, notify))
            .map_err(|source| EngineError::io("failed to spawn export thread", "export", source))?;

        info!(job_id = id, output = %shared.output_path.display(), "export started");
        let handle = JobHandle { shared };
        *active = Some(ActiveExport {
            handle: handle.clone(),
            worker,
        });
        Ok(handle)
    }

    /// Requests cancellation of `handle`; no-op once the job has settled.
    ///
    /// Returns immediately. The job still reports [`ExportOutcome::Cancelled`]
    /// on its notify channel once teardown completes.
    pub fn cancel(&self, handle: &JobHandle) {
        if handle.state().is_terminal() {
            return;
        }
        debug!(job_id = handle.id(), "export cancellation requested");
        handle.shared.cancel.cancel();
    }

    /// Cancels whichever job currently holds the slot.
    pub fn cancel_active(&self) -> Option<JobId> {
        let active = self.lock_active();
        let handle = active.as_ref().map(|active| active.handle.clone())?;
        if handle.state().is_terminal() {
            return None;
        }
        self.cancel(&handle);
        Some(handle.id())
    }

    pub fn active_job(&self) -> Option<JobHandle> {
        self.lock_active()
            .as_ref()
            .map(|active| active.handle.clone())
            .filter(|handle| !handle.state().is_terminal())
    }

    /// True when no job is running and the last job's teardown has finished.
    pub fn is_idle(&self) -> bool {
        self.active_job().is_none()
    }

    /// Cancels the running job, if any, and waits for its teardown.
    pub fn shutdown(&self) {
        let previous = self.lock_active().take();
        if let Some(previous) = previous {
            supersede(previous);
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveExport>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn supersede(previous: ActiveExport) {
    let id = previous.handle.id();
    if !previous.handle.state().is_terminal() {
        info!(job_id = id, "superseding running export");
        previous.handle.shared.cancel.cancel();
    }
    if previous.worker.join().is_err() {
        warn!(job_id = id, "export thread panicked");
        previous.handle.shared.settle(JobState::Failed("export thread panicked".to_string()));
    }
}

fn validate_output_path(path: &Path, source: &MediaReference) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(EngineError::invalid("outputPath", "must not be empty"));
    }
    if let MediaReference::LocalPath(input) = source {
        if same_file(input, path) {
            return Err(EngineError::invalid("outputPath", "must differ from the source"));
        }
    }
    if path.is_dir() {
        return Err(EngineError::invalid("outputPath", "is a directory"));
    }
    if fs::symlink_metadata(path).is_ok() {
        return Err(EngineError::invalid("outputPath", "already exists"));
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => Err(
            EngineError::invalid("outputPath", "parent directory does not exist"),
        ),
        _ => Ok(()),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

struct JobRunner<M> {
    backend: Arc<M>,
    resolver: Arc<dyn ContentResolver>,
    scratch: ScratchSpace,
    shared: Arc<JobShared>,
}

impl<M> JobRunner<M>
where
    M: MediaBackend,
{
    fn run(self, request: ExportRequest, output: TempResource, notify: Sender<ExportCompletion>) {
        let started = Instant::now();
        let id = self.shared.id;
        let result = self.render(&request, output.path());
        let cancelled = self.shared.cancel.is_cancelled();

        let (state, outcome) = match result {
            _ if cancelled => {
                output.release();
                (JobState::Cancelled, ExportOutcome::Cancelled)
            }
            Ok(()) => match hand_off(output, &request.output) {
                Ok(path) => (JobState::Completed, ExportOutcome::Completed(path)),
                Err(err) => (JobState::Failed(err.to_string()), ExportOutcome::Failed(err)),
            },
            Err(err) => {
                output.release();
                (JobState::Failed(err.to_string()), ExportOutcome::Failed(err))
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            ExportOutcome::Completed(path) => {
                info!(job_id = id, path = %path.display(), elapsed_ms, "export completed");
            }
            ExportOutcome::Failed(err) => {
                warn!(job_id = id, error = %err, elapsed_ms, "export failed");
            }
            ExportOutcome::Cancelled => info!(job_id = id, elapsed_ms, "export cancelled"),
        }

        self.shared.settle(state);
        if notify
            .send(ExportCompletion {
                job_id: id,
                outcome,
            })
            .is_err()
        {
            debug!(job_id = id, "export completion receiver dropped");
        }
    }

    fn render(&self, request: &ExportRequest, output_path: &Path) -> Result<()> {
        let cancel = &self.shared.cancel;
        let source =
            materialize_local_copy(&request.source, self.resolver.as_ref(), &self.scratch, cancel)
                .map_err(export_failed)?;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let info = self.backend.probe(source.path(), cancel).map_err(export_failed)?;
        let mut composition = compose(&request.timeline, &info);
        drop_missing_luts(&mut composition);
        debug!(
            job_id = self.shared.id,
            render_width = composition.render_size.0,
            render_height = composition.render_size.1,
            effects = composition.effects.len(),
            "composition built"
        );

        let job = TranscodeJob {
            input: source.path().to_path_buf(),
            composition,
            target_bitrate_bps: request.target_bitrate_bps,
            output_path: output_path.to_path_buf(),
        };
        self.backend.transcode(&job, cancel).map_err(export_failed)
    }
}

fn hand_off(output: TempResource, target: &OutputTarget) -> Result<PathBuf> {
    match target {
        OutputTarget::Scratch => output.keep(),
        OutputTarget::Path(path) => output.persist_to(path),
    }
}

fn export_failed(err: EngineError) -> EngineError {
    match err {
        EngineError::Cancelled | EngineError::ExportFailed { .. } => err,
        other if other.kind() == crate::EngineErrorKind::Cancelled => EngineError::Cancelled,
        other => EngineError::ExportFailed {
            reason: other.to_string(),
        },
    }
}

fn drop_missing_luts(composition: &mut Composition) {
    composition.effects.retain(|effect| match effect {
        Effect::Lut { path, .. } => {
            let readable = fs::metadata(path).is_ok_and(|meta| meta.is_file());
            if !readable {
                warn!(path = %path.display(), "lut image not readable; effect dropped");
            }
            readable
        }
        Effect::ColorMatrix { .. } => true,
    });
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use std::sync::mpsc::{self, Receiver};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use super::{
        ExportCompletion, ExportController, ExportOutcome, ExportRequest, JobState, OutputTarget,
    };
    use crate::backend::{MediaBackend, SeekPolicy, TranscodeJob};
    use crate::composition::SourceInfo;
    use crate::error::{EngineError, Result};
    use crate::frame::RawImage;
    use crate::lifecycle::ScratchSpace;
    use crate::pool::CancelToken;
    use crate::source::{LocalOnlyResolver, MediaReference};
    use crate::timeline::EditTimeline;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Transcode {
        Succeed,
        Fail,
        /// Writes partial output, then runs until cancelled.
        RunUntilCancelled,
    }

    struct MockBackend {
        transcode: Transcode,
        jobs: Arc<Mutex<Vec<TranscodeJob>>>,
    }

    impl MockBackend {
        fn new(transcode: Transcode) -> Self {
            Self {
                transcode,
                jobs: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl MediaBackend for MockBackend {
        fn probe(&self, _path: &Path, _cancel: &CancelToken) -> Result<SourceInfo> {
            Ok(SourceInfo {
                duration_micros: Some(5_000_000),
                width: 320,
                height: 240,
            })
        }

        fn thumbnail(&self, _: &Path, _: i64, _: u32, _: &CancelToken) -> Result<RawImage> {
            Err(EngineError::invalid("mock", "unused"))
        }

        fn frame_at_time(
            &self,
            _: &Path,
            _: i64,
            _: SeekPolicy,
            _: &CancelToken,
        ) -> Result<RawImage> {
            Err(EngineError::invalid("mock", "unused"))
        }

        fn decode_pipeline_frame(&self, _: &Path, _: i64, _: &CancelToken) -> Result<RawImage> {
            Err(EngineError::invalid("mock", "unused"))
        }

        fn transcode(&self, job: &TranscodeJob, cancel: &CancelToken) -> Result<()> {
            self.jobs.lock().expect("lock").push(job.clone());
            let mut file = std::fs::File::create(&job.output_path)
                .map_err(|source| EngineError::io("mock write", &job.output_path, source))?;
            let _ = file.write_all(b"partial");
            match self.transcode {
                Transcode::Succeed => Ok(()),
                Transcode::Fail => Err(EngineError::invalid("mock", "encoder exploded")),
                Transcode::RunUntilCancelled => {
                    let deadline = Instant::now() + Duration::from_secs(10);
                    while !cancel.is_cancelled() && Instant::now() < deadline {
                        thread::sleep(Duration::from_millis(2));
                    }
                    Err(EngineError::Cancelled)
                }
            }
        }
    }

    fn controller(
        transcode: Transcode,
        scratch_dir: &Path,
    ) -> (ExportController<MockBackend>, Arc<Mutex<Vec<TranscodeJob>>>) {
        let backend = MockBackend::new(transcode);
        let jobs = Arc::clone(&backend.jobs);
        let controller = ExportController::new(
            Arc::new(backend),
            Arc::new(LocalOnlyResolver),
            ScratchSpace::new(scratch_dir.join("video_native")),
        );
        (controller, jobs)
    }

    fn request(timeline: EditTimeline) -> ExportRequest {
        ExportRequest {
            source: MediaReference::LocalPath(PathBuf::from("/videos/source.mp4")),
            timeline,
            target_bitrate_bps: 2_000_000,
            output: OutputTarget::Scratch,
        }
    }

    fn next(rx: &Receiver<ExportCompletion>) -> ExportCompletion {
        rx.recv_timeout(Duration::from_secs(10))
            .expect("completion must arrive")
    }

    #[test]
    fn completed_export_hands_off_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (controller, jobs) = controller(Transcode::Succeed, dir.path());
        let (tx, rx) = mpsc::channel();

        let handle = controller.start(request(EditTimeline::default()), tx).expect("start");
        let completion = next(&rx);

        assert_eq!(completion.job_id, handle.id());
        let ExportOutcome::Completed(path) = completion.outcome else {
            panic!("expected completion");
        };
        assert!(path.exists());
        assert!(
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("export_") && name.ends_with(".mp4"))
        );
        assert_eq!(handle.state(), JobState::Completed);
        assert_eq!(jobs.lock().expect("lock")[0].target_bitrate_bps, 2_000_000);
        assert!(controller.is_idle());
    }

    #[test]
    fn failed_export_deletes_output_and_reports_reason() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (controller, _) = controller(Transcode::Fail, dir.path());
        let (tx, rx) = mpsc::channel();

        let handle = controller.start(request(EditTimeline::default()), tx).expect("start");
        let completion = next(&rx);

        let ExportOutcome::Failed(error) = completion.outcome else {
            panic!("expected failure");
        };
        assert_eq!(error.code(), "export_failed");
        assert!(!handle.output_path().exists());
        assert!(matches!(handle.state(), JobState::Failed(_)));
    }

    #[test]
    fn cancel_shortly_after_start_reports_cancelled_and_removes_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (controller, _) = controller(Transcode::RunUntilCancelled, dir.path());
        let (tx, rx) = mpsc::channel();

        let handle = controller.start(request(EditTimeline::default()), tx).expect("start");
        thread::sleep(Duration::from_millis(10));
        controller.cancel(&handle);
        controller.cancel(&handle);

        let completion = next(&rx);
        assert!(matches!(completion.outcome, ExportOutcome::Cancelled));
        assert!(!handle.output_path().exists());
        assert_eq!(handle.state(), JobState::Cancelled);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        controller.cancel(&handle);
        assert_eq!(handle.state(), JobState::Cancelled);
    }

    #[test]
    fn starting_a_second_job_supersedes_the_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (controller, _) = controller(Transcode::RunUntilCancelled, dir.path());
        let (first_tx, first_rx) = mpsc::channel();
        let (second_tx, second_rx) = mpsc::channel();

        let first = controller
            .start(request(EditTimeline::default()), first_tx)
            .expect("first start");
        thread::sleep(Duration::from_millis(10));
        let second = controller
            .start(request(EditTimeline::default()), second_tx)
            .expect("second start");

        // The first job settled before the second job's output existed.
        assert_eq!(first.state(), JobState::Cancelled);
        assert!(!first.output_path().exists());
        assert!(matches!(next(&first_rx).outcome, ExportOutcome::Cancelled));
        assert_eq!(controller.active_job().map(|job| job.id()), Some(second.id()));

        assert_eq!(controller.cancel_active(), Some(second.id()));
        assert!(matches!(next(&second_rx).outcome, ExportOutcome::Cancelled));
    }

    #[test]
    fn invalid_arguments_leave_running_job_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (controller, _) = controller(Transcode::RunUntilCancelled, dir.path());
        let (tx, rx) = mpsc::channel();
        let running = controller.start(request(EditTimeline::default()), tx).expect("start");

        let mut bad = request(EditTimeline::default());
        bad.target_bitrate_bps = 0;
        let (bad_tx, _bad_rx) = mpsc::channel();
        let error = controller.start(bad, bad_tx).expect_err("zero bitrate");

        assert_eq!(error.code(), "bad_args");
        assert_eq!(running.state(), JobState::Running);
        controller.shutdown();
        assert!(matches!(next(&rx).outcome, ExportOutcome::Cancelled));
    }

    fn scratch_leftovers(dir: &Path) -> usize {
        std::fs::read_dir(dir.join("video_native"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[test]
    fn explicit_output_is_written_only_on_completion() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (controller, jobs) = controller(Transcode::Succeed, dir.path());
        let target = dir.path().join("edited.mp4");
        let (tx, rx) = mpsc::channel();
        let mut request = request(EditTimeline::default());
        request.output = OutputTarget::Path(target.clone());

        let handle = controller.start(request, tx).expect("start");

        let ExportOutcome::Completed(path) = next(&rx).outcome else {
            panic!("expected completion");
        };
        assert_eq!(path, target);
        assert_eq!(handle.output_path(), target.as_path());
        assert_eq!(std::fs::read(&target).expect("read"), b"partial");
        assert_ne!(jobs.lock().expect("lock")[0].output_path, target);
        assert_eq!(scratch_leftovers(dir.path()), 0);
    }

    #[test]
    fn explicit_output_path_is_untouched_on_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (controller, _) = controller(Transcode::Fail, dir.path());
        let target = dir.path().join("edited.mp4");
        let (tx, rx) = mpsc::channel();
        let mut request = request(EditTimeline::default());
        request.output = OutputTarget::Path(target.clone());

        controller.start(request, tx).expect("start");

        assert!(matches!(next(&rx).outcome, ExportOutcome::Failed(_)));
        assert!(!target.exists());
        assert_eq!(scratch_leftovers(dir.path()), 0);
    }

    #[test]
    fn output_equal_to_source_is_rejected_and_source_survives() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (controller, jobs) = controller(Transcode::Fail, dir.path());
        let clip = dir.path().join("clip.mp4");
        std::fs::write(&clip, b"original video").expect("write");
        let (tx, rx) = mpsc::channel();
        let request = ExportRequest {
            source: MediaReference::LocalPath(clip.clone()),
            timeline: EditTimeline::default(),
            target_bitrate_bps: 2_000_000,
            output: OutputTarget::Path(clip.clone()),
        };

        let error = controller.start(request, tx).expect_err("output equals source");

        assert_eq!(error.code(), "bad_args");
        assert_eq!(std::fs::read(&clip).expect("read"), b"original video");
        assert!(jobs.lock().expect("lock").is_empty());
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn existing_output_is_rejected_and_left_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (controller, _) = controller(Transcode::RunUntilCancelled, dir.path());
        let target = dir.path().join("keep.mp4");
        std::fs::write(&target, b"keep me").expect("write");
        let (running_tx, running_rx) = mpsc::channel();
        let running = controller
            .start(request(EditTimeline::default()), running_tx)
            .expect("start");
        let (tx, _rx) = mpsc::channel();
        let mut request = request(EditTimeline::default());
        request.output = OutputTarget::Path(target.clone());

        let error = controller.start(request, tx).expect_err("target exists");

        assert_eq!(error.code(), "bad_args");
        assert_eq!(std::fs::read(&target).expect("read"), b"keep me");
        assert_eq!(running.state(), JobState::Running);
        controller.shutdown();
        assert!(matches!(next(&running_rx).outcome, ExportOutcome::Cancelled));
        assert_eq!(std::fs::read(&target).expect("read"), b"keep me");
    }

    #[test]
    fn unreadable_lut_is_dropped_before_transcode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (controller, jobs) = controller(Transcode::Succeed, dir.path());
        let (tx, rx) = mpsc::channel();
        let parsed = EditTimeline::from_json(&serde_json::json!({
            "trim": { "startSeconds": 2, "endSeconds": 1 },
            "effects": [
                { "type": "lut", "path": "/missing/lut.png", "width": 64, "height": 64, "depth": 16 }
            ]
        }));

        controller.start(request(parsed.timeline), tx).expect("start");
        assert!(matches!(next(&rx).outcome, ExportOutcome::Completed(_)));

        let jobs = jobs.lock().expect("lock");
        assert!(jobs[0].composition.effects.is_empty());
        assert_eq!(jobs[0].composition.time_range, None);
    }
}
