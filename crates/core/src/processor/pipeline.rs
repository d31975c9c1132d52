//! The per-command driver.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::ProcessorSettings;
use super::error::JobError;
use super::types::{Artifact, Delivery, JobOutcome, JobReport, JobRequest, JobStatus, JobTransform};
use crate::acquire::{is_tenor_mp4, ChatContext, LinkResolver, MediaFetcher, MediaLocator};
use crate::admission::AdmissionGate;
use crate::dispatch::{ParallelDispatcher, WorkerLauncher};
use crate::media::{MediaEncoder, MediaKind};
use crate::metrics;
use crate::tempfiles::{ScopeLease, TempScope, TempStore};
use crate::transform::{ExecutionMode, TransformContext, TransformOutput};

/// Bookkeeping collected while a job runs, reported even on failure.
#[derive(Default)]
struct RunState {
    input_kinds: Vec<MediaKind>,
    remediated: bool,
    delivered: bool,
}

/// Drives commands from media lookup to delivery.
///
/// One processor is shared by every concurrent command; each call to
/// [`run`](Self::run) opens its own temp file scope.
pub struct MediaProcessor {
    settings: ProcessorSettings,
    store: TempStore,
    gate: Arc<AdmissionGate>,
    encoder: Arc<dyn MediaEncoder>,
    fetcher: Arc<dyn MediaFetcher>,
    locator: MediaLocator,
    dispatcher: Option<ParallelDispatcher>,
}

impl MediaProcessor {
    pub fn new(
        settings: ProcessorSettings,
        store: TempStore,
        encoder: Arc<dyn MediaEncoder>,
        fetcher: Arc<dyn MediaFetcher>,
        resolver: Arc<dyn LinkResolver>,
    ) -> Self {
        let gate = Arc::new(AdmissionGate::new(settings.workers));
        let locator = MediaLocator::new(resolver, settings.history_limit);
        Self {
            settings,
            store,
            gate,
            encoder,
            fetcher,
            locator,
            dispatcher: None,
        }
    }

    /// Enables isolated execution of sync transforms.
    pub fn with_launcher(mut self, launcher: Arc<dyn WorkerLauncher>) -> Self {
        self.dispatcher = Some(ParallelDispatcher::new(launcher));
        self
    }

    /// Shares an existing gate instead of the one sized from settings.
    pub fn with_gate(mut self, gate: Arc<AdmissionGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn gate(&self) -> &Arc<AdmissionGate> {
        &self.gate
    }

    pub fn store(&self) -> &TempStore {
        &self.store
    }

    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    /// Runs one command.
    ///
    /// Never fails as a call: the outcome, error included, is in the report.
    /// Every temp file the job created is deleted before this returns.
    pub async fn run(
        &self,
        chat: &dyn ChatContext,
        delivery: &dyn Delivery,
        job: JobRequest,
    ) -> JobReport {
        let job_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        let transform = job.transform.name().to_string();
        info!(%job_id, transform = %transform, inputs = job.inputs.len(), "Job started");

        let mut state = RunState::default();
        let lease = ScopeLease::new();
        let (outcome, temp_files_removed) = match self.store.open_scope(&lease) {
            Ok(mut scope) => {
                let outcome = self
                    .execute(&mut scope, chat, delivery, &job, &mut state)
                    .await;
                let report = scope.close().await;
                debug!(%job_id, removed = report.removed, failed = report.failed, "Job scope closed");
                (outcome, report.removed)
            }
            Err(e) => (Err(JobError::from(e)), 0),
        };

        if let Err(e) = &outcome {
            if e.is_storage_full() {
                let purged = self.store.purge().await;
                metrics::TEMP_PURGES.inc();
                error!(%job_id, purged, "Out of disk space, purged temp directory");
            }
        }

        let elapsed = start.elapsed();
        metrics::JOB_DURATION
            .with_label_values(&[transform.as_str()])
            .observe(elapsed.as_secs_f64());
        let label = match &outcome {
            Ok(_) => "completed",
            Err(e) => e.metric_label(),
        };
        metrics::JOBS_TOTAL.with_label_values(&[label]).inc();

        match &outcome {
            Ok(_) => info!(%job_id, transform = %transform, elapsed_ms = elapsed.as_millis() as u64, "Job completed"),
            Err(e) => match e.diagnostics() {
                Some(output) => error!(%job_id, transform = %transform, "Job failed: {}\n{}", e, output),
                None => warn!(%job_id, transform = %transform, class = ?e.class(), "Job failed: {}", e),
            },
        }

        JobReport {
            job_id,
            transform,
            started_at,
            duration_ms: elapsed.as_millis() as u64,
            input_kinds: state.input_kinds,
            temp_files_removed,
            remediated: state.remediated,
            delivered: state.delivered,
            outcome,
        }
    }

    async fn execute(
        &self,
        scope: &mut TempScope,
        chat: &dyn ChatContext,
        delivery: &dyn Delivery,
        job: &JobRequest,
        state: &mut RunState,
    ) -> Result<JobOutcome, JobError> {
        let mut inputs = if job.inputs.is_empty() {
            Vec::new()
        } else {
            delivery.notify(JobStatus::Downloading).await;
            self.acquire_inputs(scope, chat, job.inputs.len()).await?
        };

        state.input_kinds = self.check_inputs(&inputs, &job.inputs).await?;

        for path in &inputs {
            match self.encoder.is_apng(path).await {
                Ok(true) => {
                    warn!(path = %path.display(), "APNG input, only the first frame is used");
                    delivery
                        .notice("Animated PNGs are not fully supported; only the first frame will be used.")
                        .await;
                }
                Ok(false) => {}
                Err(e) => debug!(path = %path.display(), "APNG check failed: {}", e),
            }
        }

        if job.options.resize {
            for path in inputs.iter_mut() {
                *path = self
                    .encoder
                    .ensure_size(scope, path, self.settings.min_size, self.settings.max_size)
                    .await?;
            }
        }

        let permit = if job.options.queue {
            if self.gate.is_saturated() {
                delivery.notify(JobStatus::Queued).await;
            }
            Some(self.gate.acquire().await.map_err(|_| JobError::ShuttingDown)?)
        } else {
            None
        };

        delivery.notify(JobStatus::Processing).await;
        for path in inputs.iter_mut() {
            *path = self.encoder.ensure_duration(scope, path).await?;
        }

        let output = self.invoke(scope, job, &inputs).await?;

        let artifact = match output {
            TransformOutput::Text(text) if !text.is_empty() && !job.options.expect_result => {
                Ok(Outcome::Text(text))
            }
            TransformOutput::File(path) if job.options.expect_result => {
                self.normalize(scope, path, job.transform.name(), state)
                    .await
                    .map(Outcome::File)
            }
            TransformOutput::File(path) => Ok(Outcome::File(path)),
            _ => Err(JobError::ReturnedNothing {
                transform: job.transform.name().to_string(),
                expected: if job.options.expect_result {
                    "a file"
                } else {
                    "status text"
                },
            }),
        }?;
        drop(permit);

        match artifact {
            Outcome::Text(text) => {
                delivery.deliver(Artifact::Text(&text)).await;
                state.delivered = true;
                Ok(JobOutcome::Text(text))
            }
            Outcome::File(path) => {
                let bytes = file_size(&path).await?;
                if job.options.deliver_result {
                    delivery.notify(JobStatus::Uploading).await;
                    delivery.deliver(Artifact::File(&path)).await;
                    state.delivered = true;
                }
                Ok(JobOutcome::File { bytes })
            }
        }
    }

    /// Locates and downloads `n` inputs into `scope`.
    async fn acquire_inputs(
        &self,
        scope: &mut TempScope,
        chat: &dyn ChatContext,
        n: usize,
    ) -> Result<Vec<PathBuf>, JobError> {
        let Some(urls) = self.locator.locate(chat, n).await? else {
            return Err(JobError::NoMediaFound { required: n });
        };

        let mut paths = Vec::with_capacity(urls.len());
        for url in &urls {
            let mut path = self.fetcher.fetch(url, scope).await?;
            if is_tenor_mp4(url) {
                path = self.encoder.mp4_to_gif(scope, &path).await?;
            }
            paths.push(path);
        }
        Ok(paths)
    }

    /// Classifies inputs and checks each against its accepted kinds.
    ///
    /// An empty accepted set takes any kind.
    async fn check_inputs(
        &self,
        inputs: &[PathBuf],
        accepted: &[Vec<MediaKind>],
    ) -> Result<Vec<MediaKind>, JobError> {
        let mut kinds = Vec::with_capacity(inputs.len());
        for (index, (path, expected)) in inputs.iter().zip(accepted).enumerate() {
            let kind = self.encoder.classify(path).await?;
            if !expected.is_empty() && !expected.contains(&kind) {
                return Err(JobError::MediaKindMismatch {
                    index: index + 1,
                    found: kind,
                    expected: expected.clone(),
                });
            }
            kinds.push(kind);
        }
        Ok(kinds)
    }

    async fn invoke(
        &self,
        scope: &mut TempScope,
        job: &JobRequest,
        inputs: &[PathBuf],
    ) -> Result<TransformOutput, JobError> {
        match &job.transform {
            JobTransform::Async(transform) => {
                let mut ctx = TransformContext {
                    scope,
                    encoder: self.encoder.as_ref(),
                };
                Ok(transform.run(inputs, &job.args, &mut ctx).await?)
            }
            JobTransform::Sync(transform) => match job.options.mode {
                ExecutionMode::Isolated => {
                    let dispatcher = self.dispatcher.as_ref().ok_or_else(|| {
                        JobError::Internal(format!(
                            "{} needs an isolated worker but none is configured",
                            transform.name()
                        ))
                    })?;
                    Ok(dispatcher
                        .dispatch(transform.name(), inputs, &job.args, scope)
                        .await?)
                }
                ExecutionMode::Inline => {
                    warn!(
                        transform = transform.name(),
                        "Running sync transform inline, this blocks the event loop"
                    );
                    Ok(transform.run(inputs, &job.args, scope)?)
                }
            },
        }
    }

    /// Re-encodes video results and applies the one-shot size policy.
    async fn normalize(
        &self,
        scope: &mut TempScope,
        path: PathBuf,
        transform: &str,
        state: &mut RunState,
    ) -> Result<PathBuf, JobError> {
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(JobError::ReturnedNothing {
                transform: transform.to_string(),
                expected: "a file",
            });
        }

        let kind = self.encoder.classify(&path).await?;
        let path = if kind == MediaKind::Video {
            self.encoder.reencode(scope, &path).await?
        } else {
            path
        };

        let size = file_size(&path).await?;
        if size <= self.settings.max_file_size {
            return Ok(path);
        }

        info!(size, limit = self.settings.max_file_size, "Result too big, shrinking once");
        state.remediated = true;
        let path = self
            .encoder
            .shrink(scope, &path, kind, self.settings.max_file_size)
            .await?;
        let size = file_size(&path).await?;
        if size > self.settings.way_too_big_size {
            metrics::SIZE_REMEDIATIONS
                .with_label_values(&["too_large"])
                .inc();
            return Err(JobError::ResultTooLarge {
                size,
                limit: self.settings.way_too_big_size,
            });
        }
        metrics::SIZE_REMEDIATIONS.with_label_values(&["fits"]).inc();
        Ok(path)
    }
}

/// A result on its way to delivery.
enum Outcome {
    File(PathBuf),
    Text(String),
}

async fn file_size(path: &Path) -> Result<u64, JobError> {
    Ok(tokio::fs::metadata(path).await?.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::ChatMessage;
    use crate::processor::ProcessOptions;
    use crate::testing::{MockChat, MockEncoder, MockFetcher, MockResolver, RecordingDelivery};
    use crate::transform::{InfoTransform, MirrorTransform, ReverseTransform};

    struct Fixture {
        _dir: tempfile::TempDir,
        store: TempStore,
        encoder: Arc<MockEncoder>,
        fetcher: Arc<MockFetcher>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = TempStore::attach(dir.path());
            Self {
                _dir: dir,
                store,
                encoder: Arc::new(MockEncoder::new()),
                fetcher: Arc::new(MockFetcher::new()),
            }
        }

        fn processor(&self, settings: ProcessorSettings) -> MediaProcessor {
            MediaProcessor::new(
                settings,
                self.store.clone(),
                self.encoder.clone(),
                self.fetcher.clone(),
                Arc::new(MockResolver::new()),
            )
        }

        fn leftovers(&self) -> usize {
            std::fs::read_dir(self.store.dir()).unwrap().count()
        }
    }

    fn chat_with(url: &str) -> MockChat {
        MockChat::new(ChatMessage::new(1).with_attachment("clip.mp4", url))
    }

    #[tokio::test]
    async fn test_no_media_found() {
        let fx = Fixture::new();
        let processor = fx.processor(ProcessorSettings::default());
        let chat = MockChat::new(ChatMessage::new(1));
        let delivery = RecordingDelivery::new();

        let job = JobRequest::asynchronous(Arc::new(ReverseTransform))
            .with_inputs(vec![vec![MediaKind::Video]]);
        let report = processor.run(&chat, &delivery, job).await;

        assert!(matches!(
            report.outcome,
            Err(JobError::NoMediaFound { required: 1 })
        ));
        assert_eq!(delivery.statuses(), vec![JobStatus::Downloading]);
        assert!(delivery.artifacts().is_empty());
    }

    #[tokio::test]
    async fn test_async_transform_result_delivered_then_cleaned() {
        let fx = Fixture::new();
        fx.fetcher.serve("https://cdn.example/clip.mp4", vec![0u8; 64]);
        fx.encoder.set_default_kind(MediaKind::Video);
        let processor = fx.processor(ProcessorSettings::default());
        let chat = chat_with("https://cdn.example/clip.mp4");
        let delivery = RecordingDelivery::new();

        let job = JobRequest::asynchronous(Arc::new(ReverseTransform))
            .with_inputs(vec![vec![MediaKind::Video, MediaKind::Gif]]);
        let report = processor.run(&chat, &delivery, job).await;

        assert!(report.is_success(), "{:?}", report.outcome);
        assert_eq!(report.input_kinds, vec![MediaKind::Video]);
        assert!(report.delivered);
        assert_eq!(
            delivery.statuses(),
            vec![
                JobStatus::Downloading,
                JobStatus::Processing,
                JobStatus::Uploading
            ]
        );
        assert_eq!(delivery.artifacts().len(), 1);
        // input, transform output and the normalizing re-encode
        assert!(report.temp_files_removed >= 3);
        assert_eq!(fx.leftovers(), 0);
        assert_eq!(fx.encoder.calls("reencode"), 1);
    }

    #[tokio::test]
    async fn test_text_result_delivered_without_upload() {
        let fx = Fixture::new();
        fx.fetcher.serve("https://cdn.example/clip.mp4", vec![0u8; 64]);
        fx.encoder.set_default_kind(MediaKind::Video);
        let processor = fx.processor(ProcessorSettings::default());
        let chat = chat_with("https://cdn.example/clip.mp4");
        let delivery = RecordingDelivery::new();

        let job = JobRequest::asynchronous(Arc::new(InfoTransform))
            .with_inputs(vec![MediaKind::ANY.to_vec()])
            .with_options(
                ProcessOptions::default()
                    .with_expect_result(false)
                    .with_resize(false),
            );
        let report = processor.run(&chat, &delivery, job).await;

        match report.outcome {
            Ok(JobOutcome::Text(text)) => assert!(text.starts_with("Type: VIDEO")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(!delivery.statuses().contains(&JobStatus::Uploading));
        assert!(delivery.texts()[0].starts_with("Type: VIDEO"));
    }

    #[tokio::test]
    async fn test_text_when_file_expected_returns_nothing() {
        let fx = Fixture::new();
        fx.fetcher.serve("https://cdn.example/clip.mp4", vec![0u8; 64]);
        fx.encoder.set_default_kind(MediaKind::Video);
        let processor = fx.processor(ProcessorSettings::default());
        let chat = chat_with("https://cdn.example/clip.mp4");
        let delivery = RecordingDelivery::new();

        let job = JobRequest::asynchronous(Arc::new(InfoTransform))
            .with_inputs(vec![MediaKind::ANY.to_vec()]);
        let report = processor.run(&chat, &delivery, job).await;

        match report.outcome {
            Err(JobError::ReturnedNothing { transform, expected }) => {
                assert_eq!(transform, "info");
                assert_eq!(expected, "a file");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(delivery.artifacts().is_empty());
        assert!(!report.delivered);
        assert_eq!(fx.leftovers(), 0);
    }

    #[tokio::test]
    async fn test_isolated_without_launcher_is_internal() {
        let fx = Fixture::new();
        fx.fetcher.serve("https://cdn.example/a.png", vec![0u8; 8]);
        fx.encoder.set_default_kind(MediaKind::Image);
        let processor = fx.processor(ProcessorSettings::default());
        let chat = chat_with("https://cdn.example/a.png");
        let delivery = RecordingDelivery::new();

        let job = JobRequest::synchronous(Arc::new(MirrorTransform))
            .with_inputs(vec![MediaKind::VISUAL.to_vec()])
            .with_options(ProcessOptions::default().with_mode(ExecutionMode::Isolated));
        let report = processor.run(&chat, &delivery, job).await;

        assert!(matches!(report.outcome, Err(JobError::Internal(_))));
        assert_eq!(fx.leftovers(), 0);
    }

    #[tokio::test]
    async fn test_unqueued_job_skips_gate() {
        let fx = Fixture::new();
        fx.fetcher.serve("https://cdn.example/clip.mp4", vec![0u8; 64]);
        fx.encoder.set_default_kind(MediaKind::Video);
        let processor = fx.processor(ProcessorSettings::default().with_workers(1));
        let _held = processor.gate().acquire().await.unwrap();
        let chat = chat_with("https://cdn.example/clip.mp4");
        let delivery = RecordingDelivery::new();

        let job = JobRequest::asynchronous(Arc::new(ReverseTransform))
            .with_inputs(vec![vec![MediaKind::Video]])
            .with_options(ProcessOptions::default().with_queue(false));
        let report = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            processor.run(&chat, &delivery, job),
        )
        .await
        .unwrap();

        assert!(report.is_success());
        assert!(!delivery.statuses().contains(&JobStatus::Queued));
    }

    #[tokio::test]
    async fn test_storage_full_purges_temp_dir() {
        let fx = Fixture::new();
        std::fs::write(fx.store.dir().join("stale.bin"), b"x").unwrap();
        fx.fetcher.serve("https://cdn.example/clip.mp4", vec![0u8; 64]);
        fx.encoder.set_default_kind(MediaKind::Video);
        fx.encoder.fail_ffmpeg("av_interleaved_write_frame(): No space left on device");
        let processor = fx.processor(ProcessorSettings::default());
        let chat = chat_with("https://cdn.example/clip.mp4");
        let delivery = RecordingDelivery::new();

        let job = JobRequest::asynchronous(Arc::new(ReverseTransform))
            .with_inputs(vec![vec![MediaKind::Video]]);
        let report = processor.run(&chat, &delivery, job).await;

        let err = report.outcome.unwrap_err();
        assert!(err.is_storage_full());
        assert_eq!(fx.leftovers(), 0);
    }
}
