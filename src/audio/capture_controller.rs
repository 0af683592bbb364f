use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::audio_source::{AudioSource, CaptureError};
use super::capture_buffer::CaptureBuffer;
use super::loudness::{self, LoudnessValue, DEFAULT_TOP_FRACTION};
use crate::detection::ResultChannel;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapturePhase {
    #[default]
    Idle,
    Capturing,
    Finalizing,
}

impl CapturePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapturePhase::Idle => "idle",
            CapturePhase::Capturing => "capturing",
            CapturePhase::Finalizing => "finalizing",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CaptureStatus {
    pub phase: CapturePhase,
    pub last_error: Option<String>,
    pub windows_completed: u64,
    pub last_window_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Clone, Default)]
pub struct CaptureStatusHandle {
    inner: Arc<Mutex<CaptureStatus>>,
}

impl CaptureStatusHandle {
    pub async fn get(&self) -> CaptureStatus {
        self.inner.lock().await.clone()
    }

    pub async fn set_phase(&self, phase: CapturePhase) {
        self.inner.lock().await.phase = phase;
    }

    pub async fn set_error(&self, error: String) {
        self.inner.lock().await.last_error = Some(error);
    }

    async fn begin_capture(&self) {
        let mut status = self.inner.lock().await;
        status.phase = CapturePhase::Capturing;
        status.last_error = None;
    }

    /// Called from the acquisition thread when a read ends the session early.
    fn record_read_failure(&self, error: &CaptureError) {
        let mut status = self.inner.blocking_lock();
        status.phase = CapturePhase::Idle;
        status.last_error = Some(error.to_string());
    }

    /// Record a finished window. A session started while this window was being
    /// estimated keeps its `Capturing` phase.
    async fn complete_window(&self) {
        let mut status = self.inner.lock().await;
        if status.phase == CapturePhase::Finalizing {
            status.phase = CapturePhase::Idle;
        }
        status.windows_completed += 1;
        status.last_window_at = Some(chrono::Utc::now());
    }
}

/// Result of [`CaptureController::stop`].
pub enum StopOutcome {
    /// No session was active.
    NotCapturing,
    /// The window is being estimated; the handle resolves to the published value.
    Finalizing(JoinHandle<Option<LoudnessValue>>),
    /// The session ended on a read error and its window was discarded.
    Failed(CaptureError),
}

struct ActiveSession {
    active: Arc<AtomicBool>,
    task: JoinHandle<SessionOutcome>,
}

struct SessionOutcome {
    source: Box<dyn AudioSource>,
    window: CaptureBuffer,
    failure: Option<CaptureError>,
}

/// Windowed capture state machine: `Idle → Capturing → Finalizing → Idle`.
///
/// Owns the audio source and the capture window. While a session runs both are
/// moved into the acquisition loop, which hands them back when it halts.
pub struct CaptureController {
    source: Option<Box<dyn AudioSource>>,
    window: CaptureBuffer,
    session: Option<ActiveSession>,
    results: ResultChannel,
    status: CaptureStatusHandle,
    top_fraction: f64,
}

impl CaptureController {
    pub fn new(source: Box<dyn AudioSource>, results: ResultChannel) -> Self {
        Self {
            source: Some(source),
            window: CaptureBuffer::new(),
            session: None,
            results,
            status: CaptureStatusHandle::default(),
            top_fraction: DEFAULT_TOP_FRACTION,
        }
    }

    pub fn with_top_fraction(mut self, top_fraction: f64) -> Self {
        self.top_fraction = top_fraction;
        self
    }

    pub fn status(&self) -> CaptureStatusHandle {
        self.status.clone()
    }

    pub fn results(&self) -> ResultChannel {
        self.results.clone()
    }

    /// Whether an acquisition loop is still running. A loop that ended on a
    /// read error no longer counts, even before [`stop`](Self::stop) reaps it.
    pub fn is_capturing(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| !session.task.is_finished())
    }

    /// Whether the audio source was lost to a crashed acquisition loop. No
    /// further window can be captured once this is true.
    pub fn is_source_lost(&self) -> bool {
        self.source.is_none() && self.session.is_none()
    }

    /// Begin a capture window.
    ///
    /// Opens the source on first use. Calling this while a window is already
    /// being captured does nothing.
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        if self.is_capturing() {
            debug!("CaptureController: start ignored, capture already active");
            return Ok(());
        }
        if self.session.is_some() {
            debug!("CaptureController: reaping acquisition loop that ended on its own");
            self.stop().await;
        }

        let mut source = self.source.take().ok_or_else(|| {
            CaptureError::DeviceUnavailable("audio source lost by a previous session".to_string())
        })?;

        if let Err(e) = prepare_source(source.as_mut()) {
            self.source = Some(source);
            self.status.set_error(e.to_string()).await;
            return Err(e);
        }

        self.window.reset();
        let window = std::mem::take(&mut self.window);
        let active = Arc::new(AtomicBool::new(true));
        let loop_active = Arc::clone(&active);
        let loop_status = self.status.clone();
        let task = tokio::task::spawn_blocking(move || {
            run_acquisition(source, window, loop_active, loop_status)
        });

        self.session = Some(ActiveSession { active, task });
        self.status.begin_capture().await;
        info!("CaptureController: capture window started");
        Ok(())
    }

    /// End the current window and estimate its loudness in the background.
    ///
    /// Waits only for the acquisition loop to halt, never for the estimate.
    pub async fn stop(&mut self) -> StopOutcome {
        let Some(session) = self.session.take() else {
            debug!("CaptureController: stop ignored, no capture active");
            return StopOutcome::NotCapturing;
        };

        session.active.store(false, Ordering::Release);
        self.status.set_phase(CapturePhase::Finalizing).await;

        let outcome = match session.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Acquisition loop aborted, audio source is lost: {}", e);
                let err = CaptureError::ReadFailure(format!("acquisition loop aborted: {e}"));
                self.status.set_error(err.to_string()).await;
                self.status.set_phase(CapturePhase::Idle).await;
                return StopOutcome::Failed(err);
            }
        };

        self.source = Some(outcome.source);

        if let Some(err) = outcome.failure {
            warn!(
                "Discarding capture window of {} samples after read failure",
                outcome.window.len()
            );
            self.window = outcome.window;
            self.status.set_error(err.to_string()).await;
            self.status.set_phase(CapturePhase::Idle).await;
            return StopOutcome::Failed(err);
        }

        StopOutcome::Finalizing(self.spawn_finalize(outcome.window))
    }

    /// Stop any active window and release the device.
    pub async fn close(&mut self) {
        if let StopOutcome::Finalizing(handle) = self.stop().await {
            if let Err(e) = handle.await {
                warn!("Final loudness estimate did not complete: {}", e);
            }
        }
        if let Some(source) = self.source.as_mut() {
            source.close();
            info!("CaptureController: audio source closed");
        }
    }

    fn spawn_finalize(&self, window: CaptureBuffer) -> JoinHandle<Option<LoudnessValue>> {
        let results = self.results.clone();
        let status = self.status.clone();
        let top_fraction = self.top_fraction;

        tokio::spawn(async move {
            let sample_count = window.len();
            let estimate = tokio::task::spawn_blocking(move || {
                let mut window = window;
                let value = loudness::estimate_top_fraction(window.samples(), top_fraction);
                window.reset();
                value
            })
            .await;

            let value = match estimate {
                Ok(value) => value,
                Err(e) => {
                    error!("Loudness estimate failed: {}", e);
                    status.set_error(e.to_string()).await;
                    status.set_phase(CapturePhase::Idle).await;
                    return None;
                }
            };

            debug!("Window of {} samples -> loudness {:.1}", sample_count, value);
            results.publish(value);
            status.complete_window().await;
            Some(value)
        })
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        // The loop stops the source on its way out.
        if let Some(session) = &self.session {
            debug!("Dropping active CaptureController, signalling acquisition loop");
            session.active.store(false, Ordering::Release);
        }
    }
}

fn prepare_source(source: &mut dyn AudioSource) -> Result<(), CaptureError> {
    if !source.is_open() {
        source.open()?;
    }
    if let Err(e) = source.start() {
        source.close();
        return Err(e);
    }
    Ok(())
}

fn run_acquisition(
    mut source: Box<dyn AudioSource>,
    mut window: CaptureBuffer,
    active: Arc<AtomicBool>,
    status: CaptureStatusHandle,
) -> SessionOutcome {
    let mut block = vec![0; source.block_size().max(1)];
    let mut failure = None;

    while active.load(Ordering::Acquire) {
        match source.read(&mut block) {
            Ok(0) => continue,
            Ok(count) => window.append(&block[..count]),
            Err(e) => {
                error!("Audio read failed, ending capture window: {}", e);
                status.record_read_failure(&e);
                failure = Some(e);
                break;
            }
        }
    }

    source.stop();
    debug!("Acquisition loop finished with {} samples", window.len());

    SessionOutcome {
        source,
        window,
        failure,
    }
}
