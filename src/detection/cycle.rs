//! Repeating detection cadence.
//!
//! `start → wait window → stop → wait pause`, until cancelled. Every wait races
//! the cancellation token, and a window in flight is always stopped before the
//! task exits so the microphone is never left open.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use crate::audio::{CaptureController, CaptureError, StopOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTiming {
    pub window: Duration,
    pub pause: Duration,
}

impl Default for CycleTiming {
    fn default() -> Self {
        Self::from_millis(5000, 1000)
    }
}

impl CycleTiming {
    pub fn from_millis(window_ms: u64, pause_ms: u64) -> Self {
        Self {
            window: Duration::from_millis(window_ms),
            pause: Duration::from_millis(pause_ms),
        }
    }
}

/// Handle to a running detection cycle. Dropping it cancels the cycle.
pub struct DetectionCycle {
    cancel: CancellationToken,
    task: JoinHandle<CaptureController>,
    _cancel_on_drop: DropGuard,
}

impl DetectionCycle {
    /// Start the first capture window, then keep cycling in the background.
    ///
    /// The first start runs here so that a missing permission or device is
    /// reported to the caller. Later failures are logged and retried after the
    /// pause.
    pub async fn start(
        mut controller: CaptureController,
        timing: CycleTiming,
    ) -> Result<Self, CaptureError> {
        controller.start().await?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_cycle(controller, timing, cancel.clone()));

        info!(
            "Detection cycle running ({}ms window, {}ms pause)",
            timing.window.as_millis(),
            timing.pause.as_millis()
        );
        Ok(Self {
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
            task,
        })
    }

    /// Request cancellation. Takes effect at the next wait boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the cycle, wait for it to wind down and hand back the controller
    /// with its device closed.
    pub async fn stop(self) -> Result<CaptureController> {
        self.cancel.cancel();
        let controller = self.task.await.context("Detection cycle task failed")?;
        info!("Detection cycle stopped");
        Ok(controller)
    }
}

async fn run_cycle(
    mut controller: CaptureController,
    timing: CycleTiming,
    cancel: CancellationToken,
) -> CaptureController {
    let mut capturing = true;
    let mut iteration: u64 = 1;

    loop {
        if !capturing {
            if cancel.is_cancelled() {
                break;
            }
            iteration += 1;
            capturing = match controller.start().await {
                Ok(()) => true,
                Err(e) if controller.is_source_lost() => {
                    error!(
                        "Detection iteration {}: audio source lost, ending detection cycle: {}",
                        iteration, e
                    );
                    break;
                }
                Err(e) => {
                    error!("Detection iteration {} could not start capture: {}", iteration, e);
                    false
                }
            };
        }

        if capturing {
            let cancelled = sleep_or_cancel(timing.window, &cancel).await;
            finish_window(&mut controller, iteration).await;
            capturing = false;
            if cancelled {
                break;
            }
        }

        if sleep_or_cancel(timing.pause, &cancel).await {
            break;
        }
    }

    controller.close().await;
    debug!("Detection cycle exited after {} iterations", iteration);
    controller
}

async fn finish_window(controller: &mut CaptureController, iteration: u64) {
    match controller.stop().await {
        StopOutcome::Finalizing(_) => debug!("Detection iteration {} window captured", iteration),
        StopOutcome::Failed(e) => warn!("Detection iteration {} window failed: {}", iteration, e),
        StopOutcome::NotCapturing => {}
    }
}

/// Sleep for `duration`. Returns `true` if cancelled first.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::scripted_source::{wait_until, ScriptStep, ScriptedSource};
    use crate::detection::ResultChannel;
    use std::time::Instant;

    fn controller_with(source: ScriptedSource) -> CaptureController {
        CaptureController::new(Box::new(source), ResultChannel::new())
    }

    #[test]
    fn test_default_timing() {
        let timing = CycleTiming::default();
        assert_eq!(timing.window, Duration::from_millis(5000));
        assert_eq!(timing.pause, Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_cycle_repeats_windows() {
        let source = ScriptedSource::new(Vec::new());
        let counters = source.counters();

        let cycle = DetectionCycle::start(controller_with(source), CycleTiming::from_millis(30, 10))
            .await
            .unwrap();
        wait_until(|| counters.starts() >= 3).await;
        cycle.stop().await.unwrap();

        assert_eq!(counters.opens(), 1);
        assert_eq!(counters.stops(), counters.starts());
        assert_eq!(counters.closes(), 1);
    }

    #[tokio::test]
    async fn test_cancel_mid_window_stops_once() {
        let source = ScriptedSource::new(Vec::new());
        let counters = source.counters();
        let began = Instant::now();

        let cycle = DetectionCycle::start(controller_with(source), CycleTiming::default())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let controller = cycle.stop().await.unwrap();

        assert!(began.elapsed() < Duration::from_secs(2));
        assert!(!controller.is_capturing());
        assert_eq!(counters.starts(), 1);
        assert_eq!(counters.stops(), 1);
        assert_eq!(counters.closes(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counters.starts(), 1);
    }

    #[tokio::test]
    async fn test_dropping_handle_cancels_cycle() {
        let source = ScriptedSource::new(Vec::new());
        let counters = source.counters();

        let cycle = DetectionCycle::start(controller_with(source), CycleTiming::default())
            .await
            .unwrap();
        drop(cycle);

        wait_until(|| counters.closes() == 1).await;
        assert_eq!(counters.starts(), 1);
        assert_eq!(counters.stops(), 1);
    }

    #[tokio::test]
    async fn test_read_failure_does_not_end_cycle() {
        let source = ScriptedSource::new(vec![
            ScriptStep::Block(vec![1, 2, 3]),
            ScriptStep::Block(vec![4, 5, 6]),
            ScriptStep::Fail("simulated read error".to_string()),
        ]);
        let counters = source.counters();
        let controller = controller_with(source);
        let results = controller.results();

        let cycle = DetectionCycle::start(controller, CycleTiming::from_millis(60, 20))
            .await
            .unwrap();
        wait_until(|| counters.starts() >= 2).await;
        assert!(!cycle.is_finished());
        cycle.stop().await.unwrap();

        assert_eq!(counters.opens(), 1);
        assert!(!results.history().contains(&6.0));
        assert!(results.history().iter().all(|value| *value == 0.0));
    }

    #[tokio::test]
    async fn test_lost_source_ends_cycle() {
        let source = ScriptedSource::new(vec![ScriptStep::Panic]);
        let counters = source.counters();

        let cycle = DetectionCycle::start(controller_with(source), CycleTiming::from_millis(20, 10))
            .await
            .unwrap();
        wait_until(|| cycle.is_finished()).await;

        let controller = cycle.stop().await.unwrap();
        assert!(controller.is_source_lost());
        assert_eq!(counters.starts(), 1);
    }

    #[tokio::test]
    async fn test_first_start_failure_is_reported() {
        let source = ScriptedSource::failing_open(CaptureError::DeviceUnavailable(
            "no default input device".to_string(),
        ));

        let result = DetectionCycle::start(controller_with(source), CycleTiming::default()).await;
        assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_results_reach_subscribers() {
        let source = ScriptedSource::new(vec![
            ScriptStep::Block(vec![100, 200, 300, 400, 500]),
            ScriptStep::Block(vec![600, 700, 800, 900, 1000]),
        ]);
        let controller = controller_with(source);
        let mut subscriber = controller.results().subscribe();
        assert!(subscriber.snapshot().is_empty());

        let cycle = DetectionCycle::start(controller, CycleTiming::from_millis(100, 20))
            .await
            .unwrap();
        let history = tokio::time::timeout(Duration::from_secs(2), subscriber.changed())
            .await
            .unwrap();
        cycle.stop().await.unwrap();

        assert_eq!(history.unwrap()[0], 1000.0);
    }
}
