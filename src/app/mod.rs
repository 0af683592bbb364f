use crate::audio::{CaptureController, CaptureError, MicAudioSource};
use crate::cli::RunCliArgs;
use crate::config::Config;
use crate::detection::{AlertLevel, DetectionCycle, LoudnessAlert, ResultChannel, ResultSubscriber};
use anyhow::{Context, Result};
use tracing::{info, warn};

pub async fn run_service(args: RunCliArgs) -> Result<()> {
    info!("Starting sounddetect");

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    args.apply(&mut config);
    config.validate()?;
    info!("Config: {:?}", config);

    let results = ResultChannel::new();
    let source = MicAudioSource::new(config.capture.sample_rate)
        .with_device(config.capture.device.clone());
    let controller = CaptureController::new(Box::new(source), results.clone())
        .with_top_fraction(config.capture.top_fraction);
    let status = controller.status();

    let observer = tokio::spawn(observe_results(
        results.subscribe(),
        LoudnessAlert::new(config.alert.threshold),
    ));

    let cycle = DetectionCycle::start(controller, config.capture.timing())
        .await
        .map_err(startup_error)?;

    info!("sounddetect is listening. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    info!("Stop signal received, shutting down");
    cycle.stop().await?;
    observer.abort();

    let status = status.get().await;
    info!(
        "Detection stopped after {} windows ({} results)",
        status.windows_completed,
        results.history().len()
    );
    Ok(())
}

async fn observe_results(mut subscriber: ResultSubscriber, mut alert: LoudnessAlert) {
    while let Some(history) = subscriber.changed().await {
        let Some(&latest) = history.last() else {
            continue;
        };
        info!("Window {}: loudness {:.1}", history.len(), latest);

        match alert.observe(latest) {
            Some(AlertLevel::Loud) => warn!(
                "Loud sound detected: {:.1} is above threshold {:.1}",
                latest,
                alert.threshold()
            ),
            Some(AlertLevel::Quiet) => {
                info!("Sound level back under threshold {:.1}", alert.threshold())
            }
            None => {}
        }
    }
}

fn startup_error(err: CaptureError) -> anyhow::Error {
    let hint = match &err {
        CaptureError::PermissionDenied(_) => {
            "Microphone access was refused; grant recording permission and try again"
        }
        CaptureError::DeviceUnavailable(_) => {
            "No usable input device (see `sounddetect devices`)"
        }
        CaptureError::ReadFailure(_) => "Audio capture failed while starting",
    };
    anyhow::Error::new(err).context(hint)
}
