//! Microphone audio capture via cpal.
//!
//! The cpal stream is not `Send`, so it lives on a dedicated stream thread for
//! the duration of a capture window. Blocks flow to the reader over a bounded
//! channel; dropping the stream releases the microphone. Blocks that do not fit
//! in the channel are counted and reported when the stream stops, and a stream
//! error is held until the reader picks it up.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample as _, SampleFormat, SupportedBufferSize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::audio_source::{AudioSource, CaptureError, Sample};

/// How long a read waits for data before handing control back to the caller.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Blocks buffered between the audio callback and the reader.
const BLOCK_QUEUE_DEPTH: usize = 64;

/// Description of an input device, for listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub name: String,
    pub is_default: bool,
}

/// Producer half handed to the cpal callbacks.
#[derive(Clone)]
struct BlockSink {
    tx: SyncSender<Vec<Sample>>,
    dropped: Arc<AtomicUsize>,
    fault: Arc<Mutex<Option<String>>>,
}

impl BlockSink {
    fn push(&self, block: Vec<Sample>) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(block) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a stream error. The first one wins.
    fn fail(&self, message: String) {
        if let Ok(mut fault) = self.fault.lock() {
            fault.get_or_insert(message);
        }
    }
}

/// Consumer half owned by the reader.
struct BlockQueue {
    blocks: Receiver<Vec<Sample>>,
    dropped: Arc<AtomicUsize>,
    fault: Arc<Mutex<Option<String>>>,
}

impl BlockQueue {
    fn take_fault(&self) -> Option<String> {
        self.fault.lock().ok().and_then(|mut fault| fault.take())
    }

    fn take_dropped(&self) -> usize {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}

fn block_channel(depth: usize) -> (BlockSink, BlockQueue) {
    let (tx, blocks) = mpsc::sync_channel(depth);
    let dropped = Arc::new(AtomicUsize::new(0));
    let fault = Arc::new(Mutex::new(None));
    (
        BlockSink {
            tx,
            dropped: Arc::clone(&dropped),
            fault: Arc::clone(&fault),
        },
        BlockQueue {
            blocks,
            dropped,
            fault,
        },
    )
}

struct OpenedDevice {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: SampleFormat,
    block_size: usize,
}

struct StreamThread {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
    queue: BlockQueue,
}

pub struct MicAudioSource {
    sample_rate: u32,
    device_name: Option<String>,
    opened: Option<OpenedDevice>,
    stream: Option<StreamThread>,
    pending: VecDeque<Sample>,
}

impl MicAudioSource {
    /// Create a mic source for the default input device. Nothing is acquired
    /// until [`AudioSource::open`].
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            device_name: None,
            opened: None,
            stream: None,
            pending: VecDeque::new(),
        }
    }

    /// Capture from the input device with this name instead of the default.
    pub fn with_device(mut self, device_name: Option<String>) -> Self {
        self.device_name = device_name.filter(|name| !name.trim().is_empty());
        self
    }

    /// Enumerate input devices of the default host.
    pub fn list_devices() -> anyhow::Result<Vec<InputDevice>> {
        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());

        let devices = host
            .input_devices()?
            .filter_map(|device| device.name().ok())
            .map(|name| InputDevice {
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
            })
            .collect();

        Ok(devices)
    }

    fn find_device(&self, host: &cpal::Host) -> Result<cpal::Device, CaptureError> {
        match &self.device_name {
            Some(wanted) => host
                .input_devices()
                .map_err(|e| classify_backend_error(&e.to_string()))?
                .find(|device| device.name().map(|n| n == *wanted).unwrap_or(false))
                .ok_or_else(|| {
                    CaptureError::DeviceUnavailable(format!("input device not found: {wanted}"))
                }),
            None => host.default_input_device().ok_or_else(|| {
                CaptureError::DeviceUnavailable("no default input device".to_string())
            }),
        }
    }
}

impl AudioSource for MicAudioSource {
    fn open(&mut self) -> Result<(), CaptureError> {
        if self.opened.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = self.find_device(&host)?;
        let range = select_input_config(&device, self.sample_rate)?;

        let block_size = min_block_size(range.buffer_size(), self.sample_rate);
        let sample_format = range.sample_format();
        let supported = range.with_sample_rate(cpal::SampleRate(self.sample_rate));
        let config = cpal::StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        info!(
            "Mic source using device: {} ({} Hz, {} ch, {:?}, {} sample blocks)",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            self.sample_rate,
            config.channels,
            sample_format,
            block_size
        );

        self.opened = Some(OpenedDevice {
            device,
            config,
            sample_format,
            block_size,
        });
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.opened.is_some()
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let opened = self.opened.as_ref().ok_or_else(|| {
            CaptureError::DeviceUnavailable("mic source started before open".to_string())
        })?;

        let (sink, queue) = block_channel(BLOCK_QUEUE_DEPTH);
        let (stop_tx, stop_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let device = opened.device.clone();
        let config = opened.config.clone();
        let sample_format = opened.sample_format;

        let handle = thread::Builder::new()
            .name("mic-stream".to_string())
            .spawn(move || {
                run_stream_thread(device, config, sample_format, sink, stop_rx, ready_tx)
            })
            .map_err(|e| CaptureError::DeviceUnavailable(format!("stream thread: {e}")))?;

        let ready = ready_rx.recv().unwrap_or_else(|_| {
            Err(CaptureError::DeviceUnavailable(
                "stream thread exited before starting".to_string(),
            ))
        });
        if let Err(e) = ready {
            let _ = handle.join();
            return Err(e);
        }

        self.pending.clear();
        self.stream = Some(StreamThread {
            stop_tx,
            handle,
            queue,
        });
        info!("Mic recording started");
        Ok(())
    }

    fn read(&mut self, buffer: &mut [Sample]) -> Result<usize, CaptureError> {
        if self.pending.is_empty() {
            let stream = self.stream.as_ref().ok_or_else(|| {
                CaptureError::ReadFailure("mic stream is not running".to_string())
            })?;

            if let Some(message) = stream.queue.take_fault() {
                return Err(CaptureError::ReadFailure(message));
            }

            match stream.queue.blocks.recv_timeout(READ_POLL_INTERVAL) {
                Ok(block) => self.pending.extend(block),
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CaptureError::ReadFailure(
                        "mic stream closed unexpectedly".to_string(),
                    ))
                }
            }
        }

        let count = buffer.len().min(self.pending.len());
        for (slot, sample) in buffer.iter_mut().zip(self.pending.drain(..count)) {
            *slot = sample;
        }
        Ok(count)
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!("Stopping mic stream");
            let _ = stream.stop_tx.send(());
            if stream.handle.join().is_err() {
                warn!("Mic stream thread panicked");
            }
            let dropped = stream.queue.take_dropped();
            if dropped > 0 {
                warn!(
                    "Mic stream dropped {} blocks because the reader fell behind",
                    dropped
                );
            }
            info!("Mic recording stopped");
        }
        self.pending.clear();
    }

    fn close(&mut self) {
        self.stop();
        if self.opened.take().is_some() {
            info!("Mic device released");
        }
    }

    fn block_size(&self) -> usize {
        self.opened
            .as_ref()
            .map(|opened| opened.block_size)
            .unwrap_or_else(|| fallback_block_size(self.sample_rate))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for MicAudioSource {
    fn drop(&mut self) {
        if self.stream.is_some() || self.opened.is_some() {
            debug!("Dropping open MicAudioSource, cleaning up");
            self.close();
        }
    }
}

fn run_stream_thread(
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: SampleFormat,
    sink: BlockSink,
    stop_rx: Receiver<()>,
    ready_tx: Sender<Result<(), CaptureError>>,
) {
    let stream = match build_stream(&device, &config, sample_format, sink) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(classify_backend_error(&e.to_string())));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    // Park until stop is requested or the owner goes away.
    let _ = stop_rx.recv();
    drop(stream);
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: SampleFormat,
    sink: BlockSink,
) -> Result<cpal::Stream, CaptureError> {
    let channels = usize::from(config.channels);
    let err_sink = sink.clone();
    let err_fn = move |err: cpal::StreamError| {
        error!("Mic stream error: {}", err);
        err_sink.fail(err.to_string());
    };

    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                sink.push(downmix(data, channels, |s| s));
            },
            err_fn,
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                sink.push(downmix(data, channels, |s| s.to_sample::<i16>()));
            },
            err_fn,
            None,
        ),
        other => {
            return Err(CaptureError::DeviceUnavailable(format!(
                "unsupported sample format: {other:?}"
            )))
        }
    };

    stream.map_err(|e| classify_backend_error(&e.to_string()))
}

/// Pick an input config that covers `sample_rate`, preferring 16-bit then
/// float samples and the fewest channels.
fn select_input_config(
    device: &cpal::Device,
    sample_rate: u32,
) -> Result<cpal::SupportedStreamConfigRange, CaptureError> {
    let ranges = device
        .supported_input_configs()
        .map_err(|e| classify_backend_error(&e.to_string()))?;

    ranges
        .filter(|range| {
            range.min_sample_rate().0 <= sample_rate && range.max_sample_rate().0 >= sample_rate
        })
        .filter_map(|range| format_rank(range.sample_format()).map(|rank| (rank, range)))
        .min_by_key(|(rank, range)| (*rank, range.channels()))
        .map(|(_, range)| range)
        .ok_or_else(|| {
            CaptureError::DeviceUnavailable(format!(
                "input device cannot capture {sample_rate} Hz 16-bit audio"
            ))
        })
}

fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::I16 => Some(0),
        SampleFormat::F32 => Some(1),
        _ => None,
    }
}

/// Read block size: the platform's minimum buffer, never below 10 ms of audio.
fn min_block_size(buffer_size: &SupportedBufferSize, sample_rate: u32) -> usize {
    let fallback = fallback_block_size(sample_rate);
    match buffer_size {
        SupportedBufferSize::Range { min, .. } => (*min as usize).max(fallback),
        SupportedBufferSize::Unknown => fallback,
    }
}

fn fallback_block_size(sample_rate: u32) -> usize {
    (sample_rate as usize / 100).max(1)
}

/// Average interleaved frames down to mono.
fn downmix<T: Copy>(data: &[T], channels: usize, convert: impl Fn(T) -> Sample) -> Vec<Sample> {
    if channels <= 1 {
        return data.iter().map(|&s| convert(s)).collect();
    }

    data.chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| i32::from(convert(s))).sum();
            (sum / frame.len() as i32) as Sample
        })
        .collect()
}

/// cpal has no dedicated permission error; backends report it in the message.
fn classify_backend_error(description: &str) -> CaptureError {
    let lower = description.to_lowercase();
    let denied = ["permission", "denied", "not authorized", "unauthorized"]
        .iter()
        .any(|needle| lower.contains(needle));

    if denied {
        CaptureError::PermissionDenied(description.to_string())
    } else {
        CaptureError::DeviceUnavailable(description.to_string())
    }
}
