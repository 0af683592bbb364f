//! Scripted audio source used by the controller and cycle tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::audio_source::{AudioSource, CaptureError, Sample};

const IDLE_READ: Duration = Duration::from_millis(2);

pub enum ScriptStep {
    /// Serve this block on the next read.
    Block(Vec<Sample>),
    /// Fail the next read.
    Fail(String),
    /// Serve nothing until the source is started again.
    Pause,
    /// Panic inside the next read.
    Panic,
}

#[derive(Default)]
pub struct SourceCounters {
    opens: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
    closes: AtomicUsize,
    blocks_served: AtomicUsize,
}

impl SourceCounters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn blocks_served(&self) -> usize {
        self.blocks_served.load(Ordering::SeqCst)
    }
}

pub struct ScriptedSource {
    script: VecDeque<ScriptStep>,
    counters: Arc<SourceCounters>,
    open_error: Option<CaptureError>,
    open: bool,
    block_size: usize,
}

impl ScriptedSource {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            script: steps.into(),
            counters: Arc::new(SourceCounters::default()),
            open_error: None,
            open: false,
            block_size: 16,
        }
    }

    pub fn failing_open(error: CaptureError) -> Self {
        Self {
            open_error: Some(error),
            ..Self::new(Vec::new())
        }
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn counters(&self) -> Arc<SourceCounters> {
        Arc::clone(&self.counters)
    }
}

impl AudioSource for ScriptedSource {
    fn open(&mut self) -> Result<(), CaptureError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        if matches!(self.script.front(), Some(ScriptStep::Pause)) {
            self.script.pop_front();
        }
        Ok(())
    }

    fn read(&mut self, buffer: &mut [Sample]) -> Result<usize, CaptureError> {
        match self.script.pop_front() {
            Some(ScriptStep::Block(block)) => {
                let count = block.len().min(buffer.len());
                buffer[..count].copy_from_slice(&block[..count]);
                self.counters.blocks_served.fetch_add(1, Ordering::SeqCst);
                Ok(count)
            }
            Some(ScriptStep::Fail(message)) => Err(CaptureError::ReadFailure(message)),
            Some(ScriptStep::Panic) => panic!("scripted read panic"),
            Some(ScriptStep::Pause) => {
                self.script.push_front(ScriptStep::Pause);
                std::thread::sleep(IDLE_READ);
                Ok(0)
            }
            None => {
                std::thread::sleep(IDLE_READ);
                Ok(0)
            }
        }
    }

    fn stop(&mut self) {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&mut self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.open = false;
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn sample_rate(&self) -> u32 {
        48_000
    }
}

/// Poll `condition` until it holds, panicking after two seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
