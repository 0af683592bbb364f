//! Accumulates the samples of one capture window.

use super::audio_source::Sample;

/// Growing, chronologically ordered sample store for a single capture window.
///
/// Single writer (the acquisition loop) and one reader at a time; it is moved
/// between the two rather than shared.
#[derive(Debug, Default, Clone)]
pub struct CaptureBuffer {
    samples: Vec<Sample>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every accumulated sample. Called at window start.
    pub fn reset(&mut self) {
        self.samples.clear();
    }

    pub fn append(&mut self, block: &[Sample]) {
        self.samples.extend_from_slice(block);
    }

    /// Copy of the current contents; later appends do not affect it.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.clone()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
