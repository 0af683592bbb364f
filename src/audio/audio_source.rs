//! Audio source abstraction for microphone capture.

use thiserror::Error;

/// A single 16-bit PCM sample.
pub type Sample = i16;

/// Errors raised by an audio source.
///
/// `PermissionDenied` and `DeviceUnavailable` are fatal to starting a capture
/// session. `ReadFailure` only ends the session it happened in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),
    #[error("audio input device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("failed to read audio input: {0}")]
    ReadFailure(String),
}

impl CaptureError {
    /// Whether this error prevents a capture session from starting at all.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CaptureError::PermissionDenied(_) | CaptureError::DeviceUnavailable(_)
        )
    }
}

/// Trait for mono 16-bit audio capture sources.
///
/// The lifecycle is `open` → (`start` → `read`* → `stop`)* → `close`. A source
/// holds the physical device between `start` and `stop`, and must release it on
/// `stop`, `close` and drop.
pub trait AudioSource: Send {
    /// Acquire the device and negotiate the stream format.
    fn open(&mut self) -> Result<(), CaptureError>;

    /// Whether `open` has succeeded and `close` has not been called since.
    fn is_open(&self) -> bool;

    /// Begin data flow.
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Read up to `buffer.len()` samples into `buffer`.
    ///
    /// Blocks until samples are available or a short poll interval elapses, in
    /// which case it returns `Ok(0)` so the caller can check its stop signal.
    fn read(&mut self, buffer: &mut [Sample]) -> Result<usize, CaptureError>;

    /// Halt data flow and release the stream.
    fn stop(&mut self);

    /// Release the device entirely.
    fn close(&mut self);

    /// Number of samples the caller should size its read buffer to.
    fn block_size(&self) -> usize;

    /// The sample rate of captured audio.
    fn sample_rate(&self) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        assert!(CaptureError::PermissionDenied("denied".into()).is_fatal());
        assert!(CaptureError::DeviceUnavailable("gone".into()).is_fatal());
        assert!(!CaptureError::ReadFailure("overrun".into()).is_fatal());
    }

    #[test]
    fn test_error_messages_are_distinguishable() {
        let denied = CaptureError::PermissionDenied("no access".into()).to_string();
        let missing = CaptureError::DeviceUnavailable("no device".into()).to_string();
        assert!(denied.contains("permission denied"));
        assert!(missing.contains("unavailable"));
    }
}
