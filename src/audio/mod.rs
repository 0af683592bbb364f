pub mod audio_source;
pub mod capture_buffer;
pub mod capture_controller;
pub mod loudness;
pub mod mic_source;

#[cfg(test)]
pub(crate) mod scripted_source;

pub use audio_source::{AudioSource, CaptureError, Sample};
pub use capture_buffer::CaptureBuffer;
pub use capture_controller::{
    CaptureController, CapturePhase, CaptureStatus, CaptureStatusHandle, StopOutcome,
};
pub use loudness::{estimate, estimate_top_fraction, LoudnessValue, DEFAULT_TOP_FRACTION};
pub use mic_source::{InputDevice, MicAudioSource};
