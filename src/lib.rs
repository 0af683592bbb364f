//! Windowed microphone loudness detection.
//!
//! Audio is captured in fixed windows, each window is reduced to the mean of
//! its loudest 10% of samples, and the results are broadcast to observers.

pub mod app;
pub mod audio;
pub mod cli;
pub mod config;
pub mod detection;
pub mod global;
