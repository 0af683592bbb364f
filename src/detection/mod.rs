//! Detection cadence and result fan-out.
//!
//! A [`DetectionCycle`] drives a capture controller on a fixed window/pause
//! rhythm. Each finished window lands in the [`ResultChannel`], where observers
//! such as [`LoudnessAlert`] pick it up.

pub mod alert;
pub mod cycle;
pub mod results;

pub use alert::{AlertLevel, LoudnessAlert};
pub use cycle::{CycleTiming, DetectionCycle};
pub use results::{ResultChannel, ResultHistory, ResultSubscriber};
