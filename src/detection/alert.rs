//! Threshold alerting on published loudness values.

use serde::{Deserialize, Serialize};

use crate::audio::LoudnessValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Quiet,
    Loud,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Quiet => "quiet",
            AlertLevel::Loud => "loud",
        }
    }
}

/// Tracks whether the latest window was above the alert threshold.
#[derive(Debug, Clone)]
pub struct LoudnessAlert {
    threshold: LoudnessValue,
    level: AlertLevel,
}

impl LoudnessAlert {
    pub fn new(threshold: LoudnessValue) -> Self {
        Self {
            threshold,
            level: AlertLevel::Quiet,
        }
    }

    pub fn threshold(&self) -> LoudnessValue {
        self.threshold
    }

    pub fn level(&self) -> AlertLevel {
        self.level
    }

    /// Feed the latest value. Returns the new level only when it changed.
    pub fn observe(&mut self, value: LoudnessValue) -> Option<AlertLevel> {
        let level = if value > self.threshold {
            AlertLevel::Loud
        } else {
            AlertLevel::Quiet
        };

        if level == self.level {
            return None;
        }
        self.level = level;
        Some(level)
    }
}
