//! Confirmation policy for live detections

use serde::{Deserialize, Serialize};

/// How many identical consecutive frames make a detection confident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebouncePolicy {
    /// Consecutive identical valid frames required (values below 1 act as 1)
    pub required_frames: u32,
}

impl Default for DebouncePolicy {
    fn default() -> Self {
        Self { required_frames: 1 }
    }
}

/// Tracks the current streak of identical digit strings
#[derive(Debug, Clone, Default)]
pub struct Debouncer {
    policy: DebouncePolicy,
    candidate: Option<String>,
    streak: u32,
}

impl Debouncer {
    pub fn new(policy: DebouncePolicy) -> Self {
        Self {
            policy,
            candidate: None,
            streak: 0,
        }
    }

    /// Feed one valid frame; returns whether the streak is long enough
    pub fn observe(&mut self, digits: &str) -> bool {
        if self.candidate.as_deref() == Some(digits) {
            self.streak = self.streak.saturating_add(1);
        } else {
            self.candidate = Some(digits.to_string());
            self.streak = 1;
        }
        self.streak >= self.policy.required_frames.max(1)
    }

    /// Break the streak (invalid frame or manual override)
    pub fn reset(&mut self) {
        self.candidate = None;
        self.streak = 0;
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn policy(&self) -> DebouncePolicy {
        self.policy
    }
}
