//! Gas meter reader core
//!
//! Normalizes live camera frames for an external meter-digit detector and
//! turns its per-frame output into confirmed readings.

pub mod capture;
pub mod config;
pub mod pipeline;
pub mod session;
pub mod storage;
pub mod vision;

pub use capture::{LatestFrameSlot, RawFrame};
pub use config::AppConfig;
pub use pipeline::{LiveFeed, SessionCommand};
pub use session::{ReadEntry, ReadingSession, SessionEvent, SessionState};
pub use vision::{BoundingBox, DetectionResult, Detector, NormalizedImage};
