//! Reading Session
//!
//! Turns per-frame detector output into committed meter readings. Owns the
//! current position in the read-entry list, the pause state and the error
//! counter that escalates to manual entry.
//!
//! Not thread-safe: mutate from the processing thread only and publish a
//! `SessionSnapshot` for readers elsewhere.

pub mod debounce;
pub mod error;
pub mod events;
pub mod range;

pub use debounce::{DebouncePolicy, Debouncer};
pub use error::SessionError;
pub use events::{EventEmitter, SessionEvent, TimestampedEvent};
pub use range::{parse_reading, ReadingRange};

use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, trace, warn};

use crate::vision::DetectionResult;

/// Default number of bad frames tolerated before manual entry
pub const DEFAULT_ERROR_CEILING: u32 = 150;

/// A meter awaiting a reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadEntry {
    /// Meter serial number
    pub meter_id: u64,
    /// Apartment number
    pub apartment: u32,
    /// Previous recorded reading
    pub last_read: u64,
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Accepting detections
    Active,
    /// Ignoring detections while a dialog is open
    Paused,
    /// Paused after the error ceiling was crossed; needs a manual value
    AwaitingManualEntry,
}

/// Whether the live feed currently shows a confident reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionStatus {
    Searching,
    Detected,
}

/// Where an accepted reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadingSource {
    Detected,
    Manual,
}

/// A committed reading for one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedReading {
    pub value: u64,
    pub source: ReadingSource,
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bad frames tolerated; one more triggers `OutOfRange`
    pub error_ceiling: u32,
    /// Confirmation policy
    pub debounce: DebouncePolicy,
    /// Plausible readings for the current meter type, if known
    pub reading_range: Option<ReadingRange>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            error_ceiling: DEFAULT_ERROR_CEILING,
            debounce: DebouncePolicy::default(),
            reading_range: None,
        }
    }
}

/// Read-only copy of the session for other threads
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub place: usize,
    pub entry: Option<ReadEntry>,
    pub display_text: Option<String>,
    pub detection_status: DetectionStatus,
    pub error_count: u32,
    pub flash_on: bool,
    pub readings_recorded: usize,
}

/// Detection-to-reading state machine for one live feed activation
#[derive(Debug)]
pub struct ReadingSession {
    entries: Vec<ReadEntry>,
    place: usize,
    state: SessionState,
    resume_state: SessionState,
    error_count: u32,
    display_text: Option<String>,
    detected: bool,
    /// Digits of the last confirmation. Explicit navigation clears it.
    committed: Option<String>,
    flash_on: bool,
    readings: BTreeMap<usize, AcceptedReading>,
    debouncer: Debouncer,
    config: SessionConfig,
    events: EventEmitter,
}

impl ReadingSession {
    /// Create a session with default configuration
    pub fn new(entries: Vec<ReadEntry>) -> Self {
        Self::with_config(entries, SessionConfig::default())
    }

    /// Create a session with custom configuration
    pub fn with_config(entries: Vec<ReadEntry>, config: SessionConfig) -> Self {
        info!("Reading session started with {} entries", entries.len());
        Self {
            entries,
            place: 0,
            state: SessionState::Active,
            resume_state: SessionState::Active,
            error_count: 0,
            display_text: None,
            detected: false,
            committed: None,
            flash_on: false,
            readings: BTreeMap::new(),
            debouncer: Debouncer::new(config.debounce),
            config,
            events: EventEmitter::new(),
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&mut self) -> Receiver<TimestampedEvent> {
        self.events.subscribe()
    }

    /// Subscribe with a bounded queue that drops the oldest events when full
    pub fn subscribe_bounded(&mut self, capacity: usize) -> Receiver<TimestampedEvent> {
        self.events.subscribe_bounded(capacity)
    }

    /// Feed one detector result. Ignored unless the session is active.
    pub fn on_detection(&mut self, result: &DetectionResult) {
        if self.state != SessionState::Active {
            trace!("Detection ignored in {:?}", self.state);
            return;
        }

        let digits = match result.confident_digits() {
            Some(digits) if self.is_plausible(digits) => digits,
            Some(digits) => {
                trace!("Implausible reading {:?}", digits);
                self.record_error();
                return;
            }
            None => {
                self.record_error();
                return;
            }
        };

        if self.display_text.as_deref() != Some(digits) {
            let old_value = self.display_text.replace(digits.to_string());
            self.events.emit(SessionEvent::DisplayTextChanged {
                old_value,
                new_value: digits.to_string(),
            });
        }

        if !self.debouncer.observe(digits) || self.detected {
            return;
        }
        self.detected = true;

        if self.committed.as_deref() == Some(digits) {
            trace!("{} already committed, not confirming again", digits);
            return;
        }
        if self.reading_for(self.place).is_some_and(|r| r.source == ReadingSource::Manual) {
            debug!("Entry {} has a manual reading, {} not recorded", self.place, digits);
            self.committed = Some(digits.to_string());
            return;
        }

        self.error_count = 0;
        debug!("Detection confirmed: {} for entry {}", digits, self.place);
        self.events.emit(SessionEvent::DetectionConfirmed {
            place: self.place,
            digits: digits.to_string(),
        });
        self.enter_read();
    }

    fn is_plausible(&self, digits: &str) -> bool {
        match parse_reading(digits) {
            Some(value) => self.config.reading_range.map_or(true, |r| r.contains(value)),
            None => false,
        }
    }

    fn record_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
        self.detected = false;
        self.debouncer.reset();

        if self.error_count > self.config.error_ceiling {
            self.escalate();
        }
    }

    fn escalate(&mut self) {
        warn!(
            "Reading out of range for entry {} after {} bad frames, awaiting manual entry",
            self.place, self.error_count
        );
        self.resume_state = self.state;
        self.set_state(SessionState::AwaitingManualEntry);
        self.events.emit(SessionEvent::OutOfRange {
            place: self.place,
            entry: self.current_entry().cloned(),
            error_count: self.error_count,
            ceiling: self.config.error_ceiling,
        });
    }

    /// Commit the displayed text as the current entry's reading and advance
    pub fn enter_read(&mut self) -> Option<AcceptedReading> {
        let Some(value) = self.display_text.as_deref().and_then(parse_reading) else {
            warn!("No numeric reading displayed, nothing to enter");
            return None;
        };

        let reading = self.record_reading(value, ReadingSource::Detected)?;
        self.committed = self.display_text.clone();
        self.error_count = 0;
        self.move_to(self.place.saturating_add(1));
        Some(reading)
    }

    fn record_reading(&mut self, value: u64, source: ReadingSource) -> Option<AcceptedReading> {
        let Some(meter_id) = self.current_entry().map(|e| e.meter_id) else {
            warn!("No entry at index {}, reading {} dropped", self.place, value);
            return None;
        };

        let reading = AcceptedReading { value, source };
        self.readings.insert(self.place, reading);
        info!("Recorded {} for meter {} ({:?})", value, meter_id, source);
        self.events.emit(SessionEvent::ReadingRecorded {
            place: self.place,
            meter_id,
            value,
            source,
        });
        Some(reading)
    }

    /// Advance to the next entry, staying on the last one
    pub fn next_read(&mut self) {
        self.set_list_place(self.place.saturating_add(1));
    }

    /// Alias of `next_read` used after manual entry
    pub fn increment_list_place(&mut self) {
        self.next_read();
    }

    /// Jump to entry `place`, clamped to the list
    pub fn set_list_place(&mut self, place: usize) {
        if self.move_to(place) {
            self.committed = None;
            self.detected = false;
            self.debouncer.reset();
        }
    }

    fn move_to(&mut self, place: usize) -> bool {
        let clamped = place.min(self.entries.len().saturating_sub(1));
        if clamped == self.place {
            return false;
        }

        self.place = clamped;
        self.error_count = 0;
        debug!("Moved to entry {}", clamped);
        self.events.emit(SessionEvent::PlaceChanged {
            place: clamped,
            entry: self.current_entry().cloned(),
        });
        true
    }

    /// Record an operator-entered reading and leave manual entry
    pub fn set_read_manual(&mut self, value: &str) -> error::Result<AcceptedReading> {
        if self.state != SessionState::AwaitingManualEntry {
            return Err(SessionError::NotAwaitingManualEntry);
        }

        let value = parse_reading(value).ok_or_else(|| SessionError::InvalidManualValue(value.to_string()))?;
        let reading = self
            .record_reading(value, ReadingSource::Manual)
            .ok_or(SessionError::NoEntries)?;

        self.leave_manual_entry();
        Ok(reading)
    }

    /// `set_read_manual` followed by `increment_list_place` in one step
    pub fn set_read_manual_and_advance(&mut self, value: &str) -> error::Result<AcceptedReading> {
        let reading = self.set_read_manual(value)?;
        self.increment_list_place();
        Ok(reading)
    }

    /// Dismiss manual entry without a value
    pub fn cancel_manual_entry(&mut self) {
        if self.state == SessionState::AwaitingManualEntry {
            info!("Manual entry cancelled for entry {}", self.place);
            self.leave_manual_entry();
        }
    }

    fn leave_manual_entry(&mut self) {
        self.error_count = 0;
        self.detected = false;
        self.debouncer.reset();
        let resume = self.resume_state;
        self.set_state(resume);
    }

    /// Pause or resume detection processing (dialogs, selectors)
    pub fn set_paused(&mut self, paused: bool) {
        match (self.state, paused) {
            (SessionState::Active, true) => self.set_state(SessionState::Paused),
            (SessionState::Paused, false) => self.set_state(SessionState::Active),
            (SessionState::AwaitingManualEntry, _) => {
                debug!("Pause request ignored while awaiting manual entry");
            }
            _ => {}
        }
    }

    /// Clear the error counter
    pub fn reset_error(&mut self) {
        self.error_count = 0;
    }

    /// Flip the torch flag and return the new value
    pub fn toggle_flash(&mut self) -> bool {
        self.flash_on = !self.flash_on;
        self.events.emit(SessionEvent::FlashChanged { on: self.flash_on });
        self.flash_on
    }

    /// Change plausibility bounds, e.g. when the meter type changes
    pub fn set_reading_range(&mut self, range: Option<ReadingRange>) {
        self.config.reading_range = range;
    }

    fn set_state(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        debug!("Session state {:?} -> {:?}", from, to);
        self.events.emit(SessionEvent::StateChanged { from, to });
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True while paused for any reason, manual entry included
    pub fn is_paused(&self) -> bool {
        self.state != SessionState::Active
    }

    pub fn place(&self) -> usize {
        self.place
    }

    pub fn entries(&self) -> &[ReadEntry] {
        &self.entries
    }

    pub fn current_entry(&self) -> Option<&ReadEntry> {
        self.entries.get(self.place)
    }

    pub fn display_text(&self) -> Option<&str> {
        self.display_text.as_deref()
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn flash_on(&self) -> bool {
        self.flash_on
    }

    pub fn detection_status(&self) -> DetectionStatus {
        if self.detected {
            DetectionStatus::Detected
        } else {
            DetectionStatus::Searching
        }
    }

    /// Accepted readings keyed by entry index
    pub fn readings(&self) -> &BTreeMap<usize, AcceptedReading> {
        &self.readings
    }

    pub fn reading_for(&self, place: usize) -> Option<AcceptedReading> {
        self.readings.get(&place).copied()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Copy of the observable state
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            place: self.place,
            entry: self.current_entry().cloned(),
            display_text: self.display_text.clone(),
            detection_status: self.detection_status(),
            error_count: self.error_count,
            flash_on: self.flash_on,
            readings_recorded: self.readings.len(),
        }
    }
}
