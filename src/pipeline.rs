//! Live Feed Coordinator
//!
//! Runs normalization, detection and the reading session on one dedicated
//! processing thread. The UI thread submits frames and commands and reads a
//! published snapshot; it never touches the session directly.

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::capture::{LatestFrameSlot, RawFrame};
use crate::config::AppConfig;
use crate::session::{
    AcceptedReading, ReadEntry, ReadingRange, ReadingSession, SessionError, SessionSnapshot,
    TimestampedEvent,
};
use crate::vision::{BoundingBox, DetectionResult, Detector, NormalizerConfig};

/// Commands sent from the UI thread to the processing thread
#[derive(Debug)]
pub enum SessionCommand {
    SetPaused(bool),
    SetListPlace(usize),
    NextRead,
    IncrementListPlace,
    ResetError,
    ToggleFlash,
    /// Manual reading for the current entry; `advance` moves on in the same step
    SetReadManual {
        value: String,
        advance: bool,
        reply: Sender<Result<AcceptedReading, SessionError>>,
    },
    CancelManualEntry,
    SetReadingRange(Option<ReadingRange>),
    Shutdown,
}

/// State shared between the processing thread and its handle
#[derive(Debug)]
struct Shared {
    snapshot: RwLock<SessionSnapshot>,
    /// Last confident detection box, original-frame space
    last_box: RwLock<Option<BoundingBox>>,
    paused: AtomicBool,
    frames_processed: AtomicU64,
}

/// Handle to a running live feed
pub struct LiveFeed {
    frames: Arc<LatestFrameSlot>,
    commands: Sender<SessionCommand>,
    events: Receiver<TimestampedEvent>,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl LiveFeed {
    /// Start the processing thread for one live feed activation
    pub fn start<D>(config: &AppConfig, entries: Vec<ReadEntry>, detector: D) -> Result<Self>
    where
        D: Detector + 'static,
    {
        let mut session = ReadingSession::with_config(entries, config.session_config());
        let events = session.subscribe_bounded(config.pipeline.event_capacity);

        let shared = Arc::new(Shared {
            snapshot: RwLock::new(session.snapshot()),
            last_box: RwLock::new(None),
            paused: AtomicBool::new(session.is_paused()),
            frames_processed: AtomicU64::new(0),
        });
        let frames = Arc::new(LatestFrameSlot::new());
        let (commands, command_rx) = unbounded();

        let worker = Worker {
            session,
            detector,
            normalizer: config.normalizer_config(),
            frames: frames.clone(),
            commands: command_rx,
            shared: shared.clone(),
            frame_wait: config.pipeline.frame_wait(),
        };

        let handle = std::thread::Builder::new()
            .name("live-feed".to_string())
            .spawn(move || worker.run())
            .context("Failed to spawn processing thread")?;

        info!("Live feed started");

        Ok(Self {
            frames,
            commands,
            events,
            shared,
            handle: Some(handle),
        })
    }

    /// Offer a camera frame. Returns `false` if it was dropped.
    ///
    /// Frames are dropped up front while the session is paused.
    pub fn submit_frame(&self, frame: RawFrame) -> bool {
        if self.shared.paused.load(Ordering::Acquire) {
            return false;
        }
        self.frames.push(frame)
    }

    /// Session events, in emission order.
    ///
    /// Holds up to `pipeline.event_capacity` events; beyond that the oldest
    /// undrained events are discarded.
    pub fn events(&self) -> &Receiver<TimestampedEvent> {
        &self.events
    }

    /// Latest published session state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot.read().clone()
    }

    /// Box of the last confident detection, in camera-frame coordinates
    pub fn last_detection_box(&self) -> Option<BoundingBox> {
        *self.shared.last_box.read()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    pub fn frames_processed(&self) -> u64 {
        self.shared.frames_processed.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames.dropped_frames()
    }

    pub fn set_paused(&self, paused: bool) {
        self.send(SessionCommand::SetPaused(paused));
    }

    pub fn set_list_place(&self, place: usize) {
        self.send(SessionCommand::SetListPlace(place));
    }

    pub fn next_read(&self) {
        self.send(SessionCommand::NextRead);
    }

    pub fn increment_list_place(&self) {
        self.send(SessionCommand::IncrementListPlace);
    }

    pub fn reset_error(&self) {
        self.send(SessionCommand::ResetError);
    }

    pub fn toggle_flash(&self) {
        self.send(SessionCommand::ToggleFlash);
    }

    pub fn cancel_manual_entry(&self) {
        self.send(SessionCommand::CancelManualEntry);
    }

    pub fn set_reading_range(&self, range: Option<ReadingRange>) {
        self.send(SessionCommand::SetReadingRange(range));
    }

    /// Submit a manual reading and wait for the session's answer
    pub fn set_read_manual(&self, value: &str) -> Result<AcceptedReading> {
        self.submit_manual(value, false)
    }

    /// Submit a manual reading and move to the next entry before any further
    /// frame is processed
    pub fn set_read_manual_and_advance(&self, value: &str) -> Result<AcceptedReading> {
        self.submit_manual(value, true)
    }

    fn submit_manual(&self, value: &str, advance: bool) -> Result<AcceptedReading> {
        let (reply, answer) = bounded(1);
        self.commands
            .send(SessionCommand::SetReadManual {
                value: value.to_string(),
                advance,
                reply,
            })
            .context("Processing thread is not running")?;

        let reading = answer
            .recv()
            .context("Processing thread exited before answering")??;
        Ok(reading)
    }

    fn send(&self, command: SessionCommand) {
        if self.commands.send(command).is_err() {
            warn!("Processing thread is not running, command dropped");
        }
    }

    /// Check if the processing thread is alive
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop the processing thread and release pending frames
    pub fn stop(&mut self) {
        let _ = self.commands.send(SessionCommand::Shutdown);
        self.frames.close();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Processing thread panicked");
            }
            info!(
                "Live feed stopped: {} frames processed, {} dropped",
                self.frames_processed(),
                self.frames_dropped()
            );
        }
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker<D> {
    session: ReadingSession,
    detector: D,
    normalizer: NormalizerConfig,
    frames: Arc<LatestFrameSlot>,
    commands: Receiver<SessionCommand>,
    shared: Arc<Shared>,
    frame_wait: Duration,
}

impl<D: Detector> Worker<D> {
    fn run(mut self) {
        debug!("Processing thread starting");

        loop {
            if !self.drain_commands() {
                break;
            }

            match self.frames.take_timeout(self.frame_wait) {
                Some(frame) if self.session.is_paused() => drop(frame),
                Some(frame) => self.process(frame),
                None if self.frames.is_closed() => break,
                None => {}
            }

            self.publish();
        }

        debug!("Processing thread exiting");
    }

    /// Apply queued commands. Returns `false` once the feed should stop.
    fn drain_commands(&mut self) -> bool {
        let mut applied = false;
        loop {
            match self.commands.try_recv() {
                Ok(SessionCommand::Shutdown) | Err(TryRecvError::Disconnected) => return false,
                Ok(command) => {
                    self.apply(command);
                    applied = true;
                }
                Err(TryRecvError::Empty) => break,
            }
        }
        if applied {
            self.publish();
        }
        true
    }

    fn apply(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::SetPaused(paused) => {
                self.session.set_paused(paused);
                if paused {
                    self.frames.clear();
                }
            }
            SessionCommand::SetListPlace(place) => self.session.set_list_place(place),
            SessionCommand::NextRead => self.session.next_read(),
            SessionCommand::IncrementListPlace => self.session.increment_list_place(),
            SessionCommand::ResetError => self.session.reset_error(),
            SessionCommand::ToggleFlash => {
                self.session.toggle_flash();
            }
            SessionCommand::SetReadManual { value, advance, reply } => {
                let result = if advance {
                    self.session.set_read_manual_and_advance(&value)
                } else {
                    self.session.set_read_manual(&value)
                };
                if let Err(e) = &result {
                    warn!("Manual reading rejected: {}", e);
                }
                let _ = reply.send(result);
            }
            SessionCommand::CancelManualEntry => self.session.cancel_manual_entry(),
            SessionCommand::SetReadingRange(range) => self.session.set_reading_range(range),
            SessionCommand::Shutdown => {}
        }
    }

    fn process(&mut self, frame: RawFrame) {
        let normalized = match self.normalizer.prepare(frame) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!("Frame normalization failed: {}", e);
                return;
            }
        };

        let result = match self.detector.detect(&normalized) {
            Ok(result) => result,
            Err(e) => {
                warn!("Detector failed: {:#}", e);
                DetectionResult::invalid()
            }
        };
        self.shared.frames_processed.fetch_add(1, Ordering::Relaxed);

        let mapped = result
            .confident_digits()
            .map(|_| normalized.map_box_to_original(&result.bbox));
        *self.shared.last_box.write() = mapped;

        self.session.on_detection(&result);
    }

    /// Paused flag goes first so a reader seeing the snapshot also sees it
    fn publish(&self) {
        self.shared
            .paused
            .store(self.session.is_paused(), Ordering::Release);
        *self.shared.snapshot.write() = self.session.snapshot();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ReadingSource, SessionEvent, SessionState};
    use crate::vision::NormalizedImage;
    use image::{Rgba, RgbaImage};
    use std::collections::VecDeque;
    use std::time::Instant;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Replays canned results, then reports nothing
    struct ScriptedDetector {
        results: VecDeque<Result<DetectionResult>>,
    }

    impl ScriptedDetector {
        fn new(results: Vec<Result<DetectionResult>>) -> Self {
            Self {
                results: results.into(),
            }
        }
    }

    impl Detector for ScriptedDetector {
        fn detect(&mut self, _image: &NormalizedImage) -> Result<DetectionResult> {
            self.results
                .pop_front()
                .unwrap_or_else(|| Ok(DetectionResult::invalid()))
        }
    }

    fn entries() -> Vec<ReadEntry> {
        (0..3)
            .map(|i| ReadEntry {
                meter_id: 70 + i,
                apartment: i as u32 + 1,
                last_read: 0,
            })
            .collect()
    }

    fn frame() -> RawFrame {
        RawFrame::new(RgbaImage::from_pixel(200, 100, Rgba([20, 20, 20, 255])), 0)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < TIMEOUT {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn wait_for_event(feed: &LiveFeed, matches: impl Fn(&SessionEvent) -> bool) -> Option<SessionEvent> {
        let deadline = Instant::now() + TIMEOUT;
        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            match feed.events().recv_timeout(remaining) {
                Ok(stamped) if matches(&stamped.event) => return Some(stamped.event),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
        None
    }

    #[test]
    fn test_detection_flows_into_session() {
        let detector = ScriptedDetector::new(vec![Ok(DetectionResult::valid(
            "1234",
            BoundingBox::new(64.0, 192.0, 320.0, 256.0),
        ))]);
        let mut feed = LiveFeed::start(&AppConfig::default(), entries(), detector).unwrap();

        assert!(feed.submit_frame(frame()));
        let event = wait_for_event(&feed, |e| matches!(e, SessionEvent::ReadingRecorded { .. }));
        assert_eq!(
            event,
            Some(SessionEvent::ReadingRecorded {
                place: 0,
                meter_id: 70,
                value: 1234,
                source: ReadingSource::Detected,
            })
        );

        assert!(wait_until(|| feed.snapshot().place == 1));
        assert_eq!(feed.frames_processed(), 1);

        // 200x100 frame on 640 canvas: scale 3.2, pad_top 160
        let mapped = feed.last_detection_box().unwrap();
        assert!((mapped.left - 20.0).abs() < 0.01);
        assert!((mapped.top - 10.0).abs() < 0.01);
        assert!((mapped.right - 100.0).abs() < 0.01);
        assert!((mapped.bottom - 30.0).abs() < 0.01);

        feed.stop();
        assert!(!feed.is_running());
    }

    #[test]
    fn test_paused_feed_drops_frames() {
        let mut feed = LiveFeed::start(&AppConfig::default(), entries(), ScriptedDetector::new(vec![])).unwrap();

        feed.set_paused(true);
        assert!(wait_until(|| feed.is_paused()));
        assert!(!feed.submit_frame(frame()));

        feed.set_paused(false);
        assert!(wait_until(|| !feed.is_paused()));
        assert!(feed.submit_frame(frame()));
        assert!(wait_until(|| feed.frames_processed() == 1));

        feed.stop();
    }

    #[test]
    fn test_escalation_and_manual_entry() {
        let mut config = AppConfig::default();
        config.session.error_ceiling = 0;
        let mut feed = LiveFeed::start(&config, entries(), ScriptedDetector::new(vec![])).unwrap();

        assert!(feed.submit_frame(frame()));
        let event = wait_for_event(&feed, |e| matches!(e, SessionEvent::OutOfRange { .. }));
        assert!(matches!(event, Some(SessionEvent::OutOfRange { place: 0, error_count: 1, .. })));
        assert!(wait_until(|| feed.snapshot().state == SessionState::AwaitingManualEntry));
        assert!(feed.is_paused());

        let err = feed.set_read_manual("abc").unwrap_err();
        assert_eq!(
            err.downcast_ref::<SessionError>(),
            Some(&SessionError::InvalidManualValue("abc".to_string()))
        );

        let reading = feed.set_read_manual("4321").unwrap();
        assert_eq!(reading.value, 4321);
        assert!(wait_until(|| feed.snapshot().state == SessionState::Active));
        assert_eq!(feed.snapshot().error_count, 0);

        feed.increment_list_place();
        assert!(wait_until(|| feed.snapshot().place == 1));

        feed.stop();
    }

    #[test]
    fn test_manual_reading_and_advance_is_atomic() {
        let mut config = AppConfig::default();
        config.session.error_ceiling = 0;
        let detector = ScriptedDetector::new(vec![
            Ok(DetectionResult::invalid()),
            Ok(DetectionResult::valid("99", BoundingBox::new(0.0, 0.0, 10.0, 10.0))),
        ]);
        let mut feed = LiveFeed::start(&config, entries(), detector).unwrap();

        assert!(feed.submit_frame(frame()));
        assert!(wait_until(|| feed.snapshot().state == SessionState::AwaitingManualEntry));

        let reading = feed.set_read_manual_and_advance("4321").unwrap();
        assert_eq!(reading, AcceptedReading { value: 4321, source: ReadingSource::Manual });
        assert!(wait_until(|| feed.snapshot().place == 1));

        assert!(feed.submit_frame(frame()));
        let event = wait_for_event(&feed, |e| {
            matches!(e, SessionEvent::ReadingRecorded { source: ReadingSource::Detected, .. })
        });
        assert_eq!(
            event,
            Some(SessionEvent::ReadingRecorded {
                place: 1,
                meter_id: 71,
                value: 99,
                source: ReadingSource::Detected,
            })
        );
        assert!(wait_until(|| feed.snapshot().place == 2));
        assert_eq!(feed.snapshot().readings_recorded, 2);

        feed.stop();
    }

    #[test]
    fn test_small_event_queue_keeps_latest() {
        let mut config = AppConfig::default();
        config.pipeline.event_capacity = 1;
        let mut feed = LiveFeed::start(&config, entries(), ScriptedDetector::new(vec![])).unwrap();

        feed.toggle_flash();
        feed.toggle_flash();
        feed.toggle_flash();
        // Answered after the queued toggles are applied
        assert!(feed.set_read_manual("1").is_err());
        assert!(wait_until(|| feed.snapshot().flash_on));

        let pending: Vec<SessionEvent> = feed.events().try_iter().map(|e| e.event).collect();
        assert_eq!(pending, vec![SessionEvent::FlashChanged { on: true }]);

        feed.stop();
    }

    #[test]
    fn test_detector_error_counts_as_invalid() {
        let detector = ScriptedDetector::new(vec![Err(anyhow::anyhow!("model crashed"))]);
        let mut feed = LiveFeed::start(&AppConfig::default(), entries(), detector).unwrap();

        assert!(feed.submit_frame(frame()));
        assert!(wait_until(|| feed.snapshot().error_count == 1));
        assert!(feed.last_detection_box().is_none());

        feed.stop();
    }

    #[test]
    fn test_commands_after_stop_are_ignored() {
        let mut feed = LiveFeed::start(&AppConfig::default(), entries(), ScriptedDetector::new(vec![])).unwrap();
        feed.toggle_flash();
        assert!(wait_until(|| feed.snapshot().flash_on));

        feed.stop();
        feed.toggle_flash();
        assert!(feed.set_read_manual("1").is_err());
        assert!(!feed.submit_frame(frame()));
    }
}
