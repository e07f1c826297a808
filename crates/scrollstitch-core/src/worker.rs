//! Background stitching.
//!
//! [`StitchWorker`] accepts frames from a capture thread without blocking,
//! queues them, and drains the queue on a single rayon task that owns the
//! alignment engine and the sticky-band detector for the session.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::config::StitchConfig;
use crate::consts::{DETECTION_BUFFER_FRAMES, DETECTION_MAX_HELD_FRAMES, DETECTION_MIN_FRAMES};
use crate::detection::{DetectionResult, FixedElementDetector, StaticRegions};
use crate::engine::{AlignmentEngine, EngineState, FixedBands};
use crate::error::{Result, StitchError};
use crate::frame::Frame;
use crate::preprocess::{frames_differ, prepare, FrameCache};
use crate::result::{FailureCode, StitchResult};

/// Result of one processed frame.
#[derive(Clone, Debug)]
pub struct FrameReport {
    /// Position of the frame in submission order, from 0 per session.
    pub sequence: u64,
    pub result: StitchResult,
    /// (width, height) of the stitched image after this frame.
    pub canvas_size: (usize, usize),
}

/// Receives worker notifications.
///
/// Callbacks run on the worker task after the session lock is released,
/// but must not call `wait_idle` or `finish`.
pub trait StitchObserver: Send + Sync {
    /// One call per processed frame, in submission order.
    fn on_frame_processed(&self, _report: &FrameReport) {}

    /// Sticky bands were found; emitted at most once per session.
    fn on_fixed_elements_detected(&self, _result: &DetectionResult) {}

    /// Queue depth reached the high-water mark.
    fn on_queue_near_full(&self, _depth: usize) {}

    /// Queue depth fell back to the low-water mark.
    fn on_queue_low(&self, _depth: usize) {}

    /// The session hit an unrecoverable error and stopped accepting work.
    fn on_error(&self, _error: &StitchError) {}
}

/// Observer that ignores every notification.
pub struct NoOpObserver;
impl StitchObserver for NoOpObserver {}

/// Worker notification as a value.
#[derive(Clone, Debug)]
pub enum WorkerEvent {
    FrameProcessed(FrameReport),
    FixedElementsDetected(DetectionResult),
    QueueNearFull(usize),
    QueueLow(usize),
    Error(String),
}

/// Forwards notifications over an `mpsc` channel.
pub struct ChannelObserver {
    sender: Sender<WorkerEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, Receiver<WorkerEvent>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }

    fn send(&self, event: WorkerEvent) {
        // A dropped receiver only means nobody is listening.
        let _ = self.sender.send(event);
    }
}

impl StitchObserver for ChannelObserver {
    fn on_frame_processed(&self, report: &FrameReport) {
        self.send(WorkerEvent::FrameProcessed(report.clone()));
    }

    fn on_fixed_elements_detected(&self, result: &DetectionResult) {
        self.send(WorkerEvent::FixedElementsDetected(result.clone()));
    }

    fn on_queue_near_full(&self, depth: usize) {
        self.send(WorkerEvent::QueueNearFull(depth));
    }

    fn on_queue_low(&self, depth: usize) {
        self.send(WorkerEvent::QueueLow(depth));
    }

    fn on_error(&self, error: &StitchError) {
        self.send(WorkerEvent::Error(error.to_string()));
    }
}

struct Queued {
    /// Session the frame was submitted to.
    generation: u64,
    sequence: u64,
    frame: Frame,
}

struct QueueState {
    frames: VecDeque<Queued>,
    next_sequence: u64,
    generation: u64,
    near_full_signaled: bool,
}

/// A frame held back while sticky-band detection is undecided.
enum Held {
    Frame(u64, Frame),
    /// Same picture as the frame held before it. Never shown to the detector.
    Unchanged(u64),
}

struct Session {
    generation: u64,
    engine: AlignmentEngine,
    detector: FixedElementDetector,
    /// Frames held back until the detector decides, in submission order.
    pending: Vec<Held>,
    /// Cache of the last held frame, for the frame-change gate.
    last_held: Option<FrameCache>,
    detecting: bool,
    failed: bool,
}

impl Session {
    fn new(config: &StitchConfig, generation: u64) -> Self {
        Self {
            generation,
            engine: AlignmentEngine::new(config.clone()),
            detector: FixedElementDetector::new(config.capture_mode),
            pending: Vec::new(),
            last_held: None,
            detecting: config.detect_static_regions,
            failed: false,
        }
    }

    fn held_frames(&self) -> usize {
        self.pending
            .iter()
            .filter(|held| matches!(held, Held::Frame(..)))
            .count()
    }

    /// Refill the detector and the change gate from the held frames.
    fn rebuild_detection(&mut self) {
        let mode = self.detector.mode();
        self.detector.reset();
        self.last_held = None;
        for held in &self.pending {
            if let Held::Frame(_, frame) = held {
                self.detector.add_frame(frame);
                self.last_held = Some(prepare(frame, mode));
            }
        }
    }
}

/// Notifications collected under the session lock and delivered after it
/// is released.
enum Notice {
    Frame(FrameReport),
    Fixed(DetectionResult),
    Error(StitchError),
}

struct Shared {
    config: StitchConfig,
    observer: Arc<dyn StitchObserver>,
    queue: Mutex<QueueState>,
    session: Mutex<Session>,
    processing: AtomicBool,
    /// Signalled (with `queue` held) when the drain task exits.
    idle: Condvar,
}

pub struct StitchWorker {
    shared: Arc<Shared>,
}

impl StitchWorker {
    pub fn new(config: StitchConfig, observer: Arc<dyn StitchObserver>) -> Result<Self> {
        config.validate()?;
        let session = Session::new(&config, 0);
        Ok(Self {
            shared: Arc::new(Shared {
                observer,
                queue: Mutex::new(QueueState {
                    frames: VecDeque::with_capacity(config.worker.queue_capacity),
                    next_sequence: 0,
                    generation: 0,
                    near_full_signaled: false,
                }),
                session: Mutex::new(session),
                processing: AtomicBool::new(false),
                idle: Condvar::new(),
                config,
            }),
        })
    }

    pub fn config(&self) -> &StitchConfig {
        &self.shared.config
    }

    /// Queue `frame` for stitching. Returns false, dropping the frame, when
    /// the queue is full. Never waits for processing.
    pub fn enqueue_frame(&self, frame: Frame) -> bool {
        let shared = &self.shared;
        let limits = &shared.config.worker;

        let near_full = {
            let mut queue = lock(&shared.queue);
            if queue.frames.len() >= limits.queue_capacity {
                warn!(depth = queue.frames.len(), "Frame queue full, dropping frame");
                return false;
            }
            let sequence = queue.next_sequence;
            queue.next_sequence += 1;
            let generation = queue.generation;
            queue.frames.push_back(Queued {
                generation,
                sequence,
                frame,
            });

            let depth = queue.frames.len();
            if depth >= limits.high_water && !queue.near_full_signaled {
                queue.near_full_signaled = true;
                Some(depth)
            } else {
                None
            }
        };

        if let Some(depth) = near_full {
            debug!(depth, "Frame queue near full");
            shared.observer.on_queue_near_full(depth);
        }
        if !shared.processing.swap(true, Ordering::AcqRel) {
            let task = Arc::clone(shared);
            rayon::spawn(move || task.drain());
        }
        true
    }

    /// Block until every queued frame has been processed.
    pub fn wait_idle(&self) {
        self.shared.wait_idle();
    }

    /// Drain the queue, then stitch any frames still held back for
    /// sticky-band detection.
    pub fn finish(&self) {
        self.shared.wait_idle();
        let notices = {
            let mut session = lock(&self.shared.session);
            let mut notices = Vec::new();
            if session.detecting {
                session.detecting = false;
                flush_pending(&mut session, false, &mut notices);
            }
            notices
        };
        self.shared.dispatch(notices);
    }

    /// Drop queued frames, wait for the in-flight frame, and start a new
    /// session. Frames enqueued after `reset` returns belong to the new
    /// session.
    pub fn reset(&self) {
        // Lock order: session, then queue. The drain task never holds both.
        let mut session = lock(&self.shared.session);
        let generation = {
            let mut queue = lock(&self.shared.queue);
            queue.frames.clear();
            queue.next_sequence = 0;
            queue.near_full_signaled = false;
            queue.generation += 1;
            queue.generation
        };
        *session = Session::new(&self.shared.config, generation);
        info!(generation, "Stitch worker reset");
    }

    /// Undo the most recent frame: a held-back frame if any, otherwise the
    /// engine's last placement.
    pub fn undo(&self) -> bool {
        let mut session = lock(&self.shared.session);
        match session.pending.pop() {
            Some(Held::Frame(..)) => {
                session.rebuild_detection();
                true
            }
            Some(Held::Unchanged(_)) => true,
            None => session.engine.undo(),
        }
    }

    pub fn stitched_image(&self) -> Result<RgbImage> {
        lock(&self.shared.session).engine.stitched_image()
    }

    /// Frames placed on the canvas, including the first.
    pub fn frame_count(&self) -> usize {
        lock(&self.shared.session).engine.frame_count()
    }

    pub fn canvas_size(&self) -> (usize, usize) {
        lock(&self.shared.session).engine.canvas_size()
    }

    pub fn static_regions(&self) -> StaticRegions {
        lock(&self.shared.session).engine.static_regions()
    }

    /// Frames held back while sticky-band detection is undecided.
    pub fn pending_frames(&self) -> usize {
        lock(&self.shared.session).pending.len()
    }

    pub fn queue_depth(&self) -> usize {
        lock(&self.shared.queue).frames.len()
    }

    pub fn is_processing(&self) -> bool {
        self.shared.processing.load(Ordering::Acquire)
    }
}

impl Shared {
    fn drain(&self) {
        loop {
            let next = {
                let mut queue = lock(&self.queue);
                match queue.frames.pop_front() {
                    Some(item) => {
                        let depth = queue.frames.len();
                        let low = queue.near_full_signaled && depth <= self.config.worker.low_water;
                        if low {
                            queue.near_full_signaled = false;
                        }
                        Some((item, low.then_some(depth)))
                    }
                    None => {
                        self.processing.store(false, Ordering::Release);
                        self.idle.notify_all();
                        None
                    }
                }
            };
            let Some((queued, low)) = next else {
                return;
            };

            if let Some(depth) = low {
                debug!(depth, "Frame queue drained below low water");
                self.observer.on_queue_low(depth);
            }
            let notices = self.process(queued);
            self.dispatch(notices);
        }
    }

    fn process(&self, queued: Queued) -> Vec<Notice> {
        let Queued {
            generation,
            sequence,
            frame,
        } = queued;
        let mut notices = Vec::new();
        let mut session = lock(&self.session);
        if generation != session.generation {
            debug!(sequence, generation, "Frame from a reset session dropped");
            return notices;
        }
        if session.failed {
            debug!(sequence, "Session failed, frame ignored");
            return notices;
        }

        if session.detecting {
            hold(&mut session, sequence, frame, &mut notices);
            return notices;
        }

        let frame = if session.detector.is_locked() {
            session.detector.crop_fixed_regions(&frame)
        } else {
            frame
        };
        feed(&mut session, sequence, &frame, &mut notices);
        notices
    }

    fn dispatch(&self, notices: Vec<Notice>) {
        for notice in notices {
            match notice {
                Notice::Frame(report) => self.observer.on_frame_processed(&report),
                Notice::Fixed(result) => self.observer.on_fixed_elements_detected(&result),
                Notice::Error(error) => self.observer.on_error(&error),
            }
        }
    }

    fn wait_idle(&self) {
        let mut queue = lock(&self.queue);
        while self.processing.load(Ordering::Acquire) || !queue.frames.is_empty() {
            queue = self
                .idle
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Hold `frame` back for sticky-band detection. A frame that shows the same
/// picture as the previous held frame is held as a marker only and never
/// reaches the detector.
fn hold(session: &mut Session, sequence: u64, frame: Frame, notices: &mut Vec<Notice>) {
    let cache = prepare(&frame, session.detector.mode());
    if session
        .last_held
        .as_ref()
        .is_some_and(|last| !frames_differ(last, &cache))
    {
        debug!(sequence, "Held frame unchanged");
        session.pending.push(Held::Unchanged(sequence));
        return;
    }

    session.last_held = Some(cache);
    session.detector.add_frame(&frame);
    session.pending.push(Held::Frame(sequence, frame));
    if session.detector.buffered_frames() >= DETECTION_MIN_FRAMES
        || session.held_frames() >= DETECTION_MAX_HELD_FRAMES
    {
        decide_static_regions(session, notices);
    }
}

/// Run detection over the held-back frames and release them once decided.
fn decide_static_regions(session: &mut Session, notices: &mut Vec<Notice>) {
    let held = session.held_frames();
    let undecided = session.detector.buffered_frames() < DETECTION_BUFFER_FRAMES
        && held < DETECTION_MAX_HELD_FRAMES;

    match session.detector.detect() {
        Some(result) if result.is_locked() => {
            let mode = session.detector.mode();
            // The detector buffer only spans frames of the latest size.
            let latest = session.pending.iter().rev().find_map(|h| match h {
                Held::Frame(_, frame) => Some(frame),
                Held::Unchanged(_) => None,
            });
            if let Some(latest) = latest {
                let bands = FixedBands::capture(latest, mode, result.regions);
                session.engine.set_fixed_bands(bands);
            }
            session.detecting = false;
            notices.push(Notice::Fixed(result));
            flush_pending(session, true, notices);
        }
        Some(result) if result.inconclusive && undecided => {
            debug!(held, "Sticky-band detection undecided");
        }
        None if undecided => {}
        _ => {
            debug!(held, "Releasing held frames uncropped");
            session.detecting = false;
            flush_pending(session, false, notices);
        }
    }
}

fn flush_pending(session: &mut Session, crop: bool, notices: &mut Vec<Notice>) {
    let pending = std::mem::take(&mut session.pending);
    session.last_held = None;
    for held in pending {
        match held {
            Held::Frame(sequence, frame) => {
                let frame = if crop {
                    session.detector.crop_fixed_regions(&frame)
                } else {
                    frame
                };
                feed(session, sequence, &frame, notices);
            }
            Held::Unchanged(sequence) => report_unchanged(session, sequence, notices),
        }
    }
}

fn report_unchanged(session: &Session, sequence: u64, notices: &mut Vec<Notice>) {
    if session.failed {
        return;
    }
    notices.push(Notice::Frame(FrameReport {
        sequence,
        result: StitchResult::failed(
            FailureCode::FrameUnchanged,
            "frame matches the previous frame",
        ),
        canvas_size: session.engine.canvas_size(),
    }));
}

fn feed(session: &mut Session, sequence: u64, frame: &Frame, notices: &mut Vec<Notice>) {
    if session.failed {
        return;
    }
    let outcome = if session.engine.state() == EngineState::Empty {
        session.engine.start(frame)
    } else {
        session.engine.add_frame(frame)
    };

    match outcome {
        Ok(result) => {
            notices.push(Notice::Frame(FrameReport {
                sequence,
                result,
                canvas_size: session.engine.canvas_size(),
            }));
        }
        Err(error) => {
            warn!(sequence, %error, "Stitch session failed");
            session.failed = true;
            notices.push(Notice::Error(error));
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
