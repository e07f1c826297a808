mod common;

use std::sync::{Arc, Condvar, Mutex};

use common::{document, rows, with_footer, with_header};
use scrollstitch_core::{
    ChannelObserver, FailureCode, Frame, FrameReport, NoOpObserver, StaticRegions, StitchConfig,
    StitchError, StitchObserver, StitchWorker, WorkerConfig, WorkerEvent,
};

fn worker_config(detect_static_regions: bool) -> StitchConfig {
    StitchConfig {
        detect_static_regions,
        ..StitchConfig::default()
    }
}

fn reports(events: &[WorkerEvent]) -> Vec<&FrameReport> {
    events
        .iter()
        .filter_map(|e| match e {
            WorkerEvent::FrameProcessed(report) => Some(report),
            _ => None,
        })
        .collect()
}

/// Observer that holds the worker inside `on_frame_processed` until opened.
#[derive(Default)]
struct GateObserver {
    open: Mutex<bool>,
    opened: Condvar,
    events: Mutex<Vec<String>>,
}

impl GateObserver {
    fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl StitchObserver for GateObserver {
    fn on_frame_processed(&self, _report: &FrameReport) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
        drop(open);
        self.events.lock().unwrap().push("frame".into());
    }

    fn on_queue_near_full(&self, _depth: usize) {
        self.events.lock().unwrap().push("near_full".into());
    }

    fn on_queue_low(&self, _depth: usize) {
        self.events.lock().unwrap().push("low".into());
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

#[test]
fn test_invalid_config_is_rejected() {
    let config = StitchConfig {
        confidence_threshold: 1.5,
        ..StitchConfig::default()
    };
    assert!(matches!(
        StitchWorker::new(config, Arc::new(NoOpObserver)),
        Err(StitchError::InvalidConfig(_))
    ));
}

// ---------------------------------------------------------------------------
// Processing
// ---------------------------------------------------------------------------

#[test]
fn test_frames_are_reported_in_submission_order() {
    let page = document(320, 600, 40);
    let (observer, events) = ChannelObserver::new();
    let worker = StitchWorker::new(worker_config(true), Arc::new(observer)).unwrap();

    for i in 0..5 {
        assert!(worker.enqueue_frame(rows(&page, i * 60, 240)));
    }
    worker.finish();

    let events: Vec<WorkerEvent> = events.try_iter().collect();
    let reports = reports(&events);
    let sequences: Vec<u64> = reports.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
    assert!(reports.iter().all(|r| r.result.success));
    assert_eq!(reports[4].canvas_size, (320, 480));
    assert_eq!(worker.frame_count(), 5);
    assert_eq!(worker.static_regions(), StaticRegions::default());
    assert!(!events
        .iter()
        .any(|e| matches!(e, WorkerEvent::FixedElementsDetected(_))));
}

#[test]
fn test_sticky_header_is_kept_once() {
    let page = document(320, 800, 41);
    let header = document(320, 20, 42);
    let (observer, events) = ChannelObserver::new();
    let worker = StitchWorker::new(worker_config(true), Arc::new(observer)).unwrap();

    for i in 0..5 {
        assert!(worker.enqueue_frame(with_header(&page, &header, i * 60, 240)));
    }
    worker.finish();

    let events: Vec<WorkerEvent> = events.try_iter().collect();
    let detected: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            WorkerEvent::FixedElementsDetected(result) => Some(result),
            _ => None,
        })
        .collect();
    assert_eq!(detected.len(), 1);
    assert_eq!(detected[0].regions.leading, 20);

    assert_eq!(reports(&events).len(), 5);
    assert_eq!(worker.static_regions().leading, 20);
    assert_eq!(worker.canvas_size(), (320, 480));

    let image = worker.stitched_image().unwrap();
    assert_eq!(image.height(), 480);
    assert_eq!(image.get_pixel(5, 5), header.get_pixel(5, 5));
    assert_eq!(image.get_pixel(7, 20), page.get_pixel(7, 0));
    assert_eq!(image.get_pixel(9, 479), page.get_pixel(9, 459));
}

#[test]
fn test_frames_are_held_while_detection_is_undecided() {
    let page = document(320, 600, 43);
    let worker = StitchWorker::new(worker_config(true), Arc::new(NoOpObserver)).unwrap();

    worker.enqueue_frame(rows(&page, 0, 240));
    worker.enqueue_frame(rows(&page, 60, 240));
    worker.wait_idle();
    assert_eq!(worker.pending_frames(), 2);
    assert_eq!(worker.frame_count(), 0);

    worker.finish();
    assert_eq!(worker.pending_frames(), 0);
    assert_eq!(worker.frame_count(), 2);
    assert_eq!(worker.canvas_size(), (320, 300));
}

#[test]
fn test_pause_before_scrolling_does_not_end_detection() {
    let page = document(320, 600, 52);
    let footer = document(320, 20, 53);
    let (observer, events) = ChannelObserver::new();
    let worker = StitchWorker::new(worker_config(true), Arc::new(observer)).unwrap();

    for _ in 0..5 {
        assert!(worker.enqueue_frame(with_footer(&page, &footer, 0, 240)));
    }
    for i in 1..=5 {
        assert!(worker.enqueue_frame(with_footer(&page, &footer, i * 60, 240)));
    }
    worker.finish();

    let events: Vec<WorkerEvent> = events.try_iter().collect();
    let detected: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            WorkerEvent::FixedElementsDetected(result) => Some(result),
            _ => None,
        })
        .collect();
    assert_eq!(detected.len(), 1);
    assert_eq!(detected[0].regions, StaticRegions { leading: 0, trailing: 20 });

    let reports = reports(&events);
    let sequences: Vec<u64> = reports.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, (0..10).collect::<Vec<u64>>());
    for report in &reports {
        if (1..5).contains(&report.sequence) {
            assert_eq!(report.result.failure, FailureCode::FrameUnchanged);
        } else {
            assert!(report.result.success, "{}: {}", report.sequence, report.result.failure_reason);
        }
    }

    assert_eq!(worker.static_regions().trailing, 20);
    assert_eq!(worker.canvas_size(), (320, 540));
    let image = worker.stitched_image().unwrap();
    assert_eq!(image.get_pixel(4, 519), page.get_pixel(4, 519));
    assert_eq!(image.get_pixel(6, 539), footer.get_pixel(6, 19));
}

#[test]
fn test_oversized_frame_does_not_end_the_session() {
    let page = document(320, 600, 54);
    let (observer, events) = ChannelObserver::new();
    let worker = StitchWorker::new(worker_config(false), Arc::new(observer)).unwrap();

    worker.enqueue_frame(Frame::from_rgb(image::RgbImage::new(32_769, 4)));
    worker.enqueue_frame(rows(&page, 0, 240));
    worker.enqueue_frame(rows(&page, 100, 240));
    worker.finish();

    let events: Vec<WorkerEvent> = events.try_iter().collect();
    assert!(!events.iter().any(|e| matches!(e, WorkerEvent::Error(_))));
    let reports = reports(&events);
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].result.failure, FailureCode::MaxSizeReached);
    assert!(reports[1].result.success && reports[2].result.success);
    assert_eq!(worker.canvas_size(), (320, 340));
}

#[test]
fn test_undo_drops_a_held_frame_first() {
    let page = document(320, 600, 44);
    let worker = StitchWorker::new(worker_config(true), Arc::new(NoOpObserver)).unwrap();
    worker.enqueue_frame(rows(&page, 0, 240));
    worker.enqueue_frame(rows(&page, 60, 240));
    worker.wait_idle();

    assert!(worker.undo());
    assert_eq!(worker.pending_frames(), 1);
    worker.finish();
    assert_eq!(worker.frame_count(), 1);
    assert!(!worker.undo());
}

#[test]
fn test_undo_reverts_the_engine() {
    let page = document(320, 600, 45);
    let worker = StitchWorker::new(worker_config(false), Arc::new(NoOpObserver)).unwrap();
    for i in 0..3 {
        worker.enqueue_frame(rows(&page, i * 100, 240));
    }
    worker.finish();
    assert_eq!(worker.canvas_size(), (320, 440));

    assert!(worker.undo());
    assert_eq!(worker.canvas_size(), (320, 340));
    assert_eq!(worker.frame_count(), 2);
}

#[test]
fn test_reset_starts_a_new_session() {
    let page = document(320, 600, 46);
    let other = document(200, 600, 47);
    let worker = StitchWorker::new(worker_config(false), Arc::new(NoOpObserver)).unwrap();
    worker.enqueue_frame(rows(&page, 0, 240));
    worker.enqueue_frame(rows(&page, 100, 240));
    worker.finish();
    assert_eq!(worker.frame_count(), 2);

    worker.reset();
    assert_eq!(worker.frame_count(), 0);
    assert_eq!(worker.canvas_size(), (0, 0));
    assert_eq!(worker.queue_depth(), 0);

    worker.enqueue_frame(rows(&other, 0, 240));
    worker.enqueue_frame(rows(&other, 150, 240));
    worker.finish();
    assert_eq!(worker.frame_count(), 2);
    assert_eq!(worker.canvas_size(), (200, 390));
}

#[test]
fn test_frames_after_reset_join_the_new_session() {
    let page = document(320, 600, 50);
    let other = document(200, 600, 51);
    let observer = Arc::new(GateObserver::default());
    let worker = StitchWorker::new(worker_config(false), observer.clone()).unwrap();

    // The worker parks in the observer after the first frame.
    worker.enqueue_frame(rows(&page, 0, 240));
    worker.enqueue_frame(rows(&page, 100, 240));
    worker.reset();
    assert_eq!(worker.queue_depth(), 0);

    worker.enqueue_frame(rows(&other, 0, 240));
    worker.enqueue_frame(rows(&other, 150, 240));
    observer.release();
    worker.finish();

    assert_eq!(worker.frame_count(), 2);
    assert_eq!(worker.canvas_size(), (200, 390));
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

#[test]
fn test_full_queue_drops_frames() {
    let page = document(320, 800, 48);
    let config = StitchConfig {
        detect_static_regions: false,
        worker: WorkerConfig {
            queue_capacity: 2,
            high_water: 2,
            low_water: 1,
        },
        ..StitchConfig::default()
    };
    let observer = Arc::new(GateObserver::default());
    let worker = StitchWorker::new(config, observer.clone()).unwrap();

    let accepted = (0..4)
        .map(|i| worker.enqueue_frame(rows(&page, i * 100, 240)))
        .filter(|&ok| ok)
        .count();
    assert!(accepted < 4);

    observer.release();
    worker.finish();
    let frames = observer.events().iter().filter(|e| *e == "frame").count();
    assert_eq!(frames, accepted);
}

#[test]
fn test_queue_signals_near_full_then_low() {
    let page = document(320, 900, 49);
    let config = StitchConfig {
        detect_static_regions: false,
        worker: WorkerConfig {
            queue_capacity: 4,
            high_water: 3,
            low_water: 1,
        },
        ..StitchConfig::default()
    };
    let observer = Arc::new(GateObserver::default());
    let worker = StitchWorker::new(config, observer.clone()).unwrap();

    for i in 0..5 {
        worker.enqueue_frame(rows(&page, i * 100, 240));
    }
    assert!(observer.events().contains(&"near_full".to_string()));

    observer.release();
    worker.finish();
    let events = observer.events();
    let near_full = events.iter().position(|e| e == "near_full").unwrap();
    let low = events.iter().position(|e| e == "low").unwrap();
    assert!(near_full < low);
    assert_eq!(worker.queue_depth(), 0);
    assert!(!worker.is_processing());
}
