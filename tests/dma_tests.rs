//! Integration tests for the DMA transfer engine using a mock controller host.
//!
//! The mock behaves like a controller that runs on its own: queueing only
//! records the transaction, and the payload is read out of the caller's buffer
//! when the transaction completes. Everything it sees goes into a shared log
//! so tests can look at it while a transfer is still pending.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tft_pixel_engine::dma::{MAX_FILL_PIXELS, MAX_WINDOW_PIXELS, WINDOW_TRANSACTIONS};
use tft_pixel_engine::{
    BusConfig, Config, DcLevel, DmaEngine, DmaError, DmaHost, DmaState, Payload, Transaction,
    TransactionId, WindowRect,
};

#[derive(Clone, Debug, PartialEq)]
struct Recorded {
    id: TransactionId,
    dc: DcLevel,
    bit_length: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Event {
    Queue(TransactionId),
    Complete(TransactionId),
}

#[derive(Debug)]
enum MockError {
    Acquire,
    NotAcquired,
    Empty,
}

#[derive(Default)]
struct HostLog {
    acquired: Option<BusConfig>,
    acquire_calls: usize,
    release_calls: usize,
    queued: Vec<Recorded>,
    /// Payload bytes in completion order, read at completion time.
    sent: Vec<Vec<u8>>,
    events: Vec<Event>,
}

type Log = Rc<RefCell<HostLog>>;

enum Wire {
    Inline(Vec<u8>),
    Buffer(*const u8, usize),
}

#[derive(Default)]
struct MockHost {
    fail_acquire: bool,
    /// Report the second in-flight transaction before the first.
    out_of_order: bool,
    log: Log,
    hardware: VecDeque<(TransactionId, Wire)>,
}

impl DmaHost for MockHost {
    type Error = MockError;

    fn acquire(&mut self, config: &BusConfig) -> Result<(), MockError> {
        let mut log = self.log.borrow_mut();
        log.acquire_calls += 1;
        if self.fail_acquire {
            return Err(MockError::Acquire);
        }
        log.acquired = Some(*config);
        Ok(())
    }

    fn release(&mut self) {
        let mut log = self.log.borrow_mut();
        log.release_calls += 1;
        log.acquired = None;
        self.hardware.clear();
    }

    unsafe fn queue_transaction(&mut self, t: &Transaction<'_>) -> Result<(), MockError> {
        let mut log = self.log.borrow_mut();
        if log.acquired.is_none() {
            return Err(MockError::NotAcquired);
        }
        log.queued.push(Recorded {
            id: t.id,
            dc: t.dc,
            bit_length: t.bit_length(),
        });
        log.events.push(Event::Queue(t.id));
        let wire = match t.payload {
            Payload::Inline { .. } => Wire::Inline(t.bytes().to_vec()),
            Payload::Buffer(buf) => Wire::Buffer(buf.as_ptr(), buf.len()),
        };
        self.hardware.push_back((t.id, wire));
        Ok(())
    }

    fn await_completion(&mut self) -> Result<TransactionId, MockError> {
        let next = if self.out_of_order && self.hardware.len() >= 2 {
            self.hardware.remove(1)
        } else {
            self.hardware.pop_front()
        };
        let (id, wire) = next.ok_or(MockError::Empty)?;
        let bytes = match wire {
            Wire::Inline(bytes) => bytes,
            // SAFETY: the engine keeps buffer payloads alive until completion.
            Wire::Buffer(ptr, len) => unsafe { std::slice::from_raw_parts(ptr, len) }.to_vec(),
        };
        let mut log = self.log.borrow_mut();
        log.sent.push(bytes);
        log.events.push(Event::Complete(id));
        Ok(id)
    }
}

fn panel() -> Config {
    Config::default().with_size(16, 16)
}

fn make_engine() -> (DmaEngine<MockHost>, Log) {
    let host = MockHost::default();
    let log = host.log.clone();
    let mut engine = DmaEngine::new(host, &panel());
    assert!(engine.init());
    (engine, log)
}

fn image(len: usize) -> Vec<u16> {
    (0..len).map(|i| (i as u16).wrapping_mul(0x0203).wrapping_add(1)).collect()
}

fn bytes_of(pixels: &[u16]) -> Vec<u8> {
    pixels.iter().flat_map(|p| p.to_ne_bytes()).collect()
}

fn completions(log: &Log) -> Vec<TransactionId> {
    log.borrow()
        .events
        .iter()
        .filter_map(|e| match e {
            Event::Complete(id) => Some(*id),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Lifecycle
// ============================================================================

mod lifecycle_tests {
    use super::*;

    #[test]
    fn second_init_reports_failure() {
        let (mut engine, log) = make_engine();
        assert!(!engine.init());
        assert_eq!(log.borrow().acquire_calls, 1);
        assert!(engine.is_enabled());
    }

    #[test]
    fn acquire_gets_full_screen_budget() {
        let (_engine, log) = make_engine();
        let bus = log.borrow().acquired.unwrap();
        assert_eq!(bus.max_transfer_bytes, 16 * 16 * 2 + 8);
        assert_eq!(bus.queue_depth, 7);
    }

    #[test]
    #[should_panic(expected = "acquisition failed")]
    fn acquire_failure_is_fatal() {
        let host = MockHost {
            fail_acquire: true,
            ..Default::default()
        };
        let mut engine = DmaEngine::new(host, &panel());
        engine.init();
    }

    #[test]
    fn deinit_without_init_is_noop() {
        let mut engine = DmaEngine::new(MockHost::default(), &panel());
        engine.deinit();
        assert_eq!(engine.host().log.borrow().release_calls, 0);
    }

    #[test]
    fn deinit_drains_before_release() {
        let (mut engine, log) = make_engine();
        // A leaked transfer leaves its transactions queued.
        let img = image(16);
        let mut staging = vec![0u16; 16];
        std::mem::forget(
            engine
                .submit_window(WindowRect::new(0, 0, 4, 4), &img, &mut staging, false)
                .unwrap(),
        );
        assert_eq!(engine.pending(), WINDOW_TRANSACTIONS);

        engine.deinit();
        assert_eq!(completions(&log), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(log.borrow().release_calls, 1);
        assert_eq!(engine.pending(), 0);
        assert!(!engine.is_enabled());
    }

    #[test]
    fn engine_can_be_reinitialised() {
        let (mut engine, log) = make_engine();
        engine.deinit();
        assert!(engine.init());
        assert_eq!(log.borrow().acquire_calls, 2);
    }

    #[test]
    fn busy_always_drains() {
        let (mut engine, log) = make_engine();
        let px = image(8);
        let mut transfer = engine.submit_fill(&px).unwrap();
        assert_eq!(transfer.pending(), 1);

        assert!(!transfer.is_busy());
        assert_eq!(transfer.pending(), 0);
        assert_eq!(log.borrow().events.last(), Some(&Event::Complete(0)));
        transfer.wait();
        assert_eq!(engine.state(), DmaState::Idle);
    }
}

// ============================================================================
// Transfer lifetime
// ============================================================================

mod transfer_tests {
    use super::*;

    #[test]
    fn submission_returns_before_anything_completes() {
        let (mut engine, log) = make_engine();
        let img = image(16);
        let mut staging = vec![0u16; 16];
        let transfer = engine
            .submit_window(WindowRect::new(0, 0, 4, 4), &img, &mut staging, false)
            .unwrap();

        assert_eq!(transfer.pending(), WINDOW_TRANSACTIONS);
        assert_eq!(log.borrow().queued.len(), WINDOW_TRANSACTIONS);
        assert!(completions(&log).is_empty());
        assert!(log.borrow().sent.is_empty());

        transfer.wait();
        assert_eq!(completions(&log), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(engine.pending(), 0);
    }

    #[test]
    fn payload_is_read_from_staging_at_completion() {
        let (mut engine, log) = make_engine();
        let img = image(9);
        let mut staging = vec![0u16; 9];
        engine
            .submit_window(WindowRect::new(0, 0, 3, 3), &img, &mut staging, true)
            .unwrap()
            .wait();

        let swapped: Vec<u16> = img.iter().map(|p| p.swap_bytes()).collect();
        assert_eq!(log.borrow().sent[5], bytes_of(&swapped));
        assert_eq!(staging, swapped);
    }

    #[test]
    fn dropping_the_transfer_drains_it() {
        let (mut engine, log) = make_engine();
        let px = image(32);
        {
            let _transfer = engine.submit_fill(&px).unwrap();
            assert!(completions(&log).is_empty());
        }
        assert_eq!(completions(&log), vec![0]);
        assert_eq!(log.borrow().sent[0], bytes_of(&px));
        assert_eq!(engine.state(), DmaState::Idle);
    }

    #[test]
    fn skipped_submission_yields_an_empty_transfer() {
        let (mut engine, log) = make_engine();
        let transfer = engine.submit_fill(&[]).unwrap();
        assert_eq!(transfer.pending(), 0);
        transfer.wait();
        assert!(log.borrow().events.is_empty());
    }
}

// ============================================================================
// submit_fill
// ============================================================================

mod fill_tests {
    use super::*;

    #[test]
    fn fill_queues_one_data_transaction() {
        let (mut engine, log) = make_engine();
        let px = image(100);
        let transfer = engine.submit_fill(&px).unwrap();
        assert_eq!(transfer.pending(), 1);
        transfer.wait();

        let log = log.borrow();
        assert_eq!(log.queued.len(), 1);
        assert_eq!(log.queued[0].dc, DcLevel::Data);
        assert_eq!(log.queued[0].bit_length, 100 * 16);
        assert_eq!(log.sent[0], bytes_of(&px));
    }

    #[test]
    fn fill_before_init_is_silent() {
        let host = MockHost::default();
        let log = host.log.clone();
        let mut engine = DmaEngine::new(host, &panel());
        let px = image(4);
        engine.submit_fill(&px).unwrap().wait();
        assert!(log.borrow().queued.is_empty());
    }

    #[test]
    fn oversized_fill_rejected() {
        let (mut engine, log) = make_engine();
        let px = vec![0u16; MAX_FILL_PIXELS + 1];
        assert!(matches!(
            engine.submit_fill(&px),
            Err(DmaError::TransferTooLarge {
                pixels: 32_768,
                max: 32_767
            })
        ));
        assert!(log.borrow().queued.is_empty());
    }

    #[test]
    fn largest_fill_accepted() {
        let (mut engine, log) = make_engine();
        let px = vec![0u16; MAX_FILL_PIXELS];
        engine.submit_fill(&px).unwrap().wait();
        assert_eq!(log.borrow().sent[0].len(), MAX_FILL_PIXELS * 2);
    }
}

// ============================================================================
// submit_window
// ============================================================================

mod window_tests {
    use super::*;

    #[test]
    fn window_queues_six_ordered_transactions() {
        let (mut engine, log) = make_engine();
        let img = image(12);
        let mut staging = vec![0u16; 12];
        engine
            .submit_window(WindowRect::new(2, 3, 4, 3), &img, &mut staging, false)
            .unwrap()
            .wait();

        let log = log.borrow();
        let shape: Vec<(TransactionId, DcLevel)> =
            log.queued.iter().map(|r| (r.id, r.dc)).collect();
        assert_eq!(
            shape,
            vec![
                (0, DcLevel::Command),
                (1, DcLevel::Data),
                (2, DcLevel::Command),
                (3, DcLevel::Data),
                (4, DcLevel::Command),
                (5, DcLevel::Data),
            ]
        );
        assert_eq!(
            log.sent,
            vec![
                vec![0x2A],
                vec![0, 2, 0, 5],
                vec![0x2B],
                vec![0, 3, 0, 5],
                vec![0x2C],
                bytes_of(&img),
            ]
        );
        assert_eq!(log.queued[5].bit_length, 4 * 3 * 16);
    }

    #[test]
    fn negative_x_clips_and_offsets_source() {
        let (mut engine, log) = make_engine();
        let img = image(20 * 10);
        let mut staging = vec![0u16; 200];
        engine
            .submit_window(WindowRect::new(-5, 0, 20, 10), &img, &mut staging, false)
            .unwrap()
            .wait();

        let log = log.borrow();
        assert_eq!(log.sent[1], vec![0, 0, 0, 14]);
        assert_eq!(log.sent[3], vec![0, 0, 0, 9]);

        let expected: Vec<u16> = (0..10)
            .flat_map(|row| img[row * 20 + 5..row * 20 + 20].iter().copied())
            .collect();
        assert_eq!(expected.len(), 150);
        assert_eq!(log.sent[5], bytes_of(&expected));
        assert_eq!(&staging[..150], &expected[..]);
    }

    #[test]
    fn bottom_right_overhang_clips_rows_and_columns() {
        let (mut engine, log) = make_engine();
        let img = image(8 * 8);
        let mut staging = vec![0u16; 64];
        engine
            .submit_window(WindowRect::new(12, 10, 8, 8), &img, &mut staging, false)
            .unwrap()
            .wait();

        let log = log.borrow();
        assert_eq!(log.sent[1], vec![0, 12, 0, 15]);
        assert_eq!(log.sent[3], vec![0, 10, 0, 15]);
        let expected: Vec<u16> = (0..6)
            .flat_map(|row| img[row * 8..row * 8 + 4].iter().copied())
            .collect();
        assert_eq!(log.sent[5], bytes_of(&expected));
    }

    #[test]
    fn swap_applies_to_staging_not_source() {
        let (mut engine, log) = make_engine();
        let img = image(9);
        let original = img.clone();
        let mut staging = vec![0u16; 9];
        engine
            .submit_window(WindowRect::new(0, 0, 3, 3), &img, &mut staging, true)
            .unwrap()
            .wait();

        let swapped: Vec<u16> = original.iter().map(|p| p.swap_bytes()).collect();
        assert_eq!(log.borrow().sent[5], bytes_of(&swapped));
        assert_eq!(img, original);
    }

    #[test]
    fn off_screen_windows_queue_nothing() {
        let (mut engine, log) = make_engine();
        let img = image(64);
        let mut staging = vec![0u16; 64];
        for rect in [
            WindowRect::new(16, 0, 8, 8),
            WindowRect::new(0, 16, 8, 8),
            WindowRect::new(-8, 0, 8, 8),
            WindowRect::new(0, -8, 8, 8),
            WindowRect::new(-100, -100, 8, 8),
            WindowRect::new(4, 4, 0, 8),
        ] {
            let transfer = engine.submit_window(rect, &img, &mut staging, false).unwrap();
            assert_eq!(transfer.pending(), 0);
        }
        assert!(log.borrow().queued.is_empty());
    }

    #[test]
    fn window_before_init_is_silent() {
        let host = MockHost::default();
        let log = host.log.clone();
        let mut engine = DmaEngine::new(host, &panel());
        let img = image(4);
        let mut staging = vec![0u16; 4];
        engine
            .submit_window(WindowRect::new(0, 0, 2, 2), &img, &mut staging, false)
            .unwrap()
            .wait();
        assert!(log.borrow().queued.is_empty());
    }

    #[test]
    fn short_buffers_rejected_before_queueing() {
        let (mut engine, log) = make_engine();
        let img = image(16);
        let mut small = vec![0u16; 15];
        assert!(matches!(
            engine.submit_window(WindowRect::new(0, 0, 4, 4), &img, &mut small, false),
            Err(DmaError::StagingTooSmall { needed: 16, len: 15 })
        ));
        let mut staging = vec![0u16; 16];
        assert!(matches!(
            engine.submit_window(WindowRect::new(0, 0, 4, 4), &img[..10], &mut staging, false),
            Err(DmaError::ImageTooSmall { needed: 16, len: 10 })
        ));
        assert!(log.borrow().queued.is_empty());
    }

    #[test]
    fn oversized_window_rejected() {
        let mut engine = DmaEngine::new(MockHost::default(), &Config::default().with_size(320, 320));
        engine.init();
        let mut staging: [u16; 0] = [];
        assert!(matches!(
            engine.submit_window(WindowRect::new(0, 0, 300, 300), &[], &mut staging, false),
            Err(DmaError::TransferTooLarge {
                pixels: 90_000,
                max: MAX_WINDOW_PIXELS
            })
        ));
    }

    #[test]
    fn new_submission_drains_a_leaked_transfer_first() {
        let (mut engine, log) = make_engine();
        let img = image(16);
        let mut staging = vec![0u16; 16];
        std::mem::forget(
            engine
                .submit_window(WindowRect::new(0, 0, 4, 4), &img, &mut staging, false)
                .unwrap(),
        );
        let transfer = engine.submit_fill(&img).unwrap();
        assert_eq!(transfer.pending(), 1);

        let events = log.borrow().events.clone();
        let second = events.iter().position(|e| *e == Event::Queue(6)).unwrap();
        let completed: Vec<TransactionId> = events[..second]
            .iter()
            .filter_map(|e| match e {
                Event::Complete(id) => Some(*id),
                _ => None,
            })
            .collect();
        assert_eq!(completed, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn wait_collects_completions_in_fifo_order() {
        let (mut engine, log) = make_engine();
        let img = image(16);
        let mut staging = vec![0u16; 16];
        engine
            .submit_window(WindowRect::new(0, 0, 4, 4), &img, &mut staging, false)
            .unwrap()
            .wait();

        assert_eq!(completions(&log), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(engine.pending(), 0);
        assert_eq!(engine.state(), DmaState::Idle);
    }

    #[test]
    #[should_panic(expected = "out of order")]
    fn out_of_order_completion_is_fatal() {
        let (mut engine, _log) = make_engine();
        engine.host_mut().out_of_order = true;
        let img = image(16);
        let mut staging = vec![0u16; 16];
        engine
            .submit_window(WindowRect::new(0, 0, 4, 4), &img, &mut staging, false)
            .unwrap()
            .wait();
    }
}

// ============================================================================
// submit_window_in_place
// ============================================================================

mod in_place_tests {
    use super::*;

    #[test]
    fn unclipped_unswapped_sends_image_as_is() {
        let (mut engine, log) = make_engine();
        let mut img = image(12);
        let original = img.clone();
        engine
            .submit_window_in_place(WindowRect::new(0, 0, 4, 3), &mut img, false)
            .unwrap()
            .wait();

        assert_eq!(img, original);
        assert_eq!(log.borrow().sent[5], bytes_of(&original));
    }

    #[test]
    fn clipped_rows_are_compacted_in_place() {
        let (mut engine, log) = make_engine();
        let mut img = image(200);
        let original = img.clone();
        engine
            .submit_window_in_place(WindowRect::new(-5, 0, 20, 10), &mut img, false)
            .unwrap()
            .wait();

        let expected: Vec<u16> = (0..10)
            .flat_map(|row| original[row * 20 + 5..row * 20 + 20].iter().copied())
            .collect();
        assert_eq!(&img[..150], &expected[..]);
        assert_eq!(log.borrow().sent[5], bytes_of(&expected));
    }

    #[test]
    fn clipped_and_swapped() {
        let (mut engine, log) = make_engine();
        let mut img = image(8 * 8);
        let original = img.clone();
        engine
            .submit_window_in_place(WindowRect::new(0, -3, 8, 8), &mut img, true)
            .unwrap()
            .wait();

        let expected: Vec<u16> = original[3 * 8..].iter().map(|p| p.swap_bytes()).collect();
        assert_eq!(&img[..40], &expected[..]);
        let log = log.borrow();
        assert_eq!(log.sent[3], vec![0, 0, 0, 4]);
        assert_eq!(log.sent[5], bytes_of(&expected));
    }
}
