//! `log` backend for the firmware.
//!
//! Records are formatted into a RAM ring and written out to the debug UART
//! by [drain] from the main loop, so a log call never waits on the serial
//! port.  When the ring is full, new output is dropped.

use core::cell::RefCell;
use core::fmt::Write;

use critical_section::Mutex;
use heapless::{Deque, String};

const RING_SIZE: usize = 1024;
const LINE_SIZE: usize = 128;

static RING: Mutex<RefCell<Deque<u8, RING_SIZE>>> = Mutex::new(RefCell::new(Deque::new()));
static LOGGER: RingLogger = RingLogger;

struct RingLogger;

impl log::Log for RingLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut line = String::<LINE_SIZE>::new();
        // long lines are cut off
        let _ = write!(line, "[{:<5}] {}", record.level(), record.args());
        critical_section::with(|cs| {
            let mut ring = RING.borrow_ref_mut(cs);
            for byte in line.bytes().chain(*b"\r\n") {
                if ring.push_back(byte).is_err() {
                    break;
                }
            }
        });
    }

    fn flush(&self) {}
}

/// Install the logger.  Must be called once, before anything logs.
pub fn init(level: log::LevelFilter) {
    // SAFETY: single core, called from the top of main before any other
    // code could be logging
    unsafe {
        let _ = log::set_logger_racy(&LOGGER);
        log::set_max_level_racy(level);
    }
}

/// Hand buffered output to `write`, which returns how many bytes it took.
/// Stops as soon as `write` takes nothing.
pub fn drain(mut write: impl FnMut(&[u8]) -> usize) {
    critical_section::with(|cs| {
        let mut ring = RING.borrow_ref_mut(cs);
        loop {
            let n = match ring.as_slices() {
                ([], _) => break,
                (front, _) => write(front),
            };
            if n == 0 {
                break;
            }
            for _ in 0..n {
                ring.pop_front();
            }
        }
    });
}
