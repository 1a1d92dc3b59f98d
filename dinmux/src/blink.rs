/// Status LED scheduler.
///
/// The toggle schedule advances by whole intervals from the last scheduled
/// toggle rather than from the time it was noticed, so a late poll doesn't
/// stretch the cadence.  All arithmetic wraps, and the millisecond clock may
/// roll over freely.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlinkTask {
    start_ms: u32,
    led: bool,
}

impl BlinkTask {
    /// Create a task with the LED off and the schedule starting at zero
    pub const fn new() -> Self {
        Self {
            start_ms: 0,
            led: false,
        }
    }
    /// Check the schedule.  Returns the new LED level if it is time to toggle.
    pub fn poll(&mut self, now_ms: u32, interval_ms: u32) -> Option<bool> {
        if now_ms.wrapping_sub(self.start_ms) < interval_ms {
            return None;
        }
        self.start_ms = self.start_ms.wrapping_add(interval_ms);
        self.led = !self.led;
        Some(self.led)
    }
    /// The LED level last returned by [BlinkTask::poll]
    pub const fn led(&self) -> bool {
        self.led
    }
}
