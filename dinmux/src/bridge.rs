use crate::blink::BlinkTask;
use crate::diag::DiagnosticSink;
use crate::port::{PortBuffer, Ports};
use crate::router::Router;
use crate::state::{ConnectionState, ConnectionTracker, UsbEvent};
use crate::transport::MidiTransport;

/// Everything the main loop drives, in one place: the [Router], the
/// [ConnectionTracker] fed by the USB event path, and the status LED
/// schedule.
pub struct Bridge<P, const N: usize> {
    router: Router<P, N>,
    tracker: ConnectionTracker,
    blink: BlinkTask,
}

impl<P: PortBuffer, const N: usize> Bridge<P, N> {
    /// Create a bridge over `ports`, starting out unmounted
    pub fn new(ports: Ports<P, N>) -> Self {
        Self {
            router: Router::new(ports),
            tracker: ConnectionTracker::new(),
            blink: BlinkTask::new(),
        }
    }

    /// Apply a USB lifecycle event
    pub fn handle_event(&mut self, event: UsbEvent) {
        self.tracker.handle(event);
    }

    /// One pass of the main loop: a routing cycle, then the status update.
    /// Returns the level the status LED should be set to, if it changed.
    pub fn poll<T, S>(&mut self, transport: &mut T, sink: &mut S, now_ms: u32) -> Option<bool>
    where
        T: MidiTransport,
        S: DiagnosticSink,
    {
        let state = self.tracker.state();
        self.router.run_cycle(transport, state, sink);
        self.blink.poll(now_ms, state.blink_interval_ms())
    }
}

impl<P, const N: usize> Bridge<P, N> {
    /// The current connection state
    pub fn state(&self) -> ConnectionState {
        self.tracker.state()
    }
    /// The routing engine
    pub fn router(&self) -> &Router<P, N> {
        &self.router
    }
    /// The routing engine, mutably
    pub fn router_mut(&mut self) -> &mut Router<P, N> {
        &mut self.router
    }
}
