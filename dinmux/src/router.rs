//! The routing engine.
//!
//! Once per pass of the main loop, [Router::run_cycle] does three things, in
//! this order:
//!
//! 1. For each port in ascending order, pull up to [CHUNK_SIZE] received
//!    bytes and write them to the same-numbered USB cable.
//! 2. Read every pending frame from the USB side and write each one into the
//!    transmit buffer of the port its cable maps to.
//! 3. Let every port push its transmit buffer toward the wire.
//!
//! No step ever waits.  If the destination takes fewer bytes than it was
//! offered, the rest are dropped and a [Diagnostic] is raised.  Received
//! bytes are never put back: leaving them in a UART buffer that is already
//! struggling to keep up would just overflow the hardware instead.

use crate::config::CHUNK_SIZE;
use crate::diag::{Diagnostic, DiagnosticSink, Direction, Stats};
use crate::port::{PortBuffer, PortIndex, Ports};
use crate::state::ConnectionState;
use crate::transport::MidiTransport;

/// Moves bytes between the physical ports and the USB transport.  Owns the
/// ports for the life of the program.
pub struct Router<P, const N: usize> {
    ports: Ports<P, N>,
    stats: Stats<N>,
}

impl<P: PortBuffer, const N: usize> Router<P, N> {
    /// Create a router that owns `ports`
    pub fn new(ports: Ports<P, N>) -> Self {
        Self {
            ports,
            stats: Stats::default(),
        }
    }

    /// Run one full forwarding cycle.  The transport only counts as
    /// connected if it says so itself and `state` is not
    /// [ConnectionState::Unmounted]; this is sampled once for the whole
    /// cycle.
    pub fn run_cycle<T, S>(&mut self, transport: &mut T, state: ConnectionState, sink: &mut S)
    where
        T: MidiTransport,
        S: DiagnosticSink,
    {
        let connected = state.is_attached() && transport.is_connected();
        self.uart_to_usb(transport, connected, sink);
        self.usb_to_uart(transport, connected, sink);
        self.drain_transmit();
    }

    /// Forward whatever each port has received to its USB cable.  When not
    /// `connected`, the received bytes are still pulled from the ports but
    /// thrown away, so nothing piles up while the host is gone.
    pub fn uart_to_usb<T, S>(&mut self, transport: &mut T, connected: bool, sink: &mut S)
    where
        T: MidiTransport,
        S: DiagnosticSink,
    {
        let mut rx = [0u8; CHUNK_SIZE];
        for (index, port) in self.ports.iter_mut() {
            let Some(port) = port else {
                continue;
            };
            let nread = port.poll_receive(&mut rx).min(CHUNK_SIZE);
            if nread == 0 {
                continue;
            }
            if !connected {
                log::trace!("Discarding {} bytes from MIDI In {}", nread, index);
                self.stats.record_discard(index, nread);
                continue;
            }
            let nwritten = transport
                .stream_write(index.cable(), &rx[..nread])
                .min(nread);
            Self::account(
                &mut self.stats,
                sink,
                index,
                Direction::UartToUsb,
                nread,
                nwritten,
            );
        }
    }

    /// Drain every frame the transport has received and write each into the
    /// matching port's transmit buffer.  Does nothing when not `connected`.
    pub fn usb_to_uart<T, S>(&mut self, transport: &mut T, connected: bool, sink: &mut S)
    where
        T: MidiTransport,
        S: DiagnosticSink,
    {
        if !connected {
            return;
        }
        let mut rx = [0u8; CHUNK_SIZE];
        while let Some((cable, len)) = transport.demux_read(&mut rx) {
            let len = len.min(CHUNK_SIZE);
            if len == 0 {
                break;
            }
            let Some(index) = self.ports.route(cable) else {
                self.stats.record_unroutable(len);
                sink.report(Diagnostic::UnroutableCable { cable, len });
                continue;
            };
            let npushed = match self.ports.get_mut(index) {
                Some(port) => port.write_transmit(&rx[..len]).min(len),
                // disabled at startup
                None => 0,
            };
            Self::account(
                &mut self.stats,
                sink,
                index,
                Direction::UsbToUart,
                len,
                npushed,
            );
        }
    }

    /// Give every port a chance to move buffered bytes onto the wire.  Runs
    /// whether or not anything new arrived.
    pub fn drain_transmit(&mut self) {
        for (_, port) in self.ports.iter_mut() {
            if let Some(port) = port {
                port.drain_transmit();
            }
        }
    }

    fn account<S: DiagnosticSink>(
        stats: &mut Stats<N>,
        sink: &mut S,
        port: PortIndex,
        direction: Direction,
        offered: usize,
        accepted: usize,
    ) {
        stats.record_transfer(port, direction, offered, accepted);
        if accepted < offered {
            sink.report(Diagnostic::Dropped {
                port,
                direction,
                offered,
                accepted,
            });
        }
    }
}

impl<P, const N: usize> Router<P, N> {
    /// Running counters since startup
    pub fn stats(&self) -> &Stats<N> {
        &self.stats
    }
    /// The ports this router owns
    pub fn ports(&self) -> &Ports<P, N> {
        &self.ports
    }
    /// The ports this router owns
    pub fn ports_mut(&mut self) -> &mut Ports<P, N> {
        &mut self.ports
    }
}
