//! Diagnostics raised by the router.
//!
//! Nothing that goes wrong while routing is fatal, but all of it is worth
//! knowing about: a drop means a destination couldn't keep up, and a frame on
//! an unknown cable means the host is confused about what this device is.
//! Each such event is handed to a [DiagnosticSink] as it happens and also
//! accumulated in [Stats].

use core::fmt;

use crate::port::PortIndex;
use crate::transport::CableId;

/// Which way bytes were moving
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// From a MIDI IN connector toward the USB host
    UartToUsb,
    /// From the USB host toward a MIDI OUT connector
    UsbToUart,
}

/// A single reportable event from the data path
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    /// A destination accepted fewer bytes than were offered.  The difference
    /// is gone for good.
    Dropped {
        /// The physical port the bytes came from or were headed to
        port: PortIndex,
        /// Which way they were going
        direction: Direction,
        /// Bytes offered to the destination
        offered: usize,
        /// Bytes the destination took
        accepted: usize,
    },
    /// The host sent data on a cable with no physical port behind it.  The
    /// frame was discarded.
    UnroutableCable {
        /// The cable number from the packet header
        cable: CableId,
        /// Number of bytes in the discarded frame
        len: usize,
    },
}

impl Diagnostic {
    /// Number of bytes lost to this event
    pub const fn lost(&self) -> usize {
        match *self {
            Self::Dropped {
                offered, accepted, ..
            } => offered.saturating_sub(accepted),
            Self::UnroutableCable { len, .. } => len,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Dropped {
                port,
                direction: Direction::UartToUsb,
                ..
            } => write!(
                f,
                "Dropped {} bytes receiving from UART MIDI In {}",
                self.lost(),
                port
            ),
            Self::Dropped {
                port,
                direction: Direction::UsbToUart,
                ..
            } => write!(
                f,
                "Dropped {} bytes sending to MIDI Out Port {}",
                self.lost(),
                port
            ),
            Self::UnroutableCable { cable, .. } => {
                write!(f, "Received a MIDI packet on cable {}", cable)
            }
        }
    }
}

/// Receives diagnostics from the router as they happen
pub trait DiagnosticSink {
    /// Handle one diagnostic.  Must not block.
    fn report(&mut self, diag: Diagnostic);
}

impl<F: FnMut(Diagnostic)> DiagnosticSink for F {
    fn report(&mut self, diag: Diagnostic) {
        self(diag)
    }
}

/// A [DiagnosticSink] that forwards everything to the `log` facade
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&mut self, diag: Diagnostic) {
        log::warn!("{}", diag);
    }
}

/// Running counters for one physical port.  All counters saturate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PortStats {
    /// Bytes handed to the USB transport and accepted by it
    pub to_usb: u32,
    /// Bytes written into the port's transmit buffer
    pub to_uart: u32,
    /// Bytes lost because the USB transport was full
    pub dropped_to_usb: u32,
    /// Bytes lost because the transmit buffer was full
    pub dropped_to_uart: u32,
    /// Number of short writes toward USB
    pub drop_events_to_usb: u32,
    /// Number of short writes toward the transmit buffer
    pub drop_events_to_uart: u32,
    /// Bytes received while no host was connected, thrown away
    pub discarded: u32,
}

/// Counters for the whole bridge
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stats<const N: usize> {
    ports: [PortStats; N],
    /// Number of frames received on cables with no physical port
    pub unroutable_frames: u32,
    /// Total bytes in those frames
    pub unroutable_bytes: u32,
}

impl<const N: usize> Default for Stats<N> {
    fn default() -> Self {
        Self {
            ports: [PortStats::default(); N],
            unroutable_frames: 0,
            unroutable_bytes: 0,
        }
    }
}

fn add(counter: &mut u32, n: usize) {
    *counter = counter.saturating_add(u32::try_from(n).unwrap_or(u32::MAX));
}

impl<const N: usize> Stats<N> {
    /// Counters for a single port
    pub fn port(&self, port: PortIndex) -> Option<&PortStats> {
        self.ports.get(port.get())
    }
    /// Total bytes dropped in either direction on every port
    pub fn total_dropped(&self) -> u32 {
        self.ports.iter().fold(0u32, |acc, p| {
            acc.saturating_add(p.dropped_to_usb)
                .saturating_add(p.dropped_to_uart)
        })
    }
    pub(crate) fn record_transfer(
        &mut self,
        port: PortIndex,
        direction: Direction,
        offered: usize,
        accepted: usize,
    ) {
        let Some(p) = self.ports.get_mut(port.get()) else {
            return;
        };
        let lost = offered.saturating_sub(accepted);
        match direction {
            Direction::UartToUsb => {
                add(&mut p.to_usb, accepted);
                if lost > 0 {
                    add(&mut p.dropped_to_usb, lost);
                    add(&mut p.drop_events_to_usb, 1);
                }
            }
            Direction::UsbToUart => {
                add(&mut p.to_uart, accepted);
                if lost > 0 {
                    add(&mut p.dropped_to_uart, lost);
                    add(&mut p.drop_events_to_uart, 1);
                }
            }
        }
    }
    pub(crate) fn record_discard(&mut self, port: PortIndex, count: usize) {
        if let Some(p) = self.ports.get_mut(port.get()) {
            add(&mut p.discarded, count);
        }
    }
    pub(crate) fn record_unroutable(&mut self, len: usize) {
        add(&mut self.unroutable_frames, 1);
        add(&mut self.unroutable_bytes, len);
    }
}
