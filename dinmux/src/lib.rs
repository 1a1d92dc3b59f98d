//! This crate contains the routing logic for a multi-port DIN MIDI to USB MIDI
//! bridge.  Each physical MIDI IN/OUT pair is exposed to the USB host as its
//! own virtual cable, and the [router::Router] moves bytes between the two
//! sides once per pass of the firmware's cooperative main loop.
//!
//! The crate is `no_std` and knows nothing about the actual hardware.  The
//! physical ports are reached through the [port::PortBuffer] trait and the
//! USB MIDI class through the [transport::MidiTransport] trait, so all of the
//! routing behavior can be exercised on the host.  The board-specific
//! implementations live in the `dinmux_2040` firmware crate.
//!
//! The engine is byte-transparent: it never parses MIDI messages.  The one
//! place MIDI structure matters is the conversion between byte streams and
//! USB-MIDI event packets, which lives in [packet] and [stream] for use by
//! transport implementations.
//!
//! Nothing in the data path is fatal.  When a destination cannot keep up, the
//! excess is dropped and reported as a [diag::Diagnostic] - MIDI on a DIN
//! cable has no flow control, so the bridge doesn't pretend to have any either.

#![no_std]
#![warn(missing_docs)]

pub mod config;
pub mod diag;
pub mod packet;
pub mod port;
pub mod router;
pub mod serial;
pub mod state;
pub mod stream;
pub mod transport;

mod blink;
mod bridge;
mod error;

#[cfg(test)]
mod mock;

pub use blink::BlinkTask;
pub use bridge::Bridge;
pub use config::{CHUNK_SIZE, NUM_PORT_PAIRS};
pub use diag::{Diagnostic, DiagnosticSink, Direction, LogSink, Stats};
pub use error::Error;
pub use port::{PortBuffer, PortIndex, Ports};
pub use router::Router;
pub use state::{BusStatus, ConnectionState, ConnectionTracker, LifecycleMonitor, UsbEvent};
pub use transport::{CableId, MidiTransport};

