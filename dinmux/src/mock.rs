//! Test doubles for the port and transport boundaries

#![allow(dead_code)]

extern crate std;

use std::collections::VecDeque;
use std::vec::Vec;

use crate::diag::Diagnostic;
use crate::port::PortBuffer;
use crate::transport::{CableId, MidiTransport};

/// A port whose receive side is fed by the test and whose transmit side
/// records everything written, up to an optional capacity
#[derive(Default, Debug)]
pub struct MockPort {
    pub rx: VecDeque<u8>,
    pub tx: Vec<u8>,
    /// Bytes the transmit buffer can still take.  `None` is unlimited.
    pub tx_room: Option<usize>,
    /// Largest `buf.len()` ever passed to `poll_receive`
    pub max_poll: usize,
    pub polls: usize,
    pub writes: usize,
    pub drains: usize,
}

impl MockPort {
    pub fn with_rx(bytes: &[u8]) -> Self {
        Self {
            rx: bytes.iter().copied().collect(),
            ..Default::default()
        }
    }
}

impl PortBuffer for MockPort {
    fn poll_receive(&mut self, buf: &mut [u8]) -> usize {
        self.polls += 1;
        self.max_poll = self.max_poll.max(buf.len());
        let n = buf.len().min(self.rx.len());
        for (dst, src) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *dst = src;
        }
        n
    }
    fn write_transmit(&mut self, bytes: &[u8]) -> usize {
        self.writes += 1;
        let n = match self.tx_room.as_mut() {
            Some(room) => {
                let n = bytes.len().min(*room);
                *room -= n;
                n
            }
            None => bytes.len(),
        };
        self.tx.extend_from_slice(&bytes[..n]);
        n
    }
    fn drain_transmit(&mut self) {
        self.drains += 1;
    }
}

/// A transport with a scripted inbound frame queue and a recorded outbound
/// history
#[derive(Default, Debug)]
pub struct MockTransport {
    pub connected: bool,
    pub inbound: VecDeque<(CableId, Vec<u8>)>,
    /// Every accepted write, in order
    pub sent: Vec<(CableId, Vec<u8>)>,
    /// Bytes the transport can still take.  `None` is unlimited.
    pub room: Option<usize>,
    pub demux_reads: usize,
}

impl MockTransport {
    pub fn connected() -> Self {
        Self {
            connected: true,
            ..Default::default()
        }
    }
    pub fn push_inbound(&mut self, cable: u8, bytes: &[u8]) {
        self.inbound.push_back((CableId::new(cable), bytes.to_vec()));
    }
    /// All bytes sent on one cable, concatenated
    pub fn sent_on(&self, cable: u8) -> Vec<u8> {
        self.sent
            .iter()
            .filter(|(c, _)| c.get() == cable)
            .flat_map(|(_, b)| b.iter().copied())
            .collect()
    }
}

impl MidiTransport for MockTransport {
    fn is_connected(&self) -> bool {
        self.connected
    }
    fn stream_write(&mut self, cable: CableId, bytes: &[u8]) -> usize {
        let n = match self.room.as_mut() {
            Some(room) => {
                let n = bytes.len().min(*room);
                *room -= n;
                n
            }
            None => bytes.len(),
        };
        if n > 0 {
            self.sent.push((cable, bytes[..n].to_vec()));
        }
        n
    }
    fn demux_read(&mut self, buf: &mut [u8]) -> Option<(CableId, usize)> {
        self.demux_reads += 1;
        let (cable, mut bytes) = self.inbound.pop_front()?;
        if bytes.len() > buf.len() {
            // hand out what fits and leave the rest at the front
            let rest = bytes.split_off(buf.len());
            self.inbound.push_front((cable, rest));
        }
        buf[..bytes.len()].copy_from_slice(&bytes);
        Some((cable, bytes.len()))
    }
}

/// Collects diagnostics
#[derive(Default, Debug)]
pub struct RecordingSink(pub Vec<Diagnostic>);

impl crate::diag::DiagnosticSink for RecordingSink {
    fn report(&mut self, diag: Diagnostic) {
        self.0.push(diag);
    }
}
