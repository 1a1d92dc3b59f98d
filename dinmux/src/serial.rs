//! Software buffering for a serial MIDI port.
//!
//! Hardware FIFOs on a small microcontroller are only a few bytes deep, far
//! less than a routing pass can be late by.  [SerialRings] sits between a
//! driver's FIFOs and the [crate::PortBuffer] interface and holds the
//! difference.  The FIFOs themselves are reached through closures, so the
//! same code serves any UART or PIO driver.

use heapless::Deque;

/// Outcome of [SerialRings::receive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Received {
    /// Bytes copied into the caller's buffer
    pub len: usize,
    /// Bytes pulled from the FIFO that didn't fit in the ring and are gone
    pub lost: usize,
}

/// Receive and transmit rings for one port
pub struct SerialRings<const RX: usize, const TX: usize> {
    rx: Deque<u8, RX>,
    tx: Deque<u8, TX>,
    overruns: u32,
}

impl<const RX: usize, const TX: usize> Default for SerialRings<RX, TX> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const RX: usize, const TX: usize> SerialRings<RX, TX> {
    /// Create empty rings
    pub const fn new() -> Self {
        Self {
            rx: Deque::new(),
            tx: Deque::new(),
            overruns: 0,
        }
    }

    fn pop_into(&mut self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        for slot in buf.iter_mut() {
            let Some(byte) = self.rx.pop_front() else {
                break;
            };
            *slot = byte;
            n += 1;
        }
        n
    }

    /// Fill `buf` from the receive ring, emptying the hardware FIFO through
    /// `fifo` on the way.  The ring is drained into `buf` before the FIFO is
    /// read, so a full ring only loses bytes if `buf` can't make room.
    pub fn receive(&mut self, buf: &mut [u8], mut fifo: impl FnMut() -> Option<u8>) -> Received {
        let mut len = self.pop_into(buf);
        let mut lost = 0;
        while let Some(byte) = fifo() {
            if self.rx.push_back(byte).is_err() {
                lost += 1;
            }
        }
        len += self.pop_into(&mut buf[len..]);
        if lost > 0 {
            self.overruns = self
                .overruns
                .saturating_add(u32::try_from(lost).unwrap_or(u32::MAX));
        }
        Received { len, lost }
    }

    /// Append to the transmit ring.  Returns how many bytes fit.
    pub fn queue(&mut self, bytes: &[u8]) -> usize {
        let mut n = 0;
        for &byte in bytes {
            if self.tx.push_back(byte).is_err() {
                break;
            }
            n += 1;
        }
        n
    }

    /// Feed the transmit ring to the hardware FIFO through `fifo`, which
    /// returns false once the FIFO is full
    pub fn transmit(&mut self, mut fifo: impl FnMut(u8) -> bool) {
        while let Some(&byte) = self.tx.front() {
            if !fifo(byte) {
                break;
            }
            self.tx.pop_front();
        }
    }

    /// Total bytes lost to receive overruns since startup
    pub const fn overruns(&self) -> u32 {
        self.overruns
    }

    /// Bytes waiting to be transmitted
    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::collections::VecDeque;
    use std::vec::Vec;

    use super::*;

    fn fifo(bytes: &[u8]) -> VecDeque<u8> {
        bytes.iter().copied().collect()
    }

    #[test]
    fn full_ring_is_drained_before_the_fifo_is_read() {
        let mut rings = SerialRings::<8, 8>::new();
        let mut hw = fifo(&[0, 1, 2, 3, 4, 5, 6, 7]);
        let mut buf = [0u8; 0];
        // nowhere to put anything yet, so the ring fills up
        assert_eq!(rings.receive(&mut buf, || hw.pop_front()).len, 0);
        let mut hw = fifo(&[8, 9, 10]);
        let mut buf = [0u8; 48];
        let got = rings.receive(&mut buf, || hw.pop_front());
        assert_eq!(got, Received { len: 11, lost: 0 });
        assert_eq!(&buf[..11], &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(rings.overruns(), 0);
    }

    #[test]
    fn overrun_is_reported_once_per_receive() {
        let mut rings = SerialRings::<4, 4>::new();
        let mut hw = fifo(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let mut buf = [0u8; 2];
        let got = rings.receive(&mut buf, || hw.pop_front());
        assert_eq!(got, Received { len: 2, lost: 6 });
        assert_eq!(buf, [1, 2]);
        assert_eq!(rings.overruns(), 6);
        assert!(hw.is_empty());
        // the survivors are still in order
        let mut buf = [0u8; 4];
        let got = rings.receive(&mut buf, || None);
        assert_eq!(got, Received { len: 2, lost: 0 });
        assert_eq!(&buf[..2], &[3, 4]);
    }

    #[test]
    fn queue_takes_only_what_fits() {
        let mut rings = SerialRings::<4, 4>::new();
        assert_eq!(rings.queue(&[1, 2, 3, 4, 5, 6]), 4);
        assert_eq!(rings.queue(&[7]), 0);
        assert_eq!(rings.pending(), 4);
    }

    #[test]
    fn transmit_stops_when_fifo_is_full() {
        let mut rings = SerialRings::<4, 8>::new();
        rings.queue(&[1, 2, 3, 4, 5]);
        let mut sent = Vec::new();
        rings.transmit(|b| {
            if sent.len() == 3 {
                return false;
            }
            sent.push(b);
            true
        });
        assert_eq!(sent, [1, 2, 3]);
        assert_eq!(rings.pending(), 2);
        rings.transmit(|b| {
            sent.push(b);
            true
        });
        assert_eq!(sent, [1, 2, 3, 4, 5]);
        assert_eq!(rings.pending(), 0);
    }
}
