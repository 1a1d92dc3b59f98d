//! The boundary between the router and the USB MIDI class driver.

use core::fmt;

/// A USB MIDI virtual cable number.  The USB-MIDI 1.0 packet header has room
/// for 16 cables; only the first [crate::NUM_PORT_PAIRS] are routable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CableId(u8);

impl CableId {
    /// The highest cable number representable in a USB-MIDI event packet
    pub const MAX: CableId = CableId(15);

    /// Create a cable id.  Values above 15 are masked to the low nibble, the
    /// same as they would be in a packet header.
    pub const fn new(id: u8) -> Self {
        Self(id & 0x0F)
    }
    /// The raw cable number
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl From<CableId> for u8 {
    fn from(value: CableId) -> Self {
        value.0
    }
}

impl fmt::Display for CableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The USB side of the bridge.
///
/// Implementations convert between raw MIDI byte streams and whatever the
/// wire format is (USB-MIDI event packets for a real device).  None of these
/// calls may block.
pub trait MidiTransport {
    /// True if a host session is established and the MIDI endpoints are
    /// usable
    fn is_connected(&self) -> bool;
    /// Queue `bytes` for transmission to the host on `cable`.  Returns how
    /// many bytes were accepted, which may be fewer than offered (including
    /// zero) if the transport is out of room.
    fn stream_write(&mut self, cable: CableId, bytes: &[u8]) -> usize;
    /// Read the next run of bytes received from the host for a single cable
    /// into `buf`.  Returns `None` once nothing is pending.
    fn demux_read(&mut self, buf: &mut [u8]) -> Option<(CableId, usize)>;
}

impl<T: MidiTransport + ?Sized> MidiTransport for &mut T {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
    fn stream_write(&mut self, cable: CableId, bytes: &[u8]) -> usize {
        (**self).stream_write(cable, bytes)
    }
    fn demux_read(&mut self, buf: &mut [u8]) -> Option<(CableId, usize)> {
        (**self).demux_read(buf)
    }
}
