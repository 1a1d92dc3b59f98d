//! USB-MIDI 1.0 event packets.
//!
//! On the wire, USB MIDI carries 32-bit packets: one header byte holding the
//! cable number (high nibble) and a code index number (low nibble), followed
//! by up to three bytes of MIDI data.  The code index number says how many of
//! those three bytes are meaningful.

use crate::transport::CableId;

/// Size of one event packet on the wire
pub const PACKET_SIZE: usize = 4;

/// Code index numbers from the USB-MIDI 1.0 specification, table 4-1
#[allow(missing_docs)]
pub mod cin {
    pub const MISC: u8 = 0x0;
    pub const CABLE_EVENT: u8 = 0x1;
    pub const SYSCOM_2BYTE: u8 = 0x2;
    pub const SYSCOM_3BYTE: u8 = 0x3;
    pub const SYSEX_START: u8 = 0x4;
    /// Also used for single-byte system common messages
    pub const SYSEX_END_1BYTE: u8 = 0x5;
    pub const SYSEX_END_2BYTE: u8 = 0x6;
    pub const SYSEX_END_3BYTE: u8 = 0x7;
    pub const NOTE_OFF: u8 = 0x8;
    pub const NOTE_ON: u8 = 0x9;
    pub const POLY_KEYPRESS: u8 = 0xA;
    pub const CONTROL_CHANGE: u8 = 0xB;
    pub const PROGRAM_CHANGE: u8 = 0xC;
    pub const CHANNEL_PRESSURE: u8 = 0xD;
    pub const PITCH_BEND: u8 = 0xE;
    pub const SINGLE_BYTE: u8 = 0xF;
}

/// Number of MIDI bytes carried by a packet with the given code index number.
/// The reserved codes 0x0 and 0x1 carry nothing this bridge can use.
pub const fn payload_len(code_index: u8) -> usize {
    match code_index & 0x0F {
        cin::MISC | cin::CABLE_EVENT => 0,
        cin::SYSEX_END_1BYTE | cin::SINGLE_BYTE => 1,
        cin::SYSCOM_2BYTE | cin::SYSEX_END_2BYTE | cin::PROGRAM_CHANGE | cin::CHANNEL_PRESSURE => 2,
        _ => 3,
    }
}

/// One USB-MIDI event packet
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UsbMidiPacket([u8; PACKET_SIZE]);

impl UsbMidiPacket {
    /// Build a packet.  `data` is copied into the payload area; bytes past
    /// the first three are ignored and missing bytes are zero.
    pub fn new(cable: CableId, code_index: u8, data: &[u8]) -> Self {
        let mut raw = [0u8; PACKET_SIZE];
        raw[0] = (cable.get() << 4) | (code_index & 0x0F);
        let n = data.len().min(PACKET_SIZE - 1);
        raw[1..1 + n].copy_from_slice(&data[..n]);
        Self(raw)
    }
    /// Interpret four raw bytes as a packet
    pub const fn from_bytes(raw: [u8; PACKET_SIZE]) -> Self {
        Self(raw)
    }
    /// The raw bytes
    pub const fn to_bytes(self) -> [u8; PACKET_SIZE] {
        self.0
    }
    /// The virtual cable this packet belongs to
    pub const fn cable(&self) -> CableId {
        CableId::new(self.0[0] >> 4)
    }
    /// The code index number
    pub const fn code_index(&self) -> u8 {
        self.0[0] & 0x0F
    }
    /// The meaningful MIDI bytes of this packet
    pub fn payload(&self) -> &[u8] {
        &self.0[1..1 + payload_len(self.code_index())]
    }
}
