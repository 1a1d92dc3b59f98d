//! Conversion between raw MIDI byte streams and USB-MIDI event packets.
//!
//! The router itself is byte-transparent, but a USB MIDI transport has to
//! know enough about MIDI to pack a byte stream into event packets and to
//! unpack them again.  [StreamWriter] does the former for every cable,
//! [PacketDemux] the latter.

use arrayvec::ArrayVec;
use heapless::Deque;

use crate::packet::{cin, UsbMidiPacket, PACKET_SIZE};
use crate::transport::CableId;

/// Largest bulk transfer on a full-speed MIDI endpoint
pub const TRANSFER_SIZE: usize = 64;

/// Smallest buffer [PacketDemux::read] accepts: one full packet payload
pub const MIN_READ_SIZE: usize = PACKET_SIZE - 1;

/// Packs one cable's byte stream into event packets.
///
/// Real-time bytes are packed immediately, even in the middle of another
/// message.  Running status is expanded, since every USB-MIDI packet has to
/// carry its own status byte.  A status byte arriving before the previous
/// message is complete abandons that message.  Data bytes with no status to
/// attach them to are passed through as single-byte packets.
#[derive(Clone, Copy, Debug, Default)]
pub struct StreamPacker {
    buf: [u8; 3],
    len: usize,
    expected: usize,
    code_index: u8,
    running_status: u8,
    in_sysex: bool,
}

impl StreamPacker {
    /// Create a packer with no message in progress
    pub const fn new() -> Self {
        Self {
            buf: [0; 3],
            len: 0,
            expected: 0,
            code_index: 0,
            running_status: 0,
            in_sysex: false,
        }
    }

    /// Forget any partial message and the running status
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn start(&mut self, status: u8, code_index: u8, expected: usize) {
        self.buf[0] = status;
        self.len = 1;
        self.code_index = code_index;
        self.expected = expected;
    }

    fn take(&mut self, cable: CableId, code_index: u8) -> UsbMidiPacket {
        let packet = UsbMidiPacket::new(cable, code_index, &self.buf[..self.len]);
        self.len = 0;
        packet
    }

    /// Feed one byte.  Returns a packet when `byte` completes one.
    pub fn push(&mut self, cable: CableId, byte: u8) -> Option<UsbMidiPacket> {
        if byte >= 0xF8 {
            return Some(UsbMidiPacket::new(cable, cin::SINGLE_BYTE, &[byte]));
        }
        if byte & 0x80 != 0 {
            return self.push_status(cable, byte);
        }
        if self.in_sysex {
            self.buf[self.len] = byte;
            self.len += 1;
            return (self.len == 3).then(|| self.take(cable, cin::SYSEX_START));
        }
        if self.expected == 0 {
            if self.running_status == 0 {
                return Some(UsbMidiPacket::new(cable, cin::SINGLE_BYTE, &[byte]));
            }
            let status = self.running_status;
            self.start(status, status >> 4, channel_message_len(status));
        }
        self.buf[self.len] = byte;
        self.len += 1;
        if self.len < self.expected {
            return None;
        }
        self.expected = 0;
        Some(self.take(cable, self.code_index))
    }

    fn push_status(&mut self, cable: CableId, status: u8) -> Option<UsbMidiPacket> {
        if status == 0xF7 && self.in_sysex {
            self.in_sysex = false;
            self.buf[self.len] = status;
            self.len += 1;
            let code_index = match self.len {
                1 => cin::SYSEX_END_1BYTE,
                2 => cin::SYSEX_END_2BYTE,
                _ => cin::SYSEX_END_3BYTE,
            };
            return Some(self.take(cable, code_index));
        }
        self.in_sysex = false;
        self.len = 0;
        self.expected = 0;
        match status {
            0x80..=0xEF => {
                self.running_status = status;
                self.start(status, status >> 4, channel_message_len(status));
                None
            }
            0xF0 => {
                self.running_status = 0;
                self.in_sysex = true;
                self.buf[0] = status;
                self.len = 1;
                None
            }
            0xF1 | 0xF3 => {
                self.running_status = 0;
                self.start(status, cin::SYSCOM_2BYTE, 2);
                None
            }
            0xF2 => {
                self.running_status = 0;
                self.start(status, cin::SYSCOM_3BYTE, 3);
                None
            }
            // tune request, undefined, or an end of exclusive with no start
            _ => {
                self.running_status = 0;
                Some(UsbMidiPacket::new(cable, cin::SYSEX_END_1BYTE, &[status]))
            }
        }
    }
}

fn channel_message_len(status: u8) -> usize {
    match status >> 4 {
        0xC | 0xD => 2,
        _ => 3,
    }
}

/// Outbound side of a USB MIDI transport: one [StreamPacker] per cable
/// feeding a bounded queue of packets waiting for the IN endpoint.
pub struct StreamWriter<const Q: usize, const CABLES: usize> {
    packers: [StreamPacker; CABLES],
    queue: Deque<UsbMidiPacket, Q>,
}

impl<const Q: usize, const CABLES: usize> Default for StreamWriter<Q, CABLES> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const Q: usize, const CABLES: usize> StreamWriter<Q, CABLES> {
    /// Create a writer with an empty queue
    pub const fn new() -> Self {
        Self {
            packers: [StreamPacker::new(); CABLES],
            queue: Deque::new(),
        }
    }

    /// Pack `bytes` for `cable`.  Returns the number of bytes consumed;
    /// consumption stops as soon as the packet queue is full.  Bytes that are
    /// consumed but don't complete a packet yet are held by the cable's
    /// packer and count as accepted.
    pub fn write(&mut self, cable: CableId, bytes: &[u8]) -> usize {
        let Some(packer) = self.packers.get_mut(cable.get() as usize) else {
            return 0;
        };
        for (i, &byte) in bytes.iter().enumerate() {
            if self.queue.is_full() {
                return i;
            }
            if let Some(packet) = packer.push(cable, byte) {
                // can't fail, there was room
                let _ = self.queue.push_back(packet);
            }
        }
        bytes.len()
    }

    /// The next bulk transfer's worth of queued packets, serialized.  The
    /// packets stay queued until [StreamWriter::consume] is called.
    pub fn pending_transfer(&self) -> ArrayVec<u8, TRANSFER_SIZE> {
        let mut transfer = ArrayVec::new();
        for packet in self.queue.iter().take(TRANSFER_SIZE / PACKET_SIZE) {
            transfer.extend(packet.to_bytes());
        }
        transfer
    }

    /// Remove `bytes` worth of packets from the front of the queue, after
    /// they have been handed to the endpoint
    pub fn consume(&mut self, bytes: usize) {
        for _ in 0..bytes / PACKET_SIZE {
            if self.queue.pop_front().is_none() {
                break;
            }
        }
    }

    /// Number of packets waiting
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True if no packets are waiting
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Throw away everything queued or partially packed, e.g. when the host
    /// goes away
    pub fn clear(&mut self) {
        self.queue.clear();
        for packer in self.packers.iter_mut() {
            packer.reset();
        }
    }
}

/// Inbound side of a USB MIDI transport: a bounded queue of received
/// packets, read back out as per-cable byte runs.
pub struct PacketDemux<const Q: usize> {
    queue: Deque<UsbMidiPacket, Q>,
}

impl<const Q: usize> Default for PacketDemux<Q> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const Q: usize> PacketDemux<Q> {
    /// Create an empty demultiplexer
    pub const fn new() -> Self {
        Self {
            queue: Deque::new(),
        }
    }

    /// Number of packets that can still be queued
    pub fn room(&self) -> usize {
        self.queue.capacity() - self.queue.len()
    }

    /// Queue the packets in a bulk OUT transfer.  Returns how many packets
    /// were queued; anything that doesn't fit, and any trailing partial
    /// packet, is ignored.
    pub fn push_transfer(&mut self, data: &[u8]) -> usize {
        let mut queued = 0;
        for chunk in data.chunks_exact(PACKET_SIZE) {
            let raw = [chunk[0], chunk[1], chunk[2], chunk[3]];
            if self.queue.push_back(UsbMidiPacket::from_bytes(raw)).is_err() {
                break;
            }
            queued += 1;
        }
        queued
    }

    /// Copy the payloads of consecutive packets on the same cable into
    /// `buf`, stopping at a cable change or when the next payload wouldn't
    /// fit.  Packets with no payload are skipped.
    ///
    /// `buf` must hold at least [MIN_READ_SIZE] bytes.  A smaller buffer
    /// panics in debug builds; in release builds it reads nothing and
    /// leaves the queue untouched.
    pub fn read(&mut self, buf: &mut [u8]) -> Option<(CableId, usize)> {
        debug_assert!(
            buf.len() >= MIN_READ_SIZE,
            "demux buffer of {} bytes can't hold a packet payload",
            buf.len()
        );
        if buf.len() < MIN_READ_SIZE {
            return None;
        }
        let mut cable = None;
        let mut len = 0;
        while let Some(packet) = self.queue.front().copied() {
            let payload = packet.payload();
            if payload.is_empty() {
                self.queue.pop_front();
                continue;
            }
            match cable {
                None => cable = Some(packet.cable()),
                Some(c) if c != packet.cable() => break,
                Some(_) => {}
            }
            if len + payload.len() > buf.len() {
                break;
            }
            buf[len..len + payload.len()].copy_from_slice(payload);
            len += payload.len();
            self.queue.pop_front();
        }
        match cable {
            Some(cable) if len > 0 => Some((cable, len)),
            _ => None,
        }
    }

    /// Number of packets waiting
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True if no packets are waiting
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Throw away everything queued
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::vec;
    use std::vec::Vec;

    use super::*;
    use wmidi::{Channel, ControlFunction, MidiMessage, Note, U7};

    fn encode(msg: &MidiMessage) -> Vec<u8> {
        let mut v = vec![0u8; msg.bytes_size()];
        msg.copy_to_slice(&mut v).unwrap();
        v
    }

    fn pack(cable: u8, bytes: &[u8]) -> Vec<[u8; 4]> {
        let mut packer = StreamPacker::new();
        bytes
            .iter()
            .filter_map(|&b| packer.push(CableId::new(cable), b))
            .map(UsbMidiPacket::to_bytes)
            .collect()
    }

    #[test]
    fn channel_messages() {
        let mut bytes = encode(&MidiMessage::NoteOn(
            Channel::Ch1,
            Note::C4,
            U7::from_u8_lossy(100),
        ));
        bytes.extend(encode(&MidiMessage::ProgramChange(
            Channel::Ch3,
            U7::from_u8_lossy(5),
        )));
        bytes.extend(encode(&MidiMessage::ControlChange(
            Channel::Ch16,
            ControlFunction::MODULATION_WHEEL,
            U7::from_u8_lossy(64),
        )));
        assert_eq!(
            pack(2, &bytes),
            [
                [0x29, 0x90, 60, 100],
                [0x2C, 0xC2, 5, 0],
                [0x2B, 0xBF, 1, 64],
            ]
        );
    }

    #[test]
    fn running_status_is_expanded() {
        assert_eq!(
            pack(0, &[0x90, 0x3C, 0x40, 0x3E, 0x40, 0x3C, 0x00]),
            [
                [0x09, 0x90, 0x3C, 0x40],
                [0x09, 0x90, 0x3E, 0x40],
                [0x09, 0x90, 0x3C, 0x00],
            ]
        );
        // system common cancels it
        assert_eq!(
            pack(0, &[0xD0, 0x10, 0xF6, 0x11]),
            [
                [0x0D, 0xD0, 0x10, 0],
                [0x05, 0xF6, 0, 0],
                [0x0F, 0x11, 0, 0],
            ]
        );
    }

    #[test]
    fn realtime_interrupts_without_disturbing() {
        let clock = encode(&MidiMessage::TimingClock);
        assert_eq!(clock, [0xF8]);
        assert_eq!(
            pack(1, &[0x80, 0x3C, 0xF8, 0x00]),
            [[0x1F, 0xF8, 0, 0], [0x18, 0x80, 0x3C, 0x00]]
        );
    }

    #[test]
    fn sysex_is_split_into_start_and_end_packets() {
        let data = U7::try_from_bytes(&[0x7E, 0x7F, 0x06, 0x01]).unwrap();
        let bytes = encode(&MidiMessage::SysEx(data));
        assert_eq!(bytes, [0xF0, 0x7E, 0x7F, 0x06, 0x01, 0xF7]);
        assert_eq!(
            pack(0, &bytes),
            [[0x04, 0xF0, 0x7E, 0x7F], [0x07, 0x06, 0x01, 0xF7]]
        );
        assert_eq!(pack(0, &[0xF0, 0xF7]), [[0x06, 0xF0, 0xF7, 0]]);
        assert_eq!(
            pack(0, &[0xF0, 0x01, 0x02, 0xF7]),
            [[0x04, 0xF0, 0x01, 0x02], [0x05, 0xF7, 0, 0]]
        );
        // a clock in the middle of a dump goes out on its own
        assert_eq!(
            pack(0, &[0xF0, 0x01, 0xF8, 0x02, 0xF7]),
            [
                [0x0F, 0xF8, 0, 0],
                [0x04, 0xF0, 0x01, 0x02],
                [0x05, 0xF7, 0, 0]
            ]
        );
    }

    #[test]
    fn interrupted_message_is_abandoned() {
        assert_eq!(
            pack(0, &[0x90, 0x3C, 0xB0, 0x07, 0x64]),
            [[0x0B, 0xB0, 0x07, 0x64]]
        );
        assert_eq!(
            pack(0, &[0xF2, 0x01, 0x02, 0xF3, 0x05]),
            [[0x03, 0xF2, 0x01, 0x02], [0x02, 0xF3, 0x05, 0]]
        );
    }

    #[test]
    fn writer_stops_when_queue_is_full() {
        let mut w = StreamWriter::<4, 4>::new();
        let notes: Vec<u8> = (0..5).flat_map(|n| [0x91, 0x40 + n, 0x7F]).collect();
        assert_eq!(w.write(CableId::new(1), &notes), 12);
        assert_eq!(w.len(), 4);
        let transfer = w.pending_transfer();
        assert_eq!(transfer.len(), 16);
        assert_eq!(&transfer[..4], &[0x19, 0x91, 0x40, 0x7F]);
        // nothing leaves the queue until the endpoint took it
        assert_eq!(w.len(), 4);
        w.consume(transfer.len());
        assert!(w.is_empty());
        assert_eq!(w.write(CableId::new(1), &notes[12..]), 3);
        assert_eq!(w.pending_transfer().as_slice(), &[0x19, 0x91, 0x44, 0x7F]);
    }

    #[test]
    fn writer_keeps_cables_apart() {
        let mut w = StreamWriter::<16, 2>::new();
        // half a message on each cable, then the rest
        assert_eq!(w.write(CableId::new(0), &[0x90, 0x3C]), 2);
        assert_eq!(w.write(CableId::new(1), &[0x80, 0x3E]), 2);
        assert!(w.is_empty());
        assert_eq!(w.write(CableId::new(0), &[0x7F]), 1);
        assert_eq!(w.write(CableId::new(1), &[0x00]), 1);
        assert_eq!(
            w.pending_transfer().as_slice(),
            &[0x09, 0x90, 0x3C, 0x7F, 0x18, 0x80, 0x3E, 0x00]
        );
        // no packer for this cable
        assert_eq!(w.write(CableId::new(2), &[0xF8]), 0);
        w.clear();
        assert!(w.is_empty());
    }

    #[test]
    fn transfers_are_at_most_one_endpoint_packet() {
        let mut w = StreamWriter::<32, 1>::new();
        let clocks = [0xF8u8; 20];
        assert_eq!(w.write(CableId::new(0), &clocks), 20);
        assert_eq!(w.pending_transfer().len(), TRANSFER_SIZE);
        w.consume(TRANSFER_SIZE);
        assert_eq!(w.pending_transfer().len(), 4 * PACKET_SIZE);
    }

    #[test]
    fn demux_groups_runs_by_cable() {
        let mut d = PacketDemux::<16>::new();
        let transfer = [
            0x09, 0x90, 0x3C, 0x7F, // cable 0
            0x0F, 0xF8, 0x00, 0x00, // cable 0
            0x00, 0x00, 0x00, 0x00, // padding
            0x28, 0x80, 0x3C, 0x00, // cable 2
            0x0C, 0xC0, 0x01, 0x00, // cable 0 again
        ];
        assert_eq!(d.push_transfer(&transfer), 5);
        let mut buf = [0u8; 48];
        assert_eq!(d.read(&mut buf), Some((CableId::new(0), 4)));
        assert_eq!(&buf[..4], &[0x90, 0x3C, 0x7F, 0xF8]);
        assert_eq!(d.read(&mut buf), Some((CableId::new(2), 3)));
        assert_eq!(&buf[..3], &[0x80, 0x3C, 0x00]);
        assert_eq!(d.read(&mut buf), Some((CableId::new(0), 2)));
        assert_eq!(&buf[..2], &[0xC0, 0x01]);
        assert_eq!(d.read(&mut buf), None);
    }

    #[test]
    fn demux_respects_buffer_size() {
        let mut d = PacketDemux::<32>::new();
        let transfer: Vec<u8> = (0..16).flat_map(|n| [0x39, 0x93, n, 0x40]).collect();
        d.push_transfer(&transfer);
        d.push_transfer(&transfer[..16]);
        let mut buf = [0u8; 48];
        assert_eq!(d.read(&mut buf), Some((CableId::new(3), 48)));
        assert_eq!(d.read(&mut buf), Some((CableId::new(3), 12)));
        assert!(d.is_empty());
    }

    #[test]
    fn demux_reads_into_smallest_buffer() {
        let mut d = PacketDemux::<4>::new();
        d.push_transfer(&[0x09, 0x90, 0x3C, 0x7F, 0x0C, 0xC0, 0x01, 0x00]);
        let mut buf = [0u8; MIN_READ_SIZE];
        assert_eq!(d.read(&mut buf), Some((CableId::new(0), 3)));
        assert_eq!(buf, [0x90, 0x3C, 0x7F]);
        assert_eq!(d.read(&mut buf), Some((CableId::new(0), 2)));
        assert!(d.is_empty());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "can't hold a packet payload")]
    fn demux_rejects_undersized_buffer() {
        let mut d = PacketDemux::<4>::new();
        d.push_transfer(&[0x09, 0x90, 0x3C, 0x7F]);
        let mut buf = [0u8; 2];
        d.read(&mut buf);
    }

    #[test]
    fn demux_queue_is_bounded() {
        let mut d = PacketDemux::<2>::new();
        assert_eq!(d.room(), 2);
        // trailing partial packet is ignored
        assert_eq!(d.push_transfer(&[0x0F, 0xF8, 0, 0, 0x0F, 0xFA, 0, 0, 0x0F]), 2);
        assert_eq!(d.room(), 0);
        assert_eq!(d.push_transfer(&[0x0F, 0xFC, 0, 0]), 0);
        d.clear();
        assert_eq!(d.room(), 2);
    }

    #[test]
    fn writer_output_demuxes_back_to_the_same_stream() {
        let mut stream = encode(&MidiMessage::NoteOn(
            Channel::Ch10,
            Note::C4,
            U7::from_u8_lossy(90),
        ));
        stream.extend([0xF0, 0x41, 0x10, 0x42, 0x12, 0x40, 0x00, 0x7F, 0x00, 0x41, 0xF7]);
        stream.extend(encode(&MidiMessage::PitchBendChange(
            Channel::Ch10,
            wmidi::U14::try_from(0x2000u16).unwrap(),
        )));
        let mut w = StreamWriter::<32, 4>::new();
        assert_eq!(w.write(CableId::new(3), &stream), stream.len());
        let mut d = PacketDemux::<32>::new();
        while !w.is_empty() {
            let transfer = w.pending_transfer();
            d.push_transfer(&transfer);
            w.consume(transfer.len());
        }
        let mut buf = [0u8; 48];
        assert_eq!(d.read(&mut buf), Some((CableId::new(3), stream.len())));
        assert_eq!(&buf[..stream.len()], stream.as_slice());
    }
}
