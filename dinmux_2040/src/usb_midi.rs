//! USB MIDI 1.0 streaming class with one virtual cable per physical port.
//!
//! Each cable gets the usual four jacks: an embedded IN jack fed by the OUT
//! endpoint, wired to an external OUT jack (the MIDI OUT connector), and an
//! external IN jack (the MIDI IN connector) wired to an embedded OUT jack
//! feeding the IN endpoint.

use dinmux::config::NUM_PORT_PAIRS;
use dinmux::packet::PACKET_SIZE;
use dinmux::stream::{PacketDemux, StreamWriter, TRANSFER_SIZE};
use dinmux::{CableId, MidiTransport};
use usb_device::class_prelude::*;
use usb_device::UsbError;

/// Packets waiting for the IN endpoint
const TX_PACKETS: usize = 64;
/// Packets received but not yet routed
const RX_PACKETS: usize = 64;

const AUDIO_CLASS: u8 = 0x01;
const AUDIO_CONTROL: u8 = 0x01;
const MIDI_STREAMING: u8 = 0x03;

const CS_INTERFACE: u8 = 0x24;
const CS_ENDPOINT: u8 = 0x25;

const HEADER: u8 = 0x01;
const MIDI_IN_JACK: u8 = 0x02;
const MIDI_OUT_JACK: u8 = 0x03;
const MS_GENERAL: u8 = 0x01;

const EMBEDDED: u8 = 0x01;
const EXTERNAL: u8 = 0x02;

const IN_JACK_LEN: u16 = 6;
const OUT_JACK_LEN: u16 = 9;
const MS_HEADER_LEN: u16 = 7;
/// Class-specific MS header plus all jack descriptors
const MS_TOTAL_LEN: u16 =
    MS_HEADER_LEN + (2 * IN_JACK_LEN + 2 * OUT_JACK_LEN) * NUM_PORT_PAIRS as u16;

const IN_NAMES: [&str; NUM_PORT_PAIRS] = ["MIDI IN A", "MIDI IN B", "MIDI IN C", "MIDI IN D"];
const OUT_NAMES: [&str; NUM_PORT_PAIRS] =
    ["MIDI OUT A", "MIDI OUT B", "MIDI OUT C", "MIDI OUT D"];

/// Jack IDs for one cable
#[derive(Clone, Copy)]
struct Jacks {
    embedded_in: u8,
    external_in: u8,
    embedded_out: u8,
    external_out: u8,
}

impl Jacks {
    const fn for_cable(cable: usize) -> Self {
        let base = 4 * cable as u8;
        Self {
            embedded_in: base + 1,
            external_in: base + 2,
            embedded_out: base + 3,
            external_out: base + 4,
        }
    }
}

/// The USB MIDI class, and the [MidiTransport] the router talks to
pub struct UsbMidiClass<'a, B: UsbBus> {
    audio_control_if: InterfaceNumber,
    midi_streaming_if: InterfaceNumber,
    out_ep: EndpointOut<'a, B>,
    in_ep: EndpointIn<'a, B>,
    in_names: [StringIndex; NUM_PORT_PAIRS],
    out_names: [StringIndex; NUM_PORT_PAIRS],
    writer: StreamWriter<TX_PACKETS, NUM_PORT_PAIRS>,
    demux: PacketDemux<RX_PACKETS>,
    configured: bool,
}

impl<'a, B: UsbBus> UsbMidiClass<'a, B> {
    /// Allocate the interfaces, endpoints and jack names
    pub fn new(alloc: &'a UsbBusAllocator<B>) -> Self {
        Self {
            audio_control_if: alloc.interface(),
            midi_streaming_if: alloc.interface(),
            out_ep: alloc.bulk(TRANSFER_SIZE as u16),
            in_ep: alloc.bulk(TRANSFER_SIZE as u16),
            in_names: core::array::from_fn(|_| alloc.string()),
            out_names: core::array::from_fn(|_| alloc.string()),
            writer: StreamWriter::new(),
            demux: PacketDemux::new(),
            configured: false,
        }
    }

    /// Record whether the host has the streaming interface open.  Anything
    /// still queued is thrown away when it goes away.
    pub fn set_configured(&mut self, configured: bool) {
        if !configured {
            self.writer.clear();
            self.demux.clear();
        }
        self.configured = configured;
    }

    /// Move packets between the endpoints and the queues.  Call after every
    /// `UsbDevice::poll`.
    pub fn service(&mut self) {
        self.flush();
        self.fill();
    }

    fn flush(&mut self) {
        if self.writer.is_empty() {
            return;
        }
        let transfer = self.writer.pending_transfer();
        match self.in_ep.write(&transfer) {
            Ok(n) => self.writer.consume(n),
            Err(UsbError::WouldBlock) => {}
            Err(e) => log::warn!("USB MIDI IN endpoint: {:?}", e),
        }
    }

    fn fill(&mut self) {
        // don't take a transfer off the endpoint unless all of it fits
        if self.demux.room() < TRANSFER_SIZE / PACKET_SIZE {
            return;
        }
        let mut buf = [0u8; TRANSFER_SIZE];
        match self.out_ep.read(&mut buf) {
            Ok(n) => {
                self.demux.push_transfer(&buf[..n]);
            }
            Err(UsbError::WouldBlock) => {}
            Err(e) => log::warn!("USB MIDI OUT endpoint: {:?}", e),
        }
    }
}

impl<B: UsbBus> UsbClass<B> for UsbMidiClass<'_, B> {
    fn get_configuration_descriptors(&self, writer: &mut DescriptorWriter) -> usb_device::Result<()> {
        writer.interface(self.audio_control_if, AUDIO_CLASS, AUDIO_CONTROL, 0x00)?;
        writer.write(
            CS_INTERFACE,
            &[
                HEADER,
                0x00,
                0x01, // revision 1.0
                0x09,
                0x00, // total length, just this header
                0x01, // one streaming interface
                self.midi_streaming_if.into(),
            ],
        )?;

        writer.interface(self.midi_streaming_if, AUDIO_CLASS, MIDI_STREAMING, 0x00)?;
        let [total_lo, total_hi] = MS_TOTAL_LEN.to_le_bytes();
        writer.write(CS_INTERFACE, &[HEADER, 0x00, 0x01, total_lo, total_hi])?;
        for cable in 0..NUM_PORT_PAIRS {
            let jacks = Jacks::for_cable(cable);
            let in_name: u8 = self.in_names[cable].into();
            let out_name: u8 = self.out_names[cable].into();
            writer.write(
                CS_INTERFACE,
                &[MIDI_IN_JACK, EMBEDDED, jacks.embedded_in, out_name],
            )?;
            writer.write(
                CS_INTERFACE,
                &[MIDI_IN_JACK, EXTERNAL, jacks.external_in, in_name],
            )?;
            writer.write(
                CS_INTERFACE,
                &[
                    MIDI_OUT_JACK,
                    EMBEDDED,
                    jacks.embedded_out,
                    0x01, // one input pin
                    jacks.external_in,
                    0x01,
                    in_name,
                ],
            )?;
            writer.write(
                CS_INTERFACE,
                &[
                    MIDI_OUT_JACK,
                    EXTERNAL,
                    jacks.external_out,
                    0x01,
                    jacks.embedded_in,
                    0x01,
                    out_name,
                ],
            )?;
        }

        let mut embedded_in = [0u8; 2 + NUM_PORT_PAIRS];
        let mut embedded_out = [0u8; 2 + NUM_PORT_PAIRS];
        embedded_in[..2].copy_from_slice(&[MS_GENERAL, NUM_PORT_PAIRS as u8]);
        embedded_out[..2].copy_from_slice(&[MS_GENERAL, NUM_PORT_PAIRS as u8]);
        for cable in 0..NUM_PORT_PAIRS {
            let jacks = Jacks::for_cable(cable);
            embedded_in[2 + cable] = jacks.embedded_in;
            embedded_out[2 + cable] = jacks.embedded_out;
        }
        writer.endpoint(&self.out_ep)?;
        writer.write(CS_ENDPOINT, &embedded_in)?;
        writer.endpoint(&self.in_ep)?;
        writer.write(CS_ENDPOINT, &embedded_out)?;
        Ok(())
    }

    fn get_string(&self, index: StringIndex, _lang_id: u16) -> Option<&str> {
        if let Some(i) = self.in_names.iter().position(|&s| s == index) {
            return Some(IN_NAMES[i]);
        }
        let i = self.out_names.iter().position(|&s| s == index)?;
        Some(OUT_NAMES[i])
    }

    fn reset(&mut self) {
        self.set_configured(false);
    }
}

impl<B: UsbBus> MidiTransport for UsbMidiClass<'_, B> {
    fn is_connected(&self) -> bool {
        self.configured
    }

    fn stream_write(&mut self, cable: CableId, bytes: &[u8]) -> usize {
        let mut n = self.writer.write(cable, bytes);
        if n < bytes.len() {
            // make room and try once more
            self.flush();
            n += self.writer.write(cable, &bytes[n..]);
        }
        n
    }

    fn demux_read(&mut self, buf: &mut [u8]) -> Option<(CableId, usize)> {
        if let Some(frame) = self.demux.read(buf) {
            return Some(frame);
        }
        self.fill();
        self.demux.read(buf)
    }
}
