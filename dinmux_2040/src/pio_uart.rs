//! MIDI UARTs built from PIO state machines.
//!
//! The RP2040 only has two hardware UARTs, and one of them carries the log,
//! so every MIDI port is a pair of PIO state machines instead: transmitters
//! on PIO0 and receivers on PIO1, each block running a single shared copy of
//! its program.  8N1 framing, LSB first, 8 PIO cycles per bit.

use dinmux::config::{uart_clock_divisor, PortPins, MIDI_BAUD_RATE};
use dinmux::serial::SerialRings;
use dinmux::{PortBuffer, PortIndex};
use embedded_hal::digital::v2::PinState;
use rp_pico::hal::pio::{
    Buffers, InstalledProgram, PIOBuilder, PIOExt, PinDir, Running, Rx, ShiftDirection,
    StateMachine, StateMachineIndex, Tx, UninitStateMachine, ValidStateMachine, PIO,
};

/// Software receive ring, per port
pub const RX_RING: usize = 128;
/// Software transmit ring, per port.  At 31250 baud this is about 80 ms of
/// traffic.
pub const TX_RING: usize = 256;

const NUM_GPIOS: u8 = 30;
const CYCLES_PER_BIT: u32 = 8;

/// Why a port could not be brought up
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    /// There was no room on PIO0 for the transmit program
    #[error("no transmit program")]
    NoTxProgram,
    /// There was no room on PIO1 for the receive program
    #[error("no receive program")]
    NoRxProgram,
    /// The pin table names a GPIO this chip doesn't have
    #[error("GPIO {0} does not exist")]
    BadPin(u8),
}

/// The UART programs, installed once per PIO block and shared by every port
pub struct UartPrograms<TP: PIOExt, RP: PIOExt> {
    tx: Option<InstalledProgram<TP>>,
    rx: Option<InstalledProgram<RP>>,
    divisor: (u16, u8),
}

impl<TP: PIOExt, RP: PIOExt> UartPrograms<TP, RP> {
    /// Install the transmit program on `tx_pio` and the receive program on
    /// `rx_pio`.  A failed install is logged here and reported again by
    /// every port that needed it.
    pub fn install(tx_pio: &mut PIO<TP>, rx_pio: &mut PIO<RP>, sys_hz: u32) -> Self {
        let tx_program = pio_proc::pio_asm!(
            ".side_set 1 opt",
            "    pull       side 1 [7]", // idle high, stop bit
            "    set x, 7   side 0 [7]", // start bit
            "bitloop:",
            "    out pins, 1",
            "    jmp x-- bitloop [6]",
        );
        let rx_program = pio_proc::pio_asm!(
            "start:",
            "    wait 0 pin 0",
            "    set x, 7 [10]", // land in the middle of bit 0
            "bitloop:",
            "    in pins, 1",
            "    jmp x-- bitloop [6]",
            "    jmp pin good_stop",
            // framing error: wait for the line to idle and drop the byte
            "    wait 1 pin 0",
            "    jmp start",
            "good_stop:",
            "    push",
        );
        let tx = tx_pio
            .install(&tx_program.program)
            .map_err(|e| log::error!("Installing MIDI TX program: {:?}", e))
            .ok();
        let rx = rx_pio
            .install(&rx_program.program)
            .map_err(|e| log::error!("Installing MIDI RX program: {:?}", e))
            .ok();
        Self {
            tx,
            rx,
            divisor: uart_clock_divisor(sys_hz, MIDI_BAUD_RATE, CYCLES_PER_BIT),
        }
    }
}

/// One MIDI IN/OUT pair
pub struct PioMidiUart<T: ValidStateMachine, R: ValidStateMachine> {
    index: PortIndex,
    tx: Tx<T>,
    rx: Rx<R>,
    _tx_sm: StateMachine<T, Running>,
    _rx_sm: StateMachine<R, Running>,
    rings: SerialRings<RX_RING, TX_RING>,
}

impl<TP, TS, RP, RS> PioMidiUart<(TP, TS), (RP, RS)>
where
    TP: PIOExt,
    TS: StateMachineIndex,
    RP: PIOExt,
    RS: StateMachineIndex,
{
    /// Start the state machines for one port.  The pins must already be
    /// handed to the right PIO block.
    pub fn new(
        index: PortIndex,
        programs: &UartPrograms<TP, RP>,
        tx_sm: UninitStateMachine<(TP, TS)>,
        rx_sm: UninitStateMachine<(RP, RS)>,
        pins: PortPins,
    ) -> Result<Self, PortError> {
        for pin in [pins.tx, pins.rx] {
            if pin >= NUM_GPIOS {
                return Err(PortError::BadPin(pin));
            }
        }
        let tx_program = programs.tx.as_ref().ok_or(PortError::NoTxProgram)?;
        let rx_program = programs.rx.as_ref().ok_or(PortError::NoRxProgram)?;
        let (int, frac) = programs.divisor;

        // SAFETY: every port runs the same unmodified program, and nothing
        // ever uninstalls it
        let (mut tx_sm, _, tx) = PIOBuilder::from_program(unsafe { tx_program.share() })
            .out_pins(pins.tx, 1)
            .side_set_pin_base(pins.tx)
            .out_shift_direction(ShiftDirection::Right)
            .buffers(Buffers::OnlyTx)
            .clock_divisor_fixed_point(int, frac)
            .build(tx_sm);
        tx_sm.set_pins([(pins.tx, PinState::High)]);
        tx_sm.set_pindirs([(pins.tx, PinDir::Output)]);

        // SAFETY: as above
        let (mut rx_sm, rx, _) = PIOBuilder::from_program(unsafe { rx_program.share() })
            .in_pin_base(pins.rx)
            .jmp_pin(pins.rx)
            .in_shift_direction(ShiftDirection::Right)
            .buffers(Buffers::OnlyRx)
            .clock_divisor_fixed_point(int, frac)
            .build(rx_sm);
        rx_sm.set_pindirs([(pins.rx, PinDir::Input)]);

        log::debug!(
            "MIDI port {}: TX GPIO{}, RX GPIO{}",
            index,
            pins.tx,
            pins.rx
        );
        Ok(Self {
            index,
            tx,
            rx,
            _tx_sm: tx_sm.start(),
            _rx_sm: rx_sm.start(),
            rings: SerialRings::new(),
        })
    }
}

impl<T: ValidStateMachine, R: ValidStateMachine> PortBuffer for PioMidiUart<T, R> {
    fn poll_receive(&mut self, buf: &mut [u8]) -> usize {
        let rx = &mut self.rx;
        // shifted in from the top
        let got = self.rings.receive(buf, || rx.read().map(|word| (word >> 24) as u8));
        if got.lost > 0 {
            log::warn!(
                "MIDI In {} overrun: lost {} bytes ({} total)",
                self.index,
                got.lost,
                self.rings.overruns()
            );
        }
        got.len
    }

    fn write_transmit(&mut self, bytes: &[u8]) -> usize {
        self.rings.queue(bytes)
    }

    fn drain_transmit(&mut self) {
        let tx = &mut self.tx;
        self.rings.transmit(|byte| tx.write(u32::from(byte)));
    }
}
