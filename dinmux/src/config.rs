//! Fixed, compile-time configuration of the bridge.
//!
//! Everything here is a constant: the number of physical ports, the chunk
//! size moved per port per pass, the GPIO assignments of the board, and the
//! status LED cadences.  There is no runtime configuration.

/// Number of physical MIDI IN/OUT port pairs.  Port `n` is always USB virtual
/// cable `n`.
pub const NUM_PORT_PAIRS: usize = 4;

/// Maximum number of bytes moved for a single port in a single poll, in
/// either direction.  Keeps one busy port from starving the others within a
/// cycle and keeps the stack buffers small.
pub const CHUNK_SIZE: usize = 48;

/// The MIDI 1.0 DIN serial rate, in baud.
pub const MIDI_BAUD_RATE: u32 = 31_250;

/// Clock divisor for a state-machine UART that spends `cycles_per_bit`
/// cycles on each bit, as an integer part and 1/256ths
pub const fn uart_clock_divisor(sys_hz: u32, baud: u32, cycles_per_bit: u32) -> (u16, u8) {
    let div = ((sys_hz as u64) << 8) / (cycles_per_bit as u64 * baud as u64);
    ((div >> 8) as u16, div as u8)
}

/// GPIO assignment for a single physical port pair
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortPins {
    /// MIDI OUT serial data
    pub tx: u8,
    /// MIDI IN serial data
    pub rx: u8,
    /// Line driver enable for MIDI OUT.  Driven high at boot and left there.
    pub tx_enable: u8,
}

impl PortPins {
    const fn new(tx: u8, rx: u8, tx_enable: u8) -> Self {
        Self { tx, rx, tx_enable }
    }
}

/// Pin table for ports A-D, indexed by port number
pub const PORT_PINS: [PortPins; NUM_PORT_PAIRS] = [
    PortPins::new(24, 8, 20),
    PortPins::new(25, 9, 19),
    PortPins::new(22, 10, 18),
    PortPins::new(23, 11, 21),
];

/// Status LED toggle interval while no host has configured the device
pub const BLINK_UNMOUNTED_MS: u32 = 250;
/// Status LED toggle interval while configured by a host
pub const BLINK_MOUNTED_MS: u32 = 1000;
/// Status LED toggle interval while the bus is suspended
pub const BLINK_SUSPENDED_MS: u32 = 2500;

/// What to do when a physical port can't be created at startup
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PortFailurePolicy {
    /// Log the failure and run without that port.  Its cable still shows up
    /// on the host, but anything sent to it is dropped.
    #[default]
    Disable,
    /// Refuse to start
    Halt,
}

/// The failure policy used by the firmware
pub const PORT_FAILURE_POLICY: PortFailurePolicy = PortFailurePolicy::Disable;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midi_divisor_at_default_clock() {
        assert_eq!(uart_clock_divisor(125_000_000, MIDI_BAUD_RATE, 8), (500, 0));
    }

    #[test]
    fn divisor_keeps_the_fraction() {
        // 133 MHz / 250 kHz = 532
        assert_eq!(uart_clock_divisor(133_000_000, MIDI_BAUD_RATE, 8), (532, 0));
        // 48 MHz / (8 * 115200) = 52.083..
        assert_eq!(uart_clock_divisor(48_000_000, 115_200, 8), (52, 21));
    }

    #[test]
    fn pin_table_has_no_duplicates() {
        let mut used = [false; 30];
        for pins in PORT_PINS {
            for pin in [pins.tx, pins.rx, pins.tx_enable] {
                assert!(!used[pin as usize], "GPIO {} assigned twice", pin);
                used[pin as usize] = true;
            }
        }
    }
}
