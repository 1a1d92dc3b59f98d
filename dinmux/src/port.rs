//! Physical MIDI ports and the fixed table that owns them.

use core::fmt;

use crate::config::PortFailurePolicy;
use crate::transport::CableId;
use crate::Error;

/// The receive/transmit buffer pair behind one physical MIDI IN/OUT port.
///
/// The serial driver itself is not part of this crate.  All that the router
/// needs is a way to pull what has been received, push what should be sent,
/// and give the driver a chance to move buffered bytes onto the wire.  None
/// of these may block.
pub trait PortBuffer {
    /// Move up to `buf.len()` received bytes into `buf`, returning how many
    /// were moved.  Bytes handed out are gone from the driver.
    fn poll_receive(&mut self, buf: &mut [u8]) -> usize;
    /// Append `bytes` to the transmit buffer.  Returns how many were
    /// accepted; anything beyond that did not fit.
    fn write_transmit(&mut self, bytes: &[u8]) -> usize;
    /// Push as much of the transmit buffer toward the wire as the hardware
    /// will take right now.
    fn drain_transmit(&mut self);
}

impl<T: PortBuffer + ?Sized> PortBuffer for &mut T {
    fn poll_receive(&mut self, buf: &mut [u8]) -> usize {
        (**self).poll_receive(buf)
    }
    fn write_transmit(&mut self, bytes: &[u8]) -> usize {
        (**self).write_transmit(bytes)
    }
    fn drain_transmit(&mut self) {
        (**self).drain_transmit()
    }
}

/// Index of a physical port pair.  Displayed as a letter, the way the
/// connectors on the enclosure are labeled (`A`, `B`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortIndex(u8);

impl PortIndex {
    /// Create a port index.  There are at most 16 ports, one per cable.
    pub const fn new(index: u8) -> Self {
        Self(index & 0x0F)
    }
    /// The index as a `usize`, for table lookups
    pub const fn get(self) -> usize {
        self.0 as usize
    }
    /// The virtual cable this port is mapped to.  The mapping is the
    /// identity and never changes.
    pub const fn cable(self) -> CableId {
        CableId::new(self.0)
    }
    /// The connector label for this port
    pub const fn letter(self) -> char {
        (b'A' + self.0) as char
    }
}

impl fmt::Display for PortIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Most ports a table can hold: one per USB-MIDI virtual cable
pub const MAX_PORTS: usize = CableId::MAX.get() as usize + 1;

/// The fixed set of physical ports, created once at startup and owned by the
/// router for the life of the program.  A slot is empty if its port could
/// not be created and the failure policy allowed running without it.
///
/// A table holds at most [MAX_PORTS] ports, since port `n` is always cable
/// `n`.  Larger tables are rejected at compile time:
///
/// ```compile_fail
/// use dinmux::{PortBuffer, Ports};
///
/// struct Null;
/// impl PortBuffer for Null {
///     fn poll_receive(&mut self, _: &mut [u8]) -> usize { 0 }
///     fn write_transmit(&mut self, _: &[u8]) -> usize { 0 }
///     fn drain_transmit(&mut self) {}
/// }
///
/// let _ = Ports::<Null, 17>::new(core::array::from_fn(|_| Null));
/// ```
pub struct Ports<P, const N: usize> {
    slots: [Option<P>; N],
}

impl<P: PortBuffer, const N: usize> Ports<P, N> {
    /// Wrap a fully populated table of ports
    pub fn new(ports: [P; N]) -> Self {
        let () = Self::FITS_CABLES;
        Self {
            slots: ports.map(Some),
        }
    }
    /// Create every port by calling `factory` once per index, in order.
    /// Failures are handled according to `policy`.
    pub fn open<F, E>(policy: PortFailurePolicy, mut factory: F) -> Result<Self, Error>
    where
        F: FnMut(PortIndex) -> Result<P, E>,
        E: fmt::Display,
    {
        let results = core::array::from_fn(|i| factory(PortIndex::new(i as u8)));
        Self::from_results(policy, results)
    }
    /// Build the table from the outcome of creating each port
    pub fn from_results<E: fmt::Display>(
        policy: PortFailurePolicy,
        results: [Result<P, E>; N],
    ) -> Result<Self, Error> {
        let () = Self::FITS_CABLES;
        if policy == PortFailurePolicy::Halt {
            if let Some((i, Err(e))) = results.iter().enumerate().find(|(_, r)| r.is_err()) {
                let port = PortIndex::new(i as u8);
                log::error!("Failed to create MIDI port {}: {}", port, e);
                return Err(Error::PortCreate { port });
            }
        }
        let mut next = 0u8;
        let slots = results.map(|result| {
            let port = PortIndex::new(next);
            next += 1;
            match result {
                Ok(p) => Some(p),
                Err(e) => {
                    log::error!("Failed to create MIDI port {}: {}", port, e);
                    log::warn!("Continuing with MIDI port {} disabled", port);
                    None
                }
            }
        });
        if N > 0 && slots.iter().all(Option::is_none) {
            return Err(Error::NoPorts);
        }
        Ok(Self { slots })
    }
}

impl<P, const N: usize> Ports<P, N> {
    const FITS_CABLES: () = assert!(N <= MAX_PORTS, "more ports than USB-MIDI cables");

    /// Number of port slots, enabled or not
    pub const fn len(&self) -> usize {
        N
    }
    /// True if there are no port slots at all
    pub const fn is_empty(&self) -> bool {
        N == 0
    }
    /// Look up the port a cable routes to.  Returns `None` for cables that
    /// don't correspond to a physical port.
    pub fn route(&self, cable: CableId) -> Option<PortIndex> {
        let index = cable.get() as usize;
        (index < N).then(|| PortIndex::new(cable.get()))
    }
    /// The port at `index`, if it exists and is enabled
    pub fn get(&self, index: PortIndex) -> Option<&P> {
        self.slots.get(index.get()).and_then(Option::as_ref)
    }
    /// The port at `index`, if it exists and is enabled
    pub fn get_mut(&mut self, index: PortIndex) -> Option<&mut P> {
        self.slots.get_mut(index.get()).and_then(Option::as_mut)
    }
    /// True if the port at `index` exists and is enabled
    pub fn is_enabled(&self, index: PortIndex) -> bool {
        self.get(index).is_some()
    }
    /// Iterate over all slots in ascending port order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PortIndex, Option<&mut P>)> {
        self.slots
            .iter_mut()
            .enumerate()
            .map(|(i, slot)| (PortIndex::new(i as u8), slot.as_mut()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPort;

    #[test]
    fn port_labels() {
        assert_eq!(PortIndex::new(0).letter(), 'A');
        assert_eq!(PortIndex::new(3).letter(), 'D');
        assert_eq!(PortIndex::new(2).cable(), CableId::new(2));
    }

    #[test]
    fn route_is_identity_within_range() {
        let ports = Ports::<MockPort, 4>::new(Default::default());
        for i in 0..4 {
            assert_eq!(ports.route(CableId::new(i)), Some(PortIndex::new(i)));
        }
        assert_eq!(ports.route(CableId::new(4)), None);
        assert_eq!(ports.route(CableId::MAX), None);
    }

    #[test]
    fn failed_port_is_disabled_by_default() {
        let ports = Ports::<MockPort, 4>::open(PortFailurePolicy::Disable, |i| {
            if i.get() == 1 {
                Err("no state machine")
            } else {
                Ok(MockPort::default())
            }
        })
        .unwrap();
        assert!(ports.is_enabled(PortIndex::new(0)));
        assert!(!ports.is_enabled(PortIndex::new(1)));
        assert!(ports.is_enabled(PortIndex::new(2)));
        assert!(ports.is_enabled(PortIndex::new(3)));
        // the cable still routes, there's just nothing behind it
        assert_eq!(ports.route(CableId::new(1)), Some(PortIndex::new(1)));
    }

    #[test]
    fn failed_port_halts_when_asked() {
        let result = Ports::<MockPort, 4>::from_results(
            PortFailurePolicy::Halt,
            [
                Ok(MockPort::default()),
                Ok(MockPort::default()),
                Err("no program space"),
                Ok(MockPort::default()),
            ],
        );
        assert_eq!(
            result.err(),
            Some(Error::PortCreate {
                port: PortIndex::new(2)
            })
        );
    }

    #[test]
    fn largest_table_keeps_ports_on_their_own_cables() {
        let mut ports = Ports::<MockPort, MAX_PORTS>::open(PortFailurePolicy::Disable, |i| {
            Ok::<_, &str>(MockPort::with_rx(&[i.get() as u8]))
        })
        .unwrap();
        assert_eq!(ports.route(CableId::MAX), Some(PortIndex::new(15)));
        let mut seen = 0;
        for (index, port) in ports.iter_mut() {
            let mut buf = [0u8; 4];
            let n = port.unwrap().poll_receive(&mut buf);
            assert_eq!(&buf[..n], &[index.get() as u8]);
            assert_eq!(index.cable().get() as usize, index.get());
            seen += 1;
        }
        assert_eq!(seen, MAX_PORTS);
    }

    #[test]
    fn no_ports_at_all_is_an_error() {
        let result = Ports::<MockPort, 2>::open(PortFailurePolicy::Disable, |_| Err("nope"));
        assert_eq!(result.err(), Some(Error::NoPorts));
    }
}
