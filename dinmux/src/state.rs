//! USB connection state.
//!
//! The USB stack reports lifecycle changes as discrete events (mounted,
//! unmounted, suspended, resumed).  [ConnectionTracker] folds those into the
//! current [ConnectionState], which the router uses to decide whether to
//! forward anything at all and the status LED uses to pick a blink rate.
//!
//! Some USB stacks only expose a polled device state rather than callbacks.
//! [LifecycleMonitor] turns such a polled state into the same edge events.

use crate::config::{BLINK_MOUNTED_MS, BLINK_SUSPENDED_MS, BLINK_UNMOUNTED_MS};

/// Where the device stands with respect to a USB host
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not configured by a host (or not plugged in)
    #[default]
    Unmounted,
    /// Configured and running
    Mounted,
    /// Configured, but the host has suspended the bus
    Suspended,
}

impl ConnectionState {
    /// The state after `event`.  Every event fully determines the next state,
    /// except that a resume always returns to [ConnectionState::Mounted].
    pub const fn next(self, event: UsbEvent) -> Self {
        match event {
            UsbEvent::Mounted | UsbEvent::Resumed => Self::Mounted,
            UsbEvent::Unmounted => Self::Unmounted,
            UsbEvent::Suspended { .. } => Self::Suspended,
        }
    }
    /// True unless [ConnectionState::Unmounted].  Forwarding is only ever
    /// attempted in this case.
    pub const fn is_attached(self) -> bool {
        !matches!(self, Self::Unmounted)
    }
    /// How often the status LED toggles in this state, in milliseconds
    pub const fn blink_interval_ms(self) -> u32 {
        match self {
            Self::Unmounted => BLINK_UNMOUNTED_MS,
            Self::Mounted => BLINK_MOUNTED_MS,
            Self::Suspended => BLINK_SUSPENDED_MS,
        }
    }
}

/// A USB device lifecycle event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsbEvent {
    /// The host configured the device
    Mounted,
    /// The device was reset, deconfigured or unplugged
    Unmounted,
    /// The host suspended the bus
    Suspended {
        /// Whether the host allows this device to signal a remote wakeup
        remote_wakeup: bool,
    },
    /// The bus was resumed
    Resumed,
}

/// Tracks the [ConnectionState].  The only way to change the state is
/// [ConnectionTracker::handle], which should be called from the USB event
/// path and nowhere else.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConnectionTracker {
    state: ConnectionState,
}

impl ConnectionTracker {
    /// Create a tracker in the [ConnectionState::Unmounted] state
    pub const fn new() -> Self {
        Self {
            state: ConnectionState::Unmounted,
        }
    }
    /// Apply a lifecycle event
    pub fn handle(&mut self, event: UsbEvent) {
        let next = self.state.next(event);
        if next != self.state {
            log::info!("USB {:?} -> {:?}", self.state, next);
        }
        self.state = next;
    }
    /// The current state
    pub const fn state(&self) -> ConnectionState {
        self.state
    }
}

/// A polled snapshot of the USB device state, as seen by a stack with no
/// lifecycle callbacks
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BusStatus {
    /// Powered, default or addressed, but not configured
    #[default]
    Unconfigured,
    /// Configured by the host
    Configured,
    /// The bus is suspended
    Suspended,
}

/// Derives lifecycle edges from successive [BusStatus] samples
#[derive(Clone, Copy, Debug, Default)]
pub struct LifecycleMonitor {
    mounted: bool,
    suspended: bool,
}

impl LifecycleMonitor {
    /// Create a monitor for a device that has not been configured yet
    pub const fn new() -> Self {
        Self {
            mounted: false,
            suspended: false,
        }
    }
    /// Feed the latest bus status.  Returns the event this sample implies,
    /// if it differs from what was previously reported.
    pub fn observe(&mut self, status: BusStatus) -> Option<UsbEvent> {
        match status {
            BusStatus::Suspended if !self.suspended => {
                self.suspended = true;
                Some(UsbEvent::Suspended {
                    remote_wakeup: false,
                })
            }
            BusStatus::Suspended => None,
            BusStatus::Configured if self.suspended && self.mounted => {
                self.suspended = false;
                Some(UsbEvent::Resumed)
            }
            BusStatus::Configured if !self.mounted => {
                self.suspended = false;
                self.mounted = true;
                Some(UsbEvent::Mounted)
            }
            BusStatus::Configured => None,
            BusStatus::Unconfigured if self.mounted || self.suspended => {
                self.mounted = false;
                self.suspended = false;
                Some(UsbEvent::Unmounted)
            }
            BusStatus::Unconfigured => None,
        }
    }
}
