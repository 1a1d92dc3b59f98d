use crate::port::PortIndex;

/// Errors that can stop the bridge from starting.  Nothing in the steady-state
/// data path returns an error; see [crate::diag] for how that is reported.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// A physical port could not be created and the failure policy is
    /// [crate::config::PortFailurePolicy::Halt]
    #[error("failed to create MIDI port {port}")]
    PortCreate {
        /// The port that failed
        port: PortIndex,
    },
    /// Every physical port failed to come up
    #[error("no MIDI ports could be created")]
    NoPorts,
}
