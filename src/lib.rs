#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![allow(clippy::too_many_lines)]

#[macro_use]
mod fmt;

mod address;
pub mod advertising;
pub mod api;
pub mod bonding;
pub mod constants;
pub mod dispatcher;
pub mod event;
pub mod hci;
pub mod processor;
pub mod stack;
pub mod storage;
pub mod whitelist;

#[cfg(test)]
pub(crate) mod testing;

use crate::constants::{DEFAULT_BONDING_WINDOW_MS, EVENT_QUEUE_SIZE, WHITELIST_CAPACITY};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel, signal::Signal};

pub use address::{AddressKind, IdentityKey, InvalidAddress, PeerAddress, PeerIdentity};
pub use advertising::{AdvertisingController, AdvertisingMode, AdvertisingOptions};
pub use bonding::{BondingOrchestrator, BondingWindow, ConnectionSlot, HostOrdinal, LinkState};
pub use dispatcher::EventDispatcher;
pub use event::Event;
pub use hci::{HciCommand, HciRadio};
pub use stack::{BondingTimer, Indicator, IndicatorCommand, PeerStore, RadioStack, Stack};
pub use storage::StorageEventHandler;
pub use whitelist::{Whitelist, WhitelistBuilder};

/// Single ingress queue shared by the radio, security and storage event sources
pub(crate) static EVENT_CHANNEL: Channel<CriticalSectionRawMutex, Event, EVENT_QUEUE_SIZE> =
    Channel::new();

/// Latest request for the application's bonding window timer task
pub(crate) static TIMER_SIGNAL: Signal<CriticalSectionRawMutex, api::TimerRequest> = Signal::new();

/// Opaque identifier of a bonded peer record in the peer store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerId(pub u16);

/// Link-layer connection handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionHandle(pub u16);

impl ConnectionHandle {
    /// Get the raw handle value
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl From<ConnectionHandle> for bt_hci::param::ConnHandle {
    fn from(handle: ConnectionHandle) -> Self {
        bt_hci::param::ConnHandle::new(handle.0)
    }
}

/// Role this device plays on a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkRole {
    /// This device initiated the connection
    Central,
    /// This device advertised and accepted the connection
    Peripheral,
}

/// Failure reported synchronously by the radio stack when a command is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    /// Stack is busy with another procedure
    Busy,
    /// Not enough resources to queue the command
    NoResources,
    /// System attributes for the link are not yet set
    MissingSysAttributes,
    /// Command is not applicable in the current state (e.g. already stopped)
    InvalidState,
    /// Command is not supported by this stack revision
    NotSupported,
    /// Transport to the controller failed
    Transport,
    /// Any other stack error code
    Other(u32),
}

impl RadioError {
    /// Whether the failure can be swallowed without any state change
    #[must_use]
    pub const fn is_benign(self) -> bool {
        matches!(
            self,
            Self::Busy | Self::NoResources | Self::MissingSysAttributes | Self::InvalidState
        )
    }
}

/// Failure reported by the peer store when a request is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// Flash operation already in progress
    Busy,
    /// Storage operation queue is full
    NoSpaceInQueues,
    /// Any other storage error code
    Other(u32),
}

impl StoreError {
    /// Whether the store will re-notify on its own, making a retry unnecessary
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Busy | Self::NoSpaceInQueues)
    }
}

/// Failure reported by the timer collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerError {
    /// No timer resource available
    NoResources,
    /// Any other timer error code
    Other(u32),
}

/// Unrecoverable failure: link security state can no longer be trusted
///
/// Returned from the dispatcher; the processor halts the device on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FatalError {
    /// Unexpected radio stack command failure
    Radio(RadioError),
    /// Storage request failed with a non-transient error
    Storage(StoreError),
    /// Bonding window timer could not be started
    Timer(TimerError),
    /// Peer record deletion failed
    PeerDeleteFailed(u32),
    /// Deleting all peer records failed
    PeersDeleteFailed(u32),
    /// Peer data update failed
    PeerDataUpdateFailed(u32),
    /// The security subsystem reported an unexpected error
    Unexpected(u32),
    /// Deferred work queue overflowed
    DeferredQueueFull,
}

impl From<TimerError> for FatalError {
    fn from(error: TimerError) -> Self {
        Self::Timer(error)
    }
}

/// Run a radio command, swallowing benign failures
pub(crate) fn radio_command(
    what: &'static str,
    result: Result<(), RadioError>,
) -> Result<(), FatalError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_benign() => {
            debug!("[RADIO] {} ignored: {:?}", what, e);
            Ok(())
        }
        Err(e) => {
            error!("[RADIO] {} failed: {:?}", what, e);
            Err(FatalError::Radio(e))
        }
    }
}

/// Options for configuring the orchestration core
///
/// # Examples
///
/// ```rust
/// # use critical_section as _;
/// use twinbond::{Options, AdvertisingOptions};
///
/// // A shorter bonding window with default advertising timings
/// let options = Options {
///     bonding_window_ms: 10_000,
///     ..Options::default()
/// };
/// assert_eq!(options.advertising, AdvertisingOptions::default());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Options {
    /// How long the device advertises openly to admit a second host, in milliseconds
    pub bonding_window_ms: u32,
    /// Maximum number of peers placed on the whitelist (clamped to [`WHITELIST_CAPACITY`])
    pub whitelist_capacity: usize,
    /// Advertising intervals and timeouts
    pub advertising: AdvertisingOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            bonding_window_ms: DEFAULT_BONDING_WINDOW_MS,
            whitelist_capacity: WHITELIST_CAPACITY,
            advertising: AdvertisingOptions::default(),
        }
    }
}
