//! Tagged events consumed by the [`EventDispatcher`](crate::EventDispatcher)
//!
//! One variant per event source. The radio stack, the security subsystem, the
//! peer store, the bonding window timer and the user all feed the same queue.

use crate::{ConnectionHandle, LinkRole, PeerAddress, PeerId, RadioError};

/// Anything the orchestration core reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Radio / link-layer notification
    Radio(RadioEvent),
    /// Security (pairing/bonding) subsystem notification
    Security(SecurityEvent),
    /// Peer store notification
    Storage(StorageEvent),
    /// Timer expiry
    Timer(TimerEvent),
    /// User action
    Request(UserRequest),
}

/// Radio stack notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioEvent {
    /// A link was established
    Connected {
        /// Link handle
        handle: ConnectionHandle,
        /// Role this device plays on the link
        role: LinkRole,
        /// Peer address as seen on air
        peer: PeerAddress,
    },
    /// A link was terminated
    Disconnected {
        /// Link handle
        handle: ConnectionHandle,
    },
    /// The advertising procedure needs the current whitelist
    WhitelistRequested,
    /// The current advertising period elapsed without a connection
    AdvertisingTimedOut,
    /// A GATT procedure on the link timed out
    LinkTimedOut {
        /// Link handle
        handle: ConnectionHandle,
    },
    /// A queued radio command failed after it was accepted
    CommandFailed(RadioError),
}

/// Which security procedure a result belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SecurityProcedure {
    /// Link re-encrypted with existing keys
    Encryption,
    /// Keys exchanged and persisted
    Bonding,
    /// Keys exchanged but not persisted
    Pairing,
}

/// Outcome of a security procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SecurityOutcome {
    /// Procedure succeeded
    Success,
    /// Procedure failed with the given error code
    Failed(u32),
}

/// Security subsystem notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SecurityEvent {
    /// A security procedure finished
    BondingResult {
        /// Peer record the procedure refers to
        peer_id: PeerId,
        /// Link the procedure ran on
        handle: ConnectionHandle,
        /// Which procedure
        procedure: SecurityProcedure,
        /// How it ended
        outcome: SecurityOutcome,
    },
    /// An already bonded peer connected and was recognised
    BondedPeerConnected {
        /// Recognised peer
        peer_id: PeerId,
        /// Its link
        handle: ConnectionHandle,
    },
    /// The peer asked to pair again although it is already bonded
    ConfigRequested {
        /// Link the request arrived on
        handle: ConnectionHandle,
    },
}

/// Kind of record a peer-data update touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PeerDataKind {
    /// Bonding keys and identity
    Bonding,
    /// Any other per-peer record (service cache, application data)
    Other,
}

/// Peer store notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageEvent {
    /// Flash is full; garbage collection is needed
    StorageFull,
    /// Garbage collection finished
    GarbageCollected,
    /// A peer record was written
    PeerDataUpdated {
        /// Peer the record belongs to
        peer_id: PeerId,
        /// Record kind
        data: PeerDataKind,
        /// Whether flash contents actually changed
        flash_changed: bool,
    },
    /// Writing a peer record failed
    PeerDataUpdateFailed(u32),
    /// A peer record was deleted
    PeerDeleted(PeerId),
    /// Deleting a peer record failed
    PeerDeleteFailed(u32),
    /// All peer records were deleted
    AllPeersDeleted,
    /// Deleting all peer records failed
    AllPeersDeleteFailed(u32),
    /// The security subsystem reported an unexpected internal error
    UnexpectedError(u32),
}

/// Timer notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerEvent {
    /// The bonding window timer fired
    BondingWindowExpired {
        /// Generation passed to the [`start`](crate::BondingTimer::start)
        /// that armed the timer
        generation: u32,
    },
}

/// User actions (buttons, console)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UserRequest {
    /// Open the bonding window to admit a second host
    BondSecondHost,
    /// Wipe every bond
    DeleteAllBonds,
}

impl From<RadioEvent> for Event {
    fn from(event: RadioEvent) -> Self {
        Self::Radio(event)
    }
}

impl From<SecurityEvent> for Event {
    fn from(event: SecurityEvent) -> Self {
        Self::Security(event)
    }
}

impl From<StorageEvent> for Event {
    fn from(event: StorageEvent) -> Self {
        Self::Storage(event)
    }
}

impl From<TimerEvent> for Event {
    fn from(event: TimerEvent) -> Self {
        Self::Timer(event)
    }
}

impl From<UserRequest> for Event {
    fn from(request: UserRequest) -> Self {
        Self::Request(request)
    }
}
