//! Collaborator seams
//!
//! The orchestration core never talks to hardware directly. Every side effect
//! goes through one of the traits below, and every trait call is
//! fire-and-forget: the synchronous `Result` only says whether the request was
//! accepted. Completions come back later as [`Event`](crate::Event)s.

use crate::{
    ConnectionHandle, PeerAddress, PeerId, PeerIdentity, RadioError, StoreError, TimerError,
    address::IdentityKey, advertising::AdvertisingMode, bonding::HostOrdinal,
};

/// Radio stack commands (advertising, links, connection filtering)
pub trait RadioStack {
    /// Start advertising in the given mode
    ///
    /// # Errors
    /// Returns the stack's rejection reason
    fn start_advertising(&mut self, mode: AdvertisingMode) -> Result<(), RadioError>;

    /// Stop advertising
    ///
    /// # Errors
    /// [`RadioError::InvalidState`] when advertising was not running
    fn stop_advertising(&mut self) -> Result<(), RadioError>;

    /// Request termination of a link
    ///
    /// # Errors
    /// Returns the stack's rejection reason
    fn disconnect(&mut self, handle: ConnectionHandle) -> Result<(), RadioError>;

    /// Replace the connection whitelist
    ///
    /// # Errors
    /// Returns the stack's rejection reason
    fn set_whitelist(&mut self, addrs: &[PeerAddress]) -> Result<(), RadioError>;

    /// Replace the list of identities used to resolve private addresses
    ///
    /// # Errors
    /// [`RadioError::NotSupported`] on stacks without address resolution
    fn set_identity_keys(&mut self, identities: &[PeerIdentity]) -> Result<(), RadioError>;

    /// Answer a whitelist request from the advertising module
    ///
    /// # Errors
    /// Returns the stack's rejection reason
    fn reply_whitelist(&mut self, addrs: &[PeerAddress], irks: &[IdentityKey])
    -> Result<(), RadioError>;
}

/// Persistent bonded-peer storage
pub trait PeerStore {
    /// Next stored peer after `after`, or the first one when `after` is `None`
    fn next_peer_id(&self, after: Option<PeerId>) -> Option<PeerId>;

    /// Number of stored peers
    fn peer_count(&self) -> usize;

    /// Identity of a stored peer, if its bonding data is readable
    fn identity(&self, peer: PeerId) -> Option<PeerIdentity>;

    /// Queue deletion of one peer record
    ///
    /// The peer is no longer enumerated once the request is accepted, even
    /// though the flash write completes later.
    ///
    /// # Errors
    /// Returns the store's rejection reason
    fn delete_peer(&mut self, peer: PeerId) -> Result<(), StoreError>;

    /// Queue deletion of every peer record
    ///
    /// # Errors
    /// Returns the store's rejection reason
    fn delete_all_peers(&mut self) -> Result<(), StoreError>;

    /// Start reclaiming flash space
    ///
    /// # Errors
    /// [`StoreError::Busy`] or [`StoreError::NoSpaceInQueues`] when another
    /// operation is in flight; the store notifies again when it fills up
    fn garbage_collect(&mut self) -> Result<(), StoreError>;

    /// Answer a re-pairing configuration request
    ///
    /// # Errors
    /// Returns the store's rejection reason
    fn reply_security_config(
        &mut self,
        handle: ConnectionHandle,
        allow_repairing: bool,
    ) -> Result<(), StoreError>;
}

/// Single-shot bonding window timer
///
/// On expiry the implementation posts
/// [`TimerEvent::BondingWindowExpired`](crate::event::TimerEvent::BondingWindowExpired)
/// carrying the `generation` it was started with.
pub trait BondingTimer {
    /// Arm the timer, replacing any countdown in progress
    ///
    /// # Errors
    /// Returns an error if no timer resource is available
    fn start(&mut self, duration_ms: u32, generation: u32) -> Result<(), TimerError>;

    /// Disarm the timer. Stopping an idle timer is a no-op.
    fn stop(&mut self);
}

/// Connection status indication (LEDs, display)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IndicatorCommand {
    /// Advertising started or changed mode
    Advertising(AdvertisingMode),
    /// Advertising stopped
    AdvertisingStopped,
    /// A host connected
    Connected {
        /// Which host it is
        ordinal: HostOrdinal,
    },
    /// A host disconnected
    Disconnected {
        /// Which host it was
        ordinal: HostOrdinal,
    },
    /// Bonding window opened or closed
    BondingWindow(bool),
}

/// Sink for [`IndicatorCommand`]s
pub trait Indicator {
    /// Show a status change
    fn indicate(&mut self, command: IndicatorCommand);
}

impl Indicator for () {
    fn indicate(&mut self, _command: IndicatorCommand) {}
}

/// All collaborators the orchestration core drives
pub struct Stack<R, S, T, I = ()> {
    /// Radio stack
    pub radio: R,
    /// Peer store
    pub store: S,
    /// Bonding window timer
    pub timer: T,
    /// Status indicator
    pub indicator: I,
}

impl<R, S, T> Stack<R, S, T, ()>
where
    R: RadioStack,
    S: PeerStore,
    T: BondingTimer,
{
    /// Bundle collaborators without a status indicator
    pub const fn new(radio: R, store: S, timer: T) -> Self {
        Self {
            radio,
            store,
            timer,
            indicator: (),
        }
    }
}

impl<R, S, T, I> Stack<R, S, T, I>
where
    R: RadioStack,
    S: PeerStore,
    T: BondingTimer,
    I: Indicator,
{
    /// Bundle collaborators with a status indicator
    pub const fn with_indicator(radio: R, store: S, timer: T, indicator: I) -> Self {
        Self {
            radio,
            store,
            timer,
            indicator,
        }
    }
}
