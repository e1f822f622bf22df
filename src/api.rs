//! `Twinbond` API Functions
//!
//! Event sources (radio stack glue, security and storage callbacks, buttons,
//! timers) post into a single bounded static channel drained by
//! [`processor::run`](crate::processor::run). The async functions wait for
//! room in the queue; the `try_` variants never block and are safe to call
//! from interrupt or callback context.
//!
//! # Usage
//!
//! ```rust,ignore
//! use twinbond::api;
//!
//! // Button handler
//! api::try_bond_second_host().ok();
//!
//! // Timer task driving the bonding window
//! loop {
//!     match api::next_timer_request().await {
//!         api::TimerRequest::Start { duration_ms, generation } => {
//!             let expiry = Timer::after_millis(duration_ms.into());
//!             match select(expiry, api::next_timer_request()).await {
//!                 Either::First(()) => api::bonding_window_expired(generation).await,
//!                 Either::Second(_) => {}
//!             }
//!         }
//!         api::TimerRequest::Stop => {}
//!     }
//! }
//! ```

use crate::{
    ConnectionHandle, EVENT_CHANNEL, LinkRole, PeerAddress, PeerId, TIMER_SIGNAL, TimerError,
    event::{
        Event, RadioEvent, SecurityEvent, SecurityOutcome, SecurityProcedure, StorageEvent,
        TimerEvent, UserRequest,
    },
    stack::BondingTimer,
};
use embassy_sync::channel::TrySendError;

/// Post an event, waiting for room in the queue
pub async fn post(event: impl Into<Event>) {
    EVENT_CHANNEL.sender().send(event.into()).await;
}

/// Post an event without waiting
///
/// # Errors
///
/// Returns the event back if the queue is full.
pub fn try_post(event: impl Into<Event>) -> Result<(), TrySendError<Event>> {
    EVENT_CHANNEL.sender().try_send(event.into())
}

/// A peripheral or central link was established
pub async fn connected(handle: ConnectionHandle, role: LinkRole, peer: PeerAddress) {
    post(RadioEvent::Connected { handle, role, peer }).await;
}

/// A link was terminated
pub async fn disconnected(handle: ConnectionHandle) {
    post(RadioEvent::Disconnected { handle }).await;
}

/// A security procedure finished
pub async fn bonding_result(
    peer_id: PeerId,
    handle: ConnectionHandle,
    procedure: SecurityProcedure,
    outcome: SecurityOutcome,
) {
    post(SecurityEvent::BondingResult {
        peer_id,
        handle,
        procedure,
        outcome,
    })
    .await;
}

/// Flash is full
///
/// # Errors
///
/// Returns the event back if the queue is full.
pub fn try_storage_full() -> Result<(), TrySendError<Event>> {
    try_post(StorageEvent::StorageFull)
}

/// Ask to admit a second host
pub async fn bond_second_host() {
    post(UserRequest::BondSecondHost).await;
}

/// Ask to admit a second host, from interrupt context
///
/// # Errors
///
/// Returns the event back if the queue is full.
pub fn try_bond_second_host() -> Result<(), TrySendError<Event>> {
    try_post(UserRequest::BondSecondHost)
}

/// Ask to wipe every bond
pub async fn delete_all_bonds() {
    post(UserRequest::DeleteAllBonds).await;
}

/// Report that the bonding window timer started with `generation` fired
pub async fn bonding_window_expired(generation: u32) {
    post(TimerEvent::BondingWindowExpired { generation }).await;
}

/// Request to the application's timer task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerRequest {
    /// (Re)arm the bonding window timer
    Start {
        /// Countdown length in milliseconds
        duration_ms: u32,
        /// Echoed back in [`bonding_window_expired`]
        generation: u32,
    },
    /// Disarm the bonding window timer
    Stop,
}

/// Wait for the next timer request
///
/// Only the latest request is kept; a `Start` followed by a `Stop` before the
/// timer task wakes up is seen as `Stop`.
pub async fn next_timer_request() -> TimerRequest {
    TIMER_SIGNAL.wait().await
}

/// [`BondingTimer`] that forwards requests to the application's timer task
#[derive(Debug, Default, Clone, Copy)]
pub struct ChannelTimer;

impl BondingTimer for ChannelTimer {
    fn start(&mut self, duration_ms: u32, generation: u32) -> Result<(), TimerError> {
        TIMER_SIGNAL.signal(TimerRequest::Start {
            duration_ms,
            generation,
        });
        Ok(())
    }

    fn stop(&mut self) {
        TIMER_SIGNAL.signal(TimerRequest::Stop);
    }
}
