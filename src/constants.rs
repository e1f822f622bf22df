//! `Twinbond` Constants
//!
//! Limits, default timings and queue sizes used throughout the crate.

/// Maximum number of simultaneous peripheral links
///
/// The dual-host handover assumes exactly two: the host being served and the
/// host being admitted.
pub const PERIPHERAL_LINK_CAPACITY: usize = 2;

/// Maximum number of entries in the radio's filter-accept (whitelist) list
pub const WHITELIST_CAPACITY: usize = 8;

/// Maximum number of pending events in the ingress channel
pub const EVENT_QUEUE_SIZE: usize = 10;

/// Maximum number of deferred work items created while handling one event
pub const DEFERRED_QUEUE_SIZE: usize = 4;

/// Maximum number of queued HCI commands awaiting execution
pub const HCI_COMMAND_QUEUE_SIZE: usize = 32;

/// Default bonding window length in milliseconds
pub const DEFAULT_BONDING_WINDOW_MS: u32 = 30_000;

/// Fast advertising interval in 0.625 ms units (25 ms)
pub const ADV_FAST_INTERVAL: u16 = 0x0028;

/// Slow advertising interval in 0.625 ms units (2 s)
pub const ADV_SLOW_INTERVAL: u16 = 0x0C80;

/// Duration of the fast advertising period in seconds
pub const ADV_FAST_TIMEOUT_S: u16 = 30;

/// Duration of the slow advertising period in seconds
pub const ADV_SLOW_TIMEOUT_S: u16 = 180;

/// `BD_ADDR` length in bytes
pub const BD_ADDR_LENGTH: usize = 6;

/// Identity Resolving Key length in bytes
pub const IRK_LENGTH: usize = 16;
