//! Dual-host bonding orchestration
//!
//! The device keeps exactly one bonded host. While that host is connected the
//! user may open a bonding window: for a bounded time the device advertises
//! without whitelist filtering so a second host can connect and bond. Once the
//! second host has bonded, every other peer record is deleted and the first
//! host's link is terminated.
//!
//! ## States
//!
//! ```text
//! Idle ──start──▶ AdvertisingWhitelisted ──connect──▶ ConnectedSingle
//!                                                       │     ▲
//!                                     bond second host  │     │ window timeout
//!                                                       ▼     │
//!                                               BondingWindowOpen
//!                                                       │
//!                                                connect│
//!                                                       ▼
//!                                                SecuringSecond ──bonded──▶ EvictingFirst
//! ```
//!
//! With nothing connected the state follows the advertising mode: a store
//! with no usable identity yields `AdvertisingOpen`, an advertising period
//! that ran out yields `Idle`.
//!
//! Peer deletion never runs inside the bonding result handler. It is queued
//! as [`DeferredWork`] and executed by [`BondingOrchestrator::run_deferred`]
//! once the handler has returned.

use crate::{
    ConnectionHandle, FatalError, LinkRole, Options, PeerAddress, PeerId,
    advertising::{AdvertisingController, AdvertisingMode},
    constants::{DEFERRED_QUEUE_SIZE, PERIPHERAL_LINK_CAPACITY},
    event::{SecurityOutcome, SecurityProcedure},
    radio_command,
    stack::{BondingTimer, Indicator, IndicatorCommand, PeerStore, RadioStack, Stack},
};
use heapless::{Deque, Vec};

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    /// Nothing connected, not advertising
    #[default]
    Idle,
    /// Nothing connected, advertising for bonded hosts
    AdvertisingWhitelisted,
    /// Nothing connected, advertising to anyone since no bonded host can be
    /// filtered for
    AdvertisingOpen,
    /// One host connected
    ConnectedSingle,
    /// One host connected, advertising openly for a second one
    BondingWindowOpen,
    /// Two hosts connected, waiting for the second to bond
    SecuringSecond,
    /// Second host bonded, first host's link is being terminated
    EvictingFirst,
}

/// Which of the two hosts a link belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostOrdinal {
    /// The host being served
    First,
    /// The host being admitted
    Second,
}

/// One live peripheral link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionSlot {
    /// Link handle
    pub handle: ConnectionHandle,
    /// Always [`LinkRole::Peripheral`]; other links are not tracked
    pub role: LinkRole,
    /// First or second host
    pub ordinal: HostOrdinal,
    /// Peer address as seen on air
    pub address: PeerAddress,
    /// Bonded peer record, once known
    pub peer: Option<PeerId>,
}

/// Second-host admission window
///
/// `armed` holds only while exactly one link is live and a second-host
/// request was accepted. The timer may outlive the armed flag; its firing is
/// then stale. Every timer start gets a new generation, so an expiry queued
/// by an earlier window is told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BondingWindow {
    armed: bool,
    timer_running: bool,
    generation: u32,
}

impl BondingWindow {
    /// Whether a second host is currently being admitted
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.armed
    }

    /// Whether the window timer has been started and not yet stopped or fired
    #[must_use]
    pub const fn is_timer_running(&self) -> bool {
        self.timer_running
    }

    /// Generation of the most recent timer start
    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

/// Work that must run after the current event handler has returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeferredWork {
    /// Delete every peer record except `keep`, then drop links not on `handle`
    EvictStalePeers {
        /// Freshly bonded peer
        keep: PeerId,
        /// Link it bonded on
        handle: ConnectionHandle,
    },
}

/// Central connection and bonding state machine
#[derive(Debug)]
pub struct BondingOrchestrator {
    state: LinkState,
    slots: Vec<ConnectionSlot, PERIPHERAL_LINK_CAPACITY>,
    window: BondingWindow,
    advertising: AdvertisingController,
    deferred: Deque<DeferredWork, DEFERRED_QUEUE_SIZE>,
    bonding_window_ms: u32,
}

impl BondingOrchestrator {
    /// Create an idle orchestrator
    #[must_use]
    pub fn new(options: &Options) -> Self {
        Self {
            state: LinkState::Idle,
            slots: Vec::new(),
            window: BondingWindow::default(),
            advertising: AdvertisingController::new(
                options.advertising,
                options.whitelist_capacity,
            ),
            deferred: Deque::new(),
            bonding_window_ms: options.bonding_window_ms,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> LinkState {
        self.state
    }

    /// Live peripheral links, oldest first
    #[must_use]
    pub fn slots(&self) -> &[ConnectionSlot] {
        &self.slots
    }

    /// Number of live peripheral links
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.slots.len()
    }

    /// Bonding window
    #[must_use]
    pub const fn window(&self) -> BondingWindow {
        self.window
    }

    /// Advertising controller
    #[must_use]
    pub const fn advertising(&self) -> &AdvertisingController {
        &self.advertising
    }

    /// Whether deferred work is waiting to run
    #[must_use]
    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Boot: advertise for bonded hosts, or openly when none is bonded
    ///
    /// # Errors
    /// Unexpected radio failures are fatal
    pub fn start<R, S, T, I>(&mut self, stack: &mut Stack<R, S, T, I>) -> Result<(), FatalError>
    where
        R: RadioStack,
        S: PeerStore,
        T: BondingTimer,
        I: Indicator,
    {
        info!("[BONDING] Starting with {} bonded peers", stack.store.peer_count());
        self.advertising.start_whitelisted(stack)?;
        self.refresh_unconnected_state();
        Ok(())
    }

    /// A link was established
    ///
    /// Central links are not tracked. A link beyond capacity is refused.
    ///
    /// # Errors
    /// Unexpected radio failures are fatal
    pub fn on_connect<R, S, T, I>(
        &mut self,
        stack: &mut Stack<R, S, T, I>,
        handle: ConnectionHandle,
        role: LinkRole,
        address: PeerAddress,
    ) -> Result<(), FatalError>
    where
        R: RadioStack,
        S: PeerStore,
        T: BondingTimer,
        I: Indicator,
    {
        if role != LinkRole::Peripheral {
            debug!("[BONDING] Ignoring {:?} link 0x{:04x}", role, handle.raw());
            return Ok(());
        }
        if self.slot_index(handle).is_some() {
            warn!("[BONDING] Link 0x{:04x} already tracked", handle.raw());
            return Ok(());
        }

        let ordinal = if self.slots.is_empty() {
            HostOrdinal::First
        } else {
            HostOrdinal::Second
        };
        let slot = ConnectionSlot {
            handle,
            role,
            ordinal,
            address,
            peer: None,
        };
        if self.slots.push(slot).is_err() {
            warn!("[BONDING] Link capacity reached, refusing 0x{:04x}", handle.raw());
            return radio_command("disconnect", stack.radio.disconnect(handle));
        }

        info!(
            "[BONDING] Link 0x{:04x} established ({:?} host)",
            handle.raw(),
            ordinal
        );
        self.advertising.stop(stack)?;

        match ordinal {
            HostOrdinal::First => {
                self.state = LinkState::ConnectedSingle;
            }
            HostOrdinal::Second => {
                if self.window.armed {
                    self.window.armed = false;
                    stack.indicator.indicate(IndicatorCommand::BondingWindow(false));
                } else {
                    debug!("[BONDING] Second host connected without an open window");
                }
                self.state = LinkState::SecuringSecond;
            }
        }
        stack.indicator.indicate(IndicatorCommand::Connected { ordinal });
        Ok(())
    }

    /// A link was terminated
    ///
    /// With no link left the window is closed and whitelisted advertising
    /// restarts. With one left, that host becomes the first host.
    ///
    /// # Errors
    /// Unexpected radio failures are fatal
    pub fn on_disconnect<R, S, T, I>(
        &mut self,
        stack: &mut Stack<R, S, T, I>,
        handle: ConnectionHandle,
    ) -> Result<(), FatalError>
    where
        R: RadioStack,
        S: PeerStore,
        T: BondingTimer,
        I: Indicator,
    {
        let Some(index) = self.slot_index(handle) else {
            debug!("[BONDING] Disconnect of untracked link 0x{:04x}", handle.raw());
            return Ok(());
        };
        let slot = self.slots.remove(index);
        info!(
            "[BONDING] Link 0x{:04x} ({:?} host) disconnected",
            handle.raw(),
            slot.ordinal
        );
        stack.indicator.indicate(IndicatorCommand::Disconnected {
            ordinal: slot.ordinal,
        });

        if self.slots.is_empty() {
            self.close_window(stack);
            self.advertising.start_whitelisted(stack)?;
            self.refresh_unconnected_state();
        } else {
            for remaining in &mut self.slots {
                remaining.ordinal = HostOrdinal::First;
            }
            self.state = LinkState::ConnectedSingle;
        }
        Ok(())
    }

    /// User asked to admit a second host
    ///
    /// Ignored unless exactly one link is live and no window is armed.
    ///
    /// # Errors
    /// Timer or unexpected radio failures are fatal
    pub fn request_second_host_bonding<R, S, T, I>(
        &mut self,
        stack: &mut Stack<R, S, T, I>,
    ) -> Result<(), FatalError>
    where
        R: RadioStack,
        S: PeerStore,
        T: BondingTimer,
        I: Indicator,
    {
        if self.window.armed {
            debug!("[BONDING] Bonding window already open");
            return Ok(());
        }
        if self.slots.len() != 1 {
            debug!(
                "[BONDING] Second host bonding needs exactly one link, have {}",
                self.slots.len()
            );
            return Ok(());
        }

        if self.window.timer_running {
            stack.timer.stop();
        }
        let generation = self.window.generation.wrapping_add(1);
        stack.timer.start(self.bonding_window_ms, generation)?;
        self.window = BondingWindow {
            armed: true,
            timer_running: true,
            generation,
        };
        self.state = LinkState::BondingWindowOpen;
        info!(
            "[BONDING] Bonding window open for {} ms",
            self.bonding_window_ms
        );

        self.advertising.restart_without_whitelist(stack)?;
        stack.indicator.indicate(IndicatorCommand::BondingWindow(true));
        Ok(())
    }

    /// A security procedure finished
    ///
    /// Only a successful bonding acts: the window closes and eviction of every
    /// other peer record is deferred.
    ///
    /// # Errors
    /// [`FatalError::DeferredQueueFull`] if the eviction cannot be queued
    pub fn on_bonding_result<R, S, T, I>(
        &mut self,
        stack: &mut Stack<R, S, T, I>,
        peer_id: PeerId,
        handle: ConnectionHandle,
        procedure: SecurityProcedure,
        outcome: SecurityOutcome,
    ) -> Result<(), FatalError>
    where
        R: RadioStack,
        S: PeerStore,
        T: BondingTimer,
        I: Indicator,
    {
        match (procedure, outcome) {
            (SecurityProcedure::Bonding, SecurityOutcome::Success) => {}
            (_, SecurityOutcome::Failed(code)) => {
                warn!(
                    "[BONDING] {:?} on 0x{:04x} failed: 0x{:x}",
                    procedure,
                    handle.raw(),
                    code
                );
                return Ok(());
            }
            _ => {
                debug!("[BONDING] Link 0x{:04x} secured by {:?}", handle.raw(), procedure);
                self.associate(handle, peer_id);
                return Ok(());
            }
        }

        info!(
            "[BONDING] Peer {} bonded on 0x{:04x}",
            peer_id.0,
            handle.raw()
        );
        self.associate(handle, peer_id);
        self.close_window(stack);

        self.deferred
            .push_back(DeferredWork::EvictStalePeers {
                keep: peer_id,
                handle,
            })
            .map_err(|_| FatalError::DeferredQueueFull)
    }

    /// The bonding window timer started with `generation` fired
    ///
    /// Only acts on the running timer of the latest window, and only while
    /// exactly one link is live; otherwise a second host already arrived and
    /// the firing is stale.
    ///
    /// # Errors
    /// Unexpected radio failures are fatal
    pub fn on_bonding_window_timeout<R, S, T, I>(
        &mut self,
        stack: &mut Stack<R, S, T, I>,
        generation: u32,
    ) -> Result<(), FatalError>
    where
        R: RadioStack,
        S: PeerStore,
        T: BondingTimer,
        I: Indicator,
    {
        if !self.window.timer_running || generation != self.window.generation {
            debug!(
                "[BONDING] Stale bonding window timeout (generation {}, current {})",
                generation,
                self.window.generation
            );
            return Ok(());
        }
        self.window.timer_running = false;

        if self.slots.len() != 1 {
            debug!(
                "[BONDING] Stale bonding window timeout with {} links",
                self.slots.len()
            );
            return Ok(());
        }

        info!("[BONDING] Bonding window closed without a second host");
        self.advertising.stop(stack)?;
        if self.window.armed {
            self.window.armed = false;
            stack.indicator.indicate(IndicatorCommand::BondingWindow(false));
        }
        self.state = LinkState::ConnectedSingle;
        Ok(())
    }

    /// The current advertising period ended without a connection
    ///
    /// # Errors
    /// Unexpected radio failures are fatal
    pub fn on_advertising_timeout<R, S, T, I>(
        &mut self,
        stack: &mut Stack<R, S, T, I>,
    ) -> Result<(), FatalError>
    where
        R: RadioStack,
        S: PeerStore,
        T: BondingTimer,
        I: Indicator,
    {
        self.advertising.on_timeout(stack)?;
        self.refresh_unconnected_state();
        Ok(())
    }

    /// Every bond was wiped; only open advertising can admit a host now
    ///
    /// # Errors
    /// Unexpected radio failures are fatal
    pub fn on_all_peers_deleted<R, S, T, I>(
        &mut self,
        stack: &mut Stack<R, S, T, I>,
    ) -> Result<(), FatalError>
    where
        R: RadioStack,
        S: PeerStore,
        T: BondingTimer,
        I: Indicator,
    {
        self.advertising.restart_without_whitelist(stack)?;
        self.refresh_unconnected_state();
        Ok(())
    }

    /// A bonded peer was recognised on a link
    pub fn on_bonded_peer_connected(&mut self, peer_id: PeerId, handle: ConnectionHandle) {
        debug!(
            "[BONDING] Bonded peer {} on 0x{:04x}",
            peer_id.0,
            handle.raw()
        );
        self.associate(handle, peer_id);
    }

    /// A GATT procedure timed out; the link is dropped
    ///
    /// # Errors
    /// Unexpected radio failures are fatal
    pub fn on_link_timeout<R, S, T, I>(
        &mut self,
        stack: &mut Stack<R, S, T, I>,
        handle: ConnectionHandle,
    ) -> Result<(), FatalError>
    where
        R: RadioStack,
        S: PeerStore,
        T: BondingTimer,
        I: Indicator,
    {
        warn!("[BONDING] GATT timeout on 0x{:04x}", handle.raw());
        radio_command("disconnect", stack.radio.disconnect(handle))
    }

    /// An already bonded peer asked to pair again; refused
    ///
    /// # Errors
    /// Non-transient storage failures are fatal
    pub fn on_config_requested<R, S, T, I>(
        &mut self,
        stack: &mut Stack<R, S, T, I>,
        handle: ConnectionHandle,
    ) -> Result<(), FatalError>
    where
        R: RadioStack,
        S: PeerStore,
        T: BondingTimer,
        I: Indicator,
    {
        debug!("[BONDING] Refusing re-pairing on 0x{:04x}", handle.raw());
        match stack.store.reply_security_config(handle, false) {
            Err(e) if !e.is_transient() => Err(FatalError::Storage(e)),
            _ => Ok(()),
        }
    }

    /// Run all queued deferred work
    ///
    /// # Errors
    /// Peer deletion failures and unexpected radio failures are fatal
    pub fn run_deferred<R, S, T, I>(
        &mut self,
        stack: &mut Stack<R, S, T, I>,
    ) -> Result<(), FatalError>
    where
        R: RadioStack,
        S: PeerStore,
        T: BondingTimer,
        I: Indicator,
    {
        while let Some(work) = self.deferred.pop_front() {
            match work {
                DeferredWork::EvictStalePeers { keep, handle } => {
                    self.evict_stale_peers(stack, keep, handle)?;
                }
            }
        }
        Ok(())
    }

    fn evict_stale_peers<R, S, T, I>(
        &mut self,
        stack: &mut Stack<R, S, T, I>,
        keep: PeerId,
        handle: ConnectionHandle,
    ) -> Result<(), FatalError>
    where
        R: RadioStack,
        S: PeerStore,
        T: BondingTimer,
        I: Indicator,
    {
        let total = stack.store.peer_count();
        info!(
            "[BONDING] Evicting all of {} peers except {}",
            total,
            keep.0
        );

        // Deleted peers leave the enumeration at once, so the cursor only
        // advances past the kept one.
        let mut cursor = None;
        for _ in 0..total {
            let Some(peer) = stack.store.next_peer_id(cursor) else {
                break;
            };
            if peer == keep {
                cursor = Some(peer);
                continue;
            }
            stack.store.delete_peer(peer).map_err(FatalError::Storage)?;
            debug!("[BONDING] Deleting peer {}", peer.0);
        }

        if self.slots.len() == PERIPHERAL_LINK_CAPACITY {
            let mut superseded: Vec<ConnectionHandle, PERIPHERAL_LINK_CAPACITY> = Vec::new();
            for slot in self.slots.iter().filter(|slot| slot.handle != handle) {
                superseded.push(slot.handle).ok();
            }
            for stale in superseded {
                info!("[BONDING] Disconnecting superseded link 0x{:04x}", stale.raw());
                radio_command("disconnect", stack.radio.disconnect(stale))?;
            }
            self.state = LinkState::EvictingFirst;
        } else if !self.slots.is_empty() {
            self.state = LinkState::ConnectedSingle;
        }
        Ok(())
    }

    fn close_window<R, S, T, I>(&mut self, stack: &mut Stack<R, S, T, I>)
    where
        R: RadioStack,
        S: PeerStore,
        T: BondingTimer,
        I: Indicator,
    {
        if self.window.timer_running {
            stack.timer.stop();
        }
        if self.window.armed {
            stack.indicator.indicate(IndicatorCommand::BondingWindow(false));
        }
        self.window.armed = false;
        self.window.timer_running = false;
    }

    /// Follow the advertising mode while no host is connected
    fn refresh_unconnected_state(&mut self) {
        if !self.slots.is_empty() {
            return;
        }
        self.state = match self.advertising.mode() {
            AdvertisingMode::Idle => LinkState::Idle,
            mode if mode.is_filtered() => LinkState::AdvertisingWhitelisted,
            _ => LinkState::AdvertisingOpen,
        };
    }

    fn associate(&mut self, handle: ConnectionHandle, peer_id: PeerId) {
        if let Some(index) = self.slot_index(handle) {
            self.slots[index].peer = Some(peer_id);
        }
    }

    fn slot_index(&self, handle: ConnectionHandle) -> Option<usize> {
        self.slots.iter().position(|slot| slot.handle == handle)
    }
}
