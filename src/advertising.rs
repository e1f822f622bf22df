//! Advertising mode control
//!
//! Tracks which advertising mode the radio was last asked to run and turns
//! whitelist requests and advertising timeouts into radio commands.

use crate::{
    FatalError, RadioError,
    constants::{ADV_FAST_INTERVAL, ADV_FAST_TIMEOUT_S, ADV_SLOW_INTERVAL, ADV_SLOW_TIMEOUT_S},
    radio_command,
    stack::{BondingTimer, Indicator, IndicatorCommand, PeerStore, RadioStack, Stack},
    whitelist::{Whitelist, WhitelistBuilder},
};

/// Advertising mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvertisingMode {
    /// Not advertising
    #[default]
    Idle,
    /// Fast interval, only whitelisted peers may connect
    WhitelistedFast,
    /// Slow interval, only whitelisted peers may connect
    WhitelistedSlow,
    /// Fast interval, anyone may connect
    OpenFast,
    /// Slow interval, anyone may connect
    OpenSlow,
}

impl AdvertisingMode {
    /// Whether the radio filters connection requests with the whitelist
    #[must_use]
    pub const fn is_filtered(self) -> bool {
        matches!(self, Self::WhitelistedFast | Self::WhitelistedSlow)
    }

    /// Whether this is a fast interval mode
    #[must_use]
    pub const fn is_fast(self) -> bool {
        matches!(self, Self::WhitelistedFast | Self::OpenFast)
    }
}

/// Advertising intervals and timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvertisingOptions {
    /// Fast interval in 0.625 ms units
    pub fast_interval: u16,
    /// Fast period length in seconds
    pub fast_timeout_s: u16,
    /// Slow interval in 0.625 ms units
    pub slow_interval: u16,
    /// Slow period length in seconds
    pub slow_timeout_s: u16,
    /// Fall back to slow advertising after the fast period; otherwise stop
    pub slow_enabled: bool,
}

impl AdvertisingOptions {
    /// Advertising interval used in `mode`, in 0.625 ms units
    #[must_use]
    pub const fn interval(&self, mode: AdvertisingMode) -> u16 {
        if mode.is_fast() {
            self.fast_interval
        } else {
            self.slow_interval
        }
    }

    /// Length of the advertising period in `mode`, in seconds
    #[must_use]
    pub const fn timeout_s(&self, mode: AdvertisingMode) -> u16 {
        if mode.is_fast() {
            self.fast_timeout_s
        } else {
            self.slow_timeout_s
        }
    }
}

impl Default for AdvertisingOptions {
    fn default() -> Self {
        Self {
            fast_interval: ADV_FAST_INTERVAL,
            fast_timeout_s: ADV_FAST_TIMEOUT_S,
            slow_interval: ADV_SLOW_INTERVAL,
            slow_timeout_s: ADV_SLOW_TIMEOUT_S,
            slow_enabled: true,
        }
    }
}

/// Starts, stops and escalates advertising
#[derive(Debug)]
pub struct AdvertisingController {
    mode: AdvertisingMode,
    options: AdvertisingOptions,
    whitelist_capacity: usize,
}

impl AdvertisingController {
    /// Create an idle controller
    #[must_use]
    pub const fn new(options: AdvertisingOptions, whitelist_capacity: usize) -> Self {
        Self {
            mode: AdvertisingMode::Idle,
            options,
            whitelist_capacity,
        }
    }

    /// Mode the radio was last asked to run
    #[must_use]
    pub const fn mode(&self) -> AdvertisingMode {
        self.mode
    }

    /// Start advertising in `mode`; [`AdvertisingMode::Idle`] stops instead
    ///
    /// A running procedure is stopped first.
    ///
    /// # Errors
    /// Unexpected radio failures are fatal
    pub fn start<R, S, T, I>(
        &mut self,
        stack: &mut Stack<R, S, T, I>,
        mode: AdvertisingMode,
    ) -> Result<(), FatalError>
    where
        R: RadioStack,
        S: PeerStore,
        T: BondingTimer,
        I: Indicator,
    {
        if mode == AdvertisingMode::Idle {
            return self.stop(stack);
        }
        if self.mode != AdvertisingMode::Idle {
            radio_command("stop advertising", stack.radio.stop_advertising())?;
            self.mode = AdvertisingMode::Idle;
        }

        match stack.radio.start_advertising(mode) {
            Ok(()) => {
                info!(
                    "[ADVERTISING] {:?} started, interval {}",
                    mode,
                    self.options.interval(mode)
                );
                self.mode = mode;
                stack.indicator.indicate(IndicatorCommand::Advertising(mode));
                Ok(())
            }
            Err(e) => radio_command("start advertising", Err(e)),
        }
    }

    /// Start filtered advertising with a freshly built whitelist
    ///
    /// Falls back to open advertising when no bonded peer has a readable
    /// identity, since a filtered procedure with an empty list admits nobody.
    ///
    /// # Errors
    /// Unexpected radio failures are fatal
    pub fn start_whitelisted<R, S, T, I>(
        &mut self,
        stack: &mut Stack<R, S, T, I>,
    ) -> Result<(), FatalError>
    where
        R: RadioStack,
        S: PeerStore,
        T: BondingTimer,
        I: Indicator,
    {
        let whitelist = self.apply_whitelist(stack)?;
        if whitelist.is_empty() {
            debug!("[ADVERTISING] Empty whitelist, advertising openly");
            self.start(stack, AdvertisingMode::OpenFast)
        } else {
            self.start(stack, AdvertisingMode::WhitelistedFast)
        }
    }

    /// Switch to open fast advertising
    ///
    /// A no-op when already advertising openly at the fast interval.
    ///
    /// # Errors
    /// Unexpected radio failures are fatal
    pub fn restart_without_whitelist<R, S, T, I>(
        &mut self,
        stack: &mut Stack<R, S, T, I>,
    ) -> Result<(), FatalError>
    where
        R: RadioStack,
        S: PeerStore,
        T: BondingTimer,
        I: Indicator,
    {
        if self.mode == AdvertisingMode::OpenFast {
            debug!("[ADVERTISING] Already advertising without whitelist");
            return Ok(());
        }
        self.start(stack, AdvertisingMode::OpenFast)
    }

    /// Stop advertising
    ///
    /// The radio stops on its own when a link is established, so an
    /// "invalid state" answer is expected and swallowed.
    ///
    /// # Errors
    /// Unexpected radio failures are fatal
    pub fn stop<R, S, T, I>(&mut self, stack: &mut Stack<R, S, T, I>) -> Result<(), FatalError>
    where
        R: RadioStack,
        S: PeerStore,
        T: BondingTimer,
        I: Indicator,
    {
        if self.mode == AdvertisingMode::Idle {
            return Ok(());
        }
        radio_command("stop advertising", stack.radio.stop_advertising())?;
        info!("[ADVERTISING] Stopped ({:?})", self.mode);
        self.mode = AdvertisingMode::Idle;
        stack.indicator.indicate(IndicatorCommand::AdvertisingStopped);
        Ok(())
    }

    /// Answer the radio's mid-procedure whitelist request with a fresh snapshot
    ///
    /// # Errors
    /// Unexpected radio failures are fatal
    pub fn on_whitelist_requested<R, S, T, I>(
        &self,
        stack: &mut Stack<R, S, T, I>,
    ) -> Result<(), FatalError>
    where
        R: RadioStack,
        S: PeerStore,
        T: BondingTimer,
        I: Indicator,
    {
        let whitelist = WhitelistBuilder::build(&stack.store, self.whitelist_capacity);
        debug!(
            "[ADVERTISING] Whitelist requested: {} addrs, {} irks",
            whitelist.addrs.len(),
            whitelist.irks.len()
        );
        radio_command(
            "whitelist reply",
            stack.radio.reply_whitelist(&whitelist.addrs, &whitelist.irks),
        )
    }

    /// The current advertising period elapsed without a connection
    ///
    /// Fast modes fall back to the slow interval with the same filter; slow
    /// modes end in [`AdvertisingMode::Idle`].
    ///
    /// # Errors
    /// Unexpected radio failures are fatal
    pub fn on_timeout<R, S, T, I>(
        &mut self,
        stack: &mut Stack<R, S, T, I>,
    ) -> Result<(), FatalError>
    where
        R: RadioStack,
        S: PeerStore,
        T: BondingTimer,
        I: Indicator,
    {
        let next = match self.mode {
            AdvertisingMode::WhitelistedFast if self.options.slow_enabled => {
                AdvertisingMode::WhitelistedSlow
            }
            AdvertisingMode::OpenFast if self.options.slow_enabled => AdvertisingMode::OpenSlow,
            AdvertisingMode::Idle => {
                debug!("[ADVERTISING] Timeout while idle ignored");
                return Ok(());
            }
            _ => AdvertisingMode::Idle,
        };

        // The radio already ended the timed out procedure
        let previous = core::mem::replace(&mut self.mode, AdvertisingMode::Idle);
        if next == AdvertisingMode::Idle {
            info!("[ADVERTISING] {:?} timed out, going idle", previous);
            stack.indicator.indicate(IndicatorCommand::AdvertisingStopped);
            Ok(())
        } else {
            debug!("[ADVERTISING] {:?} timed out", previous);
            self.start(stack, next)
        }
    }

    /// Rebuild the whitelist and load it into the radio's filter facilities
    ///
    /// Older stacks lack an address resolution list; "not supported" from it
    /// is tolerated.
    ///
    /// # Errors
    /// Unexpected radio failures are fatal
    pub fn apply_whitelist<R, S, T, I>(
        &self,
        stack: &mut Stack<R, S, T, I>,
    ) -> Result<Whitelist, FatalError>
    where
        R: RadioStack,
        S: PeerStore,
        T: BondingTimer,
        I: Indicator,
    {
        let whitelist = WhitelistBuilder::build(&stack.store, self.whitelist_capacity);
        radio_command("set whitelist", stack.radio.set_whitelist(&whitelist.addrs))?;
        match stack.radio.set_identity_keys(&whitelist.identities) {
            Err(RadioError::NotSupported) => {
                debug!("[ADVERTISING] Identity list not supported");
            }
            result => radio_command("set identities", result)?,
        }
        debug!("[ADVERTISING] Whitelist applied: {} entries", whitelist.len());
        Ok(whitelist)
    }
}
