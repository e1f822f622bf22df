//! Processor Tasks - event drain loop and HCI glue
//!
//! [`run`] owns the [`EventDispatcher`] and drains the static event channel
//! one event at a time. [`run_hci`] additionally drives a `bt-hci`
//! controller, running the drain loop, the HCI command executor and the HCI
//! event reader side by side.
//!
//! # Usage
//!
//! ```rust,ignore
//! use twinbond::{Options, processor};
//!
//! // In your Embassy main, with `store` implementing `PeerStore`
//! processor::run_hci::<YourTransport, _, _, 4, 512>(
//!     Options::default(),
//!     store,
//!     leds,
//!     controller,
//! )
//! .await;
//! ```
//!
//! # Generic Parameters
//!
//! * `T: Transport` - The HCI transport layer (UART, USB, etc.)
//! * `SLOTS` - Maximum number of controller command slots (typically 4-8)
//! * `BUFFER_SIZE` - Size of HCI read buffer in bytes (512+ recommended)

use crate::{
    EVENT_CHANNEL, FatalError, Options,
    api::ChannelTimer,
    dispatcher::EventDispatcher,
    hci::{self, HciRadio},
    stack::{BondingTimer, Indicator, PeerStore, RadioStack, Stack},
};
use bt_hci::{controller::ExternalController, transport::Transport};
use embassy_futures::select::{Either3, select3};

/// Drain the event channel forever
///
/// # Panics
///
/// Panics on any [`FatalError`]: link security state can no longer be
/// trusted and the device must be reset.
pub async fn run<R, S, T, I>(options: Options, stack: Stack<R, S, T, I>) -> !
where
    R: RadioStack,
    S: PeerStore,
    T: BondingTimer,
    I: Indicator,
{
    let mut dispatcher = EventDispatcher::new(&options, stack);
    if let Err(e) = dispatcher.start() {
        halt(e);
    }

    let receiver = EVENT_CHANNEL.receiver();
    loop {
        let event = receiver.receive().await;
        debug!("[PROCESSOR] Event: {:?}", event);
        if let Err(e) = dispatcher.dispatch(event) {
            halt(e);
        }
    }
}

/// Run the orchestration core on top of an HCI controller
///
/// The bonding window timer is served by [`ChannelTimer`]; the application
/// must run a task around [`api::next_timer_request`](crate::api::next_timer_request).
///
/// # Panics
///
/// Panics on any [`FatalError`], see [`run`].
pub async fn run_hci<T, S, I, const SLOTS: usize, const BUFFER_SIZE: usize>(
    options: Options,
    store: S,
    indicator: I,
    controller: &'static ExternalController<T, SLOTS>,
) -> !
where
    T: Transport + 'static,
    S: PeerStore,
    I: Indicator,
{
    let radio = HciRadio::new(options.advertising);
    let stack = Stack::with_indicator(radio, store, ChannelTimer, indicator);

    match select3(
        run(options, stack),
        hci::command_processor::<T, SLOTS>(controller),
        hci::event_processor::<T, SLOTS, BUFFER_SIZE>(controller),
    )
    .await
    {
        Either3::First(never) | Either3::Second(never) | Either3::Third(never) => never,
    }
}

fn halt(error: FatalError) -> ! {
    error!("[PROCESSOR] Fatal error: {:?}", error);
    panic!("fatal bonding error: {:?}", error)
}
