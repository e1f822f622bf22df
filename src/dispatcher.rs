//! Event Dispatcher - single ingress for every event source
//!
//! Events are handled strictly one at a time. Work deferred by a handler runs
//! before [`EventDispatcher::dispatch`] returns, so the next event always sees
//! the fully applied result of the previous one.

use crate::{
    FatalError, Options,
    bonding::BondingOrchestrator,
    event::{Event, RadioEvent, SecurityEvent, TimerEvent, UserRequest},
    radio_command,
    stack::{BondingTimer, Indicator, PeerStore, RadioStack, Stack},
    storage::StorageEventHandler,
};

/// Routes [`Event`]s to the orchestrator and the storage handler
pub struct EventDispatcher<R, S, T, I = ()> {
    orchestrator: BondingOrchestrator,
    storage: StorageEventHandler,
    stack: Stack<R, S, T, I>,
}

impl<R, S, T, I> EventDispatcher<R, S, T, I>
where
    R: RadioStack,
    S: PeerStore,
    T: BondingTimer,
    I: Indicator,
{
    /// Create a dispatcher owning its collaborators
    pub fn new(options: &Options, stack: Stack<R, S, T, I>) -> Self {
        Self {
            orchestrator: BondingOrchestrator::new(options),
            storage: StorageEventHandler::new(),
            stack,
        }
    }

    /// Start advertising for bonded hosts
    ///
    /// # Errors
    /// Unexpected radio failures are fatal
    pub fn start(&mut self) -> Result<(), FatalError> {
        self.orchestrator.start(&mut self.stack)
    }

    /// Handle one event and drain the deferred work it produced
    ///
    /// # Errors
    /// Returns the first fatal error; the device must not continue after it
    pub fn dispatch(&mut self, event: Event) -> Result<(), FatalError> {
        trace!("[DISPATCH] {:?}", event);
        self.handle(event)?;
        self.orchestrator.run_deferred(&mut self.stack)
    }

    /// Orchestrator state
    pub const fn orchestrator(&self) -> &BondingOrchestrator {
        &self.orchestrator
    }

    /// Storage handler state
    pub const fn storage(&self) -> &StorageEventHandler {
        &self.storage
    }

    /// Collaborators
    pub const fn stack(&self) -> &Stack<R, S, T, I> {
        &self.stack
    }

    /// Collaborators, mutably
    pub fn stack_mut(&mut self) -> &mut Stack<R, S, T, I> {
        &mut self.stack
    }

    fn handle(&mut self, event: Event) -> Result<(), FatalError> {
        let stack = &mut self.stack;
        let orchestrator = &mut self.orchestrator;

        match event {
            Event::Radio(radio) => match radio {
                RadioEvent::Connected { handle, role, peer } => {
                    orchestrator.on_connect(stack, handle, role, peer)
                }
                RadioEvent::Disconnected { handle } => orchestrator.on_disconnect(stack, handle),
                RadioEvent::WhitelistRequested => {
                    orchestrator.advertising().on_whitelist_requested(stack)
                }
                RadioEvent::AdvertisingTimedOut => orchestrator.on_advertising_timeout(stack),
                RadioEvent::LinkTimedOut { handle } => orchestrator.on_link_timeout(stack, handle),
                RadioEvent::CommandFailed(e) => radio_command("queued command", Err(e)),
            },
            Event::Security(security) => match security {
                SecurityEvent::BondingResult {
                    peer_id,
                    handle,
                    procedure,
                    outcome,
                } => orchestrator.on_bonding_result(stack, peer_id, handle, procedure, outcome),
                SecurityEvent::BondedPeerConnected { peer_id, handle } => {
                    orchestrator.on_bonded_peer_connected(peer_id, handle);
                    Ok(())
                }
                SecurityEvent::ConfigRequested { handle } => {
                    orchestrator.on_config_requested(stack, handle)
                }
            },
            Event::Storage(storage) => self.storage.handle(storage, orchestrator, stack),
            Event::Timer(TimerEvent::BondingWindowExpired { generation }) => {
                orchestrator.on_bonding_window_timeout(stack, generation)
            }
            Event::Request(UserRequest::BondSecondHost) => {
                orchestrator.request_second_host_bonding(stack)
            }
            Event::Request(UserRequest::DeleteAllBonds) => {
                info!("[DISPATCH] Deleting all bonds");
                match stack.store.delete_all_peers() {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        error!("[DISPATCH] Delete all bonds failed: {:?}", e);
                        Err(FatalError::Storage(e))
                    }
                }
            }
        }
    }
}
