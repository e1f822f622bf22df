//! HCI radio adapter
//!
//! [`HciRadio`] implements [`RadioStack`] by queueing [`HciCommand`]s on a
//! static channel. [`command_processor`] executes them on a `bt-hci`
//! [`ExternalController`]; [`event_processor`] turns controller events into
//! [`Event`]s for the dispatcher.
//!
//! Legacy advertising has no controller-side duration, so advertising
//! timeouts are left to the application, which posts
//! [`RadioEvent::AdvertisingTimedOut`].

use crate::{
    ConnectionHandle, EVENT_CHANNEL, LinkRole, PeerAddress, PeerIdentity, RadioError,
    address::IdentityKey,
    advertising::{AdvertisingMode, AdvertisingOptions},
    constants::{HCI_COMMAND_QUEUE_SIZE, IRK_LENGTH},
    event::{Event, RadioEvent},
    stack::RadioStack,
};
use bt_hci::{
    ControllerToHostPacket, cmd,
    controller::{Controller, ControllerCmdSync, ExternalController},
    event::{self, le::LeEvent},
    param,
    transport::Transport,
};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};

/// Commands waiting to be executed on the controller
pub(crate) static HCI_COMMAND_CHANNEL: Channel<
    CriticalSectionRawMutex,
    HciCommand,
    HCI_COMMAND_QUEUE_SIZE,
> = Channel::new();

/// A single controller command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HciCommand {
    /// Configure legacy connectable advertising
    SetAdvParams {
        /// Interval in 0.625 ms units
        interval: u16,
        /// Only accept connections from the filter accept list
        filtered: bool,
    },
    /// Enable or disable advertising
    SetAdvEnable(bool),
    /// Empty the filter accept list
    ClearFilterAcceptList,
    /// Add a peer to the filter accept list
    AddToFilterAcceptList(PeerAddress),
    /// Enable or disable private address resolution
    SetAddrResolution(bool),
    /// Empty the resolving list
    ClearResolvingList,
    /// Add a peer identity to the resolving list
    AddToResolvingList {
        /// Identity address
        peer: PeerAddress,
        /// Peer's Identity Resolving Key
        irk: IdentityKey,
    },
    /// Terminate a link
    Disconnect(ConnectionHandle),
}

/// [`RadioStack`] backed by an HCI controller
#[derive(Debug, Clone, Copy)]
pub struct HciRadio {
    options: AdvertisingOptions,
}

impl HciRadio {
    /// Create an adapter using `options` for advertising intervals
    #[must_use]
    pub const fn new(options: AdvertisingOptions) -> Self {
        Self { options }
    }

    /// Queue a batch of commands, all or nothing
    fn queue(commands: &[HciCommand]) -> Result<(), RadioError> {
        if HCI_COMMAND_CHANNEL.free_capacity() < commands.len() {
            warn!(
                "[HCI] Command queue full, dropping {} commands",
                commands.len()
            );
            return Err(RadioError::NoResources);
        }
        let sender = HCI_COMMAND_CHANNEL.sender();
        for command in commands {
            sender
                .try_send(*command)
                .map_err(|_| RadioError::NoResources)?;
        }
        Ok(())
    }
}

impl RadioStack for HciRadio {
    fn start_advertising(&mut self, mode: AdvertisingMode) -> Result<(), RadioError> {
        if mode == AdvertisingMode::Idle {
            return Err(RadioError::InvalidState);
        }
        Self::queue(&[
            HciCommand::SetAdvParams {
                interval: self.options.interval(mode),
                filtered: mode.is_filtered(),
            },
            HciCommand::SetAdvEnable(true),
        ])
    }

    fn stop_advertising(&mut self) -> Result<(), RadioError> {
        Self::queue(&[HciCommand::SetAdvEnable(false)])
    }

    fn disconnect(&mut self, handle: ConnectionHandle) -> Result<(), RadioError> {
        Self::queue(&[HciCommand::Disconnect(handle)])
    }

    fn set_whitelist(&mut self, addrs: &[PeerAddress]) -> Result<(), RadioError> {
        if HCI_COMMAND_CHANNEL.free_capacity() < addrs.len() + 1 {
            return Err(RadioError::NoResources);
        }
        Self::queue(&[HciCommand::ClearFilterAcceptList])?;
        for addr in addrs {
            Self::queue(&[HciCommand::AddToFilterAcceptList(*addr)])?;
        }
        Ok(())
    }

    fn set_identity_keys(&mut self, identities: &[PeerIdentity]) -> Result<(), RadioError> {
        if HCI_COMMAND_CHANNEL.free_capacity() < identities.len() + 3 {
            return Err(RadioError::NoResources);
        }
        Self::queue(&[
            HciCommand::SetAddrResolution(false),
            HciCommand::ClearResolvingList,
        ])?;
        for identity in identities {
            if let Some(irk) = identity.irk {
                Self::queue(&[HciCommand::AddToResolvingList {
                    peer: identity.address,
                    irk,
                }])?;
            }
        }
        Self::queue(&[HciCommand::SetAddrResolution(true)])
    }

    fn reply_whitelist(
        &mut self,
        addrs: &[PeerAddress],
        _irks: &[IdentityKey],
    ) -> Result<(), RadioError> {
        // Keys already live in the resolving list; only the accept list is refreshed
        self.set_whitelist(addrs)
    }
}

/// Execute queued [`HciCommand`]s forever
///
/// Controller rejections are logged. Transport failures are posted back as
/// [`RadioEvent::CommandFailed`].
pub async fn command_processor<T: Transport + 'static, const SLOTS: usize>(
    controller: &'static ExternalController<T, SLOTS>,
) -> ! {
    let receiver = HCI_COMMAND_CHANNEL.receiver();

    loop {
        let command = receiver.receive().await;
        debug!("[HCI] Executing {:?}", command);
        if let Err(e) = execute(controller, command).await {
            match e {
                ExecError::Rejected => {
                    warn!("[HCI] Controller rejected {:?}", command);
                }
                ExecError::Transport => {
                    error!("[HCI] Transport failure on {:?}", command);
                    EVENT_CHANNEL
                        .sender()
                        .send(RadioEvent::CommandFailed(RadioError::Transport).into())
                        .await;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecError {
    Rejected,
    Transport,
}

impl<E> From<cmd::Error<E>> for ExecError {
    fn from(error: cmd::Error<E>) -> Self {
        match error {
            cmd::Error::Hci(_) => Self::Rejected,
            cmd::Error::Io(_) => Self::Transport,
        }
    }
}

async fn execute<T: Transport + 'static, const SLOTS: usize>(
    controller: &ExternalController<T, SLOTS>,
    command: HciCommand,
) -> Result<(), ExecError> {
    match command {
        HciCommand::SetAdvParams { interval, filtered } => {
            let filter_policy = if filtered {
                param::AdvFilterPolicy::FilterConn
            } else {
                param::AdvFilterPolicy::Unfiltered
            };
            let params = cmd::le::LeSetAdvParams::new(
                param::Duration::from_u16(interval),
                param::Duration::from_u16(interval),
                param::AdvKind::AdvInd,
                param::AddrKind::PUBLIC,
                param::AddrKind::PUBLIC,
                param::BdAddr::new([0; 6]),
                param::AdvChannelMap::ALL,
                filter_policy,
            );
            ControllerCmdSync::exec(controller, &params).await.map_err(ExecError::from)
        }
        HciCommand::SetAdvEnable(enable) => {
            ControllerCmdSync::exec(controller, &cmd::le::LeSetAdvEnable::new(enable))
                .await
                .map_err(ExecError::from)
        }
        HciCommand::ClearFilterAcceptList => {
            ControllerCmdSync::exec(controller, &cmd::le::LeClearFilterAcceptList::new())
                .await
                .map_err(ExecError::from)
        }
        HciCommand::AddToFilterAcceptList(peer) => {
            let add = cmd::le::LeAddDeviceToFilterAcceptList::new(peer.into(), peer.into());
            ControllerCmdSync::exec(controller, &add).await.map_err(ExecError::from)
        }
        HciCommand::SetAddrResolution(enable) => {
            let resolution = cmd::le::LeSetAddrResolutionEnable::new(enable);
            ControllerCmdSync::exec(controller, &resolution).await.map_err(ExecError::from)
        }
        HciCommand::ClearResolvingList => {
            ControllerCmdSync::exec(controller, &cmd::le::LeClearResolvingList::new())
                .await
                .map_err(ExecError::from)
        }
        HciCommand::AddToResolvingList { peer, irk } => {
            // No local IRK is distributed; the controller uses the public address
            let add = cmd::le::LeAddDeviceToResolvingList::new(
                peer.into(),
                peer.into(),
                *irk.as_bytes(),
                [0u8; IRK_LENGTH],
            );
            ControllerCmdSync::exec(controller, &add).await.map_err(ExecError::from)
        }
        HciCommand::Disconnect(handle) => {
            let disconnect = cmd::link_control::Disconnect::new(
                handle.into(),
                param::DisconnectReason::RemoteUserTerminatedConn,
            );
            ControllerCmdSync::exec(controller, &disconnect).await.map_err(ExecError::from)
        }
    }
}

/// Read controller events forever and post the relevant ones
pub async fn event_processor<
    T: Transport + 'static,
    const SLOTS: usize,
    const BUFFER_SIZE: usize,
>(
    controller: &'static ExternalController<T, SLOTS>,
) -> ! {
    let mut read_buffer = [0u8; BUFFER_SIZE];
    let sender = EVENT_CHANNEL.sender();

    loop {
        match controller.read(&mut read_buffer).await {
            Ok(ControllerToHostPacket::Event(ref hci_event)) => {
                if let Some(event) = process_hci_event(hci_event) {
                    sender.send(event).await;
                }
            }
            Ok(_) => trace!("[HCI] Ignoring data packet"),
            Err(_) => error!("[HCI] Read error"),
        }
    }
}

/// Convert a controller event into a dispatcher event
pub(crate) fn process_hci_event(event: &event::Event<'_>) -> Option<Event> {
    match *event {
        event::Event::Le(LeEvent::LeConnectionComplete(ref complete)) => {
            if complete.status.to_result().is_err() {
                debug!("[HCI] Connection attempt failed");
                return None;
            }
            let role = if matches!(complete.role, param::LeConnRole::Peripheral) {
                LinkRole::Peripheral
            } else {
                LinkRole::Central
            };
            let peer = PeerAddress::try_from((complete.peer_addr_kind, complete.peer_addr)).ok()?;
            Some(
                RadioEvent::Connected {
                    handle: ConnectionHandle(complete.handle.raw()),
                    role,
                    peer,
                }
                .into(),
            )
        }
        event::Event::DisconnectionComplete(ref complete) => {
            if complete.status.to_result().is_err() {
                debug!("[HCI] Disconnection failed");
                return None;
            }
            Some(
                RadioEvent::Disconnected {
                    handle: ConnectionHandle(complete.handle.raw()),
                }
                .into(),
            )
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AddressKind;
    use bt_hci::FromHciBytes;

    #[test]
    fn test_radio_queues_commands() {
        while HCI_COMMAND_CHANNEL.try_receive().is_ok() {}
        let mut radio = HciRadio::new(AdvertisingOptions::default());

        radio
            .start_advertising(AdvertisingMode::WhitelistedFast)
            .unwrap();
        assert_eq!(
            HCI_COMMAND_CHANNEL.try_receive(),
            Ok(HciCommand::SetAdvParams {
                interval: 0x0028,
                filtered: true,
            })
        );
        assert_eq!(
            HCI_COMMAND_CHANNEL.try_receive(),
            Ok(HciCommand::SetAdvEnable(true))
        );

        radio.start_advertising(AdvertisingMode::OpenSlow).unwrap();
        assert_eq!(
            HCI_COMMAND_CHANNEL.try_receive(),
            Ok(HciCommand::SetAdvParams {
                interval: 0x0C80,
                filtered: false,
            })
        );
        while HCI_COMMAND_CHANNEL.try_receive().is_ok() {}

        let peer = PeerAddress::new(AddressKind::RandomStatic, [1, 2, 3, 4, 5, 0xC0]);
        let identities = [
            PeerIdentity {
                address: peer,
                irk: Some(IdentityKey([7; 16])),
            },
            PeerIdentity {
                address: PeerAddress::public([9; 6]),
                irk: None,
            },
        ];
        radio.set_identity_keys(&identities).unwrap();
        assert_eq!(
            HCI_COMMAND_CHANNEL.try_receive(),
            Ok(HciCommand::SetAddrResolution(false))
        );
        assert_eq!(
            HCI_COMMAND_CHANNEL.try_receive(),
            Ok(HciCommand::ClearResolvingList)
        );
        assert_eq!(
            HCI_COMMAND_CHANNEL.try_receive(),
            Ok(HciCommand::AddToResolvingList {
                peer,
                irk: IdentityKey([7; 16]),
            })
        );
        assert_eq!(
            HCI_COMMAND_CHANNEL.try_receive(),
            Ok(HciCommand::SetAddrResolution(true))
        );

        radio.reply_whitelist(&[peer], &[]).unwrap();
        assert_eq!(
            HCI_COMMAND_CHANNEL.try_receive(),
            Ok(HciCommand::ClearFilterAcceptList)
        );
        assert_eq!(
            HCI_COMMAND_CHANNEL.try_receive(),
            Ok(HciCommand::AddToFilterAcceptList(peer))
        );

        assert_eq!(
            radio.start_advertising(AdvertisingMode::Idle),
            Err(RadioError::InvalidState)
        );

        // A batch that does not fit is refused as a whole
        for _ in 0..HCI_COMMAND_QUEUE_SIZE - 1 {
            radio.stop_advertising().unwrap();
        }
        assert_eq!(
            radio.start_advertising(AdvertisingMode::OpenFast),
            Err(RadioError::NoResources)
        );
        assert_eq!(HCI_COMMAND_CHANNEL.free_capacity(), 1);
        while HCI_COMMAND_CHANNEL.try_receive().is_ok() {}
    }

    #[test]
    fn test_disconnection_complete_event() {
        let bytes = [0x05, 0x04, 0x00, 0x40, 0x00, 0x13];
        let (hci_event, _) = event::Event::from_hci_bytes(&bytes).unwrap();
        assert_eq!(
            process_hci_event(&hci_event),
            Some(Event::Radio(RadioEvent::Disconnected {
                handle: ConnectionHandle(0x0040),
            }))
        );

        let failed = [0x05, 0x04, 0x0C, 0x40, 0x00, 0x13];
        let (hci_event, _) = event::Event::from_hci_bytes(&failed).unwrap();
        assert_eq!(process_hci_event(&hci_event), None);
    }

    #[test]
    fn test_le_connection_complete_event() {
        let bytes = [
            0x3E, 0x13, 0x01, // LE meta, connection complete
            0x00, // status
            0x41, 0x00, // handle
            0x01, // peripheral
            0x01, // random address
            0x11, 0x22, 0x33, 0x44, 0x55, 0xC6, // address
            0x18, 0x00, // interval
            0x00, 0x00, // latency
            0xC8, 0x00, // supervision timeout
            0x00, // clock accuracy
        ];
        let (hci_event, _) = event::Event::from_hci_bytes(&bytes).unwrap();
        assert_eq!(
            process_hci_event(&hci_event),
            Some(Event::Radio(RadioEvent::Connected {
                handle: ConnectionHandle(0x0041),
                role: LinkRole::Peripheral,
                peer: PeerAddress::new(
                    AddressKind::RandomStatic,
                    [0x11, 0x22, 0x33, 0x44, 0x55, 0xC6]
                ),
            }))
        );
    }
}
