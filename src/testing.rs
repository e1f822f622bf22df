//! Recording collaborator fakes for unit tests

// Backs the static channels with a std critical section on host
use critical_section as _;

use crate::{
    AddressKind, ConnectionHandle, IdentityKey, PeerAddress, PeerId, PeerIdentity, RadioError,
    StoreError, TimerError,
    advertising::AdvertisingMode,
    stack::{BondingTimer, Indicator, IndicatorCommand, PeerStore, RadioStack, Stack},
};
use heapless::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioCall {
    StartAdvertising(AdvertisingMode),
    StopAdvertising,
    Disconnect(ConnectionHandle),
    SetWhitelist(usize),
    SetIdentityKeys(usize),
    ReplyWhitelist { addrs: usize, irks: usize },
}

pub struct FakeRadio {
    pub calls: Vec<RadioCall, 64>,
    pub start_result: Result<(), RadioError>,
    pub stop_result: Result<(), RadioError>,
    pub disconnect_result: Result<(), RadioError>,
    pub identity_result: Result<(), RadioError>,
}

impl FakeRadio {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            start_result: Ok(()),
            stop_result: Ok(()),
            disconnect_result: Ok(()),
            identity_result: Ok(()),
        }
    }

    pub fn disconnects(&self) -> Vec<ConnectionHandle, 8> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                RadioCall::Disconnect(handle) => Some(*handle),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: RadioCall) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }
}

impl RadioStack for FakeRadio {
    fn start_advertising(&mut self, mode: AdvertisingMode) -> Result<(), RadioError> {
        self.calls.push(RadioCall::StartAdvertising(mode)).ok();
        self.start_result
    }

    fn stop_advertising(&mut self) -> Result<(), RadioError> {
        self.calls.push(RadioCall::StopAdvertising).ok();
        self.stop_result
    }

    fn disconnect(&mut self, handle: ConnectionHandle) -> Result<(), RadioError> {
        self.calls.push(RadioCall::Disconnect(handle)).ok();
        self.disconnect_result
    }

    fn set_whitelist(&mut self, addrs: &[PeerAddress]) -> Result<(), RadioError> {
        self.calls.push(RadioCall::SetWhitelist(addrs.len())).ok();
        Ok(())
    }

    fn set_identity_keys(&mut self, identities: &[PeerIdentity]) -> Result<(), RadioError> {
        self.calls.push(RadioCall::SetIdentityKeys(identities.len())).ok();
        self.identity_result
    }

    fn reply_whitelist(
        &mut self,
        addrs: &[PeerAddress],
        irks: &[IdentityKey],
    ) -> Result<(), RadioError> {
        self.calls
            .push(RadioCall::ReplyWhitelist {
                addrs: addrs.len(),
                irks: irks.len(),
            })
            .ok();
        Ok(())
    }
}

/// In-memory peer store; deletions take effect immediately
pub struct FakeStore {
    pub peers: Vec<PeerId, 16>,
    pub hidden: Vec<PeerId, 16>,
    pub deleted: Vec<PeerId, 16>,
    pub delete_result: Result<(), StoreError>,
    pub delete_all_result: Result<(), StoreError>,
    pub gc_result: Result<(), StoreError>,
    pub gc_requests: usize,
    pub delete_all_requests: usize,
    pub config_replies: Vec<(ConnectionHandle, bool), 8>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            peers: Vec::new(),
            hidden: Vec::new(),
            deleted: Vec::new(),
            delete_result: Ok(()),
            delete_all_result: Ok(()),
            gc_result: Ok(()),
            gc_requests: 0,
            delete_all_requests: 0,
            config_replies: Vec::new(),
        }
    }

    pub fn with_peers(ids: &[u16]) -> Self {
        let mut store = Self::new();
        for id in ids {
            store.add_peer(PeerId(*id));
        }
        store
    }

    pub fn add_peer(&mut self, peer: PeerId) {
        self.peers.push(peer).ok();
    }

    pub fn hide_identity(&mut self, peer: PeerId) {
        self.hidden.push(peer).ok();
    }

    pub fn address_of(peer: PeerId) -> PeerAddress {
        let [lo, hi] = peer.0.to_le_bytes();
        PeerAddress::new(AddressKind::RandomStatic, [lo, hi, 0x00, 0x00, 0x00, 0xC0])
    }
}

impl PeerStore for FakeStore {
    fn next_peer_id(&self, after: Option<PeerId>) -> Option<PeerId> {
        match after {
            None => self.peers.first().copied(),
            Some(after) => {
                let index = self.peers.iter().position(|p| *p == after)?;
                self.peers.get(index + 1).copied()
            }
        }
    }

    fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn identity(&self, peer: PeerId) -> Option<PeerIdentity> {
        if !self.peers.contains(&peer) || self.hidden.contains(&peer) {
            return None;
        }
        #[allow(clippy::cast_possible_truncation)]
        let key = IdentityKey([peer.0 as u8; 16]);
        Some(PeerIdentity {
            address: Self::address_of(peer),
            irk: Some(key),
        })
    }

    fn delete_peer(&mut self, peer: PeerId) -> Result<(), StoreError> {
        self.delete_result?;
        self.peers.retain(|p| *p != peer);
        self.deleted.push(peer).ok();
        Ok(())
    }

    fn delete_all_peers(&mut self) -> Result<(), StoreError> {
        self.delete_all_requests += 1;
        self.delete_all_result?;
        for peer in &self.peers {
            self.deleted.push(*peer).ok();
        }
        self.peers.clear();
        Ok(())
    }

    fn garbage_collect(&mut self) -> Result<(), StoreError> {
        self.gc_requests += 1;
        self.gc_result
    }

    fn reply_security_config(
        &mut self,
        handle: ConnectionHandle,
        allow_repairing: bool,
    ) -> Result<(), StoreError> {
        self.config_replies.push((handle, allow_repairing)).ok();
        Ok(())
    }
}

pub struct FakeTimer {
    pub running: bool,
    pub starts: Vec<u32, 8>,
    pub generation: Option<u32>,
    pub stops: usize,
    pub start_result: Result<(), TimerError>,
}

impl FakeTimer {
    pub fn new() -> Self {
        Self {
            running: false,
            starts: Vec::new(),
            generation: None,
            stops: 0,
            start_result: Ok(()),
        }
    }
}

impl BondingTimer for FakeTimer {
    fn start(&mut self, duration_ms: u32, generation: u32) -> Result<(), TimerError> {
        self.start_result?;
        self.starts.push(duration_ms).ok();
        self.generation = Some(generation);
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.stops += 1;
        self.running = false;
    }
}

pub struct FakeIndicator {
    pub commands: Vec<IndicatorCommand, 64>,
}

impl Indicator for FakeIndicator {
    fn indicate(&mut self, command: IndicatorCommand) {
        self.commands.push(command).ok();
    }
}

pub type FakeStack = Stack<FakeRadio, FakeStore, FakeTimer, FakeIndicator>;

pub fn fake_stack(peers: &[u16]) -> FakeStack {
    Stack::with_indicator(
        FakeRadio::new(),
        FakeStore::with_peers(peers),
        FakeTimer::new(),
        FakeIndicator {
            commands: Vec::new(),
        },
    )
}
