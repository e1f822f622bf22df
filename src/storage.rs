//! Peer store notifications
//!
//! Storage-full recovery relies on the store's own re-notification: a garbage
//! collection request that cannot be queued right now is simply dropped.

use crate::{
    FatalError,
    bonding::BondingOrchestrator,
    event::{PeerDataKind, StorageEvent},
    stack::{BondingTimer, Indicator, PeerStore, RadioStack, Stack},
};

/// Reacts to [`StorageEvent`]s
#[derive(Debug, Default)]
pub struct StorageEventHandler {
    gc_pending: bool,
}

impl StorageEventHandler {
    /// Create a handler
    #[must_use]
    pub const fn new() -> Self {
        Self { gc_pending: false }
    }

    /// Whether a garbage collection was requested and has not completed yet
    #[must_use]
    pub const fn gc_pending(&self) -> bool {
        self.gc_pending
    }

    /// Handle one storage notification
    ///
    /// # Errors
    /// Non-transient storage failures, failed deletions, failed peer data
    /// updates and unexpected security errors are fatal
    pub fn handle<R, S, T, I>(
        &mut self,
        event: StorageEvent,
        orchestrator: &mut BondingOrchestrator,
        stack: &mut Stack<R, S, T, I>,
    ) -> Result<(), FatalError>
    where
        R: RadioStack,
        S: PeerStore,
        T: BondingTimer,
        I: Indicator,
    {
        match event {
            StorageEvent::StorageFull => self.on_storage_full(stack),
            StorageEvent::GarbageCollected => {
                info!("[STORAGE] Garbage collection completed");
                self.gc_pending = false;
                Ok(())
            }
            StorageEvent::PeerDataUpdated {
                peer_id,
                data,
                flash_changed,
            } => {
                if data == PeerDataKind::Bonding && flash_changed {
                    info!("[STORAGE] Bonding data of peer {} written", peer_id.0);
                    orchestrator.advertising().apply_whitelist(stack)?;
                } else {
                    trace!("[STORAGE] Peer {} data updated", peer_id.0);
                }
                Ok(())
            }
            StorageEvent::PeerDeleted(peer_id) => {
                debug!("[STORAGE] Peer {} deleted", peer_id.0);
                Ok(())
            }
            StorageEvent::AllPeersDeleted => {
                info!("[STORAGE] All peers deleted");
                orchestrator.on_all_peers_deleted(stack)
            }
            StorageEvent::PeerDataUpdateFailed(code) => {
                error!("[STORAGE] Peer data update failed: 0x{:x}", code);
                Err(FatalError::PeerDataUpdateFailed(code))
            }
            StorageEvent::PeerDeleteFailed(code) => {
                error!("[STORAGE] Peer delete failed: 0x{:x}", code);
                Err(FatalError::PeerDeleteFailed(code))
            }
            StorageEvent::AllPeersDeleteFailed(code) => {
                error!("[STORAGE] Deleting all peers failed: 0x{:x}", code);
                Err(FatalError::PeersDeleteFailed(code))
            }
            StorageEvent::UnexpectedError(code) => {
                error!("[STORAGE] Unexpected error: 0x{:x}", code);
                Err(FatalError::Unexpected(code))
            }
        }
    }

    fn on_storage_full<R, S, T, I>(
        &mut self,
        stack: &mut Stack<R, S, T, I>,
    ) -> Result<(), FatalError>
    where
        R: RadioStack,
        S: PeerStore,
        T: BondingTimer,
        I: Indicator,
    {
        match stack.store.garbage_collect() {
            Ok(()) => {
                info!("[STORAGE] Storage full, garbage collecting");
                self.gc_pending = true;
                Ok(())
            }
            Err(e) if e.is_transient() => {
                debug!("[STORAGE] Garbage collection deferred: {:?}", e);
                Ok(())
            }
            Err(e) => {
                error!("[STORAGE] Garbage collection failed: {:?}", e);
                Err(FatalError::Storage(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Options, PeerId, StoreError,
        advertising::AdvertisingMode,
        testing::{FakeStack, RadioCall, fake_stack},
    };

    fn setup(peers: &[u16]) -> (StorageEventHandler, BondingOrchestrator, FakeStack) {
        let mut stack = fake_stack(peers);
        let mut orchestrator = BondingOrchestrator::new(&Options::default());
        orchestrator.start(&mut stack).unwrap();
        stack.radio.calls.clear();
        (StorageEventHandler::new(), orchestrator, stack)
    }

    #[test]
    fn test_storage_full_requests_gc() {
        let (mut handler, mut orchestrator, mut stack) = setup(&[1]);
        handler
            .handle(StorageEvent::StorageFull, &mut orchestrator, &mut stack)
            .unwrap();
        assert_eq!(stack.store.gc_requests, 1);
        assert!(handler.gc_pending());

        handler
            .handle(StorageEvent::GarbageCollected, &mut orchestrator, &mut stack)
            .unwrap();
        assert!(!handler.gc_pending());
    }

    #[test]
    fn test_storage_full_while_busy_is_not_an_error() {
        let (mut handler, mut orchestrator, mut stack) = setup(&[1]);
        for busy in [StoreError::Busy, StoreError::NoSpaceInQueues] {
            stack.store.gc_result = Err(busy);
            assert_eq!(
                handler.handle(StorageEvent::StorageFull, &mut orchestrator, &mut stack),
                Ok(())
            );
        }
        assert_eq!(stack.store.gc_requests, 2);
        assert!(!handler.gc_pending());
        assert!(stack.radio.calls.is_empty());
    }

    #[test]
    fn test_storage_full_other_error_is_fatal() {
        let (mut handler, mut orchestrator, mut stack) = setup(&[1]);
        stack.store.gc_result = Err(StoreError::Other(0x0D));
        assert_eq!(
            handler.handle(StorageEvent::StorageFull, &mut orchestrator, &mut stack),
            Err(FatalError::Storage(StoreError::Other(0x0D)))
        );
    }

    #[test]
    fn test_bonding_data_update_reapplies_whitelist() {
        let (mut handler, mut orchestrator, mut stack) = setup(&[1, 2]);
        handler
            .handle(
                StorageEvent::PeerDataUpdated {
                    peer_id: PeerId(2),
                    data: PeerDataKind::Bonding,
                    flash_changed: true,
                },
                &mut orchestrator,
                &mut stack,
            )
            .unwrap();
        assert_eq!(
            stack.radio.calls.as_slice(),
            &[RadioCall::SetWhitelist(2), RadioCall::SetIdentityKeys(2)]
        );
    }

    #[test]
    fn test_unchanged_or_other_data_update_is_ignored() {
        let (mut handler, mut orchestrator, mut stack) = setup(&[1]);
        for (data, flash_changed) in [
            (PeerDataKind::Bonding, false),
            (PeerDataKind::Other, true),
        ] {
            handler
                .handle(
                    StorageEvent::PeerDataUpdated {
                        peer_id: PeerId(1),
                        data,
                        flash_changed,
                    },
                    &mut orchestrator,
                    &mut stack,
                )
                .unwrap();
        }
        assert!(stack.radio.calls.is_empty());
    }

    #[test]
    fn test_identity_list_not_supported_on_update() {
        let (mut handler, mut orchestrator, mut stack) = setup(&[1]);
        stack.radio.identity_result = Err(crate::RadioError::NotSupported);
        let event = StorageEvent::PeerDataUpdated {
            peer_id: PeerId(1),
            data: PeerDataKind::Bonding,
            flash_changed: true,
        };
        assert_eq!(handler.handle(event, &mut orchestrator, &mut stack), Ok(()));
    }

    #[test]
    fn test_all_peers_deleted_restarts_open_advertising() {
        let (mut handler, mut orchestrator, mut stack) = setup(&[1]);
        stack.radio.stop_result = Err(crate::RadioError::InvalidState);
        handler
            .handle(StorageEvent::AllPeersDeleted, &mut orchestrator, &mut stack)
            .unwrap();
        assert_eq!(orchestrator.advertising().mode(), AdvertisingMode::OpenFast);
        assert_eq!(
            stack.radio.calls.last(),
            Some(&RadioCall::StartAdvertising(AdvertisingMode::OpenFast))
        );
    }

    #[test]
    fn test_failures_are_fatal() {
        let (mut handler, mut orchestrator, mut stack) = setup(&[1]);
        let cases = [
            (
                StorageEvent::PeerDataUpdateFailed(1),
                FatalError::PeerDataUpdateFailed(1),
            ),
            (
                StorageEvent::PeerDeleteFailed(2),
                FatalError::PeerDeleteFailed(2),
            ),
            (
                StorageEvent::AllPeersDeleteFailed(3),
                FatalError::PeersDeleteFailed(3),
            ),
            (StorageEvent::UnexpectedError(4), FatalError::Unexpected(4)),
        ];
        for (event, expected) in cases {
            assert_eq!(
                handler.handle(event, &mut orchestrator, &mut stack),
                Err(expected)
            );
        }
    }

    #[test]
    fn test_peer_deleted_is_logged_only() {
        let (mut handler, mut orchestrator, mut stack) = setup(&[1]);
        handler
            .handle(StorageEvent::PeerDeleted(PeerId(1)), &mut orchestrator, &mut stack)
            .unwrap();
        assert!(stack.radio.calls.is_empty());
        assert_eq!(stack.store.gc_requests, 0);
    }
}
