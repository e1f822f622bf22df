use crate::constants::{BD_ADDR_LENGTH, IRK_LENGTH};

/// Returned when bytes or text cannot be interpreted as a device address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidAddress;

/// How a peer's over-the-air address was generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressKind {
    /// IEEE-assigned public address
    #[default]
    Public,
    /// Random static address
    RandomStatic,
    /// Resolvable private address (needs the peer's IRK to resolve)
    RandomResolvable,
    /// Non-resolvable private address
    RandomNonResolvable,
}

impl AddressKind {
    /// Whether the address is carried with the HCI "random" address type
    #[must_use]
    pub const fn is_random(self) -> bool {
        !matches!(self, Self::Public)
    }
}

/// A peer device address (`BD_ADDR` plus its kind)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerAddress {
    /// Address kind
    pub kind: AddressKind,
    /// Raw address bytes, least significant byte first as on air
    pub addr: [u8; BD_ADDR_LENGTH],
}

impl PeerAddress {
    /// Create a new peer address
    #[must_use]
    pub const fn new(kind: AddressKind, addr: [u8; BD_ADDR_LENGTH]) -> Self {
        Self { kind, addr }
    }

    /// Create a public peer address
    #[must_use]
    pub const fn public(addr: [u8; BD_ADDR_LENGTH]) -> Self {
        Self::new(AddressKind::Public, addr)
    }
}

impl From<PeerAddress> for bt_hci::param::BdAddr {
    fn from(peer: PeerAddress) -> Self {
        bt_hci::param::BdAddr::new(peer.addr)
    }
}

impl From<PeerAddress> for bt_hci::param::AddrKind {
    fn from(peer: PeerAddress) -> Self {
        if peer.kind.is_random() {
            bt_hci::param::AddrKind::RANDOM
        } else {
            bt_hci::param::AddrKind::PUBLIC
        }
    }
}

impl TryFrom<&[u8]> for PeerAddress {
    type Error = InvalidAddress;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let addr: [u8; BD_ADDR_LENGTH] = bytes.try_into().map_err(|_| InvalidAddress)?;
        Ok(Self::public(addr))
    }
}

impl TryFrom<(bt_hci::param::AddrKind, bt_hci::param::BdAddr)> for PeerAddress {
    type Error = InvalidAddress;

    fn try_from(
        (kind, bd_addr): (bt_hci::param::AddrKind, bt_hci::param::BdAddr),
    ) -> Result<Self, Self::Error> {
        let raw: &[u8] = bd_addr.raw();
        let mut peer = Self::try_from(raw)?;
        if kind == bt_hci::param::AddrKind::RANDOM {
            peer.kind = AddressKind::from_random_bytes(&peer.addr);
        }
        Ok(peer)
    }
}

impl AddressKind {
    /// Classify a random address by its two most significant bits
    #[must_use]
    pub const fn from_random_bytes(addr: &[u8; BD_ADDR_LENGTH]) -> Self {
        match addr[BD_ADDR_LENGTH - 1] >> 6 {
            0b11 => Self::RandomStatic,
            0b01 => Self::RandomResolvable,
            _ => Self::RandomNonResolvable,
        }
    }
}

/// Identity Resolving Key distributed by a bonded peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IdentityKey(pub [u8; IRK_LENGTH]);

impl IdentityKey {
    /// Get the raw key bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; IRK_LENGTH] {
        &self.0
    }
}

/// Identity information of a bonded peer, as needed for connection filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerIdentity {
    /// Identity address
    pub address: PeerAddress,
    /// Identity Resolving Key, if the peer distributed one
    pub irk: Option<IdentityKey>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_address_try_from_slice() {
        let bytes = &[0x12u8, 0x34, 0x56, 0x78, 0x9A, 0xBC][..];
        let addr = PeerAddress::try_from(bytes).unwrap();
        assert_eq!(addr.addr, [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC]);

        assert!(PeerAddress::try_from(&[0x12u8, 0x34][..]).is_err());
        assert!(PeerAddress::try_from(&[0u8; 8][..]).is_err());
    }

    #[test]
    fn test_random_address_classification() {
        assert_eq!(
            AddressKind::from_random_bytes(&[0, 0, 0, 0, 0, 0xC0]),
            AddressKind::RandomStatic
        );
        assert_eq!(
            AddressKind::from_random_bytes(&[0, 0, 0, 0, 0, 0x40]),
            AddressKind::RandomResolvable
        );
        assert_eq!(
            AddressKind::from_random_bytes(&[0, 0, 0, 0, 0, 0x00]),
            AddressKind::RandomNonResolvable
        );
        assert!(!AddressKind::Public.is_random());
        assert!(AddressKind::RandomResolvable.is_random());
    }

    #[test]
    fn test_hci_conversions() {
        let peer = PeerAddress::new(AddressKind::RandomStatic, [1, 2, 3, 4, 5, 0xC6]);
        let bd_addr: bt_hci::param::BdAddr = peer.into();
        let raw: &[u8] = bd_addr.raw();
        assert_eq!(raw, &[1u8, 2, 3, 4, 5, 0xC6][..]);

        let kind: bt_hci::param::AddrKind = peer.into();
        assert!(kind == bt_hci::param::AddrKind::RANDOM);

        let back = PeerAddress::try_from((kind, bd_addr)).unwrap();
        assert_eq!(back, peer);
    }
}
