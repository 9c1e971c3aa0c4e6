//! Dial-back client.
//!
//! [`DialBack`] is the contract the detector probes through. [`AutoNatClient`]
//! implements it on top of a [`DialBackTransport`] and the host's advertised
//! addresses.

use crate::error::ProbeError;
use crate::host::{NetAddr, PeerId};
use crate::protocol::{DialBackTransport, DialRequest};
use async_trait::async_trait;
use std::sync::Arc;

/// Dial-back probe contract
///
/// Timeouts and cancellation are applied by the caller; implementations may
/// run until the exchange completes.
#[async_trait]
pub trait DialBack: Send + Sync {
    /// Ask `peer` to dial us back
    ///
    /// # Errors
    ///
    /// Returns a [`ProbeError`]. Only [`ProbeError::DialFailed`] means the
    /// peer actually tried and failed to reach us.
    async fn dial_back(&self, peer: &PeerId) -> Result<NetAddr, ProbeError>;
}

/// Source of the local identity and the addresses offered for dial back
pub trait AddressBook: Send + Sync {
    /// Local peer identifier
    fn local_peer_id(&self) -> PeerId;

    /// Addresses the local node currently listens on or has observed
    fn listen_addrs(&self) -> Vec<NetAddr>;
}

/// Protocol-backed dial-back client
pub struct AutoNatClient<T> {
    transport: T,
    addresses: Arc<dyn AddressBook>,
}

impl<T: DialBackTransport> AutoNatClient<T> {
    /// Create a client over `transport`, advertising addresses from `addresses`
    pub fn new(transport: T, addresses: Arc<dyn AddressBook>) -> Self {
        Self {
            transport,
            addresses,
        }
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[async_trait]
impl<T: DialBackTransport> DialBack for AutoNatClient<T> {
    async fn dial_back(&self, peer: &PeerId) -> Result<NetAddr, ProbeError> {
        let addrs = self.addresses.listen_addrs();
        if addrs.is_empty() {
            return Err(ProbeError::NoAddresses);
        }

        let request = DialRequest {
            peer: self.addresses.local_peer_id(),
            addrs,
        };

        tracing::trace!(
            "Requesting dial back from {} ({} addresses)",
            peer,
            request.addrs.len()
        );

        self.transport.exchange(peer, request).await?.into_result()
    }
}
