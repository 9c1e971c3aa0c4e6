//! Host-side collaborators.
//!
//! The detection engine does not own a network stack. It consumes the host
//! through three narrow pieces:
//!
//! - [`Connectivity`]: "is this peer connected right now?"
//! - [`ConnectionObserver`]: connect/disconnect notifications, implemented by
//!   the engine and handed to the host once at construction
//! - [`PeerId`] / [`NetAddr`]: opaque identity and address values

use crate::error::AutoNatError;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Protocol identifier advertised by peers that answer dial-back requests
pub const AUTONAT_PROTOCOL: &str = "/libp2p/autonat/1.0.0";

/// Peer identifier (32-byte public key or derived ID)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId([u8; 32]);

impl PeerId {
    /// Create a peer ID from raw bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a random peer ID
    #[must_use]
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Raw bytes of the identifier
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short hex form used in logs (first 8 bytes)
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.short())
    }
}

/// Network address in multiaddr text form, e.g. `/ip4/1.2.3.4/tcp/4001`
///
/// The engine never interprets the address; it only stores the value a
/// dial-back reported and hands it back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NetAddr(String);

impl NetAddr {
    /// Address text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for NetAddr {
    type Err = AutoNatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AutoNatError::InvalidAddress("empty address".into()));
        }
        if !s.starts_with('/') || s.split('/').skip(1).any(str::is_empty) {
            return Err(AutoNatError::InvalidAddress(
                format!("malformed address: {s}").into(),
            ));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for NetAddr {
    type Error = AutoNatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NetAddr> for String {
    fn from(addr: NetAddr) -> Self {
        addr.0
    }
}

impl fmt::Display for NetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connectivity query against the host's connection manager
pub trait Connectivity: Send + Sync {
    /// Whether the host currently holds a live connection to `peer`
    fn is_connected(&self, peer: &PeerId) -> bool;
}

/// Receiver of the host's connection notifications
///
/// Implementations must not block; notifications may be delivered from the
/// host's connection-handling tasks.
pub trait ConnectionObserver: Send + Sync {
    /// A connection to `peer` was established; `protocols` lists what it offers
    fn connected(&self, peer: PeerId, protocols: &[String]);

    /// The last connection to `peer` was closed
    fn disconnected(&self, peer: &PeerId);
}

/// Host handle consumed by the detection service
pub trait Host: Connectivity {
    /// Register an observer for connection notifications
    fn register_observer(&self, observer: Arc<dyn ConnectionObserver>);
}
