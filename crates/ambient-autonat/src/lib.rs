//! # Ambient AutoNAT
//!
//! Ambient NAT status detection for peer-to-peer nodes.
//!
//! A node cannot tell from its own sockets whether it is reachable from the
//! public network. This crate asks cooperating peers to dial it back and folds
//! the outcomes into a confidence-weighted verdict:
//!
//! - **Public**: at least one peer managed to dial back; the address it
//!   reached is kept as the public address
//! - **Private**: dial-backs keep failing; three failures in one round, or
//!   failures across three consecutive rounds, confirm it
//! - **Unknown**: no decisive evidence yet
//!
//! ## Components
//!
//! - [`registry`]: peers known to speak the dial-back protocol, fed by the
//!   host's connection notifications
//! - [`client`]: the dial-back client contract and a protocol-backed client
//! - [`status`]: the verdict/confidence state machine
//! - [`service`]: the background detection loop and the read-only API
//!
//! ## Example
//!
//! ```rust,no_run
//! use ambient_autonat::{AmbientAutoNat, AutoNatConfig, DialBack, Host};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(
//! #     host: Arc<dyn Host>,
//! #     client: Arc<dyn DialBack>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let cancel = CancellationToken::new();
//! let autonat = AmbientAutoNat::with_config(AutoNatConfig::default(), cancel.clone(), host, client)?;
//!
//! println!("NAT status: {}", autonat.status().await);
//! if let Ok(addr) = autonat.public_addr().await {
//!     println!("Public address: {addr}");
//! }
//!
//! cancel.cancel();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod host;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod status;

pub use client::{AddressBook, AutoNatClient, DialBack};
pub use config::AutoNatConfig;
pub use error::{AutoNatError, ProbeError, Result};
pub use host::{AUTONAT_PROTOCOL, ConnectionObserver, Connectivity, Host, NetAddr, PeerId};
pub use protocol::{DialBackTransport, DialRequest, DialResponse, ResponseStatus};
pub use registry::PeerRegistry;
pub use service::AmbientAutoNat;
pub use status::{Confidence, CycleOutcome, CycleTally, NatStatus, StatusRecord};
