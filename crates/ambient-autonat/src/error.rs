//! Error types for AutoNAT
//!
//! Two families of errors live here:
//!
//! - [`ProbeError`]: the outcome of a single failed dial-back probe. These are
//!   consumed by the detection cycle and never reach status readers. Only
//!   [`ProbeError::DialFailed`] counts as evidence of being unreachable; use
//!   [`ProbeError::is_dial_error`] rather than matching on messages.
//! - [`AutoNatError`]: errors surfaced by the public API and configuration.
//!   The only one a status reader ever sees is [`AutoNatError::NotPublic`].

use std::borrow::Cow;
use thiserror::Error;

/// Failure of one dial-back probe
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The remote peer tried to dial us back and the dial failed
    #[error("Dial back failed: {0}")]
    DialFailed(String),

    /// The remote peer refused to attempt the dial
    #[error("Dial back refused: {0}")]
    Refused(String),

    /// The remote peer rejected the request as malformed
    #[error("Bad dial request: {0}")]
    BadRequest(String),

    /// The remote peer hit an internal error
    #[error("Remote internal error: {0}")]
    Internal(String),

    /// Response did not follow the protocol
    #[error("Protocol error: {0}")]
    Protocol(Cow<'static, str>),

    /// Could not open or use a stream to the peer
    #[error("Stream error: {0}")]
    Stream(String),

    /// No local addresses to offer for a dial back
    #[error("No advertised addresses to dial back")]
    NoAddresses,

    /// The probe did not complete within the request timeout
    #[error("Dial back request timed out")]
    Timeout,
}

impl ProbeError {
    /// Returns true if the remote peer attempted to dial back and failed
    ///
    /// This is the only probe outcome that counts as evidence of being
    /// behind a NAT. Every other variant is inconclusive.
    #[must_use]
    pub fn is_dial_error(&self) -> bool {
        matches!(self, ProbeError::DialFailed(_))
    }

    /// Create a protocol error with static context (zero allocation)
    #[must_use]
    pub const fn protocol(context: &'static str) -> Self {
        ProbeError::Protocol(Cow::Borrowed(context))
    }
}

/// Errors returned by the AutoNAT service and its configuration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AutoNatError {
    /// NAT status is not public, so there is no public address to report
    #[error("NAT status is not public")]
    NotPublic,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),

    /// Address text could not be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(Cow<'static, str>),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(String),
}

impl AutoNatError {
    /// Create an invalid configuration error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_config(context: &'static str) -> Self {
        AutoNatError::InvalidConfig(Cow::Borrowed(context))
    }
}

impl From<std::io::Error> for AutoNatError {
    fn from(err: std::io::Error) -> Self {
        AutoNatError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for AutoNatError {
    fn from(err: toml::de::Error) -> Self {
        AutoNatError::ConfigParse(err.to_string())
    }
}

/// Result type for AutoNAT operations
pub type Result<T> = std::result::Result<T, AutoNatError>;
