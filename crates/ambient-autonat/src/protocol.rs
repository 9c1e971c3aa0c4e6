//! Dial-back protocol messages.
//!
//! A probe is a single request/response exchange: the requester sends its
//! identity and advertised addresses, the responder tries to dial one of them
//! and reports how that went.
//!
//! Byte-level encoding and stream handling belong to the transport behind
//! [`DialBackTransport`]. The messages derive serde traits so a transport can
//! pick whatever encoding it already speaks.

use crate::error::ProbeError;
use crate::host::{NetAddr, PeerId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Dial-back request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialRequest {
    /// Requesting peer
    pub peer: PeerId,
    /// Addresses the responder may dial
    pub addrs: Vec<NetAddr>,
}

/// Dial-back response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseStatus {
    /// Dial back succeeded
    Ok = 0,
    /// Dial back was attempted and failed
    DialError = 100,
    /// Responder declined to dial
    DialRefused = 101,
    /// Request was malformed
    BadRequest = 200,
    /// Responder failed internally
    InternalError = 300,
}

impl ResponseStatus {
    /// Numeric status code
    #[must_use]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Parse a numeric status code
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            100 => Some(Self::DialError),
            101 => Some(Self::DialRefused),
            200 => Some(Self::BadRequest),
            300 => Some(Self::InternalError),
            _ => None,
        }
    }
}

/// Dial-back response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialResponse {
    /// Outcome of the dial back
    pub status: ResponseStatus,
    /// Free-form detail from the responder
    pub status_text: String,
    /// Address that was dialed successfully (only with `Ok`)
    pub addr: Option<NetAddr>,
}

impl DialResponse {
    /// Successful response carrying the dialed address
    #[must_use]
    pub fn ok(addr: NetAddr) -> Self {
        Self {
            status: ResponseStatus::Ok,
            status_text: String::new(),
            addr: Some(addr),
        }
    }

    /// Failed response
    #[must_use]
    pub fn error(status: ResponseStatus, text: impl Into<String>) -> Self {
        Self {
            status,
            status_text: text.into(),
            addr: None,
        }
    }

    /// Classify the response into a probe result
    ///
    /// # Errors
    ///
    /// Each non-`Ok` status maps to its own [`ProbeError`] variant; only
    /// `DialError` maps to [`ProbeError::DialFailed`]. An `Ok` status without
    /// an address is a protocol violation.
    pub fn into_result(self) -> Result<NetAddr, ProbeError> {
        match self.status {
            ResponseStatus::Ok => self
                .addr
                .ok_or_else(|| ProbeError::protocol("OK response without address")),
            ResponseStatus::DialError => Err(ProbeError::DialFailed(self.status_text)),
            ResponseStatus::DialRefused => Err(ProbeError::Refused(self.status_text)),
            ResponseStatus::BadRequest => Err(ProbeError::BadRequest(self.status_text)),
            ResponseStatus::InternalError => Err(ProbeError::Internal(self.status_text)),
        }
    }
}

/// Transport for one dial-back exchange
///
/// Implementations open a stream to `peer` on the AutoNAT protocol, write the
/// request, read the response and close the stream. Failures to do any of
/// that are reported as [`ProbeError::Stream`].
#[async_trait]
pub trait DialBackTransport: Send + Sync {
    /// Send `request` to `peer` and wait for its response
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::Stream` if the exchange cannot be completed.
    async fn exchange(
        &self,
        peer: &PeerId,
        request: DialRequest,
    ) -> Result<DialResponse, ProbeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> NetAddr {
        "/ip4/1.2.3.4/tcp/4001".parse().unwrap()
    }

    #[test]
    fn test_status_codes() {
        for status in [
            ResponseStatus::Ok,
            ResponseStatus::DialError,
            ResponseStatus::DialRefused,
            ResponseStatus::BadRequest,
            ResponseStatus::InternalError,
        ] {
            assert_eq!(ResponseStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(ResponseStatus::DialError.code(), 100);
        assert_eq!(ResponseStatus::from_code(42), None);
    }

    #[test]
    fn test_ok_response_yields_address() {
        assert_eq!(DialResponse::ok(addr()).into_result(), Ok(addr()));
    }

    #[test]
    fn test_ok_without_address_is_protocol_error() {
        let response = DialResponse::error(ResponseStatus::Ok, "");
        let err = response.into_result().unwrap_err();
        assert!(matches!(err, ProbeError::Protocol(_)));
        assert!(!err.is_dial_error());
    }

    #[test]
    fn test_dial_error_classification() {
        let err = DialResponse::error(ResponseStatus::DialError, "dial timeout")
            .into_result()
            .unwrap_err();
        assert_eq!(err, ProbeError::DialFailed("dial timeout".into()));
        assert!(err.is_dial_error());
    }

    #[test]
    fn test_other_statuses_are_not_dial_errors() {
        for status in [
            ResponseStatus::DialRefused,
            ResponseStatus::BadRequest,
            ResponseStatus::InternalError,
        ] {
            let err = DialResponse::error(status, "nope").into_result().unwrap_err();
            assert!(!err.is_dial_error(), "{status:?} must be inconclusive");
        }
    }
}
