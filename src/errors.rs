use crate::constants::Rcode;
use thiserror::Error;

/// Errors produced while parsing or rebuilding a DNS message.
///
/// Every error maps onto the DNS rcode space through [`MsgError::rcode`]:
/// malformed input is `FORMERR`, resource exhaustion is `SERVFAIL`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MsgError {
    #[error("Packet truncated")]
    Truncated,
    #[error("Invalid name in a DNS record: {0}")]
    InvalidName(&'static str),
    #[error("Invalid DNS packet: {0}")]
    InvalidPacket(&'static str),
    #[error("Allocation failure")]
    AllocFailure,
}

impl MsgError {
    /// The DNS return code this error is reported as.
    pub fn rcode(&self) -> Rcode {
        match self {
            MsgError::Truncated | MsgError::InvalidName(_) | MsgError::InvalidPacket(_) => {
                Rcode::FORMERR
            }
            MsgError::AllocFailure => Rcode::SERVFAIL,
        }
    }
}

pub type Result<T> = std::result::Result<T, MsgError>;
