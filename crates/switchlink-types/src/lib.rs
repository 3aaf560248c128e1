//! Common types for the switchlink SDK.
//!
//! This crate provides the vocabulary shared by every manager in the SDK:
//!
//! - [`Event`]: the tagged event category attached to entity snapshots
//! - [`Af`]: address families for adjacency and RIB operations
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`IpPrefix`]: IP network prefixes with the SDK's default-length rule
//! - [`ErrorKind`] / [`SdkError`]: the fixed, non-extensible error taxonomy
//!
//! The error taxonomy is deliberately closed: applications match on
//! [`ErrorKind`] but cannot add variants, so the set of failure modes an
//! application has to reason about is the same across SDK releases.

mod enums;
mod error;
mod ip;
mod mac;

pub use enums::{
    Af, AppPriority, EncapType, Event, IntfType, LinkState, MacEntryType, RecordFormat,
    RunningEnv, Severity,
};
pub use error::{ErrorKind, ErrorStyle, SdkError, SdkResult};
pub use ip::IpPrefix;
pub use mac::MacAddress;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid prefix length: /{0}")]
    InvalidPrefixLen(u8),

    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u32),
}
