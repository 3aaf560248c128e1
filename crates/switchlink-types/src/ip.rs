//! IP prefix type with the SDK's default-length rule.

use crate::{Af, ParseError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// An IP network prefix (address + mask length).
///
/// Route APIs accept a bare address with mask length 0, which is resolved
/// to a host route: /32 for IPv4, /128 for IPv6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IpPrefix {
    addr: IpAddr,
    mask_len: u8,
}

impl IpPrefix {
    /// Builds a prefix, applying the default-length rule when `mask_len`
    /// is 0 and validating the length against the address family.
    pub fn new(addr: IpAddr, mask_len: u8) -> Result<Self, ParseError> {
        let af = match addr {
            IpAddr::V4(_) => Af::Ipv4,
            IpAddr::V6(_) => Af::Ipv6,
        };
        let mask_len = if mask_len == 0 {
            af.host_mask_len()
        } else {
            mask_len
        };
        if mask_len > af.host_mask_len() {
            return Err(ParseError::InvalidPrefixLen(mask_len));
        }
        Ok(IpPrefix { addr, mask_len })
    }

    /// Parses an address string and applies [`IpPrefix::new`].
    pub fn parse(addr: &str, mask_len: u8) -> Result<Self, ParseError> {
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| ParseError::InvalidIpAddress(addr.to_string()))?;
        IpPrefix::new(addr, mask_len)
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn mask_len(&self) -> u8 {
        self.mask_len
    }

    pub fn af(&self) -> Af {
        match self.addr {
            IpAddr::V4(_) => Af::Ipv4,
            IpAddr::V6(_) => Af::Ipv6,
        }
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.mask_len)
    }
}

impl FromStr for IpPrefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((addr, len)) => {
                let len: u8 = len
                    .parse()
                    .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))?;
                IpPrefix::parse(addr, len)
            }
            None => IpPrefix::parse(s, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_length_rule() {
        let v4 = IpPrefix::parse("10.1.1.1", 0).unwrap();
        assert_eq!(v4.mask_len(), 32);
        let v6 = IpPrefix::parse("2001:db8::1", 0).unwrap();
        assert_eq!(v6.mask_len(), 128);
    }

    #[test]
    fn test_explicit_length() {
        let p = IpPrefix::parse("10.1.1.0", 24).unwrap();
        assert_eq!(p.to_string(), "10.1.1.0/24");
        assert_eq!(p.af(), Af::Ipv4);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(IpPrefix::parse("not-an-ip", 24).is_err());
        assert!(IpPrefix::parse("10.1.1.0", 33).is_err());
    }

    #[test]
    fn test_from_str_cidr() {
        let p: IpPrefix = "192.168.0.0/16".parse().unwrap();
        assert_eq!(p.mask_len(), 16);
        let host: IpPrefix = "192.168.0.1".parse().unwrap();
        assert_eq!(host.mask_len(), 32);
    }
}
