//! Shared enumerations used across all SDK managers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Event category attached to an entity snapshot.
///
/// The category is meaningful only on snapshots delivered into a handler
/// callback; snapshots obtained through `get_*`/`iterate_*` calls always
/// carry [`Event::NoEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Event {
    /// Not delivered through a callback.
    NoEvent,
    /// Entity was created.
    Add,
    /// Entity was removed.
    Delete,
    /// Entity changed in place.
    Update,
    /// Replay of a pre-existing entity during a watch download.
    Download,
    /// Marker closing a watch download.
    DownloadDone,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::NoEvent => "no-event",
            Event::Add => "add",
            Event::Delete => "delete",
            Event::Update => "update",
            Event::Download => "download",
            Event::DownloadDone => "download-done",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address family for adjacency and RIB operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Af {
    Ipv4,
    Ipv6,
}

impl Af {
    /// Default prefix length used when a route address is given without one.
    pub fn host_mask_len(&self) -> u8 {
        match self {
            Af::Ipv4 => 32,
            Af::Ipv6 => 128,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Af::Ipv4 => "ipv4",
            Af::Ipv6 => "ipv6",
        }
    }
}

impl fmt::Display for Af {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational or administrative state of an interface or VRF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkState {
    Unknown,
    Down,
    Up,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Unknown => "unknown",
            LinkState::Down => "down",
            LinkState::Up => "up",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interface classification, derived from the interface name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntfType {
    Unknown,
    Ethernet,
    Svi,
    PortChannel,
    Loopback,
    SubIntf,
    Tunnel,
    Mgmt,
}

impl IntfType {
    /// Classifies an interface by its name, the way the switch CLI does.
    ///
    /// A dotted suffix marks a subinterface regardless of the parent type.
    pub fn from_name(name: &str) -> IntfType {
        let lower = name.to_ascii_lowercase();
        if lower.contains('.') {
            return IntfType::SubIntf;
        }
        if lower.starts_with("eth") {
            IntfType::Ethernet
        } else if lower.starts_with("vlan") {
            IntfType::Svi
        } else if lower.starts_with("po") {
            IntfType::PortChannel
        } else if lower.starts_with("lo") {
            IntfType::Loopback
        } else if lower.starts_with("tun") {
            IntfType::Tunnel
        } else if lower.starts_with("mgmt") {
            IntfType::Mgmt
        } else {
            IntfType::Unknown
        }
    }
}

/// MAC table entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MacEntryType {
    Static,
    Dynamic,
}

impl MacEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MacEntryType::Static => "static",
            MacEntryType::Dynamic => "dynamic",
        }
    }
}

/// Next-hop encapsulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncapType {
    None,
    Vxlan,
}

/// CPU-share priority class for an SDK application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppPriority {
    /// 25% of one CPU. The default.
    Low,
    /// 50% of one CPU.
    Medium,
    /// 75% of one CPU.
    High,
    /// No limit.
    Unlimited,
}

impl Default for AppPriority {
    fn default() -> Self {
        AppPriority::Low
    }
}

/// Rendering format for custom show-command output.
///
/// Applications emit [`RecordFormat::Text`] or [`RecordFormat::Json`]; XML
/// is derived from the JSON form on demand and never emitted directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordFormat {
    Text,
    Json,
    Xml,
}

/// How the application process was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunningEnv {
    /// Plain process on the switch.
    Bash,
    /// Managed service started from the switch shell.
    Vsh,
    /// Off-switch process over a remote session.
    Remote,
}

/// Severity used for both syslog records and advanced-mode errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Emergency => "emergency",
            Severity::Alert => "alert",
            Severity::Critical => "critical",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Notice => "notice",
            Severity::Info => "info",
            Severity::Debug => "debug",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intf_type_from_name() {
        assert_eq!(IntfType::from_name("Ethernet1/3"), IntfType::Ethernet);
        assert_eq!(IntfType::from_name("eth1/5"), IntfType::Ethernet);
        assert_eq!(IntfType::from_name("Vlan100"), IntfType::Svi);
        assert_eq!(IntfType::from_name("po10"), IntfType::PortChannel);
        assert_eq!(IntfType::from_name("lo0"), IntfType::Loopback);
        assert_eq!(IntfType::from_name("Ethernet1/3.100"), IntfType::SubIntf);
        assert_eq!(IntfType::from_name("mgmt0"), IntfType::Mgmt);
        assert_eq!(IntfType::from_name("bond7"), IntfType::Unknown);
    }

    #[test]
    fn test_af_host_mask_len() {
        assert_eq!(Af::Ipv4.host_mask_len(), 32);
        assert_eq!(Af::Ipv6.host_mask_len(), 128);
    }

    #[test]
    fn test_event_display() {
        assert_eq!(Event::DownloadDone.to_string(), "download-done");
        assert_eq!(Event::NoEvent.as_str(), "no-event");
    }
}
