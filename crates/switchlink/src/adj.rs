//! Adjacency manager: ARP/ND entry queries and change notifications.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashSet;

use switchlink_types::{Af, ErrorKind, Event, MacAddress, SdkResult};

use crate::backend::SwitchState;
use crate::dispatch::{invoke, SwitchEvent};

const MODULE: &str = "adj";

/// One learned L3-to-L2 mapping (ARP or ND entry).
#[derive(Debug, Clone)]
pub struct Adjacency {
    pub(crate) ip: IpAddr,
    pub(crate) mac: MacAddress,
    pub(crate) vrf: String,
    pub(crate) intf_name: String,
    pub(crate) phy_intf_name: String,
    pub(crate) preference: u32,
    pub(crate) source: String,
    pub(crate) event: Event,
}

impl Adjacency {
    pub fn ip_addr(&self) -> IpAddr {
        self.ip
    }

    pub fn mac_addr(&self) -> MacAddress {
        self.mac
    }

    pub fn vrf(&self) -> &str {
        &self.vrf
    }

    pub fn intf_name(&self) -> &str {
        &self.intf_name
    }

    /// Physical interface for adjacencies learned on logical interfaces.
    pub fn phy_intf_name(&self) -> &str {
        &self.phy_intf_name
    }

    pub fn preference(&self) -> u32 {
        self.preference
    }

    /// Protocol that produced the entry ("arp", "icmpv6-nd", "static").
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn af(&self) -> Af {
        match self.ip {
            IpAddr::V4(_) => Af::Ipv4,
            IpAddr::V6(_) => Af::Ipv6,
        }
    }

    /// Event category. Meaningful only inside a handler callback.
    pub fn event(&self) -> Event {
        self.event
    }
}

/// Application callbacks for adjacency events.
pub trait AdjHandler: Send {
    /// Fires for every watched adjacency change, and for each replayed
    /// entry during a download.
    fn post_adj_cb(&mut self, _adj: &Adjacency) {}

    /// Closes an IPv4 download replay with the originating filter
    /// context. `ip` is `None` for interface-wide watches.
    fn post_adj_ipv4_download_done_cb(&mut self, _intf_name: &str, _ip: Option<IpAddr>) {}

    /// Closes an IPv6 download replay with the originating filter
    /// context.
    fn post_adj_ipv6_download_done_cb(&mut self, _intf_name: &str, _ip: Option<IpAddr>) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AdjFilter {
    intf_name: String,
    ip: Option<IpAddr>,
}

/// Manager for the adjacency (ARP/ND) table.
pub struct AdjMgr {
    backend: Arc<SwitchState>,
    epoch: AtomicU64,
    watch_all_v4: AtomicBool,
    watch_all_v6: AtomicBool,
    filters: DashSet<AdjFilter>,
    handler: Mutex<Option<Box<dyn AdjHandler>>>,
}

impl AdjMgr {
    pub(crate) fn new(backend: Arc<SwitchState>) -> Arc<AdjMgr> {
        Arc::new(AdjMgr {
            epoch: AtomicU64::new(backend.current_epoch()),
            backend,
            watch_all_v4: AtomicBool::new(false),
            watch_all_v6: AtomicBool::new(false),
            filters: DashSet::new(),
            handler: Mutex::new(None),
        })
    }

    fn check(&self, api: &'static str) -> SdkResult<()> {
        self.backend
            .check_session(self.epoch.load(Ordering::SeqCst), MODULE, api)
    }

    /// Returns a caller-owned snapshot of one adjacency.
    pub fn get_adj(&self, intf_name: &str, ip: IpAddr) -> SdkResult<Option<Adjacency>> {
        self.check("get_adj")?;
        if intf_name.is_empty() {
            return Err(self.backend.raise(
                ErrorKind::InvalidArg,
                MODULE,
                "get_adj",
                "interface name cannot be empty",
            ));
        }
        Ok(self
            .backend
            .adjs
            .read()
            .unwrap()
            .get(&(intf_name.to_string(), ip))
            .cloned())
    }

    /// Asks the switch to resolve an adjacency. The emulation re-announces
    /// an existing entry through the normal callback and reports whether
    /// the entry was known; it does not originate probe traffic.
    pub fn discover_adj(&self, intf_name: &str, ip: IpAddr) -> SdkResult<bool> {
        self.check("discover_adj")?;
        let found = self
            .backend
            .adjs
            .read()
            .unwrap()
            .get(&(intf_name.to_string(), ip))
            .cloned();
        match found {
            Some(adj) => {
                self.backend.emit_adj(&adj, Event::Update);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Watches every adjacency in one address family. With `download`,
    /// existing entries are replayed before the per-family download-done
    /// callback fires with an empty interface context.
    pub fn watch_all_adjs(&self, af: Af, download: bool) -> SdkResult<()> {
        self.check("watch_all_adjs")?;
        match af {
            Af::Ipv4 => self.watch_all_v4.store(true, Ordering::SeqCst),
            Af::Ipv6 => self.watch_all_v6.store(true, Ordering::SeqCst),
        }
        if download {
            self.replay(af, None, None);
        }
        Ok(())
    }

    /// Silences one address family completely: the all-watch, every
    /// address filter of that family, and interface-wide filters (which
    /// span both families) are dropped. The handler stays registered.
    pub fn unwatch_all_adjs(&self, af: Af) -> SdkResult<()> {
        self.check("unwatch_all_adjs")?;
        match af {
            Af::Ipv4 => self.watch_all_v4.store(false, Ordering::SeqCst),
            Af::Ipv6 => self.watch_all_v6.store(false, Ordering::SeqCst),
        }
        self.filters
            .retain(|f| f.ip.is_some_and(|ip| af_of(ip) != af));
        Ok(())
    }

    /// Watches one interface, or one (interface, address) pair. Forward
    /// references are allowed.
    pub fn watch_adj(&self, intf_name: &str, ip: Option<IpAddr>, download: bool) -> SdkResult<bool> {
        self.check("watch_adj")?;
        if intf_name.is_empty() {
            return Ok(false);
        }
        self.filters.insert(AdjFilter {
            intf_name: intf_name.to_string(),
            ip,
        });
        if download {
            match ip {
                Some(ip) => self.replay(af_of(ip), Some(intf_name), Some(ip)),
                None => {
                    // Interface-wide watch downloads both families.
                    self.replay(Af::Ipv4, Some(intf_name), None);
                    self.replay(Af::Ipv6, Some(intf_name), None);
                }
            }
        }
        Ok(true)
    }

    /// Drops one specific filter, leaving other filters and the handler
    /// registration intact.
    pub fn unwatch_adj(&self, intf_name: &str, ip: Option<IpAddr>) -> SdkResult<bool> {
        self.check("unwatch_adj")?;
        Ok(self
            .filters
            .remove(&AdjFilter {
                intf_name: intf_name.to_string(),
                ip,
            })
            .is_some())
    }

    pub fn set_adj_handler(&self, handler: Box<dyn AdjHandler>) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    pub fn unset_adj_handler(&self) {
        *self.handler.lock().unwrap() = None;
    }

    pub fn has_adj_handler(&self) -> bool {
        self.handler.lock().unwrap().is_some()
    }

    fn replay(&self, af: Af, intf_name: Option<&str>, ip: Option<IpAddr>) {
        let entries: Vec<Adjacency> = self
            .backend
            .adjs
            .read()
            .unwrap()
            .values()
            .filter(|a| a.af() == af)
            .filter(|a| intf_name.map_or(true, |n| a.intf_name == n))
            .filter(|a| ip.map_or(true, |ip| a.ip == ip))
            .cloned()
            .collect();
        for adj in entries {
            self.backend.emit_adj(&adj, Event::Download);
        }
        self.backend.emit(SwitchEvent::AdjDownloadDone {
            af,
            intf_name: intf_name.unwrap_or_default().to_string(),
            ip,
        });
    }

    fn matches(&self, adj: &Adjacency) -> bool {
        let all = match adj.af() {
            Af::Ipv4 => self.watch_all_v4.load(Ordering::SeqCst),
            Af::Ipv6 => self.watch_all_v6.load(Ordering::SeqCst),
        };
        if all {
            return true;
        }
        self.filters
            .iter()
            .any(|f| f.intf_name == adj.intf_name && f.ip.map_or(true, |ip| ip == adj.ip))
    }

    /// Called from the dispatch loop only.
    pub(crate) fn deliver(&self, adj: &Adjacency) {
        if !self.matches(adj) {
            return;
        }
        let mut slot = self.handler.lock().unwrap();
        if let Some(handler) = slot.as_mut() {
            invoke("post_adj_cb", || handler.post_adj_cb(adj));
        }
    }

    /// Called from the dispatch loop only.
    pub(crate) fn deliver_download_done(&self, af: Af, intf_name: &str, ip: Option<IpAddr>) {
        let mut slot = self.handler.lock().unwrap();
        if let Some(handler) = slot.as_mut() {
            match af {
                Af::Ipv4 => invoke("post_adj_ipv4_download_done_cb", || {
                    handler.post_adj_ipv4_download_done_cb(intf_name, ip)
                }),
                Af::Ipv6 => invoke("post_adj_ipv6_download_done_cb", || {
                    handler.post_adj_ipv6_download_done_cb(intf_name, ip)
                }),
            }
        }
    }

    pub(crate) fn purge(&self) {
        self.epoch
            .store(self.backend.current_epoch(), Ordering::SeqCst);
        self.watch_all_v4.store(false, Ordering::SeqCst);
        self.watch_all_v6.store(false, Ordering::SeqCst);
        self.filters.clear();
    }
}

fn af_of(ip: IpAddr) -> Af {
    match ip {
        IpAddr::V4(_) => Af::Ipv4,
        IpAddr::V6(_) => Af::Ipv6,
    }
}
