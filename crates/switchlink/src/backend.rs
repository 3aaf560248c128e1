//! In-process emulation of the switch side.
//!
//! [`SwitchState`] owns the authoritative tables (interfaces, MAC,
//! adjacency, VRFs, routes, DME objects) plus the single FIFO event
//! channel feeding the dispatch loop. Managers read and write the tables
//! directly; every mutation is announced as one event on the channel, so
//! per-entity ordering follows insertion order.
//!
//! The `pub` methods that do not exist on real switch APIs are the
//! switch-side levers: tests and demo tools use them to make the
//! emulated switch learn a MAC, flap a link, install a protocol route,
//! or drop the remote connection.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use dashmap::DashSet;
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use switchlink_types::{
    Af, EncapType, ErrorKind, ErrorStyle, Event, IntfType, IpPrefix, LinkState, MacAddress,
    MacEntryType, RunningEnv, SdkError, SdkResult,
};

use crate::adj::Adjacency;
use crate::dispatch::{IntfCategory, SwitchEvent};
use crate::dme::DmeObject;
use crate::intf::{Intf, IntfLayer};
use crate::mac::MacEntry;
use crate::rib::{
    prefix_contains, L3NextHop, L3Route, NextHopKind, PendingNextHop, PendingRoute, Vrf,
};

/// One installed route plus its owning protocol.
#[derive(Debug, Clone)]
pub(crate) struct RouteRecord {
    pub(crate) route: L3Route,
    pub(crate) protocol: String,
    pub(crate) tag: String,
}

/// The emulated switch: authoritative tables, session state, and the
/// event channel into the dispatch loop.
pub struct SwitchState {
    app_name: String,
    remote: bool,
    env: RunningEnv,
    error_style: ErrorStyle,

    pub(crate) intfs: RwLock<BTreeMap<String, Intf>>,
    pub(crate) macs: RwLock<BTreeMap<(u32, MacAddress), MacEntry>>,
    pub(crate) adjs: RwLock<BTreeMap<(String, IpAddr), Adjacency>>,
    pub(crate) vrfs: RwLock<BTreeMap<String, Vrf>>,
    pub(crate) routes: RwLock<BTreeMap<(String, IpPrefix), RouteRecord>>,
    pub(crate) dme_objs: RwLock<BTreeMap<String, DmeObject>>,

    next_vrf_id: AtomicU64,
    converged: DashSet<(String, Af)>,

    /// Bumped on every remote reconnect; managers holding an older value
    /// are stale until purged.
    epoch: AtomicU64,
    connected: AtomicBool,

    tx: UnboundedSender<SwitchEvent>,
    rx: Mutex<Option<UnboundedReceiver<SwitchEvent>>>,
}

impl SwitchState {
    pub(crate) fn new(
        app_name: &str,
        remote: bool,
        env: RunningEnv,
        error_style: ErrorStyle,
    ) -> SwitchState {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = SwitchState {
            app_name: app_name.to_string(),
            remote,
            env,
            error_style,
            intfs: RwLock::new(BTreeMap::new()),
            macs: RwLock::new(BTreeMap::new()),
            adjs: RwLock::new(BTreeMap::new()),
            vrfs: RwLock::new(BTreeMap::new()),
            routes: RwLock::new(BTreeMap::new()),
            dme_objs: RwLock::new(BTreeMap::new()),
            next_vrf_id: AtomicU64::new(1),
            converged: DashSet::new(),
            epoch: AtomicU64::new(1),
            connected: AtomicBool::new(true),
            tx,
            rx: Mutex::new(Some(rx)),
        };
        state.seed_initial_state();
        state
    }

    /// Factory-default switch content: the default VRF, a handful of
    /// front-panel ports and the management interface.
    fn seed_initial_state(&self) {
        self.create_vrf("default");
        for n in 1..=4 {
            self.seed_port(&format!("Ethernet1/{n}"), 10_000);
        }
        self.seed_port("mgmt0", 1_000);
    }

    pub(crate) fn app_name(&self) -> &str {
        &self.app_name
    }

    pub(crate) fn running_env(&self) -> RunningEnv {
        self.env
    }

    pub(crate) fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub(crate) fn is_connected(&self) -> bool {
        !self.remote || self.connected.load(Ordering::SeqCst)
    }

    /// Session gate every manager API passes through. Local mode always
    /// succeeds; remote mode fails while the link is down, and after a
    /// reconnect fails with a staleness error until the application
    /// purges and re-acquires its objects.
    pub(crate) fn check_session(
        &self,
        held_epoch: u64,
        module: &'static str,
        api: &'static str,
    ) -> SdkResult<()> {
        if !self.remote {
            return Ok(());
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(self.raise(
                ErrorKind::RemoteDown,
                module,
                api,
                "connection to the switch is down",
            ));
        }
        if held_epoch != self.epoch.load(Ordering::SeqCst) {
            return Err(self.raise(
                ErrorKind::StaleRemoteObjs,
                module,
                api,
                "SDK objects predate the last reconnect; purge and re-acquire them",
            ));
        }
        Ok(())
    }

    /// Builds an error in the style fixed at context construction.
    pub(crate) fn raise(
        &self,
        kind: ErrorKind,
        module: &'static str,
        api: &'static str,
        message: impl Into<String>,
    ) -> SdkError {
        SdkError::raise(self.error_style, kind, module, api, message)
    }

    pub(crate) fn emit(&self, event: SwitchEvent) {
        // Send fails only after the receiver is gone, i.e. post-stop.
        if self.tx.send(event).is_err() {
            debug!("event dropped; dispatch loop already stopped");
        }
    }

    pub(crate) fn emit_intf(&self, category: IntfCategory, snapshot: &Intf, event: Event) {
        let mut snapshot = snapshot.clone();
        snapshot.event = event;
        self.emit(SwitchEvent::Intf { category, snapshot });
    }

    pub(crate) fn emit_mac(&self, snapshot: &MacEntry, event: Event) {
        let mut snapshot = snapshot.clone();
        snapshot.event = event;
        self.emit(SwitchEvent::Mac { snapshot });
    }

    pub(crate) fn emit_adj(&self, snapshot: &Adjacency, event: Event) {
        let mut snapshot = snapshot.clone();
        snapshot.event = event;
        self.emit(SwitchEvent::Adj { snapshot });
    }

    pub(crate) fn emit_vrf(&self, snapshot: &Vrf, event: Event) {
        let mut snapshot = snapshot.clone();
        snapshot.event = event;
        self.emit(SwitchEvent::Vrf { snapshot });
    }

    pub(crate) fn emit_route(&self, snapshot: &L3Route, protocol: &str, tag: &str, event: Event) {
        let mut snapshot = snapshot.clone();
        snapshot.event = event;
        self.emit(SwitchEvent::Route {
            snapshot,
            protocol: protocol.to_string(),
            tag: tag.to_string(),
        });
    }

    pub(crate) fn emit_dme(&self, snapshot: &DmeObject, event: Event) {
        let mut snapshot = snapshot.clone();
        snapshot.event = event;
        self.emit(SwitchEvent::Dme { snapshot });
    }

    /// Hands the channel's receive side to the dispatch loop. `None` on
    /// the second call.
    pub(crate) fn take_receiver(&self) -> Option<UnboundedReceiver<SwitchEvent>> {
        self.rx.lock().unwrap().take()
    }

    pub(crate) fn restore_receiver(&self, rx: UnboundedReceiver<SwitchEvent>) {
        *self.rx.lock().unwrap() = Some(rx);
    }

    pub(crate) fn mark_converged(&self, af: Af, vrf_name: &str) {
        self.converged.insert((vrf_name.to_string(), af));
    }

    /// True once the application has declared route convergence for the
    /// (VRF, family) pair.
    pub fn is_converged(&self, af: Af, vrf_name: &str) -> bool {
        self.converged.contains(&(vrf_name.to_string(), af))
    }

    /// Applies one staged route operation and announces the results:
    /// a route event for protocol watchers, a completion event for the
    /// staging application, and one resolution event per recursive
    /// next-hop.
    pub(crate) fn apply_my_route(&self, pending: &PendingRoute) {
        let key = (pending.vrf.clone(), pending.prefix);

        if pending.delete_route {
            let removed = {
                let mut routes = self.routes.write().unwrap();
                match routes.get(&key) {
                    Some(rec) if rec.protocol == self.app_name => routes.remove(&key),
                    _ => None,
                }
            };
            if let Some(rec) = removed {
                let mut gone = rec.route;
                gone.nexthops.clear();
                self.emit_route(&gone, &rec.protocol, &rec.tag, Event::Delete);
                let mut done = gone.clone();
                done.event = Event::Delete;
                self.emit(SwitchEvent::MyRoute { snapshot: done });
            }
            return;
        }

        let mut recursive_results: Vec<(L3NextHop, bool)> = Vec::new();
        let (route, event) = {
            let mut routes = self.routes.write().unwrap();
            let existed = routes.contains_key(&key);
            let rec = routes.entry(key).or_insert_with(|| RouteRecord {
                route: L3Route {
                    vrf: pending.vrf.clone(),
                    prefix: pending.prefix,
                    nexthops: Vec::new(),
                    event: Event::NoEvent,
                },
                protocol: self.app_name.clone(),
                tag: String::new(),
            });
            for (addr, intf) in &pending.del_nhs {
                rec.route.nexthops.retain(|nh| {
                    !(nh.address == *addr && intf.as_deref().map_or(true, |i| nh.out_intf == i))
                });
            }
            for staged in &pending.add_nhs {
                let nh = match staged {
                    PendingNextHop::Direct {
                        address,
                        intf_name,
                        preference,
                    } => L3NextHop {
                        address: *address,
                        out_intf: intf_name.clone(),
                        vrf: pending.vrf.clone(),
                        owner: self.app_name.clone(),
                        preference: *preference,
                        metric: 0,
                        tag: 0,
                        segment_id: 0,
                        tunnel_id: 0,
                        encap: EncapType::None,
                        kinds: vec![NextHopKind::Direct],
                    },
                    PendingNextHop::Recursive {
                        address,
                        preference,
                    } => L3NextHop {
                        address: *address,
                        out_intf: String::new(),
                        vrf: pending.vrf.clone(),
                        owner: self.app_name.clone(),
                        preference: *preference,
                        metric: 0,
                        tag: 0,
                        segment_id: 0,
                        tunnel_id: 0,
                        encap: EncapType::None,
                        kinds: vec![NextHopKind::Recursive],
                    },
                };
                rec.route
                    .nexthops
                    .retain(|existing| {
                        !(existing.address == nh.address && existing.out_intf == nh.out_intf)
                    });
                rec.route.nexthops.push(nh);
            }
            (
                rec.route.clone(),
                if existed { Event::Update } else { Event::Add },
            )
        };

        // Resolve recursive next-hops against the installed table, the
        // staged route itself excluded.
        {
            let routes = self.routes.read().unwrap();
            for nh in route
                .nexthops
                .iter()
                .filter(|nh| nh.check_kind(NextHopKind::Recursive))
            {
                let resolved = routes.iter().any(|((vrf, prefix), _)| {
                    vrf == &route.vrf
                        && *prefix != route.prefix
                        && prefix_contains(*prefix, nh.address)
                });
                recursive_results.push((nh.clone(), resolved));
            }
        }

        info!(
            vrf = %route.vrf,
            prefix = %route.prefix,
            nexthops = route.nexthop_count(),
            "installed application route"
        );
        self.emit_route(&route, &self.app_name, "", event);
        let mut done = route.clone();
        done.event = event;
        self.emit(SwitchEvent::MyRoute { snapshot: done });
        for (nh, resolved) in recursive_results {
            let mut snapshot = route.clone();
            snapshot.nexthops = vec![nh];
            snapshot.event = Event::Update;
            self.emit(SwitchEvent::RecursiveNextHop { snapshot, resolved });
        }
    }

    // --- switch-side levers -------------------------------------------

    /// Brings a front-panel or management port into existence, admin and
    /// oper up.
    pub fn seed_port(&self, name: &str, speed_mbps: u32) {
        let mut intf = Intf::new(name);
        intf.itype = IntfType::from_name(name);
        intf.layer = IntfLayer::L2;
        intf.admin_state = LinkState::Up;
        intf.oper_state = LinkState::Up;
        intf.speed_mbps = speed_mbps;
        intf.l2_address_hw = hw_addr_for(name);
        self.intfs
            .write()
            .unwrap()
            .insert(name.to_string(), intf.clone());
        self.emit_intf(IntfCategory::AddDel, &intf, Event::Add);
    }

    /// Flaps the physical link of one port.
    pub fn set_oper_state(&self, name: &str, state: LinkState) {
        let snapshot = {
            let mut intfs = self.intfs.write().unwrap();
            let Some(intf) = intfs.get_mut(name) else {
                warn!(intf = name, "oper state change for unknown interface");
                return;
            };
            intf.oper_state = state;
            intf.last_modified = chrono::Utc::now();
            intf.clone()
        };
        self.emit_intf(IntfCategory::State, &snapshot, Event::Update);
    }

    /// The switch learns (or moves) a dynamic MAC entry.
    pub fn learn_mac(&self, mac: MacAddress, vlan: u32, intf_name: &str) {
        let entry = MacEntry {
            mac,
            vlan,
            intf_name: intf_name.to_string(),
            entry_type: MacEntryType::Dynamic,
            event: Event::NoEvent,
        };
        let previous = self
            .macs
            .write()
            .unwrap()
            .insert((vlan, mac), entry.clone());
        let event = if previous.is_some() {
            Event::Update
        } else {
            Event::Add
        };
        self.emit_mac(&entry, event);
    }

    /// Ages out a dynamic MAC entry. Static entries do not age.
    pub fn age_mac(&self, mac: MacAddress, vlan: u32) {
        let removed = {
            let mut macs = self.macs.write().unwrap();
            match macs.get(&(vlan, mac)) {
                Some(e) if e.entry_type == MacEntryType::Dynamic => macs.remove(&(vlan, mac)),
                _ => None,
            }
        };
        if let Some(entry) = removed {
            self.emit_mac(&entry, Event::Delete);
        }
    }

    /// The switch resolves an adjacency (ARP reply or ND advertisement).
    pub fn learn_adj(&self, intf_name: &str, ip: IpAddr, mac: MacAddress) {
        let source = match ip {
            IpAddr::V4(_) => "arp",
            IpAddr::V6(_) => "icmpv6-nd",
        };
        let vrf = self
            .intfs
            .read()
            .unwrap()
            .get(intf_name)
            .map(|i| i.vrf.clone())
            .unwrap_or_else(|| "default".to_string());
        let adj = Adjacency {
            ip,
            mac,
            vrf,
            intf_name: intf_name.to_string(),
            phy_intf_name: intf_name.to_string(),
            preference: 0,
            source: source.to_string(),
            event: Event::NoEvent,
        };
        let previous = self
            .adjs
            .write()
            .unwrap()
            .insert((intf_name.to_string(), ip), adj.clone());
        let event = if previous.is_some() {
            Event::Update
        } else {
            Event::Add
        };
        self.emit_adj(&adj, event);
    }

    /// Flushes every adjacency learned on one interface.
    pub fn flush_adj(&self, intf_name: &str) {
        let flushed: Vec<Adjacency> = {
            let mut adjs = self.adjs.write().unwrap();
            let keys: Vec<(String, IpAddr)> = adjs
                .keys()
                .filter(|(name, _)| name == intf_name)
                .cloned()
                .collect();
            keys.into_iter().filter_map(|k| adjs.remove(&k)).collect()
        };
        for adj in flushed {
            self.emit_adj(&adj, Event::Delete);
        }
    }

    /// Creates a VRF and announces it.
    pub fn create_vrf(&self, name: &str) {
        let id = self.next_vrf_id.fetch_add(1, Ordering::SeqCst);
        let vrf = Vrf {
            name: name.to_string(),
            id,
            table_id_v4: 0x1_0000 + id,
            table_id_v6: 0x8000_0000 + id,
            state: LinkState::Up,
            event: Event::NoEvent,
        };
        self.vrfs
            .write()
            .unwrap()
            .insert(name.to_string(), vrf.clone());
        self.emit_vrf(&vrf, Event::Add);
    }

    /// Deletes a VRF and announces it. Routes in the VRF are dropped
    /// silently, matching a table teardown.
    pub fn delete_vrf(&self, name: &str) {
        let removed = self.vrfs.write().unwrap().remove(name);
        if let Some(vrf) = removed {
            self.routes
                .write()
                .unwrap()
                .retain(|(vrf_name, _), _| vrf_name != name);
            self.emit_vrf(&vrf, Event::Delete);
        }
    }

    /// Installs a protocol-owned route with direct next-hops, as a
    /// routing protocol on the switch would.
    pub fn install_route(
        &self,
        vrf_name: &str,
        prefix: IpPrefix,
        protocol: &str,
        tag: &str,
        nexthops: &[(IpAddr, &str)],
    ) {
        let route = L3Route {
            vrf: vrf_name.to_string(),
            prefix,
            nexthops: nexthops
                .iter()
                .map(|(addr, intf)| L3NextHop {
                    address: *addr,
                    out_intf: intf.to_string(),
                    vrf: vrf_name.to_string(),
                    owner: protocol.to_string(),
                    preference: 0,
                    metric: 0,
                    tag: 0,
                    segment_id: 0,
                    tunnel_id: 0,
                    encap: EncapType::None,
                    kinds: vec![NextHopKind::Direct],
                })
                .collect(),
            event: Event::NoEvent,
        };
        let previous = self.routes.write().unwrap().insert(
            (vrf_name.to_string(), prefix),
            RouteRecord {
                route: route.clone(),
                protocol: protocol.to_string(),
                tag: tag.to_string(),
            },
        );
        let event = if previous.is_some() {
            Event::Update
        } else {
            Event::Add
        };
        self.emit_route(&route, protocol, tag, event);
    }

    /// Withdraws an installed route.
    pub fn withdraw_route(&self, vrf_name: &str, prefix: IpPrefix) {
        let removed = self
            .routes
            .write()
            .unwrap()
            .remove(&(vrf_name.to_string(), prefix));
        if let Some(rec) = removed {
            let mut gone = rec.route;
            gone.nexthops.clear();
            self.emit_route(&gone, &rec.protocol, &rec.tag, Event::Delete);
        }
    }

    /// Asks the application to re-install its routes, e.g. after a
    /// supervisor switchover. A zero address with zero mask length means
    /// every route in the VRF.
    pub fn request_route_repopulate(&self, vrf_name: &str, route_addr: &str, mask_len: u8) {
        self.emit(SwitchEvent::RouteRepopulate {
            vrf_name: vrf_name.to_string(),
            route_addr: route_addr.to_string(),
            mask_len,
        });
    }

    /// Creates or replaces a DN-addressed config object.
    pub fn put_dme_object(&self, dn: &str, properties: Value) {
        let obj = DmeObject::from_parts(dn, properties);
        let previous = self
            .dme_objs
            .write()
            .unwrap()
            .insert(dn.to_string(), obj.clone());
        let event = if previous.is_some() {
            Event::Update
        } else {
            Event::Add
        };
        self.emit_dme(&obj, event);
    }

    /// Removes a DN-addressed config object.
    pub fn drop_dme_object(&self, dn: &str) {
        let removed = self.dme_objs.write().unwrap().remove(dn);
        if let Some(obj) = removed {
            self.emit_dme(&obj, Event::Delete);
        }
    }

    /// Severs the remote connection. Every manager API fails until the
    /// link comes back.
    pub fn remote_link_down(&self) {
        if !self.remote {
            return;
        }
        self.connected.store(false, Ordering::SeqCst);
        warn!("remote connection to switch lost");
        self.emit(SwitchEvent::RemoteConn { up: false });
    }

    /// Restores the remote connection under a new session epoch. Objects
    /// acquired before the drop stay unusable until the application
    /// purges them.
    pub fn remote_link_up(&self) {
        if !self.remote {
            return;
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        info!("remote connection to switch restored");
        self.emit(SwitchEvent::RemoteConn { up: true });
    }
}

/// Deterministic burned-in address derived from the port name.
fn hw_addr_for(name: &str) -> MacAddress {
    let mut octets = [0x00, 0x1b, 0x21, 0, 0, 0];
    let mut h: u32 = 0;
    for b in name.bytes() {
        h = h.wrapping_mul(31).wrapping_add(b as u32);
    }
    octets[3] = (h >> 16) as u8;
    octets[4] = (h >> 8) as u8;
    octets[5] = h as u8;
    MacAddress::new(octets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SwitchState {
        SwitchState::new("testapp", false, RunningEnv::Bash, ErrorStyle::Advanced)
    }

    #[test]
    fn test_seeded_defaults() {
        let s = state();
        let intfs = s.intfs.read().unwrap();
        assert!(intfs.contains_key("Ethernet1/1"));
        assert!(intfs.contains_key("mgmt0"));
        assert!(s.vrfs.read().unwrap().contains_key("default"));
    }

    #[test]
    fn test_local_mode_session_always_valid() {
        let s = state();
        assert!(s.check_session(0, "test", "test").is_ok());
    }

    #[test]
    fn test_remote_epoch_staleness() {
        let s = SwitchState::new("testapp", true, RunningEnv::Remote, ErrorStyle::Advanced);
        let held = s.current_epoch();
        assert!(s.check_session(held, "test", "test").is_ok());

        s.remote_link_down();
        let err = s.check_session(held, "test", "test").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::RemoteDown));

        s.remote_link_up();
        let err = s.check_session(held, "test", "test").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::StaleRemoteObjs));
        assert!(s.check_session(s.current_epoch(), "test", "test").is_ok());
    }

    #[test]
    fn test_hw_addr_is_unicast_and_stable() {
        let a = hw_addr_for("Ethernet1/1");
        let b = hw_addr_for("Ethernet1/1");
        assert_eq!(a, b);
        assert!(!a.is_multicast());
        assert_ne!(a, hw_addr_for("Ethernet1/2"));
    }
}
