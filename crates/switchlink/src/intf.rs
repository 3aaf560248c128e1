//! Interface manager: snapshots, change callbacks and write-through
//! configuration for switch interfaces.
//!
//! Applications watch individual interfaces (or `"all"`) and receive one
//! callback per change category: create/delete, address changes per
//! family, admin/oper state, layer, port-channel membership, VRF and VLAN
//! binding. Snapshots handed to callbacks are borrowed and valid only for
//! the callback's duration.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use tracing::info;

use switchlink_types::{
    Af, ErrorKind, Event, IntfType, IpPrefix, LinkState, MacAddress, SdkResult,
};

use crate::backend::SwitchState;
use crate::dispatch::{invoke_advisory, IntfCategory};

const MODULE: &str = "intf";

/// Forwarding layer of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntfLayer {
    L2,
    L3,
}

impl IntfLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntfLayer::L2 => "L2",
            IntfLayer::L3 => "L3",
        }
    }
}

/// One interface's configuration and state, as a point-in-time snapshot.
#[derive(Debug, Clone)]
pub struct Intf {
    pub(crate) name: String,
    pub(crate) itype: IntfType,
    pub(crate) layer: IntfLayer,
    pub(crate) vrf: String,
    pub(crate) vlan: Option<u32>,
    pub(crate) description: String,
    pub(crate) v4_primary: Option<IpPrefix>,
    pub(crate) v4_secondary: Vec<IpPrefix>,
    pub(crate) v6_primary: Option<IpPrefix>,
    pub(crate) v6_secondary: Vec<IpPrefix>,
    pub(crate) l2_address: Option<MacAddress>,
    pub(crate) l2_address_hw: MacAddress,
    pub(crate) admin_state: LinkState,
    pub(crate) oper_state: LinkState,
    pub(crate) mtu: u32,
    pub(crate) speed_mbps: u32,
    pub(crate) members: Vec<String>,
    pub(crate) last_modified: DateTime<Utc>,
    pub(crate) event: Event,
}

impl Intf {
    pub(crate) fn new(name: &str) -> Intf {
        Intf {
            name: name.to_string(),
            itype: IntfType::from_name(name),
            layer: IntfLayer::L2,
            vrf: "default".to_string(),
            vlan: None,
            description: String::new(),
            v4_primary: None,
            v4_secondary: Vec::new(),
            v6_primary: None,
            v6_secondary: Vec::new(),
            l2_address: None,
            l2_address_hw: MacAddress::ZERO,
            admin_state: LinkState::Down,
            oper_state: LinkState::Down,
            mtu: 1500,
            speed_mbps: 0,
            members: Vec::new(),
            last_modified: Utc::now(),
            event: Event::NoEvent,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn intf_type(&self) -> IntfType {
        self.itype
    }

    pub fn layer(&self) -> IntfLayer {
        self.layer
    }

    pub fn vrf(&self) -> &str {
        &self.vrf
    }

    pub fn vlan(&self) -> Option<u32> {
        self.vlan
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Primary L3 address for the family, if configured.
    pub fn primary_address(&self, af: Af) -> Option<IpPrefix> {
        match af {
            Af::Ipv4 => self.v4_primary,
            Af::Ipv6 => self.v6_primary,
        }
    }

    /// Secondary L3 addresses for the family.
    pub fn secondary_addresses(&self, af: Af) -> &[IpPrefix] {
        match af {
            Af::Ipv4 => &self.v4_secondary,
            Af::Ipv6 => &self.v6_secondary,
        }
    }

    /// Configured L2 address; falls back to the burned-in address.
    pub fn l2_address(&self) -> MacAddress {
        self.l2_address.unwrap_or(self.l2_address_hw)
    }

    /// Burned-in hardware address.
    pub fn l2_address_hw(&self) -> MacAddress {
        self.l2_address_hw
    }

    pub fn admin_state(&self) -> LinkState {
        self.admin_state
    }

    pub fn oper_state(&self) -> LinkState {
        self.oper_state
    }

    pub fn mtu(&self) -> u32 {
        self.mtu
    }

    pub fn speed_mbps(&self) -> u32 {
        self.speed_mbps
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Port-channel member names.
    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Event category. Meaningful only inside a handler callback;
    /// [`Event::NoEvent`] everywhere else.
    pub fn event(&self) -> Event {
        self.event
    }
}

/// Application callbacks for interface events. Every method defaults to a
/// no-op returning `true`, so implementors override only the categories
/// they care about. Returns are advisory and only logged.
pub trait IntfHandler: Send {
    fn post_intf_add_del_cb(&mut self, _intf: &Intf) -> bool {
        true
    }

    fn post_intf_ipv4_addr_cb(&mut self, _intf: &Intf) -> bool {
        true
    }

    fn post_intf_ipv6_addr_cb(&mut self, _intf: &Intf) -> bool {
        true
    }

    fn post_intf_state_cb(&mut self, _intf: &Intf) -> bool {
        true
    }

    fn post_intf_layer_cb(&mut self, _intf: &Intf) -> bool {
        true
    }

    fn post_intf_port_member_cb(&mut self, _intf: &Intf) -> bool {
        true
    }

    fn post_intf_vrf_cb(&mut self, _intf: &Intf) -> bool {
        true
    }

    fn post_intf_vlan_cb(&mut self, _intf: &Intf) -> bool {
        true
    }
}

/// Manager for switch interfaces.
pub struct IntfMgr {
    backend: Arc<SwitchState>,
    epoch: AtomicU64,
    watch_all: AtomicBool,
    watched: DashSet<String>,
    handler: Mutex<Option<Box<dyn IntfHandler>>>,
    /// Bulk-open buffer filled by `get_intf_all`, drained by
    /// `iterate_intf`, released by `close_intf_all`.
    open_buffer: Mutex<VecDeque<Intf>>,
}

impl IntfMgr {
    pub(crate) fn new(backend: Arc<SwitchState>) -> Arc<IntfMgr> {
        Arc::new(IntfMgr {
            epoch: AtomicU64::new(backend.current_epoch()),
            backend,
            watch_all: AtomicBool::new(false),
            watched: DashSet::new(),
            handler: Mutex::new(None),
            open_buffer: Mutex::new(VecDeque::new()),
        })
    }

    fn check(&self, api: &'static str) -> SdkResult<()> {
        self.backend
            .check_session(self.epoch.load(Ordering::SeqCst), MODULE, api)
    }

    /// Returns a caller-owned snapshot of one interface.
    pub fn get_intf(&self, name: &str) -> SdkResult<Option<Intf>> {
        self.check("get_intf")?;
        if name.is_empty() {
            return Err(self.backend.raise(
                ErrorKind::InvalidArg,
                MODULE,
                "get_intf",
                "interface name cannot be empty",
            ));
        }
        Ok(self.backend.intfs.read().unwrap().get(name).cloned())
    }

    /// Loads every interface into the bulk-open buffer. Returns `false`
    /// when the switch has no interfaces at all.
    pub fn get_intf_all(&self) -> SdkResult<bool> {
        self.check("get_intf_all")?;
        let all: VecDeque<Intf> = self
            .backend
            .intfs
            .read()
            .unwrap()
            .values()
            .cloned()
            .collect();
        let any = !all.is_empty();
        *self.open_buffer.lock().unwrap() = all;
        Ok(any)
    }

    /// Pops the next interface from the bulk-open buffer.
    pub fn iterate_intf(&self) -> Option<Intf> {
        self.open_buffer.lock().unwrap().pop_front()
    }

    /// Releases every snapshot still held in the bulk-open buffer.
    pub fn close_intf_all(&self) -> bool {
        let mut buf = self.open_buffer.lock().unwrap();
        let had_any = !buf.is_empty();
        buf.clear();
        had_any
    }

    /// Creates a logical interface (SVI, loopback, port-channel or
    /// subinterface). Physical ports cannot be created by applications.
    pub fn add_intf(&self, name: &str) -> SdkResult<Intf> {
        self.check("add_intf")?;
        match IntfType::from_name(name) {
            IntfType::Svi | IntfType::Loopback | IntfType::PortChannel | IntfType::SubIntf => {}
            other => {
                return Err(self.backend.raise(
                    ErrorKind::InvalidArg,
                    MODULE,
                    "add_intf",
                    format!("cannot create interface of type {other:?}"),
                ));
            }
        }
        if self.backend.intfs.read().unwrap().contains_key(name) {
            return Err(self.backend.raise(
                ErrorKind::Exists,
                MODULE,
                "add_intf",
                format!("{name} already exists"),
            ));
        }
        let intf = Intf::new(name);
        self.backend
            .intfs
            .write()
            .unwrap()
            .insert(name.to_string(), intf.clone());
        info!(intf = name, "created logical interface");
        self.backend.emit_intf(IntfCategory::AddDel, &intf, Event::Add);
        Ok(intf)
    }

    /// Removes a logical interface created through [`IntfMgr::add_intf`].
    pub fn remove_intf(&self, name: &str) -> SdkResult<bool> {
        self.check("remove_intf")?;
        let removed = self.backend.intfs.write().unwrap().remove(name);
        match removed {
            Some(intf) => {
                info!(intf = name, "removed interface");
                self.backend
                    .emit_intf(IntfCategory::AddDel, &intf, Event::Delete);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Subscribes to change events for one interface, or `"all"`.
    /// Forward references are allowed: the name does not have to exist
    /// yet, and its creation event will satisfy the watch.
    pub fn watch_intf(&self, name: &str) -> SdkResult<bool> {
        self.check("watch_intf")?;
        if name.is_empty() {
            return Ok(false);
        }
        if name == "all" {
            self.watch_all.store(true, Ordering::SeqCst);
        } else {
            self.watched.insert(name.to_string());
        }
        Ok(true)
    }

    /// Drops the watch for one interface, or every watch for `"all"`.
    /// The handler registration is left intact.
    pub fn unwatch_intf(&self, name: &str) -> SdkResult<bool> {
        self.check("unwatch_intf")?;
        if name.is_empty() {
            return Ok(false);
        }
        if name == "all" {
            self.watch_all.store(false, Ordering::SeqCst);
            self.watched.clear();
        } else {
            self.watched.remove(name);
        }
        Ok(true)
    }

    /// Registers the handler, replacing any previous one.
    pub fn set_intf_handler(&self, handler: Box<dyn IntfHandler>) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    /// Clears the handler registration.
    pub fn unset_intf_handler(&self) {
        *self.handler.lock().unwrap() = None;
    }

    pub fn has_intf_handler(&self) -> bool {
        self.handler.lock().unwrap().is_some()
    }

    // Write-through configuration. Setters mutate the emulated switch
    // table and, where a callback category exists for the field,
    // announce the change through the event channel.

    pub fn set_layer(&self, name: &str, layer: IntfLayer) -> SdkResult<bool> {
        self.check("set_layer")?;
        self.mutate(name, IntfCategory::Layer, |i| i.layer = layer)
    }

    pub fn set_vrf(&self, name: &str, vrf: &str) -> SdkResult<bool> {
        self.check("set_vrf")?;
        let vrf = vrf.to_string();
        self.mutate(name, IntfCategory::Vrf, move |i| i.vrf = vrf)
    }

    pub fn set_vlan(&self, name: &str, vlan_id: u32) -> SdkResult<bool> {
        self.check("set_vlan")?;
        if !(1..=4094).contains(&vlan_id) {
            return Err(self.backend.raise(
                ErrorKind::InvalidArg,
                MODULE,
                "set_vlan",
                format!("VLAN {vlan_id} out of range"),
            ));
        }
        self.mutate(name, IntfCategory::Vlan, move |i| i.vlan = Some(vlan_id))
    }

    pub fn set_description(&self, name: &str, desc: &str) -> SdkResult<bool> {
        self.check("set_description")?;
        let desc = desc.to_string();
        // No callback category covers description changes; the write is
        // visible on the next get_intf.
        self.mutate_quiet(name, move |i| i.description = desc)
    }

    /// Sets the primary (or a secondary) L3 address for the prefix's
    /// address family.
    pub fn set_l3_address(&self, name: &str, prefix: IpPrefix, secondary: bool) -> SdkResult<bool> {
        self.check("set_l3_address")?;
        let category = match prefix.af() {
            Af::Ipv4 => IntfCategory::Ipv4Addr,
            Af::Ipv6 => IntfCategory::Ipv6Addr,
        };
        self.mutate(name, category, move |i| match (prefix.af(), secondary) {
            (Af::Ipv4, false) => i.v4_primary = Some(prefix),
            (Af::Ipv4, true) => i.v4_secondary.push(prefix),
            (Af::Ipv6, false) => i.v6_primary = Some(prefix),
            (Af::Ipv6, true) => i.v6_secondary.push(prefix),
        })
    }

    pub fn set_l2_address(&self, name: &str, mac: MacAddress) -> SdkResult<bool> {
        self.check("set_l2_address")?;
        self.mutate_quiet(name, move |i| i.l2_address = Some(mac))
    }

    /// Changes admin state; oper state follows admin in the emulation.
    pub fn set_admin_state(&self, name: &str, state: LinkState) -> SdkResult<bool> {
        self.check("set_admin_state")?;
        self.mutate(name, IntfCategory::State, move |i| {
            i.admin_state = state;
            i.oper_state = state;
        })
    }

    pub fn set_mtu(&self, name: &str, mtu: u32) -> SdkResult<bool> {
        self.check("set_mtu")?;
        if !(576..=9216).contains(&mtu) {
            return Err(self.backend.raise(
                ErrorKind::InvalidArg,
                MODULE,
                "set_mtu",
                format!("MTU {mtu} out of range"),
            ));
        }
        self.mutate_quiet(name, move |i| i.mtu = mtu)
    }

    pub fn set_speed(&self, name: &str, speed_mbps: u32) -> SdkResult<bool> {
        self.check("set_speed")?;
        self.mutate_quiet(name, move |i| i.speed_mbps = speed_mbps)
    }

    /// Adds a member port to a port-channel.
    pub fn add_member(&self, name: &str, member: &str) -> SdkResult<bool> {
        self.check("add_member")?;
        let member = member.to_string();
        self.mutate(name, IntfCategory::PortMember, move |i| {
            if !i.members.contains(&member) {
                i.members.push(member);
            }
        })
    }

    /// Removes a member port from a port-channel.
    pub fn del_member(&self, name: &str, member: &str) -> SdkResult<bool> {
        self.check("del_member")?;
        let member = member.to_string();
        self.mutate(name, IntfCategory::PortMember, move |i| {
            i.members.retain(|m| m != &member)
        })
    }

    fn mutate(
        &self,
        name: &str,
        category: IntfCategory,
        f: impl FnOnce(&mut Intf),
    ) -> SdkResult<bool> {
        let mut intfs = self.backend.intfs.write().unwrap();
        let Some(intf) = intfs.get_mut(name) else {
            return Ok(false);
        };
        f(intf);
        intf.last_modified = Utc::now();
        let snapshot = intf.clone();
        drop(intfs);
        self.backend.emit_intf(category, &snapshot, Event::Update);
        Ok(true)
    }

    /// Table write with no event. Used by setters whose field has no
    /// callback category of its own.
    fn mutate_quiet(&self, name: &str, f: impl FnOnce(&mut Intf)) -> SdkResult<bool> {
        let mut intfs = self.backend.intfs.write().unwrap();
        let Some(intf) = intfs.get_mut(name) else {
            return Ok(false);
        };
        f(intf);
        intf.last_modified = Utc::now();
        Ok(true)
    }

    /// Delivers one interface event to the registered handler if the
    /// interface is watched. Called from the dispatch loop only.
    pub(crate) fn deliver(&self, category: IntfCategory, snapshot: &Intf) {
        if !self.watch_all.load(Ordering::SeqCst) && !self.watched.contains(snapshot.name()) {
            return;
        }
        let mut slot = self.handler.lock().unwrap();
        let Some(handler) = slot.as_mut() else {
            return;
        };
        match category {
            IntfCategory::AddDel => {
                invoke_advisory("post_intf_add_del_cb", || {
                    handler.post_intf_add_del_cb(snapshot)
                });
            }
            IntfCategory::Ipv4Addr => {
                invoke_advisory("post_intf_ipv4_addr_cb", || {
                    handler.post_intf_ipv4_addr_cb(snapshot)
                });
            }
            IntfCategory::Ipv6Addr => {
                invoke_advisory("post_intf_ipv6_addr_cb", || {
                    handler.post_intf_ipv6_addr_cb(snapshot)
                });
            }
            IntfCategory::State => {
                invoke_advisory("post_intf_state_cb", || handler.post_intf_state_cb(snapshot));
            }
            IntfCategory::Layer => {
                invoke_advisory("post_intf_layer_cb", || handler.post_intf_layer_cb(snapshot));
            }
            IntfCategory::PortMember => {
                invoke_advisory("post_intf_port_member_cb", || {
                    handler.post_intf_port_member_cb(snapshot)
                });
            }
            IntfCategory::Vrf => {
                invoke_advisory("post_intf_vrf_cb", || handler.post_intf_vrf_cb(snapshot));
            }
            IntfCategory::Vlan => {
                invoke_advisory("post_intf_vlan_cb", || handler.post_intf_vlan_cb(snapshot));
            }
        }
    }

    pub(crate) fn purge(&self) {
        self.epoch
            .store(self.backend.current_epoch(), Ordering::SeqCst);
        self.watch_all.store(false, Ordering::SeqCst);
        self.watched.clear();
        self.open_buffer.lock().unwrap().clear();
    }
}
