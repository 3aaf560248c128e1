//! RIB manager: VRF and route queries, watch filters, and the staged
//! write path for application-owned routes.
//!
//! Route writes are two-phase: [`RibMgr::add_l3_route`] hands back a
//! [`StagedRoute`] whose next-hop mutations accumulate in memory, with no
//! switch-visible effect until [`RibMgr::send_my_routes_to_rib`] flushes
//! them. Completion is signaled asynchronously through
//! [`RibHandler::post_my_l3_route_cb`].

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::{DashMap, DashSet};
use tracing::{debug, info};

use switchlink_types::{Af, EncapType, ErrorKind, Event, IpPrefix, LinkState, SdkError, SdkResult};

use crate::backend::SwitchState;
use crate::dispatch::{invoke, invoke_advisory};
use crate::{OBJ_BUFFER_MAX, VRF_NAME_MAX};

const MODULE: &str = "rib";

/// Watch filters allowed per (VRF, address family) pair.
pub(crate) const ROUTE_FILTER_MAX: usize = 15;

/// One VRF, as a point-in-time snapshot.
#[derive(Debug, Clone)]
pub struct Vrf {
    pub(crate) name: String,
    pub(crate) id: u64,
    pub(crate) table_id_v4: u64,
    pub(crate) table_id_v6: u64,
    pub(crate) state: LinkState,
    pub(crate) event: Event,
}

impl Vrf {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// VRF id; 0 when the VRF is not yet created.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Per-family table id; 0 when the table is not yet created.
    pub fn table_id(&self, af: Af) -> u64 {
        match af {
            Af::Ipv4 => self.table_id_v4,
            Af::Ipv6 => self.table_id_v6,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Event category. Meaningful only inside a handler callback.
    pub fn event(&self) -> Event {
        self.event
    }
}

/// Classification flags a next-hop can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextHopKind {
    Attached,
    Local,
    Direct,
    Recursive,
    Backup,
    Drop,
    Discard,
}

/// One next-hop of an L3 route.
#[derive(Debug, Clone)]
pub struct L3NextHop {
    pub(crate) address: IpAddr,
    pub(crate) out_intf: String,
    pub(crate) vrf: String,
    pub(crate) owner: String,
    pub(crate) preference: u8,
    pub(crate) metric: u32,
    pub(crate) tag: u32,
    pub(crate) segment_id: u32,
    pub(crate) tunnel_id: u32,
    pub(crate) encap: EncapType,
    pub(crate) kinds: Vec<NextHopKind>,
}

impl L3NextHop {
    pub fn address(&self) -> IpAddr {
        self.address
    }

    /// Egress interface; empty for recursive next-hops.
    pub fn out_interface(&self) -> &str {
        &self.out_intf
    }

    pub fn vrf_name(&self) -> &str {
        &self.vrf
    }

    /// Protocol that owns this next-hop.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Preference; lower is more preferred.
    pub fn preference(&self) -> u8 {
        self.preference
    }

    pub fn metric(&self) -> u32 {
        self.metric
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    pub fn segment_id(&self) -> u32 {
        self.segment_id
    }

    pub fn tunnel_id(&self) -> u32 {
        self.tunnel_id
    }

    pub fn encap_type(&self) -> EncapType {
        self.encap
    }

    pub fn check_kind(&self, kind: NextHopKind) -> bool {
        self.kinds.contains(&kind)
    }
}

/// One L3 route, as a point-in-time snapshot.
#[derive(Debug, Clone)]
pub struct L3Route {
    pub(crate) vrf: String,
    pub(crate) prefix: IpPrefix,
    pub(crate) nexthops: Vec<L3NextHop>,
    pub(crate) event: Event,
}

impl L3Route {
    pub fn vrf_name(&self) -> &str {
        &self.vrf
    }

    pub fn prefix(&self) -> IpPrefix {
        self.prefix
    }

    pub fn address(&self) -> IpAddr {
        self.prefix.addr()
    }

    pub fn mask_len(&self) -> u8 {
        self.prefix.mask_len()
    }

    /// Number of next-hops; 0 on a delete event.
    pub fn nexthop_count(&self) -> usize {
        self.nexthops.len()
    }

    pub fn nexthops(&self) -> &[L3NextHop] {
        &self.nexthops
    }

    /// Looks up one next-hop by address, optionally narrowed by egress
    /// interface.
    pub fn nexthop(&self, address: IpAddr, intf_name: Option<&str>) -> Option<&L3NextHop> {
        self.nexthops
            .iter()
            .find(|nh| nh.address == address && intf_name.map_or(true, |i| nh.out_intf == i))
    }

    /// Event category. Meaningful only inside a handler callback.
    pub fn event(&self) -> Event {
        self.event
    }
}

/// Caller-owned route snapshot counted against the per-VRF
/// uncollected-object bound. Dropping it releases the slot.
pub struct RouteHandle {
    route: L3Route,
    slot: Arc<AtomicUsize>,
}

impl std::ops::Deref for RouteHandle {
    type Target = L3Route;

    fn deref(&self) -> &L3Route {
        &self.route
    }
}

impl Drop for RouteHandle {
    fn drop(&mut self) {
        // Saturating: a clear_buffer call may already have zeroed it.
        let _ = self
            .slot
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1));
    }
}

impl std::fmt::Debug for RouteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.route.fmt(f)
    }
}

/// Staged next-hop specification.
#[derive(Debug, Clone)]
pub(crate) enum PendingNextHop {
    Direct {
        address: IpAddr,
        intf_name: String,
        preference: u8,
    },
    Recursive {
        address: IpAddr,
        preference: u8,
    },
}

#[derive(Debug)]
pub(crate) struct PendingRoute {
    pub(crate) vrf: String,
    pub(crate) prefix: IpPrefix,
    pub(crate) add_nhs: Vec<PendingNextHop>,
    pub(crate) del_nhs: Vec<(IpAddr, Option<String>)>,
    pub(crate) delete_route: bool,
}

/// A route under construction. Mutations accumulate in memory and take
/// effect only when [`RibMgr::send_my_routes_to_rib`] is called for the
/// route's address family.
#[derive(Clone)]
pub struct StagedRoute {
    inner: Arc<Mutex<PendingRoute>>,
}

impl StagedRoute {
    pub fn vrf_name(&self) -> String {
        self.inner.lock().unwrap().vrf.clone()
    }

    pub fn prefix(&self) -> IpPrefix {
        self.inner.lock().unwrap().prefix
    }

    /// Stages a directly connected next-hop. Lower preference wins.
    pub fn add_direct_next_hop(
        &self,
        address: IpAddr,
        intf_name: &str,
        preference: u8,
    ) -> L3NextHop {
        let mut pending = self.inner.lock().unwrap();
        pending.add_nhs.push(PendingNextHop::Direct {
            address,
            intf_name: intf_name.to_string(),
            preference,
        });
        L3NextHop {
            address,
            out_intf: intf_name.to_string(),
            vrf: pending.vrf.clone(),
            owner: String::new(),
            preference,
            metric: 0,
            tag: 0,
            segment_id: 0,
            tunnel_id: 0,
            encap: EncapType::None,
            kinds: vec![NextHopKind::Direct],
        }
    }

    /// Stages a recursive next-hop; resolution is reported through
    /// [`RibHandler::post_l3_recursive_next_hop_cb`] after the flush.
    pub fn add_recursive_next_hop(&self, address: IpAddr, preference: u8) -> L3NextHop {
        let mut pending = self.inner.lock().unwrap();
        pending.add_nhs.push(PendingNextHop::Recursive {
            address,
            preference,
        });
        L3NextHop {
            address,
            out_intf: String::new(),
            vrf: pending.vrf.clone(),
            owner: String::new(),
            preference,
            metric: 0,
            tag: 0,
            segment_id: 0,
            tunnel_id: 0,
            encap: EncapType::None,
            kinds: vec![NextHopKind::Recursive],
        }
    }

    /// Stages removal of one next-hop.
    pub fn del_next_hop(&self, address: IpAddr, intf_name: Option<&str>) -> bool {
        self.inner
            .lock()
            .unwrap()
            .del_nhs
            .push((address, intf_name.map(str::to_string)));
        true
    }
}

/// Application callbacks for RIB events. Every method defaults to a
/// no-op; boolean returns are advisory.
pub trait RibHandler: Send {
    /// Watched route updates, per the registered protocol filters.
    fn post_l3_route_cb(&mut self, _route: &L3Route) -> bool {
        true
    }

    /// Watched VRF updates.
    fn post_vrf_cb(&mut self, _vrf: &Vrf) -> bool {
        true
    }

    /// Completion notice for a route this application staged and
    /// flushed.
    fn post_my_l3_route_cb(&mut self, _route: &L3Route) -> bool {
        true
    }

    /// Resolution notice for a recursive next-hop added by this
    /// application.
    fn post_l3_recursive_next_hop_cb(&mut self, _route: &L3Route, _is_resolved: bool) -> bool {
        true
    }

    /// The switch asks the application to re-add its routes. A zero
    /// address with zero mask length means every route in the VRF.
    fn post_l3_route_repopulate_cb(&mut self, _vrf_name: &str, _route_addr: &str, _mask_len: u8) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RouteFilter {
    protocol: String,
    tag: String,
}

/// Manager for the switch RIB.
pub struct RibMgr {
    backend: Arc<SwitchState>,
    epoch: AtomicU64,
    watch_all_vrf: AtomicBool,
    watched_vrfs: DashSet<String>,
    /// Route watch filters keyed by (vrf-or-"all", af), capped at
    /// [`ROUTE_FILTER_MAX`] per key.
    route_filters: DashMap<(String, Af), Vec<RouteFilter>>,
    /// Uncollected `get_l3_route` snapshots per VRF.
    uncollected: DashMap<String, Arc<AtomicUsize>>,
    staged: Mutex<Vec<Arc<Mutex<PendingRoute>>>>,
    handler: Mutex<Option<Box<dyn RibHandler>>>,
}

impl RibMgr {
    pub(crate) fn new(backend: Arc<SwitchState>) -> Arc<RibMgr> {
        Arc::new(RibMgr {
            epoch: AtomicU64::new(backend.current_epoch()),
            backend,
            watch_all_vrf: AtomicBool::new(false),
            watched_vrfs: DashSet::new(),
            route_filters: DashMap::new(),
            uncollected: DashMap::new(),
            staged: Mutex::new(Vec::new()),
            handler: Mutex::new(None),
        })
    }

    fn check(&self, api: &'static str) -> SdkResult<()> {
        self.backend
            .check_session(self.epoch.load(Ordering::SeqCst), MODULE, api)
    }

    fn check_vrf_name(&self, api: &'static str, vrf_name: &str) -> SdkResult<()> {
        if vrf_name.len() > VRF_NAME_MAX {
            return Err(self.backend.raise(
                ErrorKind::InvalidArg,
                MODULE,
                api,
                format!("VRF name longer than {VRF_NAME_MAX} characters"),
            ));
        }
        Ok(())
    }

    /// Returns one VRF, optionally adding it to the watch set. `"all"`
    /// and the empty string are not valid lookup names.
    pub fn get_vrf(&self, vrf_name: &str, watch: bool) -> SdkResult<Option<Vrf>> {
        self.check("get_vrf")?;
        self.check_vrf_name("get_vrf", vrf_name)?;
        if vrf_name.is_empty() || vrf_name == "all" {
            return Ok(None);
        }
        if watch {
            self.watched_vrfs.insert(vrf_name.to_string());
        }
        Ok(self.backend.vrfs.read().unwrap().get(vrf_name).cloned())
    }

    /// Subscribes to VRF updates; `"all"` watches every VRF. Forward
    /// references are allowed.
    pub fn watch_vrf(&self, vrf_name: &str) -> SdkResult<bool> {
        self.check("watch_vrf")?;
        self.check_vrf_name("watch_vrf", vrf_name)?;
        if vrf_name.is_empty() {
            return Ok(false);
        }
        if vrf_name == "all" {
            self.watch_all_vrf.store(true, Ordering::SeqCst);
        } else {
            self.watched_vrfs.insert(vrf_name.to_string());
        }
        Ok(true)
    }

    /// Drops one VRF watch, or every VRF watch for `"all"`.
    pub fn unwatch_vrf(&self, vrf_name: &str) -> SdkResult<()> {
        self.check("unwatch_vrf")?;
        self.check_vrf_name("unwatch_vrf", vrf_name)?;
        if vrf_name == "all" {
            self.watch_all_vrf.store(false, Ordering::SeqCst);
            self.watched_vrfs.clear();
        } else {
            self.watched_vrfs.remove(vrf_name);
        }
        Ok(())
    }

    /// Returns a caller-owned route snapshot carrying only the best
    /// next-hop. Snapshots count against a bound of [`OBJ_BUFFER_MAX`]
    /// uncollected objects per VRF; `clear_buffer` releases every slot
    /// in the VRF first.
    pub fn get_l3_route(
        &self,
        route_addr: &str,
        mask_len: u8,
        vrf_name: &str,
        clear_buffer: bool,
    ) -> SdkResult<Option<RouteHandle>> {
        self.check("get_l3_route")?;
        self.check_vrf_name("get_l3_route", vrf_name)?;
        if vrf_name.is_empty() || vrf_name == "all" {
            return Ok(None);
        }
        let prefix = self.parse_prefix("get_l3_route", route_addr, mask_len)?;

        let slot = self
            .uncollected
            .entry(vrf_name.to_string())
            .or_insert_with(|| Arc::new(AtomicUsize::new(0)))
            .clone();
        if clear_buffer {
            slot.store(0, Ordering::SeqCst);
        }

        let found = self
            .backend
            .routes
            .read()
            .unwrap()
            .get(&(vrf_name.to_string(), prefix))
            .map(|rec| rec.route.clone());
        let Some(mut route) = found else {
            return Ok(None);
        };

        if slot.load(Ordering::SeqCst) >= OBJ_BUFFER_MAX {
            return Err(self.backend.raise(
                ErrorKind::MaxLimit,
                MODULE,
                "get_l3_route",
                format!("more than {OBJ_BUFFER_MAX} uncollected route objects in VRF {vrf_name}"),
            ));
        }
        slot.fetch_add(1, Ordering::SeqCst);

        // Best next-hop only: lowest preference, then lowest metric.
        route
            .nexthops
            .sort_by_key(|nh| (nh.preference, nh.metric));
        route.nexthops.truncate(1);
        Ok(Some(RouteHandle { route, slot }))
    }

    /// Returns one route with all of its next-hops. Not counted against
    /// the uncollected-object bound.
    pub fn get_l3_route_detail(
        &self,
        route_addr: &str,
        mask_len: u8,
        vrf_name: &str,
    ) -> SdkResult<Option<L3Route>> {
        self.check("get_l3_route_detail")?;
        self.check_vrf_name("get_l3_route_detail", vrf_name)?;
        if vrf_name.is_empty() || vrf_name == "all" {
            return Ok(None);
        }
        let prefix = self.parse_prefix("get_l3_route_detail", route_addr, mask_len)?;
        Ok(self
            .backend
            .routes
            .read()
            .unwrap()
            .get(&(vrf_name.to_string(), prefix))
            .map(|rec| rec.route.clone()))
    }

    /// Subscribes to route updates by protocol owner. `tag` narrows to
    /// one protocol instance; `vrf_name` `"all"` and `af` `None` mean
    /// every VRF / both families. At most [`ROUTE_FILTER_MAX`] filters
    /// are accepted per (VRF, family); exceeding the cap fails loudly.
    pub fn watch_l3_route(
        &self,
        protocol: &str,
        tag: &str,
        vrf_name: &str,
        af: Option<Af>,
    ) -> SdkResult<bool> {
        self.check("watch_l3_route")?;
        self.check_vrf_name("watch_l3_route", vrf_name)?;
        if vrf_name.is_empty() || protocol.is_empty() {
            return Ok(false);
        }
        let families: &[Af] = match af {
            Some(Af::Ipv4) => &[Af::Ipv4],
            Some(Af::Ipv6) => &[Af::Ipv6],
            None => &[Af::Ipv4, Af::Ipv6],
        };
        let filter = RouteFilter {
            protocol: protocol.to_string(),
            tag: tag.to_string(),
        };
        // Validate the cap across every touched key before mutating any.
        for af in families {
            let key = (vrf_name.to_string(), *af);
            if let Some(existing) = self.route_filters.get(&key) {
                if !existing.contains(&filter) && existing.len() >= ROUTE_FILTER_MAX {
                    return Err(self.backend.raise(
                        ErrorKind::MaxLimit,
                        MODULE,
                        "watch_l3_route",
                        format!(
                            "reached maximum of {ROUTE_FILTER_MAX} route filters for {vrf_name}/{af}"
                        ),
                    ));
                }
            }
        }
        for af in families {
            let key = (vrf_name.to_string(), *af);
            let mut entry = self.route_filters.entry(key).or_default();
            if !entry.contains(&filter) {
                entry.push(filter.clone());
            }
        }
        debug!(protocol, tag, vrf = vrf_name, "registered route watch");
        Ok(true)
    }

    /// Drops one route filter, leaving others and the handler intact.
    pub fn unwatch_l3_route(
        &self,
        protocol: &str,
        tag: &str,
        vrf_name: &str,
        af: Option<Af>,
    ) -> SdkResult<()> {
        self.check("unwatch_l3_route")?;
        self.check_vrf_name("unwatch_l3_route", vrf_name)?;
        let families: &[Af] = match af {
            Some(Af::Ipv4) => &[Af::Ipv4],
            Some(Af::Ipv6) => &[Af::Ipv6],
            None => &[Af::Ipv4, Af::Ipv6],
        };
        for af in families {
            if let Some(mut entry) = self
                .route_filters
                .get_mut(&(vrf_name.to_string(), *af))
            {
                entry.retain(|f| !(f.protocol == protocol && f.tag == tag));
            }
        }
        Ok(())
    }

    /// Opens a staged route for this application. No switch-visible
    /// effect until [`RibMgr::send_my_routes_to_rib`].
    pub fn add_l3_route(
        &self,
        route_addr: &str,
        mask_len: u8,
        vrf_name: &str,
    ) -> SdkResult<StagedRoute> {
        self.check("add_l3_route")?;
        self.check_vrf_name("add_l3_route", vrf_name)?;
        if vrf_name.is_empty() || vrf_name == "all" {
            return Err(self.backend.raise(
                ErrorKind::InvalidArg,
                MODULE,
                "add_l3_route",
                "a concrete VRF name is required",
            ));
        }
        let prefix = self.parse_prefix("add_l3_route", route_addr, mask_len)?;
        let inner = Arc::new(Mutex::new(PendingRoute {
            vrf: vrf_name.to_string(),
            prefix,
            add_nhs: Vec::new(),
            del_nhs: Vec::new(),
            delete_route: false,
        }));
        self.staged.lock().unwrap().push(Arc::clone(&inner));
        Ok(StagedRoute { inner })
    }

    /// Stages deletion of a route owned by this application, together
    /// with all of its next-hops.
    pub fn del_l3_route(&self, route_addr: &str, mask_len: u8, vrf_name: &str) -> SdkResult<bool> {
        self.check("del_l3_route")?;
        self.check_vrf_name("del_l3_route", vrf_name)?;
        if vrf_name.is_empty() || vrf_name == "all" {
            return Ok(false);
        }
        let prefix = self.parse_prefix("del_l3_route", route_addr, mask_len)?;
        let owned = self
            .backend
            .routes
            .read()
            .unwrap()
            .get(&(vrf_name.to_string(), prefix))
            .map_or(false, |rec| rec.protocol == self.backend.app_name());
        if !owned {
            return Ok(false);
        }
        let inner = Arc::new(Mutex::new(PendingRoute {
            vrf: vrf_name.to_string(),
            prefix,
            add_nhs: Vec::new(),
            del_nhs: Vec::new(),
            delete_route: true,
        }));
        self.staged.lock().unwrap().push(inner);
        Ok(true)
    }

    /// Flushes every staged operation for one address family into the
    /// RIB. The call itself only hands the batch to the switch side;
    /// per-route completion arrives via
    /// [`RibHandler::post_my_l3_route_cb`].
    pub fn send_my_routes_to_rib(&self, af: Af) -> SdkResult<bool> {
        self.check("send_my_routes_to_rib")?;
        let batch: Vec<Arc<Mutex<PendingRoute>>> = {
            let mut staged = self.staged.lock().unwrap();
            let (flush, keep): (Vec<_>, Vec<_>) = staged
                .drain(..)
                .partition(|p| p.lock().unwrap().prefix.af() == af);
            *staged = keep;
            flush
        };
        if batch.is_empty() {
            return Ok(true);
        }
        info!(af = %af, count = batch.len(), "flushing staged routes to RIB");
        for pending in batch {
            let pending = pending.lock().unwrap();
            self.backend.apply_my_route(&pending);
        }
        Ok(true)
    }

    /// Declares that this application has re-added all of its routes
    /// after a switchover.
    pub fn converged(&self, af: Af, vrf_name: &str) -> SdkResult<bool> {
        self.check("converged")?;
        self.check_vrf_name("converged", vrf_name)?;
        self.backend.mark_converged(af, vrf_name);
        Ok(true)
    }

    pub fn set_rib_handler(&self, handler: Box<dyn RibHandler>) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    pub fn unset_rib_handler(&self) {
        *self.handler.lock().unwrap() = None;
    }

    pub fn has_rib_handler(&self) -> bool {
        self.handler.lock().unwrap().is_some()
    }

    fn parse_prefix(
        &self,
        api: &'static str,
        route_addr: &str,
        mask_len: u8,
    ) -> Result<IpPrefix, SdkError> {
        IpPrefix::parse(route_addr, mask_len).map_err(|e| {
            self.backend
                .raise(ErrorKind::InvalidArg, MODULE, api, e.to_string())
        })
    }

    fn route_filter_matches(&self, vrf: &str, af: Af, protocol: &str, tag: &str) -> bool {
        for key_vrf in [vrf, "all"] {
            if let Some(filters) = self.route_filters.get(&(key_vrf.to_string(), af)) {
                if filters
                    .iter()
                    .any(|f| f.protocol == protocol && (f.tag.is_empty() || f.tag == tag))
                {
                    return true;
                }
            }
        }
        false
    }

    /// Called from the dispatch loop only.
    pub(crate) fn deliver_route(&self, route: &L3Route, protocol: &str, tag: &str) {
        if !self.route_filter_matches(&route.vrf, route.prefix.af(), protocol, tag) {
            return;
        }
        let mut slot = self.handler.lock().unwrap();
        if let Some(handler) = slot.as_mut() {
            invoke_advisory("post_l3_route_cb", || handler.post_l3_route_cb(route));
        }
    }

    /// Called from the dispatch loop only.
    pub(crate) fn deliver_vrf(&self, vrf: &Vrf) {
        if !self.watch_all_vrf.load(Ordering::SeqCst) && !self.watched_vrfs.contains(&vrf.name) {
            return;
        }
        let mut slot = self.handler.lock().unwrap();
        if let Some(handler) = slot.as_mut() {
            invoke_advisory("post_vrf_cb", || handler.post_vrf_cb(vrf));
        }
    }

    /// Called from the dispatch loop only.
    pub(crate) fn deliver_my_route(&self, route: &L3Route) {
        let mut slot = self.handler.lock().unwrap();
        if let Some(handler) = slot.as_mut() {
            invoke_advisory("post_my_l3_route_cb", || handler.post_my_l3_route_cb(route));
        }
    }

    /// Called from the dispatch loop only.
    pub(crate) fn deliver_recursive_next_hop(&self, route: &L3Route, resolved: bool) {
        let mut slot = self.handler.lock().unwrap();
        if let Some(handler) = slot.as_mut() {
            invoke_advisory("post_l3_recursive_next_hop_cb", || {
                handler.post_l3_recursive_next_hop_cb(route, resolved)
            });
        }
    }

    /// Called from the dispatch loop only.
    pub(crate) fn deliver_repopulate(&self, vrf_name: &str, route_addr: &str, mask_len: u8) {
        let mut slot = self.handler.lock().unwrap();
        if let Some(handler) = slot.as_mut() {
            invoke("post_l3_route_repopulate_cb", || {
                handler.post_l3_route_repopulate_cb(vrf_name, route_addr, mask_len)
            });
        }
    }

    pub(crate) fn purge(&self) {
        self.epoch
            .store(self.backend.current_epoch(), Ordering::SeqCst);
        self.watch_all_vrf.store(false, Ordering::SeqCst);
        self.watched_vrfs.clear();
        self.route_filters.clear();
        self.uncollected.clear();
        self.staged.lock().unwrap().clear();
    }
}

/// True when `prefix` covers `addr` (same family, matching leading bits).
pub(crate) fn prefix_contains(prefix: IpPrefix, addr: IpAddr) -> bool {
    fn leading_bits_equal(a: &[u8], b: &[u8], bits: usize) -> bool {
        let full = bits / 8;
        if a[..full] != b[..full] {
            return false;
        }
        let rem = bits % 8;
        if rem == 0 {
            return true;
        }
        let mask = !0u8 << (8 - rem);
        (a[full] & mask) == (b[full] & mask)
    }
    match (prefix.addr(), addr) {
        (IpAddr::V4(p), IpAddr::V4(a)) => {
            leading_bits_equal(&p.octets(), &a.octets(), prefix.mask_len() as usize)
        }
        (IpAddr::V6(p), IpAddr::V6(a)) => {
            leading_bits_equal(&p.octets(), &a.octets(), prefix.mask_len() as usize)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_contains() {
        let p: IpPrefix = "10.1.0.0/16".parse().unwrap();
        assert!(prefix_contains(p, "10.1.200.3".parse().unwrap()));
        assert!(!prefix_contains(p, "10.2.0.1".parse().unwrap()));
        assert!(!prefix_contains(p, "2001:db8::1".parse().unwrap()));

        let odd: IpPrefix = "10.1.128.0/17".parse().unwrap();
        assert!(prefix_contains(odd, "10.1.200.3".parse().unwrap()));
        assert!(!prefix_contains(odd, "10.1.100.3".parse().unwrap()));
    }
}
