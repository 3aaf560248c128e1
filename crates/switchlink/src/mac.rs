//! MAC table manager: static entry programming and learn/age/move
//! notifications with download replay.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashSet;
use tracing::info;

use switchlink_types::{ErrorKind, Event, MacAddress, MacEntryType, SdkResult};

use crate::backend::SwitchState;
use crate::dispatch::{invoke, invoke_advisory, SwitchEvent};
use crate::OBJ_BUFFER_MAX;

const MODULE: &str = "mac";

/// One MAC table entry, as a point-in-time snapshot.
#[derive(Debug, Clone)]
pub struct MacEntry {
    pub(crate) mac: MacAddress,
    pub(crate) vlan: u32,
    pub(crate) intf_name: String,
    pub(crate) entry_type: MacEntryType,
    pub(crate) event: Event,
}

impl MacEntry {
    pub fn mac_address(&self) -> MacAddress {
        self.mac
    }

    pub fn vlan(&self) -> u32 {
        self.vlan
    }

    pub fn intf_name(&self) -> &str {
        &self.intf_name
    }

    pub fn entry_type(&self) -> MacEntryType {
        self.entry_type
    }

    /// Event category. Meaningful only inside a handler callback.
    pub fn event(&self) -> Event {
        self.event
    }
}

/// Application callbacks for MAC table events.
pub trait MacHandler: Send {
    /// Fires for every watched MAC table change, and for each replayed
    /// entry during a download.
    fn post_mac_cb(&mut self, _entry: &MacEntry) -> bool {
        true
    }

    /// Closes a download replay. `id` matches the value returned by the
    /// originating watch call; `mac` is `None` for VLAN-wide watches.
    fn post_mac_download_done_cb(&mut self, _id: u64, _vlan: u32, _mac: Option<MacAddress>) {}
}

/// Watch filter on the MAC table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MacFilter {
    vlan: u32,
    mac: Option<MacAddress>,
}

/// Manager for the switch MAC table.
pub struct MacMgr {
    backend: Arc<SwitchState>,
    epoch: AtomicU64,
    watch_all: AtomicBool,
    filters: DashSet<MacFilter>,
    next_download_id: AtomicU64,
    handler: Mutex<Option<Box<dyn MacHandler>>>,
    /// Count of uncollected `get_mac` snapshots, bounded by
    /// [`OBJ_BUFFER_MAX`].
    uncollected: Arc<AtomicUsize>,
}

/// Caller-owned MAC snapshot counted against the uncollected-object
/// bound. Dropping it releases the slot.
pub struct MacHandle {
    entry: MacEntry,
    slot: Arc<AtomicUsize>,
}

impl std::ops::Deref for MacHandle {
    type Target = MacEntry;

    fn deref(&self) -> &MacEntry {
        &self.entry
    }
}

impl Drop for MacHandle {
    fn drop(&mut self) {
        // Saturating: a clear_buffer call may already have zeroed it.
        let _ = self
            .slot
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1));
    }
}

impl std::fmt::Debug for MacHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.entry.fmt(f)
    }
}

impl MacMgr {
    pub(crate) fn new(backend: Arc<SwitchState>) -> Arc<MacMgr> {
        Arc::new(MacMgr {
            epoch: AtomicU64::new(backend.current_epoch()),
            backend,
            watch_all: AtomicBool::new(false),
            filters: DashSet::new(),
            next_download_id: AtomicU64::new(1),
            handler: Mutex::new(None),
            uncollected: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn check(&self, api: &'static str) -> SdkResult<()> {
        self.backend
            .check_session(self.epoch.load(Ordering::SeqCst), MODULE, api)
    }

    /// Programs a static MAC entry.
    pub fn add_static_mac(&self, mac: MacAddress, vlan: u32, intf_name: &str) -> SdkResult<bool> {
        self.check("add_static_mac")?;
        if mac.is_multicast() || mac.is_zero() {
            return Err(self.backend.raise(
                ErrorKind::InvalidArg,
                MODULE,
                "add_static_mac",
                format!("{mac} is not a programmable unicast address"),
            ));
        }
        let entry = MacEntry {
            mac,
            vlan,
            intf_name: intf_name.to_string(),
            entry_type: MacEntryType::Static,
            event: Event::NoEvent,
        };
        let previous = self
            .backend
            .macs
            .write()
            .unwrap()
            .insert((vlan, mac), entry.clone());
        info!(%mac, vlan, intf = intf_name, "programmed static MAC");
        let event = if previous.is_some() {
            Event::Update
        } else {
            Event::Add
        };
        self.backend.emit_mac(&entry, event);
        Ok(true)
    }

    /// Removes a static MAC entry. Returns `false` if the entry is
    /// absent or dynamic.
    pub fn del_static_mac(&self, mac: MacAddress, vlan: u32) -> SdkResult<bool> {
        self.check("del_static_mac")?;
        let removed = {
            let mut macs = self.backend.macs.write().unwrap();
            match macs.get(&(vlan, mac)) {
                Some(entry) if entry.entry_type == MacEntryType::Static => {
                    macs.remove(&(vlan, mac))
                }
                _ => None,
            }
        };
        match removed {
            Some(entry) => {
                self.backend.emit_mac(&entry, Event::Delete);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Returns a caller-owned snapshot of one MAC entry, counted against
    /// the uncollected-object bound. `clear_buffer` releases every slot
    /// first, for callers that lost track of earlier snapshots.
    pub fn get_mac(
        &self,
        mac: MacAddress,
        vlan: u32,
        clear_buffer: bool,
    ) -> SdkResult<Option<MacHandle>> {
        self.check("get_mac")?;
        if clear_buffer {
            self.uncollected.store(0, Ordering::SeqCst);
        }
        let Some(entry) = self.backend.macs.read().unwrap().get(&(vlan, mac)).cloned() else {
            return Ok(None);
        };
        if self.uncollected.load(Ordering::SeqCst) >= OBJ_BUFFER_MAX {
            return Err(self.backend.raise(
                ErrorKind::MaxLimit,
                MODULE,
                "get_mac",
                format!("more than {OBJ_BUFFER_MAX} uncollected MAC objects"),
            ));
        }
        self.uncollected.fetch_add(1, Ordering::SeqCst);
        Ok(Some(MacHandle {
            entry,
            slot: Arc::clone(&self.uncollected),
        }))
    }

    /// Watches the whole MAC table. With `download`, every existing
    /// entry is replayed through [`MacHandler::post_mac_cb`] before the
    /// download-done callback fires. Returns the download id.
    pub fn watch_all_mac(&self, download: bool) -> SdkResult<u64> {
        self.check("watch_all_mac")?;
        self.watch_all.store(true, Ordering::SeqCst);
        let id = self.next_download_id.fetch_add(1, Ordering::SeqCst);
        if download {
            let entries: Vec<MacEntry> = self.backend.macs.read().unwrap().values().cloned().collect();
            for entry in entries {
                self.backend.emit_mac(&entry, Event::Download);
            }
            self.backend.emit(SwitchEvent::MacDownloadDone {
                id,
                vlan: 0,
                mac: None,
            });
        }
        Ok(id)
    }

    pub fn unwatch_all_mac(&self) -> SdkResult<bool> {
        self.check("unwatch_all_mac")?;
        self.watch_all.store(false, Ordering::SeqCst);
        self.filters.clear();
        Ok(true)
    }

    /// Watches one VLAN, or one (VLAN, MAC) pair. Forward references are
    /// allowed. Returns the download id.
    pub fn watch_mac(&self, vlan: u32, mac: Option<MacAddress>, download: bool) -> SdkResult<u64> {
        self.check("watch_mac")?;
        self.filters.insert(MacFilter { vlan, mac });
        let id = self.next_download_id.fetch_add(1, Ordering::SeqCst);
        if download {
            let entries: Vec<MacEntry> = self
                .backend
                .macs
                .read()
                .unwrap()
                .values()
                .filter(|e| e.vlan == vlan && mac.map_or(true, |m| e.mac == m))
                .cloned()
                .collect();
            for entry in entries {
                self.backend.emit_mac(&entry, Event::Download);
            }
            self.backend.emit(SwitchEvent::MacDownloadDone { id, vlan, mac });
        }
        Ok(id)
    }

    /// Drops one specific filter, leaving other filters and the handler
    /// registration intact.
    pub fn unwatch_mac(&self, vlan: u32, mac: Option<MacAddress>) -> SdkResult<bool> {
        self.check("unwatch_mac")?;
        Ok(self.filters.remove(&MacFilter { vlan, mac }).is_some())
    }

    pub fn set_mac_handler(&self, handler: Box<dyn MacHandler>) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    pub fn unset_mac_handler(&self) {
        *self.handler.lock().unwrap() = None;
    }

    pub fn has_mac_handler(&self) -> bool {
        self.handler.lock().unwrap().is_some()
    }

    fn matches(&self, entry: &MacEntry) -> bool {
        if self.watch_all.load(Ordering::SeqCst) {
            return true;
        }
        self.filters.iter().any(|f| {
            f.vlan == entry.vlan && f.mac.map_or(true, |m| m == entry.mac)
        })
    }

    /// Called from the dispatch loop only.
    pub(crate) fn deliver(&self, entry: &MacEntry) {
        if !self.matches(entry) {
            return;
        }
        let mut slot = self.handler.lock().unwrap();
        if let Some(handler) = slot.as_mut() {
            invoke_advisory("post_mac_cb", || handler.post_mac_cb(entry));
        }
    }

    /// Called from the dispatch loop only.
    pub(crate) fn deliver_download_done(&self, id: u64, vlan: u32, mac: Option<MacAddress>) {
        let mut slot = self.handler.lock().unwrap();
        if let Some(handler) = slot.as_mut() {
            invoke("post_mac_download_done_cb", || {
                handler.post_mac_download_done_cb(id, vlan, mac)
            });
        }
    }

    pub(crate) fn purge(&self) {
        self.epoch
            .store(self.backend.current_epoch(), Ordering::SeqCst);
        self.watch_all.store(false, Ordering::SeqCst);
        self.filters.clear();
        self.uncollected.store(0, Ordering::SeqCst);
    }
}
