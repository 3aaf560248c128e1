//! DME manager: the DN-addressed configuration object store.
//!
//! Every piece of switch configuration is a managed object addressed by a
//! distinguished name (DN) such as `sys/intf/phys-[eth1/1]`. Objects carry
//! a flat property bag rendered as JSON. Watches are subtree watches: a
//! filter DN matches itself and every DN beneath it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashSet;
use serde_json::{Map, Value};
use tracing::{debug, info};

use switchlink_types::{ErrorKind, Event, SdkResult};

use crate::backend::SwitchState;
use crate::dispatch::{invoke, invoke_advisory, SwitchEvent};

const MODULE: &str = "dme";

/// One managed object, as a point-in-time snapshot.
///
/// Property writes through [`DmeObject::set_property`] stage locally and
/// have no switch-visible effect until the object is handed back to
/// [`DmeMgr::commit`].
#[derive(Debug, Clone)]
pub struct DmeObject {
    pub(crate) dn: String,
    pub(crate) props: Map<String, Value>,
    pub(crate) pending: Vec<(String, Value)>,
    /// Property names touched by the change that produced this snapshot.
    pub(crate) updated: Vec<String>,
    pub(crate) event: Event,
}

impl DmeObject {
    pub(crate) fn from_parts(dn: &str, properties: Value) -> DmeObject {
        let props = match properties {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                // Non-object payloads are wrapped rather than rejected.
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        DmeObject {
            dn: dn.to_string(),
            updated: props.keys().cloned().collect(),
            props,
            pending: Vec::new(),
            event: Event::NoEvent,
        }
    }

    /// Distinguished name of the object.
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// One committed property value.
    pub fn get_property(&self, name: &str) -> Option<&Value> {
        self.props.get(name)
    }

    /// The committed property bag rendered as a JSON document.
    pub fn data_json(&self) -> String {
        Value::Object(self.props.clone()).to_string()
    }

    /// Stages one property write. Staged writes shadow committed values
    /// only after [`DmeMgr::commit`].
    pub fn set_property(&mut self, name: &str, value: Value) {
        self.pending.push((name.to_string(), value));
    }

    /// Number of staged, uncommitted writes.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Names of the properties the dispatching event touched. Meaningful
    /// only inside a handler callback.
    pub fn iter_updated_properties(&self) -> impl Iterator<Item = &str> {
        self.updated.iter().map(String::as_str)
    }

    /// Event category. Meaningful only inside a handler callback.
    pub fn event(&self) -> Event {
        self.event
    }
}

/// Application callbacks for managed-object events.
pub trait DmeHandler: Send {
    /// Fires for every watched object change, and for each replayed
    /// object during a download.
    fn post_dme_cb(&mut self, _obj: &DmeObject) -> bool {
        true
    }

    /// Closes a download replay with the originating filter DN.
    fn post_dme_download_done_cb(&mut self, _dn: &str) {}
}

/// Manager for the managed-object store.
pub struct DmeMgr {
    backend: Arc<SwitchState>,
    epoch: AtomicU64,
    /// Subtree watch filters, by DN.
    filters: DashSet<String>,
    handler: Mutex<Option<Box<dyn DmeHandler>>>,
}

impl DmeMgr {
    pub(crate) fn new(backend: Arc<SwitchState>) -> Arc<DmeMgr> {
        Arc::new(DmeMgr {
            epoch: AtomicU64::new(backend.current_epoch()),
            backend,
            filters: DashSet::new(),
            handler: Mutex::new(None),
        })
    }

    fn check(&self, api: &'static str) -> SdkResult<()> {
        self.backend
            .check_session(self.epoch.load(Ordering::SeqCst), MODULE, api)
    }

    fn check_dn(&self, api: &'static str, dn: &str) -> SdkResult<()> {
        if dn.is_empty() {
            return Err(self
                .backend
                .raise(ErrorKind::InvalidArg, MODULE, api, "DN cannot be empty"));
        }
        Ok(())
    }

    /// Returns a caller-owned snapshot of one object.
    pub fn get_dme_obj(&self, dn: &str) -> SdkResult<Option<DmeObject>> {
        self.check("get_dme_obj")?;
        self.check_dn("get_dme_obj", dn)?;
        Ok(self.backend.dme_objs.read().unwrap().get(dn).cloned())
    }

    /// Opens a new object at a DN that does not exist yet. Property
    /// writes stage on the returned object until committed.
    pub fn add_dme_obj(&self, dn: &str) -> SdkResult<DmeObject> {
        self.check("add_dme_obj")?;
        self.check_dn("add_dme_obj", dn)?;
        if self.backend.dme_objs.read().unwrap().contains_key(dn) {
            return Err(self.backend.raise(
                ErrorKind::Exists,
                MODULE,
                "add_dme_obj",
                format!("{dn} already exists"),
            ));
        }
        Ok(DmeObject::from_parts(dn, Value::Null))
    }

    /// True when an object exists at the DN.
    pub fn exists_dme_obj(&self, dn: &str) -> SdkResult<bool> {
        self.check("exists_dme_obj")?;
        self.check_dn("exists_dme_obj", dn)?;
        Ok(self.backend.dme_objs.read().unwrap().contains_key(dn))
    }

    /// JSON rendering of one object's committed properties.
    pub fn get_mo_json(&self, dn: &str) -> SdkResult<Option<String>> {
        self.check("get_mo_json")?;
        self.check_dn("get_mo_json", dn)?;
        Ok(self
            .backend
            .dme_objs
            .read()
            .unwrap()
            .get(dn)
            .map(DmeObject::data_json))
    }

    /// JSON document mapping each child DN under `dn` to its committed
    /// properties. An empty object when there are no children.
    pub fn get_children_mo_json(&self, dn: &str) -> SdkResult<String> {
        self.check("get_children_mo_json")?;
        self.check_dn("get_children_mo_json", dn)?;
        let mut children = Map::new();
        for (child_dn, obj) in self.backend.dme_objs.read().unwrap().iter() {
            if child_dn != dn && dn_covers(dn, child_dn) {
                children.insert(child_dn.clone(), Value::Object(obj.props.clone()));
            }
        }
        Ok(Value::Object(children).to_string())
    }

    /// Applies an object's staged writes to the store and announces the
    /// change. The object's committed view is refreshed and its staging
    /// buffer cleared.
    pub fn commit(&self, obj: &mut DmeObject) -> SdkResult<bool> {
        self.check("commit")?;
        if obj.pending.is_empty() {
            return Ok(false);
        }
        let committed = {
            let mut store = self.backend.dme_objs.write().unwrap();
            let existed = store.contains_key(&obj.dn);
            let stored = store
                .entry(obj.dn.clone())
                .or_insert_with(|| DmeObject::from_parts(&obj.dn, Value::Null));
            stored.updated.clear();
            for (name, value) in obj.pending.drain(..) {
                stored.updated.push(name.clone());
                stored.props.insert(name, value);
            }
            (stored.clone(), existed)
        };
        let (stored, existed) = committed;
        obj.props = stored.props.clone();
        info!(dn = %obj.dn, "committed managed object");
        self.backend.emit_dme(
            &stored,
            if existed { Event::Update } else { Event::Add },
        );
        Ok(true)
    }

    /// Deletes one object. Returns `false` if the DN is absent.
    pub fn del_dme_obj(&self, dn: &str) -> SdkResult<bool> {
        self.check("del_dme_obj")?;
        self.check_dn("del_dme_obj", dn)?;
        let removed = self.backend.dme_objs.write().unwrap().remove(dn);
        match removed {
            Some(obj) => {
                self.backend.emit_dme(&obj, Event::Delete);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Subscribes to a DN subtree. With `download`, existing objects in
    /// the subtree are replayed before the download-done callback fires
    /// with the filter DN. Forward references are allowed.
    pub fn watch_dme(&self, dn: &str, download: bool) -> SdkResult<bool> {
        self.check("watch_dme")?;
        self.check_dn("watch_dme", dn)?;
        self.filters.insert(dn.to_string());
        debug!(dn, "registered DN subtree watch");
        if download {
            let matching: Vec<DmeObject> = self
                .backend
                .dme_objs
                .read()
                .unwrap()
                .values()
                .filter(|o| dn_covers(dn, &o.dn))
                .cloned()
                .collect();
            for obj in matching {
                self.backend.emit_dme(&obj, Event::Download);
            }
            self.backend
                .emit(SwitchEvent::DmeDownloadDone { dn: dn.to_string() });
        }
        Ok(true)
    }

    /// Drops one subtree filter, or every filter when `dn` is empty.
    /// The handler registration stays intact either way.
    pub fn unwatch_dme(&self, dn: &str) -> SdkResult<bool> {
        self.check("unwatch_dme")?;
        if dn.is_empty() {
            self.filters.clear();
            return Ok(true);
        }
        Ok(self.filters.remove(dn).is_some())
    }

    pub fn set_dme_handler(&self, handler: Box<dyn DmeHandler>) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    pub fn unset_dme_handler(&self) {
        *self.handler.lock().unwrap() = None;
    }

    pub fn has_dme_handler(&self) -> bool {
        self.handler.lock().unwrap().is_some()
    }

    fn matches(&self, dn: &str) -> bool {
        self.filters.iter().any(|f| dn_covers(&f, dn))
    }

    /// Called from the dispatch loop only.
    pub(crate) fn deliver(&self, obj: &DmeObject) {
        if !self.matches(&obj.dn) {
            return;
        }
        let mut slot = self.handler.lock().unwrap();
        if let Some(handler) = slot.as_mut() {
            invoke_advisory("post_dme_cb", || handler.post_dme_cb(obj));
        }
    }

    /// Called from the dispatch loop only.
    pub(crate) fn deliver_download_done(&self, dn: &str) {
        let mut slot = self.handler.lock().unwrap();
        if let Some(handler) = slot.as_mut() {
            invoke("post_dme_download_done_cb", || {
                handler.post_dme_download_done_cb(dn)
            });
        }
    }

    pub(crate) fn purge(&self) {
        self.epoch
            .store(self.backend.current_epoch(), Ordering::SeqCst);
        self.filters.clear();
    }
}

/// True when `filter` names `dn` itself or an ancestor of it.
fn dn_covers(filter: &str, dn: &str) -> bool {
    dn == filter || dn.strip_prefix(filter).is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dn_subtree_matching() {
        assert!(dn_covers("sys/intf", "sys/intf"));
        assert!(dn_covers("sys/intf", "sys/intf/phys-[eth1/1]"));
        assert!(!dn_covers("sys/intf", "sys/intfother"));
        assert!(!dn_covers("sys/intf/phys-[eth1/1]", "sys/intf"));
    }

    #[test]
    fn test_staged_writes_do_not_touch_committed_view() {
        let mut obj = DmeObject::from_parts("sys/foo", serde_json::json!({"a": 1}));
        obj.set_property("b", serde_json::json!(2));
        assert_eq!(obj.pending_count(), 1);
        assert!(obj.get_property("b").is_none());
        assert_eq!(obj.get_property("a"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn test_non_object_payload_is_wrapped() {
        let obj = DmeObject::from_parts("sys/foo", serde_json::json!(42));
        assert_eq!(obj.get_property("value"), Some(&serde_json::json!(42)));
    }
}
