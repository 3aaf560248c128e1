//! Typed events flowing from the switch side to the dispatch loop.
//!
//! Every switch-side mutation is announced as one [`SwitchEvent`] pushed
//! onto a single FIFO channel. The dispatch loop pops events and hands
//! them to the owning manager, which consults its watch registry and
//! invokes the registered handler. One channel for everything is what
//! gives per-entity event ordering for free.

use std::net::IpAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, warn};

use switchlink_types::{Af, MacAddress};

use crate::adj::Adjacency;
use crate::dme::DmeObject;
use crate::intf::Intf;
use crate::mac::MacEntry;
use crate::rib::{L3Route, Vrf};

/// Interface event category, selecting which handler callback fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IntfCategory {
    AddDel,
    Ipv4Addr,
    Ipv6Addr,
    State,
    Layer,
    PortMember,
    Vrf,
    Vlan,
}

#[derive(Debug)]
pub(crate) enum SwitchEvent {
    Intf {
        category: IntfCategory,
        snapshot: Intf,
    },
    Mac {
        snapshot: MacEntry,
    },
    MacDownloadDone {
        id: u64,
        vlan: u32,
        mac: Option<MacAddress>,
    },
    Adj {
        snapshot: Adjacency,
    },
    AdjDownloadDone {
        af: Af,
        intf_name: String,
        ip: Option<IpAddr>,
    },
    Vrf {
        snapshot: Vrf,
    },
    Route {
        snapshot: L3Route,
        protocol: String,
        tag: String,
    },
    /// Completion notice for a route staged and flushed by this app.
    MyRoute {
        snapshot: L3Route,
    },
    RecursiveNextHop {
        snapshot: L3Route,
        resolved: bool,
    },
    RouteRepopulate {
        vrf_name: String,
        route_addr: String,
        mask_len: u8,
    },
    Dme {
        snapshot: DmeObject,
    },
    DmeDownloadDone {
        dn: String,
    },
    RemoteConn {
        up: bool,
    },
    /// Sentinel injected by `stop_event_loop`.
    Stop,
}

/// Runs one handler callback, containing panics so application bugs can
/// never take down the shared dispatch loop. The advisory `bool` return
/// is logged and otherwise ignored.
pub(crate) fn invoke_advisory(what: &str, f: impl FnOnce() -> bool) {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(true) => {}
        Ok(false) => debug!(callback = what, "handler reported failure (advisory)"),
        Err(_) => warn!(callback = what, "handler panicked; panic contained"),
    }
}

/// Same containment for callbacks without a return value.
pub(crate) fn invoke(what: &str, f: impl FnOnce()) {
    invoke_advisory(what, || {
        f();
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoke_contains_panics() {
        // Must not unwind into the caller.
        invoke("test", || panic!("application bug"));
        invoke_advisory("test", || panic!("application bug"));
    }

    #[test]
    fn test_invoke_runs_closure() {
        let mut hit = false;
        invoke("test", || hit = true);
        assert!(hit);
    }
}
