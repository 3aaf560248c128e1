//! Application SDK for a network switch OS, with an in-process emulation
//! of the switch side.
//!
//! Third-party applications use this crate to plug into switch
//! infrastructure: custom CLI commands, syslog/event tracing, and manager
//! objects for interfaces, the MAC table, adjacency (ARP/ND), the RIB and
//! the DN-addressed config object store. The switch side itself is
//! emulated by [`backend::SwitchState`], so every documented contract is
//! executable and testable without switch hardware.
//!
//! # Architecture
//!
//! All managers follow the same watch/handler/download protocol:
//!
//! 1. Build a [`SdkContext`] from a [`SdkConfig`] (one context per
//!    endpoint; there is no process-global instance).
//! 2. Obtain managers from the context (`intf_mgr()`, `rib_mgr()`, ...).
//! 3. Register a handler (`set_*_handler`) and subscribe with `watch_*`
//!    calls. Watching with `download = true` replays pre-existing state
//!    through the normal callback, closed by a download-done callback.
//! 4. Call [`SdkContext::start_event_loop`], which blocks the calling
//!    thread and dispatches callbacks until another thread calls
//!    [`SdkContext::stop_event_loop`].
//!
//! Query and mutation APIs are safe to call from other threads while the
//! loop runs; all shared state lives behind the context.
//!
//! # Object ownership
//!
//! Entity snapshots delivered *into* callbacks are borrowed views, valid
//! for the callback's duration, with `event()` reporting the dispatching
//! category. Snapshots returned by `get_*` calls are caller-owned and
//! always report [`types::Event::NoEvent`]. Some `get_*` calls are
//! tracked against a per-scope buffer bound; see [`rib::RibMgr`].

pub mod adj;
pub mod backend;
pub mod cli;
pub mod context;
pub mod dme;
pub mod intf;
pub mod mac;
pub mod rib;
pub mod trace;

mod dispatch;

pub use switchlink_types as types;

pub use adj::{AdjHandler, AdjMgr, Adjacency};
pub use cli::{CliCmd, CliInvocation, CliParser, CmdHandler, CmdType, ParamType, ParamValue};
pub use context::{ConnState, SdkConfig, SdkContext, SdkHandler};
pub use dme::{DmeHandler, DmeMgr, DmeObject};
pub use intf::{Intf, IntfHandler, IntfLayer, IntfMgr};
pub use mac::{MacEntry, MacHandle, MacHandler, MacMgr};
pub use rib::{L3NextHop, L3Route, NextHopKind, RibHandler, RibMgr, RouteHandle, StagedRoute, Vrf};
pub use trace::{TraceRecord, Tracer};

/// Maximum number of uncollected `get_*` objects per tracking scope
/// before the SDK refuses further allocations.
pub(crate) const OBJ_BUFFER_MAX: usize = 10;

/// Maximum length of a VRF name accepted by any API.
pub(crate) const VRF_NAME_MAX: usize = 32;
