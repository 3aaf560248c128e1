//! SDK context: bootstrap configuration, manager access, and the event
//! loop.
//!
//! One [`SdkContext`] per endpoint, built from a [`SdkConfig`]. There is
//! no process-global instance; applications that talk to two switches
//! build two contexts. The context is cheaply cloneable, so one thread
//! can block in [`SdkContext::start_event_loop`] while others issue
//! query and mutation calls.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing::{debug, info};

use switchlink_types::{AppPriority, ErrorKind, ErrorStyle, RunningEnv, SdkResult};

use crate::adj::AdjMgr;
use crate::backend::SwitchState;
use crate::cli::CliParser;
use crate::dispatch::{invoke, SwitchEvent};
use crate::dme::DmeMgr;
use crate::intf::IntfMgr;
use crate::mac::MacMgr;
use crate::rib::RibMgr;
use crate::trace::Tracer;

const MODULE: &str = "context";

/// Fallback certificate file name for remote sessions.
const DEFAULT_CERT: &str = "nxsdkTmpCert.pem";

/// SDK bootstrap options, parsed from the application's command line.
#[derive(Debug, Clone, Parser)]
#[command(about = "switch SDK application options")]
pub struct SdkConfig {
    /// Application name used for namespacing CLI commands, route
    /// ownership and syslog attribution.
    #[arg(long, short = 'n')]
    pub name: String,

    /// One-line application description.
    #[arg(long, default_value = "")]
    pub description: String,

    /// Report structured errors (kind, module, API, severity) instead of
    /// message-only errors.
    #[arg(long)]
    pub advanced_errors: bool,

    /// Switch address for an off-switch (remote) session. Absent means
    /// the application runs on the switch itself.
    #[arg(long)]
    pub remote_ip: Option<String>,

    /// Remote session port.
    #[arg(long, default_value_t = 50002)]
    pub remote_port: u16,

    /// TLS certificate for the remote session. When absent the
    /// environment and then the working directory are consulted.
    #[arg(long)]
    pub cert: Option<PathBuf>,
}

impl SdkConfig {
    /// Builds a minimal local-mode config for the given app name.
    pub fn local(name: &str) -> SdkConfig {
        SdkConfig {
            name: name.to_string(),
            description: String::new(),
            advanced_errors: false,
            remote_ip: None,
            remote_port: 50002,
            cert: None,
        }
    }

    pub fn error_style(&self) -> ErrorStyle {
        if self.advanced_errors {
            ErrorStyle::Advanced
        } else {
            ErrorStyle::Simple
        }
    }

    pub fn running_env(&self) -> RunningEnv {
        if self.remote_ip.is_some() {
            RunningEnv::Remote
        } else if std::env::var_os("VSH_SESSION").is_some() {
            RunningEnv::Vsh
        } else {
            RunningEnv::Bash
        }
    }

    /// Resolves the remote-session certificate path. Precedence: the
    /// explicit option, then `NXSDK_SERVER_CERT_<ip>`, then
    /// `NXSDK_SERVER_CERT`, then `nxsdkTmpCert.pem` in the working
    /// directory. Local mode needs no certificate.
    pub fn resolve_cert(&self) -> Option<PathBuf> {
        let ip = self.remote_ip.as_deref()?;
        if let Some(cert) = &self.cert {
            return Some(cert.clone());
        }
        let per_switch = format!("NXSDK_SERVER_CERT_{}", ip.replace(['.', ':'], "_"));
        if let Some(path) = std::env::var_os(&per_switch) {
            return Some(PathBuf::from(path));
        }
        if let Some(path) = std::env::var_os("NXSDK_SERVER_CERT") {
            return Some(PathBuf::from(path));
        }
        Some(PathBuf::from(DEFAULT_CERT))
    }
}

/// Remote session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connected,
    Disconnected,
}

/// Context-level callbacks: remote connection transitions.
pub trait SdkHandler: Send {
    fn post_remote_conn_up_cb(&mut self) {}

    fn post_remote_conn_down_cb(&mut self) {}
}

struct ContextInner {
    config: SdkConfig,
    backend: Arc<SwitchState>,
    intf_mgr: Arc<IntfMgr>,
    mac_mgr: Arc<MacMgr>,
    adj_mgr: Arc<AdjMgr>,
    rib_mgr: Arc<RibMgr>,
    dme_mgr: Arc<DmeMgr>,
    cli_parser: Arc<CliParser>,
    tracer: Arc<Tracer>,
    sdk_handler: Mutex<Option<Box<dyn SdkHandler>>>,
    priority: Mutex<AppPriority>,
    loop_running: AtomicBool,
}

/// One SDK endpoint: the managers, the tracer, and the event loop.
#[derive(Clone)]
pub struct SdkContext {
    inner: Arc<ContextInner>,
}

impl SdkContext {
    /// Builds a context and connects it to the (emulated) switch, which
    /// comes up with factory-default content: the default VRF, a few
    /// front-panel ports and `mgmt0`.
    pub fn new(config: SdkConfig) -> SdkResult<SdkContext> {
        if config.name.is_empty() {
            return Err(switchlink_types::SdkError::raise(
                config.error_style(),
                ErrorKind::InvalidArg,
                MODULE,
                "new",
                "application name cannot be empty",
            ));
        }
        let env = config.running_env();
        if env == RunningEnv::Remote {
            debug!(cert = ?config.resolve_cert(), "remote session certificate resolved");
        }
        let backend = Arc::new(SwitchState::new(
            &config.name,
            env == RunningEnv::Remote,
            env,
            config.error_style(),
        ));
        info!(app = %config.name, env = ?env, "SDK context created");
        Ok(SdkContext {
            inner: Arc::new(ContextInner {
                intf_mgr: IntfMgr::new(Arc::clone(&backend)),
                mac_mgr: MacMgr::new(Arc::clone(&backend)),
                adj_mgr: AdjMgr::new(Arc::clone(&backend)),
                rib_mgr: RibMgr::new(Arc::clone(&backend)),
                dme_mgr: DmeMgr::new(Arc::clone(&backend)),
                cli_parser: CliParser::new(Arc::clone(&backend)),
                tracer: Arc::new(Tracer::new(&config.name)),
                backend,
                config,
                sdk_handler: Mutex::new(None),
                priority: Mutex::new(AppPriority::Low),
                loop_running: AtomicBool::new(false),
            }),
        })
    }

    pub fn app_name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn app_description(&self) -> &str {
        &self.inner.config.description
    }

    pub fn running_env(&self) -> RunningEnv {
        self.inner.backend.running_env()
    }

    pub fn conn_state(&self) -> ConnState {
        if self.inner.backend.is_connected() {
            ConnState::Connected
        } else {
            ConnState::Disconnected
        }
    }

    /// The emulated switch side. Tests and demos drive switch-originated
    /// activity (link flaps, MAC learns, foreign routes) through this.
    pub fn switch(&self) -> &SwitchState {
        &self.inner.backend
    }

    pub fn intf_mgr(&self) -> Arc<IntfMgr> {
        Arc::clone(&self.inner.intf_mgr)
    }

    pub fn mac_mgr(&self) -> Arc<MacMgr> {
        Arc::clone(&self.inner.mac_mgr)
    }

    pub fn adj_mgr(&self) -> Arc<AdjMgr> {
        Arc::clone(&self.inner.adj_mgr)
    }

    pub fn rib_mgr(&self) -> Arc<RibMgr> {
        Arc::clone(&self.inner.rib_mgr)
    }

    pub fn dme_mgr(&self) -> Arc<DmeMgr> {
        Arc::clone(&self.inner.dme_mgr)
    }

    pub fn cli_parser(&self) -> Arc<CliParser> {
        Arc::clone(&self.inner.cli_parser)
    }

    pub fn tracer(&self) -> Arc<Tracer> {
        Arc::clone(&self.inner.tracer)
    }

    pub fn set_sdk_handler(&self, handler: Box<dyn SdkHandler>) {
        *self.inner.sdk_handler.lock().unwrap() = Some(handler);
    }

    pub fn unset_sdk_handler(&self) {
        *self.inner.sdk_handler.lock().unwrap() = None;
    }

    /// Scheduling priority hint for the hosting switch. Advisory in the
    /// emulation.
    pub fn set_app_priority(&self, priority: AppPriority) {
        *self.inner.priority.lock().unwrap() = priority;
    }

    pub fn app_priority(&self) -> AppPriority {
        *self.inner.priority.lock().unwrap()
    }

    /// Discards every watch filter and resets every manager's session
    /// epoch to the current one. This is the recovery step after a
    /// remote reconnect invalidates outstanding objects.
    pub fn purge_all_sdk_objs(&self) {
        info!(app = %self.app_name(), "purging SDK object state");
        self.inner.intf_mgr.purge();
        self.inner.mac_mgr.purge();
        self.inner.adj_mgr.purge();
        self.inner.rib_mgr.purge();
        self.inner.dme_mgr.purge();
        self.inner.cli_parser.purge();
    }

    /// Blocks the calling thread dispatching events to registered
    /// handlers until [`SdkContext::stop_event_loop`] is called from
    /// another thread. Only one thread may run the loop at a time.
    pub fn start_event_loop(&self) -> SdkResult<()> {
        let Some(mut rx) = self.inner.backend.take_receiver() else {
            return Err(self.inner.backend.raise(
                ErrorKind::InvalidUsage,
                MODULE,
                "start_event_loop",
                "event loop is already running",
            ));
        };
        self.inner.loop_running.store(true, Ordering::SeqCst);
        info!(app = %self.app_name(), "event loop started");

        while let Some(event) = rx.blocking_recv() {
            match event {
                SwitchEvent::Intf { category, snapshot } => {
                    self.inner.intf_mgr.deliver(category, &snapshot)
                }
                SwitchEvent::Mac { snapshot } => self.inner.mac_mgr.deliver(&snapshot),
                SwitchEvent::MacDownloadDone { id, vlan, mac } => {
                    self.inner.mac_mgr.deliver_download_done(id, vlan, mac)
                }
                SwitchEvent::Adj { snapshot } => self.inner.adj_mgr.deliver(&snapshot),
                SwitchEvent::AdjDownloadDone { af, intf_name, ip } => {
                    self.inner.adj_mgr.deliver_download_done(af, &intf_name, ip)
                }
                SwitchEvent::Vrf { snapshot } => self.inner.rib_mgr.deliver_vrf(&snapshot),
                SwitchEvent::Route {
                    snapshot,
                    protocol,
                    tag,
                } => self.inner.rib_mgr.deliver_route(&snapshot, &protocol, &tag),
                SwitchEvent::MyRoute { snapshot } => {
                    self.inner.rib_mgr.deliver_my_route(&snapshot)
                }
                SwitchEvent::RecursiveNextHop { snapshot, resolved } => self
                    .inner
                    .rib_mgr
                    .deliver_recursive_next_hop(&snapshot, resolved),
                SwitchEvent::RouteRepopulate {
                    vrf_name,
                    route_addr,
                    mask_len,
                } => self
                    .inner
                    .rib_mgr
                    .deliver_repopulate(&vrf_name, &route_addr, mask_len),
                SwitchEvent::Dme { snapshot } => self.inner.dme_mgr.deliver(&snapshot),
                SwitchEvent::DmeDownloadDone { dn } => {
                    self.inner.dme_mgr.deliver_download_done(&dn)
                }
                SwitchEvent::RemoteConn { up } => {
                    let mut slot = self.inner.sdk_handler.lock().unwrap();
                    if let Some(handler) = slot.as_mut() {
                        if up {
                            invoke("post_remote_conn_up_cb", || {
                                handler.post_remote_conn_up_cb()
                            });
                        } else {
                            invoke("post_remote_conn_down_cb", || {
                                handler.post_remote_conn_down_cb()
                            });
                        }
                    }
                }
                SwitchEvent::Stop => break,
            }
        }

        self.inner.loop_running.store(false, Ordering::SeqCst);
        self.inner.backend.restore_receiver(rx);
        info!(app = %self.app_name(), "event loop stopped");
        Ok(())
    }

    /// Signals the dispatch loop to exit. Events already queued ahead of
    /// the stop marker are still delivered. This is the only
    /// cancellation mechanism.
    pub fn stop_event_loop(&self) {
        self.inner.backend.emit(SwitchEvent::Stop);
    }

    pub fn is_event_loop_running(&self) -> bool {
        self.inner.loop_running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cert_resolution_precedence() {
        let mut config = SdkConfig::local("certapp");
        assert_eq!(config.resolve_cert(), None);

        config.remote_ip = Some("192.0.2.10".to_string());
        assert_eq!(config.resolve_cert(), Some(PathBuf::from(DEFAULT_CERT)));

        config.cert = Some(PathBuf::from("/tmp/explicit.pem"));
        assert_eq!(config.resolve_cert(), Some(PathBuf::from("/tmp/explicit.pem")));
    }

    #[test]
    fn test_config_parses_from_argv() {
        let config = SdkConfig::parse_from([
            "app",
            "--name",
            "myapp",
            "--advanced-errors",
            "--remote-ip",
            "192.0.2.1",
        ]);
        assert_eq!(config.name, "myapp");
        assert_eq!(config.error_style(), ErrorStyle::Advanced);
        assert_eq!(config.running_env(), RunningEnv::Remote);
        assert_eq!(config.remote_port, 50002);
    }

    #[test]
    fn test_context_rejects_empty_name() {
        let err = SdkContext::new(SdkConfig::local("")).err().unwrap();
        assert_eq!(err.kind(), None); // simple mode: message only
        assert!(err.message().contains("name"));
    }

    #[test]
    fn test_second_event_loop_rejected() {
        let ctx = SdkContext::new(SdkConfig::local("loopapp")).unwrap();
        // Claim the receiver as a running loop would.
        let rx = ctx.inner.backend.take_receiver().unwrap();
        assert!(ctx.start_event_loop().is_err());
        ctx.inner.backend.restore_receiver(rx);
    }
}
