//! intfwatchd daemon entry point.
//!
//! A small demonstration application for the switchlink SDK: it watches
//! every interface, counts state transitions per port, and registers a
//! `show intfwatchd state` command reporting what it has seen. The
//! emulated switch side is driven with a short link-flap scenario so the
//! daemon produces output end to end.

use std::collections::BTreeMap;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use switchlink::types::{LinkState, RecordFormat};
use switchlink::{
    CliInvocation, CmdHandler, Intf, IntfHandler, SdkConfig, SdkContext,
};

#[derive(Debug, Parser)]
#[command(about = "interface watcher demo daemon")]
struct Args {
    /// Application name registered with the switch.
    #[arg(long, default_value = "intfwatchd")]
    name: String,

    /// Report structured errors instead of message-only errors.
    #[arg(long)]
    advanced_errors: bool,

    /// Log verbosely.
    #[arg(long)]
    debug: bool,
}

/// Per-port flap statistics shared between the event handler and the CLI
/// handler.
#[derive(Default)]
struct WatchStats {
    transitions: BTreeMap<String, u64>,
    last_state: BTreeMap<String, LinkState>,
}

struct IntfWatcher {
    stats: Arc<Mutex<WatchStats>>,
}

impl IntfHandler for IntfWatcher {
    fn post_intf_state_cb(&mut self, intf: &Intf) -> bool {
        info!(
            intf = intf.name(),
            state = %intf.oper_state(),
            "interface state change"
        );
        let mut stats = self.stats.lock().unwrap();
        *stats.transitions.entry(intf.name().to_string()).or_insert(0) += 1;
        stats
            .last_state
            .insert(intf.name().to_string(), intf.oper_state());
        true
    }

    fn post_intf_add_del_cb(&mut self, intf: &Intf) -> bool {
        info!(intf = intf.name(), event = %intf.event(), "interface add/del");
        true
    }
}

struct StateCmd {
    stats: Arc<Mutex<WatchStats>>,
}

impl CmdHandler for StateCmd {
    fn post_cli_cb(&mut self, invocation: &mut CliInvocation) -> bool {
        let stats = self.stats.lock().unwrap();
        let ports: serde_json::Map<String, serde_json::Value> = stats
            .transitions
            .iter()
            .map(|(name, count)| {
                let state = stats
                    .last_state
                    .get(name)
                    .copied()
                    .unwrap_or(LinkState::Unknown);
                (
                    name.clone(),
                    serde_json::json!({
                        "transitions": count,
                        "state": state.as_str(),
                    }),
                )
            })
            .collect();
        invocation.print_console(serde_json::Value::Object(ports).to_string());
        true
    }
}

fn init_logging(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut config = SdkConfig::local(&args.name);
    config.description = "interface watcher demo".to_string();
    config.advanced_errors = args.advanced_errors;

    let ctx = SdkContext::new(config).context("creating SDK context")?;
    let stats = Arc::new(Mutex::new(WatchStats::default()));

    let intf_mgr = ctx.intf_mgr();
    intf_mgr.set_intf_handler(Box::new(IntfWatcher {
        stats: Arc::clone(&stats),
    }));
    intf_mgr.watch_intf("all").context("watching interfaces")?;

    let parser = ctx.cli_parser();
    let cmd = parser
        .new_show_cmd("state", "state [detail]", "interface watch statistics")
        .context("building show command")?;
    parser.add_to_parse_tree(cmd).context("registering show command")?;
    parser.set_cmd_handler(Box::new(StateCmd {
        stats: Arc::clone(&stats),
    }));

    // Event loop on its own thread; the main thread plays the switch.
    let loop_ctx = ctx.clone();
    let dispatcher = std::thread::Builder::new()
        .name("dispatch".to_string())
        .spawn(move || loop_ctx.start_event_loop())
        .context("spawning dispatch thread")?;

    // A short link-flap scenario on the emulated switch.
    let switch = ctx.switch();
    for _ in 0..3 {
        switch.set_oper_state("Ethernet1/1", LinkState::Down);
        switch.set_oper_state("Ethernet1/1", LinkState::Up);
    }
    switch.set_oper_state("Ethernet1/2", LinkState::Down);

    ctx.stop_event_loop();
    dispatcher
        .join()
        .map_err(|_| anyhow::anyhow!("dispatch thread panicked"))?
        .context("event loop")?;

    let show = format!("show {} state", ctx.app_name());
    match parser.exec_cmd(&show, RecordFormat::Json).context("running show command")? {
        Some(output) => info!("{show}: {output}"),
        None => error!("show command did not match"),
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug);

    info!("--- Starting intfwatchd ---");
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("intfwatchd failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}
