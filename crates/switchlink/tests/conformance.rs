//! End-to-end contract tests for the watch/handler/download protocol,
//! run against the in-process switch emulation.
//!
//! The dispatch loop is driven deterministically: actions are issued
//! first (events queue on the FIFO channel), then `stop_event_loop` is
//! called, then `start_event_loop` runs on the test thread and returns
//! once the queued events, in order, have been dispatched.

use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;

use switchlink::types::{
    Af, ErrorKind, Event, IpPrefix, LinkState, MacAddress, RecordFormat,
};
use switchlink::{
    CliInvocation, CmdHandler, IntfHandler, MacHandler, ParamType, RibHandler, SdkConfig,
    SdkContext,
};

type Log = Arc<Mutex<Vec<String>>>;

fn ctx(name: &str) -> SdkContext {
    SdkContext::new(SdkConfig::local(name)).unwrap()
}

fn advanced_ctx(name: &str) -> SdkContext {
    let mut config = SdkConfig::local(name);
    config.advanced_errors = true;
    SdkContext::new(config).unwrap()
}

/// Runs the dispatch loop over everything queued so far, then returns.
fn drain(ctx: &SdkContext) {
    ctx.stop_event_loop();
    ctx.start_event_loop().unwrap();
}

fn mac(s: &str) -> MacAddress {
    s.parse().unwrap()
}

struct MacRecorder {
    log: Log,
}

impl MacHandler for MacRecorder {
    fn post_mac_cb(&mut self, entry: &switchlink::MacEntry) -> bool {
        self.log.lock().unwrap().push(format!(
            "mac {} vlan {} {}",
            entry.mac_address(),
            entry.vlan(),
            entry.event().as_str()
        ));
        true
    }

    fn post_mac_download_done_cb(&mut self, id: u64, vlan: u32, mac: Option<MacAddress>) {
        self.log.lock().unwrap().push(format!(
            "done id {id} vlan {vlan} mac {}",
            mac.map_or("none".to_string(), |m| m.to_string())
        ));
    }
}

#[test]
fn download_replays_before_done_with_filter_context() {
    let ctx = ctx("dlapp");
    drain(&ctx); // discard factory-default events

    let switch = ctx.switch();
    switch.learn_mac(mac("00:00:00:00:00:aa"), 10, "Ethernet1/1");
    switch.learn_mac(mac("00:00:00:00:00:bb"), 10, "Ethernet1/2");
    switch.learn_mac(mac("00:00:00:00:00:cc"), 20, "Ethernet1/3");
    drain(&ctx); // learns processed with no watch in place

    let log: Log = Log::default();
    let mgr = ctx.mac_mgr();
    mgr.set_mac_handler(Box::new(MacRecorder { log: Arc::clone(&log) }));
    let id = mgr.watch_mac(10, None, true).unwrap();
    drain(&ctx);

    let log = log.lock().unwrap();
    // Both vlan-10 entries replayed, then the done marker with the
    // originating filter context. The vlan-20 entry never appears.
    assert_eq!(
        *log,
        vec![
            "mac 00:00:00:00:00:aa vlan 10 download".to_string(),
            "mac 00:00:00:00:00:bb vlan 10 download".to_string(),
            format!("done id {id} vlan 10 mac none"),
        ]
    );
}

struct IntfRecorder {
    log: Log,
}

impl IntfHandler for IntfRecorder {
    fn post_intf_state_cb(&mut self, intf: &switchlink::Intf) -> bool {
        self.log.lock().unwrap().push(format!(
            "{} {} {}",
            intf.name(),
            intf.oper_state().as_str(),
            intf.event().as_str()
        ));
        true
    }
}

#[test]
fn event_is_set_inside_callbacks_and_noevent_outside() {
    let ctx = ctx("evapp");
    drain(&ctx);

    let mgr = ctx.intf_mgr();
    let log: Log = Log::default();
    mgr.set_intf_handler(Box::new(IntfRecorder { log: Arc::clone(&log) }));
    mgr.watch_intf("Ethernet1/1").unwrap();

    ctx.switch().set_oper_state("Ethernet1/1", LinkState::Down);
    drain(&ctx);

    assert_eq!(*log.lock().unwrap(), vec!["Ethernet1/1 down update".to_string()]);

    // The same entity fetched outside a callback reports no event.
    let owned = mgr.get_intf("Ethernet1/1").unwrap().unwrap();
    assert_eq!(owned.event(), Event::NoEvent);
    assert_eq!(owned.oper_state(), LinkState::Down);
}

struct CategoryRecorder {
    log: Log,
}

impl IntfHandler for CategoryRecorder {
    fn post_intf_add_del_cb(&mut self, intf: &switchlink::Intf) -> bool {
        self.log
            .lock()
            .unwrap()
            .push(format!("adddel {} {}", intf.name(), intf.event().as_str()));
        true
    }

    fn post_intf_state_cb(&mut self, intf: &switchlink::Intf) -> bool {
        self.log
            .lock()
            .unwrap()
            .push(format!("state {} {}", intf.name(), intf.event().as_str()));
        true
    }
}

#[test]
fn cosmetic_setters_do_not_fire_add_del_callbacks() {
    let ctx = ctx("quietapp");
    drain(&ctx);

    let mgr = ctx.intf_mgr();
    let log: Log = Log::default();
    mgr.set_intf_handler(Box::new(CategoryRecorder { log: Arc::clone(&log) }));
    mgr.watch_intf("all").unwrap();

    // Fields without a callback category of their own write through
    // silently instead of masquerading as add/del events.
    assert!(mgr.set_description("Ethernet1/1", "uplink").unwrap());
    assert!(mgr.set_mtu("Ethernet1/1", 9000).unwrap());
    assert!(mgr.set_speed("Ethernet1/1", 40_000).unwrap());
    assert!(mgr
        .set_l2_address("Ethernet1/1", mac("02:00:00:00:00:01"))
        .unwrap());
    drain(&ctx);
    assert!(log.lock().unwrap().is_empty());

    // The writes are still visible, and real categories still fire.
    let intf = mgr.get_intf("Ethernet1/1").unwrap().unwrap();
    assert_eq!(intf.description(), "uplink");
    assert_eq!(intf.mtu(), 9000);
    assert_eq!(intf.speed_mbps(), 40_000);
    assert_eq!(intf.l2_address(), mac("02:00:00:00:00:01"));

    mgr.set_admin_state("Ethernet1/1", LinkState::Up).unwrap();
    drain(&ctx);
    assert_eq!(*log.lock().unwrap(), vec!["state Ethernet1/1 update".to_string()]);
}

#[test]
fn specific_unwatch_removes_only_that_filter() {
    let ctx = ctx("unwapp");
    drain(&ctx);

    let log: Log = Log::default();
    let mgr = ctx.mac_mgr();
    mgr.set_mac_handler(Box::new(MacRecorder { log: Arc::clone(&log) }));

    let a = mac("00:00:00:00:00:aa");
    let b = mac("00:00:00:00:00:bb");
    mgr.watch_mac(10, Some(a), false).unwrap();
    mgr.watch_mac(10, Some(b), false).unwrap();
    assert!(mgr.unwatch_mac(10, Some(a)).unwrap());

    ctx.switch().learn_mac(a, 10, "Ethernet1/1");
    ctx.switch().learn_mac(b, 10, "Ethernet1/2");
    drain(&ctx);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["mac 00:00:00:00:00:bb vlan 10 add".to_string()]
    );

    // The "all" form silences the entity type entirely, handler intact.
    log.lock().unwrap().clear();
    assert!(mgr.unwatch_all_mac().unwrap());
    assert!(mgr.has_mac_handler());
    ctx.switch().learn_mac(b, 10, "Ethernet1/3");
    drain(&ctx);
    assert!(log.lock().unwrap().is_empty());
}

struct AdjRecorder {
    log: Log,
}

impl switchlink::AdjHandler for AdjRecorder {
    fn post_adj_cb(&mut self, adj: &switchlink::Adjacency) {
        self.log.lock().unwrap().push(format!(
            "adj {} {} {}",
            adj.intf_name(),
            adj.ip_addr(),
            adj.event().as_str()
        ));
    }
}

#[test]
fn unwatch_all_adjs_silences_the_whole_family() {
    let ctx = ctx("adjapp");
    drain(&ctx);

    let mgr = ctx.adj_mgr();
    let log: Log = Log::default();
    mgr.set_adj_handler(Box::new(AdjRecorder { log: Arc::clone(&log) }));

    // One all-watch, one v4 address filter, one interface-wide filter.
    mgr.watch_all_adjs(Af::Ipv4, false).unwrap();
    let v4: std::net::IpAddr = "10.1.1.1".parse().unwrap();
    let v6: std::net::IpAddr = "2001:db8::1".parse().unwrap();
    mgr.watch_adj("Ethernet1/1", Some(v4), false).unwrap();
    mgr.watch_adj("Ethernet1/2", None, false).unwrap();

    mgr.unwatch_all_adjs(Af::Ipv4).unwrap();

    // No IPv4 event gets through, not even via the interface-wide
    // filter; the interface-wide filter is gone for IPv6 too.
    ctx.switch().learn_adj("Ethernet1/1", v4, mac("00:00:00:00:01:01"));
    ctx.switch()
        .learn_adj("Ethernet1/2", "10.1.2.1".parse().unwrap(), mac("00:00:00:00:01:02"));
    ctx.switch().learn_adj("Ethernet1/2", v6, mac("00:00:00:00:01:03"));
    drain(&ctx);
    assert!(log.lock().unwrap().is_empty());
    assert!(mgr.has_adj_handler());

    // A v6 address filter survives a v4 family unwatch.
    mgr.watch_adj("Ethernet1/3", Some("2001:db8::2".parse().unwrap()), false)
        .unwrap();
    mgr.unwatch_all_adjs(Af::Ipv4).unwrap();
    ctx.switch()
        .learn_adj("Ethernet1/3", "2001:db8::2".parse().unwrap(), mac("00:00:00:00:01:04"));
    drain(&ctx);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["adj Ethernet1/3 2001:db8::2 add".to_string()]
    );
}

struct RouteRecorder {
    log: Log,
}

impl RibHandler for RouteRecorder {
    fn post_my_l3_route_cb(&mut self, route: &switchlink::L3Route) -> bool {
        self.log.lock().unwrap().push(format!(
            "my {} nh {} {}",
            route.prefix(),
            route.nexthop_count(),
            route.event().as_str()
        ));
        true
    }
}

#[test]
fn staged_route_flush_completes_with_one_callback() {
    let ctx = ctx("ribapp");
    drain(&ctx);

    let rib = ctx.rib_mgr();
    let log: Log = Log::default();
    rib.set_rib_handler(Box::new(RouteRecorder { log: Arc::clone(&log) }));

    let staged = rib.add_l3_route("10.2.0.0", 16, "default").unwrap();
    staged.add_direct_next_hop("10.1.1.1".parse().unwrap(), "Ethernet1/1", 10);
    // Nothing is visible before the flush.
    assert!(rib
        .get_l3_route_detail("10.2.0.0", 16, "default")
        .unwrap()
        .is_none());

    assert!(rib.send_my_routes_to_rib(Af::Ipv4).unwrap());
    drain(&ctx);

    assert_eq!(*log.lock().unwrap(), vec!["my 10.2.0.0/16 nh 1 add".to_string()]);
    let installed = rib
        .get_l3_route_detail("10.2.0.0", 16, "default")
        .unwrap()
        .unwrap();
    assert_eq!(installed.nexthop_count(), 1);
    assert_eq!(installed.nexthops()[0].out_interface(), "Ethernet1/1");
}

#[test]
fn uncollected_route_objects_are_bounded_per_vrf() {
    let ctx = advanced_ctx("boundapp");
    drain(&ctx);

    let prefix: IpPrefix = "10.3.0.0/16".parse().unwrap();
    let nh: std::net::IpAddr = "10.1.1.2".parse().unwrap();
    ctx.switch()
        .install_route("default", prefix, "ospf", "1", &[(nh, "Ethernet1/2")]);

    let rib = ctx.rib_mgr();
    let mut held = Vec::new();
    for _ in 0..10 {
        held.push(
            rib.get_l3_route("10.3.0.0", 16, "default", false)
                .unwrap()
                .unwrap(),
        );
    }
    let err = rib
        .get_l3_route("10.3.0.0", 16, "default", false)
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::MaxLimit));

    // clear_buffer resets the count; the call itself then occupies slot 1.
    let one = rib
        .get_l3_route("10.3.0.0", 16, "default", true)
        .unwrap()
        .unwrap();
    assert_eq!(one.nexthop_count(), 1);
    for _ in 0..9 {
        held.push(
            rib.get_l3_route("10.3.0.0", 16, "default", false)
                .unwrap()
                .unwrap(),
        );
    }
    assert!(rib
        .get_l3_route("10.3.0.0", 16, "default", false)
        .is_err());

    // Dropping handles releases their slots.
    drop(held);
    drop(one);
    assert!(rib
        .get_l3_route("10.3.0.0", 16, "default", false)
        .unwrap()
        .is_some());
}

#[test]
fn route_watch_filters_are_bounded_per_vrf_and_family() {
    let ctx = advanced_ctx("filterapp");
    let rib = ctx.rib_mgr();

    for i in 0..15 {
        let protocol = format!("proto{i}");
        assert!(rib
            .watch_l3_route(&protocol, "1", "default", Some(Af::Ipv4))
            .unwrap());
    }
    let err = rib
        .watch_l3_route("proto15", "1", "default", Some(Af::Ipv4))
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::MaxLimit));

    // Re-registering an existing filter does not count against the cap,
    // and the other family's budget is untouched.
    assert!(rib
        .watch_l3_route("proto0", "1", "default", Some(Af::Ipv4))
        .unwrap());
    assert!(rib
        .watch_l3_route("proto15", "1", "default", Some(Af::Ipv6))
        .unwrap());

    // Dropping one filter frees its slot.
    rib.unwatch_l3_route("proto0", "1", "default", Some(Af::Ipv4))
        .unwrap();
    assert!(rib
        .watch_l3_route("proto15", "1", "default", Some(Af::Ipv4))
        .unwrap());
}

#[test]
fn error_style_is_fixed_per_context() {
    // Same trigger, both styles: a matched command with no handler.
    for advanced in [false, true] {
        let mut config = SdkConfig::local("errapp");
        config.advanced_errors = advanced;
        let ctx = SdkContext::new(config).unwrap();
        let parser = ctx.cli_parser();
        let cmd = parser.new_show_cmd("state", "state", "app state").unwrap();
        parser.add_to_parse_tree(cmd).unwrap();

        let err = parser
            .exec_cmd("show errapp state", RecordFormat::Text)
            .unwrap_err();
        if advanced {
            assert_eq!(err.kind(), Some(ErrorKind::InvalidUsage));
            assert_eq!(err.module(), Some("cli"));
        } else {
            assert_eq!(err.kind(), None);
            assert!(!err.message().is_empty());
        }
    }
}

struct PortShowHandler;

impl CmdHandler for PortShowHandler {
    fn post_cli_cb(&mut self, invocation: &mut CliInvocation) -> bool {
        let port = invocation
            .param("port-id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        if invocation.is_keyword_set("detail") {
            invocation.print_console(format!("{{\"port\":\"{port}\",\"detail\":true}}"));
        } else {
            invocation.print_console(format!("port {port}"));
        }
        true
    }
}

#[test]
fn cli_commands_match_and_render() {
    let ctx = ctx("cliapp");
    let parser = ctx.cli_parser();

    let mut cmd = parser
        .new_show_cmd("port-status", "port <port-id> [detail]", "port status")
        .unwrap();
    assert!(cmd.update_param("port-id", "interface name", ParamType::Interface));
    parser.add_to_parse_tree(cmd).unwrap();
    parser.set_cmd_handler(Box::new(PortShowHandler));

    // Namespaced under `show <app>`.
    let out = parser
        .exec_cmd("show cliapp port Ethernet1/1", RecordFormat::Text)
        .unwrap()
        .unwrap();
    assert_eq!(out, "port Ethernet1/1");

    // XML is derived from the handler's JSON output.
    let out = parser
        .exec_cmd("show cliapp port Ethernet1/1 detail", RecordFormat::Xml)
        .unwrap()
        .unwrap();
    // serde_json object keys iterate in sorted order.
    assert_eq!(
        out,
        "<output><detail>true</detail><port>Ethernet1/1</port></output>"
    );

    // Unmatched input and an invalid typed parameter both miss.
    assert!(parser
        .exec_cmd("show cliapp bogus", RecordFormat::Text)
        .unwrap()
        .is_none());
    assert!(parser
        .exec_cmd("show cliapp port not-an-interface", RecordFormat::Text)
        .unwrap()
        .is_none());

    assert!(parser.get_parser_status().contains("port-status"));
}

#[test]
fn remote_disconnect_marks_objects_stale_until_purge() {
    let mut config = SdkConfig::local("remoteapp");
    config.remote_ip = Some("192.0.2.7".to_string());
    let ctx = SdkContext::new(config).unwrap();
    drain(&ctx);

    let mgr = ctx.intf_mgr();
    assert!(mgr.get_intf("Ethernet1/1").is_ok());

    let parser = ctx.cli_parser();
    let cmd = parser.new_show_cmd("state", "state", "app state").unwrap();
    parser.add_to_parse_tree(cmd).unwrap();

    ctx.switch().remote_link_down();
    let err = mgr.get_intf("Ethernet1/1").unwrap_err();
    assert_eq!(err.message(), "connection to the switch is down");
    // The CLI surface is gated on the same session.
    assert!(parser.new_show_cmd("other", "other", "h").is_err());
    assert!(parser.exec_cmd("show remoteapp state", RecordFormat::Text).is_err());

    ctx.switch().remote_link_up();
    let err = mgr.get_intf("Ethernet1/1").unwrap_err();
    assert!(err.message().contains("purge"));
    assert!(parser.del_from_parse_tree("state").is_err());

    ctx.purge_all_sdk_objs();
    assert!(mgr.get_intf("Ethernet1/1").unwrap().is_some());
    // Registrations made before the reconnect are still in the tree.
    assert!(parser.del_from_parse_tree("state").unwrap());
}
