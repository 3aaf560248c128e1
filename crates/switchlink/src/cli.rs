//! Custom CLI command registration and execution.
//!
//! Applications describe commands with a space-delimited syntax string:
//! `<name>` placeholders bind parameters, `(a|b)` is alternation, `[x]`
//! is optional, `{y}+` repeats one or more times. The parser validates
//! the grammar when the command is added to the parse tree, matches user
//! input against it, and hands the handler a [`CliInvocation`] with the
//! matched keywords and typed parameter values.
//!
//! Registered names are auto-namespaced so applications cannot shadow
//! native commands: show commands run as `show <app-name> ...`, config
//! commands as `<app-name> ...` with an optional leading `no`.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use switchlink_types::{ErrorKind, IpPrefix, MacAddress, RecordFormat, SdkResult};

use crate::backend::SwitchState;
use crate::dispatch::invoke_advisory;
use crate::VRF_NAME_MAX;

const MODULE: &str = "cli";

static PARAM_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[A-Za-z0-9_-]+$").expect("static regex"));

/// Command class: read-only `show` or configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdType {
    Show,
    Config,
}

/// Typed constraint attached to a `<param>` placeholder.
#[derive(Debug, Clone, Default)]
pub enum ParamType {
    /// Free-form word, optionally bounded and pattern-checked.
    #[default]
    Text,
    BoundedText {
        min_len: usize,
        max_len: usize,
        pattern: Option<String>,
    },
    Integer {
        min: i64,
        max: i64,
    },
    /// IP address; `prefix` accepts `addr/len`, `v6` restricts family.
    IpAddress {
        prefix: bool,
        v6: bool,
    },
    Interface,
    MacAddress,
    VrfName,
}

/// A matched parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Ip(IpAddr),
    Prefix(IpPrefix),
    Mac(MacAddress),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_ip(&self) -> Option<IpAddr> {
        match self {
            ParamValue::Ip(ip) => Some(*ip),
            _ => None,
        }
    }

    pub fn as_prefix(&self) -> Option<IpPrefix> {
        match self {
            ParamValue::Prefix(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_mac(&self) -> Option<MacAddress> {
        match self {
            ParamValue::Mac(m) => Some(*m),
            _ => None,
        }
    }
}

/// One element of a parsed syntax grammar.
#[derive(Debug, Clone)]
enum SyntaxNode {
    Keyword(String),
    Param(String),
    Optional(Box<SyntaxNode>),
    Alternation(Vec<SyntaxNode>),
    RepeatPlus(Box<SyntaxNode>),
}

/// A registered (or under-construction) custom command schema.
///
/// The schema is mutable until [`CliParser::add_to_parse_tree`] takes
/// ownership, which is what freezes it.
#[derive(Debug, Clone)]
pub struct CliCmd {
    cmd_type: CmdType,
    name: String,
    syntax: String,
    help: String,
    keyword_help: HashMap<String, String>,
    param_help: HashMap<String, String>,
    param_types: HashMap<String, ParamType>,
}

impl CliCmd {
    fn new(cmd_type: CmdType, name: &str, syntax: &str, help: &str) -> CliCmd {
        CliCmd {
            cmd_type,
            name: name.to_string(),
            syntax: syntax.to_string(),
            help: help.to_string(),
            keyword_help: HashMap::new(),
            param_help: HashMap::new(),
            param_types: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cmd_type(&self) -> CmdType {
        self.cmd_type
    }

    pub fn syntax(&self) -> &str {
        &self.syntax
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    /// Attaches a help string to one keyword of the syntax.
    pub fn update_keyword(&mut self, keyword: &str, help: &str) -> bool {
        if !self
            .syntax
            .split_whitespace()
            .any(|tok| tok.trim_matches(|c| "([{}])+|".contains(c)).split('|').any(|t| t == keyword))
        {
            return false;
        }
        self.keyword_help
            .insert(keyword.to_string(), help.to_string());
        true
    }

    /// Attaches a help string and a typed constraint to one `<param>`
    /// placeholder of the syntax.
    pub fn update_param(&mut self, param: &str, help: &str, ptype: ParamType) -> bool {
        let placeholder = format!("<{param}>");
        if !self.syntax.contains(&placeholder) {
            return false;
        }
        self.param_help.insert(param.to_string(), help.to_string());
        self.param_types.insert(param.to_string(), ptype);
        true
    }
}

/// One matched execution of a registered command, handed to
/// [`CmdHandler::post_cli_cb`].
pub struct CliInvocation {
    cmd_name: String,
    input: String,
    no_cmd: bool,
    keywords: HashSet<String>,
    params: HashMap<String, Vec<ParamValue>>,
    output: Vec<String>,
}

impl CliInvocation {
    /// Name the command was registered under.
    pub fn cmd_name(&self) -> &str {
        &self.cmd_name
    }

    /// The raw user input line.
    pub fn input_line(&self) -> &str {
        &self.input
    }

    /// True for a config command negated with a leading `no`.
    pub fn is_no_cmd(&self) -> bool {
        self.no_cmd
    }

    /// True when the keyword was present in the matched input.
    pub fn is_keyword_set(&self, keyword: &str) -> bool {
        self.keywords.contains(keyword)
    }

    /// First bound value of one parameter.
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name).and_then(|v| v.first())
    }

    /// Every bound value of a `{...}+` repeated parameter.
    pub fn param_all(&self, name: &str) -> &[ParamValue] {
        self.params.get(name).map_or(&[], Vec::as_slice)
    }

    /// Emits one line of command output, TEXT or JSON. XML is never
    /// emitted directly; it is derived from JSON on demand.
    pub fn print_console(&mut self, text: impl Into<String>) {
        self.output.push(text.into());
    }
}

/// Application callback for registered commands. The return is advisory.
pub trait CmdHandler: Send {
    fn post_cli_cb(&mut self, _invocation: &mut CliInvocation) -> bool {
        true
    }
}

struct RegisteredCmd {
    cmd: CliCmd,
    nodes: Vec<SyntaxNode>,
}

/// The CLI parse tree for one application.
pub struct CliParser {
    backend: Arc<SwitchState>,
    epoch: AtomicU64,
    commands: Mutex<HashMap<String, RegisteredCmd>>,
    handler: Mutex<Option<Box<dyn CmdHandler>>>,
}

impl CliParser {
    pub(crate) fn new(backend: Arc<SwitchState>) -> Arc<CliParser> {
        Arc::new(CliParser {
            epoch: AtomicU64::new(backend.current_epoch()),
            backend,
            commands: Mutex::new(HashMap::new()),
            handler: Mutex::new(None),
        })
    }

    fn check(&self, api: &'static str) -> SdkResult<()> {
        self.backend
            .check_session(self.epoch.load(Ordering::SeqCst), MODULE, api)
    }

    /// Opens a new show command schema.
    pub fn new_show_cmd(&self, name: &str, syntax: &str, help: &str) -> SdkResult<CliCmd> {
        self.new_cmd(CmdType::Show, name, syntax, help)
    }

    /// Opens a new config command schema.
    pub fn new_config_cmd(&self, name: &str, syntax: &str, help: &str) -> SdkResult<CliCmd> {
        self.new_cmd(CmdType::Config, name, syntax, help)
    }

    fn new_cmd(
        &self,
        cmd_type: CmdType,
        name: &str,
        syntax: &str,
        help: &str,
    ) -> SdkResult<CliCmd> {
        self.check("new_cmd")?;
        if name.is_empty() {
            return Err(self.backend.raise(
                ErrorKind::InvalidArg,
                MODULE,
                "new_cmd",
                "command name cannot be empty",
            ));
        }
        Ok(CliCmd::new(cmd_type, name, syntax, help))
    }

    /// Validates the schema's grammar and registers the command. Taking
    /// the command by value is what freezes the schema; the grammar
    /// rules (balanced grouping, parameter naming, reserved keywords)
    /// are checked here.
    pub fn add_to_parse_tree(&self, cmd: CliCmd) -> SdkResult<()> {
        self.check("add_to_parse_tree")?;
        let nodes = parse_syntax(&cmd.syntax).map_err(|reason| {
            self.backend
                .raise(ErrorKind::InvalidArg, MODULE, "add_to_parse_tree", reason)
        })?;
        let mut commands = self.commands.lock().unwrap();
        if commands.contains_key(&cmd.name) {
            return Err(self.backend.raise(
                ErrorKind::Exists,
                MODULE,
                "add_to_parse_tree",
                format!("command {} already registered", cmd.name),
            ));
        }
        info!(cmd = %cmd.name, syntax = %cmd.syntax, "registered CLI command");
        commands.insert(cmd.name.clone(), RegisteredCmd { cmd, nodes });
        Ok(())
    }

    /// Removes one registered command. Returns `false` if the name is
    /// unknown.
    pub fn del_from_parse_tree(&self, name: &str) -> SdkResult<bool> {
        self.check("del_from_parse_tree")?;
        Ok(self.commands.lock().unwrap().remove(name).is_some())
    }

    pub fn set_cmd_handler(&self, handler: Box<dyn CmdHandler>) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    pub fn unset_cmd_handler(&self) {
        *self.handler.lock().unwrap() = None;
    }

    pub fn has_cmd_handler(&self) -> bool {
        self.handler.lock().unwrap().is_some()
    }

    /// Human-readable dump of every registered command, mirroring
    /// `show <app> nxsdk state`.
    pub fn get_parser_status(&self) -> String {
        let commands = self.commands.lock().unwrap();
        let mut out = format!("Registered commands: {}\n", commands.len());
        let mut names: Vec<&String> = commands.keys().collect();
        names.sort();
        for name in names {
            let rc = &commands[name];
            let shape = match rc.cmd.cmd_type {
                CmdType::Show => format!("show {} {}", self.backend.app_name(), rc.cmd.syntax),
                CmdType::Config => format!("[no] {} {}", self.backend.app_name(), rc.cmd.syntax),
            };
            out.push_str(&format!("  {name}: {shape}\n"));
        }
        out
    }

    /// Matches one user input line against the registered commands and
    /// runs the handler synchronously, in the caller's thread. Returns
    /// the rendered output, or `None` when nothing matched.
    pub fn exec_cmd(&self, input: &str, format: RecordFormat) -> SdkResult<Option<String>> {
        self.check("exec_cmd")?;
        let tokens: Vec<&str> = input.split_whitespace().collect();
        let app = self.backend.app_name().to_string();

        let matched = {
            let commands = self.commands.lock().unwrap();
            let mut found = None;
            for rc in commands.values() {
                if let Some(inv) = self.try_match(rc, &app, &tokens, input) {
                    found = Some(inv);
                    break;
                }
            }
            found
        };
        let Some(mut invocation) = matched else {
            return Ok(None);
        };

        debug!(cmd = %invocation.cmd_name, "dispatching CLI invocation");
        {
            let mut slot = self.handler.lock().unwrap();
            let Some(handler) = slot.as_mut() else {
                return Err(self.backend.raise(
                    ErrorKind::InvalidUsage,
                    MODULE,
                    "exec_cmd",
                    "no command handler registered",
                ));
            };
            invoke_advisory("post_cli_cb", || handler.post_cli_cb(&mut invocation));
        }
        self.render(invocation.output, format).map(Some)
    }

    /// Strips the namespace tokens and matches the remainder against one
    /// command's grammar.
    fn try_match(
        &self,
        rc: &RegisteredCmd,
        app: &str,
        tokens: &[&str],
        input: &str,
    ) -> Option<CliInvocation> {
        let (no_cmd, rest) = match rc.cmd.cmd_type {
            CmdType::Show => {
                let rest = tokens.strip_prefix(&["show", app][..])?;
                (false, rest)
            }
            CmdType::Config => match tokens {
                ["no", rest @ ..] => (true, rest.strip_prefix(&[app][..])?),
                rest => (false, rest.strip_prefix(&[app][..])?),
            },
        };
        let mut captures = Captures::default();
        if !match_sequence(&rc.nodes, rest, &mut captures) {
            return None;
        }
        let mut params: HashMap<String, Vec<ParamValue>> = HashMap::new();
        for (name, raw) in captures.params {
            let ptype = rc.cmd.param_types.get(&name).cloned().unwrap_or_default();
            let mut values = Vec::new();
            for token in raw {
                values.push(convert_param(&token, &ptype)?);
            }
            params.insert(name, values);
        }
        Some(CliInvocation {
            cmd_name: rc.cmd.name.clone(),
            input: input.to_string(),
            no_cmd,
            keywords: captures.keywords,
            params,
            output: Vec::new(),
        })
    }

    /// Re-homes the parser on the current session. Registered commands
    /// survive a reconnect; only the session binding is refreshed.
    pub(crate) fn purge(&self) {
        self.epoch
            .store(self.backend.current_epoch(), Ordering::SeqCst);
    }

    fn render(&self, output: Vec<String>, format: RecordFormat) -> SdkResult<String> {
        match format {
            RecordFormat::Text | RecordFormat::Json => Ok(output.join("\n")),
            RecordFormat::Xml => {
                // XML is always derived from the JSON the handler printed.
                let joined = output.join("\n");
                let value: Value = serde_json::from_str(&joined).map_err(|e| {
                    self.backend.raise(
                        ErrorKind::Failure,
                        MODULE,
                        "exec_cmd",
                        format!("XML output requires JSON from the handler: {e}"),
                    )
                })?;
                Ok(json_to_xml(&value, "output"))
            }
        }
    }
}

#[derive(Default)]
struct Captures {
    keywords: HashSet<String>,
    params: HashMap<String, Vec<String>>,
}

/// Grammar validation and parse. Single-token constructs only; nesting
/// inside `[...]`, `(...)` and `{...}+` is one level of alternation.
fn parse_syntax(syntax: &str) -> Result<Vec<SyntaxNode>, String> {
    if syntax.trim().is_empty() {
        return Err("syntax cannot be empty".to_string());
    }
    let mut nodes = Vec::new();
    for token in syntax.split_whitespace() {
        nodes.push(parse_token(token)?);
    }
    Ok(nodes)
}

fn parse_token(token: &str) -> Result<SyntaxNode, String> {
    if let Some(inner) = token.strip_prefix('[') {
        let inner = inner
            .strip_suffix(']')
            .ok_or_else(|| format!("unbalanced [ in {token}"))?;
        return Ok(SyntaxNode::Optional(Box::new(parse_bare(inner)?)));
    }
    if let Some(inner) = token.strip_prefix('{') {
        let inner = inner
            .strip_suffix("}+")
            .ok_or_else(|| format!("unbalanced {{ in {token}; repetition is {{...}}+"))?;
        return Ok(SyntaxNode::RepeatPlus(Box::new(parse_bare(inner)?)));
    }
    parse_bare(token)
}

fn parse_bare(token: &str) -> Result<SyntaxNode, String> {
    if token.is_empty() {
        return Err("empty syntax element".to_string());
    }
    if let Some(inner) = token.strip_prefix('(') {
        let inner = inner
            .strip_suffix(')')
            .ok_or_else(|| format!("unbalanced ( in {token}"))?;
        let branches: Vec<SyntaxNode> = inner
            .split('|')
            .map(parse_bare)
            .collect::<Result<_, _>>()?;
        if branches.len() < 2 {
            return Err(format!("alternation needs at least two branches: {token}"));
        }
        return Ok(SyntaxNode::Alternation(branches));
    }
    if let Some(name) = token.strip_prefix('<') {
        let name = name
            .strip_suffix('>')
            .ok_or_else(|| format!("unbalanced < in {token}"))?;
        if !PARAM_NAME_RE.is_match(name) {
            return Err(format!("parameter name must match [A-Za-z0-9_-]+: {token}"));
        }
        return Ok(SyntaxNode::Param(name.to_string()));
    }
    if token == "no" || token == "show" {
        return Err(format!("{token} is a reserved keyword"));
    }
    Ok(SyntaxNode::Keyword(token.to_string()))
}

/// Backtracking match of a node sequence against the input tokens.
/// The whole token slice must be consumed.
fn match_sequence(nodes: &[SyntaxNode], tokens: &[&str], captures: &mut Captures) -> bool {
    match nodes.split_first() {
        None => tokens.is_empty(),
        Some((node, rest_nodes)) => match node {
            SyntaxNode::Keyword(kw) => match tokens.split_first() {
                Some((tok, rest_tokens)) if tok == kw => {
                    if match_sequence(rest_nodes, rest_tokens, captures) {
                        captures.keywords.insert(kw.clone());
                        true
                    } else {
                        false
                    }
                }
                _ => false,
            },
            SyntaxNode::Param(name) => match tokens.split_first() {
                Some((tok, rest_tokens)) => {
                    if match_sequence(rest_nodes, rest_tokens, captures) {
                        captures
                            .params
                            .entry(name.clone())
                            .or_default()
                            .insert(0, tok.to_string());
                        true
                    } else {
                        false
                    }
                }
                None => false,
            },
            SyntaxNode::Optional(inner) => {
                // Greedy first, then try skipping.
                let present: &[SyntaxNode] = &[(**inner).clone()];
                let mut with: Vec<SyntaxNode> = present.to_vec();
                with.extend_from_slice(rest_nodes);
                match_sequence(&with, tokens, captures)
                    || match_sequence(rest_nodes, tokens, captures)
            }
            SyntaxNode::Alternation(branches) => branches.iter().any(|branch| {
                let mut with = vec![branch.clone()];
                with.extend_from_slice(rest_nodes);
                match_sequence(&with, tokens, captures)
            }),
            SyntaxNode::RepeatPlus(inner) => {
                // One occurrence, then optionally more.
                let mut once = vec![(**inner).clone()];
                let mut more = once.clone();
                more.push(node.clone());
                more.extend_from_slice(rest_nodes);
                once.extend_from_slice(rest_nodes);
                match_sequence(&more, tokens, captures) || match_sequence(&once, tokens, captures)
            }
        },
    }
}

/// Validates a raw token against the parameter's typed constraint and
/// converts it.
fn convert_param(token: &str, ptype: &ParamType) -> Option<ParamValue> {
    match ptype {
        ParamType::Text => Some(ParamValue::Str(token.to_string())),
        ParamType::BoundedText {
            min_len,
            max_len,
            pattern,
        } => {
            if token.len() < *min_len || token.len() > *max_len {
                return None;
            }
            if let Some(pattern) = pattern {
                let re = Regex::new(pattern).ok()?;
                if !re.is_match(token) {
                    return None;
                }
            }
            Some(ParamValue::Str(token.to_string()))
        }
        ParamType::Integer { min, max } => {
            let value: i64 = token.parse().ok()?;
            (*min <= value && value <= *max).then_some(ParamValue::Int(value))
        }
        ParamType::IpAddress { prefix, v6 } => {
            if *prefix {
                let p: IpPrefix = token.parse().ok()?;
                if *v6 && p.af() != switchlink_types::Af::Ipv6 {
                    return None;
                }
                Some(ParamValue::Prefix(p))
            } else {
                let ip: IpAddr = token.parse().ok()?;
                if *v6 && ip.is_ipv4() {
                    return None;
                }
                Some(ParamValue::Ip(ip))
            }
        }
        ParamType::Interface => {
            (switchlink_types::IntfType::from_name(token) != switchlink_types::IntfType::Unknown)
                .then(|| ParamValue::Str(token.to_string()))
        }
        ParamType::MacAddress => token.parse().ok().map(ParamValue::Mac),
        ParamType::VrfName => {
            (!token.is_empty() && token.len() <= VRF_NAME_MAX)
                .then(|| ParamValue::Str(token.to_string()))
        }
    }
}

/// Derives an XML rendering from a JSON document. Arrays repeat the
/// enclosing element; scalar values become text content.
pub fn json_to_xml(value: &Value, tag: &str) -> String {
    match value {
        Value::Object(map) => {
            let mut body = String::new();
            for (key, child) in map {
                body.push_str(&json_to_xml(child, key));
            }
            format!("<{tag}>{body}</{tag}>")
        }
        Value::Array(items) => items
            .iter()
            .map(|item| json_to_xml(item, tag))
            .collect::<Vec<_>>()
            .join(""),
        Value::Null => format!("<{tag}/>"),
        Value::String(s) => format!("<{tag}>{}</{tag}>", xml_escape(s)),
        other => format!("<{tag}>{other}</{tag}>"),
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(syntax: &str) -> Vec<SyntaxNode> {
        parse_syntax(syntax).unwrap()
    }

    fn run(syntax: &str, input: &str) -> Option<Captures> {
        let mut captures = Captures::default();
        let tokens: Vec<&str> = input.split_whitespace().collect();
        match_sequence(&nodes(syntax), &tokens, &mut captures).then_some(captures)
    }

    #[test]
    fn test_grammar_validation() {
        assert!(parse_syntax("port <port-id> detail").is_ok());
        assert!(parse_syntax("port (brief|detail)").is_ok());
        assert!(parse_syntax("port [detail]").is_ok());
        assert!(parse_syntax("port {<vlan>}+").is_ok());

        assert!(parse_syntax("").is_err());
        assert!(parse_syntax("port (brief|detail").is_err());
        assert!(parse_syntax("port <bad name").is_err());
        assert!(parse_syntax("port <x y>").is_err());
        assert!(parse_syntax("no port").is_err());
        assert!(parse_syntax("show port").is_err());
        assert!(parse_syntax("port (only)").is_err());
    }

    #[test]
    fn test_match_keywords_and_params() {
        let c = run("port <port-id> detail", "port Ethernet1/1 detail").unwrap();
        assert!(c.keywords.contains("port"));
        assert!(c.keywords.contains("detail"));
        assert_eq!(c.params["port-id"], vec!["Ethernet1/1".to_string()]);

        assert!(run("port <port-id> detail", "port Ethernet1/1").is_none());
        assert!(run("port <port-id>", "port Ethernet1/1 extra").is_none());
    }

    #[test]
    fn test_match_optional_and_alternation() {
        assert!(run("port [detail]", "port").is_some());
        let c = run("port [detail]", "port detail").unwrap();
        assert!(c.keywords.contains("detail"));

        let c = run("counters (brief|full)", "counters full").unwrap();
        assert!(c.keywords.contains("full"));
        assert!(run("counters (brief|full)", "counters all").is_none());
    }

    #[test]
    fn test_match_repetition_in_order() {
        let c = run("vlan {<id>}+", "vlan 10 20 30").unwrap();
        assert_eq!(
            c.params["id"],
            vec!["10".to_string(), "20".to_string(), "30".to_string()]
        );
        assert!(run("vlan {<id>}+", "vlan").is_none());
    }

    #[test]
    fn test_param_conversion() {
        assert_eq!(
            convert_param("42", &ParamType::Integer { min: 0, max: 100 }),
            Some(ParamValue::Int(42))
        );
        assert_eq!(convert_param("200", &ParamType::Integer { min: 0, max: 100 }), None);
        assert!(matches!(
            convert_param("10.1.1.1", &ParamType::IpAddress { prefix: false, v6: false }),
            Some(ParamValue::Ip(_))
        ));
        assert_eq!(
            convert_param("10.1.1.1", &ParamType::IpAddress { prefix: false, v6: true }),
            None
        );
        assert!(matches!(
            convert_param("10.1.0.0/16", &ParamType::IpAddress { prefix: true, v6: false }),
            Some(ParamValue::Prefix(_))
        ));
        assert!(convert_param("Ethernet1/1", &ParamType::Interface).is_some());
        assert!(convert_param("???", &ParamType::Interface).is_none());
        assert!(convert_param("00:11:22:33:44:55", &ParamType::MacAddress).is_some());
    }

    #[test]
    fn test_json_to_xml() {
        let v: Value = serde_json::json!({"port": {"name": "Ethernet1/1", "vlans": [1, 2]}});
        assert_eq!(
            json_to_xml(&v, "output"),
            "<output><port><name>Ethernet1/1</name><vlans>1</vlans><vlans>2</vlans></port></output>"
        );
    }

    #[test]
    fn test_update_keyword_and_param_require_presence() {
        let mut cmd = CliCmd::new(CmdType::Show, "t", "port <port-id> (brief|detail)", "h");
        assert!(cmd.update_keyword("port", "the port"));
        assert!(cmd.update_keyword("brief", "short form"));
        assert!(!cmd.update_keyword("missing", "nope"));
        assert!(cmd.update_param("port-id", "port name", ParamType::Interface));
        assert!(!cmd.update_param("other", "nope", ParamType::Text));
    }
}
