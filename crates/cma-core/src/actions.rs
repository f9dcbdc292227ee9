//! Translation of control-plane action payloads into typed batches.
//!
//! Two wire shapes are accepted. The action list:
//!
//! ```json
//! [{"type": "config",
//!   "configs": {"telegraf": [{"id": "a1", "config_file_id": "main", "contents": "<b64>"}]}},
//!  {"type": "command",
//!   "commands": [{"id": "c1", "collector": "telegraf", "command": "restart"}]}]
//! ```
//!
//! and the control plane's native assignment list, which is folded into a
//! single config action:
//!
//! ```json
//! [{"config_assignment_id": "a1",
//!   "configuration": {"config_file_id": "main", "config": "<b64>"},
//!   "collector": {"collector_type_id": "telegraf"}}]
//! ```
//!
//! Items that are malformed or cannot be resolved against the inventory are
//! dropped with a warning; their siblings are still processed. Only a payload
//! with nothing installable left is an error.

use crate::error::{AgentError, Result};
use crate::inventory::Collectors;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

// ---------------------------------------------------------------------------
// Typed actions
// ---------------------------------------------------------------------------

/// One configuration file to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Assignment id, correlates the result and drift reports.
    pub id: String,
    pub path: PathBuf,
    /// Base64 encoded file contents.
    pub contents: String,
}

/// Configs to install, keyed by collector name.
pub type ConfigBatch = BTreeMap<String, Vec<Config>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandVerb {
    Start,
    Stop,
    Restart,
    Status,
    Version,
    Reload,
    Inventory,
}

impl CommandVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandVerb::Start => "start",
            CommandVerb::Stop => "stop",
            CommandVerb::Restart => "restart",
            CommandVerb::Status => "status",
            CommandVerb::Version => "version",
            CommandVerb::Reload => "reload",
            CommandVerb::Inventory => "inventory",
        }
    }
}

impl fmt::Display for CommandVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandVerb {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Ok(CommandVerb::Start),
            "stop" => Ok(CommandVerb::Stop),
            "restart" => Ok(CommandVerb::Restart),
            "status" => Ok(CommandVerb::Status),
            "version" => Ok(CommandVerb::Version),
            "reload" => Ok(CommandVerb::Reload),
            "inventory" => Ok(CommandVerb::Inventory),
            other => Err(AgentError::UnknownTarget(format!("command '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub id: String,
    pub collector: String,
    pub verb: CommandVerb,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Config(ConfigBatch),
    Command(Vec<Command>),
}

impl Action {
    fn item_count(&self) -> usize {
        match self {
            Action::Config(batch) => batch.values().map(Vec::len).sum(),
            Action::Command(cmds) => cmds.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WireAction {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    configs: BTreeMap<String, Vec<Value>>,
    #[serde(default)]
    commands: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct WireConfig {
    id: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    config_file_id: Option<String>,
    #[serde(default)]
    contents: String,
}

#[derive(Debug, Deserialize)]
struct WireCommand {
    id: String,
    #[serde(default)]
    collector: String,
    command: String,
}

#[derive(Debug, Deserialize)]
struct WireAssignment {
    config_assignment_id: String,
    configuration: WireConfiguration,
    collector: WireCollectorRef,
}

#[derive(Debug, Deserialize)]
struct WireConfiguration {
    config_file_id: String,
    #[serde(default)]
    config: String,
}

#[derive(Debug, Deserialize)]
struct WireCollectorRef {
    collector_type_id: String,
}

// ---------------------------------------------------------------------------
// translate
// ---------------------------------------------------------------------------

/// Translate a raw payload into actions resolvable against `collectors`.
pub fn translate(raw: &[u8], collectors: &Collectors) -> Result<Vec<Action>> {
    let value: serde_json::Value = serde_json::from_slice(raw)
        .map_err(|e| AgentError::Parse(format!("action payload: {e}")))?;

    let items = value
        .as_array()
        .ok_or_else(|| AgentError::Parse("action payload is not a list".to_string()))?;

    let is_assignments = items
        .first()
        .and_then(|v| v.as_object())
        .is_some_and(|o| o.contains_key("config_assignment_id"));

    let actions = if is_assignments {
        translate_assignments(parse_items(items, "assignment"), collectors)
    } else {
        translate_actions(parse_items(items, "action"), collectors)
    };

    if actions.iter().map(Action::item_count).sum::<usize>() == 0 {
        return Err(AgentError::NothingToDo);
    }
    Ok(actions)
}

/// Deserialize each element on its own, dropping the ones that do not fit.
fn parse_items<'a, T: DeserializeOwned>(
    items: impl IntoIterator<Item = &'a Value>,
    what: &str,
) -> Vec<T> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match T::deserialize(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(index, error = %e, "malformed {what}, dropping");
                None
            }
        })
        .collect()
}

fn translate_actions(wire: Vec<WireAction>, collectors: &Collectors) -> Vec<Action> {
    let mut actions = Vec::new();

    for action in wire {
        match action.kind.to_ascii_lowercase().as_str() {
            "config" => {
                let batch = resolve_configs(action.configs, collectors);
                if !batch.is_empty() {
                    actions.push(Action::Config(batch));
                }
            }
            "command" => {
                let cmds = resolve_commands(action.commands, collectors);
                if !cmds.is_empty() {
                    actions.push(Action::Command(cmds));
                }
            }
            other => warn!(kind = other, "unknown action type, dropping"),
        }
    }
    actions
}

fn resolve_configs(configs: BTreeMap<String, Vec<Value>>, collectors: &Collectors) -> ConfigBatch {
    let mut batch = ConfigBatch::new();

    for (name, items) in configs {
        let items: Vec<WireConfig> = parse_items(&items, "config");
        let Some(collector) = collectors.get(&name) else {
            let ids: Vec<&str> = items.iter().map(|c| c.id.as_str()).collect();
            warn!(
                collector = %name,
                ids = ?ids,
                "unknown collector for this platform, dropping configs"
            );
            continue;
        };

        for item in items {
            let path = match item.config_file_id.as_deref() {
                Some(file_id) => match collector.config_files.get(file_id) {
                    Some(p) => p.clone(),
                    None => {
                        warn!(
                            collector = %name,
                            id = %item.id,
                            config_file_id = file_id,
                            "unknown config file id, dropping"
                        );
                        continue;
                    }
                },
                None => item.path,
            };
            if path.is_empty() {
                warn!(collector = %name, id = %item.id, "config has no path, dropping");
                continue;
            }
            batch.entry(name.clone()).or_default().push(Config {
                id: item.id,
                path: PathBuf::from(path),
                contents: item.contents,
            });
        }
    }
    batch
}

fn resolve_commands(commands: Vec<Value>, collectors: &Collectors) -> Vec<Command> {
    let mut out = Vec::new();

    for cmd in parse_items::<WireCommand>(&commands, "command") {
        let verb = match cmd.command.parse::<CommandVerb>() {
            Ok(v) => v,
            Err(_) => {
                warn!(
                    id = %cmd.id,
                    collector = %cmd.collector,
                    command = %cmd.command,
                    "unknown command, dropping"
                );
                continue;
            }
        };
        if verb != CommandVerb::Inventory && !collectors.contains_key(&cmd.collector) {
            warn!(
                id = %cmd.id,
                collector = %cmd.collector,
                command = %verb,
                "unknown collector for command, dropping"
            );
            continue;
        }
        out.push(Command {
            id: cmd.id,
            collector: cmd.collector,
            verb,
        });
    }
    out
}

fn translate_assignments(wire: Vec<WireAssignment>, collectors: &Collectors) -> Vec<Action> {
    let mut batch = ConfigBatch::new();

    for a in wire {
        let name = a.collector.collector_type_id;
        let Some(collector) = collectors.get(&name) else {
            warn!(
                collector = %name,
                id = %a.config_assignment_id,
                "unknown collector for this platform, dropping"
            );
            continue;
        };
        let file_id = a.configuration.config_file_id;
        let Some(path) = collector.config_files.get(&file_id) else {
            warn!(
                collector = %name,
                id = %a.config_assignment_id,
                config_file_id = %file_id,
                "unknown config file id, dropping"
            );
            continue;
        };
        batch.entry(name).or_default().push(Config {
            id: a.config_assignment_id,
            path: PathBuf::from(path),
            contents: a.configuration.config,
        });
    }

    if batch.is_empty() {
        Vec::new()
    } else {
        vec![Action::Config(batch)]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
