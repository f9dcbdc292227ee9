use crate::error::{AgentError, Result};
use crate::platform::Platform;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// ReloadDescriptor
// ---------------------------------------------------------------------------

static UNIT_RE: OnceLock<Regex> = OnceLock::new();

fn unit_re() -> &'static Regex {
    UNIT_RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9._-]+$").unwrap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
        }
    }
}

/// How a collector picks up a new configuration, parsed once from the
/// inventory's `reload` string.
///
/// Accepted forms, first match wins:
///
/// | raw                     | variant        |
/// |-------------------------|----------------|
/// | `""`                    | `None`         |
/// | `restart`               | `Restart`      |
/// | `http|METHOD|BODY|URL`  | `Http`         |
/// | `systemd|<unit>`        | `SystemdUnit`  |
/// | `brew|<formula>`        | `BrewFormula`  |
/// | anything else           | `RawCommand`   |
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReloadDescriptor {
    /// The collector watches its own config files.
    #[default]
    None,
    Restart,
    Http {
        method: HttpMethod,
        body: String,
        url: String,
    },
    SystemdUnit {
        name: String,
    },
    BrewFormula {
        formula: String,
    },
    RawCommand {
        cmd: String,
    },
    /// Unusable descriptor; surfaces as `InvalidDescriptor` when a reload is attempted.
    Invalid {
        raw: String,
        reason: String,
    },
}

impl ReloadDescriptor {
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            return ReloadDescriptor::None;
        }
        if raw.eq_ignore_ascii_case("restart") {
            return ReloadDescriptor::Restart;
        }
        if strip_prefix_ignore_case(raw, "http").is_some() {
            return parse_http(raw);
        }
        if let Some(rest) = strip_prefix_ignore_case(raw, "systemd") {
            let Some(name) = rest.strip_prefix('|') else {
                return invalid(raw, "expected 'systemd|<unit>'".to_string());
            };
            if !unit_re().is_match(name) {
                return invalid(raw, format!("unit name '{name}' is not a valid service name"));
            }
            return ReloadDescriptor::SystemdUnit {
                name: name.to_string(),
            };
        }
        if let Some(rest) = strip_prefix_ignore_case(raw, "brew") {
            let Some(formula) = rest.strip_prefix('|') else {
                return invalid(raw, "expected 'brew|<formula>'".to_string());
            };
            if formula.trim().is_empty() {
                return invalid(raw, "missing formula after separator".to_string());
            }
            return ReloadDescriptor::BrewFormula {
                formula: formula.to_string(),
            };
        }
        ReloadDescriptor::RawCommand {
            cmd: raw.to_string(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ReloadDescriptor::None)
    }
}

fn strip_prefix_ignore_case<'a>(raw: &'a str, prefix: &str) -> Option<&'a str> {
    raw.get(..prefix.len())
        .filter(|p| p.eq_ignore_ascii_case(prefix))
        .map(|_| &raw[prefix.len()..])
}

fn invalid(raw: &str, reason: String) -> ReloadDescriptor {
    ReloadDescriptor::Invalid {
        raw: raw.to_string(),
        reason,
    }
}

fn parse_http(raw: &str) -> ReloadDescriptor {
    let parts: Vec<&str> = raw.splitn(4, '|').collect();
    if parts.len() != 4 {
        return invalid(
            raw,
            format!("expected 4 '|' separated fields, found {}", parts.len()),
        );
    }
    let method = match parts[1].to_ascii_uppercase().as_str() {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        other => return invalid(raw, format!("unsupported method '{other}'")),
    };
    let url = parts[3];
    if let Err(e) = reqwest::Url::parse(url) {
        return invalid(raw, format!("invalid url '{url}': {e}"));
    }
    ReloadDescriptor::Http {
        method,
        body: parts[2].to_string(),
        url: url.to_string(),
    }
}

impl From<String> for ReloadDescriptor {
    fn from(raw: String) -> Self {
        ReloadDescriptor::parse(&raw)
    }
}

impl From<ReloadDescriptor> for String {
    fn from(d: ReloadDescriptor) -> Self {
        d.to_string()
    }
}

impl fmt::Display for ReloadDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadDescriptor::None => Ok(()),
            ReloadDescriptor::Restart => f.write_str("restart"),
            ReloadDescriptor::Http { method, body, url } => {
                write!(f, "http|{}|{body}|{url}", method.as_str())
            }
            ReloadDescriptor::SystemdUnit { name } => write!(f, "systemd|{name}"),
            ReloadDescriptor::BrewFormula { formula } => write!(f, "brew|{formula}"),
            ReloadDescriptor::RawCommand { cmd } => f.write_str(cmd),
            ReloadDescriptor::Invalid { raw, .. } => f.write_str(raw),
        }
    }
}

// ---------------------------------------------------------------------------
// Collector / Inventory
// ---------------------------------------------------------------------------

/// One collector definition for the current platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collector {
    /// config file id -> absolute path
    #[serde(default)]
    pub config_files: BTreeMap<String, String>,
    #[serde(default)]
    pub binary: String,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub stop: String,
    #[serde(default)]
    pub restart: String,
    #[serde(default, skip_serializing_if = "ReloadDescriptor::is_none")]
    pub reload: ReloadDescriptor,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub version: String,
}

pub type Collectors = BTreeMap<String, Collector>;

/// Known collectors keyed by platform (`linux`, `darwin`, ...) then name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory(pub BTreeMap<String, Collectors>);

impl Inventory {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Inventory(format!("loading {}: {e}", path.display()))
        })?;
        serde_yaml::from_str(&data)
            .map_err(|e| AgentError::Inventory(format!("parsing {}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::write_private(path, data.as_bytes())
    }

    /// Collectors defined for `platform`; empty when the platform is absent.
    pub fn for_platform(&self, platform: &Platform) -> Collectors {
        self.0.get(platform.key()).cloned().unwrap_or_default()
    }

    pub fn collector(&self, platform: &Platform, name: &str) -> Result<&Collector> {
        self.0
            .get(platform.key())
            .and_then(|c| c.get(name))
            .ok_or_else(|| {
                AgentError::UnknownTarget(format!("collector '{name}' on platform {platform}"))
            })
    }
}

// ---------------------------------------------------------------------------
// InstalledCollectors (agents.yaml)
// ---------------------------------------------------------------------------

/// A collector found on this host and registered with the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledCollector {
    /// Control-plane id of this collector instance.
    pub collector_id: String,
    /// Inventory name, e.g. `telegraf`.
    pub collector_type_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstalledCollectors(pub Vec<InstalledCollector>);

impl InstalledCollectors {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Inventory(format!(
                "loading installed collectors {}: {e}",
                path.display()
            ))
        })?;
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::write_private(path, data.as_bytes())
    }

    pub fn id_for_type(&self, collector_type: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|c| c.collector_type_id == collector_type)
            .map(|c| c.collector_id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstalledCollector> {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_is_none() {
        assert_eq!(ReloadDescriptor::parse(""), ReloadDescriptor::None);
    }

    #[test]
    fn parse_restart_any_case() {
        assert_eq!(ReloadDescriptor::parse("RESTART"), ReloadDescriptor::Restart);
        assert_eq!(ReloadDescriptor::parse("Restart"), ReloadDescriptor::Restart);
    }

    #[test]
    fn parse_http_post_empty_body() {
        let d = ReloadDescriptor::parse("http|post||http://localhost:2020/api/v2/reload");
        assert_eq!(
            d,
            ReloadDescriptor::Http {
                method: HttpMethod::Post,
                body: String::new(),
                url: "http://localhost:2020/api/v2/reload".to_string(),
            }
        );
    }

    #[test]
    fn parse_http_wrong_field_count_is_invalid() {
        let d = ReloadDescriptor::parse("http|post|http://localhost/reload");
        assert!(matches!(d, ReloadDescriptor::Invalid { .. }));
    }

    #[test]
    fn parse_http_bad_method_is_invalid() {
        let d = ReloadDescriptor::parse("HTTP|DELETE||http://localhost/reload");
        match d {
            ReloadDescriptor::Invalid { reason, .. } => assert!(reason.contains("DELETE")),
            other => panic!("expected invalid, got {other:?}"),
        }
    }

    #[test]
    fn parse_systemd_unit() {
        assert_eq!(
            ReloadDescriptor::parse("systemd|telegraf"),
            ReloadDescriptor::SystemdUnit {
                name: "telegraf".to_string()
            }
        );
        assert!(matches!(
            ReloadDescriptor::parse("systemd|tele graf; rm -rf /"),
            ReloadDescriptor::Invalid { .. }
        ));
        assert!(matches!(
            ReloadDescriptor::parse("systemd|"),
            ReloadDescriptor::Invalid { .. }
        ));
    }

    #[test]
    fn parse_service_prefixes_any_case() {
        assert_eq!(
            ReloadDescriptor::parse("SYSTEMD|telegraf"),
            ReloadDescriptor::SystemdUnit {
                name: "telegraf".to_string()
            }
        );
        assert_eq!(
            ReloadDescriptor::parse("Brew|telegraf"),
            ReloadDescriptor::BrewFormula {
                formula: "telegraf".to_string()
            }
        );
        assert!(matches!(
            ReloadDescriptor::parse("Systemd|tele graf; rm -rf /"),
            ReloadDescriptor::Invalid { .. }
        ));
    }

    #[test]
    fn parse_bare_service_prefix_is_invalid() {
        for raw in ["systemd", "brew", "SYSTEMD telegraf", "brewtelegraf"] {
            assert!(
                matches!(ReloadDescriptor::parse(raw), ReloadDescriptor::Invalid { .. }),
                "{raw} should be invalid"
            );
        }
    }

    #[test]
    fn parse_brew_and_raw() {
        assert_eq!(
            ReloadDescriptor::parse("brew|fluent-bit"),
            ReloadDescriptor::BrewFormula {
                formula: "fluent-bit".to_string()
            }
        );
        assert_eq!(
            ReloadDescriptor::parse("pkill -HUP vector"),
            ReloadDescriptor::RawCommand {
                cmd: "pkill -HUP vector".to_string()
            }
        );
    }

    #[test]
    fn inventory_yaml_parses_descriptors() {
        let yaml = r#"
linux:
  fluent-bit:
    binary: /opt/fluent-bit/bin/fluent-bit
    restart: systemctl restart fluent-bit
    reload: "http|post||http://localhost:2020/api/v2/reload"
    status: systemctl status fluent-bit
    config_files:
      main: /etc/fluent-bit/fluent-bit.conf
  telegraf:
    binary: /usr/bin/telegraf
    reload: systemd|telegraf
darwin:
  telegraf:
    binary: /opt/homebrew/bin/telegraf
    reload: brew|telegraf
"#;
        let inv: Inventory = serde_yaml::from_str(yaml).unwrap();
        let linux = inv.for_platform(&Platform::Linux);
        assert_eq!(linux.len(), 2);
        assert!(matches!(
            linux["fluent-bit"].reload,
            ReloadDescriptor::Http {
                method: HttpMethod::Post,
                ..
            }
        ));
        assert_eq!(
            linux["fluent-bit"].config_files["main"],
            "/etc/fluent-bit/fluent-bit.conf"
        );
        assert!(inv.collector(&Platform::Darwin, "fluent-bit").is_err());
        assert!(inv.for_platform(&Platform::Other("windows".into())).is_empty());
    }

    #[test]
    fn inventory_save_load_keeps_raw_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("inventory.yaml");
        let mut linux = Collectors::new();
        linux.insert(
            "fluent-bit".to_string(),
            Collector {
                reload: ReloadDescriptor::parse("http|POST||http://localhost:2020/api/v2/reload"),
                ..Collector::default()
            },
        );
        let inv = Inventory(BTreeMap::from([("linux".to_string(), linux)]));
        inv.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("http|POST||http://localhost:2020/api/v2/reload"));
        assert_eq!(Inventory::load(&path).unwrap(), inv);
    }

    #[test]
    fn missing_inventory_is_inventory_error() {
        let err = Inventory::load(Path::new("/nonexistent/inventory.yaml")).unwrap_err();
        assert!(matches!(err, AgentError::Inventory(_)));
    }

    #[test]
    fn installed_lookup_by_type() {
        let installed = InstalledCollectors(vec![InstalledCollector {
            collector_id: "c-123".to_string(),
            collector_type_id: "telegraf".to_string(),
        }]);
        assert_eq!(installed.id_for_type("telegraf"), Some("c-123"));
        assert_eq!(installed.id_for_type("vector"), None);
    }
}
