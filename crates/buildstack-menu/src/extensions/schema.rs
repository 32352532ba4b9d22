//! Extension driven entirely by a unit's options schema.
//!
//! Schemas look like `{"labeledPorts": {"1883:1883": "mosquitto"},
//! "logging": true, "networks": true, ...}`. The hooks a unit gets depend on
//! which keys its schema carries.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::api::UnitIssue;
use crate::error::{Error, Result};
use crate::extensions::{
    CheckCtx, HookKind, HookTable, OptionsCtx, OptionsOutcome, UnitExtension,
};
use crate::settings::BuildSettings;
use crate::ui::submenu::{SubMenu, SubMenuResult};

pub const NETWORK_MODES: [&str; 3] = ["bridge", "host", "none"];

const LOGGING_KEY: &str = "loggingEnabled";
const NETWORK_KEY: &str = "networkMode";
const PORTS_KEY: &str = "ports";

pub struct SchemaExtension {
    unit_id: String,
    schema: Value,
    hooks: Vec<HookKind>,
}

impl SchemaExtension {
    pub fn new(unit_id: impl Into<String>, schema: Value) -> Self {
        let mut hooks = Vec::new();
        if flag(&schema, "logging") || flag(&schema, "networks") {
            hooks.push(HookKind::Options);
        }
        if schema.get("labeledPorts").is_some() {
            hooks.push(HookKind::RunChecks);
        }
        Self {
            unit_id: unit_id.into(),
            schema,
            hooks,
        }
    }
}

fn flag(schema: &Value, key: &str) -> bool {
    schema.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Host side of a `"host:container"` mapping.
fn host_port(mapping: &str) -> Option<u16> {
    let host = match mapping.split_once(':') {
        Some((h, _)) => h,
        None => mapping,
    };
    host.trim().parse().ok()
}

/// External ports a unit will publish: per-unit `ports` settings win over
/// the schema's `labeledPorts`.
pub(crate) fn external_ports(
    unit_id: &str,
    settings: &BuildSettings,
    schemas: &BTreeMap<String, Value>,
) -> Vec<u16> {
    let configured = settings
        .unit(unit_id)
        .and_then(|t| t.get(PORTS_KEY))
        .and_then(toml::Value::as_array);
    let mut ports: Vec<u16> = match configured {
        Some(arr) => arr
            .iter()
            .filter_map(toml::Value::as_str)
            .filter_map(host_port)
            .collect(),
        None => schemas
            .get(unit_id)
            .and_then(|s| s.get("labeledPorts"))
            .and_then(Value::as_object)
            .map(|m| m.keys().filter_map(|k| host_port(k)).collect())
            .unwrap_or_default(),
    };
    ports.sort_unstable();
    ports.dedup();
    ports
}

/// One `port-conflict` issue per port this unit shares with another
/// selected unit.
pub(crate) fn port_conflicts(ctx: &CheckCtx<'_>) -> Vec<UnitIssue> {
    let mine = external_ports(ctx.unit_id, ctx.settings, ctx.schemas);
    let mut issues = Vec::new();
    for other in ctx.selection.iter().filter(|s| *s != ctx.unit_id) {
        let theirs = external_ports(other, ctx.settings, ctx.schemas);
        for port in mine.iter().filter(|p| theirs.contains(p)) {
            issues.push(UnitIssue::new(
                ctx.unit_id,
                "port-conflict",
                format!("External port {port} is also used by '{other}'"),
            ));
        }
    }
    issues
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    Logging,
    Network,
    Back,
}

impl HookTable for SchemaExtension {
    fn unit_id(&self) -> &str {
        &self.unit_id
    }

    fn declared_hooks(&self) -> &[HookKind] {
        &self.hooks
    }
}

impl UnitExtension for SchemaExtension {
    fn integrity(&self) -> Result<()> {
        if !self.schema.is_object() {
            return Err(Error::discovery(format!(
                "options schema for '{}' is not an object",
                self.unit_id
            )));
        }
        match self.schema.get("labeledPorts") {
            None | Some(Value::Object(_)) => Ok(()),
            Some(_) => Err(Error::discovery(format!(
                "labeledPorts for '{}' must be an object",
                self.unit_id
            ))),
        }
    }

    fn options(&mut self, ctx: &mut OptionsCtx<'_>) -> Result<OptionsOutcome> {
        let mut changed = false;
        loop {
            let mut menu = SubMenu::new(format!("{} options", self.unit_id));
            if flag(&self.schema, "logging") {
                let on = ctx
                    .settings
                    .get(LOGGING_KEY)
                    .and_then(toml::Value::as_bool)
                    .unwrap_or(false);
                menu = menu.entry(
                    format!("Logging: {}", if on { "enabled" } else { "disabled" }),
                    Choice::Logging,
                );
            }
            if flag(&self.schema, "networks") {
                let mode = ctx
                    .settings
                    .get(NETWORK_KEY)
                    .and_then(toml::Value::as_str)
                    .unwrap_or(NETWORK_MODES[0])
                    .to_string();
                menu = menu.entry(format!("Network mode: {mode}"), Choice::Network);
            }
            menu = menu.entry("Go back", Choice::Back);

            match menu.run(&mut *ctx.frontend)? {
                SubMenuResult::Chosen(Choice::Logging) => {
                    let on = ctx
                        .settings
                        .get(LOGGING_KEY)
                        .and_then(toml::Value::as_bool)
                        .unwrap_or(false);
                    ctx.settings
                        .insert(LOGGING_KEY.into(), toml::Value::Boolean(!on));
                    changed = true;
                }
                SubMenuResult::Chosen(Choice::Network) => {
                    let current = ctx
                        .settings
                        .get(NETWORK_KEY)
                        .and_then(toml::Value::as_str)
                        .unwrap_or(NETWORK_MODES[0]);
                    let idx = NETWORK_MODES
                        .iter()
                        .position(|m| *m == current)
                        .map(|i| (i + 1) % NETWORK_MODES.len())
                        .unwrap_or(0);
                    ctx.settings.insert(
                        NETWORK_KEY.into(),
                        toml::Value::String(NETWORK_MODES[idx].into()),
                    );
                    changed = true;
                }
                SubMenuResult::Chosen(Choice::Back) | SubMenuResult::Back => {
                    return Ok(OptionsOutcome { changed });
                }
            }
        }
    }

    fn run_checks(&self, ctx: &CheckCtx<'_>) -> Result<Vec<UnitIssue>> {
        Ok(port_conflicts(ctx))
    }
}
