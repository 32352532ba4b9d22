//! Per-unit extensions and the capability discovery probe.
//!
//! A unit extension declares which of the four optional hooks it
//! implements (`HookTable`, usually generated by `#[Extension]`) and
//! provides the hook bodies (`UnitExtension`). The menu probes the
//! declarations once per catalog load and only ever calls hooks that were
//! discovered.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::api::{BuildRequest, UnitIssue};
use crate::error::{Error, Result};
use crate::menu::registry::Registry;
use crate::settings::BuildSettings;
use crate::ui::frontend::Frontend;

pub mod otbr;
pub mod schema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HookKind {
    Options,
    PreBuild,
    PostBuild,
    RunChecks,
}

impl HookKind {
    pub const ALL: [HookKind; 4] = [
        HookKind::Options,
        HookKind::PreBuild,
        HookKind::PostBuild,
        HookKind::RunChecks,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HookKind::Options => "options",
            HookKind::PreBuild => "preBuild",
            HookKind::PostBuild => "postBuild",
            HookKind::RunChecks => "runChecks",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which hooks a unit's extension implements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub options: bool,
    pub pre_build: bool,
    pub post_build: bool,
    pub run_checks: bool,
}

impl Capabilities {
    pub fn has(&self, hook: HookKind) -> bool {
        match hook {
            HookKind::Options => self.options,
            HookKind::PreBuild => self.pre_build,
            HookKind::PostBuild => self.post_build,
            HookKind::RunChecks => self.run_checks,
        }
    }

    fn set(&mut self, hook: HookKind, on: bool) {
        match hook {
            HookKind::Options => self.options = on,
            HookKind::PreBuild => self.pre_build = on,
            HookKind::PostBuild => self.post_build = on,
            HookKind::RunChecks => self.run_checks = on,
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        HookKind::ALL
            .into_iter()
            .filter(|h| self.has(*h))
            .map(HookKind::name)
            .collect()
    }
}

pub trait HookTable {
    fn unit_id(&self) -> &str;
    fn declared_hooks(&self) -> &[HookKind];
}

/// Returned by an options sub-menu to its parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionsOutcome {
    pub changed: bool,
}

pub struct OptionsCtx<'a> {
    pub frontend: &'a mut dyn Frontend,
    /// Options schema for this unit, as served by the catalog.
    pub schema: Option<&'a Value>,
    /// This unit's persisted settings; edits are saved by the caller.
    pub settings: &'a mut toml::Table,
}

pub struct CheckCtx<'a> {
    pub unit_id: &'a str,
    pub selection: &'a [String],
    pub settings: &'a BuildSettings,
    pub schemas: &'a BTreeMap<String, Value>,
}

fn undeclared(unit_id: &str, hook: HookKind) -> Error {
    Error::discovery(format!("unit '{unit_id}' does not implement the {hook} hook"))
}

pub trait UnitExtension: HookTable {
    /// Probe for structural problems. Errors make the unit's discovery fail.
    fn integrity(&self) -> Result<()> {
        Ok(())
    }

    fn options(&mut self, _ctx: &mut OptionsCtx<'_>) -> Result<OptionsOutcome> {
        Err(undeclared(self.unit_id(), HookKind::Options))
    }

    /// `false` vetoes the build.
    fn pre_build(&mut self, _settings: &toml::Table, _request: &mut BuildRequest) -> Result<bool> {
        Err(undeclared(self.unit_id(), HookKind::PreBuild))
    }

    fn post_build(&mut self) -> Result<bool> {
        Err(undeclared(self.unit_id(), HookKind::PostBuild))
    }

    fn run_checks(&self, _ctx: &CheckCtx<'_>) -> Result<Vec<UnitIssue>> {
        Err(undeclared(self.unit_id(), HookKind::RunChecks))
    }
}

/// Extensions keyed by unit id.
#[derive(Default)]
pub struct ExtensionSet {
    by_unit: BTreeMap<String, Box<dyn UnitExtension>>,
}

impl ExtensionSet {
    pub fn insert(&mut self, key: impl Into<String>, ext: Box<dyn UnitExtension>) {
        self.by_unit.insert(key.into(), ext);
    }

    pub fn get(&self, unit_id: &str) -> Option<&dyn UnitExtension> {
        self.by_unit.get(unit_id).map(|b| b.as_ref())
    }

    pub fn get_mut(&mut self, unit_id: &str) -> Option<&mut (dyn UnitExtension + 'static)> {
        self.by_unit.get_mut(unit_id).map(|b| b.as_mut())
    }

    pub fn len(&self) -> usize {
        self.by_unit.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_unit.is_empty()
    }
}

/// Builds the extension set for a catalog from its options schemas.
pub type ExtensionFactory = fn(&BTreeMap<String, Value>) -> ExtensionSet;

pub fn builtin_extensions(schemas: &BTreeMap<String, Value>) -> ExtensionSet {
    let mut set = ExtensionSet::default();
    for (unit_id, schema) in schemas {
        if unit_id == otbr::OtbrExtension::UNIT_ID {
            set.insert(unit_id, Box::new(otbr::OtbrExtension::from_schema(schema)));
        } else {
            set.insert(
                unit_id,
                Box::new(schema::SchemaExtension::new(unit_id, schema.clone())),
            );
        }
    }
    set
}

/// Resolve each hook name against the extension's declarations.
pub fn probe(ext: &dyn UnitExtension) -> Result<Capabilities> {
    ext.integrity()?;
    let declared = ext.declared_hooks();
    let mut caps = Capabilities::default();
    for hook in HookKind::ALL {
        let n = declared.iter().filter(|h| **h == hook).count();
        if n > 1 {
            return Err(Error::discovery(format!(
                "unit '{}' declares the {hook} hook {n} times",
                ext.unit_id()
            )));
        }
        caps.set(hook, n == 1);
    }
    Ok(caps)
}

#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// One entry per registry item; units without an extension (or whose
    /// probe failed) have no capabilities.
    pub capabilities: BTreeMap<String, Capabilities>,
    pub errors: Vec<Error>,
}

/// Probe every menu item's extension. A failing unit is recorded and the
/// rest of the catalog is still probed.
pub fn discover(registry: &Registry, extensions: &ExtensionSet) -> DiscoveryReport {
    let mut report = DiscoveryReport::default();
    for item in registry.items() {
        let id = item.unit_id.as_str();
        let caps = match extensions.get(id) {
            None => Capabilities::default(),
            Some(ext) if ext.unit_id() != id => {
                report.errors.push(Error::discovery(format!(
                    "extension registered for '{id}' reports unit id '{}'",
                    ext.unit_id()
                )));
                Capabilities::default()
            }
            Some(ext) => match probe(ext) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(unit = id, error = %e, "capability probe failed");
                    report.errors.push(e);
                    Capabilities::default()
                }
            },
        };
        report.capabilities.insert(id.to_string(), caps);
    }
    tracing::info!(
        units = report.capabilities.len(),
        errors = report.errors.len(),
        "capability discovery finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildstack_menu_macros::Extension;
    use serde_json::json;

    #[Extension(id = "probe-me", hooks = [pre_build, run_checks])]
    struct Partial;

    impl UnitExtension for Partial {
        fn pre_build(&mut self, _s: &toml::Table, _r: &mut BuildRequest) -> Result<bool> {
            Ok(true)
        }

        fn run_checks(&self, _ctx: &CheckCtx<'_>) -> Result<Vec<UnitIssue>> {
            Ok(Vec::new())
        }
    }

    struct Doubled;

    impl HookTable for Doubled {
        fn unit_id(&self) -> &str {
            "doubled"
        }

        fn declared_hooks(&self) -> &[HookKind] {
            &[HookKind::Options, HookKind::Options]
        }
    }

    impl UnitExtension for Doubled {}

    #[test]
    fn macro_declares_only_listed_hooks() {
        let caps = probe(&Partial).unwrap();
        assert_eq!(
            caps,
            Capabilities {
                options: false,
                pre_build: true,
                post_build: false,
                run_checks: true,
            }
        );
        assert_eq!(caps.names(), vec!["preBuild", "runChecks"]);
        assert_eq!(Partial::UNIT_ID, "probe-me");
    }

    #[test]
    fn calling_an_undeclared_hook_errors() {
        let mut p = Partial;
        let err = p.post_build().unwrap_err();
        assert!(err.to_string().contains("postBuild"));
    }

    #[test]
    fn discovery_collects_errors_and_keeps_going() {
        let entries = vec![
            json!({"unitId": "doubled", "displayLabel": "D"}),
            json!({"unitId": "probe-me", "displayLabel": "P"}),
            json!({"unitId": "bare", "displayLabel": "B"}),
            json!({"unitId": "liar", "displayLabel": "L"}),
        ];
        let reg = Registry::load(&entries, &[]).registry;
        let mut set = ExtensionSet::default();
        set.insert("doubled", Box::new(Doubled));
        set.insert("probe-me", Box::new(Partial));
        set.insert("liar", Box::new(Partial));

        let report = discover(&reg, &set);
        assert_eq!(report.errors.len(), 2);
        assert!(report.capabilities["probe-me"].pre_build);
        assert_eq!(report.capabilities["doubled"], Capabilities::default());
        assert_eq!(report.capabilities["bare"], Capabilities::default());
        assert_eq!(report.capabilities["liar"], Capabilities::default());
    }
}
