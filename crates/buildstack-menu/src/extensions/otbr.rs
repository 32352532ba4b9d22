//! OpenThread border router: picks the Thread radio the container talks to.

use std::fs;

use buildstack_menu_macros::Extension;
use serde_json::Value;

use crate::api::{BuildRequest, UnitIssue};
use crate::error::Result;
use crate::extensions::schema::port_conflicts;
use crate::extensions::{CheckCtx, OptionsCtx, OptionsOutcome, UnitExtension};
use crate::ui::submenu::{SubMenu, SubMenuResult};

const HARDWARE_KEY: &str = "hardware";
const RADIO_URL_PREFIX: &str = "--radio-url spinel+hdlc+uart://";
const DEVICE_PREFIXES: [&str; 2] = ["ttyACM", "ttyUSB"];

pub const NO_RADIO: &str = "No Thread radio selected.";
pub const MANY_RADIOS: &str =
    "Two or more thread radios selected. The first listed one will be used";

#[Extension(id = "otbr", hooks = [options, pre_build, post_build, run_checks])]
pub struct OtbrExtension {
    candidates: Vec<String>,
}

impl OtbrExtension {
    /// Candidate radios come from the schema's `hardware` list, falling back
    /// to the serial devices present under `/dev`.
    pub fn from_schema(schema: &Value) -> Self {
        let listed: Vec<String> = schema
            .get(HARDWARE_KEY)
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if listed.is_empty() {
            Self::with_candidates(scan_serial_devices())
        } else {
            Self::with_candidates(listed)
        }
    }

    pub fn with_candidates(candidates: Vec<String>) -> Self {
        Self { candidates }
    }

    /// Multi-select over the candidate devices. Returns whether the stored
    /// selection changed.
    fn pick_hardware(&self, ctx: &mut OptionsCtx<'_>) -> Result<bool> {
        let mut changed = false;
        loop {
            let selected = selected_hardware(ctx.settings);
            let mut menu = SubMenu::new("Select Thread radio hardware")
                .note("Select the radio the border router should use.");
            if self.candidates.is_empty() {
                menu = menu.heading("No serial devices found");
            }
            for (i, dev) in self.candidates.iter().enumerate() {
                let mark = if selected.contains(dev) { "(X)" } else { "( )" };
                menu = menu.entry(format!("{mark} {dev}"), Some(i));
            }
            menu = menu.entry("Done", None);

            match menu.run(&mut *ctx.frontend)? {
                SubMenuResult::Chosen(Some(i)) => {
                    let dev = &self.candidates[i];
                    let mut next = selected.clone();
                    if let Some(pos) = next.iter().position(|d| d == dev) {
                        next.remove(pos);
                    } else {
                        next.push(dev.clone());
                    }
                    ctx.settings.insert(
                        HARDWARE_KEY.into(),
                        toml::Value::Array(next.into_iter().map(toml::Value::String).collect()),
                    );
                    changed = true;
                }
                SubMenuResult::Chosen(None) | SubMenuResult::Back => return Ok(changed),
            }
        }
    }
}

fn scan_serial_devices() -> Vec<String> {
    let Ok(rd) = fs::read_dir("/dev") else {
        return Vec::new();
    };
    let mut out: Vec<String> = rd
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| DEVICE_PREFIXES.iter().any(|p| name.starts_with(p)))
        .map(|name| format!("/dev/{name}"))
        .collect();
    out.sort();
    out
}

pub fn selected_hardware(settings: &toml::Table) -> Vec<String> {
    settings
        .get(HARDWARE_KEY)
        .and_then(toml::Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(toml::Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Top {
    Hardware,
    Back,
}

impl UnitExtension for OtbrExtension {
    fn options(&mut self, ctx: &mut OptionsCtx<'_>) -> Result<OptionsOutcome> {
        let mut changed = false;
        loop {
            let selected = selected_hardware(ctx.settings);
            let menu = if selected.is_empty() {
                SubMenu::new("Thread Border Router")
                    .note(NO_RADIO)
                    .entry("Select hardware", Top::Hardware)
            } else {
                SubMenu::new("Thread Border Router")
                    .note(format!("Radio: {}", selected.join(", ")))
                    .entry("Change selected hardware", Top::Hardware)
            }
            .entry("Go back", Top::Back);

            match menu.run(&mut *ctx.frontend)? {
                SubMenuResult::Chosen(Top::Hardware) => {
                    if self.pick_hardware(ctx)? {
                        changed = true;
                    }
                }
                SubMenuResult::Chosen(Top::Back) | SubMenuResult::Back => {
                    return Ok(OptionsOutcome { changed });
                }
            }
        }
    }

    /// Points the container at the first selected radio. With several
    /// selected the first one wins; the checks hook has already flagged it.
    fn pre_build(&mut self, settings: &toml::Table, request: &mut BuildRequest) -> Result<bool> {
        let hardware = selected_hardware(settings);
        let Some(radio) = hardware.first() else {
            tracing::warn!(unit = Self::UNIT_ID, "no Thread radio selected; radio url left unset");
            return Ok(true);
        };
        let cfg = request.unit_config_mut(Self::UNIT_ID);
        cfg.insert(
            "command".into(),
            Value::String(format!("{RADIO_URL_PREFIX}{radio}")),
        );
        let mapping = Value::String(format!("{radio}:{radio}"));
        match cfg.get_mut("volumes") {
            Some(Value::Array(v)) => v.push(mapping),
            _ => {
                cfg.insert("volumes".into(), Value::Array(vec![mapping]));
            }
        }
        tracing::info!(unit = Self::UNIT_ID, radio = %radio, "radio url set");
        Ok(true)
    }

    fn post_build(&mut self) -> Result<bool> {
        tracing::debug!(unit = Self::UNIT_ID, "post-build complete");
        Ok(true)
    }

    fn run_checks(&self, ctx: &CheckCtx<'_>) -> Result<Vec<UnitIssue>> {
        let hardware = ctx
            .settings
            .unit(ctx.unit_id)
            .map(selected_hardware)
            .unwrap_or_default();
        let mut issues = Vec::new();
        match hardware.len() {
            0 => issues.push(UnitIssue::new(ctx.unit_id, HARDWARE_KEY, NO_RADIO)),
            1 => {}
            _ => issues.push(UnitIssue::new(ctx.unit_id, HARDWARE_KEY, MANY_RADIOS)),
        }
        issues.extend(port_conflicts(ctx));
        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::{HookTable, probe};
    use crate::settings::BuildSettings;
    use crate::ui::frontend::{ScriptedEvents, TerminalFrontend, Theme};
    use crossterm::event::KeyCode;
    use ratatui::backend::TestBackend;
    use std::collections::BTreeMap;

    fn hw(devs: &[&str]) -> toml::Table {
        let mut t = toml::Table::new();
        t.insert(
            HARDWARE_KEY.into(),
            toml::Value::Array(devs.iter().map(|d| toml::Value::String(d.to_string())).collect()),
        );
        t
    }

    #[test]
    fn declares_every_hook() {
        let ext = OtbrExtension::with_candidates(Vec::new());
        assert_eq!(ext.unit_id(), "otbr");
        let caps = probe(&ext).unwrap();
        assert!(caps.options && caps.pre_build && caps.post_build && caps.run_checks);
    }

    #[test]
    fn pre_build_uses_the_first_radio() {
        let mut ext = OtbrExtension::with_candidates(Vec::new());
        let mut req = BuildRequest::default();
        req.unit_config_mut("otbr")
            .insert("volumes".into(), serde_json::json!(["./data:/data"]));
        let ok = ext
            .pre_build(&hw(&["/dev/ttyACM1", "/dev/ttyACM0"]), &mut req)
            .unwrap();
        assert!(ok);
        let cfg = &req.configurations.services["otbr"];
        assert_eq!(cfg["command"], "--radio-url spinel+hdlc+uart:///dev/ttyACM1");
        assert_eq!(
            cfg["volumes"],
            serde_json::json!(["./data:/data", "/dev/ttyACM1:/dev/ttyACM1"])
        );
    }

    #[test]
    fn checks_flag_missing_and_multiple_radios() {
        let ext = OtbrExtension::with_candidates(Vec::new());
        let schemas = BTreeMap::new();
        let selection = vec!["otbr".to_string()];

        let settings = BuildSettings::in_memory();
        let ctx = CheckCtx {
            unit_id: "otbr",
            selection: &selection,
            settings: &settings,
            schemas: &schemas,
        };
        assert_eq!(ext.run_checks(&ctx).unwrap()[0].message, NO_RADIO);

        let mut settings = BuildSettings::in_memory();
        *settings.unit_mut("otbr") = hw(&["/dev/ttyACM0", "/dev/ttyUSB0"]);
        let ctx = CheckCtx {
            unit_id: "otbr",
            selection: &selection,
            settings: &settings,
            schemas: &schemas,
        };
        assert_eq!(ext.run_checks(&ctx).unwrap()[0].message, MANY_RADIOS);
    }

    #[test]
    fn options_menu_toggles_a_device() {
        let mut ext =
            OtbrExtension::with_candidates(vec!["/dev/ttyACM0".into(), "/dev/ttyUSB0".into()]);
        // Select hardware -> toggle second device -> Done -> Go back.
        let events = ScriptedEvents::keys(&[
            KeyCode::Enter,
            KeyCode::Down,
            KeyCode::Enter,
            KeyCode::Up,
            KeyCode::Enter,
            KeyCode::Down,
            KeyCode::Enter,
        ]);
        let mut fe =
            TerminalFrontend::new(TestBackend::new(70, 24), events, Theme::default()).unwrap();
        let mut settings = toml::Table::new();
        let mut ctx = OptionsCtx {
            frontend: &mut fe,
            schema: None,
            settings: &mut settings,
        };
        let outcome = ext.options(&mut ctx).unwrap();
        assert!(outcome.changed);
        assert_eq!(selected_hardware(&settings), vec!["/dev/ttyUSB0"]);
    }
}
