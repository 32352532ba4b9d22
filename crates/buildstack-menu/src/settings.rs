use std::fs;
use std::path::{Path, PathBuf};

use toml::Value;

use crate::error::{Error, Result};

const SELECTED_KEY: &str = "selected_services";
const SERVICES_KEY: &str = "services";
const UPDATED_KEY: &str = "updated_at";

/// Persisted build settings: the last selection plus a table of settings per
/// unit. Backed by a TOML file when `path` is set, in-memory otherwise.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    path: Option<PathBuf>,
    value: Value,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl BuildSettings {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            value: Value::Table(Default::default()),
        }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_table() {
            return Err(Error::msg("build settings must be a table"));
        }
        Ok(Self { path: None, value })
    }

    /// A missing file yields empty settings bound to `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                path: Some(path.to_path_buf()),
                value: Value::Table(Default::default()),
            });
        }
        let data = fs::read_to_string(path).map_err(|e| {
            Error::msg(format!("failed to read build settings {}: {e}", path.display()))
        })?;
        let value: Value = toml::from_str(&data).map_err(|e| {
            Error::msg(format!("TOML parse error in {}: {e}", path.display()))
        })?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            value,
        })
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn selected_services(&self) -> Vec<String> {
        let Some(arr) = self.value.get(SELECTED_KEY).and_then(Value::as_array) else {
            return Vec::new();
        };
        let mut out: Vec<String> = Vec::with_capacity(arr.len());
        for v in arr {
            let Some(s) = v.as_str().map(str::trim) else {
                continue;
            };
            if !s.is_empty() && !out.iter().any(|x| x == s) {
                out.push(s.to_string());
            }
        }
        out
    }

    pub fn set_selected_services(&mut self, ids: &[String]) {
        let arr = ids.iter().cloned().map(Value::String).collect();
        self.root_mut().insert(SELECTED_KEY.into(), Value::Array(arr));
    }

    pub fn unit(&self, unit_id: &str) -> Option<&toml::Table> {
        self.value
            .get(SERVICES_KEY)?
            .as_table()?
            .get(unit_id)?
            .as_table()
    }

    /// Mutable per-unit table, created on first access.
    pub fn unit_mut(&mut self, unit_id: &str) -> &mut toml::Table {
        let services = self
            .root_mut()
            .entry(SERVICES_KEY)
            .or_insert_with(|| Value::Table(Default::default()));
        if !services.is_table() {
            *services = Value::Table(Default::default());
        }
        let Value::Table(services) = services else {
            unreachable!("services slot was just made a table");
        };
        let slot = services
            .entry(unit_id)
            .or_insert_with(|| Value::Table(Default::default()));
        if !slot.is_table() {
            *slot = Value::Table(Default::default());
        }
        match slot {
            Value::Table(t) => t,
            _ => unreachable!("unit slot was just made a table"),
        }
    }

    /// Write back to disk; a no-op for in-memory settings.
    pub fn save(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        self.root_mut().insert(
            UPDATED_KEY.into(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        let body = toml::to_string_pretty(&self.value)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, body).map_err(|e| {
            Error::msg(format!(
                "failed to write build settings {}: {e}",
                path.display()
            ))
        })?;
        tracing::debug!(path = %path.display(), "build settings saved");
        Ok(())
    }

    fn root_mut(&mut self) -> &mut toml::Table {
        if !self.value.is_table() {
            self.value = Value::Table(Default::default());
        }
        match &mut self.value {
            Value::Table(t) => t,
            _ => unreachable!("root was just made a table"),
        }
    }
}

pub fn toml_to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Integer(i) => serde_json::Value::Number((*i).into()),
        Value::Float(f) => serde_json::json!(f),
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        Value::Array(arr) => serde_json::Value::Array(arr.iter().map(toml_to_json).collect()),
        Value::Table(t) => {
            let mut out = serde_json::Map::new();
            for (k, v) in t {
                out.insert(k.clone(), toml_to_json(v));
            }
            serde_json::Value::Object(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty_and_save_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/build-settings.toml");

        let mut s = BuildSettings::load(&path).unwrap();
        assert!(s.selected_services().is_empty());

        s.set_selected_services(&["otbr".to_string(), "mosquitto".to_string()]);
        s.unit_mut("otbr").insert(
            "hardware".into(),
            Value::Array(vec![Value::String("/dev/ttyACM0".into())]),
        );
        s.save().unwrap();

        let back = BuildSettings::load(&path).unwrap();
        assert_eq!(back.selected_services(), vec!["otbr", "mosquitto"]);
        let hw = back
            .unit("otbr")
            .and_then(|t| t.get("hardware"))
            .and_then(Value::as_array)
            .unwrap();
        assert_eq!(hw[0].as_str(), Some("/dev/ttyACM0"));
        assert!(back.value().get("updated_at").is_some());
    }

    #[test]
    fn selected_services_skips_blanks_and_duplicates() {
        let value: Value =
            toml::from_str("selected_services = [\"a\", \" \", \"b\", \"a\", 3]").unwrap();
        let s = BuildSettings::from_value(value).unwrap();
        assert_eq!(s.selected_services(), vec!["a", "b"]);
    }

    #[test]
    fn unit_tables_convert_to_json() {
        let value: Value =
            toml::from_str("[services.grafana]\nloggingEnabled = false\nports = [3000]\n")
                .unwrap();
        let s = BuildSettings::from_value(value).unwrap();
        let json = toml_to_json(&Value::Table(s.unit("grafana").unwrap().clone()));
        assert_eq!(
            json,
            serde_json::json!({"loggingEnabled": false, "ports": [3000]})
        );
    }
}
