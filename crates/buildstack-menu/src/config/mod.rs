use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use toml::Value;

use crate::error::{Error, Result};

pub const API_ADDR_ENV: &str = "API_ADDR";

fn default_api_addr() -> String {
    "http://localhost:32128".into()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_compact_rows() -> usize {
    10
}

fn default_settings_path() -> String {
    "build-settings.toml".into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Utf8,
    Ascii,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    #[serde(default = "default_api_addr")]
    pub addr: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: default_api_addr(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MenuSection {
    #[serde(default = "default_compact_rows")]
    pub compact_rows: usize,
    pub render_mode: RenderMode,
    #[serde(default = "default_settings_path")]
    pub settings_path: String,
}

impl Default for MenuSection {
    fn default() -> Self {
        Self {
            compact_rows: default_compact_rows(),
            render_mode: RenderMode::Utf8,
            settings_path: default_settings_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct MenuConfig {
    pub api: ApiConfig,
    pub menu: MenuSection,
}

/// CLI-level overrides, applied last.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_addr: Option<String>,
    pub settings_path: Option<PathBuf>,
    pub ascii: bool,
}

impl MenuConfig {
    pub fn settings_path(&self) -> PathBuf {
        PathBuf::from(&self.menu.settings_path)
    }

    /// Defaults < file < `API_ADDR` < CLI flags.
    pub fn resolve(file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut cfg = match file {
            Some(p) => {
                let value = load_value(p)?;
                value
                    .try_into::<MenuConfig>()
                    .map_err(|e| Error::msg(format!("invalid menu config {}: {e}", p.display())))?
            }
            None => MenuConfig::default(),
        };

        if let Ok(addr) = std::env::var(API_ADDR_ENV) {
            let addr = addr.trim();
            if !addr.is_empty() {
                cfg.api.addr = addr.to_string();
            }
        }
        if let Some(addr) = overrides.api_addr.as_deref() {
            cfg.api.addr = addr.to_string();
        }
        if let Some(p) = overrides.settings_path.as_ref() {
            cfg.menu.settings_path = p.display().to_string();
        }
        if overrides.ascii {
            cfg.menu.render_mode = RenderMode::Ascii;
        }
        if cfg.menu.compact_rows == 0 {
            return Err(Error::msg("menu.compact_rows must be at least 1"));
        }
        Ok(cfg)
    }
}

/// Deep table merge; scalars and arrays in `overlay` replace `base`.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Table(base_tbl), Value::Table(overlay_tbl)) => {
            for (k, v) in overlay_tbl {
                match base_tbl.get_mut(&k) {
                    Some(existing) => merge(existing, v),
                    None => {
                        base_tbl.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

fn resolve_ref_path(from_file: &Path, reference: &str) -> PathBuf {
    let p = PathBuf::from(reference);
    if p.is_absolute() {
        p
    } else {
        from_file.parent().unwrap_or_else(|| Path::new(".")).join(p)
    }
}

fn load_value_inner(path: &Path, stack: &mut HashSet<PathBuf>) -> Result<Value> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !stack.insert(canonical.clone()) {
        return Err(Error::msg(format!(
            "config extends cycle detected at {}",
            canonical.display()
        )));
    }

    let data = fs::read_to_string(path)
        .map_err(|e| Error::msg(format!("failed to read config {}: {e}", path.display())))?;
    let mut value: Value = toml::from_str(&data)
        .map_err(|e| Error::msg(format!("TOML parse error in {}: {e}", path.display())))?;

    let mut out = Value::Table(Default::default());
    if let Some(parent) = value.get("extends").and_then(Value::as_str) {
        out = load_value_inner(&resolve_ref_path(path, parent), stack)?;
    }
    if let Some(tbl) = value.as_table_mut() {
        tbl.remove("extends");
    }
    merge(&mut out, value);

    stack.remove(&canonical);
    Ok(out)
}

/// Read a menu config file, following `extends = "<file>"` chains.
pub fn load_value(path: &Path) -> Result<Value> {
    load_value_inner(path, &mut HashSet::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extends_merges_child_over_parent() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("base.toml"),
            "[api]\naddr = \"http://base:1\"\ntimeout_secs = 5\n[menu]\ncompact_rows = 12\n",
        )
        .unwrap();
        let child = dir.path().join("child.toml");
        fs::write(
            &child,
            "extends = \"base.toml\"\n[api]\naddr = \"http://child:2\"\n",
        )
        .unwrap();

        let value = load_value(&child).unwrap();
        let cfg: MenuConfig = value.try_into().unwrap();
        assert_eq!(cfg.api.addr, "http://child:2");
        assert_eq!(cfg.api.timeout_secs, 5);
        assert_eq!(cfg.menu.compact_rows, 12);
        assert_eq!(cfg.menu.render_mode, RenderMode::Utf8);
    }

    #[test]
    fn extends_cycle_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a.toml");
        fs::write(&a, "extends = \"b.toml\"\n").unwrap();
        fs::write(dir.path().join("b.toml"), "extends = \"a.toml\"\n").unwrap();
        let err = load_value(&a).unwrap_err();
        assert!(err.to_string().contains("cycle"), "{err}");
    }

    #[test]
    fn cli_overrides_win() {
        let overrides = Overrides {
            api_addr: Some("http://cli:9".into()),
            settings_path: Some(PathBuf::from("/tmp/s.toml")),
            ascii: true,
        };
        let cfg = MenuConfig::resolve(None, &overrides).unwrap();
        assert_eq!(cfg.api.addr, "http://cli:9");
        assert_eq!(cfg.settings_path(), PathBuf::from("/tmp/s.toml"));
        assert_eq!(cfg.menu.render_mode, RenderMode::Ascii);
    }
}
