use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::extensions::Capabilities;
use crate::menu::workflow::ValidationResult;

static UNIT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("unit id regex"));

/// Outcome of the last validation pass for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IssueState {
    #[default]
    Unknown,
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MenuItem {
    pub display_label: String,
    pub unit_id: String,
    pub checked: bool,
    pub tags: BTreeSet<String>,
    pub issue: IssueState,
    pub has_options: bool,
}

/// A catalog entry that could not be turned into a menu item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFailure {
    pub index: usize,
    pub unit_id: Option<String>,
    pub reason: String,
}

impl fmt::Display for EntryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unit_id {
            Some(id) => write!(f, "entry #{} ('{}'): {}", self.index, id, self.reason),
            None => write!(f, "entry #{}: {}", self.index, self.reason),
        }
    }
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub registry: Registry,
    pub failures: Vec<EntryFailure>,
    /// Seeded selections with no matching catalog entry.
    pub dropped_seeds: Vec<String>,
}

impl LoadReport {
    /// The per-entry failures as one `LoadError`, if any.
    pub fn error(&self) -> Option<Error> {
        if self.failures.is_empty() {
            return None;
        }
        let lines: Vec<String> = self.failures.iter().map(|f| f.to_string()).collect();
        Some(Error::load(format!(
            "{} catalog entr{} could not be loaded: {}",
            self.failures.len(),
            if self.failures.len() == 1 { "y" } else { "ies" },
            lines.join("; ")
        )))
    }
}

/// Ordered menu entries plus the selection set, in toggle order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    items: Vec<MenuItem>,
    index: BTreeMap<String, usize>,
    selection: Vec<String>,
}

fn first_str<'a>(entry: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| entry.get(*k))
}

fn parse_entry(entry: &Value) -> std::result::Result<MenuItem, (Option<String>, String)> {
    if !entry.is_object() {
        return Err((None, "expected a JSON object".into()));
    }
    let unit_id = match first_str(entry, &["unitId", "unit_id", "id"]) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => return Err((None, "unitId must be a string".into())),
        None => return Err((None, "missing required field 'unitId'".into())),
    };
    if !UNIT_ID_RE.is_match(&unit_id) {
        return Err((Some(unit_id), "unitId has invalid characters".into()));
    }
    let display_label = match first_str(entry, &["displayLabel", "displayName"]) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(_) => return Err((Some(unit_id), "displayLabel must be a non-empty string".into())),
        None => return Err((Some(unit_id), "missing required field 'displayLabel'".into())),
    };
    let mut tags = BTreeSet::new();
    match first_str(entry, &["tags", "serviceTypeTags"]) {
        None | Some(Value::Null) => {}
        Some(Value::Array(arr)) => {
            for t in arr {
                let Some(s) = t.as_str() else {
                    return Err((Some(unit_id), "tags must be strings".into()));
                };
                tags.insert(s.to_string());
            }
        }
        Some(_) => return Err((Some(unit_id), "tags must be an array".into())),
    }
    Ok(MenuItem {
        display_label,
        unit_id,
        checked: false,
        tags,
        issue: IssueState::Unknown,
        has_options: false,
    })
}

impl Registry {
    /// Build one item per well-formed entry. Malformed entries and duplicate
    /// ids are reported without discarding the rest.
    pub fn load(entries: &[Value], seed: &[String]) -> LoadReport {
        let mut registry = Registry::default();
        let mut failures = Vec::new();

        for (index, entry) in entries.iter().enumerate() {
            match parse_entry(entry) {
                Ok(item) => {
                    if registry.index.contains_key(&item.unit_id) {
                        failures.push(EntryFailure {
                            index,
                            unit_id: Some(item.unit_id),
                            reason: "duplicate unitId".into(),
                        });
                        continue;
                    }
                    registry
                        .index
                        .insert(item.unit_id.clone(), registry.items.len());
                    registry.items.push(item);
                }
                Err((unit_id, reason)) => failures.push(EntryFailure {
                    index,
                    unit_id,
                    reason,
                }),
            }
        }

        let mut dropped_seeds = Vec::new();
        for id in seed {
            match registry.index.get(id) {
                Some(&i) if !registry.items[i].checked => {
                    registry.items[i].checked = true;
                    registry.selection.push(id.clone());
                }
                Some(_) => {}
                None => dropped_seeds.push(id.clone()),
            }
        }

        LoadReport {
            registry,
            failures,
            dropped_seeds,
        }
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    pub fn get(&self, idx: usize) -> Option<&MenuItem> {
        self.items.get(idx)
    }

    pub fn find(&self, unit_id: &str) -> Option<&MenuItem> {
        self.index.get(unit_id).map(|&i| &self.items[i])
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Flip `checked`. Any change to the selection set makes every issue
    /// `Unknown` until the next completed check.
    pub fn toggle(&mut self, unit_id: &str) -> Result<bool> {
        let Some(&i) = self.index.get(unit_id) else {
            return Err(Error::msg(format!("unknown unit '{unit_id}'")));
        };
        let item = &mut self.items[i];
        item.checked = !item.checked;
        let now_checked = item.checked;
        if now_checked {
            self.selection.push(unit_id.to_string());
        } else {
            self.selection.retain(|id| id != unit_id);
        }
        self.clear_issues();
        Ok(now_checked)
    }

    /// Selection set in insertion order.
    pub fn selected_ids(&self) -> &[String] {
        &self.selection
    }

    pub fn clear_issues(&mut self) {
        for item in &mut self.items {
            item.issue = IssueState::Unknown;
        }
    }

    pub fn apply_result(&mut self, result: &ValidationResult) {
        for item in &mut self.items {
            item.issue = if item.checked {
                result.issue_state(&item.unit_id)
            } else {
                IssueState::Unknown
            };
        }
    }

    pub fn set_capabilities(&mut self, caps: &BTreeMap<String, Capabilities>) {
        for item in &mut self.items {
            item.has_options = caps
                .get(&item.unit_id)
                .map(|c| c.options)
                .unwrap_or(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries(ids: &[&str]) -> Vec<Value> {
        ids.iter()
            .map(|id| json!({"unitId": id, "displayLabel": id.to_uppercase()}))
            .collect()
    }

    #[test]
    fn malformed_entries_are_reported_and_skipped() {
        let raw = vec![
            json!({"unitId": "a", "displayLabel": "A", "tags": ["x"]}),
            json!({"displayLabel": "no id"}),
            json!({"unitId": "b"}),
            json!("bare string"),
            json!({"unitId": "a", "displayLabel": "dup"}),
            json!({"unitId": "c", "displayLabel": "C", "tags": "oops"}),
            json!({"unitId": "d", "displayLabel": "D"}),
        ];
        let report = Registry::load(&raw, &[]);
        let ids: Vec<&str> = report
            .registry
            .items()
            .iter()
            .map(|i| i.unit_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "d"]);
        let failed: Vec<usize> = report.failures.iter().map(|f| f.index).collect();
        assert_eq!(failed, vec![1, 2, 3, 4, 5]);
        let err = report.error().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::Load);
        assert!(err.to_string().contains("duplicate unitId"));
    }

    #[test]
    fn seed_marks_checked_and_drops_unknown_ids() {
        let report = Registry::load(
            &entries(&["a", "b", "c"]),
            &["c".into(), "zz".into(), "a".into(), "c".into()],
        );
        assert_eq!(report.registry.selected_ids(), ["c", "a"]);
        assert_eq!(report.dropped_seeds, vec!["zz"]);
        assert!(report.registry.find("a").unwrap().checked);
        assert!(!report.registry.find("b").unwrap().checked);
    }

    #[test]
    fn selected_ids_track_toggles_in_insertion_order() {
        let mut reg = Registry::load(&entries(&["a", "b", "c", "d"]), &[]).registry;
        // Deterministic pseudo-random toggle sequence.
        let mut x: u32 = 7;
        for _ in 0..200 {
            x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let id = ["a", "b", "c", "d"][(x >> 16) as usize % 4];
            reg.toggle(id).unwrap();

            let checked: BTreeSet<&str> = reg
                .items()
                .iter()
                .filter(|i| i.checked)
                .map(|i| i.unit_id.as_str())
                .collect();
            let selected: Vec<&str> = reg.selected_ids().iter().map(String::as_str).collect();
            let unique: BTreeSet<&str> = selected.iter().copied().collect();
            assert_eq!(unique.len(), selected.len(), "duplicates in {selected:?}");
            assert_eq!(unique, checked);
        }

        let mut reg = Registry::load(&entries(&["a", "b", "c"]), &[]).registry;
        reg.toggle("c").unwrap();
        reg.toggle("a").unwrap();
        reg.toggle("b").unwrap();
        reg.toggle("a").unwrap();
        reg.toggle("a").unwrap();
        assert_eq!(reg.selected_ids(), ["c", "b", "a"]);
    }

    #[test]
    fn toggle_unknown_unit_is_an_error() {
        let mut reg = Registry::load(&entries(&["a"]), &[]).registry;
        assert!(reg.toggle("nope").is_err());
    }
}
