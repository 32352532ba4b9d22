//! Contracts for the services the menu talks to. The menu only sees these
//! traits; `HttpApi` is the production implementation.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

pub mod http;

pub use http::HttpApi;

/// One structured issue attributed to a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitIssue {
    pub unit_id: String,
    pub issue_type: String,
    pub message: String,
}

impl UnitIssue {
    pub fn new(
        unit_id: impl Into<String>,
        issue_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            unit_id: unit_id.into(),
            issue_type: issue_type.into(),
            message: message.into(),
        }
    }
}

/// Payload shared by the check and build calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub selected_services: Vec<String>,
    pub configurations: Configurations,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Configurations {
    pub services: BTreeMap<String, Value>,
}

impl BuildRequest {
    /// Mutable JSON object for one unit, created on demand.
    pub fn unit_config_mut(&mut self, unit_id: &str) -> &mut serde_json::Map<String, Value> {
        let slot = self
            .configurations
            .services
            .entry(unit_id.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        if !slot.is_object() {
            *slot = Value::Object(Default::default());
        }
        match slot {
            Value::Object(m) => m,
            _ => unreachable!("unit config slot was just made an object"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckResponse {
    pub overall_pass: bool,
    pub issues: Vec<UnitIssue>,
    /// False when the body carried no issue list at all.
    pub complete: bool,
}

impl CheckResponse {
    /// Accepts `{overallPass, issues:[{unitId,..}]}` and the older
    /// `{issueList:{services:[{name,..}]}}` shape.
    pub fn from_json(body: &Value) -> Self {
        let field = |o: &Value, keys: &[&str]| -> String {
            keys.iter()
                .find_map(|k| o.get(*k).and_then(Value::as_str))
                .unwrap_or_default()
                .to_string()
        };

        let list = body
            .get("issues")
            .and_then(Value::as_array)
            .or_else(|| {
                body.get("issueList")
                    .and_then(|l| l.get("services"))
                    .and_then(Value::as_array)
            });
        let Some(list) = list else {
            return Self {
                overall_pass: false,
                issues: Vec::new(),
                complete: false,
            };
        };

        let issues: Vec<UnitIssue> = list
            .iter()
            .filter_map(|o| {
                let unit_id = field(o, &["unitId", "name"]);
                if unit_id.is_empty() {
                    return None;
                }
                Some(UnitIssue {
                    unit_id,
                    issue_type: field(o, &["issueType"]),
                    message: o
                        .get("message")
                        .map(|m| match m {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .unwrap_or_default(),
                })
            })
            .collect();

        let overall_pass = body
            .get("overallPass")
            .and_then(Value::as_bool)
            .unwrap_or(issues.is_empty());
        Self {
            overall_pass,
            issues,
            complete: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildReceipt {
    pub build_id: Option<String>,
    pub body: Value,
}

impl BuildReceipt {
    pub fn from_json(body: Value) -> Self {
        let build_id = ["buildId", "id"]
            .iter()
            .find_map(|k| body.get(*k))
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
        Self { build_id, body }
    }
}

pub trait CatalogSource {
    /// Raw catalog entries in display order. Errors only when the listing
    /// itself cannot be fetched; entries are parsed (and may be rejected)
    /// one by one by the registry.
    fn list_units(&self) -> Result<Vec<Value>>;

    /// Options schema blob per unit id, passed through to extensions.
    fn options_schemas(&self) -> Result<BTreeMap<String, Value>>;
}

pub trait ValidationService {
    fn check(&self, request: &BuildRequest) -> Result<CheckResponse>;
}

pub trait BuildService {
    fn submit(&self, request: &BuildRequest) -> Result<BuildReceipt>;
}

#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub catalog: &'a dyn CatalogSource,
    pub validator: &'a dyn ValidationService,
    pub builder: &'a dyn BuildService,
}

impl<'a> Collaborators<'a> {
    pub fn from_api<A>(api: &'a A) -> Self
    where
        A: CatalogSource + ValidationService + BuildService,
    {
        Self {
            catalog: api,
            validator: api,
            builder: api,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn check_response_reads_current_shape() {
        let body = json!({
            "overallPass": false,
            "issues": [{"unitId": "svc1", "issueType": "port-conflict", "message": "1883 taken"}]
        });
        let r = CheckResponse::from_json(&body);
        assert!(r.complete);
        assert!(!r.overall_pass);
        assert_eq!(r.issues, vec![UnitIssue::new("svc1", "port-conflict", "1883 taken")]);
    }

    #[test]
    fn check_response_reads_legacy_issue_list() {
        let body = json!({
            "issueList": {"services": [{"name": "nodered", "issueType": "addons", "message": "none"}]}
        });
        let r = CheckResponse::from_json(&body);
        assert!(r.complete);
        assert!(!r.overall_pass);
        assert_eq!(r.issues[0].unit_id, "nodered");
    }

    #[test]
    fn check_response_without_issue_list_is_incomplete() {
        let r = CheckResponse::from_json(&json!({"status": -1}));
        assert!(!r.complete);
        assert!(!r.overall_pass);
    }

    #[test]
    fn build_request_serializes_camel_case() {
        let mut req = BuildRequest {
            selected_services: vec!["otbr".into()],
            ..Default::default()
        };
        req.unit_config_mut("otbr")
            .insert("command".into(), json!("--radio-url x"));
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "selectedServices": ["otbr"],
                "configurations": {"services": {"otbr": {"command": "--radio-url x"}}}
            })
        );
    }
}
