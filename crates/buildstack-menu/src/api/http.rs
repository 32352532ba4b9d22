use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{Value, json};

use crate::api::{
    BuildReceipt, BuildRequest, BuildService, CatalogSource, CheckResponse, ValidationService,
};
use crate::error::{Error, Result};

const LIST_PATH: &str = "templates/services/list";
const METADATA_PATH: &str = "templates/services/metadata";
const OPTIONS_PATH: &str = "templates/services/options";
const CHECK_PATH: &str = "build/check";
const BUILD_PATH: &str = "build/save";

/// Blocking client for the build API.
pub struct HttpApi {
    base: String,
    client: reqwest::blocking::Client,
}

impl HttpApi {
    pub fn new(addr: &str, timeout_secs: u64) -> Result<Self> {
        let base = addr.trim().trim_end_matches('/').to_string();
        if base.is_empty() {
            return Err(Error::msg("API address is empty (set API_ADDR or --api-addr)"));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::msg(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { base, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    fn get_json(&self, path: &str) -> std::result::Result<Value, String> {
        let url = self.url(path);
        let res = self
            .client
            .get(&url)
            .send()
            .map_err(|e| format!("GET {url} failed: {e}"))?;
        if !res.status().is_success() {
            return Err(format!("GET {url} failed with status {}", res.status()));
        }
        res.json::<Value>()
            .map_err(|e| format!("GET {url} returned invalid JSON: {e}"))
    }

    fn post_json(&self, path: &str, body: &BuildRequest) -> std::result::Result<Value, String> {
        let url = self.url(path);
        let res = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| format!("POST {url} failed: {e}"))?;
        if !res.status().is_success() {
            return Err(format!("POST {url} failed with status {}", res.status()));
        }
        res.json::<Value>()
            .map_err(|e| format!("POST {url} returned invalid JSON: {e}"))
    }
}

/// Combine the service listing with its metadata map into raw catalog
/// entries. Units without metadata keep no label and are rejected later by
/// the registry.
fn merge_listing(list: &[Value], metadata: Option<&Value>) -> Vec<Value> {
    list.iter()
        .map(|item| {
            let Some(unit_id) = item.as_str() else {
                return item.clone();
            };
            let mut entry = json!({ "unitId": unit_id });
            match metadata {
                Some(meta) => {
                    if let Some(m) = meta.get(unit_id) {
                        if let Some(label) = m.get("displayName") {
                            entry["displayLabel"] = label.clone();
                        }
                        if let Some(tags) = m.get("serviceTypeTags") {
                            entry["tags"] = tags.clone();
                        }
                    }
                }
                None => entry["displayLabel"] = Value::String(unit_id.to_string()),
            }
            entry
        })
        .collect()
}

impl CatalogSource for HttpApi {
    fn list_units(&self) -> Result<Vec<Value>> {
        let list = self.get_json(LIST_PATH).map_err(Error::load)?;
        let Some(list) = list.as_array() else {
            return Err(Error::load(format!(
                "{} did not return a JSON array",
                self.url(LIST_PATH)
            )));
        };
        let metadata = match self.get_json(METADATA_PATH) {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!(error = %e, "service metadata unavailable; using unit ids as labels");
                None
            }
        };
        Ok(merge_listing(list, metadata.as_ref()))
    }

    fn options_schemas(&self) -> Result<BTreeMap<String, Value>> {
        let body = self.get_json(OPTIONS_PATH).map_err(Error::load)?;
        let Value::Object(map) = body else {
            return Err(Error::load(format!(
                "{} did not return a JSON object",
                self.url(OPTIONS_PATH)
            )));
        };
        Ok(map.into_iter().collect())
    }
}

impl ValidationService for HttpApi {
    fn check(&self, request: &BuildRequest) -> Result<CheckResponse> {
        let body = self
            .post_json(CHECK_PATH, request)
            .map_err(Error::validation_service)?;
        Ok(CheckResponse::from_json(&body))
    }
}

impl BuildService for HttpApi {
    fn submit(&self, request: &BuildRequest) -> Result<BuildReceipt> {
        let body = self
            .post_json(BUILD_PATH, request)
            .map_err(Error::build_service)?;
        Ok(BuildReceipt::from_json(body))
    }
}
