mod common;

use buildstack_menu::extensions::{Capabilities, builtin_extensions};
use buildstack_menu::menu::Session;
use buildstack_menu::settings::BuildSettings;
use common::MockApi;
use serde_json::json;

fn api_with_schemas() -> MockApi {
    let api = MockApi::with_units(&["otbr", "mosquitto", "grafana", "broken"]);
    api.schemas.borrow_mut().extend([
        ("otbr".to_string(), json!({"hardware": ["/dev/ttyACM0"]})),
        (
            "mosquitto".to_string(),
            json!({"labeledPorts": {"1883:1883": "mqtt"}, "logging": true, "networks": true}),
        ),
        ("broken".to_string(), json!("not an object")),
    ]);
    api
}

#[test]
fn rediscovery_is_idempotent() {
    let api = api_with_schemas();
    let mut session = Session::load(&api, BuildSettings::in_memory(), builtin_extensions);
    let first = session.capabilities().clone();
    let again = session.rediscover();
    assert_eq!(again.capabilities, first);
    assert_eq!(session.capabilities(), &first);
    let third = session.rediscover();
    assert_eq!(third.capabilities, first);
    assert_eq!(third.errors.len(), again.errors.len());
}

#[test]
fn a_malformed_extension_does_not_block_the_rest() {
    let api = api_with_schemas();
    let session = Session::load(&api, BuildSettings::in_memory(), builtin_extensions);
    let caps = session.capabilities();
    assert!(caps["otbr"].options && caps["otbr"].pre_build && caps["otbr"].post_build);
    assert!(caps["mosquitto"].options && caps["mosquitto"].run_checks);
    assert!(!caps["mosquitto"].pre_build);
    assert_eq!(caps["grafana"], Capabilities::default());
    assert_eq!(caps["broken"], Capabilities::default());

    assert_eq!(session.warnings().len(), 1);
    assert!(session.warnings()[0].to_string().contains("broken"));
    assert!(session.registry().find("otbr").unwrap().has_options);
    assert!(!session.registry().find("broken").unwrap().has_options);
}

#[test]
fn refresh_keeps_selection_for_units_still_listed() {
    let api = api_with_schemas();
    let mut session = Session::load(&api, BuildSettings::in_memory(), builtin_extensions);
    session.toggle("grafana").unwrap();
    session.toggle("mosquitto").unwrap();

    api.entries.borrow_mut().retain(|e| e["unitId"] != "grafana");
    session.refresh(&api);

    assert_eq!(api.list_calls.get(), 2);
    assert_eq!(session.registry().selected_ids(), ["mosquitto"]);
    assert!(session.registry().find("grafana").is_none());
    assert!(!session.capabilities().contains_key("grafana"));
}

#[test]
fn selection_survives_a_failed_listing() {
    let api = api_with_schemas();
    let mut session = Session::load(&api, BuildSettings::in_memory(), builtin_extensions);
    session.toggle("grafana").unwrap();
    session.toggle("otbr").unwrap();

    api.list_fails.set(true);
    session.refresh(&api);
    assert!(session.catalog_error().is_some());
    assert!(session.registry().is_empty());

    api.list_fails.set(false);
    session.refresh(&api);
    assert!(session.catalog_error().is_none());
    assert_eq!(session.registry().selected_ids(), ["grafana", "otbr"]);

    // Consumed once; later refreshes follow the live selection again.
    session.toggle("grafana").unwrap();
    session.refresh(&api);
    assert_eq!(session.registry().selected_ids(), ["otbr"]);
}

#[test]
fn malformed_catalog_entries_become_a_load_warning() {
    let api = MockApi::with_units(&["a", "b"]);
    api.entries
        .borrow_mut()
        .push(json!({"displayLabel": "missing id"}));
    let session = Session::load(&api, BuildSettings::in_memory(), builtin_extensions);
    assert_eq!(session.registry().len(), 2);
    assert_eq!(session.warnings().len(), 1);
    assert_eq!(
        session.warnings()[0].kind(),
        buildstack_menu::error::ErrorKind::Load
    );
}
