#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};

use buildstack_menu::api::{
    BuildReceipt, BuildRequest, BuildService, CatalogSource, CheckResponse, Collaborators,
    ValidationService,
};
use buildstack_menu::extensions::ExtensionSet;
use buildstack_menu::ui::{ScriptedEvents, TerminalFrontend, Theme, UiEvent};
use buildstack_menu::{Error, Result};
use ratatui::backend::TestBackend;
use serde_json::{Value, json};

/// Scripted reply for one check call.
pub enum CheckReply {
    Body(Value),
    Fail(&'static str),
}

/// In-memory build API that records every call.
pub struct MockApi {
    pub entries: RefCell<Vec<Value>>,
    /// Catalogs swapped in, one per listing call, once the menu is up.
    pub next_catalogs: RefCell<VecDeque<Vec<Value>>>,
    pub schemas: RefCell<BTreeMap<String, Value>>,
    pub list_fails: Cell<bool>,
    pub check_replies: RefCell<VecDeque<CheckReply>>,
    pub build_failures: Cell<usize>,
    pub list_calls: Cell<usize>,
    pub checks: RefCell<Vec<BuildRequest>>,
    pub builds: RefCell<Vec<BuildRequest>>,
}

impl MockApi {
    pub fn with_units(ids: &[&str]) -> Self {
        Self {
            entries: RefCell::new(
                ids.iter()
                    .map(|id| json!({"unitId": id, "displayLabel": id.to_uppercase()}))
                    .collect(),
            ),
            next_catalogs: RefCell::new(VecDeque::new()),
            schemas: RefCell::new(BTreeMap::new()),
            list_fails: Cell::new(false),
            check_replies: RefCell::new(VecDeque::new()),
            build_failures: Cell::new(0),
            list_calls: Cell::new(0),
            checks: RefCell::new(Vec::new()),
            builds: RefCell::new(Vec::new()),
        }
    }

    pub fn queue_catalog(&self, ids: &[&str]) {
        self.next_catalogs.borrow_mut().push_back(
            ids.iter()
                .map(|id| json!({"unitId": id, "displayLabel": id.to_uppercase()}))
                .collect(),
        );
    }

    pub fn reply(&self, r: CheckReply) {
        self.check_replies.borrow_mut().push_back(r);
    }

    pub fn collab(&self) -> Collaborators<'_> {
        Collaborators::from_api(self)
    }

    pub fn check_count(&self) -> usize {
        self.checks.borrow().len()
    }

    pub fn build_count(&self) -> usize {
        self.builds.borrow().len()
    }
}

impl CatalogSource for MockApi {
    fn list_units(&self) -> Result<Vec<Value>> {
        self.list_calls.set(self.list_calls.get() + 1);
        if self.list_fails.get() {
            return Err(Error::load("GET templates/services/list failed: connection refused"));
        }
        if let Some(next) = self.next_catalogs.borrow_mut().pop_front() {
            *self.entries.borrow_mut() = next;
        }
        Ok(self.entries.borrow().clone())
    }

    fn options_schemas(&self) -> Result<BTreeMap<String, Value>> {
        Ok(self.schemas.borrow().clone())
    }
}

impl ValidationService for MockApi {
    fn check(&self, request: &BuildRequest) -> Result<CheckResponse> {
        self.checks.borrow_mut().push(request.clone());
        match self.check_replies.borrow_mut().pop_front() {
            Some(CheckReply::Body(v)) => Ok(CheckResponse::from_json(&v)),
            Some(CheckReply::Fail(msg)) => Err(Error::validation_service(msg)),
            None => Ok(CheckResponse::from_json(
                &json!({"overallPass": true, "issues": []}),
            )),
        }
    }
}

impl BuildService for MockApi {
    fn submit(&self, request: &BuildRequest) -> Result<BuildReceipt> {
        self.builds.borrow_mut().push(request.clone());
        let left = self.build_failures.get();
        if left > 0 {
            self.build_failures.set(left - 1);
            return Err(Error::build_service("POST build/save failed with status 502"));
        }
        Ok(BuildReceipt::from_json(
            json!({"buildId": format!("b-{}", self.build_count())}),
        ))
    }
}

pub fn no_extensions(_: &BTreeMap<String, Value>) -> ExtensionSet {
    ExtensionSet::default()
}

pub fn frontend(
    width: u16,
    height: u16,
    events: Vec<UiEvent>,
) -> TerminalFrontend<TestBackend, ScriptedEvents> {
    TerminalFrontend::new(
        TestBackend::new(width, height),
        ScriptedEvents::new(events),
        Theme::default(),
    )
    .unwrap()
}

/// The last drawn frame, one string per row.
pub fn screen(fe: &TerminalFrontend<TestBackend, ScriptedEvents>) -> Vec<String> {
    let buf = fe.terminal().backend().buffer();
    let width = usize::from(buf.area.width).max(1);
    buf.content()
        .chunks(width)
        .map(|row| row.iter().map(|c| c.symbol()).collect::<String>())
        .collect()
}

pub fn screen_text(fe: &TerminalFrontend<TestBackend, ScriptedEvents>) -> String {
    screen(fe).join("\n")
}
