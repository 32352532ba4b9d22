use std::collections::BTreeMap;

use serde_json::Value;

use crate::api::{
    BuildReceipt, BuildRequest, BuildService, CatalogSource, Collaborators, UnitIssue,
    ValidationService,
};
use crate::error::{Error, Result};
use crate::extensions::{
    Capabilities, CheckCtx, DiscoveryReport, ExtensionFactory, ExtensionSet, OptionsCtx,
    OptionsOutcome, discover,
};
use crate::menu::registry::Registry;
use crate::menu::workflow::{ValidationResult, ValidationWorkflow};
use crate::settings::{BuildSettings, toml_to_json};
use crate::ui::frontend::Frontend;

/// What one press of "confirm" did.
#[derive(Debug)]
pub enum ConfirmOutcome {
    /// Nothing selected; no remote call was made.
    EmptySelection,
    Checked(ValidationResult),
    CheckFailed(Error),
    /// A pre-build hook refused; the check result stands.
    BuildDeclined { unit_id: String, reason: String },
    BuildFailed(Error),
    BuildRequested(BuildReceipt),
}

/// All mutable menu state, owned in one place and threaded through the
/// input loop, renderer and sub-menus.
pub struct Session {
    registry: Registry,
    workflow: ValidationWorkflow,
    extensions: ExtensionSet,
    capabilities: BTreeMap<String, Capabilities>,
    schemas: BTreeMap<String, Value>,
    settings: BuildSettings,
    factory: ExtensionFactory,
    warnings: Vec<Error>,
    catalog_error: Option<Error>,
    loaded_once: bool,
    /// Selection held over a failed listing, seeded into the next load.
    carried_selection: Option<Vec<String>>,
}

impl Session {
    /// Load the catalog and probe extensions. A failed catalog listing is
    /// recorded (see `catalog_error`) and leaves an empty menu.
    pub fn load(
        catalog: &dyn CatalogSource,
        settings: BuildSettings,
        factory: ExtensionFactory,
    ) -> Self {
        let mut session = Self {
            registry: Registry::default(),
            workflow: ValidationWorkflow::default(),
            extensions: ExtensionSet::default(),
            capabilities: BTreeMap::new(),
            schemas: BTreeMap::new(),
            settings,
            factory,
            warnings: Vec::new(),
            catalog_error: None,
            loaded_once: false,
            carried_selection: None,
        };
        session.refresh(catalog);
        session
    }

    /// Reload the catalog, rebuild extensions and rerun discovery. The
    /// current selection survives for units still in the catalog, including
    /// across a failed listing.
    pub fn refresh(&mut self, catalog: &dyn CatalogSource) {
        self.warnings.clear();
        self.catalog_error = None;
        self.workflow.invalidate();

        let seed = match self.carried_selection.take() {
            Some(carried) => carried,
            None if self.loaded_once => self.registry.selected_ids().to_vec(),
            None => self.settings.selected_services(),
        };
        self.loaded_once = true;

        let entries = match catalog.list_units() {
            Ok(e) => e,
            Err(e) => {
                tracing::error!(error = %e, "catalog load failed");
                self.registry = Registry::default();
                self.capabilities.clear();
                self.extensions = ExtensionSet::default();
                self.carried_selection = Some(seed);
                self.catalog_error = Some(e);
                return;
            }
        };
        self.schemas = match catalog.options_schemas() {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "options schemas unavailable");
                self.warnings.push(e);
                BTreeMap::new()
            }
        };

        let report = Registry::load(&entries, &seed);
        if let Some(err) = report.error() {
            tracing::warn!(error = %err, "some catalog entries were skipped");
            self.warnings.push(err);
        }
        if !report.dropped_seeds.is_empty() {
            tracing::debug!(dropped = ?report.dropped_seeds, "saved selections not in catalog");
        }
        self.registry = report.registry;
        tracing::info!(units = self.registry.len(), "catalog loaded");

        self.extensions = (self.factory)(&self.schemas);
        let discovery = self.rediscover();
        self.warnings.extend(discovery.errors);
    }

    /// Probe every unit's extension again, replacing all capabilities.
    pub fn rediscover(&mut self) -> DiscoveryReport {
        let report = discover(&self.registry, &self.extensions);
        self.capabilities = report.capabilities.clone();
        self.registry.set_capabilities(&self.capabilities);
        report
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn workflow(&self) -> &ValidationWorkflow {
        &self.workflow
    }

    pub fn capabilities(&self) -> &BTreeMap<String, Capabilities> {
        &self.capabilities
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    /// Non-fatal problems from the last catalog load and discovery.
    pub fn warnings(&self) -> &[Error] {
        &self.warnings
    }

    pub fn catalog_error(&self) -> Option<&Error> {
        self.catalog_error.as_ref()
    }

    fn caps(&self, unit_id: &str) -> Capabilities {
        self.capabilities.get(unit_id).copied().unwrap_or_default()
    }

    pub fn toggle(&mut self, unit_id: &str) -> Result<bool> {
        let checked = self.registry.toggle(unit_id)?;
        self.workflow.invalidate();
        Ok(checked)
    }

    /// Payload for the check and build calls: the selection plus each
    /// selected unit's settings.
    pub fn build_request(&self) -> BuildRequest {
        let mut request = BuildRequest {
            selected_services: self.registry.selected_ids().to_vec(),
            ..Default::default()
        };
        for id in self.registry.selected_ids() {
            let cfg = self
                .settings
                .unit(id)
                .map(|t| toml_to_json(&toml::Value::Table(t.clone())))
                .unwrap_or_else(|| Value::Object(Default::default()));
            request.configurations.services.insert(id.clone(), cfg);
        }
        request
    }

    fn local_issues(&self) -> Vec<UnitIssue> {
        let selection = self.registry.selected_ids();
        let mut issues = Vec::new();
        for id in selection {
            if !self.caps(id).run_checks {
                continue;
            }
            let Some(ext) = self.extensions.get(id) else {
                continue;
            };
            let ctx = CheckCtx {
                unit_id: id,
                selection,
                settings: &self.settings,
                schemas: &self.schemas,
            };
            match ext.run_checks(&ctx) {
                Ok(found) => issues.extend(found),
                Err(e) => {
                    tracing::warn!(unit = %id, error = %e, "checks hook failed");
                    issues.push(UnitIssue::new(id.as_str(), "check-error", e.message()));
                }
            }
        }
        issues
    }

    /// Run the remote check plus local checks hooks and annotate the
    /// registry. A service failure moves the workflow to `Failed`.
    pub fn run_validation(&mut self, validator: &dyn ValidationService) -> Result<ValidationResult> {
        let selection = self.registry.selected_ids().to_vec();
        let request = self.build_request();
        self.workflow.begin();
        tracing::info!(selected = ?selection, "validation started");

        let response = match validator.check(&request) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "validation service failed");
                self.workflow.fail(e.message());
                self.registry.clear_issues();
                return Err(e);
            }
        };
        if !response.complete {
            let e = Error::validation_service("validation service returned no issue list");
            self.workflow.fail(e.message());
            self.registry.clear_issues();
            return Err(e);
        }

        let result = ValidationResult::from_parts(&selection, response, self.local_issues());
        tracing::info!(
            pass = result.overall_pass,
            issues = result.issues.len(),
            "validation finished"
        );
        self.registry.apply_result(&result);
        self.workflow.complete(result.clone());
        Ok(result)
    }

    /// Run pre-build hooks in selection order. The first refusal or error
    /// stops the build.
    fn run_pre_build(&mut self, request: &mut BuildRequest) -> std::result::Result<(), (String, String)> {
        let selection = self.registry.selected_ids().to_vec();
        for id in &selection {
            if !self.caps(id).pre_build {
                continue;
            }
            let Some(ext) = self.extensions.get_mut(id) else {
                continue;
            };
            let unit_settings = self.settings.unit(id).cloned().unwrap_or_default();
            match ext.pre_build(&unit_settings, request) {
                Ok(true) => {}
                Ok(false) => return Err((id.clone(), "pre-build hook declined".into())),
                Err(e) => return Err((id.clone(), e.message().to_string())),
            }
        }
        Ok(())
    }

    fn run_post_build(&mut self) {
        let selection = self.registry.selected_ids().to_vec();
        for id in &selection {
            if !self.caps(id).post_build {
                continue;
            }
            let Some(ext) = self.extensions.get_mut(id) else {
                continue;
            };
            let failure = match ext.post_build() {
                Ok(true) => None,
                Ok(false) => Some("post-build hook reported failure".to_string()),
                Err(e) => Some(e.message().to_string()),
            };
            if let Some(reason) = failure {
                tracing::warn!(unit = %id, reason = %reason, "post-build hook failed");
                self.warnings
                    .push(Error::msg(format!("post-build for '{id}': {reason}")));
            }
        }
    }

    /// Submit from `Checked`. Build failures leave the check result in
    /// place so the operator can retry without checking again.
    pub fn submit_build(&mut self, builder: &dyn BuildService) -> ConfirmOutcome {
        if !self.workflow.is_checked() {
            return ConfirmOutcome::BuildFailed(Error::msg("build requires a completed check"));
        }
        let mut request = self.build_request();
        if let Err((unit_id, reason)) = self.run_pre_build(&mut request) {
            tracing::warn!(unit = %unit_id, reason = %reason, "build declined");
            return ConfirmOutcome::BuildDeclined { unit_id, reason };
        }

        tracing::info!(selected = ?request.selected_services, "submitting build");
        let receipt = match builder.submit(&request) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "build service failed");
                return ConfirmOutcome::BuildFailed(e);
            }
        };

        let selection = self.registry.selected_ids().to_vec();
        self.settings.set_selected_services(&selection);
        if let Err(e) = self.settings.save() {
            tracing::warn!(error = %e, "could not save build settings");
            self.warnings.push(e);
        }
        self.run_post_build();
        tracing::info!(build_id = ?receipt.build_id, "build requested");
        ConfirmOutcome::BuildRequested(receipt)
    }

    /// First press checks, second press builds.
    pub fn confirm(&mut self, collab: &Collaborators<'_>) -> ConfirmOutcome {
        if self.registry.selected_ids().is_empty() {
            let e = Error::user_input("Select at least one unit before confirming.");
            tracing::debug!(error = %e, "confirm ignored");
            return ConfirmOutcome::EmptySelection;
        }
        if self.workflow.is_checked() {
            return self.submit_build(collab.builder);
        }
        match self.run_validation(collab.validator) {
            Ok(result) => ConfirmOutcome::Checked(result),
            Err(e) => ConfirmOutcome::CheckFailed(e),
        }
    }

    /// Leave `Failed` for `Stale`.
    pub fn acknowledge_failure(&mut self) {
        self.workflow.acknowledge_failure();
    }

    /// Run a unit's options sub-menu. A reported change, or any edit to the
    /// unit's settings left by a failing hook, invalidates the check and is
    /// written back to the settings file.
    pub fn open_options(&mut self, unit_id: &str, fe: &mut dyn Frontend) -> Result<OptionsOutcome> {
        if !self.caps(unit_id).options {
            return Err(Error::user_input(format!("'{unit_id}' has no options")));
        }
        let Some(ext) = self.extensions.get_mut(unit_id) else {
            return Err(Error::user_input(format!("'{unit_id}' has no options")));
        };
        let before = self.settings.unit(unit_id).cloned().unwrap_or_default();
        let mut ctx = OptionsCtx {
            frontend: fe,
            schema: self.schemas.get(unit_id),
            settings: self.settings.unit_mut(unit_id),
        };
        let result = ext.options(&mut ctx);
        // A hook that fails part way may already have edited the settings.
        let edited = self.settings.unit(unit_id).is_some_and(|t| *t != before);
        let changed = edited || matches!(&result, Ok(o) if o.changed);
        let saved = if changed {
            tracing::info!(unit = unit_id, "options changed");
            self.workflow.invalidate();
            self.registry.clear_issues();
            self.settings.save()
        } else {
            Ok(())
        };
        result?;
        saved?;
        Ok(OptionsOutcome { changed })
    }
}
