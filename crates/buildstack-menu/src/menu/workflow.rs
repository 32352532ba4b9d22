use crate::api::{CheckResponse, UnitIssue};
use crate::menu::registry::IssueState;

/// One completed check pass. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub overall_pass: bool,
    /// The remote check answered without an issue list.
    pub raw_failure: bool,
    pub selection: Vec<String>,
    pub issues: Vec<UnitIssue>,
}

impl ValidationResult {
    /// Keep only issues for units in `selection`, append local issues, and
    /// derive the overall flag from both.
    pub fn from_parts(selection: &[String], remote: CheckResponse, local: Vec<UnitIssue>) -> Self {
        let mut issues: Vec<UnitIssue> = remote
            .issues
            .into_iter()
            .filter(|i| selection.iter().any(|s| *s == i.unit_id))
            .collect();
        let local_clean = local.is_empty();
        issues.extend(local);
        Self {
            overall_pass: remote.complete && remote.overall_pass && local_clean,
            raw_failure: !remote.complete,
            selection: selection.to_vec(),
            issues,
        }
    }

    pub fn issues_for<'a>(&'a self, unit_id: &'a str) -> impl Iterator<Item = &'a UnitIssue> + 'a {
        self.issues.iter().filter(move |i| i.unit_id == unit_id)
    }

    /// Exact id match: selected units without an issue passed.
    pub fn issue_state(&self, unit_id: &str) -> IssueState {
        if self.issues.iter().any(|i| i.unit_id == unit_id) {
            IssueState::Fail
        } else if self.selection.iter().any(|s| s == unit_id) {
            IssueState::Pass
        } else {
            IssueState::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckState {
    /// No result reflects the current selection.
    Stale,
    Checking,
    Checked(ValidationResult),
    /// The check call could not complete; retry or go back.
    Failed(String),
}

/// Check-then-build state machine. Only `Checked` permits a build.
#[derive(Debug, Clone)]
pub struct ValidationWorkflow {
    state: CheckState,
}

impl Default for ValidationWorkflow {
    fn default() -> Self {
        Self {
            state: CheckState::Stale,
        }
    }
}

impl ValidationWorkflow {
    pub fn state(&self) -> &CheckState {
        &self.state
    }

    pub fn result(&self) -> Option<&ValidationResult> {
        match &self.state {
            CheckState::Checked(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_checked(&self) -> bool {
        matches!(self.state, CheckState::Checked(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, CheckState::Failed(_))
    }

    /// Selection or configuration changed.
    pub fn invalidate(&mut self) {
        if !matches!(self.state, CheckState::Stale) {
            tracing::debug!("validation state -> stale");
        }
        self.state = CheckState::Stale;
    }

    pub fn begin(&mut self) {
        self.state = CheckState::Checking;
    }

    pub fn complete(&mut self, result: ValidationResult) {
        self.state = CheckState::Checked(result);
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.state = CheckState::Failed(reason.into());
    }

    /// "Go back" from `Failed`.
    pub fn acknowledge_failure(&mut self) {
        if self.is_failed() {
            self.state = CheckState::Stale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sel(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn absent_from_issue_list_means_pass() {
        let remote = CheckResponse {
            overall_pass: false,
            issues: vec![UnitIssue::new("a", "port-conflict", "1883")],
            complete: true,
        };
        let r = ValidationResult::from_parts(&sel(&["a", "b"]), remote, Vec::new());
        assert_eq!(r.issue_state("a"), IssueState::Fail);
        assert_eq!(r.issue_state("b"), IssueState::Pass);
        assert_eq!(r.issue_state("c"), IssueState::Unknown);
        assert!(!r.overall_pass);
    }

    #[test]
    fn issues_for_unselected_units_are_dropped_and_local_issues_merge() {
        let remote = CheckResponse {
            overall_pass: true,
            issues: vec![UnitIssue::new("ghost", "x", "y")],
            complete: true,
        };
        let local = vec![UnitIssue::new("b", "hardware", "No Thread radio selected.")];
        let r = ValidationResult::from_parts(&sel(&["b"]), remote, local);
        assert_eq!(r.issues.len(), 1);
        assert_eq!(r.issues_for("b").count(), 1);
        assert!(!r.overall_pass);
    }

    #[test]
    fn incomplete_response_is_a_raw_failure() {
        let remote = CheckResponse {
            overall_pass: false,
            issues: Vec::new(),
            complete: false,
        };
        let r = ValidationResult::from_parts(&sel(&["a"]), remote, Vec::new());
        assert!(r.raw_failure);
        assert!(!r.overall_pass);
    }

    #[test]
    fn failure_goes_back_to_stale_only_from_failed() {
        let mut wf = ValidationWorkflow::default();
        wf.begin();
        wf.fail("connection refused");
        assert!(wf.is_failed());
        wf.acknowledge_failure();
        assert_eq!(wf.state(), &CheckState::Stale);

        wf.complete(ValidationResult::from_parts(
            &sel(&["a"]),
            CheckResponse {
                overall_pass: true,
                issues: Vec::new(),
                complete: true,
            },
            Vec::new(),
        ));
        wf.acknowledge_failure();
        assert!(wf.is_checked());
        wf.invalidate();
        assert_eq!(wf.state(), &CheckState::Stale);
    }
}
