//! Menu state: the unit registry, the scrolling viewport, the check/build
//! workflow and the session that ties them to the collaborators.

pub mod registry;
pub mod session;
pub mod viewport;
pub mod workflow;

pub use registry::{IssueState, MenuItem, Registry};
pub use session::{ConfirmOutcome, Session};
pub use viewport::Viewport;
pub use workflow::{CheckState, ValidationResult, ValidationWorkflow};
