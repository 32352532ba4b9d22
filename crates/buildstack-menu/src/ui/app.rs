use crossterm::event::{KeyCode, KeyModifiers};
use ratatui::Frame;

use crate::api::{BuildReceipt, Collaborators};
use crate::error::Result;
use crate::menu::session::{ConfirmOutcome, Session};
use crate::menu::viewport::{Viewport, wrap};
use crate::ui::frontend::{Frontend, UiEvent};
use crate::ui::render::{MenuView, Notice, available_rows, draw_menu};

const TITLE: &str = "Buildstack: select build units";

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    BuildRequested(BuildReceipt),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    Browsing,
    /// A unit's options sub-menu owns the terminal.
    AwaitingSubMenu,
    Terminated(Outcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    MoveUp,
    MoveDown,
    Toggle,
    Options,
    Confirm,
    Cancel,
    Quit,
    ToggleHelp,
    TogglePageSize,
    Refresh,
}

pub fn action_for(code: KeyCode, mods: KeyModifiers) -> Option<Action> {
    if mods.contains(KeyModifiers::CONTROL) && matches!(code, KeyCode::Char('c')) {
        return Some(Action::Quit);
    }
    Some(match code {
        KeyCode::Up | KeyCode::Char('k') => Action::MoveUp,
        KeyCode::Down | KeyCode::Char('j') => Action::MoveDown,
        KeyCode::Char(' ') => Action::Toggle,
        KeyCode::Right => Action::Options,
        KeyCode::Enter => Action::Confirm,
        KeyCode::Esc => Action::Cancel,
        KeyCode::Char('h') => Action::ToggleHelp,
        KeyCode::Tab => Action::TogglePageSize,
        KeyCode::Char('r') => Action::Refresh,
        _ => return None,
    })
}

/// The main menu: the session plus everything that only matters on screen.
pub struct MenuApp<'a> {
    session: Session,
    collab: Collaborators<'a>,
    state: LoopState,
    selection: usize,
    viewport: Viewport,
    compact_rows: usize,
    expanded: bool,
    show_help: bool,
    term_height: u16,
    pending_resize: Option<u16>,
    notice: Option<Notice>,
}

impl<'a> MenuApp<'a> {
    pub fn new(session: Session, collab: Collaborators<'a>, compact_rows: usize) -> Self {
        let notice = load_notice(&session);
        Self {
            session,
            collab,
            state: LoopState::Browsing,
            selection: 0,
            viewport: Viewport::new(compact_rows),
            compact_rows: compact_rows.max(1),
            expanded: false,
            show_help: true,
            term_height: 0,
            pending_resize: None,
            notice,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn selection(&self) -> Option<usize> {
        (!self.session.registry().is_empty()).then_some(self.selection)
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn show_help(&self) -> bool {
        self.show_help
    }

    /// Record a new terminal height. Applied at the top of the next loop
    /// iteration; only the viewport changes.
    pub fn schedule_resize(&mut self, rows: u16) {
        self.pending_resize = Some(rows);
    }

    fn relayout(&mut self) {
        let available = available_rows(self.term_height, self.show_help);
        let page = if self.expanded {
            available
        } else {
            self.compact_rows.min(available)
        };
        let count = self.session.registry().len();
        self.viewport.set_page_size(page, self.selection, count);
    }

    fn apply_pending_resize(&mut self) {
        if let Some(rows) = self.pending_resize.take() {
            self.term_height = rows;
            self.relayout();
        }
    }

    fn redraw(&self, fe: &mut dyn Frontend) -> Result<()> {
        let registry = self.session.registry();
        let view = MenuView {
            title: TITLE,
            items: registry.items(),
            selection: self.selection(),
            viewport: &self.viewport,
            state: self.session.workflow().state(),
            selected_count: registry.selected_ids().len(),
            show_help: self.show_help,
            notice: self.notice.as_ref(),
            theme: fe.theme(),
        };
        fe.draw(&mut |f: &mut Frame<'_>| draw_menu(f, &view))
    }

    /// Block on input until the operator builds or leaves.
    pub fn run(&mut self, fe: &mut dyn Frontend) -> Result<Outcome> {
        self.schedule_resize(fe.size()?.1);
        loop {
            self.apply_pending_resize();
            self.redraw(fe)?;
            if let LoopState::Terminated(outcome) = &self.state {
                return Ok(outcome.clone());
            }
            match fe.next_event()? {
                UiEvent::Resize(_, rows) => self.schedule_resize(rows),
                UiEvent::Key(code, mods) => {
                    if let Some(action) = action_for(code, mods) {
                        self.dispatch(action, fe)?;
                    }
                }
            }
        }
    }

    fn current_unit(&self) -> Option<String> {
        self.session
            .registry()
            .get(self.selection)
            .map(|i| i.unit_id.clone())
    }

    fn move_by(&mut self, delta: isize) {
        let count = self.session.registry().len();
        if let Some(next) = wrap(self.selection, delta, count) {
            self.selection = next;
            self.viewport.ensure_visible(next, count);
        }
    }

    pub fn dispatch(&mut self, action: Action, fe: &mut dyn Frontend) -> Result<()> {
        if action == Action::Quit {
            self.state = LoopState::Terminated(Outcome::Cancelled);
            return Ok(());
        }
        // Only retry and go-back are live while a failed check is shown.
        if self.session.workflow().is_failed() {
            match action {
                Action::Confirm => self.confirm(fe)?,
                Action::Cancel => {
                    self.session.acknowledge_failure();
                    self.notice = None;
                }
                _ => {}
            }
            return Ok(());
        }

        match action {
            Action::MoveUp => self.move_by(-1),
            Action::MoveDown => self.move_by(1),
            Action::Toggle => {
                if let Some(id) = self.current_unit() {
                    self.session.toggle(&id)?;
                    self.notice = None;
                }
            }
            Action::Options => self.open_options(fe)?,
            Action::Confirm => self.confirm(fe)?,
            Action::Cancel => self.state = LoopState::Terminated(Outcome::Cancelled),
            Action::ToggleHelp => {
                self.show_help = !self.show_help;
                self.relayout();
            }
            Action::TogglePageSize => {
                self.expanded = !self.expanded;
                self.relayout();
            }
            Action::Refresh => {
                self.session.refresh(self.collab.catalog);
                let count = self.session.registry().len();
                self.selection = self.selection.min(count.saturating_sub(1));
                self.relayout();
                self.notice = Some(load_notice(&self.session).unwrap_or_else(|| {
                    Notice::info(format!("Catalog refreshed: {count} unit(s)"))
                }));
            }
            Action::Quit => {}
        }
        Ok(())
    }

    fn open_options(&mut self, fe: &mut dyn Frontend) -> Result<()> {
        let Some(item) = self.session.registry().get(self.selection) else {
            return Ok(());
        };
        if !item.has_options {
            return Ok(());
        }
        let id = item.unit_id.clone();
        self.state = LoopState::AwaitingSubMenu;
        let result = self.session.open_options(&id, fe);
        self.state = LoopState::Browsing;
        self.notice = match result {
            Ok(o) if o.changed => Some(Notice::info(format!("Options for '{id}' updated"))),
            Ok(_) => None,
            Err(e) => Some(Notice::error(format!("Options for '{id}' failed: {e}"))),
        };
        // The sub-menu may have seen resizes the parent never did.
        self.schedule_resize(fe.size()?.1);
        Ok(())
    }

    fn confirm(&mut self, fe: &mut dyn Frontend) -> Result<()> {
        let checking = !self.session.workflow().is_checked()
            && !self.session.registry().selected_ids().is_empty();
        if checking {
            self.notice = Some(Notice::info("Checking build..."));
            self.redraw(fe)?;
        }
        let outcome = self.session.confirm(&self.collab);
        self.notice = match outcome {
            ConfirmOutcome::EmptySelection => Some(Notice::warn(
                "Select at least one unit before confirming.",
            )),
            ConfirmOutcome::Checked(r) if r.overall_pass => Some(Notice::info(
                "All checks passed. Press [Enter] again to create the build.",
            )),
            ConfirmOutcome::Checked(r) => Some(Notice::warn(format!(
                "{} issue(s) found. Press [Enter] again to build anyway.",
                r.issues.len()
            ))),
            ConfirmOutcome::CheckFailed(e) => Some(Notice::error(format!("Check failed: {e}"))),
            ConfirmOutcome::BuildDeclined { unit_id, reason } => Some(Notice::warn(format!(
                "Build stopped by '{unit_id}': {reason}"
            ))),
            ConfirmOutcome::BuildFailed(e) => Some(Notice::error(format!(
                "Build request failed: {e}. Press [Enter] to retry."
            ))),
            ConfirmOutcome::BuildRequested(receipt) => {
                self.state = LoopState::Terminated(Outcome::BuildRequested(receipt));
                None
            }
        };
        Ok(())
    }
}

fn load_notice(session: &Session) -> Option<Notice> {
    if let Some(e) = session.catalog_error() {
        return Some(Notice::error(format!("Catalog unavailable: {e}")));
    }
    match session.warnings() {
        [] => None,
        [one] => Some(Notice::warn(one.to_string())),
        [first, rest @ ..] => Some(Notice::warn(format!(
            "{} warnings; first: {first}",
            rest.len() + 1
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_map_covers_the_menu_actions() {
        let none = KeyModifiers::NONE;
        assert_eq!(action_for(KeyCode::Char('j'), none), Some(Action::MoveDown));
        assert_eq!(action_for(KeyCode::Up, none), Some(Action::MoveUp));
        assert_eq!(action_for(KeyCode::Char(' '), none), Some(Action::Toggle));
        assert_eq!(action_for(KeyCode::Right, none), Some(Action::Options));
        assert_eq!(action_for(KeyCode::Tab, none), Some(Action::TogglePageSize));
        assert_eq!(
            action_for(KeyCode::Char('c'), KeyModifiers::CONTROL),
            Some(Action::Quit)
        );
        assert_eq!(action_for(KeyCode::Char('x'), none), None);
    }
}
