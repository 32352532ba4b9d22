//! Terminal front end: the input loop, sub-menus and drawing.

use std::io;

use crossterm::cursor::{Hide, Show};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::backend::CrosstermBackend;

use crate::api::Collaborators;
use crate::config::MenuConfig;
use crate::error::{Error, Result};
use crate::extensions::builtin_extensions;
use crate::menu::session::Session;
use crate::settings::BuildSettings;

pub mod app;
pub mod frontend;
pub mod render;
pub mod submenu;

pub use app::{MenuApp, Outcome};
pub use frontend::{CrosstermEvents, Frontend, ScriptedEvents, TerminalFrontend, Theme, UiEvent};

/// Restores the terminal however the menu exits.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode().map_err(|e| Error::msg(format!("enable raw mode failed: {e}")))?;
        let guard = TerminalGuard;
        execute!(io::stdout(), EnterAlternateScreen, Hide)
            .map_err(|e| Error::msg(format!("enter alternate screen failed: {e}")))?;
        Ok(guard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, Show);
    }
}

/// Load the catalog, then run the interactive menu on the real terminal.
pub fn run_tui(
    collab: Collaborators<'_>,
    settings: BuildSettings,
    cfg: &MenuConfig,
) -> Result<Outcome> {
    let session = Session::load(collab.catalog, settings, builtin_extensions);
    let mut app = MenuApp::new(session, collab, cfg.menu.compact_rows);

    let _guard = TerminalGuard::enter()?;
    let mut fe = TerminalFrontend::new(
        CrosstermBackend::new(io::stdout()),
        CrosstermEvents,
        Theme::from_mode(cfg.menu.render_mode),
    )?;
    fe.terminal_mut()
        .clear()
        .map_err(|e| Error::msg(format!("tui clear failed: {e}")))?;

    let outcome = app.run(&mut fe);
    tracing::info!(outcome = ?outcome.as_ref().ok(), "menu closed");
    outcome
}
