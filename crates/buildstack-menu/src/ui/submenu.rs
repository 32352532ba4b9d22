use crossterm::event::{KeyCode, KeyModifiers};
use ratatui::Frame;

use crate::error::Result;
use crate::menu::viewport::{Viewport, wrap};
use crate::ui::frontend::{Frontend, UiEvent};
use crate::ui::render::{SubMenuView, draw_submenu, submenu_reserved_rows};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubMenuResult<A> {
    Chosen(A),
    Back,
}

#[derive(Debug, Clone)]
struct Entry<A> {
    label: String,
    action: Option<A>,
}

/// A nested menu with its own selection, viewport and input loop. Runs on
/// the parent's frontend (and so its theme) and hands its result back to
/// the caller when an entry is chosen or the operator goes back.
#[derive(Debug, Clone)]
pub struct SubMenu<A> {
    title: String,
    notes: Vec<String>,
    entries: Vec<Entry<A>>,
}

impl<A: Clone> SubMenu<A> {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            notes: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Informational line above the entries.
    pub fn note(mut self, text: impl Into<String>) -> Self {
        self.notes.push(text.into());
        self
    }

    pub fn entry(mut self, label: impl Into<String>, action: A) -> Self {
        self.entries.push(Entry {
            label: label.into(),
            action: Some(action),
        });
        self
    }

    /// A row that the cursor skips.
    pub fn heading(mut self, label: impl Into<String>) -> Self {
        self.entries.push(Entry {
            label: label.into(),
            action: None,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn step(&self, from: usize, delta: isize) -> Option<usize> {
        let n = self.entries.len();
        let mut cur = from;
        for _ in 0..n {
            cur = wrap(cur, delta, n)?;
            if self.entries[cur].action.is_some() {
                return Some(cur);
            }
        }
        None
    }

    pub fn run(&self, fe: &mut dyn Frontend) -> Result<SubMenuResult<A>> {
        let rows: Vec<(String, bool)> = self
            .entries
            .iter()
            .map(|e| (e.label.clone(), e.action.is_some()))
            .collect();
        let count = rows.len();
        let mut selection = self.entries.iter().position(|e| e.action.is_some());
        let mut show_help = true;
        let mut viewport = Viewport::default();
        let mut pending_resize = Some(fe.size()?.1);

        loop {
            if let Some(height) = pending_resize.take() {
                let reserved = submenu_reserved_rows(self.notes.len(), show_help);
                let page = usize::from(height.saturating_sub(reserved)).max(1);
                viewport.set_page_size(page, selection.unwrap_or(0), count);
            }

            let theme = fe.theme();
            let view = SubMenuView {
                title: &self.title,
                notes: &self.notes,
                rows: &rows,
                selection,
                viewport: &viewport,
                show_help,
                theme,
            };
            fe.draw(&mut |f: &mut Frame<'_>| draw_submenu(f, &view))?;

            let (code, mods) = match fe.next_event()? {
                UiEvent::Resize(_, h) => {
                    pending_resize = Some(h);
                    continue;
                }
                UiEvent::Key(code, mods) => (code, mods),
            };
            if mods.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
                return Ok(SubMenuResult::Back);
            }
            match code {
                KeyCode::Esc | KeyCode::Left | KeyCode::Backspace => {
                    return Ok(SubMenuResult::Back);
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    if let Some(s) = selection {
                        selection = self.step(s, -1);
                    }
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    if let Some(s) = selection {
                        selection = self.step(s, 1);
                    }
                }
                KeyCode::Enter | KeyCode::Char(' ') | KeyCode::Right => {
                    if let Some(action) = selection.and_then(|s| self.entries[s].action.clone()) {
                        return Ok(SubMenuResult::Chosen(action));
                    }
                }
                KeyCode::Char('h') => {
                    show_help = !show_help;
                    pending_resize = Some(fe.size()?.1);
                }
                _ => {}
            }
            if let Some(s) = selection {
                viewport.ensure_visible(s, count);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::frontend::{ScriptedEvents, TerminalFrontend, Theme};
    use ratatui::backend::TestBackend;

    fn frontend(events: ScriptedEvents) -> TerminalFrontend<TestBackend, ScriptedEvents> {
        TerminalFrontend::new(TestBackend::new(60, 20), events, Theme::default()).unwrap()
    }

    #[test]
    fn cursor_skips_headings_and_wraps() {
        let menu = SubMenu::new("Radio")
            .heading("Devices")
            .entry("a", 1)
            .heading("--")
            .entry("b", 2);
        let mut fe = frontend(ScriptedEvents::keys(&[
            KeyCode::Down,
            KeyCode::Down,
            KeyCode::Enter,
        ]));
        assert_eq!(menu.run(&mut fe).unwrap(), SubMenuResult::Chosen(1));
    }

    #[test]
    fn escape_and_left_go_back() {
        let menu = SubMenu::new("x").entry("a", ());
        let mut fe = frontend(ScriptedEvents::keys(&[KeyCode::Left]));
        assert_eq!(menu.run(&mut fe).unwrap(), SubMenuResult::Back);
        let mut fe = frontend(ScriptedEvents::keys(&[KeyCode::Esc]));
        assert_eq!(menu.run(&mut fe).unwrap(), SubMenuResult::Back);
    }

    #[test]
    fn enter_on_a_menu_without_actions_does_nothing() {
        let menu: SubMenu<u8> = SubMenu::new("x").heading("nothing here");
        let mut fe = frontend(ScriptedEvents::keys(&[KeyCode::Enter, KeyCode::Esc]));
        assert_eq!(menu.run(&mut fe).unwrap(), SubMenuResult::Back);
    }
}
