use std::collections::VecDeque;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::backend::Backend;
use ratatui::widgets::BorderType;
use ratatui::{Frame, Terminal};

use crate::config::RenderMode;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    Key(KeyCode, KeyModifiers),
    /// New terminal size (columns, rows).
    Resize(u16, u16),
}

impl UiEvent {
    pub fn key(code: KeyCode) -> Self {
        UiEvent::Key(code, KeyModifiers::NONE)
    }
}

pub trait EventSource {
    /// Block until the next key press or resize.
    fn next_event(&mut self) -> Result<UiEvent>;
}

/// Reads from the real terminal. Key releases and repeats are dropped.
#[derive(Debug, Default)]
pub struct CrosstermEvents;

impl EventSource for CrosstermEvents {
    fn next_event(&mut self) -> Result<UiEvent> {
        loop {
            match event::read().map_err(|e| Error::msg(format!("terminal read failed: {e}")))? {
                Event::Key(k) if k.kind == KeyEventKind::Press => {
                    return Ok(UiEvent::Key(k.code, k.modifiers));
                }
                Event::Resize(w, h) => return Ok(UiEvent::Resize(w, h)),
                _ => {}
            }
        }
    }
}

/// Replays a fixed event sequence; errors once it runs dry.
#[derive(Debug, Default)]
pub struct ScriptedEvents {
    queue: VecDeque<UiEvent>,
}

impl ScriptedEvents {
    pub fn new(events: impl IntoIterator<Item = UiEvent>) -> Self {
        Self {
            queue: events.into_iter().collect(),
        }
    }

    pub fn keys(codes: &[KeyCode]) -> Self {
        Self::new(codes.iter().map(|c| UiEvent::key(*c)))
    }
}

impl EventSource for ScriptedEvents {
    fn next_event(&mut self) -> Result<UiEvent> {
        self.queue
            .pop_front()
            .ok_or_else(|| Error::msg("event script exhausted"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Theme {
    pub ascii: bool,
}

impl Theme {
    pub fn from_mode(mode: RenderMode) -> Self {
        Self {
            ascii: mode == RenderMode::Ascii,
        }
    }

    pub fn border_type(&self) -> BorderType {
        if self.ascii {
            BorderType::Plain
        } else {
            BorderType::Rounded
        }
    }

    pub fn up_arrow(&self) -> &'static str {
        if self.ascii { "^" } else { "▲" }
    }

    pub fn down_arrow(&self) -> &'static str {
        if self.ascii { "v" } else { "▼" }
    }

    pub fn cursor(&self) -> &'static str {
        if self.ascii { ">" } else { "▶" }
    }
}

/// The terminal surface the menu loop and sub-menus draw on.
pub trait Frontend {
    fn theme(&self) -> Theme;

    /// Current size as (columns, rows).
    fn size(&self) -> Result<(u16, u16)>;

    fn draw(&mut self, render: &mut dyn FnMut(&mut Frame<'_>)) -> Result<()>;

    fn next_event(&mut self) -> Result<UiEvent>;
}

pub struct TerminalFrontend<B: Backend, E: EventSource> {
    terminal: Terminal<B>,
    events: E,
    theme: Theme,
}

impl<B: Backend, E: EventSource> TerminalFrontend<B, E> {
    pub fn new(backend: B, events: E, theme: Theme) -> Result<Self> {
        let terminal = Terminal::new(backend)
            .map_err(|e| Error::msg(format!("terminal init failed: {e}")))?;
        Ok(Self {
            terminal,
            events,
            theme,
        })
    }

    pub fn terminal(&self) -> &Terminal<B> {
        &self.terminal
    }

    pub fn terminal_mut(&mut self) -> &mut Terminal<B> {
        &mut self.terminal
    }
}

impl<B: Backend, E: EventSource> Frontend for TerminalFrontend<B, E> {
    fn theme(&self) -> Theme {
        self.theme
    }

    fn size(&self) -> Result<(u16, u16)> {
        let s = self
            .terminal
            .size()
            .map_err(|e| Error::msg(format!("terminal size unavailable: {e}")))?;
        Ok((s.width, s.height))
    }

    fn draw(&mut self, render: &mut dyn FnMut(&mut Frame<'_>)) -> Result<()> {
        self.terminal
            .draw(|f| render(f))
            .map_err(|e| Error::msg(format!("tui draw failed: {e}")))?;
        Ok(())
    }

    fn next_event(&mut self) -> Result<UiEvent> {
        self.events.next_event()
    }
}
