//! Drawing for the main menu and sub-menus. Everything here reads state and
//! never changes it.

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::menu::registry::{IssueState, MenuItem};
use crate::menu::viewport::Viewport;
use crate::menu::workflow::CheckState;
use crate::sanitize::{MAX_MESSAGE_CHARS, clean_text, truncate_label};
use crate::ui::frontend::Theme;

pub const LABEL_WIDTH: usize = 23;

const HEADER_ROWS: u16 = 3;
// List borders plus the two scroll-indicator rows.
const LIST_CHROME_ROWS: u16 = 4;
const HELP_ROWS: u16 = 3;
const NOTICE_ROWS: u16 = 1;
const MIN_PANEL_ROWS: u16 = 3;

const EMPTY_CATALOG: &str = "No menu items were loaded. Press [Esc] to go back";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warn,
    Error,
}

/// One-line status message under the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    pub fn warn(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warn,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

/// Rows the main menu needs besides the list body.
pub fn reserved_rows(show_help: bool) -> u16 {
    HEADER_ROWS
        + LIST_CHROME_ROWS
        + if show_help { HELP_ROWS } else { 0 }
        + NOTICE_ROWS
        + MIN_PANEL_ROWS
}

/// List rows available on a terminal `term_height` rows tall.
pub fn available_rows(term_height: u16, show_help: bool) -> usize {
    usize::from(term_height.saturating_sub(reserved_rows(show_help))).max(1)
}

pub fn submenu_reserved_rows(note_count: usize, show_help: bool) -> u16 {
    let notes = u16::try_from(note_count).unwrap_or(u16::MAX);
    HEADER_ROWS
        .saturating_add(notes)
        .saturating_add(LIST_CHROME_ROWS)
        .saturating_add(if show_help { HELP_ROWS } else { 0 })
}

fn badge(issue: IssueState) -> &'static str {
    match issue {
        IssueState::Unknown => "",
        IssueState::Pass => "Pass",
        IssueState::Fail => "Issue",
    }
}

/// Text of one menu row, without the cursor column.
pub fn format_row(item: &MenuItem) -> String {
    let mark = if item.checked { " (X) " } else { " ( ) " };
    let label = truncate_label(&item.display_label, LABEL_WIDTH);
    let opts = if item.has_options { ">> Options" } else { "" };
    let row = format!("{mark}{label:<LABEL_WIDTH$}  {opts:<10}  {}", badge(item.issue));
    row.trim_end().to_string()
}

fn state_label(state: &CheckState) -> String {
    match state {
        CheckState::Stale => "not checked".into(),
        CheckState::Checking => "checking...".into(),
        CheckState::Checked(r) if r.overall_pass => "checked: pass".into(),
        CheckState::Checked(r) => format!("checked: {} issue(s)", r.issues.len()),
        CheckState::Failed(_) => "check failed".into(),
    }
}

fn block<'a>(title: impl Into<Line<'a>>, theme: Theme) -> Block<'a> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_type(theme.border_type())
}

fn arrow_line(show: bool, arrow: &'static str) -> Line<'static> {
    if show {
        Line::from(Span::styled(
            format!("  {arrow} more"),
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Line::from("")
    }
}

pub struct MenuView<'a> {
    pub title: &'a str,
    pub items: &'a [MenuItem],
    pub selection: Option<usize>,
    pub viewport: &'a Viewport,
    pub state: &'a CheckState,
    pub selected_count: usize,
    pub show_help: bool,
    pub notice: Option<&'a Notice>,
    pub theme: Theme,
}

pub fn draw_menu(f: &mut Frame<'_>, view: &MenuView<'_>) {
    let page = u16::try_from(view.viewport.page_size()).unwrap_or(u16::MAX);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(HEADER_ROWS),
            Constraint::Length(page.saturating_add(LIST_CHROME_ROWS)),
            Constraint::Length(if view.show_help { HELP_ROWS } else { 0 }),
            Constraint::Length(NOTICE_ROWS),
            Constraint::Min(0),
        ])
        .split(f.area());

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            format!("{} selected", view.selected_count),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw("  |  "),
        Span::raw(state_label(view.state)),
    ]))
    .block(block(view.title, view.theme));
    f.render_widget(header, chunks[0]);

    draw_list(f, chunks[1], view);

    if view.show_help {
        let enter = if matches!(view.state, CheckState::Checked(_)) {
            "create build"
        } else {
            "check build"
        };
        draw_help(
            f,
            chunks[2],
            vec![
                Line::from("[Up/Down k/j] move  [Space] select  [Right] options  [Tab] page size"),
                Line::from(format!(
                    "[Enter] {enter}  [r] refresh catalog  [h] hide help  [Esc] quit"
                )),
            ],
        );
    }

    draw_notice(f, chunks[3], view.notice, view.show_help);
    draw_issues(f, chunks[4], view);
}

fn draw_list(f: &mut Frame<'_>, area: Rect, view: &MenuView<'_>) {
    let theme = view.theme;
    let mut lines: Vec<Line> = Vec::new();
    if view.items.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            EMPTY_CATALOG,
            Style::default().fg(Color::Yellow),
        )));
    } else {
        let count = view.items.len();
        lines.push(arrow_line(view.viewport.has_more_above(), theme.up_arrow()));
        for idx in view.viewport.visible_range(count) {
            let item = &view.items[idx];
            let selected = view.selection == Some(idx);
            let mut style = match item.issue {
                IssueState::Fail => Style::default().fg(Color::Red),
                IssueState::Pass => Style::default().fg(Color::Green),
                IssueState::Unknown => Style::default(),
            };
            if selected {
                style = style.add_modifier(Modifier::REVERSED);
            }
            let cursor = if selected { theme.cursor() } else { " " };
            lines.push(Line::from(vec![
                Span::raw(cursor),
                Span::styled(format_row(item), style),
            ]));
        }
        lines.push(arrow_line(
            view.viewport.has_more_below(count),
            theme.down_arrow(),
        ));
    }
    f.render_widget(
        Paragraph::new(Text::from(lines)).block(block("Units", theme)),
        area,
    );
}

fn draw_help(f: &mut Frame<'_>, area: Rect, lines: Vec<Line<'static>>) {
    let p = Paragraph::new(Text::from(lines))
        .style(Style::default().fg(Color::DarkGray))
        .block(Block::default().title("Help").borders(Borders::TOP));
    f.render_widget(p, area);
}

fn draw_notice(f: &mut Frame<'_>, area: Rect, notice: Option<&Notice>, show_help: bool) {
    let line = match notice {
        Some(n) => {
            let color = match n.level {
                NoticeLevel::Info => Color::Cyan,
                NoticeLevel::Warn => Color::Yellow,
                NoticeLevel::Error => Color::Red,
            };
            Line::from(Span::styled(
                clean_text(&n.text, usize::from(area.width.max(4))),
                Style::default().fg(color),
            ))
        }
        None if !show_help => Line::from(Span::styled(
            "Press [h] for help",
            Style::default().fg(Color::DarkGray),
        )),
        None => Line::from(""),
    };
    f.render_widget(Paragraph::new(line), area);
}

fn draw_issues(f: &mut Frame<'_>, area: Rect, view: &MenuView<'_>) {
    let theme = view.theme;
    let (title, lines): (String, Vec<Line>) = match view.state {
        CheckState::Stale if view.selected_count == 0 => (
            "Build Issues".into(),
            vec![Line::from("Select units with [Space], then press [Enter] to check.")],
        ),
        CheckState::Stale => (
            "Build Issues".into(),
            vec![Line::from("Press [Enter] to check the selected build.")],
        ),
        CheckState::Checking => (
            "Build Issues".into(),
            vec![Line::from(Span::styled(
                "Checking build...",
                Style::default().fg(Color::Cyan),
            ))],
        ),
        CheckState::Checked(r) => {
            let mut lines: Vec<Line> = r
                .issues
                .iter()
                .map(|i| {
                    Line::from(vec![
                        Span::styled(
                            format!("{}: ", clean_text(&i.unit_id, 40)),
                            Style::default().fg(Color::Red),
                        ),
                        Span::styled(
                            format!("[{}] ", clean_text(&i.issue_type, 32)),
                            Style::default().fg(Color::Yellow),
                        ),
                        Span::raw(clean_text(&i.message, MAX_MESSAGE_CHARS)),
                    ])
                })
                .collect();
            if lines.is_empty() {
                lines.push(Line::from(Span::styled(
                    "No issues found. Press [Enter] to create the build.",
                    Style::default().fg(Color::Green),
                )));
            } else {
                lines.push(Line::from("Press [Enter] to create the build anyway."));
            }
            (format!("Build Issues ({:02})", r.issues.len()), lines)
        }
        CheckState::Failed(reason) => (
            "Validation Failed".into(),
            vec![
                Line::from(Span::styled(
                    clean_text(reason, MAX_MESSAGE_CHARS),
                    Style::default().fg(Color::Red),
                )),
                Line::from("[Enter] retry  [Esc] go back"),
            ],
        ),
    };
    let p = Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: false })
        .block(block(title, theme));
    f.render_widget(p, area);
}

pub struct SubMenuView<'a> {
    pub title: &'a str,
    pub notes: &'a [String],
    /// Label and whether the row can be chosen.
    pub rows: &'a [(String, bool)],
    pub selection: Option<usize>,
    pub viewport: &'a Viewport,
    pub show_help: bool,
    pub theme: Theme,
}

pub fn draw_submenu(f: &mut Frame<'_>, view: &SubMenuView<'_>) {
    let theme = view.theme;
    let notes = u16::try_from(view.notes.len()).unwrap_or(u16::MAX);
    let page = u16::try_from(view.viewport.page_size()).unwrap_or(u16::MAX);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(HEADER_ROWS),
            Constraint::Length(notes),
            Constraint::Length(page.saturating_add(LIST_CHROME_ROWS)),
            Constraint::Length(if view.show_help { HELP_ROWS } else { 0 }),
            Constraint::Min(0),
        ])
        .split(f.area());

    f.render_widget(
        Paragraph::new(Line::from(clean_text(view.title, 64))).block(block("Options", theme)),
        chunks[0],
    );

    let notes: Vec<Line> = view
        .notes
        .iter()
        .map(|n| Line::from(format!(" {}", clean_text(n, MAX_MESSAGE_CHARS))))
        .collect();
    f.render_widget(Paragraph::new(Text::from(notes)), chunks[1]);

    let count = view.rows.len();
    let mut lines = vec![arrow_line(view.viewport.has_more_above(), theme.up_arrow())];
    for idx in view.viewport.visible_range(count) {
        let (label, selectable) = &view.rows[idx];
        let selected = view.selection == Some(idx);
        let mut style = if *selectable {
            Style::default()
        } else {
            Style::default().fg(Color::DarkGray)
        };
        if selected {
            style = style.add_modifier(Modifier::REVERSED);
        }
        let cursor = if selected { theme.cursor() } else { " " };
        lines.push(Line::from(vec![
            Span::raw(cursor),
            Span::styled(format!(" {}", clean_text(label, 64)), style),
        ]));
    }
    lines.push(arrow_line(
        view.viewport.has_more_below(count),
        theme.down_arrow(),
    ));
    f.render_widget(
        Paragraph::new(Text::from(lines)).block(block("", theme)),
        chunks[2],
    );

    if view.show_help {
        draw_help(
            f,
            chunks[3],
            vec![
                Line::from("[Up/Down k/j] move  [Enter/Space] choose"),
                Line::from("[Esc/Left] go back  [h] hide help"),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn item(label: &str, checked: bool, has_options: bool, issue: IssueState) -> MenuItem {
        MenuItem {
            display_label: label.into(),
            unit_id: label.to_lowercase(),
            checked,
            tags: BTreeSet::new(),
            issue,
            has_options,
        }
    }

    #[test]
    fn rows_show_mark_options_and_badge() {
        assert_eq!(
            format_row(&item("Mosquitto", true, false, IssueState::Fail)),
            " (X) Mosquitto                            Issue"
        );
        let row = format_row(&item("OTBR", false, true, IssueState::Unknown));
        assert!(row.starts_with(" ( ) OTBR"));
        assert!(row.ends_with(">> Options"));
    }

    #[test]
    fn long_labels_are_cut_to_the_label_column() {
        let row = format_row(&item(
            "Home Assistant Supervised Container",
            false,
            false,
            IssueState::Pass,
        ));
        assert!(row.contains("Home Assistant Super..."));
        assert!(row.ends_with("Pass"));
    }

    #[test]
    fn help_rows_shrink_the_list() {
        assert_eq!(reserved_rows(false), 11);
        assert_eq!(reserved_rows(true), 14);
        assert_eq!(available_rows(30, false), 19);
        assert_eq!(available_rows(5, true), 1);
    }
}
