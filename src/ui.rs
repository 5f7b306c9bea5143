use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::activity::Activity;
use crate::app::{EditMode, HandTerm};
use crate::content::{GamePhrase, ENTER_KEY};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 1;
const HISTORY_LINES: usize = 5;

pub fn draw(app: &HandTerm, f: &mut Frame) {
    f.render_widget(app, f.area());
}

impl Widget for &HandTerm {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(1), // status
                Constraint::Min(3),    // body
                Constraint::Length(1), // stats
                Constraint::Length(1), // error
                Constraint::Length(1), // legend
            ])
            .split(area);

        render_status(self, chunks[0], buf);
        match self.activity() {
            Activity::Edit => render_editor(self, chunks[1], buf),
            Activity::Tree => render_tree(self, chunks[1], buf),
            Activity::Normal | Activity::Tutorial | Activity::Game => {
                render_console(self, chunks[1], buf)
            }
        }
        render_stats(self, chunks[2], buf);

        if let Some(err) = self.last_error() {
            Paragraph::new(Span::styled(
                err.to_string(),
                Style::default().fg(Color::Red),
            ))
            .render(chunks[3], buf);
        }

        Paragraph::new(Span::styled(
            legend(self),
            Style::default().add_modifier(Modifier::ITALIC),
        ))
        .render(chunks[4], buf);
    }
}

fn render_status(app: &HandTerm, area: Rect, buf: &mut Buffer) {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let mediator = app.mediator();
    let mut spans = vec![
        Span::styled(app.activity().to_string().to_uppercase(), bold.fg(Color::Magenta)),
        Span::raw("  "),
        Span::styled(
            mediator.location().get().to_path(),
            Style::default().add_modifier(Modifier::DIM),
        ),
    ];
    if !mediator.all_tutorials_complete() {
        spans.push(Span::raw(format!(
            "  tutorials done: {}",
            mediator.progress().len()
        )));
    }
    Paragraph::new(Line::from(spans)).render(area, buf);
}

fn current_target(app: &HandTerm) -> Option<GamePhrase> {
    let mediator = app.mediator();
    match app.activity() {
        Activity::Tutorial => mediator.tutorial().get(),
        Activity::Game => mediator.game().get(),
        _ => None,
    }
}

/// Typed characters over the target, green when right and red when wrong.
fn target_spans(target: &str, input: &str) -> Vec<Span<'static>> {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let dim = bold.add_modifier(Modifier::DIM);

    let mut spans = Vec::new();
    let mut expected = target.chars();
    for typed in input.chars() {
        match expected.next() {
            Some(e) if e == typed => spans.push(Span::styled(e.to_string(), bold.fg(Color::Green))),
            Some(_) | None => spans.push(Span::styled(
                match typed {
                    ' ' => "·".to_owned(),
                    c => c.to_string(),
                },
                bold.fg(Color::Red),
            )),
        }
    }
    let rest: String = expected.collect();
    if !rest.is_empty() {
        spans.push(Span::styled(rest, dim));
    }
    spans
}

fn render_console(app: &HandTerm, area: Rect, buf: &mut Buffer) {
    let target = current_target(app);
    let history_height = if target.is_some() { 0 } else { HISTORY_LINES as u16 };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(history_height),
            Constraint::Length(if target.is_some() { 2 } else { 0 }),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(area);

    let history: Vec<Line> = app
        .history()
        .iter()
        .rev()
        .take(HISTORY_LINES)
        .rev()
        .map(|line| Line::from(Span::styled(line.clone(), Style::default().fg(Color::Gray))))
        .collect();
    Paragraph::new(history).render(chunks[1], buf);

    if let Some(phrase) = &target {
        let shown = if phrase.key == ENTER_KEY { "" } else { phrase.key.as_str() };
        let mut lines = vec![Line::from(target_spans(shown, app.input()))];
        if let Some(value) = phrase.value.as_deref().filter(|_| phrase.key != ENTER_KEY) {
            lines.push(Line::from(Span::styled(
                value.to_string(),
                Style::default().add_modifier(Modifier::ITALIC),
            )));
        } else if phrase.key == ENTER_KEY {
            lines.push(Line::from(Span::styled(
                phrase.prompt(),
                Style::default().add_modifier(Modifier::ITALIC),
            )));
        }
        Paragraph::new(lines)
            .alignment(if phrase.key.width() < area.width as usize {
                Alignment::Center
            } else {
                Alignment::Left
            })
            .wrap(Wrap { trim: true })
            .render(chunks[2], buf);
    }

    let prompt = Line::from(vec![
        Span::styled("> ", Style::default().fg(Color::Cyan)),
        Span::raw(app.input().to_string()),
        Span::styled(" ", Style::default().add_modifier(Modifier::UNDERLINED)),
    ]);
    Paragraph::new(prompt).render(chunks[3], buf);
}

fn render_editor(app: &HandTerm, area: Rect, buf: &mut Buffer) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(area);

    let title = app.mediator().edit_target().unwrap_or_default().to_string();
    Paragraph::new(app.editor().to_string())
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false })
        .render(chunks[0], buf);

    let mode = match app.edit_mode() {
        EditMode::Insert => Span::styled(
            "-- INSERT --",
            Style::default().add_modifier(Modifier::BOLD),
        ),
        EditMode::Command => Span::raw(app.edit_command().to_string()),
    };
    Paragraph::new(Line::from(mode)).render(chunks[1], buf);
}

fn render_tree(app: &HandTerm, area: Rect, buf: &mut Buffer) {
    let items = app.tree_items();
    let lines: Vec<Line> = if items.is_empty() {
        vec![Line::from(Span::styled(
            "(empty)",
            Style::default().add_modifier(Modifier::DIM),
        ))]
    } else {
        items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                let name = if item.is_directory() {
                    format!("{}/", item.path)
                } else {
                    item.path.clone()
                };
                let style = if idx == app.tree_cursor() {
                    Style::default().add_modifier(Modifier::REVERSED)
                } else if item.is_directory() {
                    Style::default().fg(Color::Blue)
                } else {
                    Style::default()
                };
                Line::from(Span::styled(name, style))
            })
            .collect()
    };

    Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("tree"))
        .render(area, buf);
}

fn render_stats(app: &HandTerm, area: Rect, buf: &mut Buffer) {
    let Some(wpm) = app.last_wpm() else {
        return;
    };
    let slowest = app
        .slowest()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("  ");
    let text = if slowest.is_empty() {
        format!("{wpm:.1} wpm")
    } else {
        format!("{wpm:.1} wpm   slowest  {slowest}")
    };
    Paragraph::new(Span::styled(
        text,
        Style::default().add_modifier(Modifier::BOLD),
    ))
    .alignment(Alignment::Center)
    .render(area, buf);
}

fn legend(app: &HandTerm) -> String {
    match app.activity() {
        Activity::Edit => match app.edit_mode() {
            EditMode::Insert => "(esc) command mode".to_string(),
            EditMode::Command => ":w save / :wq save and quit / :q quit / (esc) back".to_string(),
        },
        Activity::Tree => "(↑/↓) move / (enter) open / (esc) close".to_string(),
        Activity::Tutorial | Activity::Game => {
            "type the phrase, (enter) submit / (esc)ape".to_string()
        }
        Activity::Normal => "tut / play / edit <file> / tree / (esc)ape".to_string(),
    }
}
