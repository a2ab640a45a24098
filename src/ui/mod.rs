use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use unicode_width::UnicodeWidthChar;

use crate::app::App;
use crate::panels::chat::TranscriptEntry;

mod theme;
use theme::*;

const COMPOSER_HEIGHT: u16 = 5;

pub fn render(f: &mut Frame<'_>, app: &App) {
    let size = f.size();
    if !app.is_visible() {
        render_hidden(f, app, size);
        return;
    }
    if size.width < 30 || size.height < 10 {
        let block = Paragraph::new("終端機視窗過小，請調整至至少 30x10。")
            .wrap(Wrap { trim: true })
            .alignment(Alignment::Center)
            .style(Style::default().fg(FG_PRIMARY).bg(BG_PRIMARY));
        f.render_widget(block, size);
        return;
    }

    let base = Block::default().style(Style::default().bg(BG_PRIMARY));
    f.render_widget(base, size);

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(COMPOSER_HEIGHT),
            Constraint::Length(1),
        ])
        .split(size);

    render_header(f, app, vertical[0]);
    render_transcript(f, app, vertical[1]);
    render_composer(f, app, vertical[2]);
    render_status_bar(f, app, vertical[3]);
}

/// The whole window collapses to one line while hidden.
fn render_hidden(f: &mut Frame<'_>, app: &App, area: Rect) {
    f.render_widget(Clear, area);
    let base = Block::default().style(Style::default().bg(BG_PRIMARY));
    f.render_widget(base, area);
    let strip = Rect {
        height: area.height.min(1),
        ..area
    };
    let text = format!(
        " QuickChat hidden, press {} to show, Ctrl+Q to quit ",
        app.hotkey_label()
    );
    let paragraph =
        Paragraph::new(Line::from(Span::styled(text, Style::default().fg(FG_DIM))))
            .style(Style::default().bg(BG_PRIMARY));
    f.render_widget(paragraph, strip);
}

fn render_header(f: &mut Frame<'_>, app: &App, area: Rect) {
    let agent = app.active_agent();
    let spans = vec![
        Span::styled(
            " QuickChat ",
            Style::default()
                .fg(BAR_TEXT)
                .bg(BAR_HIGHLIGHT_BG)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(" @{} ", agent.nickname),
            Style::default().fg(BAR_TEXT).bg(BAR_BG),
        ),
        Span::styled(
            format!("{} ", agent.model),
            Style::default().fg(FG_DIM).bg(BAR_BG),
        ),
    ];
    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(BAR_BG));
    f.render_widget(paragraph, area);
}

fn render_transcript(f: &mut Frame<'_>, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER_IDLE))
        .title(Span::styled("對話", Style::default().fg(FG_PRIMARY)))
        .style(Style::default().bg(BG_PANEL));
    let wrap_width = block.inner(area).width.max(1) as usize;

    let items: Vec<ListItem> = app
        .transcript
        .entries()
        .iter()
        .map(|entry| {
            let (title, title_style, body_style) = match entry {
                TranscriptEntry::User { agent, .. } => (
                    format!("You → @{agent}"),
                    Style::default().fg(USER_FG).add_modifier(Modifier::BOLD),
                    Style::default().fg(Color::White),
                ),
                TranscriptEntry::Assistant { agent, job, .. } => {
                    let title = if job.is_some() {
                        format!("AI @{agent} …")
                    } else {
                        format!("AI @{agent}")
                    };
                    let color = if job.is_some() { STREAMING_FG } else { ASSISTANT_FG };
                    (
                        title,
                        Style::default().fg(color).add_modifier(Modifier::BOLD),
                        Style::default().fg(FG_PRIMARY),
                    )
                }
                TranscriptEntry::Info { title, .. } => (
                    title.clone(),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::ITALIC),
                    Style::default().fg(FG_DIM),
                ),
                TranscriptEntry::Error { title, .. } => (
                    title.clone(),
                    Style::default().fg(ERROR_FG).add_modifier(Modifier::BOLD),
                    Style::default().fg(ERROR_FG),
                ),
            };
            let mut lines = vec![Line::from(Span::styled(title, title_style))];
            let body = entry.text();
            if body.is_empty() {
                push_wrapped_line(&mut lines, "", body_style, wrap_width);
            } else {
                for line in body.lines() {
                    push_wrapped_line(&mut lines, line, body_style, wrap_width);
                }
            }
            ListItem::new(lines)
        })
        .collect();

    let mut state = ListState::default();
    if !app.transcript.is_empty() {
        state.select(Some(app.transcript.selected_index()));
    }

    let list = List::new(items)
        .block(block)
        .style(Style::default().bg(BG_PANEL))
        .highlight_style(Style::default().bg(SELECTION_BG));

    f.render_stateful_widget(list, area, &mut state);
}

fn render_composer(f: &mut Frame<'_>, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(
            Style::default()
                .fg(BORDER_FOCUS)
                .add_modifier(Modifier::BOLD),
        )
        .title(Span::styled(
            "輸入訊息 (Enter 傳送 / Shift+Enter 換行)",
            Style::default().fg(FG_PRIMARY),
        ))
        .style(Style::default().bg(BG_PANEL));

    let inner = block.inner(area);
    let lines: Vec<Line> = if app.composer.is_empty() {
        vec![Line::from(Span::styled(
            "輸入訊息，或以 @暱稱 指定代理…",
            Style::default().fg(FG_DIM),
        ))]
    } else {
        app.composer
            .buffer()
            .split('\n')
            .map(|line| {
                Line::from(Span::styled(
                    line.to_string(),
                    Style::default().fg(FG_PRIMARY),
                ))
            })
            .collect()
    };

    let paragraph = Paragraph::new(lines)
        .block(block)
        .style(Style::default().bg(BG_PANEL))
        .wrap(Wrap { trim: false })
        .alignment(Alignment::Left);

    f.render_widget(Clear, area);
    f.render_widget(paragraph, area);

    let width = inner.width.max(1) as usize;
    let (cursor_col, cursor_row) = app.composer.cursor_display_position(width);
    let cursor_x = inner
        .x
        .saturating_add(cursor_col.min(width.saturating_sub(1) as u16));
    let cursor_y = inner
        .y
        .saturating_add(cursor_row.min(inner.height.saturating_sub(1)));
    f.set_cursor(cursor_x, cursor_y);
}

fn push_wrapped_line(lines: &mut Vec<Line>, text: &str, style: Style, width: usize) {
    for segment in wrap_to_width(text, width) {
        lines.push(Line::from(Span::styled(segment, style)));
    }
}

fn wrap_to_width(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }
    if text.is_empty() {
        return vec![String::new()];
    }
    let mut result = Vec::new();
    let mut current = String::new();
    let mut current_width = 0usize;
    for ch in text.chars() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(1).max(1);
        if current_width + ch_width > width && !current.is_empty() {
            result.push(std::mem::take(&mut current));
            current_width = 0;
        }
        current.push(ch);
        current_width += ch_width;
    }
    result.push(current);
    result
}

fn render_status_bar(f: &mut Frame<'_>, app: &App, area: Rect) {
    let agent = app.active_agent();
    let segments = [
        format!("[@{}]", agent.nickname),
        format!("[MODEL:{}]", agent.model),
        format!("[QUEUE:{}]", app.queued()),
        format!("[KEY:{}]", app.hotkey_label()),
    ];

    f.render_widget(Clear, area);
    let mut spans: Vec<Span> = Vec::new();
    for text in segments {
        spans.push(Span::styled(text, Style::default().fg(BAR_TEXT).bg(BAR_BG)));
        spans.push(Span::styled(" ", Style::default().bg(BAR_BG)));
    }
    spans.push(Span::styled(
        app.status_message.clone(),
        Style::default().fg(BAR_TEXT).bg(BAR_BG),
    ));

    let paragraph = Paragraph::new(Line::from(spans))
        .style(Style::default().fg(BAR_TEXT).bg(BAR_BG))
        .alignment(Alignment::Left);
    f.render_widget(paragraph, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_by_display_width() {
        assert_eq!(wrap_to_width("abcdef", 4), vec!["abcd", "ef"]);
        assert_eq!(wrap_to_width("你好世界", 5), vec!["你好", "世界"]);
        assert_eq!(wrap_to_width("", 4), vec![""]);
    }
}
