use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use crate::app::{App, FocusPane, InputMode};

/// Length of a `[n]` or `[n, m]` marker at the start of `text`.
fn citation_len(text: &str) -> Option<usize> {
    let body = text.strip_prefix('[')?;
    let inner_len = body.find(|c: char| !(c.is_ascii_digit() || c == ',' || c == ' '))?;
    let has_digit = body[..inner_len].contains(|c: char| c.is_ascii_digit());
    (has_digit && body[inner_len..].starts_with(']')).then_some(inner_len + 2)
}

/// Styled spans for one answer line: `**bold**` runs and `[n]` citations.
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut plain = String::new();
    let mut rest = text;

    while let Some(pos) = rest.find(['*', '[']) {
        plain.push_str(&rest[..pos]);
        rest = &rest[pos..];

        let (styled, consumed) = if let Some(after) = rest.strip_prefix("**") {
            match after.find("**") {
                Some(end) if end > 0 => (
                    Some(Span::styled(
                        after[..end].to_string(),
                        Style::default().add_modifier(Modifier::BOLD),
                    )),
                    end + 4,
                ),
                _ => (None, 2),
            }
        } else if let Some(len) = citation_len(rest) {
            (
                Some(Span::styled(rest[..len].to_string(), Style::default().fg(Color::Cyan))),
                len,
            )
        } else {
            (None, 1)
        };

        match styled {
            Some(span) => {
                if !plain.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut plain)));
                }
                spans.push(span);
            }
            None => plain.push_str(&rest[..consumed]),
        }
        rest = &rest[consumed..];
    }
    plain.push_str(rest);

    if !plain.is_empty() {
        spans.push(Span::raw(plain));
    }
    Line::from(spans)
}

fn border_color(app: &App, pane: FocusPane) -> Color {
    if app.focus == pane {
        Color::Cyan
    } else {
        Color::DarkGray
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let error = app
        .snapshot
        .state
        .search_error
        .clone()
        .or_else(|| {
            app.snapshot
                .state
                .generation_error
                .as_ref()
                .map(|e| format!("Error: {}", e))
        });
    let error_height = if error.is_some() { 1 } else { 0 };

    // Main layout: header, input, error line, body, footer
    let [header_area, input_area, error_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(3),
        Constraint::Length(error_height),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_input(app, frame, input_area);
    if let Some(error) = error {
        let line = Paragraph::new(Span::styled(
            format!(" {}", error),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
        frame.render_widget(line, error_area);
    }
    render_body(app, frame, body_area);
    render_footer(app, frame, footer_area);

    if app.show_model_picker {
        render_model_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" DeepSearch ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("{}: {} ", app.current_provider.display_name(), app.selected_model),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let state = &app.snapshot.state;
    let editing = app.input_mode == InputMode::Editing;
    let border = if editing { Color::Yellow } else { border_color(app, FocusPane::Input) };

    let title = if state.is_searching {
        Line::from(vec![
            Span::raw(" Ask "),
            Span::styled(
                format!("Searching{} ", state.loading_indicator()),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC),
            ),
        ])
    } else {
        Line::from(" Ask ")
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(title);

    // Horizontal scroll keeps the cursor visible (inner width excludes borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.query_cursor;
    let scroll_offset = if inner_width == 0 || cursor_pos < inner_width {
        0
    } else {
        cursor_pos - inner_width + 1
    };

    let content = if app.query_input.is_empty() && !editing {
        Span::styled("Press i to ask anything...", Style::default().fg(Color::DarkGray))
    } else {
        let visible: String = app
            .query_input
            .chars()
            .skip(scroll_offset)
            .take(inner_width)
            .collect();
        Span::styled(visible, Style::default().fg(Color::Cyan))
    };

    frame.render_widget(Paragraph::new(content).block(block), area);

    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_body(app: &mut App, frame: &mut Frame, area: Rect) {
    let (sources_area, right_area) = if app.show_sources {
        let [left, right] = Layout::horizontal([
            Constraint::Percentage(35),
            Constraint::Percentage(65),
        ])
        .areas(area);
        (Some(left), right)
    } else {
        (None, area)
    };

    let (thinking_area, answer_area) = if app.show_thinking {
        let [top, bottom] = Layout::vertical([
            Constraint::Percentage(40),
            Constraint::Percentage(60),
        ])
        .areas(right_area);
        (Some(top), bottom)
    } else {
        (None, right_area)
    };

    // Mouse wheel targets
    app.sources_area = sources_area;
    app.thinking_area = thinking_area;
    app.answer_area = Some(answer_area);

    if let Some(area) = sources_area {
        render_sources(app, frame, area);
    }
    if let Some(area) = thinking_area {
        render_thinking(app, frame, area);
    }
    render_answer(app, frame, answer_area);
}

fn render_sources(app: &mut App, frame: &mut Frame, area: Rect) {
    let results = &app.snapshot.state.search_results;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color(app, FocusPane::Sources)))
        .title(format!(" Sources ({}) ", results.len()));

    if results.is_empty() {
        let text = if app.snapshot.state.is_searching {
            "Searching the web..."
        } else {
            "No sources yet."
        };
        let placeholder = Paragraph::new(text)
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(placeholder, area);
        return;
    }

    let items: Vec<ListItem> = results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            let index = i + 1;
            let cited = app.cited.contains(&index);
            let marker = if cited { "* " } else { "  " };
            let title = if result.title.is_empty() { result.url.as_str() } else { result.title.as_str() };
            let title_style = if cited {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Yellow)
            };

            let mut lines = vec![
                Line::from(vec![
                    Span::raw(marker),
                    Span::styled(format!("[{}] {}", index, title), title_style),
                ]),
                Line::from(Span::styled(
                    format!("    {}", result.url),
                    Style::default().fg(Color::DarkGray),
                )),
            ];

            let byline: Vec<&str> = [result.author.as_deref(), result.published_date.as_deref()]
                .into_iter()
                .flatten()
                .filter(|s| !s.trim().is_empty())
                .collect();
            if !byline.is_empty() {
                lines.push(Line::from(Span::styled(
                    format!("    {}", byline.join(" · ")),
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                )));
            }
            ListItem::new(lines)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.sources_state);
}

fn render_thinking(app: &mut App, frame: &mut Frame, area: Rect) {
    app.thinking_height = area.height.saturating_sub(2);
    app.thinking_width = area.width.saturating_sub(2);

    let reasoning_open = app
        .answer
        .as_ref()
        .map(|a| !a.is_complete && !a.thinking.is_empty())
        .unwrap_or(false);
    let title = if reasoning_open && app.snapshot.streaming {
        " Thinking... "
    } else {
        " Thinking "
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color(app, FocusPane::Thinking)))
        .title(title);

    let thinking = app.answer.as_ref().map(|a| a.thinking.as_str()).unwrap_or("");
    let paragraph = Paragraph::new(thinking.to_string())
        .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.thinking_scroll, 0));

    frame.render_widget(paragraph, area);
}

fn render_answer(app: &mut App, frame: &mut Frame, area: Rect) {
    app.answer_height = area.height.saturating_sub(2);
    app.answer_width = area.width.saturating_sub(2);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color(app, FocusPane::Answer)))
        .title(" Answer ");

    let final_response = app
        .answer
        .as_ref()
        .map(|a| a.final_response.as_str())
        .unwrap_or("");

    let text = if !final_response.is_empty() {
        Text::from(final_response.lines().map(parse_markdown_line).collect::<Vec<_>>())
    } else if app.snapshot.state.is_generating || app.snapshot.streaming {
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        Text::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ))
    } else if app.snapshot.turn == 0 {
        Text::from(Span::styled(
            "Ask a question and the answer will stream here, backed by live web sources.",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Text::default()
    };

    let paragraph = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.answer_scroll, 0));

    frame.render_widget(paragraph, area);
}

/// A footer hint: the key on a dark chip followed by its label.
fn hint(key: &str, label: &str) -> [Span<'static>; 2] {
    [
        Span::styled(format!(" {} ", key), Style::default().bg(Color::DarkGray).fg(Color::White)),
        Span::styled(format!(" {} ", label), Style::default().bg(Color::Black).fg(Color::White)),
    ]
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" ASK ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    let pairs: Vec<(&str, &str)> = match app.input_mode {
        InputMode::Editing => vec![("Enter", "send"), ("Tab", "focus"), ("Esc", "stop typing")],
        InputMode::Normal => {
            let mut pairs = vec![("Tab", "focus"), ("j/k", "scroll")];
            if app.focus == FocusPane::Sources {
                pairs.push(("c", "copy url"));
            }
            pairs.push(("s", if app.show_sources { "hide sources" } else { "sources" }));
            pairs.push(("t", if app.show_thinking { "hide thinking" } else { "thinking" }));
            pairs.extend([("M", "model"), ("i", "ask"), ("q", "quit")]);
            pairs
        }
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    spans.extend(pairs.into_iter().flat_map(|(key, label)| hint(key, label)));
    if let Some(message) = &app.status_message {
        spans.push(Span::styled(format!(" {}", message), Style::default().fg(Color::Green)));
    }

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

/// A `width` x `height` rect centred in `area`, clamped to leave a margin.
fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(4));
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(50, app.available_models.len() as u16 + 2, area);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" {} model (Enter select, Esc cancel) ", app.current_provider.display_name()));

    let items: Vec<ListItem> = app
        .available_models
        .iter()
        .map(|model| {
            let style = if model == &app.selected_model {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(" {} ", model)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.model_picker_state);
}
