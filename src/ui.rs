use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};

use crate::app::{App, FocusPane, InputMode, OverlayKind};
use crate::model::DetailTab;

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);
const PL_C: Color = Color::Rgb(55, 48, 163);

pub fn render(frame: &mut Frame, app: &App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    match app.banner() {
        Some(banner) => render_banner(frame, root[1], banner),
        None => render_body(frame, root[1], app),
    }
    render_footer(frame, root[2], app);

    if app.banner().is_none() {
        if app.overlay_kind().is_some() {
            render_overlay(frame, app);
        }
        if app.namespace_picker_entries().is_some() {
            render_namespace_picker(frame, app);
        }
    }
    if app.show_help() {
        render_help_modal(frame, app);
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let left_line = build_left_header_line(app);
    let right_line = build_right_header_line(app);
    let right_width = spans_width(&right_line.spans) as u16;
    if area.width < 42 || right_width == 0 || right_width >= area.width {
        frame.render_widget(
            Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
            area,
        );
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(right_line).style(Style::default().bg(BG)),
        chunks[1],
    );
}

fn build_left_header_line(app: &App) -> Line<'static> {
    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, " kview ", Color::Black, ACCENT, PL_A);
    push_powerline_segment(
        &mut spans,
        format!(" ctx {} ", compact_text(app.context(), 28)),
        Color::White,
        PL_A,
        PL_B,
    );
    push_powerline_segment(
        &mut spans,
        format!(" ns {} ", compact_text(&app.namespace_scope().to_string(), 24)),
        Color::White,
        PL_B,
        PL_C,
    );
    let pod_label = app
        .active_pod()
        .map(|pod| compact_text(&pod.name, 36))
        .unwrap_or_else(|| "-".to_string());
    push_powerline_segment(
        &mut spans,
        format!(" pod {pod_label} "),
        Color::White,
        PL_C,
        BG,
    );
    Line::from(spans)
}

fn build_right_header_line(app: &App) -> Line<'static> {
    let mut spans = Vec::new();
    if !app.filter().is_empty() {
        spans.push(Span::styled(
            format!("/{} ", compact_text(app.filter(), 20)),
            Style::default().fg(WARN),
        ));
    }
    spans.push(Span::styled(
        format!("{} ", compact_text(&display_cluster_endpoint(app.cluster()), 40)),
        Style::default().fg(MUTED),
    ));
    Line::from(spans)
}

fn render_banner(frame: &mut Frame, area: Rect, banner: &str) {
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            banner.to_string(),
            Style::default().fg(ERROR).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "r retry  q quit",
            Style::default().fg(MUTED),
        )),
    ];
    let paragraph = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ERROR))
                .style(Style::default().bg(PANEL)),
        );
    frame.render_widget(paragraph, area);
}

fn render_body(frame: &mut Frame, area: Rect, app: &App) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(area);

    render_pod_list(frame, columns[0], app, app.focus() == FocusPane::Pods);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(6),
            Constraint::Length(3),
            Constraint::Min(3),
        ])
        .split(columns[1]);
    render_status(frame, right[0], app);
    render_tab_bar(frame, right[1], app);
    render_detail(frame, right[2], app, app.focus() == FocusPane::Detail);
}

fn render_pod_list(frame: &mut Frame, area: Rect, app: &App, focused: bool) {
    let pods = app.visible_pods();
    let active = app.active_pod();
    let items = pods
        .iter()
        .map(|pod| {
            let style = if Some(*pod) == active {
                Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            ListItem::new(Line::from(vec![
                Span::styled(pod.name.clone(), style),
                Span::styled(format!("  {}", pod.namespace), Style::default().fg(MUTED)),
            ]))
        })
        .collect::<Vec<_>>();

    let title = if app.filter().is_empty() {
        format!("Pods ({})", pods.len())
    } else {
        format!("Pods ({}) /{}", pods.len(), app.filter())
    };
    let list = List::new(items)
        .block(panel_block(title, focused))
        .highlight_style(
            Style::default()
                .bg(Color::Rgb(24, 36, 58))
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    if !pods.is_empty() {
        state.select(Some(app.selected_index()));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let phase_color = app
        .snapshot()
        .map(|snapshot| phase_color(&snapshot.phase))
        .unwrap_or(MUTED);
    let lines = app
        .status_block()
        .lines()
        .map(|line| match line.split_once(": ") {
            Some((key, value)) => {
                let value_color = if key == "Status" {
                    phase_color
                } else {
                    Color::White
                };
                Line::from(vec![
                    Span::styled(format!("{key}: "), Style::default().fg(MUTED)),
                    Span::styled(value.to_string(), Style::default().fg(value_color)),
                ])
            }
            None => Line::from(Span::styled(line.to_string(), Style::default().fg(MUTED))),
        })
        .collect::<Vec<_>>();
    frame.render_widget(
        Paragraph::new(lines).block(panel_block("Status".to_string(), false)),
        area,
    );
}

fn render_tab_bar(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = Vec::new();
    for tab in DetailTab::ALL {
        let style = if tab == app.detail_tab() {
            Style::default()
                .fg(Color::Black)
                .bg(ACCENT)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(MUTED)
        };
        spans.push(Span::styled(format!(" {} ", tab.title()), style));
        spans.push(Span::raw(" "));
    }

    if app.detail_tab() == DetailTab::Logs || app.mode() == InputMode::Exec {
        let containers = app.containers();
        let selected = app.selected_container();
        spans.push(Span::styled("│ ", Style::default().fg(MUTED)));
        if containers.is_empty() {
            spans.push(Span::styled("no containers", Style::default().fg(MUTED)));
        }
        for container in containers {
            let style = if Some(container.as_str()) == selected {
                Style::default().fg(WARN).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(MUTED)
            };
            spans.push(Span::styled(format!("{container} "), style));
        }
    }

    frame.render_widget(
        Paragraph::new(Line::from(spans)).block(panel_block(String::new(), false)),
        area,
    );
}

fn render_detail(frame: &mut Frame, area: Rect, app: &App, focused: bool) {
    let tab = app.detail_tab();
    let title = match (tab, app.selected_container()) {
        (DetailTab::Logs, Some(container)) => format!("Logs: {container}"),
        _ => tab.title().to_string(),
    };
    let detail = app.detail_text();
    let text = if app.active_pod().is_none() {
        Text::from(Span::styled(
            "Select a pod with Enter",
            Style::default().fg(MUTED),
        ))
    } else if detail.starts_with("error: ") {
        Text::from(Span::styled(detail.to_string(), Style::default().fg(ERROR)))
    } else if matches!(tab, DetailTab::Describe | DetailTab::Volumes) {
        highlight_yaml_text(detail)
    } else {
        Text::from(detail.to_string())
    };

    let paragraph = Paragraph::new(text)
        .block(panel_block(title, focused))
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: false })
        .scroll((app.detail_scroll(), 0));
    frame.render_widget(paragraph, area);
}

fn render_overlay(frame: &mut Frame, app: &App) {
    let area = centered_rect(86, 80, frame.area());
    frame.render_widget(Clear, area);

    let body = app.overlay_body().unwrap_or_default();
    let kind = app.overlay_kind();
    let text = match kind {
        Some(OverlayKind::Yaml) => highlight_yaml_text(body),
        _ => Text::from(body.to_string()),
    };
    let hint = match kind {
        Some(OverlayKind::Exec) => "enter run  esc close",
        _ => "j/k scroll  esc close",
    };
    let title = format!("{}  ({hint})", app.overlay_title().unwrap_or_default());
    let paragraph = Paragraph::new(text)
        .block(panel_block(title, true))
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: false })
        .scroll((app.overlay_scroll(), 0));
    frame.render_widget(paragraph, area);
}

fn render_namespace_picker(frame: &mut Frame, app: &App) {
    let Some((entries, selected)) = app.namespace_picker_entries() else {
        return;
    };
    let area = centered_rect(40, 60, frame.area());
    frame.render_widget(Clear, area);

    let items = entries
        .iter()
        .map(|entry| {
            let label = match entry.namespace() {
                Some(namespace) => namespace.to_string(),
                None => "all namespaces".to_string(),
            };
            let style = if entry == app.namespace_scope() {
                Style::default().fg(ACCENT)
            } else {
                Style::default().fg(Color::White)
            };
            ListItem::new(Span::styled(label, style))
        })
        .collect::<Vec<_>>();
    let list = List::new(items)
        .block(panel_block("Namespace".to_string(), true))
        .highlight_style(
            Style::default()
                .bg(Color::Rgb(24, 36, 58))
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select(Some(selected));
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = Vec::new();
    match app.mode() {
        InputMode::Normal => {
            let status = app.status();
            let status_bg = if app.banner().is_some() { ERROR } else { PL_B };
            push_powerline_segment(&mut spans, " 󰘳 nrm ", Color::White, PL_A, status_bg);
            push_powerline_segment(
                &mut spans,
                format!(
                    " {} {} ",
                    footer_status_icon(status),
                    compact_text(status, area.width.saturating_sub(36).max(24) as usize)
                ),
                Color::White,
                status_bg,
                BG,
            );
            if let Some(at) = app.refreshed_at() {
                spans.push(Span::styled(
                    format!(" refreshed {}", at.format("%H:%M:%S")),
                    Style::default().fg(MUTED),
                ));
            }
        }
        InputMode::Filter => {
            push_powerline_segment(&mut spans, " 󰈲 flt ", Color::Black, WARN, PL_B);
            push_powerline_segment(
                &mut spans,
                format!(" /{} ", app.input()),
                Color::White,
                PL_B,
                BG,
            );
        }
        InputMode::Exec => {
            let container = app.selected_container().unwrap_or("-");
            push_powerline_segment(&mut spans, " exec ", Color::Black, ACCENT, PL_B);
            push_powerline_segment(
                &mut spans,
                format!(" {container} $ {} ", app.input()),
                Color::White,
                PL_B,
                BG,
            );
        }
    }
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        area,
    );
}

fn render_help_modal(frame: &mut Frame, app: &App) {
    let area = centered_rect(70, 70, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(format!(
            "kview help  scope:{}  tab:{}",
            app.namespace_scope(),
            app.detail_tab().title()
        )),
        Line::from(""),
    ];
    for line in HELP_LINES {
        lines.push(Line::from(*line));
    }

    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(panel_block("Help".to_string(), true))
        .style(Style::default().fg(Color::White));
    frame.render_widget(modal, area);
}

const HELP_LINES: &[&str] = &[
    "j/k, arrows      move selection or scroll",
    "g/G, PgUp/PgDn   jump or page",
    "enter            open the highlighted pod",
    "tab              switch focus between pods and detail",
    "h/l              previous or next detail tab",
    "[ ]              previous or next container",
    "/                filter pods by name",
    "n                pick a namespace",
    "y                show pod YAML",
    "x                run a command in the selected container",
    "r                refresh the pod list",
    "esc              close overlay",
    "q, ctrl-c        quit",
];

fn panel_block(title: String, focused: bool) -> Block<'static> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(if focused {
            Style::default().fg(ACCENT)
        } else {
            Style::default().fg(MUTED)
        })
        .style(Style::default().bg(PANEL))
}

fn phase_color(phase: &str) -> Color {
    match phase {
        "Running" | "Succeeded" => ACCENT,
        "Pending" => WARN,
        "Failed" | "Unknown" => ERROR,
        _ => Color::White,
    }
}

fn footer_status_icon(status_text: &str) -> &'static str {
    let status = status_text.to_ascii_lowercase();
    let has_failure = [
        "failed",
        "error",
        "timed out",
        "timeout",
        "unreachable",
        "refused",
        "forbidden",
        "denied",
    ]
    .iter()
    .any(|needle| status.contains(needle));
    if has_failure { "󰅚" } else { "󰄬" }
}

fn highlight_yaml_text(input: &str) -> Text<'static> {
    let lines = input
        .lines()
        .map(highlight_yaml_line)
        .collect::<Vec<Line<'static>>>();
    Text::from(lines)
}

fn highlight_yaml_line(line: &str) -> Line<'static> {
    let indent_len = line
        .as_bytes()
        .iter()
        .take_while(|byte| **byte == b' ' || **byte == b'\t')
        .count();
    let indent = &line[..indent_len];
    let trimmed = &line[indent_len..];

    let mut spans = vec![Span::raw(indent.to_string())];
    if trimmed.is_empty() {
        return Line::from(spans);
    }

    if let Some(rest) = trimmed.strip_prefix("- ") {
        spans.push(Span::styled("- ", Style::default().fg(ACCENT)));
        spans.extend(highlight_yaml_content(rest));
        return Line::from(spans);
    }

    spans.extend(highlight_yaml_content(trimmed));
    Line::from(spans)
}

fn highlight_yaml_content(content: &str) -> Vec<Span<'static>> {
    let Some((key, value)) = split_yaml_key_value(content) else {
        return vec![Span::styled(
            content.to_string(),
            Style::default().fg(Color::White),
        )];
    };

    let mut spans = vec![
        Span::styled(
            key.to_string(),
            Style::default().fg(Color::Rgb(103, 232, 249)),
        ),
        Span::styled(":", Style::default().fg(MUTED)),
    ];
    if value.trim().is_empty() {
        return spans;
    }
    spans.push(Span::raw(" "));
    spans.push(Span::styled(
        value.trim_start().to_string(),
        Style::default().fg(yaml_value_color(value.trim())),
    ));
    spans
}

fn split_yaml_key_value(content: &str) -> Option<(&str, &str)> {
    let (key, value) = content.split_once(':')?;
    let key = key.trim_end();
    if key.is_empty() || key.contains(' ') {
        return None;
    }
    Some((key, value))
}

fn yaml_value_color(value: &str) -> Color {
    if value.starts_with('"') || value.starts_with('\'') {
        Color::Rgb(125, 211, 252)
    } else if matches!(value, "true" | "false" | "null" | "~") {
        WARN
    } else if value.parse::<f64>().is_ok() {
        Color::Rgb(251, 146, 60)
    } else {
        Color::Rgb(147, 197, 253)
    }
}

fn push_powerline_segment(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
}

fn spans_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(|span| span.content.chars().count()).sum()
}

fn compact_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    if max_chars <= 1 {
        return "…".to_string();
    }

    let mut out = value
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

fn display_cluster_endpoint(cluster: &str) -> String {
    let trimmed = cluster.trim().trim_end_matches('/');
    trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed)
        .to_string()
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::{compact_text, display_cluster_endpoint, render, split_yaml_key_value};
    use crate::app::App;
    use crate::model::{NamespaceScope, PodRef};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn renders_pod_list_and_header() {
        let mut app = App::new(
            "dev".to_string(),
            "https://10.0.0.1:6443".to_string(),
            NamespaceScope::Named("default".to_string()),
        );
        app.set_pods(vec![PodRef::new("web-0", "default")]);

        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|frame| render(frame, &app)).unwrap();

        let text = buffer_text(&terminal);
        assert!(text.contains("web-0"));
        assert!(text.contains("ctx dev"));
        assert!(text.contains("Describe"));
    }

    #[test]
    fn endpoint_drops_scheme() {
        assert_eq!(display_cluster_endpoint("https://k8s:6443/"), "k8s:6443");
        assert_eq!(display_cluster_endpoint("http://k8s"), "k8s");
    }

    #[test]
    fn compact_text_marks_truncation() {
        assert_eq!(compact_text("abcdef", 4), "abc…");
        assert_eq!(compact_text("abc", 4), "abc");
    }

    #[test]
    fn yaml_keys_require_no_spaces() {
        assert_eq!(split_yaml_key_value("name: web"), Some(("name", " web")));
        assert_eq!(split_yaml_key_value("two words: x"), None);
    }
}
