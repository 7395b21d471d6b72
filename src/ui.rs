use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, ListState, Paragraph, Wrap},
};

use crate::app::{App, Focus, Phase};
use crate::format::{format_duration, format_file_size};

pub fn draw(f: &mut Frame, app: &App, server: &str) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(4),
            Constraint::Length(3),
        ])
        .split(f.area());

    let header = Paragraph::new(vec![
        Line::from(Span::styled(
            "Video Splitter",
            Style::default()
                .fg(Color::LightCyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::raw(format!("Server: {server} • {}", app.status))),
    ])
    .block(Block::default().borders(Borders::ALL).title("About"));
    f.render_widget(header, chunks[0]);

    let drop_zone = Paragraph::new(if app.path_input.is_empty() {
        Line::from(Span::styled(
            "Drag a video onto this window or type a path",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Line::from(app.path_input.as_str())
    })
    .block(focus_block("Drop Zone", app.focus == Focus::DropZone));
    f.render_widget(drop_zone, chunks[1]);

    f.render_widget(preview(app), chunks[2]);

    let split_label = if app.split_enabled() {
        Span::styled("[ Split ]", Style::default().fg(Color::Green))
    } else {
        Span::styled("[ Split ]", Style::default().fg(Color::DarkGray))
    };
    let segment = Paragraph::new(Line::from(vec![
        Span::raw(format!("{} s  ", app.segment_input)),
        split_label,
    ]))
    .block(focus_block("Part Length", app.focus == Focus::Segment));
    f.render_widget(segment, chunks[3]);

    let (label, ratio) = match app.phase {
        Phase::Uploading { sent, total } => (
            format!(
                "Uploading: {} / {}",
                format_file_size(sent),
                format_file_size(total)
            ),
            if total == 0 {
                0.0
            } else {
                sent as f64 / total as f64
            },
        ),
        Phase::Clearing => ("Clearing".to_string(), 0.0),
        _ => {
            let percent = app.progress_percent();
            (format!("Processing: {percent}%"), f64::from(percent) / 100.0)
        }
    };
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Progress"))
        .gauge_style(Style::default().fg(Color::Blue))
        .label(label)
        .ratio(ratio.clamp(0.0, 1.0));
    f.render_widget(gauge, chunks[4]);

    render_outputs(f, app, chunks[5]);

    let help = Paragraph::new(
        "Tab focus • Enter confirm • Ctrl+S split • Ctrl+L clear • F5 refresh • d download • Esc quit",
    )
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, chunks[6]);

    if let Some(message) = &app.alert {
        render_alert(f, message);
    }
}

fn focus_block(title: &str, focused: bool) -> Block<'_> {
    let block = Block::default().borders(Borders::ALL).title(title);
    if focused {
        block.border_style(Style::default().fg(Color::Yellow))
    } else {
        block
    }
}

fn preview(app: &App) -> Paragraph<'_> {
    let block = Block::default().borders(Borders::ALL).title("Selected Video");
    let Some(video) = &app.staged else {
        return Paragraph::new("No video selected").block(block);
    };
    let duration = video
        .duration
        .map(format_duration)
        .unwrap_or_else(|| "unknown".to_string());
    Paragraph::new(vec![
        Line::from(format!("Name:     {}", video.name)),
        Line::from(format!("Size:     {}", format_file_size(video.size))),
        Line::from(format!("Duration: {duration}")),
        Line::from(format!("Type:     {}", video.mime)),
    ])
    .block(block)
}

fn render_outputs(f: &mut Frame, app: &App, area: Rect) {
    let block = focus_block("Output Files", app.focus == Focus::Outputs);
    if app.files.is_empty() {
        f.render_widget(Paragraph::new("No files yet").block(block), area);
        return;
    }

    let items: Vec<ListItem> = app
        .files
        .iter()
        .map(|name| ListItem::new(Span::raw(name.as_str())))
        .collect();
    let mut state = ListState::default();
    state.select(Some(app.selected));

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(">> ");
    f.render_stateful_widget(list, area, &mut state);
}

fn render_alert(f: &mut Frame, message: &str) {
    let area = centered(f.area(), 60, 30);
    let text: Vec<Line> = message
        .lines()
        .map(Line::from)
        .chain([Line::from(""), Line::from("Press Enter to dismiss")])
        .collect();
    let popup = Paragraph::new(text)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Alert")
                .border_style(Style::default().fg(Color::Red)),
        );
    f.render_widget(Clear, area);
    f.render_widget(popup, area);
}

fn centered(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let vertical = Layout::default()
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
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Update;
    use ratatui::{Terminal, backend::TestBackend};

    fn rendered(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 40)).unwrap();
        terminal
            .draw(|f| draw(f, app, "http://127.0.0.1:10000"))
            .unwrap();
        let buffer = terminal.backend().buffer();
        buffer
            .content()
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn shows_preview_progress_and_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, vec![0u8; 1536]).unwrap();

        let mut app = App::new(60);
        app.handle_paste(&path.display().to_string());
        app.apply(Update::DurationProbed {
            path,
            duration: Some(std::time::Duration::from_secs(75)),
        });
        app.apply(Update::Files(Ok(vec!["clip_parts.zip".into()])));

        let screen = rendered(&app);
        assert!(screen.contains("clip.mp4"));
        assert!(screen.contains("1.5 KB"));
        assert!(screen.contains("1:15"));
        assert!(screen.contains("Processing: 0%"));
        assert!(screen.contains("clip_parts.zip"));
    }

    #[test]
    fn alert_is_drawn_on_top() {
        let mut app = App::new(60);
        app.alert = Some("Failed to clear files".into());
        assert!(rendered(&app).contains("Failed to clear files"));
    }
}
