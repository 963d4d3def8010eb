//! UI rendering module

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Tabs, Wrap},
};

use crate::app::{App, Tab};
use chrono::Local;

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(10),   // Main content
            Constraint::Length(3), // Status bar
        ])
        .split(frame.area());

    draw_header(frame, app, chunks[0]);
    draw_main(frame, app, chunks[1]);
    draw_status_bar(frame, app, chunks[2]);
}

fn draw_header(frame: &mut Frame, app: &App, area: Rect) {
    let titles = vec!["设备 [1]", "会话 [2]", "日志 [3]"];
    let selected = match app.tab {
        Tab::Devices => 0,
        Tab::Sessions => 1,
        Tab::Log => 2,
    };

    let address = app
        .feed
        .as_ref()
        .map(|f| f.address.as_str())
        .unwrap_or(app.server_url.as_str());

    let tabs = Tabs::new(titles)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" PhotoDrop │ {} ", address)),
        )
        .select(selected)
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().fg(Color::Yellow).bold());

    frame.render_widget(tabs, area);
}

fn draw_main(frame: &mut Frame, app: &App, area: Rect) {
    match app.tab {
        Tab::Devices => draw_devices_tab(frame, app, area),
        Tab::Sessions => draw_sessions_tab(frame, app, area),
        Tab::Log => draw_log_tab(frame, app, area),
    }
}

fn draw_devices_tab(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    let Some(feed) = &app.feed else {
        let text = match &app.last_error {
            Some(e) => format!("无法连接到 {}\n\n{}", app.server_url, e),
            None => format!("正在连接 {} ...", app.server_url),
        };
        let waiting = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title(" 📱 设备 "))
            .wrap(Wrap { trim: true });
        frame.render_widget(waiting, area);
        return;
    };

    let folders = &feed.library.folders;
    let items: Vec<ListItem> = folders
        .iter()
        .enumerate()
        .map(|(i, folder)| {
            let content = format!(
                "{:<10} {:>4} 个文件  {}",
                folder.name,
                folder.file_count,
                format_bytes(folder.total_bytes)
            );
            let style = if i == app.selected_folder {
                Style::default().bg(Color::DarkGray).fg(Color::White)
            } else {
                Style::default()
            };
            ListItem::new(content).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" 📱 设备 ({} 个文件) ", feed.total_files)),
    );
    frame.render_widget(list, chunks[0]);

    let files: Vec<ListItem> = match folders.get(app.selected_folder) {
        Some(folder) => folder
            .files
            .iter()
            .rev()
            .map(|file| {
                let when = file
                    .modified
                    .map(|t| t.with_timezone(&Local).format("%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                ListItem::new(format!(
                    "{:<32} {:>10}  {}",
                    file.name,
                    format_bytes(file.size_bytes),
                    when
                ))
            })
            .collect(),
        None => vec![ListItem::new("还没有收到文件，用手机打开上方地址上传照片")],
    };

    let title = folders
        .get(app.selected_folder)
        .map(|f| format!(" 🖼  {} ", f.name))
        .unwrap_or_else(|| " 🖼  文件 ".to_string());
    let list = List::new(files).block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(list, chunks[1]);
}

fn draw_sessions_tab(frame: &mut Frame, app: &App, area: Rect) {
    let sessions = app
        .feed
        .as_ref()
        .map(|f| f.sessions.as_slice())
        .unwrap_or_default();

    if sessions.is_empty() {
        let empty = Paragraph::new("没有进行中的上传")
            .block(Block::default().borders(Borders::ALL).title(" 📦 上传会话 "));
        frame.render_widget(empty, area);
        return;
    }

    let rows = sessions.len().min(usize::from(area.height / 3).max(1));
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Length(3); rows])
        .split(area);

    for (session, chunk) in sessions.iter().zip(chunks.iter()) {
        let percent = session.progress_percent().clamp(0.0, 100.0) as u16;
        let color = if session.failed > 0 {
            Color::Yellow
        } else {
            Color::Green
        };
        let short_id: String = session.session_id.chars().take(8).collect();
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title(format!(
                " {} {} ",
                if session.done { "✅" } else { "📦" },
                short_id
            )))
            .gauge_style(Style::default().fg(color).bg(Color::Black))
            .percent(percent)
            .label(format!(
                "{}/{}  成功 {} 失败 {}",
                session.completed, session.total, session.succeeded, session.failed
            ));
        frame.render_widget(gauge, *chunk);
    }
}

fn draw_log_tab(frame: &mut Frame, app: &App, area: Rect) {
    let height = usize::from(area.height.saturating_sub(2));
    let items: Vec<ListItem> = app
        .visible_logs()
        .rev()
        .take(height)
        .map(|entry| ListItem::new(entry.display_line()))
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" 📋 日志 (≤ {}) ", app.min_level)),
    );

    frame.render_widget(list, area);
}

fn draw_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let state = if app.is_connected() {
        " 🟢 已连接 "
    } else {
        " 🔴 未连接 "
    };
    let host = app
        .feed
        .as_ref()
        .map(|f| f.host_name.as_str())
        .unwrap_or("-");

    let status = Paragraph::new(format!(
        "{}│ 主机: {} │ [r]刷新 [d]日志级别 [c]清空日志 [Tab]切换 [q]退出",
        state, host
    ))
    .block(Block::default().borders(Borders::ALL));

    frame.render_widget(status, area);
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
