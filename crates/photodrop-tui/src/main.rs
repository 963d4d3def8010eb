//! PhotoDrop TUI - 桌面端状态面板
//!
//! 轮询运行中的上传服务器，显示各设备已收到的文件和进行中的上传。
//!
//! ```bash
//! photodrop-tui                          # 连接 http://127.0.0.1:<配置端口>/
//! photodrop-tui http://192.168.1.20:5000/
//! ```
//!
//! # 日志
//!
//! 日志默认显示在 TUI 的"日志"标签页中。
//! 如需输出到文件进行调试，设置 RUST_LOG 环境变量：
//!
//! ```bash
//! RUST_LOG=debug photodrop-tui 2>> /tmp/photodrop.log
//! ```

mod app;
mod tui_log;
mod ui;

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use photodrop_core::{Settings, StatusClient};
use ratatui::prelude::*;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use app::{App, AppEvent, Tab};
use tui_log::TuiLogLayer;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    let server_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("http://127.0.0.1:{}/", Settings::load().port));
    let client = StatusClient::new(server_url.clone())?;

    let app = App::new(server_url);
    init_logging(app.event_tx.clone());

    let refresh = Arc::new(Notify::new());
    let poller = tokio::spawn(poll_status(client, app.event_tx.clone(), refresh.clone()));

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app, &refresh).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    poller.abort();
    res
}

/// 初始化日志系统
///
/// - 总是将日志发送到 TUI 日志面板
/// - 如果设置了 RUST_LOG，同时输出到 stderr（用于调试）
fn init_logging(log_tx: mpsc::Sender<AppEvent>) {
    // 桥接 log crate（photodrop-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let tui_layer = TuiLogLayer::new(log_tx);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,photodrop_core=debug"));

    if std::env::var("RUST_LOG").is_ok() {
        use tracing_subscriber::fmt;

        let stderr_layer = fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .compact();

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tui_layer)
            .with(stderr_layer)
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tui_layer)
            .try_init();
    }
}

/// 定时拉取 `/status`，按 'r' 时立即拉取
async fn poll_status(client: StatusClient, tx: mpsc::Sender<AppEvent>, refresh: Arc<Notify>) {
    loop {
        let event = match client.fetch_status().await {
            Ok(feed) => AppEvent::Status(Box::new(feed)),
            Err(e) => AppEvent::FetchError(format!("{:#}", e)),
        };
        if tx.send(event).await.is_err() {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = refresh.notified() => {
                tracing::debug!("Manual refresh requested");
            }
        }
    }
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App, refresh: &Notify) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, &app))?;

        // 使用 poll 避免无限阻塞
        if event::poll(Duration::from_millis(100))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('r') => refresh.notify_one(),
                KeyCode::Char('d') => app.toggle_log_level(),
                KeyCode::Char('c') => app.clear_logs(),
                KeyCode::Up | KeyCode::Char('k') => app.previous_folder(),
                KeyCode::Down | KeyCode::Char('j') => app.next_folder(),
                KeyCode::Tab => app.next_tab(),
                KeyCode::Char('1') => app.tab = Tab::Devices,
                KeyCode::Char('2') => app.tab = Tab::Sessions,
                KeyCode::Char('3') => app.tab = Tab::Log,
                _ => {}
            }
        }

        // Update app state (handle async events)
        app.tick();
    }
}
