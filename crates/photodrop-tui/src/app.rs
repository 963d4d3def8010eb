//! Application state

use photodrop_core::StatusFeed;
use photodrop_core::logging::{LogEntry, LogLevel};
use tokio::sync::mpsc;

/// 日志面板最多保留的条目
const MAX_LOGS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tab {
    Devices,
    Sessions,
    Log,
}

/// 后台任务发给界面的事件
#[derive(Debug)]
pub enum AppEvent {
    Status(Box<StatusFeed>),
    FetchError(String),
    Log(LogEntry),
}

pub struct App {
    pub tab: Tab,
    pub server_url: String,
    pub feed: Option<StatusFeed>,
    pub last_error: Option<String>,
    pub selected_folder: usize,
    pub logs: Vec<LogEntry>,
    pub min_level: LogLevel,
    pub event_tx: mpsc::Sender<AppEvent>,
    event_rx: mpsc::Receiver<AppEvent>,
}

impl App {
    pub fn new(server_url: String) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            tab: Tab::Devices,
            server_url,
            feed: None,
            last_error: None,
            selected_folder: 0,
            logs: vec![LogEntry::new(
                LogLevel::Info,
                "PhotoDrop TUI 启动，按 'r' 刷新, 'q' 退出",
            )],
            min_level: LogLevel::Info,
            event_tx,
            event_rx,
        }
    }

    pub fn add_log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(LogEntry::new(level, message));
        if self.logs.len() > MAX_LOGS {
            let excess = self.logs.len() - MAX_LOGS;
            self.logs.drain(..excess);
        }
    }

    pub fn clear_logs(&mut self) {
        self.logs.clear();
    }

    pub fn toggle_log_level(&mut self) {
        self.min_level = match self.min_level {
            LogLevel::Info => LogLevel::Debug,
            _ => LogLevel::Info,
        };
    }

    /// 当前级别下可见的日志
    pub fn visible_logs(&self) -> impl DoubleEndedIterator<Item = &LogEntry> {
        self.logs.iter().filter(|e| e.level <= self.min_level)
    }

    pub fn next_tab(&mut self) {
        self.tab = match self.tab {
            Tab::Devices => Tab::Sessions,
            Tab::Sessions => Tab::Log,
            Tab::Log => Tab::Devices,
        };
    }

    fn folder_count(&self) -> usize {
        self.feed
            .as_ref()
            .map(|f| f.library.folders.len())
            .unwrap_or(0)
    }

    pub fn next_folder(&mut self) {
        let count = self.folder_count();
        if count > 0 {
            self.selected_folder = (self.selected_folder + 1) % count;
        }
    }

    pub fn previous_folder(&mut self) {
        let count = self.folder_count();
        if count > 0 {
            self.selected_folder = self.selected_folder.checked_sub(1).unwrap_or(count - 1);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.last_error.is_none() && self.feed.as_ref().is_some_and(|f| f.connected)
    }

    /// 处理后台事件
    pub fn tick(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_event(event);
        }
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Status(feed) => {
                if self.last_error.take().is_some() {
                    self.add_log(LogLevel::Info, format!("已连接到 {}", self.server_url));
                }
                self.feed = Some(*feed);
                let count = self.folder_count();
                if self.selected_folder >= count {
                    self.selected_folder = count.saturating_sub(1);
                }
            }
            AppEvent::FetchError(e) => {
                if self.last_error.as_deref() != Some(e.as_str()) {
                    self.add_log(LogLevel::Warn, format!("无法获取状态: {}", e));
                }
                self.last_error = Some(e);
            }
            AppEvent::Log(entry) => {
                self.logs.push(entry);
                if self.logs.len() > MAX_LOGS {
                    self.logs.remove(0);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use photodrop_core::library::{FolderSummary, LibrarySnapshot};

    fn feed(folders: &[&str]) -> StatusFeed {
        StatusFeed {
            address: "http://192.168.1.2:5000/".to_string(),
            host_name: "desk".to_string(),
            connected: true,
            library: LibrarySnapshot {
                folders: folders
                    .iter()
                    .map(|name| FolderSummary {
                        name: name.to_string(),
                        file_count: 0,
                        total_bytes: 0,
                        files: vec![],
                    })
                    .collect(),
                loose_files: vec![],
            },
            total_files: 0,
            sessions: vec![],
        }
    }

    #[test]
    fn test_status_event_clamps_selection() {
        let mut app = App::new("http://127.0.0.1:5000/".to_string());
        app.handle_event(AppEvent::Status(Box::new(feed(&["Android", "iPhone", "Mac"]))));
        app.previous_folder();
        assert_eq!(app.selected_folder, 2);

        app.handle_event(AppEvent::Status(Box::new(feed(&["Android"]))));
        assert_eq!(app.selected_folder, 0);
        assert!(app.is_connected());
    }

    #[test]
    fn test_fetch_error_logged_once() {
        let mut app = App::new("http://127.0.0.1:5000/".to_string());
        let before = app.logs.len();
        app.handle_event(AppEvent::FetchError("connection refused".to_string()));
        app.handle_event(AppEvent::FetchError("connection refused".to_string()));
        assert_eq!(app.logs.len(), before + 1);
        assert!(!app.is_connected());
    }

    #[test]
    fn test_log_level_filter() {
        let mut app = App::new("http://127.0.0.1:5000/".to_string());
        app.clear_logs();
        app.add_log(LogLevel::Debug, "noisy");
        app.add_log(LogLevel::Warn, "important");
        assert_eq!(app.visible_logs().count(), 1);
        app.toggle_log_level();
        assert_eq!(app.visible_logs().count(), 2);
    }

    #[test]
    fn test_tab_cycle() {
        let mut app = App::new(String::new());
        app.next_tab();
        assert_eq!(app.tab, Tab::Sessions);
        app.next_tab();
        app.next_tab();
        assert_eq!(app.tab, Tab::Devices);
    }
}
