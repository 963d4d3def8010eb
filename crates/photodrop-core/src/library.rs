//! 已接收文件的目录清单
//!
//! 供桌面端状态面板轮询，列出上传根目录下的设备目录和文件。
//! 隐藏文件（包括写入中的 `.part` 临时文件）不会出现在清单里。

use crate::error::{Error, Result};
use crate::progress::SessionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;

/// 已保存的文件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub name: String,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// 单个设备目录的汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderSummary {
    pub name: String,
    pub file_count: usize,
    pub total_bytes: u64,
    pub files: Vec<StoredFile>,
}

/// 上传根目录快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibrarySnapshot {
    pub folders: Vec<FolderSummary>,
    /// 直接放在根目录下的文件（旧版本留下的）
    pub loose_files: Vec<StoredFile>,
}

impl LibrarySnapshot {
    pub fn total_files(&self) -> usize {
        self.folders.iter().map(|f| f.file_count).sum::<usize>() + self.loose_files.len()
    }
}

/// 状态面板数据：服务器地址、文件清单、进行中的会话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusFeed {
    pub address: String,
    pub host_name: String,
    pub connected: bool,
    pub library: LibrarySnapshot,
    pub total_files: usize,
    pub sessions: Vec<SessionStatus>,
}

/// 扫描上传根目录；根目录不存在时返回空快照
pub async fn scan(root: &Path) -> Result<LibrarySnapshot> {
    let mut snapshot = LibrarySnapshot::default();

    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(snapshot),
        Err(e) => return Err(Error::filesystem(root, e)),
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::filesystem(root, e))?
    {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };

        if file_type.is_dir() {
            let files = list_files(&entry.path()).await?;
            snapshot.folders.push(FolderSummary {
                name,
                file_count: files.len(),
                total_bytes: files.iter().map(|f| f.size_bytes).sum(),
                files,
            });
        } else if file_type.is_file()
            && let Some(file) = stored_file(&entry).await
        {
            snapshot.loose_files.push(file);
        }
    }

    snapshot.folders.sort_by(|a, b| a.name.cmp(&b.name));
    snapshot.loose_files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(snapshot)
}

/// 列出目录下的可见普通文件（不递归）
async fn list_files(dir: &Path) -> Result<Vec<StoredFile>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| Error::filesystem(dir, e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::filesystem(dir, e))?
    {
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        if let Some(file) = stored_file(&entry).await {
            files.push(file);
        }
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

async fn stored_file(entry: &tokio::fs::DirEntry) -> Option<StoredFile> {
    // 文件可能在扫描过程中被删除，忽略即可
    let meta = entry.metadata().await.ok()?;
    if !meta.is_file() {
        return None;
    }
    Some(StoredFile {
        name: entry.file_name().to_string_lossy().to_string(),
        size_bytes: meta.len(),
        modified: meta.modified().ok().map(DateTime::<Utc>::from),
    })
}
