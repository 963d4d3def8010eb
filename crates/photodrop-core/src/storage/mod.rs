//! 上传存储模块
//!
//! 包含:
//! - 设备目录解析 (`resolver`)
//! - 文件名清洗与冲突后缀 (`naming`)
//! - 流式写入与结果记录 (`ingest`)

pub mod ingest;
pub mod naming;
pub mod resolver;

pub use ingest::{Ingestor, Payload};
pub use resolver::DestinationResolver;

use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 设备目录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFolder {
    name: String,
    path: PathBuf,
}

impl DeviceFolder {
    /// 目录名（清洗后的设备标签）
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// 失败类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    Filesystem,
    InvalidPayload,
}

/// 单个附件的处理结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOutcome {
    pub original_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stored_name: Option<String>,
    pub size_bytes: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stored_at: Option<DateTime<Utc>>,
}

impl FileOutcome {
    pub fn stored(original_name: impl Into<String>, stored_name: String, size_bytes: u64) -> Self {
        Self {
            original_name: original_name.into(),
            stored_name: Some(stored_name),
            size_bytes,
            success: true,
            error_reason: None,
            error_kind: None,
            stored_at: Some(Utc::now()),
        }
    }

    pub fn failed(original_name: impl Into<String>, error: &Error) -> Self {
        let kind = match error {
            Error::InvalidPayload(_) => FailureKind::InvalidPayload,
            _ => FailureKind::Filesystem,
        };
        Self {
            original_name: original_name.into(),
            stored_name: None,
            size_bytes: 0,
            success: false,
            error_reason: Some(error.to_string()),
            error_kind: Some(kind),
            stored_at: None,
        }
    }
}
