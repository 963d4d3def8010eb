//! 核心错误类型

use std::io;
use std::path::PathBuf;

/// PhotoDrop 核心错误
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 目录或文件创建、写入失败（权限、磁盘空间、意外 I/O）
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 空的或无法接受的附件
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// 查询的上传会话不存在或已过期
    #[error("upload session not found: {0}")]
    SessionNotFound(String),

    #[error("file index {index} out of range (session has {total} files)")]
    FileIndexOutOfRange { index: usize, total: usize },

    /// 配置无效
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Filesystem {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
