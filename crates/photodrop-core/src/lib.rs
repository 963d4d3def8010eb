//! PhotoDrop Core Library
//!
//! 局域网照片上传工具的核心实现：手机在浏览器里打开本机地址，
//! 选择照片上传，文件按设备类型保存到各自的目录。
//!
//! # 模块
//!
//! - **device**: 根据 User-Agent 识别设备类型
//! - **storage**: 设备目录解析、文件名清理、流式写入与防冲突命名
//! - **progress**: 按会话跟踪上传进度，空闲会话自动清理
//! - **server**: axum HTTP 服务器（上传页面、上传、进度、状态）
//! - **library**: 已接收文件的清单
//! - **config**: 持久化设置
//!
//! # 使用示例
//!
//! ## 启动上传服务器
//!
//! ```ignore
//! use photodrop_core::{Settings, UploadServer};
//!
//! let settings = Settings::load();
//! let server = UploadServer::new(settings)?;
//! server.run(async { tokio::signal::ctrl_c().await.ok(); }).await?;
//! ```
//!
//! ## 直接写入文件
//!
//! ```ignore
//! use photodrop_core::{classify, DestinationResolver, Ingestor, Payload};
//!
//! let label = classify(Some(user_agent));
//! let folder = DestinationResolver::new("uploaded").resolve(&label).await?;
//! let outcomes = Ingestor::new(100 * 1024 * 1024, vec![])
//!     .ingest_all(&folder, vec![Payload::from_bytes("beach.png", bytes)])
//!     .await;
//! ```

pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod library;
pub mod logging;
pub mod net;
pub mod progress;
pub mod server;
pub mod storage;

// Device re-exports
pub use device::{DeviceLabel, Platform, classify};

// Storage re-exports
pub use storage::{DestinationResolver, DeviceFolder, FailureKind, FileOutcome, Ingestor, Payload};

// Progress re-exports
pub use progress::{MAX_SESSION_FILES, ProgressTracker, SessionStatus};

// Server re-exports
pub use server::{AppContext, UploadReport, UploadServer, router};

pub use client::StatusClient;
pub use config::Settings;
pub use error::{Error, Result};
pub use library::{LibrarySnapshot, StatusFeed};
