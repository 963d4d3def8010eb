//! HTTP 上传服务器
//!
//! 路由：
//! - `GET /` 手机端上传页面
//! - `GET /desktop` 桌面浏览器图库
//! - `POST /upload` multipart 上传，字段名 `files`；`count` 不得超过
//!   [`MAX_SESSION_FILES`](crate::progress::MAX_SESSION_FILES)
//! - `GET /progress/:session_id` 会话进度
//! - `GET /status` 桌面端状态面板数据
//! - `GET /uploads/:device/:file` 读取已保存的文件

mod error;
mod handlers;

pub use error::ApiError;

use crate::config::Settings;
use crate::error::Result;
use crate::net;
use crate::progress::{ProgressTracker, spawn_sweeper};
use crate::storage::{DestinationResolver, FileOutcome, Ingestor};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use log::info;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// 客户端传递会话 ID 的请求头
pub const SESSION_HEADER: &str = "x-upload-session";

/// multipart 中承载文件的字段名
pub const FILES_FIELD: &str = "files";

/// 处理器共享的状态
pub struct AppContext {
    pub settings: Settings,
    pub resolver: DestinationResolver,
    pub ingestor: Ingestor,
    pub tracker: Arc<ProgressTracker>,
    /// 展示给手机的访问地址
    pub address: String,
}

impl AppContext {
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let address = net::server_url(net::local_ipv4(), settings.port);
        Ok(Self {
            resolver: DestinationResolver::new(settings.upload_root.clone()),
            ingestor: Ingestor::from_settings(&settings),
            tracker: Arc::new(ProgressTracker::new(settings.session_idle_ttl())),
            address,
            settings,
        })
    }
}

/// 构建路由
pub fn router(ctx: Arc<AppContext>) -> Router {
    let body_limit = usize::try_from(ctx.settings.max_request_bytes).unwrap_or(usize::MAX);
    Router::new()
        .route("/", get(handlers::index))
        .route("/desktop", get(handlers::desktop))
        .route("/upload", post(handlers::upload))
        .route("/progress/:session_id", get(handlers::progress))
        .route("/status", get(handlers::status))
        .route("/uploads/:device/:file", get(handlers::uploaded_file))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// 一次上传请求的汇总结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    pub session_id: String,
    pub device_folder: String,
    pub device: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub success: bool,
    pub message: String,
    pub files: Vec<FileOutcome>,
}

impl UploadReport {
    pub fn new(
        session_id: String,
        device_folder: &str,
        device: &str,
        files: Vec<FileOutcome>,
    ) -> Self {
        let total = files.len();
        let succeeded = files.iter().filter(|f| f.success).count();
        let failed = total - succeeded;
        let message = if failed == 0 {
            format!("Successfully uploaded {} file(s) from {}", succeeded, device)
        } else {
            format!(
                "Uploaded {} of {} file(s) from {} ({} failed)",
                succeeded, total, device, failed
            )
        };
        Self {
            session_id,
            device_folder: device_folder.to_string(),
            device: device.to_string(),
            total,
            succeeded,
            failed,
            success: succeeded > 0,
            message,
            files,
        }
    }
}

/// 上传服务器
pub struct UploadServer {
    ctx: Arc<AppContext>,
}

impl UploadServer {
    pub fn new(settings: Settings) -> Result<Self> {
        Ok(Self {
            ctx: Arc::new(AppContext::new(settings)?),
        })
    }

    pub fn context(&self) -> Arc<AppContext> {
        self.ctx.clone()
    }

    /// 在后台启动服务器，返回实际监听地址
    ///
    /// 端口为 0 时由系统分配，测试中使用。
    pub async fn start(&self, port: u16) -> anyhow::Result<SocketAddr> {
        let bind = format!("{}:{}", self.ctx.settings.bind_host, port);
        let listener = tokio::net::TcpListener::bind(&bind).await?;
        let addr = listener.local_addr()?;

        spawn_sweeper(self.ctx.tracker.clone(), self.ctx.settings.sweep_interval());
        let app = router(self.ctx.clone());
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("Upload server stopped: {}", e);
            }
        });

        info!("Upload server listening on {}", addr);
        Ok(addr)
    }

    /// 前台运行，直到 `shutdown` 完成
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let bind = self.ctx.settings.bind_addr();
        let listener = tokio::net::TcpListener::bind(&bind).await?;
        info!(
            "Upload server listening on {} (open {} on your phone)",
            listener.local_addr()?,
            self.ctx.address
        );
        info!("Saving uploads under {:?}", self.ctx.resolver.root());

        let sweeper = spawn_sweeper(self.ctx.tracker.clone(), self.ctx.settings.sweep_interval());
        let app = router(self.ctx.clone());
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        sweeper.abort();

        info!("Upload server stopped");
        Ok(())
    }
}
