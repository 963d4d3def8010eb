use crate::device::classify;
use crate::library::{self, StatusFeed};
use crate::net;
use crate::progress::SessionStatus;
use crate::server::error::ApiError;
use crate::server::{AppContext, FILES_FIELD, SESSION_HEADER, UploadReport};
use crate::storage::FileOutcome;
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use futures_util::TryStreamExt;
use log::{debug, info, warn};
use serde::Deserialize;
use std::io;
use std::sync::Arc;
use tokio::fs::File;
use tokio_util::io::{ReaderStream, StreamReader};

const INDEX_HTML: &str = include_str!("index.html");
const DESKTOP_HTML: &str = include_str!("desktop.html");

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// 会话 ID（也可以放在 `X-Upload-Session` 头里）
    pub session: Option<String>,
    /// 客户端预先声明的文件数量
    pub count: Option<usize>,
}

/// 手机端上传页面
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// 桌面浏览器图库，按设备目录展示缩略图
pub async fn desktop() -> Html<&'static str> {
    Html(DESKTOP_HTML)
}

/// 上传处理器
///
/// 逐个读取 multipart 中名为 `files` 的字段并流式写入设备目录。
pub async fn upload(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());
    let label = classify(user_agent);
    if label.is_fallback() {
        info!("Could not classify device from {:?}, using {}", user_agent, label);
    }

    let session_id = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .or(query.session.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    // 目录都没有就无处可写，整个请求失败
    let folder = ctx.resolver.resolve(&label).await?;

    let mut expected = query.count.unwrap_or(0);
    ctx.tracker.begin(&session_id, expected)?;

    let mut outcomes: Vec<FileOutcome> = Vec::new();
    let mut stream_error = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Multipart stream failed: {}", e);
                stream_error = Some(e);
                break;
            }
        };

        if field.name() != Some(FILES_FIELD) {
            debug!("Skipping multipart field {:?}", field.name());
            continue;
        }

        let index = outcomes.len();
        if index >= expected {
            expected = ctx.tracker.grow(&session_id, 1).unwrap_or(index + 1);
        }

        let claimed = field.file_name().unwrap_or_default().to_string();
        let reader = StreamReader::new(field.map_err(io::Error::other));
        let outcome = ctx.ingestor.store(&folder, &claimed, reader).await;

        // 超长上传期间会话可能已被清理，不影响写入本身
        if let Err(e) = ctx
            .tracker
            .mark_completed(&session_id, index, outcome.clone())
        {
            warn!("Progress update for {} dropped: {}", session_id, e);
        }
        outcomes.push(outcome);
    }

    if let Err(e) = ctx.tracker.settle(&session_id) {
        debug!("Session {} settled after eviction: {}", session_id, e);
    }

    // 请求体本身坏掉（例如超过大小上限）且没有任何文件写成功时，按请求错误返回
    if let Some(e) = stream_error
        && outcomes.iter().all(|o| !o.success)
    {
        return Err(ApiError::from(e));
    }
    if outcomes.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "No files provided"));
    }

    let report = UploadReport::new(session_id, folder.name(), label.as_str(), outcomes);
    info!("{}", report.message);

    let status = if report.succeeded > 0 {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    Ok((status, Json(report)).into_response())
}

/// 查询上传进度
pub async fn progress(
    State(ctx): State<Arc<AppContext>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStatus>, ApiError> {
    Ok(Json(ctx.tracker.status(&session_id)?))
}

/// 状态面板数据
pub async fn status(State(ctx): State<Arc<AppContext>>) -> Result<Json<StatusFeed>, ApiError> {
    let library = library::scan(ctx.resolver.root()).await?;
    Ok(Json(StatusFeed {
        address: ctx.address.clone(),
        host_name: net::host_name(),
        connected: true,
        total_files: library.total_files(),
        library,
        sessions: ctx.tracker.sessions(),
    }))
}

/// 下载已保存的文件（`/desktop` 图库的缩略图）
pub async fn uploaded_file(
    State(ctx): State<Arc<AppContext>>,
    Path((device, file)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    if !is_plain_component(&device) || !is_plain_component(&file) {
        return Err(ApiError::not_found("File not found"));
    }

    let path = ctx.resolver.root().join(&device).join(&file);
    let file_handle = match File::open(&path).await {
        Ok(f) => f,
        Err(_) => return Err(ApiError::not_found("File not found")),
    };
    let is_file = file_handle
        .metadata()
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(ApiError::not_found("File not found"));
    }

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    let stream = ReaderStream::new(file_handle);
    Ok((
        [(header::CONTENT_TYPE, mime.to_string())],
        Body::from_stream(stream),
    )
        .into_response())
}

/// 单个路径分量：非空、不含分隔符、不以点开头
fn is_plain_component(s: &str) -> bool {
    !s.is_empty() && !s.starts_with('.') && !s.contains(['/', '\\', '\0'])
}
