//! 上传写入
//!
//! 每个附件先流式写入同目录下的隐藏临时文件 `.<uuid>.part`，写完后再以
//! "不覆盖" 的方式发布到最终文件名：
//!
//! 1. 扫描 `name`、`stem_1.ext`、`stem_2.ext`... 找到第一个不存在的名字
//! 2. 用硬链接发布（目标已存在时原子失败），文件系统不支持硬链接时
//!    退回到 "独占创建占位文件 + rename"
//! 3. 若其他写入者抢先占用了这个名字，重新扫描，最多 [`MAX_CLAIM_ATTEMPTS`] 次
//!
//! 中途断开的上传只会留下 `.part` 文件，不会出现写了一半的正式文件。

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::storage::naming::{extension_allowed, sanitize_filename, suffixed_name};
use crate::storage::{DeviceFolder, FileOutcome};
use log::{debug, info, warn};
use std::io::{self, ErrorKind};
use std::path::Path;
use std::pin::Pin;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

/// 抢名失败后的最大重试次数
pub const MAX_CLAIM_ATTEMPTS: usize = 8;

/// 冲突后缀扫描上限
const MAX_SUFFIX: u32 = 100_000;

const CHUNK_SIZE: usize = 64 * 1024;

/// 临时文件扩展名
pub const TEMP_EXTENSION: &str = "part";

/// 一个待写入的附件
pub struct Payload {
    pub name: String,
    reader: Pin<Box<dyn AsyncRead + Send>>,
}

impl Payload {
    pub fn new(name: impl Into<String>, reader: impl AsyncRead + Send + 'static) -> Self {
        Self {
            name: name.into(),
            reader: Box::pin(reader),
        }
    }

    /// 内存中的附件
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(name, io::Cursor::new(bytes.into()))
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payload").field("name", &self.name).finish()
    }
}

/// 上传写入器
#[derive(Debug, Clone)]
pub struct Ingestor {
    max_file_bytes: u64,
    allowed_extensions: Vec<String>,
}

impl Ingestor {
    pub fn new(max_file_bytes: u64, allowed_extensions: Vec<String>) -> Self {
        Self {
            max_file_bytes,
            allowed_extensions,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.max_file_bytes,
            settings.allowed_extensions.clone(),
        )
    }

    /// 按顺序写入一批附件
    ///
    /// 单个附件失败不影响后续附件，返回的结果与输入一一对应。
    pub async fn ingest_all(
        &self,
        folder: &DeviceFolder,
        payloads: Vec<Payload>,
    ) -> Vec<FileOutcome> {
        let mut outcomes = Vec::with_capacity(payloads.len());
        for payload in payloads {
            outcomes.push(self.store(folder, &payload.name, payload.reader).await);
        }
        outcomes
    }

    /// 写入单个附件，从不返回错误，失败记录在结果里
    pub async fn store<R: AsyncRead>(
        &self,
        folder: &DeviceFolder,
        claimed_name: &str,
        reader: R,
    ) -> FileOutcome {
        match self.try_store(folder, claimed_name, reader).await {
            Ok((stored_name, size)) => {
                info!(
                    "Stored {:?} as {}/{} ({} bytes)",
                    claimed_name,
                    folder.name(),
                    stored_name,
                    size
                );
                FileOutcome::stored(claimed_name, stored_name, size)
            }
            Err(e) => {
                warn!("Failed to store {:?}: {}", claimed_name, e);
                FileOutcome::failed(claimed_name, &e)
            }
        }
    }

    async fn try_store<R: AsyncRead>(
        &self,
        folder: &DeviceFolder,
        claimed_name: &str,
        reader: R,
    ) -> Result<(String, u64)> {
        let name = sanitize_filename(claimed_name);
        if !extension_allowed(&name, &self.allowed_extensions) {
            return Err(Error::InvalidPayload(format!(
                "unsupported file type: {name}"
            )));
        }

        let temp = folder.path().join(format!(
            ".{}.{}",
            uuid::Uuid::new_v4().simple(),
            TEMP_EXTENSION
        ));

        let result: Result<(String, u64)> = async {
            let size = self.write_temp(&temp, reader).await?;
            if size == 0 {
                return Err(Error::InvalidPayload("empty payload".to_string()));
            }
            let stored = publish(folder.path(), &temp, &name).await?;
            Ok((stored, size))
        }
        .await;

        if result.is_err() {
            discard_temp(&temp).await;
        }
        result
    }

    /// 流式写入临时文件，返回字节数
    async fn write_temp<R: AsyncRead>(&self, temp: &Path, reader: R) -> Result<u64> {
        tokio::pin!(reader);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(temp)
            .await
            .map_err(|e| Error::filesystem(temp, e))?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut total: u64 = 0;
        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| Error::InvalidPayload(format!("payload stream interrupted: {e}")))?;
            if n == 0 {
                break;
            }
            total += n as u64;
            if total > self.max_file_bytes {
                return Err(Error::InvalidPayload(format!(
                    "payload exceeds {} bytes",
                    self.max_file_bytes
                )));
            }
            file.write_all(&buf[..n])
                .await
                .map_err(|e| Error::filesystem(temp, e))?;
        }

        file.flush().await.map_err(|e| Error::filesystem(temp, e))?;
        file.sync_all()
            .await
            .map_err(|e| Error::filesystem(temp, e))?;
        Ok(total)
    }
}

/// 将临时文件发布为不冲突的最终文件名
async fn publish(dir: &Path, temp: &Path, name: &str) -> Result<String> {
    for attempt in 0..MAX_CLAIM_ATTEMPTS {
        let candidate = next_free_name(dir, name).await?;
        let target = dir.join(&candidate);
        match claim(temp, &target).await {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(
                    "Lost race for {:?} (attempt {}), rescanning",
                    target,
                    attempt + 1
                );
            }
            Err(e) => return Err(Error::filesystem(&target, e)),
        }
    }

    Err(Error::filesystem(
        dir.join(name),
        io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free file name after {MAX_CLAIM_ATTEMPTS} attempts"),
        ),
    ))
}

/// 以文件系统为准，找到第一个不存在的候选名
pub async fn next_free_name(dir: &Path, name: &str) -> Result<String> {
    for n in 0..MAX_SUFFIX {
        let candidate = suffixed_name(name, n);
        let path = dir.join(&candidate);
        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| Error::filesystem(&path, e))?;
        if !exists {
            return Ok(candidate);
        }
    }
    Err(Error::filesystem(
        dir.join(name),
        io::Error::new(ErrorKind::AlreadyExists, "collision suffixes exhausted"),
    ))
}

/// 不覆盖地把 `temp` 移到 `target`；目标已存在时返回 `AlreadyExists`
async fn claim(temp: &Path, target: &Path) -> io::Result<()> {
    match tokio::fs::hard_link(temp, target).await {
        Ok(()) => {
            if let Err(e) = tokio::fs::remove_file(temp).await {
                warn!("Failed to remove temp file {:?}: {}", temp, e);
            }
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(e),
        Err(e) => {
            debug!("Hard link unavailable ({}), using create_new + rename", e);
            let placeholder: File = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(target)
                .await?;
            drop(placeholder);
            if let Err(e) = tokio::fs::rename(temp, target).await {
                // 占位文件不能留在最终文件名上
                if let Err(cleanup) = tokio::fs::remove_file(target).await {
                    warn!("Failed to remove placeholder {:?}: {}", target, cleanup);
                }
                return Err(e);
            }
            Ok(())
        }
    }
}

async fn discard_temp(temp: &Path) {
    match tokio::fs::remove_file(temp).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove temp file {:?}: {}", temp, e),
    }
}
