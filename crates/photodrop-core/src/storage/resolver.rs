//! 设备目录解析
//!
//! 将设备标签映射到 `<upload_root>/<清洗后的标签>`，不存在时创建。

use crate::device::DeviceLabel;
use crate::error::{Error, Result};
use crate::storage::DeviceFolder;
use crate::storage::naming::sanitize_label;
use log::{debug, info};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// 设备目录解析器
#[derive(Debug, Clone)]
pub struct DestinationResolver {
    root: PathBuf,
}

impl DestinationResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 解析并确保设备目录存在
    ///
    /// 并发创建同一目录时的 "already exists" 视为成功。
    pub async fn resolve(&self, label: &DeviceLabel) -> Result<DeviceFolder> {
        self.resolve_name(label.as_str()).await
    }

    /// 按任意标签字符串解析（标签会先被清洗）
    pub async fn resolve_name(&self, label: &str) -> Result<DeviceFolder> {
        let name = sanitize_label(label);
        let path = self.root.join(&name);

        match tokio::fs::create_dir_all(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("Device folder {:?} appeared concurrently", path);
            }
            Err(e) => return Err(Error::filesystem(&path, e)),
        }

        // 路径可能被同名普通文件占用
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Error::filesystem(&path, e))?;
        if !meta.is_dir() {
            return Err(Error::filesystem(
                &path,
                std::io::Error::new(ErrorKind::AlreadyExists, "path exists and is not a directory"),
            ));
        }

        info!("Resolved device folder {:?} for label {}", path, label);
        Ok(DeviceFolder { name, path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Platform, classify};

    #[tokio::test]
    async fn test_resolve_creates_root_and_folder() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("uploads");
        let resolver = DestinationResolver::new(&root);

        let label = classify(Some("Mozilla/5.0 (Linux; Android 13)"));
        let folder = resolver.resolve(&label).await.unwrap();

        assert_eq!(folder.name(), "Android");
        assert_eq!(folder.path(), root.join("Android"));
        assert!(folder.path().is_dir());
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = DestinationResolver::new(dir.path());
        let label = DeviceLabel::new(Platform::IPhone);

        let first = resolver.resolve(&label).await.unwrap();
        let second = resolver.resolve(&label).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_concurrent_resolve_same_label() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = DestinationResolver::new(dir.path().join("root"));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let resolver = resolver.clone();
            handles.push(tokio::spawn(async move {
                resolver.resolve(&DeviceLabel::new(Platform::Windows)).await
            }));
        }
        for handle in handles {
            let folder = handle.await.unwrap().unwrap();
            assert_eq!(folder.name(), "Windows");
        }
    }

    #[tokio::test]
    async fn test_resolve_name_sanitizes() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = DestinationResolver::new(dir.path());

        let folder = resolver.resolve_name("../../Galaxy S24").await.unwrap();
        assert_eq!(folder.name(), "Galaxy_S24");
        assert!(folder.path().starts_with(dir.path()));
    }

    #[tokio::test]
    async fn test_resolve_fails_when_file_blocks_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Mac"), b"not a dir").unwrap();
        let resolver = DestinationResolver::new(dir.path());

        let err = resolver
            .resolve(&DeviceLabel::new(Platform::Mac))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Filesystem { .. }));
    }
}
