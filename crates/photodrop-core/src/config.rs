//! 应用配置和持久化
//!
//! 提供上传目录、监听地址、大小限制等设置的存储和读取。

use crate::error::{Error, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 默认允许的图片扩展名
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] =
    &["png", "jpg", "jpeg", "gif", "bmp", "tiff", "webp", "heic"];

const MIB: u64 = 1024 * 1024;

/// 应用设置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 上传根目录，设备目录建在它下面
    pub upload_root: PathBuf,
    /// 监听地址
    pub bind_host: String,
    /// 监听端口
    pub port: u16,
    /// 单个请求体上限（字节）
    pub max_request_bytes: u64,
    /// 单个文件上限（字节）
    pub max_file_bytes: u64,
    /// 允许的扩展名（小写，不含点）；为空表示不限制
    pub allowed_extensions: Vec<String>,
    /// 上传会话无更新多久后被清理（秒）
    pub session_idle_ttl_secs: u64,
    /// 后台清理间隔（秒）
    pub sweep_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upload_root: default_upload_root(),
            bind_host: "0.0.0.0".to_string(),
            port: 5000,
            max_request_bytes: 512 * MIB,
            max_file_bytes: 100 * MIB,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            session_idle_ttl_secs: 600,
            sweep_interval_secs: 60,
        }
    }
}

impl Settings {
    /// 获取配置文件路径
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("photodrop");
        config_dir.join("settings.toml")
    }

    /// 加载设置（如果文件不存在则使用默认值）
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// 从指定路径加载，读取或解析失败时回退到默认值
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(settings) => {
                        debug!("Loaded settings from {:?}", path);
                        return settings;
                    }
                    Err(e) => {
                        log::warn!("Failed to parse settings: {}, using defaults", e);
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read settings file: {}, using defaults", e);
                }
            }
        }
        Self::default()
    }

    /// 保存设置
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    /// 检查设置是否可用
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::Config("port must be non-zero".to_string()));
        }
        if self.max_file_bytes == 0 || self.max_request_bytes == 0 {
            return Err(Error::Config("size limits must be non-zero".to_string()));
        }
        if self.session_idle_ttl_secs == 0 || self.sweep_interval_secs == 0 {
            return Err(Error::Config(
                "session ttl and sweep interval must be non-zero".to_string(),
            ));
        }
        if self.upload_root.as_os_str().is_empty() {
            return Err(Error::Config("upload_root must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn session_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.session_idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// 监听地址，形如 `0.0.0.0:5000`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

/// 默认上传目录：图片目录下的 PhotoDrop，没有图片目录时用 ./uploaded
fn default_upload_root() -> PathBuf {
    dirs::picture_dir()
        .map(|p| p.join("PhotoDrop"))
        .unwrap_or_else(|| PathBuf::from("uploaded"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.port, 5000);
        assert_eq!(settings.max_file_bytes, 100 * MIB);
        assert!(settings.allowed_extensions.iter().any(|e| e == "jpg"));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: Settings = toml::from_str("port = 8080\n").unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.bind_host, "0.0.0.0");
        assert_eq!(settings.session_idle_ttl(), Duration::from_secs(600));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        let settings = Settings {
            port: 6000,
            allowed_extensions: vec![],
            ..Default::default()
        };
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path);
        assert_eq!(loaded.port, 6000);
        assert!(loaded.allowed_extensions.is_empty());
    }

    #[test]
    fn test_broken_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "port = \"not a number\"").unwrap();

        assert_eq!(Settings::load_from(&path).port, 5000);
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let settings = Settings {
            port: 0,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }
}
