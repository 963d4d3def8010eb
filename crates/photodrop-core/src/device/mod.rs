//! 设备识别
//!
//! 根据 User-Agent 推断上传端的平台家族，用作设备目录名。
//!
//! 匹配规则是一张有序表：按顺序做大小写无关的子串匹配，第一个命中的条目生效。
//! 顺序很重要，例如 Android 的 UA 同时包含 "Linux"，iPhone 的 UA 同时包含
//! "Mac OS X"，所以更具体的签名必须排在前面。

use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 平台家族
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Platform {
    IPad,
    IPhone,
    Android,
    ChromeOs,
    Windows,
    Mac,
    Linux,
    #[default]
    Unknown,
}

impl Platform {
    /// 获取显示名称（同时是设备目录名的来源）
    pub fn name(&self) -> &'static str {
        match self {
            Platform::IPad => "iPad",
            Platform::IPhone => "iPhone",
            Platform::Android => "Android",
            Platform::ChromeOs => "ChromeOS",
            Platform::Windows => "Windows",
            Platform::Mac => "Mac",
            Platform::Linux => "Linux",
            Platform::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 平台签名表，按优先级排列（小写）
pub const SIGNATURES: &[(&str, Platform)] = &[
    ("ipad", Platform::IPad),
    ("iphone", Platform::IPhone),
    ("ipod", Platform::IPhone),
    ("android", Platform::Android),
    // 带空格，避免误命中 "Microsoft"
    ("cros ", Platform::ChromeOs),
    ("windows", Platform::Windows),
    ("macintosh", Platform::Mac),
    ("mac os x", Platform::Mac),
    ("linux", Platform::Linux),
];

/// 设备标签
///
/// 永远非空；无法识别时为 `Unknown`。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceLabel {
    platform: Platform,
}

impl DeviceLabel {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn as_str(&self) -> &'static str {
        self.platform.name()
    }

    /// 是否是回退标签（分类失败）
    pub fn is_fallback(&self) -> bool {
        self.platform == Platform::Unknown
    }
}

impl Default for DeviceLabel {
    fn default() -> Self {
        Self::new(Platform::Unknown)
    }
}

impl fmt::Display for DeviceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 根据 User-Agent 识别设备
///
/// 缺失或空的 UA 视为未匹配。纯函数，除了 debug 日志外没有副作用。
pub fn classify(user_agent: Option<&str>) -> DeviceLabel {
    let ua = user_agent.map(str::trim).unwrap_or_default();
    if ua.is_empty() {
        debug!("No User-Agent, falling back to {}", Platform::Unknown);
        return DeviceLabel::default();
    }

    let lowered = ua.to_ascii_lowercase();
    match SIGNATURES
        .iter()
        .find(|(needle, _)| lowered.contains(needle))
    {
        Some((_, platform)) => DeviceLabel::new(*platform),
        None => {
            debug!("Unrecognized User-Agent {:?}, falling back to Unknown", ua);
            DeviceLabel::default()
        }
    }
}
