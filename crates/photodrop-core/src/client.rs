//! 状态面板客户端
//!
//! 桌面端 TUI 通过它轮询运行中的上传服务器。

use crate::library::StatusFeed;
use crate::progress::SessionStatus;
use anyhow::Context;
use reqwest::StatusCode;
use std::time::Duration;

pub struct StatusClient {
    base_url: String,
    http: reqwest::Client,
}

impl StatusClient {
    /// `base_url` 形如 `http://127.0.0.1:5000/`，末尾斜杠可有可无
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn fetch_status(&self) -> anyhow::Result<StatusFeed> {
        let url = format!("{}/status", self.base_url);
        let feed = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?
            .error_for_status()?
            .json::<StatusFeed>()
            .await?;
        Ok(feed)
    }

    /// 查询会话进度；会话不存在时返回 `None`
    pub async fn progress(&self, session_id: &str) -> anyhow::Result<Option<SessionStatus>> {
        let url = format!("{}/progress/{}", self.base_url, session_id);
        let resp = self.http.get(&url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(resp.error_for_status()?.json().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trims_slash() {
        let client = StatusClient::new("http://127.0.0.1:5000/").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:5000");
    }
}
