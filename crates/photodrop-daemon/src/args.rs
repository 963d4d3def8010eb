use clap::Parser;
use photodrop_core::Settings;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "photodrop-daemon", version, about = "PhotoDrop - 局域网照片上传服务")]
pub struct Cli {
    /// 监听端口 (默认取配置文件)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// 监听地址
    #[arg(long)]
    pub host: Option<String>,

    /// 上传根目录
    #[arg(short, long)]
    pub upload_root: Option<PathBuf>,

    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 把最终设置写回配置文件
    #[arg(long)]
    pub save_config: bool,
}

impl Cli {
    /// 读取配置文件，再用命令行参数覆盖
    pub fn settings(&self) -> Settings {
        let mut settings = match &self.config {
            Some(path) => Settings::load_from(path),
            None => Settings::load(),
        };
        self.apply(&mut settings);
        settings
    }

    fn apply(&self, settings: &mut Settings) {
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(host) = &self.host {
            settings.bind_host = host.clone();
        }
        if let Some(root) = &self.upload_root {
            settings.upload_root = root.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply() {
        let cli = Cli::parse_from([
            "photodrop-daemon",
            "--port",
            "8080",
            "--host",
            "127.0.0.1",
            "--upload-root",
            "/tmp/photos",
        ]);
        let mut settings = Settings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.bind_addr(), "127.0.0.1:8080");
        assert_eq!(settings.upload_root, PathBuf::from("/tmp/photos"));
    }

    #[test]
    fn test_no_overrides_keep_settings() {
        let cli = Cli::parse_from(["photodrop-daemon"]);
        let mut settings = Settings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.port, 5000);
        assert!(!cli.save_config);
    }
}
