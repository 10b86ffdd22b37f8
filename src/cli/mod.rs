//! CLI: 命令行接口和参数解析模块
//!
//! ## 支持的命令
//!
//! - 基本下载：`segdown <url>`
//! - 指定分段数：`segdown -t 8 <url>`
//! - 丢弃已保存的进度：`segdown --fresh <url>`
//! - 编辑配置：`segdown -e`
//! - 指定配置：`segdown -c config.conf <url>`
//!
//! ## 平台支持
//!
//! - Windows: `%APPDATA%/segdown/segdown.conf`
//! - macOS: `~/Library/Application Support/segdown/segdown.conf`
//! - Linux: `~/.config/segdown/segdown.conf`

use clap::Parser;
use std::env;
use crate::config::Config;
use crate::core::error::DownloadError;
use crate::utils::validator::parse_http_url;

/// 获取平台默认配置文件路径
pub fn default_config_path() -> String {
    #[cfg(target_os = "windows")]
    {
        let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        format!("{}/segdown/segdown.conf", appdata)
    }
    #[cfg(target_os = "macos")]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/Library/Application Support/segdown/segdown.conf", home)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/.config/segdown/segdown.conf", home)
    }
}

/// 打开配置文件编辑器
pub fn open_config_in_editor(config_path: &str) {
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("notepad").arg(config_path).status().ok();
    }
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg("-e").arg(config_path).status().ok();
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        // 优先 xdg-open，否则 nano
        if std::process::Command::new("xdg-open").arg(config_path).status().is_err() {
            let _ = std::process::Command::new("nano").arg(config_path).status();
        }
    }
}

fn version() -> &'static str {
    concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("VERGEN_BUILD_TIMESTAMP"), ")")
}

/// segdown 命令行参数
///
/// 示例用法：
///   segdown https://example.com/file.zip
///   segdown -t 8 -d ~/Downloads https://example.com/file.zip
///   segdown -e  # 编辑配置文件
#[derive(Parser, Debug, Clone)]
#[command(
    name = "segdown",
    author = "panzhifu",
    version = version(),
    about = "一个用 Rust 编写的多段并行、可断点续传的 HTTP 下载器",
    long_about = "把文件切成若干段并行下载，中断后重新运行同一命令即可从断点继续。\n\n示例：\n  segdown https://example.com/file.zip\n  segdown -t 8 https://example.com/file.zip\n  segdown --fresh https://example.com/file.zip\n  segdown -e\n"
)]
pub struct Args {
    /// 要下载的URL
    #[arg(required_unless_present = "edit_config", help = "要下载的URL（http 或 https）。")]
    pub url: Option<String>,

    /// 配置文件路径，默认为平台推荐路径
    #[arg(short = 'c', long, default_value_t = default_config_path(), help = "配置文件路径，默认为平台推荐路径。")]
    pub config: String,

    /// 编辑配置文件（-e 或 --edit）
    #[arg(short = 'e', long = "edit", help = "用系统默认编辑器打开配置文件并退出。")]
    pub edit_config: bool,

    /// 指定下载目录
    #[arg(long, short = 'd', help = "指定下载目录，覆盖配置文件中的设置。")]
    pub download_dir: Option<String>,

    /// 指定下载文件名
    #[arg(long, short = 'n', help = "指定下载文件名，覆盖自动推断的文件名。")]
    pub file_name: Option<String>,

    /// 指定下载线程数
    #[arg(long, short = 't', help = "指定分段数（并行连接数），覆盖配置文件中的设置。")]
    pub thread_count: Option<usize>,

    /// 丢弃已保存的进度
    #[arg(long, help = "丢弃该URL已保存的进度，从头开始下载。")]
    pub fresh: bool,
}

impl Args {
    /// 解析命令行参数并加载配置
    pub fn parse_args() -> Result<(Self, Config), DownloadError> {
        let args = Args::parse();

        if args.edit_config {
            // 确保文件存在后再打开
            Config::load(&args.config)?;
            open_config_in_editor(&args.config);
            std::process::exit(0);
        }

        let config = args.load_config()?;
        Ok((args, config))
    }

    /// 加载或创建配置文件，合并命令行参数后校验
    pub fn load_config(&self) -> Result<Config, DownloadError> {
        let mut config = Config::load(&self.config)?;
        config.merge_from_args(self);
        config.validate()?;
        Ok(config)
    }

    pub fn get_url(&self) -> Result<String, DownloadError> {
        let url = self.url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| DownloadError::InvalidUrl("未提供URL".to_string()))?;
        parse_http_url(url)?;
        Ok(url.to_string())
    }
}
