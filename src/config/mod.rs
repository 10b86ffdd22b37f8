use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use crate::core::error::DownloadError;
use crate::utils::validator::{validate_output_path, validate_thread_count};

/// 配置结构体
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// 默认下载目录
    pub download_dir: String,
    /// 默认线程数（分段数）
    pub thread_count: usize,
    /// 连接超时时间（秒）
    pub connect_timeout_secs: u64,
    /// 读取超时时间（秒），0 表示不限制
    pub read_timeout_secs: u64,
    /// 每次写入文件并保存进度的最大字节数
    pub chunk_size: usize,
    /// 协调器轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 单个分段的最大重试次数，0 表示不限次数
    pub max_segment_retries: u32,
    /// 重试延迟（毫秒）
    pub retry_delay_ms: u64,
    /// 最大重试延迟（毫秒）
    pub retry_max_delay_ms: u64,
    /// User-Agent
    pub user_agent: String,
    /// 进度记录文件，为空时使用配置文件旁边的 segdown.state.json
    pub state_file: String,
    /// 日志文件
    pub log_file: String,
    /// 日志级别
    pub log_level: String,
    /// 日志文件最大字节数，超过后启动时转存为 .backup
    pub log_max_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: "./downloads".to_string(),
            thread_count: 4,
            connect_timeout_secs: 5,
            read_timeout_secs: 0,
            chunk_size: 64 * 1024,
            poll_interval_ms: 900,
            max_segment_retries: 0,
            retry_delay_ms: 0,
            retry_max_delay_ms: 60_000,
            user_agent: concat!("segdown/", env!("CARGO_PKG_VERSION")).to_string(),
            state_file: String::new(),
            log_file: "logs/segdown.log".to_string(),
            log_level: "info".to_string(),
            log_max_size: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    /// 加载配置文件，不存在时写入默认配置
    pub fn load(path: &str) -> Result<Self, DownloadError> {
        if Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            match toml::from_str(&content) {
                Ok(config) => Ok(config),
                Err(e) => {
                    log::warn!("配置文件格式错误: {}，将使用默认配置", e);
                    eprintln!("配置文件格式错误: {}，将使用默认配置", e);
                    Ok(Config::default())
                }
            }
        } else {
            let config = Config::default();
            config.save_with_tutorial(path)?;
            Ok(config)
        }
    }

    /// 保存带教程的配置文件（唯一写入方法）
    pub fn save_with_tutorial(&self, path: &str) -> Result<(), DownloadError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let config_content = toml::to_string_pretty(self)
            .map_err(|e| DownloadError::InvalidConfig(format!("无法序列化配置: {}", e)))?;
        let full_content = format!("{}\n{}", Config::generate_tutorial_content(), config_content);
        fs::write(path, full_content)?;
        Ok(())
    }

    /// 生成配置文件教程内容（静态方法）
    fn generate_tutorial_content() -> String {
        r#"# segdown 配置文件
# ====================
#
# 这是一个 TOML 格式的配置文件，命令行参数会覆盖这里的设置，
# 优先级：命令行 > 配置文件 > 默认值
#
# 配置文件位置：
# - Windows: %APPDATA%/segdown/segdown.conf
# - macOS: ~/Library/Application Support/segdown/segdown.conf
# - Linux: ~/.config/segdown/segdown.conf
#
# 使用示例：
#   segdown https://example.com/file.zip                         # 使用默认配置
#   segdown -t 8 https://example.com/file.zip                    # 分成8段下载
#   segdown -d /path/to/downloads https://example.com/file.zip   # 指定下载目录
#   segdown --fresh https://example.com/file.zip                 # 丢弃已保存的进度
#   segdown -e                                                   # 编辑配置文件
#
# 配置项说明：
#
# download_dir         默认下载目录
# thread_count         分段数，每段一个连接，建议 2-16，最大 64
# connect_timeout_secs 连接超时（秒）
# read_timeout_secs    读取超时（秒），0 表示一直等待
# chunk_size           每写入多少字节保存一次进度
# poll_interval_ms     刷新进度、重启失败分段的间隔（毫秒）
# max_segment_retries  单个分段的最大重试次数，0 表示一直重试
# retry_delay_ms       第一次重试前的等待时间（毫秒），之后指数增长
# retry_max_delay_ms   重试等待时间的上限（毫秒）
# user_agent           User-Agent 字符串
# state_file           进度记录文件，留空则放在配置文件旁边
# log_file             日志文件
# log_level            日志级别：error / warn / info / debug / trace
# log_max_size         日志文件超过该大小（字节）时转存为 .backup
#
# 故障排除：
#
# 问题：下载中断后重新开始了
# 解决：确认下载目录中的文件没有被移动或修改，并且分段数与上次相同
#
# 问题：某个分段一直失败
# 解决：设置 max_segment_retries 和 retry_delay_ms，避免无限重试
#
# 问题：进度条更新太慢
# 解决：减小 poll_interval_ms
"#.to_string()
    }

    /// 校验配置合法性
    pub fn validate(&self) -> Result<(), DownloadError> {
        validate_thread_count(self.thread_count)?;
        validate_output_path(&self.download_dir)?;

        if self.connect_timeout_secs == 0 {
            return Err(DownloadError::InvalidConfig("连接超时时间必须大于0".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(DownloadError::InvalidConfig("分块大小必须大于0".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(DownloadError::InvalidConfig("轮询间隔必须大于0".to_string()));
        }
        if self.log_level.parse::<log::LevelFilter>().is_err() {
            return Err(DownloadError::InvalidConfig(format!("未知的日志级别: {}", self.log_level)));
        }

        Ok(())
    }

    /// 合并命令行参数到配置
    pub fn merge_from_args(&mut self, args: &crate::cli::Args) {
        if let Some(dir) = &args.download_dir {
            self.download_dir = dir.clone();
        }
        if let Some(thread_count) = args.thread_count {
            self.thread_count = thread_count;
        }
    }

    /// 进度记录文件路径
    pub fn state_path(&self, config_path: &str) -> String {
        if !self.state_file.trim().is_empty() {
            return self.state_file.clone();
        }
        Path::new(config_path)
            .with_file_name("segdown.state.json")
            .to_string_lossy()
            .to_string()
    }

    /// 获取配置摘要信息
    pub fn get_summary(&self) -> String {
        format!(
            "配置摘要:\n\
            - 下载目录: {}\n\
            - 线程数: {}\n\
            - 连接超时: {} 秒\n\
            - 读取超时: {}\n\
            - 重试次数: {}\n\
            - 日志文件: {}",
            self.download_dir,
            self.thread_count,
            self.connect_timeout_secs,
            if self.read_timeout_secs == 0 { "不限制".to_string() } else { format!("{} 秒", self.read_timeout_secs) },
            if self.max_segment_retries == 0 { "不限次数".to_string() } else { self.max_segment_retries.to_string() },
            self.log_file,
        )
    }
}
