use url::Url;

use crate::core::error::{DownloadError, DownloadResult};

/// 单个任务允许的最大分段数
pub const MAX_THREADS: usize = 64;

/// 解析URL，只接受 http/https
pub fn parse_http_url(url: &str) -> DownloadResult<Url> {
    let parsed = Url::parse(url.trim()).map_err(|e| DownloadError::InvalidUrl(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
        _ => Err(DownloadError::InvalidUrl(url.to_string())),
    }
}

pub fn validate_thread_count(threads: usize) -> DownloadResult<()> {
    if threads == 0 {
        return Err(DownloadError::InvalidConfig("线程数必须大于0".to_string()));
    }
    if threads > MAX_THREADS {
        return Err(DownloadError::InvalidConfig(format!("线程数不能超过 {}", MAX_THREADS)));
    }
    Ok(())
}

pub fn validate_output_path(path: &str) -> DownloadResult<()> {
    if path.trim().is_empty() {
        return Err(DownloadError::InvalidConfig("输出路径不能为空".to_string()));
    }
    Ok(())
}
