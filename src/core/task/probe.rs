use std::sync::OnceLock;
use regex::Regex;
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::core::error::{DownloadError, DownloadResult};
use crate::core::http::{HttpSource, ProbeResponse};
use crate::utils::validator::parse_http_url;

/// 探测得到的远程资源信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub total_size: u64,
    pub file_name: String,
    pub accept_ranges: bool,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// 向目标URL发起探测请求，获取文件大小与文件名，不下载响应体
pub async fn probe(source: &dyn HttpSource, url: &str) -> DownloadResult<ResourceInfo> {
    parse_http_url(url)?;
    let response = source.probe(url).await?;
    log::debug!("探测响应 {} {}: {:?}", response.status, response.reason, response.headers);
    inspect(url, &response)
}

fn inspect(url: &str, response: &ProbeResponse) -> DownloadResult<ResourceInfo> {
    if response.status != 200 {
        return Err(DownloadError::ServerRejected {
            code: response.status,
            message: response.reason.clone(),
        });
    }
    let total_size = match response.content_length {
        Some(len) if len > 0 => len,
        _ => return Err(DownloadError::UnknownSize),
    };

    Ok(ResourceInfo {
        total_size,
        file_name: resolve_file_name(url, &response.headers),
        accept_ranges: response.header("accept-ranges").map_or(false, |v| v.trim().eq_ignore_ascii_case("bytes")),
        etag: response.header("etag").map(str::to_string),
        last_modified: response.header("last-modified").map(str::to_string),
    })
}

/// 文件名来源依次为：URL 最后一段路径、Content-Disposition 的 filename 参数、随机生成
pub fn resolve_file_name(url: &str, headers: &[(String, String)]) -> String {
    name_from_url(url)
        .or_else(|| name_from_disposition(headers))
        .unwrap_or_else(|| format!("{}.tmp", Uuid::new_v4()))
}

fn name_from_url(url: &str) -> Option<String> {
    let parsed = parse_http_url(url).ok()?;
    let last = parsed.path_segments()?.last()?.to_string();
    sanitize_file_name(&last)
}

fn name_from_disposition(headers: &[(String, String)]) -> Option<String> {
    static FILENAME: OnceLock<Regex> = OnceLock::new();
    let re = FILENAME.get_or_init(|| {
        Regex::new(r#"(?i)(?:^|[;\s])filename\s*=\s*(?:"([^"]*)"|([^;]*))"#).expect("filename regex")
    });

    headers
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case("content-disposition"))
        .find_map(|(_, v)| {
            let caps = re.captures(v)?;
            let raw = caps.get(1).or_else(|| caps.get(2))?.as_str();
            sanitize_file_name(raw)
        })
}

/// 去掉目录部分，防止文件名跳出下载目录
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(|c| c == '/' || c == '\\').next()?.trim();
    match base {
        "" | "." | ".." => None,
        _ => Some(base.to_string()),
    }
}
