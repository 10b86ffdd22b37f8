//! HTTP 传输层
//!
//! 探测器与分段工作者只依赖 [`HttpSource`]，生产环境使用基于 awc 的 [`AwcSource`]，
//! 测试中使用内存实现。

use std::time::Duration;
use async_trait::async_trait;
use awc::http::header;
use bytes::Bytes;
use futures::stream::{LocalBoxStream, StreamExt, TryStreamExt};

use crate::config::Config;
use crate::core::error::{DownloadError, DownloadResult};

/// 响应体字节流
pub type ByteStream = LocalBoxStream<'static, Result<Bytes, DownloadError>>;

/// 探测请求的响应头信息（不包含响应体）
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status: u16,
    pub reason: String,
    pub content_length: Option<u64>,
    pub headers: Vec<(String, String)>,
}

impl ProbeResponse {
    /// 按名称查找响应头（忽略大小写）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// 范围请求的响应
pub struct RangeResponse {
    pub status: u16,
    pub body: ByteStream,
}

#[async_trait(?Send)]
pub trait HttpSource {
    /// 发起 GET 请求，只读取状态码与响应头
    async fn probe(&self, url: &str) -> DownloadResult<ProbeResponse>;

    /// 请求 `[start, end]` 字节区间
    async fn fetch_range(&self, url: &str, start: u64, end: u64) -> DownloadResult<RangeResponse>;
}

/// 基于 awc 的 HTTP 客户端，需要运行在 actix 运行时中
pub struct AwcSource {
    client: awc::Client,
}

impl AwcSource {
    pub fn new(config: &Config) -> Self {
        let connector = awc::Connector::new()
            .timeout(Duration::from_secs(config.connect_timeout_secs));
        // awc 的请求超时会覆盖整个响应体的读取，这里关闭它，只保留连接超时
        let client = awc::Client::builder()
            .connector(connector)
            .disable_timeout()
            .add_default_header((header::USER_AGENT, config.user_agent.clone()))
            .finish();
        Self { client }
    }
}

#[async_trait(?Send)]
impl HttpSource for AwcSource {
    async fn probe(&self, url: &str) -> DownloadResult<ProbeResponse> {
        let response = self.client.get(url)
            .no_decompress()
            .insert_header((header::ACCEPT_ENCODING, "identity"))
            .send()
            .await
            .map_err(|e| DownloadError::Unreachable(format!("{}: {}", url, e)))?;

        let status = response.status();
        let headers = response.headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect::<Vec<_>>();
        let content_length = response.headers().get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());

        Ok(ProbeResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            content_length,
            headers,
        })
    }

    async fn fetch_range(&self, url: &str, start: u64, end: u64) -> DownloadResult<RangeResponse> {
        let response = self.client.get(url)
            .no_decompress()
            .insert_header((header::ACCEPT_ENCODING, "identity"))
            .insert_header((header::RANGE, format!("bytes={}-{}", start, end)))
            .send()
            .await
            .map_err(|e| DownloadError::transfer(format!("请求失败: {}", e)))?;

        let status = response.status().as_u16();
        let body = TryStreamExt::map_err(response, |e| DownloadError::transfer(format!("网络流错误: {}", e)))
            .boxed_local();
        Ok(RangeResponse { status, body })
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! 内存中的 HTTP 源，支持注入断流、延迟和忽略 Range

    use std::cell::RefCell;
    use std::time::Duration;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream::{self, StreamExt};

    use super::{HttpSource, ProbeResponse, RangeResponse};
    use crate::core::error::{DownloadError, DownloadResult};

    pub struct MockSource {
        pub body: Bytes,
        pub probe_status: u16,
        pub probe_headers: Vec<(String, String)>,
        pub report_length: bool,
        pub frame_size: usize,
        pub frame_delay: Option<Duration>,
        pub ignore_range: bool,
        pub unreachable: bool,
        /// 包含该偏移的第一个请求会在该偏移处断流
        pub drop_at: RefCell<Vec<u64>>,
        pub requests: RefCell<Vec<(u64, u64)>>,
    }

    impl MockSource {
        pub fn new(len: usize) -> Self {
            let body: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            Self {
                body: Bytes::from(body),
                probe_status: 200,
                probe_headers: Vec::new(),
                report_length: true,
                frame_size: 1024,
                frame_delay: None,
                ignore_range: false,
                unreachable: false,
                drop_at: RefCell::new(Vec::new()),
                requests: RefCell::new(Vec::new()),
            }
        }

        pub fn requests(&self) -> Vec<(u64, u64)> {
            self.requests.borrow().clone()
        }
    }

    #[async_trait(?Send)]
    impl HttpSource for MockSource {
        async fn probe(&self, url: &str) -> DownloadResult<ProbeResponse> {
            if self.unreachable {
                return Err(DownloadError::Unreachable(format!("{}: connection refused", url)));
            }
            Ok(ProbeResponse {
                status: self.probe_status,
                reason: if self.probe_status == 200 { "OK".into() } else { "Not Found".into() },
                content_length: self.report_length.then(|| self.body.len() as u64),
                headers: self.probe_headers.clone(),
            })
        }

        async fn fetch_range(&self, _url: &str, start: u64, end: u64) -> DownloadResult<RangeResponse> {
            if self.unreachable {
                return Err(DownloadError::transfer("connection refused"));
            }
            self.requests.borrow_mut().push((start, end));

            let (status, from, to) = if self.ignore_range {
                (200, 0, self.body.len() as u64)
            } else {
                (206, start, end + 1)
            };

            let mut drop_at = self.drop_at.borrow_mut();
            let cut = drop_at.iter().position(|&off| off >= from && off < to).map(|i| drop_at.remove(i));
            let limit = cut.unwrap_or(to);

            let body = self.body.slice(from as usize..limit as usize);
            let frame_size = self.frame_size;
            let mut frames: Vec<Result<Bytes, DownloadError>> = (0..body.len())
                .step_by(frame_size)
                .map(|i| Ok(body.slice(i..(i + frame_size).min(body.len()))))
                .collect();
            if cut.is_some() {
                frames.push(Err(DownloadError::transfer("connection reset by peer")));
            }

            let delay = self.frame_delay;
            let body = stream::iter(frames)
                .then(move |frame| async move {
                    if let Some(d) = delay {
                        tokio::time::sleep(d).await;
                    }
                    frame
                })
                .boxed_local();
            Ok(RangeResponse { status, body })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_ignores_case() {
        let response = ProbeResponse {
            status: 200,
            reason: "OK".into(),
            content_length: Some(3),
            headers: vec![("Content-Disposition".into(), "attachment; filename=a.bin".into())],
        };
        assert_eq!(response.header("content-disposition"), Some("attachment; filename=a.bin"));
        assert_eq!(response.header("etag"), None);
    }

    #[actix_rt::test]
    async fn test_mock_drops_once_at_offset() {
        let source = mock::MockSource::new(100);
        source.drop_at.borrow_mut().push(40);

        let mut first = source.fetch_range("http://x/f", 0, 99).await.unwrap();
        let mut received = 0;
        let mut failed = false;
        while let Some(frame) = first.body.next().await {
            match frame {
                Ok(bytes) => received += bytes.len(),
                Err(_) => failed = true,
            }
        }
        assert_eq!(received, 40);
        assert!(failed);

        let second = source.fetch_range("http://x/f", 40, 99).await.unwrap();
        assert_eq!(second.status, 206);
        assert_eq!(source.requests(), vec![(0, 99), (40, 99)]);
    }
}
