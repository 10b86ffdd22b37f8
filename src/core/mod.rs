//! Core: 下载任务的探测、分段、协调器与持久化

pub mod downloader;
pub mod error;
pub mod http;
pub mod store;
pub mod task;

pub use downloader::{Canceller, FileDownloader, JobHandle, StartOptions};
pub use error::{DownloadError, DownloadResult};
pub use http::{AwcSource, HttpSource};
pub use store::{JsonFileStore, MemoryStore, ProgressStore};
