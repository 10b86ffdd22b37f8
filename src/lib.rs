//! segdown: 分段并行、可断点续传的 HTTP 下载器
//!
//! 资源先被探测出大小，再切成 N 个互不重叠的区间，每个区间由一个工作者
//! 用 Range 请求下载并直接写入预分配的输出文件。每写入一块数据就把该分段
//! 的已下载长度保存到 [`core::ProgressStore`]，中断后再次下载同一 URL 时
//! 只请求缺失的部分。

pub mod cli;
pub mod config;
pub mod core;
pub mod ui;
pub mod utils;
