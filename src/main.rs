use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use crossterm::{
    terminal,
    event::{self, Event, KeyCode},
};
use log::LevelFilter;

use segdown::cli;
use segdown::core::{FileDownloader, JsonFileStore, StartOptions};
use segdown::core::task::JobState;
use segdown::ui::{self, DownloadSummary, ProgressManager};
use segdown::utils::logger::init_logger;

const PROGRESS_UPDATE_INTERVAL: Duration = Duration::from_millis(100);

#[actix::main]
async fn main() -> anyhow::Result<()> {
    // 解析参数和配置
    let (args, config) = match cli::Args::parse_args() {
        Ok(parsed) => parsed,
        Err(e) => {
            ui::print_error(&format!("参数解析失败: {}", e));
            std::process::exit(1);
        }
    };

    let level = config.log_level.parse().unwrap_or(LevelFilter::Info);
    if let Err(e) = init_logger(&config.log_file, level, config.log_max_size) {
        eprintln!("日志初始化失败: {}", e);
    }
    log::info!("程序启动，配置文件: {}", args.config);
    log::info!("{}", config.get_summary());

    let url = args.get_url()?;
    println!("{}", config.get_summary());

    let store = Arc::new(JsonFileStore::open(config.state_path(&args.config))?);
    log::info!("进度记录文件: {}", store.path().display());
    let downloader = FileDownloader::new(config.clone(), store);

    if args.fresh {
        downloader.discard_progress(&url)?;
        log::info!("已丢弃保存的进度: {}", url);
    }

    let latest = Rc::new(Cell::new(0u64));
    let sink = latest.clone();
    let options = StartOptions {
        file_name: args.file_name.clone(),
        listener: Some(Box::new(move |downloaded: u64| sink.set(downloaded))),
    };

    let started = Instant::now();
    let handle = match downloader.start_with(&url, &config.download_dir, config.thread_count, options).await {
        Ok(handle) => handle,
        Err(e) => {
            log::error!("无法开始下载 {}: {}", url, e);
            ui::print_error(&format!("无法开始下载: {}", e));
            std::process::exit(1);
        }
    };

    println!("开始下载 {} (按 'c' 或 'q' 取消)", handle.path().display());
    let mut progress = ProgressManager::new(handle.total_size());
    if let Some(snapshot) = handle.snapshot().await {
        log::info!(
            "已完成 {:.1}%，{} 个分段正在下载",
            snapshot.progress(),
            snapshot.running_workers()
        );
        latest.set(snapshot.downloaded);
    }
    let canceller = handle.canceller();

    // 非终端环境下没有键盘控制，只响应 Ctrl-C 信号
    let raw_mode = terminal::enable_raw_mode().is_ok();
    let mut ticker = tokio::time::interval(PROGRESS_UPDATE_INTERVAL);
    let wait = handle.wait();
    tokio::pin!(wait);

    let result = loop {
        tokio::select! {
            result = &mut wait => break result,
            _ = tokio::signal::ctrl_c() => {
                log::info!("收到 Ctrl-C，取消下载");
                canceller.cancel();
            }
            _ = ticker.tick() => {
                progress.update_progress(latest.get());
                if raw_mode && !canceller.is_cancelled() && cancel_key_pressed() {
                    log::info!("用户取消下载");
                    canceller.cancel();
                }
            }
        }
    };

    if raw_mode {
        let _ = terminal::disable_raw_mode();
    }
    progress.update_progress(latest.get());

    match result {
        Ok(report) => {
            let state = report.state;
            match state {
                JobState::Completed => progress.finish("完成"),
                _ => progress.abandon("已取消"),
            }
            println!("{}", DownloadSummary { report, elapsed_time: started.elapsed() });
            if state == JobState::Completed {
                ui::print_success("下载完成");
            }
            Ok(())
        }
        Err(e) => {
            progress.abandon("失败");
            log::error!("下载失败 {}: {}", url, e);
            ui::print_error(&format!("下载失败: {}", e));
            std::process::exit(1);
        }
    }
}

/// 读取所有待处理的键盘事件，`c`、`q` 或 Ctrl-C 表示取消
fn cancel_key_pressed() -> bool {
    let mut pressed = false;
    while let Ok(true) = event::poll(Duration::ZERO) {
        if let Ok(Event::Key(key)) = event::read() {
            match key.code {
                KeyCode::Char('c') | KeyCode::Char('C') | KeyCode::Char('q') | KeyCode::Char('Q') => pressed = true,
                _ => {}
            }
        }
    }
    pressed
}
