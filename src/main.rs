use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

use anidl::batch::BatchManager;
use anidl::cli::Cli;
use anidl::common::logger::PrettyLogger;
use anidl::downloader::models::{DownloadSpec, DownloadSummary};
use anidl::downloader::progress::{ConsoleReporter, NoopReporter, ProgressReporter};
use anidl::{EpisodeDownloader, Task};
use anidl::{log_complete, log_error, log_info, log_step, log_warning};

/// 生成本次要下载的分集
async fn collect_specs(args: &Cli) -> anyhow::Result<Vec<DownloadSpec>> {
    let Some(batch_file) = &args.batch else {
        return args.url_specs();
    };

    let save_dir = batch_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut manager = BatchManager::new(save_dir).await?;
    manager
        .load_list(batch_file)
        .await
        .with_context(|| format!("读取批量列表失败: {}", batch_file.display()))?;
    log_info!(
        "已加载批量列表: {} 部番剧",
        manager.items().len()
    );
    Ok(manager.to_specs(&args.output_dir))
}

/// 提交并等待全部任务；收到 Ctrl-C 时取消剩余任务并立即返回
async fn run(
    downloader: &EpisodeDownloader,
    specs: Vec<DownloadSpec>,
) -> anyhow::Result<Vec<Arc<Task>>> {
    let tasks = downloader
        .submit(specs)
        .await
        .context("提交下载任务失败")?;

    tokio::select! {
        _ = downloader.await_all(&tasks) => {}
        Ok(()) = tokio::signal::ctrl_c() => {
            let cancelled = downloader.cancel_all();
            log_warning!("收到中断信号，已取消 {} 个任务", cancelled);
        }
    }
    Ok(tasks)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 解析命令行参数
    let args = Cli::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_target(false)
        .init();
    debug!("命令行参数: {:?}", args);

    let specs = collect_specs(&args).await?;
    if specs.is_empty() {
        log_warning!("没有需要下载的分集");
        return Ok(());
    }

    tokio::fs::create_dir_all(&args.output_dir)
        .await
        .with_context(|| format!("创建输出目录失败: {}", args.output_dir.display()))?;

    let reporter: Arc<dyn ProgressReporter> = if args.quiet {
        Arc::new(NoopReporter)
    } else {
        Arc::new(ConsoleReporter::new())
    };
    let config = args.downloader_config();
    info!(
        "并发数: {}, 分块大小: {}, 空文件重试: {:?}, 首选画质: {}P",
        config.max_concurrent, config.chunk_size, config.max_empty_retries, args.quality
    );
    let downloader = EpisodeDownloader::new(config, Arc::new(args.resolver()), reporter);

    log_step!("开始下载 {} 集", specs.len());
    PrettyLogger::file_info("保存目录", args.output_dir.display().to_string());
    let outcome = run(&downloader, specs).await;

    // 无论结果如何都要停止工作池
    if let Err(e) = downloader.shutdown().await {
        log_error!("停止下载器失败: {}", e);
    }
    let tasks = outcome?;

    let mut summary = DownloadSummary::default();
    for task in &tasks {
        summary.record(task.state());
    }
    if !args.quiet {
        PrettyLogger::download_summary(&tasks, &summary);
    }

    if summary.failed > 0 {
        anyhow::bail!("{} 集下载失败", summary.failed);
    }
    if summary.cancelled == 0 {
        log_complete!("全部下载完成");
    }
    Ok(())
}
