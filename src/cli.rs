use clap::Parser;
use std::path::PathBuf;

use crate::batch::models::BatchItem;
use crate::common::utils::{parse_episode_selection, sanitize_filename};
use crate::downloader::config::{DEFAULT_CHUNK_SIZE, DownloaderConfig};
use crate::downloader::models::{DownloadSpec, FileNaming};
use crate::resolver::DirectLinkResolver;

/// 空文件重试上限，`unlimited` 表示不限次数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryLimit(pub Option<u32>);

fn parse_retry_limit(s: &str) -> Result<RetryLimit, String> {
    if s.eq_ignore_ascii_case("unlimited") {
        return Ok(RetryLimit(None));
    }
    s.parse::<u32>()
        .map(|n| RetryLimit(Some(n)))
        .map_err(|_| format!("无效的重试次数: {} (应为非负整数或 unlimited)", s))
}

/// 番剧分集下载器
#[derive(Parser, Debug)]
#[command(name = "anidl")]
#[command(version = "0.1")]
#[command(author = "rpeng252@gmail.com")]
#[command(about = "一个支持并发、暂停与取消的番剧分集下载工具", long_about = None)]
pub struct Cli {
    /// 分集链接，可重复指定
    #[arg(long, value_name = "URL")]
    #[arg(value_hint = clap::ValueHint::Url)]
    #[arg(required_unless_present = "batch", conflicts_with = "batch")]
    pub url: Vec<String>,

    /// 第一个链接对应的集数，后续链接依次递增
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub episode: u32,

    /// 批量列表文件 (JSON)
    #[arg(long, value_name = "FILE")]
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub batch: Option<PathBuf>,

    /// 视频保存目录
    #[arg(long, value_name = "DIR")]
    #[arg(default_value = ".")]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub output_dir: PathBuf,

    /// 番剧名称，用作子目录名
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,

    /// 集数选择 (可选，需要配合 --total-episodes 和 --name)
    #[arg(long, value_name = "SELECTION")]
    #[arg(help = "指定要下载的集数，如: \"1 3 5-7\"")]
    #[arg(requires_all = ["total_episodes", "name"])]
    pub episodes: Option<String>,

    /// 总集数，用于校验集数选择
    #[arg(long, value_name = "N")]
    pub total_episodes: Option<u32>,

    #[arg(long, value_name = "并发数", default_value_t = 3)]
    pub concurrency: usize,

    #[arg(long, value_name = "字节数", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// 首选画质，链接含 {quality} 时生效
    #[arg(long)]
    #[arg(value_name = "QUALITY")]
    #[arg(default_value = "1080")]
    #[arg(help = "视频质量: 1080, 720, 480, 360，没有该画质时使用最高画质")]
    pub quality: u32,

    /// 空文件重试次数 (0 表示不重试)
    #[arg(long, value_name = "N|unlimited", default_value = "3")]
    #[arg(value_parser = parse_retry_limit)]
    pub max_retries: RetryLimit,

    /// 只输出警告和错误，不显示进度条
    #[arg(long, short, conflicts_with = "verbose")]
    pub quiet: bool,

    /// 输出调试日志
    #[arg(long, short)]
    pub verbose: bool,
}

impl Cli {
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::WARN
        } else {
            tracing::Level::INFO
        }
    }

    pub fn downloader_config(&self) -> DownloaderConfig {
        DownloaderConfig::default()
            .with_max_concurrent(self.concurrency)
            .with_chunk_size(self.chunk_size)
            .with_max_empty_retries(self.max_retries.0)
    }

    pub fn resolver(&self) -> DirectLinkResolver {
        DirectLinkResolver::new().with_quality(self.quality)
    }

    /// 根据 --url 相关参数生成下载说明 (不处理 --batch)
    pub fn url_specs(&self) -> anyhow::Result<Vec<DownloadSpec>> {
        if let Some(selection) = &self.episodes {
            let [url] = self.url.as_slice() else {
                anyhow::bail!("使用 --episodes 时只能指定一个 --url");
            };
            let total = self.total_episodes.unwrap_or_default();
            let item = BatchItem {
                name: self.name.clone().unwrap_or_default(),
                url: url.clone(),
                episodes: parse_episode_selection(selection, total)?,
                total_episodes: total,
            };
            return Ok(item.to_specs(&self.output_dir));
        }

        let (collection, folder) = match &self.name {
            Some(name) => (name.clone(), self.output_dir.join(sanitize_filename(name))),
            None => (String::new(), self.output_dir.clone()),
        };
        Ok(self
            .url
            .iter()
            .zip(self.episode..)
            .map(|(url, episode)| DownloadSpec {
                reference: url.clone(),
                collection: collection.clone(),
                episode,
                folder: folder.clone(),
                naming: FileNaming::Title,
            })
            .collect())
    }
}
