pub mod batch;
pub mod cli;
pub mod common;
pub mod downloader;
pub mod resolver;

pub use downloader::{
    DownloaderConfig, EpisodeDownloader,
    error::DownloadError,
    models::{DownloadSpec, DownloadSummary, FileNaming, TaskStatus},
    task::{Task, TaskState},
};
pub use resolver::{DirectLinkResolver, LinkResolver, ResolvedLink};
