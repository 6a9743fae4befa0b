use std::path::PathBuf;

use thiserror::Error;

use super::task::TaskState;
use crate::resolver::errors::ResolutionError;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("链接解析失败: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("HTTP {status}: 下载失败 {url}")]
    HttpStatus {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("网络传输错误: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("下载的文件为空: {}", .0.display())]
    EmptyResult(PathBuf),

    #[error("文件多次下载为空，已放弃 (共尝试 {attempts} 次)")]
    RetriesExhausted { attempts: u32 },

    #[error("HTTP 客户端创建失败: {0}")]
    Client(String),

    #[error("下载管理器正在关闭")]
    ShutdownInProgress,

    #[error("下载管理器已经启动")]
    AlreadyStarted,

    #[error("下载管理器已经停止")]
    AlreadyStopped,

    #[error("无效的状态转换: {from} -> {to}")]
    InvalidTransition { from: TaskState, to: TaskState },

    #[error("工作协程异常: {0}")]
    WorkerPanic(String),
}

impl DownloadError {
    /// 传输类错误：删除残留文件，不自动重试
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            DownloadError::HttpStatus { .. } | DownloadError::Transport(_) | DownloadError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;
