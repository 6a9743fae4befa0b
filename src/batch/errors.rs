use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("番剧 '{0}' 已存在于批量列表中")]
    Duplicate(String),
    #[error("无效的列表索引: {index} (共 {len} 项)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("无效的批量列表文件: {0}")]
    InvalidFormat(String),
    #[error("不支持的导出格式: {0}")]
    UnsupportedExport(String),
    #[error("JSON 解析失败: {0}")]
    Json(#[from] serde_json::Error),
    #[error("文件读写失败: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, BatchError>;
