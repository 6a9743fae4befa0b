use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 默认分块大小 512 * 512
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 512;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DownloaderConfig {
    pub max_concurrent: usize,
    pub chunk_size: usize,
    /// 工作协程等待队列的最长时间，超时后检查运行标志
    pub queue_poll_interval: Duration,
    /// `await_all` 轮询任务状态的间隔
    pub await_poll_interval: Duration,
    /// 空文件重试上限，`None` 表示不限次数
    pub max_empty_retries: Option<u32>,
    pub user_agent: String,
    pub connect_timeout: Option<Duration>,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            chunk_size: DEFAULT_CHUNK_SIZE,
            queue_poll_interval: Duration::from_secs(1),
            await_poll_interval: Duration::from_millis(500),
            max_empty_retries: Some(3),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: None,
        }
    }
}

impl DownloaderConfig {
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_max_empty_retries(mut self, retries: Option<u32>) -> Self {
        self.max_empty_retries = retries;
        self
    }

    /// 第 `empty_results` 次得到空文件时是否还允许重新入队
    pub fn allows_empty_retry(&self, empty_results: u32) -> bool {
        match self.max_empty_retries {
            Some(cap) => empty_results <= cap,
            None => true,
        }
    }
}
