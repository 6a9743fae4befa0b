use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::error::{DownloadError, Result};
use super::progress::ProgressReporter;
use super::task::{Task, TaskState};

/// 一次下载尝试的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Completed { bytes: u64 },
    Cancelled { bytes: u64 },
    /// 流正常结束但文件是空的
    Empty,
}

enum ChunkControl {
    Continue,
    Cancelled,
}

/// 单个文件的流式下载器
pub struct Fetcher {
    client: reqwest::Client,
    chunk_size: usize,
    reporter: Arc<dyn ProgressReporter>,
}

impl Fetcher {
    pub fn new(
        client: reqwest::Client,
        chunk_size: usize,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            client,
            chunk_size: chunk_size.max(1),
            reporter,
        }
    }

    /// 执行一次下载尝试。传输失败时删除残留文件后返回错误，取消时保留已写入的部分。
    pub async fn fetch(&self, task: &Task) -> Result<FetchOutcome> {
        let attempt = task.begin_attempt()?;
        self.reporter.on_state(task.episode(), TaskState::Downloading);
        debug!(
            "开始第 {} 次下载尝试: 第 {} 集 -> {}",
            attempt,
            task.episode(),
            task.file_path().display()
        );

        match self.stream_to_file(task).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!("第 {} 集下载失败: {}", task.episode(), e);
                remove_partial(task.file_path()).await;
                Err(e)
            }
        }
    }

    async fn stream_to_file(&self, task: &Task) -> Result<FetchOutcome> {
        ensure_folder(task.folder()).await?;

        let response = self.client.get(task.url()).send().await?;
        check_response_status(&response, task.url())?;

        let total = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|ct_len| ct_len.to_str().ok())
            .and_then(|ct_len| ct_len.parse().ok())
            .unwrap_or(0u64);
        task.set_total(total);
        if total == 0 {
            debug!("第 {} 集没有 Content-Length，无法计算百分比", task.episode());
        }

        let mut file = File::create(task.file_path()).await?;
        info!(
            "开始下载第 {} 集: {} -> {}",
            task.episode(),
            task.title(),
            task.file_path().display()
        );

        let mut stream = response.bytes_stream();
        let mut buffer = BytesMut::with_capacity(self.chunk_size);
        let mut downloaded = 0u64;

        while let Some(frame) = stream.next().await {
            buffer.extend_from_slice(&frame?);
            while buffer.len() >= self.chunk_size {
                let chunk = buffer.split_to(self.chunk_size).freeze();
                if let ChunkControl::Cancelled = self
                    .write_chunk(task, &mut file, chunk, &mut downloaded, total)
                    .await?
                {
                    return Ok(self.finish_cancelled(task, file, downloaded).await);
                }
            }
        }

        if !buffer.is_empty() {
            let chunk = buffer.split().freeze();
            if let ChunkControl::Cancelled = self
                .write_chunk(task, &mut file, chunk, &mut downloaded, total)
                .await?
            {
                return Ok(self.finish_cancelled(task, file, downloaded).await);
            }
        }

        file.flush().await?;
        drop(file);

        let size_on_disk = tokio::fs::metadata(task.file_path()).await?.len();
        if downloaded == 0 || size_on_disk == 0 {
            return Ok(FetchOutcome::Empty);
        }

        debug!("第 {} 集写入完成，共 {} 字节", task.episode(), downloaded);
        Ok(FetchOutcome::Completed { bytes: downloaded })
    }

    // 写入前先检查取消，再在暂停闸门上等待
    async fn write_chunk(
        &self,
        task: &Task,
        file: &mut File,
        chunk: Bytes,
        downloaded: &mut u64,
        total: u64,
    ) -> Result<ChunkControl> {
        if task.is_cancel_requested() {
            return Ok(ChunkControl::Cancelled);
        }

        if !task.pause_gate().is_open() {
            task.transition(TaskState::Paused)?;
            self.reporter.on_state(task.episode(), TaskState::Paused);
            debug!("第 {} 集已暂停", task.episode());

            tokio::select! {
                biased;
                _ = task.cancel_token().cancelled() => return Ok(ChunkControl::Cancelled),
                _ = task.pause_gate().wait() => {}
            }

            task.transition(TaskState::Downloading)?;
            self.reporter.on_state(task.episode(), TaskState::Downloading);
            debug!("第 {} 集恢复下载", task.episode());
        }

        file.write_all(&chunk).await?;
        *downloaded += chunk.len() as u64;

        let update = task.record_chunk(*downloaded, total);
        self.reporter.on_progress(&update);
        Ok(ChunkControl::Continue)
    }

    async fn finish_cancelled(&self, task: &Task, mut file: File, downloaded: u64) -> FetchOutcome {
        // 已写入的部分保留在磁盘上
        if let Err(e) = file.flush().await {
            warn!("第 {} 集取消时刷新文件失败: {}", task.episode(), e);
        }
        info!("第 {} 集已取消，已写入 {} 字节", task.episode(), downloaded);
        FetchOutcome::Cancelled { bytes: downloaded }
    }
}

/// 非 200 一律视为失败
fn check_response_status(response: &reqwest::Response, url: &str) -> Result<()> {
    let status = response.status();
    debug!("Response Status: {}", status);

    if status == reqwest::StatusCode::OK {
        return Ok(());
    }
    match status {
        reqwest::StatusCode::FORBIDDEN | reqwest::StatusCode::TOO_MANY_REQUESTS => {
            warn!("🚫 检测到 {} 状态码，可能触发了风控机制", status);
        }
        _ => warn!("❌ 非成功状态码: {}", status),
    }
    Err(DownloadError::HttpStatus {
        status,
        url: url.to_string(),
    })
}

/// 多个工作协程可能同时创建同一个目录，已存在视为成功
pub(crate) async fn ensure_folder(folder: &Path) -> Result<()> {
    match tokio::fs::create_dir_all(folder).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && folder.is_dir() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("已删除残留文件: {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("删除残留文件失败 {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_folder_tolerates_concurrent_creation() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a").join("b");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let target = target.clone();
                tokio::spawn(async move { ensure_folder(&target).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(target.is_dir());
        ensure_folder(&target).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_partial_ignores_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.mp4");
        remove_partial(&path).await;

        tokio::fs::write(&path, b"partial").await.unwrap();
        remove_partial(&path).await;
        assert!(!path.exists());
    }
}
