use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::error::{DownloadError, Result};
use super::gate::PauseGate;
use super::models::{DownloadSpec, ProgressUpdate};
use crate::resolver::ResolvedLink;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Downloading,
    Paused,
    Completed,
    Error,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Error | TaskState::Cancelled
        )
    }

    // 允许的状态边，终态没有出边
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Queued, Downloading)
                | (Queued, Cancelled)
                | (Downloading, Paused)
                | (Downloading, Completed)
                | (Downloading, Error)
                | (Downloading, Cancelled)
                | (Downloading, Queued)
                | (Paused, Downloading)
                | (Paused, Cancelled)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Queued => "queued",
            TaskState::Downloading => "downloading",
            TaskState::Paused => "paused",
            TaskState::Completed => "completed",
            TaskState::Error => "error",
            TaskState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskProgress {
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub speed_bytes_per_sec: f64,
    pub percentage: f64,
}

impl TaskProgress {
    /// 根据已下载字节数、总大小和耗时计算进度
    pub fn compute(downloaded: u64, total: u64, elapsed_secs: f64) -> Self {
        let speed_bytes_per_sec = if elapsed_secs > 0.0 {
            downloaded as f64 / elapsed_secs
        } else {
            0.0
        };
        let percentage = if total > 0 {
            downloaded as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            total_bytes: total,
            downloaded_bytes: downloaded,
            speed_bytes_per_sec,
            percentage,
        }
    }
}

#[derive(Debug)]
struct TaskInner {
    state: TaskState,
    progress: TaskProgress,
    start_time: Option<Instant>,
    attempts: u32,
    empty_results: u32,
    last_error: Option<String>,
}

/// 单集下载任务。
///
/// 状态与进度只由取出该任务的工作协程修改；调用方通过 `pause`/`resume`/`cancel`
/// 发出控制信号，并随时读取快照。
#[derive(Debug)]
pub struct Task {
    id: Uuid,
    url: String,
    title: String,
    collection: String,
    episode: u32,
    folder: PathBuf,
    file_path: PathBuf,
    inner: Mutex<TaskInner>,
    pause_gate: PauseGate,
    cancel_token: CancellationToken,
}

impl Task {
    pub fn new(spec: &DownloadSpec, link: &ResolvedLink) -> Self {
        let file_name = spec.naming.file_name(&link.title, spec.episode);
        Self::build(
            spec,
            link.media_url.clone(),
            link.title.clone(),
            file_name,
            TaskState::Queued,
            None,
        )
    }

    // 链接解析失败的任务直接以错误状态创建，不会入队
    pub fn unresolved(spec: &DownloadSpec, message: impl Into<String>) -> Self {
        let file_name = format!("episode_{}.mp4", spec.episode);
        Self::build(
            spec,
            spec.reference.clone(),
            String::new(),
            file_name,
            TaskState::Error,
            Some(message.into()),
        )
    }

    fn build(
        spec: &DownloadSpec,
        url: String,
        title: String,
        file_name: String,
        state: TaskState,
        last_error: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            title,
            collection: spec.collection.clone(),
            episode: spec.episode,
            folder: spec.folder.clone(),
            file_path: spec.folder.join(file_name),
            inner: Mutex::new(TaskInner {
                state,
                progress: TaskProgress::default(),
                start_time: None,
                attempts: 0,
                empty_results: 0,
                last_error,
            }),
            pause_gate: PauseGate::new(),
            cancel_token: CancellationToken::new(),
        }
    }

    fn inner(&self) -> MutexGuard<'_, TaskInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn episode(&self) -> u32 {
        self.episode
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn state(&self) -> TaskState {
        self.inner().state
    }

    pub fn progress(&self) -> TaskProgress {
        self.inner().progress
    }

    pub fn start_time(&self) -> Option<Instant> {
        self.inner().start_time
    }

    pub fn attempts(&self) -> u32 {
        self.inner().attempts
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner().last_error.clone()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let inner = self.inner();
        TaskSnapshot {
            id: self.id,
            episode: self.episode,
            title: self.title.clone(),
            url: self.url.clone(),
            file_path: self.file_path.clone(),
            state: inner.state,
            progress: inner.progress,
            attempts: inner.attempts,
            last_error: inner.last_error.clone(),
        }
    }

    // ---------------------------------------------------------------
    // 调用方控制信号

    /// 请求暂停，在下一个分块写入前生效。终态任务忽略。
    pub fn pause(&self) {
        if !self.state().is_terminal() {
            self.pause_gate.close();
        }
    }

    pub fn resume(&self) {
        self.pause_gate.open();
    }

    pub fn is_pause_requested(&self) -> bool {
        !self.pause_gate.is_open()
    }

    /// 请求取消。任务已处于终态时没有任何效果并返回 false。
    pub fn cancel(&self) -> bool {
        if self.state().is_terminal() {
            return false;
        }
        self.cancel_token.cancel();
        true
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub(crate) fn pause_gate(&self) -> &PauseGate {
        &self.pause_gate
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    // ---------------------------------------------------------------
    // 工作协程专用的状态修改

    /// 沿允许的状态边转换，返回转换前的状态
    pub(crate) fn transition(&self, to: TaskState) -> Result<TaskState> {
        let mut inner = self.inner();
        let from = inner.state;
        if !from.can_transition_to(to) {
            return Err(DownloadError::InvalidTransition { from, to });
        }
        inner.state = to;
        Ok(from)
    }

    /// 开始一次新的下载尝试：QUEUED -> DOWNLOADING，重置进度和计时
    pub(crate) fn begin_attempt(&self) -> Result<u32> {
        let mut inner = self.inner();
        let from = inner.state;
        if from != TaskState::Queued {
            return Err(DownloadError::InvalidTransition {
                from,
                to: TaskState::Downloading,
            });
        }
        inner.state = TaskState::Downloading;
        inner.start_time = Some(Instant::now());
        inner.progress = TaskProgress::default();
        inner.attempts += 1;
        Ok(inner.attempts)
    }

    pub(crate) fn set_total(&self, total: u64) {
        self.inner().progress.total_bytes = total;
    }

    /// 写完一个分块后更新进度
    pub(crate) fn record_chunk(&self, downloaded: u64, total: u64) -> ProgressUpdate {
        let mut inner = self.inner();
        let elapsed = inner
            .start_time
            .map(|start| start.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let progress = TaskProgress::compute(downloaded, total, elapsed);
        inner.progress = progress;
        ProgressUpdate {
            task_id: self.id,
            episode: self.episode,
            percentage: progress.percentage,
            downloaded_bytes: progress.downloaded_bytes,
            total_bytes: progress.total_bytes,
            speed: progress.speed_bytes_per_sec,
        }
    }

    /// 记录一次空文件结果，返回累计次数
    pub(crate) fn record_empty_result(&self) -> u32 {
        let mut inner = self.inner();
        inner.empty_results += 1;
        inner.empty_results
    }

    /// DOWNLOADING -> QUEUED，重新入队前清空进度
    pub(crate) fn requeue(&self) -> Result<()> {
        let mut inner = self.inner();
        let from = inner.state;
        if from != TaskState::Downloading {
            return Err(DownloadError::InvalidTransition {
                from,
                to: TaskState::Queued,
            });
        }
        inner.state = TaskState::Queued;
        inner.progress = TaskProgress::default();
        inner.start_time = None;
        Ok(())
    }

    pub(crate) fn record_error(&self, message: impl Into<String>) {
        self.inner().last_error = Some(message.into());
    }
}

/// 任务的只读快照，便于界面层序列化展示
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSnapshot {
    pub id: Uuid,
    pub episode: u32,
    pub title: String,
    pub url: String,
    pub file_path: PathBuf,
    pub state: TaskState,
    pub progress: TaskProgress,
    pub attempts: u32,
    pub last_error: Option<String>,
}
