use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::DownloaderConfig;
use super::error::{DownloadError, Result};
use super::fetcher::{FetchOutcome, Fetcher, remove_partial};
use super::models::TaskStatus;
use super::progress::ProgressReporter;
use super::queue::TaskQueue;
use super::task::{Task, TaskState};
use crate::common::client::client::SessionBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolPhase {
    Idle,
    Running,
    Stopping,
    Stopped,
}

// 工作协程之间共享的状态
struct PoolShared {
    config: DownloaderConfig,
    queue: TaskQueue,
    active: DashMap<Uuid, Arc<Task>>, // task_id -> 正在处理的任务
    running: AtomicBool,
    reporter: Arc<dyn ProgressReporter>,
}

/// 固定大小的工作池。
///
/// 并发上限由工作协程数量保证：每个工作协程同一时间只处理一个任务。
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    phase: Mutex<PoolPhase>,
    session: Mutex<Option<reqwest::Client>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    pub fn new(config: DownloaderConfig, reporter: Arc<dyn ProgressReporter>) -> Self {
        // 字段是公开的，反序列化或直接构造时可能为 0
        let config = DownloaderConfig {
            max_concurrent: config.max_concurrent.max(1),
            chunk_size: config.chunk_size.max(1),
            ..config
        };
        Self {
            shared: Arc::new(PoolShared {
                config,
                queue: TaskQueue::new(),
                active: DashMap::new(),
                running: AtomicBool::new(false),
                reporter,
            }),
            phase: Mutex::new(PoolPhase::Idle),
            session: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
        }
    }

    fn phase(&self) -> MutexGuard<'_, PoolPhase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_concurrent(&self) -> usize {
        self.shared.config.max_concurrent
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.shared.config
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        *self.phase() != PoolPhase::Idle
    }

    pub fn is_stopped(&self) -> bool {
        matches!(*self.phase(), PoolPhase::Stopping | PoolPhase::Stopped)
    }

    /// 创建共享会话并启动 `max_concurrent` 个工作协程
    pub fn start(&self) -> Result<()> {
        let mut phase = self.phase();
        match *phase {
            PoolPhase::Idle => {}
            PoolPhase::Running => return Err(DownloadError::AlreadyStarted),
            PoolPhase::Stopping | PoolPhase::Stopped => {
                return Err(DownloadError::ShutdownInProgress);
            }
        }

        let client = SessionBuilder::build(&self.shared.config)?;
        self.shared.running.store(true, Ordering::SeqCst);

        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        for worker_id in 0..self.shared.config.max_concurrent {
            let fetcher = Fetcher::new(
                client.clone(),
                self.shared.config.chunk_size,
                Arc::clone(&self.shared.reporter),
            );
            let shared = Arc::clone(&self.shared);
            let shutdown = self.shutdown.clone();
            workers.push(tokio::spawn(worker_loop(
                worker_id, shared, fetcher, shutdown,
            )));
        }

        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(client);
        *phase = PoolPhase::Running;
        info!("下载工作池已启动，并发数: {}", self.shared.config.max_concurrent);
        Ok(())
    }

    /// 任务入队，停止后调用直接失败
    pub fn enqueue(&self, task: Arc<Task>) -> Result<()> {
        if self.is_stopped() {
            return Err(DownloadError::ShutdownInProgress);
        }
        self.shared.queue.push(Arc::clone(&task))?;
        self.shared.reporter.on_state(task.episode(), TaskState::Queued);
        debug!("第 {} 集已加入队列", task.episode());
        Ok(())
    }

    /// 当前正在被工作协程处理的任务
    pub fn active_tasks(&self) -> Vec<Arc<Task>> {
        self.shared
            .active
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// 已入队但尚未处理完的任务数
    pub fn pending(&self) -> usize {
        self.shared.queue.unfinished()
    }

    /// 等待队列中的任务全部处理完毕
    pub async fn wait_idle(&self) {
        self.shared.queue.join().await;
    }

    /// 停止工作池：取消排队中的任务，结束所有工作协程并释放会话。
    /// 只能调用一次，再次调用返回 `AlreadyStopped`。
    pub async fn stop(&self) -> Result<()> {
        {
            let mut phase = self.phase();
            match *phase {
                PoolPhase::Stopping | PoolPhase::Stopped => {
                    return Err(DownloadError::AlreadyStopped);
                }
                PoolPhase::Idle | PoolPhase::Running => *phase = PoolPhase::Stopping,
            }
        }
        info!("正在停止下载工作池...");

        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.queue.close();

        let drained = self.shared.queue.drain().await;
        if !drained.is_empty() {
            info!("取消 {} 个尚未开始的任务", drained.len());
        }
        for task in drained {
            finish(&self.shared, &task, TaskStatus::Cancelled);
            self.shared.queue.task_done();
        }

        for entry in self.shared.active.iter() {
            entry.value().cancel();
        }
        self.shutdown.cancel();

        let handles = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            if let Err(e) = handle.await {
                error!("工作协程异常退出: {}", e);
            }
        }

        if self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            debug!("HTTP 会话已释放");
        }

        *self.phase() = PoolPhase::Stopped;
        info!("下载工作池已停止");
        Ok(())
    }
}

async fn worker_loop(
    worker_id: usize,
    shared: Arc<PoolShared>,
    fetcher: Fetcher,
    shutdown: CancellationToken,
) {
    debug!("工作协程 {} 启动", worker_id);
    while shared.running.load(Ordering::SeqCst) {
        let task = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = shared.queue.pop(shared.config.queue_poll_interval) => match next {
                Some(task) => task,
                None => continue,
            },
        };

        process_task(&shared, &fetcher, &shutdown, &task).await;
        shared.queue.task_done();
    }
    debug!("工作协程 {} 退出", worker_id);
}

async fn process_task(
    shared: &PoolShared,
    fetcher: &Fetcher,
    shutdown: &CancellationToken,
    task: &Arc<Task>,
) {
    if task.state() == TaskState::Cancelled {
        return;
    }
    if task.is_cancel_requested() || shutdown.is_cancelled() {
        finish(shared, task, TaskStatus::Cancelled);
        return;
    }

    shared.active.insert(task.id(), Arc::clone(task));
    let result = tokio::select! {
        biased;
        _ = shutdown.cancelled() => None,
        r = AssertUnwindSafe(fetcher.fetch(task)).catch_unwind() => Some(r),
    };
    shared.active.remove(&task.id());

    match result {
        None => {
            info!("工作池停止，中断第 {} 集", task.episode());
            finish(shared, task, TaskStatus::Cancelled);
        }
        Some(Err(panic)) => {
            let message = panic_message(panic.as_ref());
            error!("❌ 第 {} 集处理时工作协程异常: {}", task.episode(), message);
            remove_partial(task.file_path()).await;
            finish(
                shared,
                task,
                TaskStatus::Error(DownloadError::WorkerPanic(message).to_string()),
            );
        }
        Some(Ok(Ok(FetchOutcome::Completed { bytes }))) => {
            info!("✅ 第 {} 集下载完成: {} 字节", task.episode(), bytes);
            finish(shared, task, TaskStatus::Completed);
        }
        Some(Ok(Ok(FetchOutcome::Cancelled { .. }))) => {
            finish(shared, task, TaskStatus::Cancelled);
        }
        Some(Ok(Ok(FetchOutcome::Empty))) => handle_empty(shared, task).await,
        Some(Ok(Err(e))) => {
            if e.is_transport() {
                error!("❌ 第 {} 集下载失败，不再重试: {}", task.episode(), e);
            } else {
                error!("❌ 第 {} 集处理失败: {}", task.episode(), e);
            }
            finish(shared, task, TaskStatus::Error(e.to_string()));
        }
    }
}

// 空文件视为下载损坏，在重试上限内重新排到队尾
async fn handle_empty(shared: &PoolShared, task: &Arc<Task>) {
    let empty_results = task.record_empty_result();
    if !shared.config.allows_empty_retry(empty_results) {
        warn!(
            "第 {} 集连续 {} 次下载为空，放弃",
            task.episode(),
            empty_results
        );
        remove_partial(task.file_path()).await;
        let err = DownloadError::RetriesExhausted {
            attempts: task.attempts(),
        };
        finish(shared, task, TaskStatus::Error(err.to_string()));
        return;
    }

    warn!(
        "第 {} 集{}，重新排队 (第 {} 次)",
        task.episode(),
        DownloadError::EmptyResult(task.file_path().to_path_buf()),
        empty_results
    );
    if let Err(e) = task.requeue() {
        warn!("第 {} 集无法重新排队: {}", task.episode(), e);
        finish(shared, task, TaskStatus::Cancelled);
        return;
    }
    shared.reporter.on_state(task.episode(), TaskState::Queued);
    if shared.queue.push(Arc::clone(task)).is_err() {
        debug!("队列已关闭，第 {} 集不再重试", task.episode());
        finish(shared, task, TaskStatus::Cancelled);
    }
}

/// 把任务推进到终态并通知接收方
fn finish(shared: &PoolShared, task: &Task, status: TaskStatus) {
    let mut status = status;
    if let TaskStatus::Error(msg) = &status {
        task.record_error(msg.clone());
    }
    if let Err(e) = task.transition(status.state()) {
        // 例如暂停中出现异常：退回到取消，保证任务一定能结束
        if status == TaskStatus::Cancelled || task.transition(TaskState::Cancelled).is_err() {
            warn!("第 {} 集状态更新失败: {}", task.episode(), e);
            return;
        }
        warn!("第 {} 集无法进入 {}，改为取消: {}", task.episode(), status.state(), e);
        status = TaskStatus::Cancelled;
    }
    shared.reporter.on_status(task.episode(), &status);
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "未知异常".to_string()
    }
}
