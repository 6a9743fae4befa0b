use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use self::core::WorkerPool;
use self::error::{DownloadError, Result};
use self::models::{DownloadSpec, DownloadSummary, TaskStatus};
use self::progress::ProgressReporter;
use self::task::Task;

use crate::resolver::LinkResolver;

pub mod config;
pub mod core;
pub mod error;
pub mod fetcher;
pub mod gate;
pub mod models;
pub mod progress;
pub mod queue;
pub mod task;

pub use config::DownloaderConfig;

/// 下载入口：解析链接、创建任务、入队，并管理工作池的生命周期。
///
/// 由调用方持有并传递，不存在全局单例。结束时必须调用一次 `shutdown`。
pub struct EpisodeDownloader {
    pool: WorkerPool,
    resolver: Arc<dyn LinkResolver>,
    reporter: Arc<dyn ProgressReporter>,
    tasks: DashMap<Uuid, Arc<Task>>, // task_id -> Task
}

impl EpisodeDownloader {
    pub fn new(
        config: DownloaderConfig,
        resolver: Arc<dyn LinkResolver>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            pool: WorkerPool::new(config, Arc::clone(&reporter)),
            resolver,
            reporter,
            tasks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &DownloaderConfig {
        self.pool.config()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// 显式启动工作池；`submit` 在未启动时也会自动启动
    pub fn start(&self) -> Result<()> {
        self.pool.start()
    }

    /// 解析每个下载说明并入队，立即返回任务句柄，不等待下载。
    ///
    /// 链接解析失败只影响对应的那一集：返回的句柄已处于 ERROR 状态。
    pub async fn submit(&self, specs: Vec<DownloadSpec>) -> Result<Vec<Arc<Task>>> {
        if self.pool.is_stopped() {
            return Err(DownloadError::ShutdownInProgress);
        }
        if !self.pool.is_started() {
            self.pool.start()?;
        }

        let mut handles = Vec::with_capacity(specs.len());
        for spec in specs {
            let task = match self.resolver.resolve(&spec.reference).await {
                Ok(link) => {
                    debug!(
                        "第 {} 集解析完成: {} ({:?}p)",
                        spec.episode, link.title, link.quality
                    );
                    let task = Arc::new(Task::new(&spec, &link));
                    self.pool.enqueue(Arc::clone(&task))?;
                    task
                }
                Err(e) => {
                    warn!("第 {} 集链接解析失败: {}", spec.episode, e);
                    let err = DownloadError::from(e);
                    let task = Arc::new(Task::unresolved(&spec, err.to_string()));
                    self.reporter
                        .on_status(spec.episode, &TaskStatus::Error(err.to_string()));
                    task
                }
            };
            self.tasks.insert(task.id(), Arc::clone(&task));
            handles.push(task);
        }

        info!("已提交 {} 个下载任务", handles.len());
        Ok(handles)
    }

    /// 按固定间隔轮询，直到所有任务都进入终态
    pub async fn await_all(&self, tasks: &[Arc<Task>]) -> DownloadSummary {
        let interval = self.pool.config().await_poll_interval;
        loop {
            if tasks.iter().all(|task| task.state().is_terminal()) {
                break;
            }
            tokio::time::sleep(interval).await;
        }

        let mut summary = DownloadSummary::default();
        for task in tasks {
            summary.record(task.state());
        }
        info!(
            "下载结束 - 成功: {}, 失败: {}, 取消: {}",
            summary.completed, summary.failed, summary.cancelled
        );
        summary
    }

    /// 所有已提交且未被清理的任务
    pub fn tasks(&self) -> Vec<Arc<Task>> {
        self.tasks
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn task(&self, task_id: &Uuid) -> Option<Arc<Task>> {
        self.tasks.get(task_id).map(|entry| Arc::clone(entry.value()))
    }

    /// 移除已结束的任务，返回移除的数量
    pub fn prune_finished(&self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, task| !task.state().is_terminal());
        before.saturating_sub(self.tasks.len())
    }

    pub fn pause_all(&self) {
        for entry in self.tasks.iter() {
            entry.value().pause();
        }
    }

    pub fn resume_all(&self) {
        for entry in self.tasks.iter() {
            entry.value().resume();
        }
    }

    /// 请求取消所有未结束的任务，返回实际发出取消的数量
    pub fn cancel_all(&self) -> usize {
        self.tasks
            .iter()
            .filter(|entry| entry.value().cancel())
            .count()
    }

    /// 停止工作池。整个生命周期只能调用一次，重复调用返回 `AlreadyStopped`。
    pub async fn shutdown(&self) -> Result<()> {
        self.pool.stop().await
    }
}
