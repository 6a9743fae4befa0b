use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex, Notify, mpsc};

use super::error::{DownloadError, Result};
use super::task::Task;

/// 无界 FIFO 任务队列，支持多生产者、多消费者。
///
/// 每个入队的任务在处理完后都要调用一次 `task_done`，`join` 等待未完成计数归零。
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<Arc<Task>>,
    rx: Mutex<mpsc::UnboundedReceiver<Arc<Task>>>,
    unfinished: AtomicUsize,
    idle: Notify,
    // 检查关闭和发送在同一把锁内完成，`close` 之后不会再有任务进入通道
    closed: StdMutex<bool>,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            unfinished: AtomicUsize::new(0),
            idle: Notify::new(),
            closed: StdMutex::new(false),
        }
    }

    pub fn push(&self, task: Arc<Task>) -> Result<()> {
        let closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        if *closed {
            return Err(DownloadError::ShutdownInProgress);
        }
        self.unfinished.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(task).is_err() {
            self.task_done();
            return Err(DownloadError::ShutdownInProgress);
        }
        Ok(())
    }

    /// 最多等待 `timeout`，超时返回 None
    pub async fn pop(&self, timeout: Duration) -> Option<Arc<Task>> {
        tokio::time::timeout(timeout, async { self.rx.lock().await.recv().await })
            .await
            .ok()
            .flatten()
    }

    /// 取出所有尚未开始的任务
    pub async fn drain(&self) -> Vec<Arc<Task>> {
        let mut rx = self.rx.lock().await;
        let mut drained = Vec::new();
        while let Ok(task) = rx.try_recv() {
            drained.push(task);
        }
        drained
    }

    pub fn task_done(&self) {
        let previous = self
            .unfinished
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .unwrap_or(0);
        if previous <= 1 {
            self.idle.notify_waiters();
        }
    }

    pub fn unfinished(&self) -> usize {
        self.unfinished.load(Ordering::SeqCst)
    }

    /// 等待所有已入队任务处理完毕
    pub async fn join(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.unfinished() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// 关闭后 `push` 直接失败。返回时所有成功的 `push` 都已进入通道，可以安全地 `drain`
    pub fn close(&self) {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::downloader::models::{DownloadSpec, FileNaming};
    use crate::resolver::ResolvedLink;

    fn task(episode: u32) -> Arc<Task> {
        let spec = DownloadSpec {
            reference: format!("https://example.com/ep-{}", episode),
            collection: "Show".to_string(),
            episode,
            folder: PathBuf::from("/tmp"),
            naming: FileNaming::TitleWithEpisode,
        };
        let link = ResolvedLink {
            media_url: format!("https://cdn.example.com/{}.mp4", episode),
            title: "Show".to_string(),
            quality: None,
        };
        Arc::new(Task::new(&spec, &link))
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = TaskQueue::new();
        for ep in 1..=4 {
            queue.push(task(ep)).unwrap();
        }
        let mut order = Vec::new();
        while let Some(t) = queue.pop(Duration::from_millis(10)).await {
            order.push(t.episode());
            queue.task_done();
        }
        assert_eq!(order, vec![1, 2, 3, 4]);
        assert_eq!(queue.unfinished(), 0);
    }

    #[tokio::test]
    async fn test_pop_times_out_when_empty() {
        let queue = TaskQueue::new();
        let started = std::time::Instant::now();
        assert!(queue.pop(Duration::from_millis(30)).await.is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_push_and_drains() {
        let queue = TaskQueue::new();
        queue.push(task(1)).unwrap();
        queue.push(task(2)).unwrap();
        queue.close();
        assert!(matches!(
            queue.push(task(3)),
            Err(DownloadError::ShutdownInProgress)
        ));
        let drained = queue.drain().await;
        assert_eq!(drained.len(), 2);
        assert_eq!(queue.unfinished(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_racing_push_loses_no_task() {
        let queue = Arc::new(TaskQueue::new());
        let accepted = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                let accepted = Arc::clone(&accepted);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        if queue.push(task(p * 1000 + i)).is_err() {
                            break;
                        }
                        accepted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(1)).await;
        queue.close();
        let drained = queue.drain().await.len();
        for producer in producers {
            producer.join().unwrap();
        }
        // 关闭之前被接受的任务都已在通道里，关闭之后不会再有任务进入
        assert!(queue.is_closed());
        assert_eq!(drained, accepted.load(Ordering::SeqCst));
        assert_eq!(queue.drain().await.len(), 0);
    }

    #[tokio::test]
    async fn test_join_waits_for_task_done() {
        let queue = Arc::new(TaskQueue::new());
        queue.push(task(1)).unwrap();

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let _ = queue.pop(Duration::from_millis(100)).await;
                tokio::time::sleep(Duration::from_millis(20)).await;
                queue.task_done();
            })
        };

        tokio::time::timeout(Duration::from_secs(1), queue.join())
            .await
            .expect("join 应在任务完成后返回");
        consumer.await.unwrap();
    }
}
