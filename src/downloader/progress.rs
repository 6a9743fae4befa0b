use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::mpsc;
use tracing::debug;

use super::models::{ProgressEvent, ProgressUpdate, TaskStatus};
use super::task::TaskState;

/// 进度接收方。
///
/// 每写入一个分块就会调用一次 `on_progress`，实现不能阻塞下载循环，
/// 需要节流或缓冲时由实现自己处理。
pub trait ProgressReporter: Send + Sync {
    fn on_progress(&self, update: &ProgressUpdate);

    /// 非终态的状态变化（排队、下载中、暂停）
    fn on_state(&self, _episode: u32, _state: TaskState) {}

    /// 终态：completed / error:<msg> / cancelled
    fn on_status(&self, episode: u32, status: &TaskStatus);
}

/// 不输出任何东西
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_progress(&self, _update: &ProgressUpdate) {}

    fn on_status(&self, _episode: u32, _status: &TaskStatus) {}
}

// --------------------------------------------------------------------
/// 终端进度条，每集一条
pub struct ConsoleReporter {
    multi_pb: MultiProgress,
    bars: Mutex<HashMap<u32, ProgressBar>>,
    style: ProgressStyle,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        let style = ProgressStyle::with_template(
            "{msg:>14} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");

        Self {
            multi_pb: MultiProgress::with_draw_target(target),
            bars: Mutex::new(HashMap::new()),
            style,
        }
    }

    fn bar(&self, episode: u32) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        bars.entry(episode)
            .or_insert_with(|| {
                let pb = self.multi_pb.add(ProgressBar::new(0));
                pb.set_style(self.style.clone());
                pb.set_message(format!("第 {} 集", episode));
                pb
            })
            .clone()
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ConsoleReporter {
    fn on_progress(&self, update: &ProgressUpdate) {
        // indicatif 自带重绘节流，这里只更新数值
        let pb = self.bar(update.episode);
        if update.total_bytes > 0 && pb.length() != Some(update.total_bytes) {
            pb.set_length(update.total_bytes);
        }
        pb.set_position(update.downloaded_bytes);
    }

    fn on_state(&self, episode: u32, state: TaskState) {
        let pb = self.bar(episode);
        match state {
            TaskState::Paused => pb.set_message(format!("第 {} 集 已暂停", episode)),
            TaskState::Queued => {
                pb.set_position(0);
                pb.set_message(format!("第 {} 集 重新排队", episode));
            }
            _ => pb.set_message(format!("第 {} 集", episode)),
        }
    }

    fn on_status(&self, episode: u32, status: &TaskStatus) {
        let pb = self.bar(episode);
        match status {
            TaskStatus::Completed => pb.finish_with_message(format!("第 {} 集 完成", episode)),
            TaskStatus::Error(msg) => {
                pb.abandon_with_message(format!("第 {} 集 失败: {}", episode, msg))
            }
            TaskStatus::Cancelled => pb.abandon_with_message(format!("第 {} 集 已取消", episode)),
        }
    }
}

// --------------------------------------------------------------------
/// 把事件推到无界通道里，供图形界面或其他事件循环消费
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            debug!("进度接收端已关闭，丢弃事件");
        }
    }
}

impl ProgressReporter for ChannelReporter {
    fn on_progress(&self, update: &ProgressUpdate) {
        self.send(ProgressEvent::Progress(*update));
    }

    fn on_state(&self, episode: u32, state: TaskState) {
        self.send(ProgressEvent::State { episode, state });
    }

    fn on_status(&self, episode: u32, status: &TaskStatus) {
        self.send(ProgressEvent::Finished {
            episode,
            status: status.clone(),
        });
    }
}
