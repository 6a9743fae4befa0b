use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::TaskState;
use crate::common::utils::sanitize_filename;

/// 文件命名方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum FileNaming {
    /// `<标题>.mp4`
    #[default]
    Title,
    /// `<标题>_episode_<集数>.mp4`，批量下载时使用
    TitleWithEpisode,
}

impl FileNaming {
    pub fn file_name(self, title: &str, episode: u32) -> String {
        let title = sanitize_filename(title);
        match self {
            FileNaming::Title => format!("{}.mp4", title),
            FileNaming::TitleWithEpisode => format!("{}_episode_{}.mp4", title, episode),
        }
    }
}

// --------------------------------------------------------------------
/// 一集的下载说明，由界面层生成后交给下载器
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadSpec {
    pub reference: String,  // 交给链接解析器的引用（分集页面或直链）
    pub collection: String, // 番剧名称
    pub episode: u32,
    pub folder: PathBuf,
    #[serde(default)]
    pub naming: FileNaming,
}

// --------------------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskStatus {
    Completed,
    Error(String),
    Cancelled,
}

impl TaskStatus {
    pub fn state(&self) -> TaskState {
        match self {
            TaskStatus::Completed => TaskState::Completed,
            TaskStatus::Error(_) => TaskState::Error,
            TaskStatus::Cancelled => TaskState::Cancelled,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Error(msg) => write!(f, "error:{}", msg),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ProgressUpdate {
    pub task_id: Uuid,
    pub episode: u32,
    pub percentage: f64,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub speed: f64,
}

/// 通过通道推送给界面层的事件
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Progress(ProgressUpdate),
    State { episode: u32, state: TaskState },
    Finished { episode: u32, status: TaskStatus },
}

/// 一批任务结束后的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadSummary {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl DownloadSummary {
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }

    pub fn record(&mut self, state: TaskState) {
        match state {
            TaskState::Completed => self.completed += 1,
            TaskState::Error => self.failed += 1,
            TaskState::Cancelled => self.cancelled += 1,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(TaskStatus::Completed.to_string(), "completed");
        assert_eq!(TaskStatus::Cancelled.to_string(), "cancelled");
        assert_eq!(
            TaskStatus::Error("HTTP 404".to_string()).to_string(),
            "error:HTTP 404"
        );
    }

    #[test]
    fn test_file_naming() {
        assert_eq!(FileNaming::Title.file_name("Naruto 01", 1), "Naruto 01.mp4");
        assert_eq!(
            FileNaming::TitleWithEpisode.file_name("Re:Zero", 12),
            "Re§Zero_episode_12.mp4"
        );
    }

    #[test]
    fn test_summary_counts_terminal_only() {
        let mut summary = DownloadSummary::default();
        for state in [
            TaskState::Completed,
            TaskState::Completed,
            TaskState::Error,
            TaskState::Cancelled,
            TaskState::Downloading,
        ] {
            summary.record(state);
        }
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.total(), 4);
    }
}
