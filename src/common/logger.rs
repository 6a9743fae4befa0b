use std::sync::Arc;

use colored::*;

use crate::common::utils::FormatTool;
use crate::downloader::models::DownloadSummary;
use crate::downloader::task::{Task, TaskState};

const LINE_WIDTH: usize = 48;

/// 终端摘要输出工具
pub struct PrettyLogger;

impl PrettyLogger {
    /// 显示信息消息
    pub fn info(message: impl AsRef<str>) {
        println!("{} {}", "ℹ".blue().bold(), message.as_ref());
    }

    /// 显示警告消息
    pub fn warning(message: impl AsRef<str>) {
        println!("{} {}", "⚠".yellow().bold(), message.as_ref());
    }

    /// 显示错误消息
    pub fn error(message: impl AsRef<str>) {
        println!("{} {}", "✗".red().bold(), message.as_ref());
    }

    /// 显示步骤开始
    pub fn step_start(step: impl AsRef<str>) {
        println!("\n{} {}", "▶".cyan().bold(), step.as_ref().bold());
    }

    /// 显示步骤完成
    pub fn step_complete(step: impl AsRef<str>) {
        println!("{} {}", "✓".green().bold(), step.as_ref().green());
    }

    /// 显示文件信息
    pub fn file_info(label: impl AsRef<str>, path: impl AsRef<str>) {
        println!(
            "{} {}: {}",
            "📁".blue().bold(),
            label.as_ref().bold(),
            path.as_ref()
        );
    }

    /// 显示分割线
    pub fn separator() {
        println!("{}", "─".repeat(LINE_WIDTH + 2).bright_black());
    }

    /// 显示标题
    pub fn title(text: impl AsRef<str>) {
        let text = text.as_ref();
        let width = text.chars().count();
        let padding = LINE_WIDTH.saturating_sub(width) / 2;
        let rest = LINE_WIDTH.saturating_sub(padding + width);
        println!(
            "{} {} {}",
            "─".repeat(padding).bright_black(),
            text.bold(),
            "─".repeat(rest).bright_black()
        );
    }

    /// 单集的最终结果
    pub fn task_line(task: &Task) -> String {
        let progress = task.progress();
        let label = format!("第 {:>3} 集", task.episode());
        match task.state() {
            TaskState::Completed => format!(
                "{} {} {} ({}, {})",
                "✓".green().bold(),
                label,
                task.title(),
                FormatTool::format_size(progress.downloaded_bytes),
                FormatTool::format_speed(progress.speed_bytes_per_sec)
            ),
            TaskState::Cancelled => format!(
                "{} {} {} {}",
                "⊘".yellow().bold(),
                label,
                task.title(),
                "已取消".yellow()
            ),
            state => format!(
                "{} {} {} {}",
                "✗".red().bold(),
                label,
                task.title(),
                task.last_error()
                    .unwrap_or_else(|| state.to_string())
                    .red()
            ),
        }
    }

    /// 显示下载结果总结
    pub fn download_summary(tasks: &[Arc<Task>], summary: &DownloadSummary) {
        println!();
        Self::title("下载结果");
        for task in tasks {
            println!("  {}", Self::task_line(task));
        }
        Self::separator();

        let headline = format!(
            "共 {} 集 - 成功: {}, 失败: {}, 取消: {}",
            summary.total(),
            summary.completed,
            summary.failed,
            summary.cancelled
        );
        if summary.failed > 0 {
            Self::error(headline);
        } else if summary.cancelled > 0 {
            Self::warning(headline);
        } else {
            println!("{} {}", "🎉".green().bold(), headline.green().bold());
        }
    }
}

/// 便捷宏用于漂亮的日志输出
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::info(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::warning(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::error(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_step {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::step_start(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_complete {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::step_complete(format!($($arg)*))
    };
}
