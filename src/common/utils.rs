use thiserror::Error;

/// 文件名中不允许出现的字符
const FORBIDDEN_CHARS: [char; 9] = ['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// 把文件名中的非法字符替换为 `§`
pub fn sanitize_filename(name: &str) -> String {
    name.replace(FORBIDDEN_CHARS, "§")
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("无效的集数: {0}")]
    InvalidNumber(String),
    #[error("无效的集数范围: {0}")]
    InvalidRange(String),
    #[error("集数超出范围 (1-{max}): {episode}")]
    OutOfRange { episode: u32, max: u32 },
    #[error("没有有效的集数")]
    Empty,
}

// 解析集数选择字符串，空格或逗号分隔，支持区间
// 例如: "1 3 5-7" => [1,3,5,6,7]
pub fn parse_episode_selection(input: &str, max_episodes: u32) -> Result<Vec<u32>, SelectionError> {
    let mut episodes = Vec::new();

    for part in input
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|p| !p.is_empty())
    {
        if let Some((start, end)) = part.split_once('-') {
            let start: u32 = start
                .trim()
                .parse()
                .map_err(|_| SelectionError::InvalidRange(part.to_string()))?;
            let end: u32 = end
                .trim()
                .parse()
                .map_err(|_| SelectionError::InvalidRange(part.to_string()))?;
            if start > end {
                return Err(SelectionError::InvalidRange(part.to_string()));
            }
            episodes.extend(start..=end);
        } else {
            let ep: u32 = part
                .parse()
                .map_err(|_| SelectionError::InvalidNumber(part.to_string()))?;
            episodes.push(ep);
        }
    }

    episodes.sort_unstable();
    episodes.dedup();

    if episodes.is_empty() {
        return Err(SelectionError::Empty);
    }
    if let Some(&episode) = episodes.iter().find(|&&ep| ep == 0 || ep > max_episodes) {
        return Err(SelectionError::OutOfRange {
            episode,
            max: max_episodes,
        });
    }

    Ok(episodes)
}

pub struct FormatTool;

impl FormatTool {
    // 格式化下载速度
    pub fn format_speed(speed: f64) -> String {
        let speed = speed.max(0.0);
        if speed > 1024.0 * 1024.0 * 1024.0 {
            format!("{:.1} GB/s", speed / 1024.0 / 1024.0 / 1024.0)
        } else if speed > 1024.0 * 1024.0 {
            format!("{:.1} MB/s", speed / 1024.0 / 1024.0)
        } else if speed > 1024.0 {
            format!("{:.1} KB/s", speed / 1024.0)
        } else {
            "0 KB/s".to_string()
        }
    }

    // 格式化文件大小
    pub fn format_size(size: u64) -> String {
        if size == 0 {
            "0 MB".to_string()
        } else if size > 1024 * 1024 * 1024 {
            format!("{:.2} GB", size as f64 / 1024.0 / 1024.0 / 1024.0)
        } else if size > 1024 * 1024 {
            format!("{:.1} MB", size as f64 / 1024.0 / 1024.0)
        } else {
            format!("{:.1} KB", size as f64 / 1024.0)
        }
    }
}
