use serde::{Deserialize, Serialize};

/// 分集页面上的一个候选下载链接
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QualityCandidate {
    pub url: String,
    pub quality: u32, // 画质，如 360 / 480 / 720 / 1080，无法识别时为 0
}

/// 选择下载链接：有首选画质就用它，否则退回到列表中最后一个候选（通常是最高画质）
pub fn select_quality(candidates: &[QualityCandidate], preferred: u32) -> Option<&QualityCandidate> {
    candidates
        .iter()
        .find(|c| c.quality == preferred)
        .or_else(|| candidates.last())
}

/// 从 "Download (720P - mp4)" 或 "Episode 01 1080p" 一类的文本中解析画质，
/// 取第一个紧跟在数字后面的 `p`
pub fn parse_quality_label(label: &str) -> Option<u32> {
    let bytes = label.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| b.eq_ignore_ascii_case(&b'p'))
        .find_map(|(end, _)| {
            let start = bytes[..end]
                .iter()
                .rposition(|b| !b.is_ascii_digit())
                .map_or(0, |idx| idx + 1);
            label[start..end].parse().ok()
        })
}
