use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use errors::ResolutionError;
use quality::{QualityCandidate, parse_quality_label, select_quality};

pub mod errors;
pub mod quality;

/// 链接中的画质占位符，解析时替换为具体画质
pub const QUALITY_PLACEHOLDER: &str = "{quality}";

/// 默认可用画质，从低到高
pub const DEFAULT_QUALITIES: [u32; 4] = [360, 480, 720, 1080];

/// 解析结果：最终的媒体直链和显示标题
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedLink {
    pub media_url: String,
    pub title: String,
    pub quality: Option<u32>,
}

// 把分集引用解析为可直接下载的链接
// 站点相关的页面解析由其他实现提供
#[async_trait]
pub trait LinkResolver: Send + Sync {
    async fn resolve(&self, reference: &str) -> Result<ResolvedLink, ResolutionError>;
}

/// 引用本身就是媒体直链，标题取自路径最后一段
///
/// 引用中含有 `{quality}` 时，按可用画质展开为候选链接，
/// 优先使用首选画质，没有则退回到最高画质
#[derive(Debug, Clone)]
pub struct DirectLinkResolver {
    preferred_quality: u32,
    qualities: Vec<u32>,
}

impl Default for DirectLinkResolver {
    fn default() -> Self {
        Self {
            preferred_quality: 1080,
            qualities: DEFAULT_QUALITIES.to_vec(),
        }
    }
}

impl DirectLinkResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quality(mut self, quality: u32) -> Self {
        self.preferred_quality = quality;
        self
    }

    /// 可用画质列表，按从低到高排列
    pub fn with_qualities(mut self, qualities: Vec<u32>) -> Self {
        self.qualities = qualities;
        self
    }

    pub fn preferred_quality(&self) -> u32 {
        self.preferred_quality
    }

    pub fn title_from_url(url: &Url) -> Option<String> {
        let segment = url
            .path_segments()?
            .filter(|s| !s.is_empty())
            .next_back()?;
        let decoded = urlencoding::decode(segment)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| segment.to_string());
        let stem = match decoded.rfind('.') {
            Some(idx) if idx > 0 => decoded[..idx].to_string(),
            _ => decoded,
        };
        (!stem.is_empty()).then_some(stem)
    }

    // 在解析 URL 之前替换，否则花括号会被百分号编码
    fn expand_quality(&self, reference: &str) -> Result<(String, u32), ResolutionError> {
        let candidates: Vec<QualityCandidate> = self
            .qualities
            .iter()
            .map(|&quality| QualityCandidate {
                url: reference.replace(QUALITY_PLACEHOLDER, &quality.to_string()),
                quality,
            })
            .collect();
        let chosen = select_quality(&candidates, self.preferred_quality)
            .ok_or_else(|| ResolutionError::NoCandidates(reference.to_string()))?;
        if chosen.quality != self.preferred_quality {
            warn!(
                "没有 {}P 画质，改用 {}P: {}",
                self.preferred_quality, chosen.quality, reference
            );
        }
        Ok((chosen.url.clone(), chosen.quality))
    }
}

#[async_trait]
impl LinkResolver for DirectLinkResolver {
    async fn resolve(&self, reference: &str) -> Result<ResolvedLink, ResolutionError> {
        let reference = reference.trim();
        let (raw, quality) = if reference.contains(QUALITY_PLACEHOLDER) {
            let (url, quality) = self.expand_quality(reference)?;
            (url, Some(quality))
        } else {
            (reference.to_string(), None)
        };

        let url = Url::parse(&raw)?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(ResolutionError::UnsupportedScheme(other.to_string())),
        }

        let title = Self::title_from_url(&url)
            .or_else(|| url.host_str().map(str::to_string))
            .ok_or_else(|| ResolutionError::InvalidReference(reference.to_string()))?;
        let quality = quality.or_else(|| parse_quality_label(&title));
        debug!("直链解析: {} -> {} ({:?})", reference, title, quality);

        Ok(ResolvedLink {
            media_url: url.to_string(),
            title,
            quality,
        })
    }
}
