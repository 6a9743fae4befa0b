use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::common::utils::sanitize_filename;
use crate::downloader::models::{DownloadSpec, FileNaming};

pub const BATCH_LIST_VERSION: &str = "1.0";

/// 分集地址中的集数占位符
pub const EPISODE_PLACEHOLDER: &str = "{episode}";

/// 批量列表中的一部番剧
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchItem {
    pub name: String,
    pub url: String,
    pub episodes: Vec<u32>,
    pub total_episodes: u32,
}

impl BatchItem {
    /// 某一集的引用地址
    pub fn episode_reference(&self, episode: u32) -> String {
        if self.url.contains(EPISODE_PLACEHOLDER) {
            self.url.replace(EPISODE_PLACEHOLDER, &episode.to_string())
        } else {
            format!("{}-episode-{}", self.url, episode)
        }
    }

    pub fn to_specs(&self, root: &Path) -> Vec<DownloadSpec> {
        let folder = root.join(sanitize_filename(&self.name));
        self.episodes
            .iter()
            .map(|&episode| DownloadSpec {
                reference: self.episode_reference(episode),
                collection: self.name.clone(),
                episode,
                folder: folder.clone(),
                naming: FileNaming::TitleWithEpisode,
            })
            .collect()
    }
}

/// 持久化的批量列表文件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchList {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    pub items: Vec<BatchItem>,
}

fn default_version() -> String {
    BATCH_LIST_VERSION.to_string()
}

impl BatchList {
    pub fn new(items: Vec<BatchItem>) -> Self {
        Self {
            version: default_version(),
            created_at: Some(chrono::Local::now().naive_local()),
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn item(url: &str) -> BatchItem {
        BatchItem {
            name: "Frieren: Beyond".to_string(),
            url: url.to_string(),
            episodes: vec![2, 5],
            total_episodes: 28,
        }
    }

    #[test]
    fn test_episode_reference() {
        assert_eq!(
            item("https://site.example/frieren").episode_reference(3),
            "https://site.example/frieren-episode-3"
        );
        assert_eq!(
            item("https://site.example/frieren/{episode}.mp4").episode_reference(3),
            "https://site.example/frieren/3.mp4"
        );
    }

    #[test]
    fn test_to_specs() {
        let specs = item("https://site.example/frieren").to_specs(Path::new("/downloads"));
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].episode, 2);
        assert_eq!(specs[1].reference, "https://site.example/frieren-episode-5");
        assert_eq!(specs[0].folder, PathBuf::from("/downloads/Frieren§ Beyond"));
        assert_eq!(specs[0].naming, FileNaming::TitleWithEpisode);
        assert_eq!(specs[0].collection, "Frieren: Beyond");
    }

    #[test]
    fn test_list_accepts_foreign_timestamp() {
        let json = r#"{
            "version": "1.0",
            "created_at": "2024-05-01T12:30:45.123456",
            "items": [{"name": "A", "url": "u", "episodes": [1], "total_episodes": 12}]
        }"#;
        let list: BatchList = serde_json::from_str(json).unwrap();
        assert_eq!(list.items.len(), 1);
        assert!(list.created_at.is_some());
    }
}
