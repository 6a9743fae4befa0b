use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use self::errors::{BatchError, Result};
use self::models::{BatchItem, BatchList};
use crate::downloader::models::DownloadSpec;

pub mod errors;
pub mod models;

/// 导出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Txt,
}

impl std::str::FromStr for ExportFormat {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "txt" => Ok(ExportFormat::Txt),
            other => Err(BatchError::UnsupportedExport(other.to_string())),
        }
    }
}

/// 批量下载列表，保存在指定目录下
pub struct BatchManager {
    items: Vec<BatchItem>,
    save_dir: PathBuf,
}

impl BatchManager {
    pub async fn new(save_dir: impl AsRef<Path>) -> Result<Self> {
        let save_dir = save_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&save_dir).await?;
        Ok(Self {
            items: Vec::new(),
            save_dir,
        })
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    pub fn add_item(&mut self, item: BatchItem) -> Result<()> {
        if self.items.iter().any(|existing| existing.name == item.name) {
            return Err(BatchError::Duplicate(item.name));
        }
        self.items.push(item);
        Ok(())
    }

    pub fn remove_item(&mut self, index: usize) -> Result<BatchItem> {
        if index >= self.items.len() {
            return Err(BatchError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        Ok(self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// 目录下所有已保存的列表，最新的在前
    pub async fn saved_lists(&self) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.save_dir).await?;
        let mut lists = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let modified = entry.metadata().await?.modified()?;
            lists.push((modified, path));
        }
        lists.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(lists.into_iter().map(|(_, path)| path).collect())
    }

    /// 保存当前列表。同名文件会先被重命名为备份，写入失败时再恢复。
    pub async fn save_list(&self, filename: &str) -> Result<PathBuf> {
        let filename = if filename.ends_with(".json") {
            filename.to_string()
        } else {
            format!("{}.json", filename)
        };
        let save_path = self.save_dir.join(&filename);

        let backup_path = if tokio::fs::try_exists(&save_path).await? {
            let stem = save_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("batch");
            let backup = self.save_dir.join(format!(
                "{}_backup_{}.json",
                stem,
                chrono::Local::now().format("%Y%m%d_%H%M%S")
            ));
            tokio::fs::rename(&save_path, &backup).await?;
            debug!("已备份旧列表: {:?}", backup);
            Some(backup)
        } else {
            None
        };

        let list = BatchList::new(self.items.clone());
        let result = match serde_json::to_string_pretty(&list) {
            Ok(data) => tokio::fs::write(&save_path, data)
                .await
                .map_err(BatchError::from),
            Err(e) => Err(BatchError::from(e)),
        };

        if let Err(e) = result {
            if let Some(backup) = backup_path {
                if let Err(restore_err) = tokio::fs::rename(&backup, &save_path).await {
                    warn!("恢复备份失败: {}", restore_err);
                }
            }
            return Err(e);
        }

        info!("批量列表已保存: {:?} ({} 项)", save_path, self.items.len());
        Ok(save_path)
    }

    /// 读取列表文件，全部条目有效时才替换当前列表
    pub async fn load_list(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let list = Self::read_list(path.as_ref()).await?;
        self.items = list.items;
        Ok(())
    }

    /// 合并另一个列表，跳过重名条目，返回新增数量
    pub async fn merge_list(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let list = Self::read_list(path.as_ref()).await?;
        let mut added = 0;
        for item in list.items {
            match self.add_item(item) {
                Ok(()) => added += 1,
                Err(BatchError::Duplicate(name)) => debug!("跳过重复条目: {}", name),
                Err(e) => return Err(e),
            }
        }
        Ok(added)
    }

    pub async fn export_list(&self, filename: &str, format: ExportFormat) -> Result<PathBuf> {
        match format {
            ExportFormat::Json => self.save_list(filename).await,
            ExportFormat::Txt => {
                let export_path = self.save_dir.join(filename).with_extension("txt");
                let mut out = String::new();
                for item in &self.items {
                    let episodes = item
                        .episodes
                        .iter()
                        .map(|ep| ep.to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    out.push_str(&format!("Anime: {}\n", item.name));
                    out.push_str(&format!("Episodes: {}\n", episodes));
                    out.push_str(&format!("Total Episodes: {}\n", item.total_episodes));
                    out.push_str(&"-".repeat(50));
                    out.push('\n');
                }
                tokio::fs::write(&export_path, out).await?;
                Ok(export_path)
            }
        }
    }

    /// 展开为下载说明，每部番剧一个子目录
    pub fn to_specs(&self, root: &Path) -> Vec<DownloadSpec> {
        self.items
            .iter()
            .flat_map(|item| item.to_specs(root))
            .collect()
    }

    async fn read_list(path: &Path) -> Result<BatchList> {
        let data = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&data).map_err(|e| {
            if e.is_data() {
                BatchError::InvalidFormat(e.to_string())
            } else {
                BatchError::Json(e)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str) -> BatchItem {
        BatchItem {
            name: name.to_string(),
            url: format!("https://site.example/{}", name.to_lowercase()),
            episodes: vec![1, 2],
            total_episodes: 12,
        }
    }

    #[tokio::test]
    async fn test_duplicate_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = BatchManager::new(dir.path()).await.unwrap();
        manager.add_item(item("Mushishi")).unwrap();
        assert!(matches!(
            manager.add_item(item("Mushishi")),
            Err(BatchError::Duplicate(name)) if name == "Mushishi"
        ));
        assert!(matches!(
            manager.remove_item(3),
            Err(BatchError::IndexOutOfRange { index: 3, len: 1 })
        ));
        assert_eq!(manager.remove_item(0).unwrap().name, "Mushishi");
        assert!(manager.items().is_empty());
    }

    #[tokio::test]
    async fn test_save_appends_extension_and_backs_up() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = BatchManager::new(dir.path()).await.unwrap();
        manager.add_item(item("Mushishi")).unwrap();

        let first = manager.save_list("weekend").await.unwrap();
        assert_eq!(first, dir.path().join("weekend.json"));
        manager.save_list("weekend.json").await.unwrap();

        let lists = manager.saved_lists().await.unwrap();
        assert_eq!(lists.len(), 2);
        assert!(lists.iter().any(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("weekend_backup_"))
        }));

        let raw = std::fs::read_to_string(&first).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["version"], "1.0");
        assert_eq!(value["items"][0]["total_episodes"], 12);
    }

    #[tokio::test]
    async fn test_load_is_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = BatchManager::new(dir.path()).await.unwrap();
        manager.add_item(item("Keep")).unwrap();

        let bad = dir.path().join("bad.json");
        std::fs::write(
            &bad,
            r#"{"items": [{"name": "A", "url": "u", "episodes": [1], "total_episodes": 3},
                          {"name": "B", "url": "u"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            manager.load_list(&bad).await,
            Err(BatchError::InvalidFormat(_))
        ));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(
            manager.load_list(&broken).await,
            Err(BatchError::Json(_))
        ));

        assert_eq!(manager.items().len(), 1);
        assert_eq!(manager.items()[0].name, "Keep");
    }

    #[tokio::test]
    async fn test_merge_skips_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let mut other = BatchManager::new(dir.path()).await.unwrap();
        other.add_item(item("A")).unwrap();
        other.add_item(item("B")).unwrap();
        let path = other.save_list("other").await.unwrap();

        let mut manager = BatchManager::new(dir.path()).await.unwrap();
        manager.add_item(item("A")).unwrap();
        assert_eq!(manager.merge_list(&path).await.unwrap(), 1);
        assert_eq!(manager.items().len(), 2);
    }

    #[tokio::test]
    async fn test_export_txt() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = BatchManager::new(dir.path()).await.unwrap();
        manager.add_item(item("Mushishi")).unwrap();

        let path = manager
            .export_list("listing", "txt".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("listing.txt"));
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.starts_with("Anime: Mushishi\nEpisodes: 1, 2\nTotal Episodes: 12\n"));
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[tokio::test]
    async fn test_to_specs_flattens_items() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = BatchManager::new(dir.path()).await.unwrap();
        manager.add_item(item("A")).unwrap();
        manager.add_item(item("B")).unwrap();
        let specs = manager.to_specs(Path::new("/dl"));
        assert_eq!(specs.len(), 4);
        assert_eq!(specs[2].collection, "B");
        assert_eq!(specs[2].folder, Path::new("/dl/B"));
    }
}
