mod common;

use std::sync::Arc;

use anidl::batch::BatchManager;
use anidl::batch::models::BatchItem;
use anidl::downloader::progress::NoopReporter;
use anidl::{DirectLinkResolver, EpisodeDownloader, TaskState};
use common::{TestServer, fast_config};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_saved_batch_list_downloads_every_episode() {
    let server = TestServer::start().await;
    let lists = tempfile::tempdir().unwrap();
    let downloads = tempfile::tempdir().unwrap();

    let mut manager = BatchManager::new(lists.path()).await.unwrap();
    manager
        .add_item(BatchItem {
            name: "Cowboy Bebop: Remaster".to_string(),
            url: server.url("/files/{episode}000"),
            episodes: vec![1, 3],
            total_episodes: 26,
        })
        .unwrap();
    let saved = manager.save_list("weekend").await.unwrap();

    let mut loaded = BatchManager::new(lists.path()).await.unwrap();
    loaded.load_list(&saved).await.unwrap();
    let specs = loaded.to_specs(downloads.path());
    assert_eq!(specs.len(), 2);

    let dl = EpisodeDownloader::new(
        fast_config(2),
        Arc::new(DirectLinkResolver::default()),
        Arc::new(NoopReporter),
    );
    let tasks = dl.submit(specs).await.unwrap();
    let summary = dl.await_all(&tasks).await;
    dl.shutdown().await.unwrap();

    assert_eq!(summary.completed, 2);
    let folder = downloads.path().join("Cowboy Bebop§ Remaster");
    for (task, size) in tasks.iter().zip([1000u64, 3000]) {
        assert_eq!(task.state(), TaskState::Completed);
        assert_eq!(task.folder(), folder);
        assert_eq!(common::file_len(task.file_path()), Some(size));
    }
    assert!(folder.join("3000_episode_3.mp4").exists());
}
