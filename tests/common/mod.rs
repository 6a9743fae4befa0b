#![allow(dead_code)]

//! 集成测试用的本地 HTTP 服务器
//!
//! 路由:
//! - `/files/{size}`            固定长度的响应体，带 Content-Length
//! - `/slow/{chunks}`           每 20ms 发送 1KB，带 Content-Length
//! - `/nolength/{size}`         分块传输，不带 Content-Length
//! - `/empty`                   200 空响应
//! - `/flaky/{empty_hits}`      前 N 次请求返回空响应，之后返回 4KB
//! - `/status/{code}`           返回指定状态码

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anidl::downloader::models::{DownloadSpec, FileNaming};
use anidl::DownloaderConfig;
use axum::body::{Body, Bytes};
use axum::extract::{Path as UrlPath, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

pub const SLOW_CHUNK: usize = 1024;
pub const FLAKY_BODY: usize = 4096;

#[derive(Clone, Default)]
struct ServerState {
    flaky_hits: Arc<AtomicUsize>,
}

pub struct TestServer {
    base: String,
    state: ServerState,
}

impl TestServer {
    pub async fn start() -> Self {
        let state = ServerState::default();
        let app = Router::new()
            .route("/files/{size}", get(fixed_body))
            .route("/slow/{chunks}", get(slow_body))
            .route("/nolength/{size}", get(no_length_body))
            .route("/empty", get(|| async { StatusCode::OK }))
            .route("/flaky/{empty_hits}", get(flaky_body))
            .route("/status/{code}", get(status_only))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{}", addr),
            state,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// `/flaky` 被请求的次数
    pub fn flaky_hits(&self) -> usize {
        self.state.flaky_hits.load(Ordering::SeqCst)
    }
}

fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

async fn fixed_body(UrlPath(size): UrlPath<usize>) -> Vec<u8> {
    payload(size)
}

async fn slow_body(UrlPath(chunks): UrlPath<usize>) -> Response {
    let stream = futures::stream::unfold(0usize, move |sent| async move {
        if sent >= chunks {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        Some((
            Ok::<_, Infallible>(Bytes::from(vec![b'x'; SLOW_CHUNK])),
            sent + 1,
        ))
    });
    (
        [(header::CONTENT_LENGTH, (chunks * SLOW_CHUNK).to_string())],
        Body::from_stream(stream),
    )
        .into_response()
}

async fn no_length_body(UrlPath(size): UrlPath<usize>) -> Response {
    let chunks: Vec<Result<Bytes, Infallible>> = payload(size)
        .chunks(700)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    Body::from_stream(futures::stream::iter(chunks)).into_response()
}

async fn flaky_body(
    State(state): State<ServerState>,
    UrlPath(empty_hits): UrlPath<usize>,
) -> Vec<u8> {
    let hit = state.flaky_hits.fetch_add(1, Ordering::SeqCst);
    if hit < empty_hits {
        Vec::new()
    } else {
        payload(FLAKY_BODY)
    }
}

async fn status_only(UrlPath(code): UrlPath<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// 测试用的下载配置：轮询间隔更短，分块 1KB
pub fn fast_config(max_concurrent: usize) -> DownloaderConfig {
    DownloaderConfig {
        queue_poll_interval: Duration::from_millis(50),
        await_poll_interval: Duration::from_millis(10),
        ..DownloaderConfig::default()
    }
    .with_max_concurrent(max_concurrent)
    .with_chunk_size(1024)
}

pub fn spec(url: String, episode: u32, folder: &Path) -> DownloadSpec {
    DownloadSpec {
        reference: url,
        collection: "Test Show".to_string(),
        episode,
        folder: folder.to_path_buf(),
        naming: FileNaming::TitleWithEpisode,
    }
}

pub fn file_len(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}

pub fn folder(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("Test Show")
}

/// 轮询直到条件成立，超时则 panic
pub async fn wait_until(what: &str, timeout: Duration, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("等待超时: {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
