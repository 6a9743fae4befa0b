use reqwest::{
    Client, ClientBuilder,
    header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT},
};
use tracing::{debug, error};

use crate::downloader::config::DownloaderConfig;
use crate::downloader::error::DownloadError;

/// 下载用的共享 HTTP 会话，工作池启动时创建一次，所有工作协程只读共享
pub struct SessionBuilder;

impl SessionBuilder {
    pub fn get_default_headers(user_agent: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9,zh-CN;q=0.8"),
        );
        match HeaderValue::from_str(user_agent) {
            Ok(value) => {
                headers.insert(USER_AGENT, value);
            }
            Err(e) => debug!("无效的 User-Agent，使用默认值: {}", e),
        }
        headers
    }

    /// 下载大文件时不设置整体超时，只可选地限制连接时间
    pub fn build(config: &DownloaderConfig) -> Result<Client, DownloadError> {
        let mut builder = ClientBuilder::new().default_headers(Self::get_default_headers(&config.user_agent));
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        builder.build().map_err(|e| {
            error!("创建 HTTP 客户端失败: {}", e);
            DownloadError::Client(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_headers() {
        let headers = SessionBuilder::get_default_headers("anidl-test/1.0");
        assert_eq!(headers.get(USER_AGENT).unwrap(), "anidl-test/1.0");
        assert!(headers.contains_key(ACCEPT));
    }

    #[test]
    fn test_invalid_user_agent_is_skipped() {
        let headers = SessionBuilder::get_default_headers("bad\nagent");
        assert!(headers.get(USER_AGENT).is_none());
    }

    #[test]
    fn test_build_client() {
        let config = DownloaderConfig::default();
        assert!(SessionBuilder::build(&config).is_ok());
    }
}
