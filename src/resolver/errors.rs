use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("无效的引用: {0}")]
    InvalidReference(String),
    #[error("不支持的协议: {0}")]
    UnsupportedScheme(String),
    #[error("没有可用的下载链接: {0}")]
    NoCandidates(String),
    #[error("网络请求失败: {0}")]
    Network(#[from] reqwest::Error),
}

impl From<url::ParseError> for ResolutionError {
    fn from(err: url::ParseError) -> Self {
        ResolutionError::InvalidReference(err.to_string())
    }
}
