use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use std::path::PathBuf;
use thiserror::Error;

use crate::common::progress;

pub const DEFAULT_USER_AGENT: &str = "WallCraft/1.0";

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("{0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("could not read {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("response body was empty")]
    Empty,
}

/// Resolves a photo URL to the raw, still-encoded image bytes.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, DownloadError>;
}

pub struct HttpImageSource {
    client: reqwest::Client,
    show_progress: bool,
}

impl HttpImageSource {
    pub fn new(user_agent: &str) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(DownloadError::Client)?;
        Ok(Self {
            client,
            show_progress: false,
        })
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    async fn fetch_http(&self, url: &str) -> Result<Bytes, DownloadError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status));
        }

        let pb = if self.show_progress {
            progress::create_download_bar(response.content_length(), "Downloading photo".into())
        } else {
            indicatif::ProgressBar::hidden()
        };

        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    pb.abandon();
                    return Err(e.into());
                }
            };
            pb.inc(chunk.len() as u64);
            body.extend_from_slice(&chunk);
        }
        pb.finish_and_clear();

        Ok(body.freeze())
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &str) -> Result<Bytes, DownloadError> {
        let bytes = match url.strip_prefix("file://") {
            Some(path) => {
                let path = PathBuf::from(path);
                tokio::fs::read(&path)
                    .await
                    .map(Bytes::from)
                    .map_err(|source| DownloadError::File { path, source })?
            }
            None => self.fetch_http(url).await?,
        };
        if bytes.is_empty() {
            return Err(DownloadError::Empty);
        }
        Ok(bytes)
    }
}
