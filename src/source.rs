use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{self, HeaderMap};
use reqwest::{Client, StatusCode};

use crate::config::DownloadConfig;
use crate::error::TransportError;
use crate::planner::ByteRange;

pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

#[async_trait]
pub trait RangeSource: Send + Sync + 'static {
    /// `None` when the length header is absent or not a number.
    async fn content_length(&self, url: &str) -> Result<Option<u64>, TransportError>;

    /// Anything but `206 Partial Content` is an error.
    async fn open_range(&self, url: &str, range: ByteRange) -> Result<ByteStream, TransportError>;
}

pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(config: &DownloadConfig) -> Self {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client }
    }
}

// reqwest's own content_length() reports 0 for HEAD bodies, so read the header.
fn parse_content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

fn expect_partial_content(status: StatusCode) -> Result<(), TransportError> {
    if status == StatusCode::PARTIAL_CONTENT {
        Ok(())
    } else {
        Err(TransportError::UnexpectedStatus(status))
    }
}

#[async_trait]
impl RangeSource for HttpSource {
    async fn content_length(&self, url: &str) -> Result<Option<u64>, TransportError> {
        let response = self.client.head(url).send().await?;
        if !response.status().is_success() {
            return Err(TransportError::UnexpectedStatus(response.status()));
        }
        Ok(parse_content_length(response.headers()))
    }

    async fn open_range(&self, url: &str, range: ByteRange) -> Result<ByteStream, TransportError> {
        let response = self
            .client
            .get(url)
            .header(header::RANGE, range.header_value())
            .send()
            .await?;
        expect_partial_content(response.status())?;

        Ok(response.bytes_stream().map_err(TransportError::from).boxed())
    }
}
