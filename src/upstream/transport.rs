use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use url::Url;

use crate::error::{AppError, Result};

/// The two query shapes the upstream understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApodQuery {
    Date(NaiveDate),
    Random(u8),
}

/// An upstream reply before any interpretation.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub retry_after: Option<String>,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait ApodTransport: Send + Sync {
    async fn get(&self, query: ApodQuery) -> Result<RawResponse>;
}

pub struct HttpTransport {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, api_key: String) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("invalid api_base_url '{}': {}", base_url, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("apod-cache/1.0")
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn request_url(&self, query: ApodQuery) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("api_key", &self.api_key);
            match query {
                ApodQuery::Date(date) => {
                    pairs.append_pair("date", &date.format("%Y-%m-%d").to_string());
                }
                ApodQuery::Random(count) => {
                    pairs.append_pair("count", &count.to_string());
                }
            }
        }
        url
    }
}

#[async_trait]
impl ApodTransport for HttpTransport {
    async fn get(&self, query: ApodQuery) -> Result<RawResponse> {
        let response = self.client.get(self.request_url(query)).send().await?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = response.bytes().await?.to_vec();

        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }
}
