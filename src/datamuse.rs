use crate::record::{QueryMode, WordRecord};
use async_trait::async_trait;
use reqwest::{IntoUrl, StatusCode, Url};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_ENDPOINT: &str = "https://api.datamuse.com/words";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Anything that can answer a word-relations query.
#[async_trait]
pub trait WordSource: Send + Sync {
    async fn lookup(&self, mode: QueryMode, term: &str) -> Result<Vec<WordRecord>, LookupError>;
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("invalid endpoint {endpoint:?}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("word service answered with status {0}")]
    Status(StatusCode),
    #[error("failed to decode word service response: {0}")]
    Decode(#[source] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub timeout: Duration,
    /// Forwarded as `max`; the service picks its own limit when unset.
    pub max_results: Option<u32>,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_results: None,
            user_agent: format!("rhyme-finder/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// HTTP client for the Datamuse `/words` endpoint.
pub struct DatamuseClient {
    client: reqwest::Client,
    endpoint: Url,
    max_results: Option<u32>,
}

impl DatamuseClient {
    pub fn new(config: ClientConfig) -> Result<Self, LookupError> {
        let endpoint = parse_endpoint(config.endpoint.as_str()).map_err(|source| {
            LookupError::InvalidEndpoint {
                endpoint: config.endpoint.clone(),
                source,
            }
        })?;
        let client = reqwest::ClientBuilder::new()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(LookupError::Client)?;
        Ok(Self {
            client,
            endpoint,
            max_results: config.max_results,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Full request URL for `term`; the term is percent-encoded.
    pub fn request_url(&self, mode: QueryMode, term: &str) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair(mode.param(), term);
            if let Some(max) = self.max_results {
                pairs.append_pair("max", &max.to_string());
            }
        }
        url
    }
}

fn parse_endpoint<U: IntoUrl>(endpoint: U) -> reqwest::Result<Url> {
    endpoint.into_url()
}

#[async_trait]
impl WordSource for DatamuseClient {
    async fn lookup(&self, mode: QueryMode, term: &str) -> Result<Vec<WordRecord>, LookupError> {
        let url = self.request_url(mode, term);
        debug!(%url, %mode, "querying word service");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(LookupError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status(status));
        }
        let records: Vec<WordRecord> = response.json().await.map_err(LookupError::Decode)?;
        debug!(count = records.len(), "word service responded");
        Ok(records)
    }
}
