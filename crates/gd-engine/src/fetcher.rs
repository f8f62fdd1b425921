//! Filter list fetching
//!
//! Sources are fetched concurrently but results come back in declared order,
//! so rule IDs never depend on which download finished first. A failing or
//! slow source only removes that source from the round.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;

use gd_core::types::FilterListSource;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("Request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Request to {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },
    #[error("No content for source '{0}'")]
    Missing(String),
}

#[async_trait]
pub trait ListFetcher: Send + Sync {
    async fn fetch(&self, source: &FilterListSource) -> Result<String, FetchError>;
}

pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl ListFetcher for HttpFetcher {
    async fn fetch(&self, source: &FilterListSource) -> Result<String, FetchError> {
        let url = source.url.as_str();
        let http_err = |source: reqwest::Error| FetchError::Http {
            url: url.to_string(),
            source,
        };

        let request = async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(http_err)?;
            response.text().await.map_err(http_err)
        };

        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

/// Serves list text from memory, keyed by source ID.
#[derive(Default)]
pub struct StaticFetcher {
    texts: HashMap<String, String>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_list(mut self, source_id: &str, text: &str) -> Self {
        self.texts.insert(source_id.to_string(), text.to_string());
        self
    }
}

#[async_trait]
impl ListFetcher for StaticFetcher {
    async fn fetch(&self, source: &FilterListSource) -> Result<String, FetchError> {
        self.texts
            .get(&source.id)
            .cloned()
            .ok_or_else(|| FetchError::Missing(source.id.clone()))
    }
}

/// Outcome of fetching every enabled source once.
#[derive(Debug, Default)]
pub struct FetchRound {
    /// `(source_id, text)` in declared order
    pub texts: Vec<(String, String)>,
    pub failures: Vec<(String, FetchError)>,
}

pub async fn fetch_all(fetcher: &dyn ListFetcher, sources: &[FilterListSource]) -> FetchRound {
    let results = join_all(sources.iter().map(|source| async move {
        log::info!("Fetching {} from {}", source.id, source.url);
        (source, fetcher.fetch(source).await)
    }))
    .await;

    let mut round = FetchRound::default();
    for (source, result) in results {
        match result {
            Ok(text) => round.texts.push((source.id.clone(), text)),
            Err(e) => {
                log::error!("Failed to fetch list {}: {}", source.id, e);
                round.failures.push((source.id.clone(), e));
            }
        }
    }
    round
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: &str) -> FilterListSource {
        FilterListSource {
            id: id.to_string(),
            name: id.to_uppercase(),
            url: format!("https://lists.example/{id}.txt"),
            enabled: true,
        }
    }

    struct SlowFirst;

    #[async_trait]
    impl ListFetcher for SlowFirst {
        async fn fetch(&self, source: &FilterListSource) -> Result<String, FetchError> {
            if source.id == "first" {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            Ok(format!("||{}.example^", source.id))
        }
    }

    #[tokio::test]
    async fn results_follow_declared_order() {
        let round = fetch_all(&SlowFirst, &[source("first"), source("second")]).await;
        let ids: Vec<&str> = round.texts.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_round() {
        let fetcher = StaticFetcher::new().with_list("easylist", "||ads.example.com^");
        let round = fetch_all(&fetcher, &[source("easylist"), source("gone")]).await;

        assert_eq!(round.texts.len(), 1);
        assert_eq!(round.failures.len(), 1);
        assert_eq!(round.failures[0].0, "gone");
        assert!(matches!(round.failures[0].1, FetchError::Missing(_)));
    }
}
