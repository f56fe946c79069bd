use crate::api::query::Query;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error for {query}: {source}")]
    Transport {
        query: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("cannot build a URL for {query}: {reason}")]
    Endpoint { query: String, reason: String },
    #[error("{query} returned HTTP {status}")]
    Status { query: String, status: u16 },
    #[error("malformed body from {query}: {source}")]
    Decode {
        query: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Anything that can answer a read-only JSON query.
pub trait DataSource: Send + Sync {
    fn get_json(&self, query: &Query) -> impl Future<Output = Result<Value, FetchError>> + Send;
}

/// `DataSource` over HTTP, rooted at `<api_url>/api/`.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    base: Url,
}

impl HttpSource {
    pub fn new(api_url: &str, timeout: Duration) -> color_eyre::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base = Url::parse(&format!("{}/api/", api_url.trim_end_matches('/')))?;
        Ok(Self { client, base })
    }

    pub const fn base(&self) -> &Url {
        &self.base
    }
}

impl DataSource for HttpSource {
    async fn get_json(&self, query: &Query) -> Result<Value, FetchError> {
        let transport = |source| FetchError::Transport {
            query: query.to_string(),
            source,
        };

        let url = self
            .base
            .join(query.endpoint)
            .map_err(|e| FetchError::Endpoint {
                query: query.to_string(),
                reason: e.to_string(),
            })?;

        debug!(%url, "GET {query}");
        let response = self
            .client
            .get(url)
            .query(&query.params)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                query: query.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
            query: query.to_string(),
            source,
        })
    }
}

/// Runs `query` and decodes the body, falling back on any failure.
///
/// Transport errors, non-2xx statuses, undecodable bodies and a JSON `null`
/// all collapse to `fallback`; the failure is only logged.
pub async fn safe_get<S, T>(source: &S, query: &Query, fallback: T) -> T
where
    S: DataSource,
    T: DeserializeOwned,
{
    match source.get_json(query).await {
        Ok(Value::Null) => fallback,
        Ok(value) => serde_json::from_value(value).unwrap_or_else(|e| {
            warn!(%query, error = %e, "safe_get: unexpected body shape");
            fallback
        }),
        Err(e) => {
            warn!(%query, error = %e, "safe_get error");
            fallback
        }
    }
}
