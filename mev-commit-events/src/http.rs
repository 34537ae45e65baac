//! HTTP client for a HyperSync-style indexing service.
//!
//! `GET {url}/height` returns `{"height": n}`; `POST {url}/query` takes a
//! JSON [`Query`] and returns one JSON [`QueryResponse`] page.

use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{QueryError, Result};
use crate::query::Query;
use crate::service::{IndexingService, QueryResponse};

/// Connection settings.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Service base URL.
    pub url: Url,
    /// Optional bearer token sent with every request.
    pub bearer_token: Option<String>,
    /// Optional per-request timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl HttpConfig {
    /// Settings for `url` with no token and no timeout.
    #[must_use]
    pub const fn new(url: Url) -> Self {
        Self {
            url,
            bearer_token: None,
            timeout: None,
        }
    }
}

/// [`IndexingService`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpService {
    http_client: reqwest::Client,
    cfg: HttpConfig,
}

#[derive(Deserialize)]
struct HeightResponse {
    height: u64,
}

impl HttpService {
    /// Build the HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Transport`] if the TLS backend cannot be
    /// initialised.
    pub fn new(cfg: HttpConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().gzip(true);
        if let Some(timeout) = cfg.timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build().map_err(QueryError::transport)?;
        Ok(Self { http_client, cfg })
    }

    /// Service base URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.cfg.url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        endpoint(&self.cfg.url, path)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let req = match &self.cfg.bearer_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        };
        let res = req.send().await.map_err(QueryError::transport)?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(QueryError::transport(format!(
                "http response status code {status}: {body}"
            )));
        }
        Ok(res)
    }
}

/// Read and parse a JSON body. Transfer failures are transport errors,
/// malformed bodies are decode errors.
async fn json<T: DeserializeOwned>(res: reqwest::Response, what: &str) -> Result<T> {
    let body = res.bytes().await.map_err(QueryError::transport)?;
    serde_json::from_slice(&body).map_err(|e| QueryError::Decode(format!("{what} response: {e}")))
}

fn endpoint(base: &Url, path: &str) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| QueryError::transport(format!("{base} cannot be a base url")))?
        .pop_if_empty()
        .push(path);
    Ok(url)
}

impl IndexingService for HttpService {
    async fn height(&self) -> Result<u64> {
        let url = self.endpoint("height")?;
        let res = self.send(self.http_client.request(Method::GET, url)).await?;
        let body: HeightResponse = json(res, "height").await?;
        tracing::debug!(height = body.height, "chain height");
        Ok(body.height)
    }

    async fn query(&self, query: &Query) -> Result<QueryResponse> {
        let url = self.endpoint("query")?;
        let req = self.http_client.request(Method::POST, url).json(query);
        let res = self.send(req).await?;
        let response: QueryResponse = json(res, "query").await?;
        let (blocks, transactions, logs) = response.row_counts();
        tracing::debug!(
            next_block = response.next_block,
            blocks,
            transactions,
            logs,
            archive_height = ?response.archive_height,
            execution_ms = response.total_execution_time,
            "query page"
        );
        Ok(response)
    }
}
