//! Semantic-search provider (Exa).

use crate::credentials::{env_value, resolve_api_key};
use crate::http::{join_endpoint, post_json};
use crate::page::{process_html, search_results_html, ResultItem};
use serde::Deserialize;
use webcite_core::{check_search_args, strip_view_source, Backend, BackendError, PageContents, Result};

const PROVIDER: &str = "exa";

pub const EXA_BASE_URL: &str = "https://api.exa.ai";
pub const EXA_API_KEY_ENV: &[&str] = &["WEBCITE_EXA_API_KEY", "EXA_API_KEY"];
const EXA_ENDPOINT_ENV: &[&str] = &["WEBCITE_EXA_ENDPOINT"];

#[derive(Clone)]
pub struct ExaBackend {
    source: String,
    api_key: Option<String>,
    base_url: Option<String>,
}

impl std::fmt::Debug for ExaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExaBackend")
            .field("source", &self.source)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ExaBackend {
    /// Never fails: a missing key surfaces on the first request.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            api_key: None,
            base_url: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn api_key(&self) -> Result<String> {
        resolve_api_key(self.api_key.as_deref(), EXA_API_KEY_ENV)
    }

    fn endpoint(&self, path: &str) -> String {
        let base = self
            .base_url
            .clone()
            .or_else(|| env_value(EXA_ENDPOINT_ENV))
            .unwrap_or_else(|| EXA_BASE_URL.to_string());
        join_endpoint(&base, path)
    }
}

#[derive(Debug, Deserialize)]
struct ExaResponse {
    results: Option<Vec<ExaResult>>,
}

#[derive(Debug, Deserialize)]
struct ExaResult {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait::async_trait]
impl Backend for ExaBackend {
    type Session = reqwest::Client;

    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn source(&self) -> &str {
        &self.source
    }

    async fn search(
        &self,
        query: &str,
        topn: usize,
        session: &reqwest::Client,
    ) -> Result<PageContents> {
        check_search_args(query, topn)?;
        let api_key = self.api_key()?;
        let body = serde_json::json!({
            "query": query,
            "numResults": topn,
            "contents": { "text": true, "summary": true },
        });
        let parsed: ExaResponse =
            post_json(session, PROVIDER, &self.endpoint("/search"), &api_key, &body).await?;

        let results = parsed.results.unwrap_or_default();
        if results.is_empty() {
            return Err(BackendError::content(PROVIDER, format!("No results returned for {query}")).into());
        }
        let items: Vec<ResultItem> = results
            .into_iter()
            .map(|r| ResultItem {
                url: r.url,
                title: r.title.unwrap_or_default(),
                summary: r.summary.unwrap_or_default(),
            })
            .collect();

        Ok(process_html(&search_results_html(&items), "", query, true))
    }

    async fn fetch(&self, url: &str, session: &reqwest::Client) -> Result<PageContents> {
        let url = strip_view_source(url);
        let api_key = self.api_key()?;
        let body = serde_json::json!({
            "urls": [url],
            "text": { "includeHtmlTags": true },
        });
        let parsed: ExaResponse =
            post_json(session, PROVIDER, &self.endpoint("/contents"), &api_key, &body).await?;

        let first = parsed
            .results
            .and_then(|rs| rs.into_iter().next())
            .ok_or_else(|| BackendError::content(PROVIDER, format!("No contents returned for {url}")))?;
        let html = first
            .text
            .ok_or_else(|| BackendError::content(PROVIDER, format!("No text returned for {url}")))?;

        Ok(process_html(&html, url, first.title.as_deref().unwrap_or(""), true))
    }
}
