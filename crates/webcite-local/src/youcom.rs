//! Web-index provider (You.com). Web hits come before news hits.

use crate::credentials::{env_value, resolve_api_key};
use crate::http::{get_json, join_endpoint, post_json};
use crate::page::{process_html, search_results_html, ResultItem};
use serde::Deserialize;
use webcite_core::{check_search_args, strip_view_source, Backend, BackendError, PageContents, Result};

const PROVIDER: &str = "youcom";

pub const YOUCOM_BASE_URL: &str = "https://api.ydc-index.io";
pub const YOUCOM_API_KEY_ENV: &[&str] = &["WEBCITE_YDC_API_KEY", "YDC_API_KEY"];
const YOUCOM_ENDPOINT_ENV: &[&str] = &["WEBCITE_YDC_ENDPOINT"];

#[derive(Clone)]
pub struct YouComBackend {
    source: String,
    api_key: Option<String>,
    base_url: Option<String>,
}

impl std::fmt::Debug for YouComBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YouComBackend")
            .field("source", &self.source)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl YouComBackend {
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
        resolve_api_key(self.api_key.as_deref(), YOUCOM_API_KEY_ENV)
    }

    fn endpoint(&self, path: &str) -> String {
        let base = self
            .base_url
            .clone()
            .or_else(|| env_value(YOUCOM_ENDPOINT_ENV))
            .unwrap_or_else(|| YOUCOM_BASE_URL.to_string());
        join_endpoint(&base, path)
    }
}

#[derive(Debug, Deserialize)]
struct YouSearchResponse {
    results: YouResults,
}

#[derive(Debug, Default, Deserialize)]
struct YouResults {
    #[serde(default)]
    web: Vec<YouWebResult>,
    #[serde(default)]
    news: Vec<YouNewsResult>,
}

#[derive(Debug, Deserialize)]
struct YouWebResult {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    snippets: Option<Snippets>,
    #[serde(default)]
    description: Option<String>,
}

/// The index has returned snippets both as one string and as a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Snippets {
    One(String),
    Many(Vec<String>),
}

impl Snippets {
    fn joined(self) -> String {
        match self {
            Snippets::One(s) => s,
            Snippets::Many(v) => v.join(" "),
        }
    }
}

#[derive(Debug, Deserialize)]
struct YouNewsResult {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YouContent {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    markdown: Option<String>,
}

fn result_items(results: YouResults) -> Vec<ResultItem> {
    let web = results.web.into_iter().map(|r| ResultItem {
        url: r.url,
        title: r.title.unwrap_or_default(),
        summary: r
            .snippets
            .map(Snippets::joined)
            .or(r.description)
            .unwrap_or_default(),
    });
    let news = results.news.into_iter().map(|r| ResultItem {
        url: r.url,
        title: r.title.unwrap_or_default(),
        summary: r.description.unwrap_or_default(),
    });
    web.chain(news).collect()
}

#[async_trait::async_trait]
impl Backend for YouComBackend {
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
        let parsed: YouSearchResponse = get_json(
            session,
            PROVIDER,
            &self.endpoint("/v1/search"),
            &api_key,
            &[("query", query.to_string()), ("count", topn.to_string())],
        )
        .await?;

        let items = result_items(parsed.results);
        if items.is_empty() {
            return Err(BackendError::content(PROVIDER, format!("No results returned for {query}")).into());
        }
        Ok(process_html(&search_results_html(&items), "", query, true))
    }

    async fn fetch(&self, url: &str, session: &reqwest::Client) -> Result<PageContents> {
        let url = strip_view_source(url);
        let api_key = self.api_key()?;
        let body = serde_json::json!({
            "urls": [url],
            "livecrawl_formats": "html",
        });
        let parsed: Vec<YouContent> =
            post_json(session, PROVIDER, &self.endpoint("/v1/contents"), &api_key, &body).await?;

        let first = parsed
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::content(PROVIDER, format!("No contents returned for {url}")))?;
        // Plain text parses as a single text node, so markdown can take the same path.
        let html = first
            .html
            .or(first.markdown)
            .ok_or_else(|| BackendError::content(PROVIDER, format!("No HTML returned for {url}")))?;

        Ok(process_html(&html, url, first.title.as_deref().unwrap_or(""), true))
    }
}
