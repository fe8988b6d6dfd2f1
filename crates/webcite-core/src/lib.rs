use serde::{Deserialize, Serialize};
use indexmap::IndexMap;
use std::time::Duration;

/// Literal url prefix callers use to ask for the raw page source.
///
/// Backends strip it before talking to the provider; nothing else changes.
pub const VIEW_SOURCE_PREFIX: &str = "view-source:";

/// Default bound for [`maybe_truncate`].
pub const DEFAULT_TRUNCATE_CHARS: usize = 1024;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A credential (or other required setting) could not be resolved.
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl Error {
    /// Whether a later attempt of the same call could succeed.
    ///
    /// Configuration and precondition failures are deterministic; everything the
    /// provider reports is treated as transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Backend(_))
    }

    pub fn as_backend(&self) -> Option<&BackendError> {
        match self {
            Error::Backend(e) => Some(e),
            _ => None,
        }
    }
}

/// Uniform failure surface for every provider.
///
/// `status` is set when the provider answered with a non-success HTTP status;
/// it is `None` for transport failures and for successful responses that lack
/// the content we need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub provider: &'static str,
    pub status: Option<u16>,
    pub message: String,
}

impl BackendError {
    pub fn http(provider: &'static str, status: u16, body: impl Into<String>) -> Self {
        Self {
            provider,
            status: Some(status),
            message: body.into(),
        }
    }

    pub fn content(provider: &'static str, message: impl Into<String>) -> Self {
        Self {
            provider,
            status: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} error {status}: {}", self.provider, self.message),
            None => write!(f, "{} error: {}", self.provider, self.message),
        }
    }
}

impl std::error::Error for BackendError {}

pub type Result<T> = std::result::Result<T, Error>;

/// Bounded exponential backoff, no jitter.
///
/// `max_attempts == 0` disables wrapping entirely: the operation runs once and
/// its error is returned as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Floor applied to every delay.
    pub min_backoff_ms: u64,
    /// Cap applied after the floor.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            min_backoff_ms: 2_000,
            max_backoff_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, max_wait: Duration) -> Self {
        Self {
            max_attempts,
            max_backoff_ms: max_wait.as_millis().min(u64::MAX as u128) as u64,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }

    /// Delay to wait after the `attempt`-th failure (1-based).
    ///
    /// The raw schedule is 1s, 2s, 4s, ... which is then raised to
    /// `min_backoff_ms` and capped at `max_backoff_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63);
        let raw_ms = 1_000u64.saturating_mul(1u64 << exp);
        let ms = raw_ms.max(self.min_backoff_ms).min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// One citation: the first anchor seen for a distinct href.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extract {
    pub id: usize,
    pub url: String,
    pub text: String,
}

/// Normalized result of a single `search` or `fetch`.
///
/// Fields are read-only after construction; `urls` is derived from the
/// extracts so the id map and the citation list can never disagree. On
/// deserialization any incoming `urls` is ignored and rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PageContentsRepr")]
pub struct PageContents {
    url: String,
    title: String,
    text: String,
    urls: IndexMap<String, String>,
    extracts: Vec<Extract>,
}

#[derive(Deserialize)]
struct PageContentsRepr {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    extracts: Vec<Extract>,
}

impl From<PageContentsRepr> for PageContents {
    fn from(r: PageContentsRepr) -> Self {
        PageContents::new(r.url, r.title, r.text, r.extracts)
    }
}

impl PageContents {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        text: impl Into<String>,
        extracts: Vec<Extract>,
    ) -> Self {
        let urls = extracts
            .iter()
            .map(|e| (e.id.to_string(), e.url.clone()))
            .collect();
        Self {
            url: url.into(),
            title: title.into(),
            text: text.into(),
            urls,
            extracts,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Citation id (decimal string) to absolute url, in id order.
    pub fn urls(&self) -> &IndexMap<String, String> {
        &self.urls
    }

    /// Citations in id order.
    pub fn extracts(&self) -> &[Extract] {
        &self.extracts
    }

    pub fn url_for(&self, id: usize) -> Option<&str> {
        self.extracts.get(id).map(|e| e.url.as_str())
    }
}

/// A pluggable search/fetch provider.
///
/// `Session` is the caller-owned HTTP handle; implementations never create
/// their own and never retry (see the retry harness in `webcite-local`).
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    type Session: Send + Sync;

    /// Stable provider name used in errors and logs.
    fn name(&self) -> &'static str;

    /// Free-text label supplied at construction.
    fn source(&self) -> &str;

    async fn search(
        &self,
        query: &str,
        topn: usize,
        session: &Self::Session,
    ) -> Result<PageContents>;

    async fn fetch(&self, url: &str, session: &Self::Session) -> Result<PageContents>;
}

#[async_trait::async_trait]
impl<B: Backend + ?Sized> Backend for Box<B> {
    type Session = B::Session;

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn source(&self) -> &str {
        (**self).source()
    }

    async fn search(
        &self,
        query: &str,
        topn: usize,
        session: &Self::Session,
    ) -> Result<PageContents> {
        (**self).search(query, topn, session).await
    }

    async fn fetch(&self, url: &str, session: &Self::Session) -> Result<PageContents> {
        (**self).fetch(url, session).await
    }
}

pub fn check_search_args(query: &str, topn: usize) -> Result<()> {
    if query.trim().is_empty() {
        return Err(Error::InvalidRequest("query must not be empty".to_string()));
    }
    if topn == 0 {
        return Err(Error::InvalidRequest("topn must be at least 1".to_string()));
    }
    Ok(())
}

/// Drop a leading `view-source:` marker, if any.
pub fn strip_view_source(url: &str) -> &str {
    url.strip_prefix(VIEW_SOURCE_PREFIX).unwrap_or(url)
}

/// Bound `text` to `num_chars` characters, ending with `...` when cut.
pub fn maybe_truncate(text: &str, num_chars: usize) -> String {
    if text.chars().count() <= num_chars {
        return text.to_string();
    }
    let keep = num_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    // Limits below 3 cannot hold the full marker; keep the length bound.
    out.extend("...".chars().take(num_chars - keep));
    out
}

/// Bare host of `url` for provenance labels (`""` when there is none).
pub fn get_domain(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return String::new();
    }
    let candidate = if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{url}")
    };
    url::Url::parse(&candidate)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn backoff_starts_at_floor_and_caps() {
        let p = RetryPolicy {
            max_attempts: 6,
            min_backoff_ms: 2_000,
            max_backoff_ms: 10_000,
        };
        let got: Vec<u64> = (1..=6).map(|n| p.backoff(n).as_millis() as u64).collect();
        assert_eq!(got, vec![2_000, 2_000, 4_000, 8_000, 10_000, 10_000]);
    }

    #[test]
    fn backoff_cap_wins_over_floor() {
        let p = RetryPolicy::new(3, Duration::from_millis(500));
        assert_eq!(p.backoff(1), Duration::from_millis(500));
        assert_eq!(p.backoff(40), Duration::from_millis(500));
    }

    #[test]
    fn backoff_never_overflows() {
        let p = RetryPolicy {
            max_attempts: u32::MAX,
            min_backoff_ms: 0,
            max_backoff_ms: u64::MAX,
        };
        assert!(p.backoff(u32::MAX) >= p.backoff(10));
    }

    #[test]
    fn page_contents_derives_urls_from_extracts() {
        let page = PageContents::new(
            "https://example.com/",
            "t",
            "body",
            vec![
                Extract {
                    id: 0,
                    url: "https://a.test/".to_string(),
                    text: "A".to_string(),
                },
                Extract {
                    id: 1,
                    url: "https://b.test/".to_string(),
                    text: "B".to_string(),
                },
            ],
        );
        assert_eq!(page.urls().len(), 2);
        assert_eq!(page.urls()["0"], "https://a.test/");
        assert_eq!(page.urls()["1"], "https://b.test/");
        assert_eq!(page.url_for(1), Some("https://b.test/"));
        assert_eq!(page.url_for(2), None);
    }

    #[test]
    fn page_contents_serializes_all_fields() {
        let page = PageContents::new("u", "t", "x", Vec::new());
        let v = serde_json::to_value(&page).unwrap();
        assert_eq!(v["title"], "t");
        assert_eq!(v["text"], "x");
        assert!(v["urls"].as_object().unwrap().is_empty());
    }

    fn numbered_extracts(n: usize) -> Vec<Extract> {
        (0..n)
            .map(|id| Extract {
                id,
                url: format!("https://h{id}.test/"),
                text: format!("link {id}"),
            })
            .collect()
    }

    #[test]
    fn urls_keep_id_order_past_ten_entries() {
        let page = PageContents::new("", "t", "x", numbered_extracts(12));
        let keys: Vec<&str> = page.urls().keys().map(String::as_str).collect();
        let expected: Vec<String> = (0..12).map(|i| i.to_string()).collect();
        assert_eq!(keys, expected);

        let json = serde_json::to_string(&page).unwrap();
        let pos = |k: &str| json.find(&format!("\"{k}\":\"https://h{k}.test/\"")).unwrap();
        assert!(pos("2") < pos("10"));
        assert!(pos("9") < pos("11"));
    }

    #[test]
    fn deserialization_rebuilds_urls_from_extracts() {
        let v = serde_json::json!({
            "url": "u",
            "title": "t",
            "text": "x",
            "urls": {"0": "https://forged.test/", "7": "https://extra.test/"},
            "extracts": [{"id": 0, "url": "https://real.test/", "text": "r"}],
        });
        let page: PageContents = serde_json::from_value(v).unwrap();
        assert_eq!(page.urls().len(), 1);
        assert_eq!(page.urls()["0"], "https://real.test/");

        let back: PageContents =
            serde_json::from_str(&serde_json::to_string(&page).unwrap()).unwrap();
        assert_eq!(back, page);
    }

    #[test]
    fn backend_error_display_includes_status_and_body() {
        let e = Error::from(BackendError::http("exa", 503, "overloaded"));
        assert_eq!(e.to_string(), "exa error 503: overloaded");
        assert!(e.is_retryable());
        assert_eq!(e.as_backend().and_then(|b| b.status), Some(503));

        let e = Error::from(BackendError::content("youcom", "No HTML returned for x"));
        assert_eq!(e.to_string(), "youcom error: No HTML returned for x");
    }

    #[test]
    fn configuration_and_precondition_errors_are_not_retryable() {
        assert!(!Error::NotConfigured("k".into()).is_retryable());
        assert!(!Error::InvalidRequest("q".into()).is_retryable());
    }

    #[test]
    fn search_args_are_validated() {
        assert!(check_search_args("rust", 1).is_ok());
        assert!(matches!(
            check_search_args("  ", 3),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            check_search_args("rust", 0),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn view_source_marker_is_stripped_once() {
        assert_eq!(
            strip_view_source("view-source:https://example.com/x"),
            "https://example.com/x"
        );
        assert_eq!(strip_view_source("https://example.com/x"), "https://example.com/x");
        assert_eq!(
            strip_view_source("view-source:view-source:x"),
            "view-source:x"
        );
    }

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(maybe_truncate("hello", 5), "hello");
        assert_eq!(maybe_truncate("hello world", 8), "hello...");
    }

    #[test]
    fn truncate_counts_chars_not_bytes() {
        let s = "héllo wörld";
        let out = maybe_truncate(s, 7);
        assert_eq!(out, "héll...");
        assert_eq!(out.chars().count(), 7);
    }

    #[test]
    fn get_domain_handles_schemes_and_garbage() {
        assert_eq!(get_domain("https://www.example.com/a?b=c"), "www.example.com");
        assert_eq!(get_domain("example.com/path"), "example.com");
        assert_eq!(get_domain(""), "");
        assert_eq!(get_domain("http://"), "");
    }

    proptest! {
        #[test]
        fn truncate_bounds_length(text in ".{0,64}", limit in 0usize..80) {
            let out = maybe_truncate(&text, limit);
            let n = text.chars().count();
            prop_assert!(out.chars().count() <= limit || n <= limit);
            if n <= limit {
                prop_assert_eq!(out, text);
            } else {
                prop_assert_eq!(out.chars().count(), limit);
                if limit >= 3 {
                    prop_assert!(out.ends_with("..."));
                }
            }
        }
    }
}
