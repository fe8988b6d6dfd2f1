//! Bounded retry around backend calls.

use std::future::Future;
use webcite_core::{Backend, PageContents, Result, RetryPolicy};

/// Run `op` under `policy`.
///
/// A disabled policy (`max_attempts == 0`) calls `op` exactly once. Otherwise
/// `op` runs until it succeeds, fails with a non-retryable error, or has been
/// attempted `max_attempts` times; the last error is returned unchanged.
pub async fn with_retries<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if !policy.is_enabled() {
        return op().await;
    }

    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let err = match op().await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        if !err.is_retryable() {
            return Err(err);
        }
        if attempt >= policy.max_attempts {
            tracing::info!(attempt, error = %err, "giving up after final attempt");
            return Err(err);
        }
        let delay = policy.backoff(attempt);
        tracing::info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying after failure"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Decorator that runs every `search`/`fetch` of `inner` through
/// [`with_retries`].
#[derive(Debug, Clone)]
pub struct RetryingBackend<B> {
    inner: B,
    policy: RetryPolicy,
}

impl<B: Backend> RetryingBackend<B> {
    pub fn new(inner: B, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait::async_trait]
impl<B: Backend> Backend for RetryingBackend<B> {
    type Session = B::Session;

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn source(&self) -> &str {
        self.inner.source()
    }

    async fn search(
        &self,
        query: &str,
        topn: usize,
        session: &Self::Session,
    ) -> Result<PageContents> {
        let inner = &self.inner;
        with_retries(&self.policy, move || inner.search(query, topn, session)).await
    }

    async fn fetch(&self, url: &str, session: &Self::Session) -> Result<PageContents> {
        let inner = &self.inner;
        with_retries(&self.policy, move || inner.fetch(url, session)).await
    }
}
