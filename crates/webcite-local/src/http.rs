use serde::de::DeserializeOwned;
use webcite_core::{maybe_truncate, BackendError, Result, DEFAULT_TRUNCATE_CHARS};

/// Header every provider request carries.
pub const API_KEY_HEADER: &str = "x-api-key";

pub(crate) fn join_endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim().trim_end_matches('/'), path)
}

pub(crate) async fn post_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    provider: &'static str,
    url: &str,
    api_key: &str,
    body: &serde_json::Value,
) -> Result<T> {
    tracing::debug!(provider, url, "POST");
    let resp = client
        .post(url)
        .header(API_KEY_HEADER, api_key)
        .json(body)
        .send()
        .await
        .map_err(|e| BackendError::content(provider, e.to_string()))?;
    decode(provider, resp).await
}

pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    provider: &'static str,
    url: &str,
    api_key: &str,
    query: &[(&str, String)],
) -> Result<T> {
    tracing::debug!(provider, url, "GET");
    let resp = client
        .get(url)
        .header(API_KEY_HEADER, api_key)
        .query(query)
        .send()
        .await
        .map_err(|e| BackendError::content(provider, e.to_string()))?;
    decode(provider, resp).await
}

async fn decode<T: DeserializeOwned>(provider: &'static str, resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        tracing::warn!(
            provider,
            status = status.as_u16(),
            body = %maybe_truncate(&body, DEFAULT_TRUNCATE_CHARS),
            "upstream returned an error status"
        );
        return Err(BackendError::http(provider, status.as_u16(), body).into());
    }
    resp.json::<T>()
        .await
        .map_err(|e| BackendError::content(provider, format!("invalid response body: {e}")).into())
}
