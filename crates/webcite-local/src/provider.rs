use crate::credentials::env_is_set;
use crate::exa::{ExaBackend, EXA_API_KEY_ENV};
use crate::retry::RetryingBackend;
use crate::youcom::{YouComBackend, YOUCOM_API_KEY_ENV};
use std::str::FromStr;
use webcite_core::{Backend, Error, RetryPolicy};

/// Type-erased backend over a shared `reqwest::Client`.
pub type DynBackend = Box<dyn Backend<Session = reqwest::Client>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Exa,
    YouCom,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Exa, ProviderKind::YouCom];

    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::Exa => "exa",
            ProviderKind::YouCom => "youcom",
        }
    }

    pub fn api_key_env(self) -> &'static [&'static str] {
        match self {
            ProviderKind::Exa => EXA_API_KEY_ENV,
            ProviderKind::YouCom => YOUCOM_API_KEY_ENV,
        }
    }

    /// True when a non-empty key is present in the environment.
    pub fn api_key_configured(self) -> bool {
        env_is_set(self.api_key_env())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exa" => Ok(ProviderKind::Exa),
            "youcom" | "you" | "ydc" => Ok(ProviderKind::YouCom),
            other => Err(Error::InvalidRequest(format!(
                "unknown provider: {other} (expected exa or youcom)"
            ))),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Build a backend, wrapping it in the retry harness when `policy` is enabled.
pub fn build_backend(
    kind: ProviderKind,
    source: &str,
    api_key: Option<String>,
    policy: RetryPolicy,
) -> DynBackend {
    let inner: DynBackend = match kind {
        ProviderKind::Exa => {
            let mut b = ExaBackend::new(source);
            if let Some(k) = api_key {
                b = b.with_api_key(k);
            }
            Box::new(b)
        }
        ProviderKind::YouCom => {
            let mut b = YouComBackend::new(source);
            if let Some(k) = api_key {
                b = b.with_api_key(k);
            }
            Box::new(b)
        }
    };
    if policy.is_enabled() {
        Box::new(RetryingBackend::new(inner, policy))
    } else {
        inner
    }
}
