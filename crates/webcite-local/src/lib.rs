//! IO implementations for `webcite`: provider adapters over `reqwest`, the
//! HTML normalizer that turns provider output into citation-indexed text, and
//! the retry harness.

pub mod credentials;
pub mod exa;
mod http;
pub mod page;
pub mod provider;
pub mod retry;
pub mod youcom;

pub use exa::ExaBackend;
pub use http::API_KEY_HEADER;
pub use page::{process_html, search_results_html, CitationIndex, ResultItem};
pub use provider::{build_backend, DynBackend, ProviderKind};
pub use retry::{with_retries, RetryingBackend};
pub use youcom::YouComBackend;
