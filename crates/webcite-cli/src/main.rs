use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::time::Duration;
use webcite::{maybe_truncate, Backend, Error, PageContents, RetryPolicy};
use webcite_local::{build_backend, DynBackend, ProviderKind};

#[derive(Parser, Debug)]
#[command(name = "webcite")]
#[command(about = "Citation-indexed web search/fetch over hosted providers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search the web; prints the results as one citation-indexed page (json).
    Search(SearchCmd),
    /// Fetch a url; prints its normalized, citation-indexed text (json).
    Fetch(FetchCmd),
    /// Diagnose configuration (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct CommonArgs {
    /// Provider: exa|youcom
    #[arg(long, env = "WEBCITE_PROVIDER", default_value = "exa")]
    provider: String,
    /// Free-text label attached to the backend.
    #[arg(long, default_value = "web")]
    source: String,
    /// Total attempts per call. 0 disables the retry harness.
    #[arg(long, default_value_t = 0)]
    retries: u32,
    /// Cap on a single backoff delay (seconds).
    #[arg(long, default_value_t = 10)]
    max_wait_s: u64,
    /// Per-request HTTP timeout (ms).
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
    /// Also emit a `text_preview` bounded to this many chars (0 = none).
    /// The page body itself is never cut.
    #[arg(long, default_value_t = 0)]
    max_chars: usize,
}

#[derive(clap::Args, Debug)]
struct SearchCmd {
    query: String,
    /// Number of results to ask the provider for.
    #[arg(long, default_value_t = 5)]
    topn: usize,
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(clap::Args, Debug)]
struct FetchCmd {
    /// Url to fetch (`view-source:` prefix is accepted).
    url: String,
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    // stdout carries the JSON result; logs go to stderr.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn http_client(args: &CommonArgs) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_millis(args.timeout_ms))
        .user_agent(concat!("webcite/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

fn backend_for(args: &CommonArgs) -> webcite::Result<DynBackend> {
    let kind: ProviderKind = args.provider.parse()?;
    let policy = RetryPolicy::new(args.retries, Duration::from_secs(args.max_wait_s));
    tracing::debug!(provider = kind.name(), retries = args.retries, "building backend");
    Ok(build_backend(kind, &args.source, None, policy))
}

fn error_json(e: &Error) -> serde_json::Value {
    let code = match e {
        Error::NotConfigured(_) => "not_configured",
        Error::InvalidRequest(_) => "invalid_request",
        Error::Backend(_) => "backend_error",
    };
    serde_json::json!({
        "code": code,
        "message": e.to_string(),
        "status": e.as_backend().and_then(|b| b.status),
        "retryable": e.is_retryable(),
    })
}

fn emit(
    kind: &'static str,
    args: &CommonArgs,
    res: webcite::Result<(&'static str, PageContents)>,
) -> Result<ExitCode> {
    let text_mode = args.output.eq_ignore_ascii_case("text");
    match res {
        Ok((provider, page)) => {
            let preview =
                (args.max_chars > 0).then(|| maybe_truncate(page.text(), args.max_chars));
            if text_mode {
                let shown = preview.as_deref().unwrap_or(page.text());
                println!("# {}\n{}", page.title(), shown);
                // Only list citations whose marker is still visible.
                for e in page.extracts() {
                    let visible = shown.contains(&format!("【{}】", e.id))
                        || shown.contains(&format!("【{}†", e.id));
                    if preview.is_none() || visible {
                        println!("[{}] {}", e.id, e.url);
                    }
                }
            } else {
                let page_json = serde_json::to_value(&page)?;
                let mut v = serde_json::json!({
                    "schema_version": 1,
                    "kind": kind,
                    "ok": true,
                    "provider": provider,
                    "source": args.source,
                    "page": page_json,
                });
                if let Some(p) = preview {
                    v["text_preview"] = serde_json::Value::String(p);
                }
                println!("{v}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::error!(error = %e, "{kind} failed");
            if text_mode {
                eprintln!("webcite {kind}: {e}");
            } else {
                let v = serde_json::json!({
                    "schema_version": 1,
                    "kind": kind,
                    "ok": false,
                    "error": error_json(&e),
                });
                println!("{v}");
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Search(args) => {
            let client = http_client(&args.common)?;
            let res = async {
                let backend = backend_for(&args.common)?;
                let page = backend.search(&args.query, args.topn, &client).await?;
                Ok::<_, Error>((backend.name(), page))
            }
            .await;
            emit("search", &args.common, res)
        }
        Commands::Fetch(args) => {
            let client = http_client(&args.common)?;
            let res = async {
                let backend = backend_for(&args.common)?;
                let page = backend.fetch(&args.url, &client).await?;
                Ok::<_, Error>((backend.name(), page))
            }
            .await;
            emit("fetch", &args.common, res)
        }
        Commands::Doctor(args) => {
            let t0 = std::time::Instant::now();
            let mut providers = serde_json::Map::new();
            for kind in ProviderKind::ALL {
                // Booleans only; never print values.
                providers.insert(
                    kind.name().to_string(),
                    serde_json::Value::Bool(kind.api_key_configured()),
                );
            }
            let any_configured = providers.values().any(|v| v.as_bool() == Some(true));
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "doctor",
                "ok": true,
                "name": "webcite",
                "version": env!("CARGO_PKG_VERSION"),
                "configured": { "providers": providers },
                "checks": [{
                    "name": "any_provider_configured",
                    "ok": any_configured,
                    "hint": if any_configured { "" } else { "Set WEBCITE_EXA_API_KEY or WEBCITE_YDC_API_KEY." },
                }],
                "elapsed_ms": t0.elapsed().as_millis() as u64,
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => {
                    for kind in ProviderKind::ALL {
                        let state = if kind.api_key_configured() { "configured" } else { "missing key" };
                        println!("{kind}: {state}");
                    }
                }
                _ => println!("{v}"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "webcite",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("webcite {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
