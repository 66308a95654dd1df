// ABOUTME: CLI for running sitefeed routes and printing the resulting feed as JSON.
// ABOUTME: Runs a builtin or file-defined route against the live page, a URL override, or a saved HTML file.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use sitefeed_feed::{
    assemble, build_items, load_builtin_routes, Feed, FeedPipeline, RouteRegistry, RouteSpec,
    SystemClock,
};
use sitefeed_scrape::{Fetcher, RetryPolicy};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Turn an HTML page into a feed and print it as JSON.
#[derive(Parser, Debug)]
#[command(name = "sitefeed")]
#[command(about = "Extract feeds from HTML pages", long_about = None)]
struct Args {
    /// Route name, e.g. sge/yshq. Required unless --list is given.
    route: Option<String>,

    /// JSON file with additional routes; routes here replace builtins of the same name.
    #[arg(long)]
    route_file: Option<PathBuf>,

    /// Fetch this URL instead of the route's source page.
    #[arg(long)]
    url: Option<String>,

    /// Read the page from a local HTML file instead of fetching it.
    #[arg(long, conflicts_with = "url")]
    html: Option<PathBuf>,

    /// List known route names and exit.
    #[arg(long, default_value_t = false)]
    list: bool,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Retry transient fetch failures this many times.
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Output compact JSON instead of pretty.
    #[arg(long, default_value_t = false)]
    compact: bool,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

/// Initialize tracing on stderr. RUST_LOG overrides the default `warn` level.
fn init_tracing(json: bool) {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let builder = tracing_subscriber::registry().with(filter);

    if json {
        let _ = builder.with(fmt_layer.json().flatten_event(true)).try_init();
    } else {
        let _ = builder.with(fmt_layer.compact()).try_init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let registry = load_registry(args.route_file.as_deref())?;

    if args.list {
        for route in registry.iter() {
            println!("{}\t{}", route.name, route.title);
        }
        return Ok(());
    }

    let name = args
        .route
        .as_deref()
        .ok_or_else(|| anyhow!("a route name is required (see --list)"))?;
    let mut route = registry
        .get(name)
        .cloned()
        .ok_or_else(|| anyhow!("unknown route: {}", name))?;
    if let Some(url) = &args.url {
        route.url = Some(url.clone());
    }

    let feed = match &args.html {
        Some(path) => feed_from_file(&route, path)?,
        None => feed_from_source(&route, &args).await?,
    };

    if args.compact {
        println!("{}", serde_json::to_string(&feed)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&feed)?);
    }

    Ok(())
}

fn load_registry(route_file: Option<&std::path::Path>) -> Result<RouteRegistry> {
    let mut registry = load_builtin_routes()?;
    if let Some(path) = route_file {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read route file {}", path.display()))?;
        let extra = RouteRegistry::from_json(&json)?;
        debug!(path = %path.display(), routes = extra.len(), "loaded route file");
        for route in extra.iter() {
            registry.register(route.clone());
        }
    }
    Ok(registry)
}

fn feed_from_file(route: &RouteSpec, path: &std::path::Path) -> Result<Feed> {
    if !path.exists() {
        bail!("file not found: {}", path.display());
    }
    let html = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let items = build_items(&html, route, &SystemClock)?;
    Ok(assemble(
        &route.title,
        &route.link,
        items,
        route.ttl,
        route.allow_empty,
    )?)
}

fn retry_policy(retries: u32) -> RetryPolicy {
    if retries == 0 {
        RetryPolicy::none()
    } else {
        RetryPolicy::exponential(retries.saturating_add(1), Duration::from_millis(500))
    }
}

async fn feed_from_source(route: &RouteSpec, args: &Args) -> Result<Feed> {
    let retry = retry_policy(args.retries);
    let fetcher = Fetcher::builder()
        .timeout(Duration::from_secs(args.timeout))
        .retry(retry)
        .build()?;
    let pipeline = FeedPipeline::builder()
        .fetcher(fetcher)
        .clock(Arc::new(SystemClock))
        .build()?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            on_signal.cancel();
        }
    });

    info!(route = %route.name, url = route.source_url(), "running route");
    Ok(pipeline.run_cancellable(route, &cancel).await?)
}
