use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, bail};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;
use yomidex_reading::{ReadingResolver, ReadingTable, SharedAnalyzer};

use yomidex::thumbs::DEFAULT_WORKERS;
use yomidex::{AppState, Catalog, OembedLookup, Source, ThumbnailStore, reload_and_enrich, router};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_SHEET_GID: &str = "0";
const MAX_PAGE_SIZE: usize = 500;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = load_config()?;
    info!("binding to {}:{}", config.host, config.port);
    info!("using sheet at {}", config.source);
    if config.disable_cache {
        info!("cache headers disabled");
    }

    let start = Instant::now();
    let table = match &config.readings_path {
        Some(path) => {
            info!("using reading table at {}", path.display());
            ReadingTable::load(path)?
        }
        None => ReadingTable::builtin(),
    };
    info!(
        "reading table ready with {} entries in {} ms",
        table.len(),
        start.elapsed().as_millis()
    );
    let resolver = ReadingResolver::new(table, Arc::new(analyzer()));

    let client = reqwest::Client::builder()
        .user_agent(concat!("yomidex/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("build http client")?;
    let thumbnails = match &config.thumbnail_endpoint {
        Some(endpoint) => {
            info!(
                "thumbnails from {endpoint} with {} workers",
                config.thumbnail_workers
            );
            let lookup = OembedLookup::new(client.clone(), endpoint.clone());
            ThumbnailStore::new(Arc::new(lookup), config.thumbnail_workers)
        }
        None => ThumbnailStore::disabled(),
    };

    let state = AppState {
        catalog: Arc::new(Catalog::with_client(config.source.clone(), resolver, client)),
        thumbnails,
        max_page_size: config.max_page_size,
        disable_cache: config.disable_cache,
    };

    if let Err(err) = reload_and_enrich(&state).await {
        warn!("initial load failed: {err}; serving an empty catalog until reload");
    }

    let app = router(state).layer(TraceLayer::new_for_http());
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("invalid listen address");
    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(feature = "lindera")]
fn analyzer() -> SharedAnalyzer {
    use yomidex_reading::{LinderaAnalyzer, MorphAnalyzer};

    SharedAnalyzer::new(|| async {
        let analyzer = tokio::task::spawn_blocking(LinderaAnalyzer::new).await??;
        Ok::<_, anyhow::Error>(Arc::new(analyzer) as Arc<dyn MorphAnalyzer>)
    })
}

#[cfg(not(feature = "lindera"))]
fn analyzer() -> SharedAnalyzer {
    SharedAnalyzer::unavailable()
}

#[derive(Debug, Clone)]
struct Config {
    host: String,
    port: u16,
    source: Source,
    readings_path: Option<PathBuf>,
    thumbnail_endpoint: Option<String>,
    thumbnail_workers: usize,
    max_page_size: usize,
    disable_cache: bool,
}

fn load_config() -> anyhow::Result<Config> {
    let mut disable_cache = false;
    let mut cli_source: Option<String> = None;
    let mut cli_readings: Option<PathBuf> = None;
    let mut args = env::args().skip(1).peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--no-cache" => disable_cache = true,
            "--source" => cli_source = args.next(),
            "--readings" => cli_readings = args.next().map(PathBuf::from),
            _ => {
                if let Some(raw) = arg.strip_prefix("--source=") {
                    cli_source = Some(raw.to_string());
                } else if let Some(path) = arg.strip_prefix("--readings=") {
                    cli_readings = Some(PathBuf::from(path));
                }
            }
        }
    }

    let host = env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let Some(source) = cli_source
        .or_else(|| env::var("SHEET_URL").ok())
        .or_else(|| env::var("SHEET_PATH").ok())
        .map(|raw| Source::parse(&raw))
        .or_else(|| {
            let id = env::var("SHEET_ID").ok()?;
            let gid = env::var("SHEET_GID").unwrap_or_else(|_| DEFAULT_SHEET_GID.to_string());
            Some(Source::google_sheet(&id, &gid))
        })
    else {
        bail!("no sheet configured: pass --source=<url|path> or set SHEET_URL, SHEET_PATH or SHEET_ID");
    };
    let readings_path = cli_readings.or_else(|| env::var("READINGS_PATH").ok().map(PathBuf::from));
    let thumbnail_endpoint = env::var("THUMBNAIL_ENDPOINT")
        .ok()
        .filter(|v| !v.trim().is_empty());
    let thumbnail_workers = env::var("THUMBNAIL_WORKERS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_WORKERS);
    let max_page_size = env::var("MAX_PAGE_SIZE")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(MAX_PAGE_SIZE);

    Ok(Config {
        host,
        port,
        source,
        readings_path,
        thumbnail_endpoint,
        thumbnail_workers,
        max_page_size,
        disable_cache,
    })
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let max_level = env_filter
        .max_level_hint()
        .and_then(|hint| hint.into_level())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_max_level(max_level)
        .init();
}
