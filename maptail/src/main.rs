use clap::Parser;
use maptail_core::{
    Config, ConfigLoader, ConfigValidator, FamilyResolver, GeoIpConfig, GeoResolver, Hub,
    MaxMindResolver, NoopResolver, Pipeline, SourcedLine,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing_subscriber::filter::{filter_fn, EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

mod input;
mod server;
mod sse;
mod static_files;

use input::SelfLogWriter;
use server::AppState;

/// Lines waiting for the pipeline, from stdin and our own logs combined
const INGEST_QUEUE: usize = 1024;

#[derive(Parser, Debug)]
#[command(name = "maptail")]
#[command(about = "Stream log lines from stdin and plot their IP addresses on a live world map")]
struct Args {
    /// Port to listen on
    #[arg(long, short = 'p', env = "PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Path the viewer and event stream are mounted under
    #[arg(long)]
    base_path: Option<String>,

    /// Directory holding the viewer assets
    #[arg(long)]
    public_dir: Option<PathBuf>,

    /// MaxMind City database (used for IPv6 too unless --geoip-v6-db is given)
    #[arg(long)]
    geoip_db: Option<PathBuf>,

    /// MaxMind database for IPv6 addresses
    #[arg(long)]
    geoip_v6_db: Option<PathBuf>,

    /// Events retained for replay to new viewers (both histories)
    #[arg(long)]
    history: Option<usize>,

    /// Suppress echo of stdin to stdout
    #[arg(long)]
    silent: bool,

    /// Do not send raw lines to viewers
    #[arg(long)]
    no_logs: bool,

    /// Do not replay raw line history to new viewers
    #[arg(long)]
    no_replay_logs: bool,

    /// Do not feed our own log output back into the map
    #[arg(long)]
    no_self_ingest: bool,

    /// Config file path
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Args {
    /// Command line values take precedence over the config file
    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(base_path) = &self.base_path {
            config.server.base_path = base_path.clone();
        }
        if let Some(public_dir) = &self.public_dir {
            config.server.public_dir = public_dir.clone();
        }
        if let Some(db) = &self.geoip_db {
            config.geoip.ipv4_db = Some(db.clone());
        }
        if let Some(db) = &self.geoip_v6_db {
            config.geoip.ipv6_db = Some(db.clone());
        }
        if let Some(history) = self.history {
            config.stream.geo_history = history;
            config.stream.log_history = history;
        }
        if self.silent {
            config.stream.silent = true;
        }
        if self.no_logs {
            config.stream.forward_logs = false;
        }
        if self.no_replay_logs {
            config.stream.replay_logs = false;
        }
        if self.no_self_ingest {
            config.stream.self_ingest = false;
        }
    }
}

fn init_logging(verbose: bool, self_log: Option<SelfLogWriter>) {
    let env_filter = EnvFilter::try_from_env("MAPTAIL_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let env_filter = if verbose {
        env_filter.add_directive(LevelFilter::DEBUG.into())
    } else {
        env_filter
    };

    let self_log_layer = self_log.map(|writer| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .without_time()
            .with_writer(writer)
            .with_filter(filter_fn(|meta| input::is_self_ingestible(meta.target())))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(self_log_layer)
        .init();
}

fn open_resolver(geoip: &GeoIpConfig) -> anyhow::Result<Arc<dyn GeoResolver>> {
    if !geoip.is_configured() {
        tracing::warn!("No geo database configured, addresses will not be located");
        return Ok(Arc::new(NoopResolver));
    }

    let v4: Arc<dyn GeoResolver> = match &geoip.ipv4_db {
        Some(path) => Arc::new(MaxMindResolver::open(path)?),
        None => Arc::new(NoopResolver),
    };
    let v6: Arc<dyn GeoResolver> = match geoip.effective_ipv6_db() {
        Some(path) if Some(path) == geoip.ipv4_db.as_ref() => Arc::clone(&v4),
        Some(path) => Arc::new(MaxMindResolver::open(path)?),
        None => Arc::new(NoopResolver),
    };

    Ok(Arc::new(FamilyResolver::new(v4, v6)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = ConfigLoader::load_or_default(args.config.clone())?;
    args.apply(&mut config);
    ConfigValidator::validate(&config)?;
    let config = Arc::new(config);

    let (line_tx, line_rx) = mpsc::channel::<SourcedLine>(INGEST_QUEUE);
    let self_log = config
        .stream
        .self_ingest
        .then(|| SelfLogWriter::new(line_tx.clone()));
    init_logging(args.verbose, self_log);

    if !config.server.public_dir.is_dir() {
        tracing::warn!(
            "Viewer directory {:?} not found, only the event stream will be served",
            config.server.public_dir
        );
    }

    let resolver = open_resolver(&config.geoip)?;
    let hub = Arc::new(Hub::new(&config.stream));
    let pipeline = Arc::new(Pipeline::new(
        Arc::clone(&hub),
        resolver,
        config.stream.forward_logs,
        config.stream.max_inflight_lookups,
    ));

    let state = Arc::new(AppState {
        hub,
        route_prefix: config.server.route_prefix(),
        public_dir: config.server.public_dir.clone(),
        keepalive: Some(Duration::from_secs(config.server.keepalive_secs)),
    });
    let server_config = Arc::clone(&config);
    let server_handle = tokio::spawn(async move {
        server::run_http_server(
            state,
            &server_config.server.host,
            server_config.server.port,
            shutdown_signal(),
        )
        .await
    });

    tokio::spawn(async move {
        let stdin = BufReader::new(tokio::io::stdin());
        match input::read_lines(stdin, line_tx).await {
            Ok(count) => tracing::info!("Input closed after {} lines, still serving", count),
            Err(e) => tracing::warn!("Failed reading input: {}", e),
        }
    });

    let ingest_pipeline = Arc::clone(&pipeline);
    let echo = (!config.stream.silent).then(tokio::io::stdout);
    tokio::spawn(async move {
        input::run_ingest(line_rx, &ingest_pipeline, echo).await;
    });

    server_handle.await??;

    let stats = pipeline.stats();
    tracing::info!(
        "Processed {} lines, {} addresses ({} located, {} unknown, {} failed, {} skipped)",
        stats.lines,
        stats.addresses,
        stats.resolved,
        stats.misses,
        stats.failures,
        stats.shed
    );

    Ok(())
}
