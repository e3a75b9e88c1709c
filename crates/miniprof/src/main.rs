mod client;
mod demo;
mod output;
mod telemetry;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use miniprof_core::config::Config;
use miniprof_core::stats::StatsSource;
use miniprof_core::store::ResultStore;
use miniprof_core::time::parse_duration_str;
use miniprof_store::Store;
use miniprof_web::Profiler;

use crate::client::ResultsClient;
use crate::output::print_results_human;
use crate::telemetry::{init_cli_tracing, init_run_tracing, shutdown_tracing};

#[derive(Parser, Debug)]
#[command(name = "miniprof")]
#[command(about = "Per-request profiler with a redirect-aware result viewer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    addr: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Serve the demo app behind the profiler")]
    Run {
        #[arg(long)]
        listen_addr: Option<String>,
        #[arg(long)]
        db_path: Option<PathBuf>,
        #[arg(long, help = "How long results stay readable, e.g. 30s or 5m")]
        data_expiry: Option<String>,
    },
    #[command(about = "Fetch stored profiles for comma-separated request ids")]
    Results { ids: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            listen_addr,
            db_path,
            data_expiry,
        } => run_server(listen_addr, db_path, data_expiry).await,
        Commands::Results { ids } => {
            init_cli_tracing();
            let cfg = Config::load().context("load config")?;
            let addr = cli.addr.unwrap_or_else(|| cfg.listen_addr.clone());
            let client = ResultsClient::new(&addr, &cfg.base_path);
            let set = client.fetch(&ids).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&set)?);
            } else {
                print_results_human(&set, std::io::stdout().is_terminal());
            }
            Ok(())
        }
    }
}

async fn run_server(
    listen_addr: Option<String>,
    db_path: Option<PathBuf>,
    data_expiry: Option<String>,
) -> anyhow::Result<()> {
    let mut cfg = Config::load().context("load config")?;
    if let Some(v) = listen_addr {
        cfg.listen_addr = v;
    }
    if let Some(v) = db_path {
        cfg.db_path = Some(v);
    }
    if let Some(v) = data_expiry {
        cfg.data_expiry = parse_duration_str(&v)?;
    }

    init_run_tracing();

    let store = match &cfg.db_path {
        Some(path) => Store::open(path)?,
        None => Store::open_in_memory()?,
    }
    .with_namespace(cfg.namespace.clone());
    let status = store.status()?;

    let shared = Arc::new(store.clone());
    let results: Arc<dyn ResultStore> = shared.clone();
    let stats: Arc<dyn StatsSource> = shared;
    let profiler = Profiler::new(cfg.clone(), results, Some(stats))?;
    let app = profiler.attach(demo::router(store.clone()));

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("bind {}", cfg.listen_addr))?;

    eprintln!("miniprof run");
    eprintln!("  listen: http://{}", cfg.listen_addr);
    eprintln!("  db: {}", status.db_path);
    eprintln!("  stored results: {}", status.live_results);
    eprintln!("  data expiry: {:?}", cfg.data_expiry);
    eprintln!("  results: {}results?ids=<id,...>", cfg.base_path);

    let http_task = tokio::spawn(async move { axum::serve(listener, app).await });

    let retention_task = tokio::spawn({
        let store = store.clone();
        let every = cfg.retention_interval.max(Duration::from_secs(1));
        let stats_ttl = cfg.data_expiry.saturating_mul(2);
        async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                match store.run_retention(stats_ttl) {
                    Ok(report) if report.results + report.call_stats > 0 => {
                        tracing::debug!(
                            results = report.results,
                            call_stats = report.call_stats,
                            "pruned expired entries"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = ?err, "retention task failed"),
                }
            }
        }
    });

    tokio::select! {
        res = http_task => {
            res?.context("http server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    retention_task.abort();
    shutdown_tracing();
    Ok(())
}
