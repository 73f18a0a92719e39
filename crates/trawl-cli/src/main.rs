//! trawl - task lease queue CLI
//!
//! - `seed`:   アカウント URL から ACCOUNT / POST_LIST task を作る
//! - `work`:   1 network 分の処理ループを回す
//! - `serve`:  HTTP API を立てる
//! - `status`: status ごとの件数を出す

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trawl_core::app::seed::{self, SeedKinds};
use trawl_core::app::{TaskProcessingLoop, TaskService, TaskServiceBuilder, router};
use trawl_core::config::TrawlConfig;
use trawl_core::domain::Network;
use trawl_core::impls::{FixtureExtractor, JsonDirSink};
use trawl_core::ports::TaskStore;
use trawl_core::queue::StoreBackend;

#[derive(Debug, Parser)]
#[command(name = "trawl", version, about = "Task lease queue for scraping workers")]
struct Cli {
    /// TOML config. 省略時はすべてデフォルト値
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create tasks from a CSV (`Account Url` column) or a plain URL list.
    Seed {
        input: PathBuf,

        #[arg(long, default_value_t = SeedKinds::All)]
        kinds: SeedKinds,

        /// YYYY-MM-DD, inclusive
        #[arg(long)]
        after: Option<NaiveDate>,

        /// YYYY-MM-DD, inclusive
        #[arg(long)]
        before: Option<NaiveDate>,

        #[arg(long, value_enum, default_value_t = SeedMode::Append)]
        mode: SeedMode,
    },

    /// Run the processing loop until Ctrl-C.
    Work {
        #[arg(long)]
        network: Option<Network>,

        /// seconds
        #[arg(long)]
        poll_interval: Option<u64>,

        #[arg(long)]
        fixtures: Option<PathBuf>,

        /// Do not create POST_DETAILS tasks from post lists.
        #[arg(long)]
        no_fan_out: bool,
    },

    /// Serve the HTTP API.
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print task counts per status.
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SeedMode {
    /// 既存の task を消して作り直す（json_file のみ）
    Replace,
    Append,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => TrawlConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TrawlConfig::default(),
    };

    let backend = StoreBackend::open(&config.store)
        .await
        .context("opening task store")?;

    let outcome = match cli.command {
        Command::Seed {
            input,
            kinds,
            after,
            before,
            mode,
        } => {
            let service = build_service(&backend, &config).await?;
            run_seed(&backend, &service, &input, kinds, after, before, mode).await
        }
        Command::Work {
            network,
            poll_interval,
            fixtures,
            no_fan_out,
        } => {
            if let Some(network) = network {
                config.worker.network = network;
            }
            if let Some(secs) = poll_interval {
                config.worker.poll_interval_secs = secs;
            }
            if let Some(dir) = fixtures {
                config.extractor.fixtures_dir = dir;
            }
            if no_fan_out {
                config.fan_out.create_detail_tasks = false;
            }
            let service = build_service(&backend, &config).await?;
            run_work(service, &config).await
        }
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.http.bind = bind;
            }
            let service = build_service(&backend, &config).await?;
            run_serve(service, &config.http.bind).await
        }
        Command::Status => {
            let counts = backend.as_store().counts().await?;
            println!("{}", serde_json::to_string_pretty(&counts)?);
            Ok(())
        }
    };

    backend.close().await;
    outcome
}

async fn build_service(backend: &StoreBackend, config: &TrawlConfig) -> Result<Arc<TaskService>> {
    let sink = JsonDirSink::open(&config.sink.results_dir)
        .await
        .with_context(|| format!("opening results dir {}", config.sink.results_dir.display()))?;
    info!(results_dir = %sink.root().display(), "result sink ready");
    let service = TaskServiceBuilder::new(backend.as_store(), Arc::new(sink))
        .with_config(config)
        .build()?;
    Ok(Arc::new(service))
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

// --before は日付として inclusive なので、その日の最後の瞬間まで含める
fn day_end(date: NaiveDate) -> DateTime<Utc> {
    day_start(date) + chrono::TimeDelta::days(1) - chrono::TimeDelta::microseconds(1)
}

async fn run_seed(
    backend: &StoreBackend,
    service: &TaskService,
    input: &Path,
    kinds: SeedKinds,
    after: Option<NaiveDate>,
    before: Option<NaiveDate>,
    mode: SeedMode,
) -> Result<()> {
    let text = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("reading {}", input.display()))?;
    let urls = seed::read_account_urls(&text)?;
    let (default_after, default_before) = seed::default_window();
    let published_after = after.map(day_start).unwrap_or(default_after);
    let published_before = before.map(day_end).unwrap_or(default_before);
    let configs = seed::build_task_configs(&urls, kinds, published_after, published_before)?;

    match (mode, backend) {
        (SeedMode::Replace, StoreBackend::JsonFile(store)) => {
            let tasks: Vec<_> = configs
                .into_iter()
                .map(|(network, config)| service.new_task(network, config))
                .collect();
            let count = tasks.len();
            store.replace_all(tasks).await?;
            info!(count, accounts = urls.len(), path = %store.path().display(), "task store replaced");
        }
        (SeedMode::Replace, _) => {
            bail!("--mode replace is only supported by the json_file store");
        }
        (SeedMode::Append, _) => {
            let tasks = service.register_many(configs).await?;
            info!(count = tasks.len(), accounts = urls.len(), "tasks appended");
        }
    }
    Ok(())
}

async fn run_work(service: Arc<TaskService>, config: &TrawlConfig) -> Result<()> {
    let extractor = Arc::new(FixtureExtractor::new(&config.extractor.fixtures_dir));
    let worker = TaskProcessingLoop::new(
        service,
        extractor,
        config.worker.network,
        config.worker.poll_interval(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
        } else {
            warn!("failed to listen for ctrl-c");
            // sender を握ったまま待つ。drop するとループが止まる
            std::future::pending::<()>().await;
        }
        let _ = shutdown_tx.send(true);
    });

    worker.run(shutdown_rx).await?;
    Ok(())
}

async fn run_serve(service: Arc<TaskService>, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!(addr = %listener.local_addr()?, "http api listening");

    axum::serve(listener, router(service))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("ctrl-c received, shutting down");
        })
        .await?;
    Ok(())
}
