use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use recstore::index::{MetadataIndex, SearchIndex};
use recstore::query::QueryServer;
use recstore::stats::StatusReport;
use recstore::storage::SnapshotStore;
use recstore::{Config, Store};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "recstore", version, about = "File-backed record store with a metadata index")]
struct Cli {
    /// TOML 配置文件
    #[arg(long)]
    config: Option<PathBuf>,

    /// 数据根目录（覆盖配置文件）
    #[arg(long)]
    datapath: Option<PathBuf>,

    /// HTTP 监听地址（覆盖配置文件）
    #[arg(long)]
    listen: Option<SocketAddr>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 启动服务（默认）
    Serve,
    /// 离线重建索引并写快照
    Reindex,
    /// 读取索引快照并打印统计
    InspectIndex,
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut cfg = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(dp) = &cli.datapath {
        cfg.datapath = dp.clone();
    }
    if let Some(addr) = cli.listen {
        cfg.listen = addr;
    }
    cfg.validate()?;
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cfg).await,
        Command::Reindex => {
            // Store::open 即完成 丢弃旧索引 -> 全量重建 -> 写快照
            let store = tokio::task::spawn_blocking(move || Store::open(&cfg)).await??;
            println!("{}", store.status());
            Ok(())
        }
        Command::InspectIndex => inspect_index(&cfg),
    }
}

async fn serve(cfg: Config) -> anyhow::Result<()> {
    info!("Starting recstore at {}", cfg.datapath.display());

    let open_cfg = cfg.clone();
    let store = Arc::new(tokio::task::spawn_blocking(move || Store::open(&open_cfg)).await??);

    if cfg.flush_interval_secs > 0 {
        let store = store.clone();
        let every = Duration::from_secs(cfg.flush_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let s = store.clone();
                match tokio::task::spawn_blocking(move || s.flush_snapshot()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!("Periodic snapshot failed: {}", e),
                    Err(e) => tracing::warn!("Periodic snapshot task failed: {}", e),
                }
            }
        });
    }

    let server = QueryServer::new(store.clone());
    server
        .run(cfg.listen, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down...");
        })
        .await?;

    tokio::task::spawn_blocking(move || store.flush_snapshot()).await??;
    Ok(())
}

fn inspect_index(cfg: &Config) -> anyhow::Result<()> {
    let snapshots = SnapshotStore::in_dir(&cfg.index_dir());
    let Some(snap) = snapshots.load_if_valid()? else {
        anyhow::bail!("no valid index snapshot at {}", snapshots.path().display());
    };
    let index = MetadataIndex::from_snapshot(snap)?;
    let report = StatusReport {
        datapath: cfg.datapath.display().to_string(),
        index: index.stats(),
        last_rebuild: None,
    };
    println!("{}", report);
    Ok(())
}
