use crate::{
    classify::FilterToken,
    config::Config,
    fetch::{Fetcher, RetryPolicy},
    paginate::{Paginator, TmdbSource},
    pipeline::Harvest,
    record::MediaKind,
    util::ensure_dir,
    verify,
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "tmdb-harvest")]
#[command(about = "Resilient TMDB catalog harvester (pagination + A-Z classification + xlsx reports + link verification)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./tmdb-harvest.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Harvest the whole genre catalog into A.xlsx..Z.xlsx + other.xlsx.
    Az {
        /// Only write titles starting with this letter/digit, or "!" for the rest.
        #[arg(long)]
        only: Option<String>,
        /// Free-text search instead of discovery.
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Top-N movies and series by rating and by popularity.
    Top {
        #[arg(short = 'c', long)]
        count: Option<usize>,
        /// Genre id; defaults to api.genre_id.
        #[arg(short = 'g', long)]
        genre: Option<u32>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Probe the embed service for every row of a harvested workbook.
    Verify {
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
        /// Only the N rows with the most votes.
        #[arg(short = 'n', long)]
        num_records: Option<usize>,
        /// movie or tv; inferred from the file name when omitted.
        #[arg(long)]
        kind: Option<String>,
    },
    /// Print total result counts for the configured genre.
    Total {},
}

pub async fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref());
    let cfg = match &cfg_path {
        Some(p) => Config::load(p)?,
        None => Config::default(),
    };
    let _guard = init_logging(&args, &cfg, resolve_log_path(&cfg).as_deref())?;
    if cfg_path.is_none() {
        info!("no config file found; using built-in defaults");
    }
    if cfg.api.resolve_key().is_empty() && !matches!(args.cmd, Command::Verify { .. }) {
        warn!(
            "no API key configured (api.api_key or ${}); requests will be rejected",
            cfg.api.api_key_env
        );
    }

    let cancel = CancellationToken::new();
    spawn_interrupt_watch(cancel.clone());

    match &args.cmd {
        Command::Az {
            only,
            query,
            out_dir,
        } => {
            let only = only.as_deref().map(FilterToken::parse).transpose()?;
            let out = out_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(&cfg.harvest.out_dir));
            let mut harvest = build_harvest(&cfg, RetryPolicy::unbounded(&cfg.fetch), &cancel)?;
            let report = harvest.run_catalog(&out, only, query.clone()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Top {
            count,
            genre,
            out_dir,
        } => {
            let count = count.unwrap_or(cfg.harvest.top_count);
            let genre = genre.or(Some(cfg.api.genre_id));
            let out = out_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(&cfg.harvest.top_dir));
            let mut harvest = build_harvest(&cfg, RetryPolicy::bounded(&cfg.fetch), &cancel)?;
            let report = harvest.run_top(&out, count, genre).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Verify {
            file,
            num_records,
            kind,
        } => {
            let kind = kind
                .as_deref()
                .map(|k| MediaKind::parse(k).ok_or_else(|| anyhow!("unknown kind: {k}")))
                .transpose()?;
            if !file.exists() {
                return Err(anyhow!("input does not exist: {}", file.display()));
            }
            let summary = verify::run_verify(&cfg, file, *num_records, kind, cancel.clone()).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Total {} => {
            let mut harvest = build_harvest(&cfg, RetryPolicy::bounded(&cfg.fetch), &cancel)?;
            let totals = harvest.run_totals().await?;
            println!("{}", serde_json::to_string_pretty(&totals)?);
        }
    }
    Ok(())
}

fn build_harvest(
    cfg: &Config,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Harvest<TmdbSource>> {
    let fetcher = Fetcher::new(&cfg.fetch, policy, cancel.clone())?;
    let source = TmdbSource::new(&cfg.api, fetcher);
    let paginator = Paginator::new(source, cfg.fetch.page_delay(), cancel.clone())
        .with_status_line(cfg.fetch.status_line)
        .with_max_page(cfg.fetch.max_page);
    let posters = if cfg.harvest.embed_posters {
        Some(Fetcher::new(&cfg.fetch, policy, cancel.clone())?)
    } else {
        None
    };
    Ok(Harvest::new(cfg, paginator, posters))
}

fn spawn_interrupt_watch(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("[interrupt] saving collected data before exit");
            cancel.cancel();
        }
    });
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    ["tmdb-harvest.toml", "tmdb-harvest.example.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    Some(PathBuf::from(&cfg.harvest.out_dir).join("tmdb-harvest.log"))
}
