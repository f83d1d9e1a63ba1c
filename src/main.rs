use anyhow::{Context, Result};
use aste_watch::config::load_config;
use aste_watch::dates::today_in;
use aste_watch::pipeline::{ScanOptions, extract_offline, scan};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "aste_watch", about = "Court auction notice watcher")]
struct Cli {
    #[arg(long, default_value = "configs/tribunale-bergamo.toml")]
    config: PathBuf,

    #[arg(long, default_value = "data/state/seen.json")]
    state_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Scan {
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    Extract {
        #[arg(long)]
        html: PathBuf,
        #[arg(long, default_value = "")]
        locality: String,
        #[arg(long)]
        base_url: Option<String>,
    },
    Validate,
}

fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { dry_run } => {
            let report = scan(&ScanOptions {
                config_path: cli.config,
                state_path: cli.state_path,
                dry_run,
            })?;

            info!(
                localities = report.localities.len(),
                notices = report.notices.len(),
                new = report.new_notices.len(),
                "scan complete"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Extract {
            html,
            locality,
            base_url,
        } => {
            let config = load_config(&cli.config)?;
            let content = std::fs::read_to_string(&html)
                .with_context(|| format!("failed to read {}", html.display()))?;
            let base = match base_url {
                Some(url) => Url::parse(&url).with_context(|| format!("invalid --base-url {url}"))?,
                None => config.search_url()?,
            };
            let today = today_in(config.timezone());

            let notices = extract_offline(&config, &content, &base, &locality, today);
            println!("{}", serde_json::to_string_pretty(&notices)?);
        }
        Commands::Validate => {
            let config = load_config(&cli.config)?;
            println!("OK: {} ({})", config.site.name, cli.config.display());
        }
    }

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}
