use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use xdcc_mule::{
    parse_excluded_channels, spawn_periodic_refresh, CatalogIndex, HttpFetcher, IndexedFile,
    MuleConfig, RebuildStats,
};

#[derive(Parser, Debug)]
#[command(name = "xdcc-mule")]
#[command(about = "Search XDCC bot catalogs and keep a live index of their listings", long_about = None)]
#[command(version)]
struct Args {
    /// URL of the aggregator catalog document
    #[arg(long, env = "DATABASE_URL")]
    catalog_url: String,

    /// Channels whose listings are never fetched (comma-separated)
    #[arg(long, env = "EXCLUDED_CHANNELS", default_value = "")]
    excluded_channels: String,

    /// Connect timeout for catalog and listing fetches (e.g. "5m", "30s")
    #[arg(long, default_value = "5m", value_parser = humantime::parse_duration)]
    connect_timeout: Duration,

    /// Maximum number of listings fetched in parallel
    #[arg(long, default_value_t = 16)]
    max_concurrent_fetches: usize,

    /// Time between rebuilds in `watch` mode (e.g. "1h", "30m")
    #[arg(long, env = "REFRESH_INTERVAL", default_value = "1h", value_parser = humantime::parse_duration)]
    refresh_interval: Duration,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every source listed in the catalog
    Sources,

    /// Search the indexed file names
    Search {
        /// Tokens that must appear in order; empty lists everything
        #[arg(default_value = "")]
        term: String,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rebuild the index once and print its stats
    Refresh,

    /// Keep the index fresh until interrupted
    Watch,
}

impl Args {
    fn config(&self) -> MuleConfig {
        MuleConfig {
            catalog_url: self.catalog_url.clone(),
            excluded_channels: parse_excluded_channels(&self.excluded_channels),
            fetch_connect_timeout: self.connect_timeout,
            max_concurrent_fetches: self.max_concurrent_fetches,
            refresh_interval: self.refresh_interval,
            ..MuleConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("xdcc_mule={}", log_level))),
        )
        .init();

    let config = args.config();
    info!("Catalog: {}", config.catalog_url);
    if !config.excluded_channels.is_empty() {
        info!("Excluded channels: {:?}", config.excluded_channels);
    }

    let fetcher = HttpFetcher::new(config.fetch_connect_timeout)
        .context("failed to build HTTP client")?;
    let index = Arc::new(CatalogIndex::new(&config, Arc::new(fetcher)));

    match args.command {
        Command::Sources => {
            let sources = index
                .fetch_catalog()
                .await
                .context("failed to fetch catalog")?;
            for source in sources {
                println!(
                    "{}\t{}\t{}",
                    source.network, source.channel_name, source.listing_url
                );
            }
        }
        Command::Search { term, json } => {
            let results = index.search(&term).await.context("search failed")?;
            print_results(&results, json)?;
        }
        Command::Refresh => {
            let stats = refresh_with_spinner(&index).await?;
            print_stats(&stats);
        }
        Command::Watch => {
            let stats = refresh_with_spinner(&index).await?;
            print_stats(&stats);

            let shutdown = CancellationToken::new();
            let scheduler = spawn_periodic_refresh(
                Arc::clone(&index),
                config.refresh_interval,
                shutdown.clone(),
            );

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for ctrl-c")?;
            info!("Shutting down");
            shutdown.cancel();
            scheduler.await.context("refresh task panicked")?;
        }
    }

    Ok(())
}

async fn refresh_with_spinner(index: &CatalogIndex) -> anyhow::Result<RebuildStats> {
    let spinner = indicatif::ProgressBar::new_spinner();
    spinner.set_style(
        indicatif::ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} | {elapsed_precise} elapsed")?,
    );
    spinner.set_message("Rebuilding catalog index...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    match index.refresh().await {
        Ok(stats) => {
            spinner.finish_with_message(format!("Indexed {} file(s)", stats.files));
            Ok(stats)
        }
        Err(e) => {
            spinner.finish_with_message("Rebuild failed");
            Err(e).context("failed to rebuild index")
        }
    }
}

fn print_stats(stats: &RebuildStats) {
    println!("files:            {}", stats.files);
    println!("sources indexed:  {}", stats.sources_indexed);
    println!("sources failed:   {}", stats.sources_failed);
    println!("sources excluded: {}", stats.sources_excluded);
    println!(
        "elapsed:          {}",
        humantime::format_duration(Duration::from_millis(stats.elapsed.as_millis() as u64))
    );
}

fn print_results(results: &[IndexedFile], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }
    for hit in results {
        let file = &hit.file;
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            file.network,
            file.channel_name,
            file.bot_name,
            file.file_number,
            file.file_size,
            file.file_name
        );
    }
    eprintln!("{} result(s)", results.len());
    Ok(())
}
