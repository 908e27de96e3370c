use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use sitefeed::config::Config;
use sitefeed::content::{ContentSource, MemoryRepository};
use sitefeed::engine::{FeedEngine, RefreshReport};

#[derive(Parser, Debug)]
#[command(name = "sitefeed", about = "Sitemap and robots.txt generator for content repositories")]
struct Args {
    /// Configuration file
    #[arg(long, value_name = "FILE", env = "SITEFEED_CONFIG", default_value = "sitefeed.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Regenerate every site, write documents, update robots.txt and notify
    Refresh,

    /// Print one site's document to stdout
    Render {
        #[arg(long)]
        site: String,
    },

    /// Serve documents over HTTP
    Serve {
        /// Listen address (overrides `bind` in the config file)
        #[arg(long)]
        bind: Option<String>,
    },
}

fn load_source(config: &Config) -> Result<Arc<dyn ContentSource>> {
    let path = config
        .content_source
        .as_ref()
        .context("No content_source configured: set it to the path of a JSON content snapshot")?;
    let repo = MemoryRepository::load(path)
        .with_context(|| format!("Failed to load content snapshot '{}'", path.display()))?;
    Ok(Arc::new(repo))
}

fn print_report(report: &RefreshReport) {
    for site in &report.sites {
        match &site.outcome {
            Ok(refresh) => println!(
                "{}: {} entries -> {}{}",
                site.site,
                refresh.entry_count,
                refresh.path.display(),
                if refresh.changed { "" } else { " (unchanged)" }
            ),
            Err(e) => println!("{}: FAILED: {e}", site.site),
        }
    }
    if let Some(index) = &report.index {
        println!("index -> {}", index.display());
    }
    println!(
        "{} site(s) refreshed, {} failed",
        report.succeeded(),
        report.failed()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config '{}'", args.config.display()))?;
    if config.sites.is_empty() {
        tracing::warn!(path = %args.config.display(), "No sites configured");
    }

    let source = load_source(&config)?;
    let bind = config.bind.clone();
    let engine = FeedEngine::new(config, source).context("Failed to create HTTP client")?;

    match args.command {
        Command::Refresh => {
            let report = engine.refresh_all().await;
            print_report(&report);
            if report.failed() > 0 && report.succeeded() == 0 {
                anyhow::bail!("Every site failed to refresh");
            }
        }
        Command::Render { site } => {
            let feed = engine.build(&site)?;
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(feed.document.body.as_bytes())
                .and_then(|()| stdout.write_all(b"\n"))
                .context("Failed to write document to stdout")?;
        }
        Command::Serve { bind: override_bind } => {
            let bind = override_bind.unwrap_or(bind);
            sitefeed::server::serve(Arc::new(engine), &bind)
                .await
                .with_context(|| format!("HTTP server on {bind} failed"))?;
        }
    }

    Ok(())
}
