//! Wikigraph CLI - reference-graph reports for a file-backed wiki

mod commands;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use wikigraph::engine::EngineConfig;
use wikigraph::{DefaultResolver, FilePageProvider, ReferenceEngine, WikiLinkExtractor, config, ui};

#[derive(Parser)]
#[command(name = "wikigraph")]
#[command(version = "0.0.1")]
#[command(about = "Wiki reference graph engine - backlinks, orphans and broken-link reports")]
#[command(long_about = r#"
Wikigraph tracks which wiki pages link where, enabling:
  • "What links here" backlink lookups
  • Orphaned-page reports (nothing links to them)
  • Broken-link reports (linked but never created)
  • Live updates from a watched page directory

Example usage:
  wikigraph init --pages ./pages
  wikigraph backlinks --page "Main page"
  wikigraph orphans
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write wikigraph.toml and create the page/work directories
    Init {
        /// Directory holding the page files
        #[arg(long, default_value = "pages")]
        pages: PathBuf,

        /// Working directory for snapshot and cache files
        #[arg(long)]
        workdir: Option<PathBuf>,

        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Force a full rebuild of the reference graph
    Rebuild,

    /// Show the pages linking to a page ("what links here")
    Backlinks {
        /// Page name
        #[arg(short, long)]
        page: String,
    },

    /// Show the pages a page links to
    Links {
        /// Page name
        #[arg(short, long)]
        page: String,
    },

    /// List pages nothing links to
    Orphans,

    /// List link targets that are not created pages
    Uncreated,

    /// List all known pages
    Pages,

    /// Read or write a page attribute
    Attr {
        /// Page name
        #[arg(short, long)]
        page: String,

        /// Attribute key (omit to list all)
        #[arg(short, long)]
        key: Option<String>,

        /// Value to store under the key
        #[arg(short, long)]
        set: Option<String>,
    },

    /// Show reference graph statistics
    Stats,

    /// Watch the page directory and keep the graph current
    Watch,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Init {
            pages,
            workdir,
            force,
        } => {
            let config_path = cli
                .config
                .unwrap_or_else(config::default_config_path);
            commands::run_init(&config_path, &pages, workdir, force)
        }

        Commands::Rebuild => {
            let (engine, _) = open_engine(cli.config.as_deref())?;
            commands::run_rebuild(&engine)
        }

        Commands::Backlinks { page } => {
            let (engine, _) = open_engine(cli.config.as_deref())?;
            commands::run_backlinks(&engine, &page)
        }

        Commands::Links { page } => {
            let (engine, _) = open_engine(cli.config.as_deref())?;
            commands::run_links(&engine, &page)
        }

        Commands::Orphans => {
            let (engine, _) = open_engine(cli.config.as_deref())?;
            commands::run_orphans(&engine)
        }

        Commands::Uncreated => {
            let (engine, _) = open_engine(cli.config.as_deref())?;
            commands::run_uncreated(&engine)
        }

        Commands::Pages => {
            let (engine, _) = open_engine(cli.config.as_deref())?;
            commands::run_pages(&engine)
        }

        Commands::Attr { page, key, set } => {
            let (engine, _) = open_engine(cli.config.as_deref())?;
            commands::run_attr(&engine, &page, key.as_deref(), set.as_deref())
        }

        Commands::Stats => {
            let (engine, _) = open_engine(cli.config.as_deref())?;
            commands::run_stats(&engine)
        }

        Commands::Watch => {
            let (engine, pages_dir) = open_engine(cli.config.as_deref())?;
            commands::run_watch(engine, pages_dir)
        }
    }
}

/// Wire the engine from config and bring the graph up.
fn open_engine(config_path: Option<&Path>) -> anyhow::Result<(Arc<ReferenceEngine>, PathBuf)> {
    let cfg = config::load_config(config_path)?.unwrap_or_default();

    let pages_dir = PathBuf::from(cfg.pages.unwrap_or_else(|| "pages".to_string()));
    anyhow::ensure!(
        pages_dir.is_dir(),
        "pages directory {} does not exist (run `wikigraph init` first)",
        pages_dir.display()
    );
    let workdir = cfg
        .workdir
        .map(PathBuf::from)
        .unwrap_or_else(|| config::default_workdir_in(Path::new(".")));
    config::ensure_workdir(&workdir)?;

    let engine = Arc::new(ReferenceEngine::new(
        Arc::new(FilePageProvider::new(&pages_dir)),
        Arc::new(WikiLinkExtractor::new()),
        Arc::new(DefaultResolver),
        EngineConfig {
            work_dir: workdir,
            match_english_plurals: cfg.match_english_plurals.unwrap_or(true),
        },
    ));

    let spinner = ui::Spinner::new("Loading reference graph...");
    engine.initialize()?;
    spinner.finish_with_message("Graph ready");

    Ok((engine, pages_dir))
}
