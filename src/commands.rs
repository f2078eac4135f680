use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wikigraph::ui::{self, Icons};
use wikigraph::watcher::{EventBridge, PageWatcher, event_channel};
use wikigraph::{ReferenceEngine, config};

pub fn run_init(
    config_path: &Path,
    pages: &Path,
    workdir: Option<PathBuf>,
    force: bool,
) -> anyhow::Result<()> {
    let workdir = workdir.unwrap_or_else(|| config::default_workdir_in(Path::new(".")));

    let cfg = config::WikigraphConfig {
        pages: Some(pages.display().to_string()),
        workdir: Some(workdir.display().to_string()),
        match_english_plurals: Some(true),
    };
    config::write_config(config_path, &cfg, force)?;
    std::fs::create_dir_all(pages)?;
    config::ensure_workdir(&workdir)?;
    config::ensure_gitignore(Path::new("."))?;

    ui::success(&format!("Wrote {}", config_path.display()));
    ui::info("Pages", &pages.display().to_string());
    ui::info("Work dir", &workdir.display().to_string());
    Ok(())
}

pub fn run_rebuild(engine: &ReferenceEngine) -> anyhow::Result<()> {
    let spinner = ui::Spinner::new("Rebuilding reference graph...");
    engine.rebuild()?;
    spinner.finish_with_message("Done");

    print_stats(engine)
}

pub fn run_backlinks(engine: &ReferenceEngine, page: &str) -> anyhow::Result<()> {
    match engine.find_referrers(page)? {
        Some(referrers) => {
            ui::section(&format!("Pages linking to {}", page.bold()));
            for referrer in &referrers {
                ui::item(Icons::LINK, referrer);
            }
            println!("{}", ui::muted(&format!("{} total", referrers.len())));
        }
        None => println!("∅ Nothing links to {}.", page),
    }
    Ok(())
}

pub fn run_links(engine: &ReferenceEngine, page: &str) -> anyhow::Result<()> {
    match engine.find_refers_to(page)? {
        Some(targets) => {
            ui::section(&format!("Pages {} links to", page.bold()));
            for target in &targets {
                ui::item(Icons::FILE, target);
            }
        }
        None => println!("∅ {} has no outgoing links.", page),
    }
    Ok(())
}

pub fn run_orphans(engine: &ReferenceEngine) -> anyhow::Result<()> {
    let orphans = engine.find_unreferenced()?;
    if orphans.is_empty() {
        ui::success("No orphaned pages.");
        return Ok(());
    }
    ui::section("Orphaned pages (nothing links to them)");
    for name in &orphans {
        ui::item(Icons::EYE, name);
    }
    println!("{}", ui::muted(&format!("{} total", orphans.len())));
    Ok(())
}

pub fn run_uncreated(engine: &ReferenceEngine) -> anyhow::Result<()> {
    let uncreated = engine.find_uncreated()?;
    if uncreated.is_empty() {
        ui::success("No broken links.");
        return Ok(());
    }
    ui::section("Linked but uncreated");
    for name in &uncreated {
        ui::item(Icons::BROKEN, name);
    }
    println!("{}", ui::muted(&format!("{} total", uncreated.len())));
    Ok(())
}

pub fn run_pages(engine: &ReferenceEngine) -> anyhow::Result<()> {
    let created = engine.find_created()?;
    ui::section("Known pages");
    for name in &created {
        ui::item(Icons::FILE, name);
    }
    println!("{}", ui::muted(&format!("{} total", created.len())));
    Ok(())
}

pub fn run_stats(engine: &ReferenceEngine) -> anyhow::Result<()> {
    print_stats(engine)
}

fn print_stats(engine: &ReferenceEngine) -> anyhow::Result<()> {
    let stats = engine.stats()?;
    let rows = [
        ("Pages", stats.pages.to_string()),
        ("Links", stats.links.to_string()),
        ("Link targets", stats.targets.to_string()),
        ("Orphans", engine.find_unreferenced()?.len().to_string()),
        ("Broken links", engine.find_uncreated()?.len().to_string()),
        ("Deep hash", format!("{:016x}", engine.deep_hash()?)),
    ];
    println!("{} Reference graph", Icons::STATS);
    println!("{}", ui::stats_table(&rows));
    Ok(())
}

pub fn run_attr(
    engine: &ReferenceEngine,
    page: &str,
    key: Option<&str>,
    set: Option<&str>,
) -> anyhow::Result<()> {
    match (key, set) {
        (Some(key), Some(value)) => {
            engine.set_page_attribute(page, key, value)?;
            ui::success(&format!("{}.{} = {}", page, key, value));
        }
        (Some(key), None) => match engine.get_page_attribute(page, key) {
            Some(value) => println!("{}", value),
            None => println!("∅ {} has no attribute {:?}.", page, key),
        },
        (None, _) => {
            let attrs = engine.page_attributes(page);
            if attrs.is_empty() {
                println!("∅ {} has no attributes.", page);
            } else {
                for (key, value) in attrs {
                    println!("{} = {}", key.style(ui::theme().dim.clone()), value);
                }
            }
        }
    }
    Ok(())
}

pub fn run_watch(engine: Arc<ReferenceEngine>, pages_dir: PathBuf) -> anyhow::Result<()> {
    let (tx, rx) = event_channel();

    let bridge_engine = engine.clone();
    std::thread::spawn(move || {
        EventBridge::new(bridge_engine, rx).run();
    });

    PageWatcher::new(pages_dir, tx).run()
}
