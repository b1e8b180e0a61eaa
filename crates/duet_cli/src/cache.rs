//! `duet cache`: inspection and cleanup of the artifact cache.

use duet_cache::{DiskStore, StoreStats};

use crate::project::resolve_project;
use crate::{CacheCommand, GlobalArgs};

/// Runs a `duet cache` subcommand.
pub fn run(command: &CacheCommand, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = resolve_project(global)?;
    let store = DiskStore::new(project.path(&project.config.cache.path));

    match command {
        CacheCommand::Stats => {
            let stats = store.stats()?;
            println!("{}", render_stats(&store, &stats));
        }
        CacheCommand::Clean => {
            store.clear()?;
            if !global.quiet {
                eprintln!("  Removed cached artifacts in {}", store.root().display());
            }
        }
    }
    Ok(0)
}

fn render_stats(store: &DiskStore, stats: &StoreStats) -> String {
    format!(
        "cache: {}\nentries: {}\ncontent files: {}\nsize: {} bytes",
        store.root().display(),
        stats.entries,
        stats.content_files,
        stats.bytes
    )
}
