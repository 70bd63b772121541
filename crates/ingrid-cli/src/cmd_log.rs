use anyhow::{Context, Result};
use ingrid::{Config, HistoryChain, HistoryEntry, LocalCache, Stores};

pub async fn run(config: &Config, stores: Stores, limit: Option<usize>, json: bool) -> Result<()> {
    let cache_dir = config.cache_dir()?;
    let cache = LocalCache::open(&cache_dir)
        .with_context(|| format!("failed to open cache: {}", cache_dir.display()))?;
    let redo_depth = cache.record()?.redo_pointers.len().saturating_sub(1);
    let chain = HistoryChain::new(stores.history, cache);
    let entries = chain
        .lineage(limit)
        .await
        .context("failed to walk history chain")?;

    if json {
        println!("{}", serde_json::to_string(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No history recorded.");
        return Ok(());
    }
    for (i, entry) in entries.iter().enumerate() {
        println!("{}", format_entry(entry, i == 0));
    }
    if redo_depth > 0 {
        println!("({redo_depth} step(s) available to redo)");
    }
    Ok(())
}

fn format_entry(entry: &HistoryEntry, current: bool) -> String {
    let marker = if current { "*" } else { " " };
    let cursor = serde_json::to_string(&entry.cursor).unwrap_or_else(|_| "?".to_string());
    format!(
        "{marker} {}  {}  {}",
        entry.id,
        entry.created_at.format("%Y-%m-%dT%H:%M:%SZ"),
        cursor
    )
}
