//! Dedup state compaction
//!
//! Trims an oversized state file to its most recent ids, the same way the
//! relay does on its own once the window passes the cap. Useful after
//! running an older build that never trimmed the file.
//!
//! ## Usage
//!
//! ```bash
//! # Compact the file named by STATE_FILE (default: data/last_check.json)
//! cargo run --bin compact-state
//!
//! # Compact a specific file with custom limits
//! DEDUP_CAP=100 DEDUP_RETAIN=50 cargo run --bin compact-state -- /var/lib/herald/last_check.json
//! ```

use std::path::PathBuf;

use anyhow::Context;

use herald_engine::{DedupLimits, DedupStore};

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid value for {key}: {value:?}")),
        Err(_) => Ok(default),
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("STATE_FILE").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/last_check.json"));

    let limits = DedupLimits::new(env_or("DEDUP_CAP", 50)?, env_or("DEDUP_RETAIN", 25)?)?;

    let mut store = DedupStore::load(&path, limits)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    let before = store.len() + store.trimmed_on_load();
    if store.trimmed_on_load() == 0 {
        println!(
            "{}: {} ids, within cap {}; nothing to do",
            path.display(),
            before,
            limits.cap()
        );
        return Ok(());
    }

    store
        .persist()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!(
        "{}: compacted {} ids to the most recent {}",
        path.display(),
        before,
        store.len()
    );
    Ok(())
}
