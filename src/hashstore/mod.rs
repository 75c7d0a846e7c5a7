//! Hash-dedup store (C11).
//!
//! A process-wide set of 64-bit content-hash prefixes (see
//! [`crate::dedup::content_hash_u64`]), partitioned one JSON file per
//! calendar month so the working set stays small and old partitions can
//! be dropped wholesale once they age out — grounded on the teacher's
//! plain serde_json-to-disk persistence style for cache/config files
//! rather than a database table, since this store only ever needs
//! "have I seen this hash" and never a join or a range scan.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Duration, Local};
use tracing::{debug, info, warn};

use crate::error::HarvesterError;

/// How long a partition is kept before it's eligible for eviction.
pub const TTL_DAYS: i64 = 60;

fn partition_key(when: DateTime<Local>) -> String {
    format!("{:04}-{:02}", when.year(), when.month())
}

fn partition_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("dedup-{key}.json"))
}

/// Parses a `"YYYY-MM"` partition key back into year/month, for age
/// comparisons during eviction.
fn parse_partition_key(key: &str) -> Option<(i32, u32)> {
    let (year, month) = key.split_once('-')?;
    Some((year.parse().ok()?, month.parse().ok()?))
}

fn previous_partition_key(key: &str) -> Option<String> {
    let (year, month) = parse_partition_key(key)?;
    let (prev_year, prev_month) = if month == 1 { (year - 1, 12) } else { (year, month - 1) };
    Some(format!("{prev_year:04}-{prev_month:02}"))
}

/// The process-wide hash-dedup store.
pub struct HashStore {
    dir: PathBuf,
    partitions: HashMap<String, HashSet<u64>>,
}

impl HashStore {
    /// Open (creating if absent) the store rooted at `dir`, loading every
    /// partition file found there and evicting any older than
    /// [`TTL_DAYS`].
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, HarvesterError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut partitions = HashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(key) = file_name.strip_prefix("dedup-").and_then(|s| s.strip_suffix(".json")) else {
                continue;
            };
            let contents = std::fs::read_to_string(&path)?;
            let hashes: Vec<u64> = serde_json::from_str(&contents)?;
            debug!(partition = key, count = hashes.len(), "loaded hash-dedup partition");
            partitions.insert(key.to_string(), hashes.into_iter().collect());
        }

        let mut store = Self { dir, partitions };
        store.evict_expired(Local::now())?;
        Ok(store)
    }

    /// Whether `hash` has been seen before, checked against the
    /// partition for `as_of`'s month and the prior month — a message
    /// ingested right at a month boundary can be re-observed a few
    /// seconds later under the next month's partition.
    pub fn contains(&self, hash: u64, as_of: DateTime<Local>) -> bool {
        let current = partition_key(as_of);
        if self.partitions.get(&current).is_some_and(|set| set.contains(&hash)) {
            return true;
        }
        match previous_partition_key(&current) {
            Some(previous) => self.partitions.get(&previous).is_some_and(|set| set.contains(&hash)),
            None => false,
        }
    }

    /// Record `hash` as seen as of `as_of`, flushing its partition to
    /// disk immediately (no batched writes — a crash between insert and
    /// flush would silently reopen the dedup window).
    pub fn insert(&mut self, hash: u64, as_of: DateTime<Local>) -> Result<(), HarvesterError> {
        let key = partition_key(as_of);
        let set = self.partitions.entry(key.clone()).or_default();
        set.insert(hash);
        self.flush_partition(&key)
    }

    fn flush_partition(&self, key: &str) -> Result<(), HarvesterError> {
        let Some(set) = self.partitions.get(key) else {
            return Ok(());
        };
        let mut hashes: Vec<u64> = set.iter().copied().collect();
        hashes.sort_unstable();
        let json = serde_json::to_string(&hashes)?;
        std::fs::write(partition_path(&self.dir, key), json)?;
        Ok(())
    }

    /// Delete partitions whose entire month is older than [`TTL_DAYS`]
    /// relative to `now`. Called at startup and exposed to the CLI's
    /// `hash-store gc` subcommand for a manual trigger between restarts.
    pub fn evict_expired(&mut self, now: DateTime<Local>) -> Result<(), HarvesterError> {
        let cutoff = now - Duration::days(TTL_DAYS);
        let cutoff_key = partition_key(cutoff);
        let Some((cutoff_year, cutoff_month)) = parse_partition_key(&cutoff_key) else {
            return Ok(());
        };

        let expired: Vec<String> = self
            .partitions
            .keys()
            .filter(|key| {
                parse_partition_key(key)
                    .is_some_and(|(year, month)| (year, month) < (cutoff_year, cutoff_month))
            })
            .cloned()
            .collect();

        for key in expired {
            self.partitions.remove(&key);
            let path = partition_path(&self.dir, &key);
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
            info!(partition = key, "evicted expired hash-dedup partition");
        }
        Ok(())
    }

    /// Total number of distinct hashes currently held across all
    /// partitions, for diagnostics (`hash-store gc` reports this).
    pub fn total_count(&self) -> usize {
        self.partitions.values().map(|set| set.len()).sum()
    }
}

impl Drop for HashStore {
    fn drop(&mut self) {
        for key in self.partitions.keys().cloned().collect::<Vec<_>>() {
            if let Err(err) = self.flush_partition(&key) {
                warn!(partition = key, error = %err, "failed to flush hash-dedup partition on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn local(year: i32, month: u32, day: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn insert_then_contains_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = HashStore::open(dir.path()).unwrap();
        let now = local(2026, 7, 27);
        assert!(!store.contains(42, now));
        store.insert(42, now).unwrap();
        assert!(store.contains(42, now));
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let now = local(2026, 7, 27);
        {
            let mut store = HashStore::open(dir.path()).unwrap();
            store.insert(7, now).unwrap();
        }
        let store = HashStore::open(dir.path()).unwrap();
        assert!(store.contains(7, now));
    }

    #[test]
    fn evicts_partitions_older_than_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let old = local(2026, 1, 1);
        let now = local(2026, 7, 27);
        {
            let mut store = HashStore::open(dir.path()).unwrap();
            store.insert(1, old).unwrap();
            store.evict_expired(now).unwrap();
        }
        let store = HashStore::open(dir.path()).unwrap();
        assert!(!store.contains(1, old));
        assert_eq!(store.total_count(), 0);
    }

    #[test]
    fn recent_partition_survives_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let now = local(2026, 7, 27);
        let mut store = HashStore::open(dir.path()).unwrap();
        store.insert(99, now).unwrap();
        store.evict_expired(now).unwrap();
        assert!(store.contains(99, now));
    }
}
