//! Lock limit table
//!
//! Limits are configured per *bucket*. Every lock type maps to exactly one
//! bucket (by default its own snake_case name), and the reserved `total`
//! bucket counts every lock an owner holds.

use std::collections::HashMap;
use tracing::debug;

use super::lock::LockType;

/// Bucket that counts every lock regardless of type
pub const TOTAL_BUCKET: &str = "total";

/// Limit configuration: lock type -> bucket, bucket -> maximum count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitTable {
    buckets: HashMap<LockType, String>,
    limits: HashMap<String, u32>,
}

impl Default for LimitTable {
    fn default() -> Self {
        Self {
            buckets: LockType::ALL
                .iter()
                .map(|t| (*t, t.as_str().to_string()))
                .collect(),
            limits: HashMap::new(),
        }
    }
}

impl LimitTable {
    /// Build a table from raw configured limits.
    ///
    /// Keys are lowercased. Negative values mean "unlimited" and are dropped
    /// here so they never reach a limit check.
    pub fn from_limits<I, K>(raw: I) -> Self
    where
        I: IntoIterator<Item = (K, i64)>,
        K: AsRef<str>,
    {
        let mut table = Self::default();
        table.set_limits(raw);
        table
    }

    /// Replace all limits (same rules as [`LimitTable::from_limits`])
    pub fn set_limits<I, K>(&mut self, raw: I)
    where
        I: IntoIterator<Item = (K, i64)>,
        K: AsRef<str>,
    {
        self.limits.clear();
        for (key, value) in raw {
            let key = key.as_ref().trim().to_lowercase();
            if value < 0 {
                debug!(bucket = %key, "Negative lock limit means unlimited, dropping");
                continue;
            }
            let value = u32::try_from(value).unwrap_or(u32::MAX);
            self.limits.insert(key, value);
        }
    }

    /// Route a lock type into a bucket
    pub fn with_bucket(mut self, lock_type: LockType, bucket: impl AsRef<str>) -> Self {
        self.set_bucket(lock_type, bucket);
        self
    }

    pub fn set_bucket(&mut self, lock_type: LockType, bucket: impl AsRef<str>) {
        self.buckets
            .insert(lock_type, bucket.as_ref().trim().to_lowercase());
    }

    /// The bucket a lock type is counted in
    pub fn bucket_for(&self, lock_type: LockType) -> &str {
        self.buckets
            .get(&lock_type)
            .map(String::as_str)
            .unwrap_or_else(|| lock_type.as_str())
    }

    /// Configured limit for a bucket; `None` means unlimited
    pub fn limit_for(&self, bucket: &str) -> Option<u32> {
        self.limits.get(&bucket.to_lowercase()).copied()
    }

    /// All configured (non-negative) limits
    pub fn limits(&self) -> &HashMap<String, u32> {
        &self.limits
    }

    /// Fold per-type counts into per-bucket counts (including `total`)
    pub fn bucket_counts(&self, by_type: &HashMap<LockType, u32>) -> HashMap<String, u32> {
        let mut counts: HashMap<String, u32> = HashMap::new();
        for (lock_type, count) in by_type {
            *counts.entry(self.bucket_for(*lock_type).to_string()).or_insert(0) += count;
            *counts.entry(TOTAL_BUCKET.to_string()).or_insert(0) += count;
        }
        counts
    }

    /// The first bucket that would overflow if `owner` gained one more lock of
    /// `lock_type`, given their current per-bucket counts.
    ///
    /// `already_counted` lists buckets in which the lock under consideration is
    /// already included for this owner; those buckets cannot grow.
    pub fn exceeded_bucket(
        &self,
        lock_type: LockType,
        counts: &HashMap<String, u32>,
        already_counted: &[&str],
    ) -> Option<(String, u32)> {
        let bucket = self.bucket_for(lock_type);
        [bucket, TOTAL_BUCKET]
            .into_iter()
            .filter(|b| !already_counted.contains(b))
            .find_map(|b| {
                let limit = self.limit_for(b)?;
                let current = counts.get(b).copied().unwrap_or(0);
                (current >= limit).then(|| (b.to_string(), limit))
            })
    }
}
