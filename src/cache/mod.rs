//! Result cache for expensive aggregate facts.
//!
//! Facts are stored under `<fingerprint>_<fact>` in a shared byte store. The store
//! is an optimization only: read failures are treated as misses and write failures
//! are logged and dropped.

pub mod memory;

use crate::catalog::schema::{DatasetId, RecordId};
use crate::error::BrowseResult;
use crate::query::plan::PredicateSet;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha512};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub use memory::MemoryCache;

/// Shared key/value byte store backing the [`ResultCache`].
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> BrowseResult<Option<Vec<u8>>>;

    /// `ttl` of `None` keeps the entry until it is evicted or removed.
    fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> BrowseResult<()>;

    fn remove(&self, key: &str) -> BrowseResult<()>;
}

impl<B: CacheBackend + ?Sized> CacheBackend for Arc<B> {
    fn get(&self, key: &str) -> BrowseResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> BrowseResult<()> {
        (**self).set(key, value, ttl)
    }

    fn remove(&self, key: &str) -> BrowseResult<()> {
        (**self).remove(key)
    }
}

fn dataset_list(datasets: &[DatasetId]) -> String {
    let mut ids: Vec<DatasetId> = datasets.to_vec();
    ids.sort();
    ids.dedup();
    let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
    format!("datasets=[{}]", ids.join(","))
}

/// Hex SHA-512 of a canonical request encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Order-independent encoding of the dataset set, the canonical dataset and the
    /// predicate set.
    pub fn canonical_encoding(
        datasets: &[DatasetId],
        canonical: DatasetId,
        predicates: &PredicateSet,
    ) -> String {
        format!(
            "{};canonical={canonical};{}",
            dataset_list(datasets),
            predicates.canonical()
        )
    }

    pub fn compute(
        datasets: &[DatasetId],
        canonical: DatasetId,
        predicates: &PredicateSet,
    ) -> Self {
        Self::digest(&Self::canonical_encoding(datasets, canonical, predicates))
    }

    /// Fingerprint of a column set over the unfiltered join, for per-column facts.
    pub fn for_columns(datasets: &[DatasetId], canonical: DatasetId, columns: &[String]) -> Self {
        let mut columns: Vec<&str> = columns.iter().map(String::as_str).collect();
        columns.sort_unstable();
        columns.dedup();
        Self::digest(&format!(
            "{};canonical={canonical};columns=[{}]",
            dataset_list(datasets),
            columns.join(",")
        ))
    }

    fn digest(encoding: &str) -> Self {
        Self(hex::encode(Sha512::digest(encoding.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn key(&self, fact: Fact) -> String {
        format!("{}_{}", self.0, fact.suffix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fact {
    FilteredKeys,
    FullCount,
    FilteredCount,
    Bounds,
}

impl Fact {
    pub fn suffix(self) -> &'static str {
        match self {
            Fact::FilteredKeys => "filtered_keys",
            Fact::FullCount => "full_count",
            Fact::FilteredCount => "filtered_count",
            Fact::Bounds => "bounds",
        }
    }
}

/// How long a cache write lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryLifetime {
    /// Default request shape: never expires.
    Indefinite,
    Expiring(Duration),
}

impl EntryLifetime {
    pub fn ttl(self) -> Option<Duration> {
        match self {
            EntryLifetime::Indefinite => None,
            EntryLifetime::Expiring(ttl) => Some(ttl),
        }
    }
}

/// Aggregate facts of one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFacts {
    pub filtered_ids: Vec<RecordId>,
    pub full_count: u64,
    pub filtered_count: u64,
    /// Every fact was read from the backend.
    pub from_cache: bool,
}

pub struct ResultCache<B: CacheBackend> {
    backend: B,
}

impl<B: CacheBackend> ResultCache<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.backend.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(key, "cache miss");
                return None;
            }
            Err(err) => {
                warn!(key, error = %err, "cache read failed; recomputing");
                return None;
            }
        };
        match rmp_serde::from_slice(&bytes) {
            Ok(value) => {
                debug!(key, "cache hit");
                Some(value)
            }
            Err(err) => {
                warn!(key, error = %err, "undecodable cache entry; recomputing");
                None
            }
        }
    }

    fn write<T: Serialize>(&self, key: &str, value: &T, lifetime: EntryLifetime) {
        let bytes = match rmp_serde::to_vec(value) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(key, error = %err, "cache entry not encodable");
                return;
            }
        };
        if let Err(err) = self.backend.set(key, bytes, lifetime.ttl()) {
            warn!(key, error = %err, "cache write failed");
        }
    }

    /// Filtered key list, unfiltered count and filtered count of `fingerprint`.
    ///
    /// The key list is read first. When it is missing all three facts are recomputed
    /// and overwritten, whatever counts the backend still holds. With no active
    /// predicates the filtered count is the unfiltered count; otherwise it is the
    /// length of the key list.
    pub fn facts<I, C>(
        &self,
        fingerprint: &Fingerprint,
        filtered: bool,
        lifetime: EntryLifetime,
        filtered_ids: I,
        full_count: C,
    ) -> BrowseResult<CachedFacts>
    where
        I: FnOnce() -> BrowseResult<Vec<RecordId>>,
        C: FnOnce() -> BrowseResult<u64>,
    {
        let keys_key = fingerprint.key(Fact::FilteredKeys);
        let full_key = fingerprint.key(Fact::FullCount);
        let filtered_key = fingerprint.key(Fact::FilteredCount);

        let Some(ids) = self.read::<Vec<RecordId>>(&keys_key) else {
            let ids = filtered_ids()?;
            let full = full_count()?;
            let count = if filtered { ids.len() as u64 } else { full };
            self.write(&keys_key, &ids, lifetime);
            self.write(&full_key, &full, lifetime);
            self.write(&filtered_key, &count, lifetime);
            return Ok(CachedFacts {
                filtered_ids: ids,
                full_count: full,
                filtered_count: count,
                from_cache: false,
            });
        };

        let mut from_cache = true;
        let full = match self.read::<u64>(&full_key) {
            Some(full) => full,
            None => {
                from_cache = false;
                let full = full_count()?;
                self.write(&full_key, &full, lifetime);
                full
            }
        };
        let expected = if filtered { ids.len() as u64 } else { full };
        match self.read::<u64>(&filtered_key) {
            Some(count) if count == expected => {}
            Some(count) => {
                from_cache = false;
                warn!(
                    fingerprint = fingerprint.as_str(),
                    cached = count,
                    actual = expected,
                    "stale filtered count in cache"
                );
                self.write(&filtered_key, &expected, lifetime);
            }
            None => {
                from_cache = false;
                self.write(&filtered_key, &expected, lifetime);
            }
        }
        Ok(CachedFacts {
            filtered_ids: ids,
            full_count: full,
            filtered_count: expected,
            from_cache,
        })
    }

    /// Reads `fact` of `fingerprint`, computing and storing it on a miss.
    pub fn memoize<T, F>(
        &self,
        fingerprint: &Fingerprint,
        fact: Fact,
        lifetime: EntryLifetime,
        compute: F,
    ) -> BrowseResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> BrowseResult<T>,
    {
        let key = fingerprint.key(fact);
        if let Some(value) = self.read(&key) {
            return Ok(value);
        }
        let value = compute()?;
        self.write(&key, &value, lifetime);
        Ok(value)
    }

    pub fn invalidate(&self, fingerprint: &Fingerprint) {
        for fact in [
            Fact::FilteredKeys,
            Fact::FullCount,
            Fact::FilteredCount,
            Fact::Bounds,
        ] {
            let key = fingerprint.key(fact);
            if let Err(err) = self.backend.remove(&key) {
                warn!(key = key.as_str(), error = %err, "cache remove failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BrowseError;
    use crate::query::plan::{ColumnTarget, Predicate};
    use proptest::prelude::*;
    use std::cell::Cell;

    struct FailingBackend;

    impl CacheBackend for FailingBackend {
        fn get(&self, _key: &str) -> BrowseResult<Option<Vec<u8>>> {
            Err(BrowseError::unavailable("cache down"))
        }
        fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> BrowseResult<()> {
            Err(BrowseError::unavailable("cache down"))
        }
        fn remove(&self, _key: &str) -> BrowseResult<()> {
            Err(BrowseError::unavailable("cache down"))
        }
    }

    fn contains(needle: &str) -> Predicate {
        Predicate::Contains {
            position: 0,
            target: ColumnTarget::Key,
            needle: needle.into(),
        }
    }

    fn fingerprint() -> Fingerprint {
        Fingerprint::compute(
            &[DatasetId(1)],
            DatasetId(1),
            &PredicateSet::all(vec![contains("ch")]),
        )
    }

    #[test]
    fn fingerprint_is_hex_sha512() {
        let fp = fingerprint();
        assert_eq!(fp.as_str().len(), 128);
        assert!(fp.key(Fact::FullCount).ends_with("_full_count"));
        let other = PredicateSet::all(vec![contains("ch")]);
        assert_ne!(fp, Fingerprint::compute(&[DatasetId(2)], DatasetId(2), &other));
        let joined = Fingerprint::compute(&[DatasetId(1), DatasetId(2)], DatasetId(1), &other);
        let flipped = Fingerprint::compute(&[DatasetId(2), DatasetId(1)], DatasetId(2), &other);
        assert_ne!(joined, flipped);
        assert_ne!(
            Fingerprint::for_columns(&[DatasetId(1)], DatasetId(1), &["a__x".to_string()]),
            Fingerprint::for_columns(&[DatasetId(1)], DatasetId(1), &["a__y".to_string()])
        );
    }

    #[test]
    fn second_read_is_served_from_cache() {
        let cache = ResultCache::new(MemoryCache::new(64));
        let fp = fingerprint();
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok(vec![RecordId(3), RecordId(1)])
        };
        let life = EntryLifetime::Expiring(Duration::from_secs(60));
        let first = cache.facts(&fp, true, life, compute, || Ok(10)).unwrap();
        let second = cache.facts(&fp, true, life, compute, || Ok(10)).unwrap();
        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(calls.get(), 1);
        assert_eq!(second.filtered_count, 2);
        assert_eq!(second.full_count, 10);
        assert_eq!(first.filtered_ids, second.filtered_ids);
    }

    #[test]
    fn missing_key_list_recomputes_everything() {
        let cache = ResultCache::new(MemoryCache::new(64));
        let fp = fingerprint();
        cache
            .backend()
            .set(
                &fp.key(Fact::FilteredCount),
                rmp_serde::to_vec(&999u64).unwrap(),
                None,
            )
            .unwrap();
        let facts = cache
            .facts(
                &fp,
                true,
                EntryLifetime::Indefinite,
                || Ok(vec![RecordId(7)]),
                || Ok(5),
            )
            .unwrap();
        assert_eq!(facts.filtered_count, 1);
        let stored: u64 = rmp_serde::from_slice(
            &cache
                .backend()
                .get(&fp.key(Fact::FilteredCount))
                .unwrap()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(stored, 1);
    }

    #[test]
    fn stale_filtered_count_loses_to_key_list() {
        let cache = ResultCache::new(MemoryCache::new(64));
        let fp = fingerprint();
        let life = EntryLifetime::Indefinite;
        cache
            .facts(&fp, true, life, || Ok(vec![RecordId(1), RecordId(2)]), || Ok(9))
            .unwrap();
        cache
            .backend()
            .set(
                &fp.key(Fact::FilteredCount),
                rmp_serde::to_vec(&40u64).unwrap(),
                None,
            )
            .unwrap();
        let facts = cache
            .facts(&fp, true, life, || unreachable!(), || unreachable!())
            .unwrap();
        assert_eq!(facts.filtered_count, 2);
        assert!(!facts.from_cache);
    }

    #[test]
    fn unavailable_backend_falls_back_to_storage() {
        let cache = ResultCache::new(FailingBackend);
        let facts = cache
            .facts(
                &fingerprint(),
                false,
                EntryLifetime::Indefinite,
                || Ok(vec![RecordId(1)]),
                || Ok(1),
            )
            .unwrap();
        assert_eq!(facts.filtered_count, 1);
        let bounds: u64 = cache
            .memoize(&fingerprint(), Fact::Bounds, EntryLifetime::Indefinite, || Ok(4))
            .unwrap();
        assert_eq!(bounds, 4);
        cache.invalidate(&fingerprint());
    }

    proptest! {
        #[test]
        fn fingerprint_ignores_input_order(
            needles in prop::collection::vec("[a-z|;]{0,6}", 1..6),
            datasets in prop::collection::vec(1u32..20, 1..5),
        ) {
            let forward: Vec<Predicate> = needles.iter().map(|n| contains(n)).collect();
            let mut backward = forward.clone();
            backward.reverse();
            let ids: Vec<DatasetId> = datasets.iter().copied().map(DatasetId).collect();
            let reversed_ids: Vec<DatasetId> = ids.iter().rev().copied().collect();
            let canonical = ids[0];
            prop_assert_eq!(
                Fingerprint::compute(&ids, canonical, &PredicateSet::any(forward)),
                Fingerprint::compute(&reversed_ids, canonical, &PredicateSet::any(backward))
            );
        }
    }
}
