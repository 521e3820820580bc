//! Session-scoped memoisation of fetched and computed tables.

use std::collections::HashMap;

use log::debug;

use crate::table::Table;

/// An operation name and its parameters.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct CacheKey {
    pub operation: &'static str,
    pub params: Vec<String>,
}

impl CacheKey {
    pub fn new(operation: &'static str, params: &[&dyn std::fmt::Display]) -> CacheKey {
        CacheKey {
            operation,
            params: params.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Entries live until the cache is cleared or dropped.
///
/// Only successful results are inserted: a failure half way through a chain
/// leaves nothing behind for that chain.
#[derive(Debug, Default)]
pub struct SessionCache {
    entries: HashMap<CacheKey, Table>,
    hits: u64,
    misses: u64,
}

impl SessionCache {
    pub fn new() -> SessionCache {
        SessionCache::default()
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<Table> {
        match self.entries.get(key) {
            Some(t) => {
                self.hits += 1;
                debug!("cache hit: {:?}", key);
                Some(t.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: CacheKey, table: Table) {
        self.entries.insert(key, table);
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&mut self) {
        debug!("clearing {} cache entries", self.entries.len());
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
