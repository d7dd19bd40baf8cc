//! Expiring cooldown table. Entries are dropped lazily when read.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct CooldownTable<K> {
    until: HashMap<K, u64>,
}

impl<K> Default for CooldownTable<K> {
    fn default() -> Self {
        Self {
            until: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> CooldownTable<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts `key` on cooldown until `now + duration_ms`.
    pub fn mark(&mut self, key: K, now: u64, duration_ms: u64) {
        self.until.insert(key, now.saturating_add(duration_ms));
    }

    /// True while `key` is cooling down; expired entries are removed.
    pub fn is_cooling(&mut self, key: &K, now: u64) -> bool {
        match self.until.get(key) {
            Some(&until) if now < until => true,
            Some(_) => {
                self.until.remove(key);
                false
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.until.len()
    }

    pub fn is_empty(&self) -> bool {
        self.until.is_empty()
    }

    pub fn clear(&mut self) {
        self.until.clear();
    }
}
