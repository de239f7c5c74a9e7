//! Bidirectional tag registry.
//!
//! Tracks which cache keys carry which tags, so a tag can be invalidated in
//! time proportional to the number of keys it covers. Each tag also carries
//! an epoch that advances on every invalidation; a payload computed under an
//! older epoch must not be published.

use std::collections::{HashMap, HashSet};

use super::keys::{CacheKey, CacheTag};

/// Tag epochs observed when a computation started.
pub type EpochSnapshot = Vec<(CacheTag, u64)>;

#[derive(Debug, Default)]
struct TagIndex {
    epoch: u64,
    keys: HashSet<CacheKey>,
}

/// Tracks tag → keys and key → tags mappings.
///
/// The registry is not synchronized on its own: the owning store keeps it
/// behind the same lock as the entries so that removals and index updates
/// are observed together.
#[derive(Debug, Default)]
pub struct TagRegistry {
    tag_to_keys: HashMap<CacheTag, TagIndex>,
    key_to_tags: HashMap<CacheKey, HashSet<CacheTag>>,
}

impl TagRegistry {
    /// Record the current epoch of each tag.
    pub fn snapshot(&self, tags: &[CacheTag]) -> EpochSnapshot {
        tags.iter().map(|tag| (*tag, self.epoch(*tag))).collect()
    }

    /// True when no tag in the snapshot has been invalidated since it was taken.
    pub fn is_current(&self, snapshot: &[(CacheTag, u64)]) -> bool {
        snapshot
            .iter()
            .all(|(tag, epoch)| self.epoch(*tag) == *epoch)
    }

    pub fn epoch(&self, tag: CacheTag) -> u64 {
        self.tag_to_keys.get(&tag).map_or(0, |index| index.epoch)
    }

    /// Associate a key with its tags, replacing any previous association.
    pub fn register(&mut self, key: CacheKey, tags: &[CacheTag]) {
        self.unregister(&key);

        for tag in tags {
            self.tag_to_keys
                .entry(*tag)
                .or_default()
                .keys
                .insert(key.clone());
        }
        self.key_to_tags
            .insert(key, tags.iter().copied().collect());
    }

    /// Remove a key from every tag that references it.
    pub fn unregister(&mut self, key: &CacheKey) {
        if let Some(tags) = self.key_to_tags.remove(key) {
            for tag in tags {
                if let Some(index) = self.tag_to_keys.get_mut(&tag) {
                    index.keys.remove(key);
                }
            }
        }
    }

    /// Advance the tag's epoch and detach every key it covers.
    ///
    /// Returns the detached keys. Keys that also carry other tags are removed
    /// from those tags too, since the caller evicts the entries.
    pub fn take_tag(&mut self, tag: CacheTag) -> HashSet<CacheKey> {
        let index = self.tag_to_keys.entry(tag).or_default();
        index.epoch += 1;
        let keys = std::mem::take(&mut index.keys);

        for key in &keys {
            let Some(tags) = self.key_to_tags.remove(key) else {
                continue;
            };
            for other in tags.into_iter().filter(|other| *other != tag) {
                if let Some(index) = self.tag_to_keys.get_mut(&other) {
                    index.keys.remove(key);
                }
            }
        }

        keys
    }

    /// Number of keys currently carrying the tag.
    pub fn tag_len(&self, tag: CacheTag) -> usize {
        self.tag_to_keys.get(&tag).map_or(0, |index| index.keys.len())
    }

    #[cfg(test)]
    pub fn key_count(&self) -> usize {
        self.key_to_tags.len()
    }
}
