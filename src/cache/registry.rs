//! Bidirectional tag index.
//!
//! Tracks which fingerprints provide which tags, so a mutation can find every
//! cache entry it invalidates and an evicted entry can drop its links.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::keys::{Fingerprint, Tag};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::registry";

/// Tracks tag → fingerprints and fingerprint → tags mappings.
///
/// The fingerprint → tags side stores the *indexed* set, i.e. the provided
/// tags plus the bare form of each `Type:id` tag, so unregistering removes
/// exactly the links that registering added.
pub struct TagIndex {
    tag_to_keys: RwLock<HashMap<Tag, HashSet<Fingerprint>>>,
    key_to_tags: RwLock<HashMap<Fingerprint, HashSet<Tag>>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self {
            tag_to_keys: RwLock::new(HashMap::new()),
            key_to_tags: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the tag set a fingerprint provides.
    ///
    /// Links to tags that are no longer provided are removed before the new
    /// links are added.
    pub(crate) fn register(&self, fingerprint: &Fingerprint, provided: &HashSet<Tag>) {
        let indexed = indexed_tags(provided);

        let mut t2k = rw_write(&self.tag_to_keys, SOURCE, "register.tag_to_keys");
        let mut k2t = rw_write(&self.key_to_tags, SOURCE, "register.key_to_tags");

        if let Some(previous) = k2t.remove(fingerprint) {
            for tag in previous.difference(&indexed) {
                unlink(&mut t2k, tag, fingerprint);
            }
        }

        if indexed.is_empty() {
            return;
        }

        for tag in &indexed {
            t2k.entry(tag.clone())
                .or_default()
                .insert(fingerprint.clone());
        }
        k2t.insert(fingerprint.clone(), indexed);
    }

    /// Drop every link for a fingerprint.
    pub(crate) fn unregister(&self, fingerprint: &Fingerprint) {
        let mut t2k = rw_write(&self.tag_to_keys, SOURCE, "unregister.tag_to_keys");
        let mut k2t = rw_write(&self.key_to_tags, SOURCE, "unregister.key_to_tags");

        if let Some(tags) = k2t.remove(fingerprint) {
            for tag in &tags {
                unlink(&mut t2k, tag, fingerprint);
            }
        }
    }

    /// Fingerprints currently linked to a single tag.
    pub fn fingerprints_for(&self, tag: &Tag) -> HashSet<Fingerprint> {
        rw_read(&self.tag_to_keys, SOURCE, "fingerprints_for")
            .get(tag)
            .cloned()
            .unwrap_or_default()
    }

    /// Union of the fingerprints linked to any of `tags`.
    pub fn resolve<'a, I>(&self, tags: I) -> HashSet<Fingerprint>
    where
        I: IntoIterator<Item = &'a Tag>,
    {
        let t2k = rw_read(&self.tag_to_keys, SOURCE, "resolve");
        let mut affected = HashSet::new();
        for tag in tags {
            if let Some(keys) = t2k.get(tag) {
                affected.extend(keys.iter().cloned());
            }
        }
        affected
    }

    /// Indexed tags for a fingerprint (provided tags plus bare forms).
    pub fn tags_for(&self, fingerprint: &Fingerprint) -> HashSet<Tag> {
        rw_read(&self.key_to_tags, SOURCE, "tags_for")
            .get(fingerprint)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of distinct tags with at least one fingerprint.
    pub fn tag_count(&self) -> usize {
        rw_read(&self.tag_to_keys, SOURCE, "tag_count").len()
    }

    /// Number of fingerprints with at least one tag.
    pub fn key_count(&self) -> usize {
        rw_read(&self.key_to_tags, SOURCE, "key_count").len()
    }
}

impl Default for TagIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn indexed_tags(provided: &HashSet<Tag>) -> HashSet<Tag> {
    let mut indexed = provided.clone();
    for tag in provided {
        if !tag.is_bare() {
            indexed.insert(tag.bare());
        }
    }
    indexed
}

fn unlink(t2k: &mut HashMap<Tag, HashSet<Fingerprint>>, tag: &Tag, fingerprint: &Fingerprint) {
    if let Some(keys) = t2k.get_mut(tag) {
        keys.remove(fingerprint);
        if keys.is_empty() {
            t2k.remove(tag);
        }
    }
}
