//! Invalidation planning.
//!
//! Turns the tags a mutation invalidates into the concrete set of cache
//! entries to refetch or to mark stale.

use std::collections::BTreeSet;
use std::fmt;

use super::keys::{Fingerprint, Tag};
use super::store::CacheStore;

/// Actions to run after a successful mutation.
///
/// Entries someone is watching are refetched; entries nobody watches are
/// only marked stale so the next query fetches them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InvalidationPlan {
    pub tags: BTreeSet<Tag>,
    pub refetch: BTreeSet<Fingerprint>,
    pub mark_stale: BTreeSet<Fingerprint>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<String> = self.tags.iter().map(Tag::to_string).collect();
        write!(
            f,
            "InvalidationPlan {{ tags: [{}], refetch: {}, mark_stale: {} }}",
            tags.join(", "),
            self.refetch.len(),
            self.mark_stale.len(),
        )
    }
}

impl InvalidationPlan {
    /// Resolve tags through the store's tag index and split the affected
    /// entries by whether they currently have subscribers.
    pub fn build<'a, I>(store: &CacheStore, tags: I) -> Self
    where
        I: IntoIterator<Item = &'a Tag>,
    {
        let tags: BTreeSet<Tag> = tags.into_iter().cloned().collect();
        let mut plan = Self {
            tags,
            ..Self::default()
        };

        for fingerprint in store.tag_index().resolve(&plan.tags) {
            if store.subscriber_count(&fingerprint) > 0 {
                plan.refetch.insert(fingerprint);
            } else {
                plan.mark_stale.insert(fingerprint);
            }
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.refetch.is_empty() && self.mark_stale.is_empty()
    }

    pub fn affected(&self) -> usize {
        self.refetch.len() + self.mark_stale.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::cache::registry::TagIndex;

    fn fp(name: &str, args: serde_json::Value) -> Fingerprint {
        Fingerprint::from_value(name, &args)
    }

    fn provide(store: &CacheStore, fingerprint: &Fingerprint, tags: &[Tag]) {
        let tags: HashSet<Tag> = tags.iter().cloned().collect();
        store.put(fingerprint, Arc::new(()), tags);
    }

    #[test]
    fn splits_by_subscription() {
        let store = CacheStore::new(Arc::new(TagIndex::new()));
        let list = fp("fetchEvents", json!(null));
        let other = fp("fetchEvents", json!({ "month": 3 }));
        provide(&store, &list, &[Tag::kind("Event")]);
        provide(&store, &other, &[Tag::kind("Event")]);
        store.retain(&list);

        let plan = InvalidationPlan::build(&store, &[Tag::kind("Event")]);

        assert_eq!(plan.refetch.iter().collect::<Vec<_>>(), vec![&list]);
        assert_eq!(plan.mark_stale.iter().collect::<Vec<_>>(), vec![&other]);
        assert_eq!(plan.affected(), 2);
    }

    #[test]
    fn unknown_tags_produce_empty_plan() {
        let store = CacheStore::new(Arc::new(TagIndex::new()));
        let plan = InvalidationPlan::build(&store, &[Tag::kind("Ticket")]);
        assert!(plan.is_empty());
    }

    #[test]
    fn instance_tag_reaches_list_and_single() {
        let store = CacheStore::new(Arc::new(TagIndex::new()));
        let list = fp("fetchTickets", json!(null));
        let seven = fp("fetchTicket", json!({ "id": 7 }));
        let eight = fp("fetchTicket", json!({ "id": 8 }));
        provide(&store, &list, &[Tag::kind("Ticket"), Tag::id("Ticket", 7), Tag::id("Ticket", 8)]);
        provide(&store, &seven, &[Tag::id("Ticket", 7)]);
        provide(&store, &eight, &[Tag::id("Ticket", 8)]);

        let plan = InvalidationPlan::build(&store, &[Tag::id("Ticket", 7)]);

        assert!(plan.mark_stale.contains(&list));
        assert!(plan.mark_stale.contains(&seven));
        assert!(!plan.mark_stale.contains(&eight));
    }

    #[test]
    fn display_summarizes_plan() {
        let plan = InvalidationPlan {
            tags: [Tag::kind("Event")].into_iter().collect(),
            ..InvalidationPlan::default()
        };
        assert_eq!(
            plan.to_string(),
            "InvalidationPlan { tags: [Event], refetch: 0, mark_stale: 0 }"
        );
    }
}
