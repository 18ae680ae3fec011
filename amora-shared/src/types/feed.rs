use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Anything that can live in a chat timeline.
pub trait FeedItem {
    fn id(&self) -> Uuid;
    fn created_at(&self) -> DateTime<Utc>;
}

/// Chat timeline keyed by message id.
///
/// History reads and live pushes overlap: a message inserted while the history
/// page is being read shows up in both. Everything goes through `insert`, so a
/// message appears once no matter how many sources delivered it. Ordering is
/// `(created_at, id)`, which keeps messages sharing a timestamp stable.
#[derive(Debug, Clone)]
pub struct MessageFeed<T> {
    ordered: BTreeMap<(DateTime<Utc>, Uuid), T>,
    index: HashMap<Uuid, DateTime<Utc>>,
}

impl<T> Default for MessageFeed<T> {
    fn default() -> Self {
        Self {
            ordered: BTreeMap::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: FeedItem> MessageFeed<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by id. Returns `true` when the id was not seen before.
    ///
    /// Replacing keeps the newest copy so a later read (e.g. with `is_read`
    /// flipped) wins over an earlier push of the same message.
    pub fn insert(&mut self, item: T) -> bool {
        let id = item.id();
        let created_at = item.created_at();
        let fresh = match self.index.insert(id, created_at) {
            Some(previous) => {
                self.ordered.remove(&(previous, id));
                false
            }
            None => true,
        };
        self.ordered.insert((created_at, id), item);
        fresh
    }

    /// Merge a batch, returning how many previously unseen messages it added.
    pub fn merge<I: IntoIterator<Item = T>>(&mut self, items: I) -> usize {
        items.into_iter().filter_map(|item| self.insert(item).then_some(())).count()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Timestamp of the newest message, used as the cursor for catch-up reads.
    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.ordered.keys().next_back().map(|(ts, _)| *ts)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.ordered.values()
    }

    /// Oldest first.
    pub fn into_vec(self) -> Vec<T> {
        self.ordered.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Msg {
        id: Uuid,
        at: DateTime<Utc>,
        body: &'static str,
    }

    impl FeedItem for Msg {
        fn id(&self) -> Uuid {
            self.id
        }
        fn created_at(&self) -> DateTime<Utc> {
            self.at
        }
    }

    fn msg(at: DateTime<Utc>, body: &'static str) -> Msg {
        Msg { id: Uuid::new_v4(), at, body }
    }

    #[test]
    fn history_and_live_overlap_is_deduplicated() {
        let t0 = Utc::now();
        let a = msg(t0, "hi");
        let b = msg(t0 + Duration::seconds(1), "hey");
        let c = msg(t0 + Duration::seconds(2), "how are you");

        let mut feed = MessageFeed::new();
        assert_eq!(feed.merge(vec![a.clone(), b.clone()]), 2);
        // live push of `b` raced the history read, `c` is new
        assert_eq!(feed.merge(vec![b.clone(), c.clone()]), 1);

        let bodies: Vec<_> = feed.into_vec().into_iter().map(|m| m.body).collect();
        assert_eq!(bodies, vec!["hi", "hey", "how are you"]);
    }

    #[test]
    fn out_of_order_arrivals_are_sorted() {
        let t0 = Utc::now();
        let late = msg(t0 + Duration::seconds(10), "second");
        let early = msg(t0, "first");

        let mut feed = MessageFeed::new();
        feed.insert(late.clone());
        feed.insert(early.clone());

        assert_eq!(feed.latest(), Some(late.at));
        let ids: Vec<_> = feed.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![early.id, late.id]);
    }

    #[test]
    fn reinserting_replaces_without_growing() {
        let t0 = Utc::now();
        let original = msg(t0, "draft");
        let mut updated = original.clone();
        updated.body = "edited";

        let mut feed = MessageFeed::new();
        assert!(feed.insert(original.clone()));
        assert!(!feed.insert(updated));
        assert_eq!(feed.len(), 1);
        assert!(feed.contains(&original.id));
        assert_eq!(feed.iter().next().unwrap().body, "edited");
    }

    #[test]
    fn empty_feed_has_no_cursor() {
        let feed: MessageFeed<Msg> = MessageFeed::new();
        assert!(feed.is_empty());
        assert_eq!(feed.latest(), None);
    }
}
