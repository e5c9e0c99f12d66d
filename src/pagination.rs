//! Incremental list loading.
//!
//! A [`Paginator`] belongs to one list on one open view. It hands out pages
//! one at a time, never has more than one fetch in flight, and stops for good
//! once the source runs dry or fails.

use std::{fmt, future::Future};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{DataError, DataResult, Db, Pin};

/// One fetched page. `fetched` is the raw row count before any filtering,
/// which is what decides whether more pages may exist.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub fetched: usize,
}

impl<T> Page<T> {
    pub fn full(items: Vec<T>) -> Page<T> {
        let fetched = items.len();
        Page { items, fetched }
    }
}

pub trait PageSource: Send + Sync + 'static {
    type Key: Clone + PartialEq + fmt::Debug + Send + Sync;
    type Item: Clone + Send + Sync;

    fn fetch_page(
        &self,
        key: &Self::Key,
        page: u32,
        page_size: u32,
    ) -> impl Future<Output = DataResult<Page<Self::Item>>> + Send;
}

#[derive(Debug)]
pub enum LoadOutcome<T> {
    /// Already loading or exhausted; nothing was fetched.
    Skipped,
    Loaded { items: Vec<T>, exhausted: bool },
    /// The list was reset while this page was in flight; the page was dropped.
    Stale,
    Failed(DataError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub len: usize,
    pub cursor: u32,
    pub loading: bool,
    pub exhausted: bool,
}

struct PageState<K, T> {
    key: K,
    items: Vec<T>,
    cursor: u32,
    loading: bool,
    exhausted: bool,
    generation: u64,
}

pub struct Paginator<S: PageSource> {
    source: S,
    page_size: u32,
    state: Mutex<PageState<S::Key, S::Item>>,
}

impl<S: PageSource> Paginator<S> {
    pub fn new(source: S, key: S::Key, page_size: u32) -> Paginator<S> {
        Paginator {
            source,
            page_size,
            state: Mutex::new(PageState {
                key,
                items: Vec::new(),
                cursor: 1,
                loading: false,
                exhausted: false,
                generation: 0,
            }),
        }
    }

    pub fn key(&self) -> S::Key {
        self.state.lock().key.clone()
    }

    pub fn items(&self) -> Vec<S::Item> {
        self.state.lock().items.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.lock();
        Snapshot {
            len: state.items.len(),
            cursor: state.cursor,
            loading: state.loading,
            exhausted: state.exhausted,
        }
    }

    /// Starts over for a different owner. Returns whether anything changed.
    pub fn reset(&self, key: S::Key) -> bool {
        let mut state = self.state.lock();
        if state.key == key {
            return false;
        }
        tracing::debug!(from = ?state.key, to = ?key, "pagination reset");
        state.key = key;
        state.items.clear();
        state.cursor = 1;
        state.loading = false;
        state.exhausted = false;
        state.generation += 1;
        true
    }

    pub async fn load_more(&self) -> LoadOutcome<S::Item> {
        let (key, cursor, generation) = {
            let mut state = self.state.lock();
            if state.loading || state.exhausted {
                return LoadOutcome::Skipped;
            }
            state.loading = true;
            (state.key.clone(), state.cursor, state.generation)
        };

        let result = self.source.fetch_page(&key, cursor, self.page_size).await;

        let mut state = self.state.lock();
        if state.generation != generation {
            tracing::debug!(?key, cursor, "discarding page for a previous list");
            return LoadOutcome::Stale;
        }
        state.loading = false;

        match result {
            Ok(page) => {
                state.exhausted = page.fetched < self.page_size as usize || page.items.is_empty();
                state.items.extend(page.items.iter().cloned());
                state.cursor += 1;
                LoadOutcome::Loaded {
                    items: page.items,
                    exhausted: state.exhausted,
                }
            }
            Err(err) => {
                tracing::warn!(?key, cursor, error = %err, "page fetch failed");
                state.exhausted = true;
                LoadOutcome::Failed(err)
            }
        }
    }
}

/// Which pins a list shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedKey {
    All,
    Owner { user_id: Uuid },
    /// Everything except the pin being viewed.
    Related { pin_id: Uuid },
}

impl FeedKey {
    /// Fraction of the sentinel that must be visible to load the next page.
    pub fn threshold(&self) -> f32 {
        match self {
            FeedKey::Owner { .. } => 1.0,
            FeedKey::All | FeedKey::Related { .. } => 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FeedSettings {
    pub page_size: u32,
}

#[derive(Clone)]
pub struct PinFeed {
    db: Db,
}

impl PinFeed {
    pub fn new(db: Db) -> PinFeed {
        PinFeed { db }
    }
}

impl PageSource for PinFeed {
    type Key = FeedKey;
    type Item = Pin;

    async fn fetch_page(&self, key: &FeedKey, page: u32, page_size: u32) -> DataResult<Page<Pin>> {
        match *key {
            FeedKey::All => Ok(Page::full(self.db.fetch_pins(page, page_size).await?)),
            FeedKey::Owner { user_id } => Ok(Page::full(self.db.fetch_pins_by_user(user_id, page, page_size).await?)),
            FeedKey::Related { pin_id } => {
                let pins = self.db.fetch_pins(page, page_size).await?;
                let fetched = pins.len();
                Ok(Page {
                    items: pins.into_iter().filter(|pin| pin.id != pin_id).collect(),
                    fetched,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    use tokio::sync::Notify;

    use super::*;
    use crate::db::NewPin;

    /// Serves `totals[key]` numbered items per key.
    #[derive(Clone, Default)]
    struct Numbers {
        totals: Vec<usize>,
        calls: Arc<AtomicUsize>,
        gate: Option<Arc<Notify>>,
        fail: Arc<AtomicBool>,
    }

    impl PageSource for Numbers {
        type Key = usize;
        type Item = usize;

        async fn fetch_page(&self, key: &usize, page: u32, page_size: u32) -> DataResult<Page<usize>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(DataError::Validation("boom".into()));
            }
            let start = (page as usize - 1) * page_size as usize;
            let end = (start + page_size as usize).min(self.totals[*key]);
            Ok(Page::full((start.min(end)..end).collect()))
        }
    }

    fn numbers(totals: &[usize]) -> Numbers {
        Numbers {
            totals: totals.to_vec(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn concurrent_triggers_collapse_to_one_fetch() {
        let gate = Arc::new(Notify::new());
        let source = Numbers { gate: Some(gate.clone()), ..numbers(&[50]) };
        let calls = source.calls.clone();
        let pager = Paginator::new(source, 0, 20);

        let (first, second, third, ()) = tokio::join!(pager.load_more(), pager.load_more(), pager.load_more(), async {
            tokio::task::yield_now().await;
            gate.notify_one();
        });

        assert!(matches!(first, LoadOutcome::Loaded { ref items, exhausted: false } if items.len() == 20));
        assert!(matches!(second, LoadOutcome::Skipped));
        assert!(matches!(third, LoadOutcome::Skipped));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!pager.snapshot().loading);
    }

    #[tokio::test]
    async fn short_page_exhausts_the_list() {
        let source = numbers(&[25]);
        let calls = source.calls.clone();
        let pager = Paginator::new(source, 0, 20);

        assert!(matches!(pager.load_more().await, LoadOutcome::Loaded { exhausted: false, .. }));
        assert_eq!(pager.snapshot(), Snapshot { len: 20, cursor: 2, loading: false, exhausted: false });

        assert!(matches!(pager.load_more().await, LoadOutcome::Loaded { ref items, exhausted: true } if items.len() == 5));
        assert_eq!(pager.snapshot(), Snapshot { len: 25, cursor: 3, loading: false, exhausted: true });
        assert_eq!(pager.items(), (0..25).collect::<Vec<_>>());

        assert!(matches!(pager.load_more().await, LoadOutcome::Skipped));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exact_multiple_needs_an_empty_page_to_finish() {
        let pager = Paginator::new(numbers(&[20]), 0, 20);
        assert!(matches!(pager.load_more().await, LoadOutcome::Loaded { exhausted: false, .. }));
        assert!(matches!(pager.load_more().await, LoadOutcome::Loaded { ref items, exhausted: true } if items.is_empty()));
        assert_eq!(pager.snapshot().len, 20);
    }

    #[tokio::test]
    async fn failure_stops_further_loads() {
        let source = numbers(&[50]);
        source.fail.store(true, Ordering::SeqCst);
        let calls = source.calls.clone();
        let pager = Paginator::new(source, 0, 20);

        assert!(matches!(pager.load_more().await, LoadOutcome::Failed(_)));
        let snapshot = pager.snapshot();
        assert!(snapshot.exhausted);
        assert!(!snapshot.loading);

        assert!(matches!(pager.load_more().await, LoadOutcome::Skipped));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn changing_owner_starts_over() {
        let pager = Paginator::new(numbers(&[5, 30]), 0, 20);
        pager.load_more().await;
        assert!(pager.snapshot().exhausted);

        assert!(!pager.reset(0));
        assert!(pager.reset(1));
        assert_eq!(pager.snapshot(), Snapshot { len: 0, cursor: 1, loading: false, exhausted: false });

        assert!(matches!(pager.load_more().await, LoadOutcome::Loaded { exhausted: false, .. }));
        assert_eq!(pager.key(), 1);
    }

    #[tokio::test]
    async fn page_in_flight_during_reset_is_discarded() {
        let gate = Arc::new(Notify::new());
        let source = Numbers { gate: Some(gate.clone()), ..numbers(&[50, 3]) };
        let pager = Arc::new(Paginator::new(source, 0, 20));

        let in_flight = tokio::spawn({
            let pager = pager.clone();
            async move { pager.load_more().await }
        });
        while !pager.snapshot().loading {
            tokio::task::yield_now().await;
        }

        assert!(pager.reset(1));
        gate.notify_one();
        assert!(matches!(in_flight.await.unwrap(), LoadOutcome::Stale));
        assert_eq!(pager.snapshot(), Snapshot { len: 0, cursor: 1, loading: false, exhausted: false });

        gate.notify_one();
        assert!(matches!(pager.load_more().await, LoadOutcome::Loaded { ref items, exhausted: true } if items.len() == 3));
    }

    fn new_pin(n: u32) -> NewPin {
        NewPin {
            image_url: Some(format!("https://img.example/{n}.jpg")),
            width: Some(100),
            height: Some(100),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn related_feed_excludes_the_viewed_pin() {
        let db = Db::in_memory().await;
        let owner = db.seed_user("alice").await;
        let mut ids = Vec::new();
        for n in 0..3 {
            ids.push(db.create_pin(owner, new_pin(n)).await.unwrap().id);
        }

        let pager = Paginator::new(PinFeed::new(db), FeedKey::Related { pin_id: ids[1] }, 3);
        let LoadOutcome::Loaded { items, exhausted } = pager.load_more().await else {
            panic!("expected a page");
        };
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|pin| pin.id != ids[1]));
        assert!(!exhausted);
    }

    #[tokio::test]
    async fn page_emptied_by_exclusion_is_exhausted() {
        let db = Db::in_memory().await;
        let owner = db.seed_user("alice").await;
        let only = db.create_pin(owner, new_pin(0)).await.unwrap().id;
        db.create_pin(owner, new_pin(1)).await.unwrap();

        // page 2 of size 1 holds only the oldest pin, which is the one viewed
        let pager = Paginator::new(PinFeed::new(db), FeedKey::Related { pin_id: only }, 1);
        assert!(matches!(pager.load_more().await, LoadOutcome::Loaded { exhausted: false, .. }));
        assert!(matches!(pager.load_more().await, LoadOutcome::Loaded { ref items, exhausted: true } if items.is_empty()));
    }

    #[test]
    fn feed_keys_use_the_wire_shape() {
        let key: FeedKey = serde_json::from_str(r#"{"kind":"related","pin_id":"0190f5a4-0000-7000-8000-000000000000"}"#).unwrap();
        assert!(matches!(key, FeedKey::Related { .. }));
        assert_eq!(serde_json::to_string(&FeedKey::All).unwrap(), r#"{"kind":"all"}"#);
    }
}
