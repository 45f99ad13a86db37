//! Data source contract and a query-keyed reference cache.
//!
//! The engine never fetches. It asks a [`DataSource`] to resolve the query of
//! the current snapshot on every recompute and renders whatever state comes
//! back. Making sure a superseded request cannot overwrite the answer for the
//! current query is the data source's job; [`ResourceCache`] does it by
//! storing every response under the key of the query that produced it.

use crate::adapter::lock;
use crate::{DataError, Filters, Query};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

/// One resolved page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageData<Row> {
    pub rows: Vec<Row>,
    pub page_count: u32,
    /// Total matching rows across all pages, if the backend reports it
    pub total: Option<u64>,
    pub extra_meta: Option<Map<String, Value>>,
}

impl<Row> PageData<Row> {
    pub fn new(rows: Vec<Row>, page_count: u32) -> Self {
        Self {
            rows,
            page_count,
            total: None,
            extra_meta: None,
        }
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn with_extra_meta(mut self, meta: Map<String, Value>) -> Self {
        self.extra_meta = Some(meta);
        self
    }
}

/// What a data source reports for one query.
#[derive(Debug, Clone)]
pub struct ResourceState<Row> {
    pub data: Option<Arc<PageData<Row>>>,
    /// No data has ever been available for this query and a request is running
    pub is_initial_loading: bool,
    /// A request for this query is running (with or without data on screen)
    pub is_fetching: bool,
    pub error: Option<DataError>,
}

impl<Row> ResourceState<Row> {
    pub fn idle() -> Self {
        Self {
            data: None,
            is_initial_loading: false,
            is_fetching: false,
            error: None,
        }
    }
}

impl<Row> Default for ResourceState<Row> {
    fn default() -> Self {
        Self::idle()
    }
}

/// Resolves queries into rows.
pub trait DataSource<Row, F>: Send {
    /// Report the current state for `query`, starting a request if needed.
    fn resolve(&mut self, query: &Query<F>) -> ResourceState<Row>;

    /// Re-run the request for `query` even if data is cached.
    fn refetch(&mut self, query: &Query<F>);

    /// Re-run the request for `query` if its last attempt failed.
    fn retry(&mut self, query: &Query<F>);
}

/// A request the host has to perform and answer with [`ResourceCache::complete`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest<F> {
    pub key: String,
    pub query: Query<F>,
}

#[derive(Debug)]
struct CacheEntry<Row> {
    data: Option<Arc<PageData<Row>>>,
    error: Option<DataError>,
    in_flight: bool,
}

impl<Row> CacheEntry<Row> {
    fn pending() -> Self {
        Self {
            data: None,
            error: None,
            in_flight: true,
        }
    }
}

/// Queries a [`ResourceCache`] keeps by default.
pub const DEFAULT_CACHE_CAPACITY: usize = 32;

#[derive(Debug)]
struct CacheInner<Row, F> {
    entries: HashMap<String, CacheEntry<Row>>,
    /// Keys of `entries`, least recently resolved first
    recent: VecDeque<String>,
    capacity: usize,
    pending: VecDeque<FetchRequest<F>>,
    /// Key whose data was shown last; used as placeholder for a loading key
    last_shown: Option<String>,
    keep_previous_data: bool,
}

/// Reference [`DataSource`]: results keyed by the structural query key.
///
/// At most `capacity` queries are kept; the least recently resolved one is
/// evicted first, never the current query or the one used as placeholder.
///
/// The handle is cheap to clone; the engine owns one clone and the host keeps
/// another to drain [`take_requests`](Self::take_requests) and deliver
/// responses with [`complete`](Self::complete), in any order.
#[derive(Debug)]
pub struct ResourceCache<Row, F> {
    inner: Arc<Mutex<CacheInner<Row, F>>>,
}

impl<Row, F> Clone for ResourceCache<Row, F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Row, F: Filters> ResourceCache<Row, F> {
    /// A cache that shows the previous query's rows while a new query loads.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                recent: VecDeque::new(),
                capacity: DEFAULT_CACHE_CAPACITY,
                pending: VecDeque::new(),
                last_shown: None,
                keep_previous_data: true,
            })),
        }
    }

    /// Keep at most `capacity` queries (two at minimum).
    pub fn with_capacity(self, capacity: usize) -> Self {
        lock(&self.inner).capacity = capacity.max(2);
        self
    }

    /// Number of queries currently cached.
    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disable placeholder data: a new query starts from `Loading`.
    pub fn without_previous_data(self) -> Self {
        lock(&self.inner).keep_previous_data = false;
        self
    }

    /// Drain the requests queued since the last call.
    pub fn take_requests(&self) -> Vec<FetchRequest<F>> {
        lock(&self.inner).pending.drain(..).collect()
    }

    /// Deliver a response. Returns `false`, dropping the response, when
    /// `key` was never asked for or has been evicted since.
    ///
    /// A failure keeps previously cached data so it can stay on screen.
    pub fn complete(&self, key: &str, result: Result<PageData<Row>, DataError>) -> bool {
        let mut inner = lock(&self.inner);
        let Some(entry) = inner.entries.get_mut(key) else {
            trace!(key, "response for unknown query dropped");
            return false;
        };
        entry.in_flight = false;
        match result {
            Ok(page) => {
                entry.data = Some(Arc::new(page));
                entry.error = None;
            }
            Err(error) => {
                debug!(key, error = %error, "query failed");
                entry.error = Some(error);
            }
        }
        true
    }

    /// Mark `key` as the most recently used and evict down to capacity.
    fn touch(inner: &mut CacheInner<Row, F>, key: &str) {
        if let Some(pos) = inner.recent.iter().position(|k| k == key) {
            inner.recent.remove(pos);
        }
        inner.recent.push_back(key.to_string());

        while inner.entries.len() > inner.capacity {
            let last_shown = inner.last_shown.as_deref();
            let Some(pos) = inner
                .recent
                .iter()
                .position(|k| k != key && Some(k.as_str()) != last_shown)
            else {
                break;
            };
            let Some(evicted) = inner.recent.remove(pos) else {
                break;
            };
            trace!(key = %evicted, "evicting cached query");
            inner.entries.remove(&evicted);
            inner.pending.retain(|request| request.key != evicted);
        }
    }

    fn enqueue(inner: &mut CacheInner<Row, F>, key: String, query: &Query<F>) {
        if inner.pending.iter().any(|request| request.key == key) {
            return;
        }
        trace!(key = %key, "queueing fetch");
        inner.pending.push_back(FetchRequest {
            key,
            query: query.clone(),
        });
    }
}

impl<Row, F: Filters> Default for ResourceCache<Row, F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Row: Send + Sync, F: Filters> DataSource<Row, F> for ResourceCache<Row, F> {
    fn resolve(&mut self, query: &Query<F>) -> ResourceState<Row> {
        let key = query.key();
        let mut inner = lock(&self.inner);

        if !inner.entries.contains_key(&key) {
            inner.entries.insert(key.clone(), CacheEntry::pending());
            Self::enqueue(&mut inner, key.clone(), query);
        }
        Self::touch(&mut inner, &key);

        let (data, error, in_flight) = match inner.entries.get(&key) {
            Some(entry) => (entry.data.clone(), entry.error.clone(), entry.in_flight),
            None => (None, None, false),
        };

        if data.is_some() {
            inner.last_shown = Some(key);
            return ResourceState {
                data,
                is_initial_loading: false,
                is_fetching: in_flight,
                error,
            };
        }

        let placeholder = if inner.keep_previous_data && error.is_none() {
            inner
                .last_shown
                .as_ref()
                .and_then(|shown| inner.entries.get(shown))
                .and_then(|entry| entry.data.clone())
        } else {
            None
        };

        ResourceState {
            is_initial_loading: in_flight && placeholder.is_none(),
            data: placeholder,
            is_fetching: in_flight,
            error,
        }
    }

    fn refetch(&mut self, query: &Query<F>) {
        let key = query.key();
        let mut inner = lock(&self.inner);
        let entry = inner
            .entries
            .entry(key.clone())
            .or_insert_with(CacheEntry::pending);
        entry.in_flight = true;
        Self::touch(&mut inner, &key);
        Self::enqueue(&mut inner, key, query);
    }

    fn retry(&mut self, query: &Query<F>) {
        let failed = lock(&self.inner)
            .entries
            .get(&query.key())
            .is_some_and(|entry| entry.error.is_some());
        if failed {
            self.refetch(query);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TableStateSnapshot;

    fn query(page: u32) -> Query<()> {
        TableStateSnapshot::new(10, ()).with_page(page).query()
    }

    #[test]
    fn first_resolve_queues_request_and_reports_loading() {
        let mut cache: ResourceCache<&str, ()> = ResourceCache::new();
        let state = cache.resolve(&query(1));
        assert!(state.is_initial_loading);
        assert!(state.is_fetching);
        assert!(state.data.is_none());

        let requests = cache.take_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].query, query(1));

        cache.resolve(&query(1));
        assert!(cache.take_requests().is_empty());
    }

    #[test]
    fn completed_query_returns_data() {
        let mut cache = ResourceCache::new();
        cache.resolve(&query(1));
        let key = query(1).key();
        assert!(cache.complete(&key, Ok(PageData::new(vec!["a", "b"], 3))));

        let state = cache.resolve(&query(1));
        assert!(!state.is_fetching);
        assert_eq!(state.data.unwrap().rows, vec!["a", "b"]);
    }

    #[test]
    fn late_response_for_superseded_query_does_not_clobber_current() {
        let mut cache = ResourceCache::new();
        cache.resolve(&query(1));
        cache.resolve(&query(2));

        // Page 2 answers first, page 1 arrives late.
        cache.complete(&query(2).key(), Ok(PageData::new(vec!["p2"], 5)));
        cache.complete(&query(1).key(), Ok(PageData::new(vec!["p1"], 5)));

        let state = cache.resolve(&query(2));
        assert_eq!(state.data.unwrap().rows, vec!["p2"]);
    }

    #[test]
    fn previous_data_is_placeholder_while_new_query_loads() {
        let mut cache = ResourceCache::new();
        cache.resolve(&query(1));
        cache.complete(&query(1).key(), Ok(PageData::new(vec!["p1"], 5)));
        cache.resolve(&query(1));

        let state = cache.resolve(&query(2));
        assert!(!state.is_initial_loading);
        assert!(state.is_fetching);
        assert_eq!(state.data.unwrap().rows, vec!["p1"]);

        let mut strict = ResourceCache::new().without_previous_data();
        strict.resolve(&query(1));
        strict.complete(&query(1).key(), Ok(PageData::new(vec!["p1"], 5)));
        strict.resolve(&query(1));
        assert!(strict.resolve(&query(2)).is_initial_loading);
    }

    #[test]
    fn failed_refetch_keeps_stale_data() {
        let mut cache = ResourceCache::new();
        cache.resolve(&query(1));
        cache.complete(&query(1).key(), Ok(PageData::new(vec!["a"], 1)));

        cache.refetch(&query(1));
        assert!(cache.resolve(&query(1)).is_fetching);
        cache.complete(&query(1).key(), Err(DataError::new("boom")));

        let state = cache.resolve(&query(1));
        assert_eq!(state.data.unwrap().rows, vec!["a"]);
        assert_eq!(state.error, Some(DataError::new("boom")));
    }

    #[test]
    fn retry_only_requeues_failed_queries() {
        let mut cache: ResourceCache<&str, ()> = ResourceCache::new();
        cache.resolve(&query(1));
        cache.take_requests();
        cache.complete(&query(1).key(), Ok(PageData::new(vec![], 0)));

        cache.retry(&query(1));
        assert!(cache.take_requests().is_empty());

        cache.resolve(&query(2));
        cache.take_requests();
        cache.complete(&query(2).key(), Err(DataError::new("down")));
        cache.retry(&query(2));
        assert_eq!(cache.take_requests().len(), 1);
    }

    #[test]
    fn least_recently_resolved_queries_are_evicted() {
        let mut cache = ResourceCache::new().with_capacity(3);
        for page in 1..=3 {
            cache.resolve(&query(page));
            cache.complete(&query(page).key(), Ok(PageData::new(vec![page], 5)));
        }
        // Page 1 is used again, so page 2 is now the oldest.
        cache.resolve(&query(1));
        cache.resolve(&query(4));
        assert_eq!(cache.len(), 3);

        assert!(!cache.complete(&query(2).key(), Ok(PageData::new(vec![2], 5))));
        assert_eq!(cache.resolve(&query(1)).data.unwrap().rows, vec![1]);
        assert_eq!(cache.resolve(&query(3)).data.unwrap().rows, vec![3]);
    }

    #[test]
    fn eviction_spares_the_placeholder_and_drops_its_request() {
        let mut cache = ResourceCache::new().with_capacity(2);
        cache.resolve(&query(1));
        cache.complete(&query(1).key(), Ok(PageData::new(vec!["p1"], 5)));
        cache.resolve(&query(1));
        cache.take_requests();

        cache.resolve(&query(2));
        let state = cache.resolve(&query(3));
        assert_eq!(state.data.unwrap().rows, vec!["p1"]);
        assert_eq!(cache.len(), 2);

        let keys: Vec<String> = cache.take_requests().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec![query(3).key()]);
    }

    #[test]
    fn complete_for_unknown_key_reports_false() {
        let cache: ResourceCache<&str, ()> = ResourceCache::new();
        assert!(!cache.complete("nope", Ok(PageData::new(vec![], 0))));
    }
}
