//! Windowed rendering and infinite loading.
//!
//! Only the rows inside the [`VirtualWindow`] are mounted; spacers stand in
//! for the rest. In infinite mode, scrolling near the end asks the host for
//! more rows, behind a three-part [`LoadMoreGate`]: one request at a time,
//! a cooldown between triggers, and proof of forward progress.

use crate::{
    config::{LoadMore, VirtualizationConfig},
    feature::{FeatureContext, FeatureKind, FeatureRuntime},
    memo::structural_key,
    options::{bind, ActionKind, ActionPatch, TableOptionsPatch},
    Filters, MutationError, MutationSource, Timestamp,
};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tracing::{debug, trace, warn};

/// Minimum time between two load-more triggers, in milliseconds.
pub const LOAD_MORE_COOLDOWN_MS: Timestamp = 300;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VirtualizationMode {
    /// All rows are known up front
    #[default]
    Fixed,
    /// More rows are appended as the user scrolls
    Infinite,
}

/// Half-open range `[start, end)` of mounted rows plus spacer heights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualWindow {
    pub start: usize,
    pub end: usize,
    /// Height standing in for rows `[0, start)`
    pub top_spacer: f64,
    /// Height standing in for rows `[end, row_count)`
    pub bottom_spacer: f64,
}

impl VirtualWindow {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start..self.end).contains(&index)
    }
}

/// Scroll container measurements, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub viewport_height: f64,
}

/// Rows to mount for the given scroll position.
///
/// `start = floor(scroll_top / row_height) - overscan` and
/// `end = ceil((scroll_top + viewport) / row_height) + overscan`, both clamped
/// to `[0, row_count]`.
pub fn compute_window(row_count: usize, row_height: f64, metrics: ScrollMetrics, overscan: usize) -> VirtualWindow {
    if row_count == 0 || row_height.is_nan() || row_height <= 0.0 {
        return VirtualWindow::default();
    }

    let scroll_top = metrics.scroll_top.max(0.0);
    let viewport = metrics.viewport_height.max(0.0);

    let first = (scroll_top / row_height).floor() as usize;
    let last = ((scroll_top + viewport) / row_height).ceil() as usize;

    let end = last.saturating_add(overscan).min(row_count);
    let start = first.saturating_sub(overscan).min(end);

    VirtualWindow {
        start,
        end,
        top_spacer: start as f64 * row_height,
        bottom_spacer: (row_count - end) as f64 * row_height,
    }
}

/// Why the gate did or did not let a load-more through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GateDecision {
    Fire,
    NotNearEnd,
    InFlight,
    CoolingDown,
    NoProgress,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Trigger {
    at: Timestamp,
    row_count: usize,
    scroll_top: f64,
}

/// Backpressure for infinite loading.
#[derive(Debug, Default)]
pub struct LoadMoreGate {
    in_flight: Arc<AtomicBool>,
    last: Option<Trigger>,
}

impl LoadMoreGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Decide whether a load-more may fire now.
    pub fn check(
        &self,
        now: Timestamp,
        metrics: ScrollMetrics,
        row_count: usize,
        row_height: f64,
        load_more_offset: f64,
    ) -> GateDecision {
        let content_height = row_count as f64 * row_height;
        if metrics.scroll_top + metrics.viewport_height < content_height - load_more_offset {
            return GateDecision::NotNearEnd;
        }
        if self.is_in_flight() {
            return GateDecision::InFlight;
        }
        let Some(last) = self.last else {
            return GateDecision::Fire;
        };
        if now.saturating_sub(last.at) < LOAD_MORE_COOLDOWN_MS {
            return GateDecision::CoolingDown;
        }
        // A shrink is new data too: the list was replaced.
        let rows_changed = row_count != last.row_count;
        let scrolled = metrics.scroll_top - last.scroll_top >= row_height / 2.0;
        if rows_changed || scrolled {
            GateDecision::Fire
        } else {
            GateDecision::NoProgress
        }
    }

    /// Record a trigger and mark a request in flight.
    pub fn record(&mut self, now: Timestamp, metrics: ScrollMetrics, row_count: usize) {
        self.in_flight.store(true, Ordering::SeqCst);
        self.last = Some(Trigger {
            at: now,
            row_count,
            scroll_top: metrics.scroll_top,
        });
    }

    pub fn reset(&mut self) {
        self.last = None;
    }

    fn in_flight_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.in_flight)
    }
}

/// Clears the in-flight flag when the request finishes or is dropped.
pub(crate) struct InFlight(Arc<AtomicBool>);

impl InFlight {
    /// Raise `flag` until the guard is dropped.
    pub(crate) fn raise(flag: Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A running `load_more` call, for the host to drive.
///
/// A failure is also stored in the feature and shows up in
/// `Instance::errors` on the next recompute.
#[must_use = "the load-more request only runs when the task is polled"]
pub struct LoadMoreTask {
    future: BoxFuture<'static, Result<(), MutationError>>,
}

impl LoadMoreTask {
    fn new(load_more: LoadMore, in_flight: Arc<AtomicBool>, error_slot: Arc<Mutex<Option<MutationError>>>) -> Self {
        let guard = InFlight(in_flight);
        let future = async move {
            let _guard = guard;
            match load_more().await {
                Ok(()) => Ok(()),
                Err(e) => {
                    let error = MutationError::new(MutationSource::LoadMore, &e);
                    warn!(error = %error.message, "load more failed");
                    *crate::adapter::lock(&error_slot) = Some(error.clone());
                    Err(error)
                }
            }
        };
        Self {
            future: Box::pin(future),
        }
    }
}

impl Future for LoadMoreTask {
    type Output = Result<(), MutationError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.as_mut().poll(cx)
    }
}

impl std::fmt::Debug for LoadMoreTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadMoreTask").finish_non_exhaustive()
    }
}

/// Virtualization feature.
pub struct VirtualizationFeature {
    config: VirtualizationConfig,
    load_more: Option<LoadMore>,
    metrics: ScrollMetrics,
    row_count: usize,
    window: VirtualWindow,
    gate: LoadMoreGate,
    error: Arc<Mutex<Option<MutationError>>>,
    /// Page, sort and filters of the list being scrolled
    query_key: Option<String>,
}

impl VirtualizationFeature {
    pub fn new(config: &VirtualizationConfig, load_more: Option<LoadMore>) -> Self {
        Self {
            metrics: ScrollMetrics {
                scroll_top: 0.0,
                viewport_height: config.viewport_height,
            },
            config: config.clone(),
            load_more,
            row_count: 0,
            window: VirtualWindow::default(),
            gate: LoadMoreGate::new(),
            error: Arc::new(Mutex::new(None)),
            query_key: None,
        }
    }

    pub fn mode(&self) -> VirtualizationMode {
        self.config.mode
    }

    pub fn window(&self) -> VirtualWindow {
        self.window
    }

    pub fn metrics(&self) -> ScrollMetrics {
        self.metrics
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn total_height(&self) -> f64 {
        self.row_count as f64 * self.config.row_height
    }

    pub fn is_loading_more(&self) -> bool {
        self.gate.is_in_flight()
    }

    pub fn error(&self) -> Option<MutationError> {
        crate::adapter::lock(&self.error).clone()
    }

    pub fn clear_error(&mut self) {
        *crate::adapter::lock(&self.error) = None;
    }

    pub fn on_scroll(&mut self, scroll_top: f64, now: Timestamp) -> Option<LoadMoreTask> {
        self.metrics.scroll_top = scroll_top;
        self.refresh_window();
        self.maybe_load_more(now)
    }

    pub fn on_resize(&mut self, viewport_height: f64, now: Timestamp) -> Option<LoadMoreTask> {
        self.metrics.viewport_height = viewport_height;
        self.refresh_window();
        self.maybe_load_more(now)
    }

    /// Update the row count without scrolling, e.g. after rows arrived.
    pub fn set_row_count(&mut self, row_count: usize) {
        if self.row_count != row_count {
            self.row_count = row_count;
            self.refresh_window();
        }
    }

    fn refresh_window(&mut self) {
        self.window = compute_window(self.row_count, self.config.row_height, self.metrics, self.config.overscan);
    }

    fn maybe_load_more(&mut self, now: Timestamp) -> Option<LoadMoreTask> {
        if self.config.mode != VirtualizationMode::Infinite {
            return None;
        }
        let load_more = self.load_more.clone()?;

        let decision = self.gate.check(
            now,
            self.metrics,
            self.row_count,
            self.config.row_height,
            self.config.load_more_offset,
        );
        if decision != GateDecision::Fire {
            if decision != GateDecision::NotNearEnd {
                trace!(?decision, row_count = self.row_count, "load more gated");
            }
            return None;
        }

        debug!(row_count = self.row_count, scroll_top = self.metrics.scroll_top, "load more");
        self.gate.record(now, self.metrics, self.row_count);
        Some(LoadMoreTask::new(load_more, self.gate.in_flight_flag(), Arc::clone(&self.error)))
    }
}

impl<Row, F: Filters> FeatureRuntime<Row, F> for VirtualizationFeature {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Virtualization
    }

    /// A new query starts a new list: back to the top with a fresh gate.
    /// Page size is left out, since growing it is one way to load more.
    fn sync(&mut self, ctx: &FeatureContext<'_, Row, F>) {
        let snapshot = ctx.snapshot;
        let query_key = structural_key(&(snapshot.page, &snapshot.sort, &snapshot.filters));
        if self.query_key.as_ref().is_some_and(|prev| *prev != query_key) {
            debug!("query changed; load-more gate reset");
            self.metrics.scroll_top = 0.0;
            self.gate.reset();
            self.refresh_window();
        }
        self.query_key = Some(query_key);
        self.set_row_count(ctx.visible_rows.len());
    }

    fn patch_table_options(&self, _ctx: &FeatureContext<'_, Row, F>) -> TableOptionsPatch {
        TableOptionsPatch::default().with_meta(
            "virtualization",
            json!({
                "rowHeight": self.config.row_height,
                "mode": self.config.mode,
                "start": self.window.start,
                "end": self.window.end,
            }),
        )
    }

    fn patch_actions(&self) -> ActionPatch {
        bind(
            FeatureKind::Virtualization,
            &[ActionKind::Scroll, ActionKind::Resize, ActionKind::ClearLoadMoreError],
        )
    }

    fn on_reset(&mut self) {
        self.metrics.scroll_top = 0.0;
        self.gate.reset();
        self.clear_error();
        self.refresh_window();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoxError;
    use futures::FutureExt;
    use std::sync::atomic::AtomicUsize;

    fn metrics(scroll_top: f64, viewport_height: f64) -> ScrollMetrics {
        ScrollMetrics {
            scroll_top,
            viewport_height,
        }
    }

    /// Rows 100..120 are visible, so five rows of overscan give 95..125.
    /// A window end of 130 is sometimes quoted for these figures; it would
    /// need ten rows of overscan below the viewport and is not what
    /// `floor(top / h) - overscan .. ceil(bottom / h) + overscan` yields.
    #[test]
    fn window_includes_overscan_on_both_sides() {
        let window = compute_window(1000, 32.0, metrics(3200.0, 640.0), 5);
        assert_eq!(window.start, 95);
        assert_eq!(window.end, 125);
        assert_eq!(window.top_spacer, 95.0 * 32.0);
        assert_eq!(window.bottom_spacer, 875.0 * 32.0);
    }

    #[test]
    fn window_clamps_at_edges() {
        let top = compute_window(1000, 32.0, metrics(0.0, 640.0), 5);
        assert_eq!((top.start, top.end), (0, 25));

        let bottom = compute_window(100, 32.0, metrics(3000.0, 640.0), 5);
        assert_eq!(bottom.end, 100);
        assert_eq!(bottom.bottom_spacer, 0.0);

        let past_end = compute_window(10, 32.0, metrics(10_000.0, 640.0), 2);
        assert!(past_end.start <= past_end.end);
        assert_eq!(past_end.end, 10);

        assert!(compute_window(0, 32.0, metrics(0.0, 640.0), 5).is_empty());
    }

    #[test]
    fn gate_requires_being_near_the_end() {
        let gate = LoadMoreGate::new();
        // 100 rows * 32px = 3200px content.
        assert_eq!(gate.check(0, metrics(0.0, 640.0), 100, 32.0, 100.0), GateDecision::NotNearEnd);
        assert_eq!(gate.check(0, metrics(2500.0, 640.0), 100, 32.0, 100.0), GateDecision::Fire);
    }

    #[test]
    fn gate_blocks_while_in_flight_then_cooldown_then_progress() {
        let mut gate = LoadMoreGate::new();
        let near_end = metrics(2560.0, 640.0);
        gate.record(1_000, near_end, 100);

        assert_eq!(gate.check(2_000, near_end, 100, 32.0, 0.0), GateDecision::InFlight);
        gate.in_flight.store(false, Ordering::SeqCst);

        assert_eq!(gate.check(1_200, near_end, 100, 32.0, 0.0), GateDecision::CoolingDown);
        assert_eq!(gate.check(1_400, near_end, 100, 32.0, 0.0), GateDecision::NoProgress);
        assert_eq!(gate.check(1_400, metrics(2575.0, 640.0), 100, 32.0, 0.0), GateDecision::NoProgress);
        assert_eq!(gate.check(1_400, metrics(2576.0, 640.0), 100, 32.0, 0.0), GateDecision::Fire);
        assert_eq!(gate.check(1_400, near_end, 120, 32.0, 0.0), GateDecision::Fire);
        assert_eq!(gate.check(1_400, metrics(0.0, 640.0), 20, 32.0, 0.0), GateDecision::Fire);
    }

    fn infinite(calls: Arc<AtomicUsize>, fail: bool) -> VirtualizationFeature {
        let config = VirtualizationConfig {
            row_height: 32.0,
            overscan: 5,
            mode: VirtualizationMode::Infinite,
            load_more_offset: 64.0,
            viewport_height: 640.0,
            ..Default::default()
        };
        let load_more: LoadMore = Arc::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if fail {
                    Err::<(), BoxError>("backend down".into())
                } else {
                    Ok(())
                }
            }
            .boxed()
        });
        let mut feature = VirtualizationFeature::new(&config, Some(load_more));
        feature.set_row_count(50);
        feature
    }

    #[tokio::test]
    async fn scroll_to_end_fires_once_until_task_completes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut feature = infinite(Arc::clone(&calls), false);

        assert!(feature.on_scroll(100.0, 0).is_none());
        let task = feature.on_scroll(1000.0, 10).expect("near the end");
        assert!(feature.is_loading_more());
        assert!(feature.on_scroll(1001.0, 400).is_none());

        task.await.unwrap();
        assert!(!feature.is_loading_more());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Cooldown has passed but neither rows nor scroll moved enough.
        assert!(feature.on_scroll(1010.0, 500).is_none());

        feature.set_row_count(80);
        assert!(feature.on_scroll(2000.0, 520).is_some());
    }

    #[tokio::test]
    async fn dropped_task_releases_in_flight_guard() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut feature = infinite(calls, false);
        let task = feature.on_scroll(1000.0, 0).unwrap();
        assert!(feature.is_loading_more());
        drop(task);
        assert!(!feature.is_loading_more());
    }

    #[tokio::test]
    async fn failed_load_more_is_captured() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut feature = infinite(calls, true);

        let result = feature.on_scroll(1000.0, 0).unwrap().await;
        assert!(result.is_err());
        assert_eq!(feature.error().unwrap().message, "backend down");

        feature.clear_error();
        assert!(feature.error().is_none());
    }

    #[tokio::test]
    async fn new_query_reopens_the_gate() {
        use crate::{rows::FlatRow, RowAccessors, SortEntry, TableStateSnapshot};

        fn sync_rows(feature: &mut VirtualizationFeature, snapshot: &TableStateSnapshot<()>, rows: usize) {
            let accessors = RowAccessors::<()>::new();
            let visible: Vec<FlatRow> = (0..rows)
                .map(|n| FlatRow {
                    id: n.to_string(),
                    parent_id: None,
                    depth: 0,
                    index_in_parent: n,
                    has_children: false,
                    is_expanded: false,
                })
                .collect();
            let ctx = FeatureContext {
                rows: &[],
                snapshot,
                total: None,
                accessors: &accessors,
                row_ids: &[],
                expandable_ids: &[],
                visible_rows: &visible,
            };
            FeatureRuntime::<(), ()>::sync(feature, &ctx);
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let mut feature = infinite(Arc::clone(&calls), false);
        let snapshot = TableStateSnapshot::new(100, ());
        sync_rows(&mut feature, &snapshot, 100);

        // 100 rows * 32px, triggered at the bottom.
        feature.on_scroll(2600.0, 0).expect("bottom of the first list").await.unwrap();

        let sorted = snapshot.clone().with_sort(vec![SortEntry::asc("name")]);
        sync_rows(&mut feature, &sorted, 30);
        assert_eq!(feature.metrics().scroll_top, 0.0);
        assert_eq!(feature.window().start, 0);

        // 30 rows * 32px = 960px; 320 + 640 reaches the end.
        assert!(feature.on_scroll(320.0, 10_000).is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn fixed_mode_never_loads_more() {
        let mut feature = VirtualizationFeature::new(&VirtualizationConfig::default(), None);
        feature.set_row_count(10);
        assert!(feature.on_resize(2000.0, 0).is_none());
        assert_eq!(feature.window().end, 10);
    }
}
