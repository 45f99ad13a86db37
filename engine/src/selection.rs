//! Row selection.
//!
//! In page mode the page-local [`RowSelectionState`] is the selection. In
//! cross-page mode the source of truth is a [`CrossPageSelection`]: either the
//! set of selected ids (`Include`) or the set of deselected ids when
//! everything matching the filters is selected (`Exclude`). The page-local
//! map is then derived from it and every write to the map is reconciled back
//! into the set.
//!
//! Cross-page selection is scoped to the filters: a filter change resets it.
//! Page, size and sort changes only reset the page-local map.

use crate::{
    config::{FetchAllIds, SelectionConfig},
    feature::{FeatureContext, FeatureKind, FeatureRuntime},
    options::{bind, ActionKind, ActionPatch, TableOptionsPatch},
    virtualization::InFlight,
    Filters, MutationError, MutationSource, RowId,
};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tracing::{debug, warn};

/// Selected rows of the current page: `row id -> true`.
///
/// Entries mapped to `false` are treated as absent.
pub type RowSelectionState = BTreeMap<RowId, bool>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionMode {
    /// Selection lives on the current page and is lost on any query change
    #[default]
    #[serde(rename = "page")]
    Page,
    /// Selection survives paging and sorting, scoped to the filters
    #[serde(rename = "cross-page")]
    CrossPage,
}

/// How "select all matching" is carried out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectAllStrategy {
    /// Switch to `Exclude(∅)` without enumerating ids
    #[default]
    Client,
    /// Ask the host for every matching id
    Server,
}

/// Selection across pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum CrossPageSelection {
    /// Exactly these rows are selected
    Include {
        #[serde(rename = "rowIds")]
        row_ids: BTreeSet<RowId>,
    },
    /// Every matching row except these is selected
    Exclude {
        #[serde(rename = "rowIds")]
        row_ids: BTreeSet<RowId>,
    },
}

impl CrossPageSelection {
    /// `Include(∅)`: nothing selected.
    pub fn empty() -> Self {
        CrossPageSelection::Include {
            row_ids: BTreeSet::new(),
        }
    }

    /// Everything matching the filters.
    pub fn all() -> Self {
        CrossPageSelection::Exclude {
            row_ids: BTreeSet::new(),
        }
    }

    pub fn is_selected(&self, id: &str) -> bool {
        match self {
            CrossPageSelection::Include { row_ids } => row_ids.contains(id),
            CrossPageSelection::Exclude { row_ids } => !row_ids.contains(id),
        }
    }

    pub fn row_ids(&self) -> &BTreeSet<RowId> {
        match self {
            CrossPageSelection::Include { row_ids } | CrossPageSelection::Exclude { row_ids } => row_ids,
        }
    }

    pub fn is_exclude(&self) -> bool {
        matches!(self, CrossPageSelection::Exclude { .. })
    }
}

impl Default for CrossPageSelection {
    fn default() -> Self {
        Self::empty()
    }
}

/// Number of selected rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectedCount {
    Count(u64),
    /// Everything matching, with the total unknown
    All,
}

/// Result of [`reconcile_row_selection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub selection: CrossPageSelection,
    /// What the page actually shows after the cap was applied
    pub row_selection: RowSelectionState,
    /// Ids the user asked for that did not fit under the cap, in page order
    pub refused: Vec<RowId>,
}

/// Result of a select-all-matching request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectAllOutcome {
    Selected(SelectedCount),
    /// More rows match than `max_selection` allows; nothing changed
    ExceedsLimit { count: u64, max: usize },
    /// `fetch_all_ids` failed; the error is kept in feature state
    Failed(MutationError),
    /// Not in cross-page mode, nothing has been loaded yet, or a server
    /// select-all is already running
    Unavailable,
}

/// A select-all-matching request, for the host to drive.
///
/// It does not borrow the table, so the host can keep recomputing while
/// `fetch_all_ids` runs. A fetched selection is applied on the next
/// recompute, unless the filters changed or the selection was cleared in
/// the meantime.
#[must_use = "a server select-all only runs when the task is polled"]
pub struct SelectAllTask {
    inner: TaskInner,
}

enum TaskInner {
    Ready(Option<SelectAllOutcome>),
    Pending(BoxFuture<'static, SelectAllOutcome>),
}

impl SelectAllTask {
    pub(crate) fn ready(outcome: SelectAllOutcome) -> Self {
        Self {
            inner: TaskInner::Ready(Some(outcome)),
        }
    }

    /// The outcome, when it was decided without waiting on the host.
    pub fn resolved(&self) -> Option<&SelectAllOutcome> {
        match &self.inner {
            TaskInner::Ready(outcome) => outcome.as_ref(),
            TaskInner::Pending(_) => None,
        }
    }
}

impl Future for SelectAllTask {
    type Output = SelectAllOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.inner {
            TaskInner::Ready(outcome) => Poll::Ready(outcome.take().unwrap_or(SelectAllOutcome::Unavailable)),
            TaskInner::Pending(future) => future.as_mut().poll(cx),
        }
    }
}

impl std::fmt::Debug for SelectAllTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectAllTask")
            .field("resolved", &self.resolved())
            .finish_non_exhaustive()
    }
}

/// What a finished server select-all left behind.
struct Fetched {
    epoch: u64,
    result: Result<Vec<RowId>, MutationError>,
}

fn wants(desired: &RowSelectionState, id: &str) -> bool {
    desired.get(id).copied().unwrap_or(false)
}

/// The page-local view of `selection` for the rows in `page_ids`.
pub fn derive_row_selection_from_cross_page(
    selection: &CrossPageSelection,
    page_ids: &[RowId],
) -> RowSelectionState {
    page_ids
        .iter()
        .filter(|id| selection.is_selected(id))
        .map(|id| (id.clone(), true))
        .collect()
}

/// Fold a desired page-local selection back into `current`.
///
/// Only ids in `page_ids` are considered. With a cap in `Include` mode,
/// deselections are applied first, then new selections are admitted in page
/// order until the cap is reached; the rest are returned as refused.
pub fn reconcile_row_selection(
    current: &CrossPageSelection,
    page_ids: &[RowId],
    desired: &RowSelectionState,
    max_selection: Option<usize>,
) -> Reconciled {
    let mut refused = Vec::new();

    let selection = match current {
        CrossPageSelection::Exclude { row_ids } => {
            let mut row_ids = row_ids.clone();
            for id in page_ids {
                if wants(desired, id) {
                    row_ids.remove(id);
                } else {
                    row_ids.insert(id.clone());
                }
            }
            CrossPageSelection::Exclude { row_ids }
        }
        CrossPageSelection::Include { row_ids } => {
            let mut row_ids = row_ids.clone();
            match max_selection {
                None => {
                    for id in page_ids {
                        if wants(desired, id) {
                            row_ids.insert(id.clone());
                        } else {
                            row_ids.remove(id);
                        }
                    }
                }
                Some(max) => {
                    for id in page_ids {
                        if !wants(desired, id) {
                            row_ids.remove(id);
                        }
                    }
                    for id in page_ids {
                        if !wants(desired, id) || row_ids.contains(id) {
                            continue;
                        }
                        if row_ids.len() < max {
                            row_ids.insert(id.clone());
                        } else {
                            refused.push(id.clone());
                        }
                    }
                }
            }
            CrossPageSelection::Include { row_ids }
        }
    };

    let row_selection = derive_row_selection_from_cross_page(&selection, page_ids);
    Reconciled {
        selection,
        row_selection,
        refused,
    }
}

/// Selection feature.
pub struct SelectionFeature<F> {
    initial_mode: SelectionMode,
    mode: SelectionMode,
    strategy: SelectAllStrategy,
    max_selection: Option<usize>,
    fetch_all_ids: Option<FetchAllIds<F>>,
    cross_page: CrossPageSelection,
    row_selection: RowSelectionState,
    page_ids: Vec<RowId>,
    total: Option<u64>,
    filters: Option<F>,
    filters_key: Option<String>,
    view_key: Option<String>,
    error: Option<MutationError>,
    selecting_all: Arc<AtomicBool>,
    fetched: Arc<Mutex<Option<Fetched>>>,
    /// Bumped whenever the selection is cleared; older fetches are dropped
    epoch: u64,
}

impl<F: Filters> SelectionFeature<F> {
    pub fn new(config: &SelectionConfig, fetch_all_ids: Option<FetchAllIds<F>>) -> Self {
        Self {
            initial_mode: config.mode,
            mode: config.mode,
            strategy: config.strategy(),
            max_selection: config.max_selection(),
            fetch_all_ids,
            cross_page: CrossPageSelection::empty(),
            row_selection: RowSelectionState::new(),
            page_ids: Vec::new(),
            total: None,
            filters: None,
            filters_key: None,
            view_key: None,
            error: None,
            selecting_all: Arc::new(AtomicBool::new(false)),
            fetched: Arc::new(Mutex::new(None)),
            epoch: 0,
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn max_selection(&self) -> Option<usize> {
        self.max_selection
    }

    pub fn cross_page(&self) -> &CrossPageSelection {
        &self.cross_page
    }

    pub fn row_selection(&self) -> &RowSelectionState {
        &self.row_selection
    }

    pub fn error(&self) -> Option<&MutationError> {
        self.error.as_ref()
    }

    /// A server select-all is waiting for `fetch_all_ids`.
    pub fn is_selecting_all(&self) -> bool {
        self.selecting_all.load(Ordering::SeqCst)
    }

    pub fn is_row_selected(&self, id: &str) -> bool {
        wants(&self.row_selection, id)
    }

    pub fn selected_count(&self) -> SelectedCount {
        match (self.mode, &self.cross_page) {
            (SelectionMode::Page, _) => {
                SelectedCount::Count(self.row_selection.values().filter(|&&selected| selected).count() as u64)
            }
            (SelectionMode::CrossPage, CrossPageSelection::Exclude { row_ids }) => match self.total {
                Some(total) => SelectedCount::Count(total.saturating_sub(row_ids.len() as u64)),
                None => SelectedCount::All,
            },
            (SelectionMode::CrossPage, CrossPageSelection::Include { row_ids }) => {
                let len = row_ids.len() as u64;
                SelectedCount::Count(self.total.map_or(len, |total| len.min(total)))
            }
        }
    }

    pub fn is_all_selected(&self) -> bool {
        match (self.mode, &self.cross_page) {
            (SelectionMode::Page, _) => {
                !self.page_ids.is_empty() && self.page_ids.iter().all(|id| self.is_row_selected(id))
            }
            (SelectionMode::CrossPage, CrossPageSelection::Exclude { row_ids }) => row_ids.is_empty(),
            (SelectionMode::CrossPage, CrossPageSelection::Include { row_ids }) => {
                matches!(self.total, Some(total) if total > 0 && row_ids.len() as u64 >= total)
            }
        }
    }

    /// Apply a desired page-local selection. Returns the ids refused by the cap.
    pub fn set_row_selection(&mut self, desired: RowSelectionState) -> Vec<RowId> {
        let current = match self.mode {
            SelectionMode::CrossPage => self.cross_page.clone(),
            SelectionMode::Page => CrossPageSelection::Include {
                row_ids: self
                    .row_selection
                    .iter()
                    .filter(|(_, &selected)| selected)
                    .map(|(id, _)| id.clone())
                    .collect(),
            },
        };

        let reconciled = reconcile_row_selection(&current, &self.page_ids, &desired, self.max_selection);
        if !reconciled.refused.is_empty() {
            debug!(
                refused = reconciled.refused.len(),
                max = ?self.max_selection,
                "selection cap reached"
            );
        }
        if self.mode == SelectionMode::CrossPage {
            self.cross_page = reconciled.selection;
        }
        self.row_selection = reconciled.row_selection;
        reconciled.refused
    }

    /// Flip one row of the current page.
    pub fn toggle_row(&mut self, id: &str) -> Vec<RowId> {
        let mut desired = self.row_selection.clone();
        if self.is_row_selected(id) {
            desired.remove(id);
        } else {
            desired.insert(id.to_string(), true);
        }
        self.set_row_selection(desired)
    }

    /// Select every row of the current page, in row order, up to the cap.
    pub fn select_all_current_page(&mut self) -> Vec<RowId> {
        let desired = self.page_ids.iter().map(|id| (id.clone(), true)).collect();
        self.set_row_selection(desired)
    }

    /// Select every row matching the current filters.
    ///
    /// Refuses instead of truncating when more rows match than the cap allows.
    /// The client strategy resolves at once; the server strategy returns a
    /// task that waits on `fetch_all_ids`.
    pub fn select_all_matching(&mut self) -> SelectAllTask {
        if self.mode != SelectionMode::CrossPage {
            debug!("select all matching ignored outside cross-page mode");
            return SelectAllTask::ready(SelectAllOutcome::Unavailable);
        }
        if let (Some(total), Some(max)) = (self.total, self.max_selection) {
            if total > max as u64 {
                debug!(total, max, "select all matching refused: exceeds max selection");
                return SelectAllTask::ready(SelectAllOutcome::ExceedsLimit { count: total, max });
            }
        }

        match self.strategy {
            SelectAllStrategy::Client => {
                self.cross_page = CrossPageSelection::all();
                self.rederive();
                SelectAllTask::ready(SelectAllOutcome::Selected(self.selected_count()))
            }
            SelectAllStrategy::Server => {
                let (Some(fetch_all_ids), Some(filters)) = (self.fetch_all_ids.clone(), self.filters.clone())
                else {
                    return SelectAllTask::ready(SelectAllOutcome::Unavailable);
                };
                if self.is_selecting_all() {
                    debug!("select all matching ignored: already running");
                    return SelectAllTask::ready(SelectAllOutcome::Unavailable);
                }

                let guard = InFlight::raise(Arc::clone(&self.selecting_all));
                let slot = Arc::clone(&self.fetched);
                let epoch = self.epoch;
                let max_selection = self.max_selection;
                let future = async move {
                    let _guard = guard;
                    let (result, outcome) = match fetch_all_ids(filters).await {
                        Ok(ids) => match max_selection {
                            Some(max) if ids.len() > max => {
                                debug!(count = ids.len(), max, "select all matching refused: exceeds max selection");
                                return SelectAllOutcome::ExceedsLimit {
                                    count: ids.len() as u64,
                                    max,
                                };
                            }
                            _ => {
                                let count = SelectedCount::Count(ids.len() as u64);
                                (Ok(ids), SelectAllOutcome::Selected(count))
                            }
                        },
                        Err(e) => {
                            let error = MutationError::new(MutationSource::FetchAllIds, &e);
                            warn!(error = %error.message, "fetchAllIds failed");
                            (Err(error.clone()), SelectAllOutcome::Failed(error))
                        }
                    };
                    *crate::adapter::lock(&slot) = Some(Fetched { epoch, result });
                    outcome
                };
                SelectAllTask {
                    inner: TaskInner::Pending(Box::pin(future)),
                }
            }
        }
    }

    /// Apply a finished server select-all. Returns whether the selection
    /// changed.
    pub fn settle(&mut self) -> bool {
        let Some(fetched) = crate::adapter::lock(&self.fetched).take() else {
            return false;
        };
        if fetched.epoch != self.epoch {
            debug!("stale select-all result dropped");
            return false;
        }
        match fetched.result {
            Ok(ids) => {
                self.cross_page = CrossPageSelection::Include {
                    row_ids: ids.into_iter().collect(),
                };
                self.error = None;
                self.rederive();
                true
            }
            Err(error) => {
                self.error = Some(error);
                false
            }
        }
    }

    /// Back to nothing selected.
    pub fn clear(&mut self) {
        self.epoch += 1;
        self.cross_page = CrossPageSelection::empty();
        self.row_selection.clear();
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Switch between page and cross-page mode; clears the selection.
    pub fn set_mode(&mut self, mode: SelectionMode) {
        if self.mode == mode {
            return;
        }
        debug!(from = ?self.mode, to = ?mode, "selection mode changed; selection reset");
        self.mode = mode;
        self.clear();
    }

    fn rederive(&mut self) {
        if self.mode == SelectionMode::CrossPage {
            self.row_selection = derive_row_selection_from_cross_page(&self.cross_page, &self.page_ids);
        }
    }
}

impl<Row, F: Filters> FeatureRuntime<Row, F> for SelectionFeature<F> {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Selection
    }

    fn sync(&mut self, ctx: &FeatureContext<'_, Row, F>) {
        let filters_key = ctx.snapshot.filters_key();
        let view_key = ctx.snapshot.view_key();

        let filters_changed = self.filters_key.as_ref().is_some_and(|prev| *prev != filters_key);
        let view_changed = self.view_key.as_ref().is_some_and(|prev| *prev != view_key);

        self.settle();
        if filters_changed {
            debug!("filters changed; selection reset");
            self.clear();
        } else if view_changed {
            self.row_selection.clear();
        }

        self.filters_key = Some(filters_key);
        self.view_key = Some(view_key);
        self.filters = Some(ctx.snapshot.filters.clone());
        self.total = ctx.total;
        if self.page_ids.as_slice() != ctx.row_ids {
            self.page_ids = ctx.row_ids.to_vec();
            if self.mode == SelectionMode::Page {
                let page_ids = &self.page_ids;
                self.row_selection.retain(|id, _| page_ids.contains(id));
            }
        }
        self.rederive();
    }

    fn patch_table_options(&self, _ctx: &FeatureContext<'_, Row, F>) -> TableOptionsPatch {
        TableOptionsPatch {
            enable_row_selection: Some(true),
            row_selection: Some(self.row_selection.clone()),
            ..Default::default()
        }
        .with_meta("selection", json!({ "mode": self.mode }))
    }

    fn patch_actions(&self) -> ActionPatch {
        bind(
            FeatureKind::Selection,
            &[
                ActionKind::SetRowSelection,
                ActionKind::ToggleRowSelected,
                ActionKind::SelectAllCurrentPage,
                ActionKind::SelectAllMatching,
                ActionKind::ClearSelection,
                ActionKind::ClearSelectionError,
                ActionKind::SetSelectionMode,
            ],
        )
    }

    fn on_reset(&mut self) {
        self.mode = self.initial_mode;
        self.clear();
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::CrossPageConfig, BoxError, RowAccessors, TableStateSnapshot};
    use futures::FutureExt;
    use std::sync::Arc;

    fn ids(list: &[&str]) -> Vec<RowId> {
        list.iter().map(|id| id.to_string()).collect()
    }

    fn desired(list: &[&str]) -> RowSelectionState {
        list.iter().map(|id| (id.to_string(), true)).collect()
    }

    fn include(list: &[&str]) -> CrossPageSelection {
        CrossPageSelection::Include {
            row_ids: list.iter().map(|id| id.to_string()).collect(),
        }
    }

    fn exclude(list: &[&str]) -> CrossPageSelection {
        CrossPageSelection::Exclude {
            row_ids: list.iter().map(|id| id.to_string()).collect(),
        }
    }

    fn cross_page(max_selection: Option<usize>, strategy: SelectAllStrategy) -> SelectionConfig {
        SelectionConfig {
            mode: SelectionMode::CrossPage,
            cross_page: Some(CrossPageConfig {
                select_all_strategy: strategy,
                max_selection,
            }),
            ..Default::default()
        }
    }

    fn sync<F: Filters>(
        feature: &mut SelectionFeature<F>,
        snapshot: &TableStateSnapshot<F>,
        row_ids: &[RowId],
        total: Option<u64>,
    ) {
        let accessors = RowAccessors::<()>::new();
        let ctx = FeatureContext {
            rows: &[],
            snapshot,
            total,
            accessors: &accessors,
            row_ids,
            expandable_ids: &[],
            visible_rows: &[],
        };
        FeatureRuntime::<(), F>::sync(feature, &ctx);
    }

    #[test]
    fn derive_intersects_include_and_complements_exclude() {
        let page = ids(&["a", "b", "c"]);
        assert_eq!(
            derive_row_selection_from_cross_page(&include(&["a", "z"]), &page),
            desired(&["a"])
        );
        assert_eq!(
            derive_row_selection_from_cross_page(&exclude(&["b"]), &page),
            desired(&["a", "c"])
        );
    }

    #[test]
    fn reconcile_exclude_mode_moves_ids_in_and_out() {
        let page = ids(&["a", "b", "c"]);
        let result = reconcile_row_selection(&exclude(&["a", "x"]), &page, &desired(&["a", "b"]), None);
        assert_eq!(result.selection, exclude(&["c", "x"]));
        assert_eq!(result.row_selection, desired(&["a", "b"]));
    }

    #[test]
    fn reconcile_include_mode_keeps_other_pages() {
        let page = ids(&["a", "b"]);
        let result = reconcile_row_selection(&include(&["a", "p2"]), &page, &desired(&["b"]), None);
        assert_eq!(result.selection, include(&["b", "p2"]));
        assert!(result.refused.is_empty());
    }

    #[test]
    fn cap_of_two_admits_first_two_in_page_order() {
        let page = ids(&["a", "b", "c"]);
        let result = reconcile_row_selection(&include(&[]), &page, &desired(&["c", "a", "b"]), Some(2));
        assert_eq!(result.selection, include(&["a", "b"]));
        assert_eq!(result.row_selection, desired(&["a", "b"]));
        assert_eq!(result.refused, ids(&["c"]));
    }

    #[test]
    fn cap_applies_deselections_before_admissions() {
        let page = ids(&["a", "b", "c"]);
        let result = reconcile_row_selection(&include(&["a", "b"]), &page, &desired(&["b", "c"]), Some(2));
        assert_eq!(result.selection, include(&["b", "c"]));
        assert!(result.refused.is_empty());
    }

    #[test]
    fn three_toggles_with_cap_of_two() {
        let mut feature = SelectionFeature::<()>::new(&cross_page(Some(2), SelectAllStrategy::Client), None);
        sync(&mut feature, &TableStateSnapshot::new(10, ()), &ids(&["a", "b", "c"]), Some(3));

        assert!(feature.toggle_row("a").is_empty());
        assert!(feature.toggle_row("b").is_empty());
        assert_eq!(feature.toggle_row("c"), ids(&["c"]));

        assert_eq!(feature.row_selection(), &desired(&["a", "b"]));
        assert_eq!(feature.selected_count(), SelectedCount::Count(2));
    }

    #[test]
    fn page_mode_cap_limits_select_all_current_page() {
        let config = SelectionConfig {
            cross_page: Some(CrossPageConfig {
                max_selection: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut feature = SelectionFeature::<()>::new(&config, None);
        sync(&mut feature, &TableStateSnapshot::new(10, ()), &ids(&["a", "b", "c"]), None);

        let refused = feature.select_all_current_page();
        assert_eq!(refused, ids(&["c"]));
        assert_eq!(feature.row_selection(), &desired(&["a", "b"]));
    }

    #[test]
    fn select_all_current_page_then_clear_is_mount_state() {
        let mut feature = SelectionFeature::<()>::new(&cross_page(None, SelectAllStrategy::Client), None);
        sync(&mut feature, &TableStateSnapshot::new(10, ()), &ids(&["a", "b"]), Some(10));
        feature.select_all_current_page();
        assert_eq!(feature.cross_page(), &include(&["a", "b"]));

        feature.clear();
        assert_eq!(feature.cross_page(), &CrossPageSelection::empty());
        assert!(feature.row_selection().is_empty());
    }

    #[test]
    fn page_change_keeps_cross_page_selection() {
        let mut feature = SelectionFeature::<()>::new(&cross_page(None, SelectAllStrategy::Client), None);
        let page1 = TableStateSnapshot::new(2, ());
        sync(&mut feature, &page1, &ids(&["a", "b"]), Some(4));
        feature.toggle_row("a");

        sync(&mut feature, &page1.clone().with_page(2), &ids(&["c", "d"]), Some(4));
        assert_eq!(feature.cross_page(), &include(&["a"]));
        assert!(feature.row_selection().is_empty());

        sync(&mut feature, &page1, &ids(&["a", "b"]), Some(4));
        assert!(feature.is_row_selected("a"));
    }

    #[test]
    fn filter_change_resets_cross_page_selection() {
        let mut feature =
            SelectionFeature::<Option<String>>::new(&cross_page(None, SelectAllStrategy::Client), None);
        let open = TableStateSnapshot::new(10, Some("open".to_string()));
        sync(&mut feature, &open, &ids(&["a"]), Some(1));
        feature.toggle_row("a");

        sync(&mut feature, &open.clone().with_filters(Some("closed".into())), &ids(&["a"]), Some(1));
        assert_eq!(feature.cross_page(), &CrossPageSelection::empty());
        assert!(feature.row_selection().is_empty());
    }

    #[test]
    fn page_mode_selection_is_lost_on_sort_change() {
        let mut feature = SelectionFeature::<()>::new(&SelectionConfig::default(), None);
        let snapshot = TableStateSnapshot::new(10, ());
        sync(&mut feature, &snapshot, &ids(&["a", "b"]), None);
        feature.toggle_row("b");
        assert!(feature.is_row_selected("b"));

        let sorted = snapshot.with_sort(vec![crate::SortEntry::asc("name")]);
        sync(&mut feature, &sorted, &ids(&["b", "a"]), None);
        assert!(!feature.is_row_selected("b"));
    }

    #[test]
    fn total_selected_in_exclude_mode() {
        let mut feature = SelectionFeature::<()>::new(&cross_page(None, SelectAllStrategy::Client), None);
        feature.mode = SelectionMode::CrossPage;
        feature.cross_page = exclude(&["a", "b"]);
        feature.total = Some(10);
        assert_eq!(feature.selected_count(), SelectedCount::Count(8));
        assert!(!feature.is_all_selected());

        feature.total = None;
        assert_eq!(feature.selected_count(), SelectedCount::All);
    }

    #[tokio::test]
    async fn client_select_all_matching_is_exclude_empty() {
        let mut feature = SelectionFeature::<()>::new(&cross_page(None, SelectAllStrategy::Client), None);
        sync(&mut feature, &TableStateSnapshot::new(10, ()), &ids(&["a", "b"]), Some(40));

        let outcome = feature.select_all_matching().await;
        assert_eq!(outcome, SelectAllOutcome::Selected(SelectedCount::Count(40)));
        assert_eq!(feature.cross_page(), &CrossPageSelection::all());
        assert!(feature.is_all_selected());
        assert_eq!(feature.row_selection(), &desired(&["a", "b"]));
    }

    #[tokio::test]
    async fn select_all_matching_refuses_over_cap() {
        let mut feature = SelectionFeature::<()>::new(&cross_page(Some(10), SelectAllStrategy::Client), None);
        sync(&mut feature, &TableStateSnapshot::new(10, ()), &ids(&["a"]), Some(11));

        let outcome = feature.select_all_matching().await;
        assert_eq!(outcome, SelectAllOutcome::ExceedsLimit { count: 11, max: 10 });
        assert_eq!(feature.cross_page(), &CrossPageSelection::empty());
    }

    #[tokio::test]
    async fn server_select_all_matching_includes_fetched_ids() {
        let fetch: FetchAllIds<()> =
            Arc::new(|_: ()| async { Ok::<_, BoxError>(vec!["a".to_string(), "z".to_string()]) }.boxed());
        let mut feature = SelectionFeature::new(&cross_page(Some(5), SelectAllStrategy::Server), Some(fetch));
        sync(&mut feature, &TableStateSnapshot::new(10, ()), &ids(&["a", "b"]), None);

        let outcome = feature.select_all_matching().await;
        assert_eq!(outcome, SelectAllOutcome::Selected(SelectedCount::Count(2)));
        assert!(feature.settle());
        assert_eq!(feature.cross_page(), &include(&["a", "z"]));
        assert_eq!(feature.row_selection(), &desired(&["a"]));
        assert!(!feature.is_selecting_all());
    }

    #[tokio::test]
    async fn server_select_all_refuses_when_fetched_ids_exceed_cap() {
        let fetch: FetchAllIds<()> =
            Arc::new(|_: ()| async { Ok::<_, BoxError>((0..4).map(|i| i.to_string()).collect()) }.boxed());
        let mut feature = SelectionFeature::new(&cross_page(Some(3), SelectAllStrategy::Server), Some(fetch));
        sync(&mut feature, &TableStateSnapshot::new(10, ()), &[], None);

        let outcome = feature.select_all_matching().await;
        assert_eq!(outcome, SelectAllOutcome::ExceedsLimit { count: 4, max: 3 });
        assert!(!feature.settle());
        assert_eq!(feature.cross_page(), &CrossPageSelection::empty());
    }

    #[tokio::test]
    async fn failed_fetch_is_captured_until_cleared() {
        let fetch: FetchAllIds<()> = Arc::new(|_: ()| async { Err::<Vec<RowId>, BoxError>("offline".into()) }.boxed());
        let mut feature = SelectionFeature::new(&cross_page(None, SelectAllStrategy::Server), Some(fetch));
        sync(&mut feature, &TableStateSnapshot::new(10, ()), &[], None);

        let outcome = feature.select_all_matching().await;
        assert!(matches!(outcome, SelectAllOutcome::Failed(_)));
        assert!(!feature.settle());
        assert_eq!(feature.error().unwrap().message, "offline");

        feature.clear_error();
        assert!(feature.error().is_none());
    }

    #[tokio::test]
    async fn cancelled_select_all_releases_the_flag() {
        let fetch: FetchAllIds<()> = Arc::new(|_: ()| futures::future::pending::<Result<Vec<RowId>, BoxError>>().boxed());
        let mut feature = SelectionFeature::new(&cross_page(None, SelectAllStrategy::Server), Some(fetch));
        sync(&mut feature, &TableStateSnapshot::new(10, ()), &ids(&["a"]), None);

        let task = feature.select_all_matching();
        assert!(feature.is_selecting_all());
        assert_eq!(feature.select_all_matching().resolved(), Some(&SelectAllOutcome::Unavailable));

        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(10), task).await;
        assert!(timed_out.is_err());
        assert!(!feature.is_selecting_all());
    }

    #[tokio::test]
    async fn select_all_result_is_dropped_after_clear() {
        let fetch: FetchAllIds<String> =
            Arc::new(|_: String| async { Ok::<_, BoxError>(vec!["a".to_string()]) }.boxed());
        let mut feature = SelectionFeature::new(&cross_page(None, SelectAllStrategy::Server), Some(fetch));
        sync(&mut feature, &TableStateSnapshot::new(10, "x".to_string()), &ids(&["a"]), None);

        let task = feature.select_all_matching();
        feature.clear();
        assert_eq!(task.await, SelectAllOutcome::Selected(SelectedCount::Count(1)));

        sync(&mut feature, &TableStateSnapshot::new(10, "x".to_string()), &ids(&["a"]), None);
        assert_eq!(feature.cross_page(), &CrossPageSelection::empty());
        assert!(feature.row_selection().is_empty());
    }

    #[test]
    fn page_mode_forgets_rows_that_left_the_page() {
        let mut feature = SelectionFeature::<()>::new(&SelectionConfig::default(), None);
        let snapshot = TableStateSnapshot::new(10, ());
        sync(&mut feature, &snapshot, &ids(&["a", "b", "c"]), None);
        feature.toggle_row("a");
        feature.toggle_row("b");

        // Same query, refetched without "a".
        sync(&mut feature, &snapshot, &ids(&["b", "c"]), None);
        assert_eq!(feature.row_selection(), &desired(&["b"]));
        assert_eq!(feature.selected_count(), SelectedCount::Count(1));
    }

    #[test]
    fn set_mode_resets_selection() {
        let mut feature = SelectionFeature::<()>::new(&SelectionConfig::default(), None);
        sync(&mut feature, &TableStateSnapshot::new(10, ()), &ids(&["a"]), None);
        feature.toggle_row("a");

        feature.set_mode(SelectionMode::CrossPage);
        assert!(feature.row_selection().is_empty());
        assert_eq!(feature.mode(), SelectionMode::CrossPage);

        FeatureRuntime::<(), ()>::on_reset(&mut feature);
        assert_eq!(feature.mode(), SelectionMode::Page);
    }

    #[test]
    fn cross_page_selection_shape() {
        let value = serde_json::to_value(include(&["a"])).unwrap();
        assert_eq!(value, json!({"mode": "include", "rowIds": ["a"]}));
    }
}
