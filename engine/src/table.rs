//! DataTable - the engine entry point.
//!
//! A `DataTable` owns the enabled features, talks to the state adapter and
//! the data source, and produces an [`Instance`] on [`DataTable::recompute`].
//!
//! Actions never recompute by themselves. Snapshot actions go through the
//! adapter, which notifies the table; feature actions mutate feature state
//! directly. Either way the host calls `recompute` afterwards to get the new
//! instance.

use crate::{
    columns::{
        ColumnOrderFeature, ColumnPin, ColumnPinningFeature, ColumnPinningState, ColumnSizingFeature,
        ColumnVisibilityFeature,
    },
    config::DataTableOptions,
    display::{AnalyticsEvent, AnalyticsFeature, Density, DensityFeature},
    drag_sort::{DragSortFeature, DropEvent, DropSkip, ReorderTask},
    error::Result,
    expansion::{ExpandedState, ExpansionFeature},
    feature::{Feature, FeatureContext, FeatureKind},
    instance::{
        Activity, DragSortView, Errors, FiltersView, Instance, PaginationView, SelectionView, Status,
        TreeView, VirtualView,
    },
    memo::{Memo, Stable},
    options::{ActionKind, ActionSet, ColumnDef, PaginationState, TableOptions},
    rows::{flatten_visible, FlatRow, RowAccessors, RowIndex},
    selection::{RowSelectionState, SelectAllOutcome, SelectAllTask, SelectionFeature, SelectionMode},
    virtualization::{LoadMoreTask, VirtualizationFeature},
    ChangeReason, ColumnId, DataSource, Error, Filters, PageData, ResourceState, RowId, SortEntry,
    StateAdapter, Subscription, TableStateSnapshot, Timestamp,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Memo key comparing page data by identity.
struct DataKey<Row>(Option<Arc<PageData<Row>>>);

impl<Row> Clone for DataKey<Row> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<Row> PartialEq for DataKey<Row> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

/// Ids derived from one page of rows.
struct RowLayout {
    /// Pre-order, children included
    row_ids: Vec<RowId>,
    expandable_ids: Vec<RowId>,
}

impl RowLayout {
    fn build<Row>(rows: &[Row], accessors: &RowAccessors<Row>) -> Self {
        let index = RowIndex::build(rows, accessors);
        Self {
            row_ids: flatten_visible(&index, &ExpandedState::All)
                .into_iter()
                .map(|row| row.id)
                .collect(),
            expandable_ids: index.expandable_ids(),
        }
    }
}

/// Last published sub-views.
struct Views<F> {
    pagination: Stable<PaginationView>,
    filters: Stable<FiltersView<F>>,
    actions: Arc<ActionSet>,
    selection: Stable<SelectionView>,
    tree: Stable<TreeView>,
    drag_sort: Stable<DragSortView>,
    virtualization: Stable<VirtualView>,
    errors: Stable<Errors>,
    meta: Stable<Map<String, Value>>,
}

impl<F: Filters> Views<F> {
    fn new(filters: F, actions: ActionSet) -> Self {
        Self {
            pagination: Stable::default(),
            filters: Stable::new(FiltersView {
                value: filters,
                is_filtered: false,
            }),
            actions: Arc::new(actions),
            selection: Stable::default(),
            tree: Stable::default(),
            drag_sort: Stable::default(),
            virtualization: Stable::default(),
            errors: Stable::default(),
            meta: Stable::default(),
        }
    }

    fn assemble<Row>(&self, table: TableOptions<Row>, status: Status, activity: Activity) -> Instance<Row, F> {
        Instance {
            table: Arc::new(table),
            status,
            activity,
            pagination: self.pagination.get(),
            filters: self.filters.get(),
            actions: Arc::clone(&self.actions),
            selection: self.selection.get(),
            tree: self.tree.get(),
            drag_sort: self.drag_sort.get(),
            virtualization: self.virtualization.get(),
            errors: self.errors.get(),
            meta: self.meta.get(),
        }
    }
}

macro_rules! feature_lookup {
    ($($name:ident, $name_mut:ident => $variant:ident($ty:ty);)*) => {
        $(
            fn $name<Row, F>(features: &[Feature<Row, F>]) -> Option<&$ty> {
                features.iter().find_map(|feature| match feature {
                    Feature::$variant(inner) => Some(inner),
                    _ => None,
                })
            }

            fn $name_mut<Row, F>(features: &mut [Feature<Row, F>]) -> Option<&mut $ty> {
                features.iter_mut().find_map(|feature| match feature {
                    Feature::$variant(inner) => Some(inner),
                    _ => None,
                })
            }
        )*
    };
}

feature_lookup! {
    find_selection, find_selection_mut => Selection(SelectionFeature<F>);
    find_drag_sort, find_drag_sort_mut => DragSort(DragSortFeature<Row>);
    find_expansion, find_expansion_mut => Expansion(ExpansionFeature);
    find_virtualization, find_virtualization_mut => Virtualization(VirtualizationFeature);
    find_column_visibility, find_column_visibility_mut => ColumnVisibility(ColumnVisibilityFeature);
    find_column_sizing, find_column_sizing_mut => ColumnSizing(ColumnSizingFeature);
    find_column_pinning, find_column_pinning_mut => ColumnPinning(ColumnPinningFeature);
    find_column_order, find_column_order_mut => ColumnOrder(ColumnOrderFeature);
    find_density, find_density_mut => Density(DensityFeature);
    find_analytics, find_analytics_mut => Analytics(AnalyticsFeature);
}

/// The table engine.
pub struct DataTable<Row, F> {
    adapter: Arc<dyn StateAdapter<F>>,
    source: Box<dyn DataSource<Row, F>>,
    accessors: RowAccessors<Row>,
    columns: Vec<ColumnDef>,
    /// Enabled features in composition order
    features: Vec<Feature<Row, F>>,
    actions: ActionSet,
    /// Snapshot captured at mount; `reset_all` returns here
    initial: TableStateSnapshot<F>,
    /// Snapshot the current instance was computed from
    snapshot: TableStateSnapshot<F>,
    resource: ResourceState<Row>,
    dirty: Arc<AtomicBool>,
    _subscription: Subscription,
    layout: Memo<DataKey<Row>, RowLayout>,
    visible: Memo<(DataKey<Row>, ExpandedState), Vec<FlatRow>>,
    views: Views<F>,
    instance: Instance<Row, F>,
}

impl<Row, F> DataTable<Row, F>
where
    Row: Clone + Send + Sync + 'static,
    F: Filters,
{
    /// Validate the options, build the enabled features and compute the
    /// first instance.
    ///
    /// Fails fast on configuration errors and on an invalid adapter snapshot.
    pub fn new(
        options: DataTableOptions<Row, F>,
        adapter: Arc<dyn StateAdapter<F>>,
        source: Box<dyn DataSource<Row, F>>,
    ) -> Result<Self> {
        options.validate()?;

        let initial = adapter.get_snapshot();
        initial.validate()?;

        let features = build_features(&options);
        let actions = ActionSet::base().merge(features.iter().map(|feature| feature.runtime().patch_actions()));

        let dirty = Arc::new(AtomicBool::new(false));
        let listener_flag = Arc::clone(&dirty);
        let subscription = adapter.subscribe(Arc::new(move || listener_flag.store(true, Ordering::Release)));

        debug!(
            features = features.len(),
            page = initial.page,
            size = initial.size,
            "data table mounted"
        );

        let DataTableOptions { columns, accessors, .. } = options;
        let views = Views::new(initial.filters.clone(), actions.clone());
        let placeholder = views.assemble(
            base_options(&columns, &initial, None, accessors.is_hierarchical()),
            Status::Idle,
            Activity::default(),
        );

        let mut table = Self {
            adapter,
            source,
            accessors,
            columns,
            features,
            actions,
            snapshot: initial.clone(),
            initial,
            resource: ResourceState::idle(),
            dirty,
            _subscription: subscription,
            layout: Memo::new(),
            visible: Memo::new(),
            views,
            instance: placeholder,
        };
        table.recompute();
        Ok(table)
    }

    /// The last computed instance.
    pub fn instance(&self) -> &Instance<Row, F> {
        &self.instance
    }

    /// Snapshot the current instance was computed from.
    pub fn snapshot(&self) -> &TableStateSnapshot<F> {
        &self.snapshot
    }

    /// Snapshot captured at mount.
    pub fn initial_snapshot(&self) -> &TableStateSnapshot<F> {
        &self.initial
    }

    pub fn accessors(&self) -> &RowAccessors<Row> {
        &self.accessors
    }

    /// The adapter changed since the last recompute.
    pub fn needs_recompute(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn selection(&self) -> Option<&SelectionFeature<F>> {
        find_selection(&self.features)
    }

    pub fn drag_sort(&self) -> Option<&DragSortFeature<Row>> {
        find_drag_sort(&self.features)
    }

    pub fn expansion(&self) -> Option<&ExpansionFeature> {
        find_expansion(&self.features)
    }

    pub fn virtualization(&self) -> Option<&VirtualizationFeature> {
        find_virtualization(&self.features)
    }

    pub fn column_visibility(&self) -> Option<&ColumnVisibilityFeature> {
        find_column_visibility(&self.features)
    }

    pub fn column_sizing(&self) -> Option<&ColumnSizingFeature> {
        find_column_sizing(&self.features)
    }

    pub fn column_pinning(&self) -> Option<&ColumnPinningFeature> {
        find_column_pinning(&self.features)
    }

    pub fn column_order(&self) -> Option<&ColumnOrderFeature> {
        find_column_order(&self.features)
    }

    pub fn density(&self) -> Option<&DensityFeature> {
        find_density(&self.features)
    }

    pub fn analytics(&self) -> Option<&AnalyticsFeature> {
        find_analytics(&self.features)
    }

    /// Pick up adapter changes, resolve the current query and rebuild the
    /// instance.
    pub fn recompute(&mut self) -> &Instance<Row, F> {
        if self.dirty.swap(false, Ordering::AcqRel) {
            let next = self.adapter.get_snapshot();
            if next != self.snapshot {
                trace!(page = next.page, size = next.size, "snapshot picked up");
                self.snapshot = next;
            }
        }

        if find_selection_mut(&mut self.features).is_some_and(|selection| selection.settle()) {
            self.emit_selection_changed();
        }

        self.resource = self.source.resolve(&self.snapshot.query());
        self.instance = self.evaluate();
        &self.instance
    }

    fn evaluate(&mut self) -> Instance<Row, F> {
        let data = self.resource.data.clone();
        let rows: &[Row] = match &data {
            Some(page) => &page.rows,
            None => &[],
        };
        let total = data.as_ref().and_then(|page| page.total);
        let accessors = &self.accessors;

        let layout = self
            .layout
            .get_or_compute(DataKey(data.clone()), |_| RowLayout::build(rows, accessors));

        let expanded = match find_expansion(&self.features) {
            Some(expansion) => expansion.expanded().clone(),
            None => ExpandedState::All,
        };
        let visible = self
            .visible
            .get_or_compute((DataKey(data.clone()), expanded.clone()), |_| {
                flatten_visible(&RowIndex::build(rows, accessors), &expanded)
            });

        let ctx = FeatureContext {
            rows,
            snapshot: &self.snapshot,
            total,
            accessors,
            row_ids: &layout.row_ids,
            expandable_ids: &layout.expandable_ids,
            visible_rows: &visible,
        };
        for feature in &mut self.features {
            feature.runtime_mut().sync(&ctx);
        }

        let hierarchical = accessors.is_hierarchical();
        let table = base_options(&self.columns, &self.snapshot, data.clone(), hierarchical)
            .merge(self.features.iter().map(|feature| feature.runtime().patch_table_options(&ctx)));

        let status = Status::derive(&self.resource);
        let selection = find_selection(&self.features);
        let drag_sort = find_drag_sort(&self.features);
        let virtualization = find_virtualization(&self.features);

        let activity = Activity {
            is_initial_loading: self.resource.is_initial_loading,
            is_fetching: self.resource.is_fetching,
            is_refetching: self.resource.is_fetching && data.is_some(),
            is_loading_more: virtualization.is_some_and(|v| v.is_loading_more()),
            is_selecting_all: selection.is_some_and(|s| s.is_selecting_all()),
            is_dragging: drag_sort.is_some_and(|d| d.is_dragging()),
        };

        let page_count = data.as_ref().map(|page| page.page_count);
        self.views.pagination.update(PaginationView {
            page: self.snapshot.page,
            size: self.snapshot.size,
            page_index: self.snapshot.page_index(),
            page_count,
            total,
            can_previous: self.snapshot.page > 1,
            can_next: page_count.is_some_and(|count| self.snapshot.page < count),
        });

        self.views.filters.update(FiltersView {
            value: self.snapshot.filters.clone(),
            is_filtered: self.snapshot.filters != self.initial.filters,
        });

        self.views.selection.update(match selection {
            Some(selection) => SelectionView {
                enabled: true,
                mode: selection.mode(),
                row_selection: selection.row_selection().clone(),
                cross_page: (selection.mode() == SelectionMode::CrossPage).then(|| selection.cross_page().clone()),
                total_selected: selection.selected_count(),
                is_all_selected: selection.is_all_selected(),
                max_selection: selection.max_selection(),
            },
            None => SelectionView::default(),
        });

        self.views.tree.update(TreeView {
            is_hierarchical: hierarchical,
            expanded,
            rows: Arc::clone(&visible),
        });

        self.views.drag_sort.update(match drag_sort {
            Some(drag_sort) => DragSortView {
                enabled: true,
                is_dragging: drag_sort.is_dragging(),
                active_id: drag_sort.active_id().map(str::to_string),
            },
            None => DragSortView::default(),
        });

        self.views.virtualization.update(match virtualization {
            Some(virtualization) => VirtualView {
                enabled: true,
                mode: virtualization.mode(),
                window: virtualization.window(),
                row_count: virtualization.row_count(),
                total_height: virtualization.total_height(),
            },
            None => VirtualView::default(),
        });

        self.views.errors.update(Errors {
            data: self.resource.error.clone(),
            selection: selection.and_then(|s| s.error().cloned()),
            drag_sort: drag_sort.and_then(|d| d.error()),
            load_more: virtualization.and_then(|v| v.error()),
        });

        let mut meta = data
            .as_ref()
            .and_then(|page| page.extra_meta.clone())
            .unwrap_or_default();
        if let Some(key) = self.adapter.search_key() {
            meta.insert("searchKey".into(), Value::String(key));
        }
        self.views.meta.update(meta);

        self.views.assemble(table, status, activity)
    }

    // -- Core actions --

    /// Re-run the request for the current query.
    pub fn refetch(&mut self) {
        let query = self.adapter.get_snapshot().query();
        debug!(page = query.page, "refetch");
        self.source.refetch(&query);
    }

    /// Re-run the current query if it failed.
    pub fn retry(&mut self) {
        let query = self.adapter.get_snapshot().query();
        debug!(page = query.page, "retry");
        self.source.retry(&query);
    }

    /// Reset every feature and put the mount-time snapshot back.
    pub fn reset_all(&mut self) {
        for feature in &mut self.features {
            feature.runtime_mut().on_reset();
        }
        debug!(page = self.initial.page, size = self.initial.size, "reset all");
        self.adapter.set_snapshot(self.initial.clone(), ChangeReason::Reset);
        self.emit(AnalyticsEvent::Reset);
    }

    /// Go to a 1-indexed page. Page 0 is treated as page 1.
    pub fn set_page(&mut self, page: u32) {
        let page = page.max(1);
        self.commit(ChangeReason::Page, |next| next.page = page);
        self.emit(AnalyticsEvent::PageChanged { page });
    }

    /// Change the page size and go back to the first page.
    pub fn set_page_size(&mut self, size: u32) {
        if size == 0 {
            warn!("page size 0 ignored");
            return;
        }
        self.commit(ChangeReason::Size, |next| {
            next.size = size;
            next.page = 1;
        });
        self.emit(AnalyticsEvent::PageSizeChanged { size });
    }

    /// Replace the sort and go back to the first page.
    pub fn set_sort(&mut self, sort: Vec<SortEntry>) {
        let emitted = sort.clone();
        self.commit(ChangeReason::Sort, |next| {
            next.sort = sort;
            next.page = 1;
        });
        self.emit(AnalyticsEvent::SortChanged { sort: emitted });
    }

    pub fn clear_sort(&mut self) {
        self.set_sort(Vec::new());
    }

    /// Replace the filters and go back to the first page.
    pub fn set_filters(&mut self, filters: F) {
        self.commit(ChangeReason::Filters, |next| {
            next.filters = filters;
            next.page = 1;
        });
        self.emit(AnalyticsEvent::FiltersChanged);
    }

    /// Back to the filters the table was mounted with.
    pub fn reset_filters(&mut self) {
        let filters = self.initial.filters.clone();
        self.set_filters(filters);
    }

    /// Pagination callback of the rendering primitive (0-indexed).
    pub fn on_pagination_change(&mut self, pagination: PaginationState) {
        let current = self.adapter.get_snapshot();
        if pagination.page_size != current.size {
            self.set_page_size(pagination.page_size);
        } else {
            let page = pagination.page_index.saturating_add(1);
            if page != current.page {
                self.set_page(page);
            }
        }
    }

    /// Sorting callback of the rendering primitive.
    pub fn on_sorting_change(&mut self, sorting: Vec<SortEntry>) {
        self.set_sort(sorting);
    }

    fn commit(&mut self, reason: ChangeReason, change: impl FnOnce(&mut TableStateSnapshot<F>)) {
        let mut next = self.adapter.get_snapshot();
        change(&mut next);
        if let Err(e) = next.validate() {
            warn!(%reason, error = %e, "snapshot change rejected");
            return;
        }
        debug!(%reason, page = next.page, size = next.size, "snapshot change");
        self.adapter.set_snapshot(next, reason);
    }

    // -- Feature actions --

    fn live(&self, action: ActionKind) -> bool {
        let live = self.actions.is_live(action);
        if !live {
            trace!(?action, "action ignored: feature not enabled");
        }
        live
    }

    fn emit(&mut self, event: AnalyticsEvent) {
        if let Some(analytics) = find_analytics_mut(&mut self.features) {
            analytics.emit(event);
        }
    }

    fn emit_selection_changed(&mut self) {
        if let Some(count) = find_selection(&self.features).map(|s| s.selected_count()) {
            self.emit(AnalyticsEvent::SelectionChanged { count });
        }
    }

    /// Apply a page-local selection from the rendering primitive. Returns the
    /// ids refused by `max_selection`.
    pub fn set_row_selection(&mut self, desired: RowSelectionState) -> Vec<RowId> {
        if !self.live(ActionKind::SetRowSelection) {
            return Vec::new();
        }
        let Some(selection) = find_selection_mut(&mut self.features) else {
            return Vec::new();
        };
        let refused = selection.set_row_selection(desired);
        self.emit_selection_changed();
        refused
    }

    pub fn toggle_row_selected(&mut self, id: &str) -> Vec<RowId> {
        if !self.live(ActionKind::ToggleRowSelected) {
            return Vec::new();
        }
        let Some(selection) = find_selection_mut(&mut self.features) else {
            return Vec::new();
        };
        let refused = selection.toggle_row(id);
        self.emit_selection_changed();
        refused
    }

    pub fn select_all_current_page(&mut self) -> Vec<RowId> {
        if !self.live(ActionKind::SelectAllCurrentPage) {
            return Vec::new();
        }
        let Some(selection) = find_selection_mut(&mut self.features) else {
            return Vec::new();
        };
        let refused = selection.select_all_current_page();
        self.emit_selection_changed();
        refused
    }

    /// Select every row matching the current filters (cross-page mode only).
    ///
    /// A server select-all is applied by the first recompute after its task
    /// completes.
    pub fn select_all_matching(&mut self) -> SelectAllTask {
        if !self.live(ActionKind::SelectAllMatching) {
            return SelectAllTask::ready(SelectAllOutcome::Unavailable);
        }
        let Some(selection) = find_selection_mut(&mut self.features) else {
            return SelectAllTask::ready(SelectAllOutcome::Unavailable);
        };
        let task = selection.select_all_matching();
        if let Some(&SelectAllOutcome::Selected(count)) = task.resolved() {
            self.emit(AnalyticsEvent::SelectionChanged { count });
        }
        task
    }

    pub fn clear_selection(&mut self) {
        if !self.live(ActionKind::ClearSelection) {
            return;
        }
        if let Some(selection) = find_selection_mut(&mut self.features) {
            selection.clear();
        }
        self.emit_selection_changed();
    }

    pub fn clear_selection_error(&mut self) {
        if !self.live(ActionKind::ClearSelectionError) {
            return;
        }
        if let Some(selection) = find_selection_mut(&mut self.features) {
            selection.clear_error();
        }
    }

    /// Switch selection mode. Cross-page mode needs a row id accessor.
    pub fn set_selection_mode(&mut self, mode: SelectionMode) -> Result<()> {
        if !self.live(ActionKind::SetSelectionMode) {
            return Ok(());
        }
        if mode == SelectionMode::CrossPage && !self.accessors.has_row_id() {
            return Err(Error::CrossPageRequiresRowId);
        }
        if let Some(selection) = find_selection_mut(&mut self.features) {
            selection.set_mode(mode);
        }
        Ok(())
    }

    pub fn drag_start(&mut self, active_id: impl Into<RowId>) {
        if !self.live(ActionKind::DragStart) {
            return;
        }
        if let Some(drag_sort) = find_drag_sort_mut(&mut self.features) {
            drag_sort.on_drag_start(active_id);
        }
    }

    pub fn drag_cancel(&mut self) {
        if !self.live(ActionKind::DragCancel) {
            return;
        }
        if let Some(drag_sort) = find_drag_sort_mut(&mut self.features) {
            drag_sort.on_drag_cancel();
        }
    }

    /// Validate a drop against the rows on screen and hand it to `on_reorder`.
    pub fn drag_end(&mut self, event: DropEvent) -> ReorderTask {
        if !self.live(ActionKind::DragEnd) {
            return ReorderTask::skipped(DropSkip::Disabled);
        }
        let data = self.resource.data.clone();
        let rows: &[Row] = match &data {
            Some(page) => &page.rows,
            None => &[],
        };
        let Some(drag_sort) = find_drag_sort_mut(&mut self.features) else {
            return ReorderTask::skipped(DropSkip::Disabled);
        };

        let task = drag_sort.on_drag_end(rows, &self.accessors, &event);
        if let Some((target_parent_id, target_index)) = task.target() {
            self.emit(AnalyticsEvent::RowsReordered {
                active_id: event.active_id.clone(),
                target_parent_id: target_parent_id.map(str::to_string),
                target_index,
            });
        }
        task
    }

    pub fn clear_drag_sort_error(&mut self) {
        if !self.live(ActionKind::ClearDragSortError) {
            return;
        }
        if let Some(drag_sort) = find_drag_sort_mut(&mut self.features) {
            drag_sort.clear_error();
        }
    }

    pub fn toggle_row_expanded(&mut self, id: &str) {
        if !self.live(ActionKind::ToggleRowExpanded) {
            return;
        }
        if let Some(expansion) = find_expansion_mut(&mut self.features) {
            expansion.toggle(id);
        }
    }

    pub fn expand_all(&mut self) {
        if !self.live(ActionKind::ExpandAll) {
            return;
        }
        if let Some(expansion) = find_expansion_mut(&mut self.features) {
            expansion.expand_all();
        }
    }

    pub fn collapse_all(&mut self) {
        if !self.live(ActionKind::CollapseAll) {
            return;
        }
        if let Some(expansion) = find_expansion_mut(&mut self.features) {
            expansion.collapse_all();
        }
    }

    /// Report a scroll position. Returns the load-more task to drive when
    /// the infinite-loading gate fires.
    pub fn scroll(&mut self, scroll_top: f64, now: Timestamp) -> Option<LoadMoreTask> {
        if !self.live(ActionKind::Scroll) {
            return None;
        }
        let virtualization = find_virtualization_mut(&mut self.features)?;
        let task = virtualization.on_scroll(scroll_top, now)?;
        let row_count = virtualization.row_count();
        self.emit(AnalyticsEvent::LoadMoreTriggered { row_count });
        Some(task)
    }

    /// Report a viewport height change.
    pub fn resize(&mut self, viewport_height: f64, now: Timestamp) -> Option<LoadMoreTask> {
        if !self.live(ActionKind::Resize) {
            return None;
        }
        let virtualization = find_virtualization_mut(&mut self.features)?;
        let task = virtualization.on_resize(viewport_height, now)?;
        let row_count = virtualization.row_count();
        self.emit(AnalyticsEvent::LoadMoreTriggered { row_count });
        Some(task)
    }

    pub fn clear_load_more_error(&mut self) {
        if !self.live(ActionKind::ClearLoadMoreError) {
            return;
        }
        if let Some(virtualization) = find_virtualization_mut(&mut self.features) {
            virtualization.clear_error();
        }
    }

    pub fn set_column_visibility(&mut self, id: impl Into<ColumnId>, visible: bool) {
        if !self.live(ActionKind::SetColumnVisibility) {
            return;
        }
        if let Some(visibility) = find_column_visibility_mut(&mut self.features) {
            visibility.set(id, visible);
        }
    }

    pub fn toggle_column_visibility(&mut self, id: &str) {
        if !self.live(ActionKind::ToggleColumnVisibility) {
            return;
        }
        if let Some(visibility) = find_column_visibility_mut(&mut self.features) {
            visibility.toggle(id);
        }
    }

    /// Set a column width. Returns the stored (clamped) width.
    pub fn set_column_size(&mut self, id: impl Into<ColumnId>, width: u32) -> Option<u32> {
        if !self.live(ActionKind::SetColumnSize) {
            return None;
        }
        find_column_sizing_mut(&mut self.features).map(|sizing| sizing.set_size(id, width))
    }

    pub fn reset_column_sizing(&mut self) {
        if !self.live(ActionKind::ResetColumnSizing) {
            return;
        }
        if let Some(sizing) = find_column_sizing_mut(&mut self.features) {
            sizing.reset_sizing();
        }
    }

    pub fn pin_column(&mut self, id: &str, side: Option<ColumnPin>) {
        if !self.live(ActionKind::PinColumn) {
            return;
        }
        if let Some(pinning) = find_column_pinning_mut(&mut self.features) {
            pinning.pin(id, side);
        }
    }

    pub fn set_column_order(&mut self, order: Vec<ColumnId>) {
        if !self.live(ActionKind::SetColumnOrder) {
            return;
        }
        if let Some(column_order) = find_column_order_mut(&mut self.features) {
            column_order.set_order(order);
        }
    }

    pub fn set_density(&mut self, density: Density) {
        if !self.live(ActionKind::SetDensity) {
            return;
        }
        if let Some(feature) = find_density_mut(&mut self.features) {
            feature.set(density);
        }
    }

    /// Record a custom analytics event.
    pub fn track(&mut self, name: impl Into<String>, payload: Value) {
        if !self.live(ActionKind::Track) {
            return;
        }
        if let Some(analytics) = find_analytics_mut(&mut self.features) {
            analytics.track(name, payload);
        }
    }
}

/// Enabled features, in [`FeatureKind::ORDER`].
fn build_features<Row, F>(options: &DataTableOptions<Row, F>) -> Vec<Feature<Row, F>>
where
    Row: Clone + Send + Sync + 'static,
    F: Filters,
{
    let config = &options.config.features;
    let callbacks = &options.callbacks;
    let mut features = Vec::new();

    for kind in FeatureKind::ORDER {
        let feature = match kind {
            FeatureKind::Selection => config
                .enabled_selection()
                .map(|section| Feature::Selection(SelectionFeature::new(section, callbacks.fetch_all_ids.clone()))),
            FeatureKind::DragSort => match (config.enabled_drag_sort(), &callbacks.on_reorder) {
                (Some(section), Some(on_reorder)) => Some(Feature::DragSort(
                    DragSortFeature::new(section, Arc::clone(on_reorder))
                        .with_guards(callbacks.can_drag.clone(), callbacks.can_drop.clone())
                        .with_on_error(callbacks.on_drag_error.clone()),
                )),
                _ => None,
            },
            FeatureKind::Expansion => config
                .enabled_expansion()
                .map(|section| Feature::Expansion(ExpansionFeature::new(section))),
            FeatureKind::Virtualization => config.enabled_virtualization().map(|section| {
                Feature::Virtualization(VirtualizationFeature::new(section, callbacks.load_more.clone()))
            }),
            FeatureKind::ColumnVisibility => config
                .enabled_column_visibility()
                .map(|section| Feature::ColumnVisibility(ColumnVisibilityFeature::new(section))),
            FeatureKind::ColumnSizing => config
                .enabled_column_sizing()
                .map(|section| Feature::ColumnSizing(ColumnSizingFeature::new(section))),
            FeatureKind::ColumnPinning => config
                .enabled_column_pinning()
                .map(|section| Feature::ColumnPinning(ColumnPinningFeature::new(section))),
            FeatureKind::ColumnOrder => config
                .enabled_column_order()
                .map(|section| Feature::ColumnOrder(ColumnOrderFeature::new(section))),
            FeatureKind::Density => config
                .enabled_density()
                .map(|section| Feature::Density(DensityFeature::new(section))),
            FeatureKind::Analytics => config
                .enabled_analytics()
                .map(|section| Feature::Analytics(AnalyticsFeature::new(section, callbacks.analytics.clone()))),
        };
        if let Some(feature) = feature {
            trace!(feature = %kind, "feature enabled");
            features.push(feature);
        }
    }
    features
}

/// Table options before any feature patch.
fn base_options<Row, F>(
    columns: &[ColumnDef],
    snapshot: &TableStateSnapshot<F>,
    data: Option<Arc<PageData<Row>>>,
    hierarchical: bool,
) -> TableOptions<Row> {
    TableOptions {
        columns: columns.to_vec(),
        page_count: data.as_ref().map(|page| page.page_count),
        data,
        manual_pagination: true,
        manual_sorting: true,
        manual_filtering: true,
        pagination: PaginationState {
            page_index: snapshot.page_index(),
            page_size: snapshot.size,
        },
        sorting: snapshot.sort.clone(),
        enable_row_selection: false,
        row_selection: RowSelectionState::new(),
        enable_row_drag: false,
        enable_expanding: false,
        // Without an expansion feature nothing can collapse a row
        expanded: if hierarchical {
            ExpandedState::All
        } else {
            ExpandedState::default()
        },
        column_visibility: BTreeMap::new(),
        column_sizing: BTreeMap::new(),
        column_pinning: ColumnPinningState::default(),
        column_order: Vec::new(),
        meta: Map::new(),
    }
}
