//! The consumer-facing surface produced by every recompute.
//!
//! Sub-views are shared through `Arc`s that keep their identity across
//! recomputes while their content is unchanged, so a rendering layer can skip
//! work with a pointer comparison.

use crate::{
    options::{ActionSet, TableOptions},
    rows::FlatRow,
    selection::{CrossPageSelection, RowSelectionState, SelectedCount, SelectionMode},
    virtualization::{VirtualWindow, VirtualizationMode},
    DataError, ExpandedState, MutationError, ResourceState, RowId,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Coarse state of the current query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Nothing requested yet
    #[default]
    Idle,
    /// First load, no data to show
    Loading,
    /// Resolved with zero rows
    Empty,
    /// Failed with no data to fall back on
    Error,
    /// Rows on screen, possibly stale while a refresh runs or after it failed
    Ready,
}

impl Status {
    /// Stale-while-revalidate: an error only wins when there is no data.
    pub fn derive<Row>(state: &ResourceState<Row>) -> Self {
        match &state.data {
            Some(data) if data.rows.is_empty() => Status::Empty,
            Some(_) => Status::Ready,
            None if state.is_initial_loading => Status::Loading,
            None if state.error.is_some() => Status::Error,
            None => Status::Idle,
        }
    }
}

/// What is running right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub is_initial_loading: bool,
    pub is_fetching: bool,
    /// Fetching while data is already on screen
    pub is_refetching: bool,
    pub is_loading_more: bool,
    pub is_selecting_all: bool,
    pub is_dragging: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationView {
    /// 1-indexed
    pub page: u32,
    pub size: u32,
    /// 0-indexed
    pub page_index: u32,
    pub page_count: Option<u32>,
    pub total: Option<u64>,
    pub can_previous: bool,
    pub can_next: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FiltersView<F> {
    pub value: F,
    /// The filters differ from the ones the table opened with
    pub is_filtered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionView {
    pub enabled: bool,
    pub mode: SelectionMode,
    pub row_selection: RowSelectionState,
    /// Only in cross-page mode
    pub cross_page: Option<CrossPageSelection>,
    pub total_selected: SelectedCount,
    pub is_all_selected: bool,
    pub max_selection: Option<usize>,
}

impl Default for SelectionView {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: SelectionMode::Page,
            row_selection: RowSelectionState::new(),
            cross_page: None,
            total_selected: SelectedCount::Count(0),
            is_all_selected: false,
            max_selection: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeView {
    pub is_hierarchical: bool,
    pub expanded: ExpandedState,
    /// Rows in display order, children after their expanded parent
    pub rows: Arc<Vec<FlatRow>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DragSortView {
    pub enabled: bool,
    pub is_dragging: bool,
    pub active_id: Option<RowId>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualView {
    pub enabled: bool,
    pub mode: VirtualizationMode,
    pub window: VirtualWindow,
    pub row_count: usize,
    pub total_height: f64,
}

/// Errors waiting for the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Errors {
    /// Last data-source failure, also while stale rows are shown
    pub data: Option<DataError>,
    pub selection: Option<MutationError>,
    pub drag_sort: Option<MutationError>,
    pub load_more: Option<MutationError>,
}

impl Errors {
    pub fn is_empty(&self) -> bool {
        self.data.is_none() && self.selection.is_none() && self.drag_sort.is_none() && self.load_more.is_none()
    }
}

/// Everything a rendering layer needs.
#[derive(Debug, Clone)]
pub struct Instance<Row, F> {
    /// Configuration for the table-rendering primitive
    pub table: Arc<TableOptions<Row>>,
    pub status: Status,
    pub activity: Activity,
    pub pagination: Arc<PaginationView>,
    pub filters: Arc<FiltersView<F>>,
    pub actions: Arc<ActionSet>,
    pub selection: Arc<SelectionView>,
    pub tree: Arc<TreeView>,
    pub drag_sort: Arc<DragSortView>,
    pub virtualization: Arc<VirtualView>,
    pub errors: Arc<Errors>,
    /// Extra metadata reported with the page, plus `searchKey` when the
    /// adapter has one
    pub meta: Arc<Map<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PageData;

    fn state(data: Option<Vec<u8>>, loading: bool, error: bool) -> ResourceState<u8> {
        ResourceState {
            data: data.map(|rows| Arc::new(PageData::new(rows, 1))),
            is_initial_loading: loading,
            is_fetching: loading,
            error: error.then(|| DataError::new("boom")),
        }
    }

    #[test]
    fn status_derivation() {
        assert_eq!(Status::derive(&state(None, false, false)), Status::Idle);
        assert_eq!(Status::derive(&state(None, true, false)), Status::Loading);
        assert_eq!(Status::derive(&state(None, false, true)), Status::Error);
        assert_eq!(Status::derive(&state(Some(vec![]), false, false)), Status::Empty);
        assert_eq!(Status::derive(&state(Some(vec![1]), false, false)), Status::Ready);
    }

    #[test]
    fn stale_data_with_error_stays_ready() {
        assert_eq!(Status::derive(&state(Some(vec![1]), false, true)), Status::Ready);
    }

    #[test]
    fn retry_after_error_shows_loading() {
        assert_eq!(Status::derive(&state(None, true, true)), Status::Loading);
    }

    #[test]
    fn errors_is_empty() {
        let mut errors = Errors::default();
        assert!(errors.is_empty());
        errors.data = Some(DataError::new("x"));
        assert!(!errors.is_empty());
    }
}
