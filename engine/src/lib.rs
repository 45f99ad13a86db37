//! # Tablekit Engine
//!
//! A headless state engine for paginated, sortable, filterable data tables.
//!
//! This crate turns a declarative table snapshot (page, page size, sort,
//! filters) plus a set of pluggable features into one fully wired view-state
//! object. It never paints rows: a rendering layer reads the produced
//! [`Instance`] and calls back into the [`DataTable`] actions.
//!
//! ## Design Principles
//!
//! - **No IO**: the state adapter, the data source and every async callback
//!   are supplied by the host
//! - **Deterministic**: the same sequence of inputs always produces the same
//!   state; time is passed in explicitly as a [`Timestamp`]
//! - **Composable**: every feature implements the same [`FeatureRuntime`]
//!   contract and is folded onto a base configuration in a fixed order
//!
//! ## Core Concepts
//!
//! ### Snapshot and adapter
//!
//! The canonical `{page, size, sort, filters}` state is a
//! [`TableStateSnapshot`] owned by a [`StateAdapter`]. The engine only
//! changes it through [`StateAdapter::set_snapshot`], tagging each change
//! with a [`ChangeReason`]. Adapters may be mutated by other parties (for
//! example browser history, see [`SearchParamsAdapter`]); the engine picks
//! those changes up on the next [`DataTable::recompute`].
//!
//! ### Data source
//!
//! A [`DataSource`] resolves a [`Query`] into a [`ResourceState`]. The
//! reference [`ResourceCache`] keys results by query so a late response for
//! a superseded query never replaces the current one.
//!
//! ### Features
//!
//! - [`SelectionFeature`] - page-scoped or cross-page row selection
//! - [`DragSortFeature`] - validated reorder and re-parent instructions
//! - [`VirtualizationFeature`] - visible row window and infinite loading
//! - [`ExpansionFeature`] - expanded rows of a hierarchical table
//! - column visibility, sizing, pinning and order, density, analytics
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tablekit_engine::{
//!     DataTable, DataTableOptions, MemoryStateAdapter, PageData, ResourceCache,
//!     RowAccessors, Status, TableStateSnapshot,
//! };
//!
//! #[derive(Debug, Clone)]
//! struct User {
//!     id: String,
//! }
//!
//! let adapter = Arc::new(MemoryStateAdapter::new(TableStateSnapshot::new(10, ())));
//! let cache: ResourceCache<User, ()> = ResourceCache::new();
//!
//! let options = DataTableOptions::new(
//!     RowAccessors::new().with_row_id(|user: &User| user.id.clone()),
//! );
//! let mut table = DataTable::new(options, adapter, Box::new(cache.clone())).unwrap();
//! assert_eq!(table.instance().status, Status::Loading);
//!
//! // The host performs the queued fetch and hands back the page.
//! for request in cache.take_requests() {
//!     let rows = vec![User { id: "u1".into() }];
//!     cache.complete(&request.key, Ok(PageData::new(rows, 1).with_total(1)));
//! }
//!
//! let instance = table.recompute();
//! assert_eq!(instance.status, Status::Ready);
//! assert_eq!(instance.table.rows().len(), 1);
//! ```

pub mod adapter;
pub mod columns;
pub mod config;
pub mod data_source;
pub mod display;
pub mod drag_sort;
pub mod error;
pub mod expansion;
pub mod feature;
pub mod instance;
pub mod memo;
pub mod options;
pub mod rows;
pub mod search;
pub mod selection;
pub mod snapshot;
pub mod table;
pub mod virtualization;

// Re-export main types at crate root
pub use adapter::{Listener, Listeners, MemoryStateAdapter, StateAdapter, Subscription};
pub use columns::{
    ColumnOrderFeature, ColumnPin, ColumnPinningFeature, ColumnPinningState, ColumnSizingFeature,
    ColumnVisibilityFeature,
};
pub use config::{
    AnalyticsConfig, Callbacks, ColumnOrderConfig, ColumnPinningConfig, ColumnSizingConfig,
    ColumnVisibilityConfig, CrossPageConfig, DataTableOptions, DensityConfig, DragOverlay,
    DragSortConfig, ExpansionConfig, FeaturesConfig, SelectionConfig, TableConfig,
    VirtualizationConfig,
};
pub use data_source::{DataSource, FetchRequest, PageData, ResourceCache, ResourceState, DEFAULT_CACHE_CAPACITY};
pub use display::{AnalyticsEvent, AnalyticsFeature, Density, DensityFeature};
pub use drag_sort::{
    array_move, plan_drop, DragEndOutcome, DragSortFeature, DragState, DropEvent, DropPlan,
    DropPosition, DropRules, DropSkip, ReorderPayload, ReorderTask,
};
pub use error::{BoxError, DataError, Error, MutationError, MutationSource};
pub use expansion::{ExpandedState, ExpansionFeature};
pub use feature::{Feature, FeatureContext, FeatureKind, FeatureRuntime};
pub use instance::{
    Activity, DragSortView, Errors, FiltersView, Instance, PaginationView, SelectionView, Status,
    TreeView, VirtualView,
};
pub use memo::{structural_key, Memo, Stable};
pub use options::{
    ActionBinding, ActionKind, ActionPatch, ActionSet, ColumnDef, PaginationState, TableOptions,
    TableOptionsPatch,
};
pub use rows::{flatten_visible, FlatRow, IndexedRow, RowAccessors, RowIndex};
pub use search::{decode_search, encode_search, SearchParamsAdapter};
pub use selection::{
    derive_row_selection_from_cross_page, reconcile_row_selection, CrossPageSelection,
    Reconciled, RowSelectionState, SelectAllOutcome, SelectAllStrategy, SelectAllTask, SelectedCount,
    SelectionFeature, SelectionMode,
};
pub use snapshot::{ChangeReason, Filters, Query, SortEntry, SortOrder, TableStateSnapshot};
pub use table::DataTable;
pub use virtualization::{
    compute_window, GateDecision, LoadMoreGate, LOAD_MORE_COOLDOWN_MS, LoadMoreTask, ScrollMetrics, VirtualWindow,
    VirtualizationFeature, VirtualizationMode,
};

/// Type aliases for clarity
pub type RowId = String;
pub type ColumnId = String;
pub type Timestamp = u64;
