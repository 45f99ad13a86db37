//! Table configuration.
//!
//! [`TableConfig`] is plain serde data and can be loaded from JSON. Host
//! callbacks cannot be serialized; they travel separately in [`Callbacks`]
//! and are attached with builder methods. [`DataTableOptions`] bundles both
//! with the row accessors.

use crate::{
    display::{AnalyticsEvent, Density},
    drag_sort::ReorderPayload,
    error::Result,
    options::ColumnDef,
    rows::RowAccessors,
    selection::{SelectAllStrategy, SelectionMode},
    virtualization::VirtualizationMode,
    BoxError, ColumnId, Error, MutationError, RowId,
};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// Callback types

/// Fetches the ids of every row matching the given filters.
pub type FetchAllIds<F> =
    Arc<dyn Fn(F) -> BoxFuture<'static, std::result::Result<Vec<RowId>, BoxError>> + Send + Sync>;

/// Persists a reorder.
pub type OnReorder<Row> =
    Arc<dyn Fn(ReorderPayload<Row>) -> BoxFuture<'static, std::result::Result<(), BoxError>> + Send + Sync>;

/// Told about a failed reorder.
pub type OnDragError<Row> = Arc<dyn Fn(&MutationError, &ReorderPayload<Row>) + Send + Sync>;

pub type CanDrag<Row> = Arc<dyn Fn(&Row) -> bool + Send + Sync>;

/// Receives `(active, over)`.
pub type CanDrop<Row> = Arc<dyn Fn(&Row, &Row) -> bool + Send + Sync>;

/// Appends the next chunk of rows.
pub type LoadMore = Arc<dyn Fn() -> BoxFuture<'static, std::result::Result<(), BoxError>> + Send + Sync>;

pub type AnalyticsSink = Arc<dyn Fn(&AnalyticsEvent) + Send + Sync>;

/// Declarative configuration of a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableConfig {
    pub features: FeaturesConfig,
}

impl TableConfig {
    /// Parse from JSON and validate.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that do not depend on callbacks or accessors.
    pub fn validate(&self) -> Result<()> {
        let features = &self.features;

        if let Some(selection) = features.enabled_selection() {
            if let Some(cross_page) = &selection.cross_page {
                if cross_page.max_selection == Some(0) {
                    return Err(Error::InvalidConfig(
                        "selection.crossPage.maxSelection must be at least 1".into(),
                    ));
                }
            }
        }

        if let Some(virtualization) = features.enabled_virtualization() {
            if !(virtualization.row_height.is_finite() && virtualization.row_height > 0.0) {
                return Err(Error::InvalidConfig(
                    "virtualization.rowHeight must be positive".into(),
                ));
            }
            if !(virtualization.load_more_offset.is_finite() && virtualization.load_more_offset >= 0.0) {
                return Err(Error::InvalidConfig(
                    "virtualization.loadMoreOffset must not be negative".into(),
                ));
            }
        }

        if let Some(sizing) = features.enabled_column_sizing() {
            if sizing.min_width > sizing.max_width {
                return Err(Error::InvalidConfig(format!(
                    "columnSizing.minWidth ({}) exceeds maxWidth ({})",
                    sizing.min_width, sizing.max_width
                )));
            }
        }

        Ok(())
    }
}

/// Per-feature configuration. An absent or disabled section turns the
/// feature off.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeaturesConfig {
    pub selection: Option<SelectionConfig>,
    pub drag_sort: Option<DragSortConfig>,
    pub expansion: Option<ExpansionConfig>,
    pub virtualization: Option<VirtualizationConfig>,
    pub column_visibility: Option<ColumnVisibilityConfig>,
    pub column_sizing: Option<ColumnSizingConfig>,
    pub column_pinning: Option<ColumnPinningConfig>,
    pub column_order: Option<ColumnOrderConfig>,
    pub density: Option<DensityConfig>,
    pub analytics: Option<AnalyticsConfig>,
}

macro_rules! enabled_section {
    ($($method:ident => $field:ident: $ty:ty),* $(,)?) => {
        impl FeaturesConfig {
            $(
                pub fn $method(&self) -> Option<&$ty> {
                    self.$field.as_ref().filter(|section| section.enabled)
                }
            )*
        }
    };
}

enabled_section! {
    enabled_selection => selection: SelectionConfig,
    enabled_drag_sort => drag_sort: DragSortConfig,
    enabled_expansion => expansion: ExpansionConfig,
    enabled_virtualization => virtualization: VirtualizationConfig,
    enabled_column_visibility => column_visibility: ColumnVisibilityConfig,
    enabled_column_sizing => column_sizing: ColumnSizingConfig,
    enabled_column_pinning => column_pinning: ColumnPinningConfig,
    enabled_column_order => column_order: ColumnOrderConfig,
    enabled_density => density: DensityConfig,
    enabled_analytics => analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectionConfig {
    pub enabled: bool,
    pub mode: SelectionMode,
    /// Cross-page options; `maxSelection` also caps page mode
    pub cross_page: Option<CrossPageConfig>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: SelectionMode::Page,
            cross_page: None,
        }
    }
}

impl SelectionConfig {
    pub fn max_selection(&self) -> Option<usize> {
        self.cross_page.as_ref().and_then(|cross_page| cross_page.max_selection)
    }

    pub fn strategy(&self) -> SelectAllStrategy {
        self.cross_page
            .as_ref()
            .map(|cross_page| cross_page.select_all_strategy)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrossPageConfig {
    pub select_all_strategy: SelectAllStrategy,
    pub max_selection: Option<usize>,
}

/// How the dragged row is drawn while dragging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DragOverlay {
    #[default]
    Row,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DragSortConfig {
    pub enabled: bool,
    /// Drag only from a dedicated handle cell
    pub handle: bool,
    pub drag_overlay: DragOverlay,
    /// Allow dropping a row inside another row of a hierarchical table
    pub allow_nesting: bool,
}

impl Default for DragSortConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            handle: false,
            drag_overlay: DragOverlay::Row,
            allow_nesting: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExpansionConfig {
    pub enabled: bool,
    /// Start with every row expanded
    pub expand_all: bool,
    /// Rows expanded at mount
    pub expanded: Vec<RowId>,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            expand_all: false,
            expanded: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VirtualizationConfig {
    pub enabled: bool,
    /// Row height in pixels
    pub row_height: f64,
    /// Extra rows mounted above and below the viewport
    pub overscan: usize,
    pub mode: VirtualizationMode,
    /// Distance from the end, in pixels, at which more rows are requested
    pub load_more_offset: f64,
    /// Viewport height before the first resize
    pub viewport_height: f64,
}

impl Default for VirtualizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            row_height: 40.0,
            overscan: 5,
            mode: VirtualizationMode::Fixed,
            load_more_offset: 200.0,
            viewport_height: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnVisibilityConfig {
    pub enabled: bool,
    pub initial: BTreeMap<ColumnId, bool>,
}

impl Default for ColumnVisibilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnSizingConfig {
    pub enabled: bool,
    pub initial: BTreeMap<ColumnId, u32>,
    pub min_width: u32,
    pub max_width: u32,
}

impl Default for ColumnSizingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial: BTreeMap::new(),
            min_width: 40,
            max_width: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnPinningConfig {
    pub enabled: bool,
    pub left: Vec<ColumnId>,
    pub right: Vec<ColumnId>,
}

impl Default for ColumnPinningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            left: Vec::new(),
            right: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnOrderConfig {
    pub enabled: bool,
    pub initial: Vec<ColumnId>,
}

impl Default for ColumnOrderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DensityConfig {
    pub enabled: bool,
    pub initial: Density,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial: Density::Standard,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsConfig {
    pub enabled: bool,
    /// Free-form name attached to every event
    pub table_name: Option<String>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            table_name: None,
        }
    }
}

/// Host callbacks, attached next to the serializable config.
pub struct Callbacks<Row, F> {
    pub fetch_all_ids: Option<FetchAllIds<F>>,
    pub on_reorder: Option<OnReorder<Row>>,
    pub on_drag_error: Option<OnDragError<Row>>,
    pub can_drag: Option<CanDrag<Row>>,
    pub can_drop: Option<CanDrop<Row>>,
    pub load_more: Option<LoadMore>,
    pub analytics: Option<AnalyticsSink>,
}

impl<Row, F> Callbacks<Row, F> {
    pub fn new() -> Self {
        Self {
            fetch_all_ids: None,
            on_reorder: None,
            on_drag_error: None,
            can_drag: None,
            can_drop: None,
            load_more: None,
            analytics: None,
        }
    }

    pub fn fetch_all_ids<Fut>(mut self, callback: impl Fn(F) -> Fut + Send + Sync + 'static) -> Self
    where
        Fut: std::future::Future<Output = std::result::Result<Vec<RowId>, BoxError>> + Send + 'static,
    {
        self.fetch_all_ids = Some(Arc::new(move |filters| callback(filters).boxed()));
        self
    }

    pub fn on_reorder<Fut>(
        mut self,
        callback: impl Fn(ReorderPayload<Row>) -> Fut + Send + Sync + 'static,
    ) -> Self
    where
        Fut: std::future::Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        self.on_reorder = Some(Arc::new(move |payload| callback(payload).boxed()));
        self
    }

    pub fn on_drag_error(
        mut self,
        callback: impl Fn(&MutationError, &ReorderPayload<Row>) + Send + Sync + 'static,
    ) -> Self {
        self.on_drag_error = Some(Arc::new(callback));
        self
    }

    pub fn can_drag(mut self, callback: impl Fn(&Row) -> bool + Send + Sync + 'static) -> Self {
        self.can_drag = Some(Arc::new(callback));
        self
    }

    pub fn can_drop(mut self, callback: impl Fn(&Row, &Row) -> bool + Send + Sync + 'static) -> Self {
        self.can_drop = Some(Arc::new(callback));
        self
    }

    pub fn load_more<Fut>(mut self, callback: impl Fn() -> Fut + Send + Sync + 'static) -> Self
    where
        Fut: std::future::Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        self.load_more = Some(Arc::new(move || callback().boxed()));
        self
    }

    pub fn analytics(mut self, sink: impl Fn(&AnalyticsEvent) + Send + Sync + 'static) -> Self {
        self.analytics = Some(Arc::new(sink));
        self
    }
}

impl<Row, F> Default for Callbacks<Row, F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Row, F> fmt::Debug for Callbacks<Row, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("fetch_all_ids", &self.fetch_all_ids.is_some())
            .field("on_reorder", &self.on_reorder.is_some())
            .field("on_drag_error", &self.on_drag_error.is_some())
            .field("can_drag", &self.can_drag.is_some())
            .field("can_drop", &self.can_drop.is_some())
            .field("load_more", &self.load_more.is_some())
            .field("analytics", &self.analytics.is_some())
            .finish()
    }
}

/// Everything [`DataTable::new`](crate::DataTable::new) needs besides the
/// adapter and the data source.
#[derive(Debug)]
pub struct DataTableOptions<Row, F> {
    pub columns: Vec<ColumnDef>,
    pub accessors: RowAccessors<Row>,
    pub config: TableConfig,
    pub callbacks: Callbacks<Row, F>,
}

impl<Row, F> DataTableOptions<Row, F> {
    pub fn new(accessors: RowAccessors<Row>) -> Self {
        Self {
            columns: Vec::new(),
            accessors,
            config: TableConfig::default(),
            callbacks: Callbacks::new(),
        }
    }

    pub fn with_columns(mut self, columns: Vec<ColumnDef>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_config(mut self, config: TableConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_callbacks(mut self, callbacks: Callbacks<Row, F>) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Checks that need both the config and the callbacks or accessors.
    pub fn validate(&self) -> Result<()> {
        self.config.validate()?;
        let features = &self.config.features;

        if let Some(selection) = features.enabled_selection() {
            if selection.mode == SelectionMode::CrossPage {
                if !self.accessors.has_row_id() {
                    return Err(Error::CrossPageRequiresRowId);
                }
                if selection.strategy() == SelectAllStrategy::Server && self.callbacks.fetch_all_ids.is_none() {
                    return Err(Error::MissingCallback("fetchAllIds".into()));
                }
            }
        }

        if features.enabled_drag_sort().is_some() {
            if !self.accessors.has_row_id() {
                return Err(Error::DragSortRequiresRowId);
            }
            if self.callbacks.on_reorder.is_none() {
                return Err(Error::MissingCallback("onReorder".into()));
            }
        }

        if let Some(virtualization) = features.enabled_virtualization() {
            if virtualization.mode == VirtualizationMode::Infinite && self.callbacks.load_more.is_none() {
                return Err(Error::MissingCallback("loadMore".into()));
            }
        }

        Ok(())
    }
}
