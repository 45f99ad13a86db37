//! The feature runtime contract and the tagged set of features.
//!
//! Every feature implements [`FeatureRuntime`]. On each recompute the engine
//! calls [`FeatureRuntime::sync`] on every enabled feature, then folds their
//! [`FeatureRuntime::patch_table_options`] and
//! [`FeatureRuntime::patch_actions`] outputs onto the base configuration in
//! [`FeatureKind::ORDER`].

use crate::{
    columns::{ColumnOrderFeature, ColumnPinningFeature, ColumnSizingFeature, ColumnVisibilityFeature},
    display::{AnalyticsFeature, DensityFeature},
    drag_sort::DragSortFeature,
    expansion::ExpansionFeature,
    options::{ActionPatch, TableOptionsPatch},
    rows::{FlatRow, RowAccessors},
    selection::SelectionFeature,
    virtualization::VirtualizationFeature,
    RowId, TableStateSnapshot,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureKind {
    Selection,
    DragSort,
    Expansion,
    Virtualization,
    ColumnVisibility,
    ColumnSizing,
    ColumnPinning,
    ColumnOrder,
    Density,
    Analytics,
}

impl FeatureKind {
    /// Composition order; a later feature wins on conflicting fields.
    pub const ORDER: [FeatureKind; 10] = [
        FeatureKind::Selection,
        FeatureKind::DragSort,
        FeatureKind::Expansion,
        FeatureKind::Virtualization,
        FeatureKind::ColumnVisibility,
        FeatureKind::ColumnSizing,
        FeatureKind::ColumnPinning,
        FeatureKind::ColumnOrder,
        FeatureKind::Density,
        FeatureKind::Analytics,
    ];
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureKind::Selection => "selection",
            FeatureKind::DragSort => "dragSort",
            FeatureKind::Expansion => "expansion",
            FeatureKind::Virtualization => "virtualization",
            FeatureKind::ColumnVisibility => "columnVisibility",
            FeatureKind::ColumnSizing => "columnSizing",
            FeatureKind::ColumnPinning => "columnPinning",
            FeatureKind::ColumnOrder => "columnOrder",
            FeatureKind::Density => "density",
            FeatureKind::Analytics => "analytics",
        };
        f.write_str(name)
    }
}

/// What a feature sees of the current render pass.
pub struct FeatureContext<'a, Row, F> {
    /// Root rows of the current page
    pub rows: &'a [Row],
    pub snapshot: &'a TableStateSnapshot<F>,
    /// Total matching rows across all pages, if known
    pub total: Option<u64>,
    pub accessors: &'a RowAccessors<Row>,
    /// Every row id of the page in pre-order, children after their parent
    pub row_ids: &'a [RowId],
    /// Ids of every row with children
    pub expandable_ids: &'a [RowId],
    /// Expansion-aware flattened rows
    pub visible_rows: &'a [FlatRow],
}

/// The uniform shape of a feature.
pub trait FeatureRuntime<Row, F> {
    fn kind(&self) -> FeatureKind;

    /// Absorb the new rows and snapshot before patches are produced.
    fn sync(&mut self, _ctx: &FeatureContext<'_, Row, F>) {}

    fn patch_table_options(&self, ctx: &FeatureContext<'_, Row, F>) -> TableOptionsPatch;

    fn patch_actions(&self) -> ActionPatch;

    /// Drop feature-local state back to how it was at mount.
    fn on_reset(&mut self);
}

/// One enabled feature.
pub enum Feature<Row, F> {
    Selection(SelectionFeature<F>),
    DragSort(DragSortFeature<Row>),
    Expansion(ExpansionFeature),
    Virtualization(VirtualizationFeature),
    ColumnVisibility(ColumnVisibilityFeature),
    ColumnSizing(ColumnSizingFeature),
    ColumnPinning(ColumnPinningFeature),
    ColumnOrder(ColumnOrderFeature),
    Density(DensityFeature),
    Analytics(AnalyticsFeature),
}

impl<Row, F> Feature<Row, F>
where
    Row: Clone + Send + Sync + 'static,
    F: crate::Filters,
{
    pub fn runtime(&self) -> &dyn FeatureRuntime<Row, F> {
        match self {
            Feature::Selection(feature) => feature,
            Feature::DragSort(feature) => feature,
            Feature::Expansion(feature) => feature,
            Feature::Virtualization(feature) => feature,
            Feature::ColumnVisibility(feature) => feature,
            Feature::ColumnSizing(feature) => feature,
            Feature::ColumnPinning(feature) => feature,
            Feature::ColumnOrder(feature) => feature,
            Feature::Density(feature) => feature,
            Feature::Analytics(feature) => feature,
        }
    }

    pub fn runtime_mut(&mut self) -> &mut dyn FeatureRuntime<Row, F> {
        match self {
            Feature::Selection(feature) => feature,
            Feature::DragSort(feature) => feature,
            Feature::Expansion(feature) => feature,
            Feature::Virtualization(feature) => feature,
            Feature::ColumnVisibility(feature) => feature,
            Feature::ColumnSizing(feature) => feature,
            Feature::ColumnPinning(feature) => feature,
            Feature::ColumnOrder(feature) => feature,
            Feature::Density(feature) => feature,
            Feature::Analytics(feature) => feature,
        }
    }

    pub fn kind(&self) -> FeatureKind {
        self.runtime().kind()
    }
}

impl<Row, F> fmt::Debug for Feature<Row, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Feature::Selection(_) => "Selection",
            Feature::DragSort(_) => "DragSort",
            Feature::Expansion(_) => "Expansion",
            Feature::Virtualization(_) => "Virtualization",
            Feature::ColumnVisibility(_) => "ColumnVisibility",
            Feature::ColumnSizing(_) => "ColumnSizing",
            Feature::ColumnPinning(_) => "ColumnPinning",
            Feature::ColumnOrder(_) => "ColumnOrder",
            Feature::Density(_) => "Density",
            Feature::Analytics(_) => "Analytics",
        };
        f.debug_tuple("Feature").field(&name).finish()
    }
}
