//! Render configuration and action bindings, and how feature patches fold
//! onto them.
//!
//! Merge policy: features are applied left to right in a fixed order. A
//! patched scalar or state field replaces the base value (later feature wins);
//! `meta` maps are concatenated key by key.

use crate::{
    columns::ColumnPinningState, expansion::ExpandedState, selection::RowSelectionState,
    ColumnId, FeatureKind, PageData, SortEntry,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// 0-indexed pagination, as rendering primitives expect it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationState {
    pub page_index: u32,
    pub page_size: u32,
}

/// Column definition passed through to the rendering primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    pub id: ColumnId,
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default = "default_true")]
    pub enable_sorting: bool,
    #[serde(default = "default_true")]
    pub enable_hiding: bool,
    #[serde(default)]
    pub size: Option<u32>,
}

fn default_true() -> bool {
    true
}

impl ColumnDef {
    pub fn new(id: impl Into<ColumnId>) -> Self {
        Self {
            id: id.into(),
            header: None,
            enable_sorting: true,
            enable_hiding: true,
            size: None,
        }
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }
}

/// Configuration handed to the external table-rendering primitive.
#[derive(Debug, Clone)]
pub struct TableOptions<Row> {
    pub columns: Vec<ColumnDef>,
    pub data: Option<Arc<PageData<Row>>>,
    /// Pagination, sorting and filtering happen in the data source
    pub manual_pagination: bool,
    pub manual_sorting: bool,
    pub manual_filtering: bool,
    pub page_count: Option<u32>,
    pub pagination: PaginationState,
    pub sorting: Vec<SortEntry>,
    pub enable_row_selection: bool,
    pub row_selection: RowSelectionState,
    pub enable_row_drag: bool,
    pub enable_expanding: bool,
    pub expanded: ExpandedState,
    pub column_visibility: BTreeMap<ColumnId, bool>,
    pub column_sizing: BTreeMap<ColumnId, u32>,
    pub column_pinning: ColumnPinningState,
    pub column_order: Vec<ColumnId>,
    pub meta: Map<String, Value>,
}

impl<Row> TableOptions<Row> {
    pub fn rows(&self) -> &[Row] {
        self.data.as_ref().map(|data| data.rows.as_slice()).unwrap_or(&[])
    }

    /// Apply one patch: `Some` fields replace, `meta` entries are added.
    pub fn apply(&mut self, patch: TableOptionsPatch) {
        let TableOptionsPatch {
            enable_row_selection,
            row_selection,
            enable_row_drag,
            enable_expanding,
            expanded,
            column_visibility,
            column_sizing,
            column_pinning,
            column_order,
            meta,
        } = patch;

        if let Some(value) = enable_row_selection {
            self.enable_row_selection = value;
        }
        if let Some(value) = row_selection {
            self.row_selection = value;
        }
        if let Some(value) = enable_row_drag {
            self.enable_row_drag = value;
        }
        if let Some(value) = enable_expanding {
            self.enable_expanding = value;
        }
        if let Some(value) = expanded {
            self.expanded = value;
        }
        if let Some(value) = column_visibility {
            self.column_visibility = value;
        }
        if let Some(value) = column_sizing {
            self.column_sizing = value;
        }
        if let Some(value) = column_pinning {
            self.column_pinning = value;
        }
        if let Some(value) = column_order {
            self.column_order = value;
        }
        self.meta.extend(meta);
    }

    /// Left fold of `patches` onto `self`.
    pub fn merge(mut self, patches: impl IntoIterator<Item = TableOptionsPatch>) -> Self {
        for patch in patches {
            self.apply(patch);
        }
        self
    }
}

/// The part of [`TableOptions`] a feature may override.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableOptionsPatch {
    pub enable_row_selection: Option<bool>,
    pub row_selection: Option<RowSelectionState>,
    pub enable_row_drag: Option<bool>,
    pub enable_expanding: Option<bool>,
    pub expanded: Option<ExpandedState>,
    pub column_visibility: Option<BTreeMap<ColumnId, bool>>,
    pub column_sizing: Option<BTreeMap<ColumnId, u32>>,
    pub column_pinning: Option<ColumnPinningState>,
    pub column_order: Option<Vec<ColumnId>>,
    pub meta: Map<String, Value>,
}

impl TableOptionsPatch {
    pub fn with_meta(mut self, key: &str, value: Value) -> Self {
        self.meta.insert(key.to_string(), value);
        self
    }
}

/// Every action of the instance surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    // Core
    Refetch,
    Retry,
    ResetAll,
    SetPage,
    SetPageSize,
    SetSort,
    ClearSort,
    SetFilters,
    ResetFilters,
    // Selection
    SetRowSelection,
    ToggleRowSelected,
    SelectAllCurrentPage,
    SelectAllMatching,
    ClearSelection,
    ClearSelectionError,
    SetSelectionMode,
    // Drag-sort
    DragStart,
    DragEnd,
    DragCancel,
    ClearDragSortError,
    // Expansion
    ToggleRowExpanded,
    ExpandAll,
    CollapseAll,
    // Virtualization
    Scroll,
    Resize,
    ClearLoadMoreError,
    // Columns
    SetColumnVisibility,
    ToggleColumnVisibility,
    SetColumnSize,
    ResetColumnSizing,
    PinColumn,
    SetColumnOrder,
    // Display
    SetDensity,
    Track,
}

impl ActionKind {
    pub const ALL: [ActionKind; 34] = [
        ActionKind::Refetch,
        ActionKind::Retry,
        ActionKind::ResetAll,
        ActionKind::SetPage,
        ActionKind::SetPageSize,
        ActionKind::SetSort,
        ActionKind::ClearSort,
        ActionKind::SetFilters,
        ActionKind::ResetFilters,
        ActionKind::SetRowSelection,
        ActionKind::ToggleRowSelected,
        ActionKind::SelectAllCurrentPage,
        ActionKind::SelectAllMatching,
        ActionKind::ClearSelection,
        ActionKind::ClearSelectionError,
        ActionKind::SetSelectionMode,
        ActionKind::DragStart,
        ActionKind::DragEnd,
        ActionKind::DragCancel,
        ActionKind::ClearDragSortError,
        ActionKind::ToggleRowExpanded,
        ActionKind::ExpandAll,
        ActionKind::CollapseAll,
        ActionKind::Scroll,
        ActionKind::Resize,
        ActionKind::ClearLoadMoreError,
        ActionKind::SetColumnVisibility,
        ActionKind::ToggleColumnVisibility,
        ActionKind::SetColumnSize,
        ActionKind::ResetColumnSizing,
        ActionKind::PinColumn,
        ActionKind::SetColumnOrder,
        ActionKind::SetDensity,
        ActionKind::Track,
    ];

    pub fn is_core(self) -> bool {
        matches!(
            self,
            ActionKind::Refetch
                | ActionKind::Retry
                | ActionKind::ResetAll
                | ActionKind::SetPage
                | ActionKind::SetPageSize
                | ActionKind::SetSort
                | ActionKind::ClearSort
                | ActionKind::SetFilters
                | ActionKind::ResetFilters
        )
    }
}

/// What an action does when invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "feature")]
pub enum ActionBinding {
    /// Handled by the engine itself
    Core,
    /// Handled by an enabled feature
    Feature(FeatureKind),
    /// Stand-in for a disabled feature: accepted and ignored
    Noop,
}

/// Overrides a feature contributes to the action surface.
pub type ActionPatch = Vec<(ActionKind, ActionBinding)>;

/// The fully populated action surface.
///
/// Every [`ActionKind`] always has a binding, so callers never check whether
/// a feature is enabled before invoking one of its actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ActionSet {
    bindings: BTreeMap<ActionKind, ActionBinding>,
}

impl ActionSet {
    /// Core actions bound to the engine, every feature action a no-op.
    pub fn base() -> Self {
        let bindings = ActionKind::ALL
            .iter()
            .map(|&kind| {
                let binding = if kind.is_core() {
                    ActionBinding::Core
                } else {
                    ActionBinding::Noop
                };
                (kind, binding)
            })
            .collect();
        Self { bindings }
    }

    pub fn apply(&mut self, patch: ActionPatch) {
        for (kind, binding) in patch {
            self.bindings.insert(kind, binding);
        }
    }

    pub fn merge(mut self, patches: impl IntoIterator<Item = ActionPatch>) -> Self {
        for patch in patches {
            self.apply(patch);
        }
        self
    }

    pub fn binding(&self, kind: ActionKind) -> ActionBinding {
        self.bindings.get(&kind).copied().unwrap_or(ActionBinding::Noop)
    }

    /// Whether invoking `kind` does anything.
    pub fn is_live(&self, kind: ActionKind) -> bool {
        self.binding(kind) != ActionBinding::Noop
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Default for ActionSet {
    fn default() -> Self {
        Self::base()
    }
}

/// Shorthand for a patch binding `kinds` to `feature`.
pub(crate) fn bind(feature: FeatureKind, kinds: &[ActionKind]) -> ActionPatch {
    kinds
        .iter()
        .map(|&kind| (kind, ActionBinding::Feature(feature)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_options() -> TableOptions<()> {
        TableOptions {
            columns: vec![ColumnDef::new("name")],
            data: None,
            manual_pagination: true,
            manual_sorting: true,
            manual_filtering: true,
            page_count: None,
            pagination: PaginationState {
                page_index: 0,
                page_size: 10,
            },
            sorting: Vec::new(),
            enable_row_selection: false,
            row_selection: RowSelectionState::new(),
            enable_row_drag: false,
            enable_expanding: false,
            expanded: ExpandedState::default(),
            column_visibility: BTreeMap::new(),
            column_sizing: BTreeMap::new(),
            column_pinning: ColumnPinningState::default(),
            column_order: Vec::new(),
            meta: Map::new(),
        }
    }

    #[test]
    fn later_patch_wins_on_scalars() {
        let first = TableOptionsPatch {
            enable_row_selection: Some(true),
            ..Default::default()
        };
        let second = TableOptionsPatch {
            enable_row_selection: Some(false),
            ..Default::default()
        };
        let merged = base_options().merge([first, second]);
        assert!(!merged.enable_row_selection);
    }

    #[test]
    fn absent_fields_keep_base_value() {
        let mut base = base_options();
        base.column_order = vec!["name".into()];
        let merged = base.merge([TableOptionsPatch::default()]);
        assert_eq!(merged.column_order, vec!["name".to_string()]);
        assert!(merged.manual_pagination);
    }

    #[test]
    fn meta_is_concatenated() {
        let first = TableOptionsPatch::default().with_meta("density", json!("compact"));
        let second = TableOptionsPatch::default().with_meta("selection", json!({"mode": "page"}));
        let merged = base_options().merge([first, second]);
        assert_eq!(merged.meta.len(), 2);
        assert_eq!(merged.meta["density"], json!("compact"));
    }

    #[test]
    fn base_action_set_is_fully_populated() {
        let actions = ActionSet::base();
        assert_eq!(actions.len(), ActionKind::ALL.len());
        assert_eq!(actions.binding(ActionKind::SetPage), ActionBinding::Core);
        assert_eq!(actions.binding(ActionKind::SelectAllMatching), ActionBinding::Noop);
        assert!(!actions.is_live(ActionKind::DragEnd));
    }

    #[test]
    fn feature_patch_overrides_noop() {
        let actions = ActionSet::base().merge([bind(
            FeatureKind::Selection,
            &[ActionKind::ToggleRowSelected, ActionKind::ClearSelection],
        )]);
        assert_eq!(
            actions.binding(ActionKind::ToggleRowSelected),
            ActionBinding::Feature(FeatureKind::Selection)
        );
        assert!(actions.is_live(ActionKind::ClearSelection));
        assert!(!actions.is_live(ActionKind::SelectAllMatching));
        assert_eq!(actions.len(), ActionKind::ALL.len());
    }
}
