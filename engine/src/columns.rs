//! Column visibility, sizing, pinning and order.
//!
//! Each is its own feature patching its own table-option field. None of them
//! touch the snapshot: column preferences do not affect the query.

use crate::{
    config::{ColumnOrderConfig, ColumnPinningConfig, ColumnSizingConfig, ColumnVisibilityConfig},
    feature::{FeatureContext, FeatureKind, FeatureRuntime},
    options::{bind, ActionKind, ActionPatch, TableOptionsPatch},
    ColumnId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Column visibility feature. Columns absent from the map are visible.
#[derive(Debug, Clone)]
pub struct ColumnVisibilityFeature {
    initial: BTreeMap<ColumnId, bool>,
    visibility: BTreeMap<ColumnId, bool>,
}

impl ColumnVisibilityFeature {
    pub fn new(config: &ColumnVisibilityConfig) -> Self {
        Self {
            initial: config.initial.clone(),
            visibility: config.initial.clone(),
        }
    }

    pub fn visibility(&self) -> &BTreeMap<ColumnId, bool> {
        &self.visibility
    }

    pub fn is_visible(&self, id: &str) -> bool {
        self.visibility.get(id).copied().unwrap_or(true)
    }

    pub fn set(&mut self, id: impl Into<ColumnId>, visible: bool) {
        self.visibility.insert(id.into(), visible);
    }

    pub fn toggle(&mut self, id: &str) {
        let visible = self.is_visible(id);
        self.set(id, !visible);
    }
}

impl<Row, F> FeatureRuntime<Row, F> for ColumnVisibilityFeature {
    fn kind(&self) -> FeatureKind {
        FeatureKind::ColumnVisibility
    }

    fn patch_table_options(&self, _ctx: &FeatureContext<'_, Row, F>) -> TableOptionsPatch {
        TableOptionsPatch {
            column_visibility: Some(self.visibility.clone()),
            ..Default::default()
        }
    }

    fn patch_actions(&self) -> ActionPatch {
        bind(
            FeatureKind::ColumnVisibility,
            &[ActionKind::SetColumnVisibility, ActionKind::ToggleColumnVisibility],
        )
    }

    fn on_reset(&mut self) {
        self.visibility = self.initial.clone();
    }
}

/// Column width feature. Widths are clamped to the configured bounds.
#[derive(Debug, Clone)]
pub struct ColumnSizingFeature {
    initial: BTreeMap<ColumnId, u32>,
    sizing: BTreeMap<ColumnId, u32>,
    min_width: u32,
    max_width: u32,
}

impl ColumnSizingFeature {
    pub fn new(config: &ColumnSizingConfig) -> Self {
        let mut feature = Self {
            initial: BTreeMap::new(),
            sizing: BTreeMap::new(),
            min_width: config.min_width,
            max_width: config.max_width,
        };
        feature.initial = config
            .initial
            .iter()
            .map(|(id, &width)| (id.clone(), feature.clamp(width)))
            .collect();
        feature.sizing = feature.initial.clone();
        feature
    }

    fn clamp(&self, width: u32) -> u32 {
        width.clamp(self.min_width, self.max_width)
    }

    pub fn sizing(&self) -> &BTreeMap<ColumnId, u32> {
        &self.sizing
    }

    pub fn width(&self, id: &str) -> Option<u32> {
        self.sizing.get(id).copied()
    }

    /// Set a width, clamped to `[min_width, max_width]`. Returns the stored width.
    pub fn set_size(&mut self, id: impl Into<ColumnId>, width: u32) -> u32 {
        let clamped = self.clamp(width);
        let id = id.into();
        if clamped != width {
            trace!(column = %id, requested = width, clamped, "column width clamped");
        }
        self.sizing.insert(id, clamped);
        clamped
    }

    pub fn reset_sizing(&mut self) {
        self.sizing = self.initial.clone();
    }
}

impl<Row, F> FeatureRuntime<Row, F> for ColumnSizingFeature {
    fn kind(&self) -> FeatureKind {
        FeatureKind::ColumnSizing
    }

    fn patch_table_options(&self, _ctx: &FeatureContext<'_, Row, F>) -> TableOptionsPatch {
        TableOptionsPatch {
            column_sizing: Some(self.sizing.clone()),
            ..Default::default()
        }
    }

    fn patch_actions(&self) -> ActionPatch {
        bind(
            FeatureKind::ColumnSizing,
            &[ActionKind::SetColumnSize, ActionKind::ResetColumnSizing],
        )
    }

    fn on_reset(&mut self) {
        self.reset_sizing();
    }
}

/// Side a column is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnPin {
    Left,
    Right,
}

/// Pinned columns per side, in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnPinningState {
    pub left: Vec<ColumnId>,
    pub right: Vec<ColumnId>,
}

impl ColumnPinningState {
    pub fn pin_of(&self, id: &str) -> Option<ColumnPin> {
        if self.left.iter().any(|c| c == id) {
            Some(ColumnPin::Left)
        } else if self.right.iter().any(|c| c == id) {
            Some(ColumnPin::Right)
        } else {
            None
        }
    }
}

/// Column pinning feature.
#[derive(Debug, Clone)]
pub struct ColumnPinningFeature {
    initial: ColumnPinningState,
    pinning: ColumnPinningState,
}

impl ColumnPinningFeature {
    pub fn new(config: &ColumnPinningConfig) -> Self {
        let initial = ColumnPinningState {
            left: config.left.clone(),
            right: config.right.clone(),
        };
        Self {
            pinning: initial.clone(),
            initial,
        }
    }

    pub fn pinning(&self) -> &ColumnPinningState {
        &self.pinning
    }

    /// Pin `id` to a side (appended last on that side) or unpin it with `None`.
    pub fn pin(&mut self, id: &str, side: Option<ColumnPin>) {
        self.pinning.left.retain(|c| c != id);
        self.pinning.right.retain(|c| c != id);
        match side {
            Some(ColumnPin::Left) => self.pinning.left.push(id.to_string()),
            Some(ColumnPin::Right) => self.pinning.right.push(id.to_string()),
            None => {}
        }
    }
}

impl<Row, F> FeatureRuntime<Row, F> for ColumnPinningFeature {
    fn kind(&self) -> FeatureKind {
        FeatureKind::ColumnPinning
    }

    fn patch_table_options(&self, _ctx: &FeatureContext<'_, Row, F>) -> TableOptionsPatch {
        TableOptionsPatch {
            column_pinning: Some(self.pinning.clone()),
            ..Default::default()
        }
    }

    fn patch_actions(&self) -> ActionPatch {
        bind(FeatureKind::ColumnPinning, &[ActionKind::PinColumn])
    }

    fn on_reset(&mut self) {
        self.pinning = self.initial.clone();
    }
}

/// Column order feature.
#[derive(Debug, Clone)]
pub struct ColumnOrderFeature {
    initial: Vec<ColumnId>,
    order: Vec<ColumnId>,
}

impl ColumnOrderFeature {
    pub fn new(config: &ColumnOrderConfig) -> Self {
        let initial = dedup(config.initial.iter().cloned());
        Self {
            order: initial.clone(),
            initial,
        }
    }

    pub fn order(&self) -> &[ColumnId] {
        &self.order
    }

    /// Replace the order; repeated ids keep their first position.
    pub fn set_order(&mut self, order: Vec<ColumnId>) {
        self.order = dedup(order);
    }
}

fn dedup(ids: impl IntoIterator<Item = ColumnId>) -> Vec<ColumnId> {
    let mut seen = BTreeSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

impl<Row, F> FeatureRuntime<Row, F> for ColumnOrderFeature {
    fn kind(&self) -> FeatureKind {
        FeatureKind::ColumnOrder
    }

    fn patch_table_options(&self, _ctx: &FeatureContext<'_, Row, F>) -> TableOptionsPatch {
        TableOptionsPatch {
            column_order: Some(self.order.clone()),
            ..Default::default()
        }
    }

    fn patch_actions(&self) -> ActionPatch {
        bind(FeatureKind::ColumnOrder, &[ActionKind::SetColumnOrder])
    }

    fn on_reset(&mut self) {
        self.order = self.initial.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_defaults_to_visible_and_toggles() {
        let mut feature = ColumnVisibilityFeature::new(&ColumnVisibilityConfig::default());
        assert!(feature.is_visible("email"));
        feature.toggle("email");
        assert!(!feature.is_visible("email"));

        FeatureRuntime::<(), ()>::on_reset(&mut feature);
        assert!(feature.is_visible("email"));
    }

    #[test]
    fn sizing_is_clamped() {
        let mut feature = ColumnSizingFeature::new(&ColumnSizingConfig {
            min_width: 50,
            max_width: 400,
            ..Default::default()
        });
        assert_eq!(feature.set_size("name", 10), 50);
        assert_eq!(feature.set_size("name", 9000), 400);
        assert_eq!(feature.set_size("name", 120), 120);
        assert_eq!(feature.width("name"), Some(120));

        feature.reset_sizing();
        assert_eq!(feature.width("name"), None);
    }

    #[test]
    fn pinning_moves_column_between_sides() {
        let mut feature = ColumnPinningFeature::new(&ColumnPinningConfig {
            left: vec!["select".into()],
            ..Default::default()
        });
        feature.pin("actions", Some(ColumnPin::Right));
        feature.pin("select", Some(ColumnPin::Right));
        assert!(feature.pinning().left.is_empty());
        assert_eq!(feature.pinning().right, vec!["actions".to_string(), "select".to_string()]);
        assert_eq!(feature.pinning().pin_of("select"), Some(ColumnPin::Right));

        feature.pin("select", None);
        assert_eq!(feature.pinning().pin_of("select"), None);
    }

    #[test]
    fn order_drops_repeated_ids() {
        let mut feature = ColumnOrderFeature::new(&ColumnOrderConfig::default());
        feature.set_order(vec!["b".into(), "a".into(), "b".into()]);
        assert_eq!(feature.order(), &["b".to_string(), "a".to_string()]);
    }
}
