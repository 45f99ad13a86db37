//! Expanded rows of a hierarchical table.

use crate::{
    config::ExpansionConfig,
    feature::{FeatureContext, FeatureKind, FeatureRuntime},
    options::{bind, ActionKind, ActionPatch, TableOptionsPatch},
    RowId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which rows show their children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "rowIds")]
pub enum ExpandedState {
    /// Every row with children is expanded
    All,
    /// Only the listed rows are expanded
    Rows(BTreeSet<RowId>),
}

impl ExpandedState {
    pub fn rows<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<RowId>,
    {
        ExpandedState::Rows(ids.into_iter().map(Into::into).collect())
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        match self {
            ExpandedState::All => true,
            ExpandedState::Rows(ids) => ids.contains(id),
        }
    }
}

impl Default for ExpandedState {
    fn default() -> Self {
        ExpandedState::Rows(BTreeSet::new())
    }
}

/// Expansion feature.
#[derive(Debug, Clone)]
pub struct ExpansionFeature {
    initial: ExpandedState,
    expanded: ExpandedState,
    /// Rows with children on the current page, refreshed by `sync`
    expandable: Vec<RowId>,
}

impl ExpansionFeature {
    pub fn new(config: &ExpansionConfig) -> Self {
        let initial = if config.expand_all {
            ExpandedState::All
        } else {
            ExpandedState::rows(config.expanded.iter().cloned())
        };
        Self {
            expanded: initial.clone(),
            initial,
            expandable: Vec::new(),
        }
    }

    pub fn expanded(&self) -> &ExpandedState {
        &self.expanded
    }

    /// Flip one row. Collapsing a row while everything is expanded turns
    /// `All` into the explicit set of the other expandable rows.
    pub fn toggle(&mut self, id: &str) {
        match &mut self.expanded {
            ExpandedState::All => {
                let rest = self
                    .expandable
                    .iter()
                    .filter(|candidate| candidate.as_str() != id)
                    .cloned()
                    .collect();
                self.expanded = ExpandedState::Rows(rest);
            }
            ExpandedState::Rows(ids) => {
                if !ids.remove(id) {
                    ids.insert(id.to_string());
                }
            }
        }
    }

    pub fn expand_all(&mut self) {
        self.expanded = ExpandedState::All;
    }

    pub fn collapse_all(&mut self) {
        self.expanded = ExpandedState::default();
    }
}

impl<Row, F> FeatureRuntime<Row, F> for ExpansionFeature {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Expansion
    }

    fn sync(&mut self, ctx: &FeatureContext<'_, Row, F>) {
        if self.expandable.as_slice() != ctx.expandable_ids {
            self.expandable = ctx.expandable_ids.to_vec();
        }
    }

    fn patch_table_options(&self, _ctx: &FeatureContext<'_, Row, F>) -> TableOptionsPatch {
        TableOptionsPatch {
            enable_expanding: Some(true),
            expanded: Some(self.expanded.clone()),
            ..Default::default()
        }
    }

    fn patch_actions(&self) -> ActionPatch {
        bind(
            FeatureKind::Expansion,
            &[
                ActionKind::ToggleRowExpanded,
                ActionKind::ExpandAll,
                ActionKind::CollapseAll,
            ],
        )
    }

    fn on_reset(&mut self) {
        self.expanded = self.initial.clone();
    }
}
