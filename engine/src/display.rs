//! Density and analytics.

use crate::{
    config::{AnalyticsConfig, AnalyticsSink, DensityConfig},
    feature::{FeatureContext, FeatureKind, FeatureRuntime},
    options::{bind, ActionKind, ActionPatch, TableOptionsPatch},
    selection::SelectedCount,
    RowId, SortEntry,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::trace;

/// Row spacing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Density {
    Compact,
    #[default]
    Standard,
    Comfortable,
}

#[derive(Debug, Clone)]
pub struct DensityFeature {
    initial: Density,
    density: Density,
}

impl DensityFeature {
    pub fn new(config: &DensityConfig) -> Self {
        Self {
            initial: config.initial,
            density: config.initial,
        }
    }

    pub fn density(&self) -> Density {
        self.density
    }

    pub fn set(&mut self, density: Density) {
        self.density = density;
    }
}

impl<Row, F> FeatureRuntime<Row, F> for DensityFeature {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Density
    }

    fn patch_table_options(&self, _ctx: &FeatureContext<'_, Row, F>) -> TableOptionsPatch {
        TableOptionsPatch::default().with_meta("density", json!(self.density))
    }

    fn patch_actions(&self) -> ActionPatch {
        bind(FeatureKind::Density, &[ActionKind::SetDensity])
    }

    fn on_reset(&mut self) {
        self.density = self.initial;
    }
}

/// Something a user did to the table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum AnalyticsEvent {
    PageChanged {
        page: u32,
    },
    PageSizeChanged {
        size: u32,
    },
    SortChanged {
        sort: Vec<SortEntry>,
    },
    FiltersChanged,
    SelectionChanged {
        count: SelectedCount,
    },
    /// A validated move was handed to `on_reorder`
    #[serde(rename_all = "camelCase")]
    RowsReordered {
        active_id: RowId,
        target_parent_id: Option<RowId>,
        target_index: usize,
    },
    #[serde(rename_all = "camelCase")]
    LoadMoreTriggered {
        row_count: usize,
    },
    Reset,
    /// Recorded through the `track` action
    Custom {
        name: String,
        payload: Value,
    },
}

/// Forwards [`AnalyticsEvent`]s to the host sink.
pub struct AnalyticsFeature {
    table_name: Option<String>,
    sink: Option<AnalyticsSink>,
    emitted: u64,
}

impl AnalyticsFeature {
    pub fn new(config: &AnalyticsConfig, sink: Option<AnalyticsSink>) -> Self {
        Self {
            table_name: config.table_name.clone(),
            sink,
            emitted: 0,
        }
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table_name.as_deref()
    }

    /// Number of events handed to the sink so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn emit(&mut self, event: AnalyticsEvent) {
        let Some(sink) = &self.sink else {
            return;
        };
        trace!(table = ?self.table_name, ?event, "analytics event");
        sink(&event);
        self.emitted += 1;
    }

    pub fn track(&mut self, name: impl Into<String>, payload: Value) {
        self.emit(AnalyticsEvent::Custom {
            name: name.into(),
            payload,
        });
    }
}

impl<Row, F> FeatureRuntime<Row, F> for AnalyticsFeature {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Analytics
    }

    fn patch_table_options(&self, _ctx: &FeatureContext<'_, Row, F>) -> TableOptionsPatch {
        match &self.table_name {
            Some(name) => TableOptionsPatch::default().with_meta("analytics", json!({ "table": name })),
            None => TableOptionsPatch::default(),
        }
    }

    fn patch_actions(&self) -> ActionPatch {
        bind(FeatureKind::Analytics, &[ActionKind::Track])
    }

    fn on_reset(&mut self) {}
}
