//! Drag-to-reorder.
//!
//! A drop gesture is turned into a validated reorder instruction by
//! [`plan_drop`]. The engine never applies the move itself: it hands the
//! instruction to `on_reorder` and keeps rendering the upstream rows, so a
//! failed reorder leaves the table exactly as it was.

use crate::{
    config::{CanDrag, CanDrop, DragSortConfig, OnDragError, OnReorder},
    feature::{FeatureContext, FeatureKind, FeatureRuntime},
    options::{bind, ActionKind, ActionPatch, TableOptionsPatch},
    rows::{RowAccessors, RowIndex},
    virtualization::InFlight,
    MutationError, MutationSource, RowId,
};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tracing::{debug, trace, warn};

/// Where the dragged row lands relative to the hovered row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropPosition {
    Above,
    Below,
    /// Become the last child of the hovered row
    Inside,
}

/// A drop gesture as reported by the drag layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropEvent {
    pub active_id: RowId,
    /// `None` when released outside any row
    pub over_id: Option<RowId>,
    pub position: DropPosition,
}

impl DropEvent {
    pub fn new(active_id: impl Into<RowId>, over_id: impl Into<RowId>, position: DropPosition) -> Self {
        Self {
            active_id: active_id.into(),
            over_id: Some(over_id.into()),
            position,
        }
    }
}

/// The instruction passed to `on_reorder`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderPayload<Row> {
    pub active_id: RowId,
    pub over_id: RowId,
    /// After normalization (`Inside` may have become `Below`)
    pub position: DropPosition,
    /// Position of the active row in its parent before the move
    pub active_index: usize,
    /// Position of the hovered row in its parent
    pub over_index: usize,
    pub source_parent_id: Option<RowId>,
    pub target_parent_id: Option<RowId>,
    /// Position in the target parent after the active row was removed
    pub target_index: usize,
    /// Root rows in their new order; only for same-parent root reorders
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reordered_rows: Option<Vec<Row>>,
}

/// Why a drop did not produce a reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DropSkip {
    /// Dropped onto itself
    SameRow,
    /// Released outside any row
    NoTarget,
    /// Active or hovered id is not on the current page
    UnknownRow,
    /// `can_drag` refused the active row
    CannotDrag,
    /// Moving between parents without nesting enabled
    CrossParent,
    /// The target parent is the active row or one of its descendants
    Cycle,
    /// The row would end up where it already is
    DropInPlace,
    /// `can_drop` refused the pair
    CannotDrop,
    /// Drag-sort is not enabled on this table
    Disabled,
    /// The previous reorder has not finished
    Busy,
}

impl fmt::Display for DropSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            DropSkip::SameRow => "same row",
            DropSkip::NoTarget => "no target",
            DropSkip::UnknownRow => "unknown row",
            DropSkip::CannotDrag => "can_drag refused",
            DropSkip::CrossParent => "cross-parent drop without nesting",
            DropSkip::Cycle => "drop into own subtree",
            DropSkip::DropInPlace => "drop in place",
            DropSkip::CannotDrop => "can_drop refused",
            DropSkip::Disabled => "drag-sort disabled",
            DropSkip::Busy => "reorder in flight",
        };
        f.write_str(reason)
    }
}

/// Result of [`plan_drop`].
#[derive(Debug, Clone, PartialEq)]
pub enum DropPlan<Row> {
    Move(ReorderPayload<Row>),
    Skip(DropSkip),
}

/// Host predicates consulted while planning.
pub struct DropRules<'a, Row> {
    pub allow_nesting: bool,
    pub can_drag: Option<&'a (dyn Fn(&Row) -> bool + Send + Sync)>,
    pub can_drop: Option<&'a (dyn Fn(&Row, &Row) -> bool + Send + Sync)>,
}

impl<Row> Default for DropRules<'_, Row> {
    fn default() -> Self {
        Self {
            allow_nesting: false,
            can_drag: None,
            can_drop: None,
        }
    }
}

/// Move the item at `from` so it ends up at `to`.
///
/// Out-of-range indices return the items unchanged.
pub fn array_move<T: Clone>(items: &[T], from: usize, to: usize) -> Vec<T> {
    let mut out = items.to_vec();
    if from >= out.len() || to >= out.len() {
        return out;
    }
    let item = out.remove(from);
    out.insert(to, item);
    out
}

/// Turn a drop gesture on `rows` into a reorder instruction.
///
/// The row index is rebuilt from `rows` on every call.
pub fn plan_drop<Row: Clone>(
    rows: &[Row],
    accessors: &RowAccessors<Row>,
    event: &DropEvent,
    rules: &DropRules<'_, Row>,
) -> DropPlan<Row> {
    let index = RowIndex::build(rows, accessors);

    let Some(over_id) = event.over_id.as_deref() else {
        return DropPlan::Skip(DropSkip::NoTarget);
    };
    let active_id = event.active_id.as_str();
    if active_id == over_id {
        return DropPlan::Skip(DropSkip::SameRow);
    }
    let (Some(active), Some(over)) = (index.get(active_id), index.get(over_id)) else {
        return DropPlan::Skip(DropSkip::UnknownRow);
    };
    let (Some(active_row), Some(over_row)) = (index.row(active_id), index.row(over_id)) else {
        return DropPlan::Skip(DropSkip::UnknownRow);
    };
    if let Some(can_drag) = rules.can_drag {
        if !can_drag(active_row) {
            return DropPlan::Skip(DropSkip::CannotDrag);
        }
    }

    let hierarchical = accessors.is_hierarchical();
    let nesting = hierarchical && rules.allow_nesting;
    let position = match event.position {
        DropPosition::Inside if !nesting => DropPosition::Below,
        position => position,
    };

    if hierarchical && !rules.allow_nesting && active.parent_id != over.parent_id {
        return DropPlan::Skip(DropSkip::CrossParent);
    }

    let target_parent_id = match position {
        DropPosition::Inside => Some(over.id.clone()),
        DropPosition::Above | DropPosition::Below => over.parent_id.clone(),
    };

    if let Some(target) = target_parent_id.as_deref() {
        if target == active_id || index.is_descendant(target, active_id) {
            return DropPlan::Skip(DropSkip::Cycle);
        }
    }

    let raw_index = match position {
        DropPosition::Inside => index.children_of(Some(over.id.as_str())).len(),
        DropPosition::Below => over.index_in_parent + 1,
        DropPosition::Above => over.index_in_parent,
    };

    let same_list = active.parent_id == target_parent_id;
    let target_index = if same_list && active.index_in_parent < raw_index {
        raw_index - 1
    } else {
        raw_index
    };

    if same_list && target_index == active.index_in_parent {
        return DropPlan::Skip(DropSkip::DropInPlace);
    }

    if let Some(can_drop) = rules.can_drop {
        if !can_drop(active_row, over_row) {
            return DropPlan::Skip(DropSkip::CannotDrop);
        }
    }

    let reordered_rows = (same_list && target_parent_id.is_none())
        .then(|| array_move(rows, active.index_in_parent, target_index));

    DropPlan::Move(ReorderPayload {
        active_id: active.id.clone(),
        over_id: over.id.clone(),
        position,
        active_index: active.index_in_parent,
        over_index: over.index_in_parent,
        source_parent_id: active.parent_id.clone(),
        target_parent_id,
        target_index,
        reordered_rows,
    })
}

/// Drag state machine: `Idle -> Dragging -> Idle`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        #[serde(rename = "activeId")]
        active_id: RowId,
    },
}

/// Result of a [`ReorderTask`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragEndOutcome {
    /// `on_reorder` accepted the move
    Reordered {
        target_parent_id: Option<RowId>,
        target_index: usize,
    },
    Skipped(DropSkip),
    /// `on_reorder` failed; the error is kept in feature state
    Failed(MutationError),
}

/// A validated drop on its way to `on_reorder`, for the host to drive.
///
/// Skipped drops resolve at once. The task does not borrow the table, so
/// rendering continues while the host persists the move.
#[must_use = "on_reorder only runs when the task is polled"]
pub struct ReorderTask {
    inner: ReorderInner,
    /// `(target_parent_id, target_index)` of a dispatched move
    target: Option<(Option<RowId>, usize)>,
}

enum ReorderInner {
    Ready(Option<DragEndOutcome>),
    Pending(BoxFuture<'static, DragEndOutcome>),
}

impl ReorderTask {
    fn ready(outcome: DragEndOutcome) -> Self {
        Self {
            inner: ReorderInner::Ready(Some(outcome)),
            target: None,
        }
    }

    pub(crate) fn skipped(reason: DropSkip) -> Self {
        Self::ready(DragEndOutcome::Skipped(reason))
    }

    /// Whether the drop was handed to `on_reorder`.
    pub fn is_dispatched(&self) -> bool {
        matches!(self.inner, ReorderInner::Pending(_))
    }

    /// Where a dispatched move is headed: parent id and index in it.
    pub fn target(&self) -> Option<(Option<&str>, usize)> {
        self.target
            .as_ref()
            .map(|(parent, index)| (parent.as_deref(), *index))
    }
}

impl Future for ReorderTask {
    type Output = DragEndOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.inner {
            ReorderInner::Ready(outcome) => {
                Poll::Ready(outcome.take().unwrap_or(DragEndOutcome::Skipped(DropSkip::Busy)))
            }
            ReorderInner::Pending(future) => future.as_mut().poll(cx),
        }
    }
}

impl fmt::Debug for ReorderTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReorderTask")
            .field("dispatched", &self.is_dispatched())
            .finish_non_exhaustive()
    }
}

/// Drag-sort feature.
pub struct DragSortFeature<Row> {
    config: DragSortConfig,
    on_reorder: OnReorder<Row>,
    on_error: Option<OnDragError<Row>>,
    can_drag: Option<CanDrag<Row>>,
    can_drop: Option<CanDrop<Row>>,
    state: DragState,
    reordering: Arc<AtomicBool>,
    error: Arc<Mutex<Option<MutationError>>>,
}

impl<Row: Clone + Send + Sync + 'static> DragSortFeature<Row> {
    pub fn new(config: &DragSortConfig, on_reorder: OnReorder<Row>) -> Self {
        Self {
            config: config.clone(),
            on_reorder,
            on_error: None,
            can_drag: None,
            can_drop: None,
            state: DragState::Idle,
            reordering: Arc::new(AtomicBool::new(false)),
            error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_guards(mut self, can_drag: Option<CanDrag<Row>>, can_drop: Option<CanDrop<Row>>) -> Self {
        self.can_drag = can_drag;
        self.can_drop = can_drop;
        self
    }

    pub fn with_on_error(mut self, on_error: Option<OnDragError<Row>>) -> Self {
        self.on_error = on_error;
        self
    }

    pub fn config(&self) -> &DragSortConfig {
        &self.config
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    pub fn active_id(&self) -> Option<&str> {
        match &self.state {
            DragState::Dragging { active_id } => Some(active_id),
            DragState::Idle => None,
        }
    }

    /// An `on_reorder` call is still running.
    pub fn is_reordering(&self) -> bool {
        self.reordering.load(Ordering::SeqCst)
    }

    pub fn error(&self) -> Option<MutationError> {
        crate::adapter::lock(&self.error).clone()
    }

    pub fn on_drag_start(&mut self, active_id: impl Into<RowId>) {
        let active_id = active_id.into();
        trace!(row_id = %active_id, "drag start");
        self.state = DragState::Dragging { active_id };
    }

    pub fn on_drag_cancel(&mut self) {
        trace!("drag cancelled");
        self.state = DragState::Idle;
    }

    /// Validate the drop and hand it to `on_reorder`.
    ///
    /// Only one reorder runs at a time. A failed reorder is captured,
    /// reported to `on_error` and resolves as [`DragEndOutcome::Failed`]; it
    /// is never propagated.
    pub fn on_drag_end(&mut self, rows: &[Row], accessors: &RowAccessors<Row>, event: &DropEvent) -> ReorderTask {
        self.state = DragState::Idle;
        if self.is_reordering() {
            debug!(active_id = %event.active_id, "drop skipped: reorder in flight");
            return ReorderTask::skipped(DropSkip::Busy);
        }

        let rules = DropRules {
            allow_nesting: self.config.allow_nesting,
            can_drag: self.can_drag.as_deref(),
            can_drop: self.can_drop.as_deref(),
        };
        let payload = match plan_drop(rows, accessors, event, &rules) {
            DropPlan::Move(payload) => payload,
            DropPlan::Skip(reason) => {
                debug!(active_id = %event.active_id, over_id = ?event.over_id, %reason, "drop skipped");
                return ReorderTask::skipped(reason);
            }
        };

        debug!(
            active_id = %payload.active_id,
            target_parent_id = ?payload.target_parent_id,
            target_index = payload.target_index,
            "reorder"
        );

        let target = Some((payload.target_parent_id.clone(), payload.target_index));
        let guard = InFlight::raise(Arc::clone(&self.reordering));
        let on_reorder = Arc::clone(&self.on_reorder);
        let on_error = self.on_error.clone();
        let slot = Arc::clone(&self.error);
        let future = async move {
            let _guard = guard;
            match on_reorder(payload.clone()).await {
                Ok(()) => DragEndOutcome::Reordered {
                    target_parent_id: payload.target_parent_id,
                    target_index: payload.target_index,
                },
                Err(e) => {
                    let error = MutationError::new(MutationSource::Reorder, &e);
                    warn!(active_id = %payload.active_id, error = %error.message, "reorder failed");
                    if let Some(on_error) = &on_error {
                        on_error(&error, &payload);
                    }
                    *crate::adapter::lock(&slot) = Some(error.clone());
                    DragEndOutcome::Failed(error)
                }
            }
        };
        ReorderTask {
            inner: ReorderInner::Pending(Box::pin(future)),
            target,
        }
    }

    pub fn clear_error(&mut self) {
        *crate::adapter::lock(&self.error) = None;
    }
}

impl<Row: Clone + Send + Sync + 'static, F> FeatureRuntime<Row, F> for DragSortFeature<Row> {
    fn kind(&self) -> FeatureKind {
        FeatureKind::DragSort
    }

    fn patch_table_options(&self, _ctx: &FeatureContext<'_, Row, F>) -> TableOptionsPatch {
        TableOptionsPatch {
            enable_row_drag: Some(true),
            ..Default::default()
        }
        .with_meta(
            "dragSort",
            json!({
                "handle": self.config.handle,
                "dragOverlay": self.config.drag_overlay,
                "allowNesting": self.config.allow_nesting,
            }),
        )
    }

    fn patch_actions(&self) -> ActionPatch {
        bind(
            FeatureKind::DragSort,
            &[
                ActionKind::DragStart,
                ActionKind::DragEnd,
                ActionKind::DragCancel,
                ActionKind::ClearDragSortError,
            ],
        )
    }

    fn on_reset(&mut self) {
        self.state = DragState::Idle;
        self.clear_error();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::tests::{leaf, node, tree_accessors, Node};
    use crate::BoxError;
    use futures::FutureExt;
    use std::sync::{Arc, Mutex};

    fn flat(ids: &[&str]) -> Vec<Node> {
        ids.iter().map(|id| leaf(id)).collect()
    }

    fn flat_accessors() -> RowAccessors<Node> {
        RowAccessors::new().with_row_id(|n: &Node| n.id.clone())
    }

    fn nesting() -> DropRules<'static, Node> {
        DropRules {
            allow_nesting: true,
            ..Default::default()
        }
    }

    fn plan(rows: &[Node], accessors: &RowAccessors<Node>, event: DropEvent, rules: &DropRules<'_, Node>) -> DropPlan<Node> {
        plan_drop(rows, accessors, &event, rules)
    }

    fn moved(plan: DropPlan<Node>) -> ReorderPayload<Node> {
        match plan {
            DropPlan::Move(payload) => payload,
            DropPlan::Skip(reason) => panic!("expected a move, got skip: {reason}"),
        }
    }

    fn ids(rows: &[Node]) -> Vec<&str> {
        rows.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn array_move_forward_and_back() {
        assert_eq!(array_move(&["a", "b", "c"], 0, 2), vec!["b", "c", "a"]);
        assert_eq!(array_move(&["a", "b", "c"], 2, 0), vec!["c", "a", "b"]);
        assert_eq!(array_move(&["a", "b"], 0, 5), vec!["a", "b"]);
    }

    #[test]
    fn drop_below_next_row_applies_index_correction() {
        let rows = flat(&["a", "b", "c"]);
        let payload = moved(plan(
            &rows,
            &flat_accessors(),
            DropEvent::new("a", "b", DropPosition::Below),
            &DropRules::default(),
        ));

        assert_eq!(payload.active_index, 0);
        assert_eq!(payload.over_index, 1);
        assert_eq!(payload.target_index, 1);
        assert_eq!(payload.target_parent_id, None);
        assert_eq!(ids(payload.reordered_rows.as_deref().unwrap()), vec!["b", "a", "c"]);
    }

    #[test]
    fn drop_above_earlier_row_needs_no_correction() {
        let rows = flat(&["a", "b", "c"]);
        let payload = moved(plan(
            &rows,
            &flat_accessors(),
            DropEvent::new("c", "a", DropPosition::Above),
            &DropRules::default(),
        ));
        assert_eq!(payload.target_index, 0);
        assert_eq!(ids(payload.reordered_rows.as_deref().unwrap()), vec!["c", "a", "b"]);
    }

    #[test]
    fn drop_in_place_is_skipped() {
        let rows = flat(&["a", "b", "c"]);
        let skip = plan(
            &rows,
            &flat_accessors(),
            DropEvent::new("a", "b", DropPosition::Above),
            &DropRules::default(),
        );
        assert_eq!(skip, DropPlan::Skip(DropSkip::DropInPlace));

        let skip = plan(
            &rows,
            &flat_accessors(),
            DropEvent::new("a", "a", DropPosition::Below),
            &DropRules::default(),
        );
        assert_eq!(skip, DropPlan::Skip(DropSkip::SameRow));
    }

    #[test]
    fn inside_downgrades_to_below_without_nesting() {
        let rows = flat(&["a", "b", "c"]);
        let payload = moved(plan(
            &rows,
            &flat_accessors(),
            DropEvent::new("a", "b", DropPosition::Inside),
            &nesting(),
        ));
        assert_eq!(payload.position, DropPosition::Below);
        assert_eq!(payload.target_parent_id, None);
    }

    #[test]
    fn cross_parent_drop_refused_without_nesting() {
        let rows = vec![node("a", vec![leaf("a1")]), node("b", vec![leaf("b1")])];
        let skip = plan(
            &rows,
            &tree_accessors(),
            DropEvent::new("a1", "b1", DropPosition::Below),
            &DropRules::default(),
        );
        assert_eq!(skip, DropPlan::Skip(DropSkip::CrossParent));
    }

    #[test]
    fn nested_move_omits_reordered_rows() {
        let rows = vec![node("a", vec![leaf("a1"), leaf("a2")]), leaf("b")];
        let payload = moved(plan(
            &rows,
            &tree_accessors(),
            DropEvent::new("b", "a", DropPosition::Inside),
            &nesting(),
        ));
        assert_eq!(payload.target_parent_id.as_deref(), Some("a"));
        assert_eq!(payload.target_index, 2);
        assert!(payload.reordered_rows.is_none());

        let payload = moved(plan(
            &rows,
            &tree_accessors(),
            DropEvent::new("a2", "a1", DropPosition::Above),
            &nesting(),
        ));
        assert_eq!(payload.target_index, 0);
        assert!(payload.reordered_rows.is_none());
    }

    #[test]
    fn dropping_into_own_descendant_is_a_cycle() {
        let rows = vec![node("a", vec![node("b", vec![node("c", vec![leaf("d")])])])];
        for target in ["b", "c", "d"] {
            let skip = plan(
                &rows,
                &tree_accessors(),
                DropEvent::new("a", target, DropPosition::Inside),
                &nesting(),
            );
            assert_eq!(skip, DropPlan::Skip(DropSkip::Cycle), "target {target}");
        }

        // Above a direct child: target parent is the active row itself.
        let skip = plan(
            &rows,
            &tree_accessors(),
            DropEvent::new("a", "b", DropPosition::Above),
            &nesting(),
        );
        assert_eq!(skip, DropPlan::Skip(DropSkip::Cycle));
    }

    #[test]
    fn moving_child_inside_own_parent_goes_last() {
        let rows = vec![node("p", vec![leaf("x"), leaf("y"), leaf("z")])];
        let payload = moved(plan(
            &rows,
            &tree_accessors(),
            DropEvent::new("x", "p", DropPosition::Inside),
            &nesting(),
        ));
        assert_eq!(payload.target_index, 2);

        let skip = plan(
            &rows,
            &tree_accessors(),
            DropEvent::new("z", "p", DropPosition::Inside),
            &nesting(),
        );
        assert_eq!(skip, DropPlan::Skip(DropSkip::DropInPlace));
    }

    #[test]
    fn guards_can_refuse() {
        let rows = flat(&["a", "locked", "c"]);
        let can_drag = |n: &Node| n.id != "locked";
        let can_drop = |_: &Node, over: &Node| over.id != "c";
        let rules = DropRules {
            allow_nesting: false,
            can_drag: Some(&can_drag),
            can_drop: Some(&can_drop),
        };

        let skip = plan(&rows, &flat_accessors(), DropEvent::new("locked", "a", DropPosition::Above), &rules);
        assert_eq!(skip, DropPlan::Skip(DropSkip::CannotDrag));

        let skip = plan(&rows, &flat_accessors(), DropEvent::new("a", "c", DropPosition::Below), &rules);
        assert_eq!(skip, DropPlan::Skip(DropSkip::CannotDrop));
    }

    #[test]
    fn unknown_rows_and_missing_target() {
        let rows = flat(&["a", "b"]);
        let skip = plan(&rows, &flat_accessors(), DropEvent::new("zz", "a", DropPosition::Above), &DropRules::default());
        assert_eq!(skip, DropPlan::Skip(DropSkip::UnknownRow));

        let event = DropEvent {
            active_id: "a".into(),
            over_id: None,
            position: DropPosition::Below,
        };
        assert_eq!(
            plan(&rows, &flat_accessors(), event, &DropRules::default()),
            DropPlan::Skip(DropSkip::NoTarget)
        );
    }

    fn recording_feature(fail: bool) -> (DragSortFeature<Node>, Arc<Mutex<Vec<ReorderPayload<Node>>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&calls);
        let on_reorder: OnReorder<Node> = Arc::new(move |payload: ReorderPayload<Node>| {
            seen.lock().unwrap().push(payload);
            async move {
                if fail {
                    Err::<(), BoxError>("conflict".into())
                } else {
                    Ok(())
                }
            }
            .boxed()
        });
        (DragSortFeature::new(&DragSortConfig::default(), on_reorder), calls)
    }

    #[tokio::test]
    async fn drag_end_calls_on_reorder_and_returns_to_idle() {
        let (mut feature, calls) = recording_feature(false);
        let rows = flat(&["a", "b", "c"]);

        feature.on_drag_start("a");
        assert!(feature.is_dragging());
        assert_eq!(feature.active_id(), Some("a"));

        let outcome = feature
            .on_drag_end(&rows, &flat_accessors(), &DropEvent::new("a", "b", DropPosition::Below))
            .await;
        assert_eq!(
            outcome,
            DragEndOutcome::Reordered {
                target_parent_id: None,
                target_index: 1
            }
        );
        assert!(!feature.is_dragging());
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].active_index, 0);
    }

    #[tokio::test]
    async fn cycle_never_reaches_on_reorder() {
        let (mut feature, calls) = recording_feature(false);
        feature.config.allow_nesting = true;
        let rows = vec![node("a", vec![node("b", vec![leaf("c")])])];

        let outcome = feature
            .on_drag_end(&rows, &tree_accessors(), &DropEvent::new("a", "c", DropPosition::Inside))
            .await;
        assert_eq!(outcome, DragEndOutcome::Skipped(DropSkip::Cycle));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_reorder_is_captured_and_reported() {
        let (feature, _calls) = recording_feature(true);
        let reported = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&reported);
        let mut feature = feature.with_on_error(Some(Arc::new(
            move |error: &MutationError, payload: &ReorderPayload<Node>| {
                *sink.lock().unwrap() = Some((error.message.clone(), payload.active_id.clone()));
            },
        )));
        let rows = flat(&["a", "b"]);

        let outcome = feature
            .on_drag_end(&rows, &flat_accessors(), &DropEvent::new("b", "a", DropPosition::Above))
            .await;
        assert!(matches!(outcome, DragEndOutcome::Failed(_)));
        assert_eq!(feature.error().unwrap().message, "conflict");
        assert_eq!(
            reported.lock().unwrap().clone(),
            Some(("conflict".to_string(), "b".to_string()))
        );

        feature.clear_error();
        assert!(feature.error().is_none());
    }

    #[tokio::test]
    async fn one_reorder_at_a_time() {
        let on_reorder: OnReorder<Node> = Arc::new(|_: ReorderPayload<Node>| futures::future::pending::<Result<(), BoxError>>().boxed());
        let mut feature = DragSortFeature::new(&DragSortConfig::default(), on_reorder);
        let rows = flat(&["a", "b", "c"]);

        let first = feature.on_drag_end(&rows, &flat_accessors(), &DropEvent::new("a", "b", DropPosition::Below));
        assert!(first.is_dispatched());
        assert!(feature.is_reordering());

        let second = feature
            .on_drag_end(&rows, &flat_accessors(), &DropEvent::new("c", "a", DropPosition::Above))
            .await;
        assert_eq!(second, DragEndOutcome::Skipped(DropSkip::Busy));

        drop(first);
        assert!(!feature.is_reordering());
    }

    #[test]
    fn cancel_returns_to_idle() {
        let (mut feature, _) = recording_feature(false);
        feature.on_drag_start("a");
        feature.on_drag_cancel();
        assert_eq!(feature.state(), &DragState::Idle);
    }
}
