//! Row accessors and the row-tree index.
//!
//! Rows are opaque to the engine. Ids and children come from two optional
//! accessors; without an id accessor a row is identified by its position
//! (`"3"` for the fourth root row, `"3.0"` for its first child).

use crate::{expansion::ExpandedState, RowId};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Returns the stable id of a row.
pub type GetRowId<Row> = Arc<dyn Fn(&Row) -> RowId + Send + Sync>;

/// Returns the children of a row; `None` or an empty slice for a leaf.
pub type GetSubRows<Row> = fn(&Row) -> Option<&[Row]>;

/// The optional row accessors of a table.
pub struct RowAccessors<Row> {
    get_row_id: Option<GetRowId<Row>>,
    get_sub_rows: Option<GetSubRows<Row>>,
}

impl<Row> RowAccessors<Row> {
    pub fn new() -> Self {
        Self {
            get_row_id: None,
            get_sub_rows: None,
        }
    }

    pub fn with_row_id(mut self, get_row_id: impl Fn(&Row) -> RowId + Send + Sync + 'static) -> Self {
        self.get_row_id = Some(Arc::new(get_row_id));
        self
    }

    /// Makes the table hierarchical.
    pub fn with_sub_rows(mut self, get_sub_rows: GetSubRows<Row>) -> Self {
        self.get_sub_rows = Some(get_sub_rows);
        self
    }

    pub fn has_row_id(&self) -> bool {
        self.get_row_id.is_some()
    }

    pub fn is_hierarchical(&self) -> bool {
        self.get_sub_rows.is_some()
    }

    /// Id of `row`, found at `index` under `parent` (`None` for roots).
    pub fn row_id(&self, row: &Row, parent: Option<&str>, index: usize) -> RowId {
        match (&self.get_row_id, parent) {
            (Some(get_row_id), _) => get_row_id(row),
            (None, Some(parent)) => format!("{parent}.{index}"),
            (None, None) => index.to_string(),
        }
    }

    pub fn sub_rows<'a>(&self, row: &'a Row) -> &'a [Row] {
        self.get_sub_rows
            .and_then(|get_sub_rows| get_sub_rows(row))
            .unwrap_or(&[])
    }

    /// Ids of the root rows in order.
    pub fn root_ids(&self, rows: &[Row]) -> Vec<RowId> {
        rows.iter()
            .enumerate()
            .map(|(index, row)| self.row_id(row, None, index))
            .collect()
    }
}

impl<Row> Default for RowAccessors<Row> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Row> Clone for RowAccessors<Row> {
    fn clone(&self) -> Self {
        Self {
            get_row_id: self.get_row_id.clone(),
            get_sub_rows: self.get_sub_rows,
        }
    }
}

impl<Row> fmt::Debug for RowAccessors<Row> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowAccessors")
            .field("has_row_id", &self.has_row_id())
            .field("is_hierarchical", &self.is_hierarchical())
            .finish()
    }
}

/// Position of one row in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedRow {
    pub id: RowId,
    pub parent_id: Option<RowId>,
    pub index_in_parent: usize,
    pub depth: usize,
}

/// Arena index over a row tree: positions by id plus ordered child lists.
///
/// Built in one pass with an explicit stack, so arbitrarily deep trees do not
/// recurse.
#[derive(Debug)]
pub struct RowIndex<'a, Row> {
    rows: HashMap<RowId, &'a Row>,
    by_id: HashMap<RowId, IndexedRow>,
    roots: Vec<RowId>,
    children: HashMap<RowId, Vec<RowId>>,
}

impl<'a, Row> RowIndex<'a, Row> {
    pub fn build(rows: &'a [Row], accessors: &RowAccessors<Row>) -> Self {
        let mut index = Self {
            rows: HashMap::with_capacity(rows.len()),
            by_id: HashMap::with_capacity(rows.len()),
            roots: Vec::with_capacity(rows.len()),
            children: HashMap::new(),
        };

        let mut stack: Vec<(&'a Row, RowId, usize)> = Vec::new();
        for (position, row) in rows.iter().enumerate() {
            let id = accessors.row_id(row, None, position);
            index.insert(row, id.clone(), None, position, 0);
            index.roots.push(id.clone());
            stack.push((row, id, 0));
        }

        while let Some((row, id, depth)) = stack.pop() {
            let sub_rows = accessors.sub_rows(row);
            if sub_rows.is_empty() {
                continue;
            }
            let mut child_ids = Vec::with_capacity(sub_rows.len());
            for (position, child) in sub_rows.iter().enumerate() {
                let child_id = accessors.row_id(child, Some(id.as_str()), position);
                index.insert(child, child_id.clone(), Some(id.clone()), position, depth + 1);
                child_ids.push(child_id.clone());
                stack.push((child, child_id, depth + 1));
            }
            index.children.insert(id, child_ids);
        }

        index
    }

    fn insert(&mut self, row: &'a Row, id: RowId, parent_id: Option<RowId>, position: usize, depth: usize) {
        if self.by_id.contains_key(&id) {
            warn!(row_id = %id, "duplicate row id; later row wins");
        }
        self.rows.insert(id.clone(), row);
        self.by_id.insert(
            id.clone(),
            IndexedRow {
                id,
                parent_id,
                index_in_parent: position,
                depth,
            },
        );
    }

    pub fn get(&self, id: &str) -> Option<&IndexedRow> {
        self.by_id.get(id)
    }

    pub fn row(&self, id: &str) -> Option<&'a Row> {
        self.rows.get(id).copied()
    }

    pub fn roots(&self) -> &[RowId] {
        &self.roots
    }

    /// Children of `parent`, or the roots for `None`.
    pub fn children_of(&self, parent: Option<&str>) -> &[RowId] {
        match parent {
            None => &self.roots,
            Some(parent) => self.children.get(parent).map(Vec::as_slice).unwrap_or(&[]),
        }
    }

    pub fn has_children(&self, id: &str) -> bool {
        self.children.get(id).is_some_and(|children| !children.is_empty())
    }

    /// Whether `candidate` sits somewhere below `ancestor`.
    ///
    /// Walks parent pointers upward from `candidate`; never materializes a
    /// descendant set.
    pub fn is_descendant(&self, candidate: &str, ancestor: &str) -> bool {
        let mut current = self.get(candidate).and_then(|row| row.parent_id.as_deref());
        let mut steps = 0;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.by_id.len() {
                warn!(row_id = %candidate, "parent chain longer than the tree; assuming a cycle");
                return true;
            }
            current = self.get(id).and_then(|row| row.parent_id.as_deref());
        }
        false
    }

    /// Ids of every row that has children.
    pub fn expandable_ids(&self) -> Vec<RowId> {
        let mut ids: Vec<RowId> = self
            .children
            .iter()
            .filter(|(_, children)| !children.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// A row of the flattened, expansion-aware view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatRow {
    pub id: RowId,
    pub parent_id: Option<RowId>,
    pub depth: usize,
    pub index_in_parent: usize,
    pub has_children: bool,
    pub is_expanded: bool,
}

/// Pre-order list of the rows currently visible given `expanded`.
pub fn flatten_visible<Row>(index: &RowIndex<'_, Row>, expanded: &ExpandedState) -> Vec<FlatRow> {
    let mut out = Vec::with_capacity(index.roots().len());
    let mut stack: Vec<&RowId> = index.roots().iter().rev().collect();

    while let Some(id) = stack.pop() {
        let Some(row) = index.get(id) else {
            continue;
        };
        let has_children = index.has_children(id);
        let is_expanded = has_children && expanded.is_expanded(id);
        out.push(FlatRow {
            id: row.id.clone(),
            parent_id: row.parent_id.clone(),
            depth: row.depth,
            index_in_parent: row.index_in_parent,
            has_children,
            is_expanded,
        });
        if is_expanded {
            stack.extend(index.children_of(Some(id.as_str())).iter().rev());
        }
    }

    out
}
