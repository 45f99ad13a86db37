//! Table state snapshots.
//!
//! A snapshot is the canonical `{page, size, sort, filters}` state of one
//! table. It is owned by a state adapter; the engine derives a [`Query`] from
//! it and never mutates it in place.

use crate::{error::Result, memo::structural_key, Error};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

/// Page size used when nothing else is specified.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Bounds required of a filter value.
///
/// Filters are compared structurally (through their serialized form), so
/// any serializable value works: a struct, a map, or `()` for none.
pub trait Filters: Clone + PartialEq + fmt::Debug + Serialize + Send + Sync + 'static {}

impl<T> Filters for T where T: Clone + PartialEq + fmt::Debug + Serialize + Send + Sync + 'static {}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortEntry {
    pub field: String,
    pub order: SortOrder,
}

impl SortEntry {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

/// Origin of a snapshot mutation.
///
/// Adapters may use it to special-case history recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeReason {
    Page,
    Size,
    Sort,
    Filters,
    Reset,
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeReason::Page => "page",
            ChangeReason::Size => "size",
            ChangeReason::Sort => "sort",
            ChangeReason::Filters => "filters",
            ChangeReason::Reset => "reset",
        };
        f.write_str(name)
    }
}

/// The canonical state of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStateSnapshot<F> {
    /// 1-indexed page number
    pub page: u32,
    /// Rows per page
    pub size: u32,
    /// Sort keys, most significant first
    pub sort: Vec<SortEntry>,
    /// Host-defined filter value
    pub filters: F,
}

impl<F> TableStateSnapshot<F> {
    /// Create a snapshot on the first page with no sort.
    pub fn new(size: u32, filters: F) -> Self {
        Self {
            page: 1,
            size,
            sort: Vec::new(),
            filters,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn with_sort(mut self, sort: Vec<SortEntry>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_filters(mut self, filters: F) -> Self {
        self.filters = filters;
        self
    }

    /// 0-indexed page, as rendering primitives expect it.
    pub fn page_index(&self) -> u32 {
        self.page.saturating_sub(1)
    }

    /// Check `page >= 1` and `size >= 1`.
    pub fn validate(&self) -> Result<()> {
        if self.page == 0 {
            return Err(Error::InvalidSnapshot("page must be at least 1".into()));
        }
        if self.size == 0 {
            return Err(Error::InvalidSnapshot("size must be at least 1".into()));
        }
        Ok(())
    }
}

impl<F: Clone> TableStateSnapshot<F> {
    /// The query the data source resolves for this snapshot.
    pub fn query(&self) -> Query<F> {
        Query {
            page: self.page,
            size: self.size,
            sort: self.sort.clone(),
            filters: self.filters.clone(),
        }
    }
}

impl<F: Default> Default for TableStateSnapshot<F> {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE, F::default())
    }
}

impl<F: Serialize> TableStateSnapshot<F> {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Structural key of the filters only.
    pub fn filters_key(&self) -> String {
        structural_key(&self.filters)
    }

    /// Structural key of everything that shapes the current page except filters.
    pub fn view_key(&self) -> String {
        structural_key(&(self.page, self.size, &self.sort))
    }
}

impl<F: DeserializeOwned> TableStateSnapshot<F> {
    /// Deserialize from JSON and validate.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}

/// What the data source is asked to resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query<F> {
    pub page: u32,
    pub size: u32,
    pub sort: Vec<SortEntry>,
    pub filters: F,
}

impl<F: Serialize> Query<F> {
    /// Structural cache key: equal content always yields an equal key.
    pub fn key(&self) -> String {
        structural_key(self)
    }
}
