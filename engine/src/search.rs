//! URL-backed state adapter.
//!
//! The snapshot is stored as a query string:
//! `page=2&size=20&sort=name:asc,createdAt:desc&filters=<json>`.
//! Changes are recorded in a history stack the way a browser records
//! navigation: filter edits replace the current entry (typing into a search
//! box should not create one entry per keystroke), every other change pushes
//! a new one. [`SearchParamsAdapter::back`] and
//! [`SearchParamsAdapter::forward`] move through the stack and notify
//! subscribers, which is exactly the "someone else changed the snapshot"
//! case the engine has to absorb.

use crate::adapter::{lock, Listener, Listeners, StateAdapter, Subscription};
use crate::{error::Result, ChangeReason, Error, Filters, SortEntry, SortOrder, TableStateSnapshot};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use url::form_urlencoded;

/// Encode a snapshot as a query string (without the leading `?`).
pub fn encode_search<F: Filters>(snapshot: &TableStateSnapshot<F>) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    serializer.append_pair("page", &snapshot.page.to_string());
    serializer.append_pair("size", &snapshot.size.to_string());

    if !snapshot.sort.is_empty() {
        let sort = snapshot
            .sort
            .iter()
            .map(|entry| format!("{}:{}", entry.field, entry.order.as_str()))
            .collect::<Vec<_>>()
            .join(",");
        serializer.append_pair("sort", &sort);
    }

    // Always written: an empty object must not decode back to non-empty
    // defaults.
    serializer.append_pair("filters", &snapshot.filters_key());

    serializer.finish()
}

/// Decode a query string, falling back to `defaults` for absent keys.
///
/// Unknown keys are ignored; malformed values are an error.
pub fn decode_search<F>(search: &str, defaults: &TableStateSnapshot<F>) -> Result<TableStateSnapshot<F>>
where
    F: Filters + DeserializeOwned,
{
    let mut snapshot = defaults.clone();
    let search = search.strip_prefix('?').unwrap_or(search);

    for (key, value) in form_urlencoded::parse(search.as_bytes()) {
        match key.as_ref() {
            "page" => {
                snapshot.page = value
                    .parse()
                    .map_err(|_| Error::InvalidSearch(format!("page: {value}")))?;
            }
            "size" => {
                snapshot.size = value
                    .parse()
                    .map_err(|_| Error::InvalidSearch(format!("size: {value}")))?;
            }
            "sort" => snapshot.sort = parse_sort(&value)?,
            "filters" => {
                snapshot.filters = serde_json::from_str(&value)
                    .map_err(|e| Error::InvalidSearch(format!("filters: {e}")))?;
            }
            _ => {}
        }
    }

    snapshot.validate()?;
    Ok(snapshot)
}

fn parse_sort(value: &str) -> Result<Vec<SortEntry>> {
    value
        .split(',')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (field, order) = part.rsplit_once(':').unwrap_or((part, "asc"));
            let order = SortOrder::parse(order)
                .ok_or_else(|| Error::InvalidSearch(format!("sort order: {order}")))?;
            if field.is_empty() {
                return Err(Error::InvalidSearch("sort field is empty".into()));
            }
            Ok(SortEntry {
                field: field.to_string(),
                order,
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
struct HistoryEntry<F> {
    search: String,
    snapshot: TableStateSnapshot<F>,
}

#[derive(Debug)]
struct History<F> {
    entries: Vec<HistoryEntry<F>>,
    cursor: usize,
}

impl<F> History<F> {
    fn current(&self) -> &HistoryEntry<F> {
        &self.entries[self.cursor]
    }
}

/// Adapter persisting the snapshot in a URL query string with history.
#[derive(Debug)]
pub struct SearchParamsAdapter<F> {
    history: Mutex<History<F>>,
    listeners: Arc<Listeners>,
}

impl<F: Filters + DeserializeOwned> SearchParamsAdapter<F> {
    /// Start from a snapshot; the first history entry is its encoding.
    pub fn new(initial: TableStateSnapshot<F>) -> Self {
        let entry = HistoryEntry {
            search: encode_search(&initial),
            snapshot: initial,
        };
        Self {
            history: Mutex::new(History {
                entries: vec![entry],
                cursor: 0,
            }),
            listeners: Listeners::new_shared(),
        }
    }

    /// Start from an existing location, e.g. a deep link.
    pub fn from_search(search: &str, defaults: &TableStateSnapshot<F>) -> Result<Self> {
        let snapshot = decode_search(search, defaults)?;
        Ok(Self::new(snapshot))
    }

    /// Navigate one entry back. Returns `false` at the start of history.
    pub fn back(&self) -> bool {
        self.navigate(-1)
    }

    /// Navigate one entry forward. Returns `false` at the end of history.
    pub fn forward(&self) -> bool {
        self.navigate(1)
    }

    /// Simulate the user editing the address bar.
    pub fn push_search(&self, search: &str) -> Result<()> {
        let defaults = lock(&self.history).current().snapshot.clone();
        let snapshot = decode_search(search, &defaults)?;
        if self.record(snapshot, false) {
            self.listeners.notify();
        }
        Ok(())
    }

    /// Every recorded search string, oldest first.
    pub fn history(&self) -> Vec<String> {
        lock(&self.history)
            .entries
            .iter()
            .map(|entry| entry.search.clone())
            .collect()
    }

    fn navigate(&self, step: isize) -> bool {
        {
            let mut history = lock(&self.history);
            let Some(next) = history.cursor.checked_add_signed(step) else {
                return false;
            };
            if next >= history.entries.len() {
                return false;
            }
            history.cursor = next;
            debug!(search = %history.current().search, "history navigation");
        }
        self.listeners.notify();
        true
    }

    /// Returns `false` if the encoded search did not change.
    fn record(&self, snapshot: TableStateSnapshot<F>, replace: bool) -> bool {
        let mut history = lock(&self.history);
        let search = encode_search(&snapshot);
        if history.current().search == search {
            return false;
        }
        let entry = HistoryEntry { search, snapshot };
        if replace {
            let cursor = history.cursor;
            history.entries[cursor] = entry;
        } else {
            let keep = history.cursor + 1;
            history.entries.truncate(keep);
            history.entries.push(entry);
            history.cursor = keep;
        }
        true
    }
}

impl<F: Filters + DeserializeOwned> StateAdapter<F> for SearchParamsAdapter<F> {
    fn get_snapshot(&self) -> TableStateSnapshot<F> {
        lock(&self.history).current().snapshot.clone()
    }

    fn set_snapshot(&self, next: TableStateSnapshot<F>, reason: ChangeReason) {
        if let Err(e) = next.validate() {
            warn!(%reason, error = %e, "refusing to record invalid snapshot");
            return;
        }
        let replace = reason == ChangeReason::Filters;
        if self.record(next, replace) {
            self.listeners.notify();
        }
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        self.listeners.add(listener)
    }

    fn search_key(&self) -> Option<String> {
        Some(lock(&self.history).current().search.clone())
    }
}
