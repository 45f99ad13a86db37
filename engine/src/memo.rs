//! Stability helpers.
//!
//! Consumers compare engine output by pointer to decide whether to redraw.
//! These helpers hand back the previous `Arc` whenever a recomputed value is
//! structurally equal to the last one. Every cache is owned by the value
//! holding it; there is no global state.

use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Serialize a value into a key that only depends on its content.
///
/// Goes through `serde_json::Value`, whose maps are ordered, so two maps with
/// the same entries produce the same key regardless of insertion order.
pub fn structural_key<T: Serialize + ?Sized>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(value) => value.to_string(),
        Err(e) => {
            warn!(error = %e, "value is not serializable; structural key falls back to error text");
            format!("!unserializable:{e}")
        }
    }
}

/// A value that keeps its `Arc` identity while its content is unchanged.
#[derive(Debug, Clone)]
pub struct Stable<T> {
    current: Arc<T>,
}

impl<T: PartialEq> Stable<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: Arc::new(value),
        }
    }

    /// Replace the value if it differs and return the (possibly old) `Arc`.
    pub fn update(&mut self, next: T) -> Arc<T> {
        if *self.current != next {
            self.current = Arc::new(next);
        }
        Arc::clone(&self.current)
    }

    pub fn get(&self) -> Arc<T> {
        Arc::clone(&self.current)
    }
}

impl<T: PartialEq + Default> Default for Stable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// A single-entry cache keyed by a dependency value.
///
/// `compute` only runs when the dependencies differ from the previous call.
#[derive(Debug)]
pub struct Memo<D, V> {
    entry: Option<(D, Arc<V>)>,
}

impl<D: PartialEq, V> Memo<D, V> {
    pub fn new() -> Self {
        Self { entry: None }
    }

    pub fn get_or_compute(&mut self, deps: D, compute: impl FnOnce(&D) -> V) -> Arc<V> {
        if let Some((cached_deps, value)) = &self.entry {
            if *cached_deps == deps {
                return Arc::clone(value);
            }
        }
        let value = Arc::new(compute(&deps));
        self.entry = Some((deps, Arc::clone(&value)));
        value
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

impl<D: PartialEq, V> Default for Memo<D, V> {
    fn default() -> Self {
        Self::new()
    }
}
