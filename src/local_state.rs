//! Screen-side view of favorites: which items are favorited and their
//! displayed counts.
//!
//! Updates are applied only after the store confirms a toggle. While a toggle
//! is in flight the item is marked pending and a second toggle on it is
//! refused.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use crate::error::AppError;
use crate::favorite::ToggleOutcome;

#[derive(Debug, Default, Clone)]
pub struct LocalFavorites {
    favorited: HashSet<String>,
    counts: HashMap<String, i32>,
    pending: HashSet<String>,
}

impl LocalFavorites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the view from a freshly loaded favorites list, as a screen
    /// does when it regains focus.
    pub fn refresh<I, S>(&mut self, favorited: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.favorited = favorited.into_iter().map(Into::into).collect();
    }

    pub fn set_count(&mut self, item_id: impl Into<String>, count: i32) {
        self.counts.insert(item_id.into(), count);
    }

    pub fn is_favorited(&self, item_id: &str) -> bool {
        self.favorited.contains(item_id)
    }

    pub fn count(&self, item_id: &str) -> i32 {
        self.counts.get(item_id).copied().unwrap_or(0)
    }

    pub fn is_pending(&self, item_id: &str) -> bool {
        self.pending.contains(item_id)
    }

    pub fn begin(&mut self, item_id: &str) -> Result<(), AppError> {
        if !self.pending.insert(item_id.to_string()) {
            return Err(AppError::fail("a favorite change for this item is still in progress"));
        }
        Ok(())
    }

    /// Clears the pending mark and applies `result` if it succeeded. A failed
    /// toggle leaves favorites and counts exactly as they were.
    pub fn finish(
        &mut self,
        item_id: &str,
        result: Result<ToggleOutcome, AppError>,
    ) -> Result<ToggleOutcome, AppError> {
        self.pending.remove(item_id);
        let outcome = result?;
        if outcome.favorited {
            self.favorited.insert(outcome.item_id.clone());
        } else {
            self.favorited.remove(&outcome.item_id);
        }
        self.counts.insert(outcome.item_id.clone(), outcome.like_count);
        Ok(outcome)
    }

    pub async fn toggle_with<F>(&mut self, item_id: &str, remote: F) -> Result<ToggleOutcome, AppError>
    where
        F: Future<Output = Result<ToggleOutcome, AppError>>,
    {
        self.begin(item_id)?;
        let result = remote.await;
        self.finish(item_id, result)
    }
}
