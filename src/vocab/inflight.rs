//! Per-key request deduplication.
//!
//! The first caller for a key runs the work; concurrent callers await the
//! same result. The settled value is kept for the life of the process, which
//! is also how failed lookups are remembered.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;

pub(crate) struct InFlight<T> {
    cells: Mutex<HashMap<String, Arc<OnceCell<T>>>>,
}

impl<T: Clone> InFlight<T> {
    pub fn new() -> InFlight<T> {
        InFlight {
            cells: Mutex::new(HashMap::new()),
        }
    }

    pub async fn run<F, Fut>(&self, key: &str, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
            cells.entry(key.to_string()).or_default().clone()
        };
        cell.get_or_init(work).await.clone()
    }

    /// The result for `key` if its work has finished.
    pub fn settled(&self, key: &str) -> Option<T> {
        let cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.get(key)?.get().cloned()
    }

    /// Whether work for `key` was ever started.
    pub fn started(&self, key: &str) -> bool {
        let cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.contains_key(key)
    }
}
