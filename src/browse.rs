use std::collections::VecDeque;

use serde_json::{Map, Value};

use crate::{BeaconError, BeaconIndex, Result};

/// Lazy walk over every hit of a browse query.
///
/// Pages are fetched through [`BeaconIndex::browse_from`] only when the
/// buffered page is exhausted and the previous page carried a continuation
/// cursor. The walk is finite and non-restartable: once a page arrives
/// without a cursor, or an error is yielded, the iterator is finished.
pub struct BrowseIter {
    index: BeaconIndex,
    params: Map<String, Value>,
    cursor: Option<String>,
    buffer: VecDeque<Value>,
    started: bool,
    done: bool,
}

impl BrowseIter {
    pub(crate) fn new(index: BeaconIndex, params: Map<String, Value>) -> Self {
        Self {
            index,
            params,
            cursor: None,
            buffer: VecDeque::new(),
            started: false,
            done: false,
        }
    }

    /// Yields the next hit, fetching the next page when needed.
    ///
    /// Errors from the underlying request are yielded once; after that the
    /// iterator is finished.
    pub async fn next(&mut self) -> Option<Result<Value>> {
        loop {
            if let Some(hit) = self.buffer.pop_front() {
                return Some(Ok(hit));
            }
            if self.done || (self.started && self.cursor.is_none()) {
                self.done = true;
                return None;
            }
            if let Err(err) = self.load_next_page().await {
                self.done = true;
                return Some(Err(err));
            }
        }
    }

    async fn load_next_page(&mut self) -> Result<()> {
        let page = self
            .index
            .browse_from(Some(&self.params), self.cursor.as_deref())
            .await?;
        self.started = true;
        self.cursor = page
            .get("cursor")
            .and_then(Value::as_str)
            .map(str::to_owned);

        let hits = page
            .get("hits")
            .and_then(Value::as_array)
            .ok_or_else(|| BeaconError::Decode("browse page missing hits array".to_owned()))?;
        self.buffer.extend(hits.iter().cloned());
        Ok(())
    }
}
