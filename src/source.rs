use crate::{
    error::{JobError, Result},
    query::SelectionQuery,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: u32, // 1-based
    pub ids: Vec<RecordId>,
}

/// Keyset-paginated view of the records a query selects.
pub trait ChunkSource {
    /// Number of records the query currently matches.
    fn count(&self, query: &SelectionQuery) -> Result<u64>;

    /// Up to `limit` matching identifiers strictly greater than `after`, ascending.
    fn fetch_page(
        &self,
        query: &SelectionQuery,
        after: Option<&RecordId>,
        limit: usize,
    ) -> Result<Vec<RecordId>>;
}

impl<T: ChunkSource + ?Sized> ChunkSource for &T {
    fn count(&self, query: &SelectionQuery) -> Result<u64> {
        (**self).count(query)
    }

    fn fetch_page(
        &self,
        query: &SelectionQuery,
        after: Option<&RecordId>,
        limit: usize,
    ) -> Result<Vec<RecordId>> {
        (**self).fetch_page(query, after, limit)
    }
}

impl<T: ChunkSource + ?Sized> ChunkSource for Arc<T> {
    fn count(&self, query: &SelectionQuery) -> Result<u64> {
        (**self).count(query)
    }

    fn fetch_page(
        &self,
        query: &SelectionQuery,
        after: Option<&RecordId>,
        limit: usize,
    ) -> Result<Vec<RecordId>> {
        (**self).fetch_page(query, after, limit)
    }
}

/// Where a cursor stands; enough to reopen it after an interruption.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_id: Option<RecordId>,
    pub chunks_emitted: u32,
    pub records_emitted: u64,
}

/// Pulls one page per chunk, so at most one chunk of ids is held at a time.
pub struct ChunkCursor<'a, S: ChunkSource + ?Sized> {
    source: &'a S,
    query: &'a SelectionQuery,
    chunk_size: usize,
    checkpoint: Checkpoint,
    exhausted: bool,
}

impl<'a, S: ChunkSource + ?Sized> ChunkCursor<'a, S> {
    pub fn open(source: &'a S, query: &'a SelectionQuery, chunk_size: usize) -> Self {
        Self::resume(source, query, chunk_size, Checkpoint::default())
    }

    pub fn resume(
        source: &'a S,
        query: &'a SelectionQuery,
        chunk_size: usize,
        checkpoint: Checkpoint,
    ) -> Self {
        Self {
            source,
            query,
            chunk_size: chunk_size.max(1),
            checkpoint,
            exhausted: false,
        }
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut want = self.chunk_size;
        if let Some(limit) = self.query.limit() {
            let remaining = limit.saturating_sub(self.checkpoint.records_emitted);
            if remaining == 0 {
                self.exhausted = true;
                return Ok(None);
            }
            want = want.min(usize::try_from(remaining).unwrap_or(usize::MAX));
        }

        let mut ids = self
            .source
            .fetch_page(self.query, self.checkpoint.last_id.as_ref(), want)?;

        if ids.len() > want {
            warn!(
                "source returned {} ids for a page of {}; truncating",
                ids.len(),
                want
            );
            ids.truncate(want);
        }
        if ids.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }
        if ids.len() < want {
            self.exhausted = true;
        }

        let ascending = ids.windows(2).all(|w| w[0] < w[1]);
        let after_last = match (&self.checkpoint.last_id, ids.first()) {
            (Some(last), Some(first)) => first > last,
            _ => true,
        };
        if !ascending || !after_last {
            return Err(JobError::Source(
                "source page is not in ascending order past the cursor".into(),
            ));
        }

        self.checkpoint.last_id = ids.last().cloned();
        self.checkpoint.chunks_emitted += 1;
        self.checkpoint.records_emitted += ids.len() as u64;
        debug!(checkpoint = ?self.checkpoint, "cursor advanced");

        Ok(Some(Chunk {
            index: self.checkpoint.chunks_emitted,
            ids,
        }))
    }
}

/// Number of chunks needed for `total` records.
pub fn planned_chunks(total: u64, chunk_size: usize) -> u64 {
    let size = chunk_size.max(1) as u64;
    total.div_ceil(size)
}
