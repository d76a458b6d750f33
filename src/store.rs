//! JSON-file record store.
//!
//! Backs both sides of a job locally: it answers keyset-paged queries as a
//! [`ChunkSource`] and deletes records as a [`RecordStore`]. Soft deletes move
//! records into a per-source recycle bin; hard deletes drop them. Delete guards
//! reject matching records the way validation rules or record locks would.

use crate::{
    error::{JobError, RecordError, Result},
    executor::{RecordOutcome, RecordStore, ROLLED_BACK_CODE},
    job::DeleteMode,
    query::SelectionQuery,
    source::{ChunkSource, RecordId},
    util::write_atomic,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

pub type Record = Map<String, Value>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreData {
    #[serde(default)]
    pub sources: BTreeMap<String, SourceTable>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceTable {
    /// Queryable fields. When empty, the union of the records' keys is used.
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default)]
    pub recycle_bin: Vec<Record>,
    #[serde(default)]
    pub delete_guards: Vec<DeleteGuard>,
}

/// Rejects deletion of any record whose `field` equals `equals`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteGuard {
    pub field: String,
    pub equals: Value,
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl SourceTable {
    pub fn new(fields: &[&str]) -> Self {
        Self {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, record: Value) {
        if let Value::Object(map) = record {
            self.records.push(map);
        }
    }

    pub fn with_guard(mut self, guard: DeleteGuard) -> Self {
        self.delete_guards.push(guard);
        self
    }
}

pub struct JsonStore {
    inner: Mutex<Inner>,
    path: Option<PathBuf>,
}

struct Inner {
    id_field: String,
    tables: BTreeMap<String, Table>,
}

struct Table {
    fields: BTreeSet<String>,
    declared_fields: Vec<String>,
    records: BTreeMap<RecordId, Record>,
    recycle_bin: BTreeMap<RecordId, Record>,
    guards: Vec<DeleteGuard>,
}

impl JsonStore {
    pub fn from_data(data: StoreData, id_field: &str) -> Result<Self> {
        let mut tables = BTreeMap::new();
        for (name, src) in data.sources {
            tables.insert(name.clone(), Table::build(&name, src, id_field)?);
        }
        Ok(Self {
            inner: Mutex::new(Inner {
                id_field: id_field.to_string(),
                tables,
            }),
            path: None,
        })
    }

    /// Loads a store file; every applied mutation is written back to it.
    pub fn load(path: &Path, id_field: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let data: StoreData = serde_json::from_str(&raw)?;
        let mut store = Self::from_data(data, id_field)?;
        store.path = Some(path.to_path_buf());
        info!("loaded record store {}", path.display());
        Ok(store)
    }

    pub fn live_count(&self, source: &str) -> Result<usize> {
        Ok(self
            .lock()?
            .tables
            .get(source)
            .map(|t| t.records.len())
            .unwrap_or(0))
    }

    pub fn recycled_count(&self, source: &str) -> Result<usize> {
        Ok(self
            .lock()?
            .tables
            .get(source)
            .map(|t| t.recycle_bin.len())
            .unwrap_or(0))
    }

    /// Moves records of `source` back out of its recycle bin. Returns how many
    /// were restored.
    pub fn restore(&self, source: &str, ids: &[RecordId]) -> Result<usize> {
        let mut inner = self.lock()?;
        let table = inner.table_mut(source)?;
        let mut restored = 0;
        for id in ids {
            if let Some(rec) = table.recycle_bin.remove(id) {
                table.records.insert(id.clone(), rec);
                restored += 1;
            }
        }
        if restored > 0 {
            self.persist(&inner)?;
        }
        Ok(restored)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| JobError::Source("record store lock poisoned".into()))
    }

    fn persist(&self, inner: &Inner) -> Result<()> {
        if let Some(path) = &self.path {
            let raw = serde_json::to_vec_pretty(&inner.to_data())?;
            write_atomic(path, &raw)?;
            debug!("persisted record store {}", path.display());
        }
        Ok(())
    }
}

impl Inner {
    fn table_for(&self, query: &SelectionQuery) -> Result<&Table> {
        let table = self.tables.get(query.source()).ok_or_else(|| {
            JobError::Source(format!("source '{}' is not supported", query.source()))
        })?;
        for field in query.referenced_fields() {
            if field != self.id_field && !table.fields.contains(field) {
                return Err(JobError::Source(format!(
                    "no such field '{}' on source '{}'",
                    field,
                    query.source()
                )));
            }
        }
        Ok(table)
    }

    fn table_mut(&mut self, source: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(source)
            .ok_or_else(|| JobError::Source(format!("source '{source}' is not supported")))
    }

    fn to_data(&self) -> StoreData {
        let sources = self
            .tables
            .iter()
            .map(|(name, t)| {
                (
                    name.clone(),
                    SourceTable {
                        fields: t.declared_fields.clone(),
                        records: t.records.values().cloned().collect(),
                        recycle_bin: t.recycle_bin.values().cloned().collect(),
                        delete_guards: t.guards.clone(),
                    },
                )
            })
            .collect();
        StoreData { sources }
    }
}

impl Table {
    fn build(name: &str, src: SourceTable, id_field: &str) -> Result<Self> {
        let key = |rec: &Record| -> Result<RecordId> {
            match rec.get(id_field) {
                Some(Value::String(s)) if !s.is_empty() => Ok(RecordId::new(s.clone())),
                _ => Err(JobError::Source(format!(
                    "record in '{name}' has no string '{id_field}'"
                ))),
            }
        };

        let mut records = BTreeMap::new();
        for rec in src.records {
            let id = key(&rec)?;
            if records.insert(id.clone(), rec).is_some() {
                return Err(JobError::Source(format!(
                    "duplicate {id_field} '{id}' in records of '{name}'"
                )));
            }
        }
        let mut recycle_bin = BTreeMap::new();
        for rec in src.recycle_bin {
            let id = key(&rec)?;
            if records.contains_key(&id) || recycle_bin.insert(id.clone(), rec).is_some() {
                return Err(JobError::Source(format!(
                    "duplicate {id_field} '{id}' in recycle bin of '{name}'"
                )));
            }
        }

        let fields: BTreeSet<String> = if src.fields.is_empty() {
            records.values().flat_map(|r| r.keys().cloned()).collect()
        } else {
            src.fields.iter().cloned().collect()
        };

        Ok(Self {
            fields,
            declared_fields: src.fields,
            records,
            recycle_bin,
            guards: src.delete_guards,
        })
    }

    fn check_delete(&self, id: &RecordId) -> Option<RecordError> {
        let Some(rec) = self.records.get(id) else {
            return Some(RecordError::new(
                "ENTITY_IS_DELETED",
                "entity is deleted or does not exist",
            ));
        };
        self.guards.iter().find_map(|g| {
            (rec.get(&g.field) == Some(&g.equals)).then(|| {
                RecordError::new(g.code.clone(), g.message.clone()).with_fields(vec![g.field.clone()])
            })
        })
    }
}

impl ChunkSource for JsonStore {
    fn count(&self, query: &SelectionQuery) -> Result<u64> {
        let inner = self.lock()?;
        let table = inner.table_for(query)?;
        let n = table.records.values().filter(|r| query.matches(r)).count() as u64;
        Ok(match query.limit() {
            Some(limit) => n.min(limit),
            None => n,
        })
    }

    fn fetch_page(
        &self,
        query: &SelectionQuery,
        after: Option<&RecordId>,
        limit: usize,
    ) -> Result<Vec<RecordId>> {
        let inner = self.lock()?;
        let table = inner.table_for(query)?;
        let lower = match after {
            Some(id) => Bound::Excluded(id.clone()),
            None => Bound::Unbounded,
        };
        Ok(table
            .records
            .range((lower, Bound::Unbounded))
            .filter(|(_, r)| query.matches(r))
            .take(limit)
            .map(|(id, _)| id.clone())
            .collect())
    }
}

impl RecordStore for JsonStore {
    fn delete(
        &self,
        source: &str,
        ids: &[RecordId],
        mode: DeleteMode,
        all_or_none: bool,
    ) -> Result<Vec<RecordOutcome>> {
        let mut inner = self.lock()?;
        let table = inner.table_mut(source)?;

        let checks: Vec<Option<RecordError>> = ids.iter().map(|id| table.check_delete(id)).collect();

        if all_or_none && checks.iter().any(Option::is_some) {
            return Ok(ids
                .iter()
                .zip(checks)
                .map(|(id, err)| {
                    let err = err.unwrap_or_else(|| {
                        RecordError::new(ROLLED_BACK_CODE, "another record in the batch failed")
                    });
                    RecordOutcome::failed(id.clone(), err)
                })
                .collect());
        }

        let mut outcomes = Vec::with_capacity(ids.len());
        let mut mutated = false;
        for (id, err) in ids.iter().zip(checks) {
            if let Some(err) = err {
                outcomes.push(RecordOutcome::failed(id.clone(), err));
                continue;
            }
            if let Some(rec) = table.records.remove(id) {
                if mode == DeleteMode::Soft {
                    table.recycle_bin.insert(id.clone(), rec);
                }
                mutated = true;
            }
            outcomes.push(RecordOutcome::ok(id.clone()));
        }

        if mutated {
            self.persist(&inner)?;
        }
        Ok(outcomes)
    }
}
