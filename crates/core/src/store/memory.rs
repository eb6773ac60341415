use super::{EmrStore, Records};
use crate::error::{EmrError, EmrResult};
use std::sync::RwLock;

/// Process-local store. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(mut records: Records) -> Self {
        records.clear_dirty();
        Self {
            records: RwLock::new(records),
        }
    }
}

impl EmrStore for MemoryStore {
    fn read<T, F>(&self, f: F) -> EmrResult<T>
    where
        F: FnOnce(&Records) -> EmrResult<T>,
    {
        let guard = self.records.read().map_err(|_| EmrError::StorePoisoned)?;
        f(&guard)
    }

    fn transaction<T, F>(&self, f: F) -> EmrResult<T>
    where
        F: FnOnce(&mut Records) -> EmrResult<T>,
    {
        let mut guard = self.records.write().map_err(|_| EmrError::StorePoisoned)?;
        let mut working = guard.clone();
        let out = f(&mut working)?;
        working.clear_dirty();
        *guard = working;
        Ok(out)
    }
}
