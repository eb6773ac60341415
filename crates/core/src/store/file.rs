use super::{EmrStore, Records, Table, TableVisitor};
use crate::constants::RECORD_FILE_EXTENSION;
use crate::error::{EmrError, EmrResult};
use crate::model::Entity;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Store that keeps every entity as a JSON file.
///
/// Layout: `<data_dir>/<kind>/<s1>/<s2>/<uuid>.json`, where `s1`/`s2` are the first four hex
/// characters of the uuid. All files are loaded on open; a committed transaction writes only the
/// entities it touched.
#[derive(Debug)]
pub struct FileStore {
    data_dir: PathBuf,
    records: RwLock<Records>,
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or any entity file cannot be read or
    /// parsed.
    pub fn open(data_dir: impl Into<PathBuf>) -> EmrResult<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).map_err(EmrError::StoreDirCreation)?;

        let mut records = Records::default();
        records.visit_tables(&mut Loader { root: &data_dir })?;
        tracing::info!(data_dir = %data_dir.display(), "opened file store");

        Ok(Self {
            data_dir,
            records: RwLock::new(records),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

impl EmrStore for FileStore {
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

        let mut flusher = Flusher {
            root: &self.data_dir,
            staged: Vec::new(),
        };
        if let Err(e) = working.visit_tables(&mut flusher) {
            discard(&flusher.staged);
            return Err(e);
        }
        let written = commit(&flusher.staged)?;
        tracing::debug!(written, "flushed transaction");

        working.clear_dirty();
        *guard = working;
        Ok(out)
    }
}

fn kind_dir(root: &Path, kind: &str) -> PathBuf {
    root.join(kind)
}

struct Loader<'a> {
    root: &'a Path,
}

impl TableVisitor for Loader<'_> {
    fn visit<T: Entity>(&mut self, table: &mut Table<T>) -> EmrResult<()> {
        let dir = kind_dir(self.root, T::KIND);
        if !dir.is_dir() {
            return Ok(());
        }
        for path in entity_files(&dir)? {
            let contents = fs::read_to_string(&path).map_err(|source| EmrError::StoreRead {
                path: path.clone(),
                source,
            })?;
            let row: T = serde_json::from_str(&contents)
                .map_err(|source| EmrError::Deserialization { path, source })?;
            table.load(row);
        }
        Ok(())
    }
}

/// Lists `<dir>/<s1>/<s2>/*.json`.
fn entity_files(dir: &Path) -> EmrResult<Vec<PathBuf>> {
    let read = |path: &Path| {
        fs::read_dir(path).map_err(|source| EmrError::StoreRead {
            path: path.to_path_buf(),
            source,
        })
    };

    let mut files = Vec::new();
    for s1 in read(dir)?.flatten() {
        let s1_path = s1.path();
        if !s1_path.is_dir() {
            continue;
        }
        for s2 in read(&s1_path)?.flatten() {
            let s2_path = s2.path();
            if !s2_path.is_dir() {
                continue;
            }
            for entry in read(&s2_path)?.flatten() {
                let path = entry.path();
                let is_record = path
                    .extension()
                    .is_some_and(|ext| ext == RECORD_FILE_EXTENSION);
                if path.is_file() && is_record {
                    files.push(path);
                }
            }
        }
    }
    files.sort();
    Ok(files)
}

/// A record written to `tmp`, waiting to be renamed over `path`.
struct Staged {
    tmp: PathBuf,
    path: PathBuf,
}

/// Writes every dirty row to a temporary file next to its record.
struct Flusher<'a> {
    root: &'a Path,
    staged: Vec<Staged>,
}

impl TableVisitor for Flusher<'_> {
    fn visit<T: Entity>(&mut self, table: &mut Table<T>) -> EmrResult<()> {
        let dir = kind_dir(self.root, T::KIND);
        for row in table.dirty() {
            let path = row.uuid().sharded_file(&dir, RECORD_FILE_EXTENSION);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(EmrError::StoreDirCreation)?;
            }
            let json = serde_json::to_string_pretty(row).map_err(EmrError::Serialization)?;
            let tmp = path.with_extension("tmp");
            fs::write(&tmp, json).map_err(|source| EmrError::StoreWrite {
                path: tmp.clone(),
                source,
            })?;
            self.staged.push(Staged { tmp, path });
        }
        Ok(())
    }
}

fn discard(staged: &[Staged]) {
    for s in staged {
        if let Err(e) = fs::remove_file(&s.tmp) {
            tracing::warn!(path = %s.tmp.display(), error = %e, "could not remove staged record");
        }
    }
}

/// Renames staged files into place. On failure the records already replaced are put back, so
/// the directory holds either the whole transaction or none of it.
fn commit(staged: &[Staged]) -> EmrResult<usize> {
    let mut done: Vec<(&Staged, Option<PathBuf>)> = Vec::new();
    for (index, s) in staged.iter().enumerate() {
        match replace(s) {
            Ok(had_record) => {
                done.push((s, had_record.then(|| s.path.with_extension("bak"))));
            }
            Err(e) => {
                roll_back(&done);
                discard(&staged[index..]);
                return Err(e);
            }
        }
    }
    for (_, backup) in done {
        if let Some(backup) = backup {
            let _ = fs::remove_file(backup);
        }
    }
    Ok(staged.len())
}

/// Moves any current record aside to `.bak`, then renames the staged file over it. Returns
/// whether a record was moved aside.
fn replace(s: &Staged) -> EmrResult<bool> {
    let backup = s.path.with_extension("bak");
    let had_record = s.path.is_file();
    if had_record {
        fs::rename(&s.path, &backup).map_err(|source| EmrError::StoreWrite {
            path: backup.clone(),
            source,
        })?;
    }
    if let Err(source) = fs::rename(&s.tmp, &s.path) {
        if had_record {
            let _ = fs::rename(&backup, &s.path);
        }
        return Err(EmrError::StoreWrite {
            path: s.path.clone(),
            source,
        });
    }
    Ok(had_record)
}

fn roll_back(done: &[(&Staged, Option<PathBuf>)]) {
    for (s, backup) in done {
        let restored = match backup {
            Some(backup) => fs::rename(backup, &s.path),
            None => fs::remove_file(&s.path),
        };
        if let Err(e) = restored {
            tracing::error!(path = %s.path.display(), error = %e, "could not roll back record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bed, BedStatus};
    use emr_uuid::EmrUuid;
    use tempfile::TempDir;

    fn bed(number: &str) -> Bed {
        Bed {
            uuid: EmrUuid::new(),
            bed_number: number.into(),
            ward: EmrUuid::new(),
            status: BedStatus::Available,
        }
    }

    #[test]
    fn committed_rows_survive_reopen() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let b = bed("12");
        {
            let store = FileStore::open(temp_dir.path()).unwrap();
            store
                .transaction(|records| {
                    records.beds.insert(b.clone());
                    Ok(())
                })
                .unwrap();
        }

        let expected = b.uuid.sharded_file(&temp_dir.path().join("beds"), "json");
        assert!(expected.is_file());

        let reopened = FileStore::open(temp_dir.path()).unwrap();
        let found = reopened
            .read(|records| Ok(records.beds.get(&b.uuid).cloned()))
            .unwrap();
        assert_eq!(found, Some(b));
    }

    #[test]
    fn failed_transaction_writes_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileStore::open(temp_dir.path()).unwrap();
        let result: EmrResult<()> = store.transaction(|records| {
            records.beds.insert(bed("3"));
            Err(EmrError::InvalidState("abort".into()))
        });
        assert!(result.is_err());
        assert!(!temp_dir.path().join("beds").exists());
    }

    #[test]
    fn corrupt_file_reports_its_path() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let uuid = EmrUuid::new();
        let path = uuid.sharded_file(&temp_dir.path().join("beds"), "json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        let err = FileStore::open(temp_dir.path()).unwrap_err();
        match err {
            EmrError::Deserialization { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn failed_flush_leaves_disk_and_memory_untouched() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileStore::open(temp_dir.path()).unwrap();
        let good = bed("1");
        let blocked = bed("2");

        // A directory where the staged file should go makes that write fail.
        let beds = temp_dir.path().join("beds");
        let blocker = blocked.uuid.sharded_file(&beds, "tmp");
        fs::create_dir_all(&blocker).unwrap();

        let result = store.transaction(|records| {
            records.beds.insert(good.clone());
            records.beds.insert(blocked.clone());
            Ok(())
        });
        assert!(matches!(result, Err(EmrError::StoreWrite { .. })));

        let good_file = good.uuid.sharded_file(&beds, "json");
        assert!(!good_file.exists());
        assert!(!good_file.with_extension("tmp").exists());
        assert_eq!(store.read(|records| Ok(records.beds.len())).unwrap(), 0);

        let reopened = FileStore::open(temp_dir.path()).unwrap();
        assert_eq!(reopened.read(|records| Ok(records.beds.len())).unwrap(), 0);
    }
}
