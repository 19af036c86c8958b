//! JSON-file durability for the employee store.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::onboarding::model::Employee;

#[derive(Serialize)]
struct FileRef<'a> {
    employees: Vec<&'a Employee>,
}

#[derive(Deserialize)]
struct FileOwned {
    #[serde(default)]
    employees: Vec<Employee>,
}

/// A serialized store state tagged with the order it was taken in.
pub(crate) struct Snapshot {
    version: u64,
    bytes: Vec<u8>,
}

/// Whole-file JSON persistence. Writes go to a sibling temp file that is
/// renamed into place; a snapshot older than the last one written is dropped.
pub struct JsonFile {
    path: PathBuf,
    next_version: AtomicU64,
    /// Version of the last snapshot on disk.
    written: Mutex<u64>,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            next_version: AtomicU64::new(1),
            written: Mutex::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) async fn load(&self) -> Result<Vec<Employee>, StoreError> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Persistence(format!(
                    "reading {}: {e}",
                    self.path.display()
                )));
            }
        };
        let file: FileOwned = serde_json::from_slice(&raw).map_err(|e| {
            StoreError::Persistence(format!("parsing {}: {e}", self.path.display()))
        })?;
        Ok(file.employees)
    }

    /// Serialize records. Must be called while the store lock is held so
    /// versions follow mutation order.
    pub(crate) fn snapshot<'a>(&self, employees: impl Iterator<Item = &'a Employee>) -> Snapshot {
        let mut employees: Vec<&Employee> = employees.collect();
        employees.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let bytes = serde_json::to_vec_pretty(&FileRef { employees }).unwrap_or_default();
        Snapshot {
            version: self.next_version.fetch_add(1, Ordering::SeqCst),
            bytes,
        }
    }

    pub(crate) async fn write(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        if snapshot.bytes.is_empty() {
            return Err(StoreError::Persistence("snapshot serialization failed".into()));
        }

        let mut written = self.written.lock().await;
        if snapshot.version <= *written {
            // a newer snapshot already landed
            return Ok(());
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Persistence(e.to_string()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &snapshot.bytes)
            .await
            .map_err(|e| StoreError::Persistence(e.to_string()))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Persistence(e.to_string()))?;

        *written = snapshot.version;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::model::OnboardingRequest;
    use crate::onboarding::state::TaskStatus;
    use crate::store::Store;
    use crate::workflow::TemplateSet;

    fn employee() -> Employee {
        let set = TemplateSet::builtin().unwrap();
        let req = OnboardingRequest::new("Ada", "ada@example.com", "Software Engineer", "Platform");
        Employee::new(&req, set.resolve(&req.role))
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(JsonFile::new(dir.path().join("none.json")))
            .await
            .unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Store::open(JsonFile::new(&path)).await,
            Err(StoreError::Persistence(_))
        ));
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("onboarding.json");

        let e = employee();
        let (id, task_id) = (e.id, e.tasks[0].id.clone());
        {
            let store = Store::open(JsonFile::new(&path)).await.unwrap();
            store.put(e).await.unwrap();
            store
                .update_task(id, &task_id, |t| t.transition_to(TaskStatus::Completed))
                .await
                .unwrap()
                .unwrap();
        }

        let reopened = Store::open(JsonFile::new(&path)).await.unwrap();
        let record = reopened.get(id).await.unwrap();
        assert_eq!(record.name, "Ada");
        assert_eq!(record.task(&task_id).unwrap().status, TaskStatus::Completed);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn stale_snapshot_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::new(dir.path().join("s.json"));
        let e = employee();

        let old = file.snapshot(std::iter::empty());
        let new = file.snapshot(std::iter::once(&e));
        file.write(new).await.unwrap();
        file.write(old).await.unwrap();

        let loaded = file.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
    }
}
