//! Employee store, a concurrency-safe map of onboarding records.
//!
//! All reads and writes go through one `RwLock`, so readers always see
//! whole transitions. Every mutation is applied inside a single write
//! section; the optional JSON file is rewritten afterwards and a change
//! event is broadcast to subscribers.

mod persist;

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::onboarding::model::{Employee, Task};
use crate::onboarding::state::TaskStatus;

pub use persist::JsonFile;

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// A change applied to the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    EmployeeCreated {
        employee_id: Uuid,
    },
    TaskUpdated {
        employee_id: Uuid,
        task_id: String,
        status: TaskStatus,
    },
}

/// Concurrency-safe home of every employee record.
pub struct Store {
    employees: RwLock<HashMap<Uuid, Employee>>,
    file: Option<JsonFile>,
    tx: broadcast::Sender<StoreEvent>,
}

impl Store {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::with_records(HashMap::new(), None)
    }

    /// Open a store backed by a JSON file. A missing file starts empty.
    pub async fn open(file: JsonFile) -> Result<Self, StoreError> {
        let records = file.load().await?;
        info!(path = %file.path().display(), employees = records.len(), "Opened employee store");
        let employees = records.into_iter().map(|e| (e.id, e)).collect();
        Ok(Self::with_records(employees, Some(file)))
    }

    fn with_records(employees: HashMap<Uuid, Employee>, file: Option<JsonFile>) -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Self {
            employees: RwLock::new(employees),
            file,
            tx,
        }
    }

    /// Subscribe to change events.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    /// Insert a new record. Fails with `Conflict` if the id is taken.
    pub async fn put(&self, employee: Employee) -> Result<(), StoreError> {
        let id = employee.id;
        let snapshot = {
            let mut employees = self.employees.write().await;
            if employees.contains_key(&id) {
                return Err(StoreError::Conflict { id });
            }
            employees.insert(id, employee);
            self.snapshot(&employees)
        };

        debug!(employee_id = %id, "Employee stored");
        let _ = self.tx.send(StoreEvent::EmployeeCreated { employee_id: id });
        self.persist(snapshot).await;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Employee, StoreError> {
        self.employees
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::EmployeeNotFound { id })
    }

    /// Snapshot of every record, oldest first.
    pub async fn list(&self) -> Vec<Employee> {
        let mut all: Vec<Employee> = self.employees.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        all
    }

    /// Case-insensitive lookup by email. Returns the most recent match.
    pub async fn find_by_email(&self, email: &str) -> Option<Employee> {
        let needle = email.trim().to_lowercase();
        self.employees
            .read()
            .await
            .values()
            .filter(|e| e.email.to_lowercase() == needle)
            .max_by_key(|e| e.created_at)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.employees.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.employees.read().await.is_empty()
    }

    /// Atomically apply `f` to exactly one task.
    pub async fn update_task<F, R>(
        &self,
        employee_id: Uuid,
        task_id: &str,
        f: F,
    ) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Task) -> R,
    {
        let (result, changed) = {
            let mut employees = self.employees.write().await;
            let employee = employees
                .get_mut(&employee_id)
                .ok_or(StoreError::EmployeeNotFound { id: employee_id })?;
            let task = employee
                .task_mut(task_id)
                .ok_or_else(|| StoreError::TaskNotFound {
                    employee_id,
                    task_id: task_id.to_string(),
                })?;

            let before = task.clone();
            let result = f(task);
            let changed = (*task != before).then(|| task.status);
            if changed.is_some() {
                employee.refresh_completion();
            }
            let snapshot = changed.map(|status| (status, self.snapshot(&employees)));
            (result, snapshot)
        };

        if let Some((status, snapshot)) = changed {
            let _ = self.tx.send(StoreEvent::TaskUpdated {
                employee_id,
                task_id: task_id.to_string(),
                status,
            });
            self.persist(snapshot).await;
        }
        Ok(result)
    }

    /// Atomically apply `f` to a whole record. Used when a decision needs
    /// to see sibling tasks, e.g. claiming tasks whose dependency completed.
    pub async fn update_employee<F, R>(&self, employee_id: Uuid, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Employee) -> R,
    {
        let (result, changed) = {
            let mut employees = self.employees.write().await;
            let employee = employees
                .get_mut(&employee_id)
                .ok_or(StoreError::EmployeeNotFound { id: employee_id })?;

            let before = employee.tasks.clone();
            let result = f(employee);
            let updates: Vec<(String, TaskStatus)> = employee
                .tasks
                .iter()
                .zip(before.iter())
                .filter(|(after, before)| after != before)
                .map(|(after, _)| (after.id.clone(), after.status))
                .collect();
            if updates.is_empty() {
                (result, None)
            } else {
                employee.refresh_completion();
                (result, Some((updates, self.snapshot(&employees))))
            }
        };

        if let Some((updates, snapshot)) = changed {
            for (task_id, status) in updates {
                let _ = self.tx.send(StoreEvent::TaskUpdated {
                    employee_id,
                    task_id,
                    status,
                });
            }
            self.persist(snapshot).await;
        }
        Ok(result)
    }

    /// Serialize the current state while the caller holds the lock, so the
    /// file only ever receives whole snapshots.
    fn snapshot(&self, employees: &HashMap<Uuid, Employee>) -> Option<persist::Snapshot> {
        self.file.as_ref().map(|file| file.snapshot(employees.values()))
    }

    async fn persist(&self, snapshot: Option<persist::Snapshot>) {
        let (Some(file), Some(snapshot)) = (&self.file, snapshot) else {
            return;
        };
        if let Err(e) = file.write(snapshot).await {
            warn!(path = %file.path().display(), error = %e, "Failed to persist employee store");
        }
    }
}
