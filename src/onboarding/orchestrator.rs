//! Runs each employee's checklist to completion.
//!
//! Every employee with runnable work gets one driver task. The driver
//! claims eligible tasks (pending, automatable, dependency completed) in a
//! single store mutation, runs up to `max_parallel_tasks` of them at once
//! through the dispatcher, and re-scans whenever a task settles or it is
//! kicked by a manual completion or retry. When nothing is running and
//! nothing is eligible the driver exits; the next kick starts a new one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use rand::Rng;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{OnboardingError, Result, StoreError};
use crate::integrations::{DispatchContext, Dispatcher};
use crate::onboarding::model::{
    Employee, EmployeeStatus, EmployeeSummary, OnboardingRequest, Task,
};
use crate::onboarding::state::TaskStatus;
use crate::store::Store;
use crate::workflow::{ResolvedWorkflow, TemplateSet};

/// Outcome of a manual completion.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionResult {
    pub employee_id: Uuid,
    pub task: Task,
    /// `false` when the task was already completed.
    pub changed: bool,
    pub progress_percent: u8,
    pub completed_tasks: usize,
    pub total_tasks: usize,
}

struct Inner {
    store: Arc<Store>,
    templates: Arc<TemplateSet>,
    dispatcher: Arc<Dispatcher>,
    config: EngineConfig,
    /// Live drivers, keyed by employee. The `Notify` wakes a driver to re-scan.
    drivers: Mutex<HashMap<Uuid, Arc<Notify>>>,
}

/// Drives onboarding checklists. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<Store>,
        templates: Arc<TemplateSet>,
        dispatcher: Arc<Dispatcher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                templates,
                dispatcher,
                config,
                drivers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.inner.store
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.inner.templates
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.inner.dispatcher
    }

    /// Validate the request, create the record, and start executing it.
    ///
    /// Returns the freshly created record; tasks run in the background.
    pub async fn onboard(&self, request: OnboardingRequest) -> Result<EmployeeStatus> {
        request.validate()?;
        let workflow = self.inner.templates.resolve(&request.role);
        let employee = Employee::new(&request, workflow);
        let id = employee.id;

        tracing::info!(
            employee_id = %id,
            name = %employee.name,
            role = %employee.role,
            role_key = %employee.role_key,
            tasks = employee.tasks.len(),
            "Onboarding started"
        );
        self.inner.store.put(employee.clone()).await?;
        self.inner.kick(id);
        Ok(employee.into())
    }

    pub async fn status(&self, employee_id: Uuid) -> Result<EmployeeStatus> {
        Ok(self.inner.store.get(employee_id).await?.into())
    }

    pub async fn list(&self) -> Vec<EmployeeSummary> {
        self.inner
            .store
            .list()
            .await
            .iter()
            .map(EmployeeSummary::from)
            .collect()
    }

    /// Most recent record with this email, if any.
    pub async fn find_by_email(&self, email: &str) -> Option<Employee> {
        self.inner.store.find_by_email(email).await
    }

    /// The checklist a role would receive. Never fails.
    pub fn checklist(&self, role: &str) -> &ResolvedWorkflow {
        self.inner.templates.resolve(role)
    }

    /// Mark a task completed by hand.
    ///
    /// Completing an already-completed task is a no-op reported with
    /// `changed: false`. Dependents become eligible immediately.
    pub async fn complete_task(
        &self,
        employee_id: Uuid,
        task_id: &str,
        details: Option<String>,
    ) -> Result<CompletionResult> {
        let changed = self
            .inner
            .store
            .update_task(employee_id, task_id, |t| {
                if t.status == TaskStatus::Completed {
                    return Ok(false);
                }
                t.transition_to(TaskStatus::Completed)?;
                if details.is_some() {
                    t.detail = details;
                }
                Ok::<_, OnboardingError>(true)
            })
            .await??;

        let employee = self.inner.store.get(employee_id).await?;
        let task = employee
            .task(task_id)
            .cloned()
            .ok_or_else(|| StoreError::TaskNotFound {
                employee_id,
                task_id: task_id.to_string(),
            })?;

        if changed {
            tracing::info!(
                employee_id = %employee_id,
                task = %task.name,
                progress = employee.progress_percent(),
                "Task completed manually"
            );
            self.inner.kick(employee_id);
        }

        Ok(CompletionResult {
            employee_id,
            task,
            changed,
            progress_percent: employee.progress_percent(),
            completed_tasks: employee.completed_tasks(),
            total_tasks: employee.total_tasks(),
        })
    }

    /// Send a failed task back to `pending` with a fresh attempt budget.
    pub async fn retry_task(&self, employee_id: Uuid, task_id: &str) -> Result<Task> {
        self.inner
            .store
            .update_task(employee_id, task_id, |t| t.reset_for_retry())
            .await??;
        let employee = self.inner.store.get(employee_id).await?;
        let task = employee
            .task(task_id)
            .cloned()
            .ok_or_else(|| StoreError::TaskNotFound {
                employee_id,
                task_id: task_id.to_string(),
            })?;

        tracing::info!(employee_id = %employee_id, task = %task.name, "Task queued for retry");
        self.inner.kick(employee_id);
        Ok(task)
    }

    /// Restart work interrupted by a previous shutdown.
    ///
    /// Tasks left `in_progress` go back to `pending`; every record with
    /// unfinished work gets a driver. Returns how many records were resumed.
    pub async fn resume_incomplete(&self) -> Result<usize> {
        let mut resumed = 0;
        for employee in self.inner.store.list().await {
            if employee.tasks.iter().all(|t| t.status.is_terminal()) {
                continue;
            }
            let reset = self
                .inner
                .store
                .update_employee(employee.id, |e| {
                    let mut reset = 0;
                    for t in e.tasks.iter_mut().filter(|t| t.status == TaskStatus::InProgress) {
                        // Interrupted attempts don't count against the budget.
                        t.status = TaskStatus::Pending;
                        t.attempts = 0;
                        t.started_at = None;
                        reset += 1;
                    }
                    reset
                })
                .await?;
            if reset > 0 {
                tracing::info!(employee_id = %employee.id, tasks = reset, "Reset interrupted tasks");
            }
            self.inner.kick(employee.id);
            resumed += 1;
        }
        Ok(resumed)
    }

    /// Whether a driver is currently working on this employee.
    pub fn is_running(&self, employee_id: Uuid) -> bool {
        self.inner
            .drivers
            .lock()
            .map(|d| d.contains_key(&employee_id))
            .unwrap_or(false)
    }

    /// Wait until no driver is working on this employee, then return its
    /// status. Gives up after `limit` and returns the status as it stands.
    pub async fn wait_until_idle(&self, employee_id: Uuid, limit: Duration) -> Result<EmployeeStatus> {
        let _ = tokio::time::timeout(limit, async {
            while self.is_running(employee_id) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        self.status(employee_id).await
    }
}

impl Inner {
    /// Wake this employee's driver, starting one if none is live.
    fn kick(self: &Arc<Self>, employee_id: Uuid) {
        let mut drivers = match self.drivers.lock() {
            Ok(d) => d,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(notify) = drivers.get(&employee_id) {
            notify.notify_one();
            return;
        }
        let notify = Arc::new(Notify::new());
        drivers.insert(employee_id, notify.clone());
        tokio::spawn(self.clone().drive(employee_id, notify));
    }

    async fn drive(self: Arc<Self>, employee_id: Uuid, notify: Arc<Notify>) {
        tracing::debug!(employee_id = %employee_id, "Driver started");
        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            let capacity = self.config.max_parallel_tasks.saturating_sub(in_flight.len());
            if capacity > 0 {
                match self.claim(employee_id, capacity).await {
                    Ok(claimed) => {
                        for task in claimed {
                            let this = self.clone();
                            in_flight.spawn(async move { this.run_task(employee_id, task).await });
                        }
                    }
                    Err(e) => {
                        tracing::error!(employee_id = %employee_id, error = %e, "Driver could not claim tasks");
                        if in_flight.is_empty() {
                            self.retire(employee_id);
                            return;
                        }
                    }
                }
            }

            if in_flight.is_empty() {
                let mut drivers = match self.drivers.lock() {
                    Ok(d) => d,
                    Err(poisoned) => poisoned.into_inner(),
                };
                // A kick that landed after the last scan leaves a permit.
                if notify.notified().now_or_never().is_some() {
                    continue;
                }
                drivers.remove(&employee_id);
                tracing::debug!(employee_id = %employee_id, "Driver idle");
                return;
            }

            tokio::select! {
                joined = in_flight.join_next() => {
                    if let Some(Err(e)) = joined {
                        tracing::error!(employee_id = %employee_id, error = %e, "Task runner panicked");
                    }
                }
                _ = notify.notified() => {}
            }
        }
    }

    fn retire(&self, employee_id: Uuid) {
        if let Ok(mut drivers) = self.drivers.lock() {
            drivers.remove(&employee_id);
        }
    }

    /// Atomically move up to `capacity` eligible tasks to `in_progress`.
    async fn claim(&self, employee_id: Uuid, capacity: usize) -> std::result::Result<Vec<Task>, StoreError> {
        self.store
            .update_employee(employee_id, |e| {
                let mut claimed = Vec::new();
                for task_id in e.eligible_task_ids().into_iter().take(capacity) {
                    if let Some(task) = e.task_mut(&task_id)
                        && task.start().is_ok()
                    {
                        claimed.push(task.clone());
                    }
                }
                claimed
            })
            .await
    }

    /// Dispatch one claimed task until it succeeds, exhausts its attempts,
    /// or fails with a non-retryable error.
    async fn run_task(&self, employee_id: Uuid, task: Task) {
        let ctx = match self.store.get(employee_id).await {
            Ok(employee) => {
                DispatchContext::for_employee(&employee, self.templates.resolve(&employee.role_key))
            }
            Err(e) => {
                tracing::error!(employee_id = %employee_id, error = %e, "Employee vanished mid-run");
                return;
            }
        };

        let mut attempt = 1;
        loop {
            tracing::debug!(employee_id = %employee_id, task = %task.name, attempt, "Dispatching task");
            let outcome = self
                .dispatcher
                .dispatch(task.category, task.action, &ctx)
                .await;

            match outcome {
                Ok(output) => {
                    let detail = output.detail;
                    self.settle(employee_id, &task.id, |t| t.succeed(detail)).await;
                    tracing::info!(
                        employee_id = %employee_id,
                        task = %task.name,
                        attempts = attempt,
                        mock = output.mock,
                        "Task completed"
                    );
                    return;
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    tracing::warn!(
                        employee_id = %employee_id,
                        task = %task.name,
                        attempt,
                        error = %e,
                        "Task attempt failed, will retry"
                    );
                    let note = format!("Attempt {attempt} failed, retrying: {e}");
                    let backing_off = self
                        .store
                        .update_task(employee_id, &task.id, |t| {
                            if t.status != TaskStatus::InProgress {
                                return false;
                            }
                            t.detail = Some(note);
                            true
                        })
                        .await
                        .unwrap_or(false);
                    if !backing_off {
                        return;
                    }
                    tokio::time::sleep(self.backoff(attempt)).await;

                    let proceed = self
                        .store
                        .update_task(employee_id, &task.id, |t| {
                            if t.status != TaskStatus::InProgress {
                                return false;
                            }
                            t.attempts += 1;
                            true
                        })
                        .await
                        .unwrap_or(false);
                    if !proceed {
                        // completed by hand while backing off
                        return;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    let reason = e.to_string();
                    self.settle(employee_id, &task.id, |t| {
                        t.detail = None;
                        t.fail(reason)
                    })
                    .await;
                    tracing::warn!(
                        employee_id = %employee_id,
                        task = %task.name,
                        attempts = attempt,
                        retryable = e.is_retryable(),
                        error = %e,
                        "Task failed"
                    );
                    return;
                }
            }
        }
    }

    /// Apply a terminal outcome unless the task already left `in_progress`.
    async fn settle<F>(&self, employee_id: Uuid, task_id: &str, f: F)
    where
        F: FnOnce(&mut Task) -> std::result::Result<(), OnboardingError>,
    {
        let result = self
            .store
            .update_task(employee_id, task_id, |t| {
                if t.status == TaskStatus::InProgress {
                    f(t)
                } else {
                    Ok(())
                }
            })
            .await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(employee_id = %employee_id, task_id, error = %e, "Task outcome rejected"),
            Err(e) => tracing::error!(employee_id = %employee_id, task_id, error = %e, "Task outcome lost"),
        }
    }

    /// `base * 2^(attempt-1)` plus up to 10% jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.config.base_backoff.as_millis() as u64;
        let delay = base.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16));
        let jitter = rand::thread_rng().gen_range(0..=delay / 10);
        Duration::from_millis(delay + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn orchestrator(config: EngineConfig) -> Orchestrator {
        Orchestrator::new(
            Arc::new(Store::in_memory()),
            Arc::new(TemplateSet::builtin().unwrap()),
            Arc::new(Dispatcher::new(&config)),
            config,
        )
    }

    fn fast() -> EngineConfig {
        EngineConfig {
            base_backoff: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[test]
    fn backoff_doubles_with_bounded_jitter() {
        let o = orchestrator(EngineConfig {
            base_backoff: Duration::from_millis(100),
            ..Default::default()
        });
        for (attempt, base) in [(1, 100), (2, 200), (3, 400)] {
            let d = o.inner.backoff(attempt).as_millis() as u64;
            assert!(d >= base && d <= base + base / 10, "attempt {attempt}: {d}ms");
        }
    }

    #[tokio::test]
    async fn invalid_request_creates_nothing() {
        let o = orchestrator(fast());
        let err = o
            .onboard(OnboardingRequest::new("", "ada@example.com", "Engineer", "Platform"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Onboarding(OnboardingError::InvalidRequest { .. })));
        assert!(o.list().await.is_empty());
    }

    #[tokio::test]
    async fn general_role_runs_to_completion() {
        let o = orchestrator(fast());
        let created = o
            .onboard(OnboardingRequest::new("Ada", "ada@example.com", "Astronaut", "Moon"))
            .await
            .unwrap();
        assert_eq!(created.employee.role_key, "general");

        let status = o
            .wait_until_idle(created.employee.id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(status.progress_percent, 100);
        assert!(status.employee.completed_at.is_some());
        assert!(!o.is_running(created.employee.id));
    }

    #[tokio::test]
    async fn complete_is_idempotent() {
        let o = orchestrator(fast());
        let created = o
            .onboard(OnboardingRequest::new("Ada", "ada@example.com", "Astronaut", "Moon"))
            .await
            .unwrap();
        let id = created.employee.id;
        let status = o.wait_until_idle(id, Duration::from_secs(5)).await.unwrap();
        let task_id = status.employee.tasks[0].id.clone();

        let again = o.complete_task(id, &task_id, Some("done".into())).await.unwrap();
        assert!(!again.changed);
        assert_eq!(again.progress_percent, 100);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let o = orchestrator(fast());
        let err = o.complete_task(Uuid::new_v4(), "abc", None).await.unwrap_err();
        assert!(err.is_not_found());

        let created = o
            .onboard(OnboardingRequest::new("Ada", "ada@example.com", "Designer", "Brand"))
            .await
            .unwrap();
        let err = o
            .complete_task(created.employee.id, "nope", None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn retry_requires_failed_task() {
        let o = orchestrator(fast());
        let created = o
            .onboard(OnboardingRequest::new("Ada", "ada@example.com", "Astronaut", "Moon"))
            .await
            .unwrap();
        let id = created.employee.id;
        let status = o.wait_until_idle(id, Duration::from_secs(5)).await.unwrap();
        let err = o
            .retry_task(id, &status.employee.tasks[0].id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Onboarding(OnboardingError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn resume_skips_settled_records() {
        let o = orchestrator(fast());
        let created = o
            .onboard(OnboardingRequest::new("Ada", "ada@example.com", "Astronaut", "Moon"))
            .await
            .unwrap();
        let id = created.employee.id;
        o.wait_until_idle(id, Duration::from_secs(5)).await.unwrap();

        // One failed task with everything else completed: nothing left to run.
        o.store()
            .update_employee(id, |e| {
                if let Some(t) = e.tasks.first_mut() {
                    t.status = TaskStatus::Failed;
                    t.last_error = Some("HTTP 403".into());
                }
            })
            .await
            .unwrap();
        assert_eq!(o.resume_incomplete().await.unwrap(), 0);
        assert!(!o.is_running(id));

        // A pending task is unfinished work.
        o.store()
            .update_employee(id, |e| {
                if let Some(t) = e.tasks.first_mut() {
                    t.status = TaskStatus::Pending;
                    t.last_error = None;
                }
            })
            .await
            .unwrap();
        assert_eq!(o.resume_incomplete().await.unwrap(), 1);
        let status = o.wait_until_idle(id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(status.progress_percent, 100);
    }
}
