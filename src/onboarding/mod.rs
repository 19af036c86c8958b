//! Onboarding cases: employee records, their task state machine, the
//! orchestrator that runs checklists, and the HTTP surface over it.

pub mod model;
pub mod orchestrator;
pub mod routes;
pub mod state;

pub use model::{Employee, EmployeeStatus, EmployeeSummary, OnboardingRequest, Task};
pub use orchestrator::{CompletionResult, Orchestrator};
pub use routes::{AppState, onboarding_routes};
pub use state::TaskStatus;
