//! Onboard Agent: automated new-hire onboarding across Slack, GitHub and
//! Google Drive.

pub mod config;
pub mod error;
pub mod integrations;
pub mod onboarding;
pub mod stdio;
pub mod store;
pub mod tools;
pub mod workflow;
