//! HPC platform helpers: credential storage, token login and job submission

pub mod auth;
pub mod client;
pub mod credentials;
pub mod jobs;

pub use auth::login;
pub use client::{HpsClient, SubmittedJob};
pub use credentials::{credentials_expired, CredentialError, CredentialStore, StoredCredentials};
pub use jobs::{HpsConfig, JobError, JobPlan, JobSettings, JobSources, SubmitMode};
