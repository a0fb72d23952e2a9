//! `pamtrace-audit`: forensic reconciliation of a clinical bill, an insurer
//! adjudication (PAM) and a health-plan contract.
//!
//! Pure engine crate: receives canonical, pre-loaded documents and returns an
//! immutable audit result. No file, network or clock access.

pub mod classify;
pub mod config;
pub mod contract;
pub mod domain;
pub mod engine;
pub mod episode;
pub mod error;
pub mod evidence;
pub mod matcher;
pub mod model;
pub mod opacity;
pub mod pool;
pub mod preprocess;
pub mod report;
pub mod search;
pub mod structure;
pub mod vocab;

pub use config::AuditConfig;
pub use engine::run;
pub use error::AuditError;
pub use model::{AuditInput, AuditOutcome, AuditResult, AuditRow};
