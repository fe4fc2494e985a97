//! Patient context retrieval for preventative health advice.
//!
//! A patient table is loaded once into a [`Dataset`], filtered by age
//! bracket, smoker status and clinical-history flags, and the matching rows
//! are summarized into a deterministic text block ([`ContextSummary`]) that
//! is embedded in a completion prompt.

pub mod advisor;
pub mod config;
pub mod context;
pub mod dataset;
pub mod describe;
pub mod error;
pub mod prompt;
pub mod records;

pub use advisor::{Advice, Advisor, CompletionClient, GroqClient};
pub use config::AppConfig;
pub use context::{build_context, build_context_for, select, ContextSummary, FilterCriteria};
pub use dataset::{ColumnKind, Dataset};
pub use error::{AdvisorError, AdvisorResult};
