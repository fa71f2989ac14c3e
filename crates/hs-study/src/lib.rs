//! # hs-study
//!
//! The persistent-study half of the search backend: a capability trait for
//! study storage with in-memory and JSON-file-backed implementations, the
//! `Study` handle that runs one trial at a time against a user objective,
//! and the repair routine that excises trials corrupted by mid-trial kills.

mod json;
mod objective;
mod repair;
mod store;
mod study;

pub use json::JsonStore;
pub use objective::{Objective, TrialContext};
pub use repair::repair_study;
pub use store::{MemoryStore, StudyRecord, StudyStore};
pub use study::{Study, TrialOutcome};
