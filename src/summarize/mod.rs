//! Streaming transcript summarization: live differential diagnoses and
//! per-diagnosis treatment plans.

pub mod client;

pub use client::{Diagnosis, DiagnosisSet, SummaryChunkCallback, SummaryClient};
