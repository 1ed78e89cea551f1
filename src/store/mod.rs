//! Fjall-based persistence layer for jobs, domain locks, and indexes
//!
//! This module is the only path to durable state. It persists:
//!
//! - Job rows (full lifecycle state, never deleted)
//! - Domain locks (the per-domain mutex rows)
//! - The same-day dedup index
//! - The pending index that drives FIFO claiming
//!
//! ## Isolation
//!
//! One process owns the keyspace. A single write gate serializes all
//! mutations, which is what makes `claim_next` and `finish_job` serializable;
//! multi-key updates commit through fjall batches so job rows and lock rows
//! can never disagree after a crash.

pub mod error;
pub mod partitions;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{JobOutcome, JobStore, RecoveryStats};
