//! Job queue core: domain model and the service that owns the state machine
//!
//! ```text
//!          submit
//!            |
//!            v
//!        queued ---- claim (lock free) ----> running
//!            |                                  |
//!            +-- claim (lock busy) --> waiting_domain_lock
//!                                          |   |
//!                                          |   +-- lock freed + reclaim --> running
//!                                          +-- waited too long --> failed(DOMAIN_WAIT_TIMEOUT)
//!        running -- render success --> succeeded
//!        running -- transient fail, attempts left --> queued
//!        running -- attempts exhausted / permanent --> failed(RENDER_FAILED)
//! ```
//!
//! Terminal states are never left. Per `domain_key` execution is strictly
//! serial; claim order is FIFO by `created_at`, ties broken by id.

pub mod models;
pub mod service;

pub use models::{
    DomainLock, ErrorCode, Job, JobLimits, JobStatus, NewJob, RenderMode, SubmitOutcome,
};
pub use service::{QueueError, QueueService, RetryDecision};
