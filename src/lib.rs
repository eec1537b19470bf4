//! Monotonic build numbers for CI jobs, stored on a dedicated git branch.
//!
//! Each identifier owns an independent counter inside one JSON document at
//! the root of the storage branch. An invocation checks the branch out into
//! a private worktree, takes a per-clone advisory lock, syncs with the
//! remote, and either reads the counter or advances it and pushes the
//! result. Concurrent jobs on one clone are serialized by the lock; jobs on
//! different machines are arbitrated by push rejection.
//!
//! The `build-numbers` binary wires these modules to the GitHub Actions
//! environment. They are public so integration tests can drive the
//! protocol against real repositories.

pub mod config;
pub mod error;
pub mod lock;
pub mod output;
pub mod protocol;
pub mod store;
pub mod telemetry;
pub mod workspace;
