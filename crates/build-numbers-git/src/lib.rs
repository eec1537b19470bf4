//! Git abstraction layer for build-numbers.
//!
//! This crate defines the [`GitRepo`] trait, the single interface through
//! which the counter protocol talks to git. The protocol never spawns git
//! itself; it programs against the trait so tests can substitute doubles
//! that inject failures at any step.
//!
//! # Crate layout
//!
//! - [`repo`]: the [`GitRepo`] trait definition.
//! - [`types`]: value types used in trait signatures ([`GitOid`],
//!   [`BranchName`], [`TreeEntry`], [`FetchOutcome`]).
//! - [`error`]: the [`GitError`] enum returned by all trait methods.

pub mod error;
pub mod repo;
pub mod types;

mod cli_repo;

pub use cli_repo::CliRepo;

pub use error::GitError;
pub use repo::GitRepo;
pub use types::{
    BranchName, BranchNameError, FetchOutcome, GitOid, OidParseError, TreeEntry,
};
