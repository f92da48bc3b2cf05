//! Starsweep DB - PostgreSQL persistence for harvested repositories.
//!
//! [`RepoRepository`] implements the [`RepoStore`](starsweep_core::RepoStore)
//! seam with an upsert keyed on the GitHub id, and serves the read side of the
//! CLI (`stats`, `export`).

pub mod repository;

pub use repository::{RepoRepository, DEFAULT_LIST_LIMIT};
