#![forbid(unsafe_code)]
//! pedigree-core library.
//!
//! Provenance identities for query compilation: each intermediate dataset
//! row is witnessed by a set of lineage paths, and this crate stores those
//! sets compactly as a DAG with prefix and suffix sharing. The planner uses
//! the structure to decide where autojoins are legal, where deduplication
//! is safe, and which grouping keys are redundant.
//!
//! # Conventions
//!
//! - **Values**: immutable; every operation returns a new [`Identities`].
//! - **Totality**: no operation fails on well-typed input; there is no
//!   error type in this crate.
//! - **Logging**: `tracing` macros (`debug!`, `trace!`) in the merge path.

pub mod ident;

pub use ident::{Group, Identities, Lineage};
