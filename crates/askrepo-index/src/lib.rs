//! Incremental repository indexing and retrieval.
//!
//! One `read` cycle threads a [`store::VectorIndex`] value through
//! scan → diff → update → persist: [`scanner`] hashes the files,
//! [`manifest`] diffs them against the previous snapshot, [`updater`]
//! re-chunks and re-embeds what changed, and [`retriever`] ranks the
//! stored chunks for a query vector.

pub mod chunker;
pub mod error;
pub mod manifest;
pub(crate) mod persist;
pub mod retriever;
pub mod scanner;
pub mod source;
pub mod store;
pub mod updater;

pub use error::{IndexError, Result};
