//! # CKAN's metadb
//!
//! The metadb is distributed as an archive of JSON `.ckan` files, one per release.
//! It's read into a [`Catalog`] which can be cached to disk with bincode.

pub mod package;
pub use package::Release;

pub mod catalog;
pub use catalog::Catalog;
pub use catalog::Package;

pub mod generation;
pub use generation::fetch_archive;
pub use generation::ingest_archive;
pub use generation::IngestionError;
pub use generation::IngestionReport;
