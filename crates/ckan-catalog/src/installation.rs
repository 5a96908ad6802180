//! # Installation
//!
//! Getting a release's content onto disk happens in four steps:
//! 1. [`download`] the release archive into the cache.
//! 1. Index the archive's entries with [`ArchiveIndex`].
//! 1. [`resolve_install()`] the release's install directives against the index, giving one [`InstallMapping`] per file and target.
//! 1. Write the mapped files with [`content::extract_mappings()`].

use std::path::PathBuf;

pub mod archive_index;
pub use archive_index::ArchiveIndex;
pub use archive_index::ArchiveEntry;

pub mod resolver;
pub use resolver::resolve_install;
pub use resolver::InstallMapping;

pub mod content;
pub mod download;

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
	#[error("no archive entry at \"{0}\".")]
	InvalidSourcePath(String),
	#[error("no archive entry named \"{0}\".")]
	InvalidSourceName(String),
	#[error("no archive entry matches \"{0}\".")]
	InvalidSourceRegex(String),
	#[error("filter pattern \"{pattern}\" is invalid: {cause}")]
	InvalidFilterRegex { pattern: String, cause: regex::Error },
	#[error("archive has no directory named \"{0}\" to install.")]
	InvalidDirectoryStructure(String),
	#[error("path \"{0}\" leaves the install destination.")]
	PathTraversalRejected(String),
	#[error("release {0} has no installable content.")]
	NotInstallable(String),
	#[error("failed to extract {path}: {cause}")]
	ExtractFailed { path: PathBuf, cause: std::io::Error },
}
