use serde::{Serialize, Deserialize};

/// Where in the archive a directive takes its files from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceDirective {
	/// `file`: an exact path within the archive.
	AbsolutePath(String),
	/// `find`: the top-most entry with this name.
	TopMostMatch(String),
	/// `find_regexp`: the top-most entry whose path matches this pattern.
	TopMostMatchByRegex(String),
}

/// A rule mapping archive content to a destination within a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallDirective {
	pub source: SourceDirective,
	/// `install_to`
	pub destination: String,
	/// `as`
	pub rename: Option<String>,
	/// `filter`
	pub exclude_names: Option<Vec<String>>,
	/// `filter_regexp`
	pub exclude_by_regex: Option<Vec<String>>,
	/// `include_only`
	pub include_only_names: Option<Vec<String>>,
	/// `include_only_regexp`
	pub include_only_by_regex: Option<Vec<String>>,
	/// `find_matches_files`
	pub source_matches_files: Option<bool>,
}

impl InstallDirective {
	pub fn new(source: SourceDirective, destination: impl Into<String>) -> Self {
		Self {
			source,
			destination: destination.into(),
			rename: None,
			exclude_names: None,
			exclude_by_regex: None,
			include_only_names: None,
			include_only_by_regex: None,
			source_matches_files: None,
		}
	}

	pub fn matches_files(&self) -> bool {
		self.source_matches_files.unwrap_or(false)
	}
}
