//! Maps archive entries to destinations using a release's install directives.

use std::path::PathBuf;

use regex::Regex;

use super::{ArchiveIndex, ArchiveEntry, InstallError};
use crate::game_instance::Target;
use crate::metadb::package::{Release, InstallDirective, SourceDirective};

/// One file to be written for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallMapping {
	/// Name of the target this mapping is for.
	pub target: String,
	/// The entry's name within the archive.
	pub source: String,
	/// Path relative to the target's root, `GameData/Foo/Parts/a.cfg` for example.
	pub relative: PathBuf,
	/// `relative` joined onto the target's path.
	pub destination: PathBuf,
}

/// Works out where every file of `release` goes in each of `targets`.
///
/// Without an `install` section the contents of the top level directory named after the package are installed into `GameData`.
///
/// # Errors
/// - [`InstallError::NotInstallable`] for metapackages and DLC.
/// - [`InstallError::InvalidDirectoryStructure`] when there's no `install` section and no top level directory named after the package.
/// - [`InstallError::InvalidSourcePath`], [`InstallError::InvalidSourceName`] or [`InstallError::InvalidSourceRegex`] when a directive's source isn't in the archive.
/// - [`InstallError::InvalidFilterRegex`] when a filter doesn't compile.
/// - [`InstallError::PathTraversalRejected`] when a directive's `install_to` leaves the target.
///
/// Single files whose destination would leave their directive's `install_to` are logged and skipped.
pub fn resolve_install(release: &Release, index: &ArchiveIndex, targets: &[Target]) -> Result<Vec<InstallMapping>, InstallError> {
	log::trace!("Resolving install of {} into {} targets", release, targets.len());
	if !release.is_installable() {
		return Err(InstallError::NotInstallable(release.to_string()));
	}

	let files = match &release.install {
		Some(directives) => {
			let mut files = Vec::<(&ArchiveEntry, PathBuf)>::new();
			for directive in directives {
				files.append(&mut process_directive(directive, index)?);
			}
			files
		},
		None => default_install(release, index)?,
	};

	Ok(targets.iter()
		.flat_map(|target| files.iter().map(move |(entry, relative)| InstallMapping {
			target: target.name().to_string(),
			source: entry.name().to_string(),
			relative: relative.clone(),
			destination: target.path().join(relative),
		}))
		.collect())
}

/// "If no install sections are provided, a CKAN client must find the top-most directory
/// in the archive that matches the module identifier, and install that with a target of GameData."
///
/// Only a directory at the top of the archive counts and its name is not part of the destination,
/// `Foo/Parts/a.cfg` lands in `GameData/Parts/a.cfg`.
fn default_install<'a>(release: &Release, index: &'a ArchiveIndex) -> Result<Vec<(&'a ArchiveEntry, PathBuf)>, InstallError> {
	let root = index.entries().iter()
		.find(|e| e.is_dir() && e.depth() == 1 && e.file_name() == release.package_id)
		.ok_or_else(|| InstallError::InvalidDirectoryStructure(release.package_id.clone()))?;

	let mut files = Vec::<(&ArchiveEntry, PathBuf)>::new();
	for entry in index.descendants(root.path()).filter(|e| !e.is_dir()) {
		let Some(rest) = entry.strip_dir(root.path()) else { continue };
		let Some(rest) = normalize(rest) else {
			log::warn!("Rejected {}, it leaves {}", entry.path(), root.path());
			continue;
		};
		files.push((entry, std::iter::once("GameData".to_string()).chain(rest).collect::<PathBuf>()));
	}
	Ok(files)
}

/// Resolves a single directive into entries and paths relative to the target root.
fn process_directive<'a>(directive: &InstallDirective, index: &'a ArchiveIndex) -> Result<Vec<(&'a ArchiveEntry, PathBuf)>, InstallError> {
	let destination = if directive.destination == "GameRoot" {
		Vec::new()
	} else {
		normalize(&directive.destination).ok_or_else(|| InstallError::PathTraversalRejected(directive.destination.clone()))?
	};

	let root = find_source(directive, index)?;
	let filters = Filters::new(directive)?;
	let base_name = directive.rename.as_deref().unwrap_or_else(|| root.file_name());

	/* Each candidate with its path below the root, `None` when the root is a file */
	let candidates: Box<dyn Iterator<Item = (&ArchiveEntry, Option<&str>)> + '_> = if root.is_dir() {
		Box::new(index.descendants(root.path())
			.filter(|e| !e.is_dir())
			.filter_map(|e| e.strip_dir(root.path()).map(|rest| (e, Some(rest)))))
	} else {
		Box::new(std::iter::once((root, None)))
	};

	let mut files = Vec::<(&ArchiveEntry, PathBuf)>::new();
	for (entry, rest) in candidates {
		let join = |name: &str| match rest {
			Some(rest) => format!("{}/{}", name, rest),
			None => name.to_string(),
		};
		if !filters.allows(entry, &join(root.file_name())) {
			log::trace!("Filtered out {}", entry.path());
			continue;
		}
		let relative = join(base_name);
		let Some(relative) = normalize(&relative) else {
			log::warn!("Rejected {}, \"{}\" leaves the destination {}", entry.path(), relative, directive.destination);
			continue;
		};
		let path = destination.iter().chain(relative.iter()).collect::<PathBuf>();
		files.push((entry, path));
	}

	if files.is_empty() {
		log::debug!("Directive for {:?} installs nothing.", directive.source);
	}
	Ok(files)
}

/// Finds the entry a directive installs from.
///
/// `find` and `find_regexp` only consider directories unless `find_matches_files` is set.
/// The top-most match is the one with the fewest path components, the first in archive order on a tie.
fn find_source<'a>(directive: &InstallDirective, index: &'a ArchiveIndex) -> Result<&'a ArchiveEntry, InstallError> {
	fn top_most<'a>(candidates: impl Iterator<Item = &'a ArchiveEntry>) -> Option<&'a ArchiveEntry> {
		candidates.fold(None::<&'a ArchiveEntry>, |best, e| match best {
			Some(b) if b.depth() <= e.depth() => Some(b),
			_ => Some(e),
		})
	}

	let matches_files = directive.matches_files();
	let searchable = || index.entries().iter().filter(move |e| e.is_dir() || matches_files);

	match &directive.source {
		SourceDirective::AbsolutePath(path) => {
			index.get(path).ok_or_else(|| InstallError::InvalidSourcePath(path.clone()))
		},
		SourceDirective::TopMostMatch(name) => {
			top_most(searchable().filter(|e| e.file_name() == name))
				.ok_or_else(|| InstallError::InvalidSourceName(name.clone()))
		},
		SourceDirective::TopMostMatchByRegex(pattern) => {
			let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
				log::warn!("find_regexp \"{}\" doesn't compile: {}", pattern, e);
				InstallError::InvalidSourceRegex(pattern.clone())
			})?;
			top_most(searchable().filter(|e| regex.is_match(e.path())))
				.ok_or_else(|| InstallError::InvalidSourceRegex(pattern.clone()))
		},
	}
}

/// The `filter` and `include_only` options of a directive.
struct Filters<'d> {
	exclude_names: &'d [String],
	exclude_regex: Vec<Regex>,
	include_names: &'d [String],
	include_regex: Vec<Regex>,
}

impl<'d> Filters<'d> {
	fn new(directive: &'d InstallDirective) -> Result<Self, InstallError> {
		fn compile(patterns: &Option<Vec<String>>) -> Result<Vec<Regex>, InstallError> {
			patterns.iter().flatten()
				.map(|p| Regex::new(p).map_err(|cause| InstallError::InvalidFilterRegex { pattern: p.clone(), cause }))
				.collect()
		}

		Ok(Self {
			exclude_names: directive.exclude_names.as_deref().unwrap_or_default(),
			exclude_regex: compile(&directive.exclude_by_regex)?,
			include_names: directive.include_only_names.as_deref().unwrap_or_default(),
			include_regex: compile(&directive.include_only_by_regex)?,
		})
	}

	fn is_restricted(&self) -> bool {
		!self.include_names.is_empty() || !self.include_regex.is_empty()
	}

	/// Names match any component of `source_path`, the entry's path starting at the source root's own name.
	/// Patterns are searched for in the whole archive path.
	/// Exclusion wins when an entry matches both.
	fn allows(&self, entry: &ArchiveEntry, source_path: &str) -> bool {
		let matches = |names: &[String], regexes: &[Regex]| {
			source_path.split('/').any(|c| names.iter().any(|n| n == c)) ||
			regexes.iter().any(|r| r.is_match(entry.path()))
		};

		if matches(self.exclude_names, &self.exclude_regex) {
			return false
		}
		!self.is_restricted() || matches(self.include_names, &self.include_regex)
	}
}

/// Resolves `.` and `..` without touching the filesystem.
///
/// # Returns
/// `None` for absolute paths and paths that climb above their start.
fn normalize(path: &str) -> Option<Vec<String>> {
	if path.starts_with('/') || path.starts_with('\\') || path.split(['/', '\\']).next().map_or(false, |c| c.contains(':')) {
		return None
	}
	let mut components = Vec::<String>::new();
	for component in path.split(['/', '\\']) {
		match component {
			"" | "." => {},
			".." => { components.pop()?; },
			c => components.push(c.to_string()),
		}
	}
	Some(components)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::metadb::package::VersionValue;

	fn release(directives: Option<Vec<InstallDirective>>) -> Release {
		let mut r = Release::new("Foo", VersionValue::parse("1.0").unwrap());
		r.install = directives;
		r
	}

	fn target() -> Target {
		Target::at("main", "/ksp")
	}

	fn resolve(directives: Option<Vec<InstallDirective>>, names: &[&str]) -> Result<Vec<String>, InstallError> {
		let index = ArchiveIndex::from_names(names.iter().map(|n| (*n, n.ends_with('/'))));
		Ok(resolve_install(&release(directives), &index, &[target()])?
			.into_iter()
			.map(|m| m.relative.to_string_lossy().replace('\\', "/"))
			.collect())
	}

	fn directive(source: SourceDirective, to: &str) -> InstallDirective {
		InstallDirective::new(source, to)
	}

	#[test]
	fn normalize_rules() {
		assert_eq!(normalize("GameData/./Foo/"), Some(vec!["GameData".to_string(), "Foo".to_string()]));
		assert_eq!(normalize("a/../b"), Some(vec!["b".to_string()]));
		assert_eq!(normalize("../b"), None);
		assert_eq!(normalize("a/../../b"), None);
		assert_eq!(normalize("/etc"), None);
		assert_eq!(normalize("C:\\Windows"), None);
	}

	#[test]
	fn file_directive_keeps_directory_name() {
		let files = resolve(Some(vec![directive(SourceDirective::AbsolutePath("GameData/Foo".into()), "GameData")]), &["GameData/Foo/Parts/a.cfg"]).unwrap();
		assert_eq!(files, vec!["GameData/Foo/Parts/a.cfg"]);
	}

	#[test]
	fn mappings_join_target_path() {
		let index = ArchiveIndex::from_names([("Foo/a.cfg", false)]);
		let mappings = resolve_install(&release(None), &index, &[target(), Target::at("other", "/ksp2")]).unwrap();
		assert_eq!(mappings.len(), 2);
		assert_eq!(mappings[0].destination, PathBuf::from("/ksp").join("GameData").join("a.cfg"));
		assert_eq!(mappings[1].target, "other");
		assert_eq!(mappings[1].source, "Foo/a.cfg");
	}

	#[test]
	fn default_install_strips_package_directory() {
		let files = resolve(None, &["Extras/Foo/readme.txt", "Foo/Foo.dll", "Foo/Parts/p.cfg"]).unwrap();
		assert_eq!(files, vec!["GameData/Foo.dll", "GameData/Parts/p.cfg"]);
	}

	#[test]
	fn default_install_ignores_nested_directory() {
		assert!(matches!(resolve(None, &["Extras/Foo/a.cfg"]), Err(InstallError::InvalidDirectoryStructure(name)) if name == "Foo"));
		assert!(matches!(resolve(None, &["Foo"]), Err(InstallError::InvalidDirectoryStructure(_))));
	}

	#[test]
	fn default_install_skips_escaping_entries() {
		assert_eq!(resolve(None, &["Foo/ok.cfg", "Foo/../../evil.dll"]).unwrap(), vec!["GameData/ok.cfg"]);
	}

	#[test]
	fn default_install_without_directory_fails() {
		assert!(matches!(resolve(None, &["Bar/Bar.dll"]), Err(InstallError::InvalidDirectoryStructure(name)) if name == "Foo"));
	}

	#[test]
	fn missing_sources_fail() {
		assert!(matches!(resolve(Some(vec![directive(SourceDirective::AbsolutePath("Nope".into()), "GameData")]), &["Foo/a"]), Err(InstallError::InvalidSourcePath(_))));
		assert!(matches!(resolve(Some(vec![directive(SourceDirective::TopMostMatch("Nope".into()), "GameData")]), &["Foo/a"]), Err(InstallError::InvalidSourceName(_))));
		assert!(matches!(resolve(Some(vec![directive(SourceDirective::TopMostMatchByRegex("No.*".into()), "GameData")]), &["Foo/a"]), Err(InstallError::InvalidSourceRegex(_))));
	}

	#[test]
	fn find_ignores_files_unless_asked() {
		let names = ["Foo.cfg", "Sub/Foo.cfg/x.cfg"];
		let files = resolve(Some(vec![directive(SourceDirective::TopMostMatch("Foo.cfg".into()), "GameData")]), &names).unwrap();
		assert_eq!(files, vec!["GameData/Foo.cfg/x.cfg"]);

		let mut d = directive(SourceDirective::TopMostMatch("Foo.cfg".into()), "GameData");
		d.source_matches_files = Some(true);
		assert_eq!(resolve(Some(vec![d]), &names).unwrap(), vec!["GameData/Foo.cfg"]);
	}

	#[test]
	fn find_regexp_matches_whole_path() {
		let names = ["Mod-1.0/GameData/Foo/a.cfg", "Other/GameData/FooBar/b.cfg"];
		let files = resolve(Some(vec![directive(SourceDirective::TopMostMatchByRegex(".*/GameData/Foo".into()), "GameData")]), &names).unwrap();
		assert_eq!(files, vec!["GameData/Foo/a.cfg"]);
	}

	#[test]
	fn rename_replaces_root_name() {
		let mut d = directive(SourceDirective::TopMostMatch("Foo-master".into()), "GameData");
		d.rename = Some("Foo".into());
		assert_eq!(resolve(Some(vec![d]), &["Foo-master/a/b.cfg"]).unwrap(), vec!["GameData/Foo/a/b.cfg"]);
	}

	#[test]
	fn game_root_installs_at_top() {
		let d = directive(SourceDirective::AbsolutePath("Ships".into()), "GameRoot");
		assert_eq!(resolve(Some(vec![d]), &["Ships/VAB/x.craft"]).unwrap(), vec!["Ships/VAB/x.craft"]);
	}

	#[test]
	fn filters_and_includes() {
		let mut d = directive(SourceDirective::AbsolutePath("Foo".into()), "GameData");
		d.exclude_names = Some(vec!["Thumbs.db".into()]);
		d.exclude_by_regex = Some(vec!["\\.bak$".into()]);
		let names = ["Foo/a.cfg", "Foo/Thumbs.db", "Foo/b.cfg.bak", "Foo/Sub/c.cfg"];
		assert_eq!(resolve(Some(vec![d.clone()]), &names).unwrap(), vec!["GameData/Foo/a.cfg", "GameData/Foo/Sub/c.cfg"]);

		d.include_only_names = Some(vec!["Sub".into(), "b.cfg.bak".into()]);
		assert_eq!(resolve(Some(vec![d]), &names).unwrap(), vec!["GameData/Foo/Sub/c.cfg"]);
	}

	#[test]
	fn name_filters_ignore_directories_above_source() {
		let mut d = directive(SourceDirective::TopMostMatch("Foo".into()), "GameData");
		d.exclude_names = Some(vec!["GameData".into(), "Thumbs.db".into()]);
		let names = ["Mod/GameData/Foo/a.cfg", "Mod/GameData/Foo/Thumbs.db"];
		assert_eq!(resolve(Some(vec![d.clone()]), &names).unwrap(), vec!["GameData/Foo/a.cfg"]);

		d.exclude_names = None;
		d.include_only_names = Some(vec!["Mod".into()]);
		assert_eq!(resolve(Some(vec![d]), &names).unwrap(), Vec::<String>::new());
	}

	#[test]
	fn include_only_regex() {
		let mut d = directive(SourceDirective::AbsolutePath("Foo".into()), "GameData");
		d.include_only_by_regex = Some(vec!["\\.dll$".into()]);
		assert_eq!(resolve(Some(vec![d]), &["Foo/a.cfg", "Foo/Plugins/a.dll"]).unwrap(), vec!["GameData/Foo/Plugins/a.dll"]);
	}

	#[test]
	fn bad_filter_regex_is_error() {
		let mut d = directive(SourceDirective::AbsolutePath("Foo".into()), "GameData");
		d.exclude_by_regex = Some(vec!["(".into()]);
		assert!(matches!(resolve(Some(vec![d]), &["Foo/a"]), Err(InstallError::InvalidFilterRegex { .. })));
	}

	#[test]
	fn traversal_in_rename_is_skipped() {
		let mut d = directive(SourceDirective::AbsolutePath("Foo".into()), "GameData");
		d.rename = Some("../../..".into());
		assert_eq!(resolve(Some(vec![d]), &["Foo/a.cfg"]).unwrap(), Vec::<String>::new());
	}

	#[test]
	fn traversal_in_entry_is_skipped() {
		let files = resolve(Some(vec![directive(SourceDirective::AbsolutePath("Foo".into()), "GameData")]), &["Foo/ok.cfg", "Foo/../../../evil.dll"]).unwrap();
		assert_eq!(files, vec!["GameData/Foo/ok.cfg"]);
	}

	#[test]
	fn traversal_in_destination_is_error() {
		let d = directive(SourceDirective::AbsolutePath("Foo".into()), "../outside");
		assert!(matches!(resolve(Some(vec![d]), &["Foo/a.cfg"]), Err(InstallError::PathTraversalRejected(_))));
	}

	#[test]
	fn metapackage_is_not_installable() {
		let mut r = release(None);
		r.kind = crate::metadb::package::Kind::MetaPackage;
		assert!(matches!(resolve_install(&r, &ArchiveIndex::default(), &[target()]), Err(InstallError::NotInstallable(_))));
	}
}
