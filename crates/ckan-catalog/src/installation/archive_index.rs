//! A flat listing of an archive's content.

use std::collections::HashSet;
use std::io::{Read, Seek};
use std::path::Path;

/// A file or directory in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
	path: String,
	name: String,
	is_dir: bool,
}

impl ArchiveEntry {
	/// `/` separated with no trailing slash, `GameData/Foo` for example.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// The name as stored in the archive, used to read the entry back out.
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn is_dir(&self) -> bool {
		self.is_dir
	}

	/// The last path component.
	pub fn file_name(&self) -> &str {
		self.path.rsplit('/').next().unwrap_or(&self.path)
	}

	/// Number of path components, top level entries have a depth of 1.
	pub fn depth(&self) -> usize {
		self.path.split('/').count()
	}

	/// Gets the remainder of this entry's path when it is inside `dir`.
	pub fn strip_dir<'a>(&'a self, dir: &str) -> Option<&'a str> {
		self.path.strip_prefix(dir)?.strip_prefix('/')
	}
}

/// The entries of an archive in archive order.
///
/// Archives don't always store their directories, any directory implied by an entry's path is added just before that entry.
#[derive(Debug, Clone, Default)]
pub struct ArchiveIndex {
	entries: Vec<ArchiveEntry>,
}

fn normalize_name(name: &str) -> String {
	name.replace('\\', "/").trim_end_matches('/').to_string()
}

impl ArchiveIndex {
	/// Builds an index from `(name, is_dir)` pairs.
	pub fn from_names<S: AsRef<str>>(names: impl IntoIterator<Item = (S, bool)>) -> Self {
		let mut index = Self::default();
		let mut seen = HashSet::<String>::new();
		for (name, is_dir) in names {
			index.push(&mut seen, name.as_ref(), is_dir);
		}
		index
	}

	/// Lists the entries of a zip archive, symlinks are left out.
	pub fn from_zip<R: Read + Seek>(archive: &mut zip::ZipArchive<R>) -> Result<Self, zip::result::ZipError> {
		const S_IFMT: u32 = 0o170000;
		const S_IFLNK: u32 = 0o120000;

		let mut index = Self::default();
		let mut seen = HashSet::<String>::new();
		for i in 0..archive.len() {
			let file = archive.by_index_raw(i)?;
			if file.unix_mode().map_or(false, |mode| mode & S_IFMT == S_IFLNK) {
				log::debug!("Skipping symlink {} in archive", file.name());
				continue;
			}
			let (name, is_dir) = (file.name().to_string(), file.is_dir());
			index.push(&mut seen, &name, is_dir);
		}
		Ok(index)
	}

	/// Lists an extracted archive, names are relative to `root`.
	pub fn from_directory(root: impl AsRef<Path>) -> Result<Self, walkdir::Error> {
		let root = root.as_ref();
		let mut index = Self::default();
		let mut seen = HashSet::<String>::new();
		for entry in walkdir::WalkDir::new(root).min_depth(1).sort_by_file_name() {
			let entry = entry?;
			if entry.path_is_symlink() {
				continue;
			}
			let Some(relative) = pathdiff::diff_paths(entry.path(), root) else { continue };
			let name = relative.to_string_lossy().replace('\\', "/");
			index.push(&mut seen, &name, entry.file_type().is_dir());
		}
		Ok(index)
	}

	fn push(&mut self, seen: &mut HashSet<String>, name: &str, is_dir: bool) {
		let path = normalize_name(name);
		if path.is_empty() || seen.contains(&path) {
			return
		}

		/* Add implied parents first so a directory always comes before its content */
		let mut end = 0;
		while let Some(offset) = path[end..].find('/') {
			end += offset;
			let parent = &path[..end];
			if !parent.is_empty() && seen.insert(parent.to_string()) {
				self.entries.push(ArchiveEntry { path: parent.to_string(), name: format!("{}/", parent), is_dir: true });
			}
			end += 1;
		}

		seen.insert(path.clone());
		self.entries.push(ArchiveEntry { path, name: name.to_string(), is_dir });
	}

	pub fn entries(&self) -> &[ArchiveEntry] {
		&self.entries
	}

	pub fn files(&self) -> impl Iterator<Item = &ArchiveEntry> {
		self.entries.iter().filter(|e| !e.is_dir)
	}

	/// Gets an entry by its normalized path.
	pub fn get(&self, path: &str) -> Option<&ArchiveEntry> {
		let path = normalize_name(path);
		self.entries.iter().find(|e| e.path == path)
	}

	/// Every entry inside the directory at `dir`, at any depth.
	pub fn descendants<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = &'a ArchiveEntry> + 'a {
		self.entries.iter().filter(move |e| e.strip_dir(dir).is_some())
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn paths(index: &ArchiveIndex) -> Vec<(&str, bool)> {
		index.entries().iter().map(|e| (e.path(), e.is_dir())).collect()
	}

	#[test]
	fn implied_directories_are_added() {
		let index = ArchiveIndex::from_names([("GameData/Foo/Parts/a.cfg", false), ("GameData/Foo/", true)]);
		assert_eq!(paths(&index), vec![
			("GameData", true),
			("GameData/Foo", true),
			("GameData/Foo/Parts", true),
			("GameData/Foo/Parts/a.cfg", false),
		]);
	}

	#[test]
	fn names_are_normalized() {
		let index = ArchiveIndex::from_names([("Foo\\Bar\\", true), ("Foo\\Bar\\b.dll", false)]);
		assert!(index.get("Foo/Bar/").unwrap().is_dir());
		assert_eq!(index.get("Foo/Bar/b.dll").unwrap().name(), "Foo\\Bar\\b.dll");
	}

	#[test]
	fn entry_helpers() {
		let index = ArchiveIndex::from_names([("a/b/c.txt", false)]);
		let entry = index.get("a/b/c.txt").unwrap();
		assert_eq!(entry.file_name(), "c.txt");
		assert_eq!(entry.depth(), 3);
		assert_eq!(entry.strip_dir("a"), Some("b/c.txt"));
		assert_eq!(entry.strip_dir("a/b/c"), None);
		assert_eq!(index.descendants("a").count(), 2);
		assert_eq!(index.files().count(), 1);
	}

	#[test]
	fn prefix_is_not_a_parent() {
		let index = ArchiveIndex::from_names([("Foo/a", false), ("FooBar/b", false)]);
		assert_eq!(index.descendants("Foo").map(|e| e.path()).collect::<Vec<_>>(), vec!["Foo/a"]);
	}

	#[test]
	fn from_directory_lists_relative_paths() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::create_dir_all(dir.path().join("GameData/Foo")).unwrap();
		std::fs::write(dir.path().join("GameData/Foo/a.cfg"), b"a").unwrap();
		let index = ArchiveIndex::from_directory(dir.path()).unwrap();
		assert_eq!(paths(&index), vec![("GameData", true), ("GameData/Foo", true), ("GameData/Foo/a.cfg", false)]);
	}
}
