//! The deduplicated set of known packages.

use std::collections::BTreeMap;
use std::path::Path;
use serde::{Serialize, Deserialize};

use super::package::{Release, GameVersion};

/// Every release published under one identifier.
///
/// Releases are kept in insertion order, sort them for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
	id: String,
	releases: Vec<Release>,
}

impl Package {
	pub fn new(id: impl Into<String>) -> Self {
		Self { id: id.into(), releases: Vec::new() }
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn releases(&self) -> &[Release] {
		&self.releases
	}

	/// The release with the highest version.
	pub fn latest(&self) -> Option<&Release> {
		self.releases.iter().max_by(|a, b| a.version.cmp(&b.version))
	}

	/// Adds a release unless one with the same version is already present.
	///
	/// # Returns
	/// `true` if the release was added.
	fn merge(&mut self, release: Release) -> bool {
		if self.releases.iter().any(|r| r.version == release.version) {
			log::debug!("Release {} is already in the catalog, keeping the existing one.", release);
			return false
		}
		self.releases.push(release);
		true
	}

	/// Adds a release, taking the place of one with the same version.
	fn replace(&mut self, release: Release) -> Option<Release> {
		match self.releases.iter_mut().find(|r| r.version == release.version) {
			Some(existing) => Some(std::mem::replace(existing, release)),
			None => {
				self.releases.push(release);
				None
			},
		}
	}
}

/// Maps package identifiers to their [`Package`].
///
/// Every identifier appears at most once, inserting a release for a known identifier merges it into the existing package.
/// [`insert_release()`](Catalog::insert_release) keeps a release that is already present, [`replace_release()`](Catalog::replace_release) overwrites it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
	packages: BTreeMap<String, Package>,
}

impl Catalog {
	pub fn new() -> Self {
		Self::default()
	}

	/// # Returns
	/// `true` if the release was not already present.
	pub fn insert_release(&mut self, release: Release) -> bool {
		self.packages
			.entry(release.package_id.clone())
			.or_insert_with(|| Package::new(release.package_id.clone()))
			.merge(release)
	}

	/// Inserts a release, replacing the one with the same identifier and version if there is one.
	///
	/// # Returns
	/// The replaced release.
	pub fn replace_release(&mut self, release: Release) -> Option<Release> {
		self.packages
			.entry(release.package_id.clone())
			.or_insert_with(|| Package::new(release.package_id.clone()))
			.replace(release)
	}

	pub fn insert_releases(&mut self, releases: impl IntoIterator<Item = Release>) {
		for release in releases {
			self.insert_release(release);
		}
	}

	/// Merges every release of `package`.
	pub fn insert_package(&mut self, package: Package) {
		self.insert_releases(package.releases);
	}

	pub fn get(&self, id: &str) -> Option<&Package> {
		self.packages.get(id)
	}

	pub fn get_release(&self, id: &str, version: &str) -> Option<&Release> {
		self.get(id)?.releases().iter().find(|r| r.version.original() == Some(version))
	}

	/// Packages sorted by identifier.
	pub fn packages(&self) -> impl Iterator<Item = &Package> {
		self.packages.values()
	}

	pub fn releases(&self) -> impl Iterator<Item = &Release> {
		self.packages().flat_map(|p| p.releases().iter())
	}

	/// Number of packages, not releases.
	pub fn len(&self) -> usize {
		self.packages.len()
	}

	pub fn is_empty(&self) -> bool {
		self.packages.is_empty()
	}

	/// Releases which can be installed into the given game version.
	pub fn compatible_releases<'a>(&'a self, game_version: &'a GameVersion) -> impl Iterator<Item = &'a Release> + 'a {
		self.releases().filter(move |r| r.is_compatible_with(game_version))
	}

	fn cache_path(data_dir: &Path) -> std::path::PathBuf {
		data_dir.join("catalog.bin")
	}

	/// Loads the cached catalog.
	///
	/// # Errors
	/// - [`IO`](crate::error::Error::IO) when opening the file.
	/// - [`Bincode`](crate::error::Error::Bincode) when deserializing the file.
	pub fn load_from_disk(config: &crate::Config) -> crate::Result<Self> {
		let file = std::fs::File::open(Self::cache_path(config.data_dir()))?;
		Ok(bincode::deserialize_from(std::io::BufReader::new(file))?)
	}

	/// Saves the catalog to `data_dir`.
	///
	/// # Errors
	/// - [`IO`](crate::error::Error::IO) when creating the file or its parent directories.
	/// - [`Bincode`](crate::error::Error::Bincode) when serializing.
	pub fn save_to_disk(&self, config: &crate::Config) -> crate::Result<()> {
		let path = Self::cache_path(config.data_dir());
		std::fs::create_dir_all(config.data_dir())?;
		let file = std::fs::File::create(&path)?;
		bincode::serialize_into(std::io::BufWriter::new(file), self)?;
		log::debug!("Saved catalog to {}", path.display());
		Ok(())
	}
}
