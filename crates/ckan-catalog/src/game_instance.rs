//! Game installation handling.

use std::path::{Path, PathBuf};

use crate::metadb::package::GameVersion;

/// A single install of the game that packages are installed into.
///
/// Targets are identified by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
	name: String,
	path: PathBuf,
	game_version: Option<GameVersion>,
}

impl Target {
	/// Creates a target for an existing game directory.
	///
	/// The game version is read from the `readme.txt` shipped with the game when present.
	///
	/// # Errors
	/// - [`IO`](crate::error::Error::IO) when the directory can't be read.
	pub fn new(name: impl Into<String>, game_root_directory: impl AsRef<Path>) -> crate::Result<Self> {
		let path = game_root_directory.as_ref();
		std::fs::metadata(path)?; // Gives the user more info compared to using `path.exists()`

		let game_version = match std::fs::read_to_string(path.join("readme.txt")) {
			Ok(readme) => read_game_version(&readme),
			Err(e) => {
				log::debug!("No readme in {}, game version unknown: {}", path.display(), e);
				None
			},
		};

		let target = Self::at(name, path).with_game_version(game_version);
		log::info!("Created target {} at {}", target.name, target.path.display());
		Ok(target)
	}

	/// Creates a target without looking at the filesystem.
	pub fn at(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
		Self { name: name.into(), path: path.into(), game_version: None }
	}

	pub fn with_game_version(mut self, game_version: Option<GameVersion>) -> Self {
		self.game_version = game_version;
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// The game's root directory.
	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn game_version(&self) -> Option<&GameVersion> {
		self.game_version.as_ref()
	}
}

/// Finds the `Version 1.12.5` line of the game's readme.
fn read_game_version(readme: &str) -> Option<GameVersion> {
	readme.lines()
		.filter_map(|line| line.trim().strip_prefix("Version "))
		.find_map(|v| GameVersion::new(v.trim()).ok())
}
