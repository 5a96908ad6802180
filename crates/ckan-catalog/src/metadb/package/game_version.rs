//! Versions of the game packages are installed into.
//!
//! # Format
//!
//! `MAJOR`.`MINOR`.`PATCH`.`BUILD`, only `MAJOR` is required. For example `1.12.3.3173`.
//!
//! # "Generally Compatible"
//!
//! It is up to clients to determine what versions are considered generally compatible.
//! Check the documentation for [`GameVersion::is_compatible_with()`] for a breakdown of what is compatible.

use serde::{Serialize, Deserialize};
use try_map::FallibleMapExt;

use super::version_bounds::{VersionBounds, BoundsError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameVersionError {
	#[error("\"any\" is not a real version.")]
	Any,
	#[error("game version must have between one and four components.")]
	ComponentCount,
	#[error("game version component \"{0}\" is not a number.")]
	Component(String),
}

/// Represents a specific game version.
///
/// # Eq & Ord
///
/// The `build` number is not considered in Eq and Ord as it causes problems
/// in cases such as `1.12.3 < 1.12.3.3173` which come up when comparing
/// a target's version with a package's constraint.
///
/// Missing components sort before present ones, `1.12 < 1.12.0`. Use
/// [`GameVersion::is_compatible_with()`] to check compatibility instead.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct GameVersion {
	major: u32,
	minor: Option<u32>,
	patch: Option<u32>,
	build: Option<u32>,
}

impl GameVersion {
	/// Create a new [`GameVersion`] from a version string.
	///
	/// # Errors
	/// - [`GameVersionError::Any`] when given `"any"`.
	/// - [`GameVersionError::ComponentCount`] for empty input or more than four components.
	/// - [`GameVersionError::Component`] when a component can't be parsed as an integer.
	pub fn new(s: impl AsRef<str>) -> Result<Self, GameVersionError> {
		let s = s.as_ref().trim();
		if s.eq_ignore_ascii_case("any") { return Err(GameVersionError::Any) }
		let components = s.split('.').collect::<Vec<_>>();
		if s.is_empty() || components.len() > 4 { return Err(GameVersionError::ComponentCount) }

		fn component(c: &&str) -> Result<u32, GameVersionError> {
			c.parse::<u32>().map_err(|_| GameVersionError::Component(c.to_string()))
		}

		Ok(GameVersion {
			major: components.first().try_map(component)?.ok_or(GameVersionError::ComponentCount)?,
			minor: components.get(1).try_map(component)?,
			patch: components.get(2).try_map(component)?,
			build: components.get(3).try_map(component)?,
		})
	}

	/// The `0.0.0` version substituted for versions that can't be parsed.
	pub fn marker() -> Self {
		GameVersion { major: 0, minor: Some(0), patch: Some(0), build: None }
	}

	/// Checks general compatibility between two versions.
	///
	/// # How This Is Defined
	/// 1. `major` must match.
	/// 1. `minor` must match when present in both.
	/// 1. If `patch` is present in both, `self <= other`.
	pub fn is_compatible_with(&self, other: &Self) -> bool {
		if self.major != other.major {
			return false
		}
		match (self.minor, other.minor) {
			(Some(lhs), Some(rhs)) if lhs != rhs => return false,
			_ => {},
		}
		match (self.patch, other.patch) {
			(Some(lhs), Some(rhs)) => lhs <= rhs,
			_ => true,
		}
	}

	pub fn major(&self) -> u32 { self.major }
	pub fn minor(&self) -> Option<u32> { self.minor }
	pub fn patch(&self) -> Option<u32> { self.patch }
	pub fn build(&self) -> Option<u32> { self.build }
}

impl TryFrom<&str> for GameVersion {
	type Error = GameVersionError;

	fn try_from(value: &str) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}

impl PartialEq for GameVersion {
	fn eq(&self, other: &Self) -> bool {
		self.major == other.major &&
		self.minor == other.minor &&
		self.patch == other.patch
	}
}

impl Ord for GameVersion {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		/* Build is left out, see the struct docs */
		(self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
	}
}

impl PartialOrd for GameVersion {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> { Some(self.cmp(other)) }
}

impl std::hash::Hash for GameVersion {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		self.major.hash(state);
		self.minor.hash(state);
		self.patch.hash(state);
	}
}

impl std::fmt::Display for GameVersion {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.major)?;
		for c in [self.minor, self.patch, self.build].into_iter().flatten() {
			write!(f, ".{}", c)?;
		}
		Ok(())
	}
}

pub type GameVersionBounds = VersionBounds<GameVersion>;

impl GameVersionBounds {
	/// Checks if `other` is a version compatible with this version bound.
	///
	/// # Parameters
	/// - `strict` - Should this check require the version to be exactly equal or just compatible.
	pub fn is_version_compatible(&self, other: &GameVersion, strict: bool) -> bool {
		match self {
			Self::Any => true,
			Self::Explicit(v) => {
				if strict {
					other == v
				} else {
					v.is_compatible_with(other)
				}
			},
			Self::MinOnly(min) => other >= min || min.is_compatible_with(other),
			Self::MaxOnly(max) => other <= max || other.is_compatible_with(max),
			Self::MinMax(min, max) => (min <= other || min.is_compatible_with(other)) && (other <= max || other.is_compatible_with(max)),
		}
	}

	/// Builds bounds from already parsed fields, `None` meaning absent or `"any"`.
	pub fn from_parsed(explicit: Option<GameVersion>, min: Option<GameVersion>, max: Option<GameVersion>) -> Result<Self, BoundsError> {
		VersionBounds::new(explicit, min, max)
	}
}
