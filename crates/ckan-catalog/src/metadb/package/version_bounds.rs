use serde::{Serialize, Deserialize};

use super::version::{VersionValue, VersionError};

/// A generic enum to describe a range of versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionBounds<T>
where T: std::cmp::PartialEq + std::cmp::Ord + std::clone::Clone,
{
	Any,
	Explicit(T),
	MinOnly(T),
	MaxOnly(T),
	MinMax(T, T),
}

/* Not derived, that would require `T: Default` */
impl<T> Default for VersionBounds<T>
where T: std::cmp::PartialEq + std::cmp::Ord + std::clone::Clone,
{
	fn default() -> Self {
		VersionBounds::Any
	}
}

impl<T> VersionBounds<T>
where T: std::cmp::PartialEq + std::cmp::Ord + std::clone::Clone,
{
	/// When all arguments are `None` will return `Any`
	pub fn new(explicit: Option<T>, min: Option<T>, max: Option<T>) -> Result<VersionBounds<T>, BoundsError> {
		match (explicit, min, max) {
			(None, None, None) => Ok(VersionBounds::Any),
			(None, None, Some(max)) => Ok(VersionBounds::MaxOnly(max)),
			(None, Some(min), None) => Ok(VersionBounds::MinOnly(min)),
			(None, Some(min), Some(max)) => Ok(VersionBounds::MinMax(min, max)),
			(Some(e), None, None) => Ok(VersionBounds::Explicit(e)),
			_ => Err(BoundsError::ExplicitWithMinMax),
		}
	}

	pub fn is_version_within(&self, other: &T) -> bool {
		match self {
			VersionBounds::Any => true,
			VersionBounds::Explicit(v) => other == v,
			VersionBounds::MinOnly(min) => other >= min,
			VersionBounds::MaxOnly(max) => other <= max,
			VersionBounds::MinMax(min, max) => min <= other && other <= max,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoundsError {
	#[error("both an exact version and a min or max version were given.")]
	ExplicitWithMinMax,
	#[error("version bound is invalid: {0}")]
	Version(#[from] VersionError),
}

/// An inclusive interval of package versions.
///
/// Open ends are represented with [`VersionValue::NegativeInfinity`] and [`VersionValue::PositiveInfinity`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionRange {
	min: VersionValue,
	max: VersionValue,
}

impl Default for VersionRange {
	fn default() -> Self {
		Self::any()
	}
}

impl VersionRange {
	/// The range containing every version.
	pub fn any() -> Self {
		Self { min: VersionValue::NegativeInfinity, max: VersionValue::PositiveInfinity }
	}

	/// A range containing a single version.
	pub fn exact(version: VersionValue) -> Self {
		Self { min: version.clone(), max: version }
	}

	pub fn new(min: VersionValue, max: VersionValue) -> Self {
		Self { min, max }
	}

	/// Builds a range from the `version`, `min_version` and `max_version` fields of a relationship.
	///
	/// `"any"` in any position is treated as unbounded.
	///
	/// # Errors
	/// - [`BoundsError::ExplicitWithMinMax`] when `version` is given along with either of the others.
	/// - [`BoundsError::Version`] when a version fails to parse.
	pub fn from_fields(version: Option<&str>, min: Option<&str>, max: Option<&str>) -> Result<Self, BoundsError> {
		fn bound(s: Option<&str>, open: VersionValue) -> Result<VersionValue, BoundsError> {
			match s {
				None => Ok(open),
				Some(s) if s.eq_ignore_ascii_case("any") => Ok(open),
				Some(s) => Ok(VersionValue::parse(s)?),
			}
		}

		match (version, min, max) {
			(Some(_), Some(_), _) | (Some(_), _, Some(_)) => Err(BoundsError::ExplicitWithMinMax),
			(Some(exact), None, None) => {
				if exact.eq_ignore_ascii_case("any") {
					Ok(Self::any())
				} else {
					Ok(Self::exact(VersionValue::parse(exact)?))
				}
			},
			(None, min, max) => Ok(Self {
				min: bound(min, VersionValue::NegativeInfinity)?,
				max: bound(max, VersionValue::PositiveInfinity)?,
			}),
		}
	}

	pub fn min(&self) -> &VersionValue { &self.min }
	pub fn max(&self) -> &VersionValue { &self.max }

	pub fn is_any(&self) -> bool {
		self.min == VersionValue::NegativeInfinity && self.max == VersionValue::PositiveInfinity
	}

	pub fn is_exact(&self) -> bool {
		matches!(self.min, VersionValue::Ordinal(_)) && self.min == self.max
	}

	pub fn contains(&self, version: &VersionValue) -> bool {
		&self.min <= version && version <= &self.max
	}
}

impl std::fmt::Display for VersionRange {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.is_exact() {
			write!(f, "{{{}}}", self.min)
		} else {
			write!(f, "[{}, {}]", self.min, self.max)
		}
	}
}
