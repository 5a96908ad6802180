//! Package version strings.
//!
//! # Format
//!
//! `[EPOCH:]SEGMENT(.SEGMENT)*[-RELEASE][+METADATA]`
//!
//! Each segment is broken into alternating runs of digits and non-digits, e.g. `v1b2` is `[Text("v"), Numeric(1), Text("b"), Numeric(2)]`.
//!
//! # Ordering
//!
//! 1. Epochs compared numerically, a missing epoch counts as `0`.
//! 1. Segments compared lexicographically, unit by unit. A `Numeric` unit always sorts before a `Text` unit at the same position.
//! 1. A version without a release suffix is greater than one with a suffix, two suffixes compare lexically.
//! 1. The original strings compare lexically.
//!
//! The last step makes the order total, two values are only equal when their input strings are.

use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
	#[error("version string is empty.")]
	EmptyString,
	#[error("version string has no dotted version component.")]
	QuasiSemanticVersionNotFound,
	#[error("numeric run in version string is too large.")]
	MinimalUnitOversize,
}

/// The smallest comparable piece of a version.
/* NOTE: Variant order matters, the derived `Ord` puts `Numeric` before `Text`. */
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Unit {
	Numeric(usize),
	Text(String),
}

impl std::fmt::Display for Unit {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Unit::Numeric(n) => write!(f, "{}", n),
			Unit::Text(s) => write!(f, "{}", s),
		}
	}
}

/// One `.` separated part of a version.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Segment(pub Vec<Unit>);

impl Segment {
	fn parse(s: &str) -> Result<Self, VersionError> {
		let mut units = Vec::<Unit>::new();
		let mut rest = s;
		while let Some(first) = rest.chars().next() {
			let numeric = first.is_ascii_digit();
			let end = rest.find(|c: char| c.is_ascii_digit() != numeric).unwrap_or(rest.len());
			let (run, tail) = rest.split_at(end);
			units.push(if numeric {
				/* A run of ascii digits can only fail to parse by overflowing */
				Unit::Numeric(run.parse::<usize>().map_err(|_| VersionError::MinimalUnitOversize)?)
			} else {
				Unit::Text(run.to_string())
			});
			rest = tail;
		}
		Ok(Segment(units))
	}
}

impl std::fmt::Display for Segment {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		for unit in &self.0 {
			write!(f, "{}", unit)?;
		}
		Ok(())
	}
}

/// A successfully parsed version string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdinalVersion {
	original: String,
	epoch: Option<usize>,
	segments: Vec<Segment>,
	release_suffix: Option<String>,
	metadata_suffix: Option<String>,
}

impl OrdinalVersion {
	/// Parses a version string.
	///
	/// # Errors
	/// - [`VersionError::EmptyString`] when `text` is empty.
	/// - [`VersionError::QuasiSemanticVersionNotFound`] when nothing is left after removing the epoch and suffixes.
	/// - [`VersionError::MinimalUnitOversize`] when a run of digits doesn't fit in a `usize`.
	pub fn parse(text: impl AsRef<str>) -> Result<Self, VersionError> {
		let text = text.as_ref();
		if text.is_empty() {
			return Err(VersionError::EmptyString)
		}

		/* An epoch is only an epoch if it's all digits, otherwise the colon is part of the version */
		let (epoch, rest) = match text.split_once(':') {
			Some((e, rest)) if !e.is_empty() && e.bytes().all(|b| b.is_ascii_digit()) => {
				(Some(e.parse::<usize>().map_err(|_| VersionError::MinimalUnitOversize)?), rest)
			},
			_ => (None, text),
		};

		let (rest, metadata_suffix) = match rest.split_once('+') {
			Some((rest, meta)) => (rest, Some(meta.to_string())),
			None => (rest, None),
		};

		let (quasi_semantic, release_suffix) = match rest.split_once('-') {
			Some((rest, release)) => (rest, Some(release.to_string())),
			None => (rest, None),
		};

		if quasi_semantic.is_empty() {
			return Err(VersionError::QuasiSemanticVersionNotFound)
		}

		let segments = quasi_semantic.split('.').map(Segment::parse).collect::<Result<Vec<_>, _>>()?;

		Ok(OrdinalVersion {
			original: text.to_string(),
			epoch,
			segments,
			release_suffix,
			metadata_suffix,
		})
	}

	pub fn original(&self) -> &str { &self.original }
	pub fn epoch(&self) -> Option<usize> { self.epoch }
	pub fn segments(&self) -> &[Segment] { &self.segments }
	pub fn release_suffix(&self) -> Option<&str> { self.release_suffix.as_deref() }
	pub fn metadata_suffix(&self) -> Option<&str> { self.metadata_suffix.as_deref() }

	/// The segments joined by `.` for display, without epoch or suffixes.
	///
	/// A leading `v` is removed so `v1.2` and `1.2` display the same.
	pub fn description(&self) -> String {
		let mut segments = self.segments.iter().map(|s| s.to_string()).collect::<Vec<_>>();
		if let Some(Unit::Text(_)) = self.segments.first().and_then(|s| s.0.first()) {
			if let Some(first) = segments.first_mut() {
				if let Some(stripped) = first.strip_prefix('v') {
					*first = stripped.to_string();
				}
			}
		}
		segments.join(".")
	}
}

impl PartialEq for OrdinalVersion {
	fn eq(&self, other: &Self) -> bool {
		self.original == other.original
	}
}

impl Eq for OrdinalVersion {}

impl Ord for OrdinalVersion {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		use std::cmp::Ordering;
		self.epoch.unwrap_or(0).cmp(&other.epoch.unwrap_or(0))
			.then_with(|| self.segments.cmp(&other.segments))
			.then_with(|| match (&self.release_suffix, &other.release_suffix) {
				(None, None) => Ordering::Equal,
				(None, Some(_)) => Ordering::Greater,
				(Some(_), None) => Ordering::Less,
				(Some(lhs), Some(rhs)) => lhs.cmp(rhs),
			})
			.then_with(|| self.original.cmp(&other.original))
	}
}

impl PartialOrd for OrdinalVersion {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl std::hash::Hash for OrdinalVersion {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		self.original.hash(state);
	}
}

/// A package version, or one of the two ends of the version line.
///
/// The infinities exist so ranges can be open ended, they are never produced by parsing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VersionValue {
	NegativeInfinity,
	Ordinal(OrdinalVersion),
	PositiveInfinity,
}

impl VersionValue {
	/// Parses a version string into an [`Ordinal`](VersionValue::Ordinal).
	///
	/// `"any"` is not special here, callers building ranges should check for it first.
	pub fn parse(text: impl AsRef<str>) -> Result<Self, VersionError> {
		OrdinalVersion::parse(text).map(VersionValue::Ordinal)
	}

	pub fn as_ordinal(&self) -> Option<&OrdinalVersion> {
		match self {
			VersionValue::Ordinal(v) => Some(v),
			_ => None,
		}
	}

	/// The string the value was parsed from.
	pub fn original(&self) -> Option<&str> {
		self.as_ordinal().map(|v| v.original())
	}

	pub fn description(&self) -> String {
		self.to_string()
	}
}

impl std::str::FromStr for VersionValue {
	type Err = VersionError;
	fn from_str(s: &str) -> Result<Self, Self::Err> { Self::parse(s) }
}

impl TryFrom<&str> for VersionValue {
	type Error = VersionError;
	fn try_from(value: &str) -> Result<Self, Self::Error> { Self::parse(value) }
}

impl std::fmt::Display for VersionValue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			VersionValue::NegativeInfinity => write!(f, "-∞"),
			VersionValue::Ordinal(v) => write!(f, "{}", v.description()),
			VersionValue::PositiveInfinity => write!(f, "+∞"),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn v(s: &str) -> VersionValue { VersionValue::parse(s).unwrap() }

	#[test] fn version_are_not_compared_lexically() { assert!(v("1.2.4.0") < v("1.2.10.0")) }
	#[test] fn version_short_version_is_lt() { assert!(v("1.2") < v("1.2.3")) }
	#[test] fn version_identical_are_eq() { assert!(v("1.2.3") == v("1.2.3")) }
	#[test] fn version_higher_version_is_gt() { assert!(v("1.2.3") < v("1.2.4")) }
	#[test] fn version_prefix_is_supported() { assert!(v("v1.2.3") < v("v1.2.4")) }
	#[test] fn version_prefix_is_compared_lexically() { assert!(v("a1.2.3") < v("b1.2.3")) }
	#[test] fn version_trailing_non_digit() { assert!(v("1.2a") < v("1.2b")) }
	#[test] fn version_trailing_digit() { assert!(v("1.2") < v("1.3")) }
	#[test] fn version_epoch_is_respected() { assert!(v("1:1.2") < v("2:v0.1")) }
	#[test] fn version_missing_epoch_is_zero() { assert!(v("9.9") < v("1:0.1")) }
	#[test] fn version_release_beats_prerelease() { assert!(v("1.2.3") > v("1.2.3-alpha")) }
	#[test] fn version_prerelease_suffixes_compare_lexically() { assert!(v("1.0-alpha") < v("1.0-beta")) }
	#[test] fn version_numeric_sorts_before_text() { assert!(v("1.0") < v("1.a")) }
	#[test] fn version_metadata_only_breaks_ties() { assert!(v("1.0+a") < v("1.0+b") && v("1.0+b") < v("1.1")) }
	#[test] fn version_leading_zeros_are_not_equal() { assert!(v("1.01") != v("1.1")) }
	#[test] fn version_infinities_bound_everything() { assert!(VersionValue::NegativeInfinity < v("0") && v("999999.9") < VersionValue::PositiveInfinity) }

	#[test]
	fn version_parses_all_parts() {
		let parsed = OrdinalVersion::parse("1:2.0-beta+001").unwrap();
		assert_eq!(parsed.epoch(), Some(1));
		assert_eq!(parsed.segments(), &[Segment(vec![Unit::Numeric(2)]), Segment(vec![Unit::Numeric(0)])]);
		assert_eq!(parsed.release_suffix(), Some("beta"));
		assert_eq!(parsed.metadata_suffix(), Some("001"));
		assert_eq!(parsed.description(), "2.0");
		assert_eq!(parsed.original(), "1:2.0-beta+001");
	}

	#[test]
	fn version_segments_alternate_runs() {
		let parsed = OrdinalVersion::parse("v1b22").unwrap();
		assert_eq!(parsed.segments(), &[Segment(vec![Unit::Text("v".into()), Unit::Numeric(1), Unit::Text("b".into()), Unit::Numeric(22)])]);
	}

	#[test]
	fn version_description_strips_leading_v() {
		assert_eq!(v("v1.2.3").description(), "1.2.3");
		assert_eq!(v("1.2.3-rc1").description(), "1.2.3");
		assert_eq!(v("release1.2").description(), "release1.2");
	}

	#[test]
	fn version_non_numeric_epoch_is_part_of_version() {
		let parsed = OrdinalVersion::parse("abc:1").unwrap();
		assert_eq!(parsed.epoch(), None);
		assert_eq!(parsed.description(), "abc:1");
	}

	#[test]
	fn version_errors() {
		assert_eq!(VersionValue::parse(""), Err(VersionError::EmptyString));
		assert_eq!(VersionValue::parse("1:"), Err(VersionError::QuasiSemanticVersionNotFound));
		assert_eq!(VersionValue::parse("-beta"), Err(VersionError::QuasiSemanticVersionNotFound));
		assert_eq!(VersionValue::parse("1.99999999999999999999999999"), Err(VersionError::MinimalUnitOversize));
	}

	#[test]
	fn version_original_string_is_kept() {
		for s in ["v1.2", "1:2.0-beta+001", "1.01", "R5.2"] {
			assert_eq!(v(s).original(), Some(s));
		}
	}

	#[test]
	fn version_order_is_total() {
		let versions = [
			"1.0", "1.0.0", "v1.0", "1:0.1", "1.0-alpha", "1.0-beta", "1.0+meta", "1.a", "1.10", "1.9",
			"2", "0:2", "2.0b", "2.0-rc1+x", "a", "1..2", "01.0",
		].map(v);
		for a in &versions {
			assert_eq!(a.cmp(a), std::cmp::Ordering::Equal);
			for b in &versions {
				assert_eq!(a.cmp(b), b.cmp(a).reverse(), "antisymmetry {:?} {:?}", a, b);
				assert_eq!(a.cmp(b) == std::cmp::Ordering::Equal, a.original() == b.original());
				for c in &versions {
					if a < b && b < c {
						assert!(a < c, "transitivity {:?} {:?} {:?}", a, b, c);
					}
				}
			}
		}
	}
}
