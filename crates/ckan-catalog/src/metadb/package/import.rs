//! Functions for reading CKAN types from JSON
//!
//! Required fields missing or of the wrong type fail the whole document with a [`DecodeError`].
//! Problems with optional fields are collected by [`Diagnostics`] as [`DecodeWarning`]s and the field is left at its default.

use std::collections::BTreeMap;
use serde_json::{Value, Map};

use super::*;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
	#[error("JSON error: {0}")]
	SerdeJSON(#[from] serde_json::Error),
	#[error("document is not a JSON object.")]
	NotAnObject,
	#[error("missing required field `{0}`.")]
	MissingField(&'static str),
	#[error("field `{key}` must be {expected}.")]
	InvalidType { key: &'static str, expected: &'static str },
	#[error("unknown value \"{value}\" for `{key}`.")]
	UnknownValue { key: &'static str, value: String },
	#[error("field `{key}` is not a valid version: {cause}")]
	Version { key: &'static str, cause: VersionError },
	#[error("field `{key}` has invalid version bounds: {cause}")]
	Bounds { key: &'static str, cause: BoundsError },
	#[error("relationship `{key}` is invalid: {cause}")]
	Relationship { key: &'static str, cause: RequirementParseError },
	#[error("install directive {index} is invalid: {reason}")]
	InstallDirective { index: usize, reason: String },
}

/// A problem with a document that didn't stop it from being read.
#[derive(Debug, thiserror::Error)]
pub enum DecodeWarning {
	/// An optional field couldn't be read and was left at its default.
	#[error("ignored `{key}`: {cause}")]
	Ignored { key: &'static str, cause: DecodeError },
	/// A single element of a relationship was dropped.
	#[error("skipped element of `{key}`: {cause}")]
	RequirementSkipped { key: &'static str, cause: RequirementParseError },
	/// A game version couldn't be parsed, the `0.0.0` marker was used in its place.
	#[error("`{key}` value \"{input}\" is not a game version, using 0.0.0: {cause}")]
	GameVersionFallback { key: &'static str, input: String, cause: GameVersionError },
}

/// Collects warnings while reading a single document.
#[derive(Debug, Default)]
pub struct Diagnostics {
	context: String,
	warnings: Vec<DecodeWarning>,
}

impl Diagnostics {
	/// `context` is included in every logged warning, usually the archive path of the document.
	pub fn new(context: impl Into<String>) -> Self {
		Self { context: context.into(), warnings: Vec::new() }
	}

	pub fn warnings(&self) -> &[DecodeWarning] {
		&self.warnings
	}

	pub fn into_warnings(self) -> Vec<DecodeWarning> {
		self.warnings
	}

	pub fn warn(&mut self, warning: DecodeWarning) {
		log::warn!("{}: {}", self.context, warning);
		self.warnings.push(warning);
	}

	/// Turns a non-critical failure into a warning.
	pub fn tolerate<T>(&mut self, key: &'static str, result: Result<T, DecodeError>) -> Option<T> {
		match result {
			Ok(v) => Some(v),
			Err(cause) => {
				self.warn(DecodeWarning::Ignored { key, cause });
				None
			},
		}
	}
}

fn get_string(obj: &Map<String, Value>, key: &'static str) -> Result<Option<String>, DecodeError> {
	match obj.get(key) {
		None | Some(Value::Null) => Ok(None),
		Some(Value::String(s)) => Ok(Some(s.clone())),
		Some(_) => Err(DecodeError::InvalidType { key, expected: "a string" }),
	}
}

fn require_string(obj: &Map<String, Value>, key: &'static str) -> Result<String, DecodeError> {
	get_string(obj, key)?.ok_or(DecodeError::MissingField(key))
}

/// Reads a field which can be either a single string or an array of them.
fn get_one_or_many_string(obj: &Map<String, Value>, key: &'static str) -> Result<Option<Vec<String>>, DecodeError> {
	let invalid = || DecodeError::InvalidType { key, expected: "a string or array of strings" };
	match obj.get(key) {
		None | Some(Value::Null) => Ok(None),
		Some(Value::String(s)) => Ok(Some(vec![s.clone()])),
		Some(Value::Array(arr)) => arr.iter()
			.map(|v| v.as_str().map(|s| s.to_string()).ok_or_else(invalid))
			.collect::<Result<Vec<_>, _>>()
			.map(Some),
		Some(_) => Err(invalid()),
	}
}

fn get_u64(obj: &Map<String, Value>, key: &'static str) -> Result<Option<u64>, DecodeError> {
	match obj.get(key) {
		None | Some(Value::Null) => Ok(None),
		Some(v) => v.as_u64().map(Some).ok_or(DecodeError::InvalidType { key, expected: "a positive integer" }),
	}
}

fn get_bool(obj: &Map<String, Value>, key: &'static str) -> Result<Option<bool>, DecodeError> {
	match obj.get(key) {
		None | Some(Value::Null) => Ok(None),
		Some(v) => v.as_bool().map(Some).ok_or(DecodeError::InvalidType { key, expected: "a boolean" }),
	}
}

/// Reads a `.ckan` document.
pub fn read_release(bytes: &[u8], diagnostics: &mut Diagnostics) -> Result<Release, DecodeError> {
	let value = serde_json::from_slice::<Value>(bytes)?;
	read_release_value(&value, diagnostics)
}

/// Reads an already parsed `.ckan` document.
pub fn read_release_value(value: &Value, diagnostics: &mut Diagnostics) -> Result<Release, DecodeError> {
	let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;

	let spec_version = match obj.get("spec_version") {
		Some(Value::Number(v)) => v.to_string(),
		Some(Value::String(v)) => v.to_owned(),
		Some(_) => return Err(DecodeError::InvalidType { key: "spec_version", expected: "a string or number" }),
		None => return Err(DecodeError::MissingField("spec_version")),
	};

	let package_id = require_string(obj, "identifier")?;
	let version = VersionValue::parse(require_string(obj, "version")?)
		.map_err(|cause| DecodeError::Version { key: "version", cause })?;

	let kind = match get_string(obj, "kind") {
		Ok(Some(s)) => match s.as_str() {
			"package" => Kind::Package,
			"metapackage" => Kind::MetaPackage,
			"dlc" => Kind::DLC,
			_ => diagnostics.tolerate("kind", Err(DecodeError::UnknownValue { key: "kind", value: s.clone() })).unwrap_or_default(),
		},
		Ok(None) => Kind::Package,
		Err(e) => diagnostics.tolerate("kind", Err(e)).unwrap_or_default(),
	};

	let download = match kind {
		Kind::Package => Some(require_string(obj, "download")?),
		Kind::MetaPackage | Kind::DLC => diagnostics.tolerate("download", get_string(obj, "download")).flatten(),
	};

	let release_status = match get_string(obj, "release_status") {
		Ok(Some(s)) => match s.as_str() {
			"stable" => ReleaseStatus::Stable,
			"testing" => ReleaseStatus::Testing,
			"development" => ReleaseStatus::Development,
			_ => diagnostics.tolerate("release_status", Err(DecodeError::UnknownValue { key: "release_status", value: s.clone() })).unwrap_or_default(),
		},
		Ok(None) => ReleaseStatus::Stable,
		Err(e) => diagnostics.tolerate("release_status", Err(e)).unwrap_or_default(),
	};

	let install = match obj.get("install") {
		Some(v) => Some(read_install_directives(v)?),
		None => None,
	};

	let game_version = {
		let explicit = read_game_version(obj, "ksp_version", diagnostics);
		let min = read_game_version(obj, "ksp_version_min", diagnostics);
		let max = read_game_version(obj, "ksp_version_max", diagnostics);
		let bounds = GameVersionBounds::from_parsed(explicit, min, max)
			.map_err(|cause| DecodeError::Bounds { key: "ksp_version", cause });
		diagnostics.tolerate("ksp_version", bounds).unwrap_or_default()
	};

	let download_hash = match obj.get("download_hash") {
		Some(Value::Object(hash)) => DownloadHash {
			sha1: diagnostics.tolerate("download_hash", get_string(hash, "sha1")).flatten(),
			sha256: diagnostics.tolerate("download_hash", get_string(hash, "sha256")).flatten(),
		},
		None | Some(Value::Null) => DownloadHash::default(),
		Some(_) => diagnostics.tolerate("download_hash", Err(DecodeError::InvalidType { key: "download_hash", expected: "an object" })).unwrap_or_default(),
	};

	let mut relationships = RelationshipKind::ALL.map(|kind| read_relationship(obj, kind.key(), diagnostics)).into_iter();

	Ok(Release {
		spec_version,
		package_id,
		version,
		name: require_string(obj, "name")?,
		blurb: require_string(obj, "abstract")?,
		licenses: get_one_or_many_string(obj, "license")?.ok_or(DecodeError::MissingField("license"))?,
		download,

		/* Optionals */
		authors: diagnostics.tolerate("author", get_one_or_many_string(obj, "author")).flatten().unwrap_or_default(),
		description: diagnostics.tolerate("description", get_string(obj, "description")).flatten(),
		install,
		release_status,
		game_version,
		game_version_strict: diagnostics.tolerate("ksp_version_strict", get_bool(obj, "ksp_version_strict")).flatten().unwrap_or(false),
		tags: diagnostics.tolerate("tags", get_one_or_many_string(obj, "tags")).flatten().unwrap_or_default(),
		localizations: diagnostics.tolerate("localizations", get_one_or_many_string(obj, "localizations")).flatten().unwrap_or_default(),
		download_size: diagnostics.tolerate("download_size", get_u64(obj, "download_size")).flatten(),
		download_hash,
		download_content_type: diagnostics.tolerate("download_content_type", get_string(obj, "download_content_type")).flatten(),
		/* Same order as `RelationshipKind::ALL` */
		depends: relationships.next().flatten(),
		recommends: relationships.next().flatten(),
		suggests: relationships.next().flatten(),
		supports: relationships.next().flatten(),
		conflicts: relationships.next().flatten(),
		replaced_by: match obj.get("replaced-by") {
			None | Some(Value::Null) => None,
			Some(Value::Object(o)) => diagnostics.tolerate("replaced-by", RequirementLeaf::from_json(o)
				.map_err(|cause| DecodeError::Relationship { key: "replaced-by", cause })),
			Some(_) => diagnostics.tolerate("replaced-by", Err(DecodeError::InvalidType { key: "replaced-by", expected: "an object" })),
		},
		kind,
		provides: diagnostics.tolerate("provides", get_one_or_many_string(obj, "provides")).flatten().unwrap_or_default(),
		resources: match obj.get("resources") {
			None | Some(Value::Null) => BTreeMap::new(),
			/* Non-string resources exist in the wild (`x_` extensions), they're of no use to us */
			Some(Value::Object(o)) => o.iter().filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string()))).collect(),
			Some(_) => diagnostics.tolerate("resources", Err(DecodeError::InvalidType { key: "resources", expected: "an object" })).unwrap_or_default(),
		},
	})
}

/// Reads a single game version field, absent and `"any"` both being `None`.
fn read_game_version(obj: &Map<String, Value>, key: &'static str, diagnostics: &mut Diagnostics) -> Option<GameVersion> {
	let s = diagnostics.tolerate(key, get_string(obj, key)).flatten()?;
	if s.eq_ignore_ascii_case("any") {
		return None
	}
	match GameVersion::new(&s) {
		Ok(v) => Some(v),
		Err(cause) => {
			diagnostics.warn(DecodeWarning::GameVersionFallback { key, input: s, cause });
			Some(GameVersion::marker())
		},
	}
}

fn read_relationship(obj: &Map<String, Value>, key: &'static str, diagnostics: &mut Diagnostics) -> Option<RequirementExpr> {
	let value = obj.get(key)?;
	let mut skipped = Vec::<RequirementParseError>::new();
	let expr = RequirementExpr::from_json(value, &mut skipped)
		.map_err(|cause| DecodeError::Relationship { key, cause });
	for cause in skipped {
		diagnostics.warn(DecodeWarning::RequirementSkipped { key, cause });
	}
	diagnostics.tolerate(key, expr).flatten()
}

/// Reads an `install` array.
///
/// # Errors
/// Any malformed directive fails the whole array, installing with some directives missing would leave a broken install.
pub fn read_install_directives(v: &Value) -> Result<Vec<InstallDirective>, DecodeError> {
	let arr = v.as_array().ok_or(DecodeError::InvalidType { key: "install", expected: "an array" })?;
	let mut directives = Vec::<InstallDirective>::new();

	for (index, elem) in arr.iter().enumerate() {
		let invalid = |reason: &str| DecodeError::InstallDirective { index, reason: reason.to_string() };
		let obj = elem.as_object().ok_or_else(|| invalid("array elements must be objects"))?;

		/* Turns field type errors into errors about this directive */
		let string = |key: &'static str| get_string(obj, key).map_err(|e| invalid(&e.to_string()));
		let strings = |key: &'static str| get_one_or_many_string(obj, key).map_err(|e| invalid(&e.to_string()));

		let source = match (string("file")?, string("find")?, string("find_regexp")?) {
			(Some(f), None, None) => SourceDirective::AbsolutePath(f),
			(None, Some(f), None) => SourceDirective::TopMostMatch(f),
			(None, None, Some(f)) => SourceDirective::TopMostMatchByRegex(f),
			(None, None, None) => return Err(invalid("install has no valid source directive")),
			_ => return Err(invalid("file, find and find_regexp are mutually exclusive")),
		};

		let mut directive = InstallDirective::new(
			source,
			string("install_to")?.ok_or_else(|| invalid("install has no destination directive"))?,
		);
		directive.rename = string("as")?;
		directive.exclude_names = strings("filter")?;
		directive.exclude_by_regex = strings("filter_regexp")?;
		directive.include_only_names = strings("include_only")?;
		directive.include_only_by_regex = strings("include_only_regexp")?;
		directive.source_matches_files = get_bool(obj, "find_matches_files").map_err(|e| invalid(&e.to_string()))?;

		directives.push(directive);
	}

	Ok(directives)
}
