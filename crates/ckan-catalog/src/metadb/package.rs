//! Various types associated with packages.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

/* CKAN */

/// One published version of a package, read from a `.ckan` file.
///
/// Identified by `package_id` and `version`, the remaining fields don't take part in Eq, Ord or Hash.
/* NOTE: We don't use serde's deserialize to import the .ckan files because it's way to involved and limited. use `import::read_release` instead. */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
	/* Required Fields */
	pub spec_version: String,
	/// `identifier`
	pub package_id: String,
	pub version: VersionValue,
	pub name: String,
	/// Rust friendly alias for `abstract`.
	pub blurb: String,
	/* one or many */
	pub licenses: Vec<String>,
	/* Required when `kind` is not `"metapackage"` or `"dlc"` */
	pub download: Option<String>,

	/* Optional Fields */
	/* one or many */
	pub authors: Vec<String>,
	pub description: Option<String>,
	/// `None` when the document has no `install` section, see [`crate::installation::resolve_install()`].
	pub install: Option<Vec<InstallDirective>>,
	pub release_status: ReleaseStatus,
	pub game_version: GameVersionBounds,
	pub game_version_strict: bool,
	pub tags: Vec<String>,
	pub localizations: Vec<String>,
	pub download_size: Option<u64>, /* *Really* Don't use anything lower than 64 here, 32 is only 4gb max size */
	pub download_hash: DownloadHash,
	pub download_content_type: Option<String>,
	pub depends: Option<RequirementExpr>,
	pub recommends: Option<RequirementExpr>,
	pub suggests: Option<RequirementExpr>,
	pub supports: Option<RequirementExpr>,
	pub conflicts: Option<RequirementExpr>,
	pub replaced_by: Option<RequirementLeaf>,
	pub kind: Kind,
	pub provides: Vec<String>,
	pub resources: BTreeMap<String, String>,
}

impl std::hash::Hash for Release {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		self.package_id.hash(state);
		self.version.hash(state);
	}
}

impl std::cmp::Ord for Release {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.package_id.cmp(&other.package_id)
			.then_with(|| self.version.cmp(&other.version))
	}
}

impl std::cmp::PartialOrd for Release {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl std::cmp::PartialEq for Release {
	fn eq(&self, other: &Self) -> bool {
		self.package_id == other.package_id &&
		self.version == other.version
	}
}

impl std::cmp::Eq for Release {}

impl std::fmt::Display for Release {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} {}", self.package_id, self.version.original().unwrap_or_default())
	}
}

impl Release {
	/// Creates a release with only the required fields set.
	pub fn new(package_id: impl Into<String>, version: VersionValue) -> Self {
		let package_id = package_id.into();
		Self {
			spec_version: "v1.4".to_string(),
			name: package_id.clone(),
			package_id,
			version,
			blurb: String::new(),
			licenses: Vec::new(),
			download: None,
			authors: Vec::new(),
			description: None,
			install: None,
			release_status: Default::default(),
			game_version: Default::default(),
			game_version_strict: false,
			tags: Vec::new(),
			localizations: Vec::new(),
			download_size: None,
			download_hash: Default::default(),
			download_content_type: None,
			depends: None,
			recommends: None,
			suggests: None,
			supports: None,
			conflicts: None,
			replaced_by: None,
			kind: Default::default(),
			provides: Vec::new(),
			resources: BTreeMap::new(),
		}
	}

	/// Gets one of the five relationship fields.
	pub fn relationship(&self, kind: RelationshipKind) -> Option<&RequirementExpr> {
		match kind {
			RelationshipKind::Depends => self.depends.as_ref(),
			RelationshipKind::Recommends => self.recommends.as_ref(),
			RelationshipKind::Suggests => self.suggests.as_ref(),
			RelationshipKind::Supports => self.supports.as_ref(),
			RelationshipKind::Conflicts => self.conflicts.as_ref(),
		}
	}

	/// Checks if the release can be installed into a game of the given version.
	pub fn is_compatible_with(&self, game_version: &GameVersion) -> bool {
		self.game_version.is_version_compatible(game_version, self.game_version_strict)
	}

	/// Checks if either release declares a conflict the other one meets.
	pub fn conflicts_with(&self, other: &Self) -> bool {
		fn declares(lhs: &Release, rhs: &Release) -> bool {
			lhs.relationship(RelationshipKind::Conflicts).map_or(false, |c| c.leaves().any(|leaf| leaf.is_satisfied_by(rhs)))
		}
		declares(self, other) || declares(other, self)
	}

	/// Metapackages and DLC have no content to install.
	pub fn is_installable(&self) -> bool {
		self.kind == Kind::Package
	}
}

/// Checksums of the release's download, hex encoded as found in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadHash {
	pub sha1: Option<String>,
	pub sha256: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
	Depends,
	Recommends,
	Suggests,
	Supports,
	Conflicts,
}

impl RelationshipKind {
	pub const ALL: [RelationshipKind; 5] = [Self::Depends, Self::Recommends, Self::Suggests, Self::Supports, Self::Conflicts];

	/// The key used in `.ckan` documents.
	pub fn key(&self) -> &'static str {
		match self {
			Self::Depends => "depends",
			Self::Recommends => "recommends",
			Self::Suggests => "suggests",
			Self::Supports => "supports",
			Self::Conflicts => "conflicts",
		}
	}
}

/* CKAN Types */

pub mod version;
pub use version::VersionValue;
pub use version::VersionError;

mod version_bounds;
pub use version_bounds::VersionBounds;
pub use version_bounds::VersionRange;
pub use version_bounds::BoundsError;

mod game_version;
pub use game_version::GameVersion;
pub use game_version::GameVersionBounds;
pub use game_version::GameVersionError;

pub mod requirement;
pub use requirement::RequirementExpr;
pub use requirement::RequirementLeaf;
pub use requirement::RequirementParseError;

pub mod install;
pub use install::InstallDirective;
pub use install::SourceDirective;

pub mod import;

/// The stability of a package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReleaseStatus {
	#[default] Stable,
	Testing,
	Development,
}

/// The type of a package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
	/// A normal installable module.
	#[default] Package,
	/// A distributable .ckan file that has relationships to other mods while having no download of its own.
	MetaPackage,
	/// A paid expansion, which can be detected but not installed. Also has no download.
	DLC,
}
