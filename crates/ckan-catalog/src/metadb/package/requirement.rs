//! Relationships between packages.
//!
//! A relationship field (`depends`, `conflicts`, ...) is a boolean expression over package descriptors.
//! The expression is stored as a flat arena of [`RequirementNode`]s referring to each other by [`NodeIndex`].
//!
//! # JSON Shape
//!
//! ```json
//! [
//! 	{ "name": "ModuleManager", "min_version": "4.0" },
//! 	{ "any_of": [ { "name": "Kopernicus" }, [ { "name": "A" }, { "name": "B" } ] ] }
//! ]
//! ```
//!
//! The top level array and any nested arrays are "all of", `any_of` objects are "any of".
//!
//! A group with a single member is never stored, the member takes its place.

use serde::{Serialize, Deserialize};
use serde_json::{Value, Map};

use super::version_bounds::{VersionRange, BoundsError};
use super::Release;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequirementParseError {
	#[error("relationship must be an array.")]
	NotAnArray,
	#[error("relationship element must be an object or array.")]
	InvalidElement,
	#[error("relationship has no name field.")]
	MissingName,
	#[error("relationship field `{0}` must be a string.")]
	NotAString(&'static str),
	#[error("any_of constraint must be an array.")]
	AnyOfNotArray,
	#[error("relationship group has no valid members.")]
	EmptyGroup,
	#[error("relationship version is invalid: {0}")]
	Bounds(#[from] BoundsError),
}

/// Describes a package using an identifier and version range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequirementLeaf {
	pub package_id: String,
	pub range: VersionRange,
}

impl RequirementLeaf {
	pub fn new(package_id: impl Into<String>, range: VersionRange) -> Self {
		Self { package_id: package_id.into(), range }
	}

	/// Reads a single descriptor object.
	///
	/// It is an error to use `version` with either `min_version` or `max_version`.
	pub fn from_json(obj: &Map<String, Value>) -> Result<Self, RequirementParseError> {
		fn get_str<'a>(obj: &'a Map<String, Value>, key: &'static str) -> Result<Option<&'a str>, RequirementParseError> {
			match obj.get(key) {
				None | Some(Value::Null) => Ok(None),
				Some(Value::String(s)) => Ok(Some(s)),
				Some(_) => Err(RequirementParseError::NotAString(key)),
			}
		}

		let package_id = get_str(obj, "name")?.ok_or(RequirementParseError::MissingName)?;
		let range = VersionRange::from_fields(
			get_str(obj, "version")?,
			get_str(obj, "min_version")?,
			get_str(obj, "max_version")?,
		)?;
		Ok(Self::new(package_id, range))
	}

	pub fn to_json(&self) -> Value {
		let mut obj = Map::new();
		obj.insert("name".into(), Value::String(self.package_id.clone()));
		if self.range.is_exact() {
			if let Some(v) = self.range.min().original() {
				obj.insert("version".into(), Value::String(v.to_string()));
			}
		} else {
			if let Some(v) = self.range.min().original() {
				obj.insert("min_version".into(), Value::String(v.to_string()));
			}
			if let Some(v) = self.range.max().original() {
				obj.insert("max_version".into(), Value::String(v.to_string()));
			}
		}
		Value::Object(obj)
	}

	/// Checks if a release meets this descriptor, either by identifier or through `provides`.
	pub fn is_satisfied_by(&self, release: &Release) -> bool {
		if release.package_id != self.package_id && !release.provides.contains(&self.package_id) {
			return false
		}
		self.range.contains(&release.version)
	}
}

impl std::fmt::Display for RequirementLeaf {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} ∈ {}", self.package_id, self.range)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeIndex(usize);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequirementNode {
	Leaf(RequirementLeaf),
	/// At least one member must be met.
	AnyOf(Vec<NodeIndex>),
	/// Every member must be met.
	AllOf(Vec<NodeIndex>),
}

/// A boolean expression of package requirements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementExpr {
	nodes: Vec<RequirementNode>,
	root: NodeIndex,
}

impl RequirementExpr {
	pub fn leaf(leaf: RequirementLeaf) -> Self {
		Self { nodes: vec![RequirementNode::Leaf(leaf)], root: NodeIndex(0) }
	}

	/// Combines expressions into an "any of" group, `None` when `members` is empty.
	pub fn any_of(members: impl IntoIterator<Item = RequirementExpr>) -> Option<Self> {
		Self::combine(members, RequirementNode::AnyOf)
	}

	/// Combines expressions into an "all of" group, `None` when `members` is empty.
	pub fn all_of(members: impl IntoIterator<Item = RequirementExpr>) -> Option<Self> {
		Self::combine(members, RequirementNode::AllOf)
	}

	fn combine(members: impl IntoIterator<Item = RequirementExpr>, group: fn(Vec<NodeIndex>) -> RequirementNode) -> Option<Self> {
		let mut nodes = Vec::<RequirementNode>::new();
		let mut roots = Vec::<NodeIndex>::new();
		for member in members {
			let offset = nodes.len();
			nodes.extend(member.nodes.into_iter().map(|n| match n {
				RequirementNode::Leaf(l) => RequirementNode::Leaf(l),
				RequirementNode::AnyOf(m) => RequirementNode::AnyOf(m.into_iter().map(|i| NodeIndex(i.0 + offset)).collect()),
				RequirementNode::AllOf(m) => RequirementNode::AllOf(m.into_iter().map(|i| NodeIndex(i.0 + offset)).collect()),
			}));
			roots.push(NodeIndex(member.root.0 + offset));
		}
		let root = close_group(&mut nodes, roots, group)?;
		Some(Self { nodes, root })
	}

	/// Reads a relationship array.
	///
	/// Elements that can't be read are skipped, logged and pushed to `skipped`.
	///
	/// # Returns
	/// `None` when no element could be read, including an empty array.
	///
	/// # Errors
	/// [`RequirementParseError::NotAnArray`] when `value` is not an array.
	pub fn from_json(value: &Value, skipped: &mut Vec<RequirementParseError>) -> Result<Option<Self>, RequirementParseError> {
		let elements = value.as_array().ok_or(RequirementParseError::NotAnArray)?;
		let mut nodes = Vec::<RequirementNode>::new();
		let root = parse_group(elements, RequirementNode::AllOf, &mut nodes, skipped);
		Ok(root.map(|root| Self { nodes, root }))
	}

	/// Writes the expression back out as a relationship array.
	pub fn to_json(&self) -> Value {
		match self.node(self.root) {
			/* The top level array is itself the "all of" group */
			RequirementNode::AllOf(members) => Value::Array(members.iter().map(|m| self.node_to_json(*m)).collect()),
			_ => Value::Array(vec![self.node_to_json(self.root)]),
		}
	}

	fn node_to_json(&self, index: NodeIndex) -> Value {
		match self.node(index) {
			RequirementNode::Leaf(leaf) => leaf.to_json(),
			RequirementNode::AnyOf(members) => serde_json::json!({
				"any_of": members.iter().map(|m| self.node_to_json(*m)).collect::<Vec<_>>()
			}),
			RequirementNode::AllOf(members) => Value::Array(members.iter().map(|m| self.node_to_json(*m)).collect()),
		}
	}

	pub fn root(&self) -> NodeIndex {
		self.root
	}

	pub fn node(&self, index: NodeIndex) -> &RequirementNode {
		&self.nodes[index.0]
	}

	pub fn nodes(&self) -> &[RequirementNode] {
		&self.nodes
	}

	/// Every descriptor in the expression.
	pub fn leaves(&self) -> impl Iterator<Item = &RequirementLeaf> {
		self.nodes.iter().filter_map(|n| match n {
			RequirementNode::Leaf(l) => Some(l),
			_ => None,
		})
	}

	/// Evaluates the expression with `pred` deciding each descriptor.
	pub fn evaluate(&self, pred: impl Fn(&RequirementLeaf) -> bool) -> bool {
		self.evaluate_node(self.root, &pred)
	}

	fn evaluate_node(&self, index: NodeIndex, pred: &impl Fn(&RequirementLeaf) -> bool) -> bool {
		match self.node(index) {
			RequirementNode::Leaf(leaf) => pred(leaf),
			RequirementNode::AnyOf(members) => members.iter().any(|m| self.evaluate_node(*m, pred)),
			RequirementNode::AllOf(members) => members.iter().all(|m| self.evaluate_node(*m, pred)),
		}
	}

	fn fmt_node(&self, index: NodeIndex, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let (members, separator) = match self.node(index) {
			RequirementNode::Leaf(leaf) => return write!(f, "{}", leaf),
			RequirementNode::AnyOf(members) => (members, " ∨ "),
			RequirementNode::AllOf(members) => (members, " ∧ "),
		};
		write!(f, "(")?;
		for (i, m) in members.iter().enumerate() {
			if i > 0 {
				write!(f, "{}", separator)?;
			}
			self.fmt_node(*m, f)?;
		}
		write!(f, ")")
	}
}

impl std::fmt::Display for RequirementExpr {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.fmt_node(self.root, f)
	}
}

/// Pushes a group node for `members`, hoisting a lone member instead of wrapping it.
fn close_group(nodes: &mut Vec<RequirementNode>, mut members: Vec<NodeIndex>, group: fn(Vec<NodeIndex>) -> RequirementNode) -> Option<NodeIndex> {
	match members.len() {
		0 => None,
		1 => members.pop(),
		_ => {
			nodes.push(group(members));
			Some(NodeIndex(nodes.len() - 1))
		},
	}
}

fn parse_group(elements: &[Value], group: fn(Vec<NodeIndex>) -> RequirementNode, nodes: &mut Vec<RequirementNode>, skipped: &mut Vec<RequirementParseError>) -> Option<NodeIndex> {
	let mut members = Vec::<NodeIndex>::new();
	for (i, element) in elements.iter().enumerate() {
		match parse_element(element, nodes, skipped) {
			Ok(index) => members.push(index),
			Err(e) => {
				log::debug!("Skipping relationship element {}: {}", i, e);
				skipped.push(e);
			},
		}
	}
	close_group(nodes, members, group)
}

fn parse_element(element: &Value, nodes: &mut Vec<RequirementNode>, skipped: &mut Vec<RequirementParseError>) -> Result<NodeIndex, RequirementParseError> {
	match element {
		Value::Array(elements) => {
			parse_group(elements, RequirementNode::AllOf, nodes, skipped).ok_or(RequirementParseError::EmptyGroup)
		},
		Value::Object(obj) => {
			if let Some(any_of) = obj.get("any_of") {
				let elements = any_of.as_array().ok_or(RequirementParseError::AnyOfNotArray)?;
				parse_group(elements, RequirementNode::AnyOf, nodes, skipped).ok_or(RequirementParseError::EmptyGroup)
			} else {
				nodes.push(RequirementNode::Leaf(RequirementLeaf::from_json(obj)?));
				Ok(NodeIndex(nodes.len() - 1))
			}
		},
		_ => Err(RequirementParseError::InvalidElement),
	}
}
