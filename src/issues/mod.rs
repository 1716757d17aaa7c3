//! Issue taxonomy.
//!
//! Every [`IssueKind`] belongs to one [`DetectionFamily`], which decides how
//! it may be configured:
//! - `TypeChange` kinds run only when a root reports a type change
//! - `Readable` kinds run either on every mutation or during a sweep
//! - `Report` kinds run only during a sweep
//!
//! The detectors themselves live in [`detectors`]; [`IssueKind::node_check`]
//! and [`IssueKind::type_change_check`] are the single dispatch point.

pub mod detectors;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::SweeperError;
use crate::tree::{Chain, NodeId};

pub use detectors::{NodeCheck, TypeChangeCheck};

/// How an issue kind can be detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DetectionFamily {
    TypeChange,
    Readable,
    Report,
}

impl DetectionFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionFamily::TypeChange => "typeChange",
            DetectionFamily::Readable => "readable",
            DetectionFamily::Report => "report",
        }
    }
}

impl std::fmt::Display for DetectionFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The catalog of detectable problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueKind {
    /// A node holds a value under one of its keys that is not itself a node.
    KeyInjection,
    /// A node's own key disagrees with where its parent keeps it.
    KeyMismatch,
    /// An undefined node whose parent is not an array.
    UndefinedNodeNotOnArrayParent,
    /// A node's type tag differs from the type of its unwrapped value.
    ValueTypeMismatch,
    /// A node whose parent is neither an object nor an array.
    ParentNotObjectOrArray,
    /// A node whose recorded root is not its topmost ancestor.
    RootMismatch,
    PrimitiveToPrimitive,
    PrimitiveToObject,
    PrimitiveToArray,
    PrimitiveToNull,
}

impl IssueKind {
    pub const ALL: [IssueKind; 10] = [
        IssueKind::KeyInjection,
        IssueKind::KeyMismatch,
        IssueKind::UndefinedNodeNotOnArrayParent,
        IssueKind::ValueTypeMismatch,
        IssueKind::ParentNotObjectOrArray,
        IssueKind::RootMismatch,
        IssueKind::PrimitiveToPrimitive,
        IssueKind::PrimitiveToObject,
        IssueKind::PrimitiveToArray,
        IssueKind::PrimitiveToNull,
    ];

    pub fn family(self) -> DetectionFamily {
        match self {
            IssueKind::KeyInjection
            | IssueKind::KeyMismatch
            | IssueKind::UndefinedNodeNotOnArrayParent
            | IssueKind::ValueTypeMismatch
            | IssueKind::ParentNotObjectOrArray => DetectionFamily::Readable,
            IssueKind::RootMismatch => DetectionFamily::Report,
            IssueKind::PrimitiveToPrimitive
            | IssueKind::PrimitiveToObject
            | IssueKind::PrimitiveToArray
            | IssueKind::PrimitiveToNull => DetectionFamily::TypeChange,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IssueKind::KeyInjection => "keyInjection",
            IssueKind::KeyMismatch => "keyMismatch",
            IssueKind::UndefinedNodeNotOnArrayParent => "undefinedNodeNotOnArrayParent",
            IssueKind::ValueTypeMismatch => "valueTypeMismatch",
            IssueKind::ParentNotObjectOrArray => "parentNotObjectOrArray",
            IssueKind::RootMismatch => "rootMismatch",
            IssueKind::PrimitiveToPrimitive => "primitiveToPrimitive",
            IssueKind::PrimitiveToObject => "primitiveToObject",
            IssueKind::PrimitiveToArray => "primitiveToArray",
            IssueKind::PrimitiveToNull => "primitiveToNull",
        }
    }

    /// One-line summary used by listings.
    pub fn summary(self) -> &'static str {
        match self {
            IssueKind::KeyInjection => "every child of a node must itself be a node",
            IssueKind::KeyMismatch => "a node's own key must match its position in the parent",
            IssueKind::UndefinedNodeNotOnArrayParent => {
                "undefined nodes may only appear as array elements"
            }
            IssueKind::ValueTypeMismatch => {
                "a node's type tag must match the type of its unwrapped value"
            }
            IssueKind::ParentNotObjectOrArray => "only objects and arrays may have children",
            IssueKind::RootMismatch => "a node's recorded root must be its topmost ancestor",
            IssueKind::PrimitiveToPrimitive => "a primitive changed into another primitive type",
            IssueKind::PrimitiveToObject => "a primitive was replaced by an object",
            IssueKind::PrimitiveToArray => "a primitive was replaced by an array",
            IssueKind::PrimitiveToNull => "a primitive was replaced by null",
        }
    }

    /// Detector for readable and report kinds.
    pub fn node_check(self) -> Option<NodeCheck> {
        match self {
            IssueKind::KeyInjection => Some(detectors::key_injection),
            IssueKind::KeyMismatch => Some(detectors::key_mismatch),
            IssueKind::UndefinedNodeNotOnArrayParent => {
                Some(detectors::undefined_node_not_on_array_parent)
            }
            IssueKind::ValueTypeMismatch => Some(detectors::value_type_mismatch),
            IssueKind::ParentNotObjectOrArray => Some(detectors::parent_not_object_or_array),
            IssueKind::RootMismatch => Some(detectors::root_mismatch),
            _ => None,
        }
    }

    /// Predicate for type-change kinds.
    pub fn type_change_check(self) -> Option<TypeChangeCheck> {
        match self {
            IssueKind::PrimitiveToPrimitive => Some(detectors::primitive_to_primitive),
            IssueKind::PrimitiveToObject => Some(detectors::primitive_to_object),
            IssueKind::PrimitiveToArray => Some(detectors::primitive_to_array),
            IssueKind::PrimitiveToNull => Some(detectors::primitive_to_null),
            _ => None,
        }
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IssueKind {
    type Err = SweeperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IssueKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| SweeperError::UnknownIssueKind(s.to_string()))
    }
}

/// A problem found in an observed tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    /// Key path from the root to where the problem was found.
    pub chain: Chain,
    pub description: String,
    /// The node the detector ran against.
    pub node: NodeId,
}

impl Issue {
    pub fn new(kind: IssueKind, chain: Chain, node: NodeId, description: impl Into<String>) -> Self {
        Self {
            kind,
            chain,
            description: description.into(),
            node,
        }
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.chain, self.description)
    }
}
