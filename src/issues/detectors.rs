//! Detector functions, one per issue kind.
//!
//! Node checks inspect a single node through a [`TreeView`] and append any
//! findings. Type-change checks only look at the old and new type tags.

use std::collections::HashSet;

use super::{Issue, IssueKind};
use crate::tree::{build_chain, Entry, NodeId, TreeView, TypeTag};

/// Signature of readable and report detectors.
pub type NodeCheck = fn(&dyn TreeView, NodeId, &mut Vec<Issue>);

/// Signature of type-change predicates.
pub type TypeChangeCheck = fn(TypeTag, TypeTag) -> bool;

pub fn key_injection(tree: &dyn TreeView, node: NodeId, out: &mut Vec<Issue>) {
    let mut chain = None;
    for key in tree.own_keys(node) {
        if let Some(Entry::Raw(value)) = tree.entry(node, &key) {
            let parent_chain = chain.get_or_insert_with(|| build_chain(tree, node));
            out.push(Issue::new(
                IssueKind::KeyInjection,
                parent_chain.child(key.clone()),
                node,
                format!(
                    "Found non-node {} value under key: {}",
                    value.type_tag(),
                    key
                ),
            ));
        }
    }
}

pub fn key_mismatch(tree: &dyn TreeView, node: NodeId, out: &mut Vec<Issue>) {
    let Some(parent) = tree.parent(node) else {
        return;
    };
    let Some(key) = tree.own_key(node) else {
        out.push(Issue::new(
            IssueKind::KeyMismatch,
            build_chain(tree, node),
            node,
            format!("Node has parent {} but no key of its own", parent),
        ));
        return;
    };

    let description = match tree.entry(parent, &key) {
        Some(Entry::Node(held)) => match tree.own_key(held) {
            Some(held_key) if held_key == key => return,
            Some(held_key) => format!(
                "Key \"{}\" does not match key from parent: {}",
                held_key, key
            ),
            None => format!("Node held by parent under key {} has no key of its own", key),
        },
        Some(Entry::Raw(_)) => format!("Parent holds a non-node value under key: {}", key),
        None => format!("Parent has no entry under key: {}", key),
    };

    out.push(Issue::new(
        IssueKind::KeyMismatch,
        build_chain(tree, node),
        node,
        description,
    ));
}

pub fn undefined_node_not_on_array_parent(tree: &dyn TreeView, node: NodeId, out: &mut Vec<Issue>) {
    if tree.runtime_type(node) != TypeTag::Undefined {
        return;
    }
    let Some(parent) = tree.parent(node) else {
        return;
    };
    let parent_type = tree.runtime_type(parent);
    if parent_type != TypeTag::Array {
        out.push(Issue::new(
            IssueKind::UndefinedNodeNotOnArrayParent,
            build_chain(tree, node),
            node,
            format!("Undefined node found on {} parent", parent_type),
        ));
    }
}

pub fn value_type_mismatch(tree: &dyn TreeView, node: NodeId, out: &mut Vec<Issue>) {
    let declared = tree.runtime_type(node);
    let actual = tree.value_type(node);
    if declared != actual {
        out.push(Issue::new(
            IssueKind::ValueTypeMismatch,
            build_chain(tree, node),
            node,
            format!("Node declares type {} but holds a {} value", declared, actual),
        ));
    }
}

pub fn parent_not_object_or_array(tree: &dyn TreeView, node: NodeId, out: &mut Vec<Issue>) {
    let Some(parent) = tree.parent(node) else {
        return;
    };
    let parent_type = tree.runtime_type(parent);
    if !parent_type.is_composite() {
        out.push(Issue::new(
            IssueKind::ParentNotObjectOrArray,
            build_chain(tree, node),
            node,
            format!("Parent is of type {}, not object or array", parent_type),
        ));
    }
}

pub fn root_mismatch(tree: &dyn TreeView, node: NodeId, out: &mut Vec<Issue>) {
    let mut top = node;
    let mut seen = HashSet::from([node]);
    while let Some(parent) = tree.parent(top) {
        if !seen.insert(parent) {
            break;
        }
        top = parent;
    }

    let recorded = tree.root(node);
    if recorded != top {
        out.push(Issue::new(
            IssueKind::RootMismatch,
            build_chain(tree, node),
            node,
            format!("Node records root {} but its topmost ancestor is {}", recorded, top),
        ));
    }
}

pub fn primitive_to_primitive(old: TypeTag, new: TypeTag) -> bool {
    old != new && old.is_primitive() && new.is_primitive()
}

pub fn primitive_to_object(old: TypeTag, new: TypeTag) -> bool {
    old.is_primitive() && new == TypeTag::Object
}

pub fn primitive_to_array(old: TypeTag, new: TypeTag) -> bool {
    old.is_primitive() && new == TypeTag::Array
}

pub fn primitive_to_null(old: TypeTag, new: TypeTag) -> bool {
    old.is_primitive() && new == TypeTag::Null
}
