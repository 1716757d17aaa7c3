//! The reactive tree interface consumed by the sweeper.
//!
//! The sweeper never owns or mutates trees. It needs a read view of a forest
//! of nodes ([`TreeView`]) and, on roots, the ability to register and remove
//! listeners for two notification categories ([`ReactiveForest`]).
//!
//! Nodes are addressed by [`NodeId`], an index into the forest, so walking
//! parents or children never holds references into the tree.
//!
//! [`memory::MemoryForest`] is an in-process implementation of the interface.

pub mod memory;
mod value;

pub use memory::MemoryForest;
pub use value::{TypeTag, Value};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Identity of a node inside a forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Position of a node inside its parent: a mapping name or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Index(usize),
    Name(String),
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Index(i) => write!(f, "{}", i),
            Key::Name(name) => f.write_str(name),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

/// What a node holds under one of its own keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// A wrapped child node.
    Node(NodeId),
    /// A plain value that was never wrapped.
    Raw(Value),
}

impl Entry {
    /// True when the entry is itself a tree node.
    pub fn is_node(&self) -> bool {
        matches!(self, Entry::Node(_))
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Entry::Node(id) => Some(*id),
            Entry::Raw(_) => None,
        }
    }
}

/// Ordered key path from a root down to a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Chain(pub Vec<Key>);

impl Chain {
    pub fn keys(&self) -> &[Key] {
        &self.0
    }

    pub fn last(&self) -> Option<&Key> {
        self.0.last()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a new chain extended by `key`.
    pub fn child(&self, key: Key) -> Chain {
        let mut keys = self.0.clone();
        keys.push(key);
        Chain(keys)
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_root() {
            return f.write_str("<root>");
        }
        for (i, key) in self.0.iter().enumerate() {
            match key {
                Key::Index(idx) => write!(f, "[{}]", idx)?,
                Key::Name(name) if i == 0 => f.write_str(name)?,
                Key::Name(name) => write!(f, ".{}", name)?,
            }
        }
        Ok(())
    }
}

impl<K: Into<Key>> FromIterator<K> for Chain {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Chain(iter.into_iter().map(Into::into).collect())
    }
}

/// Notification categories a root can be subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventCategory {
    /// A node's runtime type changed.
    TypeChange,
    /// Any mutation occurred.
    Readable,
}

impl EventCategory {
    pub const ALL: [EventCategory; 2] = [EventCategory::TypeChange, EventCategory::Readable];
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::TypeChange => write!(f, "typeChange"),
            EventCategory::Readable => write!(f, "readable"),
        }
    }
}

/// A change notification delivered to listeners on a root.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeEvent {
    TypeChanged {
        node: NodeId,
        old: TypeTag,
        new: TypeTag,
    },
    Readable {
        /// Monotonic change marker.
        dirty_at: u64,
        node: NodeId,
    },
}

impl TreeEvent {
    pub fn category(&self) -> EventCategory {
        match self {
            TreeEvent::TypeChanged { .. } => EventCategory::TypeChange,
            TreeEvent::Readable { .. } => EventCategory::Readable,
        }
    }

    pub fn node(&self) -> NodeId {
        match self {
            TreeEvent::TypeChanged { node, .. } | TreeEvent::Readable { node, .. } => *node,
        }
    }
}

/// Handle returned by [`ReactiveForest::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Receives change notifications, synchronously, in the mutating call stack.
pub trait TreeListener: Send + Sync {
    fn on_event(&self, tree: &dyn TreeView, event: &TreeEvent);

    /// A listener that returns false will never act again. Forests may drop
    /// its subscriptions.
    fn is_alive(&self) -> bool {
        true
    }
}

/// Read access to a forest of reactive tree nodes.
///
/// Implementations should answer for any `NodeId` they ever handed out: a
/// node that no longer exists reports no keys, no parent, itself as root and
/// an undefined type.
pub trait TreeView {
    /// Own keys of a node, in order.
    fn own_keys(&self, node: NodeId) -> Vec<Key>;

    /// What the node holds under `key`.
    fn entry(&self, node: NodeId, key: &Key) -> Option<Entry>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// The key the node believes it has inside its parent.
    fn own_key(&self, node: NodeId) -> Option<Key>;

    /// The root recorded on the node.
    fn root(&self, node: NodeId) -> NodeId;

    /// The type tag the node declares.
    fn runtime_type(&self, node: NodeId) -> TypeTag;

    /// The underlying plain value.
    fn unwrap(&self, node: NodeId) -> Value;

    /// Type of the value actually stored at the node, read without
    /// unwrapping its children. Always equal to `unwrap(node).type_tag()`.
    fn value_type(&self, node: NodeId) -> TypeTag;

    fn contains(&self, node: NodeId) -> bool;
}

/// A forest whose roots accept change listeners.
pub trait ReactiveForest: TreeView {
    fn subscribe(
        &mut self,
        root: NodeId,
        category: EventCategory,
        listener: Arc<dyn TreeListener>,
    ) -> SubscriptionId;

    /// Returns false if the subscription was not registered on `root`.
    fn unsubscribe(&mut self, root: NodeId, subscription: SubscriptionId) -> bool;
}

/// Derives the key path of `node` by walking parent links upward.
///
/// Stops if a node repeats, so corrupted parent links cannot loop forever.
pub fn build_chain(tree: &dyn TreeView, node: NodeId) -> Chain {
    let mut keys = Vec::new();
    let mut seen = HashSet::new();
    let mut current = node;

    while seen.insert(current) {
        let Some(parent) = tree.parent(current) else {
            break;
        };
        if let Some(key) = tree.own_key(current) {
            keys.push(key);
        }
        current = parent;
    }

    keys.reverse();
    Chain(keys)
}
