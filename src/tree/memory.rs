//! In-memory reactive forest.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. Every
//! mutation goes through the forest, which keeps parent, key and root
//! bookkeeping and then notifies the listeners registered on the mutated
//! tree's root, synchronously, before returning.
//!
//! The `force_*` methods bypass that bookkeeping and emit nothing. They exist
//! to reproduce the corruption a buggy tree implementation would cause.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

use super::{
    Entry, EventCategory, Key, NodeId, ReactiveForest, SubscriptionId, TreeEvent, TreeListener,
    TreeView, TypeTag, Value,
};

/// Errors returned by [`MemoryForest`] mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("node {0} is not an object or array")]
    NotComposite(NodeId),

    #[error("node {node} cannot be indexed by key {key}")]
    KeyKind { node: NodeId, key: Key },

    #[error("node {node} has no entry at key {key}")]
    MissingKey { node: NodeId, key: Key },

    #[error("index {index} on node {node} would leave more than {max} holes after length {len}", max = MAX_ARRAY_GAP)]
    GapTooLarge { node: NodeId, index: usize, len: usize },
}

/// Most undefined holes a single write past the end of an array may create.
pub const MAX_ARRAY_GAP: usize = 1 << 16;

/// Result type for forest mutations
pub type TreeResult<T> = Result<T, TreeError>;

#[derive(Debug, Clone)]
enum Content {
    /// Never `Value::Array` or `Value::Object`.
    Scalar(Value),
    Array(Vec<Entry>),
    Object(Vec<(String, Entry)>),
}

#[derive(Debug, Clone)]
struct NodeData {
    parent: Option<NodeId>,
    key: Option<Key>,
    root: NodeId,
    tag: TypeTag,
    content: Content,
}

struct Subscription {
    id: SubscriptionId,
    category: EventCategory,
    listener: Arc<dyn TreeListener>,
}

/// Arena-backed forest of reactive trees.
#[derive(Default)]
pub struct MemoryForest {
    nodes: Vec<Option<NodeData>>,
    subscriptions: HashMap<NodeId, Vec<Subscription>>,
    next_subscription: u64,
    dirty_at: u64,
}

impl MemoryForest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps `value` into a new tree and returns its root.
    pub fn conjure(&mut self, value: Value) -> NodeId {
        self.build(value, None, None, None)
    }

    /// Number of live nodes across all trees.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Child node stored under `key`, if that entry is a node.
    pub fn child(&self, parent: NodeId, key: &Key) -> Option<NodeId> {
        self.entry(parent, key).and_then(|e| e.as_node())
    }

    /// Follows `keys` from `node` through child nodes.
    pub fn descend<'a, I>(&self, node: NodeId, keys: I) -> Option<NodeId>
    where
        I: IntoIterator<Item = &'a Key>,
    {
        keys.into_iter()
            .try_fold(node, |current, key| self.child(current, key))
    }

    /// Number of listeners registered on `root` for `category`.
    pub fn subscription_count(&self, root: NodeId, category: EventCategory) -> usize {
        self.subscriptions
            .get(&root)
            .map(|subs| subs.iter().filter(|s| s.category == category).count())
            .unwrap_or(0)
    }

    /// Replaces the value of `node`.
    ///
    /// Emits `TypeChanged` when the type tag changes, then `Readable` for the
    /// node.
    pub fn assign(&mut self, node: NodeId, value: impl Into<Value>) -> TreeResult<()> {
        let value = value.into();
        let (old, root) = {
            let data = self.data(node)?;
            (data.tag, data.root)
        };

        self.release_children(node);
        let new = value.type_tag();
        let content = self.build_content(node, root, value);
        let data = self.data_mut(node)?;
        data.tag = new;
        data.content = content;

        if old != new {
            self.emit(TreeEvent::TypeChanged { node, old, new });
        }
        self.emit_readable(node);
        Ok(())
    }

    /// Stores `value` under `key` of `parent`.
    ///
    /// An existing child node is assigned in place. Otherwise a new node is
    /// created; setting past the end of an array fills the gap with undefined
    /// nodes.
    pub fn set(
        &mut self,
        parent: NodeId,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> TreeResult<NodeId> {
        let key = key.into();
        let value = value.into();

        if let Some(Entry::Node(existing)) = self.entry(parent, &key) {
            if self.parent(existing) == Some(parent) {
                self.assign(existing, value)?;
                return Ok(existing);
            }
        }

        let (root, _) = self.check_slot(parent, &key)?;
        let child = self.build(value, Some(parent), Some(key.clone()), Some(root));
        self.place(parent, &key, Entry::Node(child))?;
        self.emit_readable(parent);
        Ok(child)
    }

    /// Appends `value` to the array `parent`.
    pub fn push(&mut self, parent: NodeId, value: impl Into<Value>) -> TreeResult<NodeId> {
        let len = match &self.data(parent)?.content {
            Content::Array(items) => items.len(),
            _ => {
                return Err(TreeError::KeyKind {
                    node: parent,
                    key: Key::Index(0),
                })
            }
        };
        self.set(parent, Key::Index(len), value)
    }

    /// Removes the entry under `key`. Array elements after it are re-indexed.
    pub fn remove(&mut self, parent: NodeId, key: impl Into<Key>) -> TreeResult<()> {
        let key = key.into();
        let removed = match (&mut self.data_mut(parent)?.content, &key) {
            (Content::Array(items), Key::Index(i)) if *i < items.len() => {
                Some((items.remove(*i), Some(*i)))
            }
            (Content::Object(entries), Key::Name(name)) => entries
                .iter()
                .position(|(k, _)| k == name)
                .map(|pos| (entries.remove(pos).1, None)),
            (Content::Scalar(_), _) => return Err(TreeError::NotComposite(parent)),
            _ => None,
        };

        let Some((entry, shifted_from)) = removed else {
            return Err(TreeError::MissingKey { node: parent, key });
        };

        if let Entry::Node(child) = entry {
            self.release(child);
        }
        if let Some(from) = shifted_from {
            self.reindex(parent, from);
        }
        self.emit_readable(parent);
        Ok(())
    }

    /// Stores a plain, unwrapped value under `key`.
    ///
    /// Well-behaved callers never do this: every child of a tree node should
    /// itself be a node.
    pub fn inject_raw(
        &mut self,
        parent: NodeId,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> TreeResult<()> {
        let key = key.into();
        if let Some(Entry::Node(old)) = self.entry(parent, &key) {
            if self.parent(old) == Some(parent) {
                self.release(old);
            }
        }
        self.place(parent, &key, Entry::Raw(value.into()))?;
        self.emit_readable(parent);
        Ok(())
    }

    /// Overwrites the key a node believes it has. Emits nothing.
    pub fn force_own_key(&mut self, node: NodeId, key: Option<Key>) -> TreeResult<()> {
        self.data_mut(node)?.key = key;
        Ok(())
    }

    /// Overwrites the declared type tag without touching the value. Emits
    /// nothing.
    pub fn force_type_tag(&mut self, node: NodeId, tag: TypeTag) -> TreeResult<()> {
        self.data_mut(node)?.tag = tag;
        Ok(())
    }

    /// Overwrites the recorded root. Emits nothing.
    pub fn force_root(&mut self, node: NodeId, root: NodeId) -> TreeResult<()> {
        self.data_mut(node)?.root = root;
        Ok(())
    }

    /// Stores `entry` under `key` of `parent` without updating the entry's own
    /// parent or key. Emits nothing.
    pub fn force_entry(&mut self, parent: NodeId, key: impl Into<Key>, entry: Entry) -> TreeResult<()> {
        self.place(parent, &key.into(), entry)
    }

    fn data(&self, node: NodeId) -> TreeResult<&NodeData> {
        self.nodes
            .get(node.0)
            .and_then(Option::as_ref)
            .ok_or(TreeError::UnknownNode(node))
    }

    fn data_mut(&mut self, node: NodeId) -> TreeResult<&mut NodeData> {
        self.nodes
            .get_mut(node.0)
            .and_then(Option::as_mut)
            .ok_or(TreeError::UnknownNode(node))
    }

    fn build(
        &mut self,
        value: Value,
        parent: Option<NodeId>,
        key: Option<Key>,
        root: Option<NodeId>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        let root = root.unwrap_or(id);
        let tag = value.type_tag();
        self.nodes.push(Some(NodeData {
            parent,
            key,
            root,
            tag,
            content: Content::Scalar(Value::Undefined),
        }));

        let content = self.build_content(id, root, value);
        if let Some(Some(data)) = self.nodes.get_mut(id.0) {
            data.content = content;
        }
        id
    }

    fn build_content(&mut self, node: NodeId, root: NodeId, value: Value) -> Content {
        match value {
            Value::Array(items) => Content::Array(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| {
                        Entry::Node(self.build(item, Some(node), Some(Key::Index(i)), Some(root)))
                    })
                    .collect(),
            ),
            Value::Object(entries) => Content::Object(
                entries
                    .into_iter()
                    .map(|(name, item)| {
                        let child =
                            self.build(item, Some(node), Some(Key::Name(name.clone())), Some(root));
                        (name, Entry::Node(child))
                    })
                    .collect(),
            ),
            scalar => Content::Scalar(scalar),
        }
    }

    /// Writes `entry` under `key`, growing arrays with undefined nodes.
    fn place(&mut self, parent: NodeId, key: &Key, entry: Entry) -> TreeResult<()> {
        let (root, len) = self.check_slot(parent, key)?;

        if let Key::Index(index) = key {
            let holes: Vec<Entry> = (len..*index)
                .map(|i| {
                    Entry::Node(self.build(Value::Undefined, Some(parent), Some(Key::Index(i)), Some(root)))
                })
                .collect();
            if let Content::Array(items) = &mut self.data_mut(parent)?.content {
                items.extend(holes);
                if *index < items.len() {
                    items[*index] = entry;
                } else {
                    items.push(entry);
                }
            }
        } else if let (Key::Name(name), Content::Object(entries)) =
            (key, &mut self.data_mut(parent)?.content)
        {
            match entries.iter_mut().find(|(k, _)| k == name) {
                Some(slot) => slot.1 = entry,
                None => entries.push((name.clone(), entry)),
            }
        }
        Ok(())
    }

    /// Checks that `key` can be written on `parent`. Returns the parent's root
    /// and, for arrays, its current length.
    fn check_slot(&self, parent: NodeId, key: &Key) -> TreeResult<(NodeId, usize)> {
        let data = self.data(parent)?;
        let len = match (&data.content, key) {
            (Content::Array(items), Key::Index(_)) => items.len(),
            (Content::Object(_), Key::Name(_)) => 0,
            (Content::Scalar(_), _) => return Err(TreeError::NotComposite(parent)),
            _ => {
                return Err(TreeError::KeyKind {
                    node: parent,
                    key: key.clone(),
                })
            }
        };
        if let Key::Index(index) = key {
            if index.saturating_sub(len) > MAX_ARRAY_GAP {
                return Err(TreeError::GapTooLarge {
                    node: parent,
                    index: *index,
                    len,
                });
            }
        }
        Ok((data.root, len))
    }

    /// Updates the own keys of array elements from `from` onward.
    fn reindex(&mut self, parent: NodeId, from: usize) {
        let children: Vec<(usize, NodeId)> = match self.data(parent).map(|d| &d.content) {
            Ok(Content::Array(items)) => items
                .iter()
                .enumerate()
                .skip(from)
                .filter_map(|(i, e)| e.as_node().map(|id| (i, id)))
                .collect(),
            _ => return,
        };
        for (index, child) in children {
            if let Ok(data) = self.data_mut(child) {
                if data.parent == Some(parent) {
                    data.key = Some(Key::Index(index));
                }
            }
        }
    }

    fn owned_children(&self, node: NodeId) -> Vec<NodeId> {
        let entries: Vec<NodeId> = match self.data(node).map(|d| &d.content) {
            Ok(Content::Array(items)) => items.iter().filter_map(Entry::as_node).collect(),
            Ok(Content::Object(entries)) => {
                entries.iter().filter_map(|(_, e)| e.as_node()).collect()
            }
            _ => Vec::new(),
        };
        entries
            .into_iter()
            .filter(|child| self.parent(*child) == Some(node))
            .collect()
    }

    fn release_children(&mut self, node: NodeId) {
        for child in self.owned_children(node) {
            self.release(child);
        }
    }

    /// Frees `node` and every descendant it owns.
    fn release(&mut self, node: NodeId) {
        let mut stack = vec![node];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            stack.extend(self.owned_children(current));
            if let Some(slot) = self.nodes.get_mut(current.0) {
                *slot = None;
            }
            self.subscriptions.remove(&current);
        }
    }

    fn emit_readable(&mut self, node: NodeId) {
        self.dirty_at += 1;
        let dirty_at = self.dirty_at;
        self.emit(TreeEvent::Readable { dirty_at, node });
    }

    fn emit(&mut self, event: TreeEvent) {
        let root = self.root(event.node());
        let category = event.category();
        self.prune_dead(root);
        let listeners: Vec<Arc<dyn TreeListener>> = self
            .subscriptions
            .get(&root)
            .map(|subs| {
                subs.iter()
                    .filter(|s| s.category == category)
                    .map(|s| Arc::clone(&s.listener))
                    .collect()
            })
            .unwrap_or_default();

        trace!(%root, %category, listeners = listeners.len(), "dispatching tree event");
        for listener in listeners {
            listener.on_event(&*self, &event);
        }
    }

    /// Drops subscriptions on `root` whose listener will never act again.
    fn prune_dead(&mut self, root: NodeId) {
        let Some(subs) = self.subscriptions.get_mut(&root) else {
            return;
        };
        let before = subs.len();
        subs.retain(|s| s.listener.is_alive());
        if subs.len() != before {
            trace!(%root, dropped = before - subs.len(), "pruned dead subscriptions");
        }
        if subs.is_empty() {
            self.subscriptions.remove(&root);
        }
    }

    fn unwrap_guarded(&self, node: NodeId, seen: &mut HashSet<NodeId>) -> Value {
        if !seen.insert(node) {
            return Value::Undefined;
        }
        let unwrap_entry = |entry: &Entry, seen: &mut HashSet<NodeId>| match entry {
            Entry::Node(child) => self.unwrap_guarded(*child, seen),
            Entry::Raw(value) => value.clone(),
        };
        let value = match self.data(node).map(|d| &d.content) {
            Ok(Content::Scalar(value)) => value.clone(),
            Ok(Content::Array(items)) => {
                Value::Array(items.iter().map(|e| unwrap_entry(e, seen)).collect())
            }
            Ok(Content::Object(entries)) => Value::Object(
                entries
                    .iter()
                    .map(|(k, e)| (k.clone(), unwrap_entry(e, seen)))
                    .collect(),
            ),
            Err(_) => Value::Undefined,
        };
        seen.remove(&node);
        value
    }
}

impl TreeView for MemoryForest {
    fn own_keys(&self, node: NodeId) -> Vec<Key> {
        match self.data(node).map(|d| &d.content) {
            Ok(Content::Array(items)) => (0..items.len()).map(Key::Index).collect(),
            Ok(Content::Object(entries)) => {
                entries.iter().map(|(k, _)| Key::Name(k.clone())).collect()
            }
            _ => Vec::new(),
        }
    }

    fn entry(&self, node: NodeId, key: &Key) -> Option<Entry> {
        match (&self.data(node).ok()?.content, key) {
            (Content::Array(items), Key::Index(i)) => items.get(*i).cloned(),
            (Content::Object(entries), Key::Name(name)) => entries
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, e)| e.clone()),
            _ => None,
        }
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.data(node).ok()?.parent
    }

    fn own_key(&self, node: NodeId) -> Option<Key> {
        self.data(node).ok()?.key.clone()
    }

    fn root(&self, node: NodeId) -> NodeId {
        self.data(node).map(|d| d.root).unwrap_or(node)
    }

    fn runtime_type(&self, node: NodeId) -> TypeTag {
        self.data(node).map(|d| d.tag).unwrap_or(TypeTag::Undefined)
    }

    fn unwrap(&self, node: NodeId) -> Value {
        self.unwrap_guarded(node, &mut HashSet::new())
    }

    fn value_type(&self, node: NodeId) -> TypeTag {
        match self.data(node).map(|d| &d.content) {
            Ok(Content::Scalar(value)) => value.type_tag(),
            Ok(Content::Array(_)) => TypeTag::Array,
            Ok(Content::Object(_)) => TypeTag::Object,
            Err(_) => TypeTag::Undefined,
        }
    }

    fn contains(&self, node: NodeId) -> bool {
        self.data(node).is_ok()
    }
}

impl ReactiveForest for MemoryForest {
    fn subscribe(
        &mut self,
        root: NodeId,
        category: EventCategory,
        listener: Arc<dyn TreeListener>,
    ) -> SubscriptionId {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.subscriptions.entry(root).or_default().push(Subscription {
            id,
            category,
            listener,
        });
        id
    }

    fn unsubscribe(&mut self, root: NodeId, subscription: SubscriptionId) -> bool {
        let Some(subs) = self.subscriptions.get_mut(&root) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|s| s.id != subscription);
        let removed = subs.len() != before;
        if subs.is_empty() {
            self.subscriptions.remove(&root);
        }
        removed
    }
}

impl std::fmt::Debug for MemoryForest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryForest")
            .field("nodes", &self.len())
            .field("subscribed_roots", &self.subscriptions.len())
            .field("dirty_at", &self.dirty_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<TreeEvent>>,
    }

    impl TreeListener for Recorder {
        fn on_event(&self, _tree: &dyn TreeView, event: &TreeEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn sample() -> (MemoryForest, NodeId) {
        let mut forest = MemoryForest::new();
        let root = forest.conjure(Value::object([
            ("a", Value::from(true)),
            ("list", Value::Array(vec![Value::from(1), Value::from(2), Value::from(3)])),
        ]));
        (forest, root)
    }

    #[test]
    fn test_conjure_records_parent_key_and_root() {
        let (forest, root) = sample();
        let list = forest.child(root, &Key::from("list")).unwrap();
        let second = forest.child(list, &Key::Index(1)).unwrap();

        assert_eq!(forest.parent(root), None);
        assert_eq!(forest.root(root), root);
        assert_eq!(forest.parent(second), Some(list));
        assert_eq!(forest.own_key(second), Some(Key::Index(1)));
        assert_eq!(forest.root(second), root);
        assert_eq!(forest.runtime_type(list), TypeTag::Array);
        assert_eq!(forest.own_keys(root), vec![Key::from("a"), Key::from("list")]);
        assert_eq!(forest.len(), 6);
    }

    #[test]
    fn test_assign_emits_type_change_then_readable() {
        let (mut forest, root) = sample();
        let recorder = Arc::new(Recorder::default());
        forest.subscribe(root, EventCategory::TypeChange, recorder.clone());
        forest.subscribe(root, EventCategory::Readable, recorder.clone());

        let a = forest.child(root, &Key::from("a")).unwrap();
        forest.assign(a, "string").unwrap();

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            TreeEvent::TypeChanged {
                node: a,
                old: TypeTag::Boolean,
                new: TypeTag::String
            }
        );
        assert!(matches!(events[1], TreeEvent::Readable { node, .. } if node == a));
    }

    #[test]
    fn test_same_type_assign_emits_only_readable() {
        let (mut forest, root) = sample();
        let recorder = Arc::new(Recorder::default());
        forest.subscribe(root, EventCategory::TypeChange, recorder.clone());
        forest.subscribe(root, EventCategory::Readable, recorder.clone());

        let a = forest.child(root, &Key::from("a")).unwrap();
        forest.assign(a, false).unwrap();

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category(), EventCategory::Readable);
    }

    #[test]
    fn test_set_past_end_fills_holes_with_undefined() {
        let (mut forest, root) = sample();
        let list = forest.child(root, &Key::from("list")).unwrap();
        let new = forest.set(list, 5usize, "x").unwrap();

        assert_eq!(forest.own_keys(list).len(), 6);
        let hole = forest.child(list, &Key::Index(3)).unwrap();
        assert_eq!(forest.runtime_type(hole), TypeTag::Undefined);
        assert_eq!(forest.own_key(new), Some(Key::Index(5)));
    }

    #[test]
    fn test_remove_reindexes_following_elements() {
        let (mut forest, root) = sample();
        let list = forest.child(root, &Key::from("list")).unwrap();
        let third = forest.child(list, &Key::Index(2)).unwrap();

        forest.remove(list, 0usize).unwrap();

        assert_eq!(forest.own_keys(list).len(), 2);
        assert_eq!(forest.own_key(third), Some(Key::Index(1)));
        assert_eq!(forest.unwrap(list), Value::Array(vec![2.into(), 3.into()]));
    }

    #[test]
    fn test_assign_releases_old_children() {
        let (mut forest, root) = sample();
        let list = forest.child(root, &Key::from("list")).unwrap();
        let first = forest.child(list, &Key::Index(0)).unwrap();

        forest.assign(list, Value::Null).unwrap();

        assert!(!forest.contains(first));
        assert_eq!(forest.runtime_type(list), TypeTag::Null);
        assert!(forest.own_keys(list).is_empty());
    }

    #[test]
    fn test_inject_raw_stores_plain_value() {
        let (mut forest, root) = sample();
        let a = forest.child(root, &Key::from("a")).unwrap();
        forest.inject_raw(root, "a", 5).unwrap();

        assert!(!forest.contains(a));
        assert_eq!(
            forest.entry(root, &Key::from("a")),
            Some(Entry::Raw(Value::Number(5.0)))
        );
    }

    #[test]
    fn test_unwrap_uses_storage_not_tag() {
        let (mut forest, root) = sample();
        let a = forest.child(root, &Key::from("a")).unwrap();
        forest.force_type_tag(a, TypeTag::Number).unwrap();

        assert_eq!(forest.runtime_type(a), TypeTag::Number);
        assert_eq!(forest.unwrap(a).type_tag(), TypeTag::Boolean);
    }

    #[test]
    fn test_wrong_key_kind_is_rejected() {
        let (mut forest, root) = sample();
        let list = forest.child(root, &Key::from("list")).unwrap();
        assert!(matches!(
            forest.set(list, "name", 1),
            Err(TreeError::KeyKind { .. })
        ));
        let a = forest.child(root, &Key::from("a")).unwrap();
        assert_eq!(forest.set(a, "x", 1), Err(TreeError::NotComposite(a)));
        assert_eq!(forest.len(), 6);
    }

    #[test]
    fn test_oversized_gap_is_rejected_without_allocating() {
        let (mut forest, root) = sample();
        let list = forest.child(root, &Key::from("list")).unwrap();
        let recorder = Arc::new(Recorder::default());
        forest.subscribe(root, EventCategory::Readable, recorder.clone());

        let err = forest.set(list, 1_000_000_000_000usize, "x").unwrap_err();
        assert_eq!(
            err,
            TreeError::GapTooLarge {
                node: list,
                index: 1_000_000_000_000,
                len: 3
            }
        );
        assert!(forest
            .inject_raw(list, 3 + MAX_ARRAY_GAP + 1, 1)
            .is_err());

        assert_eq!(forest.len(), 6);
        assert_eq!(forest.own_keys(list).len(), 3);
        assert!(recorder.events.lock().unwrap().is_empty());

        forest.set(list, 3 + MAX_ARRAY_GAP, "x").unwrap();
        assert_eq!(forest.own_keys(list).len(), 4 + MAX_ARRAY_GAP);
    }

    struct Expiring {
        alive: std::sync::atomic::AtomicBool,
        calls: Mutex<usize>,
    }

    impl TreeListener for Expiring {
        fn on_event(&self, _tree: &dyn TreeView, _event: &TreeEvent) {
            *self.calls.lock().unwrap() += 1;
        }

        fn is_alive(&self) -> bool {
            self.alive.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[test]
    fn test_dead_listeners_are_pruned_on_next_event() {
        let (mut forest, root) = sample();
        let listener = Arc::new(Expiring {
            alive: std::sync::atomic::AtomicBool::new(true),
            calls: Mutex::new(0),
        });
        forest.subscribe(root, EventCategory::Readable, listener.clone());
        forest.subscribe(root, EventCategory::TypeChange, listener.clone());

        let a = forest.child(root, &Key::from("a")).unwrap();
        forest.assign(a, false).unwrap();
        assert_eq!(*listener.calls.lock().unwrap(), 1);

        listener
            .alive
            .store(false, std::sync::atomic::Ordering::SeqCst);
        forest.assign(a, true).unwrap();

        assert_eq!(*listener.calls.lock().unwrap(), 1);
        assert_eq!(forest.subscription_count(root, EventCategory::Readable), 0);
        assert_eq!(forest.subscription_count(root, EventCategory::TypeChange), 0);
    }

    #[test]
    fn test_value_type_reads_storage_without_unwrapping() {
        let (mut forest, root) = sample();
        let list = forest.child(root, &Key::from("list")).unwrap();
        forest.force_type_tag(list, TypeTag::Null).unwrap();

        assert_eq!(forest.value_type(list), TypeTag::Array);
        assert_eq!(forest.value_type(root), forest.unwrap(root).type_tag());
        assert_eq!(forest.value_type(NodeId(999)), TypeTag::Undefined);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_listener() {
        let (mut forest, root) = sample();
        let recorder = Arc::new(Recorder::default());
        let first = forest.subscribe(root, EventCategory::Readable, recorder.clone());
        forest.subscribe(root, EventCategory::Readable, recorder.clone());

        assert!(forest.unsubscribe(root, first));
        assert!(!forest.unsubscribe(root, first));
        assert_eq!(forest.subscription_count(root, EventCategory::Readable), 1);
    }

    #[test]
    fn test_events_only_reach_the_mutated_tree() {
        let (mut forest, root) = sample();
        let other = forest.conjure(Value::object([("z", Value::Null)]));
        let recorder = Arc::new(Recorder::default());
        forest.subscribe(other, EventCategory::Readable, recorder.clone());

        let a = forest.child(root, &Key::from("a")).unwrap();
        forest.assign(a, 1).unwrap();

        assert!(recorder.events.lock().unwrap().is_empty());
    }
}
