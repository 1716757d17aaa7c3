//! The sweeper: watches trees and collects issues.
//!
//! A [`Sweeper`] holds a set of attached roots, a [`SweeperConfig`], and a
//! buffer of findings. Issues are found two ways:
//! - reactively, when an attached root notifies a type change or a mutation
//!   and the matching kinds are enabled for that category
//! - on demand, when [`Sweeper::report`] walks the trees
//!
//! Root subscriptions are derived from the configuration. After every
//! attach, detach, enable or disable the sweeper recomputes which categories
//! each root needs and subscribes or unsubscribes to match, so the live
//! subscriptions never drift from the configuration.
//!
//! The sweeper does not own the forest. Calls that change subscriptions take
//! the forest as an argument and must always be given the same forest. The
//! listeners it registers only hold the sweeper weakly: a sweeper dropped
//! without [`Sweeper::detach_all`] stops reacting at once, and the forest may
//! discard its subscriptions.

pub mod config;

pub use config::{ChecksSection, EnableOptions, SweeperConfig};

use std::collections::{BTreeMap, HashSet};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};

use tracing::{debug, info, trace, warn};

use crate::error::SweeperResult;
use crate::issues::{Issue, IssueKind, NodeCheck};
use crate::notification::{IssueNotifier, ListenerId};
use crate::tree::{
    build_chain, Entry, EventCategory, NodeId, ReactiveForest, SubscriptionId, TreeEvent,
    TreeListener, TreeView,
};

/// State shared between the sweeper and the listener it registers on roots.
struct SweeperState {
    config: RwLock<SweeperConfig>,
    findings: Mutex<Vec<Issue>>,
    notifier: IssueNotifier,
}

impl SweeperState {
    fn config(&self) -> RwLockReadGuard<'_, SweeperConfig> {
        self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn config_mut(&self) -> RwLockWriteGuard<'_, SweeperConfig> {
        self.config.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn findings(&self) -> MutexGuard<'_, Vec<Issue>> {
        self.findings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn detect(&self, tree: &dyn TreeView, event: &TreeEvent) -> Vec<Issue> {
        let config = self.config();
        let mut found = Vec::new();

        match event {
            TreeEvent::TypeChanged { node, old, new } => {
                for kind in &config.type_change {
                    let Some(check) = kind.type_change_check() else {
                        continue;
                    };
                    if check(*old, *new) {
                        found.push(Issue::new(
                            *kind,
                            build_chain(tree, *node),
                            *node,
                            format!("Node changed type from {} to {}", old, new),
                        ));
                    }
                }
            }
            TreeEvent::Readable { node, dirty_at } => {
                for kind in &config.readable {
                    if let Some(check) = kind.node_check() {
                        trace!(%kind, %node, dirty_at, "reactive check");
                        check(tree, *node, &mut found);
                    }
                }
            }
        }
        found
    }
}

impl SweeperState {
    fn handle(&self, tree: &dyn TreeView, event: &TreeEvent) {
        let found = self.detect(tree, event);
        if found.is_empty() {
            return;
        }

        debug!(
            category = %event.category(),
            node = %event.node(),
            count = found.len(),
            "reactive issues found"
        );
        self.findings().extend(found.iter().cloned());
        for issue in &found {
            self.notifier.notify(issue);
        }
    }
}

/// What a sweeper registers on each attached root.
///
/// Holds the state weakly: once the sweeper is dropped the listener does
/// nothing and reports itself dead, so forests can drop the subscription.
struct RootListener {
    state: Weak<SweeperState>,
}

impl TreeListener for RootListener {
    fn on_event(&self, tree: &dyn TreeView, event: &TreeEvent) {
        if let Some(state) = self.state.upgrade() {
            state.handle(tree, event);
        }
    }

    fn is_alive(&self) -> bool {
        self.state.strong_count() > 0
    }
}

#[derive(Debug)]
struct AttachedRoot {
    root: NodeId,
    subscriptions: BTreeMap<EventCategory, SubscriptionId>,
}

/// Consistency checker for reactive trees.
///
/// # Examples
///
/// ```
/// use treesweeper::tree::{Key, MemoryForest, Value};
/// use treesweeper::{IssueKind, Sweeper};
///
/// let mut forest = MemoryForest::new();
/// let root = forest.conjure(Value::object([("a", Value::from(true))]));
///
/// let mut sweeper = Sweeper::new();
/// sweeper.attach(&mut forest, root);
///
/// let a = forest.child(root, &Key::from("a")).unwrap();
/// forest.assign(a, "string").unwrap();
///
/// let issues = sweeper.report(&forest, None);
/// assert_eq!(issues.len(), 1);
/// assert_eq!(issues[0].kind, IssueKind::PrimitiveToPrimitive);
/// ```
pub struct Sweeper {
    state: Arc<SweeperState>,
    roots: Vec<AttachedRoot>,
}

impl Default for Sweeper {
    fn default() -> Self {
        Self::new()
    }
}

impl Sweeper {
    /// Creates a sweeper with the default configuration.
    pub fn new() -> Self {
        Self::build(SweeperConfig::default())
    }

    /// Creates a sweeper with a custom configuration.
    pub fn with_config(config: SweeperConfig) -> SweeperResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SweeperConfig) -> Self {
        Self {
            state: Arc::new(SweeperState {
                config: RwLock::new(config),
                findings: Mutex::new(Vec::new()),
                notifier: IssueNotifier::new(),
            }),
            roots: Vec::new(),
        }
    }

    /// A snapshot of the current configuration.
    pub fn config(&self) -> SweeperConfig {
        self.state.config().clone()
    }

    /// Roots currently watched, in attach order.
    pub fn attached_roots(&self) -> Vec<NodeId> {
        self.roots.iter().map(|r| r.root).collect()
    }

    pub fn is_attached(&self, root: NodeId) -> bool {
        self.roots.iter().any(|r| r.root == root)
    }

    /// Number of attached roots holding a subscription for `category`.
    pub fn live_subscriptions(&self, category: EventCategory) -> usize {
        self.roots
            .iter()
            .filter(|r| r.subscriptions.contains_key(&category))
            .count()
    }

    /// Number of findings waiting for the next [`report`](Self::report).
    pub fn pending(&self) -> usize {
        self.state.findings().len()
    }

    /// Watches the tree `node` belongs to.
    ///
    /// Attachment is keyed by root: attaching any node of an already watched
    /// tree is a no-op. Returns whether the tree was newly attached.
    pub fn attach<F>(&mut self, forest: &mut F, node: NodeId) -> bool
    where
        F: ReactiveForest + ?Sized,
    {
        let root = forest.root(node);
        let added = !self.is_attached(root);
        if added {
            debug!(%root, "attaching tree");
            self.roots.push(AttachedRoot {
                root,
                subscriptions: BTreeMap::new(),
            });
        }
        self.sync_subscriptions(forest);
        added
    }

    /// Stops watching the tree `node` belongs to. Returns whether it was
    /// attached.
    pub fn detach<F>(&mut self, forest: &mut F, node: NodeId) -> bool
    where
        F: ReactiveForest + ?Sized,
    {
        let root = forest.root(node);
        let Some(pos) = self.roots.iter().position(|r| r.root == root) else {
            return false;
        };
        let attached = self.roots.remove(pos);
        debug!(%root, "detaching tree");
        Self::unsubscribe_all(forest, attached);
        true
    }

    /// Stops watching every tree.
    pub fn detach_all<F>(&mut self, forest: &mut F)
    where
        F: ReactiveForest + ?Sized,
    {
        for attached in std::mem::take(&mut self.roots) {
            Self::unsubscribe_all(forest, attached);
        }
    }

    /// Enables `kind`.
    ///
    /// Readable kinds are checked on every mutation when
    /// `options.reactive == Some(true)`, otherwise during sweeps. Type-change
    /// kinds accept no `reactive` option and report kinds cannot be reactive.
    pub fn enable<F>(
        &mut self,
        forest: &mut F,
        kind: IssueKind,
        options: EnableOptions,
    ) -> SweeperResult<()>
    where
        F: ReactiveForest + ?Sized,
    {
        self.state.config_mut().enable(kind, options)?;
        debug!(%kind, reactive = ?options.reactive, "enabled");
        self.sync_subscriptions(forest);
        Ok(())
    }

    /// Enables a kind given by name.
    pub fn enable_named<F>(
        &mut self,
        forest: &mut F,
        name: &str,
        options: EnableOptions,
    ) -> SweeperResult<()>
    where
        F: ReactiveForest + ?Sized,
    {
        let kind = name.parse()?;
        self.enable(forest, kind, options)
    }

    /// Disables `kind`. Returns whether it was enabled.
    pub fn disable<F>(&mut self, forest: &mut F, kind: IssueKind) -> bool
    where
        F: ReactiveForest + ?Sized,
    {
        let was_enabled = self.state.config_mut().disable(kind);
        debug!(%kind, was_enabled, "disabled");
        self.sync_subscriptions(forest);
        was_enabled
    }

    /// Disables a kind given by name.
    pub fn disable_named<F>(&mut self, forest: &mut F, name: &str) -> SweeperResult<bool>
    where
        F: ReactiveForest + ?Sized,
    {
        let kind = name.parse()?;
        Ok(self.disable(forest, kind))
    }

    /// Restores the default configuration.
    pub fn enable_all<F>(&mut self, forest: &mut F)
    where
        F: ReactiveForest + ?Sized,
    {
        *self.state.config_mut() = SweeperConfig::default();
        self.sync_subscriptions(forest);
    }

    /// Disables every kind.
    pub fn disable_all<F>(&mut self, forest: &mut F)
    where
        F: ReactiveForest + ?Sized,
    {
        *self.state.config_mut() = SweeperConfig::empty();
        self.sync_subscriptions(forest);
    }

    /// Replaces the whole configuration.
    pub fn set_config<F>(&mut self, forest: &mut F, config: SweeperConfig) -> SweeperResult<()>
    where
        F: ReactiveForest + ?Sized,
    {
        config.validate()?;
        *self.state.config_mut() = config;
        self.sync_subscriptions(forest);
        Ok(())
    }

    /// Registers a callback for reactively found issues.
    ///
    /// Callbacks run in the call stack of the tree mutation that triggered
    /// them, after the issue has been buffered.
    pub fn on_issue<L>(&self, listener: L) -> ListenerId
    where
        L: Fn(&Issue) + Send + Sync + 'static,
    {
        self.state.notifier.subscribe(listener)
    }

    pub fn remove_issue_listener(&self, id: ListenerId) -> bool {
        self.state.notifier.unsubscribe(id)
    }

    /// Runs the on-demand checks and drains the findings buffer.
    ///
    /// Without `start`, every attached tree is walked from its root. With
    /// `start`, only the subtree under that node is walked, attached or not.
    /// Each node is checked before its children. Returns the findings
    /// collected since the previous call, reactive ones first.
    pub fn report(&self, tree: &dyn TreeView, start: Option<NodeId>) -> Vec<Issue> {
        let starts = match start {
            Some(node) => vec![node],
            None => self.attached_roots(),
        };
        let checks: Vec<(IssueKind, NodeCheck)> = self
            .state
            .config()
            .report
            .iter()
            .filter_map(|kind| kind.node_check().map(|check| (*kind, check)))
            .collect();

        let mut found = Vec::new();
        let mut visited = HashSet::new();
        let mut walked = 0;
        if !checks.is_empty() {
            for node in starts {
                walked += sweep(tree, node, &checks, &mut visited, &mut found);
            }
        }

        let mut findings = self.state.findings();
        findings.extend(found);
        let out = std::mem::take(&mut *findings);
        info!(nodes = walked, issues = out.len(), "report complete");
        out
    }

    fn sync_subscriptions<F>(&mut self, forest: &mut F)
    where
        F: ReactiveForest + ?Sized,
    {
        let wanted: Vec<EventCategory> = {
            let config = self.state.config();
            EventCategory::ALL
                .into_iter()
                .filter(|category| config.wants(*category))
                .collect()
        };

        for attached in &mut self.roots {
            for category in EventCategory::ALL {
                let want = wanted.contains(&category);
                match (want, attached.subscriptions.get(&category).copied()) {
                    (true, None) => {
                        let listener: Arc<dyn TreeListener> = Arc::new(RootListener {
                            state: Arc::downgrade(&self.state),
                        });
                        let id = forest.subscribe(attached.root, category, listener);
                        attached.subscriptions.insert(category, id);
                        debug!(root = %attached.root, %category, "subscribed");
                    }
                    (false, Some(id)) => {
                        forest.unsubscribe(attached.root, id);
                        attached.subscriptions.remove(&category);
                        debug!(root = %attached.root, %category, "unsubscribed");
                    }
                    _ => {}
                }
            }
        }
    }

    fn unsubscribe_all<F>(forest: &mut F, attached: AttachedRoot)
    where
        F: ReactiveForest + ?Sized,
    {
        for (category, id) in attached.subscriptions {
            forest.unsubscribe(attached.root, id);
            debug!(root = %attached.root, %category, "unsubscribed");
        }
    }
}

impl std::fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper")
            .field("roots", &self.roots)
            .field("config", &*self.state.config())
            .field("pending", &self.pending())
            .finish()
    }
}

/// Pre-order walk from `start`, running `checks` on every node reached.
///
/// Only entries that are nodes are descended into. A node reached twice is
/// checked once. Returns the number of nodes checked.
fn sweep(
    tree: &dyn TreeView,
    start: NodeId,
    checks: &[(IssueKind, NodeCheck)],
    visited: &mut HashSet<NodeId>,
    out: &mut Vec<Issue>,
) -> usize {
    if !tree.contains(start) {
        warn!(node = %start, "skipping sweep of unknown node");
        return 0;
    }

    let mut checked = 0;
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
        if !visited.insert(node) {
            warn!(%node, "node reached twice during sweep");
            continue;
        }
        for (kind, check) in checks {
            trace!(%kind, %node, "on-demand check");
            check(tree, node, out);
        }
        checked += 1;

        let children: Vec<NodeId> = tree
            .own_keys(node)
            .iter()
            .filter_map(|key| tree.entry(node, key).as_ref().and_then(Entry::as_node))
            .collect();
        stack.extend(children.into_iter().rev());
    }
    checked
}
