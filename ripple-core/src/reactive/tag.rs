//! Tags
//!
//! A tag is the versioned identity behind every reactive value. It answers
//! one question: at which revision did this last change?
//!
//! There are two kinds:
//!
//! - A [`MutableTag`] backs a cell. Marking it bumps the global clock and
//!   notifies. It can be frozen, after which it can never change again and
//!   stops being reported as a dependency.
//!
//! - A [`FormulaTag`] backs a derived computation. It records the tags that
//!   were consumed during the most recent evaluation, and the revision that
//!   evaluation was valid for. The set is replaced wholesale on every
//!   evaluation.
//!
//! # Reverse Edges
//!
//! Every tag keeps weak references to the formula tags that currently list
//! it as a dependency. The notifier walks these edges to find everything
//! affected by a mutation. The edges are rewritten by
//! [`FormulaTag::updated`] and removed when a formula tag is dropped, so
//! they always mirror the formulas' current dependency sets.
//!
//! # Effective Revisions
//!
//! A formula's effective revision is the newest of its own recorded revision
//! and its dependencies' effective revisions. Each formula tag memoises that
//! value against a stamp: the clock reading plus a per-thread count of
//! [`FormulaTag::updated`] calls. Either one moves whenever an effective
//! revision on this thread can change, so while the stamp holds, a
//! freshness check costs one comparison per direct dependency, and a walk
//! after a change visits each formula once however many paths lead to it.

use std::cell::{Cell as Slot, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use tracing::{debug, trace};

use super::revision::{bump, now, Revision};
use super::runtime;
use super::subscriber::SubscriptionSet;
use super::tracker;
use crate::error::{ReactiveError, Result};

thread_local! {
    static GENERATION: Slot<u64> = const { Slot::new(0) };
}

/// The point in time a memoised effective revision is valid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    clock: Revision,
    generation: u64,
}

impl Stamp {
    fn current() -> Self {
        Self {
            clock: now(),
            generation: GENERATION.with(Slot::get),
        }
    }

    /// Invalidate every stamp taken on this thread so far.
    fn advance() {
        GENERATION.with(|generation| generation.set(generation.get() + 1));
    }
}

/// Unique identifier for a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TagId(u64);

impl TagId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tag#{}", self.0)
    }
}

/// Anything backed by a tag.
///
/// [`subscribe`](super::subscribe) and [`notify`](super::notify) accept any
/// `Tagged` value, so callers can pass a cell or formula directly.
pub trait Tagged {
    /// Get a handle to the backing tag.
    fn as_tag(&self) -> Tag;
}

// ----------------------------------------------------------------------------
// Shared Core
// ----------------------------------------------------------------------------

/// Identity, subscribers and reverse edges, shared by both tag kinds.
pub(crate) struct TagCore {
    id: TagId,
    subscriptions: Rc<SubscriptionSet>,
    /// Formula tags whose current dependency set contains this tag.
    dependents: RefCell<IndexMap<TagId, Weak<FormulaTagInner>>>,
}

impl TagCore {
    fn new() -> Self {
        Self {
            id: TagId::next(),
            subscriptions: Rc::new(SubscriptionSet::default()),
            dependents: RefCell::new(IndexMap::new()),
        }
    }

    pub(crate) fn id(&self) -> TagId {
        self.id
    }

    pub(crate) fn subscriptions(&self) -> &Rc<SubscriptionSet> {
        &self.subscriptions
    }

    fn add_dependent(&self, formula: &FormulaTag) {
        self.dependents
            .borrow_mut()
            .insert(formula.id(), Rc::downgrade(&formula.0));
    }

    fn remove_dependent(&self, formula: TagId) {
        self.dependents.borrow_mut().shift_remove(&formula);
    }

    /// Live formula tags that currently depend on this tag.
    pub(crate) fn dependents(&self) -> Vec<FormulaTag> {
        let mut dependents = self.dependents.borrow_mut();
        let mut live = Vec::with_capacity(dependents.len());

        dependents.retain(|_, weak| match weak.upgrade() {
            Some(inner) => {
                live.push(FormulaTag(inner));
                true
            }
            None => false,
        });

        live
    }

    pub(crate) fn dependent_count(&self) -> usize {
        self.dependents.borrow().len()
    }
}

// ----------------------------------------------------------------------------
// Mutable Tags
// ----------------------------------------------------------------------------

/// Lifecycle of a mutable tag. The only transition is `Active -> Frozen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutableState {
    /// The tag may still change.
    Active,

    /// The tag can never change again.
    Frozen,
}

struct MutableTagInner {
    core: TagCore,
    revision: Slot<Revision>,
    state: Slot<MutableState>,
}

/// The tag behind a piece of mutable state.
///
/// Cloning produces another handle to the same tag.
#[derive(Clone)]
pub struct MutableTag(Rc<MutableTagInner>);

impl MutableTag {
    /// Create a tag that was "just updated": its revision is a fresh bump.
    pub fn new() -> Self {
        Self::at(bump())
    }

    /// Create a tag that last changed at `revision`.
    pub fn at(revision: Revision) -> Self {
        Self(Rc::new(MutableTagInner {
            core: TagCore::new(),
            revision: Slot::new(revision),
            state: Slot::new(MutableState::Active),
        }))
    }

    /// Get the tag's unique ID.
    pub fn id(&self) -> TagId {
        self.0.core.id
    }

    /// The revision at which this tag last changed.
    pub fn last_updated(&self) -> Revision {
        self.0.revision.get()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MutableState {
        self.0.state.get()
    }

    /// Whether the tag has been frozen.
    pub fn is_frozen(&self) -> bool {
        self.state() == MutableState::Frozen
    }

    /// The tag as a dependency, or `None` once frozen.
    ///
    /// A frozen tag can never change, so nothing needs to track it.
    pub fn dependency(&self) -> Option<Tag> {
        match self.state() {
            MutableState::Active => Some(Tag::Mutable(self.clone())),
            MutableState::Frozen => None,
        }
    }

    /// Record this tag in the current evaluation frame, if any.
    pub fn consume(&self) {
        if self.state() == MutableState::Active {
            tracker::consume_with(|| Tag::Mutable(self.clone()));
        }
    }

    /// Bump the tag's revision and notify.
    ///
    /// Fails with [`ReactiveError::FrozenMutation`] if the tag is frozen.
    pub fn mark(&self) -> Result<Revision> {
        if self.is_frozen() {
            debug!(tag = %self.id(), "rejected mutation of frozen tag");
            return Err(ReactiveError::FrozenMutation { tag: self.id() });
        }

        let revision = bump();
        self.0.revision.set(revision);
        trace!(tag = %self.id(), %revision, "marked");

        runtime::notify_core(&self.0.core);
        Ok(revision)
    }

    /// Freeze the tag. Freezing twice is the same as freezing once.
    pub fn freeze(&self) {
        if self.0.state.replace(MutableState::Frozen) == MutableState::Active {
            debug!(tag = %self.id(), "frozen");
        }
    }

    pub(crate) fn core(&self) -> &TagCore {
        &self.0.core
    }
}

impl Default for MutableTag {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MutableTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableTag")
            .field("id", &self.id())
            .field("last_updated", &self.last_updated())
            .field("state", &self.state())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Formula Tags
// ----------------------------------------------------------------------------

enum FormulaState {
    /// Never evaluated. Always stale.
    Uninitialized,

    /// Evaluated at least once with the given dependencies.
    Initialized(Dependencies),
}

pub(crate) struct FormulaTagInner {
    core: TagCore,
    /// Revision the last evaluation was valid for.
    revision: Slot<Revision>,
    state: RefCell<FormulaState>,
    /// Memoised effective revision.
    effective: Slot<Option<(Stamp, Revision)>>,
}

impl Drop for FormulaTagInner {
    fn drop(&mut self) {
        if let FormulaState::Initialized(dependencies) = self.state.get_mut() {
            for tag in dependencies.iter() {
                tag.core().remove_dependent(self.core.id);
            }
        }
    }
}

/// The tag behind a derived computation.
///
/// Cloning produces another handle to the same tag.
#[derive(Clone)]
pub struct FormulaTag(Rc<FormulaTagInner>);

impl FormulaTag {
    /// Create an uninitialized formula tag with no dependencies.
    pub fn new() -> Self {
        Self(Rc::new(FormulaTagInner {
            core: TagCore::new(),
            revision: Slot::new(now()),
            state: RefCell::new(FormulaState::Uninitialized),
            effective: Slot::new(None),
        }))
    }

    /// Get the tag's unique ID.
    pub fn id(&self) -> TagId {
        self.0.core.id
    }

    /// The revision recorded by the last call to [`updated`](Self::updated).
    pub fn validated_at(&self) -> Revision {
        self.0.revision.get()
    }

    /// The effective revision of this formula.
    ///
    /// This is the newer of the recorded revision and the effective
    /// revisions of the current dependencies, so a formula that depends on
    /// this one sees a change beneath it even before this one recomputes.
    pub fn last_updated(&self) -> Revision {
        self.effective_at(Stamp::current())
    }

    fn effective_at(&self, stamp: Stamp) -> Revision {
        if let Some((at, revision)) = self.0.effective.get() {
            if at == stamp {
                return revision;
            }
        }

        let recorded = self.validated_at();
        let revision = match &*self.0.state.borrow() {
            FormulaState::Uninitialized => recorded,
            FormulaState::Initialized(dependencies) => dependencies
                .latest_at(stamp)
                .map_or(recorded, |latest| latest.max(recorded)),
        };

        self.0.effective.set(Some((stamp, revision)));
        revision
    }

    /// Whether the tag has been initialized by [`updated`](Self::updated).
    pub fn is_initialized(&self) -> bool {
        matches!(&*self.0.state.borrow(), FormulaState::Initialized(_))
    }

    /// The tags consumed during the most recent evaluation.
    pub fn dependencies(&self) -> Dependencies {
        match &*self.0.state.borrow() {
            FormulaState::Uninitialized => Dependencies::new(),
            FormulaState::Initialized(dependencies) => dependencies.clone(),
        }
    }

    /// Whether the formula must recompute before it can be read.
    ///
    /// An uninitialized tag is always stale. Otherwise the tag is stale iff
    /// some dependency changed after the recorded revision.
    pub fn is_stale(&self) -> bool {
        let recorded = self.validated_at();
        let stamp = Stamp::current();

        match &*self.0.state.borrow() {
            FormulaState::Uninitialized => true,
            FormulaState::Initialized(dependencies) => dependencies
                .iter()
                .any(|tag| tag.effective_at(stamp) > recorded),
        }
    }

    /// Record this tag in the current evaluation frame, if any.
    pub fn consume(&self) {
        tracker::consume_with(|| Tag::Formula(self.clone()));
    }

    /// Install the result of an evaluation.
    ///
    /// Replaces the dependency set and records `revision`. The first call
    /// counts as a change and notifies subscribers, so that someone who
    /// subscribed before the first read learns the value is available.
    /// Later calls only update bookkeeping: the mutation that made the
    /// formula stale already notified.
    pub fn updated<I>(&self, dependencies: I, revision: Revision)
    where
        I: IntoIterator<Item = Tag>,
    {
        let id = self.id();
        let dependencies: Dependencies = dependencies
            .into_iter()
            .filter(|tag| tag.id() != id)
            .collect();

        for tag in dependencies.iter() {
            tag.core().add_dependent(self);
        }
        let count = dependencies.len();

        let previous = self
            .0
            .state
            .replace(FormulaState::Initialized(dependencies));

        let first = match previous {
            FormulaState::Uninitialized => true,
            FormulaState::Initialized(old) => {
                let current = self.0.state.borrow();
                if let FormulaState::Initialized(current) = &*current {
                    for tag in old.iter().filter(|tag| !current.contains(tag.id())) {
                        tag.core().remove_dependent(id);
                    }
                }
                false
            }
        };

        self.0.revision.set(revision);

        // New dependencies or a new recorded revision can move the effective
        // revision of this tag and of everything that depends on it.
        self.0.effective.set(None);
        Stamp::advance();

        trace!(tag = %id, dependencies = count, %revision, "formula updated");

        if first {
            debug!(tag = %id, "formula initialized");
            runtime::notify_core(&self.0.core);
        }
    }

    pub(crate) fn core(&self) -> &TagCore {
        &self.0.core
    }
}

impl Default for FormulaTag {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FormulaTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormulaTag")
            .field("id", &self.id())
            .field("validated_at", &self.validated_at())
            .field("initialized", &self.is_initialized())
            .field("dependencies", &self.dependencies())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tag
// ----------------------------------------------------------------------------

/// A handle to either kind of tag.
///
/// Equality and hashing go by [`TagId`].
#[derive(Clone)]
pub enum Tag {
    /// Backs a cell.
    Mutable(MutableTag),

    /// Backs a formula.
    Formula(FormulaTag),
}

impl Tag {
    /// Get the tag's unique ID.
    pub fn id(&self) -> TagId {
        self.core().id
    }

    /// The revision at which this tag last (effectively) changed.
    pub fn last_updated(&self) -> Revision {
        match self {
            Tag::Mutable(tag) => tag.last_updated(),
            Tag::Formula(tag) => tag.last_updated(),
        }
    }

    fn effective_at(&self, stamp: Stamp) -> Revision {
        match self {
            Tag::Mutable(tag) => tag.last_updated(),
            Tag::Formula(tag) => tag.effective_at(stamp),
        }
    }

    /// Record this tag in the current evaluation frame, if any.
    pub fn consume(&self) {
        match self {
            Tag::Mutable(tag) => tag.consume(),
            Tag::Formula(tag) => tag.consume(),
        }
    }

    /// Number of callbacks subscribed directly to this tag.
    pub fn subscriber_count(&self) -> usize {
        self.core().subscriptions().len()
    }

    /// Number of live formula tags that currently depend on this tag.
    pub fn dependent_count(&self) -> usize {
        self.core().dependent_count()
    }

    pub(crate) fn core(&self) -> &TagCore {
        match self {
            Tag::Mutable(tag) => tag.core(),
            Tag::Formula(tag) => tag.core(),
        }
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Tag {}

impl Hash for Tag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Mutable(tag) => write!(f, "Mutable({} @ {})", tag.id(), tag.last_updated()),
            Tag::Formula(tag) => write!(f, "Formula({} @ {})", tag.id(), tag.validated_at()),
        }
    }
}

impl From<MutableTag> for Tag {
    fn from(tag: MutableTag) -> Self {
        Tag::Mutable(tag)
    }
}

impl From<FormulaTag> for Tag {
    fn from(tag: FormulaTag) -> Self {
        Tag::Formula(tag)
    }
}

impl Tagged for Tag {
    fn as_tag(&self) -> Tag {
        self.clone()
    }
}

impl Tagged for MutableTag {
    fn as_tag(&self) -> Tag {
        Tag::Mutable(self.clone())
    }
}

impl Tagged for FormulaTag {
    fn as_tag(&self) -> Tag {
        Tag::Formula(self.clone())
    }
}

// ----------------------------------------------------------------------------
// Dependencies
// ----------------------------------------------------------------------------

/// An insertion-ordered set of tags, keyed by [`TagId`].
#[derive(Clone, Default)]
pub struct Dependencies {
    tags: IndexMap<TagId, Tag>,
}

impl Dependencies {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag. Returns `false` if it was already present.
    pub fn insert(&mut self, tag: Tag) -> bool {
        match self.tags.entry(tag.id()) {
            indexmap::map::Entry::Occupied(_) => false,
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(tag);
                true
            }
        }
    }

    /// Whether the set contains the tag with this ID.
    pub fn contains(&self, id: TagId) -> bool {
        self.tags.contains_key(&id)
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Iterate over the tags in the order they were first consumed.
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.values()
    }

    /// Iterate over the tag IDs in the order they were first consumed.
    pub fn ids(&self) -> impl Iterator<Item = TagId> + '_ {
        self.tags.keys().copied()
    }

    /// The newest revision among the tags, if any.
    pub fn latest(&self) -> Option<Revision> {
        self.latest_at(Stamp::current())
    }

    fn latest_at(&self, stamp: Stamp) -> Option<Revision> {
        self.iter().map(|tag| tag.effective_at(stamp)).max()
    }
}

impl FromIterator<Tag> for Dependencies {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        let mut dependencies = Self::new();
        dependencies.extend(iter);
        dependencies
    }
}

impl Extend<Tag> for Dependencies {
    fn extend<I: IntoIterator<Item = Tag>>(&mut self, iter: I) {
        for tag in iter {
            self.insert(tag);
        }
    }
}

impl IntoIterator for Dependencies {
    type Item = Tag;
    type IntoIter = indexmap::map::IntoValues<TagId, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.into_values()
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.tags.keys()).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
