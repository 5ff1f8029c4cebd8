//! Profiles: named, ordered collections of stages.
//!
//! A profile maps stage names to stages. Adding a stage under a name that is
//! already present replaces the old stage and moves the name to the end of
//! insertion order. [`Profile::to_ordered_list`] returns the stages sorted
//! by group, then by priority, with insertion order breaking ties. The
//! sorted list is cached until the profile changes.

use crate::middleware::{Middleware, Next};
use crate::resolver::{Parameters, Registry, Resolver};
use crate::stage::{DeferredSpec, Stage};
use harvest_core::{HarvestResult, MiddlewareGroup, Request, Response};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::trace;

/// Anything that can be added to a profile.
pub enum ProfileEntry {
    /// A ready-made stage.
    Stage(Stage),
    /// A middleware instance.
    Middleware(Arc<dyn Middleware>),
    /// A deferred declaration, resolved through the profile's resolver.
    Deferred(DeferredSpec),
    /// A list of entries, added in order.
    Nested(Vec<ProfileEntry>),
}

impl ProfileEntry {
    /// A deferred entry with constructor parameters.
    pub fn configured(spec: &str, parameters: Parameters) -> Self {
        Self::Deferred(DeferredSpec::parse(spec).with_parameters(parameters))
    }

    /// A middleware instance entry.
    pub fn middleware(middleware: impl Middleware) -> Self {
        Self::Middleware(Arc::new(middleware))
    }
}

impl From<Stage> for ProfileEntry {
    fn from(stage: Stage) -> Self {
        Self::Stage(stage)
    }
}

impl From<Arc<dyn Middleware>> for ProfileEntry {
    fn from(middleware: Arc<dyn Middleware>) -> Self {
        Self::Middleware(middleware)
    }
}

impl From<DeferredSpec> for ProfileEntry {
    fn from(spec: DeferredSpec) -> Self {
        Self::Deferred(spec)
    }
}

impl From<&str> for ProfileEntry {
    fn from(spec: &str) -> Self {
        Self::Deferred(DeferredSpec::parse(spec))
    }
}

impl From<String> for ProfileEntry {
    fn from(spec: String) -> Self {
        Self::Deferred(DeferredSpec::parse(&spec))
    }
}

impl<T: Into<ProfileEntry>> From<Vec<T>> for ProfileEntry {
    fn from(entries: Vec<T>) -> Self {
        Self::Nested(entries.into_iter().map(Into::into).collect())
    }
}

/// Something that identifies a stage within a profile.
pub trait StageKey {
    /// The stage name this key refers to.
    fn stage_key(&self) -> Cow<'_, str>;

    /// The key taken literally, tried before [`StageKey::stage_key`].
    fn exact_key(&self) -> Option<&str> {
        None
    }
}

impl StageKey for str {
    fn exact_key(&self) -> Option<&str> {
        Some(self)
    }

    fn stage_key(&self) -> Cow<'_, str> {
        let spec = self.trim().trim_start_matches('?');
        Cow::Borrowed(spec.split_once(':').map_or(spec, |(name, _)| name).trim())
    }
}

impl StageKey for String {
    fn exact_key(&self) -> Option<&str> {
        Some(self)
    }

    fn stage_key(&self) -> Cow<'_, str> {
        self.as_str().stage_key()
    }
}

impl StageKey for Stage {
    fn stage_key(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.name())
    }
}

impl StageKey for dyn Middleware {
    fn stage_key(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.name())
    }
}

/// A named collection of stages with a cached sort order.
///
/// # Example
///
/// ```
/// use harvest_middleware::{Profile, Registry};
/// use harvest_core::{Environment, MiddlewareGroup};
/// use std::sync::Arc;
///
/// let mut profile = Profile::new()
///     .with_resolver(Arc::new(Registry::with_builtins(Environment::Production)));
/// profile.add("Cors").add("ErrorHandler");
///
/// let names: Vec<String> = profile
///     .to_ordered_list()
///     .iter()
///     .map(|stage| stage.name().to_string())
///     .collect();
/// assert_eq!(names, ["ErrorHandler", "Cors"]);
/// ```
pub struct Profile {
    stages: IndexMap<String, Arc<Stage>>,
    resolver: Arc<dyn Resolver>,
    ordered: Mutex<Option<Arc<[Arc<Stage>]>>>,
}

impl Profile {
    /// Creates an empty profile whose deferred stages resolve against an
    /// empty [`Registry`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            stages: IndexMap::new(),
            resolver: Arc::new(Registry::new()),
            ordered: Mutex::new(None),
        }
    }

    /// Creates a profile from a list of entries.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ProfileEntry>,
    {
        let mut profile = Self::new();
        profile.extend(entries);
        profile
    }

    /// Sets the resolver used by deferred entries added from now on.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replaces the resolver used by deferred entries added from now on.
    pub fn set_resolver(&mut self, resolver: Arc<dyn Resolver>) {
        self.resolver = resolver;
    }

    /// The resolver used for deferred entries.
    pub fn resolver(&self) -> &Arc<dyn Resolver> {
        &self.resolver
    }

    /// Adds an entry with the stage's own priority and group.
    pub fn add(&mut self, entry: impl Into<ProfileEntry>) -> &mut Self {
        self.add_with(entry, None, None)
    }

    /// Adds an entry, overriding group and priority when given.
    ///
    /// Overrides apply to every stage of a nested entry.
    pub fn add_with(
        &mut self,
        entry: impl Into<ProfileEntry>,
        group: Option<MiddlewareGroup>,
        priority: Option<i32>,
    ) -> &mut Self {
        let mut stage = match entry.into() {
            ProfileEntry::Nested(entries) => {
                for entry in entries {
                    self.add_with(entry, group, priority);
                }
                return self;
            }
            ProfileEntry::Stage(stage) => stage,
            ProfileEntry::Middleware(middleware) => Stage::from_arc(middleware),
            ProfileEntry::Deferred(spec) => Stage::deferred(spec, Arc::clone(&self.resolver)),
        };

        if group.is_some() {
            stage.set_group(group);
        }
        if priority.is_some() {
            stage.set_priority(priority);
        }
        self.insert(stage);
        self
    }

    /// Adds a middleware instance.
    pub fn add_middleware(&mut self, middleware: impl Middleware) -> &mut Self {
        self.add(Stage::instance(middleware))
    }

    /// Adds an async closure as a stage.
    pub fn add_fn<F, Fut>(&mut self, func: F) -> &mut Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HarvestResult<Response>> + Send + 'static,
    {
        self.add(Stage::closure(func))
    }

    /// Adds a deferred stage from its `[?]TypeName[:priority]` form.
    pub fn add_deferred(&mut self, spec: &str) -> &mut Self {
        self.add(DeferredSpec::parse(spec))
    }

    /// Adds a deferred stage with constructor parameters.
    pub fn add_deferred_with(&mut self, spec: &str, parameters: Parameters) -> &mut Self {
        self.add(ProfileEntry::configured(spec, parameters))
    }

    /// Adds every entry in order.
    pub fn extend<I>(&mut self, entries: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<ProfileEntry>,
    {
        for entry in entries {
            self.add(entry);
        }
        self
    }

    /// Name under which `key` is looked up. A literal stage name wins over
    /// the `?Type:priority` reading of the same string.
    fn lookup_key<'k, K: StageKey + ?Sized>(&self, key: &'k K) -> Cow<'k, str> {
        match key.exact_key() {
            Some(exact) if self.stages.contains_key(exact) => Cow::Borrowed(exact),
            _ => key.stage_key(),
        }
    }

    /// Removes a stage, returning it if it was present.
    pub fn remove<K: StageKey + ?Sized>(&mut self, key: &K) -> Option<Arc<Stage>> {
        let key = self.lookup_key(key);
        let removed = self.stages.shift_remove(key.as_ref());
        if removed.is_some() {
            self.invalidate();
        }
        removed
    }

    /// Returns `true` if a stage is stored under the key.
    pub fn has<K: StageKey + ?Sized>(&self, key: &K) -> bool {
        self.stages.contains_key(self.lookup_key(key).as_ref())
    }

    /// Returns the stage stored under the key.
    pub fn get<K: StageKey + ?Sized>(&self, key: &K) -> Option<&Stage> {
        self.stages.get(self.lookup_key(key).as_ref()).map(Arc::as_ref)
    }

    /// Returns the stage stored under the key for modification.
    ///
    /// The cached order is dropped since priority or group may change.
    pub fn get_mut<K: StageKey + ?Sized>(&mut self, key: &K) -> Option<&mut Stage> {
        let key = self.lookup_key(key);
        let stage = self.stages.get_mut(key.as_ref())?;
        *self.ordered.get_mut() = None;
        Some(Arc::make_mut(stage))
    }

    /// Returns the stages sorted by group, then priority, then insertion
    /// order.
    pub fn to_ordered_list(&self) -> Arc<[Arc<Stage>]> {
        let mut cached = self.ordered.lock();
        if let Some(list) = cached.as_ref() {
            return Arc::clone(list);
        }

        let mut ordered: Vec<Arc<Stage>> = self.stages.values().cloned().collect();
        ordered.sort_by_cached_key(|stage| (stage.group(), stage.priority()));
        trace!(stages = ordered.len(), "sorted middleware profile");

        let list: Arc<[Arc<Stage>]> = ordered.into();
        *cached = Some(Arc::clone(&list));
        list
    }

    /// Returns `true` if a sorted list is cached.
    pub fn is_sorted(&self) -> bool {
        self.ordered.lock().is_some()
    }

    /// Returns stage names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(String::as_str)
    }

    /// Returns the number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` if the profile holds no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    fn insert(&mut self, stage: Stage) {
        let name = stage.name().to_string();
        self.stages.shift_remove(&name);
        trace!(stage = %name, "added stage to profile");
        self.stages.insert(name, Arc::new(stage));
        self.invalidate();
    }

    fn invalidate(&mut self) {
        *self.ordered.get_mut() = None;
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Profile {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
            resolver: Arc::clone(&self.resolver),
            ordered: Mutex::new(self.ordered.lock().clone()),
        }
    }
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("stages", &self.stages.values().collect::<Vec<_>>())
            .field("sorted", &self.is_sorted())
            .finish_non_exhaustive()
    }
}
