//! Stages: named, prioritised, grouped wrappers around middleware.
//!
//! A stage wraps one of three middleware sources:
//!
//! | Source | Name | Constructed |
//! |---|---|---|
//! | instance | the middleware's [`name`](Middleware::name) | up front |
//! | closure | `closure:{n}`, unique per stage | up front |
//! | deferred | the declared type name | on first use, through a [`Resolver`] |
//!
//! Priority and group are resolved in the same order for every source: an
//! explicit override on the stage wins, then whatever the middleware
//! declares through [`PriorityProvider`](crate::PriorityProvider) /
//! [`GroupProvider`](crate::GroupProvider), then [`DEFAULT_PRIORITY`] and
//! [`MiddlewareGroup::Generic`].

use crate::middleware::{BoxFuture, FnMiddleware, Middleware, Next};
use crate::resolver::{Parameters, Resolver};
use harvest_core::{HarvestError, HarvestResult, MiddlewareGroup, Request, Response};
use once_cell::sync::OnceCell;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Priority used when neither the stage nor its middleware declares one.
pub const DEFAULT_PRIORITY: i32 = 10;

/// Name of the synthetic stage that closes every dispatched chain.
pub(crate) const TERMINAL_STAGE: &str = "NotFound";

static CLOSURE_IDS: AtomicU64 = AtomicU64::new(1);

/// A deferred middleware declaration.
///
/// The textual form is `[?]TypeName[:priority]`: a leading `?` marks the
/// stage optional and a trailing integer after `:` sets its priority. A
/// suffix that is not an integer is dropped.
///
/// ```
/// use harvest_middleware::DeferredSpec;
///
/// let spec = DeferredSpec::parse("?Cors:5");
/// assert_eq!(spec.type_name(), "Cors");
/// assert!(spec.is_optional());
/// assert_eq!(spec.priority(), Some(5));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredSpec {
    type_name: String,
    optional: bool,
    priority: Option<i32>,
    parameters: Parameters,
}

impl DeferredSpec {
    /// Creates a required declaration with no priority and no parameters.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            optional: false,
            priority: None,
            parameters: Parameters::new(),
        }
    }

    /// Parses the `[?]TypeName[:priority]` form.
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        let (optional, rest) = match spec.strip_prefix('?') {
            Some(rest) => (true, rest),
            None => (false, spec),
        };
        let (type_name, priority) = match rest.split_once(':') {
            Some((name, priority)) => (name, priority.trim().parse().ok()),
            None => (rest, None),
        };

        Self {
            type_name: type_name.trim().to_string(),
            optional,
            priority,
            parameters: Parameters::new(),
        }
    }

    /// Marks the declaration optional or required.
    #[must_use]
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the constructor parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// The declared type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Whether a failed resolution drops the stage instead of failing.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// The declared priority, if any.
    pub fn priority(&self) -> Option<i32> {
        self.priority
    }

    /// The constructor parameters.
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }
}

impl From<&str> for DeferredSpec {
    fn from(spec: &str) -> Self {
        Self::parse(spec)
    }
}

#[derive(Clone)]
enum StageKind {
    Instance(Arc<dyn Middleware>),
    Closure(Arc<dyn Middleware>),
    Deferred(Deferred),
    Terminal,
}

#[derive(Clone)]
struct Deferred {
    spec: DeferredSpec,
    resolver: Arc<dyn Resolver>,
    resolved: Arc<OnceCell<Option<Arc<dyn Middleware>>>>,
}

impl Deferred {
    fn resolve(&self) -> HarvestResult<Option<Arc<dyn Middleware>>> {
        self.resolved
            .get_or_try_init(|| {
                match self
                    .resolver
                    .resolve(&self.spec.type_name, &self.spec.parameters)
                {
                    Ok(middleware) => {
                        debug!(stage = %self.spec.type_name, "resolved deferred middleware");
                        Ok(Some(middleware))
                    }
                    Err(error) if self.spec.optional => {
                        debug!(
                            stage = %self.spec.type_name,
                            error = %error,
                            "optional middleware unavailable, stage will pass through"
                        );
                        Ok(None)
                    }
                    Err(error) => Err(error),
                }
            })
            .cloned()
    }
}

/// A named, prioritised, grouped unit of the middleware chain.
///
/// # Example
///
/// ```
/// use harvest_middleware::{Stage, DEFAULT_PRIORITY};
/// use harvest_core::MiddlewareGroup;
///
/// let stage = Stage::closure(|request, next: harvest_middleware::Next| async move {
///     next.handle(request).await
/// })
/// .with_group(MiddlewareGroup::Inbound);
///
/// assert!(stage.name().starts_with("closure:"));
/// assert_eq!(stage.group(), MiddlewareGroup::Inbound);
/// assert_eq!(stage.priority(), DEFAULT_PRIORITY);
/// ```
#[derive(Clone)]
pub struct Stage {
    name: String,
    kind: StageKind,
    priority: Option<i32>,
    group: Option<MiddlewareGroup>,
}

impl Stage {
    /// Wraps an already constructed middleware.
    pub fn instance(middleware: impl Middleware) -> Self {
        Self::from_arc(Arc::new(middleware))
    }

    /// Wraps a shared middleware.
    pub fn from_arc(middleware: Arc<dyn Middleware>) -> Self {
        Self {
            name: middleware.name().to_string(),
            kind: StageKind::Instance(middleware),
            priority: None,
            group: None,
        }
    }

    /// Wraps an async closure. Every call yields a distinct name.
    pub fn closure<F, Fut>(func: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HarvestResult<Response>> + Send + 'static,
    {
        let id = CLOSURE_IDS.fetch_add(1, Ordering::Relaxed);
        Self {
            name: format!("closure:{id}"),
            kind: StageKind::Closure(Arc::new(FnMiddleware::new(func))),
            priority: None,
            group: None,
        }
    }

    /// Declares a middleware to be constructed by `resolver` on first use.
    ///
    /// A priority carried by the declaration becomes the stage's explicit
    /// priority.
    pub fn deferred(spec: impl Into<DeferredSpec>, resolver: Arc<dyn Resolver>) -> Self {
        let spec = spec.into();
        Self {
            name: spec.type_name.clone(),
            priority: spec.priority,
            group: None,
            kind: StageKind::Deferred(Deferred {
                spec,
                resolver,
                resolved: Arc::new(OnceCell::new()),
            }),
        }
    }

    pub(crate) fn terminal() -> Self {
        Self {
            name: TERMINAL_STAGE.to_string(),
            kind: StageKind::Terminal,
            priority: None,
            group: Some(MiddlewareGroup::Generator),
        }
    }

    /// Overrides the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Overrides the group.
    #[must_use]
    pub fn with_group(mut self, group: MiddlewareGroup) -> Self {
        self.group = Some(group);
        self
    }

    /// Sets or clears the priority override.
    pub fn set_priority(&mut self, priority: Option<i32>) {
        self.priority = priority;
    }

    /// Sets or clears the group override.
    pub fn set_group(&mut self, group: Option<MiddlewareGroup>) {
        self.group = group;
    }

    /// The key this stage is stored under in a profile.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The effective priority: override, then declared, then
    /// [`DEFAULT_PRIORITY`].
    pub fn priority(&self) -> i32 {
        self.priority.unwrap_or_else(|| self.default_priority())
    }

    /// The priority the middleware declares, ignoring any override.
    ///
    /// Deferred stages are resolved to answer this. A stage that cannot be
    /// resolved reports [`DEFAULT_PRIORITY`].
    pub fn default_priority(&self) -> i32 {
        self.peek()
            .as_deref()
            .and_then(|middleware| middleware.as_priority_provider())
            .map_or(DEFAULT_PRIORITY, |provider| provider.priority())
    }

    /// The explicit priority override, if any.
    pub fn priority_override(&self) -> Option<i32> {
        self.priority
    }

    /// The effective group: override, then declared, then
    /// [`MiddlewareGroup::Generic`].
    pub fn group(&self) -> MiddlewareGroup {
        self.group.unwrap_or_else(|| self.default_group())
    }

    /// The group the middleware declares, ignoring any override.
    pub fn default_group(&self) -> MiddlewareGroup {
        self.peek()
            .as_deref()
            .and_then(|middleware| middleware.as_group_provider())
            .map_or(MiddlewareGroup::Generic, |provider| provider.group())
    }

    /// The explicit group override, if any.
    pub fn group_override(&self) -> Option<MiddlewareGroup> {
        self.group
    }

    /// Returns `true` for deferred stages.
    pub fn is_deferred(&self) -> bool {
        matches!(self.kind, StageKind::Deferred(_))
    }

    /// Returns `true` for closure stages.
    pub fn is_closure(&self) -> bool {
        matches!(self.kind, StageKind::Closure(_))
    }

    /// Returns `true` for optional deferred stages.
    pub fn is_optional(&self) -> bool {
        matches!(&self.kind, StageKind::Deferred(deferred) if deferred.spec.optional)
    }

    /// Returns the middleware, resolving it first for deferred stages.
    ///
    /// `Ok(None)` means an optional stage whose middleware is unavailable.
    /// Resolution happens at most once per successful outcome.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Resolution`] when a required deferred
    /// middleware cannot be constructed.
    pub fn middleware(&self) -> HarvestResult<Option<Arc<dyn Middleware>>> {
        match &self.kind {
            StageKind::Instance(middleware) | StageKind::Closure(middleware) => {
                Ok(Some(Arc::clone(middleware)))
            }
            StageKind::Deferred(deferred) => deferred.resolve(),
            StageKind::Terminal => Ok(None),
        }
    }

    fn peek(&self) -> Option<Arc<dyn Middleware>> {
        self.middleware().ok().flatten()
    }

    /// Runs the stage as an owned future so it can be parked mid-flight.
    pub(crate) fn run(
        self: Arc<Self>,
        request: Request,
        next: Next,
    ) -> BoxFuture<'static, HarvestResult<Response>> {
        Box::pin(async move {
            if matches!(self.kind, StageKind::Terminal) {
                return Err(HarvestError::not_found(
                    request.method().as_str(),
                    request.uri().path(),
                ));
            }

            match self.middleware()? {
                Some(middleware) => middleware.process(request, next).await,
                None => next.handle(request).await,
            }
        })
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            StageKind::Instance(_) => "instance",
            StageKind::Closure(_) => "closure",
            StageKind::Deferred(_) => "deferred",
            StageKind::Terminal => "terminal",
        };
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("kind", &kind)
            .field("priority", &self.priority)
            .field("group", &self.group)
            .finish()
    }
}
