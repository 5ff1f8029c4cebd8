//! Core middleware trait and types.
//!
//! This module defines the [`Middleware`] trait that every stage wraps, the
//! [`Next`] handle a middleware uses to delegate to the rest of the chain,
//! and the optional [`PriorityProvider`] / [`GroupProvider`] capabilities a
//! middleware can expose to influence where it is sorted.
//!
//! # Example
//!
//! ```
//! use harvest_middleware::{BoxFuture, Middleware, Next};
//! use harvest_core::{HarvestResult, Request, Response};
//!
//! struct Timing;
//!
//! impl Middleware for Timing {
//!     fn process<'a>(
//!         &'a self,
//!         request: Request,
//!         next: Next,
//!     ) -> BoxFuture<'a, HarvestResult<Response>> {
//!         Box::pin(async move {
//!             let started = std::time::Instant::now();
//!             let mut response = next.handle(request).await?;
//!             let elapsed = started.elapsed().as_millis().to_string();
//!             if let Ok(value) = elapsed.parse() {
//!                 response.headers_mut().insert("x-elapsed-ms", value);
//!             }
//!             Ok(response)
//!         })
//!     }
//! }
//!
//! assert_eq!(Timing.name(), "Timing");
//! ```

use crate::task::Exchange;
use harvest_core::{HarvestError, HarvestResult, MiddlewareGroup, Request, Response};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A boxed future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The middleware contract.
///
/// A middleware receives the request and a [`Next`] handle. It may return a
/// response of its own (short-circuit), or call [`Next::handle`] to run the
/// rest of the chain and then post-process what comes back. Errors raised
/// downstream arrive as the `Err` side of `handle`, so a middleware can
/// recover from them locally.
pub trait Middleware: Send + Sync + 'static {
    /// Returns the name used to key this middleware inside a profile.
    ///
    /// Defaults to the unqualified type name.
    fn name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Processes the request.
    fn process<'a>(&'a self, request: Request, next: Next)
        -> BoxFuture<'a, HarvestResult<Response>>;

    /// Exposes the priority capability, if this middleware declares one.
    fn as_priority_provider(&self) -> Option<&dyn PriorityProvider> {
        None
    }

    /// Exposes the group capability, if this middleware declares one.
    fn as_group_provider(&self) -> Option<&dyn GroupProvider> {
        None
    }
}

/// A middleware that declares its own default priority.
pub trait PriorityProvider {
    /// Lower values run earlier within a group.
    fn priority(&self) -> i32;
}

/// A middleware that declares its own default group.
pub trait GroupProvider {
    /// The group this middleware belongs to.
    fn group(&self) -> MiddlewareGroup;
}

/// Handle to the remainder of the chain.
///
/// Calling [`handle`](Next::handle) suspends the current stage: the request
/// is handed to the dispatcher, which runs the downstream stages and then
/// resumes this stage with their response or error. `handle` may be called
/// again after it resolves, but never twice at the same time.
pub struct Next {
    exchange: Arc<Mutex<Exchange>>,
}

impl Next {
    pub(crate) fn new(exchange: Arc<Mutex<Exchange>>) -> Self {
        Self { exchange }
    }

    /// Delegates `request` to the next stage and waits for the outcome.
    pub fn handle(&self, request: Request) -> Delegate {
        Delegate {
            exchange: Arc::clone(&self.exchange),
            request: Some(request),
        }
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

/// Future returned by [`Next::handle`].
///
/// The first poll deposits the request in the stage's exchange slot and
/// parks. The dispatcher notices the deposit, runs the downstream chain and
/// writes the outcome back into the slot before polling the stage again.
#[must_use = "futures do nothing unless polled"]
pub struct Delegate {
    exchange: Arc<Mutex<Exchange>>,
    request: Option<Request>,
}

impl Future for Delegate {
    type Output = HarvestResult<Response>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut slot = this.exchange.lock();

        if let Some(request) = this.request.take() {
            return match *slot {
                Exchange::Idle => {
                    *slot = Exchange::Forwarded(request);
                    Poll::Pending
                }
                _ => Poll::Ready(Err(HarvestError::stack_corrupted(
                    "stage delegated while a previous delegation was still pending",
                ))),
            };
        }

        match std::mem::replace(&mut *slot, Exchange::Idle) {
            Exchange::Resumed(outcome) => Poll::Ready(outcome),
            pending => {
                *slot = pending;
                Poll::Pending
            }
        }
    }
}

/// A middleware created from an async closure.
///
/// # Example
///
/// ```
/// use harvest_middleware::FnMiddleware;
///
/// let middleware = FnMiddleware::new(|request, next: harvest_middleware::Next| async move {
///     next.handle(request).await
/// });
/// # let _ = middleware;
/// ```
pub struct FnMiddleware<F> {
    func: F,
}

impl<F> FnMiddleware<F> {
    /// Creates a new function-based middleware.
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HarvestResult<Response>> + Send + 'static,
{
    fn name(&self) -> &'static str {
        "closure"
    }

    fn process<'a>(
        &'a self,
        request: Request,
        next: Next,
    ) -> BoxFuture<'a, HarvestResult<Response>> {
        Box::pin((self.func)(request, next))
    }
}

/// Strips the module path and generic arguments from a type name.
pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;

    impl Middleware for Plain {
        fn process<'a>(
            &'a self,
            request: Request,
            next: Next,
        ) -> BoxFuture<'a, HarvestResult<Response>> {
            Box::pin(next.handle(request))
        }
    }

    struct Declared;

    impl PriorityProvider for Declared {
        fn priority(&self) -> i32 {
            -5
        }
    }

    impl GroupProvider for Declared {
        fn group(&self) -> MiddlewareGroup {
            MiddlewareGroup::Inbound
        }
    }

    impl Middleware for Declared {
        fn name(&self) -> &'static str {
            "declared"
        }

        fn process<'a>(
            &'a self,
            request: Request,
            next: Next,
        ) -> BoxFuture<'a, HarvestResult<Response>> {
            Box::pin(next.handle(request))
        }

        fn as_priority_provider(&self) -> Option<&dyn PriorityProvider> {
            Some(self)
        }

        fn as_group_provider(&self) -> Option<&dyn GroupProvider> {
            Some(self)
        }
    }

    #[test]
    fn test_default_name_is_short_type_name() {
        assert_eq!(Plain.name(), "Plain");
        let boxed: Arc<dyn Middleware> = Arc::new(Plain);
        assert_eq!(boxed.name(), "Plain");
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("a::b::Cors"), "Cors");
        assert_eq!(short_type_name("a::FnMiddleware<a::b::{{closure}}>"), "FnMiddleware");
        assert_eq!(short_type_name("Bare"), "Bare");
    }

    #[test]
    fn test_capabilities_are_optional() {
        assert!(Plain.as_priority_provider().is_none());
        assert!(Plain.as_group_provider().is_none());

        let declared: &dyn Middleware = &Declared;
        assert_eq!(declared.as_priority_provider().map(|p| p.priority()), Some(-5));
        assert_eq!(
            declared.as_group_provider().map(|g| g.group()),
            Some(MiddlewareGroup::Inbound)
        );
    }

    #[test]
    fn test_fn_middleware_name() {
        let middleware = FnMiddleware::new(|request, next: Next| next.handle(request));
        assert_eq!(middleware.name(), "closure");
    }
}
