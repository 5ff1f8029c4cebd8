//! Deferred middleware resolution.
//!
//! A deferred stage names its middleware by type name and is only
//! constructed the first time it is needed. The [`Resolver`] trait performs
//! that construction; [`Registry`] is the stock implementation, a map from
//! type names to factories.

use crate::middleware::Middleware;
use harvest_core::{Environment, HarvestError, HarvestResult};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Constructor parameters for a deferred middleware.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Builds middleware instances from a type name and parameters.
pub trait Resolver: Send + Sync {
    /// Constructs the middleware registered as `type_name`.
    fn resolve(&self, type_name: &str, parameters: &Parameters)
        -> HarvestResult<Arc<dyn Middleware>>;
}

impl<F> Resolver for F
where
    F: Fn(&str, &Parameters) -> HarvestResult<Arc<dyn Middleware>> + Send + Sync,
{
    fn resolve(
        &self,
        type_name: &str,
        parameters: &Parameters,
    ) -> HarvestResult<Arc<dyn Middleware>> {
        self(type_name, parameters)
    }
}

/// A middleware that can be built from deferred-stage parameters.
pub trait FromParameters: Sized {
    /// Builds the middleware from `parameters`.
    fn from_parameters(parameters: &Parameters) -> HarvestResult<Self>;
}

/// Deserializes `parameters` into a configuration struct.
///
/// Unknown keys are ignored and missing keys fall back to the struct's
/// serde defaults.
pub fn parameters_into<T: DeserializeOwned>(
    type_name: &str,
    parameters: &Parameters,
) -> HarvestResult<T> {
    serde_json::from_value(serde_json::Value::Object(parameters.clone()))
        .map_err(|e| HarvestError::resolution(type_name, format!("invalid parameters: {e}")))
}

type Factory = Arc<dyn Fn(&Parameters) -> HarvestResult<Arc<dyn Middleware>> + Send + Sync>;

/// A name-keyed table of middleware factories.
///
/// # Example
///
/// ```
/// use harvest_middleware::{Registry, Resolver, Parameters};
/// use harvest_core::Environment;
///
/// let registry = Registry::with_builtins(Environment::Development);
/// assert!(registry.contains("Cors"));
/// assert!(registry.resolve("Cors", &Parameters::new()).is_ok());
/// assert!(registry.resolve("Unknown", &Parameters::new()).is_err());
/// ```
#[derive(Clone, Default)]
pub struct Registry {
    factories: HashMap<String, Factory>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in stage, configured for
    /// `environment`.
    #[must_use]
    pub fn with_builtins(environment: Environment) -> Self {
        let mut registry = Self::new();
        crate::stages::register_builtins(&mut registry, environment);
        registry
    }

    /// Registers a factory under `type_name`, replacing any previous one.
    pub fn register<F>(&mut self, type_name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Parameters) -> HarvestResult<Arc<dyn Middleware>> + Send + Sync + 'static,
    {
        self.factories.insert(type_name.into(), Arc::new(factory));
        self
    }

    /// Registers a middleware built with [`FromParameters`].
    pub fn register_configurable<M>(&mut self, type_name: impl Into<String>) -> &mut Self
    where
        M: Middleware + FromParameters,
    {
        self.register(type_name, |parameters| {
            M::from_parameters(parameters).map(|m| Arc::new(m) as Arc<dyn Middleware>)
        })
    }

    /// Registers a middleware built with [`Default`], ignoring parameters.
    pub fn register_default<M>(&mut self, type_name: impl Into<String>) -> &mut Self
    where
        M: Middleware + Default,
    {
        self.register(type_name, |_| Ok(Arc::new(M::default()) as Arc<dyn Middleware>))
    }

    /// Returns `true` if `type_name` has a factory.
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Returns the registered type names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered factories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Resolver for Registry {
    fn resolve(
        &self,
        type_name: &str,
        parameters: &Parameters,
    ) -> HarvestResult<Arc<dyn Middleware>> {
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| HarvestError::resolution(type_name, "no factory is registered"))?;
        factory(parameters)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{BoxFuture, Next};
    use harvest_core::{Request, Response};
    use serde::Deserialize;

    #[derive(Default)]
    struct Passthrough;

    impl Middleware for Passthrough {
        fn process<'a>(
            &'a self,
            request: Request,
            next: Next,
        ) -> BoxFuture<'a, HarvestResult<Response>> {
            Box::pin(next.handle(request))
        }
    }

    #[derive(Deserialize, Default)]
    #[serde(default)]
    struct Tagged {
        tag: String,
    }

    impl Middleware for Tagged {
        fn process<'a>(
            &'a self,
            request: Request,
            next: Next,
        ) -> BoxFuture<'a, HarvestResult<Response>> {
            Box::pin(next.handle(request))
        }
    }

    impl FromParameters for Tagged {
        fn from_parameters(parameters: &Parameters) -> HarvestResult<Self> {
            parameters_into("Tagged", parameters)
        }
    }

    #[test]
    fn test_unknown_type_fails() {
        let registry = Registry::new();
        let error = registry
            .resolve("Missing", &Parameters::new())
            .err()
            .unwrap();
        assert_eq!(error.category(), harvest_core::ErrorCategory::Resolution);
    }

    #[test]
    fn test_register_default() {
        let mut registry = Registry::new();
        registry.register_default::<Passthrough>("Passthrough");

        let middleware = registry.resolve("Passthrough", &Parameters::new()).unwrap();
        assert_eq!(middleware.name(), "Passthrough");
        assert_eq!(registry.names(), vec!["Passthrough"]);
    }

    #[test]
    fn test_parameters_into() {
        let mut parameters = Parameters::new();
        parameters.insert("tag".into(), serde_json::json!("blue"));
        let tagged: Tagged = parameters_into("Tagged", &parameters).unwrap();
        assert_eq!(tagged.tag, "blue");

        parameters.insert("tag".into(), serde_json::json!(42));
        assert!(parameters_into::<Tagged>("Tagged", &parameters).is_err());
    }

    #[test]
    fn test_register_configurable() {
        let mut registry = Registry::new();
        registry.register_configurable::<Tagged>("Tagged");
        assert!(registry.resolve("Tagged", &Parameters::new()).is_ok());
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |name: &str, _: &Parameters| -> HarvestResult<Arc<dyn Middleware>> {
            match name {
                "Passthrough" => Ok(Arc::new(Passthrough)),
                other => Err(HarvestError::resolution(other, "unsupported")),
            }
        };
        assert!(resolver.resolve("Passthrough", &Parameters::new()).is_ok());
        assert!(resolver.resolve("Other", &Parameters::new()).is_err());
    }
}
