//! Named endpoint factories

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use contracts::ConsumerEndpoint;

use crate::endpoint::{LogEndpoint, NoOutputEndpoint};

/// Produces a fresh endpoint for every simulation
#[derive(Clone)]
pub struct EndpointFactory {
    name: String,
    make: Rc<dyn Fn() -> Box<dyn ConsumerEndpoint>>,
}

impl fmt::Debug for EndpointFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointFactory")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl EndpointFactory {
    pub fn new(
        name: impl Into<String>,
        make: impl Fn() -> Box<dyn ConsumerEndpoint> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            make: Rc::new(make),
        }
    }

    /// Default-construct `E` for every simulation
    pub fn of_type<E>(name: impl Into<String>) -> Self
    where
        E: ConsumerEndpoint + Default + 'static,
    {
        Self::new(name, || Box::new(E::default()))
    }

    /// Clone `endpoint` for every simulation
    pub fn from_instance<E>(endpoint: E) -> Self
    where
        E: ConsumerEndpoint + Clone + 'static,
    {
        let name = endpoint.name().to_string();
        Self::new(name, move || Box::new(endpoint.clone()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn create(&self) -> Box<dyn ConsumerEndpoint> {
        (self.make)()
    }
}

/// Endpoint types selectable by name (e.g. from configuration)
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    factories: BTreeMap<String, EndpointFactory>,
}

impl EndpointRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `none` and `log`
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register::<NoOutputEndpoint>("none");
        registry.register::<LogEndpoint>("log");
        registry
    }

    pub fn register<E>(&mut self, name: &str)
    where
        E: ConsumerEndpoint + Default + 'static,
    {
        self.register_factory(EndpointFactory::of_type::<E>(name));
    }

    /// Add or replace a factory under its own name
    pub fn register_factory(&mut self, factory: EndpointFactory) {
        self.factories.insert(factory.name.clone(), factory);
    }

    pub fn get(&self, name: &str) -> Option<&EndpointFactory> {
        self.factories.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::MemoryEndpoint;

    #[test]
    fn test_builtin_names() {
        let registry = EndpointRegistry::with_builtin();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["log", "none"]);
        assert_eq!(registry.get("log").map(|f| f.create().name().to_string()), Some("log".into()));
        assert!(registry.get("dispatch").is_none());
    }

    #[test]
    fn test_instance_factory_shares_state() {
        let endpoint = MemoryEndpoint::default();
        let factory = EndpointFactory::from_instance(endpoint.clone());
        assert_eq!(factory.name(), "memory");

        let mut registry = EndpointRegistry::new();
        registry.register_factory(factory);
        assert!(registry.contains("memory"));
    }
}
