//! Component factory: `component type name | alias → constructor`.

use crate::model::component::{ModelComponent, DATA_COMPONENT, SEQUENTIAL_ITER_COMPONENT};
use std::collections::HashMap;

type Constructor = Box<dyn Fn() -> ModelComponent + Send + Sync>;

pub struct ComponentFactory {
    constructors: HashMap<String, Constructor>,
    aliases: HashMap<String, String>,
}

impl ComponentFactory {
    /// A factory knowing the built-in component types.
    pub fn new() -> Self {
        let mut factory = Self {
            constructors: HashMap::new(),
            aliases: HashMap::new(),
        };
        factory.register(SEQUENTIAL_ITER_COMPONENT, || ModelComponent::aggregate(""));
        factory.register_alias("SequentialIterComponent", SEQUENTIAL_ITER_COMPONENT);
        factory.register_alias("AggregateComponent", SEQUENTIAL_ITER_COMPONENT);
        factory.register(DATA_COMPONENT, || ModelComponent::data(""));
        factory.register_alias("DataComponent", DATA_COMPONENT);
        factory
    }

    pub fn register<F>(&mut self, type_name: &str, constructor: F)
    where
        F: Fn() -> ModelComponent + Send + Sync + 'static,
    {
        self.constructors
            .insert(type_name.to_string(), Box::new(constructor));
    }

    pub fn register_alias(&mut self, alias: &str, type_name: &str) {
        self.aliases
            .insert(alias.to_string(), type_name.to_string());
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    fn resolve(&self, name: &str) -> Option<&Constructor> {
        self.constructors.get(name).or_else(|| {
            self.aliases
                .get(name)
                .and_then(|type_name| self.constructors.get(type_name))
        })
    }

    /// Create an unnamed component of the given type or alias.
    pub fn create_model_component(&self, type_name: &str) -> Option<ModelComponent> {
        match self.resolve(type_name) {
            Some(constructor) => Some(constructor()),
            None => {
                tracing::debug!("No component type registered as '{}'", type_name);
                None
            }
        }
    }

    /// Create a component and give it a (not yet unique) name.
    pub fn create_named(&self, type_name: &str, name: &str) -> Option<ModelComponent> {
        let mut component = self.create_model_component(type_name)?;
        component.set_name(name);
        Some(component)
    }
}

impl Default for ComponentFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_types_and_aliases() {
        let factory = ComponentFactory::new();
        let agg = factory.create_model_component("AggregateComponent").unwrap();
        assert!(agg.is_aggregate());
        let agg = factory.create_model_component("NMSequentialIterComponent").unwrap();
        assert!(agg.is_aggregate());
        let buf = factory.create_named("DataComponent", "Buf").unwrap();
        assert!(buf.is_data());
        assert_eq!(buf.name(), "Buf");
        assert!(factory.create_model_component("NMNoSuchComponent").is_none());
    }

    #[test]
    fn test_custom_registration() {
        let mut factory = ComponentFactory::new();
        factory.register("NMConditionalIterComponent", || {
            let mut c = ModelComponent::aggregate("");
            c.set_description("conditional");
            c
        });
        factory.register_alias("ConditionalIterComponent", "NMConditionalIterComponent");
        let c = factory
            .create_model_component("ConditionalIterComponent")
            .unwrap();
        assert_eq!(c.description(), "conditional");
        assert!(factory.is_registered("NMConditionalIterComponent"));
    }
}
