use std::collections::BTreeMap;

use studio_core::config::AppConfig;
use studio_core::traits::PortTemplates;
use studio_core::types::Port;

/// Port layouts per node kind.
///
/// Starts from the built-in canvas kinds; configuration can add or override
/// kinds.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, Vec<Port>>,
}

impl TemplateRegistry {
    /// An empty registry that knows no kinds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in kinds.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("input", vec![Port::output("output")]);
        registry.register(
            "agent",
            vec![
                Port::required_input("input"),
                Port::input("context"),
                Port::output("output"),
            ],
        );
        registry.register(
            "condition",
            vec![
                Port::required_input("input"),
                Port::output("true"),
                Port::output("false"),
            ],
        );
        registry.register(
            "action",
            vec![Port::required_input("input"), Port::output("output")],
        );
        registry.register("output", vec![Port::required_input("input")]);
        registry
    }

    /// Built-in kinds plus the `[templates]` section of `config`.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::builtin();
        for (kind, template) in &config.templates {
            registry.register(kind.clone(), template.ports.clone());
        }
        registry
    }

    /// Register (or replace) the ports for a kind.
    pub fn register(&mut self, kind: impl Into<String>, ports: Vec<Port>) {
        self.templates.insert(kind.into(), ports);
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl PortTemplates for TemplateRegistry {
    fn ports(&self, kind: &str) -> Option<Vec<Port>> {
        self.templates.get(kind).cloned()
    }

    fn kinds(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }
}
