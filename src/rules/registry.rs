//! Rule registry.

use super::{builtin, Rule};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Explicitly populated set of rules. Iteration follows registration order.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<Arc<dyn Rule>>,
    index: HashMap<String, usize>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in rule set.
    pub fn builtin() -> Result<Self> {
        Self::from_rules(builtin::all())
    }

    /// A registry holding `rules` in order. Fails on the first duplicate name.
    pub fn from_rules(rules: impl IntoIterator<Item = Arc<dyn Rule>>) -> Result<Self> {
        let mut registry = Self::new();
        for rule in rules {
            registry.register(rule)?;
        }
        Ok(registry)
    }

    /// Add a rule. Names are unique; a second rule with the same name is rejected.
    pub fn register(&mut self, rule: Arc<dyn Rule>) -> Result<()> {
        let name = rule.name().to_string();
        if self.index.contains_key(&name) {
            return Err(Error::Registry(format!("rule '{}' is already registered", name)));
        }
        self.index.insert(name, self.rules.len());
        self.rules.push(rule);
        Ok(())
    }

    pub fn with_rule(mut self, rule: Arc<dyn Rule>) -> Result<Self> {
        self.register(rule)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Rule>> {
        self.index.get(name).map(|&i| self.rules[i].clone())
    }

    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Rule>> {
        self.rules.iter()
    }

    pub fn rules(&self) -> &[Arc<dyn Rule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("rules", &self.rules.iter().map(|r| r.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{FnRule, RequirementLevel, RuleDescriptor, RuleVerdict};

    fn rule(name: &str) -> Arc<dyn Rule> {
        Arc::new(FnRule::new(
            RuleDescriptor::new(name, "Core", RequirementLevel::May),
            |_ctx| Ok(RuleVerdict::pass()),
        ))
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut registry = RuleRegistry::new();
        registry.register(rule("A.Core.1")).unwrap();
        let err = registry.register(rule("A.Core.1")).unwrap_err();
        assert!(matches!(err, Error::Registry(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_iteration_keeps_registration_order() {
        let registry = RuleRegistry::new()
            .with_rule(rule("B.Core.2"))
            .and_then(|r| r.with_rule(rule("A.Core.1")))
            .unwrap();
        let names: Vec<_> = registry.iter().map(|r| r.name().to_string()).collect();
        assert_eq!(names, vec!["B.Core.2", "A.Core.1"]);
        assert!(registry.get("A.Core.1").is_some());
        assert!(!registry.has("C.Core.3"));
    }

    #[test]
    fn test_builtin_set_is_populated() {
        let registry = RuleRegistry::builtin().unwrap();
        assert_eq!(registry.len(), builtin::all().len());
        assert!(registry.has("IndividualProperty.Core.4201"));
    }

    #[test]
    fn test_from_rules_rejects_a_duplicate_name() {
        let err = RuleRegistry::from_rules(vec![rule("A.Core.1"), rule("B.Core.2"), rule("A.Core.1")])
            .unwrap_err();
        assert!(matches!(err, Error::Registry(_)), "{err}");
        assert!(err.to_string().contains("A.Core.1"));
    }
}
