// Variable Environment
// Resolved variables of one tier, in declaration order

use crate::pending::Partial;
use crate::value::Value;
use crate::variables::declaration::Tier;

use indexmap::IndexMap;
use std::fmt::Write;

/// Evaluated variables of one tier.
///
/// Entries may still be pending while the environment is being built; a
/// settled environment has none.
#[derive(Debug, Clone)]
pub struct VariableEnvironment {
    tier: Tier,
    positional: Vec<Partial>,
    named: IndexMap<String, Partial>,
}

impl VariableEnvironment {
    pub fn new(tier: Tier) -> Self {
        Self {
            tier,
            positional: Vec::new(),
            named: IndexMap::new(),
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn named(&self, name: &str) -> Option<&Partial> {
        self.named.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.named.keys().map(String::as_str)
    }

    pub fn positional(&self) -> &[Partial] {
        &self.positional
    }

    /// Current value of a named variable, null while pending
    pub fn value(&self, name: &str) -> Option<Value> {
        self.named.get(name).map(Partial::to_value)
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_settled(&self) -> bool {
        self.positional.iter().all(Partial::is_settled)
            && self.named.values().all(Partial::is_settled)
    }

    /// The environment as seen through `vars` / `svars`: positional entries
    /// under "0", "1", ..., followed by named entries
    pub fn as_value(&self) -> Value {
        let positional = self
            .positional
            .iter()
            .enumerate()
            .map(|(i, entry)| (i.to_string(), entry.to_value()));
        let named = self
            .named
            .iter()
            .map(|(name, entry)| (name.clone(), entry.to_value()));

        Value::Object(positional.chain(named).collect())
    }

    /// One binding line per named entry, in declaration order
    pub fn initializer(&self) -> String {
        let scope = self.tier.scope_name();
        let mut init = String::new();
        for name in self.named.keys() {
            let _ = writeln!(init, "var {} = {}['{}'];", name, scope, name);
        }
        init
    }

    pub(crate) fn push_positional(&mut self, entry: Partial) {
        self.positional.push(entry);
    }

    pub(crate) fn insert_named(&mut self, name: impl Into<String>, entry: Partial) {
        self.named.insert(name.into(), entry);
    }

    /// Replace settled pending entries by their values
    pub(crate) fn resolve(&mut self) {
        self.positional.iter_mut().for_each(Partial::resolve);
        self.named.values_mut().for_each(Partial::resolve);
    }
}

/// Bindings of both tiers, static first, so a name bound in both ends up
/// with its dynamic value
pub fn initializer_fragment(
    statics: Option<&VariableEnvironment>,
    dynamics: Option<&VariableEnvironment>,
) -> String {
    [statics, dynamics]
        .into_iter()
        .flatten()
        .map(VariableEnvironment::initializer)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(tier: Tier) -> VariableEnvironment {
        let mut env = VariableEnvironment::new(tier);
        env.push_positional(Partial::Ready(Value::from("first")));
        env.insert_named("unit", Partial::Ready(Value::from("C")));
        env.insert_named("limit", Partial::Ready(Value::Number(10.0)));
        env
    }

    #[test]
    fn test_as_value_positional_then_named() {
        let value = env(Tier::Dynamic).as_value();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["0", "unit", "limit"]);
        assert_eq!(value.as_object().unwrap()["0"], Value::from("first"));
    }

    #[test]
    fn test_initializer_lines() {
        assert_eq!(
            env(Tier::Static).initializer(),
            "var unit = svars['unit'];\nvar limit = svars['limit'];\n"
        );
    }

    #[test]
    fn test_initializer_fragment_static_first() {
        let statics = env(Tier::Static);
        let mut dynamics = VariableEnvironment::new(Tier::Dynamic);
        dynamics.insert_named("unit", Partial::Ready(Value::from("F")));

        let fragment = initializer_fragment(Some(&statics), Some(&dynamics));
        assert!(fragment.ends_with("var unit = vars['unit'];\n"));
        assert!(fragment.starts_with("var unit = svars['unit'];\n"));
    }

    #[test]
    fn test_settled_and_len() {
        let env = env(Tier::Dynamic);
        assert!(env.is_settled());
        assert_eq!(env.len(), 3);
        assert_eq!(env.value("limit"), Some(Value::Number(10.0)));
        assert_eq!(env.value("missing"), None);
    }
}
