// Evaluation Context
// Explicit scope handed to every expression: host state, environments and the output slot

use crate::expression::EvalError;
use crate::pending::Partial;
use crate::value::Value;
use crate::variables::VariableEnvironment;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// In-progress result tree of a structure walk
pub type OutputSlot = Rc<RefCell<Partial>>;

/// Host-provided state: entity id to state, plus the current user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostState {
    #[serde(default)]
    pub states: IndexMap<String, Value>,

    #[serde(default)]
    pub user: Value,
}

impl HostState {
    pub fn new(states: IndexMap<String, Value>) -> Self {
        Self {
            states,
            user: Value::Null,
        }
    }

    pub fn with_user(mut self, user: Value) -> Self {
        self.user = user;
        self
    }

    pub fn state(&self, entity: &str) -> Option<&Value> {
        self.states.get(entity)
    }

    fn states_value(&self) -> Value {
        Value::Object(self.states.clone())
    }

    /// `{states, user}`, the object exposed as `hass`
    pub fn as_value(&self) -> Value {
        Value::Object(IndexMap::from([
            ("states".to_string(), self.states_value()),
            ("user".to_string(), self.user.clone()),
        ]))
    }
}

/// Scope of one evaluation pass.
///
/// Cloning is cheap; nested evaluations take their own copy so nothing an
/// expression does can leak into the caller's scope.
#[derive(Debug, Clone)]
pub struct EvaluationContext<'a> {
    host: &'a HostState,
    statics: Option<&'a VariableEnvironment>,
    dynamics: Option<&'a VariableEnvironment>,
    output: Option<OutputSlot>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(host: &'a HostState) -> Self {
        Self {
            host,
            statics: None,
            dynamics: None,
            output: None,
        }
    }

    pub fn with_statics(mut self, env: &'a VariableEnvironment) -> Self {
        self.statics = Some(env);
        self
    }

    pub fn with_dynamics(mut self, env: &'a VariableEnvironment) -> Self {
        self.dynamics = Some(env);
        self
    }

    pub fn with_output(mut self, output: OutputSlot) -> Self {
        self.output = Some(output);
        self
    }

    pub fn host(&self) -> &'a HostState {
        self.host
    }

    pub fn statics(&self) -> Option<&'a VariableEnvironment> {
        self.statics
    }

    pub fn dynamics(&self) -> Option<&'a VariableEnvironment> {
        self.dynamics
    }

    /// Resolve a bare identifier
    pub fn lookup(&self, name: &str) -> Result<Value, EvalError> {
        if let Some(partial) = self.variable(name) {
            if !partial.is_settled() {
                return Err(EvalError::new(format!(
                    "variable '{}' is still pending",
                    name
                )));
            }
            return Ok(partial.to_value());
        }

        match name {
            "states" => Ok(self.host.states_value()),
            "user" => Ok(self.host.user.clone()),
            "hass" => Ok(self.host.as_value()),
            "vars" => Ok(environment_value(self.dynamics)),
            "svars" => Ok(environment_value(self.statics)),
            // Only in scope while a structure is being walked
            "output" => match &self.output {
                Some(slot) => Ok(slot.borrow().to_value()),
                None => Err(EvalError::new("output is not defined")),
            },
            _ => Err(EvalError::new(format!("{} is not defined", name))),
        }
    }

    /// `states['light.kitchen']` without copying the whole state map
    pub fn lookup_key(&self, name: &str, key: &str) -> Option<Value> {
        if name != "states" || self.variable(name).is_some() {
            return None;
        }
        Some(self.host.state(key).cloned().unwrap_or_default())
    }

    // Dynamic bindings are applied after static ones, so they win
    fn variable(&self, name: &str) -> Option<&'a Partial> {
        self.dynamics
            .and_then(|env| env.named(name))
            .or_else(|| self.statics.and_then(|env| env.named(name)))
    }
}

fn environment_value(env: Option<&VariableEnvironment>) -> Value {
    env.map(VariableEnvironment::as_value)
        .unwrap_or_else(|| Value::Object(IndexMap::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::Tier;

    fn host() -> HostState {
        HostState::new(IndexMap::from([
            ("light.kitchen".to_string(), Value::from("on")),
            ("sensor.temp".to_string(), Value::Number(21.5)),
        ]))
        .with_user(Value::from_iter([("name", "Ada")]))
    }

    #[test]
    fn test_lookup_builtins() {
        let host = host();
        let ctx = EvaluationContext::new(&host);

        assert_eq!(
            ctx.lookup("states").unwrap().as_object().unwrap().len(),
            2
        );
        assert_eq!(
            ctx.lookup("hass").unwrap().as_object().unwrap()["user"],
            host.user
        );
        assert_eq!(ctx.lookup("vars").unwrap(), Value::Object(IndexMap::new()));
        assert!(ctx.lookup("window").is_err());
    }

    #[test]
    fn test_output_undefined_outside_walk() {
        let host = host();
        let ctx = EvaluationContext::new(&host);

        let err = ctx.lookup("output").unwrap_err();
        assert_eq!(err.message, "output is not defined");
    }

    #[test]
    fn test_dynamic_shadows_static() {
        let host = host();
        let mut statics = VariableEnvironment::new(Tier::Static);
        statics.insert_named("mode", Partial::Ready(Value::from("static")));
        statics.insert_named("only_static", Partial::Ready(Value::Bool(true)));
        let mut dynamics = VariableEnvironment::new(Tier::Dynamic);
        dynamics.insert_named("mode", Partial::Ready(Value::from("dynamic")));

        let ctx = EvaluationContext::new(&host)
            .with_statics(&statics)
            .with_dynamics(&dynamics);

        assert_eq!(ctx.lookup("mode").unwrap(), Value::from("dynamic"));
        assert_eq!(ctx.lookup("only_static").unwrap(), Value::Bool(true));
        assert_eq!(
            ctx.lookup("svars").unwrap().as_object().unwrap()["mode"],
            Value::from("static")
        );
    }

    #[test]
    fn test_variable_named_states_shadows_host() {
        let host = host();
        let mut dynamics = VariableEnvironment::new(Tier::Dynamic);
        dynamics.insert_named("states", Partial::Ready(Value::Null));
        let ctx = EvaluationContext::new(&host).with_dynamics(&dynamics);

        assert_eq!(ctx.lookup("states").unwrap(), Value::Null);
        assert_eq!(ctx.lookup_key("states", "light.kitchen"), None);
    }

    #[test]
    fn test_lookup_key_fast_path() {
        let host = host();
        let ctx = EvaluationContext::new(&host);

        assert_eq!(
            ctx.lookup_key("states", "light.kitchen"),
            Some(Value::from("on"))
        );
        assert_eq!(ctx.lookup_key("states", "light.missing"), Some(Value::Null));
        assert_eq!(ctx.lookup_key("user", "name"), None);
    }

    #[test]
    fn test_output_slot_reads_current_tree() {
        let host = host();
        let slot: OutputSlot = Rc::new(RefCell::new(Partial::from_value(&Value::from(vec![1i64]))));
        let ctx = EvaluationContext::new(&host).with_output(slot.clone());

        assert_eq!(ctx.lookup("output").unwrap(), Value::from(vec![1i64]));
        *slot.borrow_mut() = Partial::Ready(Value::from("patched"));
        assert_eq!(ctx.lookup("output").unwrap(), Value::from("patched"));
    }
}
