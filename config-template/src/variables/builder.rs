// Variable Environment Builder
// Merges global and local declarations and evaluates every entry of a tier

use crate::context::{EvaluationContext, HostState};
use crate::error::EnvironmentError;
use crate::expression::ExpressionEngine;
use crate::pending::{Outcome, Partial, PendingSet};
use crate::value::Value;
use crate::variables::declaration::{MergedDeclarations, Tier, VariableDeclaration};
use crate::variables::environment::VariableEnvironment;
use crate::walker::{evaluate_template, StructureWalker, TemplateMode};

use futures::future::LocalBoxFuture;
use futures::FutureExt;

/// An environment as built eagerly, plus the entries still in flight
pub struct EnvironmentBuild {
    env: VariableEnvironment,
    pending: PendingSet,
}

impl EnvironmentBuild {
    /// The environment right now; pending entries are still pending in it
    pub fn eager(&self) -> &VariableEnvironment {
        &self.env
    }

    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Wait for every entry, then return the settled environment
    pub fn settle(self) -> LocalBoxFuture<'static, VariableEnvironment> {
        let EnvironmentBuild { mut env, pending } = self;
        async move {
            pending.settle().await;
            env.resolve();
            env
        }
        .boxed_local()
    }

    pub fn into_outcome(self) -> Outcome<VariableEnvironment> {
        if self.is_pending() {
            Outcome::Pending(self.settle())
        } else {
            Outcome::Ready(self.env)
        }
    }
}

/// Builds static and dynamic environments against one host state
pub struct EnvironmentBuilder<'a> {
    engine: &'a ExpressionEngine,
    host: &'a HostState,
}

impl<'a> EnvironmentBuilder<'a> {
    pub fn new(engine: &'a ExpressionEngine, host: &'a HostState) -> Self {
        Self { engine, host }
    }

    /// Build the static tier. Its entries may refer to earlier static entries.
    pub fn build_static(
        &self,
        global: Option<&VariableDeclaration>,
        local: Option<&VariableDeclaration>,
    ) -> EnvironmentBuild {
        self.build(Tier::Static, None, global, local)
    }

    /// Build the dynamic tier on top of a settled static tier
    pub fn build_dynamic(
        &self,
        statics: &VariableEnvironment,
        global: Option<&VariableDeclaration>,
        local: Option<&VariableDeclaration>,
    ) -> Result<EnvironmentBuild, EnvironmentError> {
        if !statics.is_settled() {
            return Err(EnvironmentError::StaticPending);
        }
        Ok(self.build(Tier::Dynamic, Some(statics), global, local))
    }

    fn build(
        &self,
        tier: Tier,
        statics: Option<&VariableEnvironment>,
        global: Option<&VariableDeclaration>,
        local: Option<&VariableDeclaration>,
    ) -> EnvironmentBuild {
        let merged = MergedDeclarations::merge(global, local);
        let mut build = EnvironmentBuild {
            env: VariableEnvironment::new(tier),
            pending: PendingSet::new(),
        };

        // Each entry sees the entries evaluated before it
        for value in &merged.positional {
            let entry = self.evaluate_entry(tier, statics, &build.env, value);
            let entry = track(&mut build.pending, entry);
            build.env.push_positional(entry);
        }

        for (name, value) in &merged.named {
            let entry = self.evaluate_entry(tier, statics, &build.env, value);
            let entry = track(&mut build.pending, entry);
            build.env.insert_named(name.clone(), entry);
        }

        tracing::debug!(
            scope = tier.scope_name(),
            entries = build.env.len(),
            pending = build.pending.len(),
            "built variable environment"
        );
        build
    }

    fn evaluate_entry(
        &self,
        tier: Tier,
        statics: Option<&VariableEnvironment>,
        current: &VariableEnvironment,
        value: &Value,
    ) -> Outcome<Value> {
        let context = EvaluationContext::new(self.host);
        let context = match (tier, statics) {
            (Tier::Static, _) => context.with_statics(current),
            (Tier::Dynamic, Some(statics)) => context.with_statics(statics).with_dynamics(current),
            (Tier::Dynamic, None) => context.with_dynamics(current),
        };

        match value {
            Value::String(template) => {
                evaluate_template(self.engine, template, TemplateMode::Declaration, &context)
            }
            // Nested structures are walked like any configuration tree
            Value::Array(_) | Value::Object(_) => StructureWalker::new(self.engine, context)
                .walk(value)
                .into_outcome(),
            _ => Outcome::Ready(value.clone()),
        }
    }
}

fn track(pending: &mut PendingSet, entry: Outcome<Value>) -> Partial {
    let partial = Partial::from(entry);
    if let Partial::Pending(shared) = &partial {
        let shared = shared.clone();
        pending.track(async move {
            shared.await;
        });
    }
    partial
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::expression::EvalError;
    use futures::channel::oneshot;
    use indexmap::IndexMap;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    fn host() -> HostState {
        HostState::new(IndexMap::from([
            ("sensor.temp".to_string(), Value::from("21.5")),
            ("light.kitchen".to_string(), Value::from("on")),
        ]))
    }

    fn decl(yaml: &str) -> VariableDeclaration {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn engine() -> ExpressionEngine {
        ExpressionEngine::new(EngineConfig::default()).with_async_function(
            "later",
            |args| async move { Ok(args.into_iter().next().unwrap_or_default()) },
        )
    }

    fn ready(build: EnvironmentBuild) -> VariableEnvironment {
        match build.into_outcome() {
            Outcome::Ready(env) => env,
            Outcome::Pending(_) => panic!("environment should be synchronous"),
        }
    }

    #[test]
    fn test_static_entries_evaluated() {
        let engine = engine();
        let host = host();
        let builder = EnvironmentBuilder::new(&engine, &host);

        let env = ready(builder.build_static(
            None,
            Some(&decl("base: 10\ndouble: base * 2\nlit: '$! base'\n")),
        ));

        assert_eq!(env.tier(), Tier::Static);
        assert_eq!(env.value("base"), Some(Value::Number(10.0)));
        assert_eq!(env.value("double"), Some(Value::Number(20.0)));
        assert_eq!(env.value("lit"), Some(Value::from("base")));
    }

    #[test]
    fn test_positional_concatenation() {
        let engine = engine();
        let host = host();
        let builder = EnvironmentBuilder::new(&engine, &host);

        let env = ready(builder.build_static(
            Some(&decl("[1, 2]")),
            Some(&decl("['svars[0] + svars[1]']")),
        ));

        let values: Vec<Value> = env.positional().iter().map(Partial::to_value).collect();
        assert_eq!(
            values,
            vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]
        );
    }

    #[test]
    fn test_nested_values_walked_scalars_verbatim() {
        let engine = engine();
        let host = host();
        let builder = EnvironmentBuilder::new(&engine, &host);

        let env = ready(builder.build_static(
            None,
            Some(&decl(
                "icons: {active: '<$ 1+1 $>', kitchen: \"<$ states['light.kitchen'] $>\", label: plain}\nlist: ['<$ 1+1 $>', 3]\nflag: true\ncount: 4\n",
            )),
        ));

        let icons = env.value("icons").unwrap();
        let icons = icons.as_object().unwrap();
        assert_eq!(icons.get("active"), Some(&Value::Number(2.0)));
        assert_eq!(icons.get("kitchen"), Some(&Value::from("on")));
        assert_eq!(icons.get("label"), Some(&Value::from("plain")));
        assert_eq!(
            env.value("list"),
            Some(Value::Array(vec![Value::Number(2.0), Value::Number(3.0)]))
        );
        assert_eq!(env.value("flag"), Some(Value::Bool(true)));
        assert_eq!(env.value("count"), Some(Value::Number(4.0)));
    }

    #[tokio::test]
    async fn test_pending_leaf_inside_declared_object() {
        let engine = engine();
        let host = host();
        let builder = EnvironmentBuilder::new(&engine, &host);

        let build = builder.build_static(
            None,
            Some(&decl("icons: {slow: '<$ later(5) $>', fast: '<$ 1 $>'}\n")),
        );
        assert!(build.is_pending());

        let env = build.settle().await;
        assert!(env.is_settled());
        let icons = env.value("icons").unwrap();
        let icons = icons.as_object().unwrap();
        assert_eq!(icons.get("slow"), Some(&Value::Number(5.0)));
        assert_eq!(icons.get("fast"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn test_dynamic_sees_static_and_overrides_global() {
        let engine = engine();
        let host = host();
        let builder = EnvironmentBuilder::new(&engine, &host);

        let statics = ready(builder.build_static(None, Some(&decl("offset: 0.5\n"))));
        let dynamics = ready(
            builder
                .build_dynamic(
                    &statics,
                    Some(&decl("temp: \"'global'\"\nunit: \"'C'\"\n")),
                    Some(&decl("temp: \"number(states['sensor.temp']) + offset\"\n")),
                )
                .unwrap(),
        );

        assert_eq!(dynamics.value("temp"), Some(Value::Number(22.0)));
        assert_eq!(dynamics.value("unit"), Some(Value::from("C")));
        assert_eq!(
            dynamics.initializer(),
            "var temp = vars['temp'];\nvar unit = vars['unit'];\n"
        );
    }

    #[test]
    fn test_failing_entry_uses_sentinel() {
        let engine = engine();
        let host = host();
        let builder = EnvironmentBuilder::new(&engine, &host);

        let env = ready(builder.build_static(None, Some(&decl("bad: nope()\ngood: 1\n"))));
        assert_eq!(env.value("bad"), Some(Value::Null));
        assert_eq!(env.value("good"), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_dynamic_before_static_settles_is_rejected() {
        let engine = engine();
        let host = host();
        let builder = EnvironmentBuilder::new(&engine, &host);

        let statics = builder.build_static(None, Some(&decl("slow: later(1)\n")));
        assert!(statics.is_pending());

        let result = builder.build_dynamic(statics.eager(), None, None);
        assert!(matches!(result, Err(EnvironmentError::StaticPending)));
    }

    #[tokio::test]
    async fn test_pending_static_settles() {
        let engine = engine();
        let host = host();
        let builder = EnvironmentBuilder::new(&engine, &host);

        let build = builder.build_static(None, Some(&decl("slow: later(7)\nfast: 1\n")));
        assert!(build.is_pending());
        assert_eq!(build.eager().value("slow"), Some(Value::Null));
        assert_eq!(build.eager().value("fast"), Some(Value::Number(1.0)));

        let env = build.settle().await;
        assert!(env.is_settled());
        assert!(matches!(env.named("slow"), Some(Partial::Ready(_))));
        assert_eq!(env.value("slow"), Some(Value::Number(7.0)));

        let dynamics = builder.build_dynamic(&env, None, Some(&decl("x: slow + 1\n")));
        assert_eq!(
            dynamics.unwrap().eager().value("x"),
            Some(Value::Number(8.0))
        );
    }

    #[tokio::test]
    async fn test_overlapping_dynamic_builds_stay_independent() {
        // Each build waits on its own gate; gates are released in reverse order
        let gates: Rc<RefCell<HashMap<String, oneshot::Receiver<Value>>>> = Rc::default();
        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();
        gates.borrow_mut().insert("a".to_string(), rx_a);
        gates.borrow_mut().insert("b".to_string(), rx_b);

        let engine = {
            let gates = Rc::clone(&gates);
            ExpressionEngine::new(EngineConfig::default()).with_async_function(
                "wait",
                move |args| {
                    let key = args.first().map(Value::as_string).unwrap_or_default();
                    let rx = gates.borrow_mut().remove(&key);
                    async move {
                        match rx {
                            Some(rx) => rx.await.map_err(|_| EvalError::new("gate dropped")),
                            None => Err(EvalError::new("no gate")),
                        }
                    }
                },
            )
        };

        let host_a = HostState::new(IndexMap::from([(
            "input.who".to_string(),
            Value::from("a"),
        )]));
        let host_b = HostState::new(IndexMap::from([(
            "input.who".to_string(),
            Value::from("b"),
        )]));
        let statics = VariableEnvironment::new(Tier::Static);
        let local = decl("who: \"states['input.who']\"\nresult: wait(who)\n");

        let build_a = EnvironmentBuilder::new(&engine, &host_a)
            .build_dynamic(&statics, None, Some(&local))
            .unwrap();
        let build_b = EnvironmentBuilder::new(&engine, &host_b)
            .build_dynamic(&statics, None, Some(&local))
            .unwrap();
        assert!(build_a.is_pending() && build_b.is_pending());

        tx_b.send(Value::from("result-b")).unwrap();
        let env_b = build_b.settle().await;
        tx_a.send(Value::from("result-a")).unwrap();
        let env_a = build_a.settle().await;

        assert_eq!(env_a.value("who"), Some(Value::from("a")));
        assert_eq!(env_a.value("result"), Some(Value::from("result-a")));
        assert_eq!(env_b.value("who"), Some(Value::from("b")));
        assert_eq!(env_b.value("result"), Some(Value::from("result-b")));
    }
}
