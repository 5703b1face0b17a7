// Change Detection
// Decides whether a new host state is observable through the declared entity list

use crate::context::{EvaluationContext, HostState};
use crate::error::EnvironmentError;
use crate::expression::ExpressionEngine;
use crate::pending::Partial;
use crate::value::Value;
use crate::variables::{EnvironmentBuilder, VariableDeclaration, VariableEnvironment};
use crate::walker::StructureWalker;

/// Compares entity states between two host snapshots
pub struct ChangeDetector<'a> {
    engine: &'a ExpressionEngine,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(engine: &'a ExpressionEngine) -> Self {
        Self { engine }
    }

    /// Rebuild the dynamic environment for `new` and compare the entities it selects
    pub fn detect(
        &self,
        old: &HostState,
        new: &HostState,
        statics: &VariableEnvironment,
        global: Option<&VariableDeclaration>,
        local: Option<&VariableDeclaration>,
        entities: Option<&Value>,
    ) -> Result<bool, EnvironmentError> {
        let build = EnvironmentBuilder::new(self.engine, new).build_dynamic(statics, global, local)?;
        let context = EvaluationContext::new(new)
            .with_statics(statics)
            .with_dynamics(build.eager());

        Ok(self.has_observable_change(old, &context, entities))
    }

    /// True when a re-render is warranted.
    ///
    /// `context` carries the new host state. Without an entity list, or with
    /// an empty one, every change counts. A list that is still pending or is
    /// not an array is reported and counts as no change.
    pub fn has_observable_change(
        &self,
        old: &HostState,
        context: &EvaluationContext<'_>,
        entities: Option<&Value>,
    ) -> bool {
        let Some(entities) = entities else {
            return true;
        };
        if matches!(entities, Value::Array(declared) if declared.is_empty()) {
            return true;
        }

        // Only the partial shape is needed, pending ids are skipped
        let walk = StructureWalker::new(self.engine, context.clone()).walk(entities);
        let ids: Vec<String> = match walk.partial() {
            Partial::Array(items) => items.iter().filter_map(entity_id).collect(),
            Partial::Ready(Value::Array(items)) if items.is_empty() => return true,
            Partial::Ready(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Partial::Pending(_) => {
                self.engine
                    .diagnostics()
                    .non_actionable_entities("entity list is still pending");
                return false;
            }
            other => {
                self.engine.diagnostics().non_actionable_entities(format!(
                    "entity list evaluated to {}, expected an array",
                    other.to_value().type_name()
                ));
                return false;
            }
        };

        let new = context.host();
        ids.iter().any(|id| old.state(id) != new.state(id))
    }
}

fn entity_id(entry: &Partial) -> Option<String> {
    match entry {
        Partial::Ready(Value::String(id)) => Some(id.clone()),
        _ => None,
    }
}
