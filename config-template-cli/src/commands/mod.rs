// CLI Commands
// Shared setup for the render and check commands

pub mod check;
pub mod render;

use crate::output;

use config_template::{
    EngineConfig, EvalError, EvaluationEvent, EventReceiver, ExpressionEngine, GlobalVariables,
    HostState, InstanceConfig, TemplateInstance, Value,
};

use std::time::Duration;

/// Engine with the host functions the CLI provides
pub fn build_engine(config: EngineConfig) -> ExpressionEngine {
    ExpressionEngine::new(config).with_async_function("delay", |args| async move {
        let Some(ms) = args.first().and_then(Value::as_number) else {
            return Err(EvalError::new("delay expects a number of milliseconds"));
        };
        tokio::time::sleep(Duration::from_millis(ms.max(0.0) as u64)).await;
        Ok(args.get(1).cloned().unwrap_or_default())
    })
}

/// Instance with configuration, globals and host state set; helpers count as loaded
pub fn instance(
    engine: ExpressionEngine,
    config: InstanceConfig,
    globals: GlobalVariables,
    host: HostState,
) -> color_eyre::Result<TemplateInstance> {
    let mut instance = TemplateInstance::new(engine);
    instance.set_globals(globals);
    instance.set_config(config)?;
    instance.set_host(host);
    instance.mark_helpers_loaded();
    Ok(instance)
}

/// Print the events collected so far
pub fn report_events(events: &mut EventReceiver) {
    while let Ok(event) = events.try_recv() {
        match event {
            EvaluationEvent::ExpressionFailed {
                expression,
                message,
            } => output::expression_failed(&expression, &message),
            EvaluationEvent::NonActionableEntities { reason } => {
                output::warning(&format!("Entity list ignored: {}", reason))
            }
            EvaluationEvent::ConfigWarning { message } => output::warning(&message),
            EvaluationEvent::StaticEnvironmentReady { generation } => {
                output::note(&format!("static variables ready (generation {})", generation))
            }
            EvaluationEvent::StaticEnvironmentDiscarded { generation } => output::note(&format!(
                "discarded static variables (generation {})",
                generation
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_template::{EvaluationContext, Outcome};

    #[tokio::test]
    async fn test_delay_resolves_to_value() {
        let engine = build_engine(EngineConfig::default());
        let host = HostState::default();
        let ctx = EvaluationContext::new(&host);

        let outcome = engine.evaluate("delay(1, 'done')", &ctx);
        assert!(outcome.is_pending());
        assert_eq!(outcome.settle().await, Value::from("done"));
    }

    #[tokio::test]
    async fn test_delay_without_duration_fails_to_sentinel() {
        let engine = build_engine(EngineConfig::default());
        let host = HostState::default();
        let ctx = EvaluationContext::new(&host);

        let outcome = engine.evaluate("delay('soon')", &ctx);
        assert!(matches!(outcome, Outcome::Pending(_)));
        assert_eq!(outcome.settle().await, Value::Null);
    }
}
