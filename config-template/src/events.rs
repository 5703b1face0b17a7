// Evaluation Events
// Observability sink for expression failures, shape warnings and static environment lifecycle

use crate::expression::EvalError;

use tokio::sync::mpsc;

/// Sender for evaluation events
pub type EventSender = mpsc::UnboundedSender<EvaluationEvent>;

/// Receiver for evaluation events
pub type EventReceiver = mpsc::UnboundedReceiver<EvaluationEvent>;

/// Create a new event channel
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted while evaluating templates
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationEvent {
    /// An expression failed and was replaced by the fallback value
    ExpressionFailed { expression: String, message: String },

    /// The entity list did not resolve to something the change detector can use
    NonActionableEntities { reason: String },

    /// A static environment finished building and was cached
    StaticEnvironmentReady { generation: u64 },

    /// A static environment settled after its configuration was replaced
    StaticEnvironmentDiscarded { generation: u64 },

    /// Non-fatal configuration warning
    ConfigWarning { message: String },
}

/// Reports events to `tracing` and, when attached, to an event channel
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    sender: Option<EventSender>,
}

impl Diagnostics {
    pub fn new(sender: Option<EventSender>) -> Self {
        Self { sender }
    }

    pub fn expression_failed(&self, expression: &str, error: &EvalError) {
        tracing::error!(expression, error = %error, "template error");
        self.emit(EvaluationEvent::ExpressionFailed {
            expression: expression.to_string(),
            message: error.message.clone(),
        });
    }

    pub fn non_actionable_entities(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(%reason, "entity list is not actionable");
        self.emit(EvaluationEvent::NonActionableEntities { reason });
    }

    pub fn static_ready(&self, generation: u64) {
        tracing::debug!(generation, "static environment ready");
        self.emit(EvaluationEvent::StaticEnvironmentReady { generation });
    }

    pub fn static_discarded(&self, generation: u64) {
        tracing::debug!(generation, "discarding stale static environment");
        self.emit(EvaluationEvent::StaticEnvironmentDiscarded { generation });
    }

    pub fn config_warning(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.emit(EvaluationEvent::ConfigWarning { message });
    }

    fn emit(&self, event: EvaluationEvent) {
        if let Some(sender) = &self.sender {
            // A dropped receiver only means nobody is listening any more
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_reach_channel() {
        let (tx, mut rx) = event_channel();
        let diagnostics = Diagnostics::new(Some(tx));

        diagnostics.expression_failed("x +", &EvalError::new("parse error"));
        diagnostics.static_ready(3);

        assert_eq!(
            rx.try_recv().unwrap(),
            EvaluationEvent::ExpressionFailed {
                expression: "x +".to_string(),
                message: "parse error".to_string(),
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            EvaluationEvent::StaticEnvironmentReady { generation: 3 }
        );
    }

    #[test]
    fn test_events_without_listener() {
        let (tx, rx) = event_channel();
        drop(rx);
        Diagnostics::new(Some(tx)).non_actionable_entities("not an array");
        Diagnostics::default().static_discarded(1);
    }
}
