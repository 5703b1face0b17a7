// Config Template Library
// Expressions embedded in configuration trees, evaluated against a changing host state

pub mod change;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod expression;
pub mod instance;
pub mod pending;
pub mod value;
pub mod variables;
pub mod walker;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{ConfigError, EnvironmentError};
pub use value::Value;

// Re-export evaluation types
pub use context::{EvaluationContext, HostState};
pub use events::{event_channel, Diagnostics, EvaluationEvent, EventReceiver, EventSender};
pub use expression::{EvalError, Evaluated, ExpressionEngine};
pub use pending::{Outcome, Partial, PathSegment, PendingSet};
pub use walker::{evaluate_structure, evaluate_template, StructureWalker, TemplateMode, Walk};

// Re-export variable and instance types
pub use change::ChangeDetector;
pub use instance::{
    GlobalVariables, InstanceConfig, Readiness, Rendered, SectionKind, StaticBuild,
    TemplateInstance,
};
pub use variables::{EnvironmentBuilder, Tier, VariableDeclaration, VariableEnvironment};
