// Template Instance
// Ties one configuration to host state: readiness, static caching, update checks and rendering

pub mod config;
pub mod readiness;

pub use config::{GlobalVariables, InstanceConfig, SectionKind};
pub use readiness::{Readiness, ReadinessInputs};

use crate::change::ChangeDetector;
use crate::context::{EvaluationContext, HostState};
use crate::error::ConfigError;
use crate::expression::ExpressionEngine;
use crate::pending::Outcome;
use crate::value::Value;
use crate::variables::{EnvironmentBuilder, VariableEnvironment};
use crate::walker::evaluate_structure;

use futures::FutureExt;
use indexmap::IndexMap;
use serde::Serialize;
use std::rc::Rc;

/// Evaluated section and style of one render pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rendered {
    pub kind: SectionKind,
    pub section: Value,
    pub style: Value,

    /// An element's own `style` map, applied to the element itself
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_style: Option<Value>,
}

impl Rendered {
    fn new(kind: SectionKind, section: Value, style: Value) -> Self {
        let element_style = match kind {
            SectionKind::Element => section
                .as_object()
                .and_then(|map| map.get("style"))
                .cloned(),
            _ => None,
        };
        Self {
            kind,
            section,
            style,
            element_style,
        }
    }
}

/// A static environment build started for one configuration generation
pub struct StaticBuild {
    generation: u64,
    outcome: Outcome<VariableEnvironment>,
}

impl StaticBuild {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_pending(&self) -> bool {
        self.outcome.is_pending()
    }

    /// Wait for the environment; hand the pair to [`TemplateInstance::finish_static`]
    pub async fn settle(self) -> (u64, VariableEnvironment) {
        (self.generation, self.outcome.settle().await)
    }
}

/// One templated card, row or element
pub struct TemplateInstance {
    engine: ExpressionEngine,
    config: Option<InstanceConfig>,
    globals: GlobalVariables,
    host: Option<HostState>,
    helpers_loaded: bool,
    statics: Option<Rc<VariableEnvironment>>,
    generation: u64,
    config_dirty: bool,
}

impl TemplateInstance {
    pub fn new(engine: ExpressionEngine) -> Self {
        Self {
            engine,
            config: None,
            globals: GlobalVariables::default(),
            host: None,
            helpers_loaded: false,
            statics: None,
            generation: 0,
            config_dirty: false,
        }
    }

    pub fn engine(&self) -> &ExpressionEngine {
        &self.engine
    }

    pub fn config(&self) -> Option<&InstanceConfig> {
        self.config.as_ref()
    }

    pub fn host(&self) -> Option<&HostState> {
        self.host.as_ref()
    }

    pub fn statics(&self) -> Option<&VariableEnvironment> {
        self.statics.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace the configuration. Rejected configurations leave the instance untouched.
    pub fn set_config(&mut self, config: InstanceConfig) -> Result<(), ConfigError> {
        config.validate()?;
        for warning in config.warnings() {
            self.engine.diagnostics().config_warning(warning);
        }

        self.config = Some(config);
        self.config_dirty = true;
        self.invalidate_statics();
        Ok(())
    }

    pub fn set_globals(&mut self, globals: GlobalVariables) {
        self.globals = globals;
        self.invalidate_statics();
    }

    pub fn set_host(&mut self, host: HostState) {
        self.host = Some(host);
    }

    pub fn mark_helpers_loaded(&mut self) {
        self.helpers_loaded = true;
    }

    pub fn readiness(&self) -> Readiness {
        Readiness::from_inputs(ReadinessInputs {
            has_config: self.config.is_some(),
            has_host: self.host.is_some(),
            static_ready: self.statics.is_some(),
            helpers_loaded: self.helpers_loaded,
        })
    }

    fn invalidate_statics(&mut self) {
        self.statics = None;
        self.generation += 1;
    }

    /// Start building the static environment for the current generation.
    /// Returns `None` until both a configuration and a host state are set.
    pub fn begin_static(&self) -> Option<StaticBuild> {
        let config = self.config.as_ref()?;
        let host = self.host.as_ref()?;

        let build = EnvironmentBuilder::new(&self.engine, host).build_static(
            self.globals.static_vars.as_ref(),
            config.static_variables.as_ref(),
        );
        Some(StaticBuild {
            generation: self.generation,
            outcome: build.into_outcome(),
        })
    }

    /// Install a settled static environment. Returns false, discarding the
    /// environment, if the configuration changed since the build started.
    pub fn finish_static(&mut self, generation: u64, env: VariableEnvironment) -> bool {
        if generation != self.generation {
            self.engine.diagnostics().static_discarded(generation);
            return false;
        }

        self.statics = Some(Rc::new(env));
        self.engine.diagnostics().static_ready(generation);
        true
    }

    /// Build and cache the static environment if needed
    pub async fn prepare(&mut self) -> Readiness {
        if self.statics.is_none() {
            if let Some(build) = self.begin_static() {
                let (generation, env) = build.settle().await;
                self.finish_static(generation, env);
            }
        }
        self.readiness()
    }

    /// Whether moving from `previous` to the current host state warrants a render
    pub fn should_update(&self, previous: Option<&HostState>) -> bool {
        if !self.readiness().is_ready() || self.config_dirty {
            return true;
        }

        let (Some(previous), Some(host), Some(config), Some(statics)) =
            (previous, &self.host, &self.config, &self.statics)
        else {
            return true;
        };

        ChangeDetector::new(&self.engine)
            .detect(
                previous,
                host,
                statics,
                self.globals.vars.as_ref(),
                config.variables.as_ref(),
                config.entities.as_ref(),
            )
            .unwrap_or(true)
    }

    /// Evaluate the section and style against the current host state.
    /// Returns `None` until the instance is ready.
    pub fn render(&mut self) -> Option<Outcome<Rendered>> {
        if !self.readiness().is_ready() {
            return None;
        }
        let config = self.config.as_ref()?;
        let host = self.host.as_ref()?;
        let statics = Rc::clone(self.statics.as_ref()?);
        let (kind, section) = config.section()?;
        let style = config
            .style
            .clone()
            .unwrap_or_else(|| Value::Object(IndexMap::new()));

        let build = EnvironmentBuilder::new(&self.engine, host)
            .build_dynamic(&statics, self.globals.vars.as_ref(), config.variables.as_ref())
            .ok()?;

        let rendered = if build.is_pending() {
            // Evaluate once every dynamic variable has settled
            let engine = self.engine.clone();
            let host = host.clone();
            let section = section.clone();
            Outcome::Pending(
                async move {
                    let dynamics = build.settle().await;
                    let context = EvaluationContext::new(&host)
                        .with_statics(&statics)
                        .with_dynamics(&dynamics);
                    let section = evaluate_structure(&engine, &section, &context);
                    let style = evaluate_structure(&engine, &style, &context);
                    combine(kind, section, style).settle().await
                }
                .boxed_local(),
            )
        } else {
            let context = EvaluationContext::new(host)
                .with_statics(&statics)
                .with_dynamics(build.eager());
            let section = evaluate_structure(&self.engine, section, &context);
            let style = evaluate_structure(&self.engine, &style, &context);
            combine(kind, section, style)
        };

        tracing::debug!(%kind, pending = rendered.is_pending(), "rendered instance");
        self.config_dirty = false;
        Some(rendered)
    }
}

fn combine(kind: SectionKind, section: Outcome<Value>, style: Outcome<Value>) -> Outcome<Rendered> {
    match (section, style) {
        (Outcome::Ready(section), Outcome::Ready(style)) => {
            Outcome::Ready(Rendered::new(kind, section, style))
        }
        (section, style) => Outcome::Pending(
            async move {
                let (section, style) = futures::join!(section.settle(), style.settle());
                Rendered::new(kind, section, style)
            }
            .boxed_local(),
        ),
    }
}
