// Instance Readiness
// Which inputs an instance is still waiting for before it can render

use serde::Serialize;
use std::fmt;

/// Lifecycle of a template instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// No configuration or no host state yet
    Uninitialized,
    /// The static environment is being built
    AwaitingStatic,
    /// Static variables are settled but host helpers are not loaded
    AwaitingHelpers,
    Ready,
}

/// Snapshot of everything readiness depends on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadinessInputs {
    pub has_config: bool,
    pub has_host: bool,
    pub static_ready: bool,
    pub helpers_loaded: bool,
}

impl Readiness {
    pub fn from_inputs(inputs: ReadinessInputs) -> Self {
        if !inputs.has_config || !inputs.has_host {
            Readiness::Uninitialized
        } else if !inputs.static_ready {
            Readiness::AwaitingStatic
        } else if !inputs.helpers_loaded {
            Readiness::AwaitingHelpers
        } else {
            Readiness::Ready
        }
    }

    pub fn is_ready(self) -> bool {
        self == Readiness::Ready
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readiness::Uninitialized => write!(f, "uninitialized"),
            Readiness::AwaitingStatic => write!(f, "awaiting static variables"),
            Readiness::AwaitingHelpers => write!(f, "awaiting helpers"),
            Readiness::Ready => write!(f, "ready"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(has_config: bool, has_host: bool, static_ready: bool, helpers: bool) -> ReadinessInputs {
        ReadinessInputs {
            has_config,
            has_host,
            static_ready,
            helpers_loaded: helpers,
        }
    }

    #[test]
    fn test_missing_config_or_host() {
        assert_eq!(
            Readiness::from_inputs(ReadinessInputs::default()),
            Readiness::Uninitialized
        );
        assert_eq!(
            Readiness::from_inputs(inputs(true, false, true, true)),
            Readiness::Uninitialized
        );
        assert_eq!(
            Readiness::from_inputs(inputs(false, true, true, true)),
            Readiness::Uninitialized
        );
    }

    #[test]
    fn test_waits_for_static_before_helpers() {
        assert_eq!(
            Readiness::from_inputs(inputs(true, true, false, true)),
            Readiness::AwaitingStatic
        );
        assert_eq!(
            Readiness::from_inputs(inputs(true, true, false, false)),
            Readiness::AwaitingStatic
        );
        assert_eq!(
            Readiness::from_inputs(inputs(true, true, true, false)),
            Readiness::AwaitingHelpers
        );
    }

    #[test]
    fn test_ready() {
        let state = Readiness::from_inputs(inputs(true, true, true, true));
        assert!(state.is_ready());
        assert_eq!(state.to_string(), "ready");
    }
}
