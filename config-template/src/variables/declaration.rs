// Variable Declarations
// Positional or named variable sources and how global and local sources merge

use crate::value::Value;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A variable source as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableDeclaration {
    /// Anonymous entries, reachable as `vars[0]`, `vars[1]`, ...
    Positional(Vec<Value>),
    /// Entries bound by name
    Named(IndexMap<String, Value>),
}

/// Evaluation tier of a declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Evaluated once per configuration load
    Static,
    /// Evaluated on every context change
    Dynamic,
}

impl Tier {
    /// Name under which the tier's environment is visible to expressions
    pub fn scope_name(self) -> &'static str {
        match self {
            Tier::Static => "svars",
            Tier::Dynamic => "vars",
        }
    }
}

/// Entries of a global and a local declaration after merging
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedDeclarations {
    pub positional: Vec<Value>,
    pub named: IndexMap<String, Value>,
}

impl MergedDeclarations {
    /// Positional entries are concatenated, global first. Named entries are
    /// merged with local entries overriding global ones of the same name.
    pub fn merge(
        global: Option<&VariableDeclaration>,
        local: Option<&VariableDeclaration>,
    ) -> Self {
        let mut merged = Self::default();

        for declaration in [global, local].into_iter().flatten() {
            match declaration {
                VariableDeclaration::Positional(values) => {
                    merged.positional.extend(values.iter().cloned());
                }
                VariableDeclaration::Named(values) => {
                    for (name, value) in values {
                        merged.named.insert(name.clone(), value.clone());
                    }
                }
            }
        }

        merged
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}
