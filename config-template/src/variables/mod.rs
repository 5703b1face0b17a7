// Variables Module
// Static and dynamic variable tiers: declarations, environments and the builder

pub mod builder;
pub mod declaration;
pub mod environment;

pub use builder::{EnvironmentBuild, EnvironmentBuilder};
pub use declaration::{MergedDeclarations, Tier, VariableDeclaration};
pub use environment::{initializer_fragment, VariableEnvironment};
