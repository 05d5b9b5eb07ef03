pub mod condition;
pub mod error;
pub mod extract;
pub mod hook;
pub mod ninja;
pub mod project;
pub mod scanner;
pub mod solution;
pub mod transform;
pub mod vars;
pub mod workspace;

pub use error::{Error, Result};
pub use extract::DefaultInputs;
pub use ninja::NinjaWriter;
pub use project::{ConfigKey, ParsedConfig, Project, TargetKind};
pub use solution::ProjectGraph;
pub use workspace::{Workspace, WorkspaceBuilder};
