mod condition;
mod context;
mod error;
pub(crate) mod node;
mod runner;
mod value;

pub use condition::Condition;
pub use context::Context;
pub use error::{BoxError, BuildError, RegistryError, RunError};
pub use node::{Child, Node, NodeBuilder, NodeConfig};
pub use runner::{Action, Catch, Flow, Runner};
pub use value::{CompareOp, Value};
