mod accessor;
mod error;
pub mod policy;
mod tree;
mod types;

pub use accessor::{field, Identified, ObjectId, Operand, Tracked, ValueAccessor};
pub use error::DTreeError;
pub use policy::{register_policy, Level, Outcome, Policy, PolicyRegistry};
pub use tree::DTree;
pub use types::{
    Action, BoxError, BuildError, Catch, Child, CompareOp, Condition, Context, Flow, Node,
    NodeBuilder, NodeConfig, RegistryError, RunError, Runner, Value,
};
