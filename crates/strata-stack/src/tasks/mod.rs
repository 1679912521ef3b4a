//! Task engine: leaf tasks and the trees that order them

mod task;
mod tree;

pub use task::{
    KubeCall, KubernetesTask, NamedOperation, NamedParamTask, NoParamTask, Operation, RunContext,
    StackOperations, StackTask, Task,
};
pub use tree::{execute, Node, TaskTree};
