//! Stack-backed cluster lifecycle
//!
//! Teardown is expressed as a [`TaskTree`] built from the current stack
//! inventory by [`StackCollection`], then run with [`execute`]:
//!
//! ```text
//! delete_cluster_tasks ─► TaskTree ─► execute ─► Task::run ─► Waiter
//! ```
//!
//! Remote services are reached only through the traits in [`api`],
//! [`kubernetes`] and [`update`].

#![deny(missing_docs)]

pub mod api;
pub mod collection;
pub mod delete_tasks;
pub mod kubernetes;
pub mod stack;
pub mod tasks;
pub mod update;

pub use api::{IdentityProvider, StackApi};
pub use collection::StackCollection;
pub use kubernetes::{ClientProvider, KubeClient, KubeClientImpl, KubeconfigClientProvider};
pub use stack::{OperationHandle, ServiceAccountRef, Stack, StackKind, StackStatus};
pub use tasks::{execute, NamedOperation, Operation, RunContext, Task, TaskTree};
pub use update::{ClusterApi, ClusterUpdater, LoggingChange, Update, UpdateStatus};
