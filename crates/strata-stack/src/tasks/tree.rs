//! Task trees
//!
//! A [`TaskTree`] is an ordered list of children, each a leaf [`Task`] or a
//! nested tree, run either sequentially or in parallel:
//!
//! - sequential: children run in order on the caller's task; the first
//!   failure stops the node and is returned unchanged
//! - parallel: every child is spawned onto its own tokio task and runs to
//!   completion regardless of its siblings; all failures are returned as one
//!   [`Error::Aggregate`] ordered by child position
//!
//! Parallel children live in a [`JoinSet`] owned by the running node. Dropping
//! the node's future aborts every child it started.
//!
//! The `sub_task` flag only affects how a tree is described. Running a tree
//! consumes it, so a tree is executed at most once.
//!
//! There is no cap on parallel fan-out: a node with 200 children starts 200
//! tasks. Callers facing remote rate limits should split their trees.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;

use futures::future::BoxFuture;
use futures::FutureExt;
use strata_common::{Error, Result};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::task::{RunContext, Task};

/// A child of a [`TaskTree`]
#[derive(Debug)]
pub enum Node {
    /// A single call
    Task(Task),
    /// A nested tree
    Tree(TaskTree),
}

impl Node {
    fn len(&self) -> usize {
        match self {
            Node::Task(_) => 1,
            Node::Tree(tree) => tree.len(),
        }
    }

    fn run(self, ctx: RunContext) -> BoxFuture<'static, Result<()>> {
        match self {
            Node::Task(task) => async move { task.run(&ctx).await }.boxed(),
            Node::Tree(tree) => tree.run(ctx),
        }
    }

    fn describe_into(&self, out: &mut Vec<String>, depth: usize) {
        match self {
            Node::Task(task) => out.push(format!("{}{}", indent(depth), task.describe())),
            Node::Tree(tree) => tree.describe_into(out, depth),
        }
    }
}

impl From<Task> for Node {
    fn from(task: Task) -> Self {
        Node::Task(task)
    }
}

impl From<TaskTree> for Node {
    fn from(tree: TaskTree) -> Self {
        Node::Tree(tree)
    }
}

/// Ordered or parallel group of tasks
#[derive(Debug, Default)]
pub struct TaskTree {
    parallel: bool,
    sub_task: bool,
    children: Vec<Node>,
}

impl TaskTree {
    /// Tree whose children run one after another
    pub fn sequential() -> Self {
        Self::default()
    }

    /// Tree whose children run concurrently
    pub fn parallel() -> Self {
        Self {
            parallel: true,
            ..Default::default()
        }
    }

    /// Mark the tree as nested under another for display
    pub fn into_sub_task(mut self) -> Self {
        self.sub_task = true;
        self
    }

    /// Whether children run concurrently
    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Whether the tree is displayed as a sub-task
    pub fn is_sub_task(&self) -> bool {
        self.sub_task
    }

    /// Direct children
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Add a leaf or a sub-tree after the existing children
    pub fn append(&mut self, child: impl Into<Node>) {
        self.children.push(child.into());
    }

    /// Number of leaf tasks reachable from this tree
    pub fn len(&self) -> usize {
        self.children.iter().map(Node::len).sum()
    }

    /// Whether the tree holds no leaf tasks
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable plan. Performs no calls.
    pub fn describe(&self) -> String {
        if self.is_empty() {
            return "no tasks".to_string();
        }
        let mut lines = Vec::new();
        self.describe_into(&mut lines, 0);
        lines.join("\n")
    }

    fn describe_into(&self, out: &mut Vec<String>, depth: usize) {
        let count = self.children.len();
        let mode = if self.parallel { "parallel" } else { "sequential" };
        let noun = if count == 1 { "task" } else { "tasks" };
        let prefix = if self.sub_task { "sub-" } else { "" };
        out.push(format!("{}{count} {mode} {prefix}{noun}:", indent(depth)));
        for child in &self.children {
            child.describe_into(out, depth + 1);
        }
    }

    /// Run the tree
    pub fn run(self, ctx: RunContext) -> BoxFuture<'static, Result<()>> {
        async move {
            if self.parallel {
                self.run_parallel(ctx).await
            } else {
                self.run_sequential(ctx).await
            }
        }
        .boxed()
    }

    async fn run_sequential(self, ctx: RunContext) -> Result<()> {
        for child in self.children {
            ctx.check_cancelled("sequential task tree")?;
            child.run(ctx.clone()).await?;
        }
        Ok(())
    }

    async fn run_parallel(self, ctx: RunContext) -> Result<()> {
        let total = self.children.len();
        debug!(children = total, "Starting parallel tasks");

        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, Error)>();
        let mut set = JoinSet::new();
        for (index, child) in self.children.into_iter().enumerate() {
            let tx = tx.clone();
            let ctx = ctx.clone();
            set.spawn(async move {
                let result = match AssertUnwindSafe(child.run(ctx)).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(Error::internal_with_context(
                        "executor",
                        format!("task {index} panicked: {}", panic_message(&*panic)),
                    )),
                };
                if let Err(e) = result {
                    // receiver outlives every sender
                    let _ = tx.send((index, e));
                }
            });
        }
        drop(tx);

        let mut failures = Vec::new();
        while let Some(joined) = set.join_next().await {
            // panics are caught inside the task, so only aborts land here
            if let Err(e) = joined {
                failures.push((
                    total,
                    Error::internal_with_context("executor", format!("task join failed: {e}")),
                ));
            }
        }
        while let Some(failure) = rx.recv().await {
            failures.push(failure);
        }

        debug!(children = total, failed = failures.len(), "Parallel tasks finished");
        if failures.is_empty() {
            return Ok(());
        }
        failures.sort_by_key(|(index, _)| *index);
        Err(Error::aggregate(failures.into_iter().map(|(_, e)| e).collect()))
    }
}

impl fmt::Display for TaskTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

/// Run a previously built tree, observing `cancel`
pub async fn execute(tree: TaskTree, cancel: CancellationToken) -> Result<()> {
    let tasks = tree.len();
    if tasks == 0 {
        info!("No tasks to run");
        return Ok(());
    }

    info!(tasks, "Executing task tree");
    let start = Instant::now();
    let result = tree.run(RunContext::new(cancel)).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match &result {
        Ok(()) => info!(tasks, elapsed_ms, "All tasks completed"),
        Err(e) => error!(
            tasks,
            elapsed_ms,
            failures = e.failures().len(),
            error = %e,
            "Task tree failed"
        ),
    }
    result
}
