/*
 * Copyright 2020 Nikhil Marathe <nsm.nikhil@gmail.com>
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! The task contract consumed by the engine: leaf (process or in-process) vs composite,
//! resource policy, and the `onComplete`/`retry` feedback hooks.

mod builtin;
mod dependency;

pub use builtin::{CallbackTask, Pipeline, ShellTask};
pub use dependency::TaskGroup;

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use wfe_resources::ResourceSet;

/// The category discriminator for a task (§3 Task).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Process,
    InProcess,
    Composite,
}

/// Either a fixed resource request, or a function that may pick a size from a menu given what
/// is currently available.
#[derive(Clone)]
pub enum ResourcePolicy {
    Fixed(ResourceSet),
    Flexible(Arc<dyn Fn(&ResourceSet) -> Option<ResourceSet> + Send + Sync>),
}

impl fmt::Debug for ResourcePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourcePolicy::Fixed(rs) => write!(f, "ResourcePolicy::Fixed({:?})", rs),
            ResourcePolicy::Flexible(_) => write!(f, "ResourcePolicy::Flexible(..)"),
        }
    }
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        ResourcePolicy::Fixed(ResourceSet::ZERO)
    }
}

/// The slice of a task's execution bookkeeping exposed to `retry`. The full record
/// (`TaskExecutionInfo`) lives in the manager crate, which depends on this one; this is the
/// read-only view handed back down so there is no dependency cycle.
#[derive(Debug, Clone)]
pub struct AttemptInfo {
    pub attempt_index: u32,
    pub exit_code: Option<i32>,
    pub submission_date: Option<Instant>,
    pub start_date: Option<Instant>,
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The task contract implemented by user code, consumed by the engine (§6).
///
/// Only the methods relevant to a task's [`TaskKind`] are ever called: `args` for `Process`,
/// `call` for `InProcess`, `build` for `Composite`. The defaults are inert so implementors only
/// override what their kind needs.
pub trait Task: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn kind(&self) -> TaskKind;

    /// Ordered argument vector for a process task. May be recomputed, and differ, each attempt.
    fn args(&self) -> Vec<String> {
        Vec::new()
    }

    /// Invoked before launch so a process task can adjust behavior for the resources it was
    /// admitted with (e.g. thread count). Advisory only.
    fn apply_resources(&self, _resources: &ResourceSet) {}

    /// The callback body for an in-process task. Its return value is the exit code.
    fn call(&self) -> i32 {
        0
    }

    /// Declares the tasks produced by a composite. May be invoked repeatedly before expansion
    /// (idempotent observation) and exactly once at expansion.
    fn build(&self) -> Result<Vec<TaskHandle>, BuildError> {
        Ok(Vec::new())
    }

    fn resource_policy(&self) -> ResourcePolicy {
        ResourcePolicy::default()
    }

    fn on_complete(&self, _exit_code: i32) -> bool {
        true
    }

    fn retry(&self, _info: &AttemptInfo, _failed_on_complete: bool) -> Option<TaskHandle> {
        None
    }
}

#[derive(Debug, Default)]
struct Edges {
    predecessors: Vec<TaskHandle>,
    successors: Vec<TaskHandle>,
    /// Predecessors declared by name, for a task object that does not exist yet at declaration
    /// time. Resolved by the manager against `Task::name()` of whatever gets inserted later
    /// (mirrors a build system resolving an edge against an output path before the producing
    /// rule is declared).
    pending_predecessor_names: Vec<String>,
}

struct TaskEntry {
    task: Box<dyn Task>,
    edges: Mutex<Edges>,
}

impl fmt::Debug for TaskEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskEntry({:?})", self.task)
    }
}

/// A reference-counted handle to a declared task. Cheap to clone; clones are the same logical
/// task (identity is the underlying `Arc` pointer), matching `addTask`'s "same object" check for
/// `ignoreExists`.
///
/// Dependency edges are declared on the handle itself, not the `Task` impl, so that arbitrary
/// user `Task` types never need to carry graph state (§9: "the task object itself holds no
/// references to the graph").
#[derive(Clone, Debug)]
pub struct TaskHandle(Arc<TaskEntry>);

impl TaskHandle {
    pub fn new<T: Task + 'static>(task: T) -> TaskHandle {
        TaskHandle(Arc::new(TaskEntry {
            task: Box::new(task),
            edges: Mutex::new(Edges::default()),
        }))
    }

    pub fn name(&self) -> &str {
        self.0.task.name()
    }

    pub fn kind(&self) -> TaskKind {
        self.0.task.kind()
    }

    pub fn task(&self) -> &dyn Task {
        self.0.task.as_ref()
    }

    /// Declares `pred` as a predecessor of `self` (`pred ==> self`). Duplicates are permitted.
    pub fn after(&self, pred: &TaskHandle) -> &TaskHandle {
        self.0.edges.lock().unwrap().predecessors.push(pred.clone());
        pred.0.edges.lock().unwrap().successors.push(self.clone());
        self
    }

    /// Declares `succ` as a successor of `self` (`self ==> succ`). Sugar for `succ.after(self)`.
    pub fn then(&self, succ: &TaskHandle) -> &TaskHandle {
        succ.after(self);
        self
    }

    /// Declares every task in `succs` as a successor of `self` (fan-out).
    pub fn then_all(&self, succs: &TaskGroup) -> &TaskHandle {
        for succ in succs.tasks() {
            succ.after(self);
        }
        self
    }

    /// Declares a predecessor that does not exist as a `TaskHandle` yet, by the name it will be
    /// given when inserted. Until then this task is `ORPHAN`; the manager resolves the name
    /// against every task it inserts and wires the edge the first time a match shows up.
    pub fn after_name(&self, name: impl Into<String>) -> &TaskHandle {
        self.0.edges.lock().unwrap().pending_predecessor_names.push(name.into());
        self
    }

    pub fn predecessors(&self) -> Vec<TaskHandle> {
        self.0.edges.lock().unwrap().predecessors.clone()
    }

    pub fn successors(&self) -> Vec<TaskHandle> {
        self.0.edges.lock().unwrap().successors.clone()
    }

    pub fn pending_predecessor_names(&self) -> Vec<String> {
        self.0.edges.lock().unwrap().pending_predecessor_names.clone()
    }

    /// Removes one occurrence of `name` from the pending list, e.g. once the manager has wired
    /// it to a real predecessor. Returns `true` if it was present.
    #[doc(hidden)]
    pub fn resolve_pending_name(&self, name: &str) -> bool {
        let mut edges = self.0.edges.lock().unwrap();
        if let Some(pos) = edges.pending_predecessor_names.iter().position(|n| n == name) {
            edges.pending_predecessor_names.remove(pos);
            true
        } else {
            false
        }
    }

    /// Rewires `self`'s declared successors to instead depend on `new_preds`, used by the
    /// manager when expanding a composite: the composite's own successors must wait on the
    /// produced sub-DAG's leaves, not on the (now-expanded) composite's node directly.
    #[doc(hidden)]
    pub fn rewire_successors_onto(&self, new_preds: &[TaskHandle]) {
        let successors = std::mem::take(&mut self.0.edges.lock().unwrap().successors);
        for succ in &successors {
            {
                let mut edges = succ.0.edges.lock().unwrap();
                edges.predecessors.retain(|p| !p.ptr_eq(self));
            }
            for pred in new_preds {
                succ.after(pred);
            }
        }
    }

    pub fn ptr_eq(&self, other: &TaskHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}
impl Eq for TaskHandle {}

impl std::hash::Hash for TaskHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.identity().hash(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Noop(&'static str);
    impl Task for Noop {
        fn name(&self) -> &str {
            self.0
        }
        fn kind(&self) -> TaskKind {
            TaskKind::Process
        }
    }

    #[test]
    fn after_registers_both_directions() {
        let a = TaskHandle::new(Noop("a"));
        let b = TaskHandle::new(Noop("b"));
        b.after(&a);
        assert_eq!(b.predecessors().len(), 1);
        assert!(b.predecessors()[0].ptr_eq(&a));
        assert_eq!(a.successors().len(), 1);
        assert!(a.successors()[0].ptr_eq(&b));
    }

    #[test]
    fn then_is_sugar_for_after() {
        let a = TaskHandle::new(Noop("a"));
        let b = TaskHandle::new(Noop("b"));
        a.then(&b);
        assert!(b.predecessors()[0].ptr_eq(&a));
    }

    #[test]
    fn clones_share_identity() {
        let a = TaskHandle::new(Noop("a"));
        let a2 = a.clone();
        assert!(a.ptr_eq(&a2));
        assert_eq!(a, a2);
    }

    #[test]
    fn distinct_tasks_are_not_equal() {
        let a = TaskHandle::new(Noop("a"));
        let b = TaskHandle::new(Noop("b"));
        assert_ne!(a, b);
    }

    #[test]
    fn pending_name_resolves_once() {
        let b = TaskHandle::new(Noop("b"));
        b.after_name("a");
        assert_eq!(b.pending_predecessor_names(), vec!["a".to_string()]);
        assert!(b.resolve_pending_name("a"));
        assert!(b.pending_predecessor_names().is_empty());
        assert!(!b.resolve_pending_name("a"));
    }
}
