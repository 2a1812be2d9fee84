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

//! A DAG workflow engine: composite task expansion, a resource-constrained admission
//! scheduler, and a per-task retry/replace/resubmit protocol.
//!
//! Build a graph by declaring tasks and wiring their edges with [`wfe_task::TaskHandle::after`]
//! / [`wfe_task::TaskHandle::then`], hand the roots to a [`TaskManager`] with [`TaskManager::add_task`],
//! then either single-step the scheduler with [`TaskManager::run_scheduler_once`] or drive it to
//! completion with [`TaskManager::run_all_tasks`].

mod execution_info;
mod graph;
mod manager;
mod runner;
mod scheduler;

pub use execution_info::{TaskExecutionInfo, TaskStatus};
pub use graph::{GraphNode, NodeState, PredecessorSet, TaskId};
pub use manager::{EngineError, TaskManager, TaskManagerConfig, TickReport};
pub use runner::Completion;
pub use scheduler::{GreedyScheduler, Scheduler};

pub use wfe_resources::{parse_memory, parse_memory_checked, pretty_bytes, MemoryParseError, ResourceSet, TaskManagerResources};
pub use wfe_task::{
    AttemptInfo, BuildError, CallbackTask, Pipeline, ResourcePolicy, ShellTask, Task, TaskGroup, TaskHandle, TaskKind,
};
