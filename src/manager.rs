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

//! The top-level driver (§4.5): owns the graph, drives the scheduling tick, and applies the
//! retry/replace/resubmit protocol as leaves complete.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use thiserror::Error;
use wfe_metrics::scoped_metric;
use wfe_resources::{ResourceSet, TaskManagerResources};
use wfe_task::{TaskHandle, TaskKind};

use crate::execution_info::{TaskExecutionInfo, TaskStatus};
use crate::graph::{Graph, GraphNode, NodeState, TaskId};
use crate::runner::{Completion, TaskRunner};
use crate::scheduler::{GreedyScheduler, Scheduler};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("task \"{0}\" is already tracked under id {1}")]
    DuplicateTask(String, TaskId),
    #[error("adding this task would introduce a cycle")]
    CycleDetected,
    #[error("failed to initialize the worker runtime: {0}")]
    RuntimeInit(#[source] std::io::Error),
}

/// §10.3: typed knobs for envelope size, tick interval, timeout, and parallelism.
#[derive(Debug, Clone)]
pub struct TaskManagerConfig {
    pub resources: TaskManagerResources,
    pub sleep_ms: u64,
    pub timeout: Option<Duration>,
    pub worker_pool_size: usize,
    /// Base directory for process tasks' script/log files. `None` uses the system temp dir.
    pub work_dir: Option<PathBuf>,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        TaskManagerConfig {
            resources: TaskManagerResources::unbounded(),
            sleep_ms: 50,
            timeout: None,
            worker_pool_size: num_cpus::get(),
            work_dir: None,
        }
    }
}

/// What one call to [`TaskManager::run_scheduler_once`] did, for callers driving the loop
/// manually (§4.5 `runSchedulerOnce`).
#[derive(Debug, Default)]
pub struct TickReport {
    pub ready: Vec<TaskId>,
    pub scheduled: Vec<TaskId>,
    pub running: Vec<TaskId>,
    pub completed: Vec<TaskId>,
}

pub struct TaskManager {
    graph: Graph,
    infos: Vec<TaskExecutionInfo>,
    config: TaskManagerConfig,
    runner: TaskRunner,
    _runtime: tokio::runtime::Runtime,
    scheduler: Box<dyn Scheduler>,
}

impl TaskManager {
    pub fn new(config: TaskManagerConfig) -> Result<TaskManager, EngineError> {
        let runtime = tokio::runtime::Builder::new()
            .threaded_scheduler()
            .core_threads(config.worker_pool_size.max(1))
            .enable_all()
            .build()
            .map_err(EngineError::RuntimeInit)?;
        let runner = TaskRunner::new(runtime.handle().clone());
        Ok(TaskManager {
            graph: Graph::new(),
            infos: Vec::new(),
            config,
            runner,
            _runtime: runtime,
            scheduler: Box::new(GreedyScheduler::default()),
        })
    }

    // ---- queries ----------------------------------------------------------------------

    pub fn get_task_id(&self, task: &TaskHandle) -> Option<TaskId> {
        self.graph.id_of(task)
    }

    pub fn get_task_status(&self, id: TaskId) -> Option<TaskStatus> {
        self.infos.get(id as usize).map(|info| info.status)
    }

    pub fn get_graph_node_state(&self, id: TaskId) -> Option<NodeState> {
        self.graph.get(id).map(|n| n.state)
    }

    pub fn get_task_execution_info(&self, id: TaskId) -> Option<&TaskExecutionInfo> {
        self.infos.get(id as usize)
    }

    pub fn get_graph_node(&self, id: TaskId) -> Option<&GraphNode> {
        self.graph.get(id)
    }

    // ---- insertion ----------------------------------------------------------------------

    /// §4.5 `addTask`: inserts `task` and everything transitively reachable from it through
    /// declared predecessor/successor edges.
    pub fn add_task(
        &mut self,
        task: TaskHandle,
        parent: Option<TaskId>,
        ignore_exists: bool,
    ) -> Result<TaskId, EngineError> {
        if let Some(id) = self.graph.id_of(&task) {
            return if ignore_exists {
                Ok(id)
            } else {
                Err(EngineError::DuplicateTask(task.name().to_string(), id))
            };
        }
        let ids = self.insert_subgraph(vec![task.clone()], parent)?;
        Ok(ids[&task])
    }

    pub fn add_tasks(
        &mut self,
        tasks: impl IntoIterator<Item = TaskHandle>,
        parent: Option<TaskId>,
        ignore_exists: bool,
    ) -> Result<Vec<TaskId>, EngineError> {
        tasks
            .into_iter()
            .map(|t| self.add_task(t, parent, ignore_exists))
            .collect()
    }

    /// Walks the transitive predecessor/successor closure of `roots`, cycle-checks the whole
    /// batch, then commits: new tasks get ids (with `parent`), every edge in the closure is
    /// wired, and named orphan references are resolved against the new arrivals.
    fn insert_subgraph(
        &mut self,
        roots: Vec<TaskHandle>,
        parent: Option<TaskId>,
    ) -> Result<HashMap<TaskHandle, TaskId>, EngineError> {
        let closure = transitive_closure(&roots);
        let new_tasks: Vec<TaskHandle> = closure
            .iter()
            .filter(|t| self.graph.id_of(t).is_none())
            .cloned()
            .collect();

        let mut placeholder: HashMap<TaskHandle, TaskId> = HashMap::new();
        for t in &closure {
            if let Some(id) = self.graph.id_of(t) {
                placeholder.insert(t.clone(), id);
            }
        }
        let base = self.graph.len() as TaskId;
        for (i, t) in new_tasks.iter().enumerate() {
            placeholder.insert(t.clone(), base + i as TaskId);
        }
        let node_count = base as usize + new_tasks.len();

        let mut edges = Vec::new();
        for t in &closure {
            let succ_id = placeholder[t];
            for pred in t.predecessors() {
                if let Some(&pred_id) = placeholder.get(&pred) {
                    edges.push((pred_id, succ_id));
                }
            }
        }
        if self.graph.would_cycle(&edges, node_count) {
            return Err(EngineError::CycleDetected);
        }

        for t in &new_tasks {
            let id = self.graph.insert(t.clone(), parent);
            self.infos.push(TaskExecutionInfo::new(id));
            log::debug!("task {:?} inserted as id {}", t.name(), id);
            let resolved = self.graph.resolve_pending_names(id);
            for resolved_id in resolved {
                self.reclassify(resolved_id);
            }
        }
        for t in &closure {
            let id = placeholder[t];
            for pred in t.predecessors() {
                if let Some(&pred_id) = placeholder.get(&pred) {
                    self.graph.add_predecessor(id, pred_id);
                    self.graph.add_successor(pred_id, id);
                }
            }
        }
        for t in &new_tasks {
            self.reclassify(placeholder[t]);
        }

        Ok(placeholder)
    }

    /// §3/§4.2: recomputes `ORPHAN` / `PREDECESSORS_AND_UNEXPANDED` / `NO_PREDECESSORS` from the
    /// node's current pending-name list and live predecessor count. Never assigns `ONLY_PREDECESSORS`
    /// or later states; those are entered explicitly by expansion/admission.
    fn reclassify(&mut self, id: TaskId) {
        let node = self.graph.get_mut(id).unwrap();
        if matches!(node.state, NodeState::Running | NodeState::Completed | NodeState::OnlyPredecessors) {
            return;
        }
        if node.is_orphan() {
            node.state = NodeState::Orphan;
        } else if node.predecessors.is_empty() && !node.awaiting_expansion {
            node.state = NodeState::NoPredecessors;
        } else {
            node.state = NodeState::PredecessorsAndUnexpanded;
        }
    }

    // ---- replace / resubmit --------------------------------------------------------------

    /// §4.5 `replaceTask`: swaps the task object held by `id` for `replacement`, preserving id
    /// and edges. Fails if `id` is untracked or currently `RUNNING`.
    pub fn replace_task(&mut self, id: TaskId, replacement: TaskHandle) -> bool {
        let running = match self.graph.get(id) {
            Some(n) if n.state == NodeState::Running => true,
            Some(_) => false,
            None => return false,
        };
        if running {
            return false;
        }
        self.graph.replace_task_object(id, replacement);
        let info = &mut self.infos[id as usize];
        info.status = TaskStatus::Unknown;
        info.attempt_index = 1;
        info.start_date = None;
        info.end_date = None;
        info.resources = None;
        info.last_exit_code = None;
        self.graph.get_mut(id).unwrap().state = NodeState::NoPredecessors;
        true
    }

    /// §4.5 `resubmitTask`: like `replace_task` but keeps the existing task object, only
    /// resetting attempt-tracking.
    pub fn resubmit_task(&mut self, id: TaskId) -> bool {
        let running = match self.graph.get(id) {
            Some(n) if n.state == NodeState::Running => true,
            Some(_) => false,
            None => return false,
        };
        if running {
            return false;
        }
        let info = &mut self.infos[id as usize];
        info.status = TaskStatus::Unknown;
        info.attempt_index = 1;
        info.start_date = None;
        info.end_date = None;
        info.resources = None;
        info.last_exit_code = None;
        self.graph.get_mut(id).unwrap().state = NodeState::NoPredecessors;
        true
    }

    // ---- the tick loop --------------------------------------------------------------------

    /// §4.5: runs exactly one tick (harvest, update composites, expand, reclassify orphans,
    /// compute ready, admit) and reports what happened.
    pub fn run_scheduler_once(&mut self) -> TickReport {
        scoped_metric!("tick");
        self.harvest();
        self.update_composites();
        self.expand();
        self.reclassify_all_orphans();

        let ready: Vec<TaskId> = (0..self.graph.len() as TaskId)
            .filter(|&id| self.graph.get(id).unwrap().state == NodeState::NoPredecessors)
            .collect();
        let running_before: Vec<TaskId> = (0..self.graph.len() as TaskId)
            .filter(|&id| self.graph.get(id).unwrap().state == NodeState::Running)
            .collect();

        let available = self.available_resources();
        let admitted = self.scheduler.admit(&ready, &self.graph, available);
        let mut scheduled = Vec::new();
        for (id, resources) in admitted {
            self.admit_task(id, resources);
            scheduled.push(id);
        }

        let running: Vec<TaskId> = running_before
            .into_iter()
            .chain(scheduled.iter().copied())
            .collect();
        let completed: Vec<TaskId> = (0..self.graph.len() as TaskId)
            .filter(|&id| self.graph.get(id).unwrap().state == NodeState::Completed)
            .collect();

        log::info!(
            "tick: {} ready, {} scheduled, {} running, {} completed",
            ready.len(),
            scheduled.len(),
            running.len(),
            completed.len()
        );

        TickReport {
            ready,
            scheduled,
            running,
            completed,
        }
    }

    fn available_resources(&self) -> ResourceSet {
        let mut used = ResourceSet::ZERO;
        for info in &self.infos {
            if let Some(resources) = &info.resources {
                if info.status == TaskStatus::Started {
                    used = used + resources.clone();
                }
            }
        }
        self.config
            .resources
            .system_resources
            .subset(&used)
            .unwrap_or(ResourceSet::ZERO)
    }

    /// Step 1: drain completed leaves, score them, consult `retry`.
    fn harvest(&mut self) {
        for completion in self.runner.poll_completed() {
            self.process_completed_task(completion);
        }
    }

    fn process_completed_task(&mut self, completion: Completion) {
        let Completion {
            task_id: id,
            exit_code,
            on_complete_result,
            panicked,
            end_time,
        } = completion;

        let status = if panicked {
            TaskStatus::FailedUnknown
        } else if exit_code != 0 {
            TaskStatus::FailedCommand
        } else if on_complete_result {
            TaskStatus::Succeeded
        } else {
            TaskStatus::FailedOnComplete
        };
        log::debug!(
            "task {} attempt finished: exit={} status={:?}",
            id,
            exit_code,
            status
        );

        {
            let info = &mut self.infos[id as usize];
            info.status = status;
            info.end_date = Some(end_time);
            info.last_exit_code = Some(exit_code);
        }

        let task = self.graph.task_of(id).unwrap().clone();
        let failed_on_complete = status == TaskStatus::FailedOnComplete;
        let attempt_info = self.infos[id as usize].as_attempt_info();
        let decision = task.task().retry(&attempt_info, failed_on_complete);

        match decision {
            Some(next) => {
                if !next.ptr_eq(&task) {
                    self.graph.replace_task_object(id, next);
                    log::debug!("task {} replaced for next attempt", id);
                } else {
                    log::debug!("task {} resubmitted for next attempt", id);
                }
                let info = &mut self.infos[id as usize];
                info.reset_for_retry_attempt();
                info.attempt_index += 1;
                self.graph.get_mut(id).unwrap().state = NodeState::NoPredecessors;
            }
            None => {
                self.graph.get_mut(id).unwrap().state = NodeState::Completed;
                if status == TaskStatus::Succeeded || status == TaskStatus::ManuallySucceeded {
                    let successors = self.graph.get(id).unwrap().successors.clone();
                    for succ_id in successors {
                        self.graph.remove_predecessor(succ_id, id);
                        self.reclassify(succ_id);
                    }
                } else {
                    log::debug!("task {} failed terminally; successors remain blocked", id);
                }
                self.propagate_composite_end_date(id, self.infos[id as usize].end_date);
            }
        }
    }

    /// Step 2: composites whose produced children are all done get marked `COMPLETED` too.
    fn update_composites(&mut self) {
        for id in (0..self.graph.len() as TaskId).rev() {
            let node = self.graph.get(id).unwrap();
            if node.task.kind() != TaskKind::Composite
                || node.state != NodeState::OnlyPredecessors
                || node.awaiting_expansion
            {
                continue;
            }
            let children: Vec<TaskId> = (0..self.graph.len() as TaskId)
                .filter(|&c| self.graph.get(c).unwrap().parent == Some(id))
                .collect();
            let all_done = !children.is_empty()
                && children
                    .iter()
                    .all(|&c| self.graph.get(c).unwrap().state == NodeState::Completed);
            if all_done {
                let end_date = children
                    .iter()
                    .filter_map(|&c| self.infos[c as usize].end_date)
                    .max();
                let any_child_failed = children.iter().any(|&c| self.infos[c as usize].status.is_failure());
                self.infos[id as usize].end_date = end_date;
                self.infos[id as usize].status = if any_child_failed {
                    TaskStatus::FailedCommand
                } else {
                    TaskStatus::Succeeded
                };
                self.graph.get_mut(id).unwrap().state = NodeState::Completed;
                log::debug!("composite {} completed, all children done", id);
                self.propagate_composite_end_date(id, end_date);
            }
        }
    }

    fn propagate_composite_end_date(&mut self, mut id: TaskId, end_date: Option<Instant>) {
        while let Some(parent) = self.graph.get(id).unwrap().parent {
            let parent_end = self.infos[parent as usize].end_date;
            let merged = match (parent_end, end_date) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
            self.infos[parent as usize].end_date = merged;
            id = parent;
        }
    }

    /// Step 3: composites with zero live predecessors get expanded.
    fn expand(&mut self) {
        let candidates: Vec<TaskId> = (0..self.graph.len() as TaskId)
            .filter(|&id| {
                let node = self.graph.get(id).unwrap();
                node.task.kind() == TaskKind::Composite
                    && node.awaiting_expansion
                    && node.state == NodeState::PredecessorsAndUnexpanded
                    && node.predecessors.is_empty()
            })
            .collect();
        for id in candidates {
            let task = self.graph.task_of(id).unwrap().clone();
            match task.task().build() {
                Ok(produced) => {
                    match self.insert_subgraph(produced.clone(), Some(id)) {
                        Ok(_) => {
                            self.graph.get_mut(id).unwrap().awaiting_expansion = false;
                            self.graph.get_mut(id).unwrap().state = NodeState::OnlyPredecessors;
                            task.rewire_successors_onto(&produced);
                            log::debug!("composite {} expanded into {} tasks", id, produced.len());
                        }
                        Err(e) => {
                            log::error!("composite {} expansion produced an invalid subgraph: {}", id, e);
                            self.infos[id as usize].status = TaskStatus::FailedGetTasks;
                            self.graph.get_mut(id).unwrap().state = NodeState::Completed;
                        }
                    }
                }
                Err(e) => {
                    log::error!("composite {} build() failed: {}", id, e);
                    self.infos[id as usize].status = TaskStatus::FailedGetTasks;
                    self.infos[id as usize].end_date = Some(Instant::now());
                    self.graph.get_mut(id).unwrap().state = NodeState::Completed;
                }
            }
        }
    }

    /// Step 4: orphans whose missing predecessor has since arrived are reclassified. Resolution
    /// itself already happens eagerly at insertion time; this is a defensive re-check.
    fn reclassify_all_orphans(&mut self) {
        let orphans: Vec<TaskId> = (0..self.graph.len() as TaskId)
            .filter(|&id| self.graph.get(id).unwrap().state == NodeState::Orphan)
            .collect();
        for id in orphans {
            self.reclassify(id);
        }
    }

    /// Step 6, per admitted task: reserve resources, stamp timestamps, hand to the runner.
    fn admit_task(&mut self, id: TaskId, resources: ResourceSet) {
        let now = Instant::now();
        let task = self.graph.task_of(id).unwrap().clone();

        let log_path = if task.kind() == TaskKind::Process {
            let dir = self
                .config
                .work_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir);
            let attempt = self.infos[id as usize].attempt_index;
            let log_path = dir.join(format!("wfe-task-{}-attempt{}.log", id, attempt));
            let script_path = dir.join(format!("wfe-task-{}-attempt{}.sh", id, attempt));
            if let Err(e) = std::fs::write(&script_path, task.task().args().join(" ")) {
                log::warn!("could not write script file for task {}: {}", id, e);
            }
            self.infos[id as usize].script_path = Some(script_path);
            self.infos[id as usize].log_path = Some(log_path.clone());
            Some(log_path)
        } else {
            None
        };

        {
            let info = &mut self.infos[id as usize];
            info.status = TaskStatus::Started;
            info.start_date = Some(now);
            info.resources = Some(resources.clone());
        }
        self.graph.get_mut(id).unwrap().state = NodeState::Running;
        self.propagate_composite_start_date(id, now);

        log::debug!("admitting task {} with {:?}", id, resources);
        self.runner.launch(id, task, resources, log_path);
    }

    fn propagate_composite_start_date(&mut self, mut id: TaskId, start: Instant) {
        while let Some(parent) = self.graph.get(id).unwrap().parent {
            let entry = &mut self.infos[parent as usize].start_date;
            if entry.is_none() {
                *entry = Some(start);
            }
            id = parent;
        }
    }

    /// §4.5 `runAllTasks`: drives ticks until every task reaches a terminal state or `timeout`
    /// expires, then terminates anything still running.
    pub fn run_all_tasks(&mut self, sleep_ms: u64, timeout: Option<Duration>) {
        let deadline = timeout.map(|d| Instant::now() + d);
        log::info!("runAllTasks starting (timeout={:?})", timeout);
        loop {
            self.run_scheduler_once();
            if self.all_terminal() {
                break;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    log::info!("runAllTasks timed out; terminating running tasks");
                    break;
                }
            }
            std::thread::sleep(Duration::from_millis(sleep_ms));
        }

        self.runner.terminate_all();
        std::thread::sleep(Duration::from_millis(50));
        for completion in self.runner.poll_completed() {
            self.process_completed_task(completion);
        }
        self.force_complete_remaining_running();
        log::info!("runAllTasks finished");
    }

    fn all_terminal(&self) -> bool {
        (0..self.graph.len() as TaskId).all(|id| self.graph.get(id).unwrap().state == NodeState::Completed)
    }

    /// Anything still `RUNNING` after termination (an in-process worker we could not truly
    /// interrupt) is force-recorded as a killed task (§4.3: `FAILED_COMMAND` / `COMPLETED`).
    fn force_complete_remaining_running(&mut self) {
        let still_running: Vec<TaskId> = (0..self.graph.len() as TaskId)
            .filter(|&id| self.graph.get(id).unwrap().state == NodeState::Running)
            .collect();
        for id in still_running {
            log::warn!("task {} still running at shutdown; marking killed", id);
            let info = &mut self.infos[id as usize];
            info.status = TaskStatus::FailedCommand;
            info.end_date = Some(Instant::now());
            self.graph.get_mut(id).unwrap().state = NodeState::Completed;
        }
    }
}

fn transitive_closure(roots: &[TaskHandle]) -> Vec<TaskHandle> {
    let mut seen: std::collections::HashSet<TaskHandle> = std::collections::HashSet::new();
    let mut queue: std::collections::VecDeque<TaskHandle> = roots.iter().cloned().collect();
    let mut order = Vec::new();
    for r in roots {
        seen.insert(r.clone());
    }
    while let Some(t) = queue.pop_front() {
        order.push(t.clone());
        for pred in t.predecessors() {
            if seen.insert(pred.clone()) {
                queue.push_back(pred);
            }
        }
        for succ in t.successors() {
            if seen.insert(succ.clone()) {
                queue.push_back(succ);
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use wfe_task::{CallbackTask, ShellTask};

    fn manager() -> TaskManager {
        TaskManager::new(TaskManagerConfig::default()).unwrap()
    }

    #[test]
    fn simple_exit_0_succeeds() {
        let mut mgr = manager();
        let task = ShellTask::new("exit0", "exit 0").into_handle();
        let id = mgr.add_task(task, None, false).unwrap();
        mgr.run_all_tasks(5, Some(Duration::from_secs(5)));
        assert_eq!(mgr.get_task_status(id), Some(TaskStatus::Succeeded));
        assert_eq!(mgr.get_task_execution_info(id).unwrap().attempt_index, 1);
        assert_eq!(mgr.get_graph_node_state(id), Some(NodeState::Completed));
    }

    #[test]
    fn duplicate_add_with_ignore_exists_returns_same_id() {
        let mut mgr = manager();
        let task = CallbackTask::new("dup", || 0).into_handle();
        let id1 = mgr.add_task(task.clone(), None, true).unwrap();
        let id2 = mgr.add_task(task, None, true).unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn duplicate_add_without_ignore_exists_errors() {
        let mut mgr = manager();
        let task = CallbackTask::new("dup", || 0).into_handle();
        mgr.add_task(task.clone(), None, false).unwrap();
        assert!(matches!(
            mgr.add_task(task, None, false),
            Err(EngineError::DuplicateTask(_, _))
        ));
    }

    #[test]
    fn orphan_resolution() {
        let mut mgr = manager();
        let successor = CallbackTask::new("successor", || 0).into_handle();
        successor.after_name("predecessor");
        let successor_id = mgr.add_task(successor, None, false).unwrap();
        assert_eq!(mgr.get_graph_node_state(successor_id), Some(NodeState::Orphan));

        mgr.run_scheduler_once();
        assert_eq!(mgr.get_graph_node_state(successor_id), Some(NodeState::Orphan));

        let predecessor = CallbackTask::new("predecessor", || 0).into_handle();
        mgr.add_task(predecessor, None, false).unwrap();
        assert_eq!(
            mgr.get_graph_node_state(successor_id),
            Some(NodeState::PredecessorsAndUnexpanded)
        );
    }

    #[test]
    fn retries_twice_then_replaces_with_a_passing_task() {
        // A task that resubmits itself on attempt 1, then hands the engine a replacement
        // that exits 0, matching the "retry three times, succeed on third" scenario.
        let self_handle: std::sync::Arc<std::sync::Mutex<Option<TaskHandle>>> =
            std::sync::Arc::new(std::sync::Mutex::new(None));
        let for_closure = self_handle.clone();
        let task = ShellTask::new("flaky", "exit 1").with_retry(move |info, _failed_on_complete| {
            if info.attempt_index < 2 {
                for_closure.lock().unwrap().clone()
            } else {
                Some(ShellTask::new("flaky-fixed", "exit 0").into_handle())
            }
        });
        let handle = task.into_handle();
        *self_handle.lock().unwrap() = Some(handle.clone());

        let mut mgr = manager();
        let id = mgr.add_task(handle, None, false).unwrap();
        mgr.run_all_tasks(5, Some(Duration::from_secs(5)));
        assert_eq!(mgr.get_task_status(id), Some(TaskStatus::Succeeded));
        assert_eq!(mgr.get_task_execution_info(id).unwrap().attempt_index, 3);
    }
}
