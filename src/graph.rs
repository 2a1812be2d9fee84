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

//! The mutable DAG: an arena of [`GraphNode`]s indexed by dense [`TaskId`]s, plus the
//! task-object↔id [`BiHashMap`] the manager needs for its `ignoreExists`/`getTaskId` queries.

use bimap::BiHashMap;
use wfe_task::TaskHandle;

pub type TaskId = u64;

/// §3 GraphNode state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Orphan,
    PredecessorsAndUnexpanded,
    OnlyPredecessors,
    NoPredecessors,
    Running,
    Completed,
}

/// A live (mutated as predecessors complete) and a frozen-original (append-only) multiset of
/// predecessor ids (§4.2).
#[derive(Debug, Default, Clone)]
pub struct PredecessorSet {
    live: Vec<TaskId>,
    original: Vec<TaskId>,
}

impl PredecessorSet {
    /// Returns `true` iff `id` was already present (as a live predecessor) before this call.
    pub fn add(&mut self, id: TaskId) -> bool {
        let already_present = self.live.contains(&id);
        self.live.push(id);
        self.original.push(id);
        already_present
    }

    /// Removes one copy of `id`. Returns `true` iff it was present.
    pub fn remove(&mut self, id: TaskId) -> bool {
        match self.live.iter().position(|&x| x == id) {
            Some(pos) => {
                self.live.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn has(&self, id: TaskId) -> bool {
        self.live.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// The append-only record of every id ever added, including ones since removed.
    pub fn original(&self) -> &[TaskId] {
        &self.original
    }
}

/// The per-task scheduling record (§3 GraphNode).
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub task_id: TaskId,
    pub task: TaskHandle,
    pub state: NodeState,
    pub predecessors: PredecessorSet,
    /// The immediate successors, resolved to ids at insertion time.
    pub successors: Vec<TaskId>,
    /// The composite task this node was produced by `build()`-ing, if any.
    pub parent: Option<TaskId>,
    /// `true` once this node is itself a composite awaiting expansion; cleared once expanded.
    pub awaiting_expansion: bool,
    /// Named predecessors declared before their task existed, not yet resolved to a real edge.
    /// Non-empty iff this node is (still) `ORPHAN`.
    pub pending_predecessor_names: Vec<String>,
}

impl GraphNode {
    fn new(task_id: TaskId, task: TaskHandle, parent: Option<TaskId>) -> GraphNode {
        let awaiting_expansion = matches!(task.kind(), wfe_task::TaskKind::Composite);
        let pending_predecessor_names = task.pending_predecessor_names();
        GraphNode {
            task_id,
            task,
            state: NodeState::Orphan,
            predecessors: PredecessorSet::default(),
            successors: Vec::new(),
            parent,
            awaiting_expansion,
            pending_predecessor_names,
        }
    }

    pub fn is_orphan(&self) -> bool {
        !self.pending_predecessor_names.is_empty()
    }
}

/// The DAG arena. Ids are dense and strictly increasing; `nodes[id]` is O(1).
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<GraphNode>,
    by_task: BiHashMap<TaskId, TaskHandle>,
}

impl Graph {
    pub fn new() -> Graph {
        Graph {
            nodes: Vec::new(),
            by_task: BiHashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Allocates the next id and creates a node for `task`. Does not wire up predecessors;
    /// callers add those with [`Graph::add_predecessor`] immediately after.
    pub fn insert(&mut self, task: TaskHandle, parent: Option<TaskId>) -> TaskId {
        let id = self.nodes.len() as TaskId;
        self.nodes.push(GraphNode::new(id, task.clone(), parent));
        self.by_task.insert(id, task);
        id
    }

    pub fn get(&self, id: TaskId) -> Option<&GraphNode> {
        self.nodes.get(id as usize)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut GraphNode> {
        self.nodes.get_mut(id as usize)
    }

    pub fn id_of(&self, task: &TaskHandle) -> Option<TaskId> {
        self.by_task.get_by_right(task).copied()
    }

    pub fn task_of(&self, id: TaskId) -> Option<&TaskHandle> {
        self.by_task.get_by_left(&id)
    }

    /// Adds `pred_id` as a live predecessor of `id`. Returns `true` if it was already present.
    pub fn add_predecessor(&mut self, id: TaskId, pred_id: TaskId) -> bool {
        self.nodes[id as usize].predecessors.add(pred_id)
    }

    pub fn remove_predecessor(&mut self, id: TaskId, pred_id: TaskId) -> bool {
        self.nodes[id as usize].predecessors.remove(pred_id)
    }

    pub fn add_successor(&mut self, id: TaskId, succ_id: TaskId) {
        self.nodes[id as usize].successors.push(succ_id);
    }

    /// Swaps the task object backing `id` (replace/resubmit-via-retry), preserving the node's
    /// id and edges.
    pub fn replace_task_object(&mut self, id: TaskId, new_task: TaskHandle) {
        self.by_task.remove_by_left(&id);
        self.by_task.insert(id, new_task.clone());
        let node = &mut self.nodes[id as usize];
        node.awaiting_expansion = matches!(new_task.kind(), wfe_task::TaskKind::Composite);
        node.task = new_task;
    }

    /// Resolves any node's pending named predecessors that refer to `new_id`'s task by name,
    /// wiring the real edge in both directions. Returns the ids of nodes whose pending list
    /// changed, so the caller can reclassify them out of `ORPHAN`.
    pub fn resolve_pending_names(&mut self, new_id: TaskId) -> Vec<TaskId> {
        let name = self.nodes[new_id as usize].task.name().to_string();
        let mut resolved = Vec::new();
        for id in 0..self.nodes.len() as TaskId {
            if id == new_id {
                continue;
            }
            let node = &mut self.nodes[id as usize];
            if let Some(pos) = node.pending_predecessor_names.iter().position(|n| *n == name) {
                node.pending_predecessor_names.remove(pos);
                node.task.resolve_pending_name(&name);
                self.add_predecessor(id, new_id);
                self.add_successor(new_id, id);
                resolved.push(id);
            }
        }
        resolved
    }

    /// Detects whether adding `edges` (pred_id -> succ_id pairs, over a graph padded out to
    /// `node_count` nodes to cover ids not yet inserted) would close a cycle. Used by `addTask`
    /// before committing a new subgraph.
    pub fn would_cycle(&self, edges: &[(TaskId, TaskId)], node_count: usize) -> bool {
        let mut g = petgraph::graphmap::DiGraphMap::<TaskId, ()>::new();
        for id in 0..node_count as TaskId {
            g.add_node(id);
        }
        for id in 0..self.nodes.len() as TaskId {
            for &succ in &self.nodes[id as usize].successors {
                g.add_edge(id, succ, ());
            }
        }
        for &(pred, succ) in edges {
            g.add_edge(pred, succ, ());
        }
        petgraph::algo::is_cyclic_directed(&g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predecessor_set_add_reports_prior_presence() {
        let mut set = PredecessorSet::default();
        assert!(!set.add(1));
        assert!(set.add(1));
        assert_eq!(set.original(), &[1, 1]);
    }

    #[test]
    fn predecessor_set_original_survives_removal() {
        let mut set = PredecessorSet::default();
        set.add(7);
        assert!(set.remove(7));
        assert!(!set.has(7));
        assert_eq!(set.original(), &[7]);
    }

    #[test]
    fn remove_missing_returns_false() {
        let mut set = PredecessorSet::default();
        assert!(!set.remove(3));
    }

    #[test]
    fn inserting_the_named_predecessor_resolves_the_orphan() {
        use wfe_task::{CallbackTask, TaskHandle};

        let mut graph = Graph::new();
        let successor = CallbackTask::new("successor", || 0).into_handle();
        successor.after_name("predecessor");
        let successor_id = graph.insert(successor, None);
        assert!(graph.get(successor_id).unwrap().is_orphan());

        let predecessor: TaskHandle = CallbackTask::new("predecessor", || 0).into_handle();
        let predecessor_id = graph.insert(predecessor, None);
        let resolved = graph.resolve_pending_names(predecessor_id);

        assert_eq!(resolved, vec![successor_id]);
        assert!(!graph.get(successor_id).unwrap().is_orphan());
        assert!(graph.get(successor_id).unwrap().predecessors.has(predecessor_id));
    }

    proptest::proptest! {
        #[test]
        fn original_is_monotone_non_decreasing(ops in proptest::collection::vec((0u64..5, proptest::bool::ANY), 0..50)) {
            let mut set = PredecessorSet::default();
            let mut prev_len = 0;
            for (id, is_add) in ops {
                if is_add {
                    set.add(id);
                } else {
                    set.remove(id);
                }
                proptest::prop_assert!(set.original().len() >= prev_len);
                prev_len = set.original().len();
            }
        }
    }
}
