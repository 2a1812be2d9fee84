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

//! The resource-constrained admission scheduler (§4.4): a greedy, insertion-order pass over the
//! ready set that admits whatever fits the currently available envelope.

use wfe_resources::ResourceSet;
use wfe_task::ResourcePolicy;

use crate::graph::{Graph, TaskId};

pub trait Scheduler {
    /// `ready`, in insertion order, and the resources currently available (envelope minus what
    /// running leaves hold). Returns the admitted subset with the resources each was admitted
    /// with; the sum of those resources fits in `available`.
    fn admit(
        &self,
        ready: &[TaskId],
        graph: &Graph,
        available: ResourceSet,
    ) -> Vec<(TaskId, ResourceSet)>;
}

/// Greedy, insertion-order admission (§4.4 algorithm). No priority, no backtracking: a task that
/// doesn't fit is deferred to the next tick, never bumping an earlier task already admitted this
/// tick.
#[derive(Debug, Default)]
pub struct GreedyScheduler;

impl Scheduler for GreedyScheduler {
    fn admit(
        &self,
        ready: &[TaskId],
        graph: &Graph,
        available: ResourceSet,
    ) -> Vec<(TaskId, ResourceSet)> {
        let mut available = available;
        let mut admitted = Vec::new();
        for &id in ready {
            let task = match graph.task_of(id) {
                Some(t) => t,
                None => continue,
            };
            match task.task().resource_policy() {
                ResourcePolicy::Fixed(requirement) => {
                    if let Some(remainder) = available.subset(&requirement) {
                        available = remainder;
                        admitted.push((id, requirement));
                    }
                }
                ResourcePolicy::Flexible(pick) => {
                    if let Some(chosen) = pick(&available) {
                        match available.subset(&chosen) {
                            Some(remainder) => {
                                available = remainder;
                                admitted.push((id, chosen));
                            }
                            None => {
                                log::warn!(
                                    "task {} picked resources that do not fit what it was offered; skipping",
                                    id
                                );
                            }
                        }
                    }
                }
            }
        }
        admitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wfe_task::{CallbackTask, TaskHandle};

    fn insert(graph: &mut Graph, task: TaskHandle) -> TaskId {
        graph.insert(task, None)
    }

    #[test]
    fn admits_fixed_tasks_that_fit_in_insertion_order() {
        let mut graph = Graph::new();
        let a = insert(
            &mut graph,
            CallbackTask::new("a", || 0)
                .with_resources(ResourcePolicy::Fixed(ResourceSet::new(1.0, 0, 0)))
                .into_handle(),
        );
        let b = insert(
            &mut graph,
            CallbackTask::new("b", || 0)
                .with_resources(ResourcePolicy::Fixed(ResourceSet::new(1.0, 0, 0)))
                .into_handle(),
        );
        let admitted = GreedyScheduler.admit(&[a, b], &graph, ResourceSet::new(1.0, 0, 0));
        assert_eq!(admitted, vec![(a, ResourceSet::new(1.0, 0, 0))]);
    }

    #[test]
    fn flexible_tasks_never_exceed_available_cores() {
        let mut graph = Graph::new();
        let mut ids = Vec::new();
        for wanted in [8.0, 4.0, 2.0] {
            let policy = ResourcePolicy::Flexible(std::sync::Arc::new(move |available: &ResourceSet| {
                if available.cores >= wanted {
                    Some(ResourceSet::cores(wanted))
                } else {
                    None
                }
            }));
            ids.push(insert(
                &mut graph,
                CallbackTask::new("hungry", || 0)
                    .with_resources(policy)
                    .into_handle(),
            ));
        }
        let admitted = GreedyScheduler.admit(&ids, &graph, ResourceSet::cores(4.0));
        let total: f64 = admitted.iter().map(|(_, rs)| rs.cores).sum();
        assert!(total <= 4.0);
    }

    #[test]
    fn task_exceeding_total_envelope_never_admits() {
        let mut graph = Graph::new();
        let a = insert(
            &mut graph,
            CallbackTask::new("too-big", || 0)
                .with_resources(ResourcePolicy::Fixed(ResourceSet::new(2.0, 0, 0)))
                .into_handle(),
        );
        let admitted = GreedyScheduler.admit(&[a], &graph, ResourceSet::new(1.0, 0, 0));
        assert!(admitted.is_empty());
    }
}
