use crate::TaskHandle;

/// A group of tasks declared together for fan-in/fan-out edges, e.g. `(a :: b) ==> c` becomes
/// `TaskGroup::of([a, b]).then(&c)`.
#[derive(Debug, Clone)]
pub struct TaskGroup(Vec<TaskHandle>);

impl TaskGroup {
    pub fn of<I: IntoIterator<Item = TaskHandle>>(tasks: I) -> TaskGroup {
        TaskGroup(tasks.into_iter().collect())
    }

    pub fn tasks(&self) -> &[TaskHandle] {
        &self.0
    }

    /// Fan-in: every task in the group becomes a predecessor of `succ`.
    pub fn then(&self, succ: &TaskHandle) -> &TaskGroup {
        for pred in &self.0 {
            succ.after(pred);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Task, TaskKind};

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
    fn fan_in_adds_every_member_as_predecessor() {
        let a = TaskHandle::new(Noop("a"));
        let b = TaskHandle::new(Noop("b"));
        let c = TaskHandle::new(Noop("c"));
        TaskGroup::of([a.clone(), b.clone()]).then(&c);
        let preds = c.predecessors();
        assert_eq!(preds.len(), 2);
        assert!(preds.iter().any(|p| p.ptr_eq(&a)));
        assert!(preds.iter().any(|p| p.ptr_eq(&b)));
    }

    #[test]
    fn fan_out_adds_source_as_predecessor_of_every_member() {
        let a = TaskHandle::new(Noop("a"));
        let b = TaskHandle::new(Noop("b"));
        let c = TaskHandle::new(Noop("c"));
        a.then_all(&TaskGroup::of([b.clone(), c.clone()]));
        assert!(b.predecessors()[0].ptr_eq(&a));
        assert!(c.predecessors()[0].ptr_eq(&a));
    }
}
