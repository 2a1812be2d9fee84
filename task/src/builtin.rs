use std::fmt;
use std::sync::{Arc, Mutex};

use crate::{AttemptInfo, BuildError, ResourcePolicy, Task, TaskHandle, TaskKind};

type OnCompleteFn = Arc<dyn Fn(i32) -> bool + Send + Sync>;
type RetryFn = Arc<dyn Fn(&AttemptInfo, bool) -> Option<TaskHandle> + Send + Sync>;
type BuildFn = Arc<dyn Fn() -> Result<Vec<TaskHandle>, BuildError> + Send + Sync>;

/// A process task that runs a shell command via `/bin/sh -c`. The command is held behind a
/// `Mutex` so a `retry` hook can mutate it in place (the "resubmit" case — same task object,
/// different argv on the next attempt).
pub struct ShellTask {
    name: String,
    command: Mutex<String>,
    resource_policy: ResourcePolicy,
    on_complete: Option<OnCompleteFn>,
    retry_fn: Option<RetryFn>,
}

impl fmt::Debug for ShellTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellTask")
            .field("name", &self.name)
            .field("command", &*self.command.lock().unwrap())
            .finish()
    }
}

impl ShellTask {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> ShellTask {
        ShellTask {
            name: name.into(),
            command: Mutex::new(command.into()),
            resource_policy: ResourcePolicy::default(),
            on_complete: None,
            retry_fn: None,
        }
    }

    pub fn with_resources(mut self, policy: ResourcePolicy) -> Self {
        self.resource_policy = policy;
        self
    }

    pub fn with_on_complete<F>(mut self, f: F) -> Self
    where
        F: Fn(i32) -> bool + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(f));
        self
    }

    pub fn with_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(&AttemptInfo, bool) -> Option<TaskHandle> + Send + Sync + 'static,
    {
        self.retry_fn = Some(Arc::new(f));
        self
    }

    pub fn into_handle(self) -> TaskHandle {
        TaskHandle::new(self)
    }

    /// Overwrites the command this task runs on its next attempt, without changing identity.
    pub fn set_command(&self, command: impl Into<String>) {
        *self.command.lock().unwrap() = command.into();
    }

    pub fn command(&self) -> String {
        self.command.lock().unwrap().clone()
    }
}

impl Task for ShellTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Process
    }

    fn args(&self) -> Vec<String> {
        vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            self.command.lock().unwrap().clone(),
        ]
    }

    fn resource_policy(&self) -> ResourcePolicy {
        self.resource_policy.clone()
    }

    fn on_complete(&self, exit_code: i32) -> bool {
        self.on_complete
            .as_ref()
            .map(|f| f(exit_code))
            .unwrap_or(true)
    }

    fn retry(&self, info: &AttemptInfo, failed_on_complete: bool) -> Option<TaskHandle> {
        self.retry_fn
            .as_ref()
            .and_then(|f| f(info, failed_on_complete))
    }
}

type CallbackFn = Arc<dyn Fn() -> i32 + Send + Sync>;

/// An in-process leaf task: its callback runs on a worker thread and its return value is the
/// exit code (§4.3).
pub struct CallbackTask {
    name: String,
    callback: CallbackFn,
    resource_policy: ResourcePolicy,
    on_complete: Option<OnCompleteFn>,
    retry_fn: Option<RetryFn>,
}

impl fmt::Debug for CallbackTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackTask")
            .field("name", &self.name)
            .finish()
    }
}

impl CallbackTask {
    pub fn new<F>(name: impl Into<String>, callback: F) -> CallbackTask
    where
        F: Fn() -> i32 + Send + Sync + 'static,
    {
        CallbackTask {
            name: name.into(),
            callback: Arc::new(callback),
            resource_policy: ResourcePolicy::default(),
            on_complete: None,
            retry_fn: None,
        }
    }

    pub fn with_resources(mut self, policy: ResourcePolicy) -> Self {
        self.resource_policy = policy;
        self
    }

    pub fn with_on_complete<F>(mut self, f: F) -> Self
    where
        F: Fn(i32) -> bool + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(f));
        self
    }

    pub fn with_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(&AttemptInfo, bool) -> Option<TaskHandle> + Send + Sync + 'static,
    {
        self.retry_fn = Some(Arc::new(f));
        self
    }

    pub fn into_handle(self) -> TaskHandle {
        TaskHandle::new(self)
    }
}

impl Task for CallbackTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        TaskKind::InProcess
    }

    fn call(&self) -> i32 {
        (self.callback)()
    }

    fn resource_policy(&self) -> ResourcePolicy {
        self.resource_policy.clone()
    }

    fn on_complete(&self, exit_code: i32) -> bool {
        self.on_complete
            .as_ref()
            .map(|f| f(exit_code))
            .unwrap_or(true)
    }

    fn retry(&self, info: &AttemptInfo, failed_on_complete: bool) -> Option<TaskHandle> {
        self.retry_fn
            .as_ref()
            .and_then(|f| f(info, failed_on_complete))
    }
}

/// A composite task ("Pipeline", §4.1) that produces more tasks via `build()` instead of
/// executing directly.
pub struct Pipeline {
    name: String,
    build_fn: BuildFn,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline").field("name", &self.name).finish()
    }
}

impl Pipeline {
    pub fn new<F>(name: impl Into<String>, build_fn: F) -> Pipeline
    where
        F: Fn() -> Result<Vec<TaskHandle>, BuildError> + Send + Sync + 'static,
    {
        Pipeline {
            name: name.into(),
            build_fn: Arc::new(build_fn),
        }
    }

    pub fn into_handle(self) -> TaskHandle {
        TaskHandle::new(self)
    }
}

impl Task for Pipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Composite
    }

    fn build(&self) -> Result<Vec<TaskHandle>, BuildError> {
        (self.build_fn)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_task_args_reflect_current_command() {
        let t = ShellTask::new("exit-0", "exit 0");
        assert_eq!(t.args(), vec!["/bin/sh", "-c", "exit 0"]);
        t.set_command("exit 1");
        assert_eq!(t.args(), vec!["/bin/sh", "-c", "exit 1"]);
    }

    #[test]
    fn callback_task_runs_closure() {
        let t = CallbackTask::new("cb", || 42);
        assert_eq!(t.call(), 42);
    }

    #[test]
    fn pipeline_invokes_build_fn() {
        let inner = TaskHandle::new(CallbackTask::new("inner", || 0));
        let inner2 = inner.clone();
        let p = Pipeline::new("outer", move || Ok(vec![inner2.clone()]));
        let produced = p.build().unwrap();
        assert_eq!(produced.len(), 1);
        assert!(produced[0].ptr_eq(&inner));
    }
}
