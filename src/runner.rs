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

//! The task runner (§4.3): launches an admitted leaf (subprocess or in-process callback) and
//! reports its outcome back to the control thread over an mpsc mailbox. Launching never blocks;
//! the manager's tick loop drains whatever has finished since the last poll.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use wfe_resources::ResourceSet;
use wfe_task::{TaskHandle, TaskKind};

use crate::graph::TaskId;

/// One leaf task's outcome, as reported by whichever worker ran it.
#[derive(Debug)]
pub struct Completion {
    pub task_id: TaskId,
    pub exit_code: i32,
    pub on_complete_result: bool,
    /// Set when an in-process task's callback panicked rather than returning — always maps to
    /// `FAILED_UNKNOWN`, bypassing `on_complete` entirely (§4.3).
    pub panicked: bool,
    pub end_time: Instant,
}

enum CancelHandle {
    Process(oneshot::Sender<()>),
    /// In-process callbacks run on tokio's blocking pool, which offers no cooperative
    /// cancellation. Termination for these is best-effort: the manager stops waiting on them
    /// (§5 Cancellation/timeouts).
    InProcess,
}

/// Launches admitted leaves and collects their completions.
pub struct TaskRunner {
    runtime: tokio::runtime::Handle,
    sender: mpsc::UnboundedSender<Completion>,
    receiver: mpsc::UnboundedReceiver<Completion>,
    running: std::collections::HashMap<TaskId, CancelHandle>,
}

impl TaskRunner {
    pub fn new(runtime: tokio::runtime::Handle) -> TaskRunner {
        let (sender, receiver) = mpsc::unbounded_channel();
        TaskRunner {
            runtime,
            sender,
            receiver,
            running: std::collections::HashMap::new(),
        }
    }

    /// Starts `task` (already admitted with `resources`) running. `log_path`, when given, is
    /// where a process task's combined stdout/stderr is redirected.
    pub fn launch(
        &mut self,
        task_id: TaskId,
        task: TaskHandle,
        resources: ResourceSet,
        log_path: Option<PathBuf>,
    ) {
        task.task().apply_resources(&resources);
        match task.kind() {
            TaskKind::Process => {
                let (cancel_tx, cancel_rx) = oneshot::channel();
                self.running.insert(task_id, CancelHandle::Process(cancel_tx));
                let sender = self.sender.clone();
                self.runtime.spawn(run_process(task, task_id, sender, cancel_rx, log_path));
            }
            TaskKind::InProcess => {
                self.running.insert(task_id, CancelHandle::InProcess);
                let sender = self.sender.clone();
                self.runtime.spawn(run_in_process(task, task_id, sender));
            }
            TaskKind::Composite => {
                unreachable!("composite tasks are expanded, never admitted to the runner")
            }
        }
    }

    /// Drains every completion that has arrived since the last call. Never blocks.
    pub fn poll_completed(&mut self) -> Vec<Completion> {
        let mut completed = Vec::new();
        while let Ok(completion) = self.receiver.try_recv() {
            self.running.remove(&completion.task_id);
            completed.push(completion);
        }
        completed
    }

    pub fn is_running(&self, task_id: TaskId) -> bool {
        self.running.contains_key(&task_id)
    }

    /// Requests termination of every still-running leaf (§4.3, §5). Best-effort: process tasks
    /// are sent SIGTERM via kill(); in-process tasks are simply abandoned.
    pub fn terminate_all(&mut self) {
        for (_, handle) in self.running.drain() {
            if let CancelHandle::Process(cancel_tx) = handle {
                let _ = cancel_tx.send(());
            }
        }
    }
}

async fn run_process(
    task: TaskHandle,
    task_id: TaskId,
    sender: mpsc::UnboundedSender<Completion>,
    cancel_rx: oneshot::Receiver<()>,
    log_path: Option<PathBuf>,
) {
    let args = task.task().args();
    let (program, rest) = match args.split_first() {
        Some((program, rest)) => (program.clone(), rest.to_vec()),
        None => {
            log::error!("process task {} declared no argv", task_id);
            let _ = sender.send(Completion {
                task_id,
                exit_code: -1,
                on_complete_result: false,
                panicked: false,
                end_time: Instant::now(),
            });
            return;
        }
    };

    let mut command = tokio::process::Command::new(&program);
    command.args(&rest);
    if let Some(path) = &log_path {
        match std::fs::File::create(path) {
            Ok(file) => {
                if let Ok(stderr_file) = file.try_clone() {
                    command.stdout(Stdio::from(file));
                    command.stderr(Stdio::from(stderr_file));
                }
            }
            Err(e) => log::warn!("could not open log file {:?} for task {}: {}", path, task_id, e),
        }
    }

    let exit_code = match command.spawn() {
        Ok(mut child) => {
            let status = tokio::select! {
                status = &mut child => status,
                _ = cancel_rx => {
                    let _ = child.kill();
                    (&mut child).await
                }
            };
            status
                .ok()
                .and_then(|s| s.code())
                .unwrap_or(-1)
        }
        Err(e) => {
            log::error!("failed to spawn task {}: {}", task_id, e);
            -1
        }
    };

    let on_complete_result = if exit_code == 0 {
        task.task().on_complete(exit_code)
    } else {
        false
    };

    let _ = sender.send(Completion {
        task_id,
        exit_code,
        on_complete_result,
        panicked: false,
        end_time: Instant::now(),
    });
}

async fn run_in_process(task: TaskHandle, task_id: TaskId, sender: mpsc::UnboundedSender<Completion>) {
    let for_call = task.clone();
    let result = tokio::task::spawn_blocking(move || {
        std::panic::catch_unwind(AssertUnwindSafe(|| for_call.task().call()))
    })
    .await;

    let (exit_code, panicked) = match result {
        Ok(Ok(code)) => (code, false),
        Ok(Err(_)) => {
            log::error!("in-process task {} panicked", task_id);
            (-1, true)
        }
        Err(join_err) => {
            log::error!("in-process task {} worker thread failed: {}", task_id, join_err);
            (-1, true)
        }
    };

    let on_complete_result = if !panicked && exit_code == 0 {
        task.task().on_complete(exit_code)
    } else {
        false
    };

    let _ = sender.send(Completion {
        task_id,
        exit_code,
        on_complete_result,
        panicked,
        end_time: Instant::now(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use wfe_task::{CallbackTask, ShellTask};

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new()
            .basic_scheduler()
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn process_task_reports_exit_code() {
        let rt = runtime();
        let handle = rt.handle().clone();
        rt.block_on(async {
            let mut runner = TaskRunner::new(handle);
            let task = ShellTask::new("exit0", "exit 0").into_handle();
            runner.launch(0, task, ResourceSet::ZERO, None);
            let completion = loop {
                let mut batch = runner.poll_completed();
                if let Some(c) = batch.pop() {
                    break c;
                }
                tokio::time::delay_for(std::time::Duration::from_millis(10)).await;
            };
            assert_eq!(completion.exit_code, 0);
            assert!(completion.on_complete_result);
        });
    }

    #[test]
    fn in_process_task_panic_maps_to_panicked_completion() {
        let rt = runtime();
        let handle = rt.handle().clone();
        rt.block_on(async {
            let mut runner = TaskRunner::new(handle);
            let task = CallbackTask::new("boom", || panic!("boom")).into_handle();
            runner.launch(0, task, ResourceSet::ZERO, None);
            let completion = loop {
                let mut batch = runner.poll_completed();
                if let Some(c) = batch.pop() {
                    break c;
                }
                tokio::time::delay_for(std::time::Duration::from_millis(10)).await;
            };
            assert!(completion.panicked);
        });
    }
}
