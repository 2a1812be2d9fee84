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

use std::path::PathBuf;
use std::time::Instant;
use wfe_resources::ResourceSet;
use wfe_task::AttemptInfo;

use crate::graph::TaskId;

/// §3 TaskStatus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Unknown,
    Started,
    Succeeded,
    FailedCommand,
    FailedOnComplete,
    FailedGetTasks,
    FailedUnknown,
    ManuallySucceeded,
}

impl TaskStatus {
    /// `SUCCEEDED`/`MANUALLY_SUCCEEDED` are always done; the `FAILED_*` family is done iff
    /// `failed_is_done` is set.
    pub fn is_done(&self, failed_is_done: bool) -> bool {
        match self {
            TaskStatus::Succeeded | TaskStatus::ManuallySucceeded => true,
            TaskStatus::FailedCommand
            | TaskStatus::FailedOnComplete
            | TaskStatus::FailedGetTasks
            | TaskStatus::FailedUnknown => failed_is_done,
            TaskStatus::Unknown | TaskStatus::Started => false,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            TaskStatus::FailedCommand
                | TaskStatus::FailedOnComplete
                | TaskStatus::FailedGetTasks
                | TaskStatus::FailedUnknown
        )
    }
}

/// §3 TaskExecutionInfo: the per-task, attempt-oriented bookkeeping record.
#[derive(Debug, Clone)]
pub struct TaskExecutionInfo {
    pub id: TaskId,
    pub status: TaskStatus,
    pub attempt_index: u32,
    pub submission_date: Option<Instant>,
    pub start_date: Option<Instant>,
    pub end_date: Option<Instant>,
    pub script_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    pub resources: Option<ResourceSet>,
    pub last_exit_code: Option<i32>,
}

impl TaskExecutionInfo {
    pub fn new(id: TaskId) -> TaskExecutionInfo {
        TaskExecutionInfo {
            id,
            status: TaskStatus::Unknown,
            attempt_index: 1,
            submission_date: None,
            start_date: None,
            end_date: None,
            script_path: None,
            log_path: None,
            resources: None,
            last_exit_code: None,
        }
    }

    /// Resets attempt-tracking for the next attempt: status back to `Unknown`, timestamps,
    /// resources and exit code cleared. Leaves `attempt_index` untouched — callers that mean to
    /// start the attempt count over (`replaceTask`/`resubmitTask`) reset it themselves; the
    /// retry-driven continuation path increments it instead.
    pub fn reset_for_retry_attempt(&mut self) {
        self.status = TaskStatus::Unknown;
        self.start_date = None;
        self.end_date = None;
        self.resources = None;
        self.last_exit_code = None;
    }

    /// The read-only view of this record handed to a task's `retry` hook.
    pub fn as_attempt_info(&self) -> AttemptInfo {
        AttemptInfo {
            attempt_index: self.attempt_index,
            exit_code: self.last_exit_code,
            submission_date: self.submission_date,
            start_date: self.start_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succeeded_is_always_done() {
        assert!(TaskStatus::Succeeded.is_done(false));
        assert!(TaskStatus::Succeeded.is_done(true));
    }

    #[test]
    fn failed_command_done_only_when_requested() {
        assert!(!TaskStatus::FailedCommand.is_done(false));
        assert!(TaskStatus::FailedCommand.is_done(true));
    }

    #[test]
    fn unknown_and_started_are_never_done() {
        assert!(!TaskStatus::Unknown.is_done(true));
        assert!(!TaskStatus::Started.is_done(true));
    }
}
