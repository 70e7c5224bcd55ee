//! Scheduled task manager.

use std::sync::Arc;

use serde_json::Value;

use crate::adapter::TaskAdapter;
use crate::error::{ClientError, Result};
use crate::metadata::TaskDescriptor;

#[derive(Clone)]
pub struct TaskManager {
    task: TaskDescriptor,
    adapter: Arc<dyn TaskAdapter>,
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("task", &self.task)
            .finish_non_exhaustive()
    }
}

impl TaskManager {
    pub(crate) fn new(task: TaskDescriptor, adapter: Arc<dyn TaskAdapter>) -> Self {
        TaskManager { task, adapter }
    }

    pub fn name(&self) -> &str {
        &self.task.name
    }

    /// Trigger the task outside its schedule. Returns the adapter's tracking
    /// record untouched.
    pub async fn run_once(&self) -> Result<Value> {
        self.adapter.trigger_cron_job(&self.task).await
    }

    /// Tracking record of a previously triggered run.
    pub async fn get_task_status(&self, id: &str) -> Result<Value> {
        if id.trim().is_empty() {
            return Err(ClientError::MissingInputParameter(
                "The task run id needs to be provided".to_string(),
            ));
        }
        self.adapter.get_task_tracking_record(&self.task.iid, id).await
    }
}
