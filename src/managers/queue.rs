//! Message queue manager.

use std::sync::Arc;

use serde_json::Value;

use crate::adapter::QueueAdapter;
use crate::error::{ClientError, Result};
use crate::metadata::QueueDescriptor;

#[derive(Clone)]
pub struct QueueManager {
    queue: QueueDescriptor,
    adapter: Arc<dyn QueueAdapter>,
}

impl std::fmt::Debug for QueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueManager")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl QueueManager {
    pub(crate) fn new(queue: QueueDescriptor, adapter: Arc<dyn QueueAdapter>) -> Self {
        QueueManager { queue, adapter }
    }

    pub fn name(&self) -> &str {
        &self.queue.name
    }

    /// Submit a message for asynchronous processing. Returns the adapter's
    /// tracking record untouched.
    pub async fn submit_message(&self, payload: Value, delay_ms: Option<u64>) -> Result<Value> {
        if payload.is_null() {
            return Err(ClientError::MissingInputParameter(
                "The message payload needs to be provided".to_string(),
            ));
        }
        let delay = delay_ms.or(self.queue.delay_ms).unwrap_or(0);
        self.adapter.send_message(&self.queue, payload, delay).await
    }

    /// Tracking record of a previously submitted message.
    pub async fn get_message_status(&self, id: &str) -> Result<Value> {
        if id.trim().is_empty() {
            return Err(ClientError::MissingInputParameter(
                "The message id needs to be provided".to_string(),
            ));
        }
        self.adapter
            .get_message_tracking_record(&self.queue.iid, id)
            .await
    }
}
