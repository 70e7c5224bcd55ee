//! Realtime channel manager.

use std::sync::Arc;

use serde_json::Value;

use crate::adapter::RealtimeAdapter;
use crate::error::{ClientError, Result};

#[derive(Clone)]
pub struct RealtimeManager {
    adapter: Arc<dyn RealtimeAdapter>,
}

impl std::fmt::Debug for RealtimeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeManager").finish_non_exhaustive()
    }
}

impl RealtimeManager {
    pub(crate) fn new(adapter: Arc<dyn RealtimeAdapter>) -> Self {
        RealtimeManager { adapter }
    }

    fn check_name(value: &str, what: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ClientError::MissingInputParameter(format!(
                "The {what} needs to be provided"
            )));
        }
        Ok(())
    }

    /// Send a message to every connected member.
    pub async fn broadcast(&self, event_name: &str, message: Value) -> Result<()> {
        Self::check_name(event_name, "event name")?;
        self.adapter.broadcast(event_name, message).await
    }

    /// Send a message to the members of one channel.
    pub async fn send(&self, channel: &str, event_name: &str, message: Value) -> Result<()> {
        Self::check_name(channel, "channel name")?;
        Self::check_name(event_name, "event name")?;
        self.adapter.send(channel, event_name, message).await
    }

    pub async fn get_members(&self, channel: &str) -> Result<Value> {
        Self::check_name(channel, "channel name")?;
        self.adapter.get_members(channel).await
    }
}
