//! Custom helper function manager.

use std::sync::Arc;

use serde_json::Value;

use crate::adapter::FunctionAdapter;
use crate::error::Result;
use crate::metadata::FunctionDescriptor;

#[derive(Clone)]
pub struct FunctionManager {
    function: FunctionDescriptor,
    adapter: Arc<dyn FunctionAdapter>,
}

impl std::fmt::Debug for FunctionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionManager")
            .field("function", &self.function)
            .finish_non_exhaustive()
    }
}

impl FunctionManager {
    pub(crate) fn new(function: FunctionDescriptor, adapter: Arc<dyn FunctionAdapter>) -> Self {
        FunctionManager { function, adapter }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Run the helper with positional arguments; the result passes through
    /// unchanged.
    pub async fn run(&self, args: Vec<Value>) -> Result<Value> {
        self.adapter.run(&self.function, args).await
    }
}
