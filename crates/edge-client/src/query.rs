//! Iterated (cursor-paginated) queries

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::client::EdgeClient;
use crate::error::Result;
use crate::types::Command;

/// Cursor value that starts a new server-side iteration
pub const NEW_ITERATOR: &str = "new";

impl EdgeClient {
    /// Run a paginated command to exhaustion and return every record
    ///
    /// The command is re-sent with the server's cursor until a page is
    /// unsuccessful or empty, the cursor is missing, or the configured
    /// iteration limit is reached. Records gathered before an unsuccessful
    /// page are returned as-is. Transport and protocol errors propagate.
    #[instrument(skip(self, command), fields(command = command.name()))]
    pub async fn run_iterated_command(&self, command: Command) -> Result<Vec<Value>> {
        let iteration = &self.config().iteration;
        let delay = iteration.delay();

        let mut command = command
            .param("iterator", NEW_ITERATOR)
            .param("useSearch", true)
            .param("limit", iteration.page_size)
            .param("showCount", false);
        let mut records = Vec::new();

        for page in 1..=iteration.limit {
            let result = self.run_command(command.clone()).await?;
            if !result.success {
                warn!(
                    iteration = page,
                    error = %result.error_summary(),
                    "Iterated command unsuccessful, returning partial results"
                );
                return Ok(records);
            }

            let page_records = result.records();
            if page_records.is_empty() {
                debug!(iteration = page, total = records.len(), "Iteration exhausted");
                return Ok(records);
            }
            records.extend_from_slice(page_records);

            let cursor = match result.params.get("iterator") {
                Some(Value::String(cursor)) if !cursor.is_empty() => cursor.clone(),
                _ => {
                    debug!(iteration = page, total = records.len(), "No cursor returned");
                    return Ok(records);
                }
            };
            command = command.param("iterator", cursor);

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        warn!(
            limit = iteration.limit,
            total = records.len(),
            "Reached maximum iteration limit"
        );
        Ok(records)
    }
}
