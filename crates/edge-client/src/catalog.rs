//! Name-based lookups in the backend catalogs

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::client::EdgeClient;
use crate::error::{EdgeClientError, Result};
use crate::types::Command;

/// Page size used when listing device profiles
const PROFILE_LIST_LIMIT: u32 = 100;

fn find_field<'a>(records: &'a [Value], name: &str, field: &str) -> Option<&'a Value> {
    records
        .iter()
        .find(|record| record.get("name").and_then(Value::as_str) == Some(name))
        .and_then(|record| record.get(field))
}

fn as_identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl EdgeClient {
    /// Resolve a device profile id from its display name
    #[instrument(skip(self))]
    pub async fn find_profile_id(&self, name: &str) -> Result<Option<String>> {
        let command = Command::new("lwm2m.profile.list")
            .param("limit", PROFILE_LIST_LIMIT)
            .param("offset", 0);
        let result = self.run_command(command).await?;
        if !result.success {
            return Err(EdgeClientError::rejected(
                "lwm2m.profile.list",
                result.error_codes,
            ));
        }

        let id = find_field(result.records(), name, "id").and_then(as_identifier);
        match &id {
            Some(id) => debug!(name, id = %id, "Resolved profile"),
            None => warn!(name, "Profile not found"),
        }
        Ok(id)
    }

    /// Resolve a thing definition key from its display name
    #[instrument(skip(self))]
    pub async fn find_thing_def_key(&self, name: &str) -> Result<Option<String>> {
        let result = self.run_command(Command::new("thing_def.list")).await?;
        if !result.success {
            return Err(EdgeClientError::rejected("thing_def.list", result.error_codes));
        }

        let key = find_field(result.records(), name, "key").and_then(as_identifier);
        match &key {
            Some(key) => debug!(name, key = %key, "Resolved thing definition"),
            None => warn!(name, "Thing definition not found"),
        }
        Ok(key)
    }
}
