//! Wire types for the batched command protocol

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::commands::BuildError;
use crate::error::{EdgeClientError, Result};

/// Reserved label carrying the session envelope (or the login command)
pub const AUTH_LABEL: &str = "auth";

// =============================================================================
// Commands
// =============================================================================

/// A single remote command: `{"command": name, "params": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "command")]
    name: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    params: Map<String, Value>,
}

impl Command {
    /// Create a command with no parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
        }
    }

    /// Create a command from a prepared parameter map
    pub fn with_params(name: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Return a copy of this command with `key` set to `value`
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }
}

/// Ordered, uniquely-labeled set of commands sent in one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandBatch {
    entries: Vec<(String, Command)>,
}

impl CommandBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Batch holding one command under label `"1"`
    pub fn single(command: Command) -> Self {
        Self {
            entries: vec![("1".to_string(), command)],
        }
    }

    /// Build a batch labeled `"1"..="N"` in iteration order
    pub fn from_commands(commands: impl IntoIterator<Item = Command>) -> Self {
        let entries = commands
            .into_iter()
            .enumerate()
            .map(|(i, command)| ((i + 1).to_string(), command))
            .collect();
        Self { entries }
    }

    /// Insert a command under an explicit label
    pub fn insert(
        &mut self,
        label: impl Into<String>,
        command: Command,
    ) -> std::result::Result<(), BuildError> {
        let label = label.into();
        if label == AUTH_LABEL {
            return Err(BuildError::ReservedLabel(label));
        }
        if self.contains(&label) {
            return Err(BuildError::DuplicateLabel(label));
        }
        self.entries.push((label, command));
        Ok(())
    }

    /// Append a command under the next free ordinal label and return the label
    pub fn push(&mut self, command: Command) -> String {
        let mut ordinal = self.entries.len() + 1;
        while self.contains(&ordinal.to_string()) {
            ordinal += 1;
        }
        let label = ordinal.to_string();
        self.entries.push((label.clone(), command));
        label
    }

    pub fn get(&self, label: &str) -> Option<&Command> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, command)| command)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.entries.iter().any(|(l, _)| l == label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| label.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Command)> {
        self.entries
            .iter()
            .map(|(label, command)| (label.as_str(), command))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wire payload: the session envelope merged with every labeled command
    pub fn to_payload(&self, session_id: Option<&str>) -> Value {
        let mut payload = Map::new();
        payload.insert(
            AUTH_LABEL.to_string(),
            serde_json::json!({ "sessionId": session_id }),
        );
        for (label, command) in &self.entries {
            payload.insert(label.clone(), command_value(command));
        }
        Value::Object(payload)
    }
}

impl Serialize for CommandBatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, command) in &self.entries {
            map.serialize_entry(label, command)?;
        }
        map.end()
    }
}

pub(crate) fn command_value(command: &Command) -> Value {
    let mut object = Map::new();
    object.insert("command".to_string(), Value::String(command.name.clone()));
    if !command.params.is_empty() {
        object.insert("params".to_string(), Value::Object(command.params.clone()));
    }
    Value::Object(object)
}

// =============================================================================
// Results
// =============================================================================

/// Per-label result echoed by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub params: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub error_codes: Vec<i64>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub error_messages: Vec<String>,
}

impl CommandResult {
    /// Synthesized failure entry
    pub fn failure(error_codes: Vec<i64>, error_messages: Vec<String>) -> Self {
        Self {
            success: false,
            params: Map::new(),
            error_codes,
            error_messages,
        }
    }

    pub fn first_error_code(&self) -> Option<i64> {
        self.error_codes.first().copied()
    }

    /// String parameter from the result params
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// Identifier parameter that may come back as a string or a number
    pub fn param_id(&self, key: &str) -> Option<String> {
        match self.params.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Records of a paginated page (`params.result`)
    pub fn records(&self) -> &[Value] {
        self.params
            .get("result")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Human-readable error summary for logs
    pub fn error_summary(&self) -> String {
        if self.error_messages.is_empty() {
            format!("error codes {:?}", self.error_codes)
        } else {
            self.error_messages.join(", ")
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Normalized response to a [`CommandBatch`]
///
/// Every label of the request is present, whether or not the backend
/// annotated it.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub success: bool,
    pub error_codes: Vec<i64>,
    entries: Vec<(String, CommandResult)>,
}

impl BatchResult {
    /// Normalize a raw response body against the labels that were sent
    pub fn from_response<'a>(
        response: Value,
        labels: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        let Value::Object(mut body) = response else {
            return Err(EdgeClientError::MalformedResponse(
                "response body is not a JSON object".into(),
            ));
        };

        let error_codes: Vec<i64> = take_field(&mut body, "errorCodes")?;
        let error_messages: Vec<String> = take_field(&mut body, "errorMessages")?;
        let top_level_failed = matches!(body.get("success"), Some(Value::Bool(false)));

        let entries = labels
            .into_iter()
            .map(|label| {
                let entry = if top_level_failed {
                    CommandResult::failure(error_codes.clone(), error_messages.clone())
                } else {
                    match body.remove(label) {
                        Some(value) => serde_json::from_value(value).map_err(|e| {
                            EdgeClientError::MalformedResponse(format!(
                                "entry '{}' is not a command result: {}",
                                label, e
                            ))
                        })?,
                        None => CommandResult::failure(Vec::new(), Vec::new()),
                    }
                };
                Ok((label.to_string(), entry))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            success: !top_level_failed,
            error_codes,
            entries,
        })
    }

    /// First error code found: the envelope first, then labels in request order
    pub fn first_error_code(&self) -> Option<i64> {
        self.error_codes.first().copied().or_else(|| {
            self.entries
                .iter()
                .find_map(|(_, entry)| entry.first_error_code())
        })
    }

    pub fn get(&self, label: &str) -> Option<&CommandResult> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, entry)| entry)
    }

    /// Remove and return the entry for `label`
    pub fn take(&mut self, label: &str) -> Option<CommandResult> {
        let index = self.entries.iter().position(|(l, _)| l == label)?;
        Some(self.entries.remove(index).1)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| label.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CommandResult)> {
        self.entries
            .iter()
            .map(|(label, entry)| (label.as_str(), entry))
    }

    /// Entries whose command failed
    pub fn failures(&self) -> impl Iterator<Item = (&str, &CommandResult)> {
        self.iter().filter(|(_, entry)| !entry.success)
    }

    pub fn all_succeeded(&self) -> bool {
        self.success && self.entries.iter().all(|(_, entry)| entry.success)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for BatchResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len() + 2))?;
        map.serialize_entry("success", &self.success)?;
        map.serialize_entry("errorCodes", &self.error_codes)?;
        for (label, entry) in &self.entries {
            map.serialize_entry(label, entry)?;
        }
        map.end()
    }
}

fn take_field<T>(body: &mut Map<String, Value>, key: &str) -> Result<T>
where
    T: Default + serde::de::DeserializeOwned,
{
    match body.remove(key) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|e| {
            EdgeClientError::MalformedResponse(format!("invalid '{}': {}", key, e))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_merges_session_envelope() {
        let batch = CommandBatch::single(Command::new("session.info"));
        let payload = batch.to_payload(Some("token-1"));

        assert_eq!(
            payload,
            json!({
                "auth": { "sessionId": "token-1" },
                "1": { "command": "session.info" }
            })
        );
    }

    #[test]
    fn test_payload_without_session_sends_null() {
        let batch = CommandBatch::single(Command::new("thing.list").param("limit", 10));
        let payload = batch.to_payload(None);
        assert_eq!(payload["auth"]["sessionId"], Value::Null);
        assert_eq!(payload["1"]["params"]["limit"], 10);
    }

    #[test]
    fn test_insert_rejects_duplicate_and_reserved_labels() {
        let mut batch = CommandBatch::new();
        batch.insert("a", Command::new("x")).unwrap();
        assert!(matches!(
            batch.insert("a", Command::new("y")),
            Err(BuildError::DuplicateLabel(_))
        ));
        assert!(matches!(
            batch.insert("auth", Command::new("y")),
            Err(BuildError::ReservedLabel(_))
        ));
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_push_skips_taken_ordinals() {
        let mut batch = CommandBatch::new();
        batch.insert("2", Command::new("x")).unwrap();
        assert_eq!(batch.push(Command::new("y")), "3");
        assert_eq!(batch.push(Command::new("z")), "4");
        assert_eq!(batch.labels().collect::<Vec<_>>(), vec!["2", "3", "4"]);
    }

    #[test]
    fn test_top_level_failure_rewrites_every_label() {
        let response = json!({
            "success": false,
            "errorCodes": [-90008],
            "1": { "success": true, "params": {} }
        });

        let result = BatchResult::from_response(response, ["1", "2"]).unwrap();
        assert!(!result.success);
        assert_eq!(result.len(), 2);
        for (_, entry) in result.iter() {
            assert!(!entry.success);
            assert_eq!(entry.error_codes, vec![-90008]);
        }
        assert_eq!(result.first_error_code(), Some(-90008));
    }

    #[test]
    fn test_success_injects_empty_error_codes_and_keeps_entries() {
        let response = json!({
            "1": { "success": true, "params": { "id": "t-1" } },
            "2": { "success": false, "errorCodes": [-1, -2] }
        });

        let result = BatchResult::from_response(response, ["1", "2"]).unwrap();
        assert!(result.success);
        assert!(result.error_codes.is_empty());
        assert_eq!(result.get("1").unwrap().param_str("id"), Some("t-1"));
        assert_eq!(result.get("2").unwrap().error_codes, vec![-1, -2]);
        assert_eq!(result.first_error_code(), Some(-1));
        assert!(!result.all_succeeded());
    }

    #[test]
    fn test_missing_label_is_synthesized_as_failure() {
        let response = json!({ "success": true });
        let result = BatchResult::from_response(response, ["1", "2", "3"]).unwrap();
        assert_eq!(result.labels().collect::<Vec<_>>(), vec!["1", "2", "3"]);
        assert_eq!(result.failures().count(), 3);
        assert_eq!(result.first_error_code(), None);
    }

    #[test]
    fn test_null_fields_deserialize_as_empty() {
        let response = json!({
            "success": true,
            "errorCodes": null,
            "1": { "success": true, "params": null, "errorCodes": null }
        });
        let result = BatchResult::from_response(response, ["1"]).unwrap();
        let entry = result.get("1").unwrap();
        assert!(entry.params.is_empty());
        assert!(entry.error_codes.is_empty());
    }

    #[test]
    fn test_non_object_body_is_malformed() {
        let err = BatchResult::from_response(json!([1, 2, 3]), ["1"]).unwrap_err();
        assert!(err.is_protocol());

        let err = BatchResult::from_response(json!({ "1": "nope" }), ["1"]).unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn test_records_and_param_id() {
        let entry: CommandResult = serde_json::from_value(json!({
            "success": true,
            "params": { "result": [{ "key": "a" }, { "key": "b" }], "id": 42 }
        }))
        .unwrap();
        assert_eq!(entry.records().len(), 2);
        assert_eq!(entry.param_id("id").as_deref(), Some("42"));
        assert_eq!(entry.param_id("missing"), None);
    }

    #[test]
    fn test_batch_result_serializes_labels() {
        let result =
            BatchResult::from_response(json!({ "1": { "success": true } }), ["1"]).unwrap();
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["1"]["success"], true);
        assert_eq!(value["1"]["errorCodes"], json!([]));
    }
}
