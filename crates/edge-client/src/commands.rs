//! Bulk command builders
//!
//! Pure functions turning a list of device identifiers plus operation
//! parameters into a [`CommandBatch`]. Per-device builders label their
//! commands `"1"..="N"` in input order. Nothing here touches the network.

use serde_json::Value;
use thiserror::Error;

use crate::types::{Command, CommandBatch};

/// Attribute key carrying a free-form settings string
pub const SETTINGS_ATTRIBUTE: &str = "att_settings_change";

/// Attribute key naming where a device publishes its data
pub const DATA_DESTINATION_ATTRIBUTE: &str = "data_destination";

/// Caller errors detected while building a batch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("{identifiers} device identifiers but {values} values")]
    LengthMismatch { identifiers: usize, values: usize },

    #[error("Duplicate label '{0}'")]
    DuplicateLabel(String),

    #[error("Label '{0}' is reserved")]
    ReservedLabel(String),

    #[error("No deletion selector supplied (expected one of keys, ids, tags, query)")]
    NoSelector,

    #[error("Only one deletion selector may be supplied, got: {}", .0.join(", "))]
    MultipleSelectors(Vec<&'static str>),

    #[error("Deletion selector '{0}' is empty")]
    EmptySelector(&'static str),
}

fn string_array<S: AsRef<str>>(items: &[S]) -> Value {
    Value::Array(
        items
            .iter()
            .map(|item| Value::String(item.as_ref().to_string()))
            .collect(),
    )
}

fn per_device<S, F>(devices: &[S], build: F) -> CommandBatch
where
    S: AsRef<str>,
    F: Fn(&str) -> Command,
{
    CommandBatch::from_commands(devices.iter().map(|device| build(device.as_ref())))
}

/// Add `tags` to every device
pub fn tag_add<S: AsRef<str>, T: AsRef<str>>(devices: &[S], tags: &[T]) -> CommandBatch {
    let tags = string_array(tags);
    per_device(devices, |device| {
        Command::new("thing.tag.add")
            .param("thingKey", device)
            .param("tags", tags.clone())
    })
}

/// Remove `tags` from every device
pub fn tag_delete<S: AsRef<str>, T: AsRef<str>>(devices: &[S], tags: &[T]) -> CommandBatch {
    let tags = string_array(tags);
    per_device(devices, |device| {
        Command::new("thing.tag.delete")
            .param("thingKey", device)
            .param("tags", tags.clone())
    })
}

/// Associate every device with a device profile
pub fn profile_change<S: AsRef<str>>(devices: &[S], profile_id: &str) -> CommandBatch {
    per_device(devices, |device| {
        Command::new("lwm2m.device.profile.change")
            .param("thingKey", device)
            .param("profileId", profile_id)
    })
}

/// Publish `values[i]` as the settings attribute of `devices[i]`
///
/// Both lists must have the same length.
pub fn settings_push<S: AsRef<str>, V: AsRef<str>>(
    devices: &[S],
    values: &[V],
) -> Result<CommandBatch, BuildError> {
    if devices.len() != values.len() {
        return Err(BuildError::LengthMismatch {
            identifiers: devices.len(),
            values: values.len(),
        });
    }

    Ok(CommandBatch::from_commands(devices.iter().zip(values).map(
        |(device, value)| {
            Command::new("attribute.publish")
                .param("thingKey", device.as_ref())
                .param("key", SETTINGS_ATTRIBUTE)
                .param("value", value.as_ref())
        },
    )))
}

/// Move every device to another thing definition
///
/// Properties are kept; attributes and alarms are always dropped.
pub fn definition_change<S: AsRef<str>>(devices: &[S], new_def_key: &str) -> CommandBatch {
    per_device(devices, |device| {
        Command::new("thing.def.change")
            .param("key", device)
            .param("newDefKey", new_def_key)
            .param("dropProps", false)
            .param("dropAttrs", true)
            .param("dropAlarms", true)
    })
}

/// Clear the data destination of every device
pub fn undeploy<S: AsRef<str>>(devices: &[S]) -> CommandBatch {
    per_device(devices, |device| {
        Command::new("attribute.publish")
            .param("thingKey", device)
            .param("key", DATA_DESTINATION_ATTRIBUTE)
            .param("value", "")
    })
}

/// Scope of a `thing.delete` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteSelector {
    Keys(Vec<String>),
    Ids(Vec<String>),
    Tags(Vec<String>),
    Query(String),
}

impl DeleteSelector {
    /// Pick the single supplied selector out of optional criteria
    ///
    /// Empty lists and blank queries count as not supplied.
    pub fn from_criteria(
        keys: Vec<String>,
        ids: Vec<String>,
        tags: Vec<String>,
        query: Option<String>,
    ) -> Result<Self, BuildError> {
        let query = query.filter(|q| !q.trim().is_empty());

        let mut supplied = Vec::new();
        if !keys.is_empty() {
            supplied.push(Self::Keys(keys));
        }
        if !ids.is_empty() {
            supplied.push(Self::Ids(ids));
        }
        if !tags.is_empty() {
            supplied.push(Self::Tags(tags));
        }
        if let Some(query) = query {
            supplied.push(Self::Query(query));
        }

        match supplied.len() {
            0 => Err(BuildError::NoSelector),
            1 => Ok(supplied.remove(0)),
            _ => Err(BuildError::MultipleSelectors(
                supplied.iter().map(DeleteSelector::param_name).collect(),
            )),
        }
    }

    /// Parameter name used on the wire
    pub fn param_name(&self) -> &'static str {
        match self {
            Self::Keys(_) => "key",
            Self::Ids(_) => "id",
            Self::Tags(_) => "tag",
            Self::Query(_) => "query",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Keys(items) | Self::Ids(items) | Self::Tags(items) => items.is_empty(),
            Self::Query(query) => query.trim().is_empty(),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Keys(items) | Self::Ids(items) | Self::Tags(items) => string_array(items),
            Self::Query(query) => Value::String(query.clone()),
        }
    }
}

/// Single `thing.delete` command scoped by `selector`
pub fn delete_things(selector: &DeleteSelector) -> Result<CommandBatch, BuildError> {
    if selector.is_empty() {
        return Err(BuildError::EmptySelector(selector.param_name()));
    }
    Ok(CommandBatch::single(
        Command::new("thing.delete").param(selector.param_name(), selector.to_value()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    const DEVICES: [&str; 3] = ["352656100000001", "352656100000002", "352656100000003"];

    #[test]
    fn test_tag_add_carries_full_tag_list() {
        let batch = tag_add(&DEVICES, &["fleet-a", "pilot"]);

        assert_eq!(batch.labels().collect::<Vec<_>>(), vec!["1", "2", "3"]);
        let command = batch.get("2").unwrap();
        assert_eq!(command.name(), "thing.tag.add");
        assert_eq!(command.params()["thingKey"], "352656100000002");
        assert_eq!(command.params()["tags"], json!(["fleet-a", "pilot"]));
    }

    #[test]
    fn test_tag_delete() {
        let batch = tag_delete(&DEVICES[..1], &["pilot"]);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.get("1").unwrap().name(), "thing.tag.delete");
    }

    #[test]
    fn test_profile_change() {
        let batch = profile_change(&DEVICES, "profile-42");
        for (_, command) in batch.iter() {
            assert_eq!(command.name(), "lwm2m.device.profile.change");
            assert_eq!(command.params()["profileId"], "profile-42");
        }
    }

    #[test]
    fn test_settings_push_pairs_in_order() {
        let values = ["interval=60", "interval=120", "interval=300"];
        let batch = assert_ok!(settings_push(&DEVICES, &values));

        assert_eq!(batch.len(), 3);
        for (i, (label, command)) in batch.iter().enumerate() {
            assert_eq!(label, (i + 1).to_string());
            assert_eq!(command.name(), "attribute.publish");
            assert_eq!(command.params()["thingKey"], DEVICES[i]);
            assert_eq!(command.params()["key"], SETTINGS_ATTRIBUTE);
            assert_eq!(command.params()["value"], values[i]);
        }
    }

    #[test]
    fn test_settings_push_rejects_length_mismatch() {
        let err = assert_err!(settings_push(&DEVICES, &["only-one"]));
        assert_eq!(
            err,
            BuildError::LengthMismatch {
                identifiers: 3,
                values: 1
            }
        );

        let empty: [&str; 0] = [];
        assert!(settings_push(&empty, &["orphan"]).is_err());
    }

    #[test]
    fn test_definition_change_fixed_drop_policy() {
        let batch = definition_change(&DEVICES[..1], "tracker_v2");
        let command = batch.get("1").unwrap();

        assert_eq!(command.name(), "thing.def.change");
        assert_eq!(
            serde_json::to_value(command.params()).unwrap(),
            json!({
                "key": "352656100000001",
                "newDefKey": "tracker_v2",
                "dropProps": false,
                "dropAttrs": true,
                "dropAlarms": true
            })
        );
    }

    #[test]
    fn test_undeploy_clears_data_destination() {
        let batch = undeploy(&DEVICES);
        let command = batch.get("3").unwrap();
        assert_eq!(command.params()["key"], DATA_DESTINATION_ATTRIBUTE);
        assert_eq!(command.params()["value"], "");
    }

    #[test]
    fn test_selector_requires_exactly_one() {
        let none = DeleteSelector::from_criteria(vec![], vec![], vec![], None);
        assert_eq!(none.unwrap_err(), BuildError::NoSelector);

        let blank = DeleteSelector::from_criteria(vec![], vec![], vec![], Some("  ".into()));
        assert_eq!(blank.unwrap_err(), BuildError::NoSelector);

        let two = DeleteSelector::from_criteria(
            vec!["k1".into()],
            vec![],
            vec!["old".into()],
            None,
        );
        assert_eq!(
            two.unwrap_err(),
            BuildError::MultipleSelectors(vec!["key", "tag"])
        );

        let one = DeleteSelector::from_criteria(vec![], vec!["i1".into()], vec![], None);
        assert_eq!(one.unwrap(), DeleteSelector::Ids(vec!["i1".into()]));
    }

    #[test]
    fn test_delete_things_single_param() {
        let cases = [
            (DeleteSelector::Keys(vec!["k1".into(), "k2".into()]), "key", json!(["k1", "k2"])),
            (DeleteSelector::Ids(vec!["i1".into()]), "id", json!(["i1"])),
            (DeleteSelector::Tags(vec!["retired".into()]), "tag", json!(["retired"])),
            (DeleteSelector::Query("tag:retired".into()), "query", json!("tag:retired")),
        ];

        for (selector, key, value) in cases {
            let batch = assert_ok!(delete_things(&selector));
            assert_eq!(batch.len(), 1);
            let command = batch.get("1").unwrap();
            assert_eq!(command.name(), "thing.delete");
            assert_eq!(command.params().len(), 1);
            assert_eq!(command.params()[key], value);
        }
    }

    #[test]
    fn test_delete_things_rejects_empty_selector() {
        let err = delete_things(&DeleteSelector::Keys(vec![])).unwrap_err();
        assert_eq!(err, BuildError::EmptySelector("key"));
    }
}
