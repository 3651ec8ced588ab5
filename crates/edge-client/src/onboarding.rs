//! Device onboarding workflow
//!
//! Each device goes through four sequential steps:
//! 1. inventory lookup (`module.inventory.find`)
//! 2. thing creation (`thing.create`)
//! 3. module creation linking inventory entry and thing (`module.create`)
//! 4. profile association over the bootstrap connection (`lwm2m.device.update`)
//!
//! A failing step stops only the device it belongs to. Devices are processed
//! one after another in input order.

use std::fmt;

use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::client::EdgeClient;
use crate::error::{EdgeClientError, Result};
use crate::types::{Command, CommandResult};

/// Connection mode used when associating a new thing with its profile
pub const BOOTSTRAP_CONNECTION: &str = "bootstrap_dtls";

// =============================================================================
// Types
// =============================================================================

/// A step of the per-device pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    InventoryLookup,
    ThingCreation,
    ModuleCreation,
    ProfileAssociation,
}

impl fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InventoryLookup => "inventory lookup",
            Self::ThingCreation => "thing creation",
            Self::ModuleCreation => "module creation",
            Self::ProfileAssociation => "profile association",
        };
        f.write_str(name)
    }
}

/// Why a device's pipeline stopped
#[derive(Debug, Error)]
pub enum OnboardingError {
    #[error("{step} rejected: {detail}")]
    Rejected {
        step: OnboardingStep,
        error_codes: Vec<i64>,
        detail: String,
    },

    #[error("{step} returned no '{field}'")]
    MissingField {
        step: OnboardingStep,
        field: &'static str,
    },

    #[error("{step} failed: {source}")]
    Client {
        step: OnboardingStep,
        #[source]
        source: EdgeClientError,
    },
}

impl OnboardingError {
    /// The step that failed
    pub fn step(&self) -> OnboardingStep {
        match self {
            Self::Rejected { step, .. }
            | Self::MissingField { step, .. }
            | Self::Client { step, .. } => *step,
        }
    }
}

/// Identifiers of a fully onboarded device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnboardedThing {
    pub thing_id: String,
    pub inventory_id: String,
    pub iot_id: String,
}

/// Result of onboarding one device
#[derive(Debug)]
pub struct DeviceOutcome {
    pub device: String,
    pub result: std::result::Result<OnboardedThing, OnboardingError>,
}

impl DeviceOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-device outcomes of an onboarding run, in input order
#[derive(Debug, Default)]
pub struct OnboardingReport {
    pub outcomes: Vec<DeviceOutcome>,
}

impl OnboardingReport {
    pub fn succeeded(&self) -> impl Iterator<Item = (&str, &OnboardedThing)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|thing| (o.device.as_str(), thing)))
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &OnboardingError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|err| (o.device.as_str(), err)))
    }

    pub fn success_count(&self) -> usize {
        self.succeeded().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }
}

/// Validated onboarding arguments
#[derive(Debug, Clone)]
pub struct OnboardingPlan {
    devices: Vec<String>,
    profile_id: String,
    thing_def_id: String,
    tags: Vec<String>,
}

impl OnboardingPlan {
    /// Check that every argument is non-empty
    pub fn new(
        devices: Vec<String>,
        profile_id: impl Into<String>,
        thing_def_id: impl Into<String>,
        tags: Vec<String>,
    ) -> Result<Self> {
        let profile_id = profile_id.into();
        let thing_def_id = thing_def_id.into();

        let missing: Vec<&str> = [
            ("devices", devices.is_empty()),
            ("profile_id", profile_id.is_empty()),
            ("thing_def_id", thing_def_id.is_empty()),
            ("tags", tags.is_empty()),
        ]
        .into_iter()
        .filter_map(|(name, empty)| empty.then_some(name))
        .collect();

        if !missing.is_empty() {
            return Err(EdgeClientError::InvalidArgument(format!(
                "onboarding requires non-empty {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            devices,
            profile_id,
            thing_def_id,
            tags,
        })
    }

    pub fn devices(&self) -> &[String] {
        &self.devices
    }
}

// =============================================================================
// Workflow
// =============================================================================

impl EdgeClient {
    /// Onboard every device and collect the outcomes
    ///
    /// Fails only on invalid arguments; per-device failures end up in the
    /// report.
    #[instrument(skip(self, devices, tags), fields(devices = devices.len()))]
    pub async fn onboard(
        &self,
        devices: Vec<String>,
        profile_id: &str,
        thing_def_id: &str,
        tags: Vec<String>,
    ) -> Result<OnboardingReport> {
        let plan = OnboardingPlan::new(devices, profile_id, thing_def_id, tags)?;
        let outcomes: Vec<DeviceOutcome> = self.onboard_stream(plan).collect().await;

        let report = OnboardingReport { outcomes };
        info!(
            succeeded = report.success_count(),
            failed = report.failure_count(),
            "Onboarding finished"
        );
        Ok(report)
    }

    /// Lazily onboard the devices of `plan`, one device per poll
    ///
    /// Dropping the stream stops the run after the device in flight.
    pub fn onboard_stream(&self, plan: OnboardingPlan) -> impl Stream<Item = DeviceOutcome> + '_ {
        stream::unfold((plan, 0usize), move |(plan, index)| async move {
            let device = plan.devices.get(index)?.clone();
            let outcome = self.onboard_device(&plan, device).await;
            Some((outcome, (plan, index + 1)))
        })
    }

    async fn onboard_device(&self, plan: &OnboardingPlan, device: String) -> DeviceOutcome {
        let result = self.run_onboarding_steps(plan, &device).await;
        match &result {
            Ok(thing) => info!(device = %device, thing_id = %thing.thing_id, "Successfully onboarded"),
            Err(e) => error!(device = %device, step = %e.step(), error = %e, "Failed to onboard"),
        }
        DeviceOutcome { device, result }
    }

    async fn run_onboarding_steps(
        &self,
        plan: &OnboardingPlan,
        device: &str,
    ) -> std::result::Result<OnboardedThing, OnboardingError> {
        let inventory = self
            .onboarding_step(
                OnboardingStep::InventoryLookup,
                Command::new("module.inventory.find").param("identifiers", device),
            )
            .await?;
        let inventory_id = required_id(&inventory, OnboardingStep::InventoryLookup, "id")?;
        let iot_id = inventory.param_id("iotId");
        debug!(device, inventory_id = %inventory_id, "Inventory entry found");

        let thing = self
            .onboarding_step(
                OnboardingStep::ThingCreation,
                Command::new("thing.create")
                    .param("defId", plan.thing_def_id.as_str())
                    .param("name", device)
                    .param("key", device)
                    .param("tags", plan.tags.clone())
                    .param("locEnabled", "1"),
            )
            .await?;
        let thing_id = required_id(&thing, OnboardingStep::ThingCreation, "id")?;
        debug!(device, thing_id = %thing_id, "Thing created");

        self.onboarding_step(
            OnboardingStep::ModuleCreation,
            Command::new("module.create")
                .param("inventoryId", inventory_id.as_str())
                .param("thingId", thing_id.as_str()),
        )
        .await?;
        debug!(device, "Module created");

        let iot_id = iot_id.ok_or(OnboardingError::MissingField {
            step: OnboardingStep::ProfileAssociation,
            field: "iotId",
        })?;
        self.onboarding_step(
            OnboardingStep::ProfileAssociation,
            Command::new("lwm2m.device.update")
                .param("connection", BOOTSTRAP_CONNECTION)
                .param("endpoint", iot_id.as_str())
                .param("profileId", plan.profile_id.as_str())
                .param("thingId", thing_id.as_str()),
        )
        .await?;

        Ok(OnboardedThing {
            thing_id,
            inventory_id,
            iot_id,
        })
    }

    async fn onboarding_step(
        &self,
        step: OnboardingStep,
        command: Command,
    ) -> std::result::Result<CommandResult, OnboardingError> {
        let result = self
            .run_command(command)
            .await
            .map_err(|source| OnboardingError::Client { step, source })?;

        if result.success {
            Ok(result)
        } else {
            Err(OnboardingError::Rejected {
                step,
                detail: result.error_summary(),
                error_codes: result.error_codes,
            })
        }
    }
}

fn required_id(
    result: &CommandResult,
    step: OnboardingStep,
    field: &'static str,
) -> std::result::Result<String, OnboardingError> {
    result
        .param_id(field)
        .ok_or(OnboardingError::MissingField { step, field })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};

    use crate::config::ClientConfig;
    use crate::transport::{MockReply, MockTransport};

    use super::*;

    fn client_with(mock: &Arc<MockTransport>) -> EdgeClient {
        let config = ClientConfig::builder("http://mock.test/api")
            .no_delays()
            .build();
        EdgeClient::with_transport(mock.clone(), config)
    }

    fn ok(params: Value) -> MockReply {
        MockReply::Body(json!({ "1": { "success": true, "params": params } }))
    }

    /// Backend where every device exists except `missing`
    fn backend(missing: &'static str) -> MockTransport {
        MockTransport::with_handler(move |payload| {
            let command = &payload["1"];
            let params = &command["params"];
            match command["command"].as_str() {
                Some("module.inventory.find") => {
                    let device = params["identifiers"].as_str().unwrap_or_default();
                    if device == missing {
                        MockReply::Body(json!({
                            "1": { "success": false, "errorCodes": [-90008], "errorMessages": ["Not found"] }
                        }))
                    } else {
                        ok(json!({ "id": format!("inv-{}", device), "iotId": format!("urn:imei:{}", device) }))
                    }
                }
                Some("thing.create") => ok(json!({ "id": format!("thing-{}", params["key"].as_str().unwrap_or_default()) })),
                Some("module.create") | Some("lwm2m.device.update") => ok(json!({})),
                _ => MockReply::Body(json!({ "success": false, "errorCodes": [-1] })),
            }
        })
    }

    fn devices() -> Vec<String> {
        vec!["dev-1".into(), "dev-2".into(), "dev-3".into()]
    }

    #[tokio::test]
    async fn test_failure_is_isolated_per_device() {
        let mock = Arc::new(backend("dev-2"));
        let client = client_with(&mock);

        let report = client
            .onboard(devices(), "profile-1", "def-1", vec!["batch-7".into()])
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.success_count(), 2);
        let failed: Vec<_> = report.failed().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "dev-2");
        assert_eq!(failed[0].1.step(), OnboardingStep::InventoryLookup);

        let third = report.outcomes[2].result.as_ref().unwrap();
        assert_eq!(third.thing_id, "thing-dev-3");
        assert_eq!(third.inventory_id, "inv-dev-3");
        assert_eq!(third.iot_id, "urn:imei:dev-3");

        // four steps for each good device, one lookup for the bad one
        let commands: Vec<String> = mock
            .requests()
            .iter()
            .map(|r| r["1"]["command"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(commands.len(), 9);
        assert_eq!(
            &commands[..5],
            &[
                "module.inventory.find",
                "thing.create",
                "module.create",
                "lwm2m.device.update",
                "module.inventory.find",
            ]
        );
    }

    #[tokio::test]
    async fn test_step_payloads() {
        let mock = Arc::new(backend("none"));
        let client = client_with(&mock);

        client
            .onboard(vec!["dev-9".into()], "profile-1", "def-1", vec!["a".into(), "b".into()])
            .await
            .unwrap();

        let requests = mock.requests();
        assert_eq!(requests[0]["1"]["params"], json!({ "identifiers": "dev-9" }));
        assert_eq!(
            requests[1]["1"]["params"],
            json!({ "defId": "def-1", "name": "dev-9", "key": "dev-9", "tags": ["a", "b"], "locEnabled": "1" })
        );
        assert_eq!(
            requests[2]["1"]["params"],
            json!({ "inventoryId": "inv-dev-9", "thingId": "thing-dev-9" })
        );
        assert_eq!(
            requests[3]["1"]["params"],
            json!({
                "connection": "bootstrap_dtls",
                "endpoint": "urn:imei:dev-9",
                "profileId": "profile-1",
                "thingId": "thing-dev-9"
            })
        );
    }

    #[tokio::test]
    async fn test_missing_arguments_fail_fast() {
        let mock = Arc::new(backend("none"));
        let client = client_with(&mock);

        let err = client
            .onboard(devices(), "", "def-1", vec![])
            .await
            .unwrap_err();
        assert!(err.is_caller_misuse());
        assert!(err.to_string().contains("profile_id, tags"));
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_can_stop_early() {
        let mock = Arc::new(backend("none"));
        let client = client_with(&mock);
        let plan = OnboardingPlan::new(devices(), "profile-1", "def-1", vec!["t".into()]).unwrap();

        let first: Vec<DeviceOutcome> = client.onboard_stream(plan).take(1).collect().await;
        assert_eq!(first.len(), 1);
        assert!(first[0].is_success());
        assert_eq!(mock.request_count(), 4);
    }

    #[tokio::test]
    async fn test_missing_iot_id_fails_association() {
        let mock = Arc::new(MockTransport::new());
        mock.push(ok(json!({ "id": "inv-1" })))
            .push(ok(json!({ "id": "thing-1" })))
            .push(ok(json!({})));
        let client = client_with(&mock);

        let report = client
            .onboard(vec!["dev-1".into()], "p", "d", vec!["t".into()])
            .await
            .unwrap();
        let (_, err) = report.failed().next().unwrap();
        assert!(matches!(
            err,
            OnboardingError::MissingField {
                step: OnboardingStep::ProfileAssociation,
                field: "iotId"
            }
        ));
        assert_eq!(mock.request_count(), 3);
    }
}
