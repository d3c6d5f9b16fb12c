//! sw_install, sw_activate, sw_message and sw_settle.
//!
//! The host side of the worker lifecycle. A browser activates a waiting
//! worker as soon as it asks to skip waiting; these tools do the same.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use larder_client::{Outcome, ServiceWorker, Signal, WorkerMessage, WorkerState};
use larder_core::Error;

use super::json_result;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ActivateOutput {
    pub state: String,
    /// Stale partitions deleted during activation.
    pub purged: Vec<String>,
    /// Whether open clients are taken over by this version.
    pub claim_clients: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InstallOutput {
    pub state: String,
    /// Name of the committed static partition.
    pub partition: String,
    /// Number of manifest assets precached.
    pub assets: usize,
    pub skip_waiting: bool,
    /// Present when install went straight on to activation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation: Option<ActivateOutput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MessageParams {
    /// Message text. `SKIP_WAITING` is the only recognised command.
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MessageOutput {
    /// "skip_waiting" or "ignored".
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation: Option<ActivateOutput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SettleOutput {
    /// Background revalidations that finished.
    pub settled: usize,
}

fn unexpected(outcome: Outcome) -> Error {
    Error::InvalidState(format!("unexpected outcome {outcome:?}"))
}

pub async fn run_activate(worker: &ServiceWorker) -> Result<ActivateOutput, Error> {
    match worker.dispatch(Signal::Activate).await? {
        Outcome::Activated { purged, claim_clients } => {
            Ok(ActivateOutput { state: worker.state().to_string(), purged, claim_clients })
        }
        other => Err(unexpected(other)),
    }
}

/// Install, then activate right away when skip-waiting applies.
pub async fn run_install(worker: &ServiceWorker) -> Result<InstallOutput, Error> {
    let (partition, assets, skip_waiting) = match worker.dispatch(Signal::Install).await? {
        Outcome::Installed { partition, assets, skip_waiting } => (partition, assets, skip_waiting),
        other => return Err(unexpected(other)),
    };

    let activation = if skip_waiting { Some(run_activate(worker).await?) } else { None };

    Ok(InstallOutput { state: worker.state().to_string(), partition, assets, skip_waiting, activation })
}

pub async fn install_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let output = run_install(worker).await?;
    json_result(&output)
}

pub async fn activate_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let output = run_activate(worker).await?;
    json_result(&output)
}

pub async fn message_impl(worker: &ServiceWorker, params: MessageParams) -> Result<CallToolResult, McpError> {
    let message = WorkerMessage::from(params.message.as_str());

    let output = match worker.dispatch(Signal::Message(message)).await? {
        Outcome::SkipWaiting => {
            let activation =
                if worker.state() == WorkerState::Installed { Some(run_activate(worker).await?) } else { None };
            MessageOutput { outcome: "skip_waiting".into(), activation }
        }
        _ => MessageOutput { outcome: "ignored".into(), activation: None },
    };

    json_result(&output)
}

pub async fn settle_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let settled = worker.settle().await;
    json_result(&SettleOutput { settled })
}
