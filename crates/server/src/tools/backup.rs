//! backup_save, backup_list and backup_remove.
//!
//! Local sink for contact form submissions that could not be delivered.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use larder_core::CacheDb;
use larder_core::store::{ContactSubmission, FormBackup};

use super::json_result;
use crate::error::ToolError;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BackupSaveOutput {
    /// Key the submission was stored under.
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BackupListOutput {
    /// Stored submissions, oldest first.
    pub backups: Vec<FormBackup>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BackupRemoveParams {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BackupRemoveOutput {
    pub removed: bool,
}

pub async fn save_impl(db: &CacheDb, limit: usize, data: ContactSubmission) -> Result<CallToolResult, McpError> {
    if data.name.trim().is_empty() || data.email.trim().is_empty() {
        return Err(ToolError::InvalidInput("name and email are required".into()).into());
    }

    let key = db.save_backup(&data, limit).await?;
    json_result(&BackupSaveOutput { key })
}

pub async fn list_impl(db: &CacheDb) -> Result<CallToolResult, McpError> {
    let backups = db.list_backups().await?;
    json_result(&BackupListOutput { backups })
}

pub async fn remove_impl(db: &CacheDb, params: BackupRemoveParams) -> Result<CallToolResult, McpError> {
    let removed = db.remove_backup(&params.key).await?;
    json_result(&BackupRemoveOutput { removed })
}
